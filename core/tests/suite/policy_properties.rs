//! Cross-cutting policy properties, checked over the whole catalog rather
//! than single scenarios.

use std::sync::Arc;

use chambers_core::CaseSensitivity;
use chambers_core::ModelFilter;
use chambers_core::ModelRegistry;
use chambers_core::PayloadClass;
use chambers_core::PolicyEngine;
use chambers_core::PolicyRequest;
use chambers_core::ProviderId;
use chambers_core::ProviderKind;
use chambers_core::RedactionStatus;
use chambers_core::RuntimeMode;
use chambers_core::credentials::FixedCredentialProbe;

const ALL_PROVIDERS: &[ProviderId] = &[
    ProviderId::Anthropic,
    ProviderId::OpenAi,
    ProviderId::Ollama,
    ProviderId::Embedded,
];

fn registry(providers: &[ProviderId]) -> Arc<ModelRegistry> {
    Arc::new(ModelRegistry::build(&FixedCredentialProbe::granting(
        providers,
    )))
}

fn all_model_ids(registry: &ModelRegistry) -> Vec<String> {
    registry
        .list(&ModelFilter::default())
        .iter()
        .map(|e| e.model_id.clone())
        .collect()
}

#[test]
fn offline_decisions_never_resolve_to_internet_models() {
    // Sweep every catalog model and every credential configuration subset
    // that matters: full fleet, externals only, nothing.
    for providers in [ALL_PROVIDERS, &[ProviderId::Anthropic, ProviderId::OpenAi][..], &[][..]] {
        let registry = registry(providers);
        let engine = PolicyEngine::new(registry.clone());

        for model in all_model_ids(&registry) {
            let decision =
                engine.evaluate(&PolicyRequest::new(RuntimeMode::RestrictedOffline, &model));
            if decision.allowed {
                let effective = registry
                    .lookup(&decision.effective_model_id)
                    .expect("effective model must be in catalog");
                assert!(
                    !effective.requires_internet,
                    "offline mode allowed internet model '{}' for request '{model}'",
                    effective.model_id
                );
            }
        }
    }
}

#[test]
fn failed_redaction_on_raw_payload_always_denies_external_dispatch() {
    let registry = registry(ALL_PROVIDERS);
    let engine = PolicyEngine::new(registry.clone());

    for model in all_model_ids(&registry) {
        let entry = registry.lookup(&model).expect("catalog entry");
        if entry.provider_kind != ProviderKind::ExternalApi
            || entry.data_policy == chambers_core::DataPolicy::Unrestricted
        {
            continue;
        }

        // Other fields must not rescue the request.
        for sensitivity in [
            CaseSensitivity::Standard,
            CaseSensitivity::Confidential,
            CaseSensitivity::PiiHeavy,
        ] {
            let mut request = PolicyRequest::new(RuntimeMode::Online, &model);
            request.payload_class = PayloadClass::Raw;
            request.redaction_status = Some(RedactionStatus::Failed);
            request.case_sensitivity = sensitivity;

            let decision = engine.evaluate(&request);
            assert!(
                !decision.allowed,
                "raw+failed redaction must deny for '{model}' ({sensitivity:?})"
            );
        }
    }
}

#[test]
fn sealed_matters_never_land_on_external_providers() {
    for providers in [ALL_PROVIDERS, &[ProviderId::Anthropic][..]] {
        let registry = registry(providers);
        let engine = PolicyEngine::new(registry.clone());

        for model in all_model_ids(&registry) {
            for sensitivity in [CaseSensitivity::Privileged, CaseSensitivity::Sealed] {
                let mut request = PolicyRequest::new(RuntimeMode::Online, &model);
                request.case_sensitivity = sensitivity;

                let decision = engine.evaluate(&request);
                if decision.allowed {
                    let effective = registry
                        .lookup(&decision.effective_model_id)
                        .expect("effective model must be in catalog");
                    assert_ne!(
                        effective.provider_kind,
                        ProviderKind::ExternalApi,
                        "{sensitivity:?} matter reached external model '{}'",
                        effective.model_id
                    );
                }
            }
        }
    }
}

#[test]
fn evaluation_is_pure_across_repeated_sweeps() {
    let registry = registry(ALL_PROVIDERS);
    let engine = PolicyEngine::new(registry.clone());

    for model in all_model_ids(&registry) {
        for mode in [RuntimeMode::Online, RuntimeMode::RestrictedOffline] {
            let mut request = PolicyRequest::new(mode, &model);
            request.payload_class = PayloadClass::Raw;
            request.case_sensitivity = CaseSensitivity::PiiHeavy;

            let first = engine.evaluate(&request);
            let second = engine.evaluate(&request);
            assert_eq!(first, second, "evaluate must be idempotent for '{model}'");
        }
    }
}
