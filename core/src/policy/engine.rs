//! The policy decision engine.
//!
//! `evaluate` is a pure function over the request and the model registry:
//! it records nothing and mutates nothing, so identical requests against
//! the same registry yield identical decisions. The gateway is responsible
//! for auditing every decision it acts on.
//!
//! Rule order is load-bearing. The failed-redaction hard deny must
//! short-circuit everything else, and the privileged/sealed gate must run
//! before the payload gate so sealed matters can never end in a
//! "just add a remediation step" outcome.

use std::sync::Arc;

use crate::model_registry::Capability;
use crate::model_registry::DataPolicy;
use crate::model_registry::ModelCatalogEntry;
use crate::model_registry::ModelRegistry;
use crate::model_registry::ProviderKind;
use crate::policy::CaseSensitivity;
use crate::policy::PayloadClass;
use crate::policy::PolicyDecision;
use crate::policy::PolicyRequest;
use crate::policy::RedactionStatus;
use crate::policy::RemediationStep;
use crate::runtime::RuntimeMode;

/// Evaluates policy requests against the model registry.
#[derive(Clone)]
pub struct PolicyEngine {
    registry: Arc<ModelRegistry>,
}

impl PolicyEngine {
    pub fn new(registry: Arc<ModelRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &ModelRegistry {
        &self.registry
    }

    /// Decides whether and where a request may dispatch. First matching
    /// rule wins.
    pub fn evaluate(&self, request: &PolicyRequest) -> PolicyDecision {
        let requested = request.requested_model_id.as_str();

        // Rule 1: unknown model. Unknown and unavailable share the same
        // fallback path.
        let Some(entry) = self.registry.lookup(requested) else {
            return match self.registry.preferred_local_fallback() {
                Some(fallback) => allow_fallback(
                    request,
                    fallback,
                    format!(
                        "model '{requested}' not found in catalog; routed to '{}'",
                        fallback.model_id
                    ),
                ),
                None => deny(
                    request,
                    Vec::new(),
                    format!("model '{requested}' not found and no fallback is available"),
                ),
            };
        };

        // Rule 2: restricted offline mode. A local model passes without any
        // further gating since nothing leaves the machine.
        if request.mode == RuntimeMode::RestrictedOffline {
            if entry.requires_internet {
                return match self.registry.preferred_local_fallback() {
                    Some(fallback) if !fallback.requires_internet => allow_fallback(
                        request,
                        fallback,
                        format!(
                            "offline mode active; '{requested}' requires internet, routed to '{}'",
                            fallback.model_id
                        ),
                    ),
                    _ => deny(
                        request,
                        Vec::new(),
                        "no offline model available".to_string(),
                    ),
                };
            }
            return allow(
                request,
                entry,
                Vec::new(),
                "offline mode: local model permitted".to_string(),
            );
        }

        // Rule 3: online but the model has no credentials behind it.
        if !entry.available {
            return match self.registry.preferred_local_fallback() {
                Some(fallback) => allow_fallback(
                    request,
                    fallback,
                    format!(
                        "model '{requested}' unavailable (missing credentials); routed to '{}'",
                        fallback.model_id
                    ),
                ),
                None => deny(
                    request,
                    Vec::new(),
                    format!("model '{requested}' unavailable and no fallback is available"),
                ),
            };
        }

        // Rule 4: privileged/sealed matters never reach an external API.
        let sealed_case = matches!(
            request.case_sensitivity,
            CaseSensitivity::Privileged | CaseSensitivity::Sealed
        );
        if sealed_case && entry.provider_kind == ProviderKind::ExternalApi {
            return match self.local_chat_fallback() {
                Some(fallback) => allow_fallback(
                    request,
                    fallback,
                    format!(
                        "case is {:?}-classified; external model '{requested}' replaced by local '{}'",
                        request.case_sensitivity, fallback.model_id
                    ),
                ),
                None => {
                    // Informational only: the denial already blocks dispatch.
                    let steps = if request.payload_class == PayloadClass::Raw {
                        vec![RemediationStep::Redact, RemediationStep::Sanitize]
                    } else {
                        Vec::new()
                    };
                    deny(
                        request,
                        steps,
                        format!(
                            "case is {:?}-classified and no local model is available",
                            request.case_sensitivity
                        ),
                    )
                }
            };
        }

        let mut steps: Vec<RemediationStep> = Vec::new();

        // Rule 5: raw payloads headed to an external model that is not
        // contractually cleared for them.
        if entry.provider_kind == ProviderKind::ExternalApi
            && request.payload_class == PayloadClass::Raw
            && entry.data_policy != DataPolicy::Unrestricted
        {
            match request.redaction_status {
                Some(RedactionStatus::Failed) => {
                    return deny(
                        request,
                        Vec::new(),
                        "redaction failed — cannot transmit raw data externally".to_string(),
                    );
                }
                Some(RedactionStatus::Passed) => {}
                Some(RedactionStatus::NotRun) | None => push_step(&mut steps, RemediationStep::Redact),
            }
        }

        // Rule 6: PII-heavy matters want a PII wash unless the payload is
        // already sanitized. Additive, never blocking.
        if request.case_sensitivity == CaseSensitivity::PiiHeavy
            && request.payload_class != PayloadClass::Sanitized
        {
            push_step(&mut steps, RemediationStep::PiiWash);
        }

        // Rule 7: allow with whatever accumulated.
        allow(request, entry, steps, "request permitted".to_string())
    }

    /// Rule 4 needs a fallback that actually keeps data local; an external
    /// chat model would defeat the gate it serves.
    fn local_chat_fallback(&self) -> Option<&ModelCatalogEntry> {
        self.registry
            .preferred_local_fallback()
            .filter(|e| e.provider_kind.is_local() && e.supports(Capability::Chat))
    }
}

fn allow(
    request: &PolicyRequest,
    entry: &ModelCatalogEntry,
    required_steps: Vec<RemediationStep>,
    reason: String,
) -> PolicyDecision {
    PolicyDecision {
        allowed: true,
        effective_model_id: entry.model_id.clone(),
        effective_provider: Some(entry.provider),
        required_steps,
        reason,
        was_fallback: false,
        original_model_id: request.requested_model_id.clone(),
    }
}

fn allow_fallback(
    request: &PolicyRequest,
    entry: &ModelCatalogEntry,
    reason: String,
) -> PolicyDecision {
    PolicyDecision {
        allowed: true,
        effective_model_id: entry.model_id.clone(),
        effective_provider: Some(entry.provider),
        required_steps: Vec::new(),
        reason,
        was_fallback: true,
        original_model_id: request.requested_model_id.clone(),
    }
}

fn deny(
    request: &PolicyRequest,
    required_steps: Vec<RemediationStep>,
    reason: String,
) -> PolicyDecision {
    PolicyDecision {
        allowed: false,
        effective_model_id: request.requested_model_id.clone(),
        effective_provider: None,
        required_steps,
        reason,
        was_fallback: false,
        original_model_id: request.requested_model_id.clone(),
    }
}

fn push_step(steps: &mut Vec<RemediationStep>, step: RemediationStep) {
    if !steps.contains(&step) {
        steps.push(step);
    }
}
