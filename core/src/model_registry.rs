//! Static model catalog with credential-derived availability.
//!
//! The catalog is declared in code; `available` is computed once from
//! credential presence when the registry is built and never mutated within
//! a registry instance. Callers that need fresh availability build a new
//! registry and swap the shared handle.

use std::collections::BTreeSet;
use std::fmt;

use serde::Deserialize;
use serde::Serialize;

use crate::credentials::CredentialProbe;

/// Vendor tag identifying which adapter serves a model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderId {
    Anthropic,
    OpenAi,
    Ollama,
    Embedded,
}

impl ProviderId {
    pub fn as_str(self) -> &'static str {
        match self {
            ProviderId::Anthropic => "anthropic",
            ProviderId::OpenAi => "openai",
            ProviderId::Ollama => "ollama",
            ProviderId::Embedded => "embedded",
        }
    }
}

impl fmt::Display for ProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a provider is hosted, which in turn governs what data may reach it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    ExternalApi,
    LocalRunner,
    EmbeddedLocal,
}

impl ProviderKind {
    pub fn is_local(self) -> bool {
        matches!(self, ProviderKind::LocalRunner | ProviderKind::EmbeddedLocal)
    }
}

/// What a model can do. Kept as a set; declaration order is irrelevant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    Chat,
    Vision,
    Embeddings,
    Rerank,
    Transcription,
    Code,
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Capability::Chat => "chat",
            Capability::Vision => "vision",
            Capability::Embeddings => "embeddings",
            Capability::Rerank => "rerank",
            Capability::Transcription => "transcription",
            Capability::Code => "code",
        };
        f.write_str(name)
    }
}

/// Data-handling policy: what payload sensitivity may reach this model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataPolicy {
    /// May only ever run on-premises data paths.
    LocalOnly,
    /// External transmission acceptable once content is sanitized.
    SanitizedOk,
    /// Contractually cleared for raw client data (e.g. firm-negotiated
    /// enterprise terms).
    Unrestricted,
}

/// One entry in the model catalog.
#[derive(Debug, Clone, Serialize)]
pub struct ModelCatalogEntry {
    pub model_id: String,
    pub display_name: String,
    pub provider: ProviderId,
    pub provider_kind: ProviderKind,
    pub capabilities: BTreeSet<Capability>,
    pub data_policy: DataPolicy,
    pub requires_internet: bool,
    /// Context window in tokens.
    pub max_context: u64,
    /// Maximum output tokens per request.
    pub max_tokens: u64,
    /// Derived from credential presence at registry build time.
    pub available: bool,
}

impl ModelCatalogEntry {
    pub fn supports(&self, capability: Capability) -> bool {
        self.capabilities.contains(&capability)
    }
}

/// Filter for [`ModelRegistry::list`].
#[derive(Debug, Clone, Copy, Default)]
pub struct ModelFilter {
    pub requires_internet: Option<bool>,
    pub provider_kind: Option<ProviderKind>,
    pub available_only: bool,
}

/// Catalog declaration. Order matters: `preferred_local_fallback` breaks
/// ties by declaration order.
struct CatalogSpec {
    model_id: &'static str,
    display_name: &'static str,
    provider: ProviderId,
    provider_kind: ProviderKind,
    capabilities: &'static [Capability],
    data_policy: DataPolicy,
    requires_internet: bool,
    max_context: u64,
    max_tokens: u64,
}

const CATALOG: &[CatalogSpec] = &[
    CatalogSpec {
        model_id: "ollama-llama3",
        display_name: "Llama 3 (self-hosted)",
        provider: ProviderId::Ollama,
        provider_kind: ProviderKind::LocalRunner,
        capabilities: &[Capability::Chat, Capability::Code],
        data_policy: DataPolicy::LocalOnly,
        requires_internet: false,
        max_context: 8_192,
        max_tokens: 4_096,
    },
    CatalogSpec {
        model_id: "ollama-llava",
        display_name: "LLaVA (self-hosted vision)",
        provider: ProviderId::Ollama,
        provider_kind: ProviderKind::LocalRunner,
        capabilities: &[Capability::Chat, Capability::Vision],
        data_policy: DataPolicy::LocalOnly,
        requires_internet: false,
        max_context: 4_096,
        max_tokens: 2_048,
    },
    CatalogSpec {
        model_id: "chambers-mini",
        display_name: "Chambers embedded assistant",
        provider: ProviderId::Embedded,
        provider_kind: ProviderKind::EmbeddedLocal,
        capabilities: &[Capability::Chat],
        data_policy: DataPolicy::LocalOnly,
        requires_internet: false,
        max_context: 4_096,
        max_tokens: 1_024,
    },
    CatalogSpec {
        model_id: "claude-sonnet-4-5",
        display_name: "Claude Sonnet 4.5",
        provider: ProviderId::Anthropic,
        provider_kind: ProviderKind::ExternalApi,
        capabilities: &[Capability::Chat, Capability::Vision, Capability::Code],
        data_policy: DataPolicy::SanitizedOk,
        requires_internet: true,
        max_context: 200_000,
        max_tokens: 64_000,
    },
    CatalogSpec {
        model_id: "claude-haiku-4-5",
        display_name: "Claude Haiku 4.5",
        provider: ProviderId::Anthropic,
        provider_kind: ProviderKind::ExternalApi,
        capabilities: &[Capability::Chat, Capability::Code],
        data_policy: DataPolicy::SanitizedOk,
        requires_internet: true,
        max_context: 200_000,
        max_tokens: 32_000,
    },
    CatalogSpec {
        model_id: "gpt-4o",
        display_name: "GPT-4o",
        provider: ProviderId::OpenAi,
        provider_kind: ProviderKind::ExternalApi,
        capabilities: &[Capability::Chat, Capability::Vision, Capability::Code],
        data_policy: DataPolicy::SanitizedOk,
        requires_internet: true,
        max_context: 128_000,
        max_tokens: 16_384,
    },
    CatalogSpec {
        model_id: "gpt-4o-firm",
        display_name: "GPT-4o (firm enterprise agreement)",
        provider: ProviderId::OpenAi,
        provider_kind: ProviderKind::ExternalApi,
        capabilities: &[Capability::Chat, Capability::Code],
        data_policy: DataPolicy::Unrestricted,
        requires_internet: true,
        max_context: 128_000,
        max_tokens: 16_384,
    },
];

/// Default model requested when callers do not name one.
pub const DEFAULT_MODEL: &str = "claude-sonnet-4-5";

/// Process-lifetime catalog of known models.
///
/// Lookup and filter only; no side effects. Availability is recomputed only
/// when a new registry is built.
#[derive(Debug, Clone)]
pub struct ModelRegistry {
    entries: Vec<ModelCatalogEntry>,
}

impl ModelRegistry {
    /// Builds the registry, deriving each entry's availability from the
    /// credential probe.
    pub fn build(probe: &dyn CredentialProbe) -> Self {
        let entries = CATALOG
            .iter()
            .map(|spec| {
                // Local entries must never claim internet dependency or an
                // external data policy; the catalog is declared by hand, so
                // guard the invariant here.
                debug_assert!(
                    !spec.provider_kind.is_local()
                        || (!spec.requires_internet && spec.data_policy == DataPolicy::LocalOnly),
                    "local catalog entry '{}' violates locality invariant",
                    spec.model_id,
                );

                let available = probe.has_credential(spec.provider);
                ModelCatalogEntry {
                    model_id: spec.model_id.to_string(),
                    display_name: spec.display_name.to_string(),
                    provider: spec.provider,
                    provider_kind: spec.provider_kind,
                    capabilities: spec.capabilities.iter().copied().collect(),
                    data_policy: spec.data_policy,
                    requires_internet: spec.requires_internet,
                    max_context: spec.max_context,
                    max_tokens: spec.max_tokens,
                    available,
                }
            })
            .collect();

        let registry = Self { entries };
        tracing::debug!(
            available = registry.list(&ModelFilter { available_only: true, ..Default::default() }).len(),
            total = registry.entries.len(),
            "model registry built"
        );
        registry
    }

    pub fn lookup(&self, model_id: &str) -> Option<&ModelCatalogEntry> {
        self.entries.iter().find(|e| e.model_id == model_id)
    }

    pub fn list(&self, filter: &ModelFilter) -> Vec<&ModelCatalogEntry> {
        self.entries
            .iter()
            .filter(|e| {
                filter
                    .requires_internet
                    .is_none_or(|wanted| e.requires_internet == wanted)
                    && filter
                        .provider_kind
                        .is_none_or(|kind| e.provider_kind == kind)
                    && (!filter.available_only || e.available)
            })
            .collect()
    }

    /// Deterministic local fallback: the first available local-kind entry
    /// with chat capability in declaration order; failing that, any
    /// available chat-capable entry; failing that, the first available
    /// entry; else none.
    pub fn preferred_local_fallback(&self) -> Option<&ModelCatalogEntry> {
        self.entries
            .iter()
            .find(|e| e.available && e.provider_kind.is_local() && e.supports(Capability::Chat))
            .or_else(|| {
                self.entries
                    .iter()
                    .find(|e| e.available && e.supports(Capability::Chat))
            })
            .or_else(|| self.entries.iter().find(|e| e.available))
    }
}
