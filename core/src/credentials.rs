//! Credential presence detection.
//!
//! Availability in the model registry is derived from whether a provider's
//! credentials exist in the environment, checked once at registry build
//! time. Adapters re-check at dispatch time and fail with a configuration
//! error when credentials have gone missing in between.

use crate::model_registry::ProviderId;

/// Environment variable holding the Anthropic API key.
pub const ANTHROPIC_API_KEY_ENV: &str = "ANTHROPIC_API_KEY";

/// Environment variable holding the OpenAI API key.
pub const OPENAI_API_KEY_ENV: &str = "OPENAI_API_KEY";

/// Environment variable pointing at a self-hosted Ollama runner.
pub const OLLAMA_BASE_URL_ENV: &str = "OLLAMA_BASE_URL";

/// Answers whether credentials are present for a provider.
///
/// Injected into [`crate::model_registry::ModelRegistry::build`] so tests
/// can pin availability without touching the process environment.
pub trait CredentialProbe: Send + Sync {
    fn has_credential(&self, provider: ProviderId) -> bool;
}

/// Production probe: reads provider credentials from the environment.
///
/// The embedded provider needs no credentials and is always present; the
/// local runner counts as configured when its base URL is set.
#[derive(Debug, Default, Clone, Copy)]
pub struct EnvCredentialProbe;

impl EnvCredentialProbe {
    pub fn new() -> Self {
        Self
    }

    fn env_present(key: &str) -> bool {
        std::env::var(key).is_ok_and(|value| !value.trim().is_empty())
    }
}

impl CredentialProbe for EnvCredentialProbe {
    fn has_credential(&self, provider: ProviderId) -> bool {
        let present = match provider {
            ProviderId::Anthropic => Self::env_present(ANTHROPIC_API_KEY_ENV),
            ProviderId::OpenAi => Self::env_present(OPENAI_API_KEY_ENV),
            ProviderId::Ollama => Self::env_present(OLLAMA_BASE_URL_ENV),
            ProviderId::Embedded => true,
        };
        if !present {
            tracing::debug!(provider = %provider, "no credentials found in environment");
        }
        present
    }
}

/// Test probe granting a fixed set of providers.
#[derive(Debug, Default, Clone)]
pub struct FixedCredentialProbe {
    granted: Vec<ProviderId>,
}

impl FixedCredentialProbe {
    pub fn granting(providers: &[ProviderId]) -> Self {
        Self {
            granted: providers.to_vec(),
        }
    }
}

impl CredentialProbe for FixedCredentialProbe {
    fn has_credential(&self, provider: ProviderId) -> bool {
        self.granted.contains(&provider)
    }
}
