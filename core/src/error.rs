//! Error taxonomy for the routing gateway.

use thiserror::Error;

use crate::adapters::AdapterError;
use crate::model_registry::Capability;
use crate::model_registry::ProviderId;
use crate::policy::PolicyDecision;

/// Errors surfaced by the non-streaming gateway entry points.
///
/// Streaming calls never return these across the stream boundary; adapter
/// and configuration failures are converted into a terminal error chunk
/// instead.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// The policy engine refused dispatch. Carries the full decision so the
    /// caller can display the reason and any remediation steps.
    #[error("policy denied dispatch: {}", decision.reason)]
    PolicyDenied { decision: Box<PolicyDecision> },

    /// Credentials missing for the resolved provider. Never retried.
    #[error("provider configuration error: {0}")]
    Configuration(String),

    /// Vendor API failure mid-call.
    #[error("adapter error: {0}")]
    Adapter(String),

    /// No adapter registered for the effective provider. Should not occur
    /// once policy has resolved a model, but dispatch handles it anyway.
    #[error("no adapter registered for provider '{0}'")]
    UnknownProvider(ProviderId),

    /// The effective model lacks a capability the operation requires.
    #[error("model '{model}' does not support {capability}")]
    CapabilityMissing {
        model: String,
        capability: Capability,
    },
}

impl From<AdapterError> for GatewayError {
    fn from(err: AdapterError) -> Self {
        match err {
            AdapterError::NotAuthenticated(message) => GatewayError::Configuration(message),
            other => GatewayError::Adapter(other.to_string()),
        }
    }
}
