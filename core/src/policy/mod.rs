//! Policy types shared by the decision engine, audit log, and gateway.

pub mod audit;
pub mod engine;

use serde::Deserialize;
use serde::Serialize;

use crate::model_registry::ProviderId;
use crate::runtime::RuntimeMode;

/// Classification of the legal matter governing which models may process
/// its data.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaseSensitivity {
    Privileged,
    Sealed,
    PiiHeavy,
    Confidential,
    #[default]
    Standard,
}

/// Sensitivity of the specific content being sent in one call, independent
/// of the case's classification.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PayloadClass {
    Raw,
    #[default]
    Derived,
    Sanitized,
    Public,
}

/// Whether redaction has been run over the payload, and its outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RedactionStatus {
    NotRun,
    Passed,
    Failed,
}

/// A required pre-processing action the caller must satisfy. Distinct from
/// outright denial.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemediationStep {
    Redact,
    Sanitize,
    PiiWash,
}

/// One policy evaluation request. Ephemeral, one per AI call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyRequest {
    pub mode: RuntimeMode,
    pub requested_model_id: String,
    #[serde(default)]
    pub case_sensitivity: CaseSensitivity,
    #[serde(default)]
    pub payload_class: PayloadClass,
    #[serde(default)]
    pub redaction_status: Option<RedactionStatus>,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub matter_id: Option<String>,
    /// Free-text origin tag for telemetry.
    #[serde(default)]
    pub caller: Option<String>,
}

impl PolicyRequest {
    pub fn new(mode: RuntimeMode, requested_model_id: &str) -> Self {
        Self {
            mode,
            requested_model_id: requested_model_id.to_string(),
            case_sensitivity: CaseSensitivity::default(),
            payload_class: PayloadClass::default(),
            redaction_status: None,
            user_id: None,
            matter_id: None,
            caller: None,
        }
    }
}

/// Outcome of one policy evaluation.
///
/// When `allowed` is false the caller must not dispatch to any model;
/// `required_steps` on a denial are informational only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyDecision {
    pub allowed: bool,
    pub effective_model_id: String,
    /// Absent when the decision denies a model the catalog does not know.
    pub effective_provider: Option<ProviderId>,
    /// Ordered, deduplicated remediation steps.
    pub required_steps: Vec<RemediationStep>,
    /// Human-readable justification, surfaced to the caller on denial.
    pub reason: String,
    pub was_fallback: bool,
    pub original_model_id: String,
}

impl PolicyDecision {
    pub fn requires(&self, step: RemediationStep) -> bool {
        self.required_steps.contains(&step)
    }
}
