//! Bounded, append-only audit log of policy decisions.
//!
//! Every decision the gateway acts on is recorded here for compliance
//! review, whether or not the dispatch itself succeeds. Entries are never
//! edited or removed individually; the only mutation is appending, with
//! the oldest entry evicted once the buffer is full. The log is in-memory
//! and volatile across restarts by design.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::Mutex;

use chrono::DateTime;
use chrono::Utc;
use serde::Serialize;

use crate::model_registry::ModelRegistry;
use crate::model_registry::ProviderId;
use crate::policy::CaseSensitivity;
use crate::policy::PayloadClass;
use crate::policy::PolicyDecision;
use crate::policy::PolicyRequest;
use crate::policy::RedactionStatus;
use crate::policy::RemediationStep;
use crate::runtime::RuntimeMode;

/// Default maximum number of audit entries kept.
pub const DEFAULT_AUDIT_CAPACITY: usize = 500;

/// One recorded policy decision. Immutable after append.
#[derive(Debug, Clone, Serialize)]
pub struct PolicyAuditEntry {
    pub timestamp: DateTime<Utc>,

    // Request snapshot.
    pub mode: RuntimeMode,
    pub requested_model_id: String,
    pub case_sensitivity: CaseSensitivity,
    pub payload_class: PayloadClass,
    pub redaction_status: Option<RedactionStatus>,
    pub user_id: Option<String>,
    pub matter_id: Option<String>,
    pub caller: Option<String>,

    // Decision outcome.
    pub allowed: bool,
    pub effective_model_id: String,
    pub effective_provider: Option<ProviderId>,
    pub required_steps: Vec<RemediationStep>,
    pub reason: String,
    pub was_fallback: bool,

    /// Whether this decision permitted data to leave the machine: allowed
    /// and the effective model requires internet.
    pub external_call_made: bool,
}

/// Ring buffer of policy decisions, capped at a fixed capacity.
#[derive(Clone)]
pub struct PolicyAuditLog {
    inner: Arc<AuditInner>,
}

struct AuditInner {
    entries: Mutex<VecDeque<PolicyAuditEntry>>,
    capacity: usize,
    registry: Arc<ModelRegistry>,
}

impl PolicyAuditLog {
    /// Creates a log with the default capacity. The registry is consulted
    /// only to derive `external_call_made` for each entry.
    pub fn new(registry: Arc<ModelRegistry>) -> Self {
        Self::with_capacity(registry, DEFAULT_AUDIT_CAPACITY)
    }

    pub fn with_capacity(registry: Arc<ModelRegistry>, capacity: usize) -> Self {
        Self {
            inner: Arc::new(AuditInner {
                entries: Mutex::new(VecDeque::with_capacity(capacity)),
                capacity,
                registry,
            }),
        }
    }

    /// Appends one entry, evicting the oldest when the buffer is full.
    pub fn record(&self, request: &PolicyRequest, decision: &PolicyDecision) {
        let external_call_made = decision.allowed
            && self
                .inner
                .registry
                .lookup(&decision.effective_model_id)
                .is_some_and(|entry| entry.requires_internet);

        let entry = PolicyAuditEntry {
            timestamp: Utc::now(),
            mode: request.mode,
            requested_model_id: request.requested_model_id.clone(),
            case_sensitivity: request.case_sensitivity,
            payload_class: request.payload_class,
            redaction_status: request.redaction_status,
            user_id: request.user_id.clone(),
            matter_id: request.matter_id.clone(),
            caller: request.caller.clone(),
            allowed: decision.allowed,
            effective_model_id: decision.effective_model_id.clone(),
            effective_provider: decision.effective_provider,
            required_steps: decision.required_steps.clone(),
            reason: decision.reason.clone(),
            was_fallback: decision.was_fallback,
            external_call_made,
        };

        let mut entries = self.lock();
        entries.push_back(entry);
        while entries.len() > self.inner.capacity {
            entries.pop_front();
        }
    }

    /// Returns up to `limit` entries, newest first. A non-positive limit
    /// returns an empty list.
    pub fn query(&self, limit: isize) -> Vec<PolicyAuditEntry> {
        if limit <= 0 {
            return Vec::new();
        }
        self.lock()
            .iter()
            .rev()
            .take(limit as usize)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, VecDeque<PolicyAuditEntry>> {
        match self.inner.entries.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}
