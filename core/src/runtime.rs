//! Shared runtime mode and model selection.
//!
//! The gateway reads the runtime mode from an injected handle rather than
//! process-wide globals, so parallel tests and future multi-tenant callers
//! cannot contaminate each other.

use std::sync::Arc;
use std::sync::RwLock;

use serde::Deserialize;
use serde::Serialize;

use crate::model_registry::DEFAULT_MODEL;

/// Global switch between external-API dispatch and local-only dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuntimeMode {
    /// External providers allowed, subject to policy.
    Online,
    /// Only local/self-hosted models may serve requests.
    RestrictedOffline,
}

#[derive(Debug)]
struct RuntimeInner {
    mode: RuntimeMode,
    selected_model: String,
}

/// Cloneable handle to the runtime mode and the user-selected model.
#[derive(Debug, Clone)]
pub struct RuntimeState {
    inner: Arc<RwLock<RuntimeInner>>,
}

impl Default for RuntimeState {
    fn default() -> Self {
        Self::new(RuntimeMode::Online, DEFAULT_MODEL)
    }
}

impl RuntimeState {
    pub fn new(mode: RuntimeMode, selected_model: &str) -> Self {
        Self {
            inner: Arc::new(RwLock::new(RuntimeInner {
                mode,
                selected_model: selected_model.to_string(),
            })),
        }
    }

    pub fn mode(&self) -> RuntimeMode {
        self.read().mode
    }

    pub fn set_mode(&self, mode: RuntimeMode) {
        let mut inner = self.write();
        if inner.mode != mode {
            tracing::info!(mode = ?mode, "runtime mode changed");
            inner.mode = mode;
        }
    }

    pub fn selected_model(&self) -> String {
        self.read().selected_model.clone()
    }

    pub fn set_selected_model(&self, model_id: &str) {
        self.write().selected_model = model_id.to_string();
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, RuntimeInner> {
        match self.inner.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, RuntimeInner> {
        match self.inner.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}
