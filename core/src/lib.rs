//! Root of the `chambers-core` library: the AI governance and routing core
//! of the Chambers practice-management platform.
//!
//! Every AI request flows through [`gateway::RoutingGateway`], which gates
//! the request through the policy engine, substitutes models transparently
//! when the requested one is unavailable or disallowed, dispatches to the
//! matching vendor adapter, and records the decision and the operation in
//! bounded in-process logs.

// Prevent accidental direct writes to stdout/stderr in library code. All
// user-visible output must go through the tracing stack.
#![deny(clippy::print_stdout, clippy::print_stderr)]

pub mod adapters;
pub mod config;
pub mod credentials;
pub mod error;
pub mod gateway;
pub mod model_registry;
pub mod policy;
pub mod runtime;

pub use adapters::AdapterRegistry;
pub use adapters::ChatAdapter;
pub use adapters::ChatMessage;
pub use adapters::DispatchConfig;
pub use config::CoreConfig;
pub use config::load_config;
pub use credentials::CredentialProbe;
pub use credentials::EnvCredentialProbe;
pub use error::GatewayError;
pub use gateway::ChunkStream;
pub use gateway::RoutingGateway;
pub use gateway::StreamChunk;
pub use model_registry::Capability;
pub use model_registry::DataPolicy;
pub use model_registry::ModelCatalogEntry;
pub use model_registry::ModelFilter;
pub use model_registry::ModelRegistry;
pub use model_registry::ProviderId;
pub use model_registry::ProviderKind;
pub use policy::CaseSensitivity;
pub use policy::PayloadClass;
pub use policy::PolicyDecision;
pub use policy::PolicyRequest;
pub use policy::RedactionStatus;
pub use policy::RemediationStep;
pub use policy::audit::PolicyAuditLog;
pub use policy::engine::PolicyEngine;
pub use runtime::RuntimeMode;
pub use runtime::RuntimeState;
