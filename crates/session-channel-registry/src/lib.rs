//! Session registry for live client sessions.
//!
//! Provides:
//! - `SessionRegistry` - Authoritative map of active sessions
//! - `RuntimeHandle` - Explicit init/teardown handle around a registry

pub mod registry;
pub mod runtime;

pub use registry::{RegistryError, Session, SessionRegistry};
pub use runtime::RuntimeHandle;
