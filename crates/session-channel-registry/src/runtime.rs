//! Explicit runtime lifecycle around a session registry.

use std::sync::{Arc, PoisonError, RwLock};

use crate::SessionRegistry;

/// Cloneable handle to the running engine's registry.
///
/// Code that may run before startup or after shutdown asks
/// [`exists`](Self::exists) instead of assuming a registry is there.
#[derive(Debug, Clone, Default)]
pub struct RuntimeHandle {
    registry: Arc<RwLock<Option<Arc<SessionRegistry>>>>,
}

impl RuntimeHandle {
    /// Create an uninitialized handle.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a handle that is already running `registry`.
    #[must_use]
    pub fn with_registry(registry: Arc<SessionRegistry>) -> Self {
        Self {
            registry: Arc::new(RwLock::new(Some(registry))),
        }
    }

    /// Start the runtime, returning its registry.
    ///
    /// Idempotent: a running runtime keeps its existing registry.
    pub fn init(&self) -> Arc<SessionRegistry> {
        let mut slot = self.registry.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(registry) = slot.as_ref() {
            return Arc::clone(registry);
        }
        let registry = Arc::new(SessionRegistry::new());
        *slot = Some(Arc::clone(&registry));
        tracing::info!("Runtime started");
        registry
    }

    /// Stop the runtime, tearing down every session.
    pub fn teardown(&self) {
        let registry = self
            .registry
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(registry) = registry {
            registry.shutdown();
            tracing::info!("Runtime stopped");
        }
    }

    /// Whether the runtime is running.
    #[must_use]
    pub fn exists(&self) -> bool {
        self.registry
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// The running registry, if any.
    #[must_use]
    pub fn get(&self) -> Option<Arc<SessionRegistry>> {
        self.registry
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use session_channel_core::UserInfo;

    use super::*;

    #[test]
    fn test_lifecycle() {
        let runtime = RuntimeHandle::new();
        assert!(!runtime.exists());
        assert!(runtime.get().is_none());

        let registry = runtime.init();
        assert!(runtime.exists());
        assert!(Arc::ptr_eq(&registry, &runtime.init()));

        let (id, _rx) = registry.create_session(UserInfo::new());
        let clone = runtime.clone();
        clone.teardown();

        assert!(!runtime.exists());
        assert!(registry.get(id).is_err());
        // Teardown twice is harmless.
        runtime.teardown();
    }
}
