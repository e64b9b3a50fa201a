//! Session registry for live client sessions.

use std::{
    collections::HashMap,
    sync::{Arc, PoisonError, RwLock},
    time::{SystemTime, UNIX_EPOCH},
};

use session_channel_core::{
    AuthState, ForwardChannel, ForwardReceiver, ScriptRunContext, SessionId, SessionState,
    SharedSessionState, UserInfo,
};
use uuid::Uuid;

/// Session registry error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("Session not found: {0}")]
    SessionNotFound(SessionId),
    #[error("Session already exists: {0}")]
    AlreadyExists(SessionId),
}

/// State of one live session. Owned by the registry.
#[derive(Debug)]
pub struct Session {
    id: SessionId,
    state: SharedSessionState,
    channel: Arc<ForwardChannel>,
    created_at: i64,
}

impl Session {
    #[must_use]
    pub const fn id(&self) -> SessionId {
        self.id
    }

    /// Snapshot of the server-side user info.
    #[must_use]
    pub fn user_info(&self) -> UserInfo {
        self.state().user_info
    }

    #[must_use]
    pub fn auth_state(&self) -> AuthState {
        self.state().auth_state
    }

    /// Consistent snapshot of user info and auth state.
    #[must_use]
    pub fn state(&self) -> SessionState {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Creation timestamp (Unix epoch seconds).
    #[must_use]
    pub const fn created_at(&self) -> i64 {
        self.created_at
    }

    /// Whether the session's channel has been closed by teardown.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.channel.is_closed()
    }

    fn set_user_info(&self, info: UserInfo) -> AuthState {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        state.set_user_info(info);
        state.auth_state.clone()
    }

    fn clear_user_info(&self) {
        self.state
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .log_out();
    }
}

fn now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| i64::try_from(d.as_secs()).unwrap_or(i64::MAX))
        .unwrap_or(0)
}

/// Authoritative store of active sessions.
///
/// Lookups and user-info clears share the map's read lock, so distinct
/// sessions never wait on each other. Creation and teardown take the write
/// lock, which keeps a clear from interleaving with the removal and
/// re-registration of the same id.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: RwLock<HashMap<SessionId, Arc<Session>>>,
}

impl SessionRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new session with a fresh id.
    ///
    /// Returns the id and the receiver the transport drains.
    #[must_use]
    pub fn create_session(&self, user_info: UserInfo) -> (SessionId, ForwardReceiver) {
        let mut sessions = self.sessions.write().unwrap_or_else(PoisonError::into_inner);
        let mut id = Uuid::new_v4();
        while sessions.contains_key(&id) {
            id = Uuid::new_v4();
        }
        let rx = Self::insert(&mut sessions, id, user_info);
        (id, rx)
    }

    /// Register a session under a caller-chosen id, e.g. on reconnect.
    ///
    /// # Errors
    /// Returns [`RegistryError::AlreadyExists`] if `id` is live.
    pub fn register(
        &self,
        id: SessionId,
        user_info: UserInfo,
    ) -> Result<ForwardReceiver, RegistryError> {
        let mut sessions = self.sessions.write().unwrap_or_else(PoisonError::into_inner);
        if sessions.contains_key(&id) {
            return Err(RegistryError::AlreadyExists(id));
        }
        Ok(Self::insert(&mut sessions, id, user_info))
    }

    fn insert(
        sessions: &mut HashMap<SessionId, Arc<Session>>,
        id: SessionId,
        user_info: UserInfo,
    ) -> ForwardReceiver {
        let (channel, rx) = ForwardChannel::new(id);
        let session = Session {
            id,
            state: Arc::new(RwLock::new(SessionState::new(user_info))),
            channel: Arc::new(channel),
            created_at: now(),
        };
        sessions.insert(id, Arc::new(session));
        tracing::info!(session_id = %id, active = sessions.len(), "Session registered");
        rx
    }

    /// Look up a session.
    ///
    /// # Errors
    /// Returns [`RegistryError::SessionNotFound`] if absent or torn down.
    pub fn get(&self, id: SessionId) -> Result<Arc<Session>, RegistryError> {
        self.sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .cloned()
            .ok_or(RegistryError::SessionNotFound(id))
    }

    /// Build a script run context bound to a session.
    ///
    /// The context shares the session's state: auth transitions and
    /// clears made through it are seen by [`get`](Self::get).
    ///
    /// # Errors
    /// Returns [`RegistryError::SessionNotFound`] if absent.
    pub fn context(&self, id: SessionId) -> Result<ScriptRunContext, RegistryError> {
        let session = self.get(id)?;
        Ok(ScriptRunContext::attach(
            id,
            Arc::clone(&session.state),
            &session.channel,
        ))
    }

    /// Replace a session's user info once its auth provider resolved.
    ///
    /// # Errors
    /// Returns [`RegistryError::SessionNotFound`] if absent.
    pub fn set_user_info(&self, id: SessionId, user_info: UserInfo) -> Result<(), RegistryError> {
        let sessions = self.sessions.read().unwrap_or_else(PoisonError::into_inner);
        let session = sessions.get(&id).ok_or(RegistryError::SessionNotFound(id))?;
        let state = session.set_user_info(user_info);
        tracing::debug!(session_id = %id, ?state, "User info updated");
        Ok(())
    }

    /// Empty a session's user info. No-op if the session is absent.
    pub fn clear_user_info(&self, id: SessionId) {
        let sessions = self.sessions.read().unwrap_or_else(PoisonError::into_inner);
        match sessions.get(&id) {
            Some(session) => {
                session.clear_user_info();
                tracing::debug!(session_id = %id, "User info cleared");
            }
            None => tracing::debug!(session_id = %id, "Clear for unknown session ignored"),
        }
    }

    /// Tear a session down and close its channel.
    ///
    /// Returns `false` if the session was not registered.
    pub fn remove_session(&self, id: SessionId) -> bool {
        let removed = self
            .sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id);
        match removed {
            Some(session) => {
                session.channel.close();
                tracing::info!(session_id = %id, "Session removed");
                true
            }
            None => false,
        }
    }

    /// Tear down every session.
    pub fn shutdown(&self) {
        let drained: Vec<_> = self
            .sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .drain()
            .collect();
        for (_, session) in &drained {
            session.channel.close();
        }
        tracing::info!(closed = drained.len(), "Session registry shut down");
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Ids of all live sessions.
    #[must_use]
    pub fn session_ids(&self) -> Vec<SessionId> {
        self.sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .copied()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use session_channel_core::ForwardMsg;

    use super::*;

    fn alice() -> UserInfo {
        [("email".to_owned(), Some("alice@co.com".to_owned()))]
            .into_iter()
            .collect()
    }

    #[test]
    fn test_clear_unknown_session_is_noop() {
        let registry = SessionRegistry::new();
        let (id, _rx) = registry.create_session(alice());

        registry.clear_user_info(Uuid::new_v4());
        registry.clear_user_info(Uuid::new_v4());

        assert_eq!(registry.get(id).unwrap().user_info(), alice());
    }

    #[test]
    fn test_clear_is_idempotent() {
        let registry = SessionRegistry::new();
        let (id, _rx) = registry.create_session(alice());

        registry.clear_user_info(id);
        registry.clear_user_info(id);

        let session = registry.get(id).unwrap();
        assert!(session.user_info().is_empty());
        assert_eq!(session.auth_state(), AuthState::LoggedOut);
    }

    #[test]
    fn test_get_missing() {
        let registry = SessionRegistry::new();
        let id = Uuid::new_v4();
        assert_eq!(
            registry.get(id).unwrap_err(),
            RegistryError::SessionNotFound(id)
        );
        assert!(registry.context(id).is_err());
    }

    #[test]
    fn test_register_rejects_live_id() {
        let registry = SessionRegistry::new();
        let id = Uuid::new_v4();
        let _rx = registry.register(id, UserInfo::new()).unwrap();
        assert_eq!(
            registry.register(id, UserInfo::new()).unwrap_err(),
            RegistryError::AlreadyExists(id)
        );
    }

    #[test]
    fn test_set_user_info_authenticates() {
        let registry = SessionRegistry::new();
        let (id, _rx) = registry.create_session(UserInfo::local_placeholder());
        assert_eq!(registry.get(id).unwrap().auth_state(), AuthState::Anonymous);

        registry.set_user_info(id, alice()).unwrap();
        assert_eq!(
            registry.get(id).unwrap().auth_state(),
            AuthState::Authenticated
        );
        assert!(registry.context(id).unwrap().user_info().is_logged_in());

        assert!(registry.set_user_info(Uuid::new_v4(), alice()).is_err());
    }

    #[test]
    fn test_stale_context_never_reaches_reused_id() {
        let registry = SessionRegistry::new();
        let id = Uuid::new_v4();
        let mut old_rx = registry.register(id, UserInfo::new()).unwrap();
        let stale = registry.context(id).unwrap();

        assert!(registry.remove_session(id));
        assert!(!registry.remove_session(id));
        let mut new_rx = registry.register(id, UserInfo::new()).unwrap();

        assert!(!stale.enqueue(ForwardMsg::auth_redirect("/stale")));
        let fresh = registry.context(id).unwrap();
        assert!(fresh.enqueue(ForwardMsg::auth_redirect("/fresh")));

        assert!(old_rx.try_recv_all().is_empty());
        assert_eq!(
            new_rx.try_recv_all(),
            vec![ForwardMsg::auth_redirect("/fresh")]
        );
    }

    #[test]
    fn test_shutdown_closes_everything() {
        let registry = SessionRegistry::new();
        let (a, _ra) = registry.create_session(UserInfo::new());
        let (b, _rb) = registry.create_session(UserInfo::new());
        let session_a = registry.get(a).unwrap();
        assert_eq!(registry.len(), 2);
        let mut ids = registry.session_ids();
        ids.sort();
        let mut expected = vec![a, b];
        expected.sort();
        assert_eq!(ids, expected);

        registry.shutdown();
        assert!(registry.is_empty());
        assert!(session_a.is_closed());
    }

    #[test]
    fn test_context_shares_session_state() {
        let registry = SessionRegistry::new();
        let (id, _rx) = registry.create_session(alice());
        let ctx = registry.context(id).unwrap();

        ctx.transition(AuthState::PendingRedirect {
            provider: "google".into(),
        });
        drop(ctx);
        assert_eq!(
            registry.get(id).unwrap().auth_state(),
            AuthState::PendingRedirect {
                provider: "google".into()
            }
        );

        let ctx = registry.context(id).unwrap();
        registry.clear_user_info(id);
        assert!(ctx.user_info().is_empty());
        assert_eq!(ctx.auth_state(), AuthState::LoggedOut);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_clears_and_creates() {
        const TASKS: usize = 16;
        let registry = Arc::new(SessionRegistry::new());
        let barrier = Arc::new(tokio::sync::Barrier::new(TASKS));
        let mut handles = Vec::new();
        for _ in 0..TASKS {
            let registry = Arc::clone(&registry);
            let barrier = Arc::clone(&barrier);
            handles.push(tokio::spawn(async move {
                let (id, _rx) = registry.create_session(alice());
                barrier.wait().await;
                registry.clear_user_info(id);
                let state = registry.get(id).unwrap().state();
                assert!(state.user_info.is_empty());
                assert_eq!(state.auth_state, AuthState::LoggedOut);
                registry.remove_session(id)
            }));
        }
        for handle in handles {
            assert!(tokio_test::assert_ok!(handle.await));
        }
        assert!(registry.is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_enqueue_racing_teardown_and_reregister() {
        const SENDS: usize = 1_000;
        for _ in 0..20 {
            let registry = Arc::new(SessionRegistry::new());
            let id = Uuid::new_v4();
            let mut old_rx = registry.register(id, alice()).unwrap();
            let stale = registry.context(id).unwrap();
            let barrier = Arc::new(tokio::sync::Barrier::new(2));

            let sender = {
                let barrier = Arc::clone(&barrier);
                tokio::spawn(async move {
                    barrier.wait().await;
                    (0..SENDS)
                        .filter(|i| stale.enqueue(ForwardMsg::auth_redirect(format!("/{i}"))))
                        .count()
                })
            };
            let teardown = {
                let registry = Arc::clone(&registry);
                tokio::spawn(async move {
                    barrier.wait().await;
                    assert!(registry.remove_session(id));
                    registry.register(id, UserInfo::new()).unwrap()
                })
            };

            let accepted = tokio_test::assert_ok!(sender.await);
            let mut new_rx = tokio_test::assert_ok!(teardown.await);

            // Accepted messages all landed in the old queue, in order.
            let delivered = old_rx.try_recv_all();
            assert_eq!(delivered.len(), accepted);
            for (i, msg) in delivered.iter().enumerate() {
                assert_eq!(msg.redirect_url(), Some(format!("/{i}").as_str()));
            }
            assert!(new_rx.try_recv_all().is_empty());
        }
    }
}
