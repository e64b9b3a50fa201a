//! Per-session script run context.

use std::sync::{Arc, PoisonError, RwLock, Weak};

use serde::{Deserialize, Serialize};

use crate::{ForwardChannel, ForwardMsg, SessionId, UserInfo, UserInfoProxy};

/// Authentication state of a session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum AuthState {
    /// No login attempted.
    #[default]
    Anonymous,
    /// A login redirect for `provider` was sent to the client.
    PendingRedirect { provider: String },
    /// A real identity was resolved for the session.
    Authenticated,
    /// The user logged out.
    LoggedOut,
}

/// Identity and auth state of one session.
///
/// Kept behind a single lock so readers never see a new identity paired
/// with a stale state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionState {
    pub user_info: UserInfo,
    pub auth_state: AuthState,
}

impl SessionState {
    /// State for `user_info`: `Authenticated` when it carries a real identity.
    #[must_use]
    pub fn new(user_info: UserInfo) -> Self {
        let mut state = Self::default();
        state.set_user_info(user_info);
        state
    }

    /// Replace the identity after auth resolution.
    pub fn set_user_info(&mut self, user_info: UserInfo) {
        self.auth_state = if user_info.has_real_identity() {
            AuthState::Authenticated
        } else {
            AuthState::Anonymous
        };
        self.user_info = user_info;
    }

    /// Forget the identity (logout).
    pub fn log_out(&mut self) {
        self.user_info.clear();
        self.auth_state = AuthState::LoggedOut;
    }
}

/// Session state shared between the registry and the session's contexts.
pub type SharedSessionState = Arc<RwLock<SessionState>>;

/// The application-facing handle to one live session.
///
/// Reads and writes go to the session's shared state, so changes made
/// through any context are visible to the registry. The outbound channel
/// is held without ownership: once the registry tears the session down,
/// messages enqueued through a stale context are dropped.
#[derive(Debug)]
pub struct ScriptRunContext {
    session_id: SessionId,
    state: SharedSessionState,
    channel: Weak<ForwardChannel>,
}

impl ScriptRunContext {
    /// Create a standalone context for `session_id` writing to `channel`.
    #[must_use]
    pub fn new(session_id: SessionId, user_info: UserInfo, channel: &Arc<ForwardChannel>) -> Self {
        Self::attach(
            session_id,
            Arc::new(RwLock::new(SessionState::new(user_info))),
            channel,
        )
    }

    /// Create a context over an existing session's shared state.
    #[must_use]
    pub fn attach(
        session_id: SessionId,
        state: SharedSessionState,
        channel: &Arc<ForwardChannel>,
    ) -> Self {
        Self {
            session_id,
            state,
            channel: Arc::downgrade(channel),
        }
    }

    #[must_use]
    pub const fn session_id(&self) -> SessionId {
        self.session_id
    }

    /// Hand a message to the session's outbound queue without blocking.
    ///
    /// Returns `false` when the session has been torn down; the message
    /// is dropped.
    pub fn enqueue(&self, msg: ForwardMsg) -> bool {
        match self.channel.upgrade() {
            Some(channel) => channel.send(msg),
            None => {
                tracing::debug!(
                    session_id = %self.session_id,
                    kind = msg.kind(),
                    "Session gone, dropping message"
                );
                false
            }
        }
    }

    /// Whether the session's channel is still accepting messages.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.channel.upgrade().is_some_and(|c| !c.is_closed())
    }

    /// Read-only view of this session's user info.
    #[must_use]
    pub const fn user_info(&self) -> UserInfoProxy<'_> {
        UserInfoProxy::new(Some(self))
    }

    pub(crate) fn with_user_info<R>(&self, f: impl FnOnce(&UserInfo) -> R) -> R {
        f(&self.state.read().unwrap_or_else(PoisonError::into_inner).user_info)
    }

    /// Empty the session's user info (logout).
    pub fn clear_user_info(&self) {
        self.state
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .user_info
            .clear();
    }

    #[must_use]
    pub fn auth_state(&self) -> AuthState {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .auth_state
            .clone()
    }

    /// Move to `next`, returning the previous state.
    pub fn transition(&self, next: AuthState) -> AuthState {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        tracing::debug!(session_id = %self.session_id, from = ?state.auth_state, to = ?next, "Auth state transition");
        std::mem::replace(&mut state.auth_state, next)
    }
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::*;

    #[test]
    fn test_enqueue_reaches_receiver() {
        let (channel, mut rx) = ForwardChannel::new(Uuid::new_v4());
        let channel = Arc::new(channel);
        let ctx = ScriptRunContext::new(channel.session_id(), UserInfo::new(), &channel);

        assert!(ctx.enqueue(ForwardMsg::auth_redirect("/auth/logout")));
        assert_eq!(
            rx.try_recv_all(),
            vec![ForwardMsg::auth_redirect("/auth/logout")]
        );
    }

    #[test]
    fn test_enqueue_after_channel_dropped() {
        let (channel, mut rx) = ForwardChannel::new(Uuid::new_v4());
        let channel = Arc::new(channel);
        let ctx = ScriptRunContext::new(channel.session_id(), UserInfo::new(), &channel);
        drop(channel);

        assert!(!ctx.is_connected());
        assert!(!ctx.enqueue(ForwardMsg::auth_redirect("/late")));
        assert!(rx.try_recv_all().is_empty());
    }

    #[test]
    fn test_initial_auth_state() {
        let (channel, _rx) = ForwardChannel::new(Uuid::new_v4());
        let channel = Arc::new(channel);

        let ctx = ScriptRunContext::new(channel.session_id(), UserInfo::local_placeholder(), &channel);
        assert_eq!(ctx.auth_state(), AuthState::Anonymous);

        let info: UserInfo = [("email".to_owned(), Some("alice@co.com".to_owned()))]
            .into_iter()
            .collect();
        let ctx = ScriptRunContext::new(channel.session_id(), info, &channel);
        assert_eq!(ctx.auth_state(), AuthState::Authenticated);

        let prev = ctx.transition(AuthState::LoggedOut);
        assert_eq!(prev, AuthState::Authenticated);
        assert_eq!(ctx.auth_state(), AuthState::LoggedOut);
    }

    #[test]
    fn test_clear_user_info() {
        let (channel, _rx) = ForwardChannel::new(Uuid::new_v4());
        let channel = Arc::new(channel);
        let ctx = ScriptRunContext::new(channel.session_id(), UserInfo::local_placeholder(), &channel);

        assert_eq!(ctx.user_info().len(), 1);
        ctx.clear_user_info();
        assert!(ctx.user_info().is_empty());
    }

    #[test]
    fn test_attached_contexts_share_state() {
        let (channel, _rx) = ForwardChannel::new(Uuid::new_v4());
        let channel = Arc::new(channel);
        let state: SharedSessionState =
            Arc::new(RwLock::new(SessionState::new(UserInfo::local_placeholder())));
        let first = ScriptRunContext::attach(channel.session_id(), Arc::clone(&state), &channel);
        let second = ScriptRunContext::attach(channel.session_id(), Arc::clone(&state), &channel);

        first.transition(AuthState::PendingRedirect {
            provider: "google".into(),
        });
        first.clear_user_info();
        drop(first);

        assert_eq!(
            second.auth_state(),
            AuthState::PendingRedirect {
                provider: "google".into()
            }
        );
        assert!(second.user_info().is_empty());
        assert!(state.read().unwrap().user_info.is_empty());
    }

    #[test]
    fn test_session_state_log_out() {
        let mut state = SessionState::new(UserInfo::local_placeholder());
        assert_eq!(state.auth_state, AuthState::Anonymous);
        state.log_out();
        assert!(state.user_info.is_empty());
        assert_eq!(state.auth_state, AuthState::LoggedOut);
    }
}
