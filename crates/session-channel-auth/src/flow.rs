//! Login and logout through a session's script run context.

use std::sync::Arc;

use session_channel_core::{AuthState, ForwardMsg, ScriptRunContext};
use session_channel_registry::RuntimeHandle;

use crate::{
    AUTH_LOGIN_ENDPOINT, AUTH_LOGOUT_ENDPOINT, AuthCommand, AuthError, CommandMetrics,
    CommandUsage, Config, CredentialValidator, ProviderTokenCodec, SealedTokenCodec,
    SecretsValidator, TokenError, make_url_path,
};

/// Drives the login/logout redirects of sessions.
///
/// Every operation takes the caller's context explicitly; with no context
/// (code running outside a session) login and logout do nothing.
#[derive(Clone)]
pub struct AuthFlow {
    base_url_path: String,
    validator: Arc<dyn CredentialValidator>,
    codec: Arc<dyn ProviderTokenCodec>,
    runtime: RuntimeHandle,
    metrics: Arc<CommandMetrics>,
}

impl AuthFlow {
    /// Create a flow from its collaborators.
    #[must_use]
    pub fn new(
        base_url_path: impl Into<String>,
        validator: Arc<dyn CredentialValidator>,
        codec: Arc<dyn ProviderTokenCodec>,
        runtime: RuntimeHandle,
    ) -> Self {
        Self {
            base_url_path: base_url_path.into(),
            validator,
            codec,
            runtime,
            metrics: Arc::new(CommandMetrics::new()),
        }
    }

    /// Build the flow described by `config`.
    ///
    /// Tokens are keyed from `auth.cookie_secret`; without one, a random key
    /// is used (login fails validation in that case anyway).
    #[must_use]
    pub fn from_config(config: &Config, runtime: RuntimeHandle) -> Self {
        let codec = match config.auth.as_ref().and_then(|a| a.cookie_secret.as_deref()) {
            Some(secret) => SealedTokenCodec::new(secret),
            None => {
                tracing::warn!("No auth.cookie_secret configured, provider tokens use a random key");
                SealedTokenCodec::ephemeral()
            }
        };
        Self::new(
            config.server.base_url_path.clone(),
            Arc::new(SecretsValidator::new(config.auth.clone())),
            Arc::new(codec),
            runtime,
        )
    }

    #[must_use]
    pub fn base_url_path(&self) -> &str {
        &self.base_url_path
    }

    /// How often `login` and `logout` were called from a session.
    /// Shared by every clone of this flow.
    #[must_use]
    pub fn usage(&self) -> CommandUsage {
        self.metrics.snapshot()
    }

    /// Start a login with `provider`.
    ///
    /// Enqueues one `auth_redirect` to the login endpoint and moves the
    /// session to [`AuthState::PendingRedirect`]. If the session was torn
    /// down the redirect is dropped and the state is left alone.
    ///
    /// # Errors
    /// Returns a configuration error if `provider` is not a trusted,
    /// configured provider; nothing is enqueued then.
    pub fn login(&self, ctx: Option<&ScriptRunContext>, provider: &str) -> Result<(), AuthError> {
        let Some(ctx) = ctx else {
            tracing::debug!(provider, "login called without a session context");
            return Ok(());
        };
        self.metrics.record(AuthCommand::Login);

        self.validator.validate(provider)?;
        let url = self.login_redirect_url(provider)?;

        let session_id = ctx.session_id();
        if ctx.enqueue(ForwardMsg::auth_redirect(url)) {
            ctx.transition(AuthState::PendingRedirect {
                provider: provider.to_owned(),
            });
            tracing::info!(%session_id, provider, "Login redirect sent");
        } else {
            tracing::info!(%session_id, provider, "Session gone, login redirect dropped");
        }
        Ok(())
    }

    /// Log the session's user out.
    ///
    /// Clears the context's user info and the registry's copy (when the
    /// runtime is running), then enqueues one `auth_redirect` to the
    /// logout endpoint.
    pub fn logout(&self, ctx: Option<&ScriptRunContext>) {
        let Some(ctx) = ctx else {
            tracing::debug!("logout called without a session context");
            return;
        };
        self.metrics.record(AuthCommand::Logout);

        ctx.clear_user_info();
        let session_id = ctx.session_id();
        if let Some(registry) = self.runtime.get() {
            registry.clear_user_info(session_id);
        }
        ctx.transition(AuthState::LoggedOut);

        if ctx.enqueue(ForwardMsg::auth_redirect(self.logout_url())) {
            tracing::info!(%session_id, "Logout redirect sent");
        } else {
            tracing::info!(%session_id, "Session gone, logout redirect dropped");
        }
    }

    /// `{base}/auth/login?provider={token}` for `provider`.
    ///
    /// # Errors
    /// Returns error if the token cannot be produced.
    pub fn login_redirect_url(&self, provider: &str) -> Result<String, TokenError> {
        let token = self.codec.encode(provider)?;
        let login_path = make_url_path(&self.base_url_path, AUTH_LOGIN_ENDPOINT);
        Ok(format!("{login_path}?provider={token}"))
    }

    /// `{base}/auth/logout`.
    #[must_use]
    pub fn logout_url(&self) -> String {
        make_url_path(&self.base_url_path, AUTH_LOGOUT_ENDPOINT)
    }

    /// Recover and re-validate the provider named by a login token.
    ///
    /// Used by the login endpoint, the only trusted reader of tokens.
    ///
    /// # Errors
    /// Returns error for forged tokens or providers no longer configured.
    pub fn decode_provider(&self, token: &str) -> Result<String, AuthError> {
        let provider = self.codec.decode(token)?;
        self.validator.validate(&provider)?;
        Ok(provider)
    }
}

impl std::fmt::Debug for AuthFlow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthFlow")
            .field("base_url_path", &self.base_url_path)
            .field("runtime", &self.runtime)
            .field("usage", &self.usage())
            .finish_non_exhaustive()
    }
}
