//! Server-to-client forward messages.

use serde::{Deserialize, Serialize};

/// Instruction delivered from a session's context to its client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
#[non_exhaustive]
pub enum ForwardMsg {
    /// Ask the client to navigate to `url` (login or logout endpoint).
    AuthRedirect { url: String },
}

impl ForwardMsg {
    /// Create an auth redirect message.
    #[must_use]
    pub fn auth_redirect(url: impl Into<String>) -> Self {
        Self::AuthRedirect { url: url.into() }
    }

    /// Short name of the message kind, used in log fields.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::AuthRedirect { .. } => "auth_redirect",
        }
    }

    /// Redirect target, if this is a redirect.
    #[must_use]
    pub fn redirect_url(&self) -> Option<&str> {
        match self {
            Self::AuthRedirect { url } => Some(url),
        }
    }
}
