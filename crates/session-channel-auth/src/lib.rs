//! Authentication flow for session channels.
//!
//! Provides:
//! - `Config` - `server.baseUrlPath` and `[auth]` credentials from TOML
//! - `CredentialValidator` - Trusted provider check
//! - `ProviderTokenCodec` - Tamper-evident provider tokens
//! - `AuthFlow` - Login/logout redirects through a session's context
//! - `CommandMetrics` - Per-command usage counters

pub mod config;
pub mod credentials;
pub mod flow;
pub mod metrics;
pub mod token;
pub mod url;

pub use config::{AuthConfig, Config, ConfigError, ProviderCredentials, ServerConfig};
pub use credentials::{AuthError, CredentialValidator, SecretsValidator};
pub use flow::AuthFlow;
pub use metrics::{AuthCommand, CommandMetrics, CommandUsage};
pub use token::{ProviderTokenCodec, SealedTokenCodec, TokenError};
pub use url::{AUTH_LOGIN_ENDPOINT, AUTH_LOGOUT_ENDPOINT, make_url_path};
