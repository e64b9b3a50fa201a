//! Trusted credential validation.

use thiserror::Error;

use crate::{AuthConfig, TokenError, config::PROVIDER_KEYS};

/// Authentication error.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Auth configuration is missing the \"{0}\" key")]
    MissingAuthKey(&'static str),
    #[error("Auth provider \"{0}\" is not configured")]
    UnknownProvider(String),
    #[error("Credentials for provider \"{provider}\" are missing the \"{key}\" key")]
    MissingCredential {
        provider: String,
        key: &'static str,
    },
    #[error("Credentials for provider \"{provider}\" are malformed: {reason}")]
    MalformedProvider { provider: String, reason: String },
    #[error("Provider token error: {0}")]
    Token(#[from] TokenError),
}

impl AuthError {
    /// Whether the error comes from missing or invalid configuration
    /// (as opposed to a token failure).
    #[must_use]
    pub const fn is_configuration_error(&self) -> bool {
        !matches!(self, Self::Token(_))
    }
}

/// Decides whether a provider is a trusted, configured credential source.
pub trait CredentialValidator: Send + Sync {
    /// Succeed silently for a usable provider.
    ///
    /// # Errors
    /// Returns a configuration error otherwise.
    fn validate(&self, provider: &str) -> Result<(), AuthError>;
}

/// Validator backed by the `[auth]` section of the config file.
#[derive(Debug, Clone, Default)]
pub struct SecretsValidator {
    auth: Option<AuthConfig>,
}

impl SecretsValidator {
    #[must_use]
    pub const fn new(auth: Option<AuthConfig>) -> Self {
        Self { auth }
    }
}

fn non_empty(value: Option<&String>) -> bool {
    value.is_some_and(|v| !v.trim().is_empty())
}

impl CredentialValidator for SecretsValidator {
    fn validate(&self, provider: &str) -> Result<(), AuthError> {
        let auth = self
            .auth
            .as_ref()
            .ok_or(AuthError::MissingAuthKey("redirect_uri"))?;
        if !non_empty(auth.redirect_uri.as_ref()) {
            return Err(AuthError::MissingAuthKey("redirect_uri"));
        }
        if !non_empty(auth.cookie_secret.as_ref()) {
            return Err(AuthError::MissingAuthKey("cookie_secret"));
        }

        let creds = auth
            .provider(provider)
            .map_err(|e| AuthError::MalformedProvider {
                provider: provider.to_owned(),
                reason: e.to_string(),
            })?
            .ok_or_else(|| AuthError::UnknownProvider(provider.to_owned()))?;

        let fields = [
            creds.client_id.as_ref(),
            creds.client_secret.as_ref(),
            creds.server_metadata_url.as_ref(),
        ];
        for (key, value) in PROVIDER_KEYS.into_iter().zip(fields) {
            if !non_empty(value) {
                return Err(AuthError::MissingCredential {
                    provider: provider.to_owned(),
                    key,
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Config;

    fn validator(toml: &str) -> SecretsValidator {
        SecretsValidator::new(Config::from_toml_str(toml).unwrap().auth)
    }

    const BASE: &str = r#"
[auth]
redirect_uri = "http://localhost/oauth2callback"
cookie_secret = "xyz"
"#;

    #[test]
    fn test_configured_provider() {
        let v = validator(&format!(
            "{BASE}\n[auth.google]\nclient_id = \"a\"\nclient_secret = \"b\"\nserver_metadata_url = \"c\"\n"
        ));
        assert!(v.validate("google").is_ok());
        assert!(matches!(
            v.validate("not-configured"),
            Err(AuthError::UnknownProvider(p)) if p == "not-configured"
        ));
    }

    #[test]
    fn test_missing_auth_section() {
        let v = SecretsValidator::default();
        let err = v.validate("google").unwrap_err();
        assert!(matches!(err, AuthError::MissingAuthKey("redirect_uri")));
        assert!(err.is_configuration_error());
    }

    #[test]
    fn test_missing_cookie_secret() {
        let v = validator("[auth]\nredirect_uri = \"http://localhost\"\n");
        assert!(matches!(
            v.validate("google"),
            Err(AuthError::MissingAuthKey("cookie_secret"))
        ));
    }

    #[test]
    fn test_incomplete_provider() {
        let v = validator(&format!("{BASE}\n[auth.okta]\nclient_id = \"a\"\n"));
        assert!(matches!(
            v.validate("okta"),
            Err(AuthError::MissingCredential { key: "client_secret", .. })
        ));
    }

    #[test]
    fn test_inline_default_provider() {
        let v = validator(&format!(
            "{BASE}client_id = \"a\"\nclient_secret = \"b\"\nserver_metadata_url = \"c\"\n"
        ));
        assert!(v.validate("default").is_ok());
    }
}
