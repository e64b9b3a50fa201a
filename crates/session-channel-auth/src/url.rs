//! Redirect URL construction.

/// Endpoint that starts a provider login.
pub const AUTH_LOGIN_ENDPOINT: &str = "/auth/login";

/// Endpoint that ends the user's login.
pub const AUTH_LOGOUT_ENDPOINT: &str = "/auth/logout";

/// Join a configurable base path and an endpoint into an absolute path.
///
/// Slashes around `base_url_path` are normalized, so `""`, `"app"`,
/// `"/app"` and `"/app/"` all behave as expected.
#[must_use]
pub fn make_url_path(base_url_path: &str, endpoint: &str) -> String {
    let base = base_url_path.trim_matches('/');
    let endpoint = endpoint.trim_start_matches('/');
    if base.is_empty() {
        format!("/{endpoint}")
    } else {
        format!("/{base}/{endpoint}")
    }
}
