//! Per-session user identity and its read-only facade.

use std::collections::{BTreeMap, btree_map};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ScriptRunContext;

/// Email reported for local, unauthenticated runs.
pub const PLACEHOLDER_EMAIL: &str = "test@example.com";

/// Key carrying the user's email.
pub const EMAIL_KEY: &str = "email";

/// Identity fields of one session.
///
/// Values may be absent (`None`) while the key is still present, e.g. an
/// `email` of `None` for a visitor who is not a member of the workspace.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserInfo(BTreeMap<String, Option<String>>);

impl UserInfo {
    /// Create an empty mapping.
    #[must_use]
    pub const fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// The identity used for local runs: `{"email": "test@example.com"}`.
    #[must_use]
    pub fn local_placeholder() -> Self {
        [(EMAIL_KEY.to_owned(), Some(PLACEHOLDER_EMAIL.to_owned()))]
            .into_iter()
            .collect()
    }

    /// Look up a field. `None` if the key is missing.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Option<String>> {
        self.0.get(key)
    }

    /// Set a field.
    pub fn insert(&mut self, key: impl Into<String>, value: Option<String>) {
        self.0.insert(key.into(), value);
    }

    /// Remove every field.
    pub fn clear(&mut self) {
        self.0.clear();
    }

    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate over present keys in order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn iter(&self) -> btree_map::Iter<'_, String, Option<String>> {
        self.0.iter()
    }

    /// Whether this carries a real logged-in identity: an email that is
    /// present and not the local placeholder.
    #[must_use]
    pub fn has_real_identity(&self) -> bool {
        matches!(self.get(EMAIL_KEY), Some(Some(email)) if email != PLACEHOLDER_EMAIL)
    }

    /// Consume into the underlying map.
    #[must_use]
    pub fn into_inner(self) -> BTreeMap<String, Option<String>> {
        self.0
    }
}

impl From<BTreeMap<String, Option<String>>> for UserInfo {
    fn from(map: BTreeMap<String, Option<String>>) -> Self {
        Self(map)
    }
}

impl FromIterator<(String, Option<String>)> for UserInfo {
    fn from_iter<I: IntoIterator<Item = (String, Option<String>)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a UserInfo {
    type Item = (&'a String, &'a Option<String>);
    type IntoIter = btree_map::Iter<'a, String, Option<String>>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// Errors raised by [`UserInfoProxy`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum UserInfoError {
    #[error("Key not found: {0}")]
    KeyNotFound(String),
    #[error("Attribute not found: {0}")]
    AttributeNotFound(String),
    #[error("User info cannot be modified")]
    ReadOnlyViolation,
}

/// Read-only view of the current session's [`UserInfo`].
///
/// Fields can be read by key ([`get`](Self::get)) or attribute-style
/// ([`attr`](Self::attr)); both read the same mapping but report a missing
/// field with different errors. Every write is rejected.
///
/// Without a bound context the proxy behaves as an empty mapping.
#[derive(Clone, Copy)]
pub struct UserInfoProxy<'a> {
    ctx: Option<&'a ScriptRunContext>,
}

impl<'a> UserInfoProxy<'a> {
    /// Create a proxy over `ctx`'s user info (or an empty mapping for `None`).
    #[must_use]
    pub const fn new(ctx: Option<&'a ScriptRunContext>) -> Self {
        Self { ctx }
    }

    fn with_info<R>(&self, f: impl FnOnce(&UserInfo) -> R) -> R {
        match self.ctx {
            Some(ctx) => ctx.with_user_info(f),
            None => {
                tracing::trace!("No script run context, using empty user info");
                f(&UserInfo::new())
            }
        }
    }

    /// Key-style lookup.
    ///
    /// # Errors
    /// Returns [`UserInfoError::KeyNotFound`] if `key` is not present.
    pub fn get(&self, key: &str) -> Result<Option<String>, UserInfoError> {
        self.with_info(|info| info.get(key).cloned())
            .ok_or_else(|| UserInfoError::KeyNotFound(key.to_owned()))
    }

    /// Attribute-style lookup.
    ///
    /// # Errors
    /// Returns [`UserInfoError::AttributeNotFound`] if `name` is not present.
    pub fn attr(&self, name: &str) -> Result<Option<String>, UserInfoError> {
        self.get(name)
            .map_err(|_| UserInfoError::AttributeNotFound(name.to_owned()))
    }

    /// Key-style write. Always rejected.
    ///
    /// # Errors
    /// Always returns [`UserInfoError::ReadOnlyViolation`].
    pub fn set_item(&self, key: &str, _value: Option<String>) -> Result<(), UserInfoError> {
        self.reject_write(key)
    }

    /// Attribute-style write. Always rejected.
    ///
    /// # Errors
    /// Always returns [`UserInfoError::ReadOnlyViolation`].
    pub fn set_attr(&self, name: &str, _value: Option<String>) -> Result<(), UserInfoError> {
        self.reject_write(name)
    }

    fn reject_write(&self, field: &str) -> Result<(), UserInfoError> {
        tracing::warn!(
            session_id = ?self.ctx.map(ScriptRunContext::session_id),
            field,
            "Rejected write to read-only user info"
        );
        Err(UserInfoError::ReadOnlyViolation)
    }

    /// Whether a real logged-in identity is present.
    #[must_use]
    pub fn is_logged_in(&self) -> bool {
        self.with_info(UserInfo::has_real_identity)
    }

    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.with_info(|info| info.contains_key(key))
    }

    /// Present keys, in order.
    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        self.with_info(|info| info.keys().map(str::to_owned).collect())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.with_info(UserInfo::len)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.with_info(UserInfo::is_empty)
    }

    /// Snapshot of the mapping. Changing the copy does not affect the session.
    #[must_use]
    pub fn to_dict(&self) -> UserInfo {
        self.with_info(UserInfo::clone)
    }
}

impl std::fmt::Debug for UserInfoProxy<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("UserInfoProxy").field(&self.to_dict()).finish()
    }
}
