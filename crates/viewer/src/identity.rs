//! Document identity
//!
//! The identity keys every persisted page and the warm-complete marker, so
//! it must stay stable across sessions. Signed document URLs rotate their
//! query string, which is why it is not part of the identity.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DocumentIdentity(String);

impl DocumentIdentity {
    /// Derive the identity of a document
    ///
    /// A non-empty cache key wins. Otherwise the URL without its query and
    /// fragment is used, falling back to the full URL if that leaves
    /// nothing.
    pub fn derive(url: &str, cache_key: Option<&str>) -> Self {
        if let Some(key) = cache_key.map(str::trim).filter(|key| !key.is_empty()) {
            return Self(key.to_string());
        }

        let url = url.trim();
        let end = url.find(|c: char| c == '?' || c == '#').unwrap_or(url.len());
        let stripped = &url[..end];
        if stripped.is_empty() {
            Self(url.to_string())
        } else {
            Self(stripped.to_string())
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DocumentIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
