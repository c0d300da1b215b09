use std::fmt;

use serde::{Deserialize, Serialize};

/// Transport-assigned peer identifier. Opaque; may contain any characters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PeerId(String);

impl PeerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// UI-safe key: everything from the first ASCII letter on, keeping only
    /// ASCII alphanumerics.
    pub fn sanitized(&self) -> String {
        sanitize_id(&self.0)
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PeerId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for PeerId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

pub fn sanitize_id(id: &str) -> String {
    id.chars()
        .skip_while(|c| !c.is_ascii_alphabetic())
        .filter(char::is_ascii_alphanumeric)
        .collect()
}
