//! Preview artifact identifiers.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Identifier of a stored preview artifact.
///
/// Rendered as 32 lowercase hex characters (a v4 UUID in simple form). The
/// same string names the artifact on disk (`<id>.img`) and appears in signed
/// preview URLs, so parsing is strict: anything else is rejected before it
/// can reach the filesystem.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ArtifactId(Uuid);

impl ArtifactId {
    /// Length of the textual form.
    pub const LEN: usize = 32;

    /// Generate a new random artifact ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse from the 32-character lowercase hex form.
    pub fn parse(s: &str) -> crate::Result<Self> {
        if s.len() != Self::LEN
            || !s
                .bytes()
                .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
        {
            return Err(crate::Error::InvalidArtifactId(format!(
                "expected {} lowercase hex characters",
                Self::LEN
            )));
        }
        Uuid::try_parse(s)
            .map(Self)
            .map_err(|e| crate::Error::InvalidArtifactId(e.to_string()))
    }

    /// Recover an ID from an artifact file name (`<id>.img`).
    pub fn from_filename(name: &str) -> Option<Self> {
        let stem = name.strip_suffix(crate::ARTIFACT_EXTENSION)?.strip_suffix('.')?;
        Self::parse(stem).ok()
    }

    /// File name the artifact is stored under.
    pub fn filename(&self) -> String {
        format!("{}.{}", self, crate::ARTIFACT_EXTENSION)
    }

    /// Get the underlying UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for ArtifactId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ArtifactId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ArtifactId({})", self.0.simple())
    }
}

impl fmt::Display for ArtifactId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.simple())
    }
}

impl FromStr for ArtifactId {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for ArtifactId {
    type Error = crate::Error;

    fn try_from(s: String) -> crate::Result<Self> {
        Self::parse(&s)
    }
}

impl From<ArtifactId> for String {
    fn from(id: ArtifactId) -> Self {
        id.to_string()
    }
}
