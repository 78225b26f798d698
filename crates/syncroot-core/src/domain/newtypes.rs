//! Domain newtypes with validation
//!
//! This module provides strongly-typed wrappers for the identity spaces the
//! synchronization core juggles. A filesystem entry carries two of them:
//! a stable [`SyncId`] and a volatile platform [`AltId`]. Mixing them up is
//! the classic bug in this area, so they never share a type.

use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::errors::DomainError;

// ============================================================================
// Integer-based identity types
// ============================================================================

/// Stable synchronization identity of a tree node.
///
/// Assigned once when the entry is first discovered, unchanged across
/// renames and moves, and never reused after the node is deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SyncId(u64);

impl SyncId {
    /// The implicit root of every adapter tree
    pub const ROOT: SyncId = SyncId(1);

    /// Create a SyncId from its raw value
    #[must_use]
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// Get the raw u64 value
    #[must_use]
    pub const fn get(&self) -> u64 {
        self.0
    }

    /// Returns true for the root identity
    #[must_use]
    pub const fn is_root(&self) -> bool {
        self.0 == Self::ROOT.0
    }
}

impl Display for SyncId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for SyncId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse::<u64>()
            .map(Self)
            .map_err(|e| DomainError::InvalidId(format!("Invalid SyncId: {e}")))
    }
}

impl From<u64> for SyncId {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

/// Platform-specific identity of a filesystem entry.
///
/// On Linux this is the inode number, on other platforms a file reference
/// number. It may change on rename or recreate, and may be absent while the
/// OS-level entry is still being created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AltId(u64);

impl AltId {
    /// Create an AltId from its raw value
    #[must_use]
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// Get the raw u64 value
    #[must_use]
    pub const fn get(&self) -> u64 {
        self.0
    }
}

impl Display for AltId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for AltId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse::<u64>()
            .map(Self)
            .map_err(|e| DomainError::InvalidId(format!("Invalid AltId: {e}")))
    }
}

impl From<u64> for AltId {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

/// Identifier of a configured synchronized root
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MappingId(u64);

impl MappingId {
    /// Create a MappingId from its raw value
    #[must_use]
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// Get the raw u64 value
    #[must_use]
    pub const fn get(&self) -> u64 {
        self.0
    }
}

impl Display for MappingId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for MappingId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse::<u64>()
            .map(Self)
            .map_err(|e| DomainError::InvalidId(format!("Invalid MappingId: {e}")))
    }
}

// ============================================================================
// UUID-based ID types
// ============================================================================

/// Identifier of a single OS hydration demand
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DemandId(Uuid);

impl DemandId {
    /// Create a new random DemandId
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Get the inner UUID value
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for DemandId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for DemandId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for DemandId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|e| DomainError::InvalidId(format!("Invalid DemandId: {e}")))
    }
}

// ============================================================================
// ByteRange
// ============================================================================

/// A span of content bytes requested by the operating system.
///
/// `length == None` means "to the end of the content".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ByteRange {
    pub offset: u64,
    pub length: Option<u64>,
}

impl ByteRange {
    /// A range covering the whole content
    #[must_use]
    pub const fn full() -> Self {
        Self {
            offset: 0,
            length: None,
        }
    }

    /// Create a bounded range
    ///
    /// # Errors
    /// Returns error if the range is empty or overflows `u64`
    pub fn new(offset: u64, length: u64) -> Result<Self, DomainError> {
        if length == 0 {
            return Err(DomainError::InvalidRange(format!(
                "empty range at offset {offset}"
            )));
        }
        if offset.checked_add(length).is_none() {
            return Err(DomainError::InvalidRange(format!(
                "range {offset}+{length} overflows"
            )));
        }
        Ok(Self {
            offset,
            length: Some(length),
        })
    }

    /// Exclusive end offset, `None` when the range is open-ended
    #[must_use]
    pub fn end(&self) -> Option<u64> {
        self.length.map(|len| self.offset.saturating_add(len))
    }

    /// Returns true when the range covers the content from start to finish
    #[must_use]
    pub fn is_full(&self) -> bool {
        self.offset == 0 && self.length.is_none()
    }
}

impl Default for ByteRange {
    fn default() -> Self {
        Self::full()
    }
}

impl Display for ByteRange {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self.length {
            Some(len) => write!(f, "{}+{}", self.offset, len),
            None => write!(f, "{}..", self.offset),
        }
    }
}

// ============================================================================
// NodeName
// ============================================================================

/// Characters a name component can never contain on this platform
#[cfg(windows)]
const FORBIDDEN_NAME_CHARS: &[char] = &['/', '\\', '\0'];
#[cfg(not(windows))]
const FORBIDDEN_NAME_CHARS: &[char] = &['/', '\0'];

/// A single path component naming a node within its parent.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct NodeName(String);

impl NodeName {
    /// Create a validated node name
    ///
    /// # Errors
    /// Returns error if the name is empty, `.`/`..`, or contains a path
    /// separator of the platform (`/`, plus `\` on Windows) or a NUL byte
    pub fn new(name: impl Into<String>) -> Result<Self, DomainError> {
        let name = name.into();
        if name.is_empty() || name == "." || name == ".." {
            return Err(DomainError::InvalidName(name));
        }
        if name.contains(FORBIDDEN_NAME_CHARS) {
            return Err(DomainError::InvalidName(name));
        }
        Ok(Self(name))
    }

    /// Get the name as a string slice
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for NodeName {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for NodeName {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<NodeName> for String {
    fn from(name: NodeName) -> Self {
        name.0
    }
}

impl AsRef<str> for NodeName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
