//! Protocol versioning for safe upgrades.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Protocol version for probe/CLI to daemon communication.
///
/// `major.minor`: a major bump is breaking, a minor bump is additive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtocolVersion {
    pub major: u16,
    pub minor: u16,
}

impl ProtocolVersion {
    /// Current protocol version.
    pub const CURRENT: ProtocolVersion = ProtocolVersion { major: 1, minor: 0 };

    pub const fn new(major: u16, minor: u16) -> Self {
        Self { major, minor }
    }

    /// Same major version means compatible.
    pub fn is_compatible_with(&self, other: &ProtocolVersion) -> bool {
        self.major == other.major
    }

    /// Checks a peer's version against [`Self::CURRENT`].
    ///
    /// # Errors
    ///
    /// `VersionError::Incompatible` when the major versions differ.
    pub fn check_peer(peer: &ProtocolVersion) -> Result<(), VersionError> {
        if Self::CURRENT.is_compatible_with(peer) {
            Ok(())
        } else {
            Err(VersionError::Incompatible {
                got: peer.to_string(),
                expected: Self::CURRENT.to_string(),
            })
        }
    }
}

impl Default for ProtocolVersion {
    fn default() -> Self {
        Self::CURRENT
    }
}

impl fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

impl FromStr for ProtocolVersion {
    type Err = VersionError;

    /// Parses `"<major>.<minor>"`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || VersionError::InvalidFormat(s.to_string());
        let (major, minor) = s.split_once('.').ok_or_else(invalid)?;
        Ok(Self {
            major: major.parse().map_err(|_| invalid())?,
            minor: minor.parse().map_err(|_| invalid())?,
        })
    }
}

/// Errors that can occur with version handling.
#[derive(Error, Debug, Clone)]
pub enum VersionError {
    #[error("Invalid version format: {0}")]
    InvalidFormat(String),

    #[error("Incompatible version: got {got}, expected {expected}")]
    Incompatible { got: String, expected: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_parse() {
        let v: ProtocolVersion = "1.3".parse().unwrap();
        assert_eq!(v, ProtocolVersion::new(1, 3));
    }

    #[test]
    fn test_version_parse_invalid() {
        assert!("1".parse::<ProtocolVersion>().is_err());
        assert!("1.0.0".parse::<ProtocolVersion>().is_err());
        assert!("a.b".parse::<ProtocolVersion>().is_err());
    }

    #[test]
    fn test_check_peer() {
        assert!(ProtocolVersion::check_peer(&ProtocolVersion::new(1, 7)).is_ok());
        let err = ProtocolVersion::check_peer(&ProtocolVersion::new(2, 0)).unwrap_err();
        assert!(err.to_string().contains("got 2.0"));
    }
}
