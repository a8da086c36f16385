//! Packed format version identifiers and the open-time version gate.
//!
//! A `VersionId` packs `major << 16 | minor` into one `u32`, the same word
//! that is stored in every block header.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SioError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VersionId(u32);

/// Files older than v00-08 are no longer readable.
pub const MIN_SUPPORTED: VersionId = VersionId::new(0, 8);
/// Version stamped on every block this build writes.
pub const CURRENT: VersionId = VersionId::new(2, 17);

impl VersionId {
    pub const fn new(major: u16, minor: u16) -> Self {
        VersionId(((major as u32) << 16) | minor as u32)
    }

    pub const fn from_raw(raw: u32) -> Self {
        VersionId(raw)
    }

    #[inline]
    pub const fn raw(self) -> u32 { self.0 }

    #[inline]
    pub const fn major(self) -> u16 { (self.0 >> 16) as u16 }

    #[inline]
    pub const fn minor(self) -> u16 { (self.0 & 0xFFFF) as u16 }
}

impl From<u32> for VersionId {
    fn from(raw: u32) -> Self {
        VersionId(raw)
    }
}

impl fmt::Display for VersionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{:02}-{:02}", self.major(), self.minor())
    }
}

/// Reject any version below [`MIN_SUPPORTED`].
///
/// Newer versions always pass: fields this build does not know about are
/// simply not read.
pub fn check_version(version: VersionId) -> Result<()> {
    if version < MIN_SUPPORTED {
        log::warn!("rejecting stream version {version}, minimum is {MIN_SUPPORTED}");
        return Err(SioError::UnsupportedVersion { version, minimum: MIN_SUPPORTED });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn packing() {
        let v = VersionId::new(2, 17);
        assert_eq!(v.raw(), 0x0002_0011);
        assert_eq!(v.major(), 2);
        assert_eq!(v.minor(), 17);
        assert_eq!(v.to_string(), "v02-17");
    }

    #[test]
    fn gate_rejects_old_versions() {
        for raw in [0u32, 1, 7] {
            let err = check_version(VersionId::from_raw(raw)).unwrap_err();
            assert!(matches!(err, SioError::UnsupportedVersion { .. }));
        }
    }

    #[test]
    fn gate_accepts_minimum_and_newer() {
        check_version(MIN_SUPPORTED).unwrap();
        check_version(CURRENT).unwrap();
        check_version(VersionId::new(u16::MAX, u16::MAX)).unwrap();
    }

    #[test]
    fn minor_does_not_leak_into_major() {
        assert!(VersionId::new(0, u16::MAX) < VersionId::new(1, 0));
    }
}
