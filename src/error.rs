//! Error taxonomy and the odd/even status-code convention.
//!
//! Rust callers propagate [`SioError`] with `?`.  Callers that still speak
//! the SIO status-word convention convert a result with [`Status::of`]: the
//! low bit of a status is set on success and clear on failure.

use std::io;
use thiserror::Error;

use crate::version::VersionId;

pub type Result<T> = std::result::Result<T, SioError>;

#[derive(Error, Debug)]
pub enum SioError {
    /// Short read/write or any other failure of the underlying stream.
    #[error("I/O fault: {0}")]
    IoFault(#[from] io::Error),
    /// Structurally implausible data; the current record must be abandoned.
    #[error("Malformed stream: {0}")]
    MalformedStream(String),
    /// Terminal open-time failure; no degraded read path exists.
    #[error("Unsupported format version {version} (minimum supported {minimum})")]
    UnsupportedVersion { version: VersionId, minimum: VersionId },
    /// Raised before any byte is written, so nothing is silently truncated.
    #[error("Value {value} does not fit the {max}-maximum wire width of `{field}`")]
    EncodingOverflow { field: &'static str, value: u64, max: u64 },
    #[error("Seek fault: {0}")]
    SeekFault(io::Error),
    #[error("Invalid record kind index {index} (registry holds {count} records)")]
    InvalidRecordKind { index: usize, count: usize },
    /// Compression transform failure or unknown transform id.
    #[error("Transform error: {0}")]
    Transform(String),
}

impl SioError {
    pub fn malformed(msg: impl Into<String>) -> Self {
        SioError::MalformedStream(msg.into())
    }

    /// Even status code identifying this failure class.
    pub fn status(&self) -> Status {
        Status(match self {
            SioError::IoFault(_)                => 2,
            SioError::MalformedStream(_)        => 4,
            SioError::UnsupportedVersion { .. } => 6,
            SioError::EncodingOverflow { .. }   => 8,
            SioError::SeekFault(_)              => 10,
            SioError::InvalidRecordKind { .. }  => 12,
            SioError::Transform(_)              => 14,
        })
    }
}

/// SIO-style status word.  Odd means success.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Status(pub u32);

impl Status {
    pub const SUCCESS: Status = Status(1);

    #[inline]
    pub fn is_success(self) -> bool {
        self.0 & 1 == 1
    }

    pub fn of<T>(result: &Result<T>) -> Status {
        match result {
            Ok(_)  => Status::SUCCESS,
            Err(e) => e.status(),
        }
    }
}

impl From<&SioError> for Status {
    fn from(e: &SioError) -> Self {
        e.status()
    }
}
