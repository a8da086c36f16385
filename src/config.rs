//! Codec and stream options.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::codec::{CodecId, DEFAULT_COMPRESSION_LEVEL};
use crate::error::{Result, SioError};
use crate::primitive::{DEFAULT_DECODE_BUFFER, MAX_STRING_LEN};
use crate::record::MAX_RECORD_LEN;

/// Records are compressed unless configured otherwise.
pub const COMPRESSION: bool = true;

/// Options shared by record readers and writers.
///
/// Missing JSON keys fall back to [`SioConfig::default`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SioConfig {
    /// Sanity ceiling on a decoded string length.
    pub max_string_len:      u32,
    /// Records declaring a larger uncompressed length are rejected unread.
    pub max_record_len:      u32,
    pub initial_buffer_size: usize,
    pub compress:            bool,
    pub codec:               CodecId,
    pub level:               i32,
}

impl Default for SioConfig {
    fn default() -> Self {
        Self {
            max_string_len:      MAX_STRING_LEN,
            max_record_len:      MAX_RECORD_LEN,
            initial_buffer_size: DEFAULT_DECODE_BUFFER,
            compress:            COMPRESSION,
            codec:               CodecId::Zstd,
            level:               DEFAULT_COMPRESSION_LEVEL,
        }
    }
}

impl SioConfig {
    pub fn from_json_str(s: &str) -> Result<Self> {
        serde_json::from_str(s).map_err(|e| SioError::malformed(format!("config: {e}")))
    }

    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| SioError::malformed(format!("config: {e}")))
    }
}
