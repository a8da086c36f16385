//! Record compression transforms.
//!
//! A compressed record carries its transform id in bits 8..15 of the record
//! options word.  Ids are permanent: an id is never reused, even if a
//! transform is retired.  A reader that meets an unknown id fails the record
//! instead of guessing.

use byteorder::{ByteOrder, LittleEndian};
use serde::{Deserialize, Serialize};

use crate::error::{Result, SioError};

/// Default Zstd compression level.
pub const DEFAULT_COMPRESSION_LEVEL: i32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum CodecId {
    None = 0,
    Zstd = 1,
    Lz4  = 2,
}

impl CodecId {
    pub fn from_wire(id: u8) -> Option<Self> {
        match id {
            0 => Some(CodecId::None),
            1 => Some(CodecId::Zstd),
            2 => Some(CodecId::Lz4),
            _ => None,
        }
    }

    /// Human-readable name (diagnostics and CLI only).
    pub fn name(self) -> &'static str {
        match self {
            CodecId::None => "none",
            CodecId::Zstd => "zstd",
            CodecId::Lz4  => "lz4",
        }
    }

    pub fn from_name(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "none" => Some(CodecId::None),
            "zstd" => Some(CodecId::Zstd),
            "lz4"  => Some(CodecId::Lz4),
            _      => None,
        }
    }
}

pub trait Codec: Send + Sync {
    fn codec_id(&self) -> CodecId;
    fn compress(&self, data: &[u8], level: i32) -> Result<Vec<u8>>;
    /// Inflate `data`, which must expand to exactly `raw_len` bytes.  No more
    /// than `raw_len` bytes are ever allocated.
    fn decompress(&self, data: &[u8], raw_len: usize) -> Result<Vec<u8>>;
}

pub struct NoneCodec;
impl Codec for NoneCodec {
    fn codec_id(&self) -> CodecId { CodecId::None }
    fn compress(&self, data: &[u8], _: i32) -> Result<Vec<u8>> { Ok(data.to_vec()) }
    fn decompress(&self, data: &[u8], _: usize) -> Result<Vec<u8>> { Ok(data.to_vec()) }
}

pub struct ZstdCodec;
impl Codec for ZstdCodec {
    fn codec_id(&self) -> CodecId { CodecId::Zstd }
    fn compress(&self, data: &[u8], level: i32) -> Result<Vec<u8>> {
        zstd::encode_all(data, level).map_err(|e| SioError::Transform(format!("zstd: {e}")))
    }
    fn decompress(&self, data: &[u8], raw_len: usize) -> Result<Vec<u8>> {
        zstd::bulk::decompress(data, raw_len).map_err(|e| SioError::Transform(format!("zstd: {e}")))
    }
}

pub struct Lz4Codec;
impl Codec for Lz4Codec {
    fn codec_id(&self) -> CodecId { CodecId::Lz4 }
    fn compress(&self, data: &[u8], _: i32) -> Result<Vec<u8>> {
        Ok(lz4_flex::compress_prepend_size(data))
    }
    fn decompress(&self, data: &[u8], raw_len: usize) -> Result<Vec<u8>> {
        if data.len() < 4 {
            return Err(SioError::Transform("lz4: missing size prefix".into()));
        }
        let declared = LittleEndian::read_u32(&data[..4]) as usize;
        if declared != raw_len {
            return Err(SioError::Transform(format!(
                "lz4: prefix says {declared} bytes, record says {raw_len}"
            )));
        }
        lz4_flex::block::decompress(&data[4..], raw_len)
            .map_err(|e| SioError::Transform(format!("lz4: {e}")))
    }
}

pub fn get_codec(id: CodecId) -> Box<dyn Codec> {
    match id {
        CodecId::None => Box::new(NoneCodec),
        CodecId::Zstd => Box::new(ZstdCodec),
        CodecId::Lz4  => Box::new(Lz4Codec),
    }
}

/// Resolve a transform id read from disk.
pub fn get_codec_by_wire(id: u8) -> Result<Box<dyn Codec>> {
    CodecId::from_wire(id)
        .map(get_codec)
        .ok_or_else(|| SioError::Transform(format!("unknown transform id {id}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_codec_roundtrips() {
        let data: Vec<u8> = (0u8..=255).cycle().take(10_000).collect();
        for id in [CodecId::None, CodecId::Zstd, CodecId::Lz4] {
            let codec = get_codec(id);
            assert_eq!(codec.codec_id(), id);
            let packed = codec.compress(&data, DEFAULT_COMPRESSION_LEVEL).unwrap();
            assert_eq!(codec.decompress(&packed, data.len()).unwrap(), data, "{}", id.name());
        }
    }

    #[test]
    fn wire_ids_are_stable() {
        assert_eq!(CodecId::None as u8, 0);
        assert_eq!(CodecId::Zstd as u8, 1);
        assert_eq!(CodecId::Lz4 as u8, 2);
        assert!(get_codec_by_wire(9).is_err());
    }

    #[test]
    fn corrupt_payload_is_transform_error() {
        let err = ZstdCodec.decompress(b"definitely not zstd", 64).unwrap_err();
        assert!(matches!(err, SioError::Transform(_)));
    }

    #[test]
    fn output_is_bounded_by_raw_len() {
        let data = vec![0u8; 100_000];
        for id in [CodecId::Zstd, CodecId::Lz4] {
            let codec = get_codec(id);
            let packed = codec.compress(&data, DEFAULT_COMPRESSION_LEVEL).unwrap();
            let err = codec.decompress(&packed, 1000).unwrap_err();
            assert!(matches!(err, SioError::Transform(_)), "{}", id.name());
        }
    }
}
