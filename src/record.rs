//! Record and block framing.
//!
//! # Record layout
//! ```text
//! uint32  RECORD_MARKER (0xABADCAFE)
//! uint32  options        bit0 compressed, bits 8..15 transform id
//! uint32  data length    bytes following the header on disk
//! uint32  raw length     record data length before compression
//! uint32  CRC-32         of the raw record data
//! string  record name    zero-padded to a 4-byte boundary
//! bytes   record data    `data length` bytes
//! ```
//!
//! # Block layout (inside raw record data)
//! ```text
//! uint32  BLOCK_MARKER (0xDEADBEEF)
//! uint32  block length   whole block, header included
//! uint32  block version  packed VersionId
//! string  block name     zero-padded to a 4-byte boundary
//! bytes   payload
//! ```
//!
//! A record whose kind is disabled in the registry, or whose name is not
//! known, is stepped over with one relative seek.  Its data is never read, so
//! the stream stays aligned on the next record header.

use std::io::{self, Cursor, Read, Seek, SeekFrom, Write};

use byteorder::{BigEndian, ByteOrder};

use crate::codec::{get_codec, get_codec_by_wire, CodecId, DEFAULT_COMPRESSION_LEVEL};
use crate::config::SioConfig;
use crate::error::{Result, SioError};
use crate::primitive::{SioReadExt, SioWriteExt, StringDecoder};
use crate::registry::{Record, RecordKind, RecordRegistry};
use crate::version::{check_version, VersionId};

pub const RECORD_MARKER: u32 = 0xABAD_CAFE;
pub const BLOCK_MARKER:  u32 = 0xDEAD_BEEF;

pub const OPT_COMPRESS: u32 = 0x0000_0001;

/// Default ceiling on the uncompressed length of one record (1 GiB).
pub const MAX_RECORD_LEN: u32 = 1 << 30;
const CODEC_SHIFT: u32 = 8;

/// Record header bytes before the name.
pub const RECORD_HEADER_FIXED: usize = 20;
/// Block header bytes before the name.
pub const BLOCK_HEADER_FIXED:  usize = 12;

#[inline]
fn align4(n: usize) -> usize {
    (n + 3) & !3
}

/// On-disk size of a padded frame name.
pub fn framed_name_len(name: &str) -> usize {
    align4(4 + name.len() + 1)
}

fn write_name<W: Write + ?Sized>(w: &mut W, name: &str) -> Result<()> {
    w.write_string(name)?;
    let pad = framed_name_len(name) - (4 + name.len() + 1);
    w.write_all(&[0u8; 3][..pad])?;
    Ok(())
}

fn skip_name_padding<R: Read + ?Sized>(r: &mut R, len: usize) -> Result<()> {
    let pad = align4(4 + len + 1) - (4 + len + 1);
    r.read_exact(&mut [0u8; 3][..pad])?;
    Ok(())
}

fn read_name<R: Read + ?Sized>(r: &mut R, decoder: &mut StringDecoder) -> Result<String> {
    let name = decoder.read_utf8(r)?;
    skip_name_padding(r, name.len())?;
    Ok(name)
}

/// Record names are matched as raw bytes.  A name that is not UTF-8 is just
/// unknown; the returned string is for reporting only.
fn read_record_name<R: Read + ?Sized>(
    r: &mut R,
    decoder: &mut StringDecoder,
) -> Result<(String, Option<RecordKind>)> {
    let bytes = decoder.read(r)?;
    let kind = std::str::from_utf8(bytes).ok().and_then(RecordKind::from_record_name);
    let name = String::from_utf8_lossy(bytes).into_owned();
    skip_name_padding(r, bytes.len())?;
    Ok((name, kind))
}

fn wire_u32(field: &'static str, value: usize) -> Result<u32> {
    u32::try_from(value).map_err(|_| SioError::EncodingOverflow {
        field,
        value: value as u64,
        max:   u32::MAX as u64,
    })
}

// ── Blocks ───────────────────────────────────────────────────────────────────

/// A typed chunk of fields inside a record.
#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    pub name:    String,
    pub version: VersionId,
    pub payload: Vec<u8>,
}

impl Block {
    pub fn new(name: impl Into<String>, version: VersionId, payload: Vec<u8>) -> Self {
        Self { name: name.into(), version, payload }
    }

    /// Encode a payload with the primitive codec.
    ///
    /// ```
    /// use lcsio::primitive::SioWriteExt;
    /// use lcsio::record::Block;
    /// use lcsio::version::CURRENT;
    ///
    /// let block = Block::build("EventHeader", CURRENT, |w| {
    ///     w.write_int(42)?;
    ///     w.write_string("ILD_l5_v02")
    /// })?;
    /// assert_eq!(block.payload.len(), 4 + 4 + 10 + 1);
    /// # Ok::<(), lcsio::SioError>(())
    /// ```
    pub fn build<F>(name: impl Into<String>, version: VersionId, f: F) -> Result<Self>
    where
        F: FnOnce(&mut Vec<u8>) -> Result<()>,
    {
        let mut payload = Vec::new();
        f(&mut payload)?;
        Ok(Self::new(name, version, payload))
    }

    /// Cursor over the payload for decoding with [`SioReadExt`].
    pub fn reader(&self) -> Cursor<&[u8]> {
        Cursor::new(self.payload.as_slice())
    }

    pub fn encoded_len(&self) -> usize {
        BLOCK_HEADER_FIXED + framed_name_len(&self.name) + self.payload.len()
    }

    fn write_to(&self, out: &mut Vec<u8>) -> Result<()> {
        let len = wire_u32("block length", self.encoded_len())?;
        out.write_uint(BLOCK_MARKER)?;
        out.write_uint(len)?;
        out.write_uint(self.version.raw())?;
        write_name(out, &self.name)?;
        out.write_all(&self.payload)?;
        Ok(())
    }
}

/// A fully decoded record.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordData {
    pub kind:     RecordKind,
    /// Offset of the record header in the stream.
    pub location: u64,
    pub blocks:   Vec<Block>,
}

impl RecordData {
    pub fn block(&self, name: &str) -> Option<&Block> {
        self.blocks.iter().find(|b| b.name == name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RecordRead {
    Unpacked(RecordData),
    /// Record stepped over without reading its data.
    Skipped {
        name:     String,
        kind:     Option<RecordKind>,
        location: u64,
    },
}

impl RecordRead {
    pub fn location(&self) -> u64 {
        match self {
            RecordRead::Unpacked(r)             => r.location,
            RecordRead::Skipped { location, .. } => *location,
        }
    }

    pub fn into_unpacked(self) -> Option<RecordData> {
        match self {
            RecordRead::Unpacked(r) => Some(r),
            RecordRead::Skipped { .. } => None,
        }
    }
}

// ── Writer ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct RecordWriter {
    codec: CodecId,
    level: i32,
}

impl Default for RecordWriter {
    fn default() -> Self {
        Self { codec: CodecId::Zstd, level: DEFAULT_COMPRESSION_LEVEL }
    }
}

impl RecordWriter {
    pub fn new(codec: CodecId, level: i32) -> Self {
        Self { codec, level }
    }

    pub fn from_config(config: &SioConfig) -> Self {
        Self::new(config.codec, config.level)
    }

    /// Write one record at the current position and return its offset.
    ///
    /// The record is compressed iff its registry handle says so.  Every size
    /// is checked before the first byte goes out.
    pub fn write_record<W: Write + Seek + ?Sized>(
        &self,
        stream: &mut W,
        record: &Record,
        blocks: &[Block],
    ) -> Result<u64> {
        self.write_named(stream, record.name(), record.compress(), blocks)
    }

    pub(crate) fn write_named<W: Write + Seek + ?Sized>(
        &self,
        stream:   &mut W,
        name:     &str,
        compress: bool,
        blocks:   &[Block],
    ) -> Result<u64> {
        let location = stream.stream_position()?;

        let mut raw = Vec::with_capacity(blocks.iter().map(Block::encoded_len).sum());
        for block in blocks {
            block.write_to(&mut raw)?;
        }
        let raw_len  = wire_u32("record length", raw.len())?;
        let checksum = crc32fast::hash(&raw);

        let (options, data) = if compress && self.codec != CodecId::None {
            let packed = get_codec(self.codec).compress(&raw, self.level)?;
            (OPT_COMPRESS | (self.codec as u32) << CODEC_SHIFT, packed)
        } else {
            (0, raw)
        };
        let data_len = wire_u32("record data length", data.len())?;

        let mut header = Vec::with_capacity(RECORD_HEADER_FIXED + framed_name_len(name));
        header.write_uint(RECORD_MARKER)?;
        header.write_uint(options)?;
        header.write_uint(data_len)?;
        header.write_uint(raw_len)?;
        header.write_uint(checksum)?;
        write_name(&mut header, name)?;

        stream.write_all(&header)?;
        stream.write_all(&data)?;
        log::debug!(
            "wrote record '{name}' at {location}: {} block(s), {raw_len} -> {data_len} bytes",
            blocks.len()
        );
        Ok(location)
    }
}

// ── Reader ───────────────────────────────────────────────────────────────────

/// Reads records one at a time.  Owns the string decode buffer, so give each
/// stream its own reader.
#[derive(Debug)]
pub struct RecordReader {
    decoder:        StringDecoder,
    max_record_len: u32,
}

impl Default for RecordReader {
    fn default() -> Self {
        Self { decoder: StringDecoder::default(), max_record_len: MAX_RECORD_LEN }
    }
}

/// Read a record marker, distinguishing clean EOF from a torn header.
fn read_marker<R: Read + ?Sized>(r: &mut R) -> Result<Option<u32>> {
    let mut buf = [0u8; 4];
    let mut filled = 0;
    while filled < buf.len() {
        match r.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }
    match filled {
        0 => Ok(None),
        4 => Ok(Some(BigEndian::read_u32(&buf))),
        _ => Err(io::Error::new(io::ErrorKind::UnexpectedEof, "torn record header").into()),
    }
}

impl RecordReader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: &SioConfig) -> Self {
        Self {
            decoder:        StringDecoder::from_config(config),
            max_record_len: config.max_record_len,
        }
    }

    /// Read the record at the current position.
    ///
    /// Returns `Ok(None)` on a clean end of stream.  Records whose kind is not
    /// enabled in `registry` come back as [`RecordRead::Skipped`].  On error
    /// nothing of the record is returned and the stream position is
    /// unspecified.
    pub fn read_next<R: Read + Seek + ?Sized>(
        &mut self,
        stream:   &mut R,
        registry: &RecordRegistry,
    ) -> Result<Option<RecordRead>> {
        self.read_filtered(stream, |kind| registry.is_enabled(kind))
    }

    pub(crate) fn read_filtered<R, F>(&mut self, stream: &mut R, wanted: F) -> Result<Option<RecordRead>>
    where
        R: Read + Seek + ?Sized,
        F: Fn(RecordKind) -> bool,
    {
        let location = stream.stream_position()?;
        let marker = match read_marker(stream)? {
            Some(m) => m,
            None    => return Ok(None),
        };
        if marker != RECORD_MARKER {
            return Err(SioError::malformed(format!(
                "bad record marker {marker:#010x} at offset {location}"
            )));
        }
        let options  = stream.read_uint()?;
        let data_len = stream.read_uint()?;
        let raw_len  = stream.read_uint()?;
        let checksum = stream.read_uint()?;
        let (name, kind) = read_record_name(stream, &mut self.decoder)?;

        if !kind.map_or(false, &wanted) {
            self.skip_data(stream, &name, data_len as u64)?;
            log::debug!("skipped record '{name}' at {location} ({data_len} bytes)");
            return Ok(Some(RecordRead::Skipped { name, kind, location }));
        }
        // `wanted` only accepts known kinds.
        let kind = kind.ok_or_else(|| SioError::malformed("unknown record"))?;
        if raw_len > self.max_record_len {
            return Err(SioError::malformed(format!(
                "record '{name}' declares {raw_len} bytes, ceiling is {}", self.max_record_len
            )));
        }

        let mut data = Vec::new();
        Read::take(&mut *stream, data_len as u64).read_to_end(&mut data)?;
        if data.len() != data_len as usize {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("record '{name}' truncated: {} of {data_len} bytes", data.len()),
            ).into());
        }

        let raw = if options & OPT_COMPRESS != 0 {
            let id = ((options >> CODEC_SHIFT) & 0xFF) as u8;
            get_codec_by_wire(id)?.decompress(&data, raw_len as usize)?
        } else {
            data
        };
        if raw.len() != raw_len as usize {
            return Err(SioError::malformed(format!(
                "record '{name}' inflated to {} bytes, header says {raw_len}", raw.len()
            )));
        }
        if crc32fast::hash(&raw) != checksum {
            log::warn!("checksum mismatch in record '{name}' at {location}");
            return Err(SioError::malformed(format!("record '{name}' checksum mismatch")));
        }

        let blocks = self.parse_blocks(&raw)?;
        Ok(Some(RecordRead::Unpacked(RecordData { kind, location, blocks })))
    }

    /// Step over `len` bytes of record data.  Seeking past the end succeeds on
    /// most streams, so the target is checked against the stream length.
    fn skip_data<R: Read + Seek + ?Sized>(&self, stream: &mut R, name: &str, len: u64) -> Result<()> {
        let start = stream.stream_position().map_err(SioError::SeekFault)?;
        let end = stream.seek(SeekFrom::End(0)).map_err(SioError::SeekFault)?;
        let target = start.saturating_add(len);
        if target > end {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("record '{name}' truncated: {} of {len} bytes", end.saturating_sub(start)),
            ).into());
        }
        stream.seek(SeekFrom::Start(target)).map_err(SioError::SeekFault)?;
        Ok(())
    }

    fn parse_blocks(&mut self, raw: &[u8]) -> Result<Vec<Block>> {
        let mut cur = Cursor::new(raw);
        let mut blocks = Vec::new();
        while (cur.position() as usize) < raw.len() {
            let start = cur.position() as usize;
            let marker = cur.read_uint()?;
            if marker != BLOCK_MARKER {
                return Err(SioError::malformed(format!(
                    "bad block marker {marker:#010x} at record offset {start}"
                )));
            }
            let block_len = cur.read_uint()? as usize;
            let version   = VersionId::from_raw(cur.read_uint()?);
            check_version(version)?;
            let name = read_name(&mut cur, &mut self.decoder)?;

            let body = cur.position() as usize;
            let end  = start.saturating_add(block_len);
            if end < body || end > raw.len() {
                return Err(SioError::malformed(format!(
                    "block '{name}' length {block_len} overruns record"
                )));
            }
            blocks.push(Block::new(name, version, raw[body..end].to_vec()));
            cur.set_position(end as u64);
        }
        Ok(blocks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::Unpack;
    use crate::version::CURRENT;

    fn header_block(event: i32) -> Block {
        Block::build("EventHeader", CURRENT, |w| {
            w.write_int(7)?;
            w.write_int(event)?;
            w.write_long64(1_700_000_000_000_000_000)?;
            w.write_string("ILD")
        })
        .unwrap()
    }

    fn decode_event_number(block: &Block) -> i32 {
        let mut r = block.reader();
        r.read_int().unwrap();
        r.read_int().unwrap()
    }

    #[test]
    fn name_padding() {
        assert_eq!(framed_name_len(""), 8);
        assert_eq!(framed_name_len("abc"), 8);
        assert_eq!(framed_name_len("abcd"), 12);
        assert_eq!(framed_name_len("LCIORandomAccess"), 24);
    }

    #[test]
    fn write_then_read_both_compression_modes() {
        for compress in [false, true] {
            let mut reg = RecordRegistry::new();
            reg.set_compress(compress);
            let mut stream = Cursor::new(Vec::new());
            let writer = RecordWriter::default();
            let at = writer
                .write_record(&mut stream, &reg[RecordKind::Header], &[header_block(3)])
                .unwrap();
            assert_eq!(at, 0);

            stream.set_position(0);
            let mut reader = RecordReader::new();
            let rec = reader.read_next(&mut stream, &reg).unwrap().unwrap();
            let rec = rec.into_unpacked().unwrap();
            assert_eq!(rec.kind, RecordKind::Header);
            assert_eq!(rec.blocks.len(), 1);
            assert_eq!(decode_event_number(rec.block("EventHeader").unwrap()), 3);
            assert!(reader.read_next(&mut stream, &reg).unwrap().is_none());
        }
    }

    #[test]
    fn disabled_record_is_skipped_without_losing_alignment() {
        let mut reg = RecordRegistry::new();
        let writer = RecordWriter::default();
        let mut stream = Cursor::new(Vec::new());
        for event in 0..3 {
            writer.write_record(&mut stream, &reg[RecordKind::Header], &[header_block(event)]).unwrap();
            writer.write_record(&mut stream, &reg[RecordKind::Event], &[header_block(100 + event)]).unwrap();
        }

        stream.set_position(0);
        let scoped = Unpack::new(&mut reg, Unpack::EVENT);
        let mut reader = RecordReader::new();
        let mut seen = Vec::new();
        while let Some(read) = reader.read_next(&mut stream, &scoped).unwrap() {
            match read {
                RecordRead::Unpacked(r) => seen.push(decode_event_number(&r.blocks[0])),
                RecordRead::Skipped { kind, .. } => assert_eq!(kind, Some(RecordKind::Header)),
            }
        }
        assert_eq!(seen, [100, 101, 102]);
    }

    #[test]
    fn unknown_record_is_skipped() {
        let writer = RecordWriter::default();
        let mut stream = Cursor::new(Vec::new());
        writer.write_named(&mut stream, "SomethingNew", true, &[header_block(1)]).unwrap();
        let reg = RecordRegistry::new();
        writer.write_record(&mut stream, &reg[RecordKind::Run], &[header_block(2)]).unwrap();

        stream.set_position(0);
        let mut reader = RecordReader::new();
        let first = reader.read_next(&mut stream, &reg).unwrap().unwrap();
        assert!(matches!(first, RecordRead::Skipped { kind: None, .. }));
        let second = reader.read_next(&mut stream, &reg).unwrap().unwrap();
        assert_eq!(second.into_unpacked().unwrap().kind, RecordKind::Run);
    }

    #[test]
    fn old_block_version_fails_the_record() {
        let reg = RecordRegistry::new();
        let mut stream = Cursor::new(Vec::new());
        let old = Block::new("RunHeader", VersionId::new(0, 4), vec![0; 4]);
        RecordWriter::default().write_record(&mut stream, &reg[RecordKind::Run], &[old]).unwrap();
        stream.set_position(0);
        let err = RecordReader::new().read_next(&mut stream, &reg).unwrap_err();
        assert!(matches!(err, SioError::UnsupportedVersion { .. }));
    }

    #[test]
    fn corrupted_data_fails_checksum() {
        let mut reg = RecordRegistry::new();
        reg.set_compress(false);
        let mut stream = Cursor::new(Vec::new());
        RecordWriter::default()
            .write_record(&mut stream, &reg[RecordKind::Event], &[header_block(9)])
            .unwrap();
        let mut bytes = stream.into_inner();
        let last = bytes.len() - 2;
        bytes[last] ^= 0xFF;
        let err = RecordReader::new().read_next(&mut Cursor::new(bytes), &reg).unwrap_err();
        assert!(matches!(err, SioError::MalformedStream(_)));
    }

    #[test]
    fn truncated_record_is_io_fault() {
        let reg = RecordRegistry::new();
        let mut stream = Cursor::new(Vec::new());
        RecordWriter::default()
            .write_record(&mut stream, &reg[RecordKind::Event], &[header_block(9)])
            .unwrap();
        let mut bytes = stream.into_inner();
        bytes.truncate(bytes.len() - 3);
        let err = RecordReader::new().read_next(&mut Cursor::new(bytes), &reg).unwrap_err();
        assert!(matches!(err, SioError::IoFault(_)));

        let err = RecordReader::new().read_next(&mut Cursor::new(vec![0xAB, 0xAD]), &reg).unwrap_err();
        assert!(matches!(err, SioError::IoFault(_)));
    }

    #[test]
    fn truncation_inside_skipped_record_is_io_fault() {
        let mut reg = RecordRegistry::new();
        reg.set_compress(false);
        let mut stream = Cursor::new(Vec::new());
        let body = Block::new("Event", CURRENT, vec![3u8; 200]);
        RecordWriter::default()
            .write_record(&mut stream, &reg[RecordKind::Event], &[body])
            .unwrap();
        let mut bytes = stream.into_inner();
        bytes.truncate(bytes.len() - 100);

        let scoped = Unpack::new(&mut reg, Unpack::HEADER);
        let err = RecordReader::new().read_next(&mut Cursor::new(bytes), &scoped).unwrap_err();
        assert!(matches!(err, SioError::IoFault(_)));
    }

    #[test]
    fn non_utf8_record_name_is_skipped() {
        let payload = [0u8; 4];
        let mut stream = Cursor::new(Vec::new());
        stream.write_uint(RECORD_MARKER).unwrap();
        stream.write_uint(0).unwrap();
        stream.write_uint(payload.len() as u32).unwrap();
        stream.write_uint(payload.len() as u32).unwrap();
        stream.write_uint(crc32fast::hash(&payload)).unwrap();
        stream.write_string([0xFFu8, 0xFE]).unwrap();
        stream.write_all(&[0]).unwrap();
        stream.write_all(&payload).unwrap();
        let reg = RecordRegistry::new();
        RecordWriter::default().write_record(&mut stream, &reg[RecordKind::Run], &[header_block(2)]).unwrap();

        stream.set_position(0);
        let mut reader = RecordReader::new();
        match reader.read_next(&mut stream, &reg).unwrap().unwrap() {
            RecordRead::Skipped { name, kind, location } => {
                assert_eq!(kind, None);
                assert_eq!(location, 0);
                assert_eq!(name, "\u{FFFD}\u{FFFD}");
            }
            other => panic!("expected skip, got {other:?}"),
        }
        let next = reader.read_next(&mut stream, &reg).unwrap().unwrap();
        assert_eq!(next.into_unpacked().unwrap().kind, RecordKind::Run);
    }

    #[test]
    fn record_over_length_ceiling_is_rejected() {
        let reg = RecordRegistry::new();
        let mut stream = Cursor::new(Vec::new());
        RecordWriter::default()
            .write_record(&mut stream, &reg[RecordKind::Event], &[header_block(1)])
            .unwrap();
        stream.set_position(0);
        let config = SioConfig { max_record_len: 16, ..SioConfig::default() };
        let err = RecordReader::from_config(&config).read_next(&mut stream, &reg).unwrap_err();
        assert!(matches!(err, SioError::MalformedStream(_)));
    }

    #[test]
    fn garbage_marker_is_malformed() {
        let reg = RecordRegistry::new();
        let err = RecordReader::new()
            .read_next(&mut Cursor::new(vec![0u8; 32]), &reg)
            .unwrap_err();
        assert!(matches!(err, SioError::MalformedStream(_)));
    }

    #[test]
    fn multiple_blocks_keep_order() {
        let reg = RecordRegistry::new();
        let blocks = vec![
            header_block(1),
            Block::new("SimTrackerHits", CURRENT, vec![1, 2, 3, 4, 5]),
            Block::new("Empty", CURRENT, Vec::new()),
        ];
        let mut stream = Cursor::new(Vec::new());
        RecordWriter::new(CodecId::Lz4, 0)
            .write_record(&mut stream, &reg[RecordKind::Event], &blocks)
            .unwrap();
        stream.set_position(0);
        let rec = RecordReader::new().read_next(&mut stream, &reg).unwrap().unwrap();
        assert_eq!(rec.into_unpacked().unwrap().blocks, blocks);
    }
}
