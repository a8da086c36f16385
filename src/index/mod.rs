//! Random access trailer and run/event index records.
//!
//! A file that supports direct access ends with an `LCIORandomAccess`
//! record of exactly [`RANDOM_ACCESS_SIZE`] bytes.  A reader jumps to it with
//! `seek_stream(stream, -RANDOM_ACCESS_SIZE)`, reads the location of the
//! `LCIOIndex` record from it, and from there seeks straight to any run
//! header or event.
//!
//! The random access record is always written uncompressed; its size is part
//! of the on-disk contract and changes only with a format version bump.

use std::collections::BTreeMap;
use std::io::{Read, Seek, Write};

use crate::error::{Result, SioError};
use crate::primitive::{SioReadExt, SioWriteExt};
use crate::record::{Block, RecordData, RecordRead, RecordReader, RecordWriter};
use crate::registry::{RecordKind, ACCESS_BLOCK_NAME, ACCESS_RECORD_NAME, INDEX_BLOCK_NAME};
use crate::stream::seek_stream;
use crate::version::CURRENT;

/// On-disk size of the whole random access record, headers included.
pub const RANDOM_ACCESS_SIZE: usize = 136;
/// Size of the random access block payload.
pub const RANDOM_ACCESS_PAYLOAD_SIZE: usize = 56;

/// Index control word: every entry belongs to the same run.
pub const CONTROL_SINGLE_RUN:   u32 = 0x0000_0001;
/// Index control word: location offsets are stored as `long64`.
pub const CONTROL_LONG_OFFSETS: u32 = 0x0000_0002;

/// Run number plus event number.  Event `-1` denotes the run header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct RunEvent {
    pub run:   i32,
    pub event: i32,
}

impl RunEvent {
    pub const fn new(run: i32, event: i32) -> Self {
        Self { run, event }
    }

    pub const fn run_header(run: i32) -> Self {
        Self { run, event: -1 }
    }

    pub fn is_run_header(&self) -> bool {
        self.event < 0
    }
}

// ── Random access record ────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RandomAccess {
    pub min:                   RunEvent,
    pub max:                   RunEvent,
    pub run_headers:           i32,
    pub events:                i32,
    pub index_location:        i64,
    pub prev_location:         i64,
    pub next_location:         i64,
    pub first_record_location: i64,
}

impl RandomAccess {
    /// Summarise `index`, which was written at `index_location`.
    pub fn for_index(index: &RecordIndex, index_location: i64, first_record_location: i64) -> Self {
        let (run_headers, events) = index.counts();
        Self {
            min: index.min().unwrap_or_default(),
            max: index.max().unwrap_or_default(),
            run_headers,
            events,
            index_location,
            prev_location: 0,
            next_location: 0,
            first_record_location,
        }
    }

    pub fn encode(&self) -> Result<Block> {
        Block::build(ACCESS_BLOCK_NAME, CURRENT, |w| {
            w.write_int(self.min.run)?;
            w.write_int(self.min.event)?;
            w.write_int(self.max.run)?;
            w.write_int(self.max.event)?;
            w.write_int(self.run_headers)?;
            w.write_int(self.events)?;
            w.write_long64(self.index_location)?;
            w.write_long64(self.prev_location)?;
            w.write_long64(self.next_location)?;
            w.write_long64(self.first_record_location)
        })
    }

    pub fn decode(block: &Block) -> Result<Self> {
        if block.payload.len() != RANDOM_ACCESS_PAYLOAD_SIZE {
            return Err(SioError::malformed(format!(
                "random access payload is {} bytes, expected {RANDOM_ACCESS_PAYLOAD_SIZE}",
                block.payload.len()
            )));
        }
        let mut r = block.reader();
        Ok(Self {
            min:                   RunEvent::new(r.read_int()?, r.read_int()?),
            max:                   RunEvent::new(r.read_int()?, r.read_int()?),
            run_headers:           r.read_int()?,
            events:                r.read_int()?,
            index_location:        r.read_long64()?,
            prev_location:         r.read_long64()?,
            next_location:         r.read_long64()?,
            first_record_location: r.read_long64()?,
        })
    }

    fn from_record(record: &RecordData) -> Result<Self> {
        let block = record
            .block(ACCESS_BLOCK_NAME)
            .ok_or_else(|| SioError::malformed("random access record has no access block"))?;
        Self::decode(block)
    }
}

/// Append the random access record at the current position.
pub fn write_random_access<W: Write + Seek + ?Sized>(
    writer: &RecordWriter,
    stream: &mut W,
    access: &RandomAccess,
) -> Result<u64> {
    writer.write_named(stream, ACCESS_RECORD_NAME, false, &[access.encode()?])
}

/// Read the random access record a well-formed file ends with.
///
/// The registry's unpack flags are not consulted: this is an explicit jump.
pub fn read_random_access_at_end<R: Read + Seek + ?Sized>(
    reader: &mut RecordReader,
    stream: &mut R,
) -> Result<RandomAccess> {
    seek_stream(stream, -(RANDOM_ACCESS_SIZE as i64))?;
    read_random_access_here(reader, stream)
}

/// Read a random access record at `location`, e.g. one found through
/// [`RandomAccess::prev_location`].
pub fn read_random_access_at<R: Read + Seek + ?Sized>(
    reader:   &mut RecordReader,
    stream:   &mut R,
    location: i64,
) -> Result<RandomAccess> {
    seek_stream(stream, location)?;
    read_random_access_here(reader, stream)
}

fn read_random_access_here<R: Read + Seek + ?Sized>(
    reader: &mut RecordReader,
    stream: &mut R,
) -> Result<RandomAccess> {
    match reader.read_filtered(stream, |kind| kind == RecordKind::Access)? {
        Some(RecordRead::Unpacked(record)) => RandomAccess::from_record(&record),
        Some(RecordRead::Skipped { name, location, .. }) => Err(SioError::malformed(format!(
            "expected {ACCESS_RECORD_NAME} at {location}, found '{name}'"
        ))),
        None => Err(SioError::malformed("no random access record: stream ended")),
    }
}

// ── Index record ────────────────────────────────────────────────────────────

/// Run/event → record location map, stored as an `LCIOIndex` block.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RecordIndex {
    entries: BTreeMap<RunEvent, i64>,
}

impl RecordIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: RunEvent, location: i64) {
        self.entries.insert(key, location);
    }

    pub fn find(&self, key: RunEvent) -> Option<i64> {
        self.entries.get(&key).copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn min(&self) -> Option<RunEvent> {
        self.entries.keys().next().copied()
    }

    pub fn max(&self) -> Option<RunEvent> {
        self.entries.keys().next_back().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (RunEvent, i64)> + '_ {
        self.entries.iter().map(|(k, v)| (*k, *v))
    }

    /// `(run headers, events)`.
    pub fn counts(&self) -> (i32, i32) {
        let run_headers = self.entries.keys().filter(|k| k.is_run_header()).count();
        let events = self.entries.len() - run_headers;
        (run_headers as i32, events as i32)
    }

    /// Entries are written in run/event order relative to the smallest run
    /// number and the smallest location.
    pub fn encode(&self) -> Result<Block> {
        let run_min = self.entries.keys().map(|k| k.run).min().unwrap_or(0);
        let run_max = self.entries.keys().map(|k| k.run).max().unwrap_or(0);
        let base    = self.entries.values().copied().min().unwrap_or(0);
        let top     = self.entries.values().copied().max().unwrap_or(0);

        let mut control = 0;
        if run_min == run_max {
            control |= CONTROL_SINGLE_RUN;
        }
        if top.saturating_sub(base) > i32::MAX as i64 {
            control |= CONTROL_LONG_OFFSETS;
        }

        Block::build(INDEX_BLOCK_NAME, CURRENT, |w| {
            w.write_uint(control)?;
            w.write_int(run_min)?;
            w.write_long64(base)?;
            w.write_size(self.entries.len())?;
            for (key, location) in &self.entries {
                if control & CONTROL_SINGLE_RUN == 0 {
                    let delta = key.run as i64 - run_min as i64;
                    let delta = i32::try_from(delta).map_err(|_| SioError::EncodingOverflow {
                        field: "index run offset",
                        value: delta as u64,
                        max:   i32::MAX as u64,
                    })?;
                    w.write_int(delta)?;
                }
                w.write_int(key.event)?;
                let offset = location.checked_sub(base).ok_or(SioError::EncodingOverflow {
                    field: "index location offset",
                    value: *location as u64,
                    max:   i64::MAX as u64,
                })?;
                if control & CONTROL_LONG_OFFSETS != 0 {
                    w.write_long64(offset)?;
                } else {
                    w.write_int(offset as i32)?;
                }
            }
            Ok(())
        })
    }

    pub fn decode(block: &Block) -> Result<Self> {
        let mut r = block.reader();
        let control = r.read_uint()?;
        let run_min = r.read_int()?;
        let base    = r.read_long64()?;
        let count   = r.read_size()?;

        let per_entry = 4
            + if control & CONTROL_SINGLE_RUN == 0 { 4 } else { 0 }
            + if control & CONTROL_LONG_OFFSETS != 0 { 8 } else { 4 };
        let remaining = block.payload.len() - r.position() as usize;
        if count.checked_mul(per_entry) != Some(remaining) {
            return Err(SioError::malformed(format!(
                "index declares {count} entries but carries {remaining} bytes"
            )));
        }

        let mut entries = BTreeMap::new();
        for _ in 0..count {
            let run = if control & CONTROL_SINGLE_RUN == 0 {
                run_min.wrapping_add(r.read_int()?)
            } else {
                run_min
            };
            let event = r.read_int()?;
            let offset = if control & CONTROL_LONG_OFFSETS != 0 {
                r.read_long64()?
            } else {
                r.read_int()? as i64
            };
            let location = base.checked_add(offset).ok_or_else(|| {
                SioError::malformed(format!("index offset {offset} overflows base {base}"))
            })?;
            entries.insert(RunEvent::new(run, event), location);
        }
        Ok(Self { entries })
    }
}
