//! Catalogue of known LCIO-SIO records and their unpack flags.
//!
//! The registry is an ordinary value.  Each reader or writer is handed a
//! registry by reference; there is no process-wide instance.  To decode a
//! subset of records for one pass, wrap the registry in an [`Unpack`] guard:
//! the flags in force before the guard are restored when it drops, whether
//! the scope ends normally, by `?`, or by unwinding.
//!
//! ```
//! use lcsio::registry::{RecordKind, RecordRegistry, Unpack};
//!
//! let mut registry = RecordRegistry::new();
//! {
//!     let scoped = Unpack::new(&mut registry, Unpack::HEADER);
//!     assert!(scoped.is_enabled(RecordKind::Header));
//!     assert!(!scoped.is_enabled(RecordKind::Event));
//! }
//! assert!(registry.is_enabled(RecordKind::Event));
//! ```
//!
//! Overlaid streams (signal + background) share one registry by nesting or
//! by strictly alternating guards.  The registry is not synchronised; a
//! thread that needs its own flags needs its own registry.

use std::ops::{Deref, DerefMut, Index};

use crate::config::{SioConfig, COMPRESSION};
use crate::error::{Result, SioError};

pub const RUN_RECORD_NAME:    &str = "LCRunHeader";
pub const RUN_BLOCK_NAME:     &str = "RunHeader";
pub const EVENT_RECORD_NAME:  &str = "LCEvent";
pub const EVENT_BLOCK_NAME:   &str = "Event";
pub const HEADER_RECORD_NAME: &str = "LCEventHeader";
pub const HEADER_BLOCK_NAME:  &str = "EventHeader";
pub const ACCESS_RECORD_NAME: &str = "LCIORandomAccess";
pub const ACCESS_BLOCK_NAME:  &str = "LCIORandomAccess";
pub const INDEX_RECORD_NAME:  &str = "LCIOIndex";
pub const INDEX_BLOCK_NAME:   &str = "LCIOIndex";

pub const NUMBER_OF_RECORDS: usize = 5;

/// Known record kinds.  The discriminant is the bit position in an unpack
/// mask and never changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(usize)]
pub enum RecordKind {
    Event  = 0,
    Header = 1,
    Run    = 2,
    Access = 3,
    Index  = 4,
}

impl RecordKind {
    pub const ALL: [RecordKind; NUMBER_OF_RECORDS] = [
        RecordKind::Event,
        RecordKind::Header,
        RecordKind::Run,
        RecordKind::Access,
        RecordKind::Index,
    ];

    pub fn from_index(index: usize) -> Result<Self> {
        Self::ALL
            .get(index)
            .copied()
            .ok_or(SioError::InvalidRecordKind { index, count: NUMBER_OF_RECORDS })
    }

    #[inline]
    pub const fn bit(self) -> u32 {
        1 << self as u32
    }

    pub fn record_name(self) -> &'static str {
        match self {
            RecordKind::Event  => EVENT_RECORD_NAME,
            RecordKind::Header => HEADER_RECORD_NAME,
            RecordKind::Run    => RUN_RECORD_NAME,
            RecordKind::Access => ACCESS_RECORD_NAME,
            RecordKind::Index  => INDEX_RECORD_NAME,
        }
    }

    pub fn block_name(self) -> &'static str {
        match self {
            RecordKind::Event  => EVENT_BLOCK_NAME,
            RecordKind::Header => HEADER_BLOCK_NAME,
            RecordKind::Run    => RUN_BLOCK_NAME,
            RecordKind::Access => ACCESS_BLOCK_NAME,
            RecordKind::Index  => INDEX_BLOCK_NAME,
        }
    }

    pub fn from_record_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.record_name() == name)
    }
}

/// Registry-owned handle for one record kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    kind:     RecordKind,
    unpack:   bool,
    compress: bool,
}

impl Record {
    fn new(kind: RecordKind, compress: bool) -> Self {
        Self { kind, unpack: true, compress }
    }

    pub fn kind(&self) -> RecordKind { self.kind }
    pub fn name(&self) -> &'static str { self.kind.record_name() }
    pub fn block_name(&self) -> &'static str { self.kind.block_name() }
    pub fn unpack(&self) -> bool { self.unpack }
    pub fn compress(&self) -> bool { self.compress }

    pub fn set_unpack(&mut self, flag: bool) {
        self.unpack = flag;
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordRegistry {
    records: [Record; NUMBER_OF_RECORDS],
}

impl Default for RecordRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordRegistry {
    /// Every record enabled, compression at the library default.
    pub fn new() -> Self {
        Self::with_compress(COMPRESSION)
    }

    pub fn from_config(config: &SioConfig) -> Self {
        Self::with_compress(config.compress)
    }

    fn with_compress(compress: bool) -> Self {
        Self { records: RecordKind::ALL.map(|k| Record::new(k, compress)) }
    }

    /// Bounds-checked lookup by raw index.
    pub fn get(&self, index: usize) -> Result<&Record> {
        self.records
            .get(index)
            .ok_or(SioError::InvalidRecordKind { index, count: NUMBER_OF_RECORDS })
    }

    pub fn get_mut(&mut self, index: usize) -> Result<&mut Record> {
        self.records
            .get_mut(index)
            .ok_or(SioError::InvalidRecordKind { index, count: NUMBER_OF_RECORDS })
    }

    pub fn record(&self, kind: RecordKind) -> &Record {
        &self.records[kind as usize]
    }

    pub fn by_name(&self, record_name: &str) -> Option<&Record> {
        RecordKind::from_record_name(record_name).map(|k| self.record(k))
    }

    pub fn is_enabled(&self, kind: RecordKind) -> bool {
        self.records[kind as usize].unpack
    }

    pub fn records(&self) -> impl Iterator<Item = &Record> {
        self.records.iter()
    }

    /// Current unpack vector, indexed by kind.
    pub fn unpack_flags(&self) -> [bool; NUMBER_OF_RECORDS] {
        self.records.clone().map(|r| r.unpack)
    }

    /// Current unpack vector as a mask.
    pub fn unpack_mask(&self) -> u32 {
        self.records
            .iter()
            .filter(|r| r.unpack)
            .fold(0, |mask, r| mask | r.kind.bit())
    }

    fn apply_flags(&mut self, flags: [bool; NUMBER_OF_RECORDS]) {
        for (record, flag) in self.records.iter_mut().zip(flags) {
            record.unpack = flag;
        }
    }

    fn apply_mask(&mut self, mask: u32) {
        for record in self.records.iter_mut() {
            record.unpack = mask & record.kind.bit() != 0;
        }
    }

    /// Toggle compression for every record.  Unpack flags are untouched.
    pub fn set_compress(&mut self, flag: bool) {
        for record in self.records.iter_mut() {
            record.compress = flag;
        }
    }
}

impl Index<RecordKind> for RecordRegistry {
    type Output = Record;

    fn index(&self, kind: RecordKind) -> &Record {
        self.record(kind)
    }
}

// ── Scoped override ──────────────────────────────────────────────────────────

/// Scoped unpack override.  Sets each record's unpack flag from a mask and
/// restores the previous flags exactly once, on drop.
///
/// The guard dereferences to the registry, so guards nest:
/// `Unpack::new(&mut outer_guard, mask)` borrows through the outer guard and
/// the borrow checker enforces LIFO unwinding.
#[derive(Debug)]
pub struct Unpack<'a> {
    registry: &'a mut RecordRegistry,
    saved:    [bool; NUMBER_OF_RECORDS],
}

impl<'a> Unpack<'a> {
    pub const EVENT:  u32 = RecordKind::Event.bit();
    pub const HEADER: u32 = RecordKind::Header.bit();
    pub const RUN:    u32 = RecordKind::Run.bit();
    pub const ACCESS: u32 = RecordKind::Access.bit();
    pub const INDEX:  u32 = RecordKind::Index.bit();
    pub const ALL:    u32 = 0xFFFF_FFFF;

    pub fn new(registry: &'a mut RecordRegistry, mask: u32) -> Self {
        let saved = registry.unpack_flags();
        registry.apply_mask(mask);
        log::debug!("unpack override {:#07b} (was {saved:?})", registry.unpack_mask());
        Self { registry, saved }
    }

    /// Flags that will be restored when this guard drops.
    pub fn saved(&self) -> [bool; NUMBER_OF_RECORDS] {
        self.saved
    }
}

impl Deref for Unpack<'_> {
    type Target = RecordRegistry;

    fn deref(&self) -> &RecordRegistry {
        self.registry
    }
}

impl DerefMut for Unpack<'_> {
    fn deref_mut(&mut self) -> &mut RecordRegistry {
        self.registry
    }
}

impl Drop for Unpack<'_> {
    fn drop(&mut self) {
        self.registry.apply_flags(self.saved);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bits_match_discriminants() {
        assert_eq!(Unpack::EVENT, 0x01);
        assert_eq!(Unpack::HEADER, 0x02);
        assert_eq!(Unpack::RUN, 0x04);
        assert_eq!(Unpack::ACCESS, 0x08);
        assert_eq!(Unpack::INDEX, 0x10);
        for kind in RecordKind::ALL {
            assert_eq!(kind.bit(), 1 << kind as usize);
        }
    }

    #[test]
    fn default_has_everything_enabled() {
        let reg = RecordRegistry::new();
        assert!(RecordKind::ALL.iter().all(|&k| reg.is_enabled(k)));
        assert_eq!(reg.unpack_mask(), 0x1F);
    }

    #[test]
    fn out_of_range_index_is_rejected() {
        let reg = RecordRegistry::new();
        assert_eq!(reg.get(2).unwrap().name(), RUN_RECORD_NAME);
        let err = reg.get(NUMBER_OF_RECORDS).unwrap_err();
        assert!(matches!(err, SioError::InvalidRecordKind { index: 5, count: 5 }));
        assert!(RecordKind::from_index(17).is_err());
    }

    #[test]
    fn event_and_header_only() {
        let mut reg = RecordRegistry::new();
        reg.get_mut(RecordKind::Run as usize).unwrap().set_unpack(false);
        let before = reg.unpack_flags();
        {
            let scoped = Unpack::new(&mut reg, Unpack::EVENT | Unpack::HEADER);
            let enabled: Vec<_> = RecordKind::ALL
                .into_iter()
                .filter(|&k| scoped.is_enabled(k))
                .collect();
            assert_eq!(enabled, [RecordKind::Event, RecordKind::Header]);
        }
        assert_eq!(reg.unpack_flags(), before);
        assert!(!reg.is_enabled(RecordKind::Run));
    }

    #[test]
    fn nested_overrides_unwind_lifo() {
        let mut reg = RecordRegistry::new();
        let original = reg.unpack_flags();
        {
            let mut outer = Unpack::new(&mut reg, Unpack::RUN);
            let after_outer = outer.unpack_flags();
            assert_eq!(after_outer, [false, false, true, false, false]);
            {
                let inner = Unpack::new(&mut outer, Unpack::EVENT | Unpack::INDEX);
                assert_eq!(inner.unpack_flags(), [true, false, false, false, true]);
                assert_eq!(inner.saved(), after_outer);
            }
            assert_eq!(outer.unpack_flags(), after_outer);
        }
        assert_eq!(reg.unpack_flags(), original);
    }

    #[test]
    fn restored_on_early_return() {
        fn failing_pass(reg: &mut RecordRegistry) -> Result<()> {
            let scoped = Unpack::new(reg, Unpack::ACCESS);
            scoped.get(99)?;
            Ok(())
        }
        let mut reg = RecordRegistry::new();
        assert!(failing_pass(&mut reg).is_err());
        assert_eq!(reg.unpack_mask(), 0x1F);
    }

    #[test]
    fn restored_on_unwind() {
        let mut reg = RecordRegistry::new();
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _scoped = Unpack::new(&mut reg, 0);
            panic!("decoder blew up");
        }));
        assert!(result.is_err());
        assert_eq!(reg.unpack_mask(), 0x1F);
    }

    #[test]
    fn set_compress_leaves_unpack_alone() {
        let mut reg = RecordRegistry::new();
        reg.get_mut(0).unwrap().set_unpack(false);
        reg.set_compress(false);
        assert!(reg.records().all(|r| !r.compress()));
        assert!(!reg[RecordKind::Event].unpack());
        assert!(reg[RecordKind::Header].unpack());
    }

    #[test]
    fn lookup_by_record_name() {
        let reg = RecordRegistry::new();
        assert_eq!(reg.by_name("LCEventHeader").unwrap().kind(), RecordKind::Header);
        assert_eq!(reg.by_name("LCIOIndex").unwrap().block_name(), INDEX_BLOCK_NAME);
        assert!(reg.by_name("Unknown").is_none());
    }
}
