//! Record/block serialization layer for LCIO event data on SIO streams.
//!
//! The crate covers the typed primitive protocol ([`primitive`]), record and
//! block framing ([`record`]), the registry of known records with scoped
//! unpack overrides ([`registry`]), the version gate ([`version`]), name
//! sanitising ([`names`]), stream positioning ([`stream`]) and the random
//! access trailer ([`index`]).  Streams are always owned by the caller.

pub mod error;
pub mod config;
pub mod version;
pub mod names;
pub mod primitive;
pub mod codec;
pub mod stream;
pub mod registry;
pub mod record;
pub mod index;
pub mod migration;

/// File name extension of LCIO-SIO files.
pub const FILE_EXTENSION: &str = ".slcio";

pub use error::{Result, SioError, Status};
pub use config::SioConfig;
pub use version::{check_version, VersionId};
pub use names::valid_sio_name;
pub use primitive::{SioReadExt, SioWriteExt, StringDecoder};
pub use stream::{seek_stream, StreamHandle};
pub use registry::{RecordKind, RecordRegistry, Unpack};
pub use record::{Block, RecordRead, RecordReader, RecordWriter};
pub use index::{RandomAccess, RecordIndex, RunEvent, RANDOM_ACCESS_SIZE};
