//! Stream handle state and the absolute/from-end positioner.

use std::io::{self, Read, Seek, SeekFrom, Write};

use crate::error::{Result, SioError};

/// Seek to `pos` bytes from the start, or `|pos|` bytes before the end when
/// `pos` is negative.  Returns the new absolute position.
pub fn seek_stream<S: Seek + ?Sized>(stream: &mut S, pos: i64) -> Result<u64> {
    let target = if pos >= 0 {
        SeekFrom::Start(pos as u64)
    } else {
        SeekFrom::End(pos)
    };
    let at = stream.seek(target).map_err(SioError::SeekFault)?;
    log::trace!("seek {pos} -> {at}");
    Ok(at)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    Open,
    Closed,
}

/// An externally owned stream as the reader/writer façade hands it over.
///
/// While open, all I/O is forwarded to the inner stream.  Once closed, every
/// read, write and seek fails with `io::ErrorKind::NotConnected`.
#[derive(Debug)]
pub struct StreamHandle<S> {
    name:  String,
    inner: Option<S>,
}

impl<S> StreamHandle<S> {
    pub fn open(name: impl Into<String>, inner: S) -> Self {
        Self { name: name.into(), inner: Some(inner) }
    }

    pub fn name(&self) -> &str { &self.name }

    pub fn state(&self) -> StreamState {
        if self.inner.is_some() { StreamState::Open } else { StreamState::Closed }
    }

    pub fn is_open(&self) -> bool {
        self.inner.is_some()
    }

    /// Close the handle and give the inner stream back to its owner.
    pub fn close(&mut self) -> Option<S> {
        self.inner.take()
    }

    fn live(&mut self) -> io::Result<&mut S> {
        let name = &self.name;
        self.inner.as_mut().ok_or_else(|| {
            io::Error::new(io::ErrorKind::NotConnected, format!("stream '{name}' is not open"))
        })
    }
}

impl<S: Read> Read for StreamHandle<S> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.live()?.read(buf)
    }
}

impl<S: Write> Write for StreamHandle<S> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.live()?.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.live()?.flush()
    }
}

impl<S: Seek> Seek for StreamHandle<S> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.live()?.seek(pos)
    }
}
