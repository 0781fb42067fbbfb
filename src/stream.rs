//! The narrow stream capability every construct is written against.
//!
//! Anything that is `Read + Write + Seek` is a [`Stream`]: a `Cursor<Vec<u8>>`
//! for in-memory work, a `File` for on-disk data. Constructs only ever see
//! `&mut dyn Stream`.

use std::io::{Read, Seek, SeekFrom, Write};
use std::ops::{Deref, DerefMut};

use tracing::warn;

use crate::error::{ConstructError, Result};

/// Largest up-front allocation made on the strength of a length read from
/// the data itself; longer reads grow as bytes actually arrive.
pub(crate) const PREALLOC_CAP: usize = 64 * 1024;

pub trait Stream {
    /// Exactly `n` bytes, or `StreamTruncated` if fewer remain.
    fn read_exact_bytes(&mut self, n: usize) -> Result<Vec<u8>>;
    /// Everything up to the end of the stream.
    fn read_remaining(&mut self) -> Result<Vec<u8>>;
    fn write_all_bytes(&mut self, data: &[u8]) -> Result<usize>;
    fn tell(&mut self) -> Result<u64>;
    fn seek_to(&mut self, pos: SeekFrom) -> Result<u64>;
}

impl<T: Read + Write + Seek> Stream for T {
    fn read_exact_bytes(&mut self, n: usize) -> Result<Vec<u8>> {
        let mut buf = Vec::with_capacity(n.min(PREALLOC_CAP));
        Read::take(&mut *self, n as u64).read_to_end(&mut buf)?;
        if buf.len() < n {
            return Err(ConstructError::StreamTruncated { requested: n, available: buf.len() });
        }
        Ok(buf)
    }

    fn read_remaining(&mut self) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        self.read_to_end(&mut buf)?;
        Ok(buf)
    }

    fn write_all_bytes(&mut self, data: &[u8]) -> Result<usize> {
        self.write_all(data)?;
        Ok(data.len())
    }

    fn tell(&mut self) -> Result<u64> {
        Ok(self.stream_position()?)
    }

    fn seek_to(&mut self, pos: SeekFrom) -> Result<u64> {
        Ok(self.seek(pos)?)
    }
}

// ── PositionGuard ────────────────────────────────────────────────────────────

/// Remembers the stream position on creation and seeks back to it when
/// dropped, whether the guarded work succeeded or not.
///
/// Call [`restore`](Self::restore) on the success path to observe a failing
/// seek; the drop-time restore can only log it.
pub struct PositionGuard<'s> {
    stream: &'s mut dyn Stream,
    origin: u64,
    armed:  bool,
}

impl<'s> PositionGuard<'s> {
    pub fn new(stream: &'s mut dyn Stream) -> Result<Self> {
        let origin = stream.tell()?;
        Ok(Self { stream, origin, armed: true })
    }

    pub fn origin(&self) -> u64 {
        self.origin
    }

    pub fn restore(mut self) -> Result<()> {
        self.armed = false;
        self.stream.seek_to(SeekFrom::Start(self.origin))?;
        Ok(())
    }
}

impl<'s> Deref for PositionGuard<'s> {
    type Target = dyn Stream + 's;

    fn deref(&self) -> &Self::Target {
        &*self.stream
    }
}

impl<'s> DerefMut for PositionGuard<'s> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut *self.stream
    }
}

impl Drop for PositionGuard<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        if let Err(e) = self.stream.seek_to(SeekFrom::Start(self.origin)) {
            warn!(origin = self.origin, error = %e, "failed to restore stream position");
        }
    }
}
