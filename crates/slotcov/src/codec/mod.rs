//! Binary codecs for per-test coverage data.
//!
//! - [`rle`]: run-length encoding of per-slot hit counters
//! - [`recording`]: the per-test recording file wrapping an encoded counter stream
//!
//! All multi-byte values are big-endian.

pub mod recording;
pub mod rle;

pub use recording::{read_recording, ExitStatus, PerTestRecording, RecordingHeader};
pub use rle::{
    read_counters, write_rle, write_uncompressed, DecodedCounters, DEFAULT_MAX_COUNTERS,
};

use crate::result::{SlotcovError, SlotcovResult};

/// Cursor over an in-memory byte stream.
///
/// Running off the end is reported as [`SlotcovError::RecordingCorrupt`]
/// rather than an I/O error: the bytes are already loaded, so a short read
/// means the stream itself is damaged.
#[derive(Debug)]
pub(crate) struct ByteReader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    pub(crate) fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    pub(crate) fn position(&self) -> usize {
        self.pos
    }

    pub(crate) fn remaining(&self) -> &'a [u8] {
        &self.bytes[self.pos..]
    }

    fn take<const N: usize>(&mut self, what: &str) -> SlotcovResult<[u8; N]> {
        let end = self.pos + N;
        let chunk = self.bytes.get(self.pos..end).ok_or_else(|| {
            SlotcovError::corrupt(format!(
                "stream ends at byte {} while reading {what}",
                self.bytes.len()
            ))
        })?;
        let mut buf = [0u8; N];
        buf.copy_from_slice(chunk);
        self.pos = end;
        Ok(buf)
    }

    pub(crate) fn read_u8(&mut self, what: &str) -> SlotcovResult<u8> {
        Ok(self.take::<1>(what)?[0])
    }

    pub(crate) fn read_i32(&mut self, what: &str) -> SlotcovResult<i32> {
        Ok(i32::from_be_bytes(self.take(what)?))
    }

    pub(crate) fn read_u32(&mut self, what: &str) -> SlotcovResult<u32> {
        Ok(u32::from_be_bytes(self.take(what)?))
    }

    pub(crate) fn read_i64(&mut self, what: &str) -> SlotcovResult<i64> {
        Ok(i64::from_be_bytes(self.take(what)?))
    }

    pub(crate) fn read_f64(&mut self, what: &str) -> SlotcovResult<f64> {
        Ok(f64::from_be_bytes(self.take(what)?))
    }

    /// Length-prefixed (`u32`) UTF-8 string
    pub(crate) fn read_string(&mut self, what: &str) -> SlotcovResult<String> {
        let len = self.read_u32(what)? as usize;
        let end = self.pos + len;
        let chunk = self.bytes.get(self.pos..end).ok_or_else(|| {
            SlotcovError::corrupt(format!("{what} declares {len} bytes past end of stream"))
        })?;
        let text = std::str::from_utf8(chunk)
            .map_err(|e| SlotcovError::corrupt(format!("{what} is not UTF-8: {e}")))?;
        self.pos = end;
        Ok(text.to_string())
    }
}
