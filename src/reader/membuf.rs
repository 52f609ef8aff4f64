//! An in-memory [`Reader`] over an owned byte buffer.
//!
//! Used internally wherever a component needs to hand something a `Reader`
//! but already has the bytes in hand — `compare_buffers`, and tests that
//! don't want to touch the filesystem or network.

use super::{Reader, SeekOutcome};
use crate::error::Result;

/// A [`Reader`] backed by an in-memory `Vec<u8>`.
#[derive(Debug)]
pub struct MemReader {
    name: String,
    data: Vec<u8>,
    pos: usize,
}

impl MemReader {
    /// Wrap `data` as a reader, identified as `name` in diagnostics.
    pub fn new(name: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            data,
            pos: 0,
        }
    }
}

impl Reader for MemReader {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let remaining = &self.data[self.pos.min(self.data.len())..];
        let n = remaining.len().min(buf.len());
        buf[..n].copy_from_slice(&remaining[..n]);
        self.pos += n;
        Ok(n)
    }

    fn size(&self) -> Option<u64> {
        Some(self.data.len() as u64)
    }

    fn seek(&mut self, offset: u64) -> Result<SeekOutcome> {
        self.pos = (offset as usize).min(self.data.len());
        Ok(SeekOutcome::Done)
    }

    fn close(&mut self) -> Result<()> {
        Ok(())
    }

    fn source_name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_full_contents_in_chunks() {
        let mut r = MemReader::new("mem", b"hello world".to_vec());
        let mut buf = [0u8; 4];
        let mut out = Vec::new();
        loop {
            let n = r.read(&mut buf).unwrap();
            if n == 0 {
                break;
            }
            out.extend_from_slice(&buf[..n]);
        }
        assert_eq!(out, b"hello world");
    }

    #[test]
    fn seek_then_read() {
        let mut r = MemReader::new("mem", b"0123456789".to_vec());
        r.seek(5).unwrap();
        let mut buf = [0u8; 3];
        assert_eq!(r.read(&mut buf).unwrap(), 3);
        assert_eq!(&buf, b"567");
    }

    #[test]
    fn eof_is_sticky() {
        let mut r = MemReader::new("mem", b"ab".to_vec());
        let mut buf = [0u8; 8];
        assert_eq!(r.read(&mut buf).unwrap(), 2);
        assert_eq!(r.read(&mut buf).unwrap(), 0);
        assert_eq!(r.read(&mut buf).unwrap(), 0);
    }
}
