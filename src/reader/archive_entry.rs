//! A single archive entry exposed as a [`Reader`] (spec.md §4.2's reader
//! abstraction applied to archive members, supplementing the archive
//! differencer so entries can be fed through the same equality engine used
//! for files and HTTP resources).
//!
//! A tar entry is only readable once, forward-only, from the underlying
//! archive stream — there is no seeking back into the middle of a `tar`
//! reader. This wraps an entry already buffered into memory (by
//! [`crate::archive::compare`]'s materialised strategy) so it can still
//! offer random access like any other [`Reader`].

use super::{Reader, SeekOutcome};
use crate::error::Result;

/// A [`Reader`] over one archive entry's bytes, already materialised in
/// memory.
#[derive(Debug)]
pub struct ArchiveEntryReader {
    name: String,
    data: Vec<u8>,
    pos: usize,
}

impl ArchiveEntryReader {
    /// Wrap an entry's decoded bytes, identified as `entry_name` (the
    /// sanitised path within the archive) in diagnostics.
    pub fn new(entry_name: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            name: entry_name.into(),
            data,
            pos: 0,
        }
    }
}

impl Reader for ArchiveEntryReader {
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
    fn reads_entry_bytes() {
        let mut r = ArchiveEntryReader::new("dir/file.txt", b"payload".to_vec());
        let mut buf = [0u8; 16];
        let n = r.read(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"payload");
        assert_eq!(r.source_name(), "dir/file.txt");
    }

    #[test]
    fn seek_then_read_matches_file_and_mem_readers() {
        let mut r = ArchiveEntryReader::new("e", b"0123456789".to_vec());
        r.seek(4).unwrap();
        let mut buf = [0u8; 3];
        assert_eq!(r.read(&mut buf).unwrap(), 3);
        assert_eq!(&buf, b"456");
    }
}
