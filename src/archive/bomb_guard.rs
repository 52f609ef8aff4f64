//! Decompression-bomb guards (spec.md §4.5): running totals checked during
//! extraction, not after the fact, so a crafted archive can't exhaust
//! memory before anyone notices.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::config::ArchiveCompareOptions;
use crate::error::{Error, ErrorKind, Result};

/// Tracks running totals across a whole archive's extraction and enforces
/// the configured limits.
pub struct BombGuard {
    max_decompressed_bytes: u64,
    max_compression_ratio: u64,
    max_entries: usize,
    max_name_len: usize,
    total_decompressed: AtomicU64,
    entry_count: AtomicU64,
}

impl BombGuard {
    pub fn new(opts: &ArchiveCompareOptions) -> Self {
        Self {
            max_decompressed_bytes: opts.max_decompressed_size,
            max_compression_ratio: opts.max_compression_ratio,
            max_entries: opts.max_entries,
            max_name_len: opts.max_entry_name_length,
            total_decompressed: AtomicU64::new(0),
            entry_count: AtomicU64::new(0),
        }
    }

    /// Called once per entry, before reading its contents.
    pub fn check_entry(&self, name: &str) -> Result<()> {
        let count = self.entry_count.fetch_add(1, Ordering::SeqCst) + 1;
        if count as usize > self.max_entries {
            return Err(Error::new(
                ErrorKind::BombGuardTripped,
                format!("archive exceeds max entry count {}", self.max_entries),
            ));
        }
        if name.len() > self.max_name_len {
            return Err(Error::new(
                ErrorKind::BombGuardTripped,
                format!("entry name exceeds max length {}", self.max_name_len),
            ));
        }
        Ok(())
    }

    /// Called after reading `n` more decompressed bytes of the current
    /// entry. `compressed_bytes_so_far` is the number of bytes consumed
    /// from the underlying compressed stream so far, used for the ratio
    /// check.
    pub fn check_progress(&self, n: u64, compressed_bytes_so_far: u64) -> Result<()> {
        let total = self.total_decompressed.fetch_add(n, Ordering::SeqCst) + n;
        if total > self.max_decompressed_bytes {
            return Err(Error::new(
                ErrorKind::BombGuardTripped,
                format!(
                    "archive exceeds max decompressed size {}",
                    self.max_decompressed_bytes
                ),
            ));
        }
        // Avoid tripping the ratio guard on the first few bytes, where the
        // denominator is too small to mean anything.
        if compressed_bytes_so_far > 64 {
            let ratio = total / compressed_bytes_so_far.max(1);
            if ratio > self.max_compression_ratio {
                return Err(Error::new(
                    ErrorKind::BombGuardTripped,
                    format!(
                        "archive exceeds max compression ratio {}:1",
                        self.max_compression_ratio
                    ),
                ));
            }
        }
        Ok(())
    }
}

/// A `Read` wrapper that counts bytes pulled from the underlying
/// (compressed) stream, shared with the [`BombGuard`] doing the ratio
/// check on the decompressed side.
pub struct CountingReader<R> {
    inner: R,
    count: Arc<AtomicU64>,
}

impl<R: std::io::Read> CountingReader<R> {
    pub fn new(inner: R) -> (Self, Arc<AtomicU64>) {
        let count = Arc::new(AtomicU64::new(0));
        (
            Self {
                inner,
                count: Arc::clone(&count),
            },
            count,
        )
    }
}

impl<R: std::io::Read> std::io::Read for CountingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.count.fetch_add(n as u64, Ordering::SeqCst);
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entry_count_guard_trips() {
        let opts = ArchiveCompareOptions {
            max_entries: 2,
            ..Default::default()
        };
        let guard = BombGuard::new(&opts);
        guard.check_entry("a").unwrap();
        guard.check_entry("b").unwrap();
        assert!(guard.check_entry("c").is_err());
    }

    #[test]
    fn name_length_guard_trips() {
        let opts = ArchiveCompareOptions {
            max_entry_name_length: 4,
            ..Default::default()
        };
        let guard = BombGuard::new(&opts);
        assert!(guard.check_entry("toolong").is_err());
    }

    #[test]
    fn decompressed_size_guard_trips() {
        let opts = ArchiveCompareOptions {
            max_decompressed_size: 100,
            ..Default::default()
        };
        let guard = BombGuard::new(&opts);
        assert!(guard.check_progress(50, 10).is_ok());
        assert!(guard.check_progress(60, 20).is_err());
    }

    #[test]
    fn compression_ratio_guard_trips() {
        let opts = ArchiveCompareOptions {
            max_compression_ratio: 10,
            max_decompressed_size: u64::MAX,
            ..Default::default()
        };
        let guard = BombGuard::new(&opts);
        // 1000 decompressed bytes from 1 compressed byte: ratio 1000:1.
        assert!(guard.check_progress(1000, 100).is_err());
    }
}
