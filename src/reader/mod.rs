//! The polymorphic byte-source abstraction (C1) every higher component
//! consumes: [`Reader`].
//!
//! A `Reader` gives uniform random/sequential byte access over whatever
//! backs it — a memory-mapped file ([`file::FileReader`]), an HTTP(S)
//! resource ([`http::HttpReader`]), or a single entry inside an archive
//! ([`archive_entry::ArchiveEntryReader`]). Every higher layer (the equality
//! engine, the directory/archive differencers) is written against this
//! trait and never against a concrete reader type.

pub mod archive_entry;
pub mod file;
pub mod http;
pub mod http_async;
pub mod membuf;

use crate::error::Result;

/// Outcome of a [`Reader::seek`] attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeekOutcome {
    /// The seek was performed; the next `read` starts at the requested
    /// offset.
    Done,
    /// This reader does not support random access. The caller must fall
    /// back to an algorithm that only needs sequential reads.
    Unsupported,
}

/// A polymorphic byte source.
///
/// # Contract
///
/// - `read` returns the number of bytes written into `buf` (which may be
///   less than `buf.len()`), or `0` on EOF. After `0` is returned, every
///   subsequent call also returns `0` — readers never "come back" from EOF.
/// - `size` returns the exact total byte length when known (file stat size,
///   HTTP `Content-Length`, an archive entry's recorded size), or `None`
///   when the source does not advertise one (chunked HTTP transfer).
/// - `seek` is valid for `0 <= offset <= size` when `size` is known. A
///   reader without random access returns [`SeekOutcome::Unsupported`]
///   rather than erroring; the caller must then choose an algorithm that
///   does not require seek.
/// - `close` releases every native resource the reader holds. Readers are
///   allocated with their context and freed together — there is no shared
///   substrate between them. Double-close is the caller's responsibility to
///   avoid; this trait does not guard against it.
pub trait Reader: Send {
    /// Read up to `buf.len()` bytes, returning the number actually read.
    /// `Ok(0)` means end of stream.
    fn read(&mut self, buf: &mut [u8]) -> Result<usize>;

    /// The exact total byte length, if known up front.
    fn size(&self) -> Option<u64>;

    /// Seek to an absolute byte offset, if this reader supports random
    /// access.
    fn seek(&mut self, offset: u64) -> Result<SeekOutcome>;

    /// Release native resources held by this reader.
    fn close(&mut self) -> Result<()>;

    /// A diagnostic identifier for this source (a path or URL). Not a
    /// capability — purely for error messages and logging.
    fn source_name(&self) -> &str;
}

/// Read every remaining byte from `r` into a freshly allocated `Vec`.
///
/// Used by the archive differencer's materialized strategy, which needs a
/// whole entry in memory to compare it against its counterpart.
pub fn read_to_end(r: &mut dyn Reader, chunk_size: usize) -> Result<Vec<u8>> {
    let mut out = match r.size() {
        Some(n) => Vec::with_capacity(n as usize),
        None => Vec::new(),
    };
    let mut chunk = vec![0u8; chunk_size.max(1)];
    loop {
        let n = r.read(&mut chunk)?;
        if n == 0 {
            break;
        }
        out.extend_from_slice(&chunk[..n]);
    }
    Ok(out)
}
