//! The memory-mapped local file reader (C2), with page-fault isolation.
//!
//! A regular file is mapped for its entire length; reads become plain
//! memory copies out of the mapping. If a file is truncated by another
//! process while mapped, touching the truncated tail raises `SIGBUS`. This
//! module installs a process-wide handler that recovers from a `SIGBUS`
//! taken during an *armed* copy by remapping the faulting page with a
//! zero-filled anonymous page and letting execution resume — the copy
//! completes (reading zeros for the truncated tail), and the read call
//! reports the fault as a [`crate::error::ErrorKind::Truncated`] error.
//!
//! Files that are empty, or that fail to map for any reason, fall back to
//! ordinary positional `pread`/`lseek` access.

use std::cell::Cell;
use std::fs::File;
use std::os::fd::{AsRawFd, BorrowedFd, RawFd};
use std::ptr::NonNull;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Once;

use nix::sys::mman::{mmap, madvise, munmap, MapFlags, MmapAdvise, ProtFlags};
use nix::sys::signal::{sigaction, SaFlags, SigAction, SigHandler, SigSet, Signal};
use nix::sys::stat::{fstat, SFlag};
use nix::unistd::{lseek64, read as nix_read, Whence};

use super::{Reader, SeekOutcome};
use crate::error::{Error, ErrorKind, Result};

thread_local! {
    static ARMED: Cell<bool> = const { Cell::new(false) };
    static FAULTED: Cell<bool> = const { Cell::new(false) };
}

static HANDLER_INSTALLED: AtomicBool = AtomicBool::new(false);
static HANDLER_INIT: Once = Once::new();

/// Page size, queried once and cached.
fn page_size() -> usize {
    static PAGE_SIZE: std::sync::OnceLock<usize> = std::sync::OnceLock::new();
    *PAGE_SIZE.get_or_init(|| {
        let sz = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
        if sz > 0 {
            sz as usize
        } else {
            4096
        }
    })
}

extern "C" fn sigbus_handler(
    _sig: libc::c_int,
    info: *mut libc::siginfo_t,
    _ucontext: *mut libc::c_void,
) {
    let armed = ARMED.with(|a| a.get());
    if !armed {
        // Not ours. Restore the default disposition and let the process die
        // the way it would have without this handler installed.
        unsafe {
            libc::signal(libc::SIGBUS, libc::SIG_DFL);
            libc::raise(libc::SIGBUS);
        }
        return;
    }

    let fault_addr = unsafe { (*info).si_addr() } as usize;
    let ps = page_size();
    let page_base = fault_addr & !(ps - 1);

    // Paper over the faulting page with a zero-filled anonymous mapping so
    // the instruction that faulted can retry and complete. The read() call
    // still reports this as a truncation error via the FAULTED flag.
    //
    // Deliberately leave ARMED set: a single copy_from_slice spanning
    // multiple pages can fault more than once (a chunk_size read commonly
    // spans many pages), and each subsequent fault must still see this
    // handler as "ours". Only read() itself disarms, once the whole copy
    // has returned.
    unsafe {
        let _ = libc::mmap(
            page_base as *mut libc::c_void,
            ps,
            libc::PROT_READ,
            libc::MAP_FIXED | libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
            -1,
            0,
        );
    }
    FAULTED.with(|f| f.set(true));
}

fn ensure_handler_installed() -> Result<()> {
    let mut install_err = None;
    HANDLER_INIT.call_once(|| {
        let handler = SigHandler::SigAction(sigbus_handler);
        let action = SigAction::new(handler, SaFlags::SA_SIGINFO, SigSet::empty());
        match unsafe { sigaction(Signal::SIGBUS, &action) } {
            Ok(_) => HANDLER_INSTALLED.store(true, Ordering::SeqCst),
            Err(e) => install_err = Some(e),
        }
    });
    if let Some(e) = install_err {
        return Err(Error::new(
            ErrorKind::Io,
            format!("failed to install SIGBUS handler: {e}"),
        ));
    }
    Ok(())
}

#[derive(Debug)]
enum Backend {
    Mapped { ptr: NonNull<u8>, len: usize },
    Positional { fd: RawFd },
}

/// A [`Reader`] over a local regular file.
#[derive(Debug)]
pub struct FileReader {
    _file: File,
    backend: Backend,
    size: u64,
    offset: u64,
    source: String,
}

// SAFETY: the mapping is read-only and never aliased mutably; the raw fd is
// only touched through nix/libc calls that are themselves thread-safe.
unsafe impl Send for FileReader {}

impl FileReader {
    /// Open `path` as a file reader, mapping it if possible.
    pub fn open(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)
            .map_err(|e| Error::new(ErrorKind::NotFound, format!("{}: {e}", path.display())))?;

        let st = fstat(unsafe { BorrowedFd::borrow_raw(file.as_raw_fd()) })
            .map_err(|e| Error::new(ErrorKind::Io, format!("fstat {}: {e}", path.display())))?;
        let mode = SFlag::from_bits_truncate(st.st_mode);
        if !mode.contains(SFlag::S_IFREG) {
            return Err(Error::new(
                ErrorKind::NotRegularFile,
                format!("{} is not a regular file", path.display()),
            ));
        }
        let size = st.st_size as u64;

        let backend = if size > 0 {
            match Self::try_map(&file, size as usize) {
                Some(ptr) => {
                    ensure_handler_installed()?;
                    unsafe {
                        let _ = madvise(ptr, size as usize, MmapAdvise::MADV_SEQUENTIAL);
                    }
                    Backend::Mapped {
                        ptr: ptr.cast(),
                        len: size as usize,
                    }
                }
                None => Backend::Positional { fd: file.as_raw_fd() },
            }
        } else {
            Backend::Positional { fd: file.as_raw_fd() }
        };

        Ok(Self {
            _file: file,
            backend,
            size,
            offset: 0,
            source: path.display().to_string(),
        })
    }

    fn try_map(file: &File, len: usize) -> Option<NonNull<std::ffi::c_void>> {
        let len_nz = std::num::NonZeroUsize::new(len)?;
        unsafe {
            mmap(
                None,
                len_nz,
                ProtFlags::PROT_READ,
                MapFlags::MAP_PRIVATE,
                file,
                0,
            )
            .ok()
        }
    }
}

impl Drop for FileReader {
    fn drop(&mut self) {
        if let Backend::Mapped { ptr, len } = self.backend {
            unsafe {
                let _ = munmap(ptr.cast(), len);
            }
        }
    }
}

impl Reader for FileReader {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        if self.offset >= self.size {
            return Ok(0);
        }
        let remaining = (self.size - self.offset) as usize;
        let to_read = remaining.min(buf.len());

        match self.backend {
            Backend::Mapped { ptr, .. } => {
                ARMED.with(|a| a.set(true));
                FAULTED.with(|f| f.set(false));

                let src = unsafe {
                    std::slice::from_raw_parts(
                        ptr.as_ptr().add(self.offset as usize),
                        to_read,
                    )
                };
                buf[..to_read].copy_from_slice(src);

                ARMED.with(|a| a.set(false));
                if FAULTED.with(|f| f.get()) {
                    return Err(Error::new(
                        ErrorKind::Truncated,
                        format!("{}: file truncated while mapped", self.source),
                    ));
                }
            }
            Backend::Positional { fd } => {
                let n = nix_read(unsafe { BorrowedFd::borrow_raw(fd) }, &mut buf[..to_read]).map_err(|e| {
                    Error::new(ErrorKind::Io, format!("{}: read: {e}", self.source))
                })?;
                self.offset += n as u64;
                return Ok(n);
            }
        }

        self.offset += to_read as u64;
        Ok(to_read)
    }

    fn size(&self) -> Option<u64> {
        Some(self.size)
    }

    fn seek(&mut self, offset: u64) -> Result<SeekOutcome> {
        if offset > self.size {
            return Err(Error::new(
                ErrorKind::InvalidOption,
                format!("seek offset {offset} exceeds size {}", self.size),
            ));
        }
        match self.backend {
            Backend::Mapped { .. } => {
                self.offset = offset;
            }
            Backend::Positional { fd } => {
                lseek64(unsafe { BorrowedFd::borrow_raw(fd) }, offset as i64, Whence::SeekSet).map_err(|e| {
                    Error::new(ErrorKind::Io, format!("{}: lseek: {e}", self.source))
                })?;
                self.offset = offset;
            }
        }
        Ok(SeekOutcome::Done)
    }

    fn close(&mut self) -> Result<()> {
        if let Backend::Mapped { ptr, len } = self.backend {
            unsafe {
                munmap(ptr.cast(), len)
                    .map_err(|e| Error::new(ErrorKind::Io, format!("munmap: {e}")))?;
            }
            self.backend = Backend::Positional { fd: -1 };
        }
        Ok(())
    }

    fn source_name(&self) -> &str {
        &self.source
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn truncation_mid_read_is_reported_not_fatal() {
        // Multi-page file: exercises the SIGBUS handler firing more than
        // once within a single copy_from_slice (one fault per truncated
        // page), which requires ARMED to stay set across every fault in
        // the same read() call, not just the first.
        let ps = page_size();
        let total = ps * 4;
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(&vec![0xABu8; total]).unwrap();
        f.flush().unwrap();

        let mut r = FileReader::open(f.path()).unwrap();
        assert_eq!(r.size(), Some(total as u64));

        // Truncate out from under the mapping after opening; the mapping
        // still spans the original length, so reading past the new length
        // faults.
        let truncator = std::fs::OpenOptions::new().write(true).open(f.path()).unwrap();
        truncator.set_len(ps as u64).unwrap();
        drop(truncator);

        let mut buf = vec![0u8; total];
        let err = r.read(&mut buf).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Truncated);
    }

    #[test]
    fn reads_small_file_fully() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(b"hello world").unwrap();
        f.flush().unwrap();

        let mut r = FileReader::open(f.path()).unwrap();
        assert_eq!(r.size(), Some(11));
        let mut out = Vec::new();
        let mut buf = [0u8; 4];
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
    fn empty_file_reads_zero() {
        let f = tempfile::NamedTempFile::new().unwrap();
        let mut r = FileReader::open(f.path()).unwrap();
        assert_eq!(r.size(), Some(0));
        let mut buf = [0u8; 8];
        assert_eq!(r.read(&mut buf).unwrap(), 0);
    }

    #[test]
    fn seek_then_read() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(b"0123456789").unwrap();
        f.flush().unwrap();

        let mut r = FileReader::open(f.path()).unwrap();
        r.seek(5).unwrap();
        let mut buf = [0u8; 3];
        assert_eq!(r.read(&mut buf).unwrap(), 3);
        assert_eq!(&buf, b"567");
    }

    #[test]
    fn directory_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let err = FileReader::open(dir.path()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotRegularFile);
    }

    #[test]
    fn missing_file_is_not_found() {
        let err = FileReader::open("/nonexistent/path/does-not-exist").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }
}
