//! The completion-notification transport (C6): a single-writer,
//! single-reader fd pair a worker uses to tell the host "this task's result
//! is ready" — without the host ever blocking on the worker directly.
//!
//! - On Linux, a single `eventfd`: one `write` of an 8-byte counter per
//!   task, one `read` by the host to drain it.
//! - On other POSIX systems, a non-blocking, close-on-exec pipe pair.
//!   `SIGPIPE` is blocked around the write so a reader end closed early
//!   (the host freed the task) can't kill the process.
//! - On Windows, a loopback TCP socket pair: bind a listener to
//!   `127.0.0.1:0`, connect a writer to it, accept the reader, drop the
//!   listener. Both ends are switched to non-blocking.

use crate::error::{Error, ErrorKind, Result};

/// The platform's native fd/handle type for this transport: a POSIX `RawFd`
/// everywhere except Windows, where the transport is a Winsock `SOCKET`
/// (released with `closesocket`, never `libc::close`).
#[cfg(unix)]
pub type RawFd = std::os::fd::RawFd;
#[cfg(windows)]
pub type RawFd = std::os::windows::io::RawSocket;

/// The host-facing read end of a notification transport.
#[derive(Debug)]
pub struct NotifyReader {
    fd: RawFd,
    closed: std::sync::atomic::AtomicBool,
}

/// The worker-facing write end of a notification transport.
#[derive(Debug)]
pub struct NotifyWriter {
    fd: RawFd,
    closed: std::sync::atomic::AtomicBool,
}

// SAFETY: these wrap a bare fd/handle used only through read/write/close
// syscalls; no interior mutable state beyond the idempotent-close guard.
unsafe impl Send for NotifyReader {}
unsafe impl Send for NotifyWriter {}

impl NotifyReader {
    /// The raw fd the host should register with its I/O multiplexer,
    /// watching for readability.
    pub fn as_raw_fd(&self) -> RawFd {
        self.fd
    }

    /// Drain the single readiness byte/counter. Idempotent: reading an
    /// already-drained notification simply reports no data (`Ok(false)`).
    pub fn drain(&self) -> Result<bool> {
        drain_fd(self.fd)
    }

    fn close(&self) {
        close_fd(self.fd, &self.closed);
    }
}

impl Drop for NotifyReader {
    fn drop(&mut self) {
        self.close();
    }
}

impl NotifyWriter {
    /// Signal completion: write one readiness unit, waking the host.
    pub fn signal(&self) -> Result<()> {
        signal_fd(self.fd)
    }

    fn close(&self) {
        close_fd(self.fd, &self.closed);
    }
}

impl Drop for NotifyWriter {
    fn drop(&mut self) {
        self.close();
    }
}

/// Release the native fd/handle exactly once, racing the `closed` flag the
/// same way both `close()` methods above did individually. Unix fds go
/// through `libc::close`; Windows sockets must go through `closesocket`
/// instead (`libc::close` on a Winsock `SOCKET` is undefined behavior).
#[cfg(unix)]
fn close_fd(fd: RawFd, closed: &std::sync::atomic::AtomicBool) {
    if closed
        .compare_exchange(
            false,
            true,
            std::sync::atomic::Ordering::SeqCst,
            std::sync::atomic::Ordering::SeqCst,
        )
        .is_ok()
    {
        unsafe {
            libc::close(fd);
        }
    }
}

#[cfg(windows)]
fn close_fd(fd: RawFd, closed: &std::sync::atomic::AtomicBool) {
    use windows_sys::Win32::Networking::WinSock::closesocket;
    if closed
        .compare_exchange(
            false,
            true,
            std::sync::atomic::Ordering::SeqCst,
            std::sync::atomic::Ordering::SeqCst,
        )
        .is_ok()
    {
        unsafe {
            closesocket(fd as usize);
        }
    }
}

#[cfg(target_os = "linux")]
pub fn create_pair() -> Result<(NotifyReader, NotifyWriter)> {
    use nix::sys::eventfd::{eventfd, EfdFlags};

    let fd = eventfd(0, EfdFlags::EFD_NONBLOCK | EfdFlags::EFD_CLOEXEC)
        .map_err(|e| Error::new(ErrorKind::Io, format!("eventfd: {e}")))?;
    let raw: RawFd = std::os::fd::IntoRawFd::into_raw_fd(fd);
    // The eventfd is shared between the two handles; duplicate it so each
    // side's Drop closes its own reference rather than double-closing one.
    let dup = unsafe { libc::dup(raw) };
    if dup < 0 {
        unsafe { libc::close(raw) };
        return Err(Error::new(ErrorKind::Io, "dup of eventfd failed"));
    }
    Ok((
        NotifyReader {
            fd: raw,
            closed: std::sync::atomic::AtomicBool::new(false),
        },
        NotifyWriter {
            fd: dup,
            closed: std::sync::atomic::AtomicBool::new(false),
        },
    ))
}

#[cfg(target_os = "linux")]
fn signal_fd(fd: RawFd) -> Result<()> {
    let one: u64 = 1;
    let n = unsafe {
        libc::write(
            fd,
            &one as *const u64 as *const libc::c_void,
            std::mem::size_of::<u64>(),
        )
    };
    if n < 0 {
        return Err(Error::new(ErrorKind::Io, "eventfd write failed"));
    }
    Ok(())
}

#[cfg(target_os = "linux")]
fn drain_fd(fd: RawFd) -> Result<bool> {
    let mut val: u64 = 0;
    let n = unsafe {
        libc::read(
            fd,
            &mut val as *mut u64 as *mut libc::c_void,
            std::mem::size_of::<u64>(),
        )
    };
    if n < 0 {
        let errno = std::io::Error::last_os_error();
        if errno.kind() == std::io::ErrorKind::WouldBlock {
            return Ok(false);
        }
        return Err(Error::new(ErrorKind::Io, format!("eventfd read failed: {errno}")));
    }
    Ok(n > 0)
}

#[cfg(all(unix, not(target_os = "linux")))]
pub fn create_pair() -> Result<(NotifyReader, NotifyWriter)> {
    use nix::fcntl::{fcntl, FcntlArg, OFlag};
    use nix::unistd::pipe;

    let (read_fd, write_fd) = pipe().map_err(|e| Error::new(ErrorKind::Io, format!("pipe: {e}")))?;
    let read_raw: RawFd = std::os::fd::IntoRawFd::into_raw_fd(read_fd);
    let write_raw: RawFd = std::os::fd::IntoRawFd::into_raw_fd(write_fd);

    for fd in [read_raw, write_raw] {
        let flags = fcntl(fd, FcntlArg::F_GETFL).unwrap_or(0);
        let _ = fcntl(
            fd,
            FcntlArg::F_SETFL(OFlag::from_bits_truncate(flags) | OFlag::O_NONBLOCK),
        );
        let fdflags = fcntl(fd, FcntlArg::F_GETFD).unwrap_or(0);
        let _ = fcntl(
            fd,
            FcntlArg::F_SETFD(nix::fcntl::FdFlag::from_bits_truncate(fdflags) | nix::fcntl::FdFlag::FD_CLOEXEC),
        );
    }

    Ok((
        NotifyReader {
            fd: read_raw,
            closed: std::sync::atomic::AtomicBool::new(false),
        },
        NotifyWriter {
            fd: write_raw,
            closed: std::sync::atomic::AtomicBool::new(false),
        },
    ))
}

#[cfg(all(unix, not(target_os = "linux")))]
fn signal_fd(fd: RawFd) -> Result<()> {
    use nix::sys::signal::{sigprocmask, SigSet, SigmaskHow, Signal};

    // Block SIGPIPE around the write: if the host already closed its end,
    // a write here must report EPIPE, not terminate the process.
    let mut block = SigSet::empty();
    block.add(Signal::SIGPIPE);
    let mut old = SigSet::empty();
    sigprocmask(SigmaskHow::SIG_BLOCK, Some(&block), Some(&mut old))
        .map_err(|e| Error::new(ErrorKind::Io, format!("sigprocmask: {e}")))?;

    let byte = [1u8];
    let n = unsafe { libc::write(fd, byte.as_ptr() as *const libc::c_void, 1) };

    let _ = sigprocmask(SigmaskHow::SIG_SETMASK, Some(&old), None);

    if n < 0 {
        let errno = std::io::Error::last_os_error();
        if errno.kind() == std::io::ErrorKind::BrokenPipe {
            return Ok(());
        }
        return Err(Error::new(ErrorKind::Io, format!("pipe write failed: {errno}")));
    }
    Ok(())
}

#[cfg(all(unix, not(target_os = "linux")))]
fn drain_fd(fd: RawFd) -> Result<bool> {
    let mut buf = [0u8; 1];
    let n = unsafe { libc::read(fd, buf.as_mut_ptr() as *mut libc::c_void, 1) };
    if n < 0 {
        let errno = std::io::Error::last_os_error();
        if errno.kind() == std::io::ErrorKind::WouldBlock {
            return Ok(false);
        }
        return Err(Error::new(ErrorKind::Io, format!("pipe read failed: {errno}")));
    }
    Ok(n > 0)
}

#[cfg(windows)]
pub fn create_pair() -> Result<(NotifyReader, NotifyWriter)> {
    use std::net::{TcpListener, TcpStream};

    let listener = TcpListener::bind("127.0.0.1:0")
        .map_err(|e| Error::new(ErrorKind::Io, format!("bind loopback listener: {e}")))?;
    let addr = listener
        .local_addr()
        .map_err(|e| Error::new(ErrorKind::Io, format!("local_addr: {e}")))?;
    let writer = TcpStream::connect(addr)
        .map_err(|e| Error::new(ErrorKind::Io, format!("connect loopback writer: {e}")))?;
    let (reader, _) = listener
        .accept()
        .map_err(|e| Error::new(ErrorKind::Io, format!("accept loopback reader: {e}")))?;
    drop(listener);

    reader
        .set_nonblocking(true)
        .map_err(|e| Error::new(ErrorKind::Io, format!("set_nonblocking: {e}")))?;
    writer
        .set_nonblocking(true)
        .map_err(|e| Error::new(ErrorKind::Io, format!("set_nonblocking: {e}")))?;

    use std::os::windows::io::IntoRawSocket;
    let read_fd: RawFd = reader.into_raw_socket();
    let write_fd: RawFd = writer.into_raw_socket();

    Ok((
        NotifyReader {
            fd: read_fd,
            closed: std::sync::atomic::AtomicBool::new(false),
        },
        NotifyWriter {
            fd: write_fd,
            closed: std::sync::atomic::AtomicBool::new(false),
        },
    ))
}

#[cfg(windows)]
fn signal_fd(fd: RawFd) -> Result<()> {
    use windows_sys::Win32::Networking::WinSock::send;
    let n = unsafe { send(fd as usize, [1u8].as_ptr(), 1, 0) };
    if n < 0 {
        return Err(Error::new(ErrorKind::Io, "loopback socket write failed"));
    }
    Ok(())
}

#[cfg(windows)]
fn drain_fd(fd: RawFd) -> Result<bool> {
    use windows_sys::Win32::Networking::WinSock::recv;
    let mut buf = [0u8; 1];
    let n = unsafe { recv(fd as usize, buf.as_mut_ptr(), 1, 0) };
    if n < 0 {
        return Ok(false);
    }
    Ok(n > 0)
}

#[cfg(test)]
#[cfg(unix)]
mod tests {
    use super::*;

    #[test]
    fn signal_then_drain_observes_readiness() {
        let (reader, writer) = create_pair().unwrap();
        assert!(!reader.drain().unwrap());
        writer.signal().unwrap();
        assert!(reader.drain().unwrap());
        // Draining again finds nothing new.
        assert!(!reader.drain().unwrap());
    }

    #[test]
    fn writer_can_be_dropped_before_reader_without_signal_failing() {
        let (reader, writer) = create_pair().unwrap();
        writer.signal().unwrap();
        drop(writer);
        assert!(reader.drain().unwrap());
    }
}
