//! The embedded API (spec.md §6): the host-facing entry points this crate
//! exposes, each with a blocking call and a non-blocking `*_start`/`*_result`
//! pair built on the task subsystem (C6).
//!
//! A `source` string is a file path or an `http://`/`https://` URL,
//! determined by prefix match — never by probing the filesystem first,
//! since that would make a remote URL that happens to collide with a local
//! relative path ambiguous.

use std::path::Path;

use crate::archive;
use crate::config::{ArchiveCompareOptions, CompareOptions, DirCompareOptions, DirUrlOptions};
use crate::diff::DiffResult;
use crate::dir;
use crate::engine::compare::{full_compare, quick_check, CompareVerdict, QuickCheckOutcome};
use crate::error::{Error, ErrorKind, Result};
use crate::reader::file::FileReader;
use crate::reader::http::HttpReader;
use crate::reader::Reader;
use crate::task::{self, TaskHandle, TaskOutput};

fn is_url(source: &str) -> bool {
    source.starts_with("http://") || source.starts_with("https://")
}

fn open_source(source: &str, opts: &CompareOptions) -> Result<Box<dyn Reader>> {
    if is_url(source) {
        Ok(Box::new(HttpReader::open(source, opts)?))
    } else {
        Ok(Box::new(FileReader::open(Path::new(source))?))
    }
}

/// Compare two sources (file paths or `http(s)://` URLs) for byte equality.
pub fn compare(source_a: &str, source_b: &str, opts: &CompareOptions) -> Result<CompareVerdict> {
    let opts = opts.clone().validate()?;
    let mut a = open_source(source_a, &opts)?;
    let mut b = open_source(source_b, &opts)?;
    run_pipeline(a.as_mut(), b.as_mut(), &opts)
}

fn run_pipeline(a: &mut dyn Reader, b: &mut dyn Reader, opts: &CompareOptions) -> Result<CompareVerdict> {
    if opts.quick_check {
        match quick_check(a, b, opts.chunk_size)? {
            QuickCheckOutcome::Equal => return Ok(CompareVerdict::Equal),
            QuickCheckOutcome::Different => return Ok(CompareVerdict::Different),
            QuickCheckOutcome::SamplesMatch | QuickCheckOutcome::NotApplicable => {}
        }
    }
    full_compare(a, b, opts.chunk_size, opts.size_precheck)
}

/// Pure in-memory equality check: no reader, no I/O, just `memcmp`.
pub fn compare_buffers(bytes_a: &[u8], bytes_b: &[u8]) -> bool {
    bytes_a == bytes_b
}

/// Compare two directory trees, returning a full [`DiffResult`].
pub fn compare_dir(dir_a: &str, dir_b: &str, opts: &DirCompareOptions) -> Result<DiffResult> {
    dir::compare_dir(Path::new(dir_a), Path::new(dir_b), opts)
}

/// Compare two archive files (optionally gzip-compressed tarballs),
/// returning a full [`DiffResult`].
pub fn compare_archive(path_a: &str, path_b: &str, opts: &ArchiveCompareOptions) -> Result<DiffResult> {
    archive::compare_archive(Path::new(path_a), Path::new(path_b), opts)
}

/// Compare a local directory tree against a caller-supplied map of relative
/// path to URL.
pub fn compare_dir_urls(dir: &str, url_map: &[(String, String)], opts: &DirUrlOptions) -> Result<DiffResult> {
    dir::compare_dir_urls(Path::new(dir), url_map, opts)
}

/// Start an asynchronous [`compare`], returning a [`TaskHandle`] the host
/// polls via its notification fd ([`TaskHandle::notification_fd`]).
pub fn compare_start(source_a: &str, source_b: &str, opts: &CompareOptions) -> Result<TaskHandle> {
    let source_a = source_a.to_string();
    let source_b = source_b.to_string();
    let opts = opts.clone();
    submit(move || compare(&source_a, &source_b, &opts))
}

/// Fetch the result of a task started with [`compare_start`]. Returns an
/// error if the task isn't ready yet or produced a diff result instead of a
/// scalar verdict (which would indicate the wrong `*_result` function was
/// called).
pub fn compare_result(handle: &TaskHandle) -> Result<CompareVerdict> {
    match handle.fetch_result()? {
        TaskOutput::Verdict(v) => Ok(v),
        TaskOutput::Diff(_) => Err(Error::new(
            ErrorKind::InvalidTaskState,
            "compare_result called on a task that produced a diff result",
        )),
    }
}

/// Start an asynchronous [`compare_dir`].
pub fn compare_dir_start(dir_a: &str, dir_b: &str, opts: &DirCompareOptions) -> Result<TaskHandle> {
    let dir_a = dir_a.to_string();
    let dir_b = dir_b.to_string();
    let opts = opts.clone();
    submit(move || compare_dir(&dir_a, &dir_b, &opts))
}

/// Start an asynchronous [`compare_archive`].
pub fn compare_archive_start(path_a: &str, path_b: &str, opts: &ArchiveCompareOptions) -> Result<TaskHandle> {
    let path_a = path_a.to_string();
    let path_b = path_b.to_string();
    let opts = opts.clone();
    submit(move || compare_archive(&path_a, &path_b, &opts))
}

/// Start an asynchronous [`compare_dir_urls`].
pub fn compare_dir_urls_start(
    dir: &str,
    url_map: &[(String, String)],
    opts: &DirUrlOptions,
) -> Result<TaskHandle> {
    let dir = dir.to_string();
    let url_map = url_map.to_vec();
    let opts = opts.clone();
    submit(move || compare_dir_urls(&dir, &url_map, &opts))
}

/// Fetch the result of a task started with [`compare_dir_start`],
/// [`compare_archive_start`], or [`compare_dir_urls_start`].
pub fn diff_result(handle: &TaskHandle) -> Result<DiffResult> {
    match handle.fetch_result()? {
        TaskOutput::Diff(d) => Ok(d),
        TaskOutput::Verdict(_) => Err(Error::new(
            ErrorKind::InvalidTaskState,
            "diff_result called on a task that produced a scalar verdict",
        )),
    }
}

fn submit<F, T>(job: F) -> Result<TaskHandle>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Into<TaskOutput>,
{
    let (handle, worker) = task::new_pair()?;
    let pool = task::global_pool();
    pool.submit(move || {
        let result = job().map(Into::into);
        worker.complete(result);
    });
    Ok(handle)
}

impl From<CompareVerdict> for TaskOutput {
    fn from(v: CompareVerdict) -> Self {
        TaskOutput::Verdict(v)
    }
}

impl From<DiffResult> for TaskOutput {
    fn from(d: DiffResult) -> Self {
        TaskOutput::Diff(d)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn compare_buffers_is_pure_memcmp() {
        assert!(compare_buffers(b"abc", b"abc"));
        assert!(!compare_buffers(b"abc", b"abd"));
    }

    #[test]
    fn compare_identical_files_is_equal() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a");
        let b = dir.path().join("b");
        fs::write(&a, b"same contents").unwrap();
        fs::write(&b, b"same contents").unwrap();

        let opts = CompareOptions::default();
        let verdict = compare(a.to_str().unwrap(), b.to_str().unwrap(), &opts).unwrap();
        assert_eq!(verdict, CompareVerdict::Equal);
    }

    #[test]
    fn compare_different_files_is_different() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a");
        let b = dir.path().join("b");
        fs::write(&a, b"one").unwrap();
        fs::write(&b, b"two").unwrap();

        let opts = CompareOptions::default();
        let verdict = compare(a.to_str().unwrap(), b.to_str().unwrap(), &opts).unwrap();
        assert_eq!(verdict, CompareVerdict::Different);
    }

    #[test]
    fn async_compare_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a");
        let b = dir.path().join("b");
        fs::write(&a, b"payload").unwrap();
        fs::write(&b, b"payload").unwrap();

        let opts = CompareOptions::default();
        let handle = compare_start(a.to_str().unwrap(), b.to_str().unwrap(), &opts).unwrap();
        while !handle.is_ready() {
            std::thread::sleep(std::time::Duration::from_millis(5));
        }
        assert_eq!(compare_result(&handle).unwrap(), CompareVerdict::Equal);
    }
}
