//! A high-throughput byte-equality engine.
//!
//! Decides whether two byte sources are identical, where a source may be a
//! local file, an HTTP(S) resource, an archive, or a directory tree. The
//! crate exposes both a blocking call surface (returning a verdict
//! directly) and a non-blocking surface (returning a [`task::TaskHandle`]
//! and a readiness fd the host can register with its own I/O multiplexer).
//!
//! # Layout
//!
//! - [`reader`] — the polymorphic byte-source abstraction: memory-mapped
//!   files, HTTP(S) resources, archive entries, in-memory buffers.
//! - [`engine`] — the chunked equality comparison (`full_compare`) and the
//!   sampled `quick_check` pre-pass.
//! - [`dir`] — the recursive directory differencer.
//! - [`archive`] — the archive differencer (materialised and hashed
//!   strategies, path sanitisation, decompression-bomb guards).
//! - [`task`] — the worker pool, completion-notification transport, and
//!   task-lifecycle protocol backing the non-blocking API.
//! - [`net`] — the shared HTTP transport and SSRF connect-time filter.
//! - [`api`] — the top-level functions a host actually calls:
//!   [`api::compare`], [`api::compare_dir`], [`api::compare_archive`],
//!   [`api::compare_dir_urls`], [`api::compare_buffers`], and their
//!   asynchronous `*_start` counterparts.
//!
//! Host-runtime bindings, configuration file parsing, a command-line
//! surface, and logging setup are deliberately outside this crate's scope;
//! see the crate-level `config` option structs for what a host is expected
//! to supply instead.

#![warn(
    missing_docs,
    missing_debug_implementations,
    rust_2018_idioms,
    unreachable_pub
)]

pub mod api;
pub mod archive;
pub mod config;
pub mod diff;
pub mod dir;
pub mod engine;
pub mod error;
pub mod net;
pub mod reader;
pub mod task;

pub use api::{
    compare, compare_archive, compare_archive_start, compare_buffers, compare_dir,
    compare_dir_start, compare_dir_urls, compare_dir_urls_start, compare_result, compare_start,
    diff_result,
};
pub use config::{ArchiveCompareOptions, CompareOptions, DirCompareOptions, DirUrlOptions};
pub use diff::{DiffReason, DiffResult};
pub use engine::compare::CompareVerdict;
pub use error::{Error, ErrorKind, Result};
