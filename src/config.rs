//! Configuration surface: the typed option structs every comparison
//! operation takes, plus their defaults and validation.
//!
//! These are plain data — no file or environment parsing lives here. A host
//! embedding this crate builds one of these from whatever configuration
//! source it already has and passes it in.

use crate::error::{Error, ErrorKind, Result};

/// Default chunk size used when streaming bytes between two readers, in
/// bytes.
pub const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;

/// Default maximum directory recursion depth.
pub const DEFAULT_MAX_DEPTH: usize = 256;

/// Default maximum number of HTTP redirects followed.
pub const DEFAULT_MAX_REDIRECTS: usize = 10;

/// Default archive decompression bomb guard: maximum total decompressed
/// bytes across all entries.
pub const DEFAULT_MAX_DECOMPRESSED_BYTES: u64 = 1024 * 1024 * 1024;

/// Default archive decompression bomb guard: maximum allowed ratio of
/// decompressed to compressed bytes for a single entry.
pub const DEFAULT_MAX_COMPRESSION_RATIO: u64 = 200;

/// Default archive decompression bomb guard: maximum number of entries.
pub const DEFAULT_MAX_ENTRIES: usize = 100_000;

/// Default archive decompression bomb guard: maximum entry name length, in
/// bytes.
pub const DEFAULT_MAX_NAME_LEN: usize = 4096;

/// Connect-phase timeout ceiling; the effective connect timeout is
/// `min(timeout, this)`.
pub const MAX_CONNECT_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(10);

fn validate_header(name: &str, value: &str) -> Result<()> {
    if name.bytes().any(|b| b == b'\r' || b == b'\n')
        || value.bytes().any(|b| b == b'\r' || b == b'\n')
    {
        return Err(Error::new(
            ErrorKind::InvalidOption,
            format!("header {name:?} contains a CR or LF byte"),
        ));
    }
    Ok(())
}

/// Options controlling a single byte-equality comparison between two
/// sources (file, HTTP, or in-memory buffer).
#[derive(Debug, Clone)]
pub struct CompareOptions {
    /// Bytes read per chunk while streaming a comparison. `0` normalizes to
    /// [`DEFAULT_CHUNK_SIZE`] during [`CompareOptions::validate`].
    pub chunk_size: usize,
    /// If both sources' sizes are known up front, a mismatch short-circuits
    /// the comparison as DIFFERENT without reading any bytes.
    pub size_precheck: bool,
    /// If both readers are seekable with a known size, sample three offsets
    /// (start, midpoint, last chunk) before committing to a full compare.
    pub quick_check: bool,
    /// Extra HTTP headers sent with every request this comparison makes.
    pub headers: Vec<(String, String)>,
    /// Overall wall-clock timeout for the comparison. The connect phase is
    /// separately bounded by `min(timeout, `[`MAX_CONNECT_TIMEOUT`]`)`.
    pub timeout: std::time::Duration,
    /// Follow HTTP redirects, up to [`DEFAULT_MAX_REDIRECTS`], restricted to
    /// `http`/`https` targets.
    pub follow_redirects: bool,
    /// Verify TLS certificates. Defaults to `true`; disabling this is only
    /// ever appropriate against a host the caller controls.
    pub verify_ssl: bool,
    /// Permit connections to private, loopback, and link-local addresses.
    /// Defaults to `false` (SSRF filtering enabled).
    pub allow_private: bool,
    /// An optional HTTP/HTTPS proxy URL applied to requests this comparison
    /// makes.
    pub proxy: Option<String>,
}

impl Default for CompareOptions {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            size_precheck: true,
            quick_check: true,
            headers: Vec::new(),
            timeout: std::time::Duration::from_secs(300),
            follow_redirects: true,
            verify_ssl: true,
            allow_private: false,
            proxy: None,
        }
    }
}

impl CompareOptions {
    /// Normalize and validate these options, returning the normalized form.
    ///
    /// A `chunk_size` of `0` is normalized to [`DEFAULT_CHUNK_SIZE`] rather
    /// than rejected; everything else that's invalid is an error.
    pub fn validate(mut self) -> Result<Self> {
        if self.chunk_size == 0 {
            self.chunk_size = DEFAULT_CHUNK_SIZE;
        }
        for (name, value) in &self.headers {
            validate_header(name, value)?;
        }
        if let Some(proxy) = &self.proxy {
            url::Url::parse(proxy)
                .map_err(|e| Error::new(ErrorKind::InvalidOption, format!("invalid proxy url: {e}")))?;
        }
        Ok(self)
    }

    /// The effective connect-phase timeout: `min(timeout, MAX_CONNECT_TIMEOUT)`.
    pub fn connect_timeout(&self) -> std::time::Duration {
        self.timeout.min(MAX_CONNECT_TIMEOUT)
    }
}

/// Options controlling a recursive directory-to-directory comparison.
#[derive(Debug, Clone)]
pub struct DirCompareOptions {
    /// Options applied to each individual file comparison the walk
    /// performs.
    pub compare: CompareOptions,
    /// Maximum recursion depth. `0` normalizes to [`DEFAULT_MAX_DEPTH`].
    pub max_depth: usize,
    /// Number of worker threads used to compare files in parallel. `0`
    /// means "choose automatically" (`min(cores, 8)`).
    pub max_workers: usize,
    /// Follow symlinks encountered during the walk. Loop detection via
    /// `(device, inode)` tracking applies only when this is set.
    pub follow_symlinks: bool,
}

impl Default for DirCompareOptions {
    fn default() -> Self {
        Self {
            compare: CompareOptions::default(),
            max_depth: DEFAULT_MAX_DEPTH,
            max_workers: 0,
            follow_symlinks: false,
        }
    }
}

impl DirCompareOptions {
    /// Normalize and validate these options.
    pub fn validate(mut self) -> Result<Self> {
        self.compare = self.compare.validate()?;
        if self.max_depth == 0 {
            self.max_depth = DEFAULT_MAX_DEPTH;
        }
        Ok(self)
    }
}

/// Options controlling a directory-vs-remote-URL-manifest comparison
/// (`compare_dir_urls`).
#[derive(Debug, Clone)]
pub struct DirUrlOptions {
    /// Options applied to each individual file-vs-URL comparison.
    pub compare: CompareOptions,
    /// Number of worker threads used for parallel fetch-and-compare.
    pub max_workers: usize,
}

impl Default for DirUrlOptions {
    fn default() -> Self {
        Self {
            compare: CompareOptions::default(),
            max_workers: 0,
        }
    }
}

impl DirUrlOptions {
    /// Normalize and validate these options.
    pub fn validate(mut self) -> Result<Self> {
        self.compare = self.compare.validate()?;
        Ok(self)
    }
}

/// Options controlling an archive-to-archive comparison.
#[derive(Debug, Clone)]
pub struct ArchiveCompareOptions {
    /// Chunk size used when materializing/hashing entry bytes.
    pub chunk_size: usize,
    /// Archive compare uses the O(entry-count) hashed strategy instead of
    /// materializing both archives in full.
    pub hash_compare: bool,
    /// Maximum total decompressed bytes across all entries combined. `0`
    /// normalizes to [`DEFAULT_MAX_DECOMPRESSED_BYTES`].
    pub max_decompressed_size: u64,
    /// Maximum allowed decompressed:compressed ratio for a single entry. `0`
    /// normalizes to [`DEFAULT_MAX_COMPRESSION_RATIO`].
    pub max_compression_ratio: u64,
    /// Maximum number of entries an archive may contain. `0` normalizes to
    /// [`DEFAULT_MAX_ENTRIES`].
    pub max_entries: usize,
    /// Maximum entry name length, in bytes. `0` normalizes to
    /// [`DEFAULT_MAX_NAME_LEN`].
    pub max_entry_name_length: usize,
}

impl Default for ArchiveCompareOptions {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            hash_compare: false,
            max_decompressed_size: DEFAULT_MAX_DECOMPRESSED_BYTES,
            max_compression_ratio: DEFAULT_MAX_COMPRESSION_RATIO,
            max_entries: DEFAULT_MAX_ENTRIES,
            max_entry_name_length: DEFAULT_MAX_NAME_LEN,
        }
    }
}

impl ArchiveCompareOptions {
    /// Normalize and validate these options.
    pub fn validate(mut self) -> Result<Self> {
        if self.chunk_size == 0 {
            self.chunk_size = DEFAULT_CHUNK_SIZE;
        }
        if self.max_decompressed_size == 0 {
            self.max_decompressed_size = DEFAULT_MAX_DECOMPRESSED_BYTES;
        }
        if self.max_compression_ratio == 0 {
            self.max_compression_ratio = DEFAULT_MAX_COMPRESSION_RATIO;
        }
        if self.max_entries == 0 {
            self.max_entries = DEFAULT_MAX_ENTRIES;
        }
        if self.max_entry_name_length == 0 {
            self.max_entry_name_length = DEFAULT_MAX_NAME_LEN;
        }
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_chunk_size_normalizes_to_default() {
        let opts = CompareOptions {
            chunk_size: 0,
            ..Default::default()
        }
        .validate()
        .unwrap();
        assert_eq!(opts.chunk_size, DEFAULT_CHUNK_SIZE);
    }

    #[test]
    fn crlf_in_header_is_rejected() {
        let opts = CompareOptions {
            headers: vec![("X-Evil".to_string(), "a\r\nSet-Cookie: x".to_string())],
            ..Default::default()
        };
        let err = opts.validate().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidOption);
    }

    #[test]
    fn invalid_proxy_url_is_rejected() {
        let opts = CompareOptions {
            proxy: Some("not a url".to_string()),
            ..Default::default()
        };
        assert!(opts.validate().is_err());
    }

    #[test]
    fn connect_timeout_is_capped() {
        let opts = CompareOptions {
            timeout: std::time::Duration::from_secs(600),
            ..Default::default()
        };
        assert_eq!(opts.connect_timeout(), MAX_CONNECT_TIMEOUT);
        let opts = CompareOptions {
            timeout: std::time::Duration::from_secs(2),
            ..Default::default()
        };
        assert_eq!(opts.connect_timeout(), std::time::Duration::from_secs(2));
    }

    #[test]
    fn archive_options_zero_fields_normalize() {
        let opts = ArchiveCompareOptions {
            max_decompressed_size: 0,
            max_compression_ratio: 0,
            max_entries: 0,
            max_entry_name_length: 0,
            ..Default::default()
        }
        .validate()
        .unwrap();
        assert_eq!(opts.max_decompressed_size, DEFAULT_MAX_DECOMPRESSED_BYTES);
        assert_eq!(opts.max_compression_ratio, DEFAULT_MAX_COMPRESSION_RATIO);
        assert_eq!(opts.max_entries, DEFAULT_MAX_ENTRIES);
        assert_eq!(opts.max_entry_name_length, DEFAULT_MAX_NAME_LEN);
    }
}
