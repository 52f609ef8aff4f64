//! Archive-to-archive comparison (spec.md §4.5): two strategies with
//! identical external behavior but different memory profiles, both built on
//! top of the same entry-listing pass.
//!
//! Archives are read with [`tar::Archive`], transparently gzip-decoded with
//! [`flate2`] when the leading bytes look like a gzip member. Entries are
//! streamed once, in archive order — there is no random access into a tar
//! stream, so both strategies collect a sorted table before merging.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use flate2::read::GzDecoder;
use tar::Archive;

use crate::config::ArchiveCompareOptions;
use crate::diff::{DiffReason, DiffResult};
use crate::error::{Error, ErrorKind, Result};

use super::bomb_guard::{BombGuard, CountingReader};
use super::fnv::DualFnv;
use super::sanitize::sanitize_entry_name;

/// A single archive entry reduced to what the hashed strategy needs to
/// compare it: its size and its dual hash. The materialised strategy keeps
/// the bytes too ([`Listing::bytes`]).
struct Listed {
    size: u64,
    hash: (u64, u64),
    bytes: Option<Vec<u8>>,
}

/// Stream every entry of the archive at `path`, applying path sanitisation
/// and bomb guards, and return a sorted-by-name table.
///
/// `keep_bytes` selects the materialised strategy (entries kept in memory)
/// versus the hashed strategy (only size + dual hash retained).
fn list_archive(path: &Path, opts: &ArchiveCompareOptions, keep_bytes: bool) -> Result<BTreeMap<String, Listed>> {
    let file = File::open(path)?;
    let guard = BombGuard::new(opts);

    let mut magic = [0u8; 2];
    let mut peek = File::open(path)?;
    let is_gzip = peek.read_exact(&mut magic).is_ok() && magic == [0x1f, 0x8b];

    let mut listing = BTreeMap::new();

    if is_gzip {
        let (counting, compressed_count) = CountingReader::new(file);
        let decoder = GzDecoder::new(counting);
        let mut archive = Archive::new(decoder);
        read_entries(&mut archive, &guard, &compressed_count, keep_bytes, &mut listing)?;
    } else {
        let (counting, compressed_count) = CountingReader::new(file);
        let mut archive = Archive::new(counting);
        read_entries(&mut archive, &guard, &compressed_count, keep_bytes, &mut listing)?;
    }

    Ok(listing)
}

fn read_entries<R: Read>(
    archive: &mut Archive<R>,
    guard: &BombGuard,
    compressed_count: &std::sync::Arc<std::sync::atomic::AtomicU64>,
    keep_bytes: bool,
    listing: &mut BTreeMap<String, Listed>,
) -> Result<()> {
    use std::sync::atomic::Ordering;

    let entries = archive
        .entries()
        .map_err(|e| Error::new(ErrorKind::Io, format!("reading archive: {e}")))?;

    for entry in entries {
        let mut entry =
            entry.map_err(|e| Error::new(ErrorKind::Io, format!("reading archive entry: {e}")))?;

        if !entry.header().entry_type().is_file() {
            continue; // directories, symlinks, devices: not byte-comparable
        }

        let raw_path = entry
            .path()
            .map_err(|e| Error::new(ErrorKind::UnsafeArchivePath, format!("{e}")))?
            .into_owned();
        let name = sanitize_entry_name(&raw_path)?;
        guard.check_entry(&name)?;

        let mut hasher = DualFnv::new();
        let mut size: u64 = 0;
        let mut bytes = keep_bytes.then(Vec::new);
        let mut chunk = [0u8; 64 * 1024];
        loop {
            let n = entry
                .read(&mut chunk)
                .map_err(|e| Error::new(ErrorKind::Io, format!("reading entry {name}: {e}")))?;
            if n == 0 {
                break;
            }
            size += n as u64;
            hasher.update(&chunk[..n]);
            if let Some(buf) = bytes.as_mut() {
                buf.extend_from_slice(&chunk[..n]);
            }
            guard.check_progress(n as u64, compressed_count.load(Ordering::SeqCst))?;
        }

        listing.insert(
            name,
            Listed {
                size,
                hash: hasher.finish(),
                bytes,
            },
        );
    }

    Ok(())
}

/// Compare two archives, returning the standard [`DiffResult`].
pub fn compare_archive(path_a: &Path, path_b: &Path, opts: &ArchiveCompareOptions) -> Result<DiffResult> {
    let opts = opts.clone().validate()?;
    let keep_bytes = !opts.hash_compare;

    let left = list_archive(path_a, &opts, keep_bytes)?;
    let right = list_archive(path_b, &opts, keep_bytes)?;

    let mut result = DiffResult::default();
    let mut left_iter = left.into_iter().peekable();
    let mut right_iter = right.into_iter().peekable();

    loop {
        match (left_iter.peek(), right_iter.peek()) {
            (Some((ln, _)), Some((rn, _))) => match ln.cmp(rn) {
                std::cmp::Ordering::Less => {
                    let (name, _) = left_iter.next().unwrap();
                    result.only_left.push(name);
                }
                std::cmp::Ordering::Greater => {
                    let (name, _) = right_iter.next().unwrap();
                    result.only_right.push(name);
                }
                std::cmp::Ordering::Equal => {
                    let (name, l) = left_iter.next().unwrap();
                    let (_, r) = right_iter.next().unwrap();
                    if l.size != r.size {
                        result.record_diff(name, DiffReason::SizeMismatch);
                    } else if let (Some(lb), Some(rb)) = (&l.bytes, &r.bytes) {
                        if lb != rb {
                            result.record_diff(name, DiffReason::ContentMismatch);
                        }
                    } else if l.hash != r.hash {
                        result.record_diff(name, DiffReason::ContentMismatch);
                    }
                }
            },
            (Some(_), None) => {
                let (name, _) = left_iter.next().unwrap();
                result.only_left.push(name);
            }
            (None, Some(_)) => {
                let (name, _) = right_iter.next().unwrap();
                result.only_right.push(name);
            }
            (None, None) => break,
        }
    }

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_tar(path: &Path, entries: &[(&str, &[u8])]) {
        let file = File::create(path).unwrap();
        let mut builder = tar::Builder::new(file);
        for (name, data) in entries {
            let mut header = tar::Header::new_gnu();
            header.set_size(data.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder.append_data(&mut header, name, *data).unwrap();
        }
        builder.finish().unwrap();
    }

    fn write_targz(path: &Path, entries: &[(&str, &[u8])]) {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        write_tar(tmp.path(), entries);
        let raw = std::fs::read(tmp.path()).unwrap();
        let out = File::create(path).unwrap();
        let mut encoder = flate2::write::GzEncoder::new(out, flate2::Compression::default());
        encoder.write_all(&raw).unwrap();
        encoder.finish().unwrap();
    }

    #[test]
    fn identical_archives_compare_equal_materialised() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.tar");
        let b = dir.path().join("b.tar");
        write_tar(&a, &[("x", b"one"), ("dir/y", b"two")]);
        write_tar(&b, &[("x", b"one"), ("dir/y", b"two")]);

        let opts = ArchiveCompareOptions::default();
        let result = compare_archive(&a, &b, &opts).unwrap();
        assert!(result.equal());
    }

    #[test]
    fn content_mismatch_is_detected_materialised() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.tar");
        let b = dir.path().join("b.tar");
        write_tar(&a, &[("x", b"one")]);
        write_tar(&b, &[("x", b"two")]);

        let opts = ArchiveCompareOptions::default();
        let result = compare_archive(&a, &b, &opts).unwrap();
        assert_eq!(result.diff.get("x"), Some(&DiffReason::ContentMismatch));
    }

    #[test]
    fn content_mismatch_is_detected_hashed() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.tar");
        let b = dir.path().join("b.tar");
        write_tar(&a, &[("x", b"one")]);
        write_tar(&b, &[("x", b"two")]);

        let opts = ArchiveCompareOptions {
            hash_compare: true,
            ..Default::default()
        };
        let result = compare_archive(&a, &b, &opts).unwrap();
        assert_eq!(result.diff.get("x"), Some(&DiffReason::ContentMismatch));
    }

    #[test]
    fn only_left_and_only_right_are_reported() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.tar");
        let b = dir.path().join("b.tar");
        write_tar(&a, &[("only_a", b"1")]);
        write_tar(&b, &[("only_b", b"2")]);

        let opts = ArchiveCompareOptions::default();
        let result = compare_archive(&a, &b, &opts).unwrap();
        assert_eq!(result.only_left, vec!["only_a".to_string()]);
        assert_eq!(result.only_right, vec!["only_b".to_string()]);
    }

    #[test]
    fn gzip_archives_are_decoded_transparently() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.tar.gz");
        let b = dir.path().join("b.tar.gz");
        write_targz(&a, &[("x", b"same")]);
        write_targz(&b, &[("x", b"same")]);

        let opts = ArchiveCompareOptions::default();
        let result = compare_archive(&a, &b, &opts).unwrap();
        assert!(result.equal());
    }

    #[test]
    fn entry_count_bomb_guard_aborts_compare() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.tar");
        let b = dir.path().join("b.tar");
        write_tar(&a, &[("x", b"1"), ("y", b"2"), ("z", b"3")]);
        write_tar(&b, &[("x", b"1"), ("y", b"2"), ("z", b"3")]);

        let opts = ArchiveCompareOptions {
            max_entries: 2,
            ..Default::default()
        };
        let err = compare_archive(&a, &b, &opts).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BombGuardTripped);
    }
}
