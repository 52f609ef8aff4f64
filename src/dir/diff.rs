//! Directory compare and directory-vs-URL-map compare (spec.md §4.5):
//! sorted-merge set difference over two walked path lists, dispatching a
//! per-file comparison task for every path common to both sides.

use std::path::Path;

use crate::config::{CompareOptions, DirCompareOptions, DirUrlOptions};
use crate::diff::{DiffReason, DiffResult};
use crate::engine::compare::{full_compare, quick_check, CompareVerdict, QuickCheckOutcome};
use crate::error::{Error, ErrorKind, Result};
use crate::reader::file::FileReader;
use crate::reader::http::HttpReader;
use crate::reader::Reader;
use crate::task::pool::WorkerPool;

use super::walk::{self, walk};

/// Compare two directory trees. Walks both, sorted-merges the two path
/// lists, and compares every path common to both sides.
///
/// Before walking, both roots are canonicalised; if they resolve to the
/// same path, the result is trivially equal (the same-tree short-circuit).
pub fn compare_dir(dir_a: &Path, dir_b: &Path, opts: &DirCompareOptions) -> Result<DiffResult> {
    let opts = opts.clone().validate()?;

    let canon_a = std::fs::canonicalize(dir_a)
        .map_err(|e| Error::new(ErrorKind::NotFound, format!("{}: {e}", dir_a.display())))?;
    let canon_b = std::fs::canonicalize(dir_b)
        .map_err(|e| Error::new(ErrorKind::NotFound, format!("{}: {e}", dir_b.display())))?;
    if canon_a == canon_b {
        return Ok(DiffResult::default());
    }

    let walk_a = walk(&canon_a, opts.follow_symlinks, opts.max_depth)?;
    let walk_b = walk(&canon_b, opts.follow_symlinks, opts.max_depth)?;

    let mut result = DiffResult::default();
    result.errors.extend(walk_a.permission_errors);
    result.errors.extend(walk_b.permission_errors);

    let common = merge(&walk_a.files, &walk_b.files, &mut result);

    let tasks: Vec<(String, std::path::PathBuf, std::path::PathBuf)> = common
        .into_iter()
        .map(|rel| {
            let pa = canon_a.join(&rel);
            let pb = canon_b.join(&rel);
            (rel, pa, pb)
        })
        .collect();

    let outcomes = if opts.max_workers == 1 || tasks.len() <= 1 {
        tasks
            .into_iter()
            .map(|(rel, pa, pb)| (rel, compare_file_pair(&pa, &pb, &opts.compare)))
            .collect::<Vec<_>>()
    } else {
        run_in_pool(tasks, opts.max_workers, &opts.compare)
    };

    for (rel, outcome) in outcomes {
        match outcome {
            Ok(None) => {} // equal
            Ok(Some(reason)) => result.record_diff(rel, reason),
            Err(_) => result.record_diff(rel, DiffReason::ReadError),
        }
    }

    Ok(result)
}

fn merge(left: &[String], right: &[String], result: &mut DiffResult) -> Vec<String> {
    let mut common = Vec::new();
    let (mut i, mut j) = (0, 0);
    while i < left.len() && j < right.len() {
        match left[i].cmp(&right[j]) {
            std::cmp::Ordering::Less => {
                result.only_left.push(left[i].clone());
                i += 1;
            }
            std::cmp::Ordering::Greater => {
                result.only_right.push(right[j].clone());
                j += 1;
            }
            std::cmp::Ordering::Equal => {
                common.push(left[i].clone());
                i += 1;
                j += 1;
            }
        }
    }
    result.only_left.extend(left[i..].iter().cloned());
    result.only_right.extend(right[j..].iter().cloned());
    common
}

fn run_in_pool(
    tasks: Vec<(String, std::path::PathBuf, std::path::PathBuf)>,
    max_workers: usize,
    opts: &CompareOptions,
) -> Vec<(String, Result<Option<DiffReason>>)> {
    use std::sync::{Arc, Mutex};

    let pool = WorkerPool::new(max_workers);
    let results = Arc::new(Mutex::new(Vec::with_capacity(tasks.len())));
    let opts = Arc::new(opts.clone());

    for (rel, pa, pb) in tasks {
        let results = Arc::clone(&results);
        let opts = Arc::clone(&opts);
        pool.submit(move || {
            let outcome = compare_file_pair(&pa, &pb, &opts);
            results.lock().unwrap().push((rel, outcome));
        });
    }
    pool.wait();

    Arc::try_unwrap(results)
        .map(|m| m.into_inner().unwrap())
        .unwrap_or_default()
}

/// Compare a single pair of files, returning `None` for equal, `Some(reason)`
/// for a detected difference.
fn compare_file_pair(
    a: &Path,
    b: &Path,
    opts: &CompareOptions,
) -> Result<Option<DiffReason>> {
    // Same-file short-circuit: if both paths resolve to the same
    // (device, inode), they are trivially identical.
    if let (Ok(ia), Ok(ib)) = (walk::identity(a), walk::identity(b)) {
        if ia == ib {
            return Ok(None);
        }
    }

    let mut ra = FileReader::open(a)?;
    let mut rb = FileReader::open(b)?;

    if let (Some(sa), Some(sb)) = (ra.size(), rb.size()) {
        if sa != sb {
            return Ok(Some(DiffReason::SizeMismatch));
        }
    }

    if opts.quick_check {
        match quick_check(&mut ra, &mut rb, opts.chunk_size)? {
            QuickCheckOutcome::Different => return Ok(Some(DiffReason::ContentMismatch)),
            QuickCheckOutcome::Equal => return Ok(None),
            QuickCheckOutcome::SamplesMatch | QuickCheckOutcome::NotApplicable => {}
        }
    }

    match full_compare(&mut ra, &mut rb, opts.chunk_size, opts.size_precheck)? {
        CompareVerdict::Equal => Ok(None),
        CompareVerdict::Different => Ok(Some(DiffReason::ContentMismatch)),
    }
}

/// Compare a local directory tree against a caller-supplied map of
/// relative path to URL.
pub fn compare_dir_urls(
    dir: &Path,
    url_map: &[(String, String)],
    opts: &DirUrlOptions,
) -> Result<DiffResult> {
    let opts = opts.clone().validate()?;

    let walk_result = walk(dir, false, 0)?;
    let mut local: Vec<String> = walk_result.files;
    local.sort();

    let mut remote: Vec<String> = url_map.iter().map(|(p, _)| p.clone()).collect();
    remote.sort();

    let mut result = DiffResult::default();
    result.errors.extend(walk_result.permission_errors);
    let common = merge(&local, &remote, &mut result);

    let url_for: std::collections::HashMap<&str, &str> = url_map
        .iter()
        .map(|(p, u)| (p.as_str(), u.as_str()))
        .collect();

    for rel in common {
        let url = url_for.get(rel.as_str()).copied().unwrap_or_default();
        let path = dir.join(&rel);
        let outcome = compare_file_against_url(&path, url, &opts.compare);
        match outcome {
            Ok(None) => {}
            Ok(Some(reason)) => result.record_diff(rel, reason),
            Err(_) => result.record_diff(rel, DiffReason::ReadError),
        }
    }

    Ok(result)
}

fn compare_file_against_url(
    path: &Path,
    url: &str,
    opts: &CompareOptions,
) -> Result<Option<DiffReason>> {
    let mut ra = FileReader::open(path)?;
    let mut rb = HttpReader::open(url, opts)?;

    if let (Some(sa), Some(sb)) = (ra.size(), rb.size()) {
        if sa != sb {
            return Ok(Some(DiffReason::SizeMismatch));
        }
    }

    if opts.quick_check {
        match quick_check(&mut ra, &mut rb, opts.chunk_size)? {
            QuickCheckOutcome::Different => return Ok(Some(DiffReason::ContentMismatch)),
            QuickCheckOutcome::Equal => return Ok(None),
            QuickCheckOutcome::SamplesMatch | QuickCheckOutcome::NotApplicable => {}
        }
    }

    match full_compare(&mut ra, &mut rb, opts.chunk_size, opts.size_precheck)? {
        CompareVerdict::Equal => Ok(None),
        CompareVerdict::Different => Ok(Some(DiffReason::ContentMismatch)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn directory_diff_scenario_from_spec() {
        let left = tempfile::tempdir().unwrap();
        let right = tempfile::tempdir().unwrap();

        fs::create_dir_all(left.path().join("a")).unwrap();
        fs::write(left.path().join("a/x"), b"1").unwrap();
        fs::write(left.path().join("a/y"), b"2").unwrap();
        fs::write(left.path().join("z"), b"3").unwrap();

        fs::create_dir_all(right.path().join("a")).unwrap();
        fs::write(right.path().join("a/x"), b"1").unwrap();
        fs::write(right.path().join("a/y"), b"9").unwrap();
        fs::write(right.path().join("w"), b"4").unwrap();

        let opts = DirCompareOptions::default();
        let result = compare_dir(left.path(), right.path(), &opts).unwrap();

        assert!(!result.equal());
        assert_eq!(result.diff.get("a/y"), Some(&DiffReason::ContentMismatch));
        assert_eq!(result.only_left, vec!["z".to_string()]);
        assert_eq!(result.only_right, vec!["w".to_string()]);
    }

    #[test]
    fn identical_trees_compare_equal() {
        let left = tempfile::tempdir().unwrap();
        let right = tempfile::tempdir().unwrap();
        fs::write(left.path().join("a"), b"same").unwrap();
        fs::write(right.path().join("a"), b"same").unwrap();

        let opts = DirCompareOptions::default();
        let result = compare_dir(left.path(), right.path(), &opts).unwrap();
        assert!(result.equal());
    }

    #[test]
    fn same_tree_short_circuit() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a"), b"x").unwrap();
        let opts = DirCompareOptions::default();
        let result = compare_dir(dir.path(), dir.path(), &opts).unwrap();
        assert!(result.equal());
    }
}
