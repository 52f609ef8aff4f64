//! Descriptor-relative recursive directory walk (spec.md §4.5).
//!
//! Opens the root as a directory descriptor, then recurses using
//! descriptor-relative `openat`/`fstatat` calls — this amortises path
//! resolution and, combined with the `(device, inode)` pairs it reads off
//! each directory, is what makes symlink-loop detection possible at all.
//! Depth is capped at [`crate::config::DEFAULT_MAX_DEPTH`] to bound
//! pathological trees (and cycles that would otherwise evade the loop
//! check). Output is the sorted list of relative paths of regular files.

use std::os::fd::{AsRawFd, BorrowedFd};
use std::path::{Path, PathBuf};

use nix::dir::{Dir, Type};
use nix::errno::Errno;
use nix::fcntl::OFlag;
use nix::sys::stat::{fstat, fstatat, Mode};

use super::visited::VisitedSet;
use crate::error::{Error, ErrorKind, Result};

/// The outcome of a directory walk.
#[derive(Debug, Default)]
pub struct WalkResult {
    /// Sorted (bytewise) relative paths of every regular file found.
    pub files: Vec<String>,
    /// Relative paths (of directories or files) skipped because `stat` or
    /// `open` failed with a permission error. Non-fatal.
    pub permission_errors: Vec<String>,
}

/// `(st_dev, st_ino)` identity for the same-tree/same-file short-circuits.
pub fn identity(path: &Path) -> Result<(u64, u64)> {
    let st = nix::sys::stat::stat(path)
        .map_err(|e| Error::new(ErrorKind::Io, format!("stat {}: {e}", path.display())))?;
    Ok((st.st_dev as u64, st.st_ino as u64))
}

/// Walk `root`, returning the sorted list of regular-file relative paths.
pub fn walk(root: &Path, follow_symlinks: bool, max_depth: usize) -> Result<WalkResult> {
    let max_depth = if max_depth == 0 {
        crate::config::DEFAULT_MAX_DEPTH
    } else {
        max_depth
    };

    let mut result = WalkResult::default();
    let mut visited = VisitedSet::new();

    let root_dir = Dir::open(root, OFlag::O_RDONLY | OFlag::O_DIRECTORY, Mode::empty())
        .map_err(|e| Error::new(ErrorKind::Io, format!("opendir {}: {e}", root.display())))?;

    if follow_symlinks {
        let st = fstat(&root_dir)
            .map_err(|e| Error::new(ErrorKind::Io, format!("fstat {}: {e}", root.display())))?;
        visited.insert(st.st_dev as u64, st.st_ino as u64);
    }

    walk_dir(
        root_dir,
        PathBuf::new(),
        0,
        max_depth,
        follow_symlinks,
        &mut visited,
        &mut result,
    )?;

    result.files.sort();
    Ok(result)
}

fn walk_dir(
    dir: Dir,
    prefix: PathBuf,
    depth: usize,
    max_depth: usize,
    follow_symlinks: bool,
    visited: &mut VisitedSet,
    result: &mut WalkResult,
) -> Result<()> {
    if depth >= max_depth {
        return Ok(());
    }
    let dir_fd = dir.as_raw_fd();

    // Collect entries first: recursing while iterating the same Dir handle
    // would require opening subdirectories against a borrowed fd we're
    // still reading from.
    let mut entries = Vec::new();
    for entry in dir {
        let entry = entry
            .map_err(|e| Error::new(ErrorKind::Io, format!("readdir {}: {e}", prefix.display())))?;
        let name = entry.file_name().to_string_lossy().into_owned();
        if name == "." || name == ".." {
            continue;
        }
        entries.push((name, entry.file_type()));
    }

    for (name, dtype) in entries {
        let rel = prefix.join(&name);
        let st = match fstatat(unsafe { BorrowedFd::borrow_raw(dir_fd) }, name.as_str(), nix::fcntl::AtFlags::AT_SYMLINK_NOFOLLOW) {
            Ok(st) => st,
            Err(Errno::EACCES) | Err(Errno::EPERM) => {
                result.permission_errors.push(rel.to_string_lossy().into_owned());
                continue;
            }
            Err(e) => {
                return Err(Error::new(ErrorKind::Io, format!("fstatat {name}: {e}")));
            }
        };

        let is_symlink = dtype == Some(Type::Symlink)
            || (dtype.is_none() && (st.st_mode & libc::S_IFMT) == libc::S_IFLNK);

        if is_symlink {
            if !follow_symlinks {
                continue;
            }
            let target_st = match fstatat(unsafe { BorrowedFd::borrow_raw(dir_fd) }, name.as_str(), nix::fcntl::AtFlags::empty()) {
                Ok(st) => st,
                Err(Errno::EACCES) | Err(Errno::EPERM) => {
                    result.permission_errors.push(rel.to_string_lossy().into_owned());
                    continue;
                }
                Err(_) => continue, // dangling symlink: silently skip
            };
            let key = (target_st.st_dev as u64, target_st.st_ino as u64);
            if (target_st.st_mode & libc::S_IFMT) == libc::S_IFDIR {
                if visited.contains(key.0, key.1) {
                    continue; // cycle
                }
                visited.insert(key.0, key.1);
                match Dir::openat(
                    unsafe { BorrowedFd::borrow_raw(dir_fd) },
                    name.as_str(),
                    OFlag::O_RDONLY | OFlag::O_DIRECTORY,
                    Mode::empty(),
                ) {
                    Ok(sub) => walk_dir(
                        sub,
                        rel,
                        depth + 1,
                        max_depth,
                        follow_symlinks,
                        visited,
                        result,
                    )?,
                    Err(Errno::EACCES) | Err(Errno::EPERM) => {
                        result.permission_errors.push(rel.to_string_lossy().into_owned());
                    }
                    Err(e) => {
                        return Err(Error::new(ErrorKind::Io, format!("openat {name}: {e}")));
                    }
                }
            } else if (target_st.st_mode & libc::S_IFMT) == libc::S_IFREG {
                result.files.push(rel.to_string_lossy().into_owned());
            }
            continue;
        }

        match dtype {
            Some(Type::Directory) => match Dir::openat(
                unsafe { BorrowedFd::borrow_raw(dir_fd) },
                name.as_str(),
                OFlag::O_RDONLY | OFlag::O_DIRECTORY | OFlag::O_NOFOLLOW,
                Mode::empty(),
            ) {
                Ok(sub) => walk_dir(
                    sub,
                    rel,
                    depth + 1,
                    max_depth,
                    follow_symlinks,
                    visited,
                    result,
                )?,
                Err(Errno::EACCES) | Err(Errno::EPERM) => {
                    result.permission_errors.push(rel.to_string_lossy().into_owned());
                }
                Err(e) => {
                    return Err(Error::new(ErrorKind::Io, format!("openat {name}: {e}")));
                }
            },
            Some(Type::File) => {
                result.files.push(rel.to_string_lossy().into_owned());
            }
            _ => {
                // Device, socket, fifo: not a byte-equality-comparable
                // source, skip.
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::os::unix::fs::symlink;

    #[test]
    fn walks_nested_regular_files_sorted() {
        let root = tempfile::tempdir().unwrap();
        fs::create_dir_all(root.path().join("a")).unwrap();
        fs::write(root.path().join("a/x"), b"1").unwrap();
        fs::write(root.path().join("a/y"), b"2").unwrap();
        fs::write(root.path().join("z"), b"3").unwrap();

        let result = walk(root.path(), false, 0).unwrap();
        assert_eq!(result.files, vec!["a/x", "a/y", "z"]);
        assert!(result.permission_errors.is_empty());
    }

    #[test]
    fn unfollowed_symlinks_are_skipped() {
        let root = tempfile::tempdir().unwrap();
        fs::write(root.path().join("real"), b"1").unwrap();
        symlink(root.path().join("real"), root.path().join("link")).unwrap();

        let result = walk(root.path(), false, 0).unwrap();
        assert_eq!(result.files, vec!["real"]);
    }

    #[test]
    fn followed_symlink_cycle_is_not_infinite() {
        let root = tempfile::tempdir().unwrap();
        fs::create_dir_all(root.path().join("a")).unwrap();
        symlink(root.path(), root.path().join("a/loop")).unwrap();
        fs::write(root.path().join("a/x"), b"1").unwrap();

        let result = walk(root.path(), true, 0).unwrap();
        assert_eq!(result.files, vec!["a/x"]);
    }
}
