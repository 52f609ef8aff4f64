//! The `diff result` record (spec.md §3): the shared output shape produced
//! by the directory differencer, the archive differencer, and
//! `compare_dir_urls`.

use std::collections::BTreeMap;

/// Why a path present on both sides didn't compare equal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiffReason {
    /// The two sides' contents differ.
    ContentMismatch,
    /// The two sides' sizes differ (checked before content, when cheap).
    SizeMismatch,
    /// One or both sides could not be read (I/O error other than a
    /// permission error, which instead lands in `errors`).
    ReadError,
}

impl DiffReason {
    /// The serialised string form used by [`crate::config`] consumers and
    /// any host marshalling this result (spec.md §6: `content_mismatch`,
    /// `size_mismatch`, `read_error`).
    pub fn as_str(&self) -> &'static str {
        match self {
            DiffReason::ContentMismatch => "content_mismatch",
            DiffReason::SizeMismatch => "size_mismatch",
            DiffReason::ReadError => "read_error",
        }
    }
}

/// The outcome of a directory, archive, or directory-vs-URL comparison.
///
/// Invariant: `equal == (diff.is_empty() && only_left.is_empty() &&
/// only_right.is_empty())`. Every path in `diff` is present on both sides;
/// every path in `only_left`/`only_right` is present on exactly one side.
#[derive(Debug, Clone, Default)]
pub struct DiffResult {
    /// Relative path -> reason, for paths present on both sides that
    /// didn't compare equal.
    pub diff: BTreeMap<String, DiffReason>,
    /// Relative paths present only under the left root.
    pub only_left: Vec<String>,
    /// Relative paths present only under the right root.
    pub only_right: Vec<String>,
    /// Relative paths that could not be read due to a permission error
    /// during the walk. Non-fatal: recorded here rather than aborting the
    /// whole comparison.
    pub errors: Vec<String>,
}

impl DiffResult {
    /// `true` iff there is no recorded difference between the two sides.
    /// Per-path read errors recorded in `errors` do not affect this: they
    /// are a walk-time permission problem, not evidence of inequality.
    pub fn equal(&self) -> bool {
        self.diff.is_empty() && self.only_left.is_empty() && self.only_right.is_empty()
    }

    pub(crate) fn record_diff(&mut self, path: String, reason: DiffReason) {
        self.diff.insert(path, reason);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_result_is_equal() {
        assert!(DiffResult::default().equal());
    }

    #[test]
    fn any_diff_entry_makes_it_unequal() {
        let mut r = DiffResult::default();
        r.record_diff("a/y".to_string(), DiffReason::ContentMismatch);
        assert!(!r.equal());
    }

    #[test]
    fn only_left_or_right_makes_it_unequal() {
        let mut r = DiffResult::default();
        r.only_left.push("z".to_string());
        assert!(!r.equal());
    }

    #[test]
    fn read_errors_alone_do_not_make_it_unequal() {
        let mut r = DiffResult::default();
        r.errors.push("secret".to_string());
        assert!(r.equal());
    }
}
