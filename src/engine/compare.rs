//! Chunked sequential compare, size pre-check, and sampled quick-check
//! (spec.md §4.4).

use crate::error::Result;
use crate::reader::{Reader, SeekOutcome};

/// The result of a full byte-for-byte comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareVerdict {
    Equal,
    Different,
}

/// The result of a sampled quick-check pre-pass. Never `Equal` from
/// sampling alone — three sampled chunks are not proof of identity; only
/// the `zero-size` shortcut below is a real proof.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuickCheckOutcome {
    /// Both sources are zero-length: trivially identical, not a sample
    /// inference.
    Equal,
    /// A sampled offset (or the size pre-check) found a mismatch.
    Different,
    /// Every sampled offset matched. The caller must still run a full
    /// compare; this only rules out the common case of an early or
    /// sampled-point difference.
    SamplesMatch,
    /// Quick-check could not run (unknown size, non-seekable reader, or a
    /// seek/read failure mid-sample). The caller should fall back to a
    /// full compare from position 0.
    NotApplicable,
}

/// Full chunked comparison of `a` against `b`.
///
/// If `size_precheck` is set and both sizes are known, a mismatch
/// short-circuits as `Different` without reading a byte, and two known
/// zero sizes short-circuit as `Equal`.
pub fn full_compare(
    a: &mut dyn Reader,
    b: &mut dyn Reader,
    chunk_size: usize,
    size_precheck: bool,
) -> Result<CompareVerdict> {
    if size_precheck {
        if let (Some(sa), Some(sb)) = (a.size(), b.size()) {
            if sa != sb {
                return Ok(CompareVerdict::Different);
            }
            if sa == 0 {
                return Ok(CompareVerdict::Equal);
            }
        }
    }

    let mut buf_a = vec![0u8; chunk_size.max(1)];
    let mut buf_b = vec![0u8; chunk_size.max(1)];

    loop {
        let na = a.read(&mut buf_a)?;
        let nb = b.read(&mut buf_b)?;
        if na != nb {
            return Ok(CompareVerdict::Different);
        }
        if na == 0 {
            return Ok(CompareVerdict::Equal);
        }
        if buf_a[..na] != buf_b[..nb] {
            return Ok(CompareVerdict::Different);
        }
    }
}

/// Sampled pre-pass over up to three offsets: start, midpoint, and the last
/// full chunk. Requires both readers to know their size and support seek;
/// otherwise returns [`QuickCheckOutcome::NotApplicable`].
///
/// On [`QuickCheckOutcome::SamplesMatch`], both readers are left
/// repositioned at offset `0` — callers proceeding to a full compare do not
/// need to (and must not) re-seek themselves.
pub fn quick_check(
    a: &mut dyn Reader,
    b: &mut dyn Reader,
    chunk_size: usize,
) -> Result<QuickCheckOutcome> {
    let (Some(size_a), Some(size_b)) = (a.size(), b.size()) else {
        return Ok(QuickCheckOutcome::NotApplicable);
    };
    if size_a != size_b {
        return Ok(QuickCheckOutcome::Different);
    }
    if size_a == 0 {
        return Ok(QuickCheckOutcome::Equal);
    }
    let size = size_a;
    let chunk_size = chunk_size.max(1) as u64;

    let mut offsets = vec![0u64];
    if size > chunk_size {
        offsets.push(size - chunk_size);
    }
    if size > 2 * chunk_size {
        offsets.push(size / 2);
    }

    let mut buf_a = vec![0u8; chunk_size as usize];
    let mut buf_b = vec![0u8; chunk_size as usize];

    for offset in offsets {
        match sample_at(a, b, offset, &mut buf_a, &mut buf_b) {
            Ok(SampleResult::Match) => continue,
            Ok(SampleResult::Mismatch) => return Ok(QuickCheckOutcome::Different),
            Ok(SampleResult::Unavailable) => return Ok(QuickCheckOutcome::NotApplicable),
            Err(_) => return Ok(QuickCheckOutcome::NotApplicable),
        }
    }

    if a.seek(0)? == SeekOutcome::Unsupported || b.seek(0)? == SeekOutcome::Unsupported {
        return Ok(QuickCheckOutcome::NotApplicable);
    }
    Ok(QuickCheckOutcome::SamplesMatch)
}

enum SampleResult {
    Match,
    Mismatch,
    Unavailable,
}

fn sample_at(
    a: &mut dyn Reader,
    b: &mut dyn Reader,
    offset: u64,
    buf_a: &mut [u8],
    buf_b: &mut [u8],
) -> Result<SampleResult> {
    if a.seek(offset)? == SeekOutcome::Unsupported || b.seek(offset)? == SeekOutcome::Unsupported {
        return Ok(SampleResult::Unavailable);
    }
    let na = a.read(buf_a)?;
    let nb = b.read(buf_b)?;
    if na != nb || buf_a[..na] != buf_b[..nb] {
        return Ok(SampleResult::Mismatch);
    }
    Ok(SampleResult::Match)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::membuf::MemReader;

    fn readers(a: &[u8], b: &[u8]) -> (MemReader, MemReader) {
        (
            MemReader::new("a", a.to_vec()),
            MemReader::new("b", b.to_vec()),
        )
    }

    #[test]
    fn equal_empty_files() {
        let (mut a, mut b) = readers(b"", b"");
        assert_eq!(
            full_compare(&mut a, &mut b, 64, true).unwrap(),
            CompareVerdict::Equal
        );
    }

    #[test]
    fn size_mismatch_short_circuits() {
        let (mut a, mut b) = readers(&vec![0u8; 1000], &vec![0u8; 1001]);
        assert_eq!(
            full_compare(&mut a, &mut b, 64, true).unwrap(),
            CompareVerdict::Different
        );
    }

    #[test]
    fn one_byte_difference_at_last_position_is_detected() {
        let mut data_a = vec![7u8; 200_000];
        let mut data_b = data_a.clone();
        *data_b.last_mut().unwrap() = 8;
        let (mut a, mut b) = readers(&data_a, &data_b);
        data_a.clear();
        assert_eq!(
            full_compare(&mut a, &mut b, 65536, true).unwrap(),
            CompareVerdict::Different
        );
    }

    #[test]
    fn exact_chunk_size_compares_in_one_iteration() {
        let data = vec![1u8; 65536];
        let (mut a, mut b) = readers(&data, &data);
        assert_eq!(
            full_compare(&mut a, &mut b, 65536, false).unwrap(),
            CompareVerdict::Equal
        );
    }

    #[test]
    fn compare_is_symmetric() {
        let (mut a, mut b) = readers(b"hello", b"world");
        let ab = full_compare(&mut a, &mut b, 64, true).unwrap();
        let (mut a2, mut b2) = readers(b"hello", b"world");
        let ba = full_compare(&mut b2, &mut a2, 64, true).unwrap();
        assert_eq!(ab, ba);
    }

    #[test]
    fn compare_with_self_is_equal() {
        let data = b"reflexive".to_vec();
        let (mut a, mut b) = readers(&data, &data);
        assert_eq!(
            full_compare(&mut a, &mut b, 64, true).unwrap(),
            CompareVerdict::Equal
        );
    }

    #[test]
    fn quick_check_three_sample_path_on_two_chunks_plus_one() {
        let chunk = 64usize;
        let size = 2 * chunk + 1;
        let data = vec![3u8; size];
        let (mut a, mut b) = readers(&data, &data);
        assert_eq!(
            quick_check(&mut a, &mut b, chunk).unwrap(),
            QuickCheckOutcome::SamplesMatch
        );
        // Readers are left at position 0 after samples-match.
        let mut probe = [0u8; 1];
        assert_eq!(a.read(&mut probe).unwrap(), 1);
        assert_eq!(probe[0], 3);
    }

    #[test]
    fn quick_check_never_reports_equal_for_nonzero_sizes() {
        let data = vec![9u8; 500];
        let (mut a, mut b) = readers(&data, &data);
        let outcome = quick_check(&mut a, &mut b, 64).unwrap();
        assert_ne!(outcome, QuickCheckOutcome::Equal);
        assert_eq!(outcome, QuickCheckOutcome::SamplesMatch);
    }

    #[test]
    fn quick_check_zero_size_is_equal() {
        let (mut a, mut b) = readers(b"", b"");
        assert_eq!(
            quick_check(&mut a, &mut b, 64).unwrap(),
            QuickCheckOutcome::Equal
        );
    }

    #[test]
    fn quick_check_detects_mismatch_at_sampled_offset() {
        let chunk = 64usize;
        let size = 2 * chunk + 1;
        let mut data_b = vec![3u8; size];
        data_b[size / 2] = 0; // perturb the midpoint sample
        let (mut a, mut b) = readers(&vec![3u8; size], &data_b);
        assert_eq!(
            quick_check(&mut a, &mut b, chunk).unwrap(),
            QuickCheckOutcome::Different
        );
    }
}
