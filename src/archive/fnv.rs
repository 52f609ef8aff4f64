//! Two independent FNV-1a 64-bit hashes (distinct offset bases), used by the
//! archive differencer's hashed comparison strategy (spec.md §4.5: "stream-
//! hash each entry with two independent FNV-1a-style 64-bit hashes ...
//! collision probability is negligible for equality purposes").

const FNV_PRIME: u64 = 0x0000_0100_0000_01B3;
const FNV_OFFSET_BASIS_A: u64 = 0xcbf2_9ce4_8422_2325;
/// A second, distinct basis so the two hashes are independent — a
/// collision in one is very unlikely to coincide with a collision in the
/// other.
const FNV_OFFSET_BASIS_B: u64 = 0x9e37_79b9_7f4a_7c15;

/// Streaming FNV-1a 64-bit hasher.
#[derive(Debug, Clone, Copy)]
pub struct Fnv1a(u64);

impl Fnv1a {
    fn with_basis(basis: u64) -> Self {
        Self(basis)
    }

    fn update(&mut self, bytes: &[u8]) {
        for &b in bytes {
            self.0 ^= b as u64;
            self.0 = self.0.wrapping_mul(FNV_PRIME);
        }
    }

    fn finish(self) -> u64 {
        self.0
    }
}

/// The pair of independent hashes accumulated over one archive entry.
#[derive(Debug, Clone, Copy)]
pub struct DualFnv {
    lo: Fnv1a,
    hi: Fnv1a,
}

impl Default for DualFnv {
    fn default() -> Self {
        Self {
            lo: Fnv1a::with_basis(FNV_OFFSET_BASIS_A),
            hi: Fnv1a::with_basis(FNV_OFFSET_BASIS_B),
        }
    }
}

impl DualFnv {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, bytes: &[u8]) {
        self.lo.update(bytes);
        self.hi.update(bytes);
    }

    pub fn finish(self) -> (u64, u64) {
        (self.lo.finish(), self.hi.finish())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_bytes_same_hash() {
        let mut a = DualFnv::new();
        a.update(b"hello world");
        let mut b = DualFnv::new();
        b.update(b"hello world");
        assert_eq!(a.finish(), b.finish());
    }

    #[test]
    fn different_bytes_different_hash() {
        let mut a = DualFnv::new();
        a.update(b"hello world");
        let mut b = DualFnv::new();
        b.update(b"hello worle");
        assert_ne!(a.finish(), b.finish());
    }

    #[test]
    fn streamed_updates_match_single_update() {
        let mut streamed = DualFnv::new();
        streamed.update(b"hello ");
        streamed.update(b"world");
        let mut whole = DualFnv::new();
        whole.update(b"hello world");
        assert_eq!(streamed.finish(), whole.finish());
    }

    #[test]
    fn lo_and_hi_are_independent() {
        let mut h = DualFnv::new();
        h.update(b"anything");
        let (lo, hi) = h.finish();
        assert_ne!(lo, hi);
    }
}
