use std::fmt;

use blake2::{Blake2b512, Digest};

/// A 128-bit content fingerprint.
///
/// Fingerprints are deterministic across processes and platforms: the same
/// content always produces the same fingerprint, and any change to the
/// content (an adjustment, a weight, a tag, a condition parameter) changes
/// it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fingerprint(pub u128);

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0.to_be_bytes()))
    }
}

/// Incremental fingerprint construction.
///
/// Every `combine_*` call feeds a fixed-width little-endian encoding into
/// the digest, so value boundaries are unambiguous. Variable-length data is
/// length-prefixed.
pub struct FingerprintHasher {
    state: Blake2b512,
}

impl FingerprintHasher {
    pub fn new(salt: &str) -> Self {
        let mut state = Blake2b512::new();
        state.update(salt.as_bytes());
        FingerprintHasher { state }
    }

    pub fn combine_bytes(&mut self, data: &[u8]) -> &mut Self {
        self.state.update((data.len() as u64).to_le_bytes());
        self.state.update(data);
        self
    }

    pub fn combine_str(&mut self, s: &str) -> &mut Self {
        self.combine_bytes(s.as_bytes())
    }

    pub fn combine_u64(&mut self, v: u64) -> &mut Self {
        self.state.update(v.to_le_bytes());
        self
    }

    pub fn combine_usize(&mut self, v: usize) -> &mut Self {
        self.combine_u64(v as u64)
    }

    pub fn combine_i64(&mut self, v: i64) -> &mut Self {
        self.state.update(v.to_le_bytes());
        self
    }

    pub fn combine_bool(&mut self, v: bool) -> &mut Self {
        self.state.update([v as u8]);
        self
    }

    /// Combines the raw bit pattern, so `-0.0` and `0.0` fingerprint
    /// differently and NaN payloads are preserved.
    pub fn combine_f32(&mut self, v: f32) -> &mut Self {
        self.state.update(v.to_bits().to_le_bytes());
        self
    }

    pub fn finish(self) -> Fingerprint {
        let digest = self.state.finalize();
        let mut low = [0u8; 16];
        low.copy_from_slice(&digest[..16]);
        Fingerprint(u128::from_le_bytes(low))
    }
}
