//! Sharder implementations mapping a salted subject key into one of [`TOTAL_BUCKETS`] buckets.
use sha2::{Digest, Sha256};

/// Number of buckets subjects are partitioned into.
pub const TOTAL_BUCKETS: u64 = 10_000;

/// Byte placed between salt and key before hashing.
const SEPARATOR: u8 = b':';

pub trait Sharder {
    /// Hash `input` into `[0, total_shards)`.
    fn get_shard(&self, input: &[u8], total_shards: u64) -> u64;

    /// Deterministic bucket in `[0, 9999]` for `key` under `salt`.
    fn bucket(&self, salt: &str, key: &str) -> u32 {
        let mut input = Vec::with_capacity(salt.len() + 1 + key.len());
        input.extend_from_slice(salt.as_bytes());
        input.push(SEPARATOR);
        input.extend_from_slice(key.as_bytes());
        // Result is always below TOTAL_BUCKETS, which fits into u32.
        self.get_shard(&input, TOTAL_BUCKETS) as u32
    }
}

/// The default sharder: first 8 bytes of a SHA-256 digest read as a big-endian `u64`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Sha256Sharder;

impl Sharder for Sha256Sharder {
    fn get_shard(&self, input: &[u8], total_shards: u64) -> u64 {
        let hash = Sha256::digest(input);
        let mut head = [0u8; 8];
        head.copy_from_slice(&hash[0..8]);
        u64::from_be_bytes(head) % total_shards
    }
}

/// Fallback sharder over the same concatenated bytes.
///
/// Lower quality than [`Sha256Sharder`] (MD5 is no longer preimage-resistant) but deterministic
/// and always available. Buckets differ from the SHA-256 ones, so switching sharders re-randomizes
/// every running experiment.
#[derive(Debug, Clone, Copy, Default)]
pub struct Md5Sharder;

impl Sharder for Md5Sharder {
    fn get_shard(&self, input: &[u8], total_shards: u64) -> u64 {
        let hash = md5::compute(input);
        let mut head = [0u8; 8];
        head.copy_from_slice(&hash[0..8]);
        u64::from_be_bytes(head) % total_shards
    }
}

#[cfg(test)]
pub(crate) struct DeterministicSharder(pub std::collections::HashMap<String, u64>);

#[cfg(test)]
impl Sharder for DeterministicSharder {
    fn get_shard(&self, input: &[u8], total_shards: u64) -> u64 {
        let input = String::from_utf8_lossy(input);
        self.0.get(input.as_ref()).copied().unwrap_or(0) % total_shards
    }
}
