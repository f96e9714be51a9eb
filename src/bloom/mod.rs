pub mod builder;
pub mod reader;

pub use builder::FilterBlockBuilder;
pub use reader::FilterBlockReader;

use xxhash_rust::xxh3::xxh3_64;

/// Largest probe count a filter may declare. Larger values are reserved for
/// future encodings and read as "may match".
pub const MAX_PROBES: u8 = 30;

/// Builds and queries compact per-block-group summaries of a key set.
///
/// Implementations must never report a false negative: if a key was passed
/// to `create_filter`, `key_may_match` on the result must return true.
pub trait FilterPolicy: Send + Sync {
    /// Stored in the table's metaindex; a table written with a different
    /// policy name simply has no usable filter.
    fn name(&self) -> &str;

    fn create_filter(&self, keys: &[&[u8]]) -> Vec<u8>;

    fn key_may_match(&self, key: &[u8], filter: &[u8]) -> bool;
}

/// Probabilistic data structure: "is this key in the set?"
///
/// - If any probed bit is 0 → key is DEFINITELY NOT in the set
/// - If all probed bits are 1 → key is PROBABLY in the set
///
/// Consulted before a data block is read. On a miss-heavy workload, this
/// skips most block reads.
///
/// Sizing:
///   k = round(bits_per_key * ln(2)), clamped to [1, 30]
///   10 bits/key → k = 7 → ~1% false positives
///
/// Hash trick: don't need k independent hash functions. Double hashing from
/// one 32-bit hash: h, then h += rotate_right(h, 17) per probe.
#[derive(Debug, Clone)]
pub struct BloomFilterPolicy {
    bits_per_key: usize,
    k: u8,
}

impl BloomFilterPolicy {
    pub fn new(bits_per_key: usize) -> Self {
        // 0.69 =~ ln(2)
        let k = (bits_per_key as f64 * 0.69).round() as usize;
        let k = k.clamp(1, MAX_PROBES as usize) as u8;
        BloomFilterPolicy { bits_per_key, k }
    }

    /// Get the number of probes used per key.
    pub fn num_probes(&self) -> u8 {
        self.k
    }
}

/// 32-bit key hash used for filter probes.
pub fn hash_key(key: &[u8]) -> u32 {
    let h = xxh3_64(key);
    (h ^ (h >> 32)) as u32
}

impl FilterPolicy for BloomFilterPolicy {
    fn name(&self) -> &str {
        "ravel.BuiltinBloomFilter"
    }

    fn create_filter(&self, keys: &[&[u8]]) -> Vec<u8> {
        // For small n, a very high false positive rate is avoided by
        // enforcing a minimum bloom filter length.
        let bits = (keys.len() * self.bits_per_key).max(64);
        let bytes = bits.div_ceil(8);
        let bits = bytes * 8;

        let mut filter = vec![0u8; bytes + 1];
        filter[bytes] = self.k;
        for key in keys {
            let mut h = hash_key(key);
            let delta = h.rotate_right(17);
            for _ in 0..self.k {
                let bitpos = (h as usize) % bits;
                filter[bitpos / 8] |= 1 << (bitpos % 8);
                h = h.wrapping_add(delta);
            }
        }
        filter
    }

    fn key_may_match(&self, key: &[u8], filter: &[u8]) -> bool {
        if filter.len() < 2 {
            return false;
        }
        let bits = (filter.len() - 1) * 8;
        let k = filter[filter.len() - 1];
        if k > MAX_PROBES {
            // Reserved for potentially new encodings. Consider it a match.
            return true;
        }

        let mut h = hash_key(key);
        let delta = h.rotate_right(17);
        for _ in 0..k {
            let bitpos = (h as usize) % bits;
            if filter[bitpos / 8] & (1 << (bitpos % 8)) == 0 {
                return false;
            }
            h = h.wrapping_add(delta);
        }
        true
    }
}
