//! Bloom pre-filter over static-route keys.
//!
//! A negative test proves the key is absent from the static tier, letting
//! the cache skip the hash-table probe entirely for the common "unknown
//! path" case. False positives only cost an extra (cheap) hash-map lookup,
//! never a wrong answer.

/// A fixed-size bit-array Bloom filter with two independent hash functions
/// derived from one 64-bit hash via double hashing (Kirsch-Mitzenmacher).
pub struct BloomFilter {
    bits: Vec<u64>,
    num_bits: u64,
    num_hashes: u32,
    inserted: std::sync::atomic::AtomicU64,
}

impl BloomFilter {
    /// `expected_items` sizes the filter for roughly a 1% false-positive
    /// rate at that load.
    pub fn new(expected_items: usize) -> Self {
        let expected_items = expected_items.max(16);
        let num_bits = optimal_num_bits(expected_items, 0.01);
        let num_hashes = optimal_num_hashes(num_bits, expected_items);
        let words = (num_bits as usize).div_ceil(64).max(1);
        Self {
            bits: vec![0u64; words],
            num_bits: (words * 64) as u64,
            num_hashes,
            inserted: std::sync::atomic::AtomicU64::new(0),
        }
    }

    fn hashes(&self, key: &str) -> (u64, u64) {
        let h1 = fnv1a(key.as_bytes(), 0xcbf29ce484222325);
        let h2 = fnv1a(key.as_bytes(), 0x100000001b3);
        (h1, h2 | 1)
    }

    pub fn insert(&mut self, key: &str) {
        let (h1, h2) = self.hashes(key);
        for i in 0..self.num_hashes as u64 {
            let bit = h1.wrapping_add(i.wrapping_mul(h2)) % self.num_bits;
            self.bits[(bit / 64) as usize] |= 1u64 << (bit % 64);
        }
        self.inserted
            .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
    }

    /// `false` ⇒ definitely absent. `true` ⇒ probably present (verify).
    pub fn might_contain(&self, key: &str) -> bool {
        let (h1, h2) = self.hashes(key);
        for i in 0..self.num_hashes as u64 {
            let bit = h1.wrapping_add(i.wrapping_mul(h2)) % self.num_bits;
            if self.bits[(bit / 64) as usize] & (1u64 << (bit % 64)) == 0 {
                return false;
            }
        }
        true
    }

    pub fn len(&self) -> u64 {
        self.inserted.load(std::sync::atomic::Ordering::Relaxed)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn fnv1a(bytes: &[u8], seed: u64) -> u64 {
    let mut hash = seed;
    for &b in bytes {
        hash ^= b as u64;
        hash = hash.wrapping_mul(0x100000001b3);
    }
    hash
}

fn optimal_num_bits(n: usize, false_positive_rate: f64) -> u64 {
    let n = n as f64;
    let m = -(n * false_positive_rate.ln()) / (std::f64::consts::LN_2.powi(2));
    m.ceil() as u64
}

fn optimal_num_hashes(num_bits: u64, n: usize) -> u32 {
    let k = (num_bits as f64 / n as f64) * std::f64::consts::LN_2;
    (k.round() as u32).clamp(1, 16)
}
