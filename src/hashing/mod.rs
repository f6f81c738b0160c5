//! 64-bit hash primitives used to place virtual nodes and partitions on the ring.
//!
//! Any function mapping a byte slice to a uniformly distributed `u64` works, as long as
//! it is deterministic across process runs. Placement is only reproducible if the same
//! primitive is used for every operation on a given ring.
use murmur3::murmur3_x64_128;
use serde::{Deserialize, Serialize};
use std::io::Cursor;

/// Signature of the hash primitive injected into the ring
pub type HashFn = fn(&[u8]) -> u64;

/// Hash primitives that can be selected through [`crate::config::Config`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HashFunction {
    #[default]
    Murmur3,
    Xxh64,
}

impl HashFunction {
    pub fn hash_fn(&self) -> HashFn {
        match self {
            HashFunction::Murmur3 => murmur3_hash,
            HashFunction::Xxh64 => xxh64_hash,
        }
    }
}

/// Lower 64 bits of murmur3 x64 128 (seed 0)
pub fn murmur3_hash(key: &[u8]) -> u64 {
    murmur3_x64_128(&mut Cursor::new(key), 0)
        .expect("reading from an in-memory cursor can't fail") as u64
}

/// xxh64 with seed 0
pub fn xxh64_hash(key: &[u8]) -> u64 {
    xxhash_rust::xxh64::xxh64(key, 0)
}

#[cfg(test)]
mod tests {
    use super::{murmur3_hash, xxh64_hash, HashFunction};
    use quickcheck_macros::quickcheck;

    #[test]
    fn test_xxh64_known_value() {
        // reference value for the empty input with seed 0
        assert_eq!(xxh64_hash(b""), 0xef46db3751d8e999);
    }

    #[test]
    fn test_hash_function_selection() {
        assert_eq!(HashFunction::Murmur3.hash_fn()(b"node0"), murmur3_hash(b"node0"));
        assert_eq!(HashFunction::Xxh64.hash_fn()(b"node0"), xxh64_hash(b"node0"));
        assert_eq!(HashFunction::default(), HashFunction::Murmur3);
    }

    #[test]
    fn test_hash_functions_differ_on_replica_keys() {
        assert_ne!(murmur3_hash(b"node00"), murmur3_hash(b"node01"));
        assert_ne!(xxh64_hash(b"node00"), xxh64_hash(b"node01"));
    }

    #[quickcheck]
    fn test_hashes_are_deterministic(key: Vec<u8>) -> bool {
        murmur3_hash(&key) == murmur3_hash(&key) && xxh64_hash(&key) == xxh64_hash(&key)
    }
}
