use xxhash_rust::xxh3::xxh3_64_with_seed;

use crate::bits;
use crate::chvec::{ChoiceVector, MAX_CHVEC};

/// Seed for attribute digests. Bucket addresses derived under one seed are
/// only readable under the same seed, so this is fixed for the crate.
const HASH_SEED: u64 = 0x6d61_6864_6231;

/// Computes a 32-bit digest of a byte string. Deterministic across runs and
/// processes.
pub fn hash_bytes(bytes: &[u8]) -> u32 {
    let h = xxh3_64_with_seed(bytes, HASH_SEED);
    // Fold the high word in so bucket addressing sees all 64 digest bits.
    (h ^ (h >> 32)) as u32
}

/// Composes the multi-attribute hash: bit `i` of the result is bit
/// `cv[i].bit` of the digest of attribute `cv[i].att`.
pub fn composite(attr_hashes: &[u32], cv: &ChoiceVector) -> u32 {
    let mut hash = 0;
    for i in 0..MAX_CHVEC {
        let item = cv.item(i);
        if bits::bit_is_set(attr_hashes[item.att as usize], item.bit as u32) {
            hash = bits::set_bit(hash, i as u32);
        }
    }
    hash
}
