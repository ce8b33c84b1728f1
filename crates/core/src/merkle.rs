//! Merkle root of a block's transaction ids.
//!
//! This is a flat digest over the ids in block order, not a tree: the
//! root is `blake3(id_1 ‖ id_2 ‖ … ‖ id_n)` over the raw 32-byte ids.
//! Reordering the ids changes the root. Stored blocks depend on this
//! exact layout, so it must not be swapped for a pairwise tree.

use crate::hash::Hash;
use crate::transaction::TransactionId;

/// Compute the merkle root of `ids`, in the order given.
pub fn merkle_root(ids: &[TransactionId]) -> Hash {
    let mut hasher = blake3::Hasher::new();
    for id in ids {
        hasher.update(id.as_bytes());
    }
    Hash(hasher.finalize().into())
}

/// Whether `root` is the merkle root of `ids`.
pub fn verify_merkle_root(root: &Hash, ids: &[TransactionId]) -> bool {
    merkle_root(ids) == *root
}
