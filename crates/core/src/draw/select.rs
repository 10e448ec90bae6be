//! Pure winner selection.
//!
//! Selection is kept separate from seed acquisition so it can be recomputed
//! off-process: given the recorded seed and the sold ticket numbers, any
//! third party reproduces the identical winners.

use sha2::{Digest, Sha256};

/// Versioned tag stored with every draw record.
///
/// `sha256-mod-v1`: the candidate pool starts as the sold ticket numbers in
/// ascending order. Round `i` (starting at 0) computes
/// `SHA-256(seed_utf8 || i_as_u32_big_endian)`, interprets the first 8
/// digest bytes as a big-endian u64, and removes the pool element at that
/// value modulo the remaining pool size. Removed elements are the winners,
/// in draw order.
pub const DRAW_ALGORITHM: &str = "sha256-mod-v1";

/// Select `prize_count` distinct winners from `sold_tickets`.
///
/// Deterministic given the seed. When fewer tickets were sold than prizes,
/// every sold ticket wins once.
pub fn select_winners(seed: &str, sold_tickets: &[u32], prize_count: u32) -> Vec<u32> {
    let mut pool: Vec<u32> = sold_tickets.to_vec();
    pool.sort_unstable();

    let count = (prize_count as usize).min(pool.len());
    let mut winners = Vec::with_capacity(count);

    for round in 0..count as u32 {
        let mut hasher = Sha256::new();
        hasher.update(seed.as_bytes());
        hasher.update(round.to_be_bytes());
        let digest = hasher.finalize();

        let mut prefix = [0u8; 8];
        prefix.copy_from_slice(&digest[..8]);
        let index = (u64::from_be_bytes(prefix) % pool.len() as u64) as usize;

        winners.push(pool.remove(index));
    }

    winners
}
