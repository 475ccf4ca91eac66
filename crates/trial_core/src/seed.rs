//! Seed derivation. Every random draw in a replication is keyed by
//! `(master_seed, run_index, event_id)` plus a salt naming the draw, so
//! results never depend on call order, worker scheduling or a shared RNG.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Salts separating independent draws made for the same event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeedPurpose {
    Duration,
    EnrollmentRate,
    InterArrival,
    Branch,
}

impl SeedPurpose {
    fn salt(self) -> u64 {
        match self {
            SeedPurpose::Duration => 0x6475_7261_7469_6f6e,
            SeedPurpose::EnrollmentRate => 0x656e_726f_6c6c_7261,
            SeedPurpose::InterArrival => 0x6172_7269_7661_6c73,
            SeedPurpose::Branch => 0x6272_616e_6368_6573,
        }
    }
}

pub fn splitmix64(mut state: u64) -> u64 {
    state = state.wrapping_add(0x9E37_79B9_7F4A_7C15);
    let mut z = state;
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

/// Order-sensitive hash combine of two words.
pub fn combine(state: u64, value: u64) -> u64 {
    splitmix64(state ^ splitmix64(value).wrapping_mul(0x9E37_79B9))
}

/// Seed for replication `run_index` of a batch.
pub fn derive_run_seed(master_seed: u64, run_index: u64) -> u64 {
    combine(splitmix64(master_seed), run_index)
}

/// Seed for one event within a replication.
pub fn derive_event_seed(run_seed: u64, event_id: u64) -> u64 {
    combine(run_seed, event_id)
}

/// Seed for a named draw tied to an event.
pub fn derive_purpose_seed(event_seed: u64, purpose: SeedPurpose) -> u64 {
    combine(event_seed, purpose.salt())
}

/// Seed for a draw made on behalf of a constraint, salted with its stable key
/// so the result does not depend on the constraint's position in the list.
pub fn derive_keyed_seed(event_seed: u64, key: &str) -> u64 {
    combine(event_seed, fnv1a(key.as_bytes()))
}

/// Uniform draw in `[0, 1)` for a seed.
pub fn unit_interval(seed: u64) -> f64 {
    let mut rng = StdRng::seed_from_u64(seed);
    rng.gen::<f64>()
}

fn fnv1a(bytes: &[u8]) -> u64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for byte in bytes {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
    }
    hash
}
