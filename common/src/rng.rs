//! Deterministic random streams.
//!
//! Every stochastic decision in the engine draws from a [`GameRng`]: a
//! ChaCha8 stream keyed purely by the game seed. No wall clock, no OS
//! entropy. The same seed and the same sequence of calls always produce the
//! same stream, which is what makes map generation and turn resolution
//! replayable.

use rand::{Rng, RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// FNV-1a, used to fold string seeds and stage tags into stream keys
fn fnv1a(bytes: &[u8]) -> u64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for b in bytes {
        hash ^= u64::from(*b);
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
    }
    hash
}

/// A seeded pseudo-random stream
#[derive(Clone, Debug)]
pub struct GameRng {
    key: u64,
    rng: ChaCha8Rng,
}

impl GameRng {
    pub fn from_seed_u64(seed: u64) -> Self {
        Self {
            key: seed,
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    /// Seed from an arbitrary string, e.g. the seed a game was created with
    pub fn from_seed_str(seed: &str) -> Self {
        Self::from_seed_u64(fnv1a(seed.as_bytes()))
    }

    /// The key this stream was created from
    pub fn key(&self) -> u64 {
        self.key
    }

    /// Derive a decoupled stream for a named stage.
    ///
    /// The substream is keyed by the parent's key, not its current position,
    /// so stages can't perturb each other by consuming different amounts of
    /// randomness.
    pub fn substream(&self, tag: &str) -> GameRng {
        let mut key = self.key.to_le_bytes().to_vec();
        key.extend_from_slice(tag.as_bytes());
        Self::from_seed_u64(fnv1a(&key))
    }

    /// Stream for a stochastic decision during play, keyed so that resuming
    /// a game at a given turn replays identically
    pub fn turn_stream(game_seed: &str, turn_version: u32, tag: &str) -> GameRng {
        GameRng::from_seed_str(game_seed)
            .substream(&format!("turn-{turn_version}"))
            .substream(tag)
    }

    pub fn next_u64(&mut self) -> u64 {
        self.rng.next_u64()
    }

    /// Uniform in [0, 1), built from 53 mantissa bits
    pub fn next_f64(&mut self) -> f64 {
        (self.rng.next_u64() >> 11) as f64 * (1.0 / (1u64 << 53) as f64)
    }

    /// Uniform integer in [0, bound)
    pub fn gen_below(&mut self, bound: u32) -> u32 {
        debug_assert!(bound > 0);
        self.rng.gen_range(0..bound)
    }

    /// Uniform integer in [lo, hi)
    pub fn gen_range(&mut self, lo: u32, hi: u32) -> u32 {
        debug_assert!(lo < hi);
        self.rng.gen_range(lo..hi)
    }

    pub fn gen_bool(&mut self, p: f64) -> bool {
        self.next_f64() < p
    }

    /// Pick an index weighted by `weights`; `None` if all weights are zero
    pub fn pick_weighted(&mut self, weights: &[u32]) -> Option<usize> {
        let total: u64 = weights.iter().map(|w| u64::from(*w)).sum();
        if total == 0 {
            return None;
        }
        let mut roll = self.next_u64() % total;
        for (i, w) in weights.iter().enumerate() {
            let w = u64::from(*w);
            if roll < w {
                return Some(i);
            }
            roll -= w;
        }
        unreachable!()
    }

    /// Fisher-Yates shuffle
    pub fn shuffle<T>(&mut self, items: &mut [T]) {
        for i in (1..items.len()).rev() {
            let j = self.gen_below(i as u32 + 1) as usize;
            items.swap(i, j);
        }
    }
}

impl RngCore for GameRng {
    fn next_u32(&mut self) -> u32 {
        self.rng.next_u32()
    }
    fn next_u64(&mut self) -> u64 {
        self.rng.next_u64()
    }
    fn fill_bytes(&mut self, dest: &mut [u8]) {
        self.rng.fill_bytes(dest)
    }
    fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), rand::Error> {
        self.rng.try_fill_bytes(dest)
    }
}
