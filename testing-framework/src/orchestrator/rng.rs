// File: testing-framework/src/orchestrator/rng.rs
//
// Seeded RNG
//
// Random peer choices and throwaway keys all draw from one TestRng so that a
// failing run can be replayed from its logged seed.

use log::info;
use parking_lot::Mutex;
use rand::{rngs::StdRng, Rng, RngCore, SeedableRng};

/// Environment variable holding a replay seed (hex, `0x` optional)
pub const SEED_ENV_VAR: &str = "DAGNET_TEST_SEED";

/// Thread-safe seeded RNG with replay support.
pub struct TestRng {
    inner: Mutex<StdRng>,
    seed: u64,
}

impl TestRng {
    /// RNG with a fixed seed
    pub fn with_seed(seed: u64) -> Self {
        Self {
            inner: Mutex::new(StdRng::seed_from_u64(seed)),
            seed,
        }
    }

    /// Seed from `DAGNET_TEST_SEED`, or draw a fresh seed and log it.
    pub fn new_from_env_or_random() -> Self {
        let seed = std::env::var(SEED_ENV_VAR)
            .ok()
            .and_then(|s| parse_seed(&s))
            .unwrap_or_else(|| rand::thread_rng().gen());

        info!(
            "TestRng seed: 0x{:016x} (replay with {}=0x{:016x})",
            seed, SEED_ENV_VAR, seed
        );

        Self::with_seed(seed)
    }

    /// Seed this RNG was created with
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Draw a value from the standard distribution
    pub fn gen<T>(&self) -> T
    where
        rand::distributions::Standard: rand::distributions::Distribution<T>,
    {
        self.inner.lock().gen()
    }

    /// Draw a value from `range`
    pub fn gen_range<T, R>(&self, range: R) -> T
    where
        T: rand::distributions::uniform::SampleUniform,
        R: rand::distributions::uniform::SampleRange<T>,
    {
        self.inner.lock().gen_range(range)
    }

    /// Fill `dest` with random bytes
    pub fn fill_bytes(&self, dest: &mut [u8]) {
        self.inner.lock().fill_bytes(dest)
    }

    /// Pick one element of `slice`
    pub fn choose<'a, T>(&self, slice: &'a [T]) -> Option<&'a T> {
        use rand::seq::SliceRandom;
        slice.choose(&mut *self.inner.lock())
    }

    /// Run `f` with exclusive access to the underlying generator, for APIs
    /// that take `&mut impl RngCore`.
    pub fn with_rng<T>(&self, f: impl FnOnce(&mut StdRng) -> T) -> T {
        f(&mut self.inner.lock())
    }
}

fn parse_seed(value: &str) -> Option<u64> {
    let trimmed = value.trim().trim_start_matches("0x");
    u64::from_str_radix(trimmed, 16).ok()
}
