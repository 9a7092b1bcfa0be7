// File: testing-framework/src/orchestrator/mod.rs
//
// Orchestrator Module
//
// Clock and RNG bundled into one environment handed to waiters and the
// scenario driver.

/// Clock abstraction (system and paused)
pub mod clock;
/// Seeded RNG with replay support
pub mod rng;

use std::sync::Arc;

use log::error;

/// Time and randomness for one scenario run.
///
/// # Example
///
/// ```rust,ignore
/// let env = DeterministicTestEnv::with_seed(42);
/// let peer = env.rng.gen_range(0..8usize);
/// env.clock.sleep(Duration::from_millis(50)).await;
/// ```
pub struct DeterministicTestEnv {
    /// Clock every wait reads from
    pub clock: Arc<dyn Clock>,

    /// RNG for peer choices and throwaway keys
    pub rng: TestRng,
}

impl DeterministicTestEnv {
    /// Paused clock, seed from the environment or random
    pub fn new_time_paused() -> Self {
        Self {
            clock: Arc::new(clock::PausedClock::new()),
            rng: rng::TestRng::new_from_env_or_random(),
        }
    }

    /// Real clock, seed from the environment or random
    pub fn new_system() -> Self {
        Self {
            clock: Arc::new(clock::SystemClock),
            rng: rng::TestRng::new_from_env_or_random(),
        }
    }

    /// Real clock with a fixed seed
    pub fn with_seed(seed: u64) -> Self {
        Self {
            clock: Arc::new(clock::SystemClock),
            rng: rng::TestRng::with_seed(seed),
        }
    }

    /// Paused clock with a fixed seed
    pub fn new_time_paused_with_seed(seed: u64) -> Self {
        Self {
            clock: Arc::new(clock::PausedClock::new()),
            rng: rng::TestRng::with_seed(seed),
        }
    }

    /// Seed of the RNG
    pub fn seed(&self) -> u64 {
        self.rng.seed()
    }

    /// Log how to replay this run
    pub fn on_failure(&self) {
        error!(
            "Scenario failed, replay with {}=0x{:016x}",
            rng::SEED_ENV_VAR,
            self.rng.seed()
        );
    }
}

pub use clock::{Clock, PausedClock, SystemClock};
pub use rng::TestRng;
