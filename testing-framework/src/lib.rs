//! # DAG Network Testing Framework
//!
//! Deterministic multi-node test harness for a proof-of-work DAG chain.
//!
//! ## Architecture Overview
//!
//! - **orchestrator**: clock abstraction and seeded RNG
//! - **Tier 2**: the RPC view of one node, assertion helpers and waiters
//! - **Tier 3**: node processes, the cluster controller, raw peer links and
//!   the crash-recovery scenario
//!
//! Blocks and transactions are built by `dagnet_common`; this crate drives
//! running nodes.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use dagnet_testing_framework::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = CrashRecoveryConfig::default();
//!     let env = DeterministicTestEnv::new_system();
//!     let mut cluster = ClusterBuilder::new(config.launch.clone())
//!         .with_nodes(config.node_count)
//!         .build(&env.rng)?;
//!
//!     let report = CrashRecoveryScenario::new(config, GenesisConfig::default())
//!         .run(&mut cluster, &env)
//!         .await;
//!     cluster.teardown().await?;
//!     println!("{:?}", report?);
//!     Ok(())
//! }
//! ```
//!
//! ## Design Principles
//!
//! 1. **Deterministic**: Clock abstraction + seeded RNG, seed logged for replay
//! 2. **Bounded**: every cross-process wait polls with a timeout
//! 3. **Scoped resources**: node processes, data directories and peer links
//!    are released on drop or teardown

#![warn(missing_docs)]
#![warn(clippy::all)]

/// Core orchestration - provides Clock, RNG, deterministic environment
pub mod orchestrator;

/// Tier 2: Integration testing (single node + RPC)
pub mod tier2_integration;

/// Tier 3: E2E testing (multi-node clusters)
pub mod tier3_e2e;

/// Shared utilities across all tiers
pub mod utilities;

/// Convenient re-exports for common usage
pub mod prelude;

// Re-export commonly used types at crate root
pub use orchestrator::{Clock, DeterministicTestEnv, PausedClock, SystemClock, TestRng};
pub use tier2_integration::{JsonRpcClient, NodeRpc, Waiter};
pub use tier3_e2e::{Cluster, CrashRecoveryScenario};

/// Framework version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
