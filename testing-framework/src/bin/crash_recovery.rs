// DAGNet Crash-Recovery Runner
//
// Purpose: Run the crash-recovery scenario against a real node binary.
//
// Features:
// - Bootstraps a local cluster of node processes
// - Kills and restarts the bootnode, injects a transfer over a raw peer link
// - Verifies balances survive cache eviction and a crash
// - Prints the scenario report as JSON
//
// Usage:
//   cargo run --bin crash_recovery -- --binary ./target/release/conflux --nodes 8

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use log::{error, info};

use dagnet_common::config::GenesisConfig;
use dagnet_testing_framework::orchestrator::DeterministicTestEnv;
use dagnet_testing_framework::tier3_e2e::{
    ClusterBuilder, CrashRecoveryConfig, CrashRecoveryScenario,
};

// ============================================================================
// CLI Arguments
// ============================================================================

#[derive(Parser, Debug)]
#[command(name = "crash_recovery")]
#[command(about = "Run the crash-recovery scenario against a local node cluster", long_about = None)]
struct Args {
    /// YAML scenario config; flags below override its values
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Node binary
    #[arg(short, long)]
    binary: Option<PathBuf>,

    /// Number of nodes
    #[arg(short, long)]
    nodes: Option<usize>,

    /// Minimum peers per node before mining starts
    #[arg(long)]
    min_peers: Option<usize>,

    /// RNG seed (hex, `0x` optional)
    #[arg(short, long, value_parser = parse_hex_seed)]
    seed: Option<u64>,

    /// Wait timeout in seconds
    #[arg(long)]
    timeout_secs: Option<u64>,

    /// Keep node data directories after the run
    #[arg(long, default_value_t = false)]
    keep_data: bool,

    /// Enable verbose logging
    #[arg(short, long, default_value_t = false)]
    verbose: bool,
}

fn parse_hex_seed(value: &str) -> Result<u64, String> {
    u64::from_str_radix(value.trim().trim_start_matches("0x"), 16)
        .map_err(|e| format!("invalid seed {:?}: {}", value, e))
}

impl Args {
    fn into_config(self) -> Result<(CrashRecoveryConfig, bool)> {
        let mut config = match &self.config {
            Some(path) => CrashRecoveryConfig::from_yaml_file(path)?,
            None => CrashRecoveryConfig::default(),
        };
        if let Some(binary) = self.binary {
            config.launch.binary = binary;
        }
        if let Some(nodes) = self.nodes {
            config.node_count = nodes;
        }
        if let Some(min_peers) = self.min_peers {
            config.min_peers = min_peers;
        }
        if let Some(seed) = self.seed {
            config.seed = Some(seed);
        }
        if let Some(secs) = self.timeout_secs {
            config.wait_timeout = std::time::Duration::from_secs(secs);
        }
        config.validate()?;
        Ok((config, self.keep_data))
    }
}

// ============================================================================
// Main
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let log_level = if args.verbose {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };

    env_logger::Builder::from_default_env()
        .filter_level(log_level)
        .format_timestamp_millis()
        .init();

    let (config, keep_data) = args.into_config()?;

    info!("DAGNet Crash-Recovery Runner");
    info!("============================");
    info!("Configuration:");
    info!("  Node binary:     {:?}", config.launch.binary);
    info!("  Nodes:           {}", config.node_count);
    info!("  Min peers:       {}", config.min_peers);
    info!("  Initial blocks:  {}", config.initial_blocks);
    info!("  Eviction blocks: {}", config.eviction_blocks);
    info!("  Wait timeout:    {:?}", config.wait_timeout);
    info!("");

    let env = match config.seed {
        Some(seed) => DeterministicTestEnv::with_seed(seed),
        None => DeterministicTestEnv::new_system(),
    };

    let mut cluster = ClusterBuilder::new(config.launch.clone())
        .with_nodes(config.node_count)
        .build(&env.rng)
        .context("Failed to prepare the cluster")?;

    let scenario = CrashRecoveryScenario::new(config, GenesisConfig::default());
    let outcome = scenario.run(&mut cluster, &env).await;

    if let Err(e) = cluster.teardown().await {
        error!("Cluster teardown failed: {:#}", e);
    }
    if keep_data || outcome.is_err() {
        if let Some(path) = cluster.keep_data() {
            info!("Node data kept at {:?}", path);
        }
    }

    match outcome {
        Ok(report) => {
            info!("Crash-recovery scenario passed");
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(())
        }
        Err(e) => {
            env.on_failure();
            error!("Crash-recovery scenario failed: {:#}", e);
            Err(e)
        }
    }
}
