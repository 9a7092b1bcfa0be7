//! Node processes driven by the cluster controller.
//!
//! Each [`ProcessNode`] owns at most one child process. The child is spawned
//! with `kill_on_drop`, so a panicking scenario never leaks nodes.

use std::fs::OpenOptions;
use std::net::{IpAddr, Ipv4Addr};
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use dagnet_common::{crypto::KeyPair, message::StatusMessage};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use tokio::process::{Child, Command};

use super::node::{
    ClusterNode, NodeArgs, NodeError, NodeIdentity, NodeState, StopMode, DEFAULT_NODE_URL_SCHEME,
};
use super::peer::{PeerLink, TcpPeerLink};
use crate::tier2_integration::{JsonRpcClient, NodeRpc};

/// File in the node's data directory receiving its stdout and stderr
pub const NODE_LOG_FILE: &str = "node.log";

const READINESS_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// How node processes are launched
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LaunchConfig {
    /// Node binary
    pub binary: PathBuf,
    /// Address every node listens on
    pub ip: IpAddr,
    /// P2P port of node 0; node `i` uses `base_p2p_port + i`
    pub base_p2p_port: u16,
    /// RPC port of node 0; node `i` uses `base_rpc_port + i`
    pub base_rpc_port: u16,
    /// How long a node may take to answer RPC after spawning
    #[serde(with = "duration_secs")]
    pub startup_timeout: Duration,
    /// How long a graceful stop may take before the process is killed
    #[serde(with = "duration_secs")]
    pub shutdown_timeout: Duration,
    /// Scheme of advertised node URLs
    pub url_scheme: String,
}

impl Default for LaunchConfig {
    fn default() -> Self {
        Self {
            binary: PathBuf::from("conflux"),
            ip: IpAddr::V4(Ipv4Addr::LOCALHOST),
            base_p2p_port: 13000,
            base_rpc_port: 14000,
            startup_timeout: Duration::from_secs(60),
            shutdown_timeout: Duration::from_secs(30),
            url_scheme: DEFAULT_NODE_URL_SCHEME.to_string(),
        }
    }
}

impl LaunchConfig {
    /// P2P port of node `index`
    pub fn p2p_port(&self, index: usize) -> Result<u16, NodeError> {
        offset_port(self.base_p2p_port, index)
    }

    /// RPC port of node `index`
    pub fn rpc_port(&self, index: usize) -> Result<u16, NodeError> {
        offset_port(self.base_rpc_port, index)
    }

    /// RPC URL of node `index`
    pub fn rpc_url(&self, index: usize) -> Result<String, NodeError> {
        Ok(format!("http://{}:{}", self.ip, self.rpc_port(index)?))
    }
}

fn offset_port(base: u16, index: usize) -> Result<u16, NodeError> {
    u16::try_from(index)
        .ok()
        .and_then(|offset| base.checked_add(offset))
        .ok_or(NodeError::PortOutOfRange { index, base })
}

// Durations as whole seconds in config files
pub(crate) mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_secs(u64::deserialize(d)?))
    }
}

/// A node backed by a local OS process
pub struct ProcessNode {
    index: usize,
    identity: NodeIdentity,
    launch: LaunchConfig,
    data_dir: PathBuf,
    rpc_port: u16,
    rpc: JsonRpcClient,
    child: Option<Child>,
}

impl ProcessNode {
    /// Node `index` storing its data under `data_dir`, identified by `key`.
    pub fn new(
        index: usize,
        key: KeyPair,
        launch: LaunchConfig,
        data_dir: PathBuf,
    ) -> anyhow::Result<Self> {
        let identity = NodeIdentity::new(key, launch.ip, launch.p2p_port(index)?)
            .with_scheme(launch.url_scheme.clone());
        let rpc_port = launch.rpc_port(index)?;
        let rpc = JsonRpcClient::new(launch.rpc_url(index)?)?;
        Ok(Self {
            index,
            identity,
            launch,
            data_dir,
            rpc_port,
            rpc,
            child: None,
        })
    }

    /// Data directory of this node
    pub fn data_dir(&self) -> &PathBuf {
        &self.data_dir
    }

    fn command(&self, args: &NodeArgs) -> Result<Command, NodeError> {
        let io_error = |source| NodeError::Io {
            index: self.index,
            source,
        };
        let log = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.data_dir.join(NODE_LOG_FILE))
            .map_err(io_error)?;
        let log_err = log.try_clone().map_err(io_error)?;

        let mut command = Command::new(&self.launch.binary);
        command
            .arg("--port")
            .arg(self.identity.port().to_string())
            .arg("--jsonrpc-local-http-port")
            .arg(self.rpc_port.to_string())
            .arg("--data-dir")
            .arg(&self.data_dir)
            .arg("--net-key")
            .arg(self.identity.key().secret_hex())
            .args(args.to_args())
            .stdin(Stdio::null())
            .stdout(Stdio::from(log))
            .stderr(Stdio::from(log_err))
            .kill_on_drop(true);
        Ok(command)
    }

    async fn wait_until_ready(&mut self) -> Result<(), NodeError> {
        let deadline = tokio::time::Instant::now() + self.launch.startup_timeout;
        loop {
            if let Some(child) = self.child.as_mut() {
                let exited = child.try_wait().map_err(|source| NodeError::Io {
                    index: self.index,
                    source,
                })?;
                if let Some(status) = exited {
                    self.child = None;
                    return Err(NodeError::ExitedEarly {
                        index: self.index,
                        status: status.to_string(),
                    });
                }
            }
            if self.rpc.get_block_count().await.is_ok() {
                return Ok(());
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(NodeError::StartupTimeout {
                    index: self.index,
                    timeout: self.launch.startup_timeout,
                });
            }
            tokio::time::sleep(READINESS_POLL_INTERVAL).await;
        }
    }

    async fn kill_child(&mut self) -> Result<(), NodeError> {
        if let Some(mut child) = self.child.take() {
            child.kill().await.map_err(|source| NodeError::Io {
                index: self.index,
                source,
            })?;
        }
        Ok(())
    }
}

#[async_trait]
impl ClusterNode for ProcessNode {
    fn index(&self) -> usize {
        self.index
    }

    fn identity(&self) -> &NodeIdentity {
        &self.identity
    }

    fn state(&self) -> NodeState {
        if self.child.is_some() {
            NodeState::Running
        } else {
            NodeState::Stopped
        }
    }

    fn rpc(&self) -> &dyn NodeRpc {
        &self.rpc
    }

    async fn start(&mut self, args: &NodeArgs) -> Result<(), NodeError> {
        if self.child.is_some() {
            return Err(NodeError::AlreadyRunning(self.index));
        }
        std::fs::create_dir_all(&self.data_dir).map_err(|source| NodeError::Io {
            index: self.index,
            source,
        })?;

        let child = self.command(args)?.spawn().map_err(|source| NodeError::Spawn {
            index: self.index,
            source,
        })?;
        debug!(
            "node {} spawned (pid {:?}) with {:?}",
            self.index,
            child.id(),
            args.to_args()
        );
        self.child = Some(child);

        if let Err(e) = self.wait_until_ready().await {
            // never leave a half-started node behind
            self.kill_child().await?;
            return Err(e);
        }
        info!("node {} running at {}", self.index, self.identity);
        Ok(())
    }

    async fn stop(&mut self, mode: StopMode) -> Result<(), NodeError> {
        if self.child.is_none() {
            return Err(NodeError::NotRunning(self.index));
        }

        if mode == StopMode::Graceful {
            if let Err(e) = self.rpc.stop_node().await {
                warn!("node {} did not accept stop: {:#}", self.index, e);
            }
            let shutdown_timeout = self.launch.shutdown_timeout;
            if let Some(child) = self.child.as_mut() {
                let outcome = tokio::time::timeout(shutdown_timeout, child.wait()).await;
                match outcome {
                    Ok(Ok(status)) => {
                        info!("node {} stopped with {}", self.index, status);
                        self.child = None;
                        return Ok(());
                    }
                    Ok(Err(source)) => {
                        return Err(NodeError::Io {
                            index: self.index,
                            source,
                        })
                    }
                    Err(_) => warn!(
                        "node {} still running after {:?}, killing",
                        self.index, self.launch.shutdown_timeout
                    ),
                }
            }
        }

        self.kill_child().await?;
        info!("node {} killed", self.index);
        Ok(())
    }

    async fn connect_peer(&self, status: StatusMessage) -> anyhow::Result<Box<dyn PeerLink>> {
        if self.child.is_none() {
            return Err(NodeError::NotRunning(self.index).into());
        }
        let link = TcpPeerLink::connect(self.identity.p2p_addr(), status).await?;
        Ok(Box::new(link))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rand::{rngs::StdRng, SeedableRng};

    fn node(index: usize, launch: LaunchConfig) -> ProcessNode {
        let key = KeyPair::random(&mut StdRng::seed_from_u64(index as u64));
        ProcessNode::new(index, key, launch, std::env::temp_dir().join("unused")).unwrap()
    }

    #[test]
    fn test_ports_follow_index() {
        let launch = LaunchConfig::default();
        let node = node(3, launch.clone());
        assert_eq!(node.identity().port(), launch.base_p2p_port + 3);
        assert_eq!(node.rpc.url(), format!("http://127.0.0.1:{}", launch.base_rpc_port + 3));
        assert_eq!(node.state(), NodeState::Stopped);
    }

    #[tokio::test]
    async fn test_stop_requires_running() {
        let mut node = node(0, LaunchConfig::default());
        assert!(matches!(
            node.stop(StopMode::Kill).await,
            Err(NodeError::NotRunning(0))
        ));
    }

    #[tokio::test]
    async fn test_missing_binary_fails_to_spawn() {
        let root = crate::utilities::TempDataDir::new().unwrap();
        let launch = LaunchConfig {
            binary: PathBuf::from("/nonexistent/dagnet-node"),
            ..LaunchConfig::default()
        };
        let key = KeyPair::random(&mut StdRng::seed_from_u64(1));
        let mut node = ProcessNode::new(0, key, launch, root.node_dir(0).unwrap()).unwrap();

        let result = node.start(&NodeArgs::new()).await;
        assert!(matches!(result, Err(NodeError::Spawn { index: 0, .. })));
        assert_eq!(node.state(), NodeState::Stopped);
        assert!(root.node_dir(0).unwrap().join(NODE_LOG_FILE).exists());
    }

    #[test]
    fn test_ports_past_u16_are_rejected() {
        let launch = LaunchConfig {
            base_p2p_port: 65530,
            ..LaunchConfig::default()
        };
        assert_eq!(launch.p2p_port(5).unwrap(), 65535);
        assert!(matches!(
            launch.p2p_port(6),
            Err(NodeError::PortOutOfRange {
                index: 6,
                base: 65530
            })
        ));
        assert!(launch.rpc_port(70_000).is_err());

        let key = KeyPair::random(&mut StdRng::seed_from_u64(6));
        assert!(ProcessNode::new(6, key, launch, std::env::temp_dir().join("unused")).is_err());
    }

    proptest! {
        #[test]
        fn prop_ports_never_wrap(base in any::<u16>(), index in 0usize..100_000) {
            match offset_port(base, index) {
                Ok(port) => prop_assert_eq!(port as usize, base as usize + index),
                Err(_) => prop_assert!(base as usize + index > u16::MAX as usize),
            }
        }
    }

    // Launch config whose RPC port has nothing listening on it
    fn unreachable_launch(binary: PathBuf) -> LaunchConfig {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let free_port = listener.local_addr().unwrap().port();
        drop(listener);
        LaunchConfig {
            binary,
            base_rpc_port: free_port,
            startup_timeout: Duration::from_secs(10),
            shutdown_timeout: Duration::from_millis(300),
            ..LaunchConfig::default()
        }
    }

    #[cfg(unix)]
    fn write_script(dir: &std::path::Path, body: &str) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;

        let path = dir.join("node.sh");
        std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_binary_exiting_during_startup() {
        let root = crate::utilities::TempDataDir::new().unwrap();
        let script = write_script(root.path(), "exit 3");
        let key = KeyPair::random(&mut StdRng::seed_from_u64(2));
        let mut node =
            ProcessNode::new(0, key, unreachable_launch(script), root.node_dir(0).unwrap())
                .unwrap();

        let result = node.start(&NodeArgs::new()).await;
        assert!(
            matches!(result, Err(NodeError::ExitedEarly { index: 0, .. })),
            "{:?}",
            result
        );
        assert_eq!(node.state(), NodeState::Stopped);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_graceful_stop_escalates_to_kill() {
        let root = crate::utilities::TempDataDir::new().unwrap();
        let script = write_script(root.path(), "trap '' TERM INT\nexec sleep 30");
        let key = KeyPair::random(&mut StdRng::seed_from_u64(3));
        let mut node =
            ProcessNode::new(0, key, unreachable_launch(script.clone()), root.node_dir(0).unwrap())
                .unwrap();
        // the script never serves RPC, so it is attached without the readiness wait
        node.child = Some(Command::new(&script).kill_on_drop(true).spawn().unwrap());
        assert_eq!(node.state(), NodeState::Running);

        let started = std::time::Instant::now();
        node.stop(StopMode::Graceful).await.unwrap();
        assert!(started.elapsed() >= Duration::from_millis(300));
        assert!(started.elapsed() < Duration::from_secs(10));
        assert_eq!(node.state(), NodeState::Stopped);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_graceful_stop_of_exiting_process() {
        let root = crate::utilities::TempDataDir::new().unwrap();
        let script = write_script(root.path(), "exit 0");
        let key = KeyPair::random(&mut StdRng::seed_from_u64(4));
        let mut node =
            ProcessNode::new(0, key, unreachable_launch(script.clone()), root.node_dir(0).unwrap())
                .unwrap();
        node.child = Some(Command::new(&script).spawn().unwrap());

        node.stop(StopMode::Graceful).await.unwrap();
        assert_eq!(node.state(), NodeState::Stopped);
    }

    #[test]
    fn test_launch_config_yaml() {
        let yaml = "binary: /opt/dagnet/node\nbase_p2p_port: 20000\nstartup_timeout: 5\n";
        let launch: LaunchConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(launch.binary, PathBuf::from("/opt/dagnet/node"));
        assert_eq!(launch.base_p2p_port, 20000);
        assert_eq!(launch.startup_timeout, Duration::from_secs(5));
        assert_eq!(launch.base_rpc_port, LaunchConfig::default().base_rpc_port);
    }
}
