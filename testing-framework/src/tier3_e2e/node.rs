//! Cluster member abstraction.
//!
//! A [`ClusterNode`] is one node of a test cluster as the controller sees
//! it: an identity, a lifecycle state, an RPC endpoint and the ability to
//! open a raw peer connection to it.

use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use async_trait::async_trait;
use dagnet_common::{crypto::KeyPair, message::StatusMessage};
use thiserror::Error;

use super::peer::PeerLink;
use crate::tier2_integration::NodeRpc;

/// URL scheme nodes advertise themselves with
pub const DEFAULT_NODE_URL_SCHEME: &str = "cfxnode";

/// Process state of a node
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NodeState {
    /// Not running; initial state and the state after any stop
    Stopped,
    /// Started and answering RPC
    Running,
}

/// How to take a node down
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StopMode {
    /// Ask the node to shut down and wait for it
    Graceful,
    /// Kill the process without letting it flush; simulates a crash
    Kill,
}

/// Lifecycle failures of one node
#[derive(Error, Debug)]
pub enum NodeError {
    /// `start` on a running node
    #[error("node {0} is already running")]
    AlreadyRunning(usize),
    /// `stop` or a peer connection on a stopped node
    #[error("node {0} is not running")]
    NotRunning(usize),
    /// The process could not be spawned
    #[error("failed to spawn node {index}: {source}")]
    Spawn {
        /// Node index
        index: usize,
        /// Underlying spawn error
        #[source]
        source: std::io::Error,
    },
    /// The process exited before its RPC came up
    #[error("node {index} exited during startup with {status}")]
    ExitedEarly {
        /// Node index
        index: usize,
        /// Exit status as reported by the OS
        status: String,
    },
    /// The RPC never answered within the startup budget
    #[error("node {index} did not answer RPC within {timeout:?}")]
    StartupTimeout {
        /// Node index
        index: usize,
        /// Startup budget
        timeout: Duration,
    },
    /// Filesystem or process I/O failed
    #[error("I/O error on node {index}: {source}")]
    Io {
        /// Node index
        index: usize,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },
    /// A base port plus the node index does not fit in a port number
    #[error("node {index} has no valid port above base port {base}")]
    PortOutOfRange {
        /// Node index
        index: usize,
        /// Configured base port
        base: u16,
    },
}

/// Network identity of a node: its key and where it listens.
///
/// `Display` renders the advertised URL,
/// `scheme://<public-key-hex>@<ip>:<port>`.
#[derive(Clone, Debug)]
pub struct NodeIdentity {
    key: KeyPair,
    ip: IpAddr,
    port: u16,
    scheme: String,
}

impl NodeIdentity {
    /// Identity listening on `ip:port`
    pub fn new(key: KeyPair, ip: IpAddr, port: u16) -> Self {
        Self {
            key,
            ip,
            port,
            scheme: DEFAULT_NODE_URL_SCHEME.to_string(),
        }
    }

    /// Advertise under another URL scheme
    pub fn with_scheme(mut self, scheme: impl Into<String>) -> Self {
        self.scheme = scheme.into();
        self
    }

    /// Node key
    pub fn key(&self) -> &KeyPair {
        &self.key
    }

    /// Listening IP
    pub fn ip(&self) -> IpAddr {
        self.ip
    }

    /// P2P port
    pub fn port(&self) -> u16 {
        self.port
    }

    /// P2P socket address
    pub fn p2p_addr(&self) -> SocketAddr {
        SocketAddr::new(self.ip, self.port)
    }

    /// Advertised URL, as passed to `--bootnodes`
    pub fn node_url(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for NodeIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}://{}@{}:{}",
            self.scheme,
            self.key.public_hex(),
            self.ip,
            self.port
        )
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
enum NodeArg {
    Flag(String, String),
    Switch(String),
}

/// Extra command-line arguments for a node: ordered flag/value pairs and
/// value-less switches.
///
/// Every call site builds its own value; nothing is shared between nodes
/// unless explicitly cloned.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct NodeArgs {
    args: Vec<NodeArg>,
}

impl NodeArgs {
    /// No arguments
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `name value`
    pub fn flag(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.args.push(NodeArg::Flag(name.into(), value.into()));
        self
    }

    /// Append a value-less switch such as `--archive`
    pub fn switch(mut self, name: impl Into<String>) -> Self {
        self.args.push(NodeArg::Switch(name.into()));
        self
    }

    /// Append all of `other` after these arguments
    pub fn extend(mut self, other: &NodeArgs) -> Self {
        self.args.extend(other.args.iter().cloned());
        self
    }

    /// Whether a flag or switch named `name` is present
    pub fn contains(&self, name: &str) -> bool {
        self.args.iter().any(|arg| match arg {
            NodeArg::Flag(n, _) | NodeArg::Switch(n) => n == name,
        })
    }

    /// Value of the first flag named `name`
    pub fn value_of(&self, name: &str) -> Option<&str> {
        self.args.iter().find_map(|arg| match arg {
            NodeArg::Flag(n, v) if n == name => Some(v.as_str()),
            _ => None,
        })
    }

    /// Whether there are no arguments
    pub fn is_empty(&self) -> bool {
        self.args.is_empty()
    }

    /// Flat argv form
    pub fn to_args(&self) -> Vec<String> {
        let mut out = Vec::with_capacity(self.args.len() * 2);
        for arg in &self.args {
            match arg {
                NodeArg::Flag(name, value) => {
                    out.push(name.clone());
                    out.push(value.clone());
                }
                NodeArg::Switch(name) => out.push(name.clone()),
            }
        }
        out
    }
}

/// One member of a test cluster.
///
/// State machine: `Stopped -> Running` on [`start`](ClusterNode::start),
/// `Running -> Stopped` on [`stop`](ClusterNode::stop) in either mode.
#[async_trait]
pub trait ClusterNode: Send + Sync {
    /// Position in the cluster; node 0 is the bootnode
    fn index(&self) -> usize;

    /// Network identity
    fn identity(&self) -> &NodeIdentity;

    /// Current lifecycle state
    fn state(&self) -> NodeState;

    /// RPC view of the node
    fn rpc(&self) -> &dyn NodeRpc;

    /// Start the node with `args` and return once it answers RPC.
    async fn start(&mut self, args: &NodeArgs) -> Result<(), NodeError>;

    /// Take the node down.
    async fn stop(&mut self, mode: StopMode) -> Result<(), NodeError>;

    /// Open a raw peer connection to the node, announcing `status`.
    ///
    /// The link bypasses the node's RPC entirely; messages sent on it enter
    /// through the peer-message ingestion path.
    async fn connect_peer(&self, status: StatusMessage) -> anyhow::Result<Box<dyn PeerLink>>;
}
