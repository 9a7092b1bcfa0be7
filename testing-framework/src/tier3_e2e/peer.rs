//! Raw peer-protocol connection to a single node.
//!
//! This is the harness's second ingestion path into a node, distinct from
//! RPC: a message written here is handled exactly as if a peer had gossiped
//! it. A link must complete the status handshake before it may carry
//! anything else.
//!
//! Frame layout on the socket:
//!
//! ```text
//! +----------------+------------+-----------------+
//! | length: u32 BE | id: u8     | RLP payload     |
//! +----------------+------------+-----------------+
//! ```
//!
//! `length` counts the id byte and the payload.

use std::net::SocketAddr;
use std::time::Duration;

use async_trait::async_trait;
use dagnet_common::{
    message::{MessageError, ProtocolMessage, StatusMessage, STATUS},
    H256,
};
use log::{debug, trace};
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

/// Largest frame accepted in either direction
pub const MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

/// Peer link failures
#[derive(Error, Debug)]
pub enum PeerError {
    /// Socket failure
    #[error("peer I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// A frame could not be decoded
    #[error(transparent)]
    Message(#[from] MessageError),
    /// A frame exceeded [`MAX_FRAME_SIZE`]
    #[error("frame of {0} bytes exceeds the {max} byte limit", max = MAX_FRAME_SIZE)]
    FrameTooLarge(usize),
    /// A frame without a message id
    #[error("empty frame")]
    EmptyFrame,
    /// The node announced another chain
    #[error("genesis mismatch: expected {expected:#x}, node announced {announced:#x}")]
    GenesisMismatch {
        /// Genesis the harness expects
        expected: H256,
        /// Genesis in the node's status
        announced: H256,
    },
    /// A non-status message before the handshake completed
    #[error("handshake not completed")]
    HandshakeIncomplete,
    /// Use after `close`
    #[error("peer link is closed")]
    Closed,
    /// No status arrived in time
    #[error("no status from peer within {0:?}")]
    Timeout(Duration),
}

/// Capability to speak the peer protocol to one node.
#[async_trait]
pub trait PeerLink: Send {
    /// Read until the node's status arrives and check it against ours.
    ///
    /// Frames with other ids are skipped.
    async fn wait_for_status(&mut self, timeout: Duration) -> Result<StatusMessage, PeerError>;

    /// Send one protocol message
    async fn send_protocol_msg(&mut self, message: &ProtocolMessage) -> Result<(), PeerError>;

    /// Close the link. Idempotent.
    async fn close(&mut self) -> Result<(), PeerError>;

    /// Whether the link can still carry messages
    fn is_open(&self) -> bool;

    /// Whether the status handshake has completed
    fn is_ready(&self) -> bool;
}

/// Write one frame
pub async fn write_frame<W>(writer: &mut W, id: u8, payload: &[u8]) -> Result<(), PeerError>
where
    W: AsyncWriteExt + Unpin,
{
    let length = payload.len() + 1;
    if length > MAX_FRAME_SIZE {
        return Err(PeerError::FrameTooLarge(length));
    }
    let mut frame = Vec::with_capacity(4 + length);
    frame.extend_from_slice(&(length as u32).to_be_bytes());
    frame.push(id);
    frame.extend_from_slice(payload);
    writer.write_all(&frame).await?;
    writer.flush().await?;
    Ok(())
}

/// Read one frame as `(id, payload)`
pub async fn read_frame<R>(reader: &mut R) -> Result<(u8, Vec<u8>), PeerError>
where
    R: AsyncReadExt + Unpin,
{
    let length = reader.read_u32().await? as usize;
    if length == 0 {
        return Err(PeerError::EmptyFrame);
    }
    if length > MAX_FRAME_SIZE {
        return Err(PeerError::FrameTooLarge(length));
    }
    let mut frame = vec![0u8; length];
    reader.read_exact(&mut frame).await?;
    let payload = frame.split_off(1);
    Ok((frame[0], payload))
}

/// Peer link over a plain TCP stream
pub struct TcpPeerLink {
    stream: Option<TcpStream>,
    local_status: StatusMessage,
    peer_status: Option<StatusMessage>,
}

impl TcpPeerLink {
    /// Connect to `addr` and announce `local_status`.
    pub async fn connect(addr: SocketAddr, local_status: StatusMessage) -> Result<Self, PeerError> {
        let mut stream = TcpStream::connect(addr).await?;
        stream.set_nodelay(true)?;
        let hello = ProtocolMessage::Status(local_status.clone());
        write_frame(&mut stream, hello.id(), &hello.encode_payload()).await?;
        debug!("peer link to {} opened, status sent", addr);
        Ok(Self {
            stream: Some(stream),
            local_status,
            peer_status: None,
        })
    }

    /// Status the node announced, once received
    pub fn peer_status(&self) -> Option<&StatusMessage> {
        self.peer_status.as_ref()
    }

    fn stream(&mut self) -> Result<&mut TcpStream, PeerError> {
        self.stream.as_mut().ok_or(PeerError::Closed)
    }

    async fn read_status(&mut self) -> Result<StatusMessage, PeerError> {
        loop {
            let (id, payload) = read_frame(self.stream()?).await?;
            if id != STATUS {
                trace!("skipping message {:#04x} while waiting for status", id);
                continue;
            }
            if let ProtocolMessage::Status(status) = ProtocolMessage::decode(id, &payload)? {
                return Ok(status);
            }
        }
    }
}

#[async_trait]
impl PeerLink for TcpPeerLink {
    async fn wait_for_status(&mut self, timeout: Duration) -> Result<StatusMessage, PeerError> {
        if let Some(status) = &self.peer_status {
            return Ok(status.clone());
        }
        let status = tokio::time::timeout(timeout, self.read_status())
            .await
            .map_err(|_| PeerError::Timeout(timeout))??;
        if status.genesis_hash != self.local_status.genesis_hash {
            return Err(PeerError::GenesisMismatch {
                expected: self.local_status.genesis_hash,
                announced: status.genesis_hash,
            });
        }
        debug!(
            "peer status received: best epoch {}, genesis {:#x}",
            status.best_epoch, status.genesis_hash
        );
        self.peer_status = Some(status.clone());
        Ok(status)
    }

    async fn send_protocol_msg(&mut self, message: &ProtocolMessage) -> Result<(), PeerError> {
        if self.stream.is_none() {
            return Err(PeerError::Closed);
        }
        if self.peer_status.is_none() && message.id() != STATUS {
            return Err(PeerError::HandshakeIncomplete);
        }
        let payload = message.encode_payload();
        write_frame(self.stream()?, message.id(), &payload).await?;
        trace!("sent message {:#04x} ({} bytes)", message.id(), payload.len());
        Ok(())
    }

    async fn close(&mut self) -> Result<(), PeerError> {
        if let Some(mut stream) = self.stream.take() {
            // the peer may already be gone
            if let Err(e) = stream.shutdown().await {
                debug!("peer link shutdown: {}", e);
            }
        }
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.stream.is_some()
    }

    fn is_ready(&self) -> bool {
        self.stream.is_some() && self.peer_status.is_some()
    }
}
