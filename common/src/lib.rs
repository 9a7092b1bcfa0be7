#![allow(clippy::too_many_arguments)]
#![allow(clippy::module_inception)]

//! Chain value types used by the DAGNet node test harness.
//!
//! Everything here is a pure value or a pure function of its inputs: headers
//! and their proof-of-work digest, the nonce search, block and chain assembly,
//! signed transactions and the peer protocol messages that carry them.
//! Nothing in this crate talks to a node.

pub mod block;
pub mod config;
pub mod crypto;
pub mod message;
pub mod time;
pub mod transaction;

pub use primitive_types::{H160, H256, U256};
