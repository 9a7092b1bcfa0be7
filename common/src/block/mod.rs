mod block;
mod builder;
mod header;
mod pow;

pub use block::{transactions_root, Block};
pub use builder::{create_chain_of_blocks, make_genesis, BlockBuilder, ChainBuilder};
pub use header::BlockHeader;
pub use pow::{compute_pow_digest, find_nonce, satisfies_work};

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BlockError {
    // The assembler never derives a root from transactions on the
    // searching path: callers must supply one explicitly.
    #[error("{count} transactions supplied without an explicit transactions root")]
    MissingTransactionsRoot { count: usize },
}
