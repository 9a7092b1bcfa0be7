use std::fmt::{Display, Error, Formatter};

use primitive_types::H256;
use rlp::{Encodable, RlpStream};

use super::BlockHeader;
use crate::{
    crypto::{keccak, Hashable},
    transaction::SignedTransaction,
};

/// keccak of the RLP list of `transactions`.
///
/// An empty slice gives the keccak of the empty list.
pub fn transactions_root(transactions: &[SignedTransaction]) -> H256 {
    keccak(&rlp::encode_list::<SignedTransaction, SignedTransaction>(
        transactions,
    ))
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Block {
    header: BlockHeader,
    transactions: Vec<SignedTransaction>,
}

impl Block {
    pub fn new(header: BlockHeader, transactions: Vec<SignedTransaction>) -> Self {
        Block {
            header,
            transactions,
        }
    }

    pub fn get_header(&self) -> &BlockHeader {
        &self.header
    }

    pub fn get_transactions(&self) -> &[SignedTransaction] {
        &self.transactions
    }

    pub fn get_txs_count(&self) -> usize {
        self.transactions.len()
    }

    pub fn get_height(&self) -> u64 {
        self.header.height
    }

    // Block identity comes from the header alone
    pub fn hash(&self) -> H256 {
        self.header.hash()
    }

    pub fn split(self) -> (BlockHeader, Vec<SignedTransaction>) {
        (self.header, self.transactions)
    }
}

impl Encodable for Block {
    fn rlp_append(&self, stream: &mut RlpStream) {
        stream.begin_list(2);
        stream.append(&self.header);
        stream.append_list::<SignedTransaction, SignedTransaction>(&self.transactions);
    }
}

impl Display for Block {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), Error> {
        write!(
            f,
            "Block[hash: {:#x}, height: {}, parent: {:#x}, nonce: {}, txs: {}]",
            self.hash(),
            self.header.height,
            self.header.parent_hash,
            self.header.nonce,
            self.transactions.len()
        )
    }
}
