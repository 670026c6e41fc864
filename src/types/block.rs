/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Definitions for the 'block' type and its associated methods.

use borsh::{BorshDeserialize, BorshSerialize};

use crate::types::basic::{
    Address, BlockNumber, Bloom, CryptoHash, Gas, SignatureBytes, Timestamp, Wei,
};
use crate::types::crypto_primitives::sha256;
use crate::types::transaction::Transaction;

/// The header of a [`Block`]. Sealed (and therefore immutable) once its block has been built.
#[derive(Clone, BorshSerialize, BorshDeserialize)]
pub struct BlockHeader {
    pub parent_hash: CryptoHash,
    pub number: BlockNumber,
    pub state_root: CryptoHash,
    pub transactions_root: CryptoHash,
    pub receipts_root: CryptoHash,
    pub logs_bloom: Bloom,
    pub gas_used: Gas,
    pub gas_limit: Gas,
    pub timestamp: Timestamp,
    pub base_fee: Wei,
    pub coinbase: Address,
    pub extra_data: Vec<u8>,
    /// Consensus-specific seal, e.g. an authority signature. Not part of the block hash, so
    /// that the hash is stable across re-sealing.
    pub seal: Option<SignatureBytes>,
}

impl BlockHeader {
    /// The block hash: the SHA256 digest of the Borsh encoding of the header with the seal
    /// field unset.
    pub fn hash(&self) -> CryptoHash {
        let mut unsealed = self.clone();
        unsealed.seal = None;
        sha256(&unsealed.try_to_vec().unwrap())
    }

    /// The bytes a consensus authority signs when sealing this header.
    pub fn seal_payload(&self) -> Vec<u8> {
        self.hash().bytes().to_vec()
    }
}

/// A sealed block: header plus the ordered list of transactions included in it.
#[derive(Clone, BorshSerialize, BorshDeserialize)]
pub struct Block {
    pub header: BlockHeader,
    pub hash: CryptoHash,
    pub transactions: Vec<Transaction>,
}

impl Block {
    pub fn new(header: BlockHeader, transactions: Vec<Transaction>) -> Block {
        let hash = header.hash();
        Block {
            header,
            hash,
            transactions,
        }
    }
}

/// Compute a binary SHA256 merkle root over a list of Borsh-encodable items. The root of an
/// empty list is the zero hash.
pub fn merkle_root<T: BorshSerialize>(items: &[T]) -> CryptoHash {
    if items.is_empty() {
        return CryptoHash::zero();
    }

    let mut layer: Vec<CryptoHash> = items
        .iter()
        .map(|item| sha256(&item.try_to_vec().unwrap()))
        .collect();

    while layer.len() > 1 {
        layer = layer
            .chunks(2)
            .map(|pair| {
                let mut concat = Vec::with_capacity(64);
                concat.extend_from_slice(&pair[0].bytes());
                // An odd element at the end of a layer is paired with itself.
                concat.extend_from_slice(&pair.get(1).unwrap_or(&pair[0]).bytes());
                sha256(&concat)
            })
            .collect();
    }

    layer[0]
}
