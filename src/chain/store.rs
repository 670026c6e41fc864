/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Typed accessors for the chain's persisted variables: blocks by hash, the number→hash
//! index, the head pointer, receipts, and transaction locations.
//!
//! Reading happens through the [`ChainGet`] extension trait, which is implemented for every
//! [`KVGet`]; writing happens through a [`ChainWriteBatch`], which wraps the backing store's
//! [`WriteBatch`] and forms keys from the [path prefixes](crate::state::paths). Values are
//! Borsh-serialized.

use borsh::{BorshDeserialize, BorshSerialize};
use std::fmt::{self, Display, Formatter};

use crate::state::kv_store::{KVGet, WriteBatch};
use crate::state::paths;
use crate::state::utilities::combine;
use crate::types::basic::{BlockNumber, CryptoHash};
use crate::types::block::Block;
use crate::types::receipt::Receipt;

/// Where a mined transaction sits in the chain: its block and its index inside that block.
#[derive(Clone, BorshSerialize, BorshDeserialize)]
pub struct TransactionLocation {
    pub block: CryptoHash,
    pub index: u32,
}

pub trait ChainGet: KVGet {
    /* ↓↓↓ Head pointer ↓↓↓ */

    fn head_block(&self) -> Result<Option<CryptoHash>, ChainGetError> {
        match self.get(&paths::HEAD_BLOCK) {
            Some(bytes) => Ok(Some(CryptoHash::deserialize(&mut &*bytes).map_err(|err| {
                ChainGetError::DeserializeValueError {
                    key: Key::HeadBlock,
                    source: err,
                }
            })?)),
            None => Ok(None),
        }
    }

    /* ↓↓↓ Blocks ↓↓↓ */

    fn block(&self, hash: &CryptoHash) -> Result<Option<Block>, ChainGetError> {
        match self.get(&combine(&paths::BLOCKS, &hash.bytes())) {
            Some(bytes) => Ok(Some(Block::deserialize(&mut &*bytes).map_err(|err| {
                ChainGetError::DeserializeValueError {
                    key: Key::Block { block: *hash },
                    source: err,
                }
            })?)),
            None => Ok(None),
        }
    }

    /* ↓↓↓ Block Number to Block ↓↓↓ */

    fn block_at_number(&self, number: BlockNumber) -> Result<Option<CryptoHash>, ChainGetError> {
        match self.get(&combine(&paths::BLOCK_AT_NUMBER, &number.to_le_bytes())) {
            Some(bytes) => Ok(Some(CryptoHash::deserialize(&mut &*bytes).map_err(|err| {
                ChainGetError::DeserializeValueError {
                    key: Key::BlockAtNumber { number },
                    source: err,
                }
            })?)),
            None => Ok(None),
        }
    }

    /* ↓↓↓ Receipts ↓↓↓ */

    fn receipt(&self, transaction: &CryptoHash) -> Result<Option<Receipt>, ChainGetError> {
        match self.get(&combine(&paths::RECEIPTS, &transaction.bytes())) {
            Some(bytes) => Ok(Some(Receipt::deserialize(&mut &*bytes).map_err(|err| {
                ChainGetError::DeserializeValueError {
                    key: Key::Receipt {
                        transaction: *transaction,
                    },
                    source: err,
                }
            })?)),
            None => Ok(None),
        }
    }

    /* ↓↓↓ Transaction Locations ↓↓↓ */

    fn transaction_location(
        &self,
        transaction: &CryptoHash,
    ) -> Result<Option<TransactionLocation>, ChainGetError> {
        match self.get(&combine(&paths::TRANSACTION_LOCATIONS, &transaction.bytes())) {
            Some(bytes) => Ok(Some(TransactionLocation::deserialize(&mut &*bytes).map_err(
                |err| ChainGetError::DeserializeValueError {
                    key: Key::TransactionLocation {
                        transaction: *transaction,
                    },
                    source: err,
                },
            )?)),
            None => Ok(None),
        }
    }
}

impl<G: KVGet> ChainGet for G {}

/// Write-side counterpart of [`ChainGet`].
pub struct ChainWriteBatch<W: WriteBatch>(W);

impl<W: WriteBatch> ChainWriteBatch<W> {
    pub fn new() -> ChainWriteBatch<W> {
        ChainWriteBatch(W::new())
    }

    pub fn into_inner(self) -> W {
        self.0
    }

    pub fn set_head_block(&mut self, block: &CryptoHash) {
        self.0
            .set(&paths::HEAD_BLOCK, &block.try_to_vec().unwrap());
    }

    pub fn set_block(&mut self, block: &Block) {
        self.0.set(
            &combine(&paths::BLOCKS, &block.hash.bytes()),
            &block.try_to_vec().unwrap(),
        );
    }

    pub fn delete_block(&mut self, block: &CryptoHash) {
        self.0.delete(&combine(&paths::BLOCKS, &block.bytes()));
    }

    pub fn set_block_at_number(&mut self, number: BlockNumber, block: &CryptoHash) {
        self.0.set(
            &combine(&paths::BLOCK_AT_NUMBER, &number.to_le_bytes()),
            &block.try_to_vec().unwrap(),
        );
    }

    pub fn delete_block_at_number(&mut self, number: BlockNumber) {
        self.0
            .delete(&combine(&paths::BLOCK_AT_NUMBER, &number.to_le_bytes()));
    }

    pub fn set_receipt(&mut self, receipt: &Receipt) {
        self.0.set(
            &combine(&paths::RECEIPTS, &receipt.transaction_hash.bytes()),
            &receipt.try_to_vec().unwrap(),
        );
    }

    pub fn delete_receipt(&mut self, transaction: &CryptoHash) {
        self.0
            .delete(&combine(&paths::RECEIPTS, &transaction.bytes()));
    }

    pub fn set_transaction_location(
        &mut self,
        transaction: &CryptoHash,
        location: &TransactionLocation,
    ) {
        self.0.set(
            &combine(&paths::TRANSACTION_LOCATIONS, &transaction.bytes()),
            &location.try_to_vec().unwrap(),
        );
    }

    pub fn delete_transaction_location(&mut self, transaction: &CryptoHash) {
        self.0
            .delete(&combine(&paths::TRANSACTION_LOCATIONS, &transaction.bytes()));
    }
}

/// Error when trying to read a chain variable from the backing store.
#[derive(Debug)]
pub enum ChainGetError {
    DeserializeValueError { key: Key, source: std::io::Error },
}

#[derive(Debug)]
pub enum Key {
    HeadBlock,
    Block { block: CryptoHash },
    BlockAtNumber { number: BlockNumber },
    Receipt { transaction: CryptoHash },
    TransactionLocation { transaction: CryptoHash },
}

impl Display for Key {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match &self {
            Key::HeadBlock => write!(f, "Head Block"),
            Key::Block { block } => write!(f, "Block {}", block),
            Key::BlockAtNumber { number } => write!(f, "Block at number {}", number),
            Key::Receipt { transaction } => write!(f, "Receipt for transaction {}", transaction),
            Key::TransactionLocation { transaction } => {
                write!(f, "Location of transaction {}", transaction)
            }
        }
    }
}

impl Display for ChainGetError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            ChainGetError::DeserializeValueError { key, source } => {
                write!(f, "failed to deserialize {}: {}", key, source)
            }
        }
    }
}
