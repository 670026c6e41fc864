/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Read-only access to the committed chain, concurrent with the single writer.
//!
//! A [`ChainCamera`] holds a clone of the backing store handle. Taking a
//! [`snapshot`](ChainCamera::snapshot) produces a [`ChainView`], a consistent picture of the
//! store at one moment, through which blocks, receipts, and historical world state can be
//! read. Historical reads resolve a [`BlockTag`] to a block header and then read the state
//! trie at that header's state root; because trie nodes are content-addressed and never
//! overwritten, a past root resolves exactly as it did when it was the working root.

use std::fmt::{self, Display, Formatter};

use borsh::BorshDeserialize;

use crate::chain::store::{ChainGet, ChainGetError};
use crate::state::kv_store::{KVGet, KVStore};
use crate::state::trie::{TrieError, TrieReader};
use crate::state::world::{account_key, code_key, storage_key};
use crate::types::account::Account;
use crate::types::basic::{Address, BlockNumber, CryptoHash, Nonce, Wei};
use crate::types::block::Block;
use crate::types::receipt::Receipt;
use crate::types::transaction::Transaction;

/// Which block a historical read runs against.
#[derive(Clone, Copy, Debug)]
pub enum BlockTag {
    Latest,
    Number(BlockNumber),
    Hash(CryptoHash),
}

pub struct ChainCamera<K: KVStore> {
    kv: K,
}

impl<K: KVStore> ChainCamera<K> {
    pub fn new(kv: K) -> ChainCamera<K> {
        ChainCamera { kv }
    }

    /// A consistent view of the store at this moment.
    pub fn snapshot(&self) -> ChainView<K::Snapshot<'_>> {
        ChainView {
            source: self.kv.snapshot(),
        }
    }
}

pub struct ChainView<S: KVGet> {
    source: S,
}

impl<S: KVGet> ChainView<S> {
    /* ↓↓↓ Chain data ↓↓↓ */

    pub fn head(&self) -> Result<Block, QueryError> {
        let hash = self
            .source
            .head_block()?
            .ok_or(QueryError::NoChain)?;
        self.source.block(&hash)?.ok_or(QueryError::NoChain)
    }

    pub fn block(&self, hash: &CryptoHash) -> Result<Option<Block>, QueryError> {
        Ok(self.source.block(hash)?)
    }

    pub fn block_at_number(&self, number: BlockNumber) -> Result<Option<Block>, QueryError> {
        match self.source.block_at_number(number)? {
            Some(hash) => Ok(self.source.block(&hash)?),
            None => Ok(None),
        }
    }

    pub fn receipt(&self, transaction: &CryptoHash) -> Result<Option<Receipt>, QueryError> {
        Ok(self.source.receipt(transaction)?)
    }

    /// A mined transaction, looked up through the durable transaction index.
    pub fn transaction(&self, hash: &CryptoHash) -> Result<Option<Transaction>, QueryError> {
        match self.source.transaction_location(hash)? {
            Some(location) => match self.source.block(&location.block)? {
                Some(block) => Ok(block.transactions.get(location.index as usize).cloned()),
                None => Ok(None),
            },
            None => Ok(None),
        }
    }

    /* ↓↓↓ Historical world state ↓↓↓ */

    pub fn balance(&self, address: &Address, tag: BlockTag) -> Result<Wei, QueryError> {
        Ok(self.account(address, tag)?.balance)
    }

    pub fn nonce(&self, address: &Address, tag: BlockTag) -> Result<Nonce, QueryError> {
        Ok(self.account(address, tag)?.nonce)
    }

    pub fn code(&self, address: &Address, tag: BlockTag) -> Result<Option<Vec<u8>>, QueryError> {
        let root = self.state_root(tag)?;
        Ok(TrieReader::new(&self.source).get(root, &code_key(address))?)
    }

    pub fn storage_at(
        &self,
        address: &Address,
        slot: &CryptoHash,
        tag: BlockTag,
    ) -> Result<Option<Vec<u8>>, QueryError> {
        let root = self.state_root(tag)?;
        Ok(TrieReader::new(&self.source).get(root, &storage_key(address, slot))?)
    }

    pub fn account(&self, address: &Address, tag: BlockTag) -> Result<Account, QueryError> {
        let root = self.state_root(tag)?;
        match TrieReader::new(&self.source).get(root, &account_key(address))? {
            Some(bytes) => {
                Account::deserialize(&mut &*bytes).map_err(|err| QueryError::CorruptAccount {
                    address: *address,
                    source: err,
                })
            }
            None => Ok(Account::empty()),
        }
    }

    fn state_root(&self, tag: BlockTag) -> Result<CryptoHash, QueryError> {
        let header = match tag {
            BlockTag::Latest => self.head()?.header,
            BlockTag::Number(number) => {
                self.block_at_number(number)?
                    .ok_or(QueryError::UnknownBlock { tag })?
                    .header
            }
            BlockTag::Hash(hash) => {
                self.block(&hash)?
                    .ok_or(QueryError::UnknownBlock { tag })?
                    .header
            }
        };
        Ok(header.state_root)
    }
}

/// Error answering a read-only query.
#[derive(Debug)]
pub enum QueryError {
    /// The store holds no chain at all.
    NoChain,

    /// The block tag does not resolve to a known block.
    UnknownBlock { tag: BlockTag },

    /// A stored account's bytes did not decode as an [`Account`].
    CorruptAccount {
        address: Address,
        source: std::io::Error,
    },

    ChainGetError(ChainGetError),
    TrieError(TrieError),
}

impl From<ChainGetError> for QueryError {
    fn from(value: ChainGetError) -> Self {
        QueryError::ChainGetError(value)
    }
}

impl From<TrieError> for QueryError {
    fn from(value: TrieError) -> Self {
        QueryError::TrieError(value)
    }
}

impl Display for QueryError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            QueryError::NoChain => write!(f, "the backing store holds no chain"),
            QueryError::UnknownBlock { tag } => write!(f, "no block for tag {:?}", tag),
            QueryError::CorruptAccount { address, source } => {
                write!(f, "failed to deserialize account {}: {}", address, source)
            }
            QueryError::ChainGetError(err) => write!(f, "{}", err),
            QueryError::TrieError(err) => write!(f, "{}", err),
        }
    }
}
