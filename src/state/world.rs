/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! A typed view of the world state — accounts, balances, storage slots, and code — over the
//! [state trie](super::trie).
//!
//! The executor receives a `&mut WorldState` for the duration of one message and mutates state
//! through it. Nested calls open their own checkpoint frames through
//! [`checkpoint`](WorldState::checkpoint)/[`commit`](WorldState::commit)/
//! [`revert`](WorldState::revert), so a reverted inner call discards exactly its own writes.

use borsh::{BorshDeserialize, BorshSerialize};
use std::fmt::{self, Display, Formatter};

use crate::state::checkpoint::CheckpointError;
use crate::state::kv_store::KVStore;
use crate::state::paths;
use crate::state::trie::{StateTrie, TrieError};
use crate::state::utilities::combine;
use crate::types::account::Account;
use crate::types::basic::{Address, CryptoHash, Wei};
use crate::types::crypto_primitives::sha256;

pub struct WorldState<'a, K: KVStore> {
    trie: &'a mut StateTrie<K>,
}

impl<'a, K: KVStore> WorldState<'a, K> {
    pub fn new(trie: &'a mut StateTrie<K>) -> WorldState<'a, K> {
        WorldState { trie }
    }

    /* ↓↓↓ Accounts ↓↓↓ */

    /// The account at `address`, or the empty account if it has never been touched.
    pub fn account(&self, address: &Address) -> Result<Account, WorldStateError> {
        match self.trie.get(&account_key(address))? {
            Some(bytes) => {
                Account::deserialize(&mut &*bytes).map_err(|err| {
                    WorldStateError::DeserializeAccountError {
                        address: *address,
                        source: err,
                    }
                })
            }
            None => Ok(Account::empty()),
        }
    }

    pub fn set_account(&mut self, address: &Address, account: &Account) -> Result<(), WorldStateError> {
        self.trie
            .insert(&account_key(address), account.try_to_vec().unwrap())?;
        Ok(())
    }

    /// Remove the account record and its code. Invoked for self-destructed accounts.
    pub fn remove_account(&mut self, address: &Address) -> Result<(), WorldStateError> {
        self.trie.remove(&account_key(address))?;
        self.trie.remove(&code_key(address))?;
        Ok(())
    }

    pub fn balance(&self, address: &Address) -> Result<Wei, WorldStateError> {
        Ok(self.account(address)?.balance)
    }

    pub fn credit(&mut self, address: &Address, amount: Wei) -> Result<(), WorldStateError> {
        let mut account = self.account(address)?;
        account.balance += amount;
        self.set_account(address, &account)
    }

    pub fn debit(&mut self, address: &Address, amount: Wei) -> Result<(), WorldStateError> {
        let mut account = self.account(address)?;
        account.balance =
            account
                .balance
                .checked_sub(amount)
                .ok_or(WorldStateError::InsufficientBalance {
                    address: *address,
                    needed: amount,
                    available: account.balance,
                })?;
        self.set_account(address, &account)
    }

    pub fn transfer(
        &mut self,
        from: &Address,
        to: &Address,
        amount: Wei,
    ) -> Result<(), WorldStateError> {
        self.debit(from, amount)?;
        self.credit(to, amount)
    }

    pub fn increment_nonce(&mut self, address: &Address) -> Result<(), WorldStateError> {
        let mut account = self.account(address)?;
        account.nonce += 1;
        self.set_account(address, &account)
    }

    /* ↓↓↓ Storage ↓↓↓ */

    pub fn storage_at(
        &self,
        address: &Address,
        slot: &CryptoHash,
    ) -> Result<Option<Vec<u8>>, WorldStateError> {
        Ok(self.trie.get(&storage_key(address, slot))?)
    }

    pub fn set_storage(
        &mut self,
        address: &Address,
        slot: &CryptoHash,
        value: Vec<u8>,
    ) -> Result<(), WorldStateError> {
        if value.is_empty() {
            self.trie.remove(&storage_key(address, slot))?;
        } else {
            self.trie.insert(&storage_key(address, slot), value)?;
        }
        Ok(())
    }

    /* ↓↓↓ Code ↓↓↓ */

    pub fn code(&self, address: &Address) -> Result<Option<Vec<u8>>, WorldStateError> {
        Ok(self.trie.get(&code_key(address))?)
    }

    pub fn set_code(&mut self, address: &Address, code: Vec<u8>) -> Result<(), WorldStateError> {
        let mut account = self.account(address)?;
        account.code_hash = sha256(&code);
        self.trie.insert(&code_key(address), code)?;
        self.set_account(address, &account)
    }

    /* ↓↓↓ Checkpoint bracket for nested calls ↓↓↓ */

    pub fn checkpoint(&mut self) {
        self.trie.checkpoint()
    }

    pub fn commit(&mut self) -> Result<(), CheckpointError> {
        self.trie.commit()
    }

    pub fn revert(&mut self) -> Result<(), CheckpointError> {
        self.trie.revert()
    }
}

pub(crate) fn account_key(address: &Address) -> Vec<u8> {
    combine(&paths::ACCOUNTS, &address.bytes())
}

pub(crate) fn storage_key(address: &Address, slot: &CryptoHash) -> Vec<u8> {
    combine(&paths::STORAGE, &combine(&address.bytes(), &slot.bytes()))
}

pub(crate) fn code_key(address: &Address) -> Vec<u8> {
    combine(&paths::CODE, &address.bytes())
}

/// Error when reading or mutating the world state.
#[derive(Debug)]
pub enum WorldStateError {
    TrieError(TrieError),

    /// A stored account's bytes did not decode as an [`Account`].
    DeserializeAccountError {
        address: Address,
        source: std::io::Error,
    },

    /// A debit was attempted for more than the account holds.
    InsufficientBalance {
        address: Address,
        needed: Wei,
        available: Wei,
    },
}

impl From<TrieError> for WorldStateError {
    fn from(value: TrieError) -> Self {
        WorldStateError::TrieError(value)
    }
}

impl Display for WorldStateError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            WorldStateError::TrieError(err) => write!(f, "{}", err),
            WorldStateError::DeserializeAccountError { address, source } => {
                write!(f, "failed to deserialize account {}: {}", address, source)
            }
            WorldStateError::InsufficientBalance {
                address,
                needed,
                available,
            } => write!(
                f,
                "account {} holds {} but the operation needs {}",
                address, available, needed
            ),
        }
    }
}
