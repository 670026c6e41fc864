/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The per-address account record stored in the state trie.

use borsh::{BorshDeserialize, BorshSerialize};

use crate::types::basic::{CryptoHash, Nonce, Wei};

/// One account's record. Code bytes and storage slots are stored under separate key paths;
/// the record carries only the code digest.
#[derive(Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct Account {
    pub nonce: Nonce,
    pub balance: Wei,
    pub code_hash: CryptoHash,
}

impl Account {
    /// An account that has never been touched: zero nonce, zero balance, no code.
    pub fn empty() -> Account {
        Account {
            nonce: Nonce::new(0),
            balance: Wei::zero(),
            code_hash: CryptoHash::zero(),
        }
    }

    pub fn has_code(&self) -> bool {
        !self.code_hash.is_zero()
    }
}
