/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Byte-prefixes that specify where each chain variable is stored in the user-provided
//! key-value store.
//!
//! "Single values" (e.g., the head pointer) are stored at one-byte constant keys. Mappings of
//! the form "`A` -> `B`" (e.g., blocks by hash) are stored at keys formed by
//! [combining](super::utilities::combine) a constant one-byte prefix with the serialization of
//! an instance of the `A` type. Trie nodes are a mapping from a node's content digest to its
//! Borsh encoding; world-state entries (accounts, storage slots, code) are keys *inside* the
//! trie, formed from the prefixes in the second group below.

// Chain variables, keyed in the backing store directly.
pub const TRIE_NODES: [u8; 1] = [0];
pub const BLOCKS: [u8; 1] = [1];
pub const BLOCK_AT_NUMBER: [u8; 1] = [2];
pub const HEAD_BLOCK: [u8; 1] = [3];
pub const RECEIPTS: [u8; 1] = [4];
pub const TRANSACTION_LOCATIONS: [u8; 1] = [5];

// World-state entries, keyed inside the state trie.
pub const ACCOUNTS: [u8; 1] = [0];
pub const STORAGE: [u8; 1] = [1];
pub const CODE: [u8; 1] = [2];
