/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The storage stack: the pluggable key-value seam, the checkpointed overlay store, the
//! Merkle state trie built on top of it, and the typed world-state view used by the executor.

pub mod checkpoint;

pub mod kv_store;

pub mod paths;

pub mod trie;

pub mod utilities;

pub mod world;

pub use checkpoint::{CheckpointError, CheckpointStore};
pub use kv_store::{KVGet, KVStore, WriteBatch};
pub use trie::{StateTrie, TrieError, TrieReader};
pub use world::{WorldState, WorldStateError};
