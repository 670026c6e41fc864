/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Defines the [`KVStore`] trait, which specifies the required interface for the ordered
//! key-value store provided by the user as the chain's backing storage.
//!
//! Any store that can atomically apply a batch of writes and serve point reads suffices. The
//! crate's own structures — the [checkpoint store](super::checkpoint), the
//! [state trie](super::trie), and the [chain indices](crate::chain) — are all layered on top
//! of this seam.

pub trait KVStore: KVGet + Clone + Send + 'static {
    type WriteBatch: WriteBatch;
    type Snapshot<'a>: 'a + KVGet;

    /// Atomically apply `wb` to the store.
    fn write(&mut self, wb: Self::WriteBatch);
    fn clear(&mut self);
    /// A read-only view of the store at the moment of the call.
    fn snapshot<'b>(&'b self) -> Self::Snapshot<'_>;
}

pub trait KVGet {
    fn get(&self, key: &[u8]) -> Option<Vec<u8>>;
}

pub trait WriteBatch {
    fn new() -> Self;
    fn set(&mut self, key: &[u8], value: &[u8]);
    fn delete(&mut self, key: &[u8]);
}
