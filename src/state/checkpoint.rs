/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! A stack of transactional overlays over a backing [`KVStore`].
//!
//! [`checkpoint`](CheckpointStore::checkpoint) pushes a frame holding an empty overlay and the
//! trie root recorded at the moment of entry. While at least one frame is open, writes land in
//! the top overlay only, and reads probe the overlays top-down before falling through to the
//! backing store. [`commit`](CheckpointStore::commit) pops the top frame and merges its
//! overlay into the parent frame (the child's writes win on conflict), or — if the popped
//! frame was the last one — flushes the overlay to the backing store as one atomic
//! [`WriteBatch`]. [`revert`](CheckpointStore::revert) pops the top frame, discards its
//! writes, and hands back the root that was recorded when the frame was opened.
//!
//! Every transaction application is bracketed by `checkpoint()` and exactly one of
//! `commit()`/`revert()`, which is what makes applying a transaction atomic: its writes become
//! visible below the frame all at once, or not at all.
//!
//! Calling `commit` or `revert` with no open checkpoint is a programming error and is reported
//! as [`CheckpointError::NoOpenCheckpoint`]; it is not retriable. Write failures inside the
//! backing store are fatal to the store implementation (the [`KVStore`] contract requires
//! atomic application); because all writes are buffered in the overlay until the final flush,
//! a store that fails by panicking leaves the previously committed state intact.

use std::fmt::{self, Display, Formatter};

use crate::state::kv_store::{KVGet, KVStore, WriteBatch};
use crate::types::basic::{CryptoHash, StateUpdates};

struct Frame {
    overlay: StateUpdates,
    root: CryptoHash,
}

pub struct CheckpointStore<K: KVStore> {
    backing: K,
    frames: Vec<Frame>,
}

impl<K: KVStore> CheckpointStore<K> {
    pub fn new(backing: K) -> CheckpointStore<K> {
        CheckpointStore {
            backing,
            frames: Vec::new(),
        }
    }

    /// Push a frame, recording `root` as the root to restore if the frame is reverted.
    pub fn checkpoint(&mut self, root: CryptoHash) {
        self.frames.push(Frame {
            overlay: StateUpdates::new(),
            root,
        });
    }

    /// Pop the top frame and merge its writes downward: into the parent frame if one exists,
    /// otherwise into the backing store as one atomic batch.
    pub fn commit(&mut self) -> Result<(), CheckpointError> {
        let top = self.frames.pop().ok_or(CheckpointError::NoOpenCheckpoint)?;

        match self.frames.last_mut() {
            Some(parent) => parent.overlay.absorb(top.overlay),
            None => self.flush(top.overlay),
        }
        Ok(())
    }

    /// Pop the top frame, discard its writes, and return the root recorded when it was
    /// opened.
    pub fn revert(&mut self) -> Result<CryptoHash, CheckpointError> {
        let top = self.frames.pop().ok_or(CheckpointError::NoOpenCheckpoint)?;
        Ok(top.root)
    }

    /// The number of open checkpoint frames.
    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    /// Read `key`, probing open overlays top-down before falling through to the backing
    /// store.
    pub fn get(&self, key: &[u8]) -> Option<Vec<u8>> {
        let key = key.to_vec();
        for frame in self.frames.iter().rev() {
            if frame.overlay.contains_delete(&key) {
                return None;
            }
            if let Some(value) = frame.overlay.get_insert(&key) {
                return Some(value.clone());
            }
        }
        self.backing.get(&key)
    }

    /// Write `key`. Inside an open checkpoint the write is buffered in the top overlay;
    /// with no open checkpoint it is applied to the backing store immediately.
    pub fn put(&mut self, key: Vec<u8>, value: Vec<u8>) {
        match self.frames.last_mut() {
            Some(top) => top.overlay.insert(key, value),
            None => {
                let mut updates = StateUpdates::new();
                updates.insert(key, value);
                self.flush(updates);
            }
        }
    }

    /// Delete `key`, with the same buffering behavior as [`put`](Self::put).
    pub fn delete(&mut self, key: Vec<u8>) {
        match self.frames.last_mut() {
            Some(top) => top.overlay.delete(key),
            None => {
                let mut updates = StateUpdates::new();
                updates.delete(key);
                self.flush(updates);
            }
        }
    }

    /// Apply a whole batch of updates with the same buffering behavior as
    /// [`put`](Self::put).
    pub fn apply(&mut self, updates: StateUpdates) {
        match self.frames.last_mut() {
            Some(top) => top.overlay.absorb(updates),
            None => self.flush(updates),
        }
    }

    /// A clone of the backing store handle, for readers that must not observe uncommitted
    /// overlay writes.
    pub fn backing(&self) -> K {
        self.backing.clone()
    }

    fn flush(&mut self, updates: StateUpdates) {
        if updates.is_empty() {
            return;
        }
        let mut wb = K::WriteBatch::new();
        for (key, value) in updates.inserts() {
            wb.set(key, value);
        }
        for key in updates.deletions() {
            wb.delete(key);
        }
        self.backing.write(wb);
    }
}

/// Error arising from misuse of the checkpoint stack. This is a programming error on the
/// caller's side, never a transient condition.
#[derive(Debug, PartialEq, Eq)]
pub enum CheckpointError {
    /// `commit` or `revert` was called while no checkpoint was open.
    NoOpenCheckpoint,
}

impl Display for CheckpointError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            CheckpointError::NoOpenCheckpoint => {
                write!(f, "commit or revert called with no open checkpoint")
            }
        }
    }
}
