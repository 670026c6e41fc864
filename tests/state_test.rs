//! Tests the storage stack: checkpoint/commit/revert semantics of the overlay store, and the
//! Merkle state trie built on top of it, including historical root reads.

use devnet_rs::state::{CheckpointError, CheckpointStore, KVGet, StateTrie, TrieReader};
use devnet_rs::types::basic::CryptoHash;

mod common;

use crate::common::mem_db::MemDB;

fn empty_trie(kv: &MemDB) -> StateTrie<MemDB> {
    StateTrie::new(CheckpointStore::new(kv.clone()), CryptoHash::zero())
}

#[test]
fn checkpointed_put_then_commit_equals_unchecked_put() {
    // One trie writes inside a checkpoint bracket, the other writes directly. The final
    // roots and values must be identical.
    let kv_a = MemDB::new();
    let mut bracketed = empty_trie(&kv_a);
    bracketed.checkpoint();
    bracketed.insert(b"alpha", b"1".to_vec()).unwrap();
    bracketed.insert(b"beta", b"2".to_vec()).unwrap();
    bracketed.commit().unwrap();

    let kv_b = MemDB::new();
    let mut direct = empty_trie(&kv_b);
    direct.insert(b"alpha", b"1".to_vec()).unwrap();
    direct.insert(b"beta", b"2".to_vec()).unwrap();

    assert_eq!(bracketed.root(), direct.root());
    assert_eq!(bracketed.get(b"alpha").unwrap(), Some(b"1".to_vec()));
    assert_eq!(direct.get(b"alpha").unwrap(), Some(b"1".to_vec()));
}

#[test]
fn revert_discards_writes_and_restores_the_saved_root() {
    let kv = MemDB::new();
    let mut trie = empty_trie(&kv);
    trie.insert(b"alpha", b"1".to_vec()).unwrap();
    let root_before = trie.root();

    trie.checkpoint();
    trie.insert(b"alpha", b"changed".to_vec()).unwrap();
    trie.insert(b"beta", b"2".to_vec()).unwrap();
    assert_eq!(trie.get(b"alpha").unwrap(), Some(b"changed".to_vec()));

    trie.revert().unwrap();
    assert_eq!(trie.root(), root_before);
    assert_eq!(trie.get(b"alpha").unwrap(), Some(b"1".to_vec()));
    assert_eq!(trie.get(b"beta").unwrap(), None);
    assert_eq!(trie.checkpoint_depth(), 0);
}

#[test]
fn nested_commit_merges_into_the_parent_with_child_winning() {
    let kv = MemDB::new();
    let mut store = CheckpointStore::new(kv.clone());

    store.checkpoint(CryptoHash::zero());
    store.put(b"key".to_vec(), b"parent".to_vec());

    store.checkpoint(CryptoHash::zero());
    store.put(b"key".to_vec(), b"child".to_vec());
    store.put(b"only-child".to_vec(), b"x".to_vec());

    // Committing the inner frame folds its writes into the parent; the child's value wins
    // the conflict. Nothing has reached the backing store yet.
    store.commit().unwrap();
    assert_eq!(store.depth(), 1);
    assert_eq!(store.get(b"key"), Some(b"child".to_vec()));
    assert_eq!(kv.get(b"key"), None);

    // Committing the outer frame flushes everything as one batch.
    store.commit().unwrap();
    assert_eq!(store.depth(), 0);
    assert_eq!(kv.get(b"key"), Some(b"child".to_vec()));
    assert_eq!(kv.get(b"only-child"), Some(b"x".to_vec()));
}

#[test]
fn overlay_reads_probe_top_down_and_respect_deletes() {
    let kv = MemDB::new();
    let mut store = CheckpointStore::new(kv);

    store.put(b"key".to_vec(), b"committed".to_vec());

    store.checkpoint(CryptoHash::zero());
    store.put(b"key".to_vec(), b"outer".to_vec());
    assert_eq!(store.get(b"key"), Some(b"outer".to_vec()));

    // A delete in the top frame shadows every older value.
    store.checkpoint(CryptoHash::zero());
    store.delete(b"key".to_vec());
    assert_eq!(store.get(b"key"), None);

    // Reverting the top frame makes the outer frame's write visible again.
    store.revert().unwrap();
    assert_eq!(store.get(b"key"), Some(b"outer".to_vec()));
}

#[test]
fn commit_or_revert_with_no_open_checkpoint_is_an_error() {
    let kv = MemDB::new();
    let mut store = CheckpointStore::new(kv.clone());
    assert_eq!(store.commit(), Err(CheckpointError::NoOpenCheckpoint));
    assert!(matches!(
        store.revert(),
        Err(CheckpointError::NoOpenCheckpoint)
    ));

    let mut trie = empty_trie(&kv);
    assert_eq!(trie.commit(), Err(CheckpointError::NoOpenCheckpoint));
}

#[test]
fn historical_roots_remain_resolvable() {
    let kv = MemDB::new();
    let mut trie = empty_trie(&kv);

    trie.insert(b"account", b"v1".to_vec()).unwrap();
    let old_root = trie.root();
    trie.insert(b"account", b"v2".to_vec()).unwrap();
    let new_root = trie.root();
    assert_ne!(old_root, new_root);

    // Mutations write fresh nodes and never overwrite old ones, so the old root resolves
    // exactly as it did when it was the working root.
    let reader = TrieReader::new(&kv);
    assert_eq!(reader.get(old_root, b"account").unwrap(), Some(b"v1".to_vec()));
    assert_eq!(reader.get(new_root, b"account").unwrap(), Some(b"v2".to_vec()));
}

#[test]
fn removing_a_key_restores_the_pre_insertion_root() {
    let kv = MemDB::new();
    let mut trie = empty_trie(&kv);

    // The two keys share a long nibble prefix, so the second insertion splits the first
    // leaf into an extension and a branch.
    trie.insert(b"balance-aa", b"1".to_vec()).unwrap();
    let root_one_key = trie.root();
    trie.insert(b"balance-ab", b"2".to_vec()).unwrap();
    assert_ne!(trie.root(), root_one_key);

    // Removing the second key collapses the branch back into the original leaf. Because
    // nodes are content-addressed, the root is byte-identical to the pre-insertion one.
    trie.remove(b"balance-ab").unwrap();
    assert_eq!(trie.root(), root_one_key);
    assert_eq!(trie.get(b"balance-aa").unwrap(), Some(b"1".to_vec()));
    assert_eq!(trie.get(b"balance-ab").unwrap(), None);
}

#[test]
fn removing_the_last_key_empties_the_trie() {
    let kv = MemDB::new();
    let mut trie = empty_trie(&kv);

    trie.insert(b"solo", b"1".to_vec()).unwrap();
    trie.remove(b"solo").unwrap();
    assert_eq!(trie.root(), CryptoHash::zero());
    assert_eq!(trie.get(b"solo").unwrap(), None);
}
