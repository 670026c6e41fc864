/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! A Merkle-structured map from byte keys to Borsh-encoded values, layered over the
//! [checkpoint store](super::checkpoint).
//!
//! Nodes are content-addressed: a node is stored at the key formed from
//! [`TRIE_NODES`](super::paths::TRIE_NODES) plus the SHA256 digest of the node's Borsh
//! encoding. Mutations write fresh nodes and re-point the working root; the nodes reachable
//! from an older root are never overwritten, so any historical root remains resolvable for as
//! long as its nodes are retained in the backing store.
//!
//! [`checkpoint`](StateTrie::checkpoint), [`commit`](StateTrie::commit) and
//! [`revert`](StateTrie::revert) mirror the checkpoint store's operations: a checkpoint
//! records the working root, and reverting restores it while discarding the node writes made
//! inside the frame.

use borsh::{BorshDeserialize, BorshSerialize};
use std::fmt::{self, Display, Formatter};

use crate::state::checkpoint::{CheckpointError, CheckpointStore};
use crate::state::kv_store::{KVGet, KVStore};
use crate::state::paths;
use crate::state::utilities::combine;
use crate::types::basic::CryptoHash;
use crate::types::crypto_primitives::sha256;

/// One node of the trie. Paths are nibble strings: each byte of a key contributes two nibbles,
/// high first.
#[derive(Clone, BorshSerialize, BorshDeserialize)]
pub enum Node {
    /// Terminates a key. `path` holds the nibbles remaining below the parent.
    Leaf { path: Vec<u8>, value: Vec<u8> },
    /// A shared run of nibbles with exactly one child below it.
    Extension { path: Vec<u8>, child: CryptoHash },
    /// A 16-way fork, with an optional value for the key terminating exactly here.
    Branch {
        children: [Option<CryptoHash>; 16],
        value: Option<Vec<u8>>,
    },
}

impl Node {
    fn encode(&self) -> Vec<u8> {
        self.try_to_vec().unwrap()
    }

    fn hash(&self) -> CryptoHash {
        sha256(&self.encode())
    }
}

/// The mutable state trie: a working root plus the checkpoint store the nodes live in.
pub struct StateTrie<K: KVStore> {
    store: CheckpointStore<K>,
    root: CryptoHash,
}

impl<K: KVStore> StateTrie<K> {
    /// Open a trie over `store` with `root` as the working root. A zero root denotes the
    /// empty trie.
    pub fn new(store: CheckpointStore<K>, root: CryptoHash) -> StateTrie<K> {
        StateTrie { store, root }
    }

    pub fn root(&self) -> CryptoHash {
        self.root
    }

    /// Push a checkpoint frame recording the current working root.
    pub fn checkpoint(&mut self) {
        let root = self.root;
        self.store.checkpoint(root);
    }

    /// Merge the top frame's node writes downward. The working root is unaffected.
    pub fn commit(&mut self) -> Result<(), CheckpointError> {
        self.store.commit()
    }

    /// Discard the top frame's node writes and restore the working root recorded at the
    /// matching [`checkpoint`](Self::checkpoint).
    pub fn revert(&mut self) -> Result<(), CheckpointError> {
        self.root = self.store.revert()?;
        Ok(())
    }

    /// The number of open checkpoint frames.
    pub fn checkpoint_depth(&self) -> usize {
        self.store.depth()
    }

    /// A clone of the backing store handle, for historical readers.
    pub fn backing(&self) -> K {
        self.store.backing()
    }

    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, TrieError> {
        get_from_root(
            &|hash| self.store.get(&combine(&paths::TRIE_NODES, &hash.bytes())),
            self.root,
            &nibbles(key),
        )
    }

    pub fn insert(&mut self, key: &[u8], value: Vec<u8>) -> Result<(), TrieError> {
        let root = self.root;
        let path = nibbles(key);
        let new_root = if root.is_zero() {
            self.write_node(&Node::Leaf { path, value })
        } else {
            self.insert_below(root, &path, value)?
        };
        self.root = new_root;
        Ok(())
    }

    pub fn remove(&mut self, key: &[u8]) -> Result<(), TrieError> {
        let root = self.root;
        if root.is_zero() {
            return Ok(());
        }
        let path = nibbles(key);
        self.root = self
            .remove_below(root, &path)?
            .unwrap_or_else(CryptoHash::zero);
        Ok(())
    }

    fn node(&self, hash: &CryptoHash) -> Result<Node, TrieError> {
        fetch_node(
            &|hash: &CryptoHash| self.store.get(&combine(&paths::TRIE_NODES, &hash.bytes())),
            hash,
        )
    }

    fn write_node(&mut self, node: &Node) -> CryptoHash {
        let encoding = node.encode();
        let hash = sha256(&encoding);
        self.store
            .put(combine(&paths::TRIE_NODES, &hash.bytes()), encoding);
        hash
    }

    fn insert_below(
        &mut self,
        node_hash: CryptoHash,
        path: &[u8],
        value: Vec<u8>,
    ) -> Result<CryptoHash, TrieError> {
        let node = self.node(&node_hash)?;
        let new_node = match node {
            Node::Leaf {
                path: leaf_path,
                value: leaf_value,
            } => {
                if leaf_path == path {
                    Node::Leaf {
                        path: path.to_vec(),
                        value,
                    }
                } else {
                    self.split_leaf(&leaf_path, leaf_value, path, value)
                }
            }

            Node::Extension {
                path: ext_path,
                child,
            } => {
                let shared = common_prefix(&ext_path, path);
                if shared == ext_path.len() {
                    // The whole extension is on the way down. Recurse into its child.
                    let new_child = self.insert_below(child, &path[shared..], value)?;
                    Node::Extension {
                        path: ext_path,
                        child: new_child,
                    }
                } else {
                    self.split_extension(&ext_path, child, shared, path, value)
                }
            }

            Node::Branch {
                mut children,
                value: branch_value,
            } => {
                if path.is_empty() {
                    Node::Branch {
                        children,
                        value: Some(value),
                    }
                } else {
                    let index = path[0] as usize;
                    let new_child = match children[index] {
                        Some(child) => self.insert_below(child, &path[1..], value)?,
                        None => self.write_node(&Node::Leaf {
                            path: path[1..].to_vec(),
                            value,
                        }),
                    };
                    children[index] = Some(new_child);
                    Node::Branch {
                        children,
                        value: branch_value,
                    }
                }
            }
        };
        Ok(self.write_node(&new_node))
    }

    /// Replace a leaf whose path diverges from the inserted key with a branch (possibly under
    /// a shared extension) holding both.
    fn split_leaf(
        &mut self,
        leaf_path: &[u8],
        leaf_value: Vec<u8>,
        path: &[u8],
        value: Vec<u8>,
    ) -> Node {
        let shared = common_prefix(leaf_path, path);
        let mut children: [Option<CryptoHash>; 16] = Default::default();
        let mut branch_value = None;

        let leaf_rest = &leaf_path[shared..];
        if leaf_rest.is_empty() {
            branch_value = Some(leaf_value);
        } else {
            children[leaf_rest[0] as usize] = Some(self.write_node(&Node::Leaf {
                path: leaf_rest[1..].to_vec(),
                value: leaf_value,
            }));
        }

        let new_rest = &path[shared..];
        if new_rest.is_empty() {
            branch_value = Some(value);
        } else {
            children[new_rest[0] as usize] = Some(self.write_node(&Node::Leaf {
                path: new_rest[1..].to_vec(),
                value,
            }));
        }

        let branch = Node::Branch {
            children,
            value: branch_value,
        };
        if shared == 0 {
            branch
        } else {
            let branch_hash = self.write_node(&branch);
            Node::Extension {
                path: path[..shared].to_vec(),
                child: branch_hash,
            }
        }
    }

    /// Split an extension at the point where the inserted key diverges from it.
    fn split_extension(
        &mut self,
        ext_path: &[u8],
        child: CryptoHash,
        shared: usize,
        path: &[u8],
        value: Vec<u8>,
    ) -> Node {
        let mut children: [Option<CryptoHash>; 16] = Default::default();
        let mut branch_value = None;

        let ext_rest = &ext_path[shared..];
        // ext_rest is nonempty: shared < ext_path.len() by the caller's case split.
        let ext_slot = if ext_rest.len() == 1 {
            child
        } else {
            self.write_node(&Node::Extension {
                path: ext_rest[1..].to_vec(),
                child,
            })
        };
        children[ext_rest[0] as usize] = Some(ext_slot);

        let new_rest = &path[shared..];
        if new_rest.is_empty() {
            branch_value = Some(value);
        } else {
            children[new_rest[0] as usize] = Some(self.write_node(&Node::Leaf {
                path: new_rest[1..].to_vec(),
                value,
            }));
        }

        let branch = Node::Branch {
            children,
            value: branch_value,
        };
        if shared == 0 {
            branch
        } else {
            let branch_hash = self.write_node(&branch);
            Node::Extension {
                path: path[..shared].to_vec(),
                child: branch_hash,
            }
        }
    }

    /// Remove `path` below the node at `node_hash`. Returns the replacement node's hash, or
    /// `None` if the subtree became empty.
    fn remove_below(
        &mut self,
        node_hash: CryptoHash,
        path: &[u8],
    ) -> Result<Option<CryptoHash>, TrieError> {
        let node = self.node(&node_hash)?;
        match node {
            Node::Leaf {
                path: leaf_path, ..
            } => {
                if leaf_path == path {
                    Ok(None)
                } else {
                    // Key absent. The subtree is unchanged.
                    Ok(Some(node_hash))
                }
            }

            Node::Extension {
                path: ext_path,
                child,
            } => {
                if path.len() < ext_path.len() || path[..ext_path.len()] != ext_path[..] {
                    return Ok(Some(node_hash));
                }
                match self.remove_below(child, &path[ext_path.len()..])? {
                    None => Ok(None),
                    Some(new_child) if new_child == child => Ok(Some(node_hash)),
                    Some(new_child) => {
                        let collapsed = self.collapse_extension(ext_path, new_child)?;
                        Ok(Some(self.write_node(&collapsed)))
                    }
                }
            }

            Node::Branch {
                mut children,
                value: branch_value,
            } => {
                if path.is_empty() {
                    if branch_value.is_none() {
                        return Ok(Some(node_hash));
                    }
                    self.normalize_branch(children, None)
                } else {
                    let index = path[0] as usize;
                    let child = match children[index] {
                        Some(child) => child,
                        None => return Ok(Some(node_hash)),
                    };
                    let new_child = self.remove_below(child, &path[1..])?;
                    if new_child == Some(child) {
                        return Ok(Some(node_hash));
                    }
                    children[index] = new_child;
                    self.normalize_branch(children, branch_value)
                }
            }
        }
    }

    /// Rebuild a branch after one of its slots changed, collapsing it if it no longer forks.
    fn normalize_branch(
        &mut self,
        children: [Option<CryptoHash>; 16],
        value: Option<Vec<u8>>,
    ) -> Result<Option<CryptoHash>, TrieError> {
        let occupied: Vec<usize> = (0..16).filter(|i| children[*i].is_some()).collect();

        match (occupied.len(), &value) {
            (0, None) => Ok(None),
            (0, Some(_)) => {
                let leaf = Node::Leaf {
                    path: Vec::new(),
                    value: value.unwrap(),
                };
                Ok(Some(self.write_node(&leaf)))
            }
            (1, None) => {
                let index = occupied[0];
                let child = children[index].unwrap();
                let collapsed = self.collapse_extension(vec![index as u8], child)?;
                Ok(Some(self.write_node(&collapsed)))
            }
            _ => {
                let branch = Node::Branch { children, value };
                Ok(Some(self.write_node(&branch)))
            }
        }
    }

    /// Form the node for "the run of nibbles `prefix` leading to `child`", absorbing the
    /// child into the prefix where the child is itself a leaf or an extension.
    fn collapse_extension(&mut self, prefix: Vec<u8>, child: CryptoHash) -> Result<Node, TrieError> {
        let child_node = self.node(&child)?;
        Ok(match child_node {
            Node::Leaf { path, value } => Node::Leaf {
                path: join_paths(&prefix, &path),
                value,
            },
            Node::Extension {
                path,
                child: grandchild,
            } => Node::Extension {
                path: join_paths(&prefix, &path),
                child: grandchild,
            },
            Node::Branch { .. } => Node::Extension {
                path: prefix,
                child,
            },
        })
    }
}

/// A read-only view of the trie at an arbitrary root, over any [`KVGet`] source. Used for
/// historical queries against roots that have already been committed.
pub struct TrieReader<'a, G: KVGet> {
    source: &'a G,
}

impl<'a, G: KVGet> TrieReader<'a, G> {
    pub fn new(source: &'a G) -> TrieReader<'a, G> {
        TrieReader { source }
    }

    pub fn get(&self, root: CryptoHash, key: &[u8]) -> Result<Option<Vec<u8>>, TrieError> {
        get_from_root(
            &|hash| {
                self.source
                    .get(&combine(&paths::TRIE_NODES, &hash.bytes()))
            },
            root,
            &nibbles(key),
        )
    }
}

fn get_from_root(
    fetch: &dyn Fn(&CryptoHash) -> Option<Vec<u8>>,
    root: CryptoHash,
    path: &[u8],
) -> Result<Option<Vec<u8>>, TrieError> {
    if root.is_zero() {
        return Ok(None);
    }

    let mut current = root;
    let mut remaining = path;
    loop {
        let node = fetch_node(fetch, &current)?;
        match node {
            Node::Leaf {
                path: leaf_path,
                value,
            } => {
                return Ok(if leaf_path == remaining {
                    Some(value)
                } else {
                    None
                });
            }
            Node::Extension {
                path: ext_path,
                child,
            } => {
                if remaining.len() < ext_path.len() || remaining[..ext_path.len()] != ext_path[..] {
                    return Ok(None);
                }
                remaining = &remaining[ext_path.len()..];
                current = child;
            }
            Node::Branch { children, value } => {
                if remaining.is_empty() {
                    return Ok(value);
                }
                match children[remaining[0] as usize] {
                    Some(child) => {
                        remaining = &remaining[1..];
                        current = child;
                    }
                    None => return Ok(None),
                }
            }
        }
    }
}

fn fetch_node(
    fetch: &dyn Fn(&CryptoHash) -> Option<Vec<u8>>,
    hash: &CryptoHash,
) -> Result<Node, TrieError> {
    let bytes = fetch(hash).ok_or(TrieError::NodeNotFound { hash: *hash })?;
    Node::deserialize(&mut &*bytes).map_err(|err| TrieError::DeserializeNodeError {
        hash: *hash,
        source: err,
    })
}

/// Expand a byte key into its nibble path, high nibble first.
fn nibbles(key: &[u8]) -> Vec<u8> {
    let mut path = Vec::with_capacity(key.len() * 2);
    for byte in key {
        path.push(byte >> 4);
        path.push(byte & 0x0f);
    }
    path
}

fn join_paths(a: &[u8], b: &[u8]) -> Vec<u8> {
    let mut joined = Vec::with_capacity(a.len() + b.len());
    joined.extend_from_slice(a);
    joined.extend_from_slice(b);
    joined
}

fn common_prefix(a: &[u8], b: &[u8]) -> usize {
    a.iter().zip(b.iter()).take_while(|(x, y)| x == y).count()
}

/// Error when trying to resolve a key through the trie. Both variants indicate either a
/// corrupted store or a root that was never valid; neither is produced in normal operation.
#[derive(Debug)]
pub enum TrieError {
    /// A node referenced by its parent (or used as a root) is absent from the store.
    NodeNotFound { hash: CryptoHash },

    /// A stored node's bytes did not decode as a [`Node`].
    DeserializeNodeError {
        hash: CryptoHash,
        source: std::io::Error,
    },
}

impl Display for TrieError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            TrieError::NodeNotFound { hash } => {
                write!(f, "trie node not found for hash {}", hash)
            }
            TrieError::DeserializeNodeError { hash, source } => {
                write!(f, "failed to deserialize trie node {}: {}", hash, source)
            }
        }
    }
}
