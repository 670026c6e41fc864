/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! "Inert" types that are sent around and inspected, but have no active behavior. These types
//! follow the newtype pattern and the API for using them is defined in this module.
//!
//! Types specific to a single component (transactions, blocks, receipts, accounts) live in their
//! own modules under [`crate::types`].

use borsh::{BorshDeserialize, BorshSerialize};
use std::{
    collections::{hash_map, hash_set, HashMap, HashSet},
    fmt::{self, Debug, Display, Formatter},
    hash::Hash,
    ops::{Add, AddAssign, Sub},
};

/// Id of the blockchain, used to identify the blockchain.
#[derive(Clone, Copy, PartialEq, Eq, BorshDeserialize, BorshSerialize)]
pub struct ChainId(u64);

impl ChainId {
    pub const fn new(int: u64) -> Self {
        Self(int)
    }

    pub const fn int(&self) -> u64 {
        self.0
    }
}

/// Number of an existing block in the canonical chain. The genesis block has number 0.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, BorshDeserialize, BorshSerialize,
)]
pub struct BlockNumber(u64);

impl BlockNumber {
    pub const fn new(int: u64) -> Self {
        Self(int)
    }

    pub const fn int(&self) -> u64 {
        self.0
    }

    pub fn to_le_bytes(&self) -> [u8; 8] {
        self.0.to_le_bytes()
    }
}

impl Display for BlockNumber {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        std::fmt::Display::fmt(&self.0, f)
    }
}

impl AddAssign<u64> for BlockNumber {
    fn add_assign(&mut self, rhs: u64) {
        self.0.add_assign(rhs)
    }
}

impl Add<u64> for BlockNumber {
    type Output = BlockNumber;
    fn add(self, rhs: u64) -> Self::Output {
        BlockNumber::new(self.0.add(rhs))
    }
}

impl Sub<BlockNumber> for BlockNumber {
    type Output = u64;
    fn sub(self, rhs: BlockNumber) -> Self::Output {
        self.0 - rhs.0
    }
}

/// Per-sender monotonic transaction counter. Must increase by exactly 1 per confirmed
/// transaction.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, BorshDeserialize, BorshSerialize,
)]
pub struct Nonce(u64);

impl Nonce {
    pub const fn new(int: u64) -> Self {
        Self(int)
    }

    pub const fn int(&self) -> u64 {
        self.0
    }
}

impl Display for Nonce {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        std::fmt::Display::fmt(&self.0, f)
    }
}

impl Add<u64> for Nonce {
    type Output = Nonce;
    fn add(self, rhs: u64) -> Self::Output {
        Nonce::new(self.0.add(rhs))
    }
}

impl AddAssign<u64> for Nonce {
    fn add_assign(&mut self, rhs: u64) {
        self.0.add_assign(rhs)
    }
}

/// An amount of gas, either as a limit or as an amount consumed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, BorshDeserialize, BorshSerialize)]
pub struct Gas(u64);

impl Gas {
    pub const fn new(int: u64) -> Self {
        Self(int)
    }

    pub const fn int(&self) -> u64 {
        self.0
    }

    pub fn saturating_sub(self, rhs: Gas) -> Gas {
        Gas(self.0.saturating_sub(rhs.0))
    }
}

impl Display for Gas {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        std::fmt::Display::fmt(&self.0, f)
    }
}

impl Add<Gas> for Gas {
    type Output = Gas;
    fn add(self, rhs: Gas) -> Self::Output {
        Gas(self.0 + rhs.0)
    }
}

impl AddAssign<Gas> for Gas {
    fn add_assign(&mut self, rhs: Gas) {
        self.0.add_assign(rhs.0)
    }
}

impl Sub<Gas> for Gas {
    type Output = Gas;
    fn sub(self, rhs: Gas) -> Self::Output {
        Gas(self.0 - rhs.0)
    }
}

/// An amount of the chain's native currency, in its smallest denomination.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, BorshDeserialize, BorshSerialize,
)]
pub struct Wei(u128);

impl Wei {
    pub const fn new(int: u128) -> Self {
        Self(int)
    }

    pub const fn int(&self) -> u128 {
        self.0
    }

    pub const fn zero() -> Self {
        Self(0)
    }

    pub fn checked_sub(self, rhs: Wei) -> Option<Wei> {
        self.0.checked_sub(rhs.0).map(Wei)
    }

    /// Price × amount-of-gas, saturating at the top of the range.
    pub fn saturating_mul_gas(self, gas: Gas) -> Wei {
        Wei(self.0.saturating_mul(gas.int() as u128))
    }
}

impl Display for Wei {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        std::fmt::Display::fmt(&self.0, f)
    }
}

impl Add<Wei> for Wei {
    type Output = Wei;
    fn add(self, rhs: Wei) -> Self::Output {
        Wei(self.0 + rhs.0)
    }
}

impl AddAssign<Wei> for Wei {
    fn add_assign(&mut self, rhs: Wei) {
        self.0.add_assign(rhs.0)
    }
}

impl Sub<Wei> for Wei {
    type Output = Wei;
    fn sub(self, rhs: Wei) -> Self::Output {
        Wei(self.0 - rhs.0)
    }
}

/// A block timestamp, in seconds since the Unix Epoch.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, BorshDeserialize, BorshSerialize)]
pub struct Timestamp(u64);

impl Timestamp {
    pub const fn new(int: u64) -> Self {
        Self(int)
    }

    pub const fn int(&self) -> u64 {
        self.0
    }
}

impl Display for Timestamp {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        std::fmt::Display::fmt(&self.0, f)
    }
}

impl Add<u64> for Timestamp {
    type Output = Timestamp;
    fn add(self, rhs: u64) -> Self::Output {
        Timestamp(self.0.saturating_add(rhs))
    }
}

/// Arrival order of a transaction in the pool. Used to break price ties FIFO-fairly when
/// assembling a block.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, BorshDeserialize, BorshSerialize)]
pub struct SequenceNumber(u64);

impl SequenceNumber {
    pub const fn new(int: u64) -> Self {
        Self(int)
    }

    pub const fn int(&self) -> u64 {
        self.0
    }
}

/// Identifier handed out by [`snapshot`](crate::chain::Blockchain::snapshot) and accepted by
/// [`revert_to`](crate::chain::Blockchain::revert_to). Identifiers are strictly increasing
/// within one chain.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, BorshDeserialize, BorshSerialize)]
pub struct SnapshotId(u64);

impl SnapshotId {
    pub const fn new(int: u64) -> Self {
        Self(int)
    }

    pub const fn int(&self) -> u64 {
        self.0
    }
}

impl Display for SnapshotId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        std::fmt::Display::fmt(&self.0, f)
    }
}

/// A 32-byte SHA256 digest: of a transaction, a block header, a trie node, or a code blob.
#[derive(Clone, Copy, PartialEq, Eq, Hash, BorshDeserialize, BorshSerialize)]
pub struct CryptoHash([u8; 32]);

impl CryptoHash {
    pub const fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub const fn bytes(&self) -> [u8; 32] {
        self.0
    }

    /// The digest used as "no hash": all zeroes. The parent hash of the genesis block, and
    /// the root of an empty state trie.
    pub const fn zero() -> Self {
        Self([0u8; 32])
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 32]
    }
}

impl Display for CryptoHash {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl Debug for CryptoHash {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Address of an account: the bytes of its Ed25519 verifying key.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, BorshDeserialize, BorshSerialize)]
pub struct Address([u8; 32]);

impl Address {
    pub const fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub const fn bytes(&self) -> [u8; 32] {
        self.0
    }
}

impl Display for Address {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl Debug for Address {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Signature represented in bytes.
#[derive(Clone, Copy, PartialEq, Eq, BorshDeserialize, BorshSerialize)]
pub struct SignatureBytes([u8; 64]);

impl SignatureBytes {
    pub const fn new(bytes: [u8; 64]) -> Self {
        Self(bytes)
    }

    pub const fn bytes(&self) -> [u8; 64] {
        self.0
    }
}

/// 2048-bit filter over the addresses and topics of the logs emitted by a transaction or a
/// block. Three bit positions are derived from the SHA256 digest of each accrued value.
#[derive(Clone, Copy, PartialEq, Eq, BorshDeserialize, BorshSerialize)]
pub struct Bloom([u8; 256]);

impl Bloom {
    pub const fn empty() -> Self {
        Self([0u8; 256])
    }

    pub const fn bytes(&self) -> [u8; 256] {
        self.0
    }

    /// Set the three filter bits derived from `value`.
    pub fn accrue(&mut self, value: &[u8]) {
        let digest = sha256(value);
        for pair in 0..3 {
            let index = (((digest[pair * 2] as usize) << 8) | digest[pair * 2 + 1] as usize) % 2048;
            self.0[index / 8] |= 1 << (index % 8);
        }
    }

    /// OR another bloom into this one.
    pub fn merge(&mut self, other: &Bloom) {
        for (byte, other_byte) in self.0.iter_mut().zip(other.0.iter()) {
            *byte |= other_byte;
        }
    }

    /// Whether every filter bit derived from `value` is set. False positives are possible,
    /// false negatives are not.
    pub fn may_contain(&self, value: &[u8]) -> bool {
        let digest = sha256(value);
        (0..3).all(|pair| {
            let index = (((digest[pair * 2] as usize) << 8) | digest[pair * 2 + 1] as usize) % 2048;
            self.0[index / 8] & (1 << (index % 8)) != 0
        })
    }

    pub fn is_empty(&self) -> bool {
        self.0.iter().all(|byte| *byte == 0)
    }
}

impl Default for Bloom {
    fn default() -> Self {
        Self::empty()
    }
}

fn sha256(value: &[u8]) -> [u8; 32] {
    use sha2::Digest;
    let mut hasher = crate::types::crypto_primitives::CryptoHasher::new();
    hasher.update(value);
    hasher.finalize().into()
}

/// Stores the writes buffered inside one checkpoint frame, or more generally any batch of
/// inserts and deletes that is applied atomically.
#[derive(Clone, BorshSerialize, BorshDeserialize)]
pub struct UpdateSet<K: Eq + Hash, V: Eq + Hash> {
    pub inserts: HashMap<K, V>,
    pub deletes: HashSet<K>,
}

impl<K: Eq + Hash, V: Eq + Hash> UpdateSet<K, V> {
    pub fn new() -> Self {
        Self {
            inserts: HashMap::new(),
            deletes: HashSet::new(),
        }
    }

    pub fn insert(&mut self, key: K, value: V) {
        self.deletes.remove(&key);
        self.inserts.insert(key, value);
    }

    pub fn delete(&mut self, key: K) {
        self.inserts.remove(&key);
        self.deletes.insert(key);
    }

    pub fn get_insert(&self, key: &K) -> Option<&V> {
        self.inserts.get(key)
    }

    pub fn contains_delete(&self, key: &K) -> bool {
        self.deletes.contains(key)
    }

    pub fn is_empty(&self) -> bool {
        self.inserts.is_empty() && self.deletes.is_empty()
    }

    /// Get an iterator over all of the key-value pairs inserted by this [UpdateSet].
    pub fn inserts(&self) -> hash_map::Iter<K, V> {
        self.inserts.iter()
    }

    /// Get an iterator over all of the keys that are deleted by this [UpdateSet].
    pub fn deletions(&self) -> hash_set::Iter<K> {
        self.deletes.iter()
    }

    /// Merge `child` into this update set. Where both touch the same key, the child's write
    /// wins.
    pub fn absorb(&mut self, child: UpdateSet<K, V>) {
        for (key, value) in child.inserts {
            self.insert(key, value);
        }
        for key in child.deletes {
            self.delete(key);
        }
    }
}

impl<K: Eq + Hash, V: Eq + Hash> Default for UpdateSet<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

pub type StateUpdates = UpdateSet<Vec<u8>, Vec<u8>>;
