/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The transaction pool: validates, ranks, and stores transactions waiting to be mined.
//!
//! Per sender, the pool keeps two structures: the *executable* queue — a nonce-ascending
//! [`Heap`] of transactions with no nonce gap relative to the sender's confirmed nonce — and
//! the *future* map of nonce-gapped transactions. A transaction is executable iff its nonce
//! equals the sender's confirmed nonce plus the number of executable transactions already
//! queued for that sender. Whenever the lowest executable nonce of a sender is consumed
//! (mined or dropped), the future map is probed for the next contiguous nonce and any match
//! is promoted.
//!
//! Cross-sender ranking happens during block assembly: [`begin_selection`]
//! (TransactionPool::begin_selection) seeds a candidates heap with each sender's lowest-nonce
//! executable transaction, ordered by effective gas price descending with arrival order
//! breaking ties, and [`next_best`](TransactionPool::next_best) pops the global best while
//! reseeding from that sender's queue. Transactions handed out this way are held in the
//! in-flight set until they are pruned (mined) or unlocked (returned).
//!
//! Admission for a single sender must not race with itself: the request coordinator runs all
//! write-class operations on one thread, which serializes nonce-gap computation per sender.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::fmt::{self, Display, Formatter};
use std::sync::mpsc::Sender;
use std::time::SystemTime;

use crate::events::{Event, TransactionReadyEvent};
use crate::pool::heap::{Compare, Heap};
use crate::types::account::Account;
use crate::types::basic::{Address, CryptoHash, Gas, Nonce, SequenceNumber, Wei};
use crate::types::crypto_primitives::SignatureError;
use crate::types::transaction::Transaction;

/// Operating parameters of the pool.
#[derive(Clone)]
pub struct PoolConfig {
    /// Upper bound for any single transaction's gas limit.
    pub block_gas_limit: Gas,
    /// Base fee used to compute effective gas prices for ranking and replacement.
    pub base_fee: Wei,
    /// A same-sender, same-nonce replacement must be priced at least this many percent above
    /// the incumbent.
    pub price_bump_percent: u8,
}

/// How an admitted transaction was classified.
#[derive(Debug, PartialEq, Eq)]
pub enum Admission {
    /// Ready for the next block: no nonce gap.
    Executable,
    /// Nonce-gapped; parked until the gap closes.
    Future,
}

struct PooledTransaction {
    tx: Transaction,
    hash: CryptoHash,
    sequence: SequenceNumber,
}

/// Nonce-ascending order for one sender's executable queue.
struct NonceOrder;

impl Compare<PooledTransaction> for NonceOrder {
    fn compare(&self, a: &PooledTransaction, b: &PooledTransaction) -> Ordering {
        a.tx.nonce().cmp(&b.tx.nonce())
    }
}

/// One cross-sender candidate during block assembly.
struct Candidate {
    sender: Address,
    nonce: Nonce,
    priority: Wei,
    sequence: SequenceNumber,
}

/// Effective-gas-price-descending order, arrival sequence ascending on ties.
struct PriceOrder;

impl Compare<Candidate> for PriceOrder {
    fn compare(&self, a: &Candidate, b: &Candidate) -> Ordering {
        b.priority
            .cmp(&a.priority)
            .then(a.sequence.cmp(&b.sequence))
    }
}

struct SenderQueue {
    confirmed_nonce: Nonce,
    executable: Heap<PooledTransaction, NonceOrder>,
    future: BTreeMap<Nonce, PooledTransaction>,
}

impl SenderQueue {
    fn new(confirmed_nonce: Nonce) -> SenderQueue {
        SenderQueue {
            confirmed_nonce,
            executable: Heap::new(NonceOrder),
            future: BTreeMap::new(),
        }
    }

    /// The nonce the next appended executable transaction must carry.
    fn next_executable_nonce(&self) -> Nonce {
        self.confirmed_nonce + self.executable.len() as u64
    }

    fn is_empty(&self) -> bool {
        self.executable.is_empty() && self.future.is_empty()
    }
}

pub struct TransactionPool {
    config: PoolConfig,
    senders: HashMap<Address, SenderQueue>,
    by_hash: HashMap<CryptoHash, (Address, Nonce)>,
    in_flight: HashMap<CryptoHash, PooledTransaction>,
    candidates: Option<Heap<Candidate, PriceOrder>>,
    next_sequence: u64,
    event_publisher: Option<Sender<Event>>,
    drain_notifier: Option<Sender<()>>,
}

impl TransactionPool {
    pub fn new(
        config: PoolConfig,
        event_publisher: Option<Sender<Event>>,
        drain_notifier: Option<Sender<()>>,
    ) -> TransactionPool {
        TransactionPool {
            config,
            senders: HashMap::new(),
            by_hash: HashMap::new(),
            in_flight: HashMap::new(),
            candidates: None,
            next_sequence: 0,
            event_publisher,
            drain_notifier,
        }
    }

    /* ↓↓↓ Admission ↓↓↓ */

    /// Validate `tx` against `sender_account` (the sender's confirmed account state) and, if
    /// it passes, insert it as executable or future. Rejections leave the pool untouched.
    pub fn prepare(
        &mut self,
        tx: Transaction,
        sender_account: &Account,
    ) -> Result<Admission, ValidationError> {
        tx.verify_signature()
            .map_err(|err| ValidationError::InvalidSignature { source: err })?;

        let hash = tx.hash();
        if self.by_hash.contains_key(&hash) || self.in_flight.contains_key(&hash) {
            return Err(ValidationError::AlreadyKnown { hash });
        }

        if tx.nonce() < sender_account.nonce {
            return Err(ValidationError::NonceTooLow {
                got: tx.nonce(),
                confirmed: sender_account.nonce,
            });
        }

        let intrinsic = tx.intrinsic_gas();
        if intrinsic > tx.gas_limit() {
            return Err(ValidationError::IntrinsicGasExceedsLimit {
                intrinsic,
                limit: tx.gas_limit(),
            });
        }
        if tx.gas_limit() > self.config.block_gas_limit {
            return Err(ValidationError::GasLimitExceedsBlockLimit {
                limit: tx.gas_limit(),
                block_limit: self.config.block_gas_limit,
            });
        }

        if sender_account.balance < tx.max_cost() {
            return Err(ValidationError::InsufficientFunds {
                needed: tx.max_cost(),
                available: sender_account.balance,
            });
        }

        let sender = tx.sender();
        let queue = self
            .senders
            .entry(sender)
            .or_insert_with(|| SenderQueue::new(sender_account.nonce));

        // A queue created before this sender's last confirmation may hold a stale confirmed
        // nonce; refresh it from the account.
        if sender_account.nonce > queue.confirmed_nonce {
            queue.confirmed_nonce = sender_account.nonce;
        }

        // Same sender + nonce as a queued transaction: this is a replacement attempt, gated
        // by the price bump.
        let bump = self.config.price_bump_percent;
        let base_fee = self.config.base_fee;
        let nonce = tx.nonce();

        if let Some(index) = queue
            .executable
            .position(|queued| queued.tx.nonce() == nonce)
        {
            let incumbent_price = {
                let incumbent = queue.executable.iter().nth(index).unwrap();
                incumbent.tx.effective_gas_price(base_fee)
            };
            Self::check_price_bump(&tx, incumbent_price, base_fee, bump)?;

            let replaced = queue.executable.remove(index);
            self.by_hash.remove(&replaced.hash);
            let pooled = self.pooled(tx, hash);
            self.by_hash.insert(hash, (sender, nonce));
            self.senders.get_mut(&sender).unwrap().executable.push(pooled);
            return Ok(Admission::Executable);
        }

        if let Some(incumbent) = queue.future.get(&nonce) {
            let incumbent_price = incumbent.tx.effective_gas_price(base_fee);
            Self::check_price_bump(&tx, incumbent_price, base_fee, bump)?;

            let replaced = queue.future.remove(&nonce).unwrap();
            self.by_hash.remove(&replaced.hash);
            let pooled = self.pooled(tx, hash);
            self.by_hash.insert(hash, (sender, nonce));
            self.senders.get_mut(&sender).unwrap().future.insert(nonce, pooled);
            return Ok(Admission::Future);
        }

        // Fresh nonce slot: executable iff it extends the gap-free run.
        if nonce == queue.next_executable_nonce() {
            let pooled = self.pooled(tx, hash);
            self.by_hash.insert(hash, (sender, nonce));
            let queue = self.senders.get_mut(&sender).unwrap();
            queue.executable.push(pooled);
            self.promote(&sender);
            self.signal_ready(hash);
            Ok(Admission::Executable)
        } else {
            let pooled = self.pooled(tx, hash);
            self.by_hash.insert(hash, (sender, nonce));
            self.senders
                .get_mut(&sender)
                .unwrap()
                .future
                .insert(nonce, pooled);
            Ok(Admission::Future)
        }
    }

    fn check_price_bump(
        tx: &Transaction,
        incumbent_price: Wei,
        base_fee: Wei,
        bump: u8,
    ) -> Result<(), ValidationError> {
        let required = Wei::new(incumbent_price.int() * (100 + bump as u128) / 100);
        let offered = tx.effective_gas_price(base_fee);
        if offered < required || offered <= incumbent_price {
            return Err(ValidationError::UnderpricedReplacement {
                old_price: incumbent_price,
                new_price: offered,
                required,
            });
        }
        Ok(())
    }

    fn pooled(&mut self, tx: Transaction, hash: CryptoHash) -> PooledTransaction {
        let sequence = SequenceNumber::new(self.next_sequence);
        self.next_sequence += 1;
        PooledTransaction { tx, hash, sequence }
    }

    /// Move contiguous future transactions of `sender` into its executable queue.
    fn promote(&mut self, sender: &Address) {
        let queue = match self.senders.get_mut(sender) {
            Some(queue) => queue,
            None => return,
        };

        // Drop future transactions the chain has moved past.
        let stale: Vec<Nonce> = queue
            .future
            .range(..queue.confirmed_nonce)
            .map(|(nonce, _)| *nonce)
            .collect();
        for nonce in stale {
            let dropped = queue.future.remove(&nonce).unwrap();
            self.by_hash.remove(&dropped.hash);
        }

        let queue = self.senders.get_mut(sender).unwrap();
        loop {
            let next = queue.next_executable_nonce();
            match queue.future.remove(&next) {
                Some(pooled) => queue.executable.push(pooled),
                None => break,
            }
        }
    }

    fn signal_ready(&self, hash: CryptoHash) {
        Event::publish(
            &self.event_publisher,
            Event::TransactionReady(TransactionReadyEvent {
                timestamp: SystemTime::now(),
                transaction: hash,
            }),
        );
        if let Some(notifier) = &self.drain_notifier {
            // The miner may have gone away; a missed drain signal is harmless.
            let _ = notifier.send(());
        }
    }

    /* ↓↓↓ Queries ↓↓↓ */

    /// Look up a pooled or in-flight transaction by hash.
    pub fn find(&self, hash: &CryptoHash) -> Option<Transaction> {
        if let Some(pooled) = self.in_flight.get(hash) {
            return Some(pooled.tx.clone());
        }
        let (sender, nonce) = self.by_hash.get(hash)?;
        let queue = self.senders.get(sender)?;
        queue
            .executable
            .iter()
            .find(|pooled| pooled.tx.nonce() == *nonce)
            .map(|pooled| pooled.tx.clone())
            .or_else(|| queue.future.get(nonce).map(|pooled| pooled.tx.clone()))
    }

    pub fn has_executable(&self) -> bool {
        self.senders
            .values()
            .any(|queue| !queue.executable.is_empty())
    }

    pub fn executable_count(&self) -> usize {
        self.senders
            .values()
            .map(|queue| queue.executable.len())
            .sum()
    }

    pub fn future_count(&self) -> usize {
        self.senders.values().map(|queue| queue.future.len()).sum()
    }

    /// Drop every pooled transaction. In-flight transactions are unaffected: they have
    /// already been checked out by a builder.
    pub fn clear(&mut self) {
        self.senders.clear();
        self.by_hash.clear();
        self.candidates = None;
    }

    /* ↓↓↓ Block assembly ↓↓↓ */

    /// Seed the cross-sender candidates heap with each sender's lowest-nonce executable
    /// transaction.
    pub fn begin_selection(&mut self) {
        let base_fee = self.config.base_fee;
        let mut candidates = Heap::new(PriceOrder);
        for (sender, queue) in self.senders.iter() {
            if let Some(top) = queue.executable.peek() {
                candidates.push(Candidate {
                    sender: *sender,
                    nonce: top.tx.nonce(),
                    priority: top.tx.effective_gas_price(base_fee),
                    sequence: top.sequence,
                });
            }
        }
        self.candidates = Some(candidates);
    }

    /// Pop the best-ranked executable transaction, mark it in-flight, and reseed the
    /// candidates heap from the same sender's next executable transaction.
    pub fn next_best(&mut self) -> Option<Transaction> {
        let base_fee = self.config.base_fee;
        loop {
            let candidate = self.candidates.as_mut()?.pop()?;
            let queue = match self.senders.get_mut(&candidate.sender) {
                Some(queue) => queue,
                None => continue,
            };
            match queue.executable.peek() {
                Some(top) if top.tx.nonce() == candidate.nonce => (),
                // The queue changed under the candidate (replacement or clear); skip it.
                _ => continue,
            }

            let pooled = queue.executable.pop().unwrap();
            if let Some(next) = queue.executable.peek() {
                self.candidates.as_mut().unwrap().push(Candidate {
                    sender: candidate.sender,
                    nonce: next.tx.nonce(),
                    priority: next.tx.effective_gas_price(base_fee),
                    sequence: next.sequence,
                });
            }

            self.by_hash.remove(&pooled.hash);
            let tx = pooled.tx.clone();
            self.in_flight.insert(pooled.hash, pooled);
            return Some(tx);
        }
    }

    /// Stop considering `sender` for the block being assembled. Called when one of its
    /// transactions was rejected for remaining-gas reasons: later nonces cannot jump the
    /// queue.
    pub fn skip_sender(&mut self, sender: &Address) {
        if let Some(candidates) = self.candidates.as_mut() {
            if let Some(index) = candidates.position(|candidate| candidate.sender == *sender) {
                candidates.remove(index);
            }
        }
    }

    /// Finish block assembly, dropping the candidates heap.
    pub fn end_selection(&mut self) {
        self.candidates = None;
    }

    /// Return an in-flight transaction to its sender's executable queue. Its original
    /// arrival sequence is preserved.
    pub fn unlock(&mut self, tx: &Transaction) {
        self.unlock_by_hash(tx.hash());
    }

    fn unlock_by_hash(&mut self, hash: CryptoHash) {
        if let Some(pooled) = self.in_flight.remove(&hash) {
            let sender = pooled.tx.sender();
            let nonce = pooled.tx.nonce();
            let queue = self
                .senders
                .entry(sender)
                .or_insert_with(|| SenderQueue::new(nonce));
            queue.executable.push(pooled);
            self.by_hash.insert(hash, (sender, nonce));
        }
    }

    /// Return every in-flight transaction to the queues. Called when a block attempt is
    /// abandoned.
    pub fn unlock_all(&mut self) {
        let hashes: Vec<CryptoHash> = self.in_flight.keys().copied().collect();
        for hash in hashes {
            self.unlock_by_hash(hash);
        }
    }

    /// Drop mined transactions from the in-flight set, advance the senders' confirmed
    /// nonces, and promote future transactions whose gap closed.
    pub fn prune_mined(&mut self, mined: &[Transaction]) {
        let mut touched: Vec<Address> = Vec::new();
        for tx in mined {
            let hash = tx.hash();
            self.in_flight.remove(&hash);
            self.by_hash.remove(&hash);

            let sender = tx.sender();
            if let Some(queue) = self.senders.get_mut(&sender) {
                let confirmed = tx.nonce() + 1;
                if confirmed > queue.confirmed_nonce {
                    queue.confirmed_nonce = confirmed;
                }
                if !touched.contains(&sender) {
                    touched.push(sender);
                }
            }
        }

        let mut became_ready = None;
        for sender in touched {
            self.promote(&sender);
            let queue = self.senders.get(&sender).unwrap();
            if let Some(top) = queue.executable.peek() {
                became_ready = Some(top.hash);
            }
            if queue.is_empty() {
                self.senders.remove(&sender);
            }
        }

        if let Some(hash) = became_ready {
            self.signal_ready(hash);
        }
    }

    /// Re-announce waiting work. Used when the chain resumes after a pause and executable
    /// transactions accumulated in the meantime.
    pub fn renotify(&self) {
        let ready = self
            .senders
            .values()
            .find_map(|queue| queue.executable.peek().map(|pooled| pooled.hash));
        if let Some(hash) = ready {
            self.signal_ready(hash);
        }
    }

    /* ↓↓↓ External repricing events ↓↓↓ */

    /// Adopt a new base fee. If a block is being assembled, every candidate's priority is
    /// recomputed and the candidates heap re-heapified; per-sender queues are unaffected
    /// because they order by nonce.
    pub fn set_base_fee(&mut self, base_fee: Wei) {
        self.config.base_fee = base_fee;
        if let Some(mut candidates) = self.candidates.take() {
            let senders = &self.senders;
            candidates.refresh(|candidate| {
                if let Some(queue) = senders.get(&candidate.sender) {
                    if let Some(top) = queue.executable.peek() {
                        if top.tx.nonce() == candidate.nonce {
                            candidate.priority = top.tx.effective_gas_price(base_fee);
                        }
                    }
                }
            });
            self.candidates = Some(candidates);
        }
    }

    pub fn base_fee(&self) -> Wei {
        self.config.base_fee
    }
}

/// A transaction rejected before touching any state. Fully recoverable: the submitter can fix
/// and resubmit.
#[derive(Debug)]
pub enum ValidationError {
    /// The embedded signature does not verify against the embedded sender key.
    InvalidSignature { source: SignatureError },

    /// The nonce is below the sender's confirmed nonce and can never execute.
    NonceTooLow { got: Nonce, confirmed: Nonce },

    /// The gas the transaction consumes before execution exceeds its own limit.
    IntrinsicGasExceedsLimit { intrinsic: Gas, limit: Gas },

    /// The transaction's gas limit exceeds what any block can hold.
    GasLimitExceedsBlockLimit { limit: Gas, block_limit: Gas },

    /// The sender cannot cover `value + gas_limit × price`.
    InsufficientFunds { needed: Wei, available: Wei },

    /// A same-nonce replacement that does not clear the configured price bump.
    UnderpricedReplacement {
        old_price: Wei,
        new_price: Wei,
        required: Wei,
    },

    /// The exact transaction is already pooled or in flight.
    AlreadyKnown { hash: CryptoHash },
}

impl Display for ValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::InvalidSignature { source } => {
                write!(f, "invalid transaction signature: {}", source)
            }
            ValidationError::NonceTooLow { got, confirmed } => {
                write!(f, "nonce {} is below the confirmed nonce {}", got, confirmed)
            }
            ValidationError::IntrinsicGasExceedsLimit { intrinsic, limit } => {
                write!(f, "intrinsic gas {} exceeds the gas limit {}", intrinsic, limit)
            }
            ValidationError::GasLimitExceedsBlockLimit { limit, block_limit } => {
                write!(f, "gas limit {} exceeds the block gas limit {}", limit, block_limit)
            }
            ValidationError::InsufficientFunds { needed, available } => {
                write!(f, "sender holds {} but the transaction needs {}", available, needed)
            }
            ValidationError::UnderpricedReplacement {
                old_price,
                new_price,
                required,
            } => write!(
                f,
                "replacement priced {} does not clear {} (incumbent pays {})",
                new_price, required, old_price
            ),
            ValidationError::AlreadyKnown { hash } => {
                write!(f, "transaction {} is already known", hash)
            }
        }
    }
}
