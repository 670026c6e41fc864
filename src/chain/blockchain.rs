/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The chain coordinator: owns the canonical trie, the transaction pool, and block
//! production, and exposes mine/pause/resume/snapshot/revert.
//!
//! A [`Blockchain`] is mutated by exactly one in-flight operation at a time — the
//! [request coordinator](crate::coordinator) enforces this by running every write-class
//! request to completion on a single thread. Historical reads go through the
//! [`ChainCamera`](super::camera::ChainCamera) instead and never touch this struct.
//!
//! # Mining
//!
//! [`mine`](Blockchain::mine) drives one [`BlockBuilder`] per produced block. Transactions
//! are pulled from the pool in ranked order (effective gas price descending across senders,
//! nonce ascending within one sender). A transaction that does not fit in the remaining
//! block gas is returned to the pool and its sender is skipped for the rest of the block;
//! execution failures are recorded in receipts and do not stop the block. After a block is
//! linked, mined transactions are pruned from the pool and newly gap-free future
//! transactions promoted.
//!
//! # Snapshots
//!
//! [`snapshot`](Blockchain::snapshot) records the head position under a fresh
//! [`SnapshotId`]. [`revert_to`](Blockchain::revert_to) unwinds the number→hash index,
//! receipts, and transaction locations of every block above the snapshot's head, restores
//! the head pointer and the trie root, and invalidates the used snapshot along with every
//! snapshot taken after it. Trie nodes are never deleted, so the restored root resolves
//! exactly as it did when the snapshot was taken.

use std::fmt::{self, Display, Formatter};
use std::sync::mpsc::Sender;
use std::time::{SystemTime, UNIX_EPOCH};

use borsh::BorshDeserialize;

use crate::builder::{BlockBuilder, BuildContext, BuilderError, BuiltBlock};
use crate::chain::store::{ChainGet, ChainGetError, ChainWriteBatch, TransactionLocation};
use crate::consensus::{ConsensusSeal, SealError};
use crate::engine::ExecutionEngine;
use crate::events::{
    Event, MineBlockEvent, PauseEvent, PruneTransactionsEvent, ResumeEvent, RevertEvent,
    SnapshotEvent, SubmitTransactionEvent,
};
use crate::pool::{Admission, PoolConfig, TransactionPool, ValidationError};
use crate::state::checkpoint::{CheckpointError, CheckpointStore};
use crate::state::kv_store::KVStore;
use crate::state::trie::{StateTrie, TrieError};
use crate::state::world::{account_key, WorldState};
use crate::types::account::Account;
use crate::types::basic::{
    Address, BlockNumber, ChainId, CryptoHash, Gas, SnapshotId, Timestamp, Wei,
};
use crate::types::block::{Block, BlockHeader};
use crate::types::transaction::Transaction;

/// Static parameters of the chain.
#[derive(Clone)]
pub struct ChainConfig {
    pub chain_id: ChainId,
    pub block_gas_limit: Gas,
    pub base_fee: Wei,
    pub block_reward: Wei,
    pub coinbase: Address,
    pub price_bump_percent: u8,
}

/// Parameters of the genesis block and the initial world state.
pub struct GenesisConfig {
    pub timestamp: Timestamp,
    pub extra_data: Vec<u8>,
    /// Initial balances, credited before the genesis block is sealed.
    pub alloc: Vec<(Address, Wei)>,
}

/// How many transactions [`mine`](Blockchain::mine) may put in each produced block.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MineCapacity {
    /// Include ranked transactions until the block is full or the pool is exhausted.
    FillBlock,
    /// Force a block with zero transactions.
    Empty,
    /// Include exactly one transaction.
    Single,
}

/// What one [`mine`](Blockchain::mine) call produced.
pub struct MineSummary {
    pub blocks: Vec<CryptoHash>,
    pub transactions: Vec<CryptoHash>,
    pub head_number: BlockNumber,
}

struct SnapshotRecord {
    id: SnapshotId,
    head_hash: CryptoHash,
    head_number: BlockNumber,
}

pub struct Blockchain<K: KVStore> {
    kv: K,
    trie: StateTrie<K>,
    pool: TransactionPool,
    config: ChainConfig,
    head: Block,
    snapshots: Vec<SnapshotRecord>,
    next_snapshot_id: u64,
    paused: bool,
    next_timestamp: Option<Timestamp>,
    time_offset: u64,
    event_publisher: Option<Sender<Event>>,
}

impl<K: KVStore> Blockchain<K> {
    /// Write the genesis block and the initial world state into `kv`. Must be called once
    /// before the first [`Blockchain::new`] on a fresh store.
    pub fn initialize(mut kv: K, config: &ChainConfig, genesis: &GenesisConfig) {
        let mut trie = StateTrie::new(CheckpointStore::new(kv.clone()), CryptoHash::zero());

        // One checkpoint frame so that the whole initial state flushes as a single batch.
        trie.checkpoint();
        {
            let mut world = WorldState::new(&mut trie);
            for (address, balance) in &genesis.alloc {
                let mut account = Account::empty();
                account.balance = *balance;
                world
                    .set_account(address, &account)
                    .expect("the empty trie cannot fail to insert");
            }
        }
        trie.commit()
            .expect("the frame opened above is still open");

        let header = BlockHeader {
            parent_hash: CryptoHash::zero(),
            number: BlockNumber::new(0),
            state_root: trie.root(),
            transactions_root: CryptoHash::zero(),
            receipts_root: CryptoHash::zero(),
            logs_bloom: Default::default(),
            gas_used: Gas::new(0),
            gas_limit: config.block_gas_limit,
            timestamp: genesis.timestamp,
            base_fee: config.base_fee,
            coinbase: config.coinbase,
            extra_data: genesis.extra_data.clone(),
            seal: None,
        };
        let genesis_block = Block::new(header, Vec::new());

        let mut wb = ChainWriteBatch::<K::WriteBatch>::new();
        wb.set_block(&genesis_block);
        wb.set_block_at_number(BlockNumber::new(0), &genesis_block.hash);
        wb.set_head_block(&genesis_block.hash);
        kv.write(wb.into_inner());
    }

    /// Open the chain stored in `kv`. Fails with [`ChainError::NotInitialized`] if
    /// [`initialize`](Self::initialize) has never run against this store.
    pub fn new(
        kv: K,
        config: ChainConfig,
        event_publisher: Option<Sender<Event>>,
        drain_notifier: Option<Sender<()>>,
    ) -> Result<Blockchain<K>, ChainError> {
        let head_hash = kv.head_block()?.ok_or(ChainError::NotInitialized)?;
        let head = kv
            .block(&head_hash)?
            .ok_or(ChainError::NotInitialized)?;

        let trie = StateTrie::new(CheckpointStore::new(kv.clone()), head.header.state_root);
        let pool = TransactionPool::new(
            PoolConfig {
                block_gas_limit: config.block_gas_limit,
                base_fee: config.base_fee,
                price_bump_percent: config.price_bump_percent,
            },
            event_publisher.clone(),
            drain_notifier,
        );

        Ok(Blockchain {
            kv,
            trie,
            pool,
            config,
            head,
            snapshots: Vec::new(),
            next_snapshot_id: 1,
            paused: false,
            next_timestamp: None,
            time_offset: 0,
            event_publisher,
        })
    }

    pub fn head(&self) -> &Block {
        &self.head
    }

    pub fn pool(&self) -> &TransactionPool {
        &self.pool
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    /* ↓↓↓ Submission ↓↓↓ */

    /// Validate `tx` against the sender's confirmed account and insert it into the pool.
    /// Admission is allowed while paused; only block production is gated.
    pub fn submit_transaction(
        &mut self,
        tx: Transaction,
    ) -> Result<(CryptoHash, Admission), ChainError> {
        let hash = tx.hash();
        let account = self.confirmed_account(&tx.sender())?;
        let admission = self
            .pool
            .prepare(tx, &account)
            .map_err(ChainError::ValidationError)?;

        Event::publish(
            &self.event_publisher,
            Event::SubmitTransaction(SubmitTransactionEvent {
                timestamp: SystemTime::now(),
                transaction: hash,
                executable: admission == Admission::Executable,
            }),
        );
        Ok((hash, admission))
    }

    /// Look up a transaction: first the pool (pending and in-flight), then the durable
    /// transaction index.
    pub fn find_transaction(&self, hash: &CryptoHash) -> Result<Option<Transaction>, ChainError> {
        if let Some(tx) = self.pool.find(hash) {
            return Ok(Some(tx));
        }
        if let Some(location) = self.kv.transaction_location(hash)? {
            if let Some(block) = self.kv.block(&location.block)? {
                return Ok(block.transactions.get(location.index as usize).cloned());
            }
        }
        Ok(None)
    }

    /* ↓↓↓ Mining ↓↓↓ */

    /// Produce blocks from the pool's ranked executable transactions.
    ///
    /// With [`MineCapacity::FillBlock`] and `only_one_block == false`, blocks are produced
    /// until the pool has no executable transactions left; otherwise exactly one block is
    /// produced. [`MineCapacity::Single`] requires at least one executable transaction and
    /// fails with [`ChainError::NothingToMine`] otherwise. Any error leaves the canonical
    /// state exactly as it was before the failing block attempt.
    pub fn mine<E: ExecutionEngine<K>, S: ConsensusSeal>(
        &mut self,
        engine: &mut E,
        seal: &S,
        capacity: MineCapacity,
        timestamp: Option<Timestamp>,
        only_one_block: bool,
    ) -> Result<MineSummary, ChainError> {
        if self.paused {
            return Err(ChainError::Paused);
        }

        let mut summary = MineSummary {
            blocks: Vec::new(),
            transactions: Vec::new(),
            head_number: self.head.header.number,
        };

        loop {
            let built = self.produce_block(engine, seal, capacity, timestamp)?;
            summary.blocks.push(built.block.hash);
            summary
                .transactions
                .extend(built.block.transactions.iter().map(|tx| tx.hash()));
            summary.head_number = built.block.header.number;

            let keep_going = capacity == MineCapacity::FillBlock
                && !only_one_block
                && self.pool.has_executable();
            if !keep_going {
                break;
            }
        }

        Ok(summary)
    }

    fn produce_block<E: ExecutionEngine<K>, S: ConsensusSeal>(
        &mut self,
        engine: &mut E,
        seal: &S,
        capacity: MineCapacity,
        timestamp: Option<Timestamp>,
    ) -> Result<BuiltBlock, ChainError> {
        if capacity == MineCapacity::Single && !self.pool.has_executable() {
            return Err(ChainError::NothingToMine);
        }

        let parent = self.head.header.clone();
        let block_timestamp = self.resolve_timestamp(timestamp, &parent);
        let context = BuildContext {
            coinbase: self.config.coinbase,
            base_fee: self.config.base_fee,
            block_gas_limit: self.config.block_gas_limit,
            block_reward: self.config.block_reward,
            timestamp: block_timestamp,
            extra_data: Vec::new(),
        };

        let mut builder = BlockBuilder::new(
            &mut self.trie,
            parent.clone(),
            context,
            self.event_publisher.clone(),
        );

        if capacity != MineCapacity::Empty {
            self.pool.begin_selection();
            let selection_result = Self::fill_from_pool(
                &mut builder,
                &mut self.pool,
                engine,
                capacity,
            );
            self.pool.end_selection();

            if let Err(err) = selection_result {
                // The builder's outer frame is discarded and every checked-out
                // transaction returns to the pool; canonical state is untouched.
                let _ = builder.revert();
                self.pool.unlock_all();
                return Err(err);
            }
        }

        let built = match builder.build(seal) {
            Ok(built) => built,
            Err(err) => {
                let _ = builder.revert();
                self.pool.unlock_all();
                return Err(ChainError::BuilderError(err));
            }
        };
        drop(builder);

        seal.validate(&built.block.header, &parent)
            .map_err(ChainError::SealError)?;
        self.link_block(&built)?;

        self.pool.prune_mined(&built.block.transactions);
        Event::publish(
            &self.event_publisher,
            Event::PruneTransactions(PruneTransactionsEvent {
                timestamp: SystemTime::now(),
                pruned: built.block.transactions.len(),
            }),
        );
        Event::publish(
            &self.event_publisher,
            Event::MineBlock(MineBlockEvent {
                timestamp: SystemTime::now(),
                block: built.block.hash,
                number: built.block.header.number,
                transaction_count: built.block.transactions.len(),
                block_timestamp,
            }),
        );

        Ok(built)
    }

    /// Pull ranked transactions out of `pool` into `builder` until the capacity rule says
    /// stop.
    fn fill_from_pool<E: ExecutionEngine<K>>(
        builder: &mut BlockBuilder<K>,
        pool: &mut TransactionPool,
        engine: &mut E,
        capacity: MineCapacity,
    ) -> Result<(), ChainError> {
        while let Some(tx) = pool.next_best() {
            match builder.add_transaction(engine, &tx) {
                Ok(_) => {
                    if capacity == MineCapacity::Single {
                        break;
                    }
                }
                Err(BuilderError::GasLimitExceedsRemaining { .. }) => {
                    // This transaction waits for a later block. Its later-nonce siblings
                    // cannot jump the queue, so the whole sender sits this block out.
                    pool.unlock(&tx);
                    pool.skip_sender(&tx.sender());
                }
                Err(err) => {
                    pool.unlock(&tx);
                    return Err(ChainError::BuilderError(err));
                }
            }
        }
        Ok(())
    }

    fn link_block(&mut self, built: &BuiltBlock) -> Result<(), ChainError> {
        let mut wb = ChainWriteBatch::<K::WriteBatch>::new();
        wb.set_block(&built.block);
        wb.set_block_at_number(built.block.header.number, &built.block.hash);
        wb.set_head_block(&built.block.hash);
        for (index, receipt) in built.receipts.iter().enumerate() {
            wb.set_receipt(receipt);
            wb.set_transaction_location(
                &receipt.transaction_hash,
                &TransactionLocation {
                    block: built.block.hash,
                    index: index as u32,
                },
            );
        }
        self.kv.write(wb.into_inner());
        self.head = built.block.clone();
        Ok(())
    }

    /* ↓↓↓ Time control ↓↓↓ */

    /// Fix the timestamp of the next mined block. Consumed by the next block production.
    pub fn set_next_timestamp(&mut self, timestamp: Timestamp) {
        self.next_timestamp = Some(timestamp);
    }

    /// Shift the wall clock seen by block production forward by `seconds`.
    pub fn increase_time(&mut self, seconds: u64) -> u64 {
        self.time_offset = self.time_offset.saturating_add(seconds);
        self.time_offset
    }

    fn resolve_timestamp(&mut self, explicit: Option<Timestamp>, parent: &BlockHeader) -> Timestamp {
        let time_offset = self.time_offset;
        let wall_clock = move || {
            let now = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .expect("the system clock is set before the Unix Epoch")
                .as_secs();
            Timestamp::new(now + time_offset)
        };
        let chosen = explicit
            .or_else(|| self.next_timestamp.take())
            .unwrap_or_else(wall_clock);

        // Timestamps are strictly increasing along the chain.
        let floor = parent.timestamp + 1;
        if chosen < floor {
            floor
        } else {
            chosen
        }
    }

    /* ↓↓↓ Pause / Resume ↓↓↓ */

    /// Stop admitting block-mutating operations. Pool state is kept; an in-flight mine is
    /// unaffected (the request coordinator never interleaves operations anyway).
    pub fn pause(&mut self) {
        self.paused = true;
        Event::publish(
            &self.event_publisher,
            Event::Pause(PauseEvent {
                timestamp: SystemTime::now(),
            }),
        );
    }

    /// Admit block-mutating operations again, and re-announce pending work that accumulated
    /// while paused.
    pub fn resume(&mut self) {
        self.paused = false;
        let work_waiting = self.pool.has_executable();
        if work_waiting {
            self.pool.renotify();
        }
        Event::publish(
            &self.event_publisher,
            Event::Resume(ResumeEvent {
                timestamp: SystemTime::now(),
                work_waiting,
            }),
        );
    }

    /* ↓↓↓ Snapshot / Revert ↓↓↓ */

    /// Record the current head under a fresh snapshot id.
    pub fn snapshot(&mut self) -> SnapshotId {
        let id = SnapshotId::new(self.next_snapshot_id);
        self.next_snapshot_id += 1;
        self.snapshots.push(SnapshotRecord {
            id,
            head_hash: self.head.hash,
            head_number: self.head.header.number,
        });
        Event::publish(
            &self.event_publisher,
            Event::Snapshot(SnapshotEvent {
                timestamp: SystemTime::now(),
                id,
                head: self.head.header.number,
            }),
        );
        id
    }

    /// Restore the chain to the point recorded under `id`, unwinding every block above it
    /// and invalidating `id` and every snapshot taken after it.
    pub fn revert_to(&mut self, id: SnapshotId) -> Result<(), ChainError> {
        let position = self
            .snapshots
            .iter()
            .position(|record| record.id == id)
            .ok_or(ChainError::UnknownSnapshot { id })?;
        let record = self.snapshots[position].head_hash;
        let head_number = self.snapshots[position].head_number;

        // Unwind the ancillary indices of every block above the snapshot head.
        let mut wb = ChainWriteBatch::<K::WriteBatch>::new();
        let mut number = self.head.header.number;
        while number > head_number {
            if let Some(hash) = self.kv.block_at_number(number)? {
                if let Some(block) = self.kv.block(&hash)? {
                    for tx in &block.transactions {
                        let tx_hash = tx.hash();
                        wb.delete_receipt(&tx_hash);
                        wb.delete_transaction_location(&tx_hash);
                    }
                }
                wb.delete_block(&hash);
            }
            wb.delete_block_at_number(number);
            number = BlockNumber::new(number.int() - 1);
        }
        wb.set_head_block(&record);
        self.kv.write(wb.into_inner());

        let head = self
            .kv
            .block(&record)?
            .ok_or(ChainError::NotInitialized)?;
        self.trie = StateTrie::new(CheckpointStore::new(self.kv.clone()), head.header.state_root);
        self.head = head;

        // Monotonic stack discipline: the used snapshot and everything above it are gone.
        self.snapshots.truncate(position);

        Event::publish(
            &self.event_publisher,
            Event::Revert(RevertEvent {
                timestamp: SystemTime::now(),
                id,
                head: head_number,
            }),
        );
        Ok(())
    }

    /* ↓↓↓ Pool maintenance ↓↓↓ */

    /// Drop every pending transaction from the pool.
    pub fn clear_pool(&mut self) {
        self.pool.clear();
    }

    fn confirmed_account(&self, address: &Address) -> Result<Account, ChainError> {
        match self.trie.get(&account_key(address))? {
            Some(bytes) => {
                Account::deserialize(&mut &*bytes).map_err(|err| ChainError::CorruptAccount {
                    address: *address,
                    source: err,
                })
            }
            None => Ok(Account::empty()),
        }
    }
}

/// Top-level error for chain operations. Any error reaching a [`mine`](Blockchain::mine)
/// caller implies no block was produced by the failing attempt.
#[derive(Debug)]
pub enum ChainError {
    /// The backing store holds no chain; [`Blockchain::initialize`] has never run.
    NotInitialized,

    /// The chain is paused; block-mutating operations are not admitted.
    Paused,

    /// [`MineCapacity::Single`] was requested with no executable transaction available.
    NothingToMine,

    /// The snapshot id was never issued, or was invalidated by an earlier revert.
    UnknownSnapshot { id: SnapshotId },

    /// A stored account's bytes did not decode as an [`Account`].
    CorruptAccount {
        address: Address,
        source: std::io::Error,
    },

    ValidationError(ValidationError),
    BuilderError(BuilderError),
    SealError(SealError),
    ChainGetError(ChainGetError),
    TrieError(TrieError),
    CheckpointError(CheckpointError),
}

impl From<ChainGetError> for ChainError {
    fn from(value: ChainGetError) -> Self {
        ChainError::ChainGetError(value)
    }
}

impl From<TrieError> for ChainError {
    fn from(value: TrieError) -> Self {
        ChainError::TrieError(value)
    }
}

impl From<CheckpointError> for ChainError {
    fn from(value: CheckpointError) -> Self {
        ChainError::CheckpointError(value)
    }
}

impl Display for ChainError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            ChainError::NotInitialized => write!(f, "the backing store holds no chain"),
            ChainError::Paused => write!(f, "the chain is paused"),
            ChainError::NothingToMine => {
                write!(f, "no executable transaction available for a single-transaction block")
            }
            ChainError::UnknownSnapshot { id } => {
                write!(f, "snapshot {} does not exist or was invalidated", id)
            }
            ChainError::CorruptAccount { address, source } => {
                write!(f, "failed to deserialize account {}: {}", address, source)
            }
            ChainError::ValidationError(err) => write!(f, "{}", err),
            ChainError::BuilderError(err) => write!(f, "{}", err),
            ChainError::SealError(err) => write!(f, "{}", err),
            ChainError::ChainGetError(err) => write!(f, "{}", err),
            ChainError::TrieError(err) => write!(f, "{}", err),
            ChainError::CheckpointError(err) => write!(f, "{}", err),
        }
    }
}
