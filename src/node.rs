/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Methods to build, run, and initialize the storage of a node.
//!
//! A node is one running instance of the development chain: a request coordinator thread that
//! owns the canonical [`Blockchain`], an optional event bus thread that dispatches
//! [events](crate::events) to registered handlers, and a [`ChainCamera`] for concurrent
//! read-only queries.
//!
//! The key components of this module are:
//! - The builder-pattern interface to construct a [specification of the node](NodeSpec) with:
//!   1. `NodeSpec::builder` to construct a `NodeSpecBuilder`,
//!   2. The setters of the `NodeSpecBuilder`, and
//!   3. The `NodeSpecBuilder::build` method to construct a [NodeSpec],
//! - The function to [start](NodeSpec::start) a [Node] given its specification,
//! - The function to [initialize](Node::initialize) the node's backing store,
//! - [The type](Node) which keeps the node alive.
//!
//! ## Starting a node
//!
//! Here is an example that demonstrates how to build and start running a node using the
//! builder pattern:
//!
//! ```ignore
//! let node =
//!     NodeSpec::builder()
//!     .engine(engine)
//!     .seal(seal)
//!     .kv_store(kv_store)
//!     .configuration(configuration)
//!     .on_mine_block(mine_block_handler)
//!     .build()
//!     .start()?;
//! ```
//!
//! ### Required setters
//!
//! The required setters are for providing the trait implementations required to run a node:
//! - `.engine(...)`
//! - `.seal(...)`
//! - `.kv_store(...)`
//! - `.configuration(...)`
//!
//! ### Optional setters
//!
//! The optional setters are for registering user-defined event handlers for events from
//! [crate::events]:
//! - `.on_submit_transaction(...)`
//! - `.on_transaction_ready(...)`
//! - `.on_add_transaction(...)`
//! - `.on_prune_transactions(...)`
//! - `.on_mine_block(...)`
//! - `.on_snapshot(...)`
//! - `.on_revert(...)`
//! - `.on_pause(...)`
//! - `.on_resume(...)`
//!
//! ## Requests
//!
//! Every state-mutating method on [`Node`] sends a request to the coordinator thread and
//! blocks until it replies. Requests are served strictly FIFO, one at a time, so two calls
//! from different threads never interleave their effects. Read-only historical queries go
//! through the [camera](Node::camera) instead and do not queue behind writes.

use std::sync::mpsc::{self, Sender};
use std::thread::JoinHandle;

use typed_builder::TypedBuilder;

use crate::chain::{
    Blockchain, ChainCamera, ChainConfig, ChainError, GenesisConfig, MineCapacity, MineSummary,
};
use crate::config::Configuration;
use crate::consensus::ConsensusSeal;
use crate::coordinator::{Coordinator, Request};
use crate::engine::ExecutionEngine;
use crate::event_bus::{start_event_bus, EventHandlers, HandlerPtr};
use crate::events::*;
use crate::state::kv_store::KVStore;
use crate::types::basic::{CryptoHash, SnapshotId, Timestamp};
use crate::types::transaction::Transaction;

impl From<&Configuration> for ChainConfig {
    fn from(configuration: &Configuration) -> ChainConfig {
        ChainConfig {
            chain_id: configuration.chain_id,
            block_gas_limit: configuration.block_gas_limit,
            base_fee: configuration.base_fee,
            block_reward: configuration.block_reward,
            coinbase: configuration.coinbase,
            price_bump_percent: configuration.price_bump_percent,
        }
    }
}

/// Stores all necessary parameters and trait implementations required to run the [Node].
#[derive(TypedBuilder)]
#[builder(builder_method(doc = "
    Create a builder for building a [NodeSpec]. On the builder call the following methods to construct a valid [NodeSpec].

    Required:
    - `.engine(...)`
    - `.seal(...)`
    - `.kv_store(...)`
    - `.configuration(...)`

    Optional:
    - `.on_submit_transaction(...)`
    - `.on_transaction_ready(...)`
    - `.on_add_transaction(...)`
    - `.on_prune_transactions(...)`
    - `.on_mine_block(...)`
    - `.on_snapshot(...)`
    - `.on_revert(...)`
    - `.on_pause(...)`
    - `.on_resume(...)`
"))]
pub struct NodeSpec<K: KVStore, E: ExecutionEngine<K>, S: ConsensusSeal> {
    // Required parameters
    #[builder(setter(doc = "Set the virtual-machine executor transactions are run against. The argument must implement the [ExecutionEngine](crate::engine::ExecutionEngine) trait. Required."))]
    engine: E,
    #[builder(setter(doc = "Set the consensus validator that seals and validates headers. The argument must implement the [ConsensusSeal](crate::consensus::ConsensusSeal) trait. Required."))]
    seal: S,
    #[builder(setter(doc = "Set the implementation of the node's Key-Value store. The argument must implement the [KVStore](crate::state::KVStore) trait. Required."))]
    kv_store: K,
    #[builder(setter(doc = "Set the [configuration](Configuration), which contains the necessary parameters to run a node. Required."))]
    configuration: Configuration,
    // Optional parameters
    #[builder(default, setter(transform = |handler: impl Fn(&SubmitTransactionEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<SubmitTransactionEvent>),
    doc = "Register a handler closure to be invoked after a transaction is admitted into the pool. Optional."))]
    on_submit_transaction: Option<HandlerPtr<SubmitTransactionEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&TransactionReadyEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<TransactionReadyEvent>),
    doc = "Register a handler closure to be invoked after a sender's queue gains a gap-free transaction. Optional."))]
    on_transaction_ready: Option<HandlerPtr<TransactionReadyEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&AddTransactionEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<AddTransactionEvent>),
    doc = "Register a handler closure to be invoked after a transaction is executed and recorded in a block under construction. Optional."))]
    on_add_transaction: Option<HandlerPtr<AddTransactionEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&PruneTransactionsEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<PruneTransactionsEvent>),
    doc = "Register a handler closure to be invoked after mined transactions are pruned from the pool. Optional."))]
    on_prune_transactions: Option<HandlerPtr<PruneTransactionsEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&MineBlockEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<MineBlockEvent>),
    doc = "Register a handler closure to be invoked after a block is sealed and linked as the new canonical head. Optional."))]
    on_mine_block: Option<HandlerPtr<MineBlockEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&SnapshotEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<SnapshotEvent>),
    doc = "Register a handler closure to be invoked after a snapshot of the chain is recorded. Optional."))]
    on_snapshot: Option<HandlerPtr<SnapshotEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&RevertEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<RevertEvent>),
    doc = "Register a handler closure to be invoked after the chain is reverted to a snapshot. Optional."))]
    on_revert: Option<HandlerPtr<RevertEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&PauseEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<PauseEvent>),
    doc = "Register a handler closure to be invoked after the chain stops admitting block-mutating operations. Optional."))]
    on_pause: Option<HandlerPtr<PauseEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&ResumeEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<ResumeEvent>),
    doc = "Register a handler closure to be invoked after the chain resumes admitting block-mutating operations. Optional."))]
    on_resume: Option<HandlerPtr<ResumeEvent>>,
}

impl<K: KVStore, E: ExecutionEngine<K>, S: ConsensusSeal> NodeSpec<K, E, S> {
    /// Starts all threads and channels associated with running a node, and returns the
    /// handles to them in a [Node] struct.
    ///
    /// Fails with [`ChainError::NotInitialized`] if [`Node::initialize`] has never run
    /// against the given store.
    pub fn start(self) -> Result<Node<K>, ChainError> {
        let event_handlers = EventHandlers::new(
            self.configuration.log_events,
            self.on_submit_transaction,
            self.on_transaction_ready,
            self.on_add_transaction,
            self.on_prune_transactions,
            self.on_mine_block,
            self.on_snapshot,
            self.on_revert,
            self.on_pause,
            self.on_resume,
        );

        let (event_publisher, event_subscriber) = if !event_handlers.is_empty() {
            Some(mpsc::channel()).unzip()
        } else {
            (None, None)
        };

        let (drain_notifier, drain_receiver) = mpsc::channel();
        let chain = Blockchain::new(
            self.kv_store.clone(),
            ChainConfig::from(&self.configuration),
            event_publisher,
            Some(drain_notifier),
        )?;

        let (requests, requests_receiver) = mpsc::channel();
        let (coordinator_shutdown, coordinator_shutdown_receiver) = mpsc::channel();
        let coordinator = Coordinator::new(
            chain,
            self.engine,
            self.seal,
            self.configuration.submission_mode,
            self.configuration.automine,
            requests_receiver,
            drain_receiver,
            coordinator_shutdown_receiver,
        )
        .start();

        let (event_bus_shutdown, event_bus_shutdown_receiver) = if !event_handlers.is_empty() {
            Some(mpsc::channel()).unzip()
        } else {
            (None, None)
        };

        let event_bus = if !event_handlers.is_empty() {
            Some(start_event_bus(
                event_handlers,
                event_subscriber.unwrap(), // Safety: should be Some(...).
                event_bus_shutdown_receiver.unwrap(), // Safety: should be Some(...).
            ))
        } else {
            None
        };

        Ok(Node {
            camera: ChainCamera::new(self.kv_store),
            requests,
            coordinator: Some(coordinator),
            coordinator_shutdown,
            event_bus,
            event_bus_shutdown,
        })
    }
}

/// A handle to the background threads of a running node. When this value is dropped, all
/// background threads are gracefully shut down.
pub struct Node<K: KVStore> {
    camera: ChainCamera<K>,
    requests: Sender<Request>,
    coordinator: Option<JoinHandle<()>>,
    coordinator_shutdown: Sender<()>,
    event_bus: Option<JoinHandle<()>>,
    event_bus_shutdown: Option<Sender<()>>,
}

impl<K: KVStore> Node<K> {
    /// Initializes the node's backing store with the genesis block and the initial world
    /// state. Must be called once on a fresh store before the first
    /// [`NodeSpec::start`](NodeSpec::start) against it.
    pub fn initialize(kv_store: K, configuration: &Configuration, genesis: &GenesisConfig) {
        Blockchain::initialize(kv_store, &ChainConfig::from(configuration), genesis);
    }

    /// Returns a [Chain Camera](crate::chain::ChainCamera) which can be used to peek into
    /// the committed chain, concurrently with the coordinator.
    pub fn camera(&self) -> &ChainCamera<K> {
        &self.camera
    }

    /* ↓↓↓ Write-class requests, served FIFO by the coordinator ↓↓↓ */

    /// Validate `tx` and insert it into the pool.
    ///
    /// In [eager](crate::config::SubmissionMode::Eager) mode this returns the transaction
    /// hash as soon as the transaction is admitted; in
    /// [strict](crate::config::SubmissionMode::Strict) mode the submitted transaction's
    /// block is mined before the hash is returned.
    pub fn submit_transaction(&self, tx: Transaction) -> Result<CryptoHash, ChainError> {
        self.request(|reply| Request::SubmitTransaction { tx, reply })
    }

    /// Look up a transaction by hash: the pool first, then the durable transaction index.
    pub fn find_transaction(&self, hash: CryptoHash) -> Result<Option<Transaction>, ChainError> {
        self.request(|reply| Request::FindTransaction { hash, reply })
    }

    /// Produce blocks from the pool's ranked executable transactions.
    pub fn mine(
        &self,
        capacity: MineCapacity,
        timestamp: Option<Timestamp>,
        only_one_block: bool,
    ) -> Result<MineSummary, ChainError> {
        self.request(|reply| Request::Mine {
            capacity,
            timestamp,
            only_one_block,
            reply,
        })
    }

    /// Stop admitting block-mutating operations. Pool state is kept.
    pub fn pause(&self) {
        self.request(|reply| Request::Pause { reply })
    }

    /// Admit block-mutating operations again, re-announcing any work that accumulated while
    /// paused.
    pub fn resume(&self) {
        self.request(|reply| Request::Resume { reply })
    }

    /// Record the current chain state under a fresh snapshot id.
    pub fn snapshot(&self) -> SnapshotId {
        self.request(|reply| Request::Snapshot { reply })
    }

    /// Restore the chain to the point recorded under `id`, invalidating `id` and every
    /// snapshot taken after it.
    pub fn revert_to(&self, id: SnapshotId) -> Result<(), ChainError> {
        self.request(|reply| Request::RevertTo { id, reply })
    }

    /// Fix the timestamp of the next mined block.
    pub fn set_next_timestamp(&self, timestamp: Timestamp) {
        self.request(|reply| Request::SetNextTimestamp { timestamp, reply })
    }

    /// Shift the wall clock seen by block production forward by `seconds`, returning the
    /// total accumulated offset.
    pub fn increase_time(&self, seconds: u64) -> u64 {
        self.request(|reply| Request::IncreaseTime { seconds, reply })
    }

    /// Drop every pending transaction from the pool.
    pub fn clear_pool(&self) {
        self.request(|reply| Request::ClearPool { reply })
    }

    fn request<T>(&self, build: impl FnOnce(Sender<T>) -> Request) -> T {
        let (reply, response) = mpsc::channel();
        self.requests
            .send(build(reply))
            .expect("coordinator thread disconnected from main thread");
        response
            .recv()
            .expect("coordinator thread disconnected from main thread")
    }
}

impl<K: KVStore> Drop for Node<K> {
    fn drop(&mut self) {
        // Safety: the order of thread shutdown in this function is important. The event bus
        // receives events from the coordinator, and assumes that it will live longer than
        // the coordinator.

        self.coordinator_shutdown.send(()).unwrap();
        self.coordinator.take().unwrap().join().unwrap();

        self.event_bus_shutdown
            .iter()
            .for_each(|shutdown| shutdown.send(()).unwrap());
        if self.event_bus.is_some() {
            self.event_bus.take().unwrap().join().unwrap();
        }
    }
}
