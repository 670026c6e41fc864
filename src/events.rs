/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Definitions of the chain's events for event handling and logging.
//! Note: an event for a given action indicates that the action has been completed.

use std::sync::mpsc::Sender;
use std::time::SystemTime;

use crate::types::basic::{BlockNumber, CryptoHash, SnapshotId, Timestamp};
use crate::types::receipt::ExecStatus;

pub enum Event {
    // Events in the life of a transaction.
    SubmitTransaction(SubmitTransactionEvent),
    TransactionReady(TransactionReadyEvent),
    AddTransaction(AddTransactionEvent),
    PruneTransactions(PruneTransactionsEvent),
    // Events that change the canonical chain.
    MineBlock(MineBlockEvent),
    Snapshot(SnapshotEvent),
    Revert(RevertEvent),
    // Scheduling events.
    Pause(PauseEvent),
    Resume(ResumeEvent),
}

impl Event {
    pub(crate) fn publish(event_publisher: &Option<Sender<Event>>, event: Event) {
        if let Some(event_publisher) = event_publisher {
            event_publisher.send(event).unwrap()
        }
    }
}

/// A transaction passed validation and was inserted into the pool.
pub struct SubmitTransactionEvent {
    pub timestamp: SystemTime,
    pub transaction: CryptoHash,
    pub executable: bool,
}

/// A sender's queue gained a gap-free transaction: there is work for the miner.
pub struct TransactionReadyEvent {
    pub timestamp: SystemTime,
    pub transaction: CryptoHash,
}

/// A transaction was executed and recorded in the block under construction.
pub struct AddTransactionEvent {
    pub timestamp: SystemTime,
    pub transaction: CryptoHash,
    pub status: ExecStatus,
}

/// Mined transactions were dropped from the pool and newly gap-free ones promoted.
pub struct PruneTransactionsEvent {
    pub timestamp: SystemTime,
    pub pruned: usize,
}

/// A block was sealed and linked as the new canonical head.
pub struct MineBlockEvent {
    pub timestamp: SystemTime,
    pub block: CryptoHash,
    pub number: BlockNumber,
    pub transaction_count: usize,
    pub block_timestamp: Timestamp,
}

/// A snapshot of the chain was recorded.
pub struct SnapshotEvent {
    pub timestamp: SystemTime,
    pub id: SnapshotId,
    pub head: BlockNumber,
}

/// The chain was reverted to a snapshot.
pub struct RevertEvent {
    pub timestamp: SystemTime,
    pub id: SnapshotId,
    pub head: BlockNumber,
}

/// The chain stopped admitting block-mutating operations.
pub struct PauseEvent {
    pub timestamp: SystemTime,
}

/// The chain resumed admitting block-mutating operations.
pub struct ResumeEvent {
    pub timestamp: SystemTime,
    pub work_waiting: bool,
}
