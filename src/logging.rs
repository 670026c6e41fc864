/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Functions that log out events.
//!
//! The logs defined in this module are printed if the user enabled them via the node's
//! [config](crate::config::Configuration).
//!
//! Logging goes through the [log](https://docs.rs/log/latest/log/) crate. To get these
//! messages printed onto a terminal or to a file, set up a
//! [logging implementation](https://docs.rs/log/latest/log/#available-logging-implementations).
//!
//! ## Log message format
//!
//! Log messages are CSVs (Comma Separated Values) with at least two values. The first two
//! values are always:
//! 1. The name of the [event](crate::events) in PascalCase (defined in this module as
//!    constants).
//! 2. The time the event was emitted (as number of seconds since the Unix Epoch).
//!
//! The rest of the values differ depending on the kind of event. For example, the following
//! snippet is how a [MineBlock](crate::events::MineBlockEvent) is printed:
//!
//! ```text
//! MineBlock, 1701329264, Id5u7f6, 42, 3, 1701329263
//! ```
//!
//! In the snippet:
//! - The third value is the first seven characters of the Base64 encoding of the block hash.
//! - The fourth value is the block number.
//! - The fifth value is the number of transactions included.
//! - The sixth value is the block's timestamp.

use crate::events::*;
use base64::{engine::general_purpose::STANDARD_NO_PAD, Engine as _};
use log;
use std::time::SystemTime;

// Names of each event in PascalCase for printing:
pub const SUBMIT_TRANSACTION: &str = "SubmitTransaction";
pub const TRANSACTION_READY: &str = "TransactionReady";
pub const ADD_TRANSACTION: &str = "AddTransaction";
pub const PRUNE_TRANSACTIONS: &str = "PruneTransactions";

pub const MINE_BLOCK: &str = "MineBlock";
pub const SNAPSHOT: &str = "Snapshot";
pub const REVERT: &str = "Revert";

pub const PAUSE: &str = "Pause";
pub const RESUME: &str = "Resume";

/// Implemented by event types. Used to get a closure that logs the event.
pub(crate) trait Logger {
    /// Returns a pointer to the default logging handler for a given event type.
    fn get_logger() -> Box<dyn Fn(&Self) + Send>;
}

impl Logger for SubmitTransactionEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |submit_transaction_event: &SubmitTransactionEvent| {
            log::info!(
                "{}, {}, {}, {}",
                SUBMIT_TRANSACTION,
                secs_since_unix_epoch(submit_transaction_event.timestamp),
                first_seven_base64_chars(&submit_transaction_event.transaction.bytes()),
                submit_transaction_event.executable
            )
        };
        Box::new(logger)
    }
}

impl Logger for TransactionReadyEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |transaction_ready_event: &TransactionReadyEvent| {
            log::info!(
                "{}, {}, {}",
                TRANSACTION_READY,
                secs_since_unix_epoch(transaction_ready_event.timestamp),
                first_seven_base64_chars(&transaction_ready_event.transaction.bytes())
            )
        };
        Box::new(logger)
    }
}

impl Logger for AddTransactionEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |add_transaction_event: &AddTransactionEvent| {
            log::info!(
                "{}, {}, {}, {:?}",
                ADD_TRANSACTION,
                secs_since_unix_epoch(add_transaction_event.timestamp),
                first_seven_base64_chars(&add_transaction_event.transaction.bytes()),
                add_transaction_event.status
            )
        };
        Box::new(logger)
    }
}

impl Logger for PruneTransactionsEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |prune_transactions_event: &PruneTransactionsEvent| {
            log::info!(
                "{}, {}, {}",
                PRUNE_TRANSACTIONS,
                secs_since_unix_epoch(prune_transactions_event.timestamp),
                prune_transactions_event.pruned
            )
        };
        Box::new(logger)
    }
}

impl Logger for MineBlockEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |mine_block_event: &MineBlockEvent| {
            log::info!(
                "{}, {}, {}, {}, {}, {}",
                MINE_BLOCK,
                secs_since_unix_epoch(mine_block_event.timestamp),
                first_seven_base64_chars(&mine_block_event.block.bytes()),
                mine_block_event.number,
                mine_block_event.transaction_count,
                mine_block_event.block_timestamp
            )
        };
        Box::new(logger)
    }
}

impl Logger for SnapshotEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |snapshot_event: &SnapshotEvent| {
            log::info!(
                "{}, {}, {}, {}",
                SNAPSHOT,
                secs_since_unix_epoch(snapshot_event.timestamp),
                snapshot_event.id,
                snapshot_event.head
            )
        };
        Box::new(logger)
    }
}

impl Logger for RevertEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |revert_event: &RevertEvent| {
            log::info!(
                "{}, {}, {}, {}",
                REVERT,
                secs_since_unix_epoch(revert_event.timestamp),
                revert_event.id,
                revert_event.head
            )
        };
        Box::new(logger)
    }
}

impl Logger for PauseEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |pause_event: &PauseEvent| {
            log::info!(
                "{}, {}",
                PAUSE,
                secs_since_unix_epoch(pause_event.timestamp)
            )
        };
        Box::new(logger)
    }
}

impl Logger for ResumeEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |resume_event: &ResumeEvent| {
            log::info!(
                "{}, {}, {}",
                RESUME,
                secs_since_unix_epoch(resume_event.timestamp),
                resume_event.work_waiting
            )
        };
        Box::new(logger)
    }
}

// Get a more readable representation of a bytesequence by base64-encoding it and taking the
// first 7 characters.
fn first_seven_base64_chars(bytes: &[u8]) -> String {
    let encoded = STANDARD_NO_PAD.encode(bytes);
    if encoded.len() > 7 {
        encoded[0..7].to_string()
    } else {
        encoded
    }
}

fn secs_since_unix_epoch(timestamp: SystemTime) -> u64 {
    timestamp
        .duration_since(SystemTime::UNIX_EPOCH)
        .expect("Event occured before the Unix Epoch.")
        .as_secs()
}
