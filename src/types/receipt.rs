/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The durable record of a transaction's execution outcome.

use borsh::{BorshDeserialize, BorshSerialize};

use crate::types::basic::{Address, Bloom, CryptoHash, Gas};

/// A log entry emitted by the executor while running a transaction.
#[derive(Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct Log {
    pub address: Address,
    pub topics: Vec<CryptoHash>,
    pub data: Vec<u8>,
}

/// Whether a transaction's execution succeeded. A [`Failure`](ExecStatus::Failure) receipt
/// still sits inside a valid block; the failure is the transaction's, not the block's.
#[derive(Clone, Copy, PartialEq, Eq, Debug, BorshSerialize, BorshDeserialize)]
pub enum ExecStatus {
    Success,
    Failure,
}

/// The receipt of one executed transaction.
#[derive(Clone, BorshSerialize, BorshDeserialize)]
pub struct Receipt {
    pub transaction_hash: CryptoHash,
    pub status: ExecStatus,
    pub gas_used: Gas,
    /// Gas used by this and every earlier transaction in the same block.
    pub cumulative_gas_used: Gas,
    pub logs: Vec<Log>,
    pub bloom: Bloom,
}

impl Receipt {
    /// Build the bloom covering the addresses and topics of `logs`.
    pub fn bloom_for_logs(logs: &[Log]) -> Bloom {
        let mut bloom = Bloom::empty();
        for log in logs {
            bloom.accrue(&log.address.bytes());
            for topic in &log.topics {
                bloom.accrue(&topic.bytes());
            }
        }
        bloom
    }
}
