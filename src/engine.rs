/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The [`ExecutionEngine`] trait, which specifies the required interface for the
//! virtual-machine executor provided by the user.
//!
//! The chain treats the executor as opaque: it hands over one [`Message`] and a mutable
//! [`WorldState`] view, and receives back the gas used, the return value, the logs emitted,
//! and the accounts self-destructed. The protocol-level bookkeeping around a transaction —
//! nonce increment, upfront gas charge, refund, fee payment — is performed by the
//! [block builder](crate::builder), not by the engine.
//!
//! An engine that supports nested calls or creates should bracket each inner frame with
//! [`WorldState::checkpoint`] and commit or revert it as the inner frame succeeds or fails.
//! In particular, the engine must revert the state effects of a message that ends in an
//! [`ExecutionException`] before returning: an exceptional outcome is *reported*, not
//! persisted. The builder records the exception in the receipt and still charges gas.

use std::fmt::{self, Display, Formatter};

use crate::state::kv_store::KVStore;
use crate::state::world::WorldState;
use crate::types::basic::{Address, Gas, Wei};
use crate::types::receipt::Log;

/// One call or create message, as handed to the engine.
pub struct Message {
    pub caller: Address,
    /// The callee, or `None` for a create.
    pub to: Option<Address>,
    pub value: Wei,
    pub payload: Vec<u8>,
    /// Gas available for execution: the transaction's limit minus its intrinsic gas.
    pub gas: Gas,
}

/// Why execution of a message failed. Recorded in the receipt as a failed status; never
/// aborts block building, and gas is still consumed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExecutionException {
    OutOfGas,
    Reverted,
    InvalidOperation,
}

impl Display for ExecutionException {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionException::OutOfGas => write!(f, "out of gas"),
            ExecutionException::Reverted => write!(f, "execution reverted"),
            ExecutionException::InvalidOperation => write!(f, "invalid operation"),
        }
    }
}

/// What came out of executing one message.
pub struct ExecutionOutcome {
    /// Gas consumed by execution, excluding the transaction's intrinsic gas.
    pub gas_used: Gas,
    pub return_value: Vec<u8>,
    pub logs: Vec<Log>,
    pub selfdestructs: Vec<Address>,
    /// `Some` if execution failed. The engine must have already reverted the message's
    /// state effects.
    pub exception: Option<ExecutionException>,
}

pub trait ExecutionEngine<K: KVStore>: Send + 'static {
    /// Execute `message` against `state`.
    ///
    /// An `Err` signals an internal engine failure — not a failing transaction — and aborts
    /// the current block attempt.
    fn execute_message(
        &mut self,
        message: Message,
        state: &mut WorldState<K>,
    ) -> Result<ExecutionOutcome, EngineError>;
}

/// An internal failure inside the execution engine. Unlike an [`ExecutionException`], this
/// aborts the block attempt that triggered it.
#[derive(Debug)]
pub enum EngineError {
    Internal { detail: String },
}

impl Display for EngineError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            EngineError::Internal { detail } => write!(f, "internal engine error: {}", detail),
        }
    }
}
