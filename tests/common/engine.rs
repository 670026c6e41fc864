//! [`TransferEngine`], a small deterministic implementation of [`ExecutionEngine`] used in
//! all of the integration tests, and [`InstantSeal`], a development implementation of
//! [`ConsensusSeal`] that seals headers immediately with a single authority keypair.

use borsh::{BorshDeserialize, BorshSerialize};
use devnet_rs::consensus::{ConsensusSeal, SealError};
use devnet_rs::engine::{
    EngineError, ExecutionEngine, ExecutionException, ExecutionOutcome, Message,
};
use devnet_rs::state::WorldState;
use devnet_rs::types::basic::{CryptoHash, Gas, SignatureBytes};
use devnet_rs::types::block::BlockHeader;
use devnet_rs::types::crypto_primitives::Keypair;
use devnet_rs::types::receipt::Log;

use crate::common::mem_db::MemDB;

/// Gas the engine charges for a storage write.
const STORE_GAS: u64 = 100;
/// Gas the engine charges for emitting a log.
const LOG_GAS: u64 = 50;

/// Directives the transfer engine executes, Borsh-encoded in a transaction's payload.
///
/// A transaction with an empty payload is a plain value transfer. A payload that does not
/// decode as a `TestOp` fails with an
/// [`InvalidOperation`](ExecutionException::InvalidOperation) exception.
#[derive(Clone, BorshSerialize, BorshDeserialize)]
pub(crate) enum TestOp {
    /// Move the value and write `value` into the caller's storage at `slot`.
    Store { slot: CryptoHash, value: Vec<u8> },

    /// Move the value and emit one log with the given topic and data.
    EmitLog { topic: CryptoHash, data: Vec<u8> },

    /// Fail with a revert exception after consuming half the available gas. No state is
    /// touched.
    Revert,

    /// Fail with an out-of-gas exception, consuming all available gas. No state is touched.
    ExhaustGas,

    /// Fail the engine itself: an internal error, not an execution exception.
    Break,
}

/// A deterministic [`ExecutionEngine`] for integration tests: it moves transaction values
/// between accounts and executes the [`TestOp`] directives found in payloads.
pub(crate) struct TransferEngine;

impl TransferEngine {
    pub(crate) fn new() -> TransferEngine {
        TransferEngine
    }

    fn success(gas_used: u64, logs: Vec<Log>) -> ExecutionOutcome {
        ExecutionOutcome {
            gas_used: Gas::new(gas_used),
            return_value: Vec::new(),
            logs,
            selfdestructs: Vec::new(),
            exception: None,
        }
    }

    fn exception(gas_used: Gas, exception: ExecutionException) -> ExecutionOutcome {
        ExecutionOutcome {
            gas_used,
            return_value: Vec::new(),
            logs: Vec::new(),
            selfdestructs: Vec::new(),
            exception: Some(exception),
        }
    }
}

impl ExecutionEngine<MemDB> for TransferEngine {
    fn execute_message(
        &mut self,
        message: Message,
        state: &mut WorldState<MemDB>,
    ) -> Result<ExecutionOutcome, EngineError> {
        let transfer_value = |state: &mut WorldState<MemDB>| -> Result<(), EngineError> {
            if let Some(to) = message.to {
                state
                    .transfer(&message.caller, &to, message.value)
                    .map_err(|err| EngineError::Internal {
                        detail: err.to_string(),
                    })?;
            }
            Ok(())
        };

        if message.payload.is_empty() {
            transfer_value(state)?;
            return Ok(Self::success(0, Vec::new()));
        }

        let op = match TestOp::deserialize(&mut &*message.payload) {
            Ok(op) => op,
            Err(_) => {
                return Ok(Self::exception(
                    message.gas,
                    ExecutionException::InvalidOperation,
                ))
            }
        };

        match op {
            TestOp::Store { slot, value } => {
                transfer_value(state)?;
                state
                    .set_storage(&message.caller, &slot, value)
                    .map_err(|err| EngineError::Internal {
                        detail: err.to_string(),
                    })?;
                Ok(Self::success(STORE_GAS, Vec::new()))
            }
            TestOp::EmitLog { topic, data } => {
                transfer_value(state)?;
                let log = Log {
                    address: message.to.unwrap_or(message.caller),
                    topics: vec![topic],
                    data,
                };
                Ok(Self::success(LOG_GAS, vec![log]))
            }
            TestOp::Revert => Ok(Self::exception(
                Gas::new(message.gas.int() / 2),
                ExecutionException::Reverted,
            )),
            TestOp::ExhaustGas => Ok(Self::exception(message.gas, ExecutionException::OutOfGas)),
            TestOp::Break => Err(EngineError::Internal {
                detail: "broken by test directive".to_string(),
            }),
        }
    }
}

/// A development [`ConsensusSeal`]: headers are sealed immediately with the authority's
/// signature, and validation only checks parent linkage and timestamp monotonicity.
pub(crate) struct InstantSeal {
    authority: Keypair,
}

impl InstantSeal {
    pub(crate) fn new(authority: Keypair) -> InstantSeal {
        InstantSeal { authority }
    }
}

impl ConsensusSeal for InstantSeal {
    fn validate(&self, header: &BlockHeader, parent: &BlockHeader) -> Result<(), SealError> {
        if header.parent_hash != parent.hash() {
            return Err(SealError::InvalidHeader {
                detail: "parent hash does not match the parent header".to_string(),
            });
        }
        if header.number != parent.number + 1 {
            return Err(SealError::InvalidHeader {
                detail: "block number does not follow the parent's".to_string(),
            });
        }
        if header.timestamp <= parent.timestamp {
            return Err(SealError::InvalidHeader {
                detail: "timestamp does not advance past the parent's".to_string(),
            });
        }
        Ok(())
    }

    fn seal(&self, header: &BlockHeader) -> Result<SignatureBytes, SealError> {
        Ok(self.authority.sign(&header.seal_payload()))
    }
}
