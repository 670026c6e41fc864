/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Sequential execution of ordered transactions against a checkpointed trie, producing a
//! finished block.
//!
//! A builder moves through a strict lifecycle: constructed (which opens the outer checkpoint)
//! → zero or more [`add_transaction`](BlockBuilder::add_transaction) → exactly one of
//! [`build`](BlockBuilder::build)/[`revert`](BlockBuilder::revert) → terminal. Calls after
//! the terminal transition fail fast with [`BuilderError::Terminal`].
//!
//! Each accepted transaction is bracketed by its own checkpoint frame. An
//! [`ExecutionException`](crate::engine::ExecutionException) does **not** abort the bracket:
//! the engine has already reverted the message's state effects, so the frame — holding only
//! the protocol bookkeeping (nonce increment and gas charge) — is committed, and the
//! exception is recorded in the receipt as a failed status. Only an unexpected internal error
//! reverts the frame and propagates.
//!
//! [`build`] computes the transactions and receipts roots, ORs the per-transaction blooms,
//! credits the miner reward and the collected fees to the coinbase *inside* the still-open
//! outer checkpoint (so a revert of a dry-run block discards the reward too), commits the
//! outer checkpoint, and seals the header. Linking the sealed block into the chain is the
//! caller's decision; a builder used without linkage leaves the trie committed (dry-run
//! mode).

use std::fmt::{self, Display, Formatter};
use std::sync::mpsc::Sender;
use std::time::SystemTime;

use crate::consensus::{ConsensusSeal, SealError};
use crate::engine::{EngineError, ExecutionEngine, Message};
use crate::events::{AddTransactionEvent, Event};
use crate::state::checkpoint::CheckpointError;
use crate::state::kv_store::KVStore;
use crate::state::trie::StateTrie;
use crate::state::world::{WorldState, WorldStateError};
use crate::types::basic::{Address, Bloom, Gas, Nonce, Timestamp, Wei};
use crate::types::block::{merkle_root, Block, BlockHeader};
use crate::types::receipt::{ExecStatus, Receipt};
use crate::types::transaction::Transaction;

/// The fixed parameters of the block being built.
pub struct BuildContext {
    pub coinbase: Address,
    pub base_fee: Wei,
    pub block_gas_limit: Gas,
    pub block_reward: Wei,
    pub timestamp: Timestamp,
    pub extra_data: Vec<u8>,
}

/// A sealed block together with the receipts accumulated while building it.
pub struct BuiltBlock {
    pub block: Block,
    pub receipts: Vec<Receipt>,
}

pub struct BlockBuilder<'a, K: KVStore> {
    trie: &'a mut StateTrie<K>,
    parent: BlockHeader,
    context: BuildContext,
    transactions: Vec<Transaction>,
    receipts: Vec<Receipt>,
    gas_used: Gas,
    logs_bloom: Bloom,
    fees: Wei,
    terminal: bool,
    event_publisher: Option<Sender<Event>>,
}

impl<'a, K: KVStore> BlockBuilder<'a, K> {
    /// Open a builder on top of `parent`, pushing the outer checkpoint frame.
    pub fn new(
        trie: &'a mut StateTrie<K>,
        parent: BlockHeader,
        context: BuildContext,
        event_publisher: Option<Sender<Event>>,
    ) -> BlockBuilder<'a, K> {
        trie.checkpoint();
        BlockBuilder {
            trie,
            parent,
            context,
            transactions: Vec::new(),
            receipts: Vec::new(),
            gas_used: Gas::new(0),
            logs_bloom: Bloom::empty(),
            fees: Wei::zero(),
            terminal: false,
            event_publisher,
        }
    }

    /// Gas still available in the block under construction.
    pub fn remaining_gas(&self) -> Gas {
        self.context.block_gas_limit.saturating_sub(self.gas_used)
    }

    pub fn transaction_count(&self) -> usize {
        self.transactions.len()
    }

    /// Execute `tx` and record it, returning its receipt.
    ///
    /// A transaction whose gas limit exceeds the remaining block gas is rejected *before*
    /// any checkpoint is taken; the builder stays usable and the caller may try a smaller
    /// transaction or finish the block.
    pub fn add_transaction<E: ExecutionEngine<K>>(
        &mut self,
        engine: &mut E,
        tx: &Transaction,
    ) -> Result<&Receipt, BuilderError> {
        if self.terminal {
            return Err(BuilderError::Terminal);
        }
        if tx.gas_limit() > self.remaining_gas() {
            return Err(BuilderError::GasLimitExceedsRemaining {
                needed: tx.gas_limit(),
                remaining: self.remaining_gas(),
            });
        }

        self.trie.checkpoint();
        match self.apply_transaction(engine, tx) {
            Ok((receipt, fee)) => {
                self.trie.commit()?;

                Event::publish(
                    &self.event_publisher,
                    Event::AddTransaction(AddTransactionEvent {
                        timestamp: SystemTime::now(),
                        transaction: receipt.transaction_hash,
                        status: receipt.status,
                    }),
                );

                self.gas_used += receipt.gas_used;
                self.fees += fee;
                self.logs_bloom.merge(&receipt.bloom);
                self.transactions.push(tx.clone());
                self.receipts.push(receipt);
                Ok(self.receipts.last().unwrap())
            }
            Err(err) => {
                self.trie.revert()?;
                Err(err)
            }
        }
    }

    /// The checkpointed part of transaction application: protocol bookkeeping around one
    /// engine invocation.
    fn apply_transaction<E: ExecutionEngine<K>>(
        &mut self,
        engine: &mut E,
        tx: &Transaction,
    ) -> Result<(Receipt, Wei), BuilderError> {
        let sender = tx.sender();
        let price = tx.effective_gas_price(self.context.base_fee);
        let intrinsic = tx.intrinsic_gas();

        let mut world = WorldState::new(self.trie);

        let account = world.account(&sender)?;
        if account.nonce != tx.nonce() {
            return Err(BuilderError::NonceMismatch {
                expected: account.nonce,
                got: tx.nonce(),
            });
        }

        // Buy gas up front; unused gas is refunded after execution.
        world.debit(&sender, price.saturating_mul_gas(tx.gas_limit()))?;
        world.increment_nonce(&sender)?;

        let message = Message {
            caller: sender,
            to: tx.to(),
            value: tx.value(),
            payload: tx.payload().to_vec(),
            gas: tx.gas_limit().saturating_sub(intrinsic),
        };
        let outcome = engine
            .execute_message(message, &mut world)
            .map_err(BuilderError::EngineError)?;

        let execution_gas = if outcome.gas_used > tx.gas_limit().saturating_sub(intrinsic) {
            tx.gas_limit().saturating_sub(intrinsic)
        } else {
            outcome.gas_used
        };
        let total_gas = intrinsic + execution_gas;

        let refund = tx.gas_limit().saturating_sub(total_gas);
        world.credit(&sender, price.saturating_mul_gas(refund))?;

        if outcome.exception.is_none() {
            for address in &outcome.selfdestructs {
                world.remove_account(address)?;
            }
        }

        let status = match outcome.exception {
            None => ExecStatus::Success,
            Some(_) => ExecStatus::Failure,
        };
        let bloom = Receipt::bloom_for_logs(&outcome.logs);
        let receipt = Receipt {
            transaction_hash: tx.hash(),
            status,
            gas_used: total_gas,
            cumulative_gas_used: self.gas_used + total_gas,
            logs: outcome.logs,
            bloom,
        };
        Ok((receipt, price.saturating_mul_gas(total_gas)))
    }

    /// Finalize roots, bloom and reward, seal the header, and commit the outer checkpoint.
    ///
    /// On failure the outer checkpoint stays open and the builder stays non-terminal, so
    /// the caller can still [`revert`](Self::revert); no partial state escapes.
    pub fn build<S: ConsensusSeal>(&mut self, seal: &S) -> Result<BuiltBlock, BuilderError> {
        if self.terminal {
            return Err(BuilderError::Terminal);
        }

        // The reward lands inside the still-open outer checkpoint, so reverting a block
        // that was built but never committed discards it together with everything else.
        let reward = self.context.block_reward + self.fees;
        let mut world = WorldState::new(self.trie);
        world.credit(&self.context.coinbase, reward)?;

        let mut header = BlockHeader {
            parent_hash: self.parent.hash(),
            number: self.parent.number + 1,
            state_root: self.trie.root(),
            transactions_root: merkle_root(&self.transactions),
            receipts_root: merkle_root(&self.receipts),
            logs_bloom: self.logs_bloom,
            gas_used: self.gas_used,
            gas_limit: self.context.block_gas_limit,
            timestamp: self.context.timestamp,
            base_fee: self.context.base_fee,
            coinbase: self.context.coinbase,
            extra_data: self.context.extra_data.clone(),
            seal: None,
        };
        header.seal = Some(seal.seal(&header).map_err(BuilderError::SealError)?);

        // The commit does not change the working root, so the sealed state root above is
        // exactly what the chain will resolve.
        self.trie.commit()?;
        self.terminal = true;

        Ok(BuiltBlock {
            block: Block::new(header, std::mem::take(&mut self.transactions)),
            receipts: std::mem::take(&mut self.receipts),
        })
    }

    /// Discard the outer checkpoint, restoring the trie to its state before the first
    /// [`add_transaction`]. Valid any time before [`build`].
    pub fn revert(&mut self) -> Result<(), BuilderError> {
        if self.terminal {
            return Err(BuilderError::Terminal);
        }
        self.terminal = true;
        self.trie.revert()?;
        Ok(())
    }
}

impl<K: KVStore> Drop for BlockBuilder<'_, K> {
    fn drop(&mut self) {
        // A builder abandoned without build() or revert() must not leave its outer frame
        // dangling on the checkpoint stack.
        if !self.terminal {
            let _ = self.trie.revert();
        }
    }
}

/// Error while building a block. Aborts only the current block attempt — the chain state
/// reachable from the canonical root is never corrupted, because every fatal path reverts
/// the open checkpoint frames.
#[derive(Debug)]
pub enum BuilderError {
    /// The builder has already been built or reverted.
    Terminal,

    /// The transaction's gas limit does not fit in the gas remaining in this block.
    GasLimitExceedsRemaining { needed: Gas, remaining: Gas },

    /// The transaction's nonce does not match the sender's account nonce at execution time.
    NonceMismatch { expected: Nonce, got: Nonce },

    WorldStateError(WorldStateError),

    CheckpointError(CheckpointError),

    /// The engine failed internally (not an execution exception).
    EngineError(EngineError),

    SealError(SealError),
}

impl From<WorldStateError> for BuilderError {
    fn from(value: WorldStateError) -> Self {
        BuilderError::WorldStateError(value)
    }
}

impl From<CheckpointError> for BuilderError {
    fn from(value: CheckpointError) -> Self {
        BuilderError::CheckpointError(value)
    }
}

impl Display for BuilderError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            BuilderError::Terminal => {
                write!(f, "builder already finished by build() or revert()")
            }
            BuilderError::GasLimitExceedsRemaining { needed, remaining } => write!(
                f,
                "transaction needs {} gas but only {} remains in the block",
                needed, remaining
            ),
            BuilderError::NonceMismatch { expected, got } => write!(
                f,
                "transaction nonce {} does not match account nonce {}",
                got, expected
            ),
            BuilderError::WorldStateError(err) => write!(f, "{}", err),
            BuilderError::CheckpointError(err) => write!(f, "{}", err),
            BuilderError::EngineError(err) => write!(f, "{}", err),
            BuilderError::SealError(err) => write!(f, "{}", err),
        }
    }
}
