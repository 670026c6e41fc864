//! Support code shared between the integration tests: the in-memory store, the deterministic
//! test engine and instant seal, logging setup, and helpers for keys, transactions, and
//! nodes.

pub(crate) mod engine;

pub(crate) mod logging;

pub(crate) mod mem_db;

use borsh::BorshSerialize;
use ed25519_dalek::SigningKey;
use rand_core::OsRng;

use devnet_rs::chain::GenesisConfig;
use devnet_rs::config::{Configuration, SubmissionMode};
use devnet_rs::node::{Node, NodeSpec};
use devnet_rs::types::basic::{Address, ChainId, Gas, Nonce, Timestamp, Wei};
use devnet_rs::types::crypto_primitives::Keypair;
use devnet_rs::types::transaction::{LegacyTransaction, Transaction};

use crate::common::engine::{InstantSeal, TestOp, TransferEngine};
use crate::common::mem_db::MemDB;

/// Gas limit given to every test transaction. Generous enough for any [`TestOp`].
pub(crate) const TX_GAS_LIMIT: u64 = 100_000;

/// Gas limit of every test block.
pub(crate) const BLOCK_GAS_LIMIT: u64 = 30_000_000;

/// Flat reward credited to the coinbase per mined block, on top of collected fees.
pub(crate) const BLOCK_REWARD: u128 = 5;

/// Genesis timestamp used by [`start_node`]. Deliberately far in the future, so that
/// wall-clock-derived block timestamps always fall back to the parent-plus-one floor and
/// tests stay deterministic.
pub(crate) const GENESIS_TIMESTAMP: u64 = 4_000_000_000;

pub(crate) fn generate_keypair() -> Keypair {
    let mut csprg = OsRng {};
    Keypair::new(SigningKey::generate(&mut csprg))
}

/// A signed legacy transaction moving `value` from `sender` to `to` with an empty payload.
pub(crate) fn transfer(
    sender: &Keypair,
    to: Address,
    nonce: u64,
    value: u128,
    gas_price: u128,
) -> Transaction {
    signed_legacy(sender, Some(to), nonce, value, gas_price, Vec::new())
}

/// A signed legacy transaction carrying a Borsh-encoded [`TestOp`] payload.
pub(crate) fn call(
    sender: &Keypair,
    to: Address,
    nonce: u64,
    gas_price: u128,
    op: &TestOp,
) -> Transaction {
    signed_legacy(
        sender,
        Some(to),
        nonce,
        0,
        gas_price,
        op.try_to_vec().unwrap(),
    )
}

fn signed_legacy(
    sender: &Keypair,
    to: Option<Address>,
    nonce: u64,
    value: u128,
    gas_price: u128,
    payload: Vec<u8>,
) -> Transaction {
    let mut tx = Transaction::Legacy(LegacyTransaction {
        sender: sender.address(),
        nonce: Nonce::new(nonce),
        gas_limit: Gas::new(TX_GAS_LIMIT),
        gas_price: Wei::new(gas_price),
        to,
        value: Wei::new(value),
        payload,
        signature: None,
    });
    tx.sign(sender);
    tx
}

pub(crate) fn configuration(
    coinbase: Address,
    submission_mode: SubmissionMode,
    automine: bool,
) -> Configuration {
    Configuration::builder()
        .chain_id(ChainId::new(0))
        .block_gas_limit(Gas::new(BLOCK_GAS_LIMIT))
        .base_fee(Wei::new(1))
        .price_bump_percent(10)
        .block_reward(Wei::new(BLOCK_REWARD))
        .coinbase(coinbase)
        .submission_mode(submission_mode)
        .automine(automine)
        .log_events(false)
        .build()
}

/// Initialize a fresh store with the given balance allocation and start a node over it, with
/// the [`TransferEngine`] as executor and an [`InstantSeal`] authority.
pub(crate) fn start_node(
    kv_store: MemDB,
    configuration: Configuration,
    alloc: Vec<(Address, Wei)>,
) -> Node<MemDB> {
    Node::initialize(
        kv_store.clone(),
        &configuration,
        &GenesisConfig {
            timestamp: Timestamp::new(GENESIS_TIMESTAMP),
            extra_data: b"devnet".to_vec(),
            alloc,
        },
    );

    NodeSpec::builder()
        .engine(TransferEngine::new())
        .seal(InstantSeal::new(generate_keypair()))
        .kv_store(kv_store)
        .configuration(configuration)
        .build()
        .start()
        .unwrap()
}
