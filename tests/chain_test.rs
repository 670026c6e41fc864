//! End-to-end tests driving a running [`Node`]: genesis initialization, mining, submission
//! modes, snapshot/revert, time control, pause/resume, and event handlers.

use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use log::LevelFilter;

use devnet_rs::chain::{BlockTag, ChainError, GenesisConfig, MineCapacity};
use devnet_rs::config::SubmissionMode;
use devnet_rs::node::{Node, NodeSpec};
use devnet_rs::pool::ValidationError;
use devnet_rs::types::basic::{Address, BlockNumber, Timestamp, Wei};

mod common;

use crate::common::engine::{InstantSeal, TransferEngine};
use crate::common::logging::setup_logger;
use crate::common::mem_db::MemDB;
use crate::common::{
    configuration, generate_keypair, start_node, transfer, BLOCK_REWARD, GENESIS_TIMESTAMP,
};

/// Fee paid by one plain transfer: gas price 2 × the base transaction gas.
const TRANSFER_FEE: u128 = 2 * 21_000;
const GAS_PRICE: u128 = 2;
const INITIAL_BALANCE: u128 = 1_000_000_000_000;

fn head_number(node: &Node<MemDB>) -> u64 {
    node.camera()
        .snapshot()
        .head()
        .unwrap()
        .header
        .number
        .int()
}

fn balance(node: &Node<MemDB>, address: &Address) -> u128 {
    node.camera()
        .snapshot()
        .balance(address, BlockTag::Latest)
        .unwrap()
        .int()
}

#[test]
fn genesis_allocation_is_readable_at_block_zero() {
    setup_logger(LevelFilter::Info);

    let alice = generate_keypair();
    let coinbase = generate_keypair().address();
    let node = start_node(
        MemDB::new(),
        configuration(coinbase, SubmissionMode::Eager, false),
        vec![(alice.address(), Wei::new(INITIAL_BALANCE))],
    );

    assert_eq!(head_number(&node), 0);
    let view = node.camera().snapshot();
    assert_eq!(
        view.balance(&alice.address(), BlockTag::Number(BlockNumber::new(0)))
            .unwrap(),
        Wei::new(INITIAL_BALANCE)
    );
    assert_eq!(
        view.head().unwrap().header.timestamp,
        Timestamp::new(GENESIS_TIMESTAMP)
    );
}

#[test]
fn submit_and_mine_moves_value_and_records_a_receipt() {
    setup_logger(LevelFilter::Info);

    let alice = generate_keypair();
    let bob = generate_keypair().address();
    let coinbase = generate_keypair().address();
    let node = start_node(
        MemDB::new(),
        configuration(coinbase, SubmissionMode::Eager, false),
        vec![(alice.address(), Wei::new(INITIAL_BALANCE))],
    );

    let hash = node
        .submit_transaction(transfer(&alice, bob, 0, 1_000, GAS_PRICE))
        .unwrap();
    assert_eq!(head_number(&node), 0);

    let summary = node.mine(MineCapacity::FillBlock, None, true).unwrap();
    assert_eq!(summary.head_number, BlockNumber::new(1));
    assert_eq!(summary.transactions, vec![hash]);

    assert_eq!(balance(&node, &bob), 1_000);
    assert_eq!(
        balance(&node, &alice.address()),
        INITIAL_BALANCE - 1_000 - TRANSFER_FEE
    );
    assert_eq!(balance(&node, &coinbase), BLOCK_REWARD + TRANSFER_FEE);

    let view = node.camera().snapshot();
    let receipt = view.receipt(&hash).unwrap().unwrap();
    assert_eq!(receipt.transaction_hash, hash);
    assert_eq!(
        view.transaction(&hash).unwrap().unwrap().hash(),
        hash
    );
    assert_eq!(node.find_transaction(hash).unwrap().unwrap().hash(), hash);
}

#[test]
fn fill_block_orders_across_senders_by_price_descending() {
    setup_logger(LevelFilter::Info);

    let cheap = generate_keypair();
    let expensive = generate_keypair();
    let recipient = generate_keypair().address();
    let coinbase = generate_keypair().address();
    let node = start_node(
        MemDB::new(),
        configuration(coinbase, SubmissionMode::Eager, false),
        vec![
            (cheap.address(), Wei::new(INITIAL_BALANCE)),
            (expensive.address(), Wei::new(INITIAL_BALANCE)),
        ],
    );

    // The cheap sender submits first, but the expensive sender outbids it.
    let cheap_hash = node
        .submit_transaction(transfer(&cheap, recipient, 0, 100, 5))
        .unwrap();
    let expensive_hash = node
        .submit_transaction(transfer(&expensive, recipient, 0, 100, 9))
        .unwrap();

    node.mine(MineCapacity::FillBlock, None, true).unwrap();

    let block = node
        .camera()
        .snapshot()
        .block_at_number(BlockNumber::new(1))
        .unwrap()
        .unwrap();
    let hashes: Vec<_> = block.transactions.iter().map(|tx| tx.hash()).collect();
    assert_eq!(hashes, vec![expensive_hash, cheap_hash]);
}

#[test]
fn strict_mode_mines_the_submission_before_replying() {
    setup_logger(LevelFilter::Info);

    let alice = generate_keypair();
    let bob = generate_keypair().address();
    let coinbase = generate_keypair().address();
    let node = start_node(
        MemDB::new(),
        configuration(coinbase, SubmissionMode::Strict, false),
        vec![(alice.address(), Wei::new(INITIAL_BALANCE))],
    );

    let hash = node
        .submit_transaction(transfer(&alice, bob, 0, 1_000, GAS_PRICE))
        .unwrap();

    // By the time the hash comes back, the transaction sits in block 1.
    assert_eq!(head_number(&node), 1);
    assert_eq!(balance(&node, &bob), 1_000);
    assert!(node.camera().snapshot().receipt(&hash).unwrap().is_some());
}

#[test]
fn eager_automine_mines_after_replying() {
    setup_logger(LevelFilter::Info);

    let alice = generate_keypair();
    let bob = generate_keypair().address();
    let coinbase = generate_keypair().address();
    let node = start_node(
        MemDB::new(),
        configuration(coinbase, SubmissionMode::Eager, true),
        vec![(alice.address(), Wei::new(INITIAL_BALANCE))],
    );

    node.submit_transaction(transfer(&alice, bob, 0, 1_000, GAS_PRICE))
        .unwrap();

    // The reply races the block; poll until the automined block lands.
    while head_number(&node) < 1 {
        thread::sleep(Duration::from_millis(10));
    }
    assert_eq!(balance(&node, &bob), 1_000);
}

#[test]
fn snapshot_revert_restores_balances_and_invalidates_later_snapshots() {
    setup_logger(LevelFilter::Info);

    let alice = generate_keypair();
    let bob = generate_keypair().address();
    let coinbase = generate_keypair().address();
    let node = start_node(
        MemDB::new(),
        configuration(coinbase, SubmissionMode::Eager, false),
        vec![(alice.address(), Wei::new(INITIAL_BALANCE))],
    );

    node.submit_transaction(transfer(&alice, bob, 0, 1_000, GAS_PRICE))
        .unwrap();
    node.mine(MineCapacity::FillBlock, None, true).unwrap();
    let snapshot = node.snapshot();
    let alice_at_snapshot = balance(&node, &alice.address());

    let second = node
        .submit_transaction(transfer(&alice, bob, 1, 7_000, GAS_PRICE))
        .unwrap();
    node.mine(MineCapacity::FillBlock, None, true).unwrap();
    assert_eq!(head_number(&node), 2);
    assert_eq!(balance(&node, &bob), 8_000);

    node.revert_to(snapshot).unwrap();
    assert_eq!(head_number(&node), 1);
    assert_eq!(balance(&node, &bob), 1_000);
    assert_eq!(balance(&node, &alice.address()), alice_at_snapshot);

    // The unwound block's receipts and transaction locations are gone with it.
    let view = node.camera().snapshot();
    assert!(view.receipt(&second).unwrap().is_none());
    assert!(view.transaction(&second).unwrap().is_none());
    drop(view);

    // Reverting consumed the snapshot: a second revert fails and changes nothing.
    assert!(matches!(
        node.revert_to(snapshot),
        Err(ChainError::UnknownSnapshot { .. })
    ));
    assert_eq!(head_number(&node), 1);
    assert_eq!(balance(&node, &bob), 1_000);
}

#[test]
fn time_control_fixes_the_next_block_timestamp() {
    setup_logger(LevelFilter::Info);

    let coinbase = generate_keypair().address();
    let node = start_node(
        MemDB::new(),
        configuration(coinbase, SubmissionMode::Eager, false),
        Vec::new(),
    );

    // With no override and a far-future genesis, the wall clock is below the floor, so the
    // timestamp falls back to parent-plus-one.
    node.mine(MineCapacity::Empty, None, true).unwrap();
    let head = node.camera().snapshot().head().unwrap();
    assert_eq!(head.header.timestamp, Timestamp::new(GENESIS_TIMESTAMP + 1));

    // A pending override is consumed by exactly the next block.
    node.set_next_timestamp(Timestamp::new(GENESIS_TIMESTAMP + 1_000));
    node.mine(MineCapacity::Empty, None, true).unwrap();
    let head = node.camera().snapshot().head().unwrap();
    assert_eq!(
        head.header.timestamp,
        Timestamp::new(GENESIS_TIMESTAMP + 1_000)
    );

    // An explicit timestamp argument beats everything.
    node.mine(
        MineCapacity::Empty,
        Some(Timestamp::new(GENESIS_TIMESTAMP + 2_000)),
        true,
    )
    .unwrap();
    let head = node.camera().snapshot().head().unwrap();
    assert_eq!(
        head.header.timestamp,
        Timestamp::new(GENESIS_TIMESTAMP + 2_000)
    );

    // The wall-clock offset accumulates across calls.
    assert_eq!(node.increase_time(500), 500);
    assert_eq!(node.increase_time(800), 1_300);
}

#[test]
fn pause_gates_mining_but_not_admission() {
    setup_logger(LevelFilter::Info);

    let alice = generate_keypair();
    let bob = generate_keypair().address();
    let coinbase = generate_keypair().address();
    let node = start_node(
        MemDB::new(),
        configuration(coinbase, SubmissionMode::Eager, false),
        vec![(alice.address(), Wei::new(INITIAL_BALANCE))],
    );

    node.pause();
    assert!(matches!(
        node.mine(MineCapacity::FillBlock, None, true),
        Err(ChainError::Paused)
    ));

    // Admission keeps working while paused.
    let hash = node
        .submit_transaction(transfer(&alice, bob, 0, 1_000, GAS_PRICE))
        .unwrap();
    assert!(node.find_transaction(hash).unwrap().is_some());
    assert_eq!(head_number(&node), 0);

    node.resume();
    let summary = node.mine(MineCapacity::FillBlock, None, true).unwrap();
    assert_eq!(summary.transactions, vec![hash]);
    assert_eq!(balance(&node, &bob), 1_000);
}

#[test]
fn empty_and_single_capacities() {
    setup_logger(LevelFilter::Info);

    let alice = generate_keypair();
    let bob = generate_keypair().address();
    let coinbase = generate_keypair().address();
    let node = start_node(
        MemDB::new(),
        configuration(coinbase, SubmissionMode::Eager, false),
        vec![(alice.address(), Wei::new(INITIAL_BALANCE))],
    );

    node.submit_transaction(transfer(&alice, bob, 0, 1_000, GAS_PRICE))
        .unwrap();

    // An empty-capacity block leaves the pool untouched.
    let summary = node.mine(MineCapacity::Empty, None, true).unwrap();
    assert_eq!(summary.head_number, BlockNumber::new(1));
    assert!(summary.transactions.is_empty());

    // A single-capacity block takes exactly the pending transaction.
    let summary = node.mine(MineCapacity::Single, None, true).unwrap();
    assert_eq!(summary.transactions.len(), 1);

    // With the pool drained, single-capacity mining has nothing to include.
    assert!(matches!(
        node.mine(MineCapacity::Single, None, true),
        Err(ChainError::NothingToMine)
    ));
}

#[test]
fn out_of_gas_transaction_is_mined_with_a_failure_receipt() {
    setup_logger(LevelFilter::Info);

    let alice = generate_keypair();
    let bob = generate_keypair().address();
    let coinbase = generate_keypair().address();
    let node = start_node(
        MemDB::new(),
        configuration(coinbase, SubmissionMode::Eager, false),
        vec![(alice.address(), Wei::new(INITIAL_BALANCE))],
    );

    let hash = node
        .submit_transaction(common::call(
            &alice,
            bob,
            0,
            GAS_PRICE,
            &common::engine::TestOp::ExhaustGas,
        ))
        .unwrap();

    let summary = node.mine(MineCapacity::FillBlock, None, true).unwrap();
    assert_eq!(summary.transactions, vec![hash]);

    let receipt = node
        .camera()
        .snapshot()
        .receipt(&hash)
        .unwrap()
        .unwrap();
    assert_eq!(receipt.status, devnet_rs::types::receipt::ExecStatus::Failure);

    // The failed transaction left the pool with the rest of the block: nothing is pending
    // or in flight anymore.
    assert!(matches!(
        node.mine(MineCapacity::Single, None, true),
        Err(ChainError::NothingToMine)
    ));

    // Gas was consumed even though execution failed, and the nonce advanced, so nonce 1 is
    // now the next executable one.
    let fee = GAS_PRICE * common::TX_GAS_LIMIT as u128;
    assert_eq!(balance(&node, &alice.address()), INITIAL_BALANCE - fee);
    node.submit_transaction(transfer(&alice, bob, 1, 100, GAS_PRICE))
        .unwrap();
    let summary = node.mine(MineCapacity::Single, None, true).unwrap();
    assert_eq!(summary.transactions.len(), 1);
}

#[test]
fn rejected_submission_reports_the_validation_error() {
    setup_logger(LevelFilter::Info);

    let pauper = generate_keypair();
    let bob = generate_keypair().address();
    let coinbase = generate_keypair().address();
    let node = start_node(
        MemDB::new(),
        configuration(coinbase, SubmissionMode::Eager, false),
        Vec::new(),
    );

    let result = node.submit_transaction(transfer(&pauper, bob, 0, 1_000, GAS_PRICE));
    assert!(matches!(
        result,
        Err(ChainError::ValidationError(
            ValidationError::InsufficientFunds { .. }
        ))
    ));
    assert_eq!(head_number(&node), 0);
}

#[test]
fn registered_event_handlers_fire() {
    setup_logger(LevelFilter::Info);

    let alice = generate_keypair();
    let bob = generate_keypair().address();
    let coinbase = generate_keypair().address();
    let config = configuration(coinbase, SubmissionMode::Eager, false);

    let kv_store = MemDB::new();
    Node::initialize(
        kv_store.clone(),
        &config,
        &GenesisConfig {
            timestamp: Timestamp::new(GENESIS_TIMESTAMP),
            extra_data: Vec::new(),
            alloc: vec![(alice.address(), Wei::new(INITIAL_BALANCE))],
        },
    );

    let (mined, mined_receiver) = mpsc::channel();
    let (reverted, reverted_receiver) = mpsc::channel();
    let node = NodeSpec::builder()
        .engine(TransferEngine::new())
        .seal(InstantSeal::new(generate_keypair()))
        .kv_store(kv_store)
        .configuration(config)
        .on_mine_block(move |event| {
            let _ = mined.send(event.number);
        })
        .on_revert(move |event| {
            let _ = reverted.send(event.id);
        })
        .build()
        .start()
        .unwrap();

    let snapshot = node.snapshot();
    node.submit_transaction(transfer(&alice, bob, 0, 1_000, GAS_PRICE))
        .unwrap();
    node.mine(MineCapacity::FillBlock, None, true).unwrap();
    node.revert_to(snapshot).unwrap();

    let mined_number = mined_receiver.recv_timeout(Duration::from_secs(5)).unwrap();
    assert_eq!(mined_number, BlockNumber::new(1));
    let reverted_id = reverted_receiver
        .recv_timeout(Duration::from_secs(5))
        .unwrap();
    assert_eq!(reverted_id, snapshot);
}
