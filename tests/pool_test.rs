//! Tests the transaction pool in isolation: admission, per-sender nonce ordering,
//! cross-sender price ranking, replacement rules, future promotion, and the in-flight set.

use devnet_rs::pool::{Admission, PoolConfig, TransactionPool, ValidationError};
use devnet_rs::types::account::Account;
use devnet_rs::types::basic::{Gas, Nonce, Wei};
use devnet_rs::types::transaction::{FeeMarketTransaction, Transaction};

mod common;

use crate::common::{generate_keypair, transfer, BLOCK_GAS_LIMIT, TX_GAS_LIMIT};

fn test_pool(base_fee: u128) -> TransactionPool {
    TransactionPool::new(
        PoolConfig {
            block_gas_limit: Gas::new(BLOCK_GAS_LIMIT),
            base_fee: Wei::new(base_fee),
            price_bump_percent: 10,
        },
        None,
        None,
    )
}

fn rich_account() -> Account {
    let mut account = Account::empty();
    account.balance = Wei::new(1_000_000_000_000);
    account
}

fn drain_ranked(pool: &mut TransactionPool) -> Vec<Transaction> {
    pool.begin_selection();
    let mut popped = Vec::new();
    while let Some(tx) = pool.next_best() {
        popped.push(tx);
    }
    pool.end_selection();
    popped
}

#[test]
fn same_sender_pops_in_ascending_nonce_order() {
    let mut pool = test_pool(1);
    let account = rich_account();
    let alice = generate_keypair();
    let bob = generate_keypair().address();

    for nonce in 0..5 {
        let admission = pool
            .prepare(transfer(&alice, bob, nonce, 100, 10), &account)
            .unwrap();
        assert_eq!(admission, Admission::Executable);
    }

    let popped = drain_ranked(&mut pool);
    let nonces: Vec<Nonce> = popped.iter().map(|tx| tx.nonce()).collect();
    assert_eq!(nonces, (0..5).map(Nonce::new).collect::<Vec<Nonce>>());
}

#[test]
fn same_sender_ordering_is_nonce_first_regardless_of_price() {
    let mut pool = test_pool(1);
    let account = rich_account();
    let alice = generate_keypair();
    let bob = generate_keypair().address();

    // Nonce 0 pays 10, nonce 1 pays only 5. Nonce order still wins within one sender.
    pool.prepare(transfer(&alice, bob, 0, 100, 10), &account)
        .unwrap();
    pool.prepare(transfer(&alice, bob, 1, 100, 5), &account)
        .unwrap();
    assert_eq!(pool.executable_count(), 2);

    let popped = drain_ranked(&mut pool);
    assert_eq!(popped[0].nonce(), Nonce::new(0));
    assert_eq!(popped[1].nonce(), Nonce::new(1));

    // And the other way around: a cheap nonce 0 still goes before an expensive nonce 1.
    let mut pool = test_pool(1);
    pool.prepare(transfer(&alice, bob, 0, 100, 5), &account)
        .unwrap();
    pool.prepare(transfer(&alice, bob, 1, 100, 10), &account)
        .unwrap();
    let popped = drain_ranked(&mut pool);
    assert_eq!(popped[0].nonce(), Nonce::new(0));
    assert_eq!(popped[1].nonce(), Nonce::new(1));
}

#[test]
fn cross_sender_ranking_is_price_descending_with_fifo_ties() {
    let mut pool = test_pool(1);
    let account = rich_account();
    let senders: Vec<_> = (0..3).map(|_| generate_keypair()).collect();
    let recipient = generate_keypair().address();

    // Arrival order: A pays 5, B pays 9, C pays 5. Expected pop order: B (highest price),
    // then A before C (tie broken by arrival).
    let a = transfer(&senders[0], recipient, 0, 100, 5);
    let b = transfer(&senders[1], recipient, 0, 100, 9);
    let c = transfer(&senders[2], recipient, 0, 100, 5);
    pool.prepare(a.clone(), &account).unwrap();
    pool.prepare(b.clone(), &account).unwrap();
    pool.prepare(c.clone(), &account).unwrap();

    let popped = drain_ranked(&mut pool);
    assert_eq!(popped[0].hash(), b.hash());
    assert_eq!(popped[1].hash(), a.hash());
    assert_eq!(popped[2].hash(), c.hash());
}

#[test]
fn fee_market_transactions_rank_by_effective_price() {
    let base_fee = 10;
    let mut pool = test_pool(base_fee);
    let account = rich_account();
    let flat_sender = generate_keypair();
    let fee_market_sender = generate_keypair();
    let recipient = generate_keypair().address();

    let flat = transfer(&flat_sender, recipient, 0, 100, 12);

    // Effective price: min(max_fee, base_fee + priority) = min(15, 10 + 3) = 13.
    let mut fee_market = Transaction::FeeMarket(FeeMarketTransaction {
        sender: fee_market_sender.address(),
        nonce: Nonce::new(0),
        gas_limit: Gas::new(TX_GAS_LIMIT),
        max_fee_per_gas: Wei::new(15),
        max_priority_fee_per_gas: Wei::new(3),
        to: Some(recipient),
        value: Wei::new(100),
        payload: Vec::new(),
        signature: None,
    });
    fee_market.sign(&fee_market_sender);

    pool.prepare(flat.clone(), &account).unwrap();
    pool.prepare(fee_market.clone(), &account).unwrap();

    let popped = drain_ranked(&mut pool);
    assert_eq!(popped[0].hash(), fee_market.hash());
    assert_eq!(popped[1].hash(), flat.hash());
}

#[test]
fn base_fee_change_reranks_candidates() {
    let mut pool = test_pool(10);
    let account = rich_account();
    let flat_sender = generate_keypair();
    let fee_market_sender = generate_keypair();
    let recipient = generate_keypair().address();

    let flat = transfer(&flat_sender, recipient, 0, 100, 12);
    let mut fee_market = Transaction::FeeMarket(FeeMarketTransaction {
        sender: fee_market_sender.address(),
        nonce: Nonce::new(0),
        gas_limit: Gas::new(TX_GAS_LIMIT),
        max_fee_per_gas: Wei::new(15),
        max_priority_fee_per_gas: Wei::new(3),
        to: Some(recipient),
        value: Wei::new(100),
        payload: Vec::new(),
        signature: None,
    });
    fee_market.sign(&fee_market_sender);

    pool.prepare(flat.clone(), &account).unwrap();
    pool.prepare(fee_market.clone(), &account).unwrap();

    // At base fee 10 the fee market transaction pays 13 and outranks the flat 12. Dropping
    // the base fee to 0 lowers it to min(15, 0 + 3) = 3, so the ranking flips.
    pool.begin_selection();
    pool.set_base_fee(Wei::new(0));
    let first = pool.next_best().unwrap();
    let second = pool.next_best().unwrap();
    pool.end_selection();

    assert_eq!(first.hash(), flat.hash());
    assert_eq!(second.hash(), fee_market.hash());
}

#[test]
fn underpriced_replacement_is_rejected_and_incumbent_remains() {
    let mut pool = test_pool(1);
    let account = rich_account();
    let alice = generate_keypair();
    let bob = generate_keypair().address();

    let incumbent = transfer(&alice, bob, 0, 100, 10);
    pool.prepare(incumbent.clone(), &account).unwrap();

    // The bump is 10%, so a replacement must pay at least 11. Paying 10 is not a
    // replacement at all, and paying exactly the incumbent's price does not clear the bump.
    let too_cheap = transfer(&alice, bob, 0, 200, 10);
    let result = pool.prepare(too_cheap, &account);
    assert!(matches!(
        result,
        Err(ValidationError::UnderpricedReplacement { .. })
    ));
    assert!(pool.find(&incumbent.hash()).is_some());
    assert_eq!(pool.executable_count(), 1);
}

#[test]
fn replacement_clearing_the_price_bump_evicts_the_incumbent() {
    let mut pool = test_pool(1);
    let account = rich_account();
    let alice = generate_keypair();
    let bob = generate_keypair().address();

    let incumbent = transfer(&alice, bob, 0, 100, 10);
    pool.prepare(incumbent.clone(), &account).unwrap();

    let replacement = transfer(&alice, bob, 0, 200, 11);
    let admission = pool.prepare(replacement.clone(), &account).unwrap();
    assert_eq!(admission, Admission::Executable);

    assert!(pool.find(&incumbent.hash()).is_none());
    assert!(pool.find(&replacement.hash()).is_some());
    assert_eq!(pool.executable_count(), 1);
}

#[test]
fn nonce_gapped_transactions_park_as_future_until_the_gap_closes() {
    let mut pool = test_pool(1);
    let account = rich_account();
    let alice = generate_keypair();
    let bob = generate_keypair().address();

    // Nonce 2 arrives first: the sender's confirmed nonce is 0, so it parks.
    let gapped = pool
        .prepare(transfer(&alice, bob, 2, 100, 10), &account)
        .unwrap();
    assert_eq!(gapped, Admission::Future);
    assert_eq!(pool.future_count(), 1);
    assert!(!pool.has_executable());

    // Nonces 0 and 1 close the gap; 2 is promoted along with them.
    pool.prepare(transfer(&alice, bob, 0, 100, 10), &account)
        .unwrap();
    pool.prepare(transfer(&alice, bob, 1, 100, 10), &account)
        .unwrap();
    assert_eq!(pool.executable_count(), 3);
    assert_eq!(pool.future_count(), 0);

    let nonces: Vec<Nonce> = drain_ranked(&mut pool).iter().map(|tx| tx.nonce()).collect();
    assert_eq!(nonces, vec![Nonce::new(0), Nonce::new(1), Nonce::new(2)]);
}

#[test]
fn pruning_mined_transactions_promotes_the_next_future_nonce() {
    let mut pool = test_pool(1);
    let account = rich_account();
    let alice = generate_keypair();
    let bob = generate_keypair().address();

    let first = transfer(&alice, bob, 0, 100, 10);
    pool.prepare(first.clone(), &account).unwrap();

    // Check nonce 0 out for mining, then submit nonce 1. While nonce 0 is in flight it does
    // not count towards the sender's gap-free run, so nonce 1 parks.
    pool.begin_selection();
    let in_flight = pool.next_best().unwrap();
    pool.end_selection();
    assert_eq!(in_flight.hash(), first.hash());
    assert!(pool.find(&first.hash()).is_some());

    let second = pool
        .prepare(transfer(&alice, bob, 1, 100, 10), &account)
        .unwrap();
    assert_eq!(second, Admission::Future);

    // Mining nonce 0 advances the confirmed nonce and promotes nonce 1.
    pool.prune_mined(&[first.clone()]);
    assert!(pool.find(&first.hash()).is_none());
    assert_eq!(pool.executable_count(), 1);
    assert_eq!(pool.future_count(), 0);
}

#[test]
fn unlocking_returns_in_flight_transactions_to_the_queue() {
    let mut pool = test_pool(1);
    let account = rich_account();
    let alice = generate_keypair();
    let bob = generate_keypair().address();

    let tx = transfer(&alice, bob, 0, 100, 10);
    pool.prepare(tx.clone(), &account).unwrap();

    pool.begin_selection();
    pool.next_best().unwrap();
    pool.end_selection();
    assert_eq!(pool.executable_count(), 0);

    // The block attempt was abandoned; the transaction goes back in at its old position.
    pool.unlock_all();
    assert_eq!(pool.executable_count(), 1);
    assert!(pool.find(&tx.hash()).is_some());

    let popped = drain_ranked(&mut pool);
    assert_eq!(popped[0].hash(), tx.hash());
}

#[test]
fn clear_drops_every_pending_transaction() {
    let mut pool = test_pool(1);
    let account = rich_account();
    let alice = generate_keypair();
    let bob = generate_keypair().address();

    let pending = transfer(&alice, bob, 0, 100, 10);
    pool.prepare(pending.clone(), &account).unwrap();
    pool.prepare(transfer(&alice, bob, 2, 100, 10), &account)
        .unwrap();
    assert_eq!(pool.executable_count(), 1);
    assert_eq!(pool.future_count(), 1);

    pool.clear();
    assert_eq!(pool.executable_count(), 0);
    assert_eq!(pool.future_count(), 0);
    assert!(pool.find(&pending.hash()).is_none());
    assert!(!pool.has_executable());
}

#[test]
fn admission_rejects_invalid_transactions_without_touching_the_pool() {
    let mut pool = test_pool(1);
    let alice = generate_keypair();
    let bob = generate_keypair().address();

    // Nonce below the sender's confirmed nonce.
    let mut confirmed = rich_account();
    confirmed.nonce = Nonce::new(5);
    let result = pool.prepare(transfer(&alice, bob, 4, 100, 10), &confirmed);
    assert!(matches!(result, Err(ValidationError::NonceTooLow { .. })));

    // Balance below value + gas × price.
    let poor = Account::empty();
    let result = pool.prepare(transfer(&alice, bob, 0, 100, 10), &poor);
    assert!(matches!(
        result,
        Err(ValidationError::InsufficientFunds { .. })
    ));

    // Unsigned transaction.
    let account = rich_account();
    let mut unsigned = transfer(&alice, bob, 0, 100, 10);
    if let Transaction::Legacy(tx) = &mut unsigned {
        tx.signature = None;
    }
    let result = pool.prepare(unsigned, &account);
    assert!(matches!(
        result,
        Err(ValidationError::InvalidSignature { .. })
    ));

    // A duplicate of an already-pooled transaction.
    let tx = transfer(&alice, bob, 0, 100, 10);
    pool.prepare(tx.clone(), &account).unwrap();
    let result = pool.prepare(tx, &account);
    assert!(matches!(result, Err(ValidationError::AlreadyKnown { .. })));

    assert_eq!(pool.executable_count(), 1);
    assert_eq!(pool.future_count(), 0);
}
