/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The node's user-defined parameters.

use typed_builder::TypedBuilder;

use crate::types::basic::{Address, ChainId, Gas, Wei};

/// When `submit_transaction` returns the transaction hash relative to inclusion.
///
/// This is a latency/ordering choice, not a correctness property, so it is an explicit
/// configuration rather than inferred behavior.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SubmissionMode {
    /// Return the hash as soon as the transaction is admitted into the pool. If automine is
    /// on, the block is produced after the reply.
    Eager,
    /// Mine the submitted transaction's block before returning the hash.
    Strict,
}

/// Stores the user-defined parameters required to start the node, that is:
/// 1. The [chain ID](crate::types::basic::ChainId) of the target blockchain.
/// 2. The per-block gas limit.
/// 3. The base fee against which effective gas prices are computed.
/// 4. The percentage by which a same-nonce replacement must outbid the incumbent.
/// 5. The flat reward credited to the coinbase per mined block (on top of fees).
/// 6. The coinbase address.
/// 7. The [submission mode](SubmissionMode).
/// 8. The automine flag: if set, every eager submission triggers block production.
/// 9. The "Log Events" flag, if set to "true" then logs should be printed.
///
/// ## Log Events
///
/// The node logs using the [log](https://docs.rs/log/latest/log/) crate. To get these
/// messages printed onto a terminal or to a file, set up a [logging
/// implementation](https://docs.rs/log/latest/log/#available-logging-implementations).
#[derive(Clone, TypedBuilder)]
#[builder(builder_method(doc = "
    Create a builder for building a [Configuration]. On the builder call the following methods to construct a valid [Configuration].

    Required:
    - `.chain_id(...)`
    - `.block_gas_limit(...)`
    - `.base_fee(...)`
    - `.price_bump_percent(...)`
    - `.block_reward(...)`
    - `.coinbase(...)`
    - `.submission_mode(...)`
    - `.automine(...)`
    - `.log_events(...)`
"))]
pub struct Configuration {
    #[builder(setter(doc = "Set the chain ID of the blockchain. Required."))]
    pub chain_id: ChainId,
    #[builder(setter(doc = "Set the gas limit of every produced block. Required."))]
    pub block_gas_limit: Gas,
    #[builder(setter(doc = "Set the base fee used to compute effective gas prices. Required."))]
    pub base_fee: Wei,
    #[builder(setter(doc = "Set the price bump (in percent) a same-nonce replacement must clear. Required."))]
    pub price_bump_percent: u8,
    #[builder(setter(doc = "Set the flat reward credited to the coinbase per block. Required."))]
    pub block_reward: Wei,
    #[builder(setter(doc = "Set the coinbase address that collects rewards and fees. Required."))]
    pub coinbase: Address,
    #[builder(setter(doc = "Set when submit_transaction returns relative to inclusion. Required."))]
    pub submission_mode: SubmissionMode,
    #[builder(setter(doc = "Mine a block automatically on every submission? Required."))]
    pub automine: bool,
    #[builder(setter(doc = "Enable logging? Required."))]
    pub log_events: bool,
}
