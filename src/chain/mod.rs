/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The chain coordinator, its persisted indices, and read-only access to the committed
//! chain.

pub mod blockchain;

pub mod camera;

pub mod store;

pub use blockchain::{
    Blockchain, ChainConfig, ChainError, GenesisConfig, MineCapacity, MineSummary,
};
pub use camera::{BlockTag, ChainCamera, ChainView, QueryError};
pub use store::{ChainGet, ChainGetError, ChainWriteBatch, TransactionLocation};
