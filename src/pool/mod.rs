/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The transaction pool and the comparator-driven heap it is built on.

pub mod heap;

pub mod pool;

pub use heap::{Compare, Heap};
pub use pool::{Admission, PoolConfig, TransactionPool, ValidationError};
