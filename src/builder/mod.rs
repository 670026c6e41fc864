/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The block builder: sequential, checkpointed execution of ordered transactions into a
//! sealed block.

pub mod block_builder;

pub use block_builder::{BlockBuilder, BuildContext, BuilderError, BuiltBlock};
