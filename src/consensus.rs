/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The [`ConsensusSeal`] trait, which specifies the required interface for the pluggable
//! consensus validator.
//!
//! The chain invokes — but does not implement — consensus: sealing a header happens once per
//! built block, and header validation once per linked block. An authority-style
//! implementation signs the header's [seal payload](crate::types::block::BlockHeader::seal_payload)
//! with its keypair; a development chain can seal instantly with its coinbase key.

use std::fmt::{self, Display, Formatter};

use crate::types::basic::SignatureBytes;
use crate::types::block::BlockHeader;

pub trait ConsensusSeal: Send + 'static {
    /// Check `header` for consensus validity against its parent.
    fn validate(&self, header: &BlockHeader, parent: &BlockHeader) -> Result<(), SealError>;

    /// Produce the seal for `header`.
    fn seal(&self, header: &BlockHeader) -> Result<SignatureBytes, SealError>;
}

#[derive(Debug)]
pub enum SealError {
    /// The header does not follow from its parent under the consensus rules.
    InvalidHeader { detail: String },

    /// The seal could not be produced.
    SealingFailed { detail: String },
}

impl Display for SealError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            SealError::InvalidHeader { detail } => write!(f, "invalid header: {}", detail),
            SealError::SealingFailed { detail } => write!(f, "sealing failed: {}", detail),
        }
    }
}
