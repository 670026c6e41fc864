/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Definitions for the three transaction kinds accepted by the chain, and the capability
//! surface shared between them.
//!
//! A [`Transaction`] is a tagged union over the [legacy](LegacyTransaction) (flat gas price),
//! [access list](AccessListTransaction) (flat gas price plus a declared access list) and
//! [fee market](FeeMarketTransaction) (base-fee-relative pricing) kinds. Code that handles
//! transactions dispatches by matching on the tag; there is no trait object involved.
//!
//! A transaction is signed over its [signing payload](Transaction::signing_payload), which is
//! the Borsh encoding of the transaction with the signature field unset. The transaction
//! [hash](Transaction::hash) covers the signature too, so two identically-parameterized
//! transactions signed by different keys have distinct hashes.

use borsh::{BorshDeserialize, BorshSerialize};

use crate::types::basic::{Address, CryptoHash, Gas, Nonce, SignatureBytes, Wei};
use crate::types::crypto_primitives::{sha256, verify_signature, Keypair, SignatureError};

/// Gas charged for any transaction before a single byte of payload is considered.
pub const TX_BASE_GAS: u64 = 21_000;
/// Gas charged per zero byte of payload.
pub const TX_DATA_ZERO_GAS: u64 = 4;
/// Gas charged per non-zero byte of payload.
pub const TX_DATA_NONZERO_GAS: u64 = 16;
/// Gas charged per address declared in an access list.
pub const ACCESS_LIST_ADDRESS_GAS: u64 = 2_400;
/// Gas charged per storage key declared in an access list.
pub const ACCESS_LIST_STORAGE_KEY_GAS: u64 = 1_900;

/// One entry of an [access list](AccessListTransaction): an address and the storage keys the
/// transaction announces it will touch under that address.
#[derive(Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct AccessItem {
    pub address: Address,
    pub storage_keys: Vec<CryptoHash>,
}

/// A transaction priced with a flat gas price.
#[derive(Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct LegacyTransaction {
    pub sender: Address,
    pub nonce: Nonce,
    pub gas_limit: Gas,
    pub gas_price: Wei,
    pub to: Option<Address>,
    pub value: Wei,
    pub payload: Vec<u8>,
    pub signature: Option<SignatureBytes>,
}

/// A flat-priced transaction that additionally declares the state it will touch.
#[derive(Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct AccessListTransaction {
    pub sender: Address,
    pub nonce: Nonce,
    pub gas_limit: Gas,
    pub gas_price: Wei,
    pub to: Option<Address>,
    pub value: Wei,
    pub payload: Vec<u8>,
    pub access_list: Vec<AccessItem>,
    pub signature: Option<SignatureBytes>,
}

/// A transaction priced relative to the block base fee: it pays
/// `min(max_fee_per_gas, base_fee + max_priority_fee_per_gas)` per unit of gas.
#[derive(Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct FeeMarketTransaction {
    pub sender: Address,
    pub nonce: Nonce,
    pub gas_limit: Gas,
    pub max_fee_per_gas: Wei,
    pub max_priority_fee_per_gas: Wei,
    pub to: Option<Address>,
    pub value: Wei,
    pub payload: Vec<u8>,
    pub signature: Option<SignatureBytes>,
}

/// The tagged union over the three transaction kinds.
#[derive(Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub enum Transaction {
    Legacy(LegacyTransaction),
    AccessList(AccessListTransaction),
    FeeMarket(FeeMarketTransaction),
}

impl Transaction {
    pub fn sender(&self) -> Address {
        match self {
            Transaction::Legacy(tx) => tx.sender,
            Transaction::AccessList(tx) => tx.sender,
            Transaction::FeeMarket(tx) => tx.sender,
        }
    }

    pub fn nonce(&self) -> Nonce {
        match self {
            Transaction::Legacy(tx) => tx.nonce,
            Transaction::AccessList(tx) => tx.nonce,
            Transaction::FeeMarket(tx) => tx.nonce,
        }
    }

    pub fn gas_limit(&self) -> Gas {
        match self {
            Transaction::Legacy(tx) => tx.gas_limit,
            Transaction::AccessList(tx) => tx.gas_limit,
            Transaction::FeeMarket(tx) => tx.gas_limit,
        }
    }

    pub fn to(&self) -> Option<Address> {
        match self {
            Transaction::Legacy(tx) => tx.to,
            Transaction::AccessList(tx) => tx.to,
            Transaction::FeeMarket(tx) => tx.to,
        }
    }

    pub fn value(&self) -> Wei {
        match self {
            Transaction::Legacy(tx) => tx.value,
            Transaction::AccessList(tx) => tx.value,
            Transaction::FeeMarket(tx) => tx.value,
        }
    }

    pub fn payload(&self) -> &[u8] {
        match self {
            Transaction::Legacy(tx) => &tx.payload,
            Transaction::AccessList(tx) => &tx.payload,
            Transaction::FeeMarket(tx) => &tx.payload,
        }
    }

    pub fn signature(&self) -> Option<SignatureBytes> {
        match self {
            Transaction::Legacy(tx) => tx.signature,
            Transaction::AccessList(tx) => tx.signature,
            Transaction::FeeMarket(tx) => tx.signature,
        }
    }

    /// The per-unit-of-gas amount this transaction actually pays given `base_fee`.
    ///
    /// Flat-priced kinds pay their declared gas price regardless of the base fee. Fee market
    /// transactions pay the base fee plus their priority fee, capped by their max fee.
    pub fn effective_gas_price(&self, base_fee: Wei) -> Wei {
        match self {
            Transaction::Legacy(tx) => tx.gas_price,
            Transaction::AccessList(tx) => tx.gas_price,
            Transaction::FeeMarket(tx) => {
                let uncapped = base_fee + tx.max_priority_fee_per_gas;
                if uncapped < tx.max_fee_per_gas {
                    uncapped
                } else {
                    tx.max_fee_per_gas
                }
            }
        }
    }

    /// The largest per-unit-of-gas amount this transaction could ever pay, regardless of the
    /// base fee. Used for balance validation.
    pub fn max_gas_price(&self) -> Wei {
        match self {
            Transaction::Legacy(tx) => tx.gas_price,
            Transaction::AccessList(tx) => tx.gas_price,
            Transaction::FeeMarket(tx) => tx.max_fee_per_gas,
        }
    }

    /// `value + gas_limit × max_gas_price`: the balance the sender must hold for this
    /// transaction to be admitted.
    pub fn max_cost(&self) -> Wei {
        self.value() + self.max_gas_price().saturating_mul_gas(self.gas_limit())
    }

    /// Gas consumed by this transaction before the executor runs a single step: the base
    /// charge, the payload byte charges, and (for access list transactions) the declared
    /// access charges.
    pub fn intrinsic_gas(&self) -> Gas {
        let mut gas = TX_BASE_GAS;
        for byte in self.payload() {
            gas += if *byte == 0 {
                TX_DATA_ZERO_GAS
            } else {
                TX_DATA_NONZERO_GAS
            };
        }
        if let Transaction::AccessList(tx) = self {
            for item in &tx.access_list {
                gas += ACCESS_LIST_ADDRESS_GAS;
                gas += ACCESS_LIST_STORAGE_KEY_GAS * item.storage_keys.len() as u64;
            }
        }
        Gas::new(gas)
    }

    /// The bytes this transaction is signed over: its Borsh encoding with the signature field
    /// unset.
    pub fn signing_payload(&self) -> Vec<u8> {
        let mut unsigned = self.clone();
        unsigned.set_signature(None);
        unsigned.try_to_vec().unwrap()
    }

    /// Sign this transaction with `keypair`, setting both the sender (to the keypair's
    /// address) and the signature.
    pub fn sign(&mut self, keypair: &Keypair) {
        self.set_sender(keypair.address());
        let signature = keypair.sign(&self.signing_payload());
        self.set_signature(Some(signature));
    }

    /// Check that the embedded signature verifies against the embedded sender key.
    pub fn verify_signature(&self) -> Result<(), SignatureError> {
        let signature = self
            .signature()
            .ok_or_else(|| SignatureError::from_source("transaction is unsigned"))?;
        verify_signature(&self.sender(), &self.signing_payload(), &signature)
    }

    /// The transaction hash: the SHA256 digest of the full Borsh encoding, signature
    /// included.
    pub fn hash(&self) -> CryptoHash {
        sha256(&self.try_to_vec().unwrap())
    }

    fn set_sender(&mut self, sender: Address) {
        match self {
            Transaction::Legacy(tx) => tx.sender = sender,
            Transaction::AccessList(tx) => tx.sender = sender,
            Transaction::FeeMarket(tx) => tx.sender = sender,
        }
    }

    fn set_signature(&mut self, signature: Option<SignatureBytes>) {
        match self {
            Transaction::Legacy(tx) => tx.signature = signature,
            Transaction::AccessList(tx) => tx.signature = signature,
            Transaction::FeeMarket(tx) => tx.signature = signature,
        }
    }
}
