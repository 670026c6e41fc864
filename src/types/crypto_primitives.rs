/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Cryptographic primitives used throughout the crate: the SHA256 hasher, Ed25519 keys, and a
//! thin [`Keypair`] wrapper for signing.

use ed25519_dalek::{Signature, Signer, SigningKey, Verifier};
pub use ed25519_dalek::{SignatureError, VerifyingKey};
pub use sha2::Sha256 as CryptoHasher;
use sha2::Digest;

use crate::types::basic::{Address, CryptoHash, SignatureBytes};

/// Compute the SHA256 digest of `bytes` as a [`CryptoHash`].
pub fn sha256(bytes: &[u8]) -> CryptoHash {
    let mut hasher = CryptoHasher::new();
    hasher.update(bytes);
    CryptoHash::new(hasher.finalize().into())
}

/// A signing key together with the address it controls.
#[derive(Clone)]
pub struct Keypair(SigningKey);

impl Keypair {
    pub fn new(signing_key: SigningKey) -> Keypair {
        Keypair(signing_key)
    }

    /// The address controlled by this keypair: the bytes of its verifying key.
    pub fn address(&self) -> Address {
        Address::new(self.0.verifying_key().to_bytes())
    }

    pub fn sign(&self, message: &[u8]) -> SignatureBytes {
        SignatureBytes::new(self.0.sign(message).to_bytes())
    }
}

/// Verify `signature` over `message` against the verifying key stored in `signer`.
pub fn verify_signature(
    signer: &Address,
    message: &[u8],
    signature: &SignatureBytes,
) -> Result<(), SignatureError> {
    let verifying_key = VerifyingKey::from_bytes(&signer.bytes())?;
    verifying_key.verify(message, &Signature::from_bytes(&signature.bytes()))
}
