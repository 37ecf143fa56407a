//! Cryptographic Operations Module
//!
//! Keccak hashing, secp256k1 signing and signer recovery for the loyalty
//! contracts. Off-chain authorizations are signed over the Ethereum signed
//! message digest:
//!
//! `keccak256("\x19Ethereum Signed Message:\n32" || keccak256(message))`
//!
//! ## Security Requirements
//!
//! **CRITICAL**: Private keys must never be exposed or logged. [`Signer`]'s
//! `Debug` output only shows the derived address.

pub mod message;

use alloy_signer::SignerSync;
use alloy_signer_local::PrivateKeySigner;
use ethereum_types::Address;
use k256::ecdsa::{RecoveryId, Signature as EcdsaSignature, VerifyingKey};
use serde::{Serialize, Serializer};
use sha3::{Digest, Keccak256};

use crate::abi::from_alloy_address;
use crate::error::{ConfigError, Error, Result};

pub use message::SignableMessage;

const ETH_MESSAGE_PREFIX: &[u8] = b"\x19Ethereum Signed Message:\n32";

// ============================================================================
// HASHING
// ============================================================================

/// Computes keccak256 of `data`.
pub fn keccak256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Keccak256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// Computes the digest that is actually signed for an off-chain message.
pub fn hash_message(message: &[u8]) -> [u8; 32] {
    let message_hash = keccak256(message);

    let mut prefixed = Vec::with_capacity(ETH_MESSAGE_PREFIX.len() + 32);
    prefixed.extend_from_slice(ETH_MESSAGE_PREFIX);
    prefixed.extend_from_slice(&message_hash);

    keccak256(&prefixed)
}

/// Derives the Ethereum address of a public key:
/// keccak256(uncompressed_public_key[1..])[12..32]
pub fn address_of(verifying_key: &VerifyingKey) -> Address {
    let point = verifying_key.to_encoded_point(false);
    // 0x04 || x || y, skip the uncompressed point marker
    let hash = keccak256(&point.as_bytes()[1..]);
    Address::from_slice(&hash[12..])
}

// ============================================================================
// SIGNATURE
// ============================================================================

/// 65-byte recoverable signature laid out as `r || s || v`.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Signature([u8; 65]);

impl Signature {
    /// Parses a 65-byte signature. `v` may be 0/1 or 27/28.
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let bytes: [u8; 65] = bytes.try_into().map_err(|_| {
            Error::InvalidSignature(format!("expected 65 bytes, got {}", bytes.len()))
        })?;
        Ok(Self(bytes))
    }

    pub fn as_bytes(&self) -> &[u8; 65] {
        &self.0
    }

    pub fn to_vec(&self) -> Vec<u8> {
        self.0.to_vec()
    }

    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }

    pub fn v(&self) -> u8 {
        self.0[64]
    }

    fn recovery_id(&self) -> Option<RecoveryId> {
        let v = self.v();
        let byte = if v >= 27 { v - 27 } else { v };
        RecoveryId::from_byte(byte)
    }
}

impl std::fmt::Debug for Signature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Signature({})", self.to_hex())
    }
}

impl Serialize for Signature {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

// ============================================================================
// SIGNER
// ============================================================================

/// A secp256k1 key pair able to sign messages and transactions.
#[derive(Clone)]
pub struct Signer {
    key: PrivateKeySigner,
    address: Address,
}

impl Signer {
    /// Creates a signer from a hex encoded 32-byte private key.
    ///
    /// # Arguments
    ///
    /// * `private_key` - Hex string, with or without `0x` prefix
    ///
    /// # Returns
    ///
    /// * `Ok(Signer)` - Successfully parsed key
    /// * `Err(ConfigError::InvalidPrivateKey)` - Malformed or out-of-range key
    pub fn from_private_key(private_key: &str) -> std::result::Result<Self, ConfigError> {
        let stripped = private_key.trim().strip_prefix("0x").unwrap_or(private_key.trim());
        let bytes = hex::decode(stripped)
            .map_err(|e| ConfigError::InvalidPrivateKey(format!("invalid hex: {}", e)))?;

        if bytes.len() != 32 {
            return Err(ConfigError::InvalidPrivateKey(format!(
                "expected 32 bytes, got {}",
                bytes.len()
            )));
        }

        let key = PrivateKeySigner::from_slice(&bytes)
            .map_err(|e| ConfigError::InvalidPrivateKey(e.to_string()))?;
        Ok(Self::from_local(key))
    }

    /// Generates a fresh random key pair.
    pub fn random() -> Self {
        Self::from_local(PrivateKeySigner::random())
    }

    fn from_local(key: PrivateKeySigner) -> Self {
        let address = from_alloy_address(key.address());
        Self { key, address }
    }

    pub fn address(&self) -> Address {
        self.address
    }

    /// Signs an off-chain message with the Ethereum signed message prefix.
    /// The returned `v` is 27 or 28.
    pub fn sign_message(&self, message: &[u8]) -> Result<Signature> {
        // EIP-191 over the 32-byte message hash gives the `hash_message` digest
        let signature = self
            .key
            .sign_message_sync(&keccak256(message))
            .map_err(|e| Error::InvalidSignature(format!("failed to sign message: {}", e)))?;

        let mut bytes = signature.as_bytes();
        if bytes[64] < 27 {
            bytes[64] += 27;
        }
        Ok(Signature(bytes))
    }

    /// The underlying local signer, used for transaction signing.
    pub(crate) fn local(&self) -> &PrivateKeySigner {
        &self.key
    }
}

impl std::fmt::Debug for Signer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Signer")
            .field("address", &self.address)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// RECOVERY AND VERIFICATION
// ============================================================================

/// Recovers the address that signed `digest`.
pub fn recover_hash(digest: &[u8; 32], signature: &Signature) -> Result<Address> {
    let recovery_id = signature
        .recovery_id()
        .ok_or_else(|| Error::InvalidSignature(format!("invalid recovery byte {}", signature.v())))?;
    let ecdsa = EcdsaSignature::from_slice(&signature.as_bytes()[..64])
        .map_err(|e| Error::InvalidSignature(e.to_string()))?;
    let key = VerifyingKey::recover_from_prehash(digest, &ecdsa, recovery_id)
        .map_err(|e| Error::InvalidSignature(e.to_string()))?;
    Ok(address_of(&key))
}

/// Recovers the address that signed an off-chain `message`.
pub fn recover_address(message: &[u8], signature: &[u8]) -> Result<Address> {
    let signature = Signature::from_slice(signature)?;
    recover_hash(&hash_message(message), &signature)
}

/// Returns true iff `signature` over `message` was produced by `address`.
/// Malformed signatures yield `false`.
pub fn verify_message(address: &Address, message: &[u8], signature: &[u8]) -> bool {
    match recover_address(message, signature) {
        Ok(recovered) => recovered == *address,
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY_ONE: &str = "0x0000000000000000000000000000000000000000000000000000000000000001";

    #[test]
    fn test_keccak_empty_input() {
        assert_eq!(
            hex::encode(keccak256(b"")),
            "c5d2460186f7233c927e7db2dcc703c0e500b653ca82273b7bfad8045d85a470"
        );
    }

    #[test]
    fn test_address_derivation_known_key() {
        let signer = Signer::from_private_key(KEY_ONE).unwrap();
        assert_eq!(
            crate::abi::address_hex(&signer.address()),
            "0x7e5f4552091a69125d5dfcb7b8c2659029395bdf"
        );
    }

    #[test]
    fn test_sign_and_recover_message() {
        let signer = Signer::random();
        let signature = signer.sign_message(b"loyalty").unwrap();

        assert!(signature.v() == 27 || signature.v() == 28);
        assert_eq!(recover_address(b"loyalty", signature.as_bytes()).unwrap(), signer.address());
        assert!(verify_message(&signer.address(), b"loyalty", signature.as_bytes()));
        assert!(!verify_message(&signer.address(), b"loyalty!", signature.as_bytes()));
    }

    #[test]
    fn test_verify_accepts_raw_recovery_byte() {
        let signer = Signer::random();
        let mut bytes = signer.sign_message(b"msg").unwrap().to_vec();
        bytes[64] -= 27;
        assert!(verify_message(&signer.address(), b"msg", &bytes));
    }

    #[test]
    fn test_verify_malformed_signature_is_false() {
        let signer = Signer::random();
        assert!(!verify_message(&signer.address(), b"msg", &[0u8; 10]));
        assert!(!verify_message(&signer.address(), b"msg", &[0u8; 65]));

        let mut bad_v = signer.sign_message(b"msg").unwrap().to_vec();
        bad_v[64] = 99;
        assert!(!verify_message(&signer.address(), b"msg", &bad_v));
    }

    #[test]
    fn test_invalid_private_keys() {
        assert!(Signer::from_private_key("0x1234").is_err());
        assert!(Signer::from_private_key("not-hex").is_err());
        assert!(Signer::from_private_key(
            "0x0000000000000000000000000000000000000000000000000000000000000000"
        )
        .is_err());
    }

    #[test]
    fn test_signer_debug_hides_key() {
        let signer = Signer::from_private_key(KEY_ONE).unwrap();
        let debug = format!("{:?}", signer);
        assert!(debug.contains("address"));
        assert!(!debug.contains("0000000000000000000000000000000000000000000000000000000000000001"));
    }
}
