//! Authorization Message Codec
//!
//! Every signed action has a fixed field schema that the on-chain verifier
//! re-encodes with `abi.encode`, so field types and order here must not drift
//! from the deployed contracts. Each schema ends with the signer's nonce and
//! the chain id.
//!
//! Identifiers that embed randomness (shop, payment, phone-link request and
//! bridge deposit ids) take a 32-byte salt drawn from the OS RNG.

use ethereum_types::{Address, H256, U256};
use rand::rngs::OsRng;
use rand::RngCore;

use super::{keccak256, verify_message, Signature, Signer};
use crate::abi::{encode, Token};
use crate::error::Result;
use crate::types::RoyaltyType;

/// Domain string mixed into phone number hashes.
pub const PHONE_HASH_DOMAIN: &str = "PhoneLinkCollection";

// ============================================================================
// SIGNABLE MESSAGE
// ============================================================================

/// An off-chain authorization with a deterministic byte encoding.
pub trait SignableMessage {
    /// Deterministic, order-sensitive encoding of the message fields.
    fn encode(&self) -> Vec<u8>;

    /// Signs the encoded message.
    fn sign(&self, signer: &Signer) -> Result<Signature> {
        signer.sign_message(&self.encode())
    }

    /// Returns true iff `signature` was produced by `address` over exactly
    /// these fields. Never fails: malformed signatures yield `false`.
    fn verify(&self, address: &Address, signature: &[u8]) -> bool {
        verify_message(address, &self.encode(), signature)
    }
}

fn chain_token(chain_id: u64) -> Token {
    Token::Uint(U256::from(chain_id))
}

// ============================================================================
// MESSAGE SCHEMAS
// ============================================================================

/// Authorization for a new payment (point or token).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentMessage {
    pub payment_id: H256,
    pub purchase_id: String,
    pub amount: U256,
    pub currency: String,
    pub shop_id: H256,
    pub account: Address,
    pub nonce: U256,
    pub chain_id: u64,
}

impl SignableMessage for PaymentMessage {
    fn encode(&self) -> Vec<u8> {
        encode(&[
            Token::FixedBytes(self.payment_id),
            Token::String(self.purchase_id.clone()),
            Token::Uint(self.amount),
            Token::String(self.currency.clone()),
            Token::FixedBytes(self.shop_id),
            Token::Address(self.account),
            Token::Uint(self.nonce),
            chain_token(self.chain_id),
        ])
    }
}

/// Authorization to cancel a previous payment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentCancelMessage {
    pub payment_id: H256,
    pub purchase_id: String,
    pub shop_id: H256,
    pub account: Address,
    pub nonce: U256,
    pub chain_id: u64,
}

impl SignableMessage for PaymentCancelMessage {
    fn encode(&self) -> Vec<u8> {
        encode(&[
            Token::FixedBytes(self.payment_id),
            Token::String(self.purchase_id.clone()),
            Token::FixedBytes(self.shop_id),
            Token::Address(self.account),
            Token::Uint(self.nonce),
            chain_token(self.chain_id),
        ])
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoyaltyTypeMessage {
    pub royalty_type: RoyaltyType,
    pub account: Address,
    pub nonce: U256,
    pub chain_id: u64,
}

impl SignableMessage for RoyaltyTypeMessage {
    fn encode(&self) -> Vec<u8> {
        encode(&[
            Token::Uint(U256::from(self.royalty_type.as_u8())),
            Token::Address(self.account),
            Token::Uint(self.nonce),
            chain_token(self.chain_id),
        ])
    }
}

/// Authorization to move points earned under a phone number to the linked address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PayablePointMessage {
    pub phone_hash: H256,
    pub account: Address,
    pub nonce: U256,
    pub chain_id: u64,
}

impl SignableMessage for PayablePointMessage {
    fn encode(&self) -> Vec<u8> {
        encode(&[
            Token::FixedBytes(self.phone_hash),
            Token::Address(self.account),
            Token::Uint(self.nonce),
            chain_token(self.chain_id),
        ])
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhoneLinkRequestMessage {
    pub request_id: H256,
    pub phone_hash: H256,
    pub account: Address,
    pub nonce: U256,
    pub chain_id: u64,
}

impl SignableMessage for PhoneLinkRequestMessage {
    fn encode(&self) -> Vec<u8> {
        encode(&[
            Token::FixedBytes(self.request_id),
            Token::FixedBytes(self.phone_hash),
            Token::Address(self.account),
            Token::Uint(self.nonce),
            chain_token(self.chain_id),
        ])
    }
}

/// The mutation a [`ShopMessage`] authorizes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShopAction {
    Add { name: String, currency: String },
    Update { name: String, currency: String },
    Remove,
    OpenWithdrawal { amount: U256 },
    CloseWithdrawal,
}

impl ShopAction {
    fn tokens(&self) -> Vec<Token> {
        match self {
            ShopAction::Add { name, currency } | ShopAction::Update { name, currency } => {
                vec![Token::String(name.clone()), Token::String(currency.clone())]
            }
            ShopAction::OpenWithdrawal { amount } => vec![Token::Uint(*amount)],
            ShopAction::Remove | ShopAction::CloseWithdrawal => Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShopMessage {
    pub shop_id: H256,
    pub action: ShopAction,
    pub account: Address,
    pub nonce: U256,
    pub chain_id: u64,
}

impl SignableMessage for ShopMessage {
    fn encode(&self) -> Vec<u8> {
        let mut tokens = vec![Token::FixedBytes(self.shop_id)];
        tokens.extend(self.action.tokens());
        tokens.push(Token::Address(self.account));
        tokens.push(Token::Uint(self.nonce));
        tokens.push(chain_token(self.chain_id));
        encode(&tokens)
    }
}

/// Authorization for a bridge to pull `amount` from `from`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeTransferMessage {
    pub token_id: H256,
    pub from: Address,
    pub to: Address,
    pub amount: U256,
    pub nonce: U256,
    pub expiry: U256,
    pub chain_id: u64,
}

impl SignableMessage for BridgeTransferMessage {
    fn encode(&self) -> Vec<u8> {
        encode(&[
            Token::FixedBytes(self.token_id),
            Token::Address(self.from),
            Token::Address(self.to),
            Token::Uint(self.amount),
            Token::Uint(self.nonce),
            Token::Uint(self.expiry),
            chain_token(self.chain_id),
        ])
    }
}

/// Authorization to transfer ledger tokens between two users.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferMessage {
    pub from: Address,
    pub to: Address,
    pub amount: U256,
    pub nonce: U256,
    pub chain_id: u64,
}

impl SignableMessage for TransferMessage {
    fn encode(&self) -> Vec<u8> {
        encode(&[
            Token::Address(self.from),
            Token::Address(self.to),
            Token::Uint(self.amount),
            Token::Uint(self.nonce),
            chain_token(self.chain_id),
        ])
    }
}

// ============================================================================
// IDENTIFIER DERIVATION
// ============================================================================

/// Draws a 32-byte salt from the OS RNG.
pub fn random_salt() -> H256 {
    let mut salt = [0u8; 32];
    OsRng.fill_bytes(&mut salt);
    H256::from(salt)
}

fn hash_tokens(tokens: &[Token]) -> H256 {
    H256::from(keccak256(&encode(tokens)))
}

pub fn shop_id(account: Address, salt: H256) -> H256 {
    hash_tokens(&[Token::Address(account), Token::FixedBytes(salt)])
}

pub fn payment_id(account: Address, purchase_id: &str, salt: H256) -> H256 {
    hash_tokens(&[
        Token::Address(account),
        Token::String(purchase_id.to_string()),
        Token::FixedBytes(salt),
    ])
}

pub fn phone_link_request_id(phone_hash: H256, account: Address, nonce: U256, salt: H256) -> H256 {
    hash_tokens(&[
        Token::FixedBytes(phone_hash),
        Token::Address(account),
        Token::Uint(nonce),
        Token::FixedBytes(salt),
    ])
}

pub fn bridge_deposit_id(account: Address, nonce: U256, salt: H256) -> H256 {
    hash_tokens(&[Token::Address(account), Token::Uint(nonce), Token::FixedBytes(salt)])
}

/// Hash under which a phone number is stored on-chain.
pub fn phone_hash(phone: &str) -> H256 {
    hash_tokens(&[
        Token::String(PHONE_HASH_DOMAIN.to_string()),
        Token::String(phone.to_string()),
    ])
}

/// Bridge token identifier of an ERC20 token contract.
pub fn token_id(token: Address) -> H256 {
    hash_tokens(&[Token::Address(token)])
}
