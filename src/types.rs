//! Domain types shared by the codec, the contract bindings and the workflows.

use ethereum_types::{Address, H256, U256};
use serde::{Deserialize, Serialize};

/// How a user receives loyalty rewards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoyaltyType {
    Point = 0,
    Token = 1,
}

impl RoyaltyType {
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(RoyaltyType::Point),
            1 => Some(RoyaltyType::Token),
            _ => None,
        }
    }
}

/// Status of a phone-link registration request, advanced by the validators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RequestStatus {
    /// Not yet recorded (pending from the SDK's point of view)
    Invalid = 0,
    Requested = 1,
    Accepted = 2,
    Rejected = 3,
}

impl RequestStatus {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(RequestStatus::Invalid),
            1 => Some(RequestStatus::Requested),
            2 => Some(RequestStatus::Accepted),
            3 => Some(RequestStatus::Rejected),
            _ => None,
        }
    }
}

/// A phone-link registration request as stored by the phone-link contract.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhoneLinkRequest {
    pub request_id: H256,
    pub phone_hash: H256,
    pub account: Address,
    pub signature: Vec<u8>,
    pub status: RequestStatus,
}

/// A validator registered in the phone-link contract.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatorInfo {
    pub address: Address,
    pub index: U256,
    pub endpoint: String,
    pub status: u8,
}

impl ValidatorInfo {
    pub const ACTIVE: u8 = 1;

    pub fn is_active(&self) -> bool {
        self.status == Self::ACTIVE
    }
}

/// Shop registration state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShopStatus {
    Invalid = 0,
    Active = 1,
    Inactive = 2,
}

impl ShopStatus {
    pub fn from_u8(value: u8) -> Self {
        match value {
            1 => ShopStatus::Active,
            2 => ShopStatus::Inactive,
            _ => ShopStatus::Invalid,
        }
    }
}

/// Shop record returned by the shop collection contract.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShopInfo {
    pub shop_id: H256,
    pub name: String,
    pub currency: String,
    pub account: Address,
    pub provided_amount: U256,
    pub used_amount: U256,
    pub withdrawable_amount: U256,
    pub status: ShopStatus,
    pub withdrawal_open: bool,
}

/// Which ledger balance a payment is drawn from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentMethod {
    Point,
    Token,
}

impl PaymentMethod {
    /// Currency symbol understood by the currency-rate contract.
    pub fn symbol(self) -> &'static str {
        match self {
            PaymentMethod::Point => "point",
            PaymentMethod::Token => "token",
        }
    }
}
