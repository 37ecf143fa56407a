//! Typed contract events
//!
//! Each event is located in a receipt by its signature topic and decoded from
//! the log data against its non-indexed parameter types. Only [`Approval`] has
//! indexed arguments.

use ethereum_types::{Address, H256, U256};

use crate::abi::{event_topic, parameter_types, Decoder};
use crate::chain::{Log, TransactionReceipt};
use crate::error::{Error, Result};

/// An event that can be extracted from a transaction receipt.
pub trait ContractEvent: Sized {
    /// Canonical event signature
    const SIGNATURE: &'static str;

    fn topic() -> H256 {
        event_topic(Self::SIGNATURE)
    }

    /// Tuple type of the log data. All parameters unless some are indexed.
    fn data_types() -> &'static str {
        parameter_types(Self::SIGNATURE)
    }

    fn decode(log: &Log) -> Result<Self>;
}

/// Decodes the first log of `receipt` carrying `E`'s topic.
///
/// # Returns
///
/// * `Ok(Some(E))` - Event found and decoded
/// * `Ok(None)` - No log with the event topic
/// * `Err(Error::Abi)` - Event found but its data is malformed
pub fn find_event<E: ContractEvent>(receipt: &TransactionReceipt) -> Result<Option<E>> {
    let topic = E::topic();
    receipt
        .logs
        .iter()
        .find(|log| log.topics.first() == Some(&topic))
        .map(E::decode)
        .transpose()
}

fn data_decoder<E: ContractEvent>(log: &Log) -> Result<Decoder> {
    Decoder::new(E::data_types(), &log.data_bytes()?)
}

fn indexed_address(log: &Log, index: usize) -> Result<Address> {
    log.topics
        .get(index)
        .map(|topic| Address::from_slice(&topic.as_bytes()[12..]))
        .ok_or_else(|| Error::Abi(format!("missing indexed topic {}", index)))
}

// ============================================================================
// TOKEN
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Approval {
    pub owner: Address,
    pub spender: Address,
    pub value: U256,
}

impl ContractEvent for Approval {
    const SIGNATURE: &'static str = "Approval(address,address,uint256)";

    fn data_types() -> &'static str {
        "(uint256)"
    }

    fn decode(log: &Log) -> Result<Self> {
        Ok(Self {
            owner: indexed_address(log, 1)?,
            spender: indexed_address(log, 2)?,
            value: data_decoder::<Self>(log)?.uint(0)?,
        })
    }
}

// ============================================================================
// LEDGER
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Deposited {
    pub account: Address,
    pub deposited_token: U256,
    pub deposited_value: U256,
    pub balance_token: U256,
}

impl ContractEvent for Deposited {
    const SIGNATURE: &'static str = "Deposited(address,uint256,uint256,uint256)";

    fn decode(log: &Log) -> Result<Self> {
        let d = data_decoder::<Self>(log)?;
        Ok(Self {
            account: d.address(0)?,
            deposited_token: d.uint(1)?,
            deposited_value: d.uint(2)?,
            balance_token: d.uint(3)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Withdrawn {
    pub account: Address,
    pub withdrawn_token: U256,
    pub withdrawn_value: U256,
    pub balance_token: U256,
}

impl ContractEvent for Withdrawn {
    const SIGNATURE: &'static str = "Withdrawn(address,uint256,uint256,uint256)";

    fn decode(log: &Log) -> Result<Self> {
        let d = data_decoder::<Self>(log)?;
        Ok(Self {
            account: d.address(0)?,
            withdrawn_token: d.uint(1)?,
            withdrawn_value: d.uint(2)?,
            balance_token: d.uint(3)?,
        })
    }
}

// ============================================================================
// CONSUMER
// ============================================================================

/// Fields shared by `PaidPoint` and `PaidToken`.
///
/// `paid` and `fee` are in ledger units (point or token), `paid_value` and
/// `fee_value` in the purchase currency.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Payment {
    pub payment_id: H256,
    pub purchase_id: String,
    pub currency: String,
    pub paid: U256,
    pub paid_value: U256,
    pub fee: U256,
    pub fee_value: U256,
    pub balance: U256,
    pub shop_id: H256,
    pub account: Address,
}

impl Payment {
    fn decode<E: ContractEvent>(log: &Log) -> Result<Self> {
        let d = data_decoder::<E>(log)?;
        Ok(Self {
            payment_id: d.bytes32(0)?,
            purchase_id: d.string(1)?,
            currency: d.string(2)?,
            paid: d.uint(3)?,
            paid_value: d.uint(4)?,
            fee: d.uint(5)?,
            fee_value: d.uint(6)?,
            balance: d.uint(7)?,
            shop_id: d.bytes32(8)?,
            account: d.address(9)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaidPoint(pub Payment);

impl ContractEvent for PaidPoint {
    const SIGNATURE: &'static str =
        "PaidPoint(bytes32,string,string,uint256,uint256,uint256,uint256,uint256,bytes32,address)";

    fn decode(log: &Log) -> Result<Self> {
        Payment::decode::<Self>(log).map(PaidPoint)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaidToken(pub Payment);

impl ContractEvent for PaidToken {
    const SIGNATURE: &'static str =
        "PaidToken(bytes32,string,string,uint256,uint256,uint256,uint256,uint256,bytes32,address)";

    fn decode(log: &Log) -> Result<Self> {
        Payment::decode::<Self>(log).map(PaidToken)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanceledPayment {
    pub payment_id: H256,
    pub purchase_id: String,
    pub shop_id: H256,
    pub account: Address,
}

impl ContractEvent for CanceledPayment {
    const SIGNATURE: &'static str = "CanceledPayment(bytes32,string,bytes32,address)";

    fn decode(log: &Log) -> Result<Self> {
        let d = data_decoder::<Self>(log)?;
        Ok(Self {
            payment_id: d.bytes32(0)?,
            purchase_id: d.string(1)?,
            shop_id: d.bytes32(2)?,
            account: d.address(3)?,
        })
    }
}

// ============================================================================
// EXCHANGER / TRANSFER
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangedRoyaltyType {
    pub account: Address,
    pub royalty_type: u8,
}

impl ContractEvent for ChangedRoyaltyType {
    const SIGNATURE: &'static str = "ChangedRoyaltyType(address,uint8)";

    fn decode(log: &Log) -> Result<Self> {
        let d = data_decoder::<Self>(log)?;
        Ok(Self {
            account: d.address(0)?,
            royalty_type: d.uint8(1)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangedToPayablePoint {
    pub phone_hash: H256,
    pub account: Address,
    pub changed_point: U256,
    pub changed_value: U256,
    pub balance: U256,
}

impl ContractEvent for ChangedToPayablePoint {
    const SIGNATURE: &'static str = "ChangedToPayablePoint(bytes32,address,uint256,uint256,uint256)";

    fn decode(log: &Log) -> Result<Self> {
        let d = data_decoder::<Self>(log)?;
        Ok(Self {
            phone_hash: d.bytes32(0)?,
            account: d.address(1)?,
            changed_point: d.uint(2)?,
            changed_value: d.uint(3)?,
            balance: d.uint(4)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferredLoyaltyToken {
    pub from: Address,
    pub to: Address,
    pub amount: U256,
    pub fee: U256,
    pub balance_of_from: U256,
    pub balance_of_to: U256,
}

impl ContractEvent for TransferredLoyaltyToken {
    const SIGNATURE: &'static str =
        "TransferredLoyaltyToken(address,address,uint256,uint256,uint256,uint256)";

    fn decode(log: &Log) -> Result<Self> {
        let d = data_decoder::<Self>(log)?;
        Ok(Self {
            from: d.address(0)?,
            to: d.address(1)?,
            amount: d.uint(2)?,
            fee: d.uint(3)?,
            balance_of_from: d.uint(4)?,
            balance_of_to: d.uint(5)?,
        })
    }
}

// ============================================================================
// SHOP
// ============================================================================

/// Payload of `AddedShop` and `UpdatedShop`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShopData {
    pub shop_id: H256,
    pub name: String,
    pub currency: String,
    pub account: Address,
}

impl ShopData {
    fn decode<E: ContractEvent>(log: &Log) -> Result<Self> {
        let d = data_decoder::<E>(log)?;
        Ok(Self {
            shop_id: d.bytes32(0)?,
            name: d.string(1)?,
            currency: d.string(2)?,
            account: d.address(3)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddedShop(pub ShopData);

impl ContractEvent for AddedShop {
    const SIGNATURE: &'static str = "AddedShop(bytes32,string,string,address)";

    fn decode(log: &Log) -> Result<Self> {
        ShopData::decode::<Self>(log).map(AddedShop)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdatedShop(pub ShopData);

impl ContractEvent for UpdatedShop {
    const SIGNATURE: &'static str = "UpdatedShop(bytes32,string,string,address)";

    fn decode(log: &Log) -> Result<Self> {
        ShopData::decode::<Self>(log).map(UpdatedShop)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemovedShop {
    pub shop_id: H256,
}

impl ContractEvent for RemovedShop {
    const SIGNATURE: &'static str = "RemovedShop(bytes32)";

    fn decode(log: &Log) -> Result<Self> {
        Ok(Self {
            shop_id: data_decoder::<Self>(log)?.bytes32(0)?,
        })
    }
}

/// Payload of `OpenedWithdrawal` and `ClosedWithdrawal`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WithdrawalData {
    pub shop_id: H256,
    pub amount: U256,
    pub account: Address,
}

impl WithdrawalData {
    fn decode<E: ContractEvent>(log: &Log) -> Result<Self> {
        let d = data_decoder::<E>(log)?;
        Ok(Self {
            shop_id: d.bytes32(0)?,
            amount: d.uint(1)?,
            account: d.address(2)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenedWithdrawal(pub WithdrawalData);

impl ContractEvent for OpenedWithdrawal {
    const SIGNATURE: &'static str = "OpenedWithdrawal(bytes32,uint256,address)";

    fn decode(log: &Log) -> Result<Self> {
        WithdrawalData::decode::<Self>(log).map(OpenedWithdrawal)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClosedWithdrawal(pub WithdrawalData);

impl ContractEvent for ClosedWithdrawal {
    const SIGNATURE: &'static str = "ClosedWithdrawal(bytes32,uint256,address)";

    fn decode(log: &Log) -> Result<Self> {
        WithdrawalData::decode::<Self>(log).map(ClosedWithdrawal)
    }
}

// ============================================================================
// BRIDGE
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeDeposited {
    pub token_id: H256,
    pub deposit_id: H256,
    pub account: Address,
    pub amount: U256,
    pub balance: U256,
}

impl ContractEvent for BridgeDeposited {
    const SIGNATURE: &'static str = "BridgeDeposited(bytes32,bytes32,address,uint256,uint256)";

    fn decode(log: &Log) -> Result<Self> {
        let d = data_decoder::<Self>(log)?;
        Ok(Self {
            token_id: d.bytes32(0)?,
            deposit_id: d.bytes32(1)?,
            account: d.address(2)?,
            amount: d.uint(3)?,
            balance: d.uint(4)?,
        })
    }
}
