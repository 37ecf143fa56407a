//! Contract ABI tables
//!
//! Canonical function and event signatures of the deployed loyalty contracts.
//! [`crate::chain::Contract`] only accepts functions listed here.

pub mod events;

use crate::error::{Error, Result};
use events::ContractEvent;

/// Static ABI description of one contract.
#[derive(Debug)]
pub struct ContractAbi {
    pub name: &'static str,
    /// Canonical signatures, e.g. `"approve(address,uint256)"`
    pub functions: &'static [&'static str],
    pub events: &'static [&'static str],
}

impl ContractAbi {
    /// Resolves a function name (or full signature) to its canonical signature.
    pub fn function(&self, name: &str) -> Result<&'static str> {
        if self.functions.is_empty() {
            return Err(Error::EmptyAbi);
        }
        self.functions
            .iter()
            .copied()
            .find(|signature| {
                *signature == name
                    || signature
                        .strip_prefix(name)
                        .map_or(false, |rest| rest.starts_with('('))
            })
            .ok_or_else(|| Error::UnknownFunction {
                contract: self.name,
                function: name.to_string(),
            })
    }
}

pub static LEDGER: ContractAbi = ContractAbi {
    name: "Ledger",
    functions: &[
        "pointBalanceOf(address)",
        "tokenBalanceOf(address)",
        "unPayablePointBalanceOf(bytes32)",
        "nonceOf(address)",
        "royaltyTypeOf(address)",
        "deposit(uint256)",
        "withdraw(uint256)",
    ],
    events: &[
        events::Deposited::SIGNATURE,
        events::Withdrawn::SIGNATURE,
    ],
};

pub static TOKEN: ContractAbi = ContractAbi {
    name: "LoyaltyToken",
    functions: &[
        "balanceOf(address)",
        "allowance(address,address)",
        "approve(address,uint256)",
        "nonceOf(address)",
    ],
    events: &[events::Approval::SIGNATURE],
};

pub static PHONE_LINK: ContractAbi = ContractAbi {
    name: "PhoneLinkCollection",
    functions: &[
        "toAddress(bytes32)",
        "toPhone(address)",
        "nonceOf(address)",
        "getRequestItem(bytes32)",
        "getValidators()",
        "addRequest(bytes32,bytes32,address,bytes)",
    ],
    events: &[],
};

pub static CURRENCY_RATE: ContractAbi = ContractAbi {
    name: "CurrencyRate",
    functions: &["get(string)", "convertCurrency(uint256,string,string)"],
    events: &[],
};

pub static SHOP: ContractAbi = ContractAbi {
    name: "ShopCollection",
    functions: &[
        "add(bytes32,string,string,address,bytes)",
        "update(bytes32,string,string,address,bytes)",
        "remove(bytes32,address,bytes)",
        "openWithdrawal(bytes32,uint256,address,bytes)",
        "closeWithdrawal(bytes32,address,bytes)",
        "shopOf(bytes32)",
        "nonceOf(address)",
        "isAvailableId(bytes32)",
    ],
    events: &[
        events::AddedShop::SIGNATURE,
        events::UpdatedShop::SIGNATURE,
        events::RemovedShop::SIGNATURE,
        events::OpenedWithdrawal::SIGNATURE,
        events::ClosedWithdrawal::SIGNATURE,
    ],
};

pub static LOYALTY_CONSUMER: ContractAbi = ContractAbi {
    name: "LoyaltyConsumer",
    functions: &[
        "payPoint(bytes32,string,uint256,string,bytes32,address,bytes)",
        "payToken(bytes32,string,uint256,string,bytes32,address,bytes)",
        "cancelPayment(bytes32,string,bytes32,address,bytes)",
    ],
    events: &[
        events::PaidPoint::SIGNATURE,
        events::PaidToken::SIGNATURE,
        events::CanceledPayment::SIGNATURE,
    ],
};

pub static LOYALTY_EXCHANGER: ContractAbi = ContractAbi {
    name: "LoyaltyExchanger",
    functions: &[
        "changeRoyaltyType(uint8,address,bytes)",
        "changeToPayablePoint(bytes32,address,bytes)",
    ],
    events: &[
        events::ChangedRoyaltyType::SIGNATURE,
        events::ChangedToPayablePoint::SIGNATURE,
    ],
};

pub static LOYALTY_TRANSFER: ContractAbi = ContractAbi {
    name: "LoyaltyTransfer",
    functions: &["transferToken(address,address,uint256,bytes)"],
    events: &[events::TransferredLoyaltyToken::SIGNATURE],
};

/// Shared by the token-chain bridge and the loyalty-chain bridge.
pub static BRIDGE: ContractAbi = ContractAbi {
    name: "LoyaltyBridge",
    functions: &["depositToBridge(bytes32,bytes32,address,uint256,uint256,bytes)"],
    events: &[events::BridgeDeposited::SIGNATURE],
};
