//! Bridge transfers between the token chain and the loyalty ledger.
//!
//! Both directions sign a [`BridgeTransferMessage`] and call
//! `depositToBridge` on a bridge contract. Deposits go through the token
//! chain bridge (`bridgeAddress`) and draw on the ERC20 balance; withdrawals
//! go through the loyalty bridge and draw on the ledger token balance.

use chrono::Utc;
use ethereum_types::{Address, H256, U256};
use tracing::info;

use super::{
    begin, confirm, drive, ensure_amount, ensure_id, ensure_positive, sign, Flow, SignedStage, StepCode,
    Workflow, WorkflowStep,
};
use crate::abi::Token;
use crate::client::LoyaltyClient;
use crate::contracts::events::BridgeDeposited;
use crate::contracts::BRIDGE;
use crate::crypto::message::{bridge_deposit_id, random_salt, token_id, BridgeTransferMessage};
use crate::crypto::Signature;
use crate::error::{Action, ConfigError, Error, Result};

/// Seconds a bridge authorization stays valid.
const EXPIRY_SECONDS: i64 = 1800;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BridgeStep {
    Prepared {
        token_id: H256,
        deposit_id: H256,
        account: Address,
        amount: U256,
        expiry: U256,
        nonce: U256,
        signature: Signature,
    },
    Sent {
        tx_hash: H256,
        deposit_id: H256,
    },
    Done {
        token_id: H256,
        deposit_id: H256,
        account: Address,
        amount: U256,
        balance: U256,
    },
}

impl WorkflowStep for BridgeStep {
    fn code(&self) -> StepCode {
        match self {
            BridgeStep::Prepared { .. } => StepCode::Prepared,
            BridgeStep::Sent { .. } => StepCode::Sent,
            BridgeStep::Done { .. } => StepCode::Done,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    /// Token chain to ledger
    Deposit,
    /// Ledger to token chain
    Withdraw,
}

struct Signed {
    token_id: H256,
    account: Address,
    expiry: U256,
    signature: Signature,
}

struct BridgeFlow<'a> {
    client: &'a LoyaltyClient,
    direction: Direction,
    amount: U256,
    deposit_id: H256,
    stage: SignedStage<Signed>,
}

impl BridgeFlow<'_> {
    fn bridge(&self) -> Result<Address> {
        let addresses = self.client.context().addresses();
        match self.direction {
            Direction::Deposit => addresses
                .bridge
                .ok_or(Error::Config(ConfigError::MissingField("bridgeAddress"))),
            Direction::Withdraw => Ok(addresses.loyalty_bridge),
        }
    }

    async fn balance_and_nonce(&self, account: Address) -> Result<(U256, U256)> {
        match self.direction {
            Direction::Deposit => {
                let balance = self.client.token_balance_of(account).await?;
                let nonce = self.client.token_contract()?.call_uint("nonceOf", &[account.into()]).await?;
                Ok((balance, nonce))
            }
            Direction::Withdraw => {
                let balance = self.client.token_balance(account).await?;
                let nonce = self.client.ledger_nonce(account).await?;
                Ok((balance, nonce))
            }
        }
    }
}

impl Flow for BridgeFlow<'_> {
    type Step = BridgeStep;

    async fn advance(&mut self) -> Result<Option<BridgeStep>> {
        match std::mem::replace(&mut self.stage, SignedStage::Finished) {
            SignedStage::Start => {
                ensure_positive(self.amount)?;
                let bridge = self.bridge()?;
                let account = begin(self.client).await?;

                let (balance, nonce) = self.balance_and_nonce(account).await?;
                if self.amount > balance {
                    return Err(Error::InsufficientBalance {
                        required: self.amount,
                        available: balance,
                    });
                }

                let token_id = token_id(self.client.context().addresses().token);
                self.deposit_id = bridge_deposit_id(account, nonce, random_salt());
                let expiry = U256::from((Utc::now().timestamp() + EXPIRY_SECONDS).max(0) as u64);
                let message = BridgeTransferMessage {
                    token_id,
                    from: account,
                    to: bridge,
                    amount: self.amount,
                    nonce,
                    expiry,
                    chain_id: self.client.chain().chain_id(),
                };
                let signature = sign(self.client, &message)?;

                self.stage = SignedStage::Submit(Signed {
                    token_id,
                    account,
                    expiry,
                    signature,
                });
                Ok(Some(BridgeStep::Prepared {
                    token_id,
                    deposit_id: self.deposit_id,
                    account,
                    amount: self.amount,
                    expiry,
                    nonce,
                    signature,
                }))
            }
            SignedStage::Submit(signed) => {
                let tx_hash = self
                    .client
                    .chain()
                    .attach_contract(self.bridge()?, &BRIDGE)?
                    .send(
                        "depositToBridge",
                        &[
                            signed.token_id.into(),
                            self.deposit_id.into(),
                            signed.account.into(),
                            self.amount.into(),
                            signed.expiry.into(),
                            Token::Bytes(signed.signature.to_vec()),
                        ],
                    )
                    .await?;
                info!("Bridge {:?} of {} sent: {:?}", self.direction, self.amount, tx_hash);

                self.stage = SignedStage::Confirm {
                    tx_hash,
                    account: signed.account,
                };
                Ok(Some(BridgeStep::Sent {
                    tx_hash,
                    deposit_id: self.deposit_id,
                }))
            }
            SignedStage::Confirm { tx_hash, .. } => {
                let event: BridgeDeposited = confirm(self.client, tx_hash, Action::BridgeDeposit, false).await?;
                ensure_id(self.deposit_id, event.deposit_id)?;
                ensure_amount(self.amount, event.amount)?;
                Ok(Some(BridgeStep::Done {
                    token_id: event.token_id,
                    deposit_id: event.deposit_id,
                    account: event.account,
                    amount: event.amount,
                    balance: event.balance,
                }))
            }
            SignedStage::Finished => Ok(None),
        }
    }
}

impl LoyaltyClient {
    /// Moves `amount` tokens from the signer's wallet into the ledger through
    /// the token chain bridge. Requires `bridgeAddress`.
    pub fn deposit_via_bridge(&self, amount: U256) -> Workflow<'_, BridgeStep> {
        self.bridge_flow(Direction::Deposit, amount)
    }

    /// Moves `amount` ledger tokens back to the token chain through the
    /// loyalty bridge.
    pub fn withdraw_via_bridge(&self, amount: U256) -> Workflow<'_, BridgeStep> {
        self.bridge_flow(Direction::Withdraw, amount)
    }

    fn bridge_flow(&self, direction: Direction, amount: U256) -> Workflow<'_, BridgeStep> {
        drive(BridgeFlow {
            client: self,
            direction,
            amount,
            deposit_id: H256::zero(),
            stage: SignedStage::Start,
        })
    }
}
