//! Shop workflows: add, update, remove, open and close withdrawal.
//!
//! All five share one state machine parameterized by [`ShopAction`]. Every
//! action except `Add` requires the signer to own the shop.

use ethereum_types::{Address, H256, U256};
use serde_json::{Map, Value};
use tracing::{debug, info};

use super::{
    begin, confirm, drive, ensure_amount, ensure_id, ensure_positive, sign, Dispatch, Flow,
    SignedStage, StepCode, Submission, Workflow, WorkflowStep,
};
use crate::abi::{address_hex, encode_hex, Token};
use crate::client::LoyaltyClient;
use crate::contracts::events::{AddedShop, ClosedWithdrawal, OpenedWithdrawal, RemovedShop, UpdatedShop};
use crate::contracts::SHOP;
use crate::crypto::message::{random_salt, shop_id, ShopAction, ShopMessage};
use crate::crypto::Signature;
use crate::error::{Action, Error, Result};
use crate::types::{ShopInfo, ShopStatus};

/// Fresh shop ids drawn before giving up.
const MAX_ID_ATTEMPTS: usize = 10;

impl LoyaltyClient {
    pub async fn shop_info(&self, shop_id: H256) -> Result<ShopInfo> {
        let d = self
            .shop_contract()?
            .call_decoded(
                "shopOf",
                &[shop_id.into()],
                "((bytes32,string,string,address,uint256,uint256,uint256,uint8,bool))",
            )
            .await?
            .tuple(0)?;

        Ok(ShopInfo {
            shop_id: d.bytes32(0)?,
            name: d.string(1)?,
            currency: d.string(2)?,
            account: d.address(3)?,
            provided_amount: d.uint(4)?,
            used_amount: d.uint(5)?,
            withdrawable_amount: d.uint(6)?,
            status: ShopStatus::from_u8(d.uint8(7)?),
            withdrawal_open: d.bool(8)?,
        })
    }

    pub async fn shop_nonce(&self, account: Address) -> Result<U256> {
        self.shop_contract()?
            .call_uint("nonceOf", &[account.into()])
            .await
    }

    pub async fn is_available_shop_id(&self, shop_id: H256) -> Result<bool> {
        self.shop_contract()?
            .call_decoded("isAvailableId", &[shop_id.into()], "(bool)")
            .await?
            .bool(0)
    }

    /// Draws shop ids for `account` until the contract reports one as free.
    async fn fresh_shop_id(&self, account: Address) -> Result<H256> {
        for attempt in 1..=MAX_ID_ATTEMPTS {
            let candidate = shop_id(account, random_salt());
            if self.is_available_shop_id(candidate).await? {
                return Ok(candidate);
            }
            debug!("Shop id {:?} taken (attempt {})", candidate, attempt);
        }
        Err(Error::IdentifierExhausted(MAX_ID_ATTEMPTS))
    }
}

/// The signed shop mutation emitted with `Prepared`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShopAuthorization {
    pub shop_id: H256,
    pub action: ShopAction,
    pub account: Address,
    pub nonce: U256,
    pub signature: Signature,
}

/// Event confirming a shop mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShopOutcome {
    Added(AddedShop),
    Updated(UpdatedShop),
    Removed(RemovedShop),
    WithdrawalOpened(OpenedWithdrawal),
    WithdrawalClosed(ClosedWithdrawal),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShopStep {
    Prepared(ShopAuthorization),
    Sent { tx_hash: H256, shop_id: H256 },
    Done(ShopOutcome),
}

impl WorkflowStep for ShopStep {
    fn code(&self) -> StepCode {
        match self {
            ShopStep::Prepared(_) => StepCode::Prepared,
            ShopStep::Sent { .. } => StepCode::Sent,
            ShopStep::Done(_) => StepCode::Done,
        }
    }
}

/// Contract function, relay path and failure label of `action`.
fn route(action: &ShopAction) -> (&'static str, &'static str, Action) {
    match action {
        ShopAction::Add { .. } => ("add", "/v1/shop/add", Action::AddShop),
        ShopAction::Update { .. } => ("update", "/v1/shop/update", Action::UpdateShop),
        ShopAction::Remove => ("remove", "/v1/shop/remove", Action::RemoveShop),
        ShopAction::OpenWithdrawal { .. } => {
            ("openWithdrawal", "/v1/shop/withdrawal/open", Action::OpenWithdrawal)
        }
        ShopAction::CloseWithdrawal => {
            ("closeWithdrawal", "/v1/shop/withdrawal/close", Action::CloseWithdrawal)
        }
    }
}

/// Contract arguments and relay body of a signed shop mutation.
fn payload(auth: &ShopAuthorization) -> (Vec<Token>, Value) {
    let mut args = vec![Token::FixedBytes(auth.shop_id)];
    let mut body = Map::new();
    body.insert("shopId".to_string(), Value::from(encode_hex(auth.shop_id.as_bytes())));

    match &auth.action {
        ShopAction::Add { name, currency } | ShopAction::Update { name, currency } => {
            args.push(name.as_str().into());
            args.push(currency.as_str().into());
            body.insert("name".to_string(), Value::from(name.clone()));
            body.insert("currency".to_string(), Value::from(currency.clone()));
        }
        ShopAction::OpenWithdrawal { amount } => {
            args.push(Token::Uint(*amount));
            body.insert("amount".to_string(), Value::from(amount.to_string()));
        }
        ShopAction::Remove | ShopAction::CloseWithdrawal => {}
    }

    args.push(Token::Address(auth.account));
    args.push(Token::Bytes(auth.signature.to_vec()));
    body.insert("account".to_string(), Value::from(address_hex(&auth.account)));
    body.insert("signature".to_string(), Value::from(auth.signature.to_hex()));
    (args, Value::Object(body))
}

struct ShopFlow<'a> {
    client: &'a LoyaltyClient,
    shop_id: H256,
    action: ShopAction,
    submission: Submission,
    stage: SignedStage<ShopAuthorization>,
}

impl ShopFlow<'_> {
    /// Checks the signer owns the shop and, for withdrawals, that the amount
    /// is covered.
    async fn check_shop(&self, account: Address) -> Result<()> {
        let info = self.client.shop_info(self.shop_id).await?;
        if info.account != account {
            return Err(Error::AddressMismatch {
                expected: address_hex(&account),
                found: address_hex(&info.account),
            });
        }

        if let ShopAction::OpenWithdrawal { amount } = &self.action {
            ensure_positive(*amount)?;
            if *amount > info.withdrawable_amount {
                return Err(Error::InsufficientBalance {
                    required: *amount,
                    available: info.withdrawable_amount,
                });
            }
        }
        Ok(())
    }

    async fn confirm_outcome(&self, tx_hash: H256) -> Result<ShopOutcome> {
        let (_, _, action) = route(&self.action);
        let (shop_id, outcome) = match &self.action {
            ShopAction::Add { .. } => {
                let event: AddedShop = confirm(self.client, tx_hash, action, false).await?;
                (event.0.shop_id, ShopOutcome::Added(event))
            }
            ShopAction::Update { .. } => {
                let event: UpdatedShop = confirm(self.client, tx_hash, action, false).await?;
                (event.0.shop_id, ShopOutcome::Updated(event))
            }
            ShopAction::Remove => {
                let event: RemovedShop = confirm(self.client, tx_hash, action, false).await?;
                (event.shop_id, ShopOutcome::Removed(event))
            }
            ShopAction::OpenWithdrawal { amount } => {
                let event: OpenedWithdrawal = confirm(self.client, tx_hash, action, false).await?;
                ensure_amount(*amount, event.0.amount)?;
                (event.0.shop_id, ShopOutcome::WithdrawalOpened(event))
            }
            ShopAction::CloseWithdrawal => {
                let event: ClosedWithdrawal = confirm(self.client, tx_hash, action, false).await?;
                (event.0.shop_id, ShopOutcome::WithdrawalClosed(event))
            }
        };
        ensure_id(self.shop_id, shop_id)?;
        Ok(outcome)
    }
}

impl Flow for ShopFlow<'_> {
    type Step = ShopStep;

    async fn advance(&mut self) -> Result<Option<ShopStep>> {
        match std::mem::replace(&mut self.stage, SignedStage::Finished) {
            SignedStage::Start => {
                let account = begin(self.client).await?;
                match self.action {
                    ShopAction::Add { .. } => self.shop_id = self.client.fresh_shop_id(account).await?,
                    _ => self.check_shop(account).await?,
                }

                let nonce = self.client.shop_nonce(account).await?;
                let message = ShopMessage {
                    shop_id: self.shop_id,
                    action: self.action.clone(),
                    account,
                    nonce,
                    chain_id: self.client.chain().chain_id(),
                };
                let signature = sign(self.client, &message)?;

                let authorization = ShopAuthorization {
                    shop_id: self.shop_id,
                    action: message.action,
                    account,
                    nonce,
                    signature,
                };
                self.stage = SignedStage::Submit(authorization.clone());
                Ok(Some(ShopStep::Prepared(authorization)))
            }
            SignedStage::Submit(auth) => {
                let (function, relay_path, _) = route(&auth.action);
                let (args, relay_body) = payload(&auth);
                let tx_hash = Dispatch {
                    contract: self.client.context().addresses().shop,
                    abi: &SHOP,
                    function,
                    args,
                    relay_path,
                    relay_body,
                }
                .send(self.client, self.submission)
                .await?;

                self.stage = SignedStage::Confirm {
                    tx_hash,
                    account: auth.account,
                };
                Ok(Some(ShopStep::Sent {
                    tx_hash,
                    shop_id: auth.shop_id,
                }))
            }
            SignedStage::Confirm { tx_hash, .. } => {
                let outcome = self.confirm_outcome(tx_hash).await?;
                info!("Shop {:?} confirmed: {:?}", self.shop_id, tx_hash);
                Ok(Some(ShopStep::Done(outcome)))
            }
            SignedStage::Finished => Ok(None),
        }
    }
}

impl LoyaltyClient {
    fn shop_flow(&self, shop_id: H256, action: ShopAction, submission: Submission) -> Workflow<'_, ShopStep> {
        drive(ShopFlow {
            client: self,
            shop_id,
            action,
            submission,
            stage: SignedStage::Start,
        })
    }

    /// Registers a new shop owned by the signer under a fresh id.
    pub fn add_shop(
        &self,
        name: impl Into<String>,
        currency: impl Into<String>,
        submission: Submission,
    ) -> Workflow<'_, ShopStep> {
        let action = ShopAction::Add {
            name: name.into(),
            currency: currency.into(),
        };
        self.shop_flow(H256::zero(), action, submission)
    }

    pub fn update_shop(
        &self,
        shop_id: H256,
        name: impl Into<String>,
        currency: impl Into<String>,
        submission: Submission,
    ) -> Workflow<'_, ShopStep> {
        let action = ShopAction::Update {
            name: name.into(),
            currency: currency.into(),
        };
        self.shop_flow(shop_id, action, submission)
    }

    pub fn remove_shop(&self, shop_id: H256, submission: Submission) -> Workflow<'_, ShopStep> {
        self.shop_flow(shop_id, ShopAction::Remove, submission)
    }

    /// Opens a withdrawal of `amount` from the shop's withdrawable balance.
    pub fn open_withdrawal(&self, shop_id: H256, amount: U256, submission: Submission) -> Workflow<'_, ShopStep> {
        self.shop_flow(shop_id, ShopAction::OpenWithdrawal { amount }, submission)
    }

    pub fn close_withdrawal(&self, shop_id: H256, submission: Submission) -> Workflow<'_, ShopStep> {
        self.shop_flow(shop_id, ShopAction::CloseWithdrawal, submission)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::Signer;

    fn authorization(action: ShopAction) -> ShopAuthorization {
        let signer = Signer::random();
        ShopAuthorization {
            shop_id: H256::repeat_byte(0x11),
            action,
            account: signer.address(),
            nonce: U256::zero(),
            signature: signer.sign_message(b"shop").unwrap(),
        }
    }

    #[test]
    fn test_payload_matches_function_arity() {
        let cases = [
            (
                ShopAction::Add {
                    name: "Shop".to_string(),
                    currency: "krw".to_string(),
                },
                5,
            ),
            (ShopAction::Remove, 3),
            (ShopAction::OpenWithdrawal { amount: U256::from(5u64) }, 4),
            (ShopAction::CloseWithdrawal, 3),
        ];

        for (action, arity) in cases {
            let (function, _, _) = route(&action);
            let signature = SHOP.function(function).unwrap();
            let (args, _) = payload(&authorization(action));
            assert_eq!(args.len(), arity, "{}", signature);
            assert_eq!(signature.matches(',').count() + 1, arity, "{}", signature);
        }
    }

    #[test]
    fn test_relay_body_fields() {
        let (_, body) = payload(&authorization(ShopAction::OpenWithdrawal {
            amount: U256::from(1_000u64),
        }));
        assert_eq!(body["amount"], "1000");
        assert!(body["shopId"].as_str().unwrap().starts_with("0x"));
        assert!(body.get("name").is_none());
    }
}
