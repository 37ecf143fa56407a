//! Payment workflows: pay with point, pay with token and cancel payment.

use ethereum_types::{Address, H256, U256};
use tracing::info;

use super::{
    begin, confirm, drive, ensure_amount, ensure_id, ensure_positive, sign, Dispatch, Flow,
    SignedStage, StepCode, Submission, Workflow, WorkflowStep,
};
use crate::abi::{address_hex, encode_hex, Token};
use crate::client::LoyaltyClient;
use crate::contracts::events::{CanceledPayment, PaidPoint, PaidToken, Payment};
use crate::crypto::message::{payment_id, random_salt, PaymentCancelMessage, PaymentMessage};
use crate::crypto::Signature;
use crate::error::{Action, Error, Result};
use crate::types::PaymentMethod;

impl LoyaltyClient {
    /// Rate of `symbol` as stored in the currency-rate contract.
    pub async fn currency_rate(&self, symbol: &str) -> Result<U256> {
        self.currency_rate_contract()?
            .call_uint("get", &[symbol.into()])
            .await
    }

    /// Converts `amount` from one currency symbol to another on-chain.
    pub async fn convert_currency(&self, amount: U256, from: &str, to: &str) -> Result<U256> {
        self.currency_rate_contract()?
            .call_uint("convertCurrency", &[amount.into(), from.into(), to.into()])
            .await
    }
}

/// A purchase to settle from the signer's ledger balance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentRequest {
    pub purchase_id: String,
    /// Amount in `currency` units
    pub amount: U256,
    pub currency: String,
    pub shop_id: H256,
}

/// The signed payment emitted with `Prepared`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentAuthorization {
    pub payment_id: H256,
    pub purchase_id: String,
    pub amount: U256,
    pub currency: String,
    pub shop_id: H256,
    pub account: Address,
    pub nonce: U256,
    pub signature: Signature,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentStep {
    Prepared(PaymentAuthorization),
    Sent { tx_hash: H256, payment_id: H256 },
    Done(Payment),
}

impl WorkflowStep for PaymentStep {
    fn code(&self) -> StepCode {
        match self {
            PaymentStep::Prepared(_) => StepCode::Prepared,
            PaymentStep::Sent { .. } => StepCode::Sent,
            PaymentStep::Done(_) => StepCode::Done,
        }
    }
}

struct PaymentFlow<'a> {
    client: &'a LoyaltyClient,
    method: PaymentMethod,
    request: PaymentRequest,
    submission: Submission,
    payment_id: H256,
    /// Ledger balance read before signing
    balance_before: U256,
    stage: SignedStage<PaymentAuthorization>,
}

impl PaymentFlow<'_> {
    fn action(&self) -> Action {
        match self.method {
            PaymentMethod::Point => Action::PayPoint,
            PaymentMethod::Token => Action::PayToken,
        }
    }

    async fn balance(&self, account: Address) -> Result<U256> {
        match self.method {
            PaymentMethod::Point => self.client.point_balance(account).await,
            PaymentMethod::Token => self.client.token_balance(account).await,
        }
    }
}

/// Checks that the reported balance is the pre-payment balance minus the
/// paid amount and the fee, all in ledger units.
fn ensure_balance_after(balance_before: U256, payment: &Payment) -> Result<()> {
    let expected = payment
        .paid
        .checked_add(payment.fee)
        .and_then(|spent| balance_before.checked_sub(spent))
        .ok_or(Error::AmountMismatch {
            expected: balance_before,
            received: payment.paid.saturating_add(payment.fee),
        })?;
    ensure_amount(expected, payment.balance)
}

impl Flow for PaymentFlow<'_> {
    type Step = PaymentStep;

    async fn advance(&mut self) -> Result<Option<PaymentStep>> {
        match std::mem::replace(&mut self.stage, SignedStage::Finished) {
            SignedStage::Start => {
                ensure_positive(self.request.amount)?;
                let account = begin(self.client).await?;

                let required = self
                    .client
                    .convert_currency(self.request.amount, &self.request.currency, self.method.symbol())
                    .await?;
                let available = self.balance(account).await?;
                if required > available {
                    return Err(Error::InsufficientBalance { required, available });
                }
                self.balance_before = available;

                let nonce = self.client.ledger_nonce(account).await?;
                self.payment_id = payment_id(account, &self.request.purchase_id, random_salt());
                let message = PaymentMessage {
                    payment_id: self.payment_id,
                    purchase_id: self.request.purchase_id.clone(),
                    amount: self.request.amount,
                    currency: self.request.currency.clone(),
                    shop_id: self.request.shop_id,
                    account,
                    nonce,
                    chain_id: self.client.chain().chain_id(),
                };
                let signature = sign(self.client, &message)?;

                let authorization = PaymentAuthorization {
                    payment_id: self.payment_id,
                    purchase_id: message.purchase_id,
                    amount: message.amount,
                    currency: message.currency,
                    shop_id: message.shop_id,
                    account,
                    nonce,
                    signature,
                };
                info!(
                    "Prepared {} payment {:?} for purchase {}",
                    self.method.symbol(),
                    self.payment_id,
                    authorization.purchase_id
                );
                self.stage = SignedStage::Submit(authorization.clone());
                Ok(Some(PaymentStep::Prepared(authorization)))
            }
            SignedStage::Submit(auth) => {
                let (contract, abi) = self.client.consumer_address();
                let (function, relay_path) = match self.method {
                    PaymentMethod::Point => ("payPoint", "/v1/payment/point"),
                    PaymentMethod::Token => ("payToken", "/v1/payment/token"),
                };
                let tx_hash = Dispatch {
                    contract,
                    abi,
                    function,
                    args: vec![
                        auth.payment_id.into(),
                        auth.purchase_id.as_str().into(),
                        auth.amount.into(),
                        auth.currency.as_str().into(),
                        auth.shop_id.into(),
                        auth.account.into(),
                        Token::Bytes(auth.signature.to_vec()),
                    ],
                    relay_path,
                    relay_body: serde_json::json!({
                        "paymentId": encode_hex(auth.payment_id.as_bytes()),
                        "purchaseId": auth.purchase_id,
                        "amount": auth.amount.to_string(),
                        "currency": auth.currency,
                        "shopId": encode_hex(auth.shop_id.as_bytes()),
                        "account": address_hex(&auth.account),
                        "signature": auth.signature,
                    }),
                }
                .send(self.client, self.submission)
                .await?;

                self.stage = SignedStage::Confirm {
                    tx_hash,
                    account: auth.account,
                };
                Ok(Some(PaymentStep::Sent {
                    tx_hash,
                    payment_id: auth.payment_id,
                }))
            }
            SignedStage::Confirm { tx_hash, .. } => {
                let fetch = self.submission == Submission::Relay;
                let payment = match self.method {
                    PaymentMethod::Point => {
                        confirm::<PaidPoint>(self.client, tx_hash, self.action(), fetch).await?.0
                    }
                    PaymentMethod::Token => {
                        confirm::<PaidToken>(self.client, tx_hash, self.action(), fetch).await?.0
                    }
                };
                ensure_id(self.payment_id, payment.payment_id)?;
                ensure_amount(self.request.amount, payment.paid_value)?;
                ensure_balance_after(self.balance_before, &payment)?;
                info!("Payment {:?} confirmed", payment.payment_id);
                Ok(Some(PaymentStep::Done(payment)))
            }
            SignedStage::Finished => Ok(None),
        }
    }
}

// ============================================================================
// CANCEL
// ============================================================================

/// A previous payment to cancel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CancelRequest {
    pub payment_id: H256,
    pub purchase_id: String,
    pub shop_id: H256,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CancelPaymentStep {
    Prepared {
        payment_id: H256,
        purchase_id: String,
        shop_id: H256,
        account: Address,
        nonce: U256,
        signature: Signature,
    },
    Sent {
        tx_hash: H256,
        payment_id: H256,
    },
    Done(CanceledPayment),
}

impl WorkflowStep for CancelPaymentStep {
    fn code(&self) -> StepCode {
        match self {
            CancelPaymentStep::Prepared { .. } => StepCode::Prepared,
            CancelPaymentStep::Sent { .. } => StepCode::Sent,
            CancelPaymentStep::Done(_) => StepCode::Done,
        }
    }
}

struct CancelPaymentFlow<'a> {
    client: &'a LoyaltyClient,
    request: CancelRequest,
    submission: Submission,
    stage: SignedStage<(Address, Signature)>,
}

impl Flow for CancelPaymentFlow<'_> {
    type Step = CancelPaymentStep;

    async fn advance(&mut self) -> Result<Option<CancelPaymentStep>> {
        match std::mem::replace(&mut self.stage, SignedStage::Finished) {
            SignedStage::Start => {
                let account = begin(self.client).await?;
                let nonce = self.client.ledger_nonce(account).await?;
                let message = PaymentCancelMessage {
                    payment_id: self.request.payment_id,
                    purchase_id: self.request.purchase_id.clone(),
                    shop_id: self.request.shop_id,
                    account,
                    nonce,
                    chain_id: self.client.chain().chain_id(),
                };
                let signature = sign(self.client, &message)?;
                self.stage = SignedStage::Submit((account, signature));
                Ok(Some(CancelPaymentStep::Prepared {
                    payment_id: message.payment_id,
                    purchase_id: message.purchase_id,
                    shop_id: message.shop_id,
                    account,
                    nonce,
                    signature,
                }))
            }
            SignedStage::Submit((account, signature)) => {
                let (contract, abi) = self.client.consumer_address();
                let request = &self.request;
                let tx_hash = Dispatch {
                    contract,
                    abi,
                    function: "cancelPayment",
                    args: vec![
                        request.payment_id.into(),
                        request.purchase_id.as_str().into(),
                        request.shop_id.into(),
                        account.into(),
                        Token::Bytes(signature.to_vec()),
                    ],
                    relay_path: "/v1/payment/cancel",
                    relay_body: serde_json::json!({
                        "paymentId": encode_hex(request.payment_id.as_bytes()),
                        "purchaseId": request.purchase_id,
                        "shopId": encode_hex(request.shop_id.as_bytes()),
                        "account": address_hex(&account),
                        "signature": signature,
                    }),
                }
                .send(self.client, self.submission)
                .await?;

                self.stage = SignedStage::Confirm { tx_hash, account };
                Ok(Some(CancelPaymentStep::Sent {
                    tx_hash,
                    payment_id: self.request.payment_id,
                }))
            }
            SignedStage::Confirm { tx_hash, .. } => {
                let fetch = self.submission == Submission::Relay;
                let event: CanceledPayment =
                    confirm(self.client, tx_hash, Action::CancelPayment, fetch).await?;
                ensure_id(self.request.payment_id, event.payment_id)?;
                Ok(Some(CancelPaymentStep::Done(event)))
            }
            SignedStage::Finished => Ok(None),
        }
    }
}

impl LoyaltyClient {
    /// Pays for a purchase with the signer's points.
    ///
    /// Fails before signing when the converted amount exceeds the point balance.
    pub fn pay_point(&self, request: PaymentRequest, submission: Submission) -> Workflow<'_, PaymentStep> {
        self.pay(PaymentMethod::Point, request, submission)
    }

    /// Pays for a purchase with the signer's ledger tokens.
    pub fn pay_token(&self, request: PaymentRequest, submission: Submission) -> Workflow<'_, PaymentStep> {
        self.pay(PaymentMethod::Token, request, submission)
    }

    fn pay(
        &self,
        method: PaymentMethod,
        request: PaymentRequest,
        submission: Submission,
    ) -> Workflow<'_, PaymentStep> {
        drive(PaymentFlow {
            client: self,
            method,
            request,
            submission,
            payment_id: H256::zero(),
            balance_before: U256::zero(),
            stage: SignedStage::Start,
        })
    }

    pub fn cancel_payment(
        &self,
        request: CancelRequest,
        submission: Submission,
    ) -> Workflow<'_, CancelPaymentStep> {
        drive(CancelPaymentFlow {
            client: self,
            request,
            submission,
            stage: SignedStage::Start,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payment(paid: u64, fee: u64, balance: u64) -> Payment {
        Payment {
            payment_id: H256::repeat_byte(1),
            purchase_id: "P000001".to_string(),
            currency: "krw".to_string(),
            paid: U256::from(paid),
            paid_value: U256::from(paid),
            fee: U256::from(fee),
            fee_value: U256::from(fee),
            balance: U256::from(balance),
            shop_id: H256::repeat_byte(2),
            account: Address::repeat_byte(3),
        }
    }

    #[test]
    fn test_balance_after_accounts_paid_and_fee() {
        assert!(ensure_balance_after(U256::from(10_000u64), &payment(1_000, 50, 8_950)).is_ok());
    }

    #[test]
    fn test_balance_after_inconsistent_is_mismatch() {
        match ensure_balance_after(U256::from(10_000u64), &payment(1_000, 50, 9_999_999)) {
            Err(Error::AmountMismatch { expected, received }) => {
                assert_eq!(expected, U256::from(8_950u64));
                assert_eq!(received, U256::from(9_999_999u64));
            }
            other => panic!("expected AmountMismatch, got {:?}", other),
        }
    }

    #[test]
    fn test_balance_after_spending_more_than_held_is_mismatch() {
        assert!(matches!(
            ensure_balance_after(U256::from(100u64), &payment(1_000, 50, 0)),
            Err(Error::AmountMismatch { .. })
        ));
    }
}
