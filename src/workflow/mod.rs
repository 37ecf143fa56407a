//! Workflow Engine Module
//!
//! Every multi-step action is exposed as a [`Workflow`]: a lazily driven
//! stream of typed step values. Nothing happens until the caller pulls the
//! first step, and dropping the stream between steps abandons the action
//! without touching anything already submitted.
//!
//! Steps are emitted in [`StepCode`] order and never twice. After an error
//! the stream ends. An error raised after a `Sent` step means the transaction
//! may still have landed.
//!
//! ```text
//! START -> PREPARED -> SENT -> DONE
//! START -> CHECKED_ALLOWANCE | UPDATING_ALLOWANCE -> UPDATED_ALLOWANCE -> SENT -> DONE
//! START -> PREPARED -> SENT -> REQUESTED | ACCEPTED | REJECTED | TIMEOUT
//! ```

pub mod bridge;
pub mod ledger;
pub mod payment;
pub mod phone_link;
pub mod shop;

use std::future::Future;

use ethereum_types::{Address, H256, U256};
use futures::stream::{self, BoxStream, StreamExt};
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::abi::Token;
use crate::chain::Contract;
use crate::client::LoyaltyClient;
use crate::contracts::events::{find_event, ContractEvent};
use crate::contracts::{
    ContractAbi, CURRENCY_RATE, LEDGER, LOYALTY_CONSUMER, LOYALTY_EXCHANGER, LOYALTY_TRANSFER,
    PHONE_LINK, SHOP, TOKEN,
};
use crate::crypto::{SignableMessage, Signature};
use crate::error::{Action, Error, Result};

pub use bridge::BridgeStep;
pub use ledger::{
    AllowanceStep, DepositStep, PayablePointStep, RoyaltyTypeStep, TransferStep, WithdrawStep,
};
pub use payment::{CancelPaymentStep, CancelRequest, PaymentAuthorization, PaymentRequest, PaymentStep};
pub use phone_link::PhoneLinkStep;
pub use shop::{ShopAuthorization, ShopOutcome, ShopStep};

/// Lazily driven sequence of workflow steps.
pub type Workflow<'a, S> = BoxStream<'a, Result<S>>;

/// Step codes in emission order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum StepCode {
    CheckedAllowance,
    UpdatingAllowance,
    UpdatedAllowance,
    Prepared,
    Sent,
    Requested,
    Accepted,
    Rejected,
    Timeout,
    Done,
}

/// Implemented by every step value.
pub trait WorkflowStep {
    fn code(&self) -> StepCode;
}

/// How a signed authorization reaches the chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Submission {
    /// The signer sends the transaction and pays for gas
    Direct,
    /// The relay submits the authorization
    Relay,
}

// ============================================================================
// STATE MACHINE DRIVER
// ============================================================================

/// A resumable state machine. Each call to `advance` runs until the next step
/// and returns `None` once the machine has finished.
pub(crate) trait Flow: Send {
    type Step: Send;

    fn advance(&mut self) -> impl Future<Output = Result<Option<Self::Step>>> + Send;
}

/// Turns a state machine into a [`Workflow`].
pub(crate) fn drive<'a, F>(flow: F) -> Workflow<'a, F::Step>
where
    F: Flow + 'a,
    F::Step: 'a,
{
    stream::try_unfold(flow, |mut flow| async move {
        let step = flow.advance().await.map_err(|e| {
            warn!("Workflow stopped ({:?}): {}", e.category(), e);
            e
        })?;
        Ok::<_, Error>(step.map(|step| (step, flow)))
    })
    .boxed()
}

// ============================================================================
// SHARED STEPS
// ============================================================================

/// Resolves the signer and checks the provider serves the context network.
pub(crate) async fn begin(client: &LoyaltyClient) -> Result<Address> {
    let account = client.chain().connected_signer()?.address();
    client.chain().check_network().await?;
    Ok(account)
}

pub(crate) fn sign<M: SignableMessage>(client: &LoyaltyClient, message: &M) -> Result<Signature> {
    let signer = client.chain().signer().ok_or(Error::NoSigner)?;
    message.sign(signer)
}

pub(crate) fn ensure_positive(amount: U256) -> Result<()> {
    if amount.is_zero() {
        return Err(Error::InvalidAmount(amount));
    }
    Ok(())
}

pub(crate) fn ensure_amount(expected: U256, received: U256) -> Result<()> {
    if expected != received {
        return Err(Error::AmountMismatch { expected, received });
    }
    Ok(())
}

pub(crate) fn ensure_id(expected: H256, received: H256) -> Result<()> {
    if expected != received {
        return Err(Error::IdMismatch { expected, received });
    }
    Ok(())
}

/// Stages shared by the sign-submit-confirm workflows. `Submit` carries what
/// was signed in `Start`.
pub(crate) enum SignedStage<T> {
    Start,
    Submit(T),
    Confirm { tx_hash: H256, account: Address },
    Finished,
}

/// A signed action ready for either submission path.
pub(crate) struct Dispatch {
    pub contract: Address,
    pub abi: &'static ContractAbi,
    pub function: &'static str,
    pub args: Vec<Token>,
    pub relay_path: &'static str,
    pub relay_body: serde_json::Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RelayTransaction {
    tx_hash: H256,
}

impl Dispatch {
    pub async fn send(self, client: &LoyaltyClient, submission: Submission) -> Result<H256> {
        let tx_hash = match submission {
            Submission::Direct => {
                client
                    .chain()
                    .attach_contract(self.contract, self.abi)?
                    .send(self.function, &self.args)
                    .await?
            }
            Submission::Relay => {
                let response: RelayTransaction = client
                    .relay()
                    .post(client.chain(), self.relay_path, &self.relay_body)
                    .await?;
                response.tx_hash
            }
        };
        info!("Submitted {} ({:?}): {:?}", self.function, submission, tx_hash);
        Ok(tx_hash)
    }
}

/// Waits for the receipt of `tx_hash` and extracts `E`.
///
/// When `fetch_transaction` is set the transaction is looked up by hash first
/// (transactions relayed by a third party).
///
/// # Returns
///
/// * `Ok(E)` - Decoded event
/// * `Err(Error::TransactionNotFound)` - Unknown transaction hash
/// * `Err(Error::FailedOperation)` - Receipt lacks the event
pub(crate) async fn confirm<E: ContractEvent>(
    client: &LoyaltyClient,
    tx_hash: H256,
    action: Action,
    fetch_transaction: bool,
) -> Result<E> {
    if fetch_transaction {
        client
            .chain()
            .provider()?
            .transaction(tx_hash)
            .await?
            .ok_or(Error::TransactionNotFound(tx_hash))?;
    }

    let receipt = client.chain().wait_for_receipt(tx_hash).await?;
    debug!("Receipt for {:?} has {} logs", tx_hash, receipt.logs.len());
    find_event::<E>(&receipt)?.ok_or(Error::FailedOperation(action))
}

// ============================================================================
// CONTRACT HANDLES
// ============================================================================

impl LoyaltyClient {
    pub(crate) fn ledger_contract(&self) -> Result<Contract<'_>> {
        self.chain().attach_contract(self.context().addresses().ledger, &LEDGER)
    }

    pub(crate) fn token_contract(&self) -> Result<Contract<'_>> {
        self.chain().attach_contract(self.context().addresses().token, &TOKEN)
    }

    pub(crate) fn phone_link_contract(&self) -> Result<Contract<'_>> {
        self.chain().attach_contract(self.context().addresses().phone_link, &PHONE_LINK)
    }

    pub(crate) fn currency_rate_contract(&self) -> Result<Contract<'_>> {
        self.chain()
            .attach_contract(self.context().addresses().currency_rate, &CURRENCY_RATE)
    }

    pub(crate) fn shop_contract(&self) -> Result<Contract<'_>> {
        self.chain().attach_contract(self.context().addresses().shop, &SHOP)
    }

    pub(crate) fn consumer_address(&self) -> (Address, &'static ContractAbi) {
        (self.context().addresses().loyalty_consumer, &LOYALTY_CONSUMER)
    }

    pub(crate) fn exchanger_address(&self) -> (Address, &'static ContractAbi) {
        (self.context().addresses().loyalty_exchanger, &LOYALTY_EXCHANGER)
    }

    pub(crate) fn transfer_address(&self) -> (Address, &'static ContractAbi) {
        (self.context().addresses().loyalty_transfer, &LOYALTY_TRANSFER)
    }
}
