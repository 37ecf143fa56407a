//! Phone-link registration.
//!
//! Registration is asynchronous: after the request is submitted, validators
//! send a code to the phone and move the request through
//! `INVALID -> REQUESTED -> ACCEPTED | REJECTED`. The workflows here poll the
//! request status and finish with the first non-pending status, or `Timeout`
//! when the registration timeout elapses. A stuck request never errors.

use ethereum_types::{Address, H256, U256};
use serde::Deserialize;
use tokio::time::{sleep, timeout, Instant};
use tracing::{debug, info, warn};

use super::{begin, drive, ensure_id, sign, Flow, StepCode, Submission, Workflow, WorkflowStep};
use crate::abi::{address_hex, encode_hex, Token};
use crate::client::LoyaltyClient;
use crate::crypto::message::{phone_hash, phone_link_request_id, random_salt, PhoneLinkRequestMessage};
use crate::crypto::Signature;
use crate::error::{Action, Error, Result};
use crate::relay::read_validators;
use crate::types::{PhoneLinkRequest, RequestStatus, ValidatorInfo};

// ============================================================================
// READS
// ============================================================================

impl LoyaltyClient {
    /// Address linked to `phone`, zero when the phone is not registered.
    pub async fn phone_to_address(&self, phone: &str) -> Result<Address> {
        self.phone_hash_to_address(phone_hash(phone)).await
    }

    pub async fn phone_hash_to_address(&self, phone_hash: H256) -> Result<Address> {
        self.phone_link_contract()?
            .call_decoded("toAddress", &[phone_hash.into()], "(address)")
            .await?
            .address(0)
    }

    /// Phone hash linked to `account`, zero when none.
    pub async fn address_to_phone(&self, account: Address) -> Result<H256> {
        self.phone_link_contract()?
            .call_decoded("toPhone", &[account.into()], "(bytes32)")
            .await?
            .bytes32(0)
    }

    pub async fn phone_link_nonce(&self, account: Address) -> Result<U256> {
        self.phone_link_contract()?
            .call_uint("nonceOf", &[account.into()])
            .await
    }

    /// Registration request `request_id`. The contract returns it as one struct.
    pub async fn request_item(&self, request_id: H256) -> Result<PhoneLinkRequest> {
        let d = self
            .phone_link_contract()?
            .call_decoded(
                "getRequestItem",
                &[request_id.into()],
                "((bytes32,bytes32,address,bytes,uint8))",
            )
            .await?
            .tuple(0)?;
        let status = d.uint8(4)?;

        Ok(PhoneLinkRequest {
            request_id: d.bytes32(0)?,
            phone_hash: d.bytes32(1)?,
            account: d.address(2)?,
            signature: d.bytes(3)?,
            status: RequestStatus::from_u8(status)
                .ok_or_else(|| Error::Abi(format!("unknown request status {}", status)))?,
        })
    }

    /// Validators registered in the phone-link contract.
    pub async fn validators(&self) -> Result<Vec<ValidatorInfo>> {
        read_validators(self.chain(), self.context().addresses().phone_link).await
    }
}

// ============================================================================
// STEPS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PhoneLinkStep {
    Prepared {
        request_id: H256,
        phone: String,
        phone_hash: H256,
        account: Address,
        nonce: U256,
        signature: Signature,
    },
    /// `tx_hash` is absent when the relay does not report one
    Sent {
        request_id: H256,
        tx_hash: Option<H256>,
    },
    /// Validators sent the code; finish with [`LoyaltyClient::submit_phone`]
    Requested { request_id: H256 },
    Accepted { request_id: H256 },
    Rejected { request_id: H256 },
    Timeout { request_id: H256 },
}

impl WorkflowStep for PhoneLinkStep {
    fn code(&self) -> StepCode {
        match self {
            PhoneLinkStep::Prepared { .. } => StepCode::Prepared,
            PhoneLinkStep::Sent { .. } => StepCode::Sent,
            PhoneLinkStep::Requested { .. } => StepCode::Requested,
            PhoneLinkStep::Accepted { .. } => StepCode::Accepted,
            PhoneLinkStep::Rejected { .. } => StepCode::Rejected,
            PhoneLinkStep::Timeout { .. } => StepCode::Timeout,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RequestReply {
    #[serde(default)]
    request_id: Option<H256>,
    #[serde(default)]
    tx_hash: Option<H256>,
}

// ============================================================================
// STATUS POLL
// ============================================================================

/// Polls the status of `request_id` while it equals `pending`.
///
/// Read failures are logged and retried until the deadline. A read still in
/// flight at the deadline is abandoned.
///
/// # Returns
///
/// * `Some(status)` - First status different from `pending`
/// * `None` - Registration timeout elapsed
async fn poll_status(client: &LoyaltyClient, request_id: H256, pending: RequestStatus) -> Option<RequestStatus> {
    let polling = client.chain().polling();
    let deadline = Instant::now() + polling.registration_timeout;

    loop {
        sleep(polling.registration_interval).await;
        let remaining = deadline.saturating_duration_since(Instant::now());
        match timeout(remaining, client.request_item(request_id)).await {
            Ok(Ok(item)) if item.status != pending => return Some(item.status),
            Ok(Ok(_)) => debug!("Request {:?} still {:?}", request_id, pending),
            Ok(Err(e)) => warn!("Failed to read request {:?}: {}", request_id, e),
            Err(_) => {
                warn!("Reading request {:?} outlasted the registration timeout", request_id);
                return None;
            }
        }
        if Instant::now() >= deadline {
            return None;
        }
    }
}

fn terminal_step(request_id: H256, status: Option<RequestStatus>) -> PhoneLinkStep {
    match status {
        Some(RequestStatus::Requested) => PhoneLinkStep::Requested { request_id },
        Some(RequestStatus::Accepted) => PhoneLinkStep::Accepted { request_id },
        Some(RequestStatus::Rejected) | Some(RequestStatus::Invalid) => PhoneLinkStep::Rejected { request_id },
        None => {
            info!("Request {:?} timed out", request_id);
            PhoneLinkStep::Timeout { request_id }
        }
    }
}

// ============================================================================
// REGISTER
// ============================================================================

enum RegisterStage {
    Start,
    Submit {
        phone_hash: H256,
        account: Address,
        signature: Signature,
    },
    Poll {
        receipt: Option<H256>,
    },
    Finished,
}

struct RegisterFlow<'a> {
    client: &'a LoyaltyClient,
    phone: String,
    submission: Submission,
    request_id: H256,
    stage: RegisterStage,
}

impl Flow for RegisterFlow<'_> {
    type Step = PhoneLinkStep;

    async fn advance(&mut self) -> Result<Option<PhoneLinkStep>> {
        match std::mem::replace(&mut self.stage, RegisterStage::Finished) {
            RegisterStage::Start => {
                let account = begin(self.client).await?;
                let phone_hash = phone_hash(&self.phone);
                let nonce = self.client.phone_link_nonce(account).await?;
                self.request_id = phone_link_request_id(phone_hash, account, nonce, random_salt());

                let message = PhoneLinkRequestMessage {
                    request_id: self.request_id,
                    phone_hash,
                    account,
                    nonce,
                    chain_id: self.client.chain().chain_id(),
                };
                let signature = sign(self.client, &message)?;
                self.stage = RegisterStage::Submit {
                    phone_hash,
                    account,
                    signature,
                };
                Ok(Some(PhoneLinkStep::Prepared {
                    request_id: self.request_id,
                    phone: self.phone.clone(),
                    phone_hash,
                    account,
                    nonce,
                    signature,
                }))
            }
            RegisterStage::Submit {
                phone_hash,
                account,
                signature,
            } => {
                let (tx_hash, receipt) = match self.submission {
                    Submission::Direct => {
                        let tx_hash = self
                            .client
                            .phone_link_contract()?
                            .send(
                                "addRequest",
                                &[
                                    self.request_id.into(),
                                    phone_hash.into(),
                                    account.into(),
                                    Token::Bytes(signature.to_vec()),
                                ],
                            )
                            .await?;
                        (Some(tx_hash), Some(tx_hash))
                    }
                    Submission::Relay => {
                        let reply: RequestReply = self
                            .client
                            .relay()
                            .post(
                                self.client.chain(),
                                "/request",
                                &serde_json::json!({
                                    "requestId": encode_hex(self.request_id.as_bytes()),
                                    "phone": self.phone,
                                    "address": address_hex(&account),
                                    "signature": signature,
                                }),
                            )
                            .await?;
                        if let Some(returned) = reply.request_id {
                            ensure_id(self.request_id, returned)?;
                        }
                        (reply.tx_hash, None)
                    }
                };

                info!("Registration {:?} submitted ({:?})", self.request_id, self.submission);
                self.stage = RegisterStage::Poll { receipt };
                Ok(Some(PhoneLinkStep::Sent {
                    request_id: self.request_id,
                    tx_hash,
                }))
            }
            RegisterStage::Poll { receipt } => {
                if let Some(tx_hash) = receipt {
                    self.client
                        .chain()
                        .wait_for_receipt(tx_hash)
                        .await
                        .map_err(|e| match e {
                            Error::TransactionReverted(_) => Error::FailedOperation(Action::RegisterPhone),
                            other => other,
                        })?;
                }
                let status = poll_status(self.client, self.request_id, RequestStatus::Invalid).await;
                Ok(Some(terminal_step(self.request_id, status)))
            }
            RegisterStage::Finished => Ok(None),
        }
    }
}

// ============================================================================
// SUBMIT CODE
// ============================================================================

enum SubmitStage {
    Start,
    Poll,
    Finished,
}

struct SubmitFlow<'a> {
    client: &'a LoyaltyClient,
    request_id: H256,
    code: String,
    stage: SubmitStage,
}

impl Flow for SubmitFlow<'_> {
    type Step = PhoneLinkStep;

    async fn advance(&mut self) -> Result<Option<PhoneLinkStep>> {
        match std::mem::replace(&mut self.stage, SubmitStage::Finished) {
            SubmitStage::Start => {
                self.client.chain().check_network().await?;
                let reply: RequestReply = self
                    .client
                    .relay()
                    .post(
                        self.client.chain(),
                        "/submit",
                        &serde_json::json!({
                            "requestId": encode_hex(self.request_id.as_bytes()),
                            "code": self.code,
                        }),
                    )
                    .await?;

                self.stage = SubmitStage::Poll;
                Ok(Some(PhoneLinkStep::Sent {
                    request_id: self.request_id,
                    tx_hash: reply.tx_hash,
                }))
            }
            SubmitStage::Poll => {
                let status = poll_status(self.client, self.request_id, RequestStatus::Requested).await;
                Ok(Some(terminal_step(self.request_id, status)))
            }
            SubmitStage::Finished => Ok(None),
        }
    }
}

impl LoyaltyClient {
    /// Requests a link between `phone` and the signer's address.
    ///
    /// Ends with `Requested` once validators have sent the code, or with
    /// `Accepted`, `Rejected` or `Timeout`.
    pub fn register_phone(&self, phone: impl Into<String>, submission: Submission) -> Workflow<'_, PhoneLinkStep> {
        drive(RegisterFlow {
            client: self,
            phone: phone.into(),
            submission,
            request_id: H256::zero(),
            stage: RegisterStage::Start,
        })
    }

    /// Submits the code received by SMS for `request_id` through the relay.
    pub fn submit_phone(&self, request_id: H256, code: impl Into<String>) -> Workflow<'_, PhoneLinkStep> {
        drive(SubmitFlow {
            client: self,
            request_id,
            code: code.into(),
            stage: SubmitStage::Start,
        })
    }
}
