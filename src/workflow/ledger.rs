//! Ledger workflows: allowance, deposit, withdraw, royalty type, payable
//! point conversion and token transfer, plus the ledger and token reads.

use ethereum_types::{Address, H256, U256};
use tracing::info;

use super::{
    begin, confirm, drive, ensure_amount, ensure_positive, sign, Dispatch, Flow, SignedStage,
    StepCode, Submission, Workflow, WorkflowStep,
};
use crate::abi::{address_hex, encode_hex, Token};
use crate::client::LoyaltyClient;
use crate::contracts::events::{
    Approval, ChangedRoyaltyType, ChangedToPayablePoint, Deposited, TransferredLoyaltyToken,
    Withdrawn,
};
use crate::crypto::message::{phone_hash, PayablePointMessage, RoyaltyTypeMessage, TransferMessage};
use crate::crypto::Signature;
use crate::error::{Action, Error, Result};
use crate::types::RoyaltyType;

// ============================================================================
// READS
// ============================================================================

impl LoyaltyClient {
    pub async fn point_balance(&self, account: Address) -> Result<U256> {
        self.ledger_contract()?
            .call_uint("pointBalanceOf", &[account.into()])
            .await
    }

    /// Ledger token balance of `account`.
    pub async fn token_balance(&self, account: Address) -> Result<U256> {
        self.ledger_contract()?
            .call_uint("tokenBalanceOf", &[account.into()])
            .await
    }

    /// Points earned under a phone number that is not linked yet.
    pub async fn unpayable_point_balance(&self, phone_hash: H256) -> Result<U256> {
        self.ledger_contract()?
            .call_uint("unPayablePointBalanceOf", &[phone_hash.into()])
            .await
    }

    pub async fn ledger_nonce(&self, account: Address) -> Result<U256> {
        self.ledger_contract()?
            .call_uint("nonceOf", &[account.into()])
            .await
    }

    pub async fn royalty_type(&self, account: Address) -> Result<RoyaltyType> {
        let value = self
            .ledger_contract()?
            .call_decoded("royaltyTypeOf", &[account.into()], "(uint8)")
            .await?
            .uint8(0)?;
        RoyaltyType::from_u8(value).ok_or_else(|| Error::Abi(format!("unknown royalty type {}", value)))
    }

    /// ERC20 balance of `account` on the token contract.
    pub async fn token_balance_of(&self, account: Address) -> Result<U256> {
        self.token_contract()?
            .call_uint("balanceOf", &[account.into()])
            .await
    }

    pub async fn allowance(&self, owner: Address, spender: Address) -> Result<U256> {
        self.token_contract()?
            .call_uint("allowance", &[owner.into(), spender.into()])
            .await
    }
}

// ============================================================================
// ALLOWANCE
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AllowanceStep {
    /// Current allowance already covers the amount, no approval is sent
    CheckedAllowance {
        owner: Address,
        spender: Address,
        allowance: U256,
    },
    UpdatingAllowance {
        owner: Address,
        spender: Address,
        amount: U256,
        tx_hash: H256,
    },
    UpdatedAllowance {
        owner: Address,
        spender: Address,
        amount: U256,
    },
}

impl WorkflowStep for AllowanceStep {
    fn code(&self) -> StepCode {
        match self {
            AllowanceStep::CheckedAllowance { .. } => StepCode::CheckedAllowance,
            AllowanceStep::UpdatingAllowance { .. } => StepCode::UpdatingAllowance,
            AllowanceStep::UpdatedAllowance { .. } => StepCode::UpdatedAllowance,
        }
    }
}

enum AllowanceStage {
    Start,
    Confirm { owner: Address, tx_hash: H256 },
    Finished,
}

pub(crate) struct AllowanceFlow<'a> {
    client: &'a LoyaltyClient,
    spender: Address,
    amount: U256,
    stage: AllowanceStage,
}

impl<'a> AllowanceFlow<'a> {
    fn new(client: &'a LoyaltyClient, spender: Address, amount: U256) -> Self {
        Self {
            client,
            spender,
            amount,
            stage: AllowanceStage::Start,
        }
    }
}

impl Flow for AllowanceFlow<'_> {
    type Step = AllowanceStep;

    async fn advance(&mut self) -> Result<Option<AllowanceStep>> {
        match std::mem::replace(&mut self.stage, AllowanceStage::Finished) {
            AllowanceStage::Start => {
                let owner = begin(self.client).await?;
                let allowance = self.client.allowance(owner, self.spender).await?;
                if allowance >= self.amount {
                    info!("Allowance {} already covers {}", allowance, self.amount);
                    return Ok(Some(AllowanceStep::CheckedAllowance {
                        owner,
                        spender: self.spender,
                        allowance,
                    }));
                }

                let tx_hash = self
                    .client
                    .token_contract()?
                    .send("approve", &[self.spender.into(), self.amount.into()])
                    .await?;
                info!("Approving {} for {:?}: {:?}", self.amount, self.spender, tx_hash);
                self.stage = AllowanceStage::Confirm { owner, tx_hash };
                Ok(Some(AllowanceStep::UpdatingAllowance {
                    owner,
                    spender: self.spender,
                    amount: self.amount,
                    tx_hash,
                }))
            }
            AllowanceStage::Confirm { owner, tx_hash } => {
                let approval: Approval = confirm(self.client, tx_hash, Action::Approve, false).await?;
                ensure_amount(self.amount, approval.value)?;
                Ok(Some(AllowanceStep::UpdatedAllowance {
                    owner,
                    spender: self.spender,
                    amount: approval.value,
                }))
            }
            AllowanceStage::Finished => Ok(None),
        }
    }
}

// ============================================================================
// DEPOSIT / WITHDRAW
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DepositStep {
    Allowance(AllowanceStep),
    Sent {
        tx_hash: H256,
        account: Address,
        amount: U256,
    },
    Done {
        account: Address,
        deposited_token: U256,
        deposited_value: U256,
        balance_token: U256,
    },
}

impl WorkflowStep for DepositStep {
    fn code(&self) -> StepCode {
        match self {
            DepositStep::Allowance(step) => step.code(),
            DepositStep::Sent { .. } => StepCode::Sent,
            DepositStep::Done { .. } => StepCode::Done,
        }
    }
}

enum DepositStage<'a> {
    Start,
    Allowance(AllowanceFlow<'a>),
    Submit,
    Confirm { tx_hash: H256 },
    Finished,
}

struct DepositFlow<'a> {
    client: &'a LoyaltyClient,
    amount: U256,
    account: Address,
    stage: DepositStage<'a>,
}

impl Flow for DepositFlow<'_> {
    type Step = DepositStep;

    async fn advance(&mut self) -> Result<Option<DepositStep>> {
        loop {
            match std::mem::replace(&mut self.stage, DepositStage::Finished) {
                DepositStage::Start => {
                    ensure_positive(self.amount)?;
                    self.account = begin(self.client).await?;
                    let balance = self.client.token_balance_of(self.account).await?;
                    if self.amount >= balance {
                        return Err(Error::InsufficientBalance {
                            required: self.amount,
                            available: balance,
                        });
                    }
                    let ledger = self.client.context().addresses().ledger;
                    self.stage = DepositStage::Allowance(AllowanceFlow::new(self.client, ledger, self.amount));
                }
                DepositStage::Allowance(mut allowance) => {
                    if let Some(step) = allowance.advance().await? {
                        self.stage = DepositStage::Allowance(allowance);
                        return Ok(Some(DepositStep::Allowance(step)));
                    }
                    self.stage = DepositStage::Submit;
                }
                DepositStage::Submit => {
                    let tx_hash = self
                        .client
                        .ledger_contract()?
                        .send("deposit", &[self.amount.into()])
                        .await?;
                    info!("Deposit of {} sent: {:?}", self.amount, tx_hash);
                    self.stage = DepositStage::Confirm { tx_hash };
                    return Ok(Some(DepositStep::Sent {
                        tx_hash,
                        account: self.account,
                        amount: self.amount,
                    }));
                }
                DepositStage::Confirm { tx_hash } => {
                    let event: Deposited = confirm(self.client, tx_hash, Action::Deposit, false).await?;
                    ensure_amount(self.amount, event.deposited_token)?;
                    info!("Deposit confirmed: {:?}", tx_hash);
                    return Ok(Some(DepositStep::Done {
                        account: event.account,
                        deposited_token: event.deposited_token,
                        deposited_value: event.deposited_value,
                        balance_token: event.balance_token,
                    }));
                }
                DepositStage::Finished => return Ok(None),
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WithdrawStep {
    Sent {
        tx_hash: H256,
        account: Address,
        amount: U256,
    },
    Done {
        account: Address,
        withdrawn_token: U256,
        withdrawn_value: U256,
        balance_token: U256,
    },
}

impl WorkflowStep for WithdrawStep {
    fn code(&self) -> StepCode {
        match self {
            WithdrawStep::Sent { .. } => StepCode::Sent,
            WithdrawStep::Done { .. } => StepCode::Done,
        }
    }
}

enum WithdrawStage {
    Start,
    Confirm { tx_hash: H256 },
    Finished,
}

struct WithdrawFlow<'a> {
    client: &'a LoyaltyClient,
    amount: U256,
    stage: WithdrawStage,
}

impl Flow for WithdrawFlow<'_> {
    type Step = WithdrawStep;

    async fn advance(&mut self) -> Result<Option<WithdrawStep>> {
        match std::mem::replace(&mut self.stage, WithdrawStage::Finished) {
            WithdrawStage::Start => {
                ensure_positive(self.amount)?;
                let account = begin(self.client).await?;
                let balance = self.client.token_balance(account).await?;
                if self.amount >= balance {
                    return Err(Error::InsufficientBalance {
                        required: self.amount,
                        available: balance,
                    });
                }

                let tx_hash = self
                    .client
                    .ledger_contract()?
                    .send("withdraw", &[self.amount.into()])
                    .await?;
                info!("Withdrawal of {} sent: {:?}", self.amount, tx_hash);
                self.stage = WithdrawStage::Confirm { tx_hash };
                Ok(Some(WithdrawStep::Sent {
                    tx_hash,
                    account,
                    amount: self.amount,
                }))
            }
            WithdrawStage::Confirm { tx_hash } => {
                let event: Withdrawn = confirm(self.client, tx_hash, Action::Withdraw, false).await?;
                ensure_amount(self.amount, event.withdrawn_token)?;
                Ok(Some(WithdrawStep::Done {
                    account: event.account,
                    withdrawn_token: event.withdrawn_token,
                    withdrawn_value: event.withdrawn_value,
                    balance_token: event.balance_token,
                }))
            }
            WithdrawStage::Finished => Ok(None),
        }
    }
}

// ============================================================================
// ROYALTY TYPE
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoyaltyTypeStep {
    Prepared {
        royalty_type: RoyaltyType,
        account: Address,
        nonce: U256,
        signature: Signature,
    },
    Sent {
        tx_hash: H256,
        royalty_type: RoyaltyType,
        account: Address,
    },
    Done {
        royalty_type: RoyaltyType,
        account: Address,
    },
}

impl WorkflowStep for RoyaltyTypeStep {
    fn code(&self) -> StepCode {
        match self {
            RoyaltyTypeStep::Prepared { .. } => StepCode::Prepared,
            RoyaltyTypeStep::Sent { .. } => StepCode::Sent,
            RoyaltyTypeStep::Done { .. } => StepCode::Done,
        }
    }
}

struct RoyaltyTypeFlow<'a> {
    client: &'a LoyaltyClient,
    royalty_type: RoyaltyType,
    submission: Submission,
    stage: SignedStage<(Address, Signature)>,
}

impl Flow for RoyaltyTypeFlow<'_> {
    type Step = RoyaltyTypeStep;

    async fn advance(&mut self) -> Result<Option<RoyaltyTypeStep>> {
        match std::mem::replace(&mut self.stage, SignedStage::Finished) {
            SignedStage::Start => {
                let account = begin(self.client).await?;
                let nonce = self.client.ledger_nonce(account).await?;
                let message = RoyaltyTypeMessage {
                    royalty_type: self.royalty_type,
                    account,
                    nonce,
                    chain_id: self.client.chain().chain_id(),
                };
                let signature = sign(self.client, &message)?;
                self.stage = SignedStage::Submit((account, signature));
                Ok(Some(RoyaltyTypeStep::Prepared {
                    royalty_type: self.royalty_type,
                    account,
                    nonce,
                    signature,
                }))
            }
            SignedStage::Submit((account, signature)) => {
                let (contract, abi) = self.client.exchanger_address();
                let type_value = self.royalty_type.as_u8();
                let tx_hash = Dispatch {
                    contract,
                    abi,
                    function: "changeRoyaltyType",
                    args: vec![
                        Token::Uint(U256::from(type_value)),
                        account.into(),
                        Token::Bytes(signature.to_vec()),
                    ],
                    relay_path: "/v1/ledger/changeRoyaltyType",
                    relay_body: serde_json::json!({
                        "type": type_value,
                        "account": address_hex(&account),
                        "signature": signature,
                    }),
                }
                .send(self.client, self.submission)
                .await?;

                self.stage = SignedStage::Confirm { tx_hash, account };
                Ok(Some(RoyaltyTypeStep::Sent {
                    tx_hash,
                    royalty_type: self.royalty_type,
                    account,
                }))
            }
            SignedStage::Confirm { tx_hash, .. } => {
                let event: ChangedRoyaltyType =
                    confirm(self.client, tx_hash, Action::ChangeRoyaltyType, false).await?;
                let expected = self.royalty_type.as_u8();
                let royalty_type = RoyaltyType::from_u8(event.royalty_type)
                    .filter(|changed| changed.as_u8() == expected)
                    .ok_or(Error::RoyaltyTypeMismatch {
                        expected,
                        received: event.royalty_type,
                    })?;
                Ok(Some(RoyaltyTypeStep::Done {
                    royalty_type,
                    account: event.account,
                }))
            }
            SignedStage::Finished => Ok(None),
        }
    }
}

// ============================================================================
// PAYABLE POINT
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PayablePointStep {
    Prepared {
        phone_hash: H256,
        account: Address,
        /// Unpayable balance that will be converted
        amount: U256,
        nonce: U256,
        signature: Signature,
    },
    Sent {
        tx_hash: H256,
        phone_hash: H256,
        account: Address,
    },
    Done {
        phone_hash: H256,
        account: Address,
        changed_point: U256,
        changed_value: U256,
        balance: U256,
    },
}

impl WorkflowStep for PayablePointStep {
    fn code(&self) -> StepCode {
        match self {
            PayablePointStep::Prepared { .. } => StepCode::Prepared,
            PayablePointStep::Sent { .. } => StepCode::Sent,
            PayablePointStep::Done { .. } => StepCode::Done,
        }
    }
}

struct PayablePointFlow<'a> {
    client: &'a LoyaltyClient,
    phone: String,
    submission: Submission,
    phone_hash: H256,
    amount: U256,
    stage: SignedStage<(Address, Signature)>,
}

impl Flow for PayablePointFlow<'_> {
    type Step = PayablePointStep;

    async fn advance(&mut self) -> Result<Option<PayablePointStep>> {
        match std::mem::replace(&mut self.stage, SignedStage::Finished) {
            SignedStage::Start => {
                let account = begin(self.client).await?;
                self.phone_hash = phone_hash(&self.phone);

                self.amount = self.client.unpayable_point_balance(self.phone_hash).await?;
                if self.amount.is_zero() {
                    return Err(Error::InvalidAmount(self.amount));
                }

                let linked = self.client.phone_hash_to_address(self.phone_hash).await?;
                if linked.is_zero() {
                    return Err(Error::UnregisteredPhone);
                }
                if linked != account {
                    return Err(Error::AddressMismatch {
                        expected: address_hex(&account),
                        found: address_hex(&linked),
                    });
                }

                let nonce = self.client.ledger_nonce(account).await?;
                let message = PayablePointMessage {
                    phone_hash: self.phone_hash,
                    account,
                    nonce,
                    chain_id: self.client.chain().chain_id(),
                };
                let signature = sign(self.client, &message)?;
                self.stage = SignedStage::Submit((account, signature));
                Ok(Some(PayablePointStep::Prepared {
                    phone_hash: self.phone_hash,
                    account,
                    amount: self.amount,
                    nonce,
                    signature,
                }))
            }
            SignedStage::Submit((account, signature)) => {
                let (contract, abi) = self.client.exchanger_address();
                let tx_hash = Dispatch {
                    contract,
                    abi,
                    function: "changeToPayablePoint",
                    args: vec![
                        self.phone_hash.into(),
                        account.into(),
                        Token::Bytes(signature.to_vec()),
                    ],
                    relay_path: "/v1/ledger/changeToPayablePoint",
                    relay_body: serde_json::json!({
                        "phone": encode_hex(self.phone_hash.as_bytes()),
                        "account": address_hex(&account),
                        "signature": signature,
                    }),
                }
                .send(self.client, self.submission)
                .await?;

                self.stage = SignedStage::Confirm { tx_hash, account };
                Ok(Some(PayablePointStep::Sent {
                    tx_hash,
                    phone_hash: self.phone_hash,
                    account,
                }))
            }
            SignedStage::Confirm { tx_hash, account } => {
                let event: ChangedToPayablePoint =
                    confirm(self.client, tx_hash, Action::ChangeToPayablePoint, false).await?;
                ensure_amount(self.amount, event.changed_point)?;
                Ok(Some(PayablePointStep::Done {
                    phone_hash: event.phone_hash,
                    account,
                    changed_point: event.changed_point,
                    changed_value: event.changed_value,
                    balance: event.balance,
                }))
            }
            SignedStage::Finished => Ok(None),
        }
    }
}

// ============================================================================
// TRANSFER
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferStep {
    Prepared {
        from: Address,
        to: Address,
        amount: U256,
        nonce: U256,
        signature: Signature,
    },
    Sent {
        tx_hash: H256,
        from: Address,
        to: Address,
        amount: U256,
    },
    Done {
        from: Address,
        to: Address,
        amount: U256,
        fee: U256,
        balance_of_from: U256,
        balance_of_to: U256,
    },
}

impl WorkflowStep for TransferStep {
    fn code(&self) -> StepCode {
        match self {
            TransferStep::Prepared { .. } => StepCode::Prepared,
            TransferStep::Sent { .. } => StepCode::Sent,
            TransferStep::Done { .. } => StepCode::Done,
        }
    }
}

struct TransferFlow<'a> {
    client: &'a LoyaltyClient,
    to: Address,
    amount: U256,
    submission: Submission,
    stage: SignedStage<(Address, Signature)>,
}

impl Flow for TransferFlow<'_> {
    type Step = TransferStep;

    async fn advance(&mut self) -> Result<Option<TransferStep>> {
        match std::mem::replace(&mut self.stage, SignedStage::Finished) {
            SignedStage::Start => {
                ensure_positive(self.amount)?;
                let from = begin(self.client).await?;
                let balance = self.client.token_balance(from).await?;
                if self.amount > balance {
                    return Err(Error::InsufficientBalance {
                        required: self.amount,
                        available: balance,
                    });
                }

                let nonce = self.client.ledger_nonce(from).await?;
                let message = TransferMessage {
                    from,
                    to: self.to,
                    amount: self.amount,
                    nonce,
                    chain_id: self.client.chain().chain_id(),
                };
                let signature = sign(self.client, &message)?;
                self.stage = SignedStage::Submit((from, signature));
                Ok(Some(TransferStep::Prepared {
                    from,
                    to: self.to,
                    amount: self.amount,
                    nonce,
                    signature,
                }))
            }
            SignedStage::Submit((from, signature)) => {
                let (contract, abi) = self.client.transfer_address();
                let tx_hash = Dispatch {
                    contract,
                    abi,
                    function: "transferToken",
                    args: vec![
                        from.into(),
                        self.to.into(),
                        self.amount.into(),
                        Token::Bytes(signature.to_vec()),
                    ],
                    relay_path: "/v1/ledger/transfer",
                    relay_body: serde_json::json!({
                        "from": address_hex(&from),
                        "to": address_hex(&self.to),
                        "amount": self.amount.to_string(),
                        "signature": signature,
                    }),
                }
                .send(self.client, self.submission)
                .await?;

                self.stage = SignedStage::Confirm { tx_hash, account: from };
                Ok(Some(TransferStep::Sent {
                    tx_hash,
                    from,
                    to: self.to,
                    amount: self.amount,
                }))
            }
            SignedStage::Confirm { tx_hash, .. } => {
                let event: TransferredLoyaltyToken =
                    confirm(self.client, tx_hash, Action::Transfer, false).await?;
                ensure_amount(self.amount, event.amount)?;
                Ok(Some(TransferStep::Done {
                    from: event.from,
                    to: event.to,
                    amount: event.amount,
                    fee: event.fee,
                    balance_of_from: event.balance_of_from,
                    balance_of_to: event.balance_of_to,
                }))
            }
            SignedStage::Finished => Ok(None),
        }
    }
}

// ============================================================================
// ENTRY POINTS
// ============================================================================

impl LoyaltyClient {
    /// Ensures `spender` may spend `amount` of the signer's tokens.
    ///
    /// Emits only `CheckedAllowance` when the current allowance suffices,
    /// otherwise `UpdatingAllowance` then `UpdatedAllowance`.
    pub fn update_allowance(&self, spender: Address, amount: U256) -> Workflow<'_, AllowanceStep> {
        drive(AllowanceFlow::new(self, spender, amount))
    }

    /// Moves `amount` tokens from the signer's wallet into the ledger.
    ///
    /// Fails before any transaction unless `amount` is below the wallet balance.
    pub fn deposit(&self, amount: U256) -> Workflow<'_, DepositStep> {
        drive(DepositFlow {
            client: self,
            amount,
            account: Address::zero(),
            stage: DepositStage::Start,
        })
    }

    /// Moves `amount` tokens from the ledger back to the signer's wallet.
    pub fn withdraw(&self, amount: U256) -> Workflow<'_, WithdrawStep> {
        drive(WithdrawFlow {
            client: self,
            amount,
            stage: WithdrawStage::Start,
        })
    }

    pub fn change_royalty_type(
        &self,
        royalty_type: RoyaltyType,
        submission: Submission,
    ) -> Workflow<'_, RoyaltyTypeStep> {
        drive(RoyaltyTypeFlow {
            client: self,
            royalty_type,
            submission,
            stage: SignedStage::Start,
        })
    }

    /// Converts the points earned under `phone` into payable points of the
    /// signer. The phone must be linked to the signer.
    pub fn change_to_payable_point(
        &self,
        phone: impl Into<String>,
        submission: Submission,
    ) -> Workflow<'_, PayablePointStep> {
        drive(PayablePointFlow {
            client: self,
            phone: phone.into(),
            submission,
            phone_hash: H256::zero(),
            amount: U256::zero(),
            stage: SignedStage::Start,
        })
    }

    /// Transfers ledger tokens from the signer to `to`.
    pub fn transfer(&self, to: Address, amount: U256, submission: Submission) -> Workflow<'_, TransferStep> {
        drive(TransferFlow {
            client: self,
            to,
            amount,
            submission,
            stage: SignedStage::Start,
        })
    }
}
