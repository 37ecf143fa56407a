//! Loyalty SDK
//!
//! Client library for the loyalty-token ledger: balances, payments, royalty
//! settings, phone-number linking, shop management and bridge transfers.
//! State-changing actions are exposed as step-by-step workflows that the
//! caller drives; see [`workflow`].

pub mod abi;
pub mod chain;
pub mod client;
pub mod config;
pub mod contracts;
pub mod crypto;
pub mod error;
pub mod indexer;
pub mod relay;
pub mod types;
pub mod workflow;

// Re-export public types for convenience
pub use chain::{ChainAccess, ConnectedSigner, Contract};
pub use client::LoyaltyClient;
pub use config::{Context, ContextParams, PollingSettings, PrivateKey, SupportedNetwork};
pub use crypto::{SignableMessage, Signature, Signer};
pub use error::{Action, ConfigError, Error, ErrorCategory, Result};
pub use indexer::{Direction, IndexerAccess, QueryOptions};
pub use relay::RelayAccess;
pub use types::{
    PaymentMethod, PhoneLinkRequest, RequestStatus, RoyaltyType, ShopInfo, ShopStatus, ValidatorInfo,
};
pub use workflow::{
    AllowanceStep, BridgeStep, CancelPaymentStep, CancelRequest, DepositStep, PayablePointStep,
    PaymentAuthorization, PaymentRequest, PaymentStep, PhoneLinkStep, RoyaltyTypeStep, ShopAuthorization,
    ShopOutcome, ShopStep, StepCode, Submission, TransferStep, WithdrawStep, Workflow, WorkflowStep,
};
