//! Error Types
//!
//! All fallible SDK operations return [`Result`]. Variants are grouped by the
//! category a caller usually needs to react to (see [`ErrorCategory`]).
//!
//! An error raised after a workflow emitted its `Sent` step does not mean the
//! transaction was discarded: it may still land on-chain, verify it by hash.

use ethereum_types::{H256, U256};
use thiserror::Error;

/// Result alias used across the crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;

// ============================================================================
// CONFIGURATION ERRORS
// ============================================================================

/// Configuration errors raised synchronously while building or merging a context.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing configuration field: {0}")]
    MissingField(&'static str),

    #[error("Unsupported network: {0}")]
    UnsupportedNetwork(String),

    #[error("Invalid address for {field}: {value}")]
    InvalidAddress { field: &'static str, value: String },

    #[error("Invalid URL for {field}: {value}")]
    InvalidUrl { field: &'static str, value: String },

    #[error("Unsupported protocol for {field}: {protocol} (expected http or https)")]
    UnsupportedProtocol {
        field: &'static str,
        protocol: String,
    },

    #[error("Invalid private key: {0}")]
    InvalidPrivateKey(String),

    #[error("Environment variable '{0}' not set")]
    MissingEnv(String),

    #[error("Failed to read configuration file '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),
}

// ============================================================================
// SDK ERRORS
// ============================================================================

/// The action a failed-operation error refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Approve,
    Deposit,
    Withdraw,
    PayPoint,
    PayToken,
    CancelPayment,
    ChangeRoyaltyType,
    ChangeToPayablePoint,
    Transfer,
    RegisterPhone,
    AddShop,
    UpdateShop,
    RemoveShop,
    OpenWithdrawal,
    CloseWithdrawal,
    BridgeDeposit,
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Action::Approve => "approve",
            Action::Deposit => "deposit",
            Action::Withdraw => "withdraw",
            Action::PayPoint => "pay with point",
            Action::PayToken => "pay with token",
            Action::CancelPayment => "cancel payment",
            Action::ChangeRoyaltyType => "change royalty type",
            Action::ChangeToPayablePoint => "change to payable point",
            Action::Transfer => "transfer",
            Action::RegisterPhone => "register phone",
            Action::AddShop => "add shop",
            Action::UpdateShop => "update shop",
            Action::RemoveShop => "remove shop",
            Action::OpenWithdrawal => "open withdrawal",
            Action::CloseWithdrawal => "close withdrawal",
            Action::BridgeDeposit => "deposit to bridge",
        };
        f.write_str(name)
    }
}

/// Coarse classification of [`Error`] values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Configuration,
    Connectivity,
    Authorization,
    ProtocolMismatch,
    Relay,
    DomainState,
}

/// Error type of the SDK.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),

    // ------------------------------------------------------------------ connectivity
    #[error("No web3 provider configured")]
    NoProvider,

    #[error("No signer configured")]
    NoSigner,

    #[error("Cannot shift provider: at least 2 providers are required, {0} configured")]
    NotEnoughProviders(usize),

    #[error("All {0} providers are offline")]
    ProvidersOffline(usize),

    #[error("No GraphQL node configured")]
    NoGraphqlNode,

    #[error("Cannot shift GraphQL node: at least 2 nodes are required, {0} configured")]
    NotEnoughGraphqlNodes(usize),

    #[error("All {0} GraphQL nodes are offline")]
    GraphqlNodesOffline(usize),

    #[error("Network mismatch: context expects chain {expected}, provider reports {actual}")]
    NetworkMismatch { expected: u64, actual: u64 },

    #[error("HTTP request to {url} failed: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("JSON-RPC error from {url}: {message} (code: {code})")]
    Rpc {
        url: String,
        code: i64,
        message: String,
    },

    #[error("Timed out waiting for receipt of transaction {0:?}")]
    ReceiptTimeout(H256),

    #[error("Transaction not found: {0:?}")]
    TransactionNotFound(H256),

    // ------------------------------------------------------------------ authorization
    #[error("Invalid signature: {0}")]
    InvalidSignature(String),

    #[error("Transaction {0:?} reverted")]
    TransactionReverted(H256),

    // ------------------------------------------------------------------ protocol
    #[error("Failed to {0}: expected event not found in receipt")]
    FailedOperation(Action),

    #[error("Amount mismatch: expected {expected}, received {received}")]
    AmountMismatch { expected: U256, received: U256 },

    #[error("Royalty type mismatch: expected {expected}, received {received}")]
    RoyaltyTypeMismatch { expected: u8, received: u8 },

    #[error("Identifier mismatch: expected {expected:?}, received {received:?}")]
    IdMismatch { expected: H256, received: H256 },

    #[error("Failed to decode ABI data: {0}")]
    Abi(String),

    #[error("Function '{function}' is not part of the {contract} ABI")]
    UnknownFunction {
        contract: &'static str,
        function: String,
    },

    #[error("Empty contract ABI")]
    EmptyAbi,

    #[error("Empty contract address")]
    EmptyAddress,

    // ------------------------------------------------------------------ relay
    #[error("Relay error (code {code}): {message}")]
    Relay { code: i64, message: String },

    #[error("No validators registered")]
    NoValidators,

    #[error("GraphQL query '{query}' failed: {message}")]
    Indexer { query: String, message: String },

    // ------------------------------------------------------------------ domain state
    #[error("Insufficient balance: required {required}, available {available}")]
    InsufficientBalance { required: U256, available: U256 },

    #[error("Phone number is not linked to any address")]
    UnregisteredPhone,

    #[error("Address mismatch: expected {expected}, found {found}")]
    AddressMismatch { expected: String, found: String },

    #[error("Invalid amount: {0}")]
    InvalidAmount(U256),

    #[error("Could not generate an unused identifier after {0} attempts")]
    IdentifierExhausted(usize),
}

impl Error {
    /// Classifies this error into one of the taxonomy categories.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::Config(_) => ErrorCategory::Configuration,
            Error::NoProvider
            | Error::NoSigner
            | Error::NotEnoughProviders(_)
            | Error::ProvidersOffline(_)
            | Error::NoGraphqlNode
            | Error::NotEnoughGraphqlNodes(_)
            | Error::GraphqlNodesOffline(_)
            | Error::NetworkMismatch { .. }
            | Error::Http { .. }
            | Error::Rpc { .. }
            | Error::ReceiptTimeout(_)
            | Error::TransactionNotFound(_) => ErrorCategory::Connectivity,
            Error::InvalidSignature(_) | Error::TransactionReverted(_) => {
                ErrorCategory::Authorization
            }
            Error::FailedOperation(_)
            | Error::AmountMismatch { .. }
            | Error::RoyaltyTypeMismatch { .. }
            | Error::IdMismatch { .. }
            | Error::Abi(_)
            | Error::UnknownFunction { .. }
            | Error::EmptyAbi
            | Error::EmptyAddress => ErrorCategory::ProtocolMismatch,
            Error::Relay { .. } | Error::NoValidators | Error::Indexer { .. } => {
                ErrorCategory::Relay
            }
            Error::InsufficientBalance { .. }
            | Error::UnregisteredPhone
            | Error::AddressMismatch { .. }
            | Error::InvalidAmount(_)
            | Error::IdentifierExhausted(_) => ErrorCategory::DomainState,
        }
    }

    pub(crate) fn http(url: impl Into<String>, source: reqwest::Error) -> Self {
        Error::Http {
            url: url.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_per_variant_group() {
        let hash = H256::repeat_byte(1);
        let cases = vec![
            (Error::Config(ConfigError::MissingField("network")), ErrorCategory::Configuration),
            (Error::NoSigner, ErrorCategory::Connectivity),
            (Error::NetworkMismatch { expected: 1, actual: 2 }, ErrorCategory::Connectivity),
            (Error::ReceiptTimeout(hash), ErrorCategory::Connectivity),
            (Error::TransactionReverted(hash), ErrorCategory::Authorization),
            (Error::InvalidSignature("short".to_string()), ErrorCategory::Authorization),
            (Error::FailedOperation(Action::RegisterPhone), ErrorCategory::ProtocolMismatch),
            (
                Error::AmountMismatch {
                    expected: U256::one(),
                    received: U256::zero(),
                },
                ErrorCategory::ProtocolMismatch,
            ),
            (Error::EmptyAddress, ErrorCategory::ProtocolMismatch),
            (Error::NoValidators, ErrorCategory::Relay),
            (
                Error::Relay {
                    code: 400,
                    message: "bad".to_string(),
                },
                ErrorCategory::Relay,
            ),
            (Error::UnregisteredPhone, ErrorCategory::DomainState),
            (Error::IdentifierExhausted(10), ErrorCategory::DomainState),
        ];

        for (error, category) in cases {
            assert_eq!(error.category(), category, "{}", error);
        }
    }

    #[test]
    fn test_failed_operation_names_the_action() {
        assert_eq!(
            Error::FailedOperation(Action::RegisterPhone).to_string(),
            "Failed to register phone: expected event not found in receipt"
        );
    }
}
