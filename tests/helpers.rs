//! Shared test helpers for loyalty SDK integration tests
//!
//! Provides dummy constants, a context builder pointing at a mock server, and
//! JSON-RPC mocks for calls, transactions and receipts.

#![allow(dead_code)]

use std::time::Duration;

use ethereum_types::{Address, H256, U256};
use loyalty_sdk::abi::{self, address_hex, encode_hex, Token};
use loyalty_sdk::{ContextParams, LoyaltyClient, PrivateKey, Signer};
use serde_json::{json, Value};
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Match, Mock, MockServer, Request, ResponseTemplate};

// ============================================================================
// CONSTANTS
// ============================================================================

// -------------------------------- SIGNER --------------------------------

/// Dummy signer private key (32 bytes, hex)
pub const DUMMY_PRIVATE_KEY: &str =
    "0x4c0883a69102937d6231471b5dbb6204fe5129617082792ae468d01a3f362318";

/// Dummy recipient / foreign account (EVM format, 40 hex characters)
pub const DUMMY_OTHER_ADDR: &str = "0x0000000000000000000000000000000000000099";

// ------------------------------ CONTRACTS -------------------------------

pub const DUMMY_LEDGER_ADDR: &str = "0x000000000000000000000000000000000000000a";
pub const DUMMY_TOKEN_ADDR: &str = "0x000000000000000000000000000000000000000b";
pub const DUMMY_PHONE_LINK_ADDR: &str = "0x000000000000000000000000000000000000000c";
pub const DUMMY_VALIDATOR_ADDR: &str = "0x000000000000000000000000000000000000000d";
pub const DUMMY_CURRENCY_RATE_ADDR: &str = "0x000000000000000000000000000000000000000e";
pub const DUMMY_SHOP_ADDR: &str = "0x000000000000000000000000000000000000000f";
pub const DUMMY_PROVIDER_ADDR: &str = "0x0000000000000000000000000000000000000010";
pub const DUMMY_CONSUMER_ADDR: &str = "0x0000000000000000000000000000000000000011";
pub const DUMMY_EXCHANGER_ADDR: &str = "0x0000000000000000000000000000000000000012";
pub const DUMMY_TRANSFER_ADDR: &str = "0x0000000000000000000000000000000000000013";
pub const DUMMY_LOYALTY_BRIDGE_ADDR: &str = "0x0000000000000000000000000000000000000014";
pub const DUMMY_BRIDGE_ADDR: &str = "0x0000000000000000000000000000000000000015";

// ---------------------------- TRANSACTIONS ------------------------------

/// Dummy transaction hash (64 hex characters)
pub const DUMMY_TX_HASH: &str =
    "0x00000000000000000000000000000000000000000000000000000000000000aa";

/// Chain id of the `localhost` network
pub const LOCALHOST_CHAIN_ID: u64 = 31337;

// ============================================================================
// CONTEXT
// ============================================================================

pub fn signer() -> Signer {
    Signer::from_private_key(DUMMY_PRIVATE_KEY).unwrap()
}

pub fn signer_address() -> Address {
    signer().address()
}

pub fn addr(value: &str) -> Address {
    loyalty_sdk::config::parse_address("test", value).unwrap()
}

pub fn tx_hash() -> H256 {
    DUMMY_TX_HASH.parse().unwrap()
}

/// Complete parameters with every endpoint on `base_url` and short poll timings.
pub fn test_params(base_url: &str) -> ContextParams {
    ContextParams {
        network: Some("localhost".to_string()),
        signer: Some(PrivateKey::new(DUMMY_PRIVATE_KEY)),
        private_key_env: None,
        web3_providers: Some(vec![base_url.to_string()]),
        relay_endpoint: Some(base_url.to_string()),
        relay_access_key: Some("test-access-key".to_string()),
        ledger_address: Some(DUMMY_LEDGER_ADDR.to_string()),
        token_address: Some(DUMMY_TOKEN_ADDR.to_string()),
        phone_link_address: Some(DUMMY_PHONE_LINK_ADDR.to_string()),
        validator_address: Some(DUMMY_VALIDATOR_ADDR.to_string()),
        currency_rate_address: Some(DUMMY_CURRENCY_RATE_ADDR.to_string()),
        shop_address: Some(DUMMY_SHOP_ADDR.to_string()),
        loyalty_provider_address: Some(DUMMY_PROVIDER_ADDR.to_string()),
        loyalty_consumer_address: Some(DUMMY_CONSUMER_ADDR.to_string()),
        loyalty_exchanger_address: Some(DUMMY_EXCHANGER_ADDR.to_string()),
        loyalty_transfer_address: Some(DUMMY_TRANSFER_ADDR.to_string()),
        loyalty_bridge_address: Some(DUMMY_LOYALTY_BRIDGE_ADDR.to_string()),
        bridge_address: Some(DUMMY_BRIDGE_ADDR.to_string()),
        graphql_nodes: Some(vec![format!("{}/graphql", base_url)]),
        receipt_poll_interval_ms: Some(10),
        receipt_timeout_ms: Some(2_000),
        registration_poll_interval_ms: Some(20),
        registration_timeout_ms: Some(200),
    }
}

pub fn test_client(server: &MockServer) -> LoyaltyClient {
    LoyaltyClient::from_params(test_params(&server.uri())).unwrap()
}

// ============================================================================
// JSON-RPC MOCKS
// ============================================================================

pub fn rpc_result(result: Value) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "jsonrpc": "2.0",
        "result": result,
        "id": 1
    }))
}

/// Answers every `method_name` request with `result`.
pub async fn mock_rpc(server: &MockServer, method_name: &str, result: Value) {
    Mock::given(method("POST"))
        .and(path("/"))
        .and(body_partial_json(json!({ "method": method_name })))
        .respond_with(rpc_result(result))
        .mount(server)
        .await;
}

pub async fn mock_chain_id(server: &MockServer, chain_id: u64) {
    mock_rpc(server, "eth_chainId", json!(format!("0x{:x}", chain_id))).await;
}

/// Matches `eth_call` requests to `to` whose call data starts with `selector`.
pub struct EthCall {
    to: String,
    selector: String,
}

impl EthCall {
    pub fn new(to: &str, signature: &str) -> Self {
        Self {
            to: address_hex(&addr(to)),
            selector: encode_hex(&abi::selector(signature)),
        }
    }
}

impl Match for EthCall {
    fn matches(&self, request: &Request) -> bool {
        let body: Value = match serde_json::from_slice(&request.body) {
            Ok(body) => body,
            Err(_) => return false,
        };
        if body["method"] != "eth_call" {
            return false;
        }
        let call = &body["params"][0];
        let to_matches = call["to"]
            .as_str()
            .map_or(false, |to| to.eq_ignore_ascii_case(&self.to));
        let data_matches = call["data"]
            .as_str()
            .map_or(false, |data| data.starts_with(&self.selector));
        to_matches && data_matches
    }
}

/// Answers `signature` calls on contract `to` with the ABI encoding of `returns`.
pub async fn mock_call(server: &MockServer, to: &str, signature: &str, returns: Vec<Token>) {
    Mock::given(method("POST"))
        .and(EthCall::new(to, signature))
        .respond_with(rpc_result(json!(encode_hex(&abi::encode(&returns)))))
        .mount(server)
        .await;
}

/// Like [`mock_call`], but every answer is held back for `delay`.
pub async fn mock_call_delayed(server: &MockServer, to: &str, signature: &str, returns: Vec<Token>, delay: Duration) {
    Mock::given(method("POST"))
        .and(EthCall::new(to, signature))
        .respond_with(rpc_result(json!(encode_hex(&abi::encode(&returns)))).set_delay(delay))
        .mount(server)
        .await;
}

pub async fn mock_call_uint(server: &MockServer, to: &str, signature: &str, value: u64) {
    mock_call(server, to, signature, vec![Token::Uint(U256::from(value))]).await;
}

/// Mocks nonce, gas price, gas estimate and broadcast. Every sent transaction
/// gets `hash`.
pub async fn mock_send_transaction(server: &MockServer, hash: &str) {
    mock_rpc(server, "eth_getTransactionCount", json!("0x0")).await;
    mock_rpc(server, "eth_gasPrice", json!("0x3b9aca00")).await;
    mock_rpc(server, "eth_estimateGas", json!("0x5208")).await;
    mock_rpc(server, "eth_sendRawTransaction", json!(hash)).await;
}

/// A log carrying `signature`'s topic and `data` ABI encoded.
pub fn event_log(contract: &str, signature: &str, indexed: Vec<H256>, data: Vec<Token>) -> Value {
    let mut topics = vec![encode_hex(abi::event_topic(signature).as_bytes())];
    topics.extend(indexed.iter().map(|topic| encode_hex(topic.as_bytes())));
    json!({
        "address": contract,
        "topics": topics,
        "data": encode_hex(&abi::encode(&data)),
        "blockNumber": "0x1",
        "transactionHash": DUMMY_TX_HASH
    })
}

/// Answers every receipt request with a successful receipt holding `logs`.
pub async fn mock_receipt(server: &MockServer, hash: &str, logs: Vec<Value>) {
    mock_rpc(
        server,
        "eth_getTransactionReceipt",
        json!({
            "transactionHash": hash,
            "blockNumber": "0x1",
            "status": "0x1",
            "logs": logs
        }),
    )
    .await;
}

/// Answers `eth_getTransactionByHash` with a mined transaction.
pub async fn mock_transaction(server: &MockServer, hash: &str, from: Address) {
    mock_rpc(
        server,
        "eth_getTransactionByHash",
        json!({
            "hash": hash,
            "from": address_hex(&from),
            "to": DUMMY_CONSUMER_ADDR,
            "nonce": "0x0",
            "blockNumber": "0x1",
            "input": "0x"
        }),
    )
    .await;
}

/// Left-pads an address into an indexed topic.
pub fn address_topic(address: Address) -> H256 {
    let mut topic = [0u8; 32];
    topic[12..].copy_from_slice(address.as_bytes());
    H256::from(topic)
}

// ============================================================================
// RELAY MOCKS
// ============================================================================

/// Answers POST `relay_path` with a successful envelope around `data`.
pub async fn mock_relay(server: &MockServer, relay_path: &str, data: Value) {
    Mock::given(method("POST"))
        .and(path(relay_path))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "code": 200,
            "data": data
        })))
        .mount(server)
        .await;
}
