//! Unit tests for the relay client (relay module)

use ethereum_types::U256;
use loyalty_sdk::abi::Token;
use loyalty_sdk::{Error, LoyaltyClient};
use serde_json::{json, Value};
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[path = "helpers.rs"]
mod test_helpers;
use test_helpers::{addr, mock_call, test_client, test_params, DUMMY_OTHER_ADDR, DUMMY_PHONE_LINK_ADDR};

// ============================================================================
// HEALTH CHECK
// ============================================================================

/// 1. Test: Relay Is Up
/// Verifies that is_up() returns true when GET / answers with the literal body OK.
/// Why: Applications choose between relay and direct submission with this check.
#[tokio::test]
async fn test_is_up_ok() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(200).set_body_string("OK"))
        .mount(&server)
        .await;
    let client = test_client(&server);

    assert!(client.relay().is_up(client.chain()).await);
}

/// 2. Test: Relay Is Down On Any Other Body
/// Verifies that is_up() returns false (never an error) for another body or status.
/// Why: A relay answering with an error page must not count as healthy.
#[tokio::test]
async fn test_is_up_other_body() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(500).set_body_string("maintenance"))
        .mount(&server)
        .await;
    let client = test_client(&server);

    assert!(!client.relay().is_up(client.chain()).await);
}

/// 3. Test: Relay Unreachable
/// Verifies that is_up() returns false when nothing listens on the endpoint.
/// Why: is_up() must never fail, even on connection errors.
#[tokio::test]
async fn test_is_up_unreachable() {
    let mut params = test_params("http://127.0.0.1:9");
    params.relay_endpoint = Some("http://127.0.0.1:9".to_string());
    let client = LoyaltyClient::from_params(params).unwrap();

    assert!(!client.relay().is_up(client.chain()).await);
}

// ============================================================================
// RESPONSE ENVELOPE
// ============================================================================

/// 4. Test: Successful Envelope Returns Data
/// Verifies that post() returns the data payload and sends the access key.
/// Why: Every relayed workflow reads its transaction hash from this payload.
#[tokio::test]
async fn test_post_success_with_access_key() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/ledger/transfer"))
        .and(header("Authorization", "test-access-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "code": 200,
            "data": { "txHash": "0x01" }
        })))
        .expect(1)
        .mount(&server)
        .await;
    let client = test_client(&server);

    let data: Value = client
        .relay()
        .post(client.chain(), "/v1/ledger/transfer", &json!({}))
        .await
        .unwrap();
    assert_eq!(data["txHash"], "0x01");
}

/// 5. Test: Top-Level Error Code
/// Verifies that a non-200 envelope code becomes Error::Relay with the server message.
/// Why: Relay application errors (bad signature, stale nonce) must reach the caller.
#[tokio::test]
async fn test_post_top_level_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/payment/point"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "code": 400,
            "error": { "message": "Invalid signature" }
        })))
        .mount(&server)
        .await;
    let client = test_client(&server);

    let result: Result<Value, Error> = client
        .relay()
        .post(client.chain(), "/v1/payment/point", &json!({}))
        .await;
    match result {
        Err(Error::Relay { code, message }) => {
            assert_eq!(code, 400);
            assert_eq!(message, "Invalid signature");
        }
        other => panic!("expected Relay error, got {:?}", other),
    }
}

/// 6. Test: Nested Data Code
/// Verifies that a 200 envelope whose data carries a non-200 code still fails.
/// Why: The relay reports contract-level rejections inside data.
#[tokio::test]
async fn test_post_nested_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/shop/add"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "code": 200,
            "data": { "code": 501, "error": { "message": "Shop already exists" } }
        })))
        .mount(&server)
        .await;
    let client = test_client(&server);

    let result: Result<Value, Error> = client.relay().post(client.chain(), "/v1/shop/add", &json!({})).await;
    assert!(matches!(
        result,
        Err(Error::Relay { code: 501, ref message }) if message == "Shop already exists"
    ));
}

// ============================================================================
// VALIDATOR DISCOVERY
// ============================================================================

fn validator(endpoint: &str, status: u64) -> Token {
    Token::Tuple(vec![
        Token::Address(addr(DUMMY_OTHER_ADDR)),
        Token::Uint(U256::zero()),
        Token::String(endpoint.to_string()),
        Token::Uint(U256::from(status)),
    ])
}

/// 7. Test: Endpoint From Registered Validator
/// Verifies that without a static relay endpoint the URL is built from an active
/// validator read from the phone-link contract; inactive ones are skipped.
/// Why: Production deployments discover relays on-chain.
#[tokio::test]
async fn test_endpoint_from_validator() {
    let server = MockServer::start().await;
    let relay = MockServer::start().await;
    mock_call(
        &server,
        DUMMY_PHONE_LINK_ADDR,
        "getValidators()",
        vec![Token::Array(vec![
            validator("http://127.0.0.1:9", 2),
            validator(&relay.uri(), 1),
        ])],
    )
    .await;

    let mut params = test_params(&server.uri());
    params.relay_endpoint = None;
    let client = LoyaltyClient::from_params(params).unwrap();

    let url = client.relay().endpoint(client.chain(), "/request").await.unwrap();
    assert_eq!(url.as_str(), format!("{}/request", relay.uri()));

    let validators = client.validators().await.unwrap();
    assert_eq!(validators.len(), 2);
    assert!(!validators[0].is_active());
    assert!(validators[1].is_active());
}

/// 8. Test: No Validators Registered
/// Verifies that endpoint() fails with NoValidators when the registry is empty.
/// Why: Relayed workflows must fail before signing anything they cannot submit.
#[tokio::test]
async fn test_endpoint_without_validators() {
    let server = MockServer::start().await;
    mock_call(&server, DUMMY_PHONE_LINK_ADDR, "getValidators()", vec![Token::Array(vec![])]).await;

    let mut params = test_params(&server.uri());
    params.relay_endpoint = None;
    let client = LoyaltyClient::from_params(params).unwrap();

    assert!(matches!(
        client.relay().endpoint(client.chain(), "/request").await,
        Err(Error::NoValidators)
    ));
}
