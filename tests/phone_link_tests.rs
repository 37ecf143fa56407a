//! Workflow tests for phone-number registration (workflow::phone_link module)

use std::time::{Duration, Instant};

use ethereum_types::{H256, U256};
use futures::{StreamExt, TryStreamExt};
use loyalty_sdk::abi::Token;
use loyalty_sdk::crypto::message::phone_hash;
use loyalty_sdk::{Action, Error, PhoneLinkStep, RequestStatus, StepCode, Submission, WorkflowStep};
use serde_json::json;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[path = "helpers.rs"]
mod test_helpers;
use test_helpers::{
    mock_call, mock_call_delayed, mock_call_uint, mock_chain_id, mock_receipt, mock_relay, mock_rpc,
    mock_send_transaction, signer_address, test_client, DUMMY_PHONE_LINK_ADDR, DUMMY_TX_HASH, LOCALHOST_CHAIN_ID,
};

const PHONE: &str = "+82 10-1000-2000";

// ============================================================================
// HELPER FUNCTIONS
// ============================================================================

/// `getRequestItem` result: one struct holding the request.
fn request_item(request_id: H256, status: u64) -> Vec<Token> {
    vec![Token::Tuple(vec![
        Token::FixedBytes(request_id),
        Token::FixedBytes(phone_hash(PHONE)),
        Token::Address(signer_address()),
        Token::Bytes(vec![0x11; 65]),
        Token::Uint(U256::from(status)),
    ])]
}

async fn phone_link_server() -> MockServer {
    let server = MockServer::start().await;
    mock_chain_id(&server, LOCALHOST_CHAIN_ID).await;
    mock_call_uint(&server, DUMMY_PHONE_LINK_ADDR, "nonceOf(address)", 0).await;
    server
}

fn codes(steps: &[PhoneLinkStep]) -> Vec<StepCode> {
    steps.iter().map(WorkflowStep::code).collect()
}

// ============================================================================
// READS
// ============================================================================

/// 1. Test: Request Item Decoding
/// Verifies that request_item() decodes the returned struct including the
/// dynamic signature field and status.
/// Why: Status polling relies on this decoding.
#[tokio::test]
async fn test_request_item_decoding() {
    let server = MockServer::start().await;
    let id = H256::repeat_byte(0x42);
    mock_call(&server, DUMMY_PHONE_LINK_ADDR, "getRequestItem(bytes32)", request_item(id, 1)).await;
    let client = test_client(&server);

    let item = client.request_item(id).await.unwrap();
    assert_eq!(item.request_id, id);
    assert_eq!(item.phone_hash, phone_hash(PHONE));
    assert_eq!(item.account, signer_address());
    assert_eq!(item.signature.len(), 65);
    assert_eq!(item.status, RequestStatus::Requested);
}

/// 2. Test: Unknown Request Status
/// Verifies that a status outside the known range fails with an ABI error.
/// Why: A newer contract status must not be mistaken for a known one.
#[tokio::test]
async fn test_request_item_unknown_status() {
    let server = MockServer::start().await;
    let id = H256::repeat_byte(0x42);
    mock_call(&server, DUMMY_PHONE_LINK_ADDR, "getRequestItem(bytes32)", request_item(id, 9)).await;
    let client = test_client(&server);

    assert!(matches!(client.request_item(id).await, Err(Error::Abi(_))));
}

/// 3. Test: Phone To Address
/// Verifies that phone_to_address() hashes the phone and returns the linked address.
/// Why: Payable point conversion and shop onboarding resolve phones this way.
#[tokio::test]
async fn test_phone_to_address() {
    let server = MockServer::start().await;
    mock_call(&server, DUMMY_PHONE_LINK_ADDR, "toAddress(bytes32)", vec![Token::Address(signer_address())]).await;
    let client = test_client(&server);

    assert_eq!(client.phone_to_address(PHONE).await.unwrap(), signer_address());
}

// ============================================================================
// REGISTER
// ============================================================================

/// 4. Test: Stuck Registration Times Out
/// Verifies that a request whose status never leaves INVALID ends with Timeout
/// and no error.
/// Why: A stuck request is an outcome, not a failure; the caller may retry.
#[tokio::test]
async fn test_register_phone_timeout() {
    let server = phone_link_server().await;
    Mock::given(method("POST"))
        .and(path("/request"))
        .and(body_partial_json(json!({ "phone": PHONE })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "code": 200, "data": {} })))
        .expect(1)
        .mount(&server)
        .await;
    let client = test_client(&server);

    let mut workflow = client.register_phone(PHONE, Submission::Relay);
    let request_id = match workflow.next().await {
        Some(Ok(PhoneLinkStep::Prepared { request_id, phone_hash: hash, .. })) => {
            assert_eq!(hash, phone_hash(PHONE));
            request_id
        }
        other => panic!("expected Prepared, got {:?}", other),
    };
    mock_call(&server, DUMMY_PHONE_LINK_ADDR, "getRequestItem(bytes32)", request_item(request_id, 0)).await;

    let rest: Vec<PhoneLinkStep> = workflow.try_collect().await.unwrap();
    assert_eq!(
        rest,
        vec![
            PhoneLinkStep::Sent { request_id, tx_hash: None },
            PhoneLinkStep::Timeout { request_id },
        ]
    );
}

/// 5. Test: Direct Registration Reaches Requested
/// Verifies that a directly submitted request waits for its receipt and ends
/// with Requested once validators pick it up.
/// Why: Requested tells the application to ask the user for the SMS code.
#[tokio::test]
async fn test_register_phone_direct_requested() {
    let server = phone_link_server().await;
    mock_send_transaction(&server, DUMMY_TX_HASH).await;
    mock_receipt(&server, DUMMY_TX_HASH, vec![]).await;
    let client = test_client(&server);

    let mut workflow = client.register_phone(PHONE, Submission::Direct);
    let request_id = match workflow.next().await {
        Some(Ok(PhoneLinkStep::Prepared { request_id, .. })) => request_id,
        other => panic!("expected Prepared, got {:?}", other),
    };
    mock_call(&server, DUMMY_PHONE_LINK_ADDR, "getRequestItem(bytes32)", request_item(request_id, 1)).await;

    let rest: Vec<PhoneLinkStep> = workflow.try_collect().await.unwrap();
    assert_eq!(codes(&rest), vec![StepCode::Sent, StepCode::Requested]);
    assert!(matches!(rest[0], PhoneLinkStep::Sent { tx_hash: Some(_), .. }));
}

/// 6. Test: Relay Echoes Another Request Id
/// Verifies that a relay reply naming a different request id fails the workflow.
/// Why: Polling the wrong request would report someone else's outcome.
#[tokio::test]
async fn test_register_phone_relay_id_mismatch() {
    let server = phone_link_server().await;
    mock_relay(
        &server,
        "/request",
        json!({ "requestId": "0x0000000000000000000000000000000000000000000000000000000000000001" }),
    )
    .await;
    let client = test_client(&server);

    let result: Result<Vec<PhoneLinkStep>, Error> =
        client.register_phone(PHONE, Submission::Relay).try_collect().await;
    assert!(matches!(result, Err(Error::IdMismatch { .. })));
}

/// 7. Test: Hanging Status Read Respects The Registration Timeout
/// Verifies that a getRequestItem call answering long after the 200 ms
/// registration timeout ends the workflow with Timeout well before the answer.
/// Why: A stalled provider must not stretch the registration window to the
/// HTTP client timeout.
#[tokio::test]
async fn test_register_phone_hanging_read_times_out() {
    let server = phone_link_server().await;
    mock_relay(&server, "/request", json!({})).await;
    let client = test_client(&server);

    let mut workflow = client.register_phone(PHONE, Submission::Relay);
    let request_id = match workflow.next().await {
        Some(Ok(PhoneLinkStep::Prepared { request_id, .. })) => request_id,
        other => panic!("expected Prepared, got {:?}", other),
    };
    mock_call_delayed(
        &server,
        DUMMY_PHONE_LINK_ADDR,
        "getRequestItem(bytes32)",
        request_item(request_id, 1),
        Duration::from_secs(5),
    )
    .await;

    let started = Instant::now();
    let rest: Vec<PhoneLinkStep> = workflow.try_collect().await.unwrap();
    assert_eq!(rest.last(), Some(&PhoneLinkStep::Timeout { request_id }));
    assert!(started.elapsed() < Duration::from_secs(2), "took {:?}", started.elapsed());
}

/// 8. Test: Reverted Direct Registration
/// Verifies that a directly submitted request whose transaction reverts fails
/// with FailedOperation naming phone registration.
/// Why: Polling a request that never reached the contract would only time out.
#[tokio::test]
async fn test_register_phone_direct_reverted() {
    let server = phone_link_server().await;
    mock_send_transaction(&server, DUMMY_TX_HASH).await;
    mock_rpc(
        &server,
        "eth_getTransactionReceipt",
        json!({ "transactionHash": DUMMY_TX_HASH, "blockNumber": "0x1", "status": "0x0", "logs": [] }),
    )
    .await;
    let client = test_client(&server);

    let result: Result<Vec<PhoneLinkStep>, Error> =
        client.register_phone(PHONE, Submission::Direct).try_collect().await;
    assert!(matches!(result, Err(Error::FailedOperation(Action::RegisterPhone))));
}

// ============================================================================
// SUBMIT CODE
// ============================================================================

/// 9. Test: Submitted Code Accepted
/// Verifies that submit_phone() posts the code and ends with Accepted once the
/// request leaves REQUESTED.
/// Why: Accepted is the only outcome after which the phone is linked.
#[tokio::test]
async fn test_submit_phone_accepted() {
    let server = MockServer::start().await;
    mock_chain_id(&server, LOCALHOST_CHAIN_ID).await;
    let request_id = H256::repeat_byte(0x42);
    Mock::given(method("POST"))
        .and(path("/submit"))
        .and(body_partial_json(json!({ "code": "123456" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "code": 200, "data": {} })))
        .expect(1)
        .mount(&server)
        .await;
    mock_call(&server, DUMMY_PHONE_LINK_ADDR, "getRequestItem(bytes32)", request_item(request_id, 2)).await;
    let client = test_client(&server);

    let steps: Vec<PhoneLinkStep> = client.submit_phone(request_id, "123456").try_collect().await.unwrap();
    assert_eq!(codes(&steps), vec![StepCode::Sent, StepCode::Accepted]);
    assert_eq!(steps[1], PhoneLinkStep::Accepted { request_id });
}

/// 10. Test: Submitted Code Rejected
/// Verifies that a request moving to REJECTED ends with Rejected.
/// Why: A wrong code must be reported without raising an error.
#[tokio::test]
async fn test_submit_phone_rejected() {
    let server = MockServer::start().await;
    mock_chain_id(&server, LOCALHOST_CHAIN_ID).await;
    let request_id = H256::repeat_byte(0x43);
    mock_relay(&server, "/submit", json!({})).await;
    mock_call(&server, DUMMY_PHONE_LINK_ADDR, "getRequestItem(bytes32)", request_item(request_id, 3)).await;
    let client = test_client(&server);

    let steps: Vec<PhoneLinkStep> = client.submit_phone(request_id, "000000").try_collect().await.unwrap();
    assert_eq!(steps.last(), Some(&PhoneLinkStep::Rejected { request_id }));
}
