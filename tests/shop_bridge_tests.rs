//! Workflow tests for shop management and bridge transfers
//! (workflow::shop and workflow::bridge modules)

use ethereum_types::{H256, U256};
use futures::{StreamExt, TryStreamExt};
use loyalty_sdk::abi::Token;
use loyalty_sdk::{
    BridgeStep, ConfigError, Error, LoyaltyClient, ShopOutcome, ShopStatus, ShopStep, StepCode, Submission,
    WorkflowStep,
};
use serde_json::json;
use wiremock::MockServer;

#[path = "helpers.rs"]
mod test_helpers;
use test_helpers::{
    addr, event_log, mock_call, mock_call_uint, mock_chain_id, mock_receipt, mock_relay, mock_send_transaction,
    signer_address, test_client, test_params, DUMMY_BRIDGE_ADDR, DUMMY_OTHER_ADDR, DUMMY_SHOP_ADDR,
    DUMMY_TOKEN_ADDR, DUMMY_TX_HASH, LOCALHOST_CHAIN_ID,
};

// ============================================================================
// HELPER FUNCTIONS
// ============================================================================

fn existing_shop_id() -> H256 {
    H256::repeat_byte(0x5a)
}

/// `shopOf` result for a shop owned by `owner` with `withdrawable` available.
fn shop_of(owner: ethereum_types::Address, withdrawable: u64) -> Vec<Token> {
    vec![Token::Tuple(vec![
        Token::FixedBytes(existing_shop_id()),
        Token::String("Shop 1".to_string()),
        Token::String("krw".to_string()),
        Token::Address(owner),
        Token::Uint(U256::from(10_000u64)),
        Token::Uint(U256::from(2_000u64)),
        Token::Uint(U256::from(withdrawable)),
        Token::Uint(U256::from(1u64)),
        Token::Bool(false),
    ])]
}

async fn shop_server() -> MockServer {
    let server = MockServer::start().await;
    mock_chain_id(&server, LOCALHOST_CHAIN_ID).await;
    mock_call_uint(&server, DUMMY_SHOP_ADDR, "nonceOf(address)", 0).await;
    server
}

fn codes<S: WorkflowStep>(steps: &[S]) -> Vec<StepCode> {
    steps.iter().map(WorkflowStep::code).collect()
}

// ============================================================================
// SHOP
// ============================================================================

/// 1. Test: Shop Info Decoding
/// Verifies that shop_info() decodes every field of the returned struct.
/// Why: Ownership and withdrawal checks read these fields.
#[tokio::test]
async fn test_shop_info_decoding() {
    let server = MockServer::start().await;
    mock_call(&server, DUMMY_SHOP_ADDR, "shopOf(bytes32)", shop_of(signer_address(), 8_000)).await;
    let client = test_client(&server);

    let info = client.shop_info(existing_shop_id()).await.unwrap();
    assert_eq!(info.name, "Shop 1");
    assert_eq!(info.account, signer_address());
    assert_eq!(info.withdrawable_amount, U256::from(8_000u64));
    assert_eq!(info.status, ShopStatus::Active);
    assert!(!info.withdrawal_open);
}

/// 2. Test: Add Shop Under A Fresh Id
/// Verifies that add_shop() draws an available id, relays the signed request and
/// confirms AddedShop for that id.
/// Why: Shop ids are chosen client-side and must not collide.
#[tokio::test]
async fn test_add_shop_relay() {
    let server = shop_server().await;
    mock_call(&server, DUMMY_SHOP_ADDR, "isAvailableId(bytes32)", vec![Token::Bool(true)]).await;
    mock_relay(&server, "/v1/shop/add", json!({ "txHash": DUMMY_TX_HASH })).await;
    let client = test_client(&server);

    let mut workflow = client.add_shop("Shop 1", "krw", Submission::Relay);
    let shop_id = match workflow.next().await {
        Some(Ok(ShopStep::Prepared(auth))) => {
            assert_eq!(auth.account, signer_address());
            auth.shop_id
        }
        other => panic!("expected Prepared, got {:?}", other),
    };
    mock_receipt(
        &server,
        DUMMY_TX_HASH,
        vec![event_log(
            DUMMY_SHOP_ADDR,
            "AddedShop(bytes32,string,string,address)",
            vec![],
            vec![
                Token::FixedBytes(shop_id),
                Token::String("Shop 1".to_string()),
                Token::String("krw".to_string()),
                Token::Address(signer_address()),
            ],
        )],
    )
    .await;

    let rest: Vec<ShopStep> = workflow.try_collect().await.unwrap();
    assert_eq!(codes(&rest), vec![StepCode::Sent, StepCode::Done]);
    assert!(matches!(&rest[1], ShopStep::Done(ShopOutcome::Added(event)) if event.0.shop_id == shop_id));
}

/// 3. Test: No Free Shop Id
/// Verifies that add_shop() gives up with IdentifierExhausted when every drawn id
/// is taken.
/// Why: The id search must terminate.
#[tokio::test]
async fn test_add_shop_ids_exhausted() {
    let server = shop_server().await;
    mock_call(&server, DUMMY_SHOP_ADDR, "isAvailableId(bytes32)", vec![Token::Bool(false)]).await;
    let client = test_client(&server);

    let mut workflow = client.add_shop("Shop 1", "krw", Submission::Direct);
    assert!(matches!(workflow.next().await, Some(Err(Error::IdentifierExhausted(10)))));
}

/// 4. Test: Only The Owner May Update
/// Verifies that update_shop() on a shop owned by another address fails before
/// signing.
/// Why: The contract would reject it anyway; failing early saves a nonce.
#[tokio::test]
async fn test_update_shop_not_owner() {
    let server = shop_server().await;
    mock_call(&server, DUMMY_SHOP_ADDR, "shopOf(bytes32)", shop_of(addr(DUMMY_OTHER_ADDR), 0)).await;
    let client = test_client(&server);

    let mut workflow = client.update_shop(existing_shop_id(), "Shop 2", "usd", Submission::Direct);
    match workflow.next().await {
        Some(Err(Error::AddressMismatch { found, .. })) => assert_eq!(found, DUMMY_OTHER_ADDR),
        other => panic!("expected AddressMismatch, got {:?}", other),
    }
}

/// 5. Test: Withdrawal Above Withdrawable Amount
/// Verifies that open_withdrawal() fails when the amount exceeds the shop's
/// withdrawable amount.
/// Why: Settlement must never pay out more than the shop earned.
#[tokio::test]
async fn test_open_withdrawal_exceeds_withdrawable() {
    let server = shop_server().await;
    mock_call(&server, DUMMY_SHOP_ADDR, "shopOf(bytes32)", shop_of(signer_address(), 8_000)).await;
    let client = test_client(&server);

    let result: Result<Vec<ShopStep>, Error> = client
        .open_withdrawal(existing_shop_id(), U256::from(8_001u64), Submission::Direct)
        .try_collect()
        .await;
    assert!(matches!(result, Err(Error::InsufficientBalance { .. })));
}

/// 6. Test: Open Withdrawal Directly
/// Verifies that open_withdrawal() within the withdrawable amount confirms
/// OpenedWithdrawal with the requested amount.
/// Why: This is how shops cash out.
#[tokio::test]
async fn test_open_withdrawal_direct() {
    let server = shop_server().await;
    mock_call(&server, DUMMY_SHOP_ADDR, "shopOf(bytes32)", shop_of(signer_address(), 8_000)).await;
    mock_send_transaction(&server, DUMMY_TX_HASH).await;
    mock_receipt(
        &server,
        DUMMY_TX_HASH,
        vec![event_log(
            DUMMY_SHOP_ADDR,
            "OpenedWithdrawal(bytes32,uint256,address)",
            vec![],
            vec![
                Token::FixedBytes(existing_shop_id()),
                Token::Uint(U256::from(8_000u64)),
                Token::Address(signer_address()),
            ],
        )],
    )
    .await;
    let client = test_client(&server);

    let steps: Vec<ShopStep> = client
        .open_withdrawal(existing_shop_id(), U256::from(8_000u64), Submission::Direct)
        .try_collect()
        .await
        .unwrap();
    assert_eq!(codes(&steps), vec![StepCode::Prepared, StepCode::Sent, StepCode::Done]);
}

// ============================================================================
// BRIDGE
// ============================================================================

/// 7. Test: Deposit Through The Bridge
/// Verifies that deposit_via_bridge() signs with the token nonce, calls the token
/// chain bridge and confirms BridgeDeposited for the generated deposit id.
/// Why: Deposit ids link both sides of a bridge transfer.
#[tokio::test]
async fn test_deposit_via_bridge() {
    let server = MockServer::start().await;
    mock_chain_id(&server, LOCALHOST_CHAIN_ID).await;
    mock_call_uint(&server, DUMMY_TOKEN_ADDR, "balanceOf(address)", 1_000).await;
    mock_call_uint(&server, DUMMY_TOKEN_ADDR, "nonceOf(address)", 4).await;
    mock_send_transaction(&server, DUMMY_TX_HASH).await;
    let client = test_client(&server);

    let mut workflow = client.deposit_via_bridge(U256::from(1_000u64));
    let (token_id, deposit_id) = match workflow.next().await {
        Some(Ok(BridgeStep::Prepared {
            token_id,
            deposit_id,
            nonce,
            ..
        })) => {
            assert_eq!(nonce, U256::from(4u64));
            (token_id, deposit_id)
        }
        other => panic!("expected Prepared, got {:?}", other),
    };
    mock_receipt(
        &server,
        DUMMY_TX_HASH,
        vec![event_log(
            DUMMY_BRIDGE_ADDR,
            "BridgeDeposited(bytes32,bytes32,address,uint256,uint256)",
            vec![],
            vec![
                Token::FixedBytes(token_id),
                Token::FixedBytes(deposit_id),
                Token::Address(signer_address()),
                Token::Uint(U256::from(1_000u64)),
                Token::Uint(U256::zero()),
            ],
        )],
    )
    .await;

    let rest: Vec<BridgeStep> = workflow.try_collect().await.unwrap();
    assert_eq!(codes(&rest), vec![StepCode::Sent, StepCode::Done]);
    assert!(matches!(rest[1], BridgeStep::Done { deposit_id: id, .. } if id == deposit_id));
}

/// 8. Test: Bridge Deposit Needs A Bridge Address
/// Verifies that deposit_via_bridge() without bridgeAddress fails with a
/// configuration error naming the field.
/// Why: The token chain bridge is optional in the context.
#[tokio::test]
async fn test_deposit_via_bridge_missing_address() {
    let server = MockServer::start().await;
    let mut params = test_params(&server.uri());
    params.bridge_address = None;
    let client = LoyaltyClient::from_params(params).unwrap();

    let mut workflow = client.deposit_via_bridge(U256::from(1u64));
    assert!(matches!(
        workflow.next().await,
        Some(Err(Error::Config(ConfigError::MissingField("bridgeAddress"))))
    ));
}
