//! Fixed GraphQL documents and typed records of the history indexer.

use chrono::{DateTime, Utc};
use ethereum_types::{Address, H256};
use serde::{Deserialize, Serialize};

use super::{IndexerAccess, QueryOptions};
use crate::abi::{address_hex, encode_hex};
use crate::error::Result;

pub const USER_TRADE_HISTORY: &str = r#"
query userTradeHistories($where: UserTradeHistory_filter, $limit: Int, $skip: Int, $sortBy: UserTradeHistory_orderBy, $direction: OrderDirection) {
  userTradeHistories(where: $where, first: $limit, skip: $skip, orderBy: $sortBy, orderDirection: $direction) {
    id
    account
    action
    amountPoint
    amountToken
    amountValue
    balancePoint
    balanceToken
    purchaseId
    paymentId
    shopId
    blockNumber
    blockTimestamp
    transactionHash
  }
}
"#;

pub const SHOP_TRADE_HISTORY: &str = r#"
query shopTradeHistories($where: ShopTradeHistory_filter, $limit: Int, $skip: Int, $sortBy: ShopTradeHistory_orderBy, $direction: OrderDirection) {
  shopTradeHistories(where: $where, first: $limit, skip: $skip, orderBy: $sortBy, orderDirection: $direction) {
    id
    shopId
    action
    increase
    providedAmount
    usedAmount
    withdrawnAmount
    blockNumber
    blockTimestamp
    transactionHash
  }
}
"#;

pub const PAID_POINTS: &str = r#"
query paidPoints($where: PaidPoint_filter, $limit: Int, $skip: Int, $sortBy: PaidPoint_orderBy, $direction: OrderDirection) {
  paidPoints(where: $where, first: $limit, skip: $skip, orderBy: $sortBy, orderDirection: $direction) {
    paymentId
    purchaseId
    currency
    paidAmount: paidPoint
    paidValue
    feeAmount: feePoint
    feeValue
    shopId
    account
    blockNumber
    blockTimestamp
    transactionHash
  }
}
"#;

pub const PAID_TOKENS: &str = r#"
query paidTokens($where: PaidToken_filter, $limit: Int, $skip: Int, $sortBy: PaidToken_orderBy, $direction: OrderDirection) {
  paidTokens(where: $where, first: $limit, skip: $skip, orderBy: $sortBy, orderDirection: $direction) {
    paymentId
    purchaseId
    currency
    paidAmount: paidToken
    paidValue
    feeAmount: feeToken
    feeValue
    shopId
    account
    blockNumber
    blockTimestamp
    transactionHash
  }
}
"#;

/// Big integers are returned as decimal strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserTradeHistory {
    pub id: String,
    pub account: String,
    pub action: String,
    pub amount_point: String,
    pub amount_token: String,
    pub amount_value: String,
    pub balance_point: String,
    pub balance_token: String,
    #[serde(default)]
    pub purchase_id: Option<String>,
    #[serde(default)]
    pub payment_id: Option<String>,
    #[serde(default)]
    pub shop_id: Option<String>,
    pub block_number: String,
    pub block_timestamp: String,
    pub transaction_hash: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShopTradeHistory {
    pub id: String,
    pub shop_id: String,
    pub action: String,
    pub increase: String,
    pub provided_amount: String,
    pub used_amount: String,
    pub withdrawn_amount: String,
    pub block_number: String,
    pub block_timestamp: String,
    pub transaction_hash: String,
}

/// A `PaidPoint` or `PaidToken` record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaidRecord {
    pub payment_id: String,
    pub purchase_id: String,
    pub currency: String,
    pub paid_amount: String,
    pub paid_value: String,
    pub fee_amount: String,
    pub fee_value: String,
    pub shop_id: String,
    pub account: String,
    pub block_number: String,
    pub block_timestamp: String,
    pub transaction_hash: String,
}

/// Block time of a record, if the timestamp is a valid unix time.
pub fn block_time(block_timestamp: &str) -> Option<DateTime<Utc>> {
    let seconds = block_timestamp.parse::<i64>().ok()?;
    DateTime::from_timestamp(seconds, 0)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UserTradeHistories {
    user_trade_histories: Vec<UserTradeHistory>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ShopTradeHistories {
    shop_trade_histories: Vec<ShopTradeHistory>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PaidPoints {
    paid_points: Vec<PaidRecord>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PaidTokens {
    paid_tokens: Vec<PaidRecord>,
}

fn variables(filter: serde_json::Value, options: &QueryOptions) -> serde_json::Value {
    serde_json::json!({
        "where": filter,
        "limit": options.limit,
        "skip": options.skip,
        "sortBy": options.sort_by,
        "direction": options.direction,
    })
}

impl IndexerAccess {
    /// Ledger history of `account`.
    pub async fn user_trade_history(
        &self,
        account: Address,
        options: &QueryOptions,
    ) -> Result<Vec<UserTradeHistory>> {
        let filter = serde_json::json!({ "account": address_hex(&account) });
        let result: UserTradeHistories = self
            .query("userTradeHistories", USER_TRADE_HISTORY, variables(filter, options))
            .await?;
        Ok(result.user_trade_histories)
    }

    /// Provision and settlement history of a shop.
    pub async fn shop_trade_history(
        &self,
        shop_id: H256,
        options: &QueryOptions,
    ) -> Result<Vec<ShopTradeHistory>> {
        let filter = serde_json::json!({ "shopId": encode_hex(shop_id.as_bytes()) });
        let result: ShopTradeHistories = self
            .query("shopTradeHistories", SHOP_TRADE_HISTORY, variables(filter, options))
            .await?;
        Ok(result.shop_trade_histories)
    }

    pub async fn paid_points(&self, payment_id: H256) -> Result<Vec<PaidRecord>> {
        let filter = serde_json::json!({ "paymentId": encode_hex(payment_id.as_bytes()) });
        let result: PaidPoints = self
            .query("paidPoints", PAID_POINTS, variables(filter, &QueryOptions::default()))
            .await?;
        Ok(result.paid_points)
    }

    pub async fn paid_tokens(&self, payment_id: H256) -> Result<Vec<PaidRecord>> {
        let filter = serde_json::json!({ "paymentId": encode_hex(payment_id.as_bytes()) });
        let result: PaidTokens = self
            .query("paidTokens", PAID_TOKENS, variables(filter, &QueryOptions::default()))
            .await?;
        Ok(result.paid_tokens)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indexer::Direction;

    #[test]
    fn test_variables_use_default_pagination() {
        let vars = variables(serde_json::json!({ "account": "0x01" }), &QueryOptions::default());
        assert_eq!(vars["limit"], 10);
        assert_eq!(vars["skip"], 0);
        assert_eq!(vars["sortBy"], "blockNumber");
        assert_eq!(vars["direction"], "desc");
        assert_eq!(vars["where"]["account"], "0x01");
    }

    #[test]
    fn test_custom_direction_serialized() {
        let options = QueryOptions {
            direction: Direction::Asc,
            ..Default::default()
        };
        assert_eq!(variables(serde_json::json!({}), &options)["direction"], "asc");
    }

    #[test]
    fn test_block_time() {
        assert_eq!(
            block_time("1700000000").map(|t| t.to_rfc3339()),
            Some("2023-11-14T22:13:20+00:00".to_string())
        );
        assert!(block_time("not-a-number").is_none());
    }
}
