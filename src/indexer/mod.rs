//! Indexer Access Module
//!
//! GraphQL client for the history indexer. Nodes are rotated the same way as
//! RPC providers: `shift_node` and `ensure_online` take `&mut self`.
//! Results are never cached.

pub mod queries;

use std::time::Duration;

use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use url::Url;

use crate::config::Context;
use crate::error::{Error, Result};

pub use queries::{PaidRecord, ShopTradeHistory, UserTradeHistory};

/// Sort direction of a paginated query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Asc,
    Desc,
}

/// Pagination and ordering of a history query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryOptions {
    pub limit: u32,
    pub skip: u32,
    pub sort_by: String,
    pub direction: Direction,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            limit: 10,
            skip: 0,
            sort_by: "blockNumber".to_string(),
            direction: Direction::Desc,
        }
    }
}

#[derive(Debug, Serialize)]
struct GraphqlRequest<'a> {
    query: &'a str,
    variables: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct GraphqlResponse {
    #[serde(default)]
    data: Option<serde_json::Value>,
    #[serde(default)]
    errors: Option<Vec<GraphqlError>>,
}

#[derive(Debug, Deserialize)]
struct GraphqlError {
    message: String,
}

#[derive(Debug, Clone)]
pub struct IndexerAccess {
    client: Client,
    nodes: Vec<Url>,
    current: usize,
}

impl IndexerAccess {
    pub fn new(context: &Context) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| Error::http("graphql", e))?;

        Ok(Self {
            client,
            nodes: context.graphql_nodes().to_vec(),
            current: 0,
        })
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn current_index(&self) -> usize {
        self.current
    }

    pub fn node(&self) -> Result<&Url> {
        self.nodes.get(self.current).ok_or(Error::NoGraphqlNode)
    }

    /// Advances to the next node, wrapping around. Needs at least 2 nodes.
    pub fn shift_node(&mut self) -> Result<()> {
        let count = self.nodes.len();
        if count < 2 {
            return Err(Error::NotEnoughGraphqlNodes(count));
        }
        self.current = (self.current + 1) % count;
        info!("Switched to GraphQL node {} ({})", self.current, self.nodes[self.current]);
        Ok(())
    }

    /// Checks nodes in rotation order with `{ __typename }`, at most once each.
    pub async fn ensure_online(&mut self) -> Result<()> {
        let count = self.nodes.len();
        if count == 0 {
            return Err(Error::NoGraphqlNode);
        }

        for attempt in 0..count {
            if attempt > 0 {
                self.shift_node()?;
            }
            match self
                .query::<serde_json::Value>("typename", "{ __typename }", serde_json::json!({}))
                .await
            {
                Ok(_) => return Ok(()),
                Err(e) => warn!("GraphQL node {} is offline: {}", self.nodes[self.current], e),
            }
        }

        Err(Error::GraphqlNodesOffline(count))
    }

    /// Runs a named query against the active node and decodes `data`.
    ///
    /// # Arguments
    ///
    /// * `name` - Query name, reported in errors
    /// * `document` - GraphQL document
    /// * `variables` - Query variables
    ///
    /// # Returns
    ///
    /// * `Ok(T)` - Decoded `data` object
    /// * `Err(Error::Indexer)` - Transport failure or GraphQL errors
    pub async fn query<T: DeserializeOwned>(
        &self,
        name: &str,
        document: &str,
        variables: serde_json::Value,
    ) -> Result<T> {
        let node = self.node()?;
        let failed = |message: String| Error::Indexer {
            query: name.to_string(),
            message,
        };

        debug!("GraphQL query {} on {}", name, node);
        let response: GraphqlResponse = self
            .client
            .post(node.clone())
            .json(&GraphqlRequest {
                query: document,
                variables,
            })
            .send()
            .await
            .map_err(|e| failed(e.to_string()))?
            .json()
            .await
            .map_err(|e| failed(e.to_string()))?;

        if let Some(errors) = response.errors.filter(|errors| !errors.is_empty()) {
            let message = errors
                .into_iter()
                .map(|e| e.message)
                .collect::<Vec<_>>()
                .join("; ");
            return Err(failed(message));
        }

        let data = response
            .data
            .ok_or_else(|| failed("response has no data".to_string()))?;
        serde_json::from_value(data).map_err(|e| failed(e.to_string()))
    }
}
