//! Relay Access Module
//!
//! HTTP client for the relay that submits signed authorizations on behalf of
//! users. The base URL is either configured statically or picked at random
//! among the active validators registered in the phone-link contract.
//!
//! Every relay response uses the same envelope:
//! ```json
//! { "code": 200, "data": { ... } }
//! { "code": 400, "error": { "message": "..." } }
//! ```
//! When `data` itself carries a `code`, it must also be 200.

use std::time::Duration;

use ethereum_types::Address;
use rand::rngs::OsRng;
use rand::seq::SliceRandom;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use url::Url;

use crate::chain::ChainAccess;
use crate::config::{parse_url, Context};
use crate::contracts::PHONE_LINK;
use crate::error::{Error, Result};
use crate::types::ValidatorInfo;

const SUCCESS: i64 = 200;

// ============================================================================
// API RESPONSE WRAPPER
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayResponse {
    pub code: i64,
    #[serde(default)]
    pub data: Option<serde_json::Value>,
    #[serde(default)]
    pub error: Option<RelayErrorBody>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayErrorBody {
    #[serde(default)]
    pub message: String,
}

impl RelayResponse {
    /// Checks both status codes and returns the `data` payload.
    pub fn into_data(self) -> Result<serde_json::Value> {
        if self.code != SUCCESS {
            return Err(Error::Relay {
                code: self.code,
                message: self.error.map(|e| e.message).unwrap_or_default(),
            });
        }

        let data = self.data.unwrap_or(serde_json::Value::Null);
        if let Some(code) = data.get("code").and_then(serde_json::Value::as_i64) {
            if code != SUCCESS {
                let message = data
                    .get("message")
                    .or_else(|| data.get("error").and_then(|e| e.get("message")))
                    .and_then(serde_json::Value::as_str)
                    .unwrap_or_default()
                    .to_string();
                return Err(Error::Relay { code, message });
            }
        }
        Ok(data)
    }
}

// ============================================================================
// VALIDATOR REGISTRY
// ============================================================================

/// Reads the validators registered in the phone-link contract.
pub async fn read_validators(chain: &ChainAccess, phone_link: Address) -> Result<Vec<ValidatorInfo>> {
    chain
        .attach_contract(phone_link, &PHONE_LINK)?
        .call_decoded("getValidators", &[], "((address,uint256,string,uint8)[])")
        .await?
        .tuple_array(0)?
        .into_iter()
        .map(|item| {
            Ok(ValidatorInfo {
                address: item.address(0)?,
                index: item.uint(1)?,
                endpoint: item.string(2)?,
                status: item.uint8(3)?,
            })
        })
        .collect()
}

// ============================================================================
// RELAY CLIENT
// ============================================================================

#[derive(Debug, Clone)]
pub struct RelayAccess {
    client: Client,
    endpoint: Option<Url>,
    access_key: Option<String>,
    phone_link: Address,
}

impl RelayAccess {
    pub fn new(context: &Context) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| Error::http("relay", e))?;

        Ok(Self {
            client,
            endpoint: context.relay_endpoint().cloned(),
            access_key: context.relay_access_key().map(str::to_string),
            phone_link: context.addresses().phone_link,
        })
    }

    /// Resolves the full URL of `path`.
    ///
    /// Uses the configured relay endpoint when present, otherwise a uniformly
    /// random active validator.
    ///
    /// # Returns
    ///
    /// * `Ok(Url)` - Base URL joined with `path`
    /// * `Err(Error::NoValidators)` - No static endpoint and no active validator
    pub async fn endpoint(&self, chain: &ChainAccess, path: &str) -> Result<Url> {
        let base = match &self.endpoint {
            Some(url) => url.clone(),
            None => self.pick_validator(chain).await?,
        };
        join(&base, path)
    }

    async fn pick_validator(&self, chain: &ChainAccess) -> Result<Url> {
        let validators = read_validators(chain, self.phone_link).await?;
        let candidates: Vec<&ValidatorInfo> = validators
            .iter()
            .filter(|validator| validator.is_active() && !validator.endpoint.is_empty())
            .collect();

        let chosen = candidates.choose(&mut OsRng).ok_or(Error::NoValidators)?;
        debug!("Using validator {:?} at {}", chosen.address, chosen.endpoint);
        Ok(parse_url("validatorEndpoint", &chosen.endpoint)?)
    }

    /// Returns true iff `GET /` answers with the literal body `OK`. Never fails.
    pub async fn is_up(&self, chain: &ChainAccess) -> bool {
        let url = match self.endpoint(chain, "/").await {
            Ok(url) => url,
            Err(e) => {
                warn!("Relay endpoint unavailable: {}", e);
                return false;
            }
        };

        match self.authorized(self.client.get(url)).send().await {
            Ok(response) => matches!(response.text().await, Ok(body) if body == "OK"),
            Err(e) => {
                warn!("Relay health check failed: {}", e);
                false
            }
        }
    }

    /// POSTs `body` as JSON to `path` and decodes the envelope's `data`.
    pub async fn post<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        chain: &ChainAccess,
        path: &str,
        body: &B,
    ) -> Result<T> {
        let url = self.endpoint(chain, path).await?;
        let request = self.authorized(self.client.post(url.clone()).json(body));
        self.execute(request, &url).await
    }

    fn authorized(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.access_key {
            Some(key) => request.header(reqwest::header::AUTHORIZATION, key),
            None => request,
        }
    }

    async fn execute<T: DeserializeOwned>(&self, request: reqwest::RequestBuilder, url: &Url) -> Result<T> {
        let response: RelayResponse = request
            .send()
            .await
            .map_err(|e| Error::http(url.as_str(), e))?
            .json()
            .await
            .map_err(|e| Error::http(url.as_str(), e))?;

        let data = response.into_data().map_err(|e| {
            warn!("Relay request to {} failed: {}", url, e);
            e
        })?;
        serde_json::from_value(data)
            .map_err(|e| Error::Abi(format!("unexpected relay payload from {}: {}", url, e)))
    }
}

/// Appends `path` to `base`, keeping any path prefix of `base`.
fn join(base: &Url, path: &str) -> Result<Url> {
    let joined = format!(
        "{}/{}",
        base.as_str().trim_end_matches('/'),
        path.trim_start_matches('/')
    );
    Ok(parse_url("relayEndpoint", &joined)?)
}
