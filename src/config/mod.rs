//! Configuration Management Module
//!
//! This module builds the SDK [`Context`]: network identity, signer, RPC
//! providers, contract addresses, relay endpoint and GraphQL nodes.
//!
//! A context is created once from a complete [`ContextParams`] and is
//! immutable afterwards. [`Context::set`] merges a partial parameter object
//! into a *new* context, so callers swap the whole value at once.
//!
//! Parameters can be loaded from TOML. The private key is never stored in the
//! file: the file names the environment variable that holds it.

use std::time::Duration;

use ethereum_types::Address;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::crypto::Signer;
use crate::error::ConfigError;

/// Environment variable holding the configuration file path.
pub const CONFIG_PATH_ENV: &str = "LOYALTY_SDK_CONFIG_PATH";
/// Configuration path used when [`CONFIG_PATH_ENV`] is unset.
pub const DEFAULT_CONFIG_PATH: &str = "config/sdk.toml";
const TEMPLATE_PATH: &str = "config/sdk.template.toml";

// ============================================================================
// NETWORKS
// ============================================================================

/// Networks the SDK is allowed to connect to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SupportedNetwork {
    LoyaltyMainnet,
    LoyaltyTestnet,
    LoyaltyDevnet,
    Localhost,
}

impl SupportedNetwork {
    pub const ALL: [SupportedNetwork; 4] = [
        SupportedNetwork::LoyaltyMainnet,
        SupportedNetwork::LoyaltyTestnet,
        SupportedNetwork::LoyaltyDevnet,
        SupportedNetwork::Localhost,
    ];

    pub fn name(self) -> &'static str {
        match self {
            SupportedNetwork::LoyaltyMainnet => "loyalty_mainnet",
            SupportedNetwork::LoyaltyTestnet => "loyalty_testnet",
            SupportedNetwork::LoyaltyDevnet => "loyalty_devnet",
            SupportedNetwork::Localhost => "localhost",
        }
    }

    pub fn chain_id(self) -> u64 {
        match self {
            SupportedNetwork::LoyaltyMainnet => 215110,
            SupportedNetwork::LoyaltyTestnet => 215115,
            SupportedNetwork::LoyaltyDevnet => 24680,
            SupportedNetwork::Localhost => 31337,
        }
    }
}

impl std::str::FromStr for SupportedNetwork {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        SupportedNetwork::ALL
            .into_iter()
            .find(|network| network.name() == value)
            .ok_or_else(|| ConfigError::UnsupportedNetwork(value.to_string()))
    }
}

impl std::fmt::Display for SupportedNetwork {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

// ============================================================================
// PARAMETERS
// ============================================================================

/// Hex encoded private key. Never printed by `Debug`.
#[derive(Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PrivateKey(String);

impl PrivateKey {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("PrivateKey(***)")
    }
}

/// Parameter object used to build or update a [`Context`].
///
/// Every field is optional so the same type serves as the full constructor
/// input and as a partial update. Keys use camelCase in TOML and JSON.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextParams {
    pub network: Option<String>,
    #[serde(default, skip_serializing)]
    pub signer: Option<PrivateKey>,
    /// Environment variable read for the signer key when `signer` is absent
    /// (default: `LOYALTY_SDK_PRIVATE_KEY`)
    pub private_key_env: Option<String>,
    pub web3_providers: Option<Vec<String>>,
    pub relay_endpoint: Option<String>,
    /// Sent as the `Authorization` header on relay requests
    pub relay_access_key: Option<String>,

    pub ledger_address: Option<String>,
    pub token_address: Option<String>,
    pub phone_link_address: Option<String>,
    pub validator_address: Option<String>,
    pub currency_rate_address: Option<String>,
    pub shop_address: Option<String>,
    pub loyalty_provider_address: Option<String>,
    pub loyalty_consumer_address: Option<String>,
    pub loyalty_exchanger_address: Option<String>,
    pub loyalty_transfer_address: Option<String>,
    pub loyalty_bridge_address: Option<String>,
    /// Bridge on the token's home chain, needed only for bridge deposits
    pub bridge_address: Option<String>,

    pub graphql_nodes: Option<Vec<String>>,

    pub receipt_poll_interval_ms: Option<u64>,
    pub receipt_timeout_ms: Option<u64>,
    pub registration_poll_interval_ms: Option<u64>,
    pub registration_timeout_ms: Option<u64>,
}

pub fn default_private_key_env() -> String {
    "LOYALTY_SDK_PRIVATE_KEY".to_string()
}

impl ContextParams {
    /// Loads parameters from the TOML configuration file.
    ///
    /// The path comes from `LOYALTY_SDK_CONFIG_PATH` (default
    /// `config/sdk.toml`). If the file does not exist the error points at the
    /// template to copy.
    ///
    /// # Returns
    ///
    /// * `Ok(ContextParams)` - Parsed parameters with the signer resolved from the environment
    /// * `Err(ConfigError)` - Missing file, invalid TOML, or missing key environment variable
    pub fn load() -> Result<Self, ConfigError> {
        let path = std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());

        if !std::path::Path::new(&path).exists() {
            return Err(ConfigError::Io {
                source: std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    format!(
                        "file not found, copy {} to {} and edit it with your values",
                        TEMPLATE_PATH, path
                    ),
                ),
                path,
            });
        }

        let content = std::fs::read_to_string(&path).map_err(|source| ConfigError::Io {
            path: path.clone(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    /// Parses parameters from a TOML document and resolves the signer key.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let mut params: ContextParams = toml::from_str(content)?;
        params.resolve_signer()?;
        Ok(params)
    }

    /// Fills `signer` from the environment. A missing variable is an error
    /// only when `privateKeyEnv` was set explicitly.
    fn resolve_signer(&mut self) -> Result<(), ConfigError> {
        if self.signer.is_some() {
            return Ok(());
        }

        let name = self
            .private_key_env
            .clone()
            .unwrap_or_else(default_private_key_env);
        match std::env::var(&name) {
            Ok(key) => self.signer = Some(PrivateKey::new(key)),
            Err(_) if self.private_key_env.is_some() => return Err(ConfigError::MissingEnv(name)),
            Err(_) => {}
        }
        Ok(())
    }
}

// ============================================================================
// CONTEXT
// ============================================================================

/// Deployed contract addresses. All are required except `bridge`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContractAddresses {
    pub ledger: Address,
    pub token: Address,
    pub phone_link: Address,
    pub validator: Address,
    pub currency_rate: Address,
    pub shop: Address,
    pub loyalty_provider: Address,
    pub loyalty_consumer: Address,
    pub loyalty_exchanger: Address,
    pub loyalty_transfer: Address,
    pub loyalty_bridge: Address,
    pub bridge: Option<Address>,
}

/// Poll intervals and timeouts used by the workflows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollingSettings {
    pub receipt_interval: Duration,
    pub receipt_timeout: Duration,
    pub registration_interval: Duration,
    pub registration_timeout: Duration,
}

impl Default for PollingSettings {
    fn default() -> Self {
        Self {
            receipt_interval: Duration::from_secs(1),
            receipt_timeout: Duration::from_secs(120),
            registration_interval: Duration::from_secs(3),
            registration_timeout: Duration::from_secs(60),
        }
    }
}

impl PollingSettings {
    fn merge(&mut self, params: &ContextParams) {
        if let Some(ms) = params.receipt_poll_interval_ms {
            self.receipt_interval = Duration::from_millis(ms);
        }
        if let Some(ms) = params.receipt_timeout_ms {
            self.receipt_timeout = Duration::from_millis(ms);
        }
        if let Some(ms) = params.registration_poll_interval_ms {
            self.registration_interval = Duration::from_millis(ms);
        }
        if let Some(ms) = params.registration_timeout_ms {
            self.registration_timeout = Duration::from_millis(ms);
        }
    }
}

/// Validated SDK configuration.
#[derive(Debug, Clone)]
pub struct Context {
    network: SupportedNetwork,
    signer: Option<Signer>,
    web3_providers: Vec<Url>,
    relay_endpoint: Option<Url>,
    relay_access_key: Option<String>,
    addresses: ContractAddresses,
    graphql_nodes: Vec<Url>,
    polling: PollingSettings,
}

impl Context {
    /// Builds a context from a complete parameter object. Alias of [`Context::set_full`].
    pub fn new(params: ContextParams) -> Result<Self, ConfigError> {
        Self::set_full(params)
    }

    /// Builds a context, requiring every mandatory field.
    ///
    /// Fields are checked in a fixed order and the first missing or invalid
    /// one is reported.
    pub fn set_full(params: ContextParams) -> Result<Self, ConfigError> {
        let network = required(&params.network, "network")?.parse()?;
        let web3_providers = parse_urls("web3Providers", required(&params.web3_providers, "web3Providers")?)?;

        let addresses = ContractAddresses {
            ledger: required_address(&params.ledger_address, "ledgerAddress")?,
            token: required_address(&params.token_address, "tokenAddress")?,
            phone_link: required_address(&params.phone_link_address, "phoneLinkAddress")?,
            validator: required_address(&params.validator_address, "validatorAddress")?,
            currency_rate: required_address(&params.currency_rate_address, "currencyRateAddress")?,
            shop: required_address(&params.shop_address, "shopAddress")?,
            loyalty_provider: required_address(&params.loyalty_provider_address, "loyaltyProviderAddress")?,
            loyalty_consumer: required_address(&params.loyalty_consumer_address, "loyaltyConsumerAddress")?,
            loyalty_exchanger: required_address(&params.loyalty_exchanger_address, "loyaltyExchangerAddress")?,
            loyalty_transfer: required_address(&params.loyalty_transfer_address, "loyaltyTransferAddress")?,
            loyalty_bridge: required_address(&params.loyalty_bridge_address, "loyaltyBridgeAddress")?,
            bridge: params
                .bridge_address
                .as_deref()
                .map(|value| parse_address("bridgeAddress", value))
                .transpose()?,
        };

        let graphql_nodes = parse_urls("graphqlNodes", required(&params.graphql_nodes, "graphqlNodes")?)?;

        let signer = params
            .signer
            .as_ref()
            .map(|key| Signer::from_private_key(key.expose()))
            .transpose()?;
        let relay_endpoint = params
            .relay_endpoint
            .as_deref()
            .map(|value| parse_url("relayEndpoint", value))
            .transpose()?;

        let mut polling = PollingSettings::default();
        polling.merge(&params);

        Ok(Self {
            network,
            signer,
            web3_providers,
            relay_endpoint,
            relay_access_key: params.relay_access_key,
            addresses,
            graphql_nodes,
            polling,
        })
    }

    /// Returns a new context with the present keys of `partial` merged in.
    ///
    /// Absent keys keep their current value. `self` is left untouched even
    /// when validation fails.
    pub fn set(&self, partial: ContextParams) -> Result<Self, ConfigError> {
        let mut next = self.clone();

        if let Some(network) = partial.network.as_deref() {
            next.network = network.parse()?;
        }
        if let Some(key) = partial.signer.as_ref() {
            next.signer = Some(Signer::from_private_key(key.expose())?);
        }
        if let Some(urls) = partial.web3_providers.as_ref() {
            next.web3_providers = parse_urls("web3Providers", urls)?;
        }
        if let Some(endpoint) = partial.relay_endpoint.as_deref() {
            next.relay_endpoint = Some(parse_url("relayEndpoint", endpoint)?);
        }
        if let Some(key) = partial.relay_access_key.as_ref() {
            next.relay_access_key = Some(key.clone());
        }
        if let Some(urls) = partial.graphql_nodes.as_ref() {
            next.graphql_nodes = parse_urls("graphqlNodes", urls)?;
        }

        let addresses = &mut next.addresses;
        merge_address(&mut addresses.ledger, &partial.ledger_address, "ledgerAddress")?;
        merge_address(&mut addresses.token, &partial.token_address, "tokenAddress")?;
        merge_address(&mut addresses.phone_link, &partial.phone_link_address, "phoneLinkAddress")?;
        merge_address(&mut addresses.validator, &partial.validator_address, "validatorAddress")?;
        merge_address(&mut addresses.currency_rate, &partial.currency_rate_address, "currencyRateAddress")?;
        merge_address(&mut addresses.shop, &partial.shop_address, "shopAddress")?;
        merge_address(&mut addresses.loyalty_provider, &partial.loyalty_provider_address, "loyaltyProviderAddress")?;
        merge_address(&mut addresses.loyalty_consumer, &partial.loyalty_consumer_address, "loyaltyConsumerAddress")?;
        merge_address(&mut addresses.loyalty_exchanger, &partial.loyalty_exchanger_address, "loyaltyExchangerAddress")?;
        merge_address(&mut addresses.loyalty_transfer, &partial.loyalty_transfer_address, "loyaltyTransferAddress")?;
        merge_address(&mut addresses.loyalty_bridge, &partial.loyalty_bridge_address, "loyaltyBridgeAddress")?;
        if let Some(value) = partial.bridge_address.as_deref() {
            addresses.bridge = Some(parse_address("bridgeAddress", value)?);
        }

        next.polling.merge(&partial);
        Ok(next)
    }

    pub fn network(&self) -> SupportedNetwork {
        self.network
    }

    pub fn chain_id(&self) -> u64 {
        self.network.chain_id()
    }

    pub fn signer(&self) -> Option<&Signer> {
        self.signer.as_ref()
    }

    pub fn web3_providers(&self) -> &[Url] {
        &self.web3_providers
    }

    pub fn relay_endpoint(&self) -> Option<&Url> {
        self.relay_endpoint.as_ref()
    }

    pub fn relay_access_key(&self) -> Option<&str> {
        self.relay_access_key.as_deref()
    }

    pub fn addresses(&self) -> &ContractAddresses {
        &self.addresses
    }

    pub fn graphql_nodes(&self) -> &[Url] {
        &self.graphql_nodes
    }

    pub fn polling(&self) -> PollingSettings {
        self.polling
    }
}

// ============================================================================
// FIELD VALIDATION
// ============================================================================

fn required<'a, T>(value: &'a Option<T>, field: &'static str) -> Result<&'a T, ConfigError> {
    value.as_ref().ok_or(ConfigError::MissingField(field))
}

fn required_address(value: &Option<String>, field: &'static str) -> Result<Address, ConfigError> {
    parse_address(field, required(value, field)?)
}

fn merge_address(target: &mut Address, value: &Option<String>, field: &'static str) -> Result<(), ConfigError> {
    if let Some(value) = value.as_deref() {
        *target = parse_address(field, value)?;
    }
    Ok(())
}

/// Parses a raw 20-byte hex address (with or without `0x`). The zero address
/// is rejected: no contract is deployed there.
pub fn parse_address(field: &'static str, value: &str) -> Result<Address, ConfigError> {
    let invalid = || ConfigError::InvalidAddress {
        field,
        value: value.to_string(),
    };
    let stripped = value.strip_prefix("0x").unwrap_or(value);
    if stripped.len() != 40 {
        return Err(invalid());
    }
    let bytes = hex::decode(stripped).map_err(|_| invalid())?;
    let address = Address::from_slice(&bytes);
    if address.is_zero() {
        return Err(invalid());
    }
    Ok(address)
}

/// Parses an http(s) URL.
pub fn parse_url(field: &'static str, value: &str) -> Result<Url, ConfigError> {
    let url = Url::parse(value).map_err(|_| ConfigError::InvalidUrl {
        field,
        value: value.to_string(),
    })?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(ConfigError::UnsupportedProtocol {
            field,
            protocol: other.to_string(),
        }),
    }
}

fn parse_urls(field: &'static str, values: &[String]) -> Result<Vec<Url>, ConfigError> {
    if values.is_empty() {
        return Err(ConfigError::MissingField(field));
    }
    values.iter().map(|value| parse_url(field, value)).collect()
}
