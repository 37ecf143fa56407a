//! Chain Access Module
//!
//! Holds the ordered list of RPC providers with the index of the active one,
//! the optional signer, and the network the context expects.
//!
//! Rotation (`shift_provider`, `ensure_online`) takes `&mut self`; every other
//! operation takes `&self`, so workflows can share a client while rotation is
//! serialized by the borrow checker.

pub mod contract;
pub mod rpc;
pub mod transaction;

use ethereum_types::{Address, H256, U256};
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

use crate::config::{Context, PollingSettings};
use crate::contracts::ContractAbi;
use crate::crypto::Signer;
use crate::error::{Error, Result};

pub use contract::Contract;
pub use rpc::{Log, RpcClient, Transaction, TransactionReceipt};
pub use transaction::LegacyTransaction;

/// Gas estimates are padded by this percentage.
const GAS_MARGIN_PERCENT: u64 = 20;

/// A signer bound to the active provider.
#[derive(Debug, Clone, Copy)]
pub struct ConnectedSigner<'a> {
    pub signer: &'a Signer,
    pub provider: &'a RpcClient,
}

impl ConnectedSigner<'_> {
    pub fn address(&self) -> Address {
        self.signer.address()
    }
}

/// Rotating provider list plus signer.
#[derive(Debug, Clone)]
pub struct ChainAccess {
    providers: Vec<RpcClient>,
    current: usize,
    signer: Option<Signer>,
    chain_id: u64,
    polling: PollingSettings,
}

impl ChainAccess {
    /// Builds the provider list from the context. The first provider is active.
    pub fn new(context: &Context) -> Result<Self> {
        let providers = context
            .web3_providers()
            .iter()
            .cloned()
            .map(RpcClient::new)
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            providers,
            current: 0,
            signer: context.signer().cloned(),
            chain_id: context.chain_id(),
            polling: context.polling(),
        })
    }

    // ========================================================================
    // PROVIDER ROTATION
    // ========================================================================

    pub fn provider_count(&self) -> usize {
        self.providers.len()
    }

    pub fn current_index(&self) -> usize {
        self.current
    }

    /// The active provider.
    pub fn provider(&self) -> Result<&RpcClient> {
        self.providers.get(self.current).ok_or(Error::NoProvider)
    }

    /// Advances to the next provider, wrapping around.
    ///
    /// # Returns
    ///
    /// * `Ok(())` - Rotated
    /// * `Err(Error::NotEnoughProviders)` - Fewer than 2 providers configured
    pub fn shift_provider(&mut self) -> Result<()> {
        let count = self.providers.len();
        if count < 2 {
            return Err(Error::NotEnoughProviders(count));
        }
        self.current = (self.current + 1) % count;
        info!(
            "Switched to provider {} ({})",
            self.current,
            self.providers[self.current].url()
        );
        Ok(())
    }

    /// Checks providers in rotation order until one answers `eth_chainId`.
    ///
    /// Makes at most one check per provider and shifts only between checks,
    /// so with N providers a success on the last one costs N-1 shifts.
    ///
    /// # Returns
    ///
    /// * `Ok(u64)` - Chain id reported by the first responsive provider
    /// * `Err(Error::ProvidersOffline)` - All N providers failed
    pub async fn ensure_online(&mut self) -> Result<u64> {
        let count = self.providers.len();
        if count == 0 {
            return Err(Error::NoProvider);
        }

        for attempt in 0..count {
            if attempt > 0 {
                self.shift_provider()?;
            }
            let provider = &self.providers[self.current];
            match provider.chain_id().await {
                Ok(chain_id) => {
                    debug!("Provider {} is online (chain {})", provider.url(), chain_id);
                    return Ok(chain_id);
                }
                Err(e) => warn!("Provider {} is offline: {}", provider.url(), e),
            }
        }

        Err(Error::ProvidersOffline(count))
    }

    // ========================================================================
    // SIGNER AND CONTRACTS
    // ========================================================================

    pub fn signer(&self) -> Option<&Signer> {
        self.signer.as_ref()
    }

    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    pub fn polling(&self) -> PollingSettings {
        self.polling
    }

    /// Binds the signer to the active provider.
    pub fn connected_signer(&self) -> Result<ConnectedSigner<'_>> {
        let signer = self.signer.as_ref().ok_or(Error::NoSigner)?;
        let provider = self.provider()?;
        Ok(ConnectedSigner { signer, provider })
    }

    /// Returns a call proxy for the contract at `address`.
    ///
    /// # Returns
    ///
    /// * `Err(Error::EmptyAddress)` - `address` is zero
    /// * `Err(Error::EmptyAbi)` - `abi` lists no functions
    pub fn attach_contract(&self, address: Address, abi: &'static ContractAbi) -> Result<Contract<'_>> {
        if address.is_zero() {
            return Err(Error::EmptyAddress);
        }
        if abi.functions.is_empty() {
            return Err(Error::EmptyAbi);
        }
        Ok(Contract::new(self, address, abi))
    }

    /// Fails with [`Error::NetworkMismatch`] when the active provider serves
    /// another chain than the context network.
    pub async fn check_network(&self) -> Result<()> {
        let actual = self.provider()?.chain_id().await?;
        if actual != self.chain_id {
            return Err(Error::NetworkMismatch {
                expected: self.chain_id,
                actual,
            });
        }
        Ok(())
    }

    // ========================================================================
    // TRANSACTIONS
    // ========================================================================

    /// Builds, signs and broadcasts a legacy transaction calling `to`.
    pub async fn send_transaction(&self, to: Address, data: Vec<u8>) -> Result<H256> {
        let connected = self.connected_signer()?;
        let from = connected.address();
        let provider = connected.provider;

        let nonce = provider.transaction_count(from).await?;
        let gas_price = provider.gas_price().await?;
        let estimate = provider.estimate_gas(from, to, &data).await?;
        let gas_limit = estimate + estimate * GAS_MARGIN_PERCENT / 100;

        let transaction = LegacyTransaction {
            nonce,
            gas_price,
            gas_limit,
            to,
            value: U256::zero(),
            data,
            chain_id: self.chain_id,
        };
        let raw = transaction.sign(connected.signer)?;
        let hash = provider.send_raw_transaction(&raw).await?;
        debug!("Sent transaction {:?} to {:?} (nonce {})", hash, to, nonce);
        Ok(hash)
    }

    /// Polls for the receipt of `hash` until it is available.
    ///
    /// # Returns
    ///
    /// * `Ok(TransactionReceipt)` - Successful receipt
    /// * `Err(Error::TransactionReverted)` - Receipt status is 0
    /// * `Err(Error::ReceiptTimeout)` - No receipt within the configured timeout
    pub async fn wait_for_receipt(&self, hash: H256) -> Result<TransactionReceipt> {
        let deadline = Instant::now() + self.polling.receipt_timeout;

        loop {
            if let Some(receipt) = self.provider()?.transaction_receipt(hash).await? {
                if !receipt.is_success() {
                    return Err(Error::TransactionReverted(hash));
                }
                return Ok(receipt);
            }
            if Instant::now() >= deadline {
                return Err(Error::ReceiptTimeout(hash));
            }
            sleep(self.polling.receipt_interval).await;
        }
    }
}
