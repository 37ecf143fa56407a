//! Contract call proxy.

use ethereum_types::{Address, H256, U256};

use super::ChainAccess;
use crate::abi::{encode_call, Decoder, Token};
use crate::contracts::ContractAbi;
use crate::error::Result;

/// A deployed contract bound to the active provider, and to the signer when
/// one is configured.
#[derive(Debug, Clone, Copy)]
pub struct Contract<'a> {
    chain: &'a ChainAccess,
    address: Address,
    abi: &'static ContractAbi,
}

impl<'a> Contract<'a> {
    pub(super) fn new(chain: &'a ChainAccess, address: Address, abi: &'static ContractAbi) -> Self {
        Self { chain, address, abi }
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn abi(&self) -> &'static ContractAbi {
        self.abi
    }

    /// Read-only call. Returns the raw ABI encoded return data.
    pub async fn call(&self, function: &str, args: &[Token]) -> Result<Vec<u8>> {
        let signature = self.abi.function(function)?;
        let data = encode_call(signature, args);
        let from = self.chain.signer().map(|signer| signer.address());
        self.chain.provider()?.call(from, self.address, &data).await
    }

    /// Read-only call decoding the return data as the tuple type `returns`.
    pub async fn call_decoded(&self, function: &str, args: &[Token], returns: &str) -> Result<Decoder> {
        let data = self.call(function, args).await?;
        Decoder::new(returns, &data)
    }

    /// Read-only call returning a single `uint256`.
    pub async fn call_uint(&self, function: &str, args: &[Token]) -> Result<U256> {
        self.call_decoded(function, args, "(uint256)").await?.uint(0)
    }

    /// Signs and broadcasts a state-changing call. Requires a signer.
    pub async fn send(&self, function: &str, args: &[Token]) -> Result<H256> {
        let signature = self.abi.function(function)?;
        self.chain
            .send_transaction(self.address, encode_call(signature, args))
            .await
    }
}
