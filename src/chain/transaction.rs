//! EIP-155 legacy transactions.
//!
//! [`LegacyTransaction`] carries the fields the chain layer fills in; signing
//! and RLP encoding go through `alloy-consensus`.

use alloy_consensus::transaction::SignableTransaction;
use alloy_consensus::{Signed, TxEnvelope, TxLegacy};
use alloy_eips::eip2718::Encodable2718;
use alloy_primitives::{Bytes, TxKind};
use alloy_signer::SignerSync;
use ethereum_types::{Address, H256, U256};

use crate::abi::{to_alloy_address, to_alloy_uint};
use crate::crypto::Signer;
use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LegacyTransaction {
    pub nonce: U256,
    pub gas_price: U256,
    pub gas_limit: U256,
    pub to: Address,
    pub value: U256,
    pub data: Vec<u8>,
    pub chain_id: u64,
}

impl LegacyTransaction {
    fn to_consensus(&self) -> Result<TxLegacy> {
        Ok(TxLegacy {
            chain_id: Some(self.chain_id),
            nonce: narrow_u64("nonce", self.nonce)?,
            gas_price: narrow_u128("gasPrice", self.gas_price)?,
            gas_limit: narrow_u64("gas", self.gas_limit)?,
            to: TxKind::Call(to_alloy_address(self.to)),
            value: to_alloy_uint(self.value),
            input: Bytes::from(self.data.clone()),
        })
    }

    /// Hash the signer commits to.
    pub fn signing_hash(&self) -> Result<H256> {
        Ok(H256::from(self.to_consensus()?.signature_hash().0))
    }

    /// Signs the transaction with the EIP-155 replay protection of `chain_id`.
    pub fn sign_with(&self, signer: &Signer) -> Result<Signed<TxLegacy>> {
        let tx = self.to_consensus()?;
        let signature = signer
            .local()
            .sign_hash_sync(&tx.signature_hash())
            .map_err(|e| Error::InvalidSignature(format!("failed to sign transaction: {}", e)))?;
        Ok(tx.into_signed(signature))
    }

    /// Signs the transaction and returns the raw bytes for `eth_sendRawTransaction`.
    pub fn sign(&self, signer: &Signer) -> Result<Vec<u8>> {
        Ok(TxEnvelope::from(self.sign_with(signer)?).encoded_2718())
    }
}

fn narrow_u64(field: &str, value: U256) -> Result<u64> {
    if value > U256::from(u64::MAX) {
        return Err(Error::Abi(format!("{} {} does not fit 64 bits", field, value)));
    }
    Ok(value.as_u64())
}

fn narrow_u128(field: &str, value: U256) -> Result<u128> {
    if value > U256::from(u128::MAX) {
        return Err(Error::Abi(format!("{} {} does not fit 128 bits", field, value)));
    }
    Ok(value.as_u128())
}
