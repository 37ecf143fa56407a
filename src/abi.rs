//! Solidity ABI Codec
//!
//! [`Token`] is the crate's view of an ABI value; encoding and decoding are
//! delegated to `alloy-dyn-abi`. Return data and event logs are decoded
//! against a tuple type such as `"(bytes32,string,address)"` and then read by
//! position through [`Decoder`].

use alloy_dyn_abi::{DynSolType, DynSolValue};
use alloy_primitives::B256;
use ethereum_types::{Address, H256, U256};

use crate::crypto::keccak256;
use crate::error::{Error, Result};

// ============================================================================
// VALUES
// ============================================================================

/// A single ABI value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    Address(Address),
    Uint(U256),
    FixedBytes(H256),
    Bool(bool),
    String(String),
    Bytes(Vec<u8>),
    Array(Vec<Token>),
    Tuple(Vec<Token>),
}

impl From<Address> for Token {
    fn from(value: Address) -> Self {
        Token::Address(value)
    }
}

impl From<U256> for Token {
    fn from(value: U256) -> Self {
        Token::Uint(value)
    }
}

impl From<H256> for Token {
    fn from(value: H256) -> Self {
        Token::FixedBytes(value)
    }
}

impl From<&str> for Token {
    fn from(value: &str) -> Self {
        Token::String(value.to_string())
    }
}

impl From<&Token> for DynSolValue {
    fn from(token: &Token) -> Self {
        match token {
            Token::Address(value) => DynSolValue::Address(to_alloy_address(*value)),
            Token::Uint(value) => DynSolValue::Uint(to_alloy_uint(*value), 256),
            Token::FixedBytes(value) => DynSolValue::FixedBytes(B256::from(value.0), 32),
            Token::Bool(value) => DynSolValue::Bool(*value),
            Token::String(value) => DynSolValue::String(value.clone()),
            Token::Bytes(value) => DynSolValue::Bytes(value.clone()),
            Token::Array(items) => DynSolValue::Array(items.iter().map(DynSolValue::from).collect()),
            Token::Tuple(items) => DynSolValue::Tuple(items.iter().map(DynSolValue::from).collect()),
        }
    }
}

pub(crate) fn to_alloy_uint(value: U256) -> alloy_primitives::U256 {
    let mut word = [0u8; 32];
    value.to_big_endian(&mut word);
    alloy_primitives::U256::from_be_bytes(word)
}

pub(crate) fn from_alloy_uint(value: alloy_primitives::U256) -> U256 {
    U256::from_big_endian(&value.to_be_bytes::<32>())
}

pub(crate) fn to_alloy_address(value: Address) -> alloy_primitives::Address {
    alloy_primitives::Address::from(value.0)
}

pub(crate) fn from_alloy_address(value: alloy_primitives::Address) -> Address {
    Address::from_slice(value.as_slice())
}

// ============================================================================
// ENCODING
// ============================================================================

/// Encodes `tokens` the way Solidity's `abi.encode` does.
pub fn encode(tokens: &[Token]) -> Vec<u8> {
    DynSolValue::Tuple(tokens.iter().map(DynSolValue::from).collect()).abi_encode_params()
}

/// Returns the 4-byte function selector for a canonical signature such as
/// `"approve(address,uint256)"`.
pub fn selector(signature: &str) -> [u8; 4] {
    let hash = keccak256(signature.as_bytes());
    [hash[0], hash[1], hash[2], hash[3]]
}

/// Returns the topic hash of a canonical event signature.
pub fn event_topic(signature: &str) -> H256 {
    H256::from(keccak256(signature.as_bytes()))
}

/// Builds call data: selector followed by the encoded arguments.
pub fn encode_call(signature: &str, args: &[Token]) -> Vec<u8> {
    let mut data = selector(signature).to_vec();
    data.extend(encode(args));
    data
}

/// Parameter list of a canonical signature: `"f(uint256,address)"` gives
/// `"(uint256,address)"`.
pub fn parameter_types(signature: &str) -> &str {
    signature.find('(').map_or(signature, |start| &signature[start..])
}

// ============================================================================
// DECODING
// ============================================================================

/// Positional view over decoded ABI values.
#[derive(Debug, Clone, PartialEq)]
pub struct Decoder {
    values: Vec<DynSolValue>,
}

impl Decoder {
    /// Decodes `data` as the parameters of the tuple type `types`.
    ///
    /// # Arguments
    ///
    /// * `types` - Tuple type, e.g. `"(bytes32,string)"`
    /// * `data` - ABI encoded parameters
    pub fn new(types: &str, data: &[u8]) -> Result<Self> {
        let ty = DynSolType::parse(types).map_err(|e| Error::Abi(format!("invalid type '{}': {}", types, e)))?;
        let decoded = ty
            .abi_decode_params(data)
            .map_err(|e| Error::Abi(format!("cannot decode {} from {} bytes: {}", types, data.len(), e)))?;
        match decoded {
            DynSolValue::Tuple(values) => Ok(Self { values }),
            single => Ok(Self { values: vec![single] }),
        }
    }

    fn value(&self, index: usize) -> Result<&DynSolValue> {
        self.values
            .get(index)
            .ok_or_else(|| Error::Abi(format!("no value at position {} ({} decoded)", index, self.values.len())))
    }

    fn mismatch(&self, index: usize, expected: &str) -> Error {
        Error::Abi(format!("value at position {} is not {}", index, expected))
    }

    pub fn uint(&self, index: usize) -> Result<U256> {
        self.value(index)?
            .as_uint()
            .map(|(value, _)| from_alloy_uint(value))
            .ok_or_else(|| self.mismatch(index, "an unsigned integer"))
    }

    pub fn uint8(&self, index: usize) -> Result<u8> {
        let value = self.uint(index)?;
        if value > U256::from(u8::MAX) {
            return Err(Error::Abi(format!("value {} does not fit uint8", value)));
        }
        Ok(value.low_u32() as u8)
    }

    pub fn bool(&self, index: usize) -> Result<bool> {
        self.value(index)?.as_bool().ok_or_else(|| self.mismatch(index, "a bool"))
    }

    pub fn address(&self, index: usize) -> Result<Address> {
        self.value(index)?
            .as_address()
            .map(from_alloy_address)
            .ok_or_else(|| self.mismatch(index, "an address"))
    }

    pub fn bytes32(&self, index: usize) -> Result<H256> {
        match self.value(index)?.as_fixed_bytes() {
            Some((bytes, 32)) => Ok(H256::from_slice(bytes)),
            _ => Err(self.mismatch(index, "bytes32")),
        }
    }

    pub fn bytes(&self, index: usize) -> Result<Vec<u8>> {
        self.value(index)?
            .as_bytes()
            .map(<[u8]>::to_vec)
            .ok_or_else(|| self.mismatch(index, "bytes"))
    }

    pub fn string(&self, index: usize) -> Result<String> {
        self.value(index)?
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| self.mismatch(index, "a string"))
    }

    /// The tuple at `index`.
    pub fn tuple(&self, index: usize) -> Result<Decoder> {
        self.value(index)?
            .as_tuple()
            .map(|values| Decoder { values: values.to_vec() })
            .ok_or_else(|| self.mismatch(index, "a tuple"))
    }

    /// The array of tuples at `index`, one decoder per element.
    pub fn tuple_array(&self, index: usize) -> Result<Vec<Decoder>> {
        let items = self.value(index)?.as_array().ok_or_else(|| self.mismatch(index, "an array"))?;
        items
            .iter()
            .map(|item| {
                item.as_tuple()
                    .map(|values| Decoder { values: values.to_vec() })
                    .ok_or_else(|| Error::Abi("array element is not a tuple".to_string()))
            })
            .collect()
    }
}

// ============================================================================
// HEX HELPERS
// ============================================================================

/// Decodes a hex string with or without `0x` prefix.
pub fn decode_hex(value: &str) -> Result<Vec<u8>> {
    let stripped = value.strip_prefix("0x").unwrap_or(value);
    hex::decode(stripped).map_err(|e| Error::Abi(format!("invalid hex '{}': {}", value, e)))
}

/// Encodes bytes as a `0x`-prefixed lowercase hex string.
pub fn encode_hex(value: &[u8]) -> String {
    format!("0x{}", hex::encode(value))
}

/// Formats an address as a full `0x`-prefixed lowercase hex string.
pub fn address_hex(address: &Address) -> String {
    encode_hex(address.as_bytes())
}
