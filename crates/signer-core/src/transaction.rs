//! Transaction serialization for signing.
//!
//! Two envelopes are supported:
//!
//! - **Legacy**, with [EIP-155] replay protection when a chain id is set
//! - **EIP-1559** (type `0x02`), with priority and max fees
//!
//! # Signing Flow
//!
//! 1. [`Transaction::unsigned_rlp`] serializes the unsigned payload
//! 2. [`Transaction::signing_hash`] is its Keccak-256 digest
//! 3. the oracle signs the digest
//! 4. [`Transaction::signed_rlp`] re-serializes with the signature attached
//!
//! # Example
//!
//! ```
//! use alloy_primitives::U256;
//! use kms_evm_signer_core::{Address, Eip1559Transaction, Transaction};
//!
//! let tx = Transaction::Eip1559(Eip1559Transaction {
//!     chain_id: 1,
//!     nonce: 0,
//!     max_priority_fee_per_gas: U256::from(1_000_000_000u64),
//!     max_fee_per_gas: U256::from(100_000_000_000u64),
//!     gas_limit: 21000,
//!     to: Some(Address::zero()),
//!     value: U256::from(1u64),
//!     data: Default::default(),
//!     access_list: vec![],
//! });
//!
//! assert_eq!(tx.unsigned_rlp()[0], 0x02);
//! let digest = tx.signing_hash();
//! ```
//!
//! [EIP-155]: https://eips.ethereum.org/EIPS/eip-155

use alloy_primitives::{B256, Bytes, U256, keccak256};
use alloy_rlp::{BufMut, Encodable, Header, RlpEncodable};
use serde::{Deserialize, Serialize};

use crate::address::Address;
use crate::error::{Error, Result};
use crate::signature::Signature;

/// An access list entry for EIP-2930/EIP-1559 transactions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, RlpEncodable)]
#[serde(rename_all = "camelCase")]
pub struct AccessListEntry {
    /// The address being accessed.
    pub address: alloy_primitives::Address,

    /// The storage keys being accessed at this address.
    pub storage_keys: Vec<B256>,
}

/// A legacy transaction.
///
/// With a chain id the signing payload and `v` follow EIP-155; without one
/// the transaction is replayable across chains and `v` is `27` or `28`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LegacyTransaction {
    /// The chain ID for replay protection.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chain_id: Option<u64>,

    /// The transaction nonce.
    pub nonce: u64,

    /// The gas price in wei.
    pub gas_price: U256,

    /// The gas limit.
    pub gas_limit: u64,

    /// The recipient address, or `None` for contract creation.
    #[serde(default)]
    pub to: Option<Address>,

    /// The value to transfer in wei.
    #[serde(default)]
    pub value: U256,

    /// The transaction input data.
    #[serde(default)]
    pub data: Bytes,
}

impl LegacyTransaction {
    fn encode_body(&self, out: &mut dyn BufMut) {
        self.nonce.encode(out);
        self.gas_price.encode(out);
        self.gas_limit.encode(out);
        encode_to(self.to.as_ref(), out);
        self.value.encode(out);
        self.data.encode(out);
    }

    /// `rlp([nonce, gasPrice, gasLimit, to, value, data, chainId, 0, 0])`, or
    /// the first six fields alone when no chain id is set.
    #[must_use]
    pub fn unsigned_rlp(&self) -> Vec<u8> {
        let mut out = Vec::new();
        encode_list(&mut out, |buf| {
            self.encode_body(buf);
            if let Some(chain_id) = self.chain_id {
                chain_id.encode(buf);
                0u8.encode(buf);
                0u8.encode(buf);
            }
        });
        out
    }

    /// The digest to sign.
    #[must_use]
    pub fn signing_hash(&self) -> B256 {
        keccak256(self.unsigned_rlp())
    }

    /// The largest chain id whose EIP-155 `v` fits in 64 bits ([EIP-2294]).
    ///
    /// [EIP-2294]: https://eips.ethereum.org/EIPS/eip-2294
    pub const MAX_CHAIN_ID: u64 = (u64::MAX - 36) / 2;

    /// The `v` value of the signed envelope.
    ///
    /// Computed in 256 bits, so it is exact for any chain id;
    /// [`LegacyTransaction::validate`] bounds the chain id before signing.
    #[must_use]
    pub fn signature_v(&self, signature: &Signature) -> U256 {
        let parity = U256::from(signature.y_parity());
        self.chain_id.map_or_else(
            || U256::from(signature.v()),
            |id| U256::from(id) * U256::from(2) + U256::from(35) + parity,
        )
    }

    /// Rejects a chain id above [`LegacyTransaction::MAX_CHAIN_ID`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidTransaction`] for an out-of-range chain id.
    pub fn validate(&self) -> Result<()> {
        match self.chain_id {
            Some(id) if id > Self::MAX_CHAIN_ID => Err(Error::InvalidTransaction(format!(
                "chain id {id} exceeds {}",
                Self::MAX_CHAIN_ID
            ))),
            _ => Ok(()),
        }
    }

    /// `rlp([nonce, gasPrice, gasLimit, to, value, data, v, r, s])`.
    #[must_use]
    pub fn signed_rlp(&self, signature: &Signature) -> Vec<u8> {
        let mut out = Vec::new();
        encode_list(&mut out, |buf| {
            self.encode_body(buf);
            self.signature_v(signature).encode(buf);
            signature.r_u256().encode(buf);
            signature.s_u256().encode(buf);
        });
        out
    }
}

/// An [EIP-1559] (type 2) transaction.
///
/// [EIP-1559]: https://eips.ethereum.org/EIPS/eip-1559
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Eip1559Transaction {
    /// The chain ID.
    pub chain_id: u64,

    /// The transaction nonce.
    pub nonce: u64,

    /// The maximum priority fee per gas (tip).
    pub max_priority_fee_per_gas: U256,

    /// The maximum total fee per gas.
    pub max_fee_per_gas: U256,

    /// The gas limit.
    pub gas_limit: u64,

    /// The recipient address, or `None` for contract creation.
    #[serde(default)]
    pub to: Option<Address>,

    /// The value to transfer in wei.
    #[serde(default)]
    pub value: U256,

    /// The transaction input data.
    #[serde(default)]
    pub data: Bytes,

    /// The access list.
    #[serde(default)]
    pub access_list: Vec<AccessListEntry>,
}

impl Eip1559Transaction {
    /// The transaction type identifier for EIP-1559.
    pub const TX_TYPE: u8 = 0x02;

    fn encode_body(&self, out: &mut dyn BufMut) {
        self.chain_id.encode(out);
        self.nonce.encode(out);
        self.max_priority_fee_per_gas.encode(out);
        self.max_fee_per_gas.encode(out);
        self.gas_limit.encode(out);
        encode_to(self.to.as_ref(), out);
        self.value.encode(out);
        self.data.encode(out);
        self.access_list.encode(out);
    }

    /// `0x02 || rlp([chainId, nonce, maxPriorityFeePerGas, maxFeePerGas,
    /// gasLimit, to, value, data, accessList])`.
    #[must_use]
    pub fn unsigned_rlp(&self) -> Vec<u8> {
        let mut out = vec![Self::TX_TYPE];
        encode_list(&mut out, |buf| self.encode_body(buf));
        out
    }

    /// The digest to sign.
    #[must_use]
    pub fn signing_hash(&self) -> B256 {
        keccak256(self.unsigned_rlp())
    }

    /// The unsigned payload followed by `yParity, r, s`.
    #[must_use]
    pub fn signed_rlp(&self, signature: &Signature) -> Vec<u8> {
        let mut out = vec![Self::TX_TYPE];
        encode_list(&mut out, |buf| {
            self.encode_body(buf);
            signature.y_parity().encode(buf);
            signature.r_u256().encode(buf);
            signature.s_u256().encode(buf);
        });
        out
    }

    /// Rejects a priority fee above the max fee.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidTransaction`] when
    /// `maxPriorityFeePerGas > maxFeePerGas`.
    pub fn validate(&self) -> Result<()> {
        if self.max_priority_fee_per_gas > self.max_fee_per_gas {
            return Err(Error::InvalidTransaction(format!(
                "maxPriorityFeePerGas ({}) exceeds maxFeePerGas ({})",
                self.max_priority_fee_per_gas, self.max_fee_per_gas
            )));
        }
        Ok(())
    }
}

/// Writes an RLP list header followed by the payload produced by `f`.
fn encode_list<F>(out: &mut Vec<u8>, f: F)
where
    F: FnOnce(&mut Vec<u8>),
{
    let mut payload = Vec::new();
    f(&mut payload);

    Header {
        list: true,
        payload_length: payload.len(),
    }
    .encode(out);
    out.extend_from_slice(&payload);
}

/// Encodes the recipient; contract creation is the empty string.
fn encode_to(to: Option<&Address>, out: &mut dyn BufMut) {
    match to {
        Some(addr) => addr.inner().encode(out),
        None => out.put_u8(alloy_rlp::EMPTY_STRING_CODE),
    }
}

/// A transaction in any supported envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Transaction {
    /// Legacy transaction.
    #[serde(rename = "legacy")]
    Legacy(LegacyTransaction),
    /// EIP-1559 (type 2) transaction.
    #[serde(rename = "eip1559")]
    Eip1559(Eip1559Transaction),
}

impl Transaction {
    /// The unsigned serialization that gets hashed.
    #[must_use]
    pub fn unsigned_rlp(&self) -> Vec<u8> {
        match self {
            Self::Legacy(tx) => tx.unsigned_rlp(),
            Self::Eip1559(tx) => tx.unsigned_rlp(),
        }
    }

    /// The digest to sign, `keccak256(unsigned_rlp)`.
    #[must_use]
    pub fn signing_hash(&self) -> B256 {
        match self {
            Self::Legacy(tx) => tx.signing_hash(),
            Self::Eip1559(tx) => tx.signing_hash(),
        }
    }

    /// The chain id, if the transaction is bound to one.
    #[must_use]
    pub const fn chain_id(&self) -> Option<u64> {
        match self {
            Self::Legacy(tx) => tx.chain_id,
            Self::Eip1559(tx) => Some(tx.chain_id),
        }
    }

    /// The signed serialization, ready for `eth_sendRawTransaction`.
    #[must_use]
    pub fn signed_rlp(&self, signature: &Signature) -> Vec<u8> {
        match self {
            Self::Legacy(tx) => tx.signed_rlp(signature),
            Self::Eip1559(tx) => tx.signed_rlp(signature),
        }
    }

    /// Checks the fields before anything is sent to the oracle.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidTransaction`] for inconsistent fee fields or
    /// an out-of-range legacy chain id.
    pub fn validate(&self) -> Result<()> {
        match self {
            Self::Legacy(tx) => tx.validate(),
            Self::Eip1559(tx) => tx.validate(),
        }
    }

    /// Parses a transaction from JSON.
    ///
    /// # Errors
    ///
    /// Returns [`Error::JsonError`] if parsing fails.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Serializes the transaction to JSON.
    ///
    /// # Errors
    ///
    /// Returns [`Error::JsonError`] if serialization fails.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

impl From<LegacyTransaction> for Transaction {
    fn from(tx: LegacyTransaction) -> Self {
        Self::Legacy(tx)
    }
}

impl From<Eip1559Transaction> for Transaction {
    fn from(tx: Eip1559Transaction) -> Self {
        Self::Eip1559(tx)
    }
}
