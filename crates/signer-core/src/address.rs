//! Account address derivation from secp256k1 public keys.
//!
//! The address of a key is the low 20 bytes of the Keccak-256 hash of its
//! uncompressed point without the `0x04` SEC1 prefix:
//!
//! ```text
//! address = keccak256(X || Y)[12..32]
//! ```
//!
//! # Example
//!
//! ```
//! use kms_evm_signer_core::Address;
//!
//! let der = hex::decode(
//!     "3056301006072a8648ce3d020106052b8104000a03420004f2de8ae7a9f594fb0d399abfb58639f43fb80960a1ed7c6e257c11e764d4759e1773a2c7ec7b913bec5d0e3a12bd7acd199f62e86de3f83b35bf6749fc1144ba",
//! )
//! .unwrap();
//! let address = Address::from_der_public_key(&der).unwrap();
//! assert_eq!(address.to_hex(), "0xe94e130546485b928c9c9b9a5e69eb787172952e");
//! ```

use core::fmt;
use core::str::FromStr;

use alloy_primitives::{Address as AlloyAddress, keccak256};
use k256::ecdsa::VerifyingKey;
use serde::{Deserialize, Serialize};

use crate::der;
use crate::error::{Error, Result};

/// A 20-byte account address.
///
/// Wraps [`alloy_primitives::Address`]; displays in EIP-55 checksum form and
/// serializes transparently as the alloy type does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Address(AlloyAddress);

impl Address {
    /// The length of an address in bytes.
    pub const BYTE_LEN: usize = 20;

    /// Creates a new address from a 20-byte array.
    #[must_use]
    pub const fn new(bytes: [u8; Self::BYTE_LEN]) -> Self {
        Self(AlloyAddress::new(bytes))
    }

    /// Returns the zero address (`0x0000...0000`).
    #[must_use]
    pub const fn zero() -> Self {
        Self(AlloyAddress::ZERO)
    }

    /// Checks if this is the zero address.
    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    /// Derives the address of a k256 verifying key.
    #[must_use]
    pub fn from_public_key(public_key: &VerifyingKey) -> Self {
        let encoded = public_key.to_encoded_point(false);
        Self::from_coordinates(&encoded.as_bytes()[1..])
    }

    /// Derives an address from raw uncompressed public key bytes.
    ///
    /// # Arguments
    ///
    /// * `bytes` - Either 65 bytes (`0x04 || x || y`) or 64 bytes (`x || y`)
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidPublicKey`] if:
    ///
    /// - The byte length is not 64 or 65
    /// - For 65-byte input, the first byte is not `0x04`
    ///
    /// The point itself is not checked against the curve; use
    /// [`Address::from_der_public_key`] for oracle output.
    pub fn from_public_key_bytes(bytes: &[u8]) -> Result<Self> {
        match bytes.len() {
            64 => Ok(Self::from_coordinates(bytes)),
            65 if bytes[0] == 0x04 => Ok(Self::from_coordinates(&bytes[1..])),
            65 => Err(Error::InvalidPublicKey(
                "65-byte public key must start with 0x04".to_string(),
            )),
            len => Err(Error::InvalidPublicKey(format!(
                "expected 64 or 65 bytes, got {len}"
            ))),
        }
    }

    /// Derives the address of a DER `SubjectPublicKeyInfo`, as returned by a
    /// key oracle's public-key query.
    ///
    /// # Errors
    ///
    /// Propagates the [`Error::Decode`] and [`Error::InvalidPublicKey`]
    /// failures of [`der::decode_public_key`].
    pub fn from_der_public_key(der: &[u8]) -> Result<Self> {
        let spki = der::decode_public_key(der)?;
        Self::from_public_key_bytes(spki.point())
    }

    fn from_coordinates(xy: &[u8]) -> Self {
        let hash = keccak256(xy);
        Self(AlloyAddress::from_slice(&hash[12..]))
    }

    /// Returns the address as a byte array reference.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; Self::BYTE_LEN] {
        self.0.as_ref()
    }

    /// Returns the address as a 20-byte array.
    #[must_use]
    pub const fn to_bytes(&self) -> [u8; Self::BYTE_LEN] {
        self.0.0.0
    }

    /// Returns the EIP-55 checksummed hex form.
    #[must_use]
    pub fn to_checksum_hex(&self) -> String {
        self.0.to_checksum(None)
    }

    /// Returns the lowercase hex form with `0x` prefix.
    #[must_use]
    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.as_bytes()))
    }

    /// Parses an address from a hex string, optionally prefixed with `0x`.
    ///
    /// Checksum casing is accepted but not enforced.
    ///
    /// # Errors
    ///
    /// Returns [`Error::HexDecodeFailed`] if the hex string is invalid or
    /// does not decode to exactly 20 bytes.
    pub fn from_hex(hex_str: &str) -> Result<Self> {
        let hex_str = hex_str.strip_prefix("0x").unwrap_or(hex_str);
        let bytes = hex::decode(hex_str)?;

        let bytes: [u8; Self::BYTE_LEN] = bytes.try_into().map_err(|b: Vec<u8>| {
            Error::HexDecodeFailed(format!(
                "expected {} address bytes, got {}",
                Self::BYTE_LEN,
                b.len()
            ))
        })?;
        Ok(Self::new(bytes))
    }

    /// Returns the inner [`alloy_primitives::Address`].
    #[must_use]
    pub const fn inner(&self) -> AlloyAddress {
        self.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_checksum_hex())
    }
}

impl FromStr for Address {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_hex(s)
    }
}

impl From<AlloyAddress> for Address {
    fn from(addr: AlloyAddress) -> Self {
        Self(addr)
    }
}

impl From<Address> for AlloyAddress {
    fn from(addr: Address) -> Self {
        addr.0
    }
}

impl From<[u8; 20]> for Address {
    fn from(bytes: [u8; 20]) -> Self {
        Self::new(bytes)
    }
}
