//! EVM signature types for secp256k1 ECDSA.
//!
//! Three shapes of a signature travel through the signer:
//!
//! - [`RawSignature`]: the `(r, s)` pair decoded from the oracle's DER output
//! - [`RecoveryId`]: which of the two candidate public keys produced it
//! - [`Signature`]: the complete `r || s || v` form handed to callers
//!
//! # Example
//!
//! ```
//! use kms_evm_signer_core::{RecoveryId, Signature};
//!
//! let sig = Signature::new([1u8; 32], [2u8; 32], RecoveryId::Odd);
//! assert_eq!(sig.v(), 28);
//! assert_eq!(sig.to_bytes()[64], 28);
//! ```

use core::fmt;

use alloy_primitives::U256;
use serde::{Deserialize, Serialize};

use crate::crypto;
use crate::error::{Error, Result};

/// The recovery identifier of a secp256k1 signature.
///
/// Exposed both as the legacy `v` byte (`27` / `28`) and as the y-parity bit
/// used by typed transactions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum RecoveryId {
    /// `v = 27`, the ephemeral point has an even y coordinate.
    Even,
    /// `v = 28`, the ephemeral point has an odd y coordinate.
    Odd,
}

impl RecoveryId {
    /// Both candidates, in the order the resolver tries them.
    pub const CANDIDATES: [Self; 2] = [Self::Even, Self::Odd];

    /// Creates a recovery id from a `v` value of `27` or `28`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidSignature`] for any other value.
    pub fn from_v(v: u8) -> Result<Self> {
        match v {
            27 => Ok(Self::Even),
            28 => Ok(Self::Odd),
            other => Err(Error::InvalidSignature(format!(
                "recovery byte must be 27 or 28, got {other}"
            ))),
        }
    }

    /// Creates a recovery id from the y-parity bit.
    #[must_use]
    pub const fn from_y_parity(odd: bool) -> Self {
        if odd { Self::Odd } else { Self::Even }
    }

    /// The legacy `v` byte (`27` or `28`).
    #[must_use]
    pub const fn v(self) -> u8 {
        27 + self.y_parity()
    }

    /// The y-parity bit (`0` or `1`).
    #[must_use]
    pub const fn y_parity(self) -> u8 {
        match self {
            Self::Even => 0,
            Self::Odd => 1,
        }
    }

    /// Returns the other candidate.
    #[must_use]
    pub const fn flip(self) -> Self {
        match self {
            Self::Even => Self::Odd,
            Self::Odd => Self::Even,
        }
    }
}

impl TryFrom<u8> for RecoveryId {
    type Error = Error;

    fn try_from(v: u8) -> Result<Self> {
        Self::from_v(v)
    }
}

impl From<RecoveryId> for u8 {
    fn from(id: RecoveryId) -> Self {
        id.v()
    }
}

impl From<RecoveryId> for k256::ecdsa::RecoveryId {
    fn from(id: RecoveryId) -> Self {
        Self::new(id.y_parity() == 1, false)
    }
}

/// An `(r, s)` pair as decoded from a DER `ECDSA-Sig-Value`.
///
/// Values produced by [`crate::der::decode_signature`] are always in
/// `1..N`, but `s` may still sit in the upper half of the curve order until
/// [`RawSignature::normalize_s`] is applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RawSignature {
    r: U256,
    s: U256,
}

impl RawSignature {
    /// Creates a raw signature from its scalars.
    #[must_use]
    pub const fn new(r: U256, s: U256) -> Self {
        Self { r, s }
    }

    /// The `r` scalar.
    #[must_use]
    pub const fn r(&self) -> U256 {
        self.r
    }

    /// The `s` scalar.
    #[must_use]
    pub const fn s(&self) -> U256 {
        self.s
    }

    /// Returns `true` if `s` is at most half the curve order.
    #[must_use]
    pub fn is_low_s(&self) -> bool {
        self.s <= crypto::SECP256K1_HALF_N
    }

    /// Returns the low-s form of this signature.
    ///
    /// See [`crypto::normalize_s`].
    #[must_use]
    pub fn normalize_s(self) -> Self {
        crypto::normalize_s(self)
    }

    /// Attaches a recovery id, producing the complete signature.
    #[must_use]
    pub fn with_recovery_id(self, id: RecoveryId) -> Signature {
        Signature::new(self.r.to_be_bytes(), self.s.to_be_bytes(), id)
    }

    /// Converts to a k256 signature for public-key recovery.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidSignature`] if either scalar is zero or not
    /// below the curve order.
    pub(crate) fn to_k256(self) -> Result<k256::ecdsa::Signature> {
        k256::ecdsa::Signature::from_scalars(self.r.to_be_bytes::<32>(), self.s.to_be_bytes::<32>())
            .map_err(|e| Error::InvalidSignature(e.to_string()))
    }
}

/// A complete EVM ECDSA signature over secp256k1.
///
/// # Wire Format
///
/// 65 bytes: `r (32 bytes) || s (32 bytes) || v (1 byte)` with `v` being
/// `27` or `28`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Signature {
    /// The R component of the signature (32 bytes).
    #[serde(with = "hex_bytes")]
    r: [u8; 32],

    /// The S component of the signature (32 bytes).
    #[serde(with = "hex_bytes")]
    s: [u8; 32],

    /// The recovery id, serialized as `27` or `28`.
    v: RecoveryId,
}

/// Serde helper for hex encoding/decoding 32-byte arrays.
mod hex_bytes {
    use hex::{decode, encode};
    use serde::{Deserialize, Deserializer, Serializer, de};

    pub(super) fn serialize<S>(bytes: &[u8; 32], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&format!("0x{}", encode(bytes)))
    }

    pub(super) fn deserialize<'de, D>(deserializer: D) -> Result<[u8; 32], D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        let s = s.strip_prefix("0x").unwrap_or(&s);
        let bytes = decode(s).map_err(de::Error::custom)?;
        bytes
            .try_into()
            .map_err(|_| de::Error::custom("expected 32 bytes"))
    }
}

impl Signature {
    /// The length of a serialized signature in bytes.
    pub const BYTE_LEN: usize = 65;

    /// Creates a new signature from raw components.
    ///
    /// # Example
    ///
    /// ```
    /// use kms_evm_signer_core::{RecoveryId, Signature};
    ///
    /// let sig = Signature::new([1u8; 32], [2u8; 32], RecoveryId::Even);
    /// assert_eq!(sig.v(), 27);
    /// ```
    #[must_use]
    pub const fn new(r: [u8; 32], s: [u8; 32], v: RecoveryId) -> Self {
        Self { r, s, v }
    }

    /// Creates a signature from a 65-byte slice.
    ///
    /// # Arguments
    ///
    /// * `bytes` - A 65-byte slice containing `r || s || v`
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidSignature`] if:
    ///
    /// - The slice is not exactly 65 bytes
    /// - The recovery byte is not `27` or `28`
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != Self::BYTE_LEN {
            return Err(Error::InvalidSignature(format!(
                "expected {} bytes, got {}",
                Self::BYTE_LEN,
                bytes.len()
            )));
        }

        let r: [u8; 32] = bytes[0..32]
            .try_into()
            .map_err(|_| Error::InvalidSignature("invalid r component".to_string()))?;
        let s: [u8; 32] = bytes[32..64]
            .try_into()
            .map_err(|_| Error::InvalidSignature("invalid s component".to_string()))?;
        let v = RecoveryId::from_v(bytes[64])?;

        Ok(Self::new(r, s, v))
    }

    /// Serializes the signature to a 65-byte array.
    #[must_use]
    pub fn to_bytes(&self) -> [u8; Self::BYTE_LEN] {
        let mut bytes = [0u8; Self::BYTE_LEN];
        bytes[0..32].copy_from_slice(&self.r);
        bytes[32..64].copy_from_slice(&self.s);
        bytes[64] = self.v.v();
        bytes
    }

    /// Returns the R component of the signature.
    #[must_use]
    pub const fn r(&self) -> &[u8; 32] {
        &self.r
    }

    /// Returns the S component of the signature.
    #[must_use]
    pub const fn s(&self) -> &[u8; 32] {
        &self.s
    }

    /// Returns the legacy recovery byte (`27` or `28`).
    #[must_use]
    pub const fn v(&self) -> u8 {
        self.v.v()
    }

    /// Returns the recovery id.
    #[must_use]
    pub const fn recovery_id(&self) -> RecoveryId {
        self.v
    }

    /// Returns the y-parity bit used by typed transactions.
    #[must_use]
    pub const fn y_parity(&self) -> u8 {
        self.v.y_parity()
    }

    /// Returns the R component as a [`U256`].
    #[must_use]
    pub const fn r_u256(&self) -> U256 {
        U256::from_be_bytes(self.r)
    }

    /// Returns the S component as a [`U256`].
    #[must_use]
    pub const fn s_u256(&self) -> U256 {
        U256::from_be_bytes(self.s)
    }

    /// Drops the recovery id.
    #[must_use]
    pub const fn to_raw(&self) -> RawSignature {
        RawSignature::new(self.r_u256(), self.s_u256())
    }

    /// Encodes the signature as a hex string with `0x` prefix.
    ///
    /// # Example
    ///
    /// ```
    /// use kms_evm_signer_core::{RecoveryId, Signature};
    ///
    /// let sig = Signature::new([0u8; 32], [0u8; 32], RecoveryId::Odd);
    /// let hex = sig.to_hex();
    /// assert!(hex.starts_with("0x"));
    /// assert!(hex.ends_with("1c"));
    /// assert_eq!(hex.len(), 132);
    /// ```
    #[must_use]
    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.to_bytes()))
    }

    /// Parses a signature from a hex string, optionally prefixed with `0x`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::HexDecodeFailed`] if the hex string is invalid, or
    /// [`Error::InvalidSignature`] if the decoded bytes are not a valid
    /// 65-byte signature.
    pub fn from_hex(hex_str: &str) -> Result<Self> {
        let hex_str = hex_str.strip_prefix("0x").unwrap_or(hex_str);
        let bytes = hex::decode(hex_str)?;
        Self::from_bytes(&bytes)
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}
