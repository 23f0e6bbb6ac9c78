//! Error types for the KMS EVM signer library.
//!
//! This module provides a single error type [`enum@Error`] that covers every
//! failure mode between the key oracle and a finished EVM signature.
//!
//! # Error Categories
//!
//! - **Decoding errors**: malformed DER public keys or signatures from the oracle
//! - **Oracle errors**: failed or empty responses from the remote key service
//! - **Recovery errors**: signatures that do not belong to the expected key
//! - **Encoding errors**: transaction, EIP-712, hex and JSON handling
//!
//! # Example
//!
//! ```
//! use kms_evm_signer_core::Error;
//!
//! let err = Error::OracleCallFailed;
//! assert_eq!(err.to_string(), "KMS call failed");
//! ```

use core::result::Result as CoreResult;
use hex::FromHexError;
use serde_json::Error as SerdeJsonError;
use thiserror::Error;

/// The main error type for the KMS EVM signer library.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    // =========================================================================
    // Decoding Errors
    // =========================================================================
    /// The oracle returned bytes that are not the expected DER structure.
    #[error("DER decoding failed: {0}")]
    Decode(String),

    /// The public key is well-formed DER but not a usable secp256k1 key.
    #[error("invalid public key: {0}")]
    InvalidPublicKey(String),

    /// A serialized `r || s || v` signature is malformed.
    #[error("invalid signature: {0}")]
    InvalidSignature(String),

    // =========================================================================
    // Oracle Errors
    // =========================================================================
    /// The sign request completed but carried no signature payload.
    ///
    /// The message is fixed so callers can match on it.
    #[error("KMS call failed")]
    OracleCallFailed,

    /// The oracle client failed to complete a request.
    #[error("key oracle request failed: {0}")]
    Oracle(String),

    // =========================================================================
    // Recovery Errors
    // =========================================================================
    /// Neither recovery candidate reproduces the signer's address.
    #[error("signature does not recover to signer address {0}")]
    RecoveryInconsistency(String),

    // =========================================================================
    // Transaction Errors
    // =========================================================================
    /// The transaction data is invalid.
    #[error("invalid transaction: {0}")]
    InvalidTransaction(String),

    // =========================================================================
    // EIP-712 Errors
    // =========================================================================
    /// The EIP-712 typed data is invalid.
    #[error("invalid EIP-712 typed data: {0}")]
    InvalidTypedData(String),

    /// A type referenced in the typed data is not defined.
    #[error("undefined type in EIP-712 data: {0}")]
    UndefinedType(String),

    // =========================================================================
    // Serialization & Configuration Errors
    // =========================================================================
    /// Failed to parse hex data.
    #[error("hex decoding failed: {0}")]
    HexDecodeFailed(String),

    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    JsonError(String),

    /// Signer configuration is missing or invalid.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl Error {
    /// Shorthand for a [`Error::Decode`] with a static reason.
    pub(crate) fn decode(reason: impl Into<String>) -> Self {
        Self::Decode(reason.into())
    }
}

impl From<FromHexError> for Error {
    fn from(err: FromHexError) -> Self {
        Self::HexDecodeFailed(err.to_string())
    }
}

impl From<SerdeJsonError> for Error {
    fn from(err: SerdeJsonError) -> Self {
        Self::JsonError(err.to_string())
    }
}

/// A specialized [`Result`] type for KMS EVM signer operations.
pub type Result<T> = CoreResult<T, Error>;
