//! The key oracle seam.
//!
//! A key oracle is a remote service that holds a secp256k1 private key and
//! answers two questions about it: "what is your public key?" and "sign this
//! digest". AWS KMS is the canonical example. The network client lives
//! outside this crate; it plugs in by implementing [`KeyOracle`].
//!
//! # Contract
//!
//! - [`KeyOracle::get_public_key`] returns a DER `SubjectPublicKeyInfo`
//! - [`KeyOracle::sign`] returns a DER `ECDSA-Sig-Value`, or [`None`] when
//!   the service answered without a signature payload
//!
//! Both calls may fail with [`Error::Oracle`](crate::Error::Oracle) for
//! transport problems. Retries, timeouts and credential refresh are the
//! client's business.
//!
//! # Example
//!
//! ```
//! use async_trait::async_trait;
//! use kms_evm_signer_core::oracle::{KeyOracle, SignRequest};
//! use kms_evm_signer_core::Result;
//!
//! #[derive(Debug)]
//! struct Offline;
//!
//! #[async_trait]
//! impl KeyOracle for Offline {
//!     async fn get_public_key(&self, key_id: &str) -> Result<Vec<u8>> {
//!         Err(kms_evm_signer_core::Error::Oracle(format!("{key_id}: offline")))
//!     }
//!
//!     async fn sign(&self, _request: &SignRequest) -> Result<Option<Vec<u8>>> {
//!         Ok(None)
//!     }
//! }
//! ```

use core::fmt;
use std::sync::Arc;

use alloy_primitives::B256;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// The signing algorithm requested from the oracle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum SigningAlgorithm {
    /// ECDSA with a SHA-256 sized input. Combined with
    /// [`MessageType::Digest`] the oracle signs the 32 bytes as given, so a
    /// Keccak-256 digest goes through untouched.
    #[default]
    #[serde(rename = "ECDSA_SHA_256")]
    EcdsaSha256,
}

impl SigningAlgorithm {
    /// The wire name of the algorithm.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::EcdsaSha256 => "ECDSA_SHA_256",
        }
    }
}

impl fmt::Display for SigningAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How the oracle should interpret [`SignRequest::message`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum MessageType {
    /// The message is already a digest and must not be hashed again.
    #[default]
    #[serde(rename = "DIGEST")]
    Digest,
}

impl MessageType {
    /// The wire name of the message type.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Digest => "DIGEST",
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A request to sign one 32-byte digest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SignRequest {
    /// The oracle-side key identifier.
    pub key_id: String,
    /// The digest to sign.
    pub message: B256,
    /// Always [`SigningAlgorithm::EcdsaSha256`].
    pub signing_algorithm: SigningAlgorithm,
    /// Always [`MessageType::Digest`].
    pub message_type: MessageType,
}

impl SignRequest {
    /// Creates a digest-signing request for `key_id`.
    #[must_use]
    pub fn digest(key_id: impl Into<String>, message: B256) -> Self {
        Self {
            key_id: key_id.into(),
            message,
            signing_algorithm: SigningAlgorithm::EcdsaSha256,
            message_type: MessageType::Digest,
        }
    }
}

/// A remote holder of a secp256k1 key.
#[async_trait]
pub trait KeyOracle: Send + Sync {
    /// Fetches the DER `SubjectPublicKeyInfo` of `key_id`.
    ///
    /// # Errors
    ///
    /// Returns an error if the oracle cannot be reached or rejects the
    /// request.
    async fn get_public_key(&self, key_id: &str) -> Result<Vec<u8>>;

    /// Signs `request.message` and returns the DER `ECDSA-Sig-Value`.
    ///
    /// `Ok(None)` means the oracle answered without a signature.
    ///
    /// # Errors
    ///
    /// Returns an error if the oracle cannot be reached or rejects the
    /// request.
    async fn sign(&self, request: &SignRequest) -> Result<Option<Vec<u8>>>;
}

#[async_trait]
impl<O: KeyOracle + ?Sized> KeyOracle for &O {
    async fn get_public_key(&self, key_id: &str) -> Result<Vec<u8>> {
        (**self).get_public_key(key_id).await
    }

    async fn sign(&self, request: &SignRequest) -> Result<Option<Vec<u8>>> {
        (**self).sign(request).await
    }
}

#[async_trait]
impl<O: KeyOracle + ?Sized> KeyOracle for Box<O> {
    async fn get_public_key(&self, key_id: &str) -> Result<Vec<u8>> {
        (**self).get_public_key(key_id).await
    }

    async fn sign(&self, request: &SignRequest) -> Result<Option<Vec<u8>>> {
        (**self).sign(request).await
    }
}

#[async_trait]
impl<O: KeyOracle + ?Sized> KeyOracle for Arc<O> {
    async fn get_public_key(&self, key_id: &str) -> Result<Vec<u8>> {
        (**self).get_public_key(key_id).await
    }

    async fn sign(&self, request: &SignRequest) -> Result<Option<Vec<u8>>> {
        (**self).sign(request).await
    }
}
