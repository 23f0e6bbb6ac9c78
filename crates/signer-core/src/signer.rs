//! The signing orchestrator.
//!
//! [`KmsSigner`] drives a [`KeyOracle`] through the full path from payload
//! to EVM signature:
//!
//! ```text
//! payload ──hash──▶ digest ──oracle.sign──▶ DER ──decode──▶ (r, s)
//!         ──low-s──▶ (r, s') ──recovery vs. address()──▶ r || s' || v
//! ```
//!
//! The signer's address is fetched from the oracle once, on first use, and
//! cached for the lifetime of the signer. Concurrent first callers share a
//! single public-key request.
//!
//! # Example
//!
//! ```ignore
//! use kms_evm_signer_core::{KmsSigner, SigningCredentials};
//!
//! let credentials = SigningCredentials::from_env()?;
//! let signer = KmsSigner::new(kms_client, credentials)?;
//!
//! let address = signer.address().await?;
//! let signature = signer.sign_message("Hello world").await?;
//! ```

use core::fmt;

use alloy_primitives::B256;
use tokio::sync::OnceCell;
use tracing::{debug, warn};

use crate::address::Address;
use crate::config::SigningCredentials;
use crate::crypto::{RecoveryPolicy, to_evm_signature};
use crate::eip712::TypedData;
use crate::error::{Error, Result};
use crate::message::hash_personal_message;
use crate::oracle::{KeyOracle, SignRequest};
use crate::signature::Signature;
use crate::transaction::Transaction;

/// An EVM signer backed by a remote key oracle.
pub struct KmsSigner<O> {
    /// The oracle client.
    oracle: O,

    /// Which key to use, plus client credentials.
    credentials: SigningCredentials,

    /// How recovery ids are resolved.
    policy: RecoveryPolicy,

    /// Address derived from the oracle's public key, set once.
    address: OnceCell<Address>,
}

impl<O> fmt::Debug for KmsSigner<O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KmsSigner")
            .field("credentials", &self.credentials)
            .field("policy", &self.policy)
            .field("address", &self.address.get())
            .finish_non_exhaustive()
    }
}

impl<O: KeyOracle> KmsSigner<O> {
    /// Creates a signer for the key named in `credentials`.
    ///
    /// No oracle call is made until the first operation.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] if the credentials do not validate.
    pub fn new(oracle: O, credentials: SigningCredentials) -> Result<Self> {
        credentials.validate()?;
        Ok(Self {
            oracle,
            credentials,
            policy: RecoveryPolicy::default(),
            address: OnceCell::new(),
        })
    }

    /// Sets the recovery policy.
    #[must_use]
    pub fn with_recovery_policy(mut self, policy: RecoveryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// The oracle-side key identifier.
    #[must_use]
    pub fn key_id(&self) -> &str {
        &self.credentials.key_id
    }

    /// The credentials the signer was built with.
    #[must_use]
    pub const fn credentials(&self) -> &SigningCredentials {
        &self.credentials
    }

    /// The recovery policy in effect.
    #[must_use]
    pub const fn recovery_policy(&self) -> RecoveryPolicy {
        self.policy
    }

    /// The underlying oracle client.
    #[must_use]
    pub const fn oracle(&self) -> &O {
        &self.oracle
    }

    /// Returns the signer's address, fetching the public key on first use.
    ///
    /// # Errors
    ///
    /// Propagates oracle failures and the decoding errors of
    /// [`Address::from_der_public_key`]. A failed fetch is not cached; the
    /// next call tries again.
    pub async fn address(&self) -> Result<Address> {
        self.address
            .get_or_try_init(|| async {
                let key_id = self.key_id();
                debug!(key_id, "fetching public key");
                let der = self.oracle.get_public_key(key_id).await?;
                let address = Address::from_der_public_key(&der)?;
                debug!(key_id, %address, "derived signer address");
                Ok::<_, Error>(address)
            })
            .await
            .copied()
    }

    /// Signs a 32-byte digest.
    ///
    /// Makes exactly one oracle `sign` call, plus one public-key fetch if
    /// the address is not cached yet.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OracleCallFailed`] when the oracle answers without a
    /// signature, [`Error::Decode`] for a malformed one, and under
    /// [`RecoveryPolicy::Verify`] [`Error::RecoveryInconsistency`].
    pub async fn sign_digest(&self, digest: B256) -> Result<Signature> {
        let key_id = self.key_id();
        debug!(key_id, %digest, "requesting signature");

        let request = SignRequest::digest(key_id, digest);
        let der = self.oracle.sign(&request).await?.ok_or_else(|| {
            warn!(key_id, %digest, "oracle response carried no signature");
            Error::OracleCallFailed
        })?;

        let address = self.address().await?;
        to_evm_signature(&der, &digest, &address, self.policy)
    }

    /// [`KmsSigner::sign_digest`], returning `0x`-prefixed hex.
    ///
    /// # Errors
    ///
    /// See [`KmsSigner::sign_digest`].
    pub async fn sign_digest_hex(&self, digest: B256) -> Result<String> {
        Ok(self.sign_digest(digest).await?.to_hex())
    }

    /// Signs an EIP-191 personal message.
    ///
    /// # Errors
    ///
    /// See [`KmsSigner::sign_digest`].
    pub async fn sign_message(&self, message: impl AsRef<[u8]> + Send) -> Result<Signature> {
        let digest = hash_personal_message(message);
        self.sign_digest(digest).await
    }

    /// Signs EIP-712 typed data.
    ///
    /// # Errors
    ///
    /// Returns the typed data's encoding errors before contacting the
    /// oracle, otherwise see [`KmsSigner::sign_digest`].
    pub async fn sign_typed_data(&self, typed_data: &TypedData) -> Result<Signature> {
        let digest = typed_data.signing_hash()?;
        self.sign_digest(digest).await
    }

    /// Signs a transaction and returns its signed serialization.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidTransaction`] before contacting the oracle if
    /// the transaction is inconsistent, otherwise see
    /// [`KmsSigner::sign_digest`].
    pub async fn sign_transaction(&self, tx: &Transaction) -> Result<Vec<u8>> {
        tx.validate()?;
        let signature = self.sign_digest(tx.signing_hash()).await?;
        Ok(tx.signed_rlp(&signature))
    }

    /// [`KmsSigner::sign_transaction`], returning `0x`-prefixed hex.
    ///
    /// # Errors
    ///
    /// See [`KmsSigner::sign_transaction`].
    pub async fn sign_transaction_hex(&self, tx: &Transaction) -> Result<String> {
        let signed = self.sign_transaction(tx).await?;
        Ok(format!("0x{}", hex::encode(signed)))
    }
}
