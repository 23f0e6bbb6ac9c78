//! Signature canonicalization and recovery-id resolution for secp256k1.
//!
//! A key oracle returns a plain ECDSA signature: no recovery id, and with
//! `s` anywhere in `1..N`. Turning it into an EVM signature takes three
//! steps:
//!
//! 1. decode the DER `(r, s)` pair ([`crate::der::decode_signature`])
//! 2. move `s` into the lower half of the curve order ([`normalize_s`])
//! 3. pick the recovery id that reproduces the signer ([`RecoveryPolicy`])
//!
//! [`to_evm_signature`] runs all three.
//!
//! # Example
//!
//! ```
//! use alloy_primitives::U256;
//! use kms_evm_signer_core::RawSignature;
//! use kms_evm_signer_core::crypto::{SECP256K1_HALF_N, SECP256K1_N, normalize_s};
//!
//! let high = RawSignature::new(U256::from(1), SECP256K1_N - U256::from(1));
//! let low = normalize_s(high);
//! assert_eq!(low.s(), U256::from(1));
//! assert!(low.s() <= SECP256K1_HALF_N);
//! ```

use alloy_primitives::{B256, U256};
use k256::ecdsa::VerifyingKey;
use tracing::{debug, warn};

use crate::address::Address;
use crate::der;
use crate::error::{Error, Result};
use crate::signature::{RawSignature, RecoveryId, Signature};

/// The order `N` of the secp256k1 group.
pub const SECP256K1_N: U256 = U256::from_be_bytes([
    0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFE,
    0xBA, 0xAE, 0xDC, 0xE6, 0xAF, 0x48, 0xA0, 0x3B, 0xBF, 0xD2, 0x5E, 0x8C, 0xD0, 0x36, 0x41, 0x41,
]);

/// `⌊N / 2⌋`, the largest `s` accepted as canonical (EIP-2).
pub const SECP256K1_HALF_N: U256 = U256::from_be_bytes([
    0x7F, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF,
    0x5D, 0x57, 0x6E, 0x73, 0x57, 0xA4, 0x50, 0x1D, 0xDF, 0xE9, 0x2F, 0x46, 0x68, 0x1B, 0x20, 0xA0,
]);

/// How the recovery id of an oracle signature is chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RecoveryPolicy {
    /// Try `v = 27`; if it does not reproduce the signer, return `v = 28`
    /// without checking it.
    ///
    /// This is what deployed KMS signers do, and it is exact for every
    /// signature the oracle's key actually produced.
    #[default]
    TrustOracle,
    /// Check both candidates and fail with [`Error::RecoveryInconsistency`]
    /// when neither reproduces the signer.
    Verify,
}

impl RecoveryPolicy {
    /// Resolves the recovery id of `signature` over `digest` for `expected`.
    ///
    /// # Errors
    ///
    /// Only [`RecoveryPolicy::Verify`] fails, see
    /// [`resolve_recovery_id_strict`].
    pub fn resolve(
        self,
        digest: &B256,
        signature: &RawSignature,
        expected: &Address,
    ) -> Result<RecoveryId> {
        match self {
            Self::TrustOracle => Ok(resolve_recovery_id(digest, signature, expected)),
            Self::Verify => resolve_recovery_id_strict(digest, signature, expected),
        }
    }
}

/// Normalizes a signature to low-s form.
///
/// If `s > N/2`, `s` is replaced by `N - s`; `r` passes through. Both forms
/// verify against the same key, only the recovery id flips.
#[must_use]
pub fn normalize_s(signature: RawSignature) -> RawSignature {
    let s = signature.s();
    if s > SECP256K1_HALF_N {
        RawSignature::new(signature.r(), SECP256K1_N - s)
    } else {
        signature
    }
}

/// Recovers the address that produced `signature` over `digest`, assuming
/// recovery id `id`.
///
/// Returns [`None`] when no valid public key exists for that candidate.
#[must_use]
pub fn recover_address(digest: &B256, signature: &RawSignature, id: RecoveryId) -> Option<Address> {
    let sig = signature.to_k256().ok()?;
    VerifyingKey::recover_from_prehash(digest.as_slice(), &sig, id.into())
        .ok()
        .map(|key| Address::from_public_key(&key))
}

/// Picks the recovery id for an oracle signature.
///
/// Candidate `27` is checked; when it does not recover `expected` (or fails
/// to recover at all) candidate `28` is returned unchecked.
#[must_use]
pub fn resolve_recovery_id(digest: &B256, signature: &RawSignature, expected: &Address) -> RecoveryId {
    if recover_address(digest, signature, RecoveryId::Even).as_ref() == Some(expected) {
        RecoveryId::Even
    } else {
        RecoveryId::Odd
    }
}

/// Like [`resolve_recovery_id`], but also checks candidate `28`.
///
/// # Errors
///
/// Returns [`Error::RecoveryInconsistency`] when neither candidate recovers
/// `expected`.
pub fn resolve_recovery_id_strict(
    digest: &B256,
    signature: &RawSignature,
    expected: &Address,
) -> Result<RecoveryId> {
    RecoveryId::CANDIDATES
        .into_iter()
        .find(|&id| recover_address(digest, signature, id).as_ref() == Some(expected))
        .ok_or_else(|| {
            warn!(%expected, %digest, "signature recovers to neither candidate");
            Error::RecoveryInconsistency(expected.to_hex())
        })
}

/// Converts a DER oracle signature over `digest` into an EVM signature for
/// `expected`.
///
/// # Errors
///
/// Returns [`Error::Decode`] for malformed DER and, under
/// [`RecoveryPolicy::Verify`], [`Error::RecoveryInconsistency`].
pub fn to_evm_signature(
    der_signature: &[u8],
    digest: &B256,
    expected: &Address,
    policy: RecoveryPolicy,
) -> Result<Signature> {
    let raw = der::decode_signature(der_signature)?;
    let canonical = normalize_s(raw);
    let id = policy.resolve(digest, &canonical, expected)?;
    debug!(
        v = id.v(),
        flipped = canonical != raw,
        "resolved recovery id"
    );
    Ok(canonical.with_recovery_id(id))
}

/// Returns `true` if `signature` over `digest` recovers to `expected` with
/// its own recovery id.
#[must_use]
pub fn verify_signature(digest: &B256, signature: &Signature, expected: &Address) -> bool {
    recover_address(digest, &signature.to_raw(), signature.recovery_id()).as_ref() == Some(expected)
}
