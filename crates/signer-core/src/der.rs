//! DER decoding of the two structures a key oracle hands back.
//!
//! - `SubjectPublicKeyInfo` (RFC 5480) wrapping an uncompressed secp256k1 point
//! - `ECDSA-Sig-Value` (RFC 3279) wrapping the `(r, s)` integers
//!
//! ```text
//! SubjectPublicKeyInfo ::= SEQUENCE {
//!     algorithm  SEQUENCE { OID id-ecPublicKey, OID secp256k1 },
//!     subjectPublicKey  BIT STRING  -- 00 04 || X || Y
//! }
//!
//! ECDSA-Sig-Value ::= SEQUENCE { r INTEGER, s INTEGER }
//! ```
//!
//! Both decoders are strict DER as implemented by k256: non-minimal lengths
//! and integers, indefinite lengths and trailing bytes are rejected.
//!
//! # Example
//!
//! ```
//! use kms_evm_signer_core::der::decode_signature;
//!
//! // r = 1, s = 2
//! let der = [0x30, 0x06, 0x02, 0x01, 0x01, 0x02, 0x01, 0x02];
//! let sig = decode_signature(&der).unwrap();
//! assert_eq!(sig.r().to::<u64>(), 1);
//! assert_eq!(sig.s().to::<u64>(), 2);
//! ```

use alloy_primitives::U256;
use k256::PublicKey;
use k256::ecdsa::Signature as K256Signature;
use k256::pkcs8::SubjectPublicKeyInfoRef;

use crate::error::{Error, Result};
use crate::signature::RawSignature;

/// Length of an uncompressed SEC1 point.
const UNCOMPRESSED_POINT_LEN: usize = 65;

/// A decoded secp256k1 `SubjectPublicKeyInfo`.
///
/// Holds the uncompressed SEC1 point; construction guarantees it lies on the
/// curve.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubjectPublicKeyInfo {
    point: [u8; UNCOMPRESSED_POINT_LEN],
}

impl SubjectPublicKeyInfo {
    /// The uncompressed point, `0x04 || X || Y`.
    #[must_use]
    pub const fn point(&self) -> &[u8; UNCOMPRESSED_POINT_LEN] {
        &self.point
    }

    /// The 64 coordinate bytes, `X || Y`, without the SEC1 prefix.
    #[must_use]
    pub fn coordinates(&self) -> &[u8] {
        &self.point[1..]
    }

    /// The key as a k256 verifying key.
    ///
    /// # Errors
    ///
    /// Never fails for values produced by [`decode_public_key`]; the error
    /// path exists for the underlying k256 conversion.
    pub fn verifying_key(&self) -> Result<k256::ecdsa::VerifyingKey> {
        k256::ecdsa::VerifyingKey::from_sec1_bytes(&self.point)
            .map_err(|e| Error::InvalidPublicKey(e.to_string()))
    }
}

/// Decodes a DER `ECDSA-Sig-Value` into its `(r, s)` scalars.
///
/// The returned `s` is exactly what the oracle produced; it is not
/// normalized.
///
/// # Errors
///
/// Returns [`Error::Decode`] on a wrong tag, truncated or trailing input,
/// a non-canonical length or integer encoding, or an integer that is
/// negative, zero or not below the curve order.
pub fn decode_signature(der: &[u8]) -> Result<RawSignature> {
    let signature = K256Signature::from_der(der)
        .map_err(|e| Error::decode(format!("invalid ECDSA-Sig-Value: {e}")))?;
    let (r, s) = signature.split_bytes();

    Ok(RawSignature::new(
        U256::from_be_slice(&r),
        U256::from_be_slice(&s),
    ))
}

/// Decodes a DER `SubjectPublicKeyInfo` holding a secp256k1 key.
///
/// # Errors
///
/// Returns [`Error::Decode`] for malformed DER and
/// [`Error::InvalidPublicKey`] when the structure is well-formed but names
/// another algorithm or curve, or carries a compressed or off-curve point.
pub fn decode_public_key(der: &[u8]) -> Result<SubjectPublicKeyInfo> {
    let spki = SubjectPublicKeyInfoRef::try_from(der)
        .map_err(|e| Error::decode(format!("invalid SubjectPublicKeyInfo: {e}")))?;
    let bits = spki
        .subject_public_key
        .as_bytes()
        .ok_or_else(|| Error::decode("public key bit string declares unused bits"))?;

    // Checks id-ecPublicKey/secp256k1 and that the point is on the curve.
    PublicKey::try_from(&spki).map_err(|e| Error::InvalidPublicKey(e.to_string()))?;

    let point: [u8; UNCOMPRESSED_POINT_LEN] = bits.try_into().map_err(|_| {
        Error::InvalidPublicKey(format!(
            "expected {UNCOMPRESSED_POINT_LEN}-byte uncompressed point, got {} bytes",
            bits.len()
        ))
    })?;
    if point[0] != 0x04 {
        return Err(Error::InvalidPublicKey(format!(
            "expected uncompressed point prefix 0x04, got 0x{:02x}",
            point[0]
        )));
    }

    Ok(SubjectPublicKeyInfo { point })
}
