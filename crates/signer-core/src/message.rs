//! EIP-191 personal message hashing.
//!
//! ```text
//! keccak256("\x19Ethereum Signed Message:\n" || len(message) || message)
//! ```
//!
//! where `len(message)` is the decimal byte length.

use alloy_primitives::{B256, eip191_hash_message};

/// Prefix prepended to personal messages before hashing.
pub const PERSONAL_MESSAGE_PREFIX: &str = "\x19Ethereum Signed Message:\n";

/// Computes the EIP-191 digest of a personal message.
///
/// # Example
///
/// ```
/// use kms_evm_signer_core::message::hash_personal_message;
///
/// let digest = hash_personal_message("Hello world");
/// assert_eq!(
///     hex::encode(digest),
///     "8144a6fa26be252b86456491fbcd43c1de7e022241845ffea1c3df066f7cfede"
/// );
/// ```
#[must_use]
pub fn hash_personal_message(message: impl AsRef<[u8]>) -> B256 {
    eip191_hash_message(message)
}
