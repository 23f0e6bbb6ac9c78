//! KMS EVM Signer Core Library
//!
//! This crate turns a remote secp256k1 signing service (a "key oracle" such
//! as AWS KMS) into an EVM signer for personal messages, EIP-712 typed data
//! and transactions.
//!
//! # Overview
//!
//! A key oracle only knows plain ECDSA: it hands out a DER
//! `SubjectPublicKeyInfo` and signs 32-byte digests with DER
//! `ECDSA-Sig-Value`s. The EVM wants more:
//!
//! - an account address instead of a public key
//! - `s` in the lower half of the curve order (EIP-2)
//! - a recovery byte `v` so the signer can be recovered from the signature
//!
//! This library bridges the two.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                         KmsSigner                           │
//! │   address · sign_digest · sign_message · sign_typed_data    │
//! │                     sign_transaction                        │
//! ├──────────────┬──────────────┬──────────────┬────────────────┤
//! │   message    │    eip712    │ transaction  │     config     │
//! │  (EIP-191)   │  (hashing)   │ (RLP, 155)   │ (credentials)  │
//! ├──────────────┴──────────────┴──────────────┴────────────────┤
//! │     der  ──▶  address  │  crypto (low-s, recovery id)       │
//! ├─────────────────────────────────────────────────────────────┤
//! │               KeyOracle (get_public_key, sign)              │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Quick Start
//!
//! ## Deriving the Address of an Oracle Key
//!
//! ```rust
//! use kms_evm_signer_core::Address;
//!
//! let der = hex::decode(
//!     "3056301006072a8648ce3d020106052b8104000a03420004f2de8ae7a9f594fb0d399abfb58639f43fb80960a1ed7c6e257c11e764d4759e1773a2c7ec7b913bec5d0e3a12bd7acd199f62e86de3f83b35bf6749fc1144ba",
//! )
//! .unwrap();
//! let address = Address::from_der_public_key(&der).unwrap();
//! println!("Address: {address}");
//! ```
//!
//! ## Converting an Oracle Signature
//!
//! ```rust
//! use alloy_primitives::b256;
//! use kms_evm_signer_core::crypto::{RecoveryPolicy, to_evm_signature};
//! use kms_evm_signer_core::Address;
//!
//! let der = hex::decode(
//!     "3046022100acd484e2f0c7f65309ad178a9f559abde09796974c57e714c35f110dfc27ccbe022100c028c893fa4ee33615253775ef45acbbe0194f849ca61e359cc4d2d416bd66b4",
//! )
//! .unwrap();
//! let digest = b256!("c494bbb4648f31c1ead18b394bc606ecbd472f539f9a604d9c3a009810bd379a");
//! let signer = Address::from_hex("0x78497d9adec5a00df020399109859cb19f180547").unwrap();
//!
//! let signature = to_evm_signature(&der, &digest, &signer, RecoveryPolicy::Verify).unwrap();
//! assert_eq!(signature.v(), 27);
//! ```
//!
//! ## Signing Through an Oracle
//!
//! Implement [`KeyOracle`] for your service client and hand it to
//! [`KmsSigner`]:
//!
//! ```ignore
//! use kms_evm_signer_core::{KmsSigner, SigningCredentials};
//!
//! let signer = KmsSigner::new(kms_client, SigningCredentials::from_env()?)?;
//! let raw_tx = signer.sign_transaction_hex(&tx).await?;
//! ```
//!
//! # Logging
//!
//! Oracle round trips and recovery decisions are reported as [`tracing`]
//! events. The library installs no subscriber. Credentials are never logged.
//!
//! # Security Considerations
//!
//! - Private keys never leave the oracle
//! - Signatures are normalized to low-S form to prevent malleability
//! - The default [`RecoveryPolicy::TrustOracle`] checks only `v = 27`; use
//!   [`RecoveryPolicy::Verify`] to check both candidates

// Modules
pub mod address;
pub mod config;
pub mod crypto;
pub mod der;
pub mod eip712;
pub mod error;
pub mod message;
pub mod oracle;
pub mod signature;
pub mod signer;
pub mod transaction;

// Re-exports for convenience
pub use address::Address;
pub use config::SigningCredentials;
pub use crypto::RecoveryPolicy;
pub use eip712::{Eip712Domain, TypeField, TypedData};
pub use error::{Error, Result};
pub use oracle::{KeyOracle, SignRequest};
pub use signature::{RawSignature, RecoveryId, Signature};
pub use signer::KmsSigner;
pub use transaction::{AccessListEntry, Eip1559Transaction, LegacyTransaction, Transaction};

// Re-export commonly used alloy types
pub use alloy_primitives::{B256, U256};

#[cfg(test)]
use proptest as _;
