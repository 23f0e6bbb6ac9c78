//! End-to-end signing through mock key oracles.

// Silence unused crate dependency warnings for test binary
use alloy_rlp as _;
use proptest as _;
use serde as _;
use serde_json as _;
use thiserror as _;
use tracing as _;

use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use alloy_primitives::{U256, b256};
use async_trait::async_trait;
use k256::ecdsa::SigningKey;
use k256::pkcs8::EncodePublicKey;
use kms_evm_signer_core::crypto::verify_signature;
use kms_evm_signer_core::message::hash_personal_message;
use kms_evm_signer_core::oracle::{MessageType, SigningAlgorithm};
use kms_evm_signer_core::{
    Address, B256, Eip1559Transaction, Error, KeyOracle, KmsSigner, LegacyTransaction,
    RecoveryPolicy, Result, SignRequest, SigningCredentials, Transaction, TypedData,
};

const PUBLIC_KEY: &str = "3056301006072a8648ce3d020106052b8104000a03420004f2de8ae7a9f594fb0d399abfb58639f43fb80960a1ed7c6e257c11e764d4759e1773a2c7ec7b913bec5d0e3a12bd7acd199f62e86de3f83b35bf6749fc1144ba";
const SIGNER_ADDRESS: &str = "0xe94e130546485b928c9c9b9a5e69eb787172952e";

/// A high-s signature whose canonical form is returned for any digest.
const CANNED_SIGNATURE: &str = "304502203f25afdb7ed67094101cd71109261886db9abbf1ba20cc53aec20ba01c2e6baa022100ab0de6d40f8960c252fc6f21e35e8369126fb19033f10953c42a61766635df82";

/// Oracle that answers with fixed bytes and records what it was asked.
struct MockOracle {
    public_key: Vec<u8>,
    signature: Option<Vec<u8>>,
    key_fetches: AtomicUsize,
    requests: Mutex<Vec<SignRequest>>,
}

impl MockOracle {
    fn new(signature: Option<&str>) -> Self {
        Self {
            public_key: hex::decode(PUBLIC_KEY).unwrap(),
            signature: signature.map(|s| hex::decode(s).unwrap()),
            key_fetches: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }

    fn key_fetches(&self) -> usize {
        self.key_fetches.load(Ordering::SeqCst)
    }

    fn requests(&self) -> Vec<SignRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl KeyOracle for MockOracle {
    async fn get_public_key(&self, _key_id: &str) -> Result<Vec<u8>> {
        self.key_fetches.fetch_add(1, Ordering::SeqCst);
        tokio::task::yield_now().await;
        Ok(self.public_key.clone())
    }

    async fn sign(&self, request: &SignRequest) -> Result<Option<Vec<u8>>> {
        self.requests.lock().unwrap().push(request.clone());
        Ok(self.signature.clone())
    }
}

/// Oracle backed by an in-process key, producing genuine signatures.
struct LocalKeyOracle {
    key: SigningKey,
}

impl LocalKeyOracle {
    fn new(scalar: u8) -> Self {
        let mut secret = [0u8; 32];
        secret[31] = scalar;
        Self {
            key: SigningKey::from_bytes(&secret.into()).unwrap(),
        }
    }

    fn address(&self) -> Address {
        Address::from_public_key(self.key.verifying_key())
    }
}

#[async_trait]
impl KeyOracle for LocalKeyOracle {
    async fn get_public_key(&self, _key_id: &str) -> Result<Vec<u8>> {
        let der = self.key.verifying_key().to_public_key_der().unwrap();
        Ok(der.as_bytes().to_vec())
    }

    async fn sign(&self, request: &SignRequest) -> Result<Option<Vec<u8>>> {
        let (signature, _) = self
            .key
            .sign_prehash_recoverable(request.message.as_slice())
            .unwrap();
        Ok(Some(signature.to_der().as_bytes().to_vec()))
    }
}

/// Oracle whose transport always fails.
struct UnreachableOracle;

#[async_trait]
impl KeyOracle for UnreachableOracle {
    async fn get_public_key(&self, _key_id: &str) -> Result<Vec<u8>> {
        Err(Error::Oracle("connection refused".into()))
    }

    async fn sign(&self, _request: &SignRequest) -> Result<Option<Vec<u8>>> {
        Err(Error::Oracle("connection refused".into()))
    }
}

fn credentials() -> SigningCredentials {
    SigningCredentials::new("alias/evm-signer").with_region("us-east-1")
}

fn transfer() -> Transaction {
    Eip1559Transaction {
        chain_id: 1,
        nonce: 69,
        max_priority_fee_per_gas: U256::from(3_000_000_000u64),
        max_fee_per_gas: U256::from(20_000_000_000u64),
        gas_limit: 21_000,
        to: Some(Address::from_hex("0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266").unwrap()),
        value: U256::ZERO,
        data: Default::default(),
        access_list: Vec::new(),
    }
    .into()
}

#[tokio::test]
async fn address_from_oracle_public_key() {
    let signer = KmsSigner::new(MockOracle::new(None), credentials()).unwrap();

    let address = signer.address().await.unwrap();

    assert_eq!(address.to_hex(), SIGNER_ADDRESS);
    assert_eq!(signer.oracle().key_fetches(), 1);
}

#[tokio::test]
async fn concurrent_address_calls_share_one_fetch() {
    let signer = KmsSigner::new(MockOracle::new(None), credentials()).unwrap();

    let (a, b, c) = tokio::join!(signer.address(), signer.address(), signer.address());

    assert_eq!(a.unwrap(), b.unwrap());
    assert_eq!(c.unwrap().to_hex(), SIGNER_ADDRESS);
    assert_eq!(signer.oracle().key_fetches(), 1);
}

#[tokio::test]
async fn sign_message_with_canned_oracle() {
    let signer = KmsSigner::new(MockOracle::new(Some(CANNED_SIGNATURE)), credentials()).unwrap();

    let signature = signer.sign_message("Hello world").await.unwrap();

    assert_eq!(
        signature.to_hex(),
        "0x3f25afdb7ed67094101cd71109261886db9abbf1ba20cc53aec20ba01c2e6baa54f2192bf0769f3dad0390de1ca17c95a83f2b567b5796e7fba7fd166a0061bf1c"
    );

    let requests = signer.oracle().requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].key_id, "alias/evm-signer");
    assert_eq!(requests[0].message, hash_personal_message("Hello world"));
    assert_eq!(requests[0].signing_algorithm, SigningAlgorithm::EcdsaSha256);
    assert_eq!(requests[0].message_type, MessageType::Digest);
}

#[tokio::test]
async fn verify_policy_rejects_foreign_signature() {
    let signer = KmsSigner::new(MockOracle::new(Some(CANNED_SIGNATURE)), credentials())
        .unwrap()
        .with_recovery_policy(RecoveryPolicy::Verify);

    let err = signer.sign_message("Hello world").await.unwrap_err();

    assert!(matches!(err, Error::RecoveryInconsistency(addr) if addr == SIGNER_ADDRESS));
}

#[tokio::test]
async fn verify_policy_accepts_genuine_odd_signature() {
    let der = "3045022100fa754063b93a288b9a96883fc365efb9aee7ecaf632009baa04fe429e706d50e02206a8971b06cd37b3da4ad04bb1298fda152a41e5c1104fd5d974d5c0a060a5e62";
    let signer = KmsSigner::new(MockOracle::new(Some(der)), credentials())
        .unwrap()
        .with_recovery_policy(RecoveryPolicy::Verify);
    let digest = b256!("a1de988600a42c4b4ab089b619297c17d53cffae5d5120d82d8a92d0bb3b78f2");

    let signature = signer.sign_digest(digest).await.unwrap();

    assert_eq!(signature.v(), 28);
    assert!(verify_signature(
        &digest,
        &signature,
        &signer.address().await.unwrap()
    ));
}

#[tokio::test]
async fn sign_transaction_with_canned_oracle() {
    let signer = KmsSigner::new(MockOracle::new(Some(CANNED_SIGNATURE)), credentials()).unwrap();
    let tx = transfer();

    let raw = signer.sign_transaction_hex(&tx).await.unwrap();

    assert_eq!(
        raw,
        "0x02f86b014584b2d05e008504a817c80082520894f39fd6e51aad88f6f4ce6ab8827279cfffb922668080c001a03f25afdb7ed67094101cd71109261886db9abbf1ba20cc53aec20ba01c2e6baaa054f2192bf0769f3dad0390de1ca17c95a83f2b567b5796e7fba7fd166a0061bf"
    );
    assert_eq!(signer.oracle().requests()[0].message, tx.signing_hash());
}

#[tokio::test]
async fn invalid_transaction_is_rejected_before_oracle() {
    let signer = KmsSigner::new(MockOracle::new(Some(CANNED_SIGNATURE)), credentials()).unwrap();
    let Transaction::Eip1559(mut tx) = transfer() else {
        unreachable!()
    };
    tx.max_priority_fee_per_gas = tx.max_fee_per_gas + U256::from(1);

    let err = signer.sign_transaction(&tx.into()).await.unwrap_err();

    assert!(matches!(err, Error::InvalidTransaction(_)));
    assert!(signer.oracle().requests().is_empty());
    assert_eq!(signer.oracle().key_fetches(), 0);
}

#[tokio::test]
async fn out_of_range_chain_id_is_rejected_before_oracle() {
    let signer = KmsSigner::new(MockOracle::new(Some(CANNED_SIGNATURE)), credentials()).unwrap();
    let tx: Transaction = LegacyTransaction {
        chain_id: Some(u64::MAX),
        nonce: 0,
        gas_price: U256::from(1u64),
        gas_limit: 21_000,
        to: None,
        value: U256::ZERO,
        data: Default::default(),
    }
    .into();

    let err = signer.sign_transaction(&tx).await.unwrap_err();

    assert!(matches!(err, Error::InvalidTransaction(_)));
    assert!(signer.oracle().requests().is_empty());
    assert_eq!(signer.oracle().key_fetches(), 0);
}

#[tokio::test]
async fn empty_oracle_response_is_call_failure() {
    let signer = KmsSigner::new(MockOracle::new(None), credentials()).unwrap();

    let err = signer.sign_digest(B256::repeat_byte(0x11)).await.unwrap_err();

    assert!(matches!(err, Error::OracleCallFailed));
    assert_eq!(err.to_string(), "KMS call failed");
}

#[tokio::test]
async fn malformed_oracle_signature_is_decode_error() {
    let signer = KmsSigner::new(MockOracle::new(Some("3006020101020101ff")), credentials()).unwrap();

    let err = signer.sign_digest(B256::ZERO).await.unwrap_err();

    assert!(matches!(err, Error::Decode(_)));
}

#[tokio::test]
async fn oracle_errors_propagate_and_are_not_cached() {
    let signer = KmsSigner::new(UnreachableOracle, credentials()).unwrap();

    assert!(matches!(signer.address().await, Err(Error::Oracle(_))));
    assert!(matches!(signer.address().await, Err(Error::Oracle(_))));
    assert!(matches!(
        signer.sign_message("hi").await,
        Err(Error::Oracle(_))
    ));
}

#[tokio::test]
async fn local_key_signatures_recover_under_verify() {
    let oracle = LocalKeyOracle::new(9);
    let expected = oracle.address();
    let signer = KmsSigner::new(oracle, credentials())
        .unwrap()
        .with_recovery_policy(RecoveryPolicy::Verify);

    assert_eq!(signer.address().await.unwrap(), expected);

    for message in ["", "Hello world", "gm"] {
        let signature = signer.sign_message(message).await.unwrap();
        assert!(signature.to_raw().is_low_s());
        assert!(verify_signature(
            &hash_personal_message(message),
            &signature,
            &expected
        ));
    }
}

#[tokio::test]
async fn sign_typed_data_with_local_key() {
    let oracle = LocalKeyOracle::new(3);
    let expected = oracle.address();
    let signer = KmsSigner::new(oracle, credentials()).unwrap();
    let typed_data = TypedData::from_json(
        r#"{
            "domain": {
                "name": "Ether Mail",
                "version": "1",
                "chainId": 1,
                "verifyingContract": "0xCcCCccccCCCCcCCCCCCcCcCccCcCCCcCcccccccC"
            },
            "types": {
                "Person": [
                    { "name": "name", "type": "string" },
                    { "name": "wallet", "type": "address" }
                ],
                "Mail": [
                    { "name": "from", "type": "Person" },
                    { "name": "to", "type": "Person" },
                    { "name": "contents", "type": "string" }
                ]
            },
            "primaryType": "Mail",
            "message": {
                "from": { "name": "Cow", "wallet": "0xCD2a3d9F938E13CD947Ec05AbC7FE734Df8DD826" },
                "to": { "name": "Bob", "wallet": "0xbBbBBBBbbBBBbbbBbbBbbbbBBbBbbbbBbBbbBBbB" },
                "contents": "Hello, Bob!"
            }
        }"#,
    )
    .unwrap();
    let digest = b256!("be609aee343fb3c4b28e1df9e632fca64fcfaede20f02e86244efddf30957bd2");

    let signature = signer.sign_typed_data(&typed_data).await.unwrap();

    assert!(verify_signature(&digest, &signature, &expected));
}

#[tokio::test]
async fn undefined_typed_data_never_reaches_oracle() {
    let signer = KmsSigner::new(MockOracle::new(Some(CANNED_SIGNATURE)), credentials()).unwrap();
    let typed_data = TypedData::from_json(
        r#"{
            "domain": { "name": "Test" },
            "types": { "Order": [{ "name": "maker", "type": "Party" }] },
            "primaryType": "Order",
            "message": { "maker": {} }
        }"#,
    )
    .unwrap();

    let err = signer.sign_typed_data(&typed_data).await.unwrap_err();

    assert!(matches!(err, Error::UndefinedType(_)));
    assert!(signer.oracle().requests().is_empty());
}

#[tokio::test]
async fn legacy_transaction_carries_eip155_v() {
    let oracle = LocalKeyOracle::new(5);
    let expected = oracle.address();
    let signer = KmsSigner::new(oracle, credentials()).unwrap();
    let tx: Transaction = LegacyTransaction {
        chain_id: Some(5),
        nonce: 0,
        gas_price: U256::from(1_000_000_000u64),
        gas_limit: 21_000,
        to: Some(Address::from_hex("0x3535353535353535353535353535353535353535").unwrap()),
        value: U256::from(1u64),
        data: Default::default(),
    }
    .into();

    let raw = signer.sign_transaction(&tx).await.unwrap();
    let signature = signer.sign_digest(tx.signing_hash()).await.unwrap();

    assert!(verify_signature(&tx.signing_hash(), &signature, &expected));
    let Transaction::Legacy(legacy) = &tx else {
        unreachable!()
    };
    assert_eq!(raw, legacy.signed_rlp(&signature));
    let v = legacy.signature_v(&signature);
    assert!(v == U256::from(45) || v == U256::from(46));
}

#[test]
fn blank_key_id_is_rejected() {
    let result = KmsSigner::new(MockOracle::new(None), SigningCredentials::new("  "));
    assert!(matches!(result, Err(Error::InvalidConfig(_))));
}
