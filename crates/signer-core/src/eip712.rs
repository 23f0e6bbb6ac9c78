//! EIP-712 typed structured data hashing.
//!
//! The digest handed to the key oracle for typed data is:
//!
//! ```text
//! keccak256("\x19\x01" || domainSeparator || hashStruct(message))
//! ```
//!
//! with `hashStruct(s) = keccak256(typeHash(s) || encodeData(s))` and
//! `typeHash` covering the primary type followed by every struct type it
//! references, directly or transitively, sorted by name.
//!
//! [`TypedData`] deserializes from the JSON layout wallets and viem use
//! (`domain`, `types`, `primaryType`, `message`).
//!
//! # Example
//!
//! ```
//! use kms_evm_signer_core::TypedData;
//!
//! let typed_data = TypedData::from_json(r#"{
//!     "domain": { "name": "My DApp", "version": "1", "chainId": 1 },
//!     "types": {
//!         "Person": [
//!             { "name": "name", "type": "string" },
//!             { "name": "wallet", "type": "address" }
//!         ]
//!     },
//!     "primaryType": "Person",
//!     "message": { "name": "Alice", "wallet": "0x0000000000000000000000000000000000000001" }
//! }"#).unwrap();
//!
//! let digest = typed_data.signing_hash().unwrap();
//! assert!(!digest.is_zero());
//! ```
//!
//! [EIP-712]: https://eips.ethereum.org/EIPS/eip-712

use std::collections::{BTreeMap, BTreeSet};
use std::ops::RangeInclusive;

use alloy_primitives::{Address as AlloyAddress, B256, I256, U256, keccak256};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};

/// Name of the reserved domain type.
pub const DOMAIN_TYPE: &str = "EIP712Domain";

/// Type definitions, keyed by struct name.
pub type Types = BTreeMap<String, Vec<TypeField>>;

/// The EIP-712 domain separator parameters.
///
/// Only the fields that are present take part in the separator, in the
/// canonical order `name, version, chainId, verifyingContract, salt`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Eip712Domain {
    /// The human-readable name of the signing domain.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// The version of the signing domain.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    /// The chain ID where signatures are valid.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chain_id: Option<u64>,

    /// The address of the contract verifying the signature.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verifying_contract: Option<AlloyAddress>,

    /// A disambiguating salt for the protocol.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub salt: Option<B256>,
}

impl Eip712Domain {
    /// The `EIP712Domain` type derived from the fields that are set.
    #[must_use]
    pub fn fields(&self) -> Vec<TypeField> {
        [
            self.name.as_ref().map(|_| TypeField::new("name", "string")),
            self.version.as_ref().map(|_| TypeField::new("version", "string")),
            self.chain_id.map(|_| TypeField::new("chainId", "uint256")),
            self.verifying_contract
                .map(|_| TypeField::new("verifyingContract", "address")),
            self.salt.map(|_| TypeField::new("salt", "bytes32")),
        ]
        .into_iter()
        .flatten()
        .collect()
    }

    /// Computes the domain separator, `hashStruct(domain)`.
    #[must_use]
    pub fn separator_hash(&self) -> B256 {
        let mut buf = Vec::with_capacity(32 * 6);
        let type_string = format_struct(DOMAIN_TYPE, &self.fields());
        buf.extend_from_slice(keccak256(type_string.as_bytes()).as_slice());

        if let Some(name) = &self.name {
            buf.extend_from_slice(keccak256(name.as_bytes()).as_slice());
        }
        if let Some(version) = &self.version {
            buf.extend_from_slice(keccak256(version.as_bytes()).as_slice());
        }
        if let Some(chain_id) = self.chain_id {
            buf.extend_from_slice(&U256::from(chain_id).to_be_bytes::<32>());
        }
        if let Some(contract) = self.verifying_contract {
            buf.extend_from_slice(B256::left_padding_from(contract.as_slice()).as_slice());
        }
        if let Some(salt) = self.salt {
            buf.extend_from_slice(salt.as_slice());
        }

        keccak256(&buf)
    }
}

/// A member of a struct type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeField {
    /// The name of the field.
    pub name: String,

    /// The type of the field (e.g., "string", "uint256", "Person[]").
    #[serde(rename = "type")]
    pub field_type: String,
}

impl TypeField {
    /// Creates a field definition.
    #[must_use]
    pub fn new(name: impl Into<String>, field_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            field_type: field_type.into(),
        }
    }
}

/// Typed structured data for EIP-712 signing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypedData {
    /// The EIP-712 domain.
    pub domain: Eip712Domain,

    /// The type definitions. An `EIP712Domain` entry is tolerated and
    /// ignored; the domain type is derived from [`TypedData::domain`].
    pub types: Types,

    /// The primary type being signed.
    pub primary_type: String,

    /// The message data.
    pub message: Value,
}

impl TypedData {
    /// Creates a new typed data instance.
    #[must_use]
    pub fn new(
        domain: Eip712Domain,
        types: Types,
        primary_type: impl Into<String>,
        message: Value,
    ) -> Self {
        Self {
            domain,
            types,
            primary_type: primary_type.into(),
            message,
        }
    }

    /// Computes the digest to sign.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UndefinedType`] if a referenced struct type has no
    /// definition, and [`Error::InvalidTypedData`] if the message does not
    /// match its types.
    pub fn signing_hash(&self) -> Result<B256> {
        let domain_separator = self.domain.separator_hash();
        let struct_hash = self.struct_hash()?;

        let mut data = [0u8; 66];
        data[..2].copy_from_slice(&[0x19, 0x01]);
        data[2..34].copy_from_slice(domain_separator.as_slice());
        data[34..].copy_from_slice(struct_hash.as_slice());

        Ok(keccak256(data))
    }

    /// Computes `hashStruct(message)` for the primary type.
    ///
    /// # Errors
    ///
    /// See [`TypedData::signing_hash`].
    pub fn struct_hash(&self) -> Result<B256> {
        self.encoder().hash_struct(&self.primary_type, &self.message)
    }

    /// Returns `encodeType(primaryType)`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UndefinedType`] if a referenced struct type has no
    /// definition.
    pub fn encode_type(&self) -> Result<String> {
        self.encoder().encode_type(&self.primary_type)
    }

    fn encoder(&self) -> Encoder<'_> {
        Encoder { types: &self.types }
    }

    /// Parses typed data from a JSON string.
    ///
    /// # Errors
    ///
    /// Returns [`Error::JsonError`] if parsing fails.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Serializes the typed data to JSON.
    ///
    /// # Errors
    ///
    /// Returns [`Error::JsonError`] if serialization fails.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Encodes values against a set of struct definitions.
struct Encoder<'a> {
    types: &'a Types,
}

impl Encoder<'_> {
    fn fields(&self, type_name: &str) -> Result<&[TypeField]> {
        if type_name == DOMAIN_TYPE {
            return Err(Error::InvalidTypedData(format!(
                "{DOMAIN_TYPE} cannot be used inside a message"
            )));
        }
        self.types
            .get(type_name)
            .map(Vec::as_slice)
            .ok_or_else(|| Error::UndefinedType(type_name.to_string()))
    }

    fn is_struct(&self, type_name: &str) -> bool {
        type_name != DOMAIN_TYPE && self.types.contains_key(type_name)
    }

    fn hash_struct(&self, type_name: &str, data: &Value) -> Result<B256> {
        let type_hash = keccak256(self.encode_type(type_name)?.as_bytes());
        let encoded = self.encode_data(type_name, data)?;

        let mut buf = Vec::with_capacity(32 + encoded.len());
        buf.extend_from_slice(type_hash.as_slice());
        buf.extend_from_slice(&encoded);
        Ok(keccak256(&buf))
    }

    /// `encodeType`: the type itself, then its dependencies sorted by name.
    fn encode_type(&self, type_name: &str) -> Result<String> {
        let mut deps = BTreeSet::new();
        self.collect_dependencies(type_name, &mut deps)?;
        deps.remove(type_name);

        let mut out = format_struct(type_name, self.fields(type_name)?);
        for dep in deps {
            out.push_str(&format_struct(dep, self.fields(dep)?));
        }
        Ok(out)
    }

    fn collect_dependencies<'t>(
        &'t self,
        type_name: &'t str,
        found: &mut BTreeSet<&'t str>,
    ) -> Result<()> {
        if !found.insert(type_name) {
            return Ok(());
        }
        for field in self.fields(type_name)? {
            let base = element_type(&field.field_type);
            if self.is_struct(base) {
                self.collect_dependencies(base, found)?;
            }
        }
        Ok(())
    }

    fn encode_data(&self, type_name: &str, data: &Value) -> Result<Vec<u8>> {
        let fields = self.fields(type_name)?;
        let obj = data.as_object().ok_or_else(|| {
            Error::InvalidTypedData(format!("expected object for {type_name}"))
        })?;

        let mut encoded = Vec::with_capacity(32 * fields.len());
        for field in fields {
            let value = obj.get(&field.name).ok_or_else(|| {
                Error::InvalidTypedData(format!("missing field {type_name}.{}", field.name))
            })?;
            encoded.extend_from_slice(self.encode_field(&field.field_type, value)?.as_slice());
        }
        Ok(encoded)
    }

    fn encode_field(&self, field_type: &str, value: &Value) -> Result<B256> {
        if let Some((item_type, len)) = split_array(field_type)? {
            let items = value
                .as_array()
                .ok_or_else(|| Error::InvalidTypedData(format!("expected array for {field_type}")))?;
            if let Some(len) = len
                && items.len() != len
            {
                return Err(Error::InvalidTypedData(format!(
                    "{field_type} expects {len} items, got {}",
                    items.len()
                )));
            }

            let mut buf = Vec::with_capacity(32 * items.len());
            for item in items {
                buf.extend_from_slice(self.encode_field(item_type, item)?.as_slice());
            }
            return Ok(keccak256(&buf));
        }

        if self.is_struct(field_type) {
            return self.hash_struct(field_type, value);
        }

        encode_primitive(field_type, value)
    }
}

/// Formats `Name(type1 name1,type2 name2)`.
fn format_struct(name: &str, fields: &[TypeField]) -> String {
    let members: Vec<String> = fields
        .iter()
        .map(|f| format!("{} {}", f.field_type, f.name))
        .collect();
    format!("{name}({})", members.join(","))
}

/// Strips every array suffix: `Person[2][]` -> `Person`.
fn element_type(field_type: &str) -> &str {
    field_type.find('[').map_or(field_type, |i| &field_type[..i])
}

/// Splits the outermost array suffix: `uint256[3]` -> `("uint256", Some(3))`.
fn split_array(field_type: &str) -> Result<Option<(&str, Option<usize>)>> {
    let Some(inner) = field_type.strip_suffix(']') else {
        return Ok(None);
    };
    let open = inner
        .rfind('[')
        .ok_or_else(|| Error::InvalidTypedData(format!("malformed array type {field_type}")))?;
    let (item_type, len) = (&inner[..open], &inner[open + 1..]);
    if len.is_empty() {
        return Ok(Some((item_type, None)));
    }
    let len = len
        .parse()
        .map_err(|_| Error::InvalidTypedData(format!("malformed array length in {field_type}")))?;
    Ok(Some((item_type, Some(len))))
}

/// Encodes an atomic or dynamic primitive into its 32-byte word.
fn encode_primitive(field_type: &str, value: &Value) -> Result<B256> {
    match field_type {
        "string" => {
            let s = value
                .as_str()
                .ok_or_else(|| Error::InvalidTypedData("expected string".to_string()))?;
            Ok(keccak256(s.as_bytes()))
        }
        "bytes" => Ok(keccak256(parse_hex_value(value)?)),
        "bool" => {
            let b = value
                .as_bool()
                .ok_or_else(|| Error::InvalidTypedData("expected bool".to_string()))?;
            Ok(B256::with_last_byte(u8::from(b)))
        }
        "address" => {
            let addr: AlloyAddress = value
                .as_str()
                .ok_or_else(|| Error::InvalidTypedData("expected address string".to_string()))?
                .parse()
                .map_err(|e| Error::InvalidTypedData(format!("invalid address: {e}")))?;
            Ok(B256::left_padding_from(addr.as_slice()))
        }
        t if t.starts_with("bytes") => {
            let size = type_width(t, "bytes", 1..=32)?;
            let bytes = parse_hex_value(value)?;
            if bytes.len() > size {
                return Err(Error::InvalidTypedData(format!(
                    "{} bytes do not fit {t}",
                    bytes.len()
                )));
            }
            Ok(B256::right_padding_from(&bytes))
        }
        t if t.starts_with("uint") => {
            let bits = type_width(t, "uint", 8..=256)?;
            let n = parse_uint(value)?;
            if bits < 256 && n.bit_len() > bits {
                return Err(Error::InvalidTypedData(format!("{n} overflows {t}")));
            }
            Ok(B256::from(n.to_be_bytes::<32>()))
        }
        t if t.starts_with("int") => {
            let bits = type_width(t, "int", 8..=256)?;
            let n = parse_int(value)?;
            if bits < 256 {
                let limit = U256::from(1) << (bits - 1);
                let magnitude = n.unsigned_abs();
                let fits = if n.is_negative() {
                    magnitude <= limit
                } else {
                    magnitude < limit
                };
                if !fits {
                    return Err(Error::InvalidTypedData(format!("{n} overflows {t}")));
                }
            }
            Ok(B256::from(n.into_raw().to_be_bytes::<32>()))
        }
        other => Err(Error::UndefinedType(other.to_string())),
    }
}

/// Parses the width of `uintN`/`intN`/`bytesN`, defaulting to 256 bits for
/// bare `uint` and `int`.
fn type_width(field_type: &str, prefix: &str, range: RangeInclusive<usize>) -> Result<usize> {
    let suffix = &field_type[prefix.len()..];
    if suffix.is_empty() && prefix != "bytes" {
        return Ok(256);
    }
    let width: usize = suffix
        .parse()
        .map_err(|_| Error::UndefinedType(field_type.to_string()))?;
    let aligned = prefix == "bytes" || width % 8 == 0;
    if !range.contains(&width) || !aligned {
        return Err(Error::InvalidTypedData(format!("invalid type {field_type}")));
    }
    Ok(width)
}

fn parse_hex_value(value: &Value) -> Result<Vec<u8>> {
    let s = value
        .as_str()
        .ok_or_else(|| Error::InvalidTypedData("expected hex string".to_string()))?;
    Ok(hex::decode(s.strip_prefix("0x").unwrap_or(s))?)
}

/// Parses an unsigned integer from a JSON number, decimal string or `0x` hex
/// string.
fn parse_uint(value: &Value) -> Result<U256> {
    if let Some(n) = value.as_u64() {
        return Ok(U256::from(n));
    }
    let s = value
        .as_str()
        .ok_or_else(|| Error::InvalidTypedData(format!("expected unsigned integer, got {value}")))?;
    let parsed = match s.strip_prefix("0x") {
        Some(hex_str) => U256::from_str_radix(hex_str, 16),
        None => U256::from_str_radix(s, 10),
    };
    parsed.map_err(|_| Error::InvalidTypedData(format!("invalid unsigned integer: {s}")))
}

/// Parses a signed integer; negative values may be JSON numbers or decimal
/// strings.
fn parse_int(value: &Value) -> Result<I256> {
    if let Some(n) = value.as_i64() {
        return I256::try_from(n)
            .map_err(|_| Error::InvalidTypedData(format!("invalid integer: {n}")));
    }
    if let Some(n) = value.as_u64() {
        return Ok(I256::from_raw(U256::from(n)));
    }
    let s = value
        .as_str()
        .ok_or_else(|| Error::InvalidTypedData(format!("expected integer, got {value}")))?;
    let parsed = if s.starts_with("0x") || s.starts_with("-0x") {
        I256::from_hex_str(s)
    } else {
        I256::from_dec_str(s)
    };
    parsed.map_err(|_| Error::InvalidTypedData(format!("invalid integer: {s}")))
}

#[cfg(test)]
mod tests {
    use alloy_primitives::b256;
    use serde_json::json;

    use super::*;

    fn types(value: Value) -> Types {
        serde_json::from_value(value).unwrap()
    }

    fn mail() -> TypedData {
        TypedData::from_json(
            r#"{
                "domain": {
                    "name": "Ether Mail",
                    "version": "1",
                    "chainId": 1,
                    "verifyingContract": "0xCcCCccccCCCCcCCCCCCcCcCccCcCCCcCcccccccC"
                },
                "types": {
                    "EIP712Domain": [
                        { "name": "name", "type": "string" },
                        { "name": "version", "type": "string" },
                        { "name": "chainId", "type": "uint256" },
                        { "name": "verifyingContract", "type": "address" }
                    ],
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
        .unwrap()
    }

    #[test]
    fn mail_example_hashes() {
        let mail = mail();

        assert_eq!(
            mail.domain.separator_hash(),
            b256!("f2cee375fa42b42143804025fc449deafd50cc031ca257e0b194a650a912090f")
        );
        assert_eq!(
            mail.struct_hash().unwrap(),
            b256!("c52c0ee5d84264471806290a3f2c4cecfc5490626bf912d01f240d7a274b371e")
        );
        assert_eq!(
            mail.signing_hash().unwrap(),
            b256!("be609aee343fb3c4b28e1df9e632fca64fcfaede20f02e86244efddf30957bd2")
        );
    }

    #[test]
    fn encode_type_includes_transitive_dependencies() {
        let data = TypedData::new(
            Eip712Domain::default(),
            types(json!({
                "Order": [
                    { "name": "maker", "type": "Party" },
                    { "name": "items", "type": "Item[]" }
                ],
                "Party": [{ "name": "wallet", "type": "Wallet" }],
                "Wallet": [{ "name": "addr", "type": "address" }],
                "Item": [{ "name": "sku", "type": "string" }]
            })),
            "Order",
            json!({}),
        );

        assert_eq!(
            data.encode_type().unwrap(),
            "Order(Party maker,Item[] items)Item(string sku)Party(Wallet wallet)Wallet(address addr)"
        );
    }

    #[test]
    fn domain_fields_follow_presence() {
        let domain = Eip712Domain {
            name: Some("Test".to_string()),
            chain_id: Some(137),
            salt: Some(B256::with_last_byte(1)),
            ..Eip712Domain::default()
        };

        let names: Vec<_> = domain.fields().into_iter().map(|f| f.name).collect();
        assert_eq!(names, ["name", "chainId", "salt"]);
    }

    #[test]
    fn arrays_and_fixed_arrays() {
        let data = TypedData::new(
            Eip712Domain::default(),
            types(json!({
                "Batch": [
                    { "name": "recipients", "type": "address[]" },
                    { "name": "amounts", "type": "uint256[2]" }
                ]
            })),
            "Batch",
            json!({
                "recipients": [
                    "0x0000000000000000000000000000000000000001",
                    "0x0000000000000000000000000000000000000002"
                ],
                "amounts": ["1000000000000000000", "0x1bc16d674ec80000"]
            }),
        );
        assert!(data.signing_hash().is_ok());

        let mut wrong_len = data;
        wrong_len.message["amounts"] = json!([1, 2, 3]);
        assert!(matches!(
            wrong_len.signing_hash(),
            Err(Error::InvalidTypedData(_))
        ));
    }

    #[test]
    fn signed_integers_use_twos_complement() {
        assert_eq!(
            encode_primitive("int256", &json!(-1)).unwrap(),
            B256::repeat_byte(0xff)
        );
        assert_eq!(
            encode_primitive("int8", &json!("-128")).unwrap(),
            encode_primitive("int256", &json!(-128)).unwrap()
        );
        assert!(encode_primitive("int8", &json!(128)).is_err());
        assert!(encode_primitive("int8", &json!(-129)).is_err());
    }

    #[test]
    fn unsigned_integer_bounds() {
        assert_eq!(
            encode_primitive("uint8", &json!(255)).unwrap(),
            B256::with_last_byte(0xff)
        );
        assert!(encode_primitive("uint8", &json!(256)).is_err());
        assert!(encode_primitive("uint256", &json!(-1)).is_err());
        assert!(encode_primitive("uint7", &json!(1)).is_err());
    }

    #[test]
    fn encode_atomic_types() {
        assert_eq!(
            encode_primitive("bool", &json!(true)).unwrap(),
            B256::with_last_byte(1)
        );
        assert_eq!(
            encode_primitive("bytes4", &json!("0xdeadbeef")).unwrap()[..4],
            [0xde, 0xad, 0xbe, 0xef]
        );
        assert!(encode_primitive("bytes2", &json!("0xdeadbeef")).is_err());
        assert_eq!(
            encode_primitive("bytes", &json!("0x")).unwrap(),
            keccak256(b"")
        );
        assert_eq!(
            encode_primitive("address", &json!("0x0000000000000000000000000000000000000001"))
                .unwrap(),
            B256::with_last_byte(1)
        );
    }

    #[test]
    fn undefined_type_error() {
        let data = TypedData::new(
            Eip712Domain::default(),
            types(json!({ "Outer": [{ "name": "inner", "type": "Inner" }] })),
            "Outer",
            json!({ "inner": {} }),
        );
        assert!(matches!(data.signing_hash(), Err(Error::UndefinedType(_))));

        let missing_primary = TypedData::new(Eip712Domain::default(), Types::new(), "Nope", json!({}));
        assert!(matches!(
            missing_primary.signing_hash(),
            Err(Error::UndefinedType(_))
        ));
    }

    #[test]
    fn missing_field_error() {
        let mut mail = mail();
        mail.message.as_object_mut().unwrap().remove("contents");
        assert!(matches!(
            mail.signing_hash(),
            Err(Error::InvalidTypedData(_))
        ));
    }

    #[test]
    fn json_roundtrip_keeps_hash() {
        let original = mail();
        let recovered = TypedData::from_json(&original.to_json().unwrap()).unwrap();
        assert_eq!(
            original.signing_hash().unwrap(),
            recovered.signing_hash().unwrap()
        );
    }
}
