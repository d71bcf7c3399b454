//! Core type definitions for sigmalok

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Box ID (32 bytes, hex-encoded)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BoxId(pub String);

impl BoxId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BoxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Token ID (32 bytes, hex-encoded)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TokenId(pub String);

impl TokenId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TokenId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Ergo address (P2PK or P2S, base58)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Address(pub String);

impl Address {
    pub fn new(addr: impl Into<String>) -> Self {
        Self(addr.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Check if this is a mainnet address
    pub fn is_mainnet(&self) -> bool {
        self.0.starts_with('9')
    }

    /// Check if this is a testnet address
    pub fn is_testnet(&self) -> bool {
        self.0.starts_with('3')
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Sort direction on creation height for box queries.
/// `Desc` (newest first) is the node's and this library's default.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

impl SortOrder {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Asc => "asc",
            Self::Desc => "desc",
        }
    }
}

impl fmt::Display for SortOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One token holding carried by a box.
///
/// Amounts cross the node boundary as decimal strings (EIP-12 style) but
/// some endpoints emit plain JSON numbers; both are accepted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenAmount {
    pub token_id: TokenId,
    #[serde(with = "amount_str")]
    pub amount: u64,
}

/// A per-token requirement passed to the selector (amount > 0).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenRequest {
    pub token_id: TokenId,
    #[serde(with = "amount_str")]
    pub amount: u64,
}

impl TokenRequest {
    pub fn new(token_id: impl Into<String>, amount: u64) -> Self {
        Self {
            token_id: TokenId::new(token_id),
            amount,
        }
    }
}

/// An unspent box as returned by the query layer.
///
/// Immutable once parsed; selection and streaming only ever copy these,
/// never modify them. `confirmed` distinguishes chain state from mempool
/// outputs and is filled in by the query layer, not by the node JSON.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainBox {
    pub box_id: BoxId,
    #[serde(with = "amount_str")]
    pub value: u64,
    pub ergo_tree: String,
    #[serde(default)]
    pub assets: Vec<TokenAmount>,
    pub creation_height: u32,
    #[serde(default)]
    pub transaction_id: String,
    #[serde(default)]
    pub index: u16,
    #[serde(default)]
    pub additional_registers: HashMap<String, String>,
    #[serde(default)]
    pub confirmed: bool,
}

impl ChainBox {
    /// Total amount of `token_id` held by this box.
    pub fn token_amount(&self, token_id: &TokenId) -> u64 {
        self.assets
            .iter()
            .filter(|a| &a.token_id == token_id)
            .map(|a| a.amount)
            .sum()
    }
}

/// Block height
pub type BlockHeight = u64;

/// NanoERG amount (1 ERG = 1_000_000_000 nanoERG)
pub type NanoErg = u64;

/// Constants
pub mod constants {
    use super::NanoErg;

    /// 1 ERG in nanoERG
    pub const NANOERG_PER_ERG: NanoErg = 1_000_000_000;

    /// Safe minimum box value (0.001 ERG), used to size a forced change output
    pub const SAFE_MIN_BOX_VALUE: NanoErg = 1_000_000;
}

/// Serde helper: u64 amounts serialized as decimal strings, accepted as
/// either strings or JSON numbers.
mod amount_str {
    use serde::{Deserialize, Deserializer, Serializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Num(u64),
        Str(String),
    }

    pub fn serialize<S: Serializer>(value: &u64, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
        match Raw::deserialize(deserializer)? {
            Raw::Num(n) => Ok(n),
            Raw::Str(s) => s.parse().map_err(serde::de::Error::custom),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_address_network_detection() {
        let mainnet = Address::new("9fRusAarL1KkrWQVsxSRVYnvWxaAT2A96cKtNn9tvPh5XUyCisd");
        assert!(mainnet.is_mainnet());
        assert!(!mainnet.is_testnet());

        let testnet = Address::new("3WwbzW6u8hKWBcL1W7kNVMr25s2UHfSBnYtwSHvrRQt7DdPuoXrt");
        assert!(testnet.is_testnet());
        assert!(!testnet.is_mainnet());
    }

    #[test]
    fn test_sort_order_default_and_display() {
        assert_eq!(SortOrder::default(), SortOrder::Desc);
        assert_eq!(SortOrder::Desc.as_str(), "desc");
        assert_eq!(SortOrder::Asc.to_string(), "asc");
    }

    #[test]
    fn test_chain_box_value_from_string() {
        let json = serde_json::json!({
            "boxId": "78e849d1703f73e874f4fd01b6a21882d34eea56ef2824ba4bde21d85f1ef24a",
            "value": "1000000",
            "ergoTree": "0008cd0219de7e3550ddd6403a2e4f136bfa2b22f878e863b44838a76da3e987a416b0a0",
            "creationHeight": 1572967,
            "assets": [
                { "tokenId": "b1849f63b3b5817298155abefc4ba105faf9f9466c15aed39df8a06985d1d881", "amount": "3" }
            ],
            "additionalRegisters": {},
            "transactionId": "eb2306e8de6a985f5daa5fc4cfd6dda2fcedc21630b6ec9c1c21dd859c0c759d",
            "index": 0
        });

        let b: ChainBox = serde_json::from_value(json).unwrap();
        assert_eq!(b.value, 1_000_000);
        assert_eq!(b.assets.len(), 1);
        assert_eq!(b.assets[0].amount, 3);
        assert!(!b.confirmed);
    }

    #[test]
    fn test_chain_box_value_from_number() {
        let json = serde_json::json!({
            "boxId": "abc",
            "value": 10_000_000u64,
            "ergoTree": "0008cd...",
            "creationHeight": 100,
            "assets": [
                { "tokenId": "t1", "amount": 7u64 }
            ]
        });

        let b: ChainBox = serde_json::from_value(json).unwrap();
        assert_eq!(b.value, 10_000_000);
        assert_eq!(b.token_amount(&TokenId::new("t1")), 7);
        assert_eq!(b.token_amount(&TokenId::new("t2")), 0);
    }

    #[test]
    fn test_chain_box_serializes_amounts_as_strings() {
        let b = ChainBox {
            box_id: BoxId::new("abc"),
            value: 42,
            ergo_tree: "0008cd...".into(),
            assets: vec![TokenAmount {
                token_id: TokenId::new("t1"),
                amount: 9,
            }],
            creation_height: 1,
            transaction_id: String::new(),
            index: 0,
            additional_registers: HashMap::new(),
            confirmed: true,
        };

        let v = serde_json::to_value(&b).unwrap();
        assert_eq!(v["value"], "42");
        assert_eq!(v["assets"][0]["amount"], "9");
    }
}
