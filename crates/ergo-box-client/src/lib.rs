//! ergo-box-client: paged unspent-box queries against an Ergo node.
//!
//! Wraps `ergo-node-interface` and the node's extra-index REST endpoints
//! behind a small client that answers one bounded box query per call
//! (by box id, address, ErgoTree, or token id, against chain state, the
//! mempool, or both) and a pull-based [`BoxStream`] that pages through a
//! query while deduplicating boxes that migrate between the mempool and
//! the chain mid-stream.
//!
//! Every call is one network round trip; failures surface as
//! [`QueryError`] and are never retried here.

pub mod query;
pub mod stream;

use std::sync::Arc;

use ergo_lib::ergotree_ir::chain::address::{AddressEncoder, NetworkPrefix};
use ergo_lib::ergotree_ir::serialization::SigmaSerializable;
use ergo_node_interface::NodeInterface;
use serde::{Deserialize, Serialize};
use sigmalok_core::{
    Address, BlockHeight, ChainBox, NodeConfig, QueryError, SortOrder, TokenAmount,
};

pub use query::{BoxQuery, ChainSource, QueryScope};
pub use stream::{BoxStream, FetchBoxPage, DEFAULT_CHUNK_SIZE};

/// Default timeout for node API calls (30 seconds).
/// Long enough for slow nodes, short enough to avoid perpetual spinners.
const NODE_REQUEST_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(30);

/// Result type for node client operations
pub type Result<T> = std::result::Result<T, QueryError>;

/// Token metadata from the node
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenInfo {
    pub name: Option<String>,
    pub decimals: Option<u32>,
    pub emission_amount: Option<i64>,
}

/// ERG and token balance for an address, one confirmation side at a time
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BalanceInfo {
    pub nano_erg: u64,
    pub tokens: Vec<TokenAmount>,
    pub confirmed: bool,
}

/// Client for the node's box-index endpoints
#[derive(Clone)]
pub struct NodeClient {
    inner: Arc<NodeInterface>,
    config: NodeConfig,
}

impl NodeClient {
    /// Connect to a node; fails if the URL cannot be resolved.
    pub async fn connect(config: NodeConfig) -> Result<Self> {
        let node = NodeInterface::from_url_str(&config.api_key, &config.url)
            .await
            .map_err(|e| QueryError::Unreachable {
                url: format!("{}: {}", config.url, e),
            })?;

        Ok(Self {
            inner: Arc::new(node),
            config,
        })
    }

    /// Get the underlying node interface (for advanced usage)
    pub fn inner(&self) -> &NodeInterface {
        &self.inner
    }

    /// Get the current node configuration
    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    /// Full node info from `/info`
    pub async fn node_info(&self) -> Result<serde_json::Value> {
        self.get_json("/info").await
    }

    /// Current chain height, as reported by the box index
    pub async fn current_height(&self) -> Result<BlockHeight> {
        let json = self.get_json("/blockchain/indexedHeight").await?;
        json["fullHeight"]
            .as_u64()
            .ok_or_else(|| QueryError::Parse("Missing fullHeight".to_string()))
    }

    /// Height up to which the extra index has caught up
    pub async fn indexed_height(&self) -> Result<BlockHeight> {
        let json = self.get_json("/blockchain/indexedHeight").await?;
        json["indexedHeight"]
            .as_u64()
            .ok_or_else(|| QueryError::Parse("Missing indexedHeight".to_string()))
    }

    /// Token metadata (name, decimals, emission) from the node
    pub async fn token_info(&self, token_id: &str) -> Result<TokenInfo> {
        let json = self
            .get_json(&format!("/blockchain/token/byId/{}", token_id))
            .await?;

        Ok(TokenInfo {
            name: json["name"].as_str().map(|s| s.to_string()),
            decimals: json["decimals"].as_u64().map(|d| d as u32),
            emission_amount: json["emissionAmount"].as_i64(),
        })
    }

    /// ERG and token balance for an address. `confirmed` selects which
    /// side of the node's balance report to read.
    pub async fn address_balance(&self, address: &Address, confirmed: bool) -> Result<BalanceInfo> {
        let json = self
            .post_json("/blockchain/balance", quoted(address.as_str()))
            .await?;

        let side = if confirmed {
            &json["confirmed"]
        } else {
            &json["unconfirmed"]
        };

        let nano_erg = side["nanoErgs"].as_u64().unwrap_or(0);
        let tokens = side["tokens"]
            .as_array()
            .map(|arr| {
                arr.iter()
                    .filter_map(|t| serde_json::from_value::<TokenAmount>(t.clone()).ok())
                    .collect()
            })
            .unwrap_or_default();

        Ok(BalanceInfo {
            nano_erg,
            tokens,
            confirmed,
        })
    }

    // =========================================================================
    // Transport helpers
    // =========================================================================

    pub(crate) async fn get_json(&self, endpoint: &str) -> Result<serde_json::Value> {
        let response = timed_request(self.inner.send_get_req(endpoint)).await?;
        response
            .json()
            .await
            .map_err(|e| QueryError::Parse(e.to_string()))
    }

    pub(crate) async fn post_json(&self, endpoint: &str, body: String) -> Result<serde_json::Value> {
        let response = timed_request(self.inner.send_post_req(endpoint, body)).await?;
        response
            .json()
            .await
            .map_err(|e| QueryError::Parse(e.to_string()))
    }
}

impl sigmalok_select::UnspentBoxSource for NodeClient {
    async fn unspent_boxes_by_address(
        &self,
        address: &Address,
        limit: u32,
        offset: u32,
        sort: SortOrder,
        include_unconfirmed: bool,
        exclude_mempool_spent: bool,
    ) -> std::result::Result<Vec<ChainBox>, QueryError> {
        NodeClient::unspent_boxes_by_address(
            self,
            address,
            limit,
            offset,
            sort,
            include_unconfirmed,
            exclude_mempool_spent,
        )
        .await
    }
}

/// JSON-quote a string body; the node expects `"value"` with quotes for
/// its address/ergoTree POST endpoints.
pub(crate) fn quoted(s: &str) -> String {
    format!("\"{}\"", s)
}

/// Wrap a node API call with a timeout. Converts both timeout and API
/// errors to QueryError, classifying not-found responses.
async fn timed_request<T, E: std::fmt::Display>(
    fut: impl std::future::Future<Output = std::result::Result<T, E>>,
) -> Result<T> {
    tokio::time::timeout(NODE_REQUEST_TIMEOUT, fut)
        .await
        .map_err(|_| QueryError::Api {
            message: format!(
                "Node request timed out after {}s",
                NODE_REQUEST_TIMEOUT.as_secs()
            ),
        })?
        .map_err(|e| QueryError::Api {
            message: e.to_string(),
        })
}

/// Convert an Ergo address string to its ErgoTree hex representation.
pub fn address_to_ergo_tree(address: &Address) -> Result<String> {
    let encoder = AddressEncoder::new(NetworkPrefix::Mainnet);
    let addr = encoder
        .parse_address_from_str(address.as_str())
        .map_err(|e| QueryError::Parse(format!("Invalid address {}: {}", address, e)))?;
    let tree = addr
        .script()
        .map_err(|e| QueryError::Parse(format!("No script for address {}: {}", address, e)))?;
    let bytes = tree
        .sigma_serialize_bytes()
        .map_err(|e| QueryError::Parse(format!("ErgoTree serialization failed: {}", e)))?;
    Ok(hex::encode(bytes))
}

/// Parse one node box JSON object into a [`ChainBox`].
///
/// `confirmed` overrides the flag for mempool results; when `None` it is
/// derived from the node's `inclusionHeight`. Register values arrive
/// either as plain hex strings or wrapped in `{"serializedValue": ...}`
/// and are normalized to hex before deserializing.
pub(crate) fn parse_box(
    value: &serde_json::Value,
    confirmed: Option<bool>,
) -> Result<ChainBox> {
    let mut raw = value.clone();
    if let Some(regs) = raw
        .get_mut("additionalRegisters")
        .and_then(|r| r.as_object_mut())
    {
        for (_, reg) in regs.iter_mut() {
            if !reg.is_string() {
                let wrapped = reg["serializedValue"].as_str().map(|s| s.to_string());
                if let Some(hex_value) = wrapped {
                    *reg = serde_json::Value::String(hex_value);
                }
            }
        }
    }

    let mut chain_box: ChainBox =
        serde_json::from_value(raw).map_err(|e| QueryError::Parse(e.to_string()))?;
    chain_box.confirmed = match confirmed {
        Some(c) => c,
        None => value["inclusionHeight"].as_i64().unwrap_or(0) > 0,
    };
    Ok(chain_box)
}

pub(crate) fn parse_boxes(
    values: &[serde_json::Value],
    confirmed: Option<bool>,
) -> Result<Vec<ChainBox>> {
    values.iter().map(|v| parse_box(v, confirmed)).collect()
}
