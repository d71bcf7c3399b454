//! Box query descriptors and the per-scope endpoint dispatch.
//!
//! A query names exactly one scope (box id, address, ErgoTree, or token
//! id) and one chain source (confirmed state, mempool, or both). The
//! combination is resolved once per page fetch in
//! [`NodeClient::fetch_page`] rather than probed from optional fields.

use serde::{Deserialize, Serialize};
use sigmalok_core::{Address, BoxId, ChainBox, QueryError, SortOrder, TokenId};

use crate::{address_to_ergo_tree, parse_box, parse_boxes, quoted, NodeClient, Result};

/// What to match boxes against; exactly one per query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum QueryScope {
    BoxId(BoxId),
    Address(Address),
    ErgoTree(String),
    TokenId(TokenId),
}

/// Which side of the chain/mempool boundary to search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ChainSource {
    Confirmed,
    Mempool,
    ConfirmedAndMempool,
}

/// A complete box query descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoxQuery {
    pub scope: QueryScope,
    pub source: ChainSource,
    #[serde(default)]
    pub sort: SortOrder,
}

impl BoxQuery {
    pub fn new(scope: QueryScope, source: ChainSource) -> Self {
        Self {
            scope,
            source,
            sort: SortOrder::default(),
        }
    }

    pub fn sorted(mut self, sort: SortOrder) -> Self {
        self.sort = sort;
        self
    }
}

/// Query-string tail shared by the unspent-box index endpoints.
fn unspent_params(
    limit: u32,
    offset: u32,
    sort: SortOrder,
    include_unconfirmed: bool,
    exclude_mempool_spent: bool,
) -> String {
    format!(
        "offset={}&limit={}&sortDirection={}&includeUnconfirmed={}&excludeMempoolSpent={}",
        offset, limit, sort, include_unconfirmed, exclude_mempool_spent
    )
}

/// Derive the unspent outputs of a set of unconfirmed transactions for
/// one ErgoTree: outputs paying to the tree, minus outputs consumed as
/// inputs by any of the same transactions, ordered by creation height.
fn mempool_unspent_outputs(
    txs: &[serde_json::Value],
    ergo_tree: &str,
    sort: SortOrder,
    limit: u32,
    offset: u32,
) -> Result<Vec<ChainBox>> {
    let mut spent_ids: std::collections::HashSet<&str> = std::collections::HashSet::new();
    for tx in txs {
        if let Some(inputs) = tx["inputs"].as_array() {
            for input in inputs {
                if let Some(box_id) = input["boxId"].as_str() {
                    spent_ids.insert(box_id);
                }
            }
        }
    }

    let mut unspent: Vec<ChainBox> = Vec::new();
    for tx in txs {
        let Some(outputs) = tx["outputs"].as_array() else {
            continue;
        };
        for output in outputs {
            if output["ergoTree"].as_str() != Some(ergo_tree) {
                continue;
            }
            if output["boxId"]
                .as_str()
                .is_some_and(|id| spent_ids.contains(id))
            {
                continue;
            }
            unspent.push(parse_box(output, Some(false))?);
        }
    }

    sort_by_height(&mut unspent, sort);
    Ok(page_slice(unspent, limit, offset))
}

pub(crate) fn sort_by_height(boxes: &mut [ChainBox], sort: SortOrder) {
    match sort {
        SortOrder::Desc => boxes.sort_by(|a, b| b.creation_height.cmp(&a.creation_height)),
        SortOrder::Asc => boxes.sort_by(|a, b| a.creation_height.cmp(&b.creation_height)),
    }
}

/// Apply offset/limit locally for endpoints that do not paginate
/// server-side. A limit of 0 means "no limit".
fn page_slice(boxes: Vec<ChainBox>, limit: u32, offset: u32) -> Vec<ChainBox> {
    let limit = if limit == 0 { 1000 } else { limit };
    boxes
        .into_iter()
        .skip(offset as usize)
        .take(limit as usize)
        .collect()
}

impl NodeClient {
    /// Fetch one page of unspent boxes for a query. Ordering is by
    /// creation height per the query's sort; `limit`/`offset` bound the
    /// page. By-id scopes yield a page of at most one box.
    pub async fn fetch_page(
        &self,
        query: &BoxQuery,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<ChainBox>> {
        tracing::debug!(?query, limit, offset, "fetching box page");

        match (&query.scope, query.source) {
            (QueryScope::BoxId(box_id), source) => {
                // A by-id page has nothing past the first offset.
                if offset > 0 {
                    return Ok(Vec::new());
                }
                let found = match source {
                    ChainSource::Confirmed => self.box_by_id(box_id).await?,
                    ChainSource::Mempool => self.mempool_box_by_id(box_id).await?,
                    ChainSource::ConfirmedAndMempool => self.box_by_id_with_pool(box_id).await?,
                };
                Ok(vec![found])
            }
            (QueryScope::Address(address), ChainSource::Confirmed) => {
                self.unspent_boxes_by_address(address, limit, offset, query.sort, false, false)
                    .await
            }
            (QueryScope::Address(address), ChainSource::ConfirmedAndMempool) => {
                self.unspent_boxes_by_address(address, limit, offset, query.sort, true, false)
                    .await
            }
            (QueryScope::Address(address), ChainSource::Mempool) => {
                let ergo_tree = address_to_ergo_tree(address)?;
                self.mempool_unspent_by_ergo_tree(&ergo_tree, limit, offset, query.sort)
                    .await
            }
            (QueryScope::ErgoTree(ergo_tree), ChainSource::Confirmed) => {
                self.unspent_boxes_by_ergo_tree(ergo_tree, limit, offset, query.sort, false, false)
                    .await
            }
            (QueryScope::ErgoTree(ergo_tree), ChainSource::ConfirmedAndMempool) => {
                self.unspent_boxes_by_ergo_tree(ergo_tree, limit, offset, query.sort, true, false)
                    .await
            }
            (QueryScope::ErgoTree(ergo_tree), ChainSource::Mempool) => {
                self.mempool_unspent_by_ergo_tree(ergo_tree, limit, offset, query.sort)
                    .await
            }
            (QueryScope::TokenId(token_id), ChainSource::Confirmed) => {
                self.unspent_boxes_by_token_id(token_id, limit, offset, query.sort, false, false)
                    .await
            }
            (QueryScope::TokenId(token_id), ChainSource::ConfirmedAndMempool) => {
                self.unspent_boxes_by_token_id(token_id, limit, offset, query.sort, true, false)
                    .await
            }
            (QueryScope::TokenId(token_id), ChainSource::Mempool) => {
                self.mempool_unspent_by_token_id(token_id, limit, offset, query.sort)
                    .await
            }
        }
    }

    /// Unspent boxes for an address from the box index.
    pub async fn unspent_boxes_by_address(
        &self,
        address: &Address,
        limit: u32,
        offset: u32,
        sort: SortOrder,
        include_unconfirmed: bool,
        exclude_mempool_spent: bool,
    ) -> Result<Vec<ChainBox>> {
        let endpoint = format!(
            "/blockchain/box/unspent/byAddress?{}",
            unspent_params(limit, offset, sort, include_unconfirmed, exclude_mempool_spent)
        );
        let json = self.post_json(&endpoint, quoted(address.as_str())).await?;
        let items = as_array(&json)?;
        parse_boxes(items, None)
    }

    /// Unspent boxes for an ErgoTree from the box index.
    pub async fn unspent_boxes_by_ergo_tree(
        &self,
        ergo_tree: &str,
        limit: u32,
        offset: u32,
        sort: SortOrder,
        include_unconfirmed: bool,
        exclude_mempool_spent: bool,
    ) -> Result<Vec<ChainBox>> {
        let endpoint = format!(
            "/blockchain/box/unspent/byErgoTree?{}",
            unspent_params(limit, offset, sort, include_unconfirmed, exclude_mempool_spent)
        );
        let json = self.post_json(&endpoint, quoted(ergo_tree)).await?;
        let items = as_array(&json)?;
        parse_boxes(items, None)
    }

    /// Unspent boxes holding a token from the box index.
    pub async fn unspent_boxes_by_token_id(
        &self,
        token_id: &TokenId,
        limit: u32,
        offset: u32,
        sort: SortOrder,
        include_unconfirmed: bool,
        exclude_mempool_spent: bool,
    ) -> Result<Vec<ChainBox>> {
        let endpoint = format!(
            "/blockchain/box/unspent/byTokenId/{}?{}",
            token_id,
            unspent_params(limit, offset, sort, include_unconfirmed, exclude_mempool_spent)
        );
        let json = self.get_json(&endpoint).await?;
        let items = as_array(&json)?;
        parse_boxes(items, None)
    }

    /// A confirmed box by id.
    pub async fn box_by_id(&self, box_id: &BoxId) -> Result<ChainBox> {
        let endpoint = format!("/blockchain/box/byId/{}", box_id);
        let json = self.get_json(&endpoint).await.map_err(|e| {
            if e.to_string().contains("not found") || e.to_string().contains("404") {
                QueryError::BoxNotFound {
                    box_id: box_id.clone(),
                }
            } else {
                e
            }
        })?;
        if json["error"].is_number() {
            return Err(QueryError::BoxNotFound {
                box_id: box_id.clone(),
            });
        }
        parse_box(&json, None)
    }

    /// A box by id, checking the confirmed UTXO set first and falling
    /// back to the mempool-inclusive set.
    pub async fn box_by_id_with_pool(&self, box_id: &BoxId) -> Result<ChainBox> {
        match self.box_by_id(box_id).await {
            Ok(found) => Ok(found),
            Err(QueryError::BoxNotFound { .. }) => {
                tracing::debug!(%box_id, "box not confirmed, checking the pool");
                let endpoint = format!("/utxo/withPool/byId/{}", box_id);
                let json = self.get_json(&endpoint).await?;
                if json["error"].is_number() {
                    return Err(QueryError::BoxNotFound {
                        box_id: box_id.clone(),
                    });
                }
                parse_box(&json, Some(false))
            }
            Err(e) => Err(e),
        }
    }

    /// An output of an unconfirmed transaction, by box id.
    pub async fn mempool_box_by_id(&self, box_id: &BoxId) -> Result<ChainBox> {
        let endpoint = format!("/transactions/unconfirmed/outputs/byBoxId/{}", box_id);
        let json = self.get_json(&endpoint).await?;
        if json["error"].is_number() {
            return Err(QueryError::BoxNotFound {
                box_id: box_id.clone(),
            });
        }
        parse_box(&json, Some(false))
    }

    /// Unspent mempool outputs paying to an ErgoTree.
    ///
    /// The node has no direct endpoint for this; the unconfirmed
    /// transactions touching the tree are fetched and their still-unspent
    /// outputs derived locally.
    pub async fn mempool_unspent_by_ergo_tree(
        &self,
        ergo_tree: &str,
        limit: u32,
        offset: u32,
        sort: SortOrder,
    ) -> Result<Vec<ChainBox>> {
        let json = self
            .post_json("/transactions/unconfirmed/byErgoTree", quoted(ergo_tree))
            .await?;
        let txs = as_array(&json)?;
        mempool_unspent_outputs(txs, ergo_tree, sort, limit, offset)
    }

    /// Unconfirmed outputs holding a token, sorted and sliced locally.
    pub async fn mempool_unspent_by_token_id(
        &self,
        token_id: &TokenId,
        limit: u32,
        offset: u32,
        sort: SortOrder,
    ) -> Result<Vec<ChainBox>> {
        let endpoint = format!("/transactions/unconfirmed/outputs/byTokenId/{}", token_id);
        let json = self.get_json(&endpoint).await?;
        let items = as_array(&json)?;
        let mut boxes = parse_boxes(items, Some(false))?;
        sort_by_height(&mut boxes, sort);
        Ok(page_slice(boxes, limit, offset))
    }
}

fn as_array(json: &serde_json::Value) -> Result<&[serde_json::Value]> {
    json.as_array()
        .map(|a| a.as_slice())
        .ok_or_else(|| QueryError::Parse(format!("Expected a JSON array, got: {}", json)))
}
