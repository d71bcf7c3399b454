//! Greedy multi-address UTXO input selection.
//!
//! Walks the caller's addresses in order, paging through each address's
//! unspent boxes newest-first, and accumulates inputs until a nanoERG
//! target and a set of per-token requirements are simultaneously met.
//! When a selected box carries a token that was not requested (or more of
//! a requested token than needed), a change output becomes unavoidable;
//! its minimum box value is charged to the running target exactly once.

use std::collections::{HashMap, HashSet};

use sigmalok_core::{
    Address, BoxId, ChainBox, NanoErg, QueryError, SelectError, SortOrder, TokenId, TokenRequest,
};

/// Page size used when driving the per-address unspent-box query.
const PAGE: u32 = 100;

/// Seam between the selector and the node query layer.
///
/// One call is one bounded query returning a single page; failures
/// propagate untouched and abort the selection.
pub trait UnspentBoxSource {
    fn unspent_boxes_by_address(
        &self,
        address: &Address,
        limit: u32,
        offset: u32,
        sort: SortOrder,
        include_unconfirmed: bool,
        exclude_mempool_spent: bool,
    ) -> impl std::future::Future<Output = Result<Vec<ChainBox>, QueryError>>;
}

/// Mutable running state of one selection call.
///
/// Owned exclusively by the call stack and discarded at return; never
/// reused across invocations.
struct SelectionState {
    /// Outstanding nanoERG still required; goes negative once covered.
    shortfall: i64,
    /// Remaining amount needed per token; entries removed when met.
    token_req: HashMap<TokenId, u64>,
    /// The originally requested token ids (unchanged during the run).
    requested: HashSet<TokenId>,
    /// Whether the change-output surcharge was already applied.
    change_charged: bool,
    /// Accepted boxes, in acceptance order.
    selected: Vec<ChainBox>,
    /// Ids of accepted boxes, to skip duplicates across pages/addresses.
    seen: HashSet<BoxId>,
}

impl SelectionState {
    fn new(target_value: NanoErg, tokens: &[TokenRequest]) -> Self {
        Self {
            shortfall: target_value as i64,
            token_req: tokens
                .iter()
                .map(|t| (t.token_id.clone(), t.amount))
                .collect(),
            requested: tokens.iter().map(|t| t.token_id.clone()).collect(),
            change_charged: false,
            selected: Vec::new(),
            seen: HashSet::new(),
        }
    }

    fn satisfied(&self) -> bool {
        self.shortfall <= 0 && self.token_req.is_empty()
    }

    /// Evaluate one candidate box, accepting it when it advances any
    /// open requirement. Returns whether the box was accepted.
    fn consider(&mut self, candidate: ChainBox, min_box_value: NanoErg) -> bool {
        if self.seen.contains(&candidate.box_id) {
            return false;
        }

        let mut touches_requested = false;
        let mut has_surplus = false;

        for holding in &candidate.assets {
            if let Some(remaining) = self.token_req.get(&holding.token_id).copied() {
                touches_requested = true;
                if holding.amount >= remaining {
                    // An exact match still forces a token change output,
                    // same as a genuine overshoot.
                    self.token_req.remove(&holding.token_id);
                    has_surplus = true;
                } else {
                    self.token_req
                        .insert(holding.token_id.clone(), remaining - holding.amount);
                }
            }

            if !self.requested.contains(&holding.token_id) {
                has_surplus = true;
            }
        }

        // Only one extra change output is ever needed, no matter how many
        // surplus-token boxes get pulled in.
        if has_surplus && !self.change_charged {
            self.shortfall += min_box_value as i64;
            self.change_charged = true;
        }

        if has_surplus || touches_requested || self.shortfall > 0 {
            self.shortfall -= candidate.value as i64;
            self.seen.insert(candidate.box_id.clone());
            self.selected.push(candidate);
            true
        } else {
            false
        }
    }

    fn into_insufficiency(self) -> SelectError {
        let missing_value = if self.shortfall > 0 {
            self.shortfall as NanoErg
        } else {
            0
        };
        let mut missing_tokens: Vec<(TokenId, u64)> = self.token_req.into_iter().collect();
        missing_tokens.sort_by(|a, b| a.0.as_str().cmp(b.0.as_str()));
        SelectError::Insufficient {
            missing_value,
            missing_tokens,
        }
    }
}

/// Select input boxes covering `target_value` nanoERG and every requested
/// token amount, drawing from `addresses` in the order given.
///
/// Boxes are discovered newest-first, 100 per page, and accepted in
/// discovery order, so the result is deterministic for a fixed node
/// state. `include_mempool` extends the query to unconfirmed boxes while
/// excluding boxes already spent in the mempool. `min_box_value` sizes
/// the change output forced by any unrequested or surplus token.
pub async fn select_inputs<S: UnspentBoxSource>(
    source: &S,
    addresses: &[Address],
    target_value: NanoErg,
    tokens: &[TokenRequest],
    include_mempool: bool,
    min_box_value: NanoErg,
) -> Result<Vec<ChainBox>, SelectError> {
    if addresses.is_empty() {
        return Err(SelectError::NoAddresses);
    }

    let mut state = SelectionState::new(target_value, tokens);

    'addresses: for address in addresses {
        if state.satisfied() {
            break;
        }

        let mut offset: u32 = 0;
        loop {
            let page = source
                .unspent_boxes_by_address(
                    address,
                    PAGE,
                    offset,
                    SortOrder::Desc,
                    include_mempool,
                    include_mempool,
                )
                .await?;
            if page.is_empty() {
                break;
            }
            let last_page = (page.len() as u32) < PAGE;

            for candidate in page {
                state.consider(candidate, min_box_value);
                if state.satisfied() {
                    break 'addresses;
                }
            }

            if last_page {
                break;
            }
            offset += PAGE;
        }
    }

    if state.satisfied() {
        Ok(state.selected)
    } else {
        Err(state.into_insufficiency())
    }
}
