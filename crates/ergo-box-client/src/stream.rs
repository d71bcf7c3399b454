//! Pull-based box streaming with cross-chunk deduplication.
//!
//! A box can appear to move between the mempool and the chain while a
//! query is being paged, which makes it show up again in a later page.
//! [`BoxStream`] remembers every id it has emitted and drops repeats, so
//! cumulative stream output never contains a box twice.

use std::collections::HashSet;

use sigmalok_core::{BoxId, ChainBox};

use crate::query::sort_by_height;
use crate::{BoxQuery, NodeClient, Result};

/// Default number of boxes fetched per chunk.
pub const DEFAULT_CHUNK_SIZE: u32 = 50;

/// One bounded page fetch; the seam between the stream and the node.
pub trait FetchBoxPage {
    fn fetch_page(
        &self,
        query: &BoxQuery,
        limit: u32,
        offset: u32,
    ) -> impl std::future::Future<Output = Result<Vec<ChainBox>>>;
}

impl FetchBoxPage for NodeClient {
    async fn fetch_page(&self, query: &BoxQuery, limit: u32, offset: u32) -> Result<Vec<ChainBox>> {
        NodeClient::fetch_page(self, query, limit, offset).await
    }
}

/// Lazy, finite sequence of deduplicated box chunks for one query.
///
/// Single-threaded and pull-based: the only suspension point is the page
/// fetch inside [`next_chunk`](Self::next_chunk). Dropping the stream
/// early has no side effects. Not restartable; build a fresh stream to
/// re-run a query.
pub struct BoxStream<'a, F> {
    fetcher: &'a F,
    query: BoxQuery,
    chunk_size: u32,
    offset: u32,
    returned: HashSet<BoxId>,
    exhausted: bool,
}

impl<'a, F: FetchBoxPage> BoxStream<'a, F> {
    pub fn new(fetcher: &'a F, query: BoxQuery) -> Self {
        Self::with_chunk_size(fetcher, query, DEFAULT_CHUNK_SIZE)
    }

    pub fn with_chunk_size(fetcher: &'a F, query: BoxQuery, chunk_size: u32) -> Self {
        Self {
            fetcher,
            query,
            chunk_size,
            offset: 0,
            returned: HashSet::new(),
            exhausted: false,
        }
    }

    /// Next non-empty chunk of previously unseen boxes, or `None` once a
    /// fetch comes back empty. A chunk that is filtered down to nothing
    /// by deduplication does not end the stream; only an empty fetch
    /// does.
    pub async fn next_chunk(&mut self) -> Result<Option<Vec<ChainBox>>> {
        while !self.exhausted {
            let page = self
                .fetcher
                .fetch_page(&self.query, self.chunk_size, self.offset)
                .await?;
            if page.is_empty() {
                self.exhausted = true;
                break;
            }
            // Offset advances by the chunk size even when everything in
            // the page gets filtered out.
            self.offset += self.chunk_size;

            let mut chunk: Vec<ChainBox> = Vec::with_capacity(page.len());
            for candidate in page {
                if self.returned.contains(&candidate.box_id) {
                    continue;
                }
                if chunk.iter().any(|c| c.box_id == candidate.box_id) {
                    continue;
                }
                chunk.push(candidate);
            }

            if chunk.is_empty() {
                continue;
            }
            for emitted in &chunk {
                self.returned.insert(emitted.box_id.clone());
            }
            return Ok(Some(chunk));
        }
        Ok(None)
    }
}

impl NodeClient {
    /// All unspent boxes matching a query, ordered by creation height
    /// per the query's sort. Drains a fresh [`BoxStream`].
    pub async fn get_boxes(&self, query: &BoxQuery) -> Result<Vec<ChainBox>> {
        collect_boxes(self, query).await
    }
}

pub(crate) async fn collect_boxes<F: FetchBoxPage>(
    fetcher: &F,
    query: &BoxQuery,
) -> Result<Vec<ChainBox>> {
    let mut stream = BoxStream::new(fetcher, query.clone());
    let mut boxes: Vec<ChainBox> = Vec::new();
    while let Some(chunk) = stream.next_chunk().await? {
        boxes.extend(chunk);
    }
    sort_by_height(&mut boxes, query.sort);
    Ok(boxes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ChainSource, QueryScope};
    use sigmalok_core::{Address, QueryError, SortOrder};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn mock_box(box_id: &str, height: u32) -> ChainBox {
        serde_json::from_value(serde_json::json!({
            "boxId": box_id,
            "value": 1_000_000u64,
            "ergoTree": "0008cd0219de7e3550ddd6403a2e4f136bfa2b22f878e863b44838a76da3e987a416b0a0",
            "creationHeight": height,
            "confirmed": true
        }))
        .unwrap()
    }

    fn query() -> BoxQuery {
        BoxQuery::new(
            QueryScope::Address(Address::new(
                "9fRusAarL1KkrWQVsxSRVYnvWxaAT2A96cKtNn9tvPh5XUyCisd",
            )),
            ChainSource::ConfirmedAndMempool,
        )
    }

    /// Replays fixed pages keyed by offset/chunk index.
    struct MockFetcher {
        pages: Vec<Vec<ChainBox>>,
        calls: AtomicUsize,
    }

    impl MockFetcher {
        fn new(pages: Vec<Vec<ChainBox>>) -> Self {
            Self {
                pages,
                calls: AtomicUsize::new(0),
            }
        }
    }

    impl FetchBoxPage for MockFetcher {
        async fn fetch_page(
            &self,
            _query: &BoxQuery,
            limit: u32,
            offset: u32,
        ) -> Result<Vec<ChainBox>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let idx = (offset / limit) as usize;
            Ok(self.pages.get(idx).cloned().unwrap_or_default())
        }
    }

    #[tokio::test]
    async fn emits_chunks_until_an_empty_fetch() {
        let fetcher = MockFetcher::new(vec![
            vec![mock_box("a", 10), mock_box("b", 11)],
            vec![mock_box("c", 12)],
        ]);
        let mut stream = BoxStream::new(&fetcher, query());

        let first = stream.next_chunk().await.unwrap().unwrap();
        assert_eq!(first.len(), 2);
        let second = stream.next_chunk().await.unwrap().unwrap();
        assert_eq!(second.len(), 1);
        assert!(stream.next_chunk().await.unwrap().is_none());
        // Exhaustion is sticky
        assert!(stream.next_chunk().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn deduplicates_a_box_that_migrated_between_chunks() {
        // "b" confirms between page fetches and shows up again
        let fetcher = MockFetcher::new(vec![
            vec![mock_box("a", 10), mock_box("b", 11)],
            vec![mock_box("b", 11), mock_box("c", 12)],
        ]);
        let mut stream = BoxStream::new(&fetcher, query());

        let mut all: Vec<String> = Vec::new();
        while let Some(chunk) = stream.next_chunk().await.unwrap() {
            all.extend(chunk.into_iter().map(|b| b.box_id.0));
        }
        assert_eq!(all, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn drops_duplicates_within_a_single_chunk() {
        let fetcher = MockFetcher::new(vec![vec![
            mock_box("a", 10),
            mock_box("a", 10),
            mock_box("b", 11),
        ]]);
        let mut stream = BoxStream::new(&fetcher, query());

        let chunk = stream.next_chunk().await.unwrap().unwrap();
        let ids: Vec<&str> = chunk.iter().map(|b| b.box_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn a_fully_filtered_chunk_does_not_end_the_stream() {
        let fetcher = MockFetcher::new(vec![
            vec![mock_box("a", 10)],
            vec![mock_box("a", 10)], // everything here was already seen
            vec![mock_box("b", 11)],
        ]);
        let mut stream = BoxStream::new(&fetcher, query());

        let first = stream.next_chunk().await.unwrap().unwrap();
        assert_eq!(first[0].box_id.as_str(), "a");
        // The all-duplicate middle page is skipped transparently
        let second = stream.next_chunk().await.unwrap().unwrap();
        assert_eq!(second[0].box_id.as_str(), "b");
        assert!(stream.next_chunk().await.unwrap().is_none());
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn collect_orders_by_creation_height() {
        let fetcher = MockFetcher::new(vec![
            vec![mock_box("mid", 20), mock_box("old", 10)],
            vec![mock_box("new", 30)],
        ]);

        let desc = collect_boxes(&fetcher, &query()).await.unwrap();
        let ids: Vec<&str> = desc.iter().map(|b| b.box_id.as_str()).collect();
        assert_eq!(ids, vec!["new", "mid", "old"]);

        let asc = collect_boxes(&fetcher, &query().sorted(SortOrder::Asc))
            .await
            .unwrap();
        let ids: Vec<&str> = asc.iter().map(|b| b.box_id.as_str()).collect();
        assert_eq!(ids, vec!["old", "mid", "new"]);
    }

    #[tokio::test]
    async fn fetch_failure_propagates() {
        struct FailingFetcher;
        impl FetchBoxPage for FailingFetcher {
            async fn fetch_page(
                &self,
                _query: &BoxQuery,
                _limit: u32,
                _offset: u32,
            ) -> Result<Vec<ChainBox>> {
                Err(QueryError::Api {
                    message: "502 bad gateway".into(),
                })
            }
        }

        let mut stream = BoxStream::new(&FailingFetcher, query());
        assert!(stream.next_chunk().await.is_err());
    }
}
