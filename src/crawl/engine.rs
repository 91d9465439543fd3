// src/crawl/engine.rs
// =============================================================================
// This module implements the concurrent workspace traversal.
//
// How it works:
// 1. Normalize the seed id and put it in the work queue
// 2. Start fetches from the queue, up to the concurrency ceiling
// 3. When a fetch finishes, scan the page for references to other pages
//    (sub-page blocks in our workspace, and optionally collection rows)
//    and queue every id we haven't seen before
// 4. Record the page (or a failure marker) in the result map
// 5. Repeat until the queue is empty and nothing is in flight
//
// Exactly-once scheduling:
// - An id is queued only if it's in neither the result map nor the pending
//   set. Both structures are owned by this single scheduler loop - fetches
//   run concurrently, but all bookkeeping happens here between polls, so
//   the check-and-mark can't race with another discovery of the same id.
// - An id leaves the pending set only after its page has been scanned and
//   recorded. Record maps list the page's own block, so removing earlier
//   would let every page requeue itself.
//
// Failure isolation:
// - A failed fetch becomes a PageEntry::Failed under its id. The failure is
//   logged and the rest of the traversal continues. Even a panicking
//   fetcher is caught and recorded the same way.
// =============================================================================

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use futures::stream::{FuturesUnordered, StreamExt};
use futures::FutureExt;
use serde::Serialize;
use std::collections::{HashMap, HashSet, VecDeque};
use std::panic::AssertUnwindSafe;
use tracing::warn;

use crate::notion::PageRecord;
use crate::page_id::parse_page_id;

// Something that can fetch one page by its canonical id
//
// The crawl engine calls this concurrently, up to its configured bound, so
// implementations must tolerate simultaneous calls. Transient and permanent
// failures look the same to the engine: the page gets a failure entry.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch_page(&self, page_id: &str) -> Result<PageRecord>;
}

// Options controlling a crawl
#[derive(Debug, Clone)]
pub struct CrawlOptions {
    /// Maximum number of page fetches in flight at once (minimum 1)
    pub concurrency: usize,

    /// Whether to also visit the rows of embedded collection views
    ///
    /// Collection rows are pages too and may contain sub-pages of their
    /// own, but crawling a large database can be expensive - hence the
    /// toggle.
    pub traverse_collections: bool,
}

impl Default for CrawlOptions {
    fn default() -> Self {
        Self {
            concurrency: 4,
            traverse_collections: true,
        }
    }
}

// One entry in the crawl result: the page, or why we couldn't get it
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PageEntry {
    /// The page was fetched successfully
    Fetched { page: PageRecord },
    /// The fetch failed; the id stays in the map so it's never retried
    Failed { reason: String },
}

impl PageEntry {
    /// Helper method to check if the page was fetched successfully
    pub fn is_ok(&self) -> bool {
        matches!(self, PageEntry::Fetched { .. })
    }

    /// The fetched page, if there is one
    pub fn page(&self) -> Option<&PageRecord> {
        match self {
            PageEntry::Fetched { page } => Some(page),
            PageEntry::Failed { .. } => None,
        }
    }
}

// Everything reachable from the seed, keyed by canonical page id
//
// Each id that entered the traversal appears exactly once - as a fetched
// page or as a failure entry.
pub type CrawlResult = HashMap<String, PageEntry>;

// Crawls a workspace starting from a seed page
//
// Parameters:
//   seed_page_id: Page to start from, in any accepted id format
//   space_id: Workspace id scoping the traversal; sub-page references
//             pointing into other workspaces are dropped
//   fetcher: Fetches a single page; called concurrently up to the bound
//   options: Concurrency ceiling and collection traversal toggle
//
// Returns the map of every page reachable from the seed. A malformed seed
// id produces an empty map. The call completes only once every discovered
// id has been fetched or has failed.
pub async fn crawl<F>(
    seed_page_id: &str,
    space_id: &str,
    fetcher: &F,
    options: &CrawlOptions,
) -> CrawlResult
where
    F: PageFetcher,
{
    let concurrency = options.concurrency.max(1);

    // All three structures live only for this call and are touched only by
    // this loop; the fetches themselves share nothing
    let mut pages: CrawlResult = HashMap::new();
    let mut pending: HashSet<String> = HashSet::new();
    let mut queue: VecDeque<String> = VecDeque::new();
    let mut in_flight = FuturesUnordered::new();

    schedule(seed_page_id, &pages, &mut pending, &mut queue);

    loop {
        // Refill the pool up to the concurrency ceiling
        while in_flight.len() < concurrency {
            match queue.pop_front() {
                Some(page_id) => in_flight.push(fetch_one(fetcher, page_id)),
                None => break,
            }
        }

        // Empty pool here means the queue is drained too: we're done
        let Some((page_id, outcome)) = in_flight.next().await else {
            break;
        };

        match outcome {
            Ok(page) => {
                // The id stays in the pending set while we scan: a record
                // map lists the page's own block (page-typed, in our
                // workspace), and removing first would let it requeue
                // itself for a second fetch.
                //
                // Follow sub-page blocks, but only those in our workspace -
                // pages can reference pages in other workspaces and we must
                // not walk across that boundary
                for sub_page_id in page.sub_page_ids(space_id) {
                    schedule(&sub_page_id, &pages, &mut pending, &mut queue);
                }

                // Collection rows are pages as well and may contain
                // sub-pages of their own
                if options.traverse_collections {
                    for row_id in page.collection_row_ids() {
                        schedule(&row_id, &pages, &mut pending, &mut queue);
                    }
                }

                pending.remove(&page_id);
                pages.entry(page_id).or_insert(PageEntry::Fetched { page });
            }
            Err(err) => {
                // Record the failure and keep crawling; sibling branches
                // are unaffected
                warn!(
                    page_id = %page_id,
                    space_id = %space_id,
                    error = %err,
                    "page load error"
                );

                pending.remove(&page_id);
                pages.entry(page_id).or_insert(PageEntry::Failed {
                    reason: err.to_string(),
                });
            }
        }
    }

    pages
}

// Queues a page id for fetching, unless we've already seen it
//
// The id is normalized first; ids that don't normalize are dropped
// silently (they were never valid pages to begin with).
fn schedule(
    raw_id: &str,
    pages: &CrawlResult,
    pending: &mut HashSet<String>,
    queue: &mut VecDeque<String>,
) {
    let Some(page_id) = parse_page_id(raw_id) else {
        return;
    };

    // Already fetched, or already queued/in flight: nothing to do
    if pages.contains_key(&page_id) || pending.contains(&page_id) {
        return;
    }

    pending.insert(page_id.clone());
    queue.push_back(page_id);
}

// Runs one fetch and pairs the outcome with its page id
//
// A fetcher that panics (instead of returning an error) is caught here and
// turned into an ordinary fetch failure, so one misbehaving page can't
// take down the whole traversal.
async fn fetch_one<F>(fetcher: &F, page_id: String) -> (String, Result<PageRecord>)
where
    F: PageFetcher,
{
    let outcome = match AssertUnwindSafe(fetcher.fetch_page(&page_id))
        .catch_unwind()
        .await
    {
        Ok(result) => result,
        Err(_) => Err(anyhow!("page fetcher panicked")),
    };

    (page_id, outcome)
}

// -----------------------------------------------------------------------------
// NOTES:
//
// 1. Why FuturesUnordered instead of spawning tasks?
//    - The scheduler loop stays the single owner of the result map, the
//      pending set, and the queue - no Mutex, no channels
//    - in_flight.next().await resumes whichever fetch finishes first,
//      which is exactly the worker-pool behavior we want
//
// 2. Why a pending set AND the result map?
//    - The result map only gains an entry after a fetch resolves
//    - Without the pending set, two pages both linking to a third page
//      could queue it twice while the first fetch is still in flight
//    - The id must stay in the set until its references are scanned, or
//      the page's own block would schedule it again
//
// 3. Why is the queue unbounded?
//    - The concurrency ceiling is the backpressure; the queue just holds
//      discovered ids until a slot frees. Its depth is bounded by the
//      number of distinct pages in the workspace.
// -----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    const SPACE: &str = "aaaaaaaa-bbbb-cccc-dddd-eeeeeeeeeeee";
    const OTHER_SPACE: &str = "99999999-8888-7777-6666-555555555555";

    // Generates the canonical id for test page n
    fn pid(n: u32) -> String {
        parse_page_id(&format!("{n:032x}")).unwrap()
    }

    // Builds a PageRecord with the given sub-page blocks ((id, space_id)
    // pairs) and collection rows
    fn page_record(children: &[(&str, &str)], rows: &[&str]) -> PageRecord {
        let mut blocks = serde_json::Map::new();

        for (child_id, child_space) in children {
            blocks.insert(
                (*child_id).to_string(),
                json!({
                    "value": { "id": child_id, "type": "page", "space_id": child_space }
                }),
            );
        }

        let mut record = json!({ "block": blocks });

        if !rows.is_empty() {
            record["collection_query"] = json!({
                "coll": { "view": { "blockIds": rows } }
            });
        }

        serde_json::from_value(record).unwrap()
    }

    // In-memory fetcher over a fixed page graph, instrumented so tests can
    // observe which pages were requested and how many fetches overlapped
    #[derive(Default)]
    struct MockFetcher {
        pages: HashMap<String, PageRecord>,
        fail: HashSet<String>,
        panic_on: HashSet<String>,
        calls: Mutex<Vec<String>>,
        active: AtomicUsize,
        max_active: AtomicUsize,
    }

    impl MockFetcher {
        fn with_page(mut self, id: &str, children: &[(&str, &str)], rows: &[&str]) -> Self {
            self.pages.insert(id.to_string(), page_record(children, rows));
            self
        }

        fn failing(mut self, id: &str) -> Self {
            self.fail.insert(id.to_string());
            self
        }

        fn panicking(mut self, id: &str) -> Self {
            self.panic_on.insert(id.to_string());
            self
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }

        fn call_count(&self, id: &str) -> usize {
            self.calls().iter().filter(|c| *c == id).count()
        }
    }

    #[async_trait]
    impl PageFetcher for MockFetcher {
        async fn fetch_page(&self, page_id: &str) -> Result<PageRecord> {
            self.calls.lock().unwrap().push(page_id.to_string());

            if self.panic_on.contains(page_id) {
                panic!("mock fetcher panic for {page_id}");
            }

            let active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_active.fetch_max(active, Ordering::SeqCst);

            // Yield long enough for sibling fetches to overlap, so the
            // concurrency ceiling is actually observable
            tokio::time::sleep(Duration::from_millis(5)).await;

            self.active.fetch_sub(1, Ordering::SeqCst);

            if self.fail.contains(page_id) {
                return Err(anyhow!("simulated fetch failure"));
            }

            self.pages
                .get(page_id)
                .cloned()
                .ok_or_else(|| anyhow!("no such page: {page_id}"))
        }
    }

    #[tokio::test]
    async fn test_seed_only_graph() {
        let seed = pid(1);
        let fetcher = MockFetcher::default().with_page(&seed, &[], &[]);

        let result = crawl(&seed, SPACE, &fetcher, &CrawlOptions::default()).await;

        assert_eq!(result.len(), 1);
        assert!(result[&seed].is_ok());
    }

    #[tokio::test]
    async fn test_exactly_once_scheduling_in_diamond_graph() {
        // a -> b, c and both b and c -> d; d must be fetched once
        let (a, b, c, d) = (pid(1), pid(2), pid(3), pid(4));

        let fetcher = MockFetcher::default()
            .with_page(&a, &[(&b, SPACE), (&c, SPACE)], &[])
            .with_page(&b, &[(&d, SPACE)], &[])
            .with_page(&c, &[(&d, SPACE)], &[])
            .with_page(&d, &[], &[]);

        let result = crawl(&a, SPACE, &fetcher, &CrawlOptions::default()).await;

        assert_eq!(result.len(), 4);
        assert_eq!(fetcher.call_count(&d), 1);
        assert!(result.values().all(PageEntry::is_ok));
    }

    #[tokio::test]
    async fn test_cross_workspace_references_are_not_fetched() {
        let (a, ours, theirs) = (pid(1), pid(2), pid(3));

        let fetcher = MockFetcher::default()
            .with_page(&a, &[(&ours, SPACE), (&theirs, OTHER_SPACE)], &[])
            .with_page(&ours, &[], &[]);

        let result = crawl(&a, SPACE, &fetcher, &CrawlOptions::default()).await;

        assert_eq!(result.len(), 2);
        assert!(!result.contains_key(&theirs));
        assert!(!fetcher.calls().contains(&theirs));
    }

    #[tokio::test]
    async fn test_sub_page_without_space_id_is_excluded() {
        let (a, orphan) = (pid(1), pid(2));

        // Build a's record by hand so the child block has no space_id
        let record: PageRecord = serde_json::from_value(json!({
            "block": {
                (orphan.clone()): { "value": { "id": orphan.clone(), "type": "page" } }
            }
        }))
        .unwrap();

        let mut fetcher = MockFetcher::default();
        fetcher.pages.insert(a.clone(), record);

        let result = crawl(&a, SPACE, &fetcher, &CrawlOptions::default()).await;

        // A block with no workspace id doesn't match ours and is dropped
        assert_eq!(result.len(), 1);
        assert!(!result.contains_key(&orphan));
    }

    #[tokio::test]
    async fn test_failure_isolation() {
        // b fails; a and c must still resolve
        let (a, b, c) = (pid(1), pid(2), pid(3));

        let fetcher = MockFetcher::default()
            .with_page(&a, &[(&b, SPACE), (&c, SPACE)], &[])
            .with_page(&c, &[], &[])
            .failing(&b);

        let result = crawl(&a, SPACE, &fetcher, &CrawlOptions::default()).await;

        assert_eq!(result.len(), 3);
        assert!(result[&a].is_ok());
        assert!(result[&c].is_ok());

        match &result[&b] {
            PageEntry::Failed { reason } => assert!(reason.contains("simulated")),
            PageEntry::Fetched { .. } => panic!("expected a failure entry for b"),
        }
    }

    #[tokio::test]
    async fn test_concurrency_ceiling_is_respected() {
        // A seed with more children than the ceiling allows in flight
        let seed = pid(1);
        let children: Vec<String> = (2u32..10).map(pid).collect();
        let child_refs: Vec<(&str, &str)> =
            children.iter().map(|c| (c.as_str(), SPACE)).collect();

        let mut fetcher = MockFetcher::default().with_page(&seed, &child_refs, &[]);
        for child in &children {
            fetcher = fetcher.with_page(child, &[], &[]);
        }

        let options = CrawlOptions {
            concurrency: 3,
            ..CrawlOptions::default()
        };

        let result = crawl(&seed, SPACE, &fetcher, &options).await;

        assert_eq!(result.len(), 9);
        assert!(fetcher.max_active.load(Ordering::SeqCst) <= 3);
    }

    #[tokio::test]
    async fn test_concurrency_of_one_is_fully_serial() {
        let seed = pid(1);
        let (b, c) = (pid(2), pid(3));

        let fetcher = MockFetcher::default()
            .with_page(&seed, &[(&b, SPACE), (&c, SPACE)], &[])
            .with_page(&b, &[], &[])
            .with_page(&c, &[], &[]);

        let options = CrawlOptions {
            concurrency: 1,
            ..CrawlOptions::default()
        };

        crawl(&seed, SPACE, &fetcher, &options).await;

        assert_eq!(fetcher.max_active.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_collection_rows_are_traversed_only_when_enabled() {
        let (seed, row) = (pid(1), pid(2));

        let fetcher = MockFetcher::default()
            .with_page(&seed, &[], &[&row])
            .with_page(&row, &[], &[]);

        let off = CrawlOptions {
            traverse_collections: false,
            ..CrawlOptions::default()
        };

        let result = crawl(&seed, SPACE, &fetcher, &off).await;
        assert_eq!(result.len(), 1);
        assert!(!result.contains_key(&row));

        let result = crawl(&seed, SPACE, &fetcher, &CrawlOptions::default()).await;
        assert_eq!(result.len(), 2);
        assert!(result[&row].is_ok());
    }

    #[tokio::test]
    async fn test_self_referencing_page_is_fetched_once() {
        // Real record maps include the fetched page's own block, which is
        // page-typed and in our workspace; it must not reschedule itself
        let (a, b) = (pid(1), pid(2));

        let fetcher = MockFetcher::default()
            .with_page(&a, &[(&a, SPACE), (&b, SPACE)], &[])
            .with_page(&b, &[(&b, SPACE)], &[]);

        let result = crawl(&a, SPACE, &fetcher, &CrawlOptions::default()).await;

        assert_eq!(result.len(), 2);
        assert_eq!(fetcher.call_count(&a), 1);
        assert_eq!(fetcher.call_count(&b), 1);
    }

    #[tokio::test]
    async fn test_cyclic_graph_terminates() {
        // a -> b -> a: must produce exactly two entries, not loop forever
        let (a, b) = (pid(1), pid(2));

        let fetcher = MockFetcher::default()
            .with_page(&a, &[(&b, SPACE)], &[])
            .with_page(&b, &[(&a, SPACE)], &[]);

        let result = crawl(&a, SPACE, &fetcher, &CrawlOptions::default()).await;

        assert_eq!(result.len(), 2);
        assert_eq!(fetcher.call_count(&a), 1);
        assert_eq!(fetcher.call_count(&b), 1);
    }

    #[tokio::test]
    async fn test_malformed_seed_produces_empty_result() {
        let fetcher = MockFetcher::default();

        let result = crawl("not a page id", SPACE, &fetcher, &CrawlOptions::default()).await;

        assert!(result.is_empty());
        assert!(fetcher.calls().is_empty());
    }

    #[tokio::test]
    async fn test_failing_seed_still_occupies_a_result_slot() {
        // Scheduling happens before we know the fetch outcome, so even a
        // dead seed leaves a failure entry rather than an empty map
        let seed = pid(1);
        let fetcher = MockFetcher::default().failing(&seed);

        let result = crawl(&seed, SPACE, &fetcher, &CrawlOptions::default()).await;

        assert_eq!(result.len(), 1);
        assert!(!result[&seed].is_ok());
    }

    #[tokio::test]
    async fn test_panicking_fetcher_is_normalized_to_a_failure() {
        let (a, b, c) = (pid(1), pid(2), pid(3));

        let fetcher = MockFetcher::default()
            .with_page(&a, &[(&b, SPACE), (&c, SPACE)], &[])
            .with_page(&c, &[], &[])
            .panicking(&b);

        let result = crawl(&a, SPACE, &fetcher, &CrawlOptions::default()).await;

        assert_eq!(result.len(), 3);
        assert!(result[&a].is_ok());
        assert!(result[&c].is_ok());

        match &result[&b] {
            PageEntry::Failed { reason } => assert!(reason.contains("panicked")),
            PageEntry::Fetched { .. } => panic!("expected a failure entry for b"),
        }
    }

    #[tokio::test]
    async fn test_seed_id_is_normalized_before_fetching() {
        let seed = pid(1);
        let fetcher = MockFetcher::default().with_page(&seed, &[], &[]);

        // Hand the crawler the undashed form; the fetcher only knows the
        // canonical dashed id
        let bare = seed.replace('-', "");
        let result = crawl(&bare, SPACE, &fetcher, &CrawlOptions::default()).await;

        assert_eq!(result.len(), 1);
        assert!(result.contains_key(&seed));
        assert_eq!(fetcher.calls(), vec![seed]);
    }
}
