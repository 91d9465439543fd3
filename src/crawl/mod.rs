// src/crawl/mod.rs
// =============================================================================
// This module contains the workspace crawl engine.
//
// Features:
// - Visits every page reachable from a seed page, exactly once
// - Bounded concurrency: at most N page fetches in flight at a time
// - Stays inside one workspace (cross-workspace references are dropped)
// - A page that fails to fetch is recorded as a failure and the crawl
//   keeps going; one bad page never aborts the traversal
//
// Why crawl?
// - Pages reference other pages (sub-pages, collection rows) and the graph
//   is only revealed as pages are fetched
// - Downstream tooling (static site generation) needs the full page map
//   up front to know which paths to generate
// =============================================================================

mod engine;

// Re-export the public API
pub use engine::{crawl, CrawlOptions, CrawlResult, PageEntry, PageFetcher};
