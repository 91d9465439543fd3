// src/notion/mod.rs
// =============================================================================
// This module handles everything Notion-specific.
//
// Submodules:
// - record: Typed model of a fetched page (blocks + collection queries)
// - client: HTTP client for the Notion v3 API, implementing PageFetcher
//
// This file (mod.rs) is the module root - it re-exports the public API that
// other parts of our application can use.
// =============================================================================

mod client;
mod record;

// Re-export public items from submodules
pub use client::NotionClient;
pub use record::{Block, BlockEntry, CollectionGroupResults, CollectionViewResult, PageRecord};
