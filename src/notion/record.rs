// src/notion/record.rs
// =============================================================================
// This module models the content of one fetched Notion page.
//
// The Notion v3 API returns a "record map": a JSON object mapping block ids
// to blocks, plus the results of any collection queries (database views)
// embedded in the page. We decode just the parts the crawler needs and keep
// the rest of each block's payload in `properties` untouched.
//
// The important part for crawling: a page references other pages in two ways.
// 1. Sub-page blocks ('page' / 'collection_view_page') inside its block map
// 2. Rows of embedded collection views, listed as block ids
// PageRecord computes both reference lists once, right after the fetch, so
// the crawl engine never pokes around in raw JSON.
//
// Rust concepts:
// - serde derive: Automatically generates JSON (de)serialization code
// - #[serde(rename)]: Maps Rust field names to the API's JSON names
// =============================================================================

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

// Block types that are themselves pages and therefore worth crawling into
const PAGE_BLOCK_TYPES: [&str; 2] = ["page", "collection_view_page"];

// One block inside a page's record map
//
// Blocks carry far more fields than this; we only decode what the crawler
// and the CLI summary need. Unknown fields are ignored by serde.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Block {
    #[serde(default)]
    pub id: String,

    /// Block type, e.g. "text", "page", "collection_view_page"
    #[serde(rename = "type", default)]
    pub block_type: String,

    /// The workspace this block belongs to - pages can reference pages in
    /// other workspaces, and we use this field to stay inside ours
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub space_id: Option<String>,

    /// Raw block properties (title text, etc.), kept as-is
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub properties: Option<Value>,

    /// Ids of this block's direct children
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<Vec<String>>,
}

impl Block {
    /// True for block types that stand for a page ('page' or
    /// 'collection_view_page')
    pub fn is_page(&self) -> bool {
        PAGE_BLOCK_TYPES.contains(&self.block_type.as_str())
    }
}

// The role/value envelope the API wraps every block in
//
// The value can be missing when the caller has no access to the block,
// so it's an Option here.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BlockEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Block>,
}

// The result of one collection view's query: the ids of its rows
//
// Older API responses put blockIds at the top level; newer ones nest them
// under collection_group_results. We accept both shapes.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CollectionViewResult {
    #[serde(rename = "blockIds", default, skip_serializing_if = "Option::is_none")]
    pub block_ids: Option<Vec<String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collection_group_results: Option<CollectionGroupResults>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CollectionGroupResults {
    #[serde(rename = "blockIds", default, skip_serializing_if = "Option::is_none")]
    pub block_ids: Option<Vec<String>>,
}

// The fetched content of one page
//
// Immutable once produced by the fetcher: the crawl engine only reads
// references out of it, it never mutates it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PageRecord {
    /// Block id -> block, for every block loaded with this page
    #[serde(default)]
    pub block: HashMap<String, BlockEntry>,

    /// Collection id -> view id -> query result, for every collection view
    /// embedded in this page
    #[serde(default)]
    pub collection_query: HashMap<String, HashMap<String, CollectionViewResult>>,
}

impl PageRecord {
    /// Merges another chunk of the same page into this record
    ///
    /// Large pages arrive in multiple chunks; earlier chunks win on
    /// conflicting ids (they shouldn't conflict in practice).
    pub fn merge(&mut self, other: PageRecord) {
        for (id, entry) in other.block {
            self.block.entry(id).or_insert(entry);
        }

        for (collection_id, views) in other.collection_query {
            let merged = self.collection_query.entry(collection_id).or_default();
            for (view_id, result) in views {
                merged.entry(view_id).or_insert(result);
            }
        }
    }

    /// Ids of every sub-page block in this page that belongs to the given
    /// workspace
    ///
    /// Blocks from other workspaces (or with no workspace at all) are
    /// excluded - following them would walk out of the workspace boundary.
    pub fn sub_page_ids(&self, space_id: &str) -> Vec<String> {
        self.block
            .iter()
            .filter(|(_, entry)| {
                entry
                    .value
                    .as_ref()
                    .is_some_and(|block| block.is_page() && block.space_id.as_deref() == Some(space_id))
            })
            .map(|(id, _)| id.clone())
            .collect()
    }

    /// Ids of every collection row listed by the page's embedded views
    ///
    /// Rows are returned as plain page ids regardless of their underlying
    /// block type; they may themselves contain sub-pages.
    pub fn collection_row_ids(&self) -> Vec<String> {
        self.collection_query
            .values()
            .flat_map(|views| views.values())
            .flat_map(|result| {
                let direct = result.block_ids.iter().flatten();
                let grouped = result
                    .collection_group_results
                    .iter()
                    .flat_map(|group| group.block_ids.iter().flatten());
                direct.chain(grouped).cloned().collect::<Vec<_>>()
            })
            .collect()
    }

    // The page's own block, i.e. the one keyed by the id it was fetched as
    //
    // The record map also carries sub-page blocks (including links into
    // other workspaces), so anything describing *this* page must read its
    // own block, not whichever page-like block a map scan happens to yield.
    fn root_block(&self, page_id: &str) -> Option<&Block> {
        self.block.get(page_id)?.value.as_ref()
    }

    /// The workspace id of this page, read from its own block
    ///
    /// Used by the CLI to auto-detect the workspace when the user doesn't
    /// pass one explicitly. Falls back to scanning for any page block that
    /// knows its workspace only when the page's own block is missing.
    pub fn space_id(&self, page_id: &str) -> Option<String> {
        if let Some(space_id) = self.root_block(page_id).and_then(|block| block.space_id.clone()) {
            return Some(space_id);
        }

        self.block
            .values()
            .filter_map(|entry| entry.value.as_ref())
            .find(|block| block.is_page() && block.space_id.is_some())
            .and_then(|block| block.space_id.clone())
    }

    /// The page's title as plain text, if we can find one
    ///
    /// Reads this page's own block; falls back to the first titled page
    /// block only when the own block is missing or untitled.
    pub fn title(&self, page_id: &str) -> Option<String> {
        if let Some(title) = self.root_block(page_id).and_then(block_title) {
            return Some(title);
        }

        self.block
            .values()
            .filter_map(|entry| entry.value.as_ref())
            .filter(|block| block.is_page())
            .find_map(block_title)
    }
}

// The plain-text title of one block, if it has title properties
fn block_title(block: &Block) -> Option<String> {
    let title = block.properties.as_ref()?.get("title")?;
    plain_text(title)
}

// Flattens Notion rich text into a plain string
//
// Rich text is an array of segments; each segment is an array whose first
// element is the text and whose optional second element holds formatting
// we don't care about here.
fn plain_text(rich_text: &Value) -> Option<String> {
    let segments = rich_text.as_array()?;

    let text: String = segments
        .iter()
        .filter_map(|segment| segment.get(0))
        .filter_map(Value::as_str)
        .collect();

    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}
