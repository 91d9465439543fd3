// src/notion/client.rs
// =============================================================================
// This module fetches pages from the Notion v3 API.
//
// Strategy:
// - POST to /api/v3/loadPageChunk with the page id
// - The response carries a chunk of the page's record map plus a cursor
// - Keep requesting chunks until the cursor drains, merging as we go
// - Private pages need a token_v2 cookie; public pages work without one
//
// Why the v3 API?
// - It returns the full record map (blocks + collection query results),
//   which is exactly what the crawler needs to discover sub-pages
// - The official API would require one request per block subtree
//
// Rust concepts:
// - async functions: For network I/O
// - #[async_trait]: Lets NotionClient implement the PageFetcher trait
// =============================================================================

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use reqwest::{header, Client};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

use crate::crawl::PageFetcher;
use crate::notion::PageRecord;

// The public Notion API endpoint; tests point at something else
const DEFAULT_API_BASE: &str = "https://www.notion.so/api/v3";

// How many blocks to request per chunk (the web client uses 100 too)
const CHUNK_LIMIT: usize = 100;

// HTTP client for the Notion v3 API
//
// Cheap to share: reqwest's Client is an Arc around a connection pool, and
// the crawl engine calls fetch_page concurrently up to its bound.
pub struct NotionClient {
    client: Client,
    api_base: String,
    auth_token: Option<String>,
}

impl NotionClient {
    /// Creates a client against the public Notion API
    ///
    /// Pass a token_v2 value to access private pages; None works for
    /// publicly shared pages.
    pub fn new(auth_token: Option<String>) -> Result<Self> {
        Self::with_api_base(DEFAULT_API_BASE, auth_token)
    }

    /// Creates a client against a custom API base URL
    pub fn with_api_base(api_base: &str, auth_token: Option<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;

        Ok(Self {
            client,
            api_base: api_base.trim_end_matches('/').to_string(),
            auth_token,
        })
    }

    // Requests one chunk of a page's record map
    async fn load_page_chunk(
        &self,
        page_id: &str,
        chunk_number: usize,
        cursor: Cursor,
    ) -> Result<LoadPageChunkResponse> {
        let url = format!("{}/loadPageChunk", self.api_base);

        let body = LoadPageChunkRequest {
            page_id,
            limit: CHUNK_LIMIT,
            cursor,
            chunk_number,
            vertical_columns: false,
        };

        let mut request = self.client.post(&url).json(&body);

        // Private pages authenticate with the token_v2 session cookie
        if let Some(token) = &self.auth_token {
            request = request.header(header::COOKIE, format!("token_v2={token}"));
        }

        let response = request.send().await?;

        if !response.status().is_success() {
            return Err(anyhow!(
                "failed to load page {}: HTTP {}",
                page_id,
                response.status()
            ));
        }

        Ok(response.json().await?)
    }
}

#[async_trait]
impl PageFetcher for NotionClient {
    async fn fetch_page(&self, page_id: &str) -> Result<PageRecord> {
        let mut page = PageRecord::default();
        let mut cursor = Cursor::default();
        let mut chunk_number = 0;

        loop {
            let chunk = self.load_page_chunk(page_id, chunk_number, cursor).await?;
            let blocks_before = page.block.len();
            page.merge(chunk.record_map);
            chunk_number += 1;

            // Keep going only while the server says there is more AND the
            // last chunk actually added blocks (guards against looping on a
            // cursor that never drains)
            match chunk.cursor {
                Some(next) if !next.stack.is_empty() && page.block.len() > blocks_before => {
                    cursor = next;
                }
                _ => break,
            }
        }

        // An empty record map means the page doesn't exist or we can't see
        // it; surface that as a fetch failure rather than an empty page
        if page.block.is_empty() {
            return Err(anyhow!(
                "page {} returned no blocks (missing or access denied)",
                page_id
            ));
        }

        Ok(page)
    }
}

// Request body for loadPageChunk
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct LoadPageChunkRequest<'a> {
    page_id: &'a str,
    limit: usize,
    cursor: Cursor,
    chunk_number: usize,
    vertical_columns: bool,
}

// Pagination cursor; the stack's contents are opaque to us, we only care
// whether it's empty (drained) or not
#[derive(Debug, Default, Serialize, Deserialize)]
struct Cursor {
    #[serde(default)]
    stack: Vec<Value>,
}

// Response body for loadPageChunk
#[derive(Debug, Deserialize)]
struct LoadPageChunkResponse {
    #[serde(rename = "recordMap", default)]
    record_map: PageRecord,

    #[serde(default)]
    cursor: Option<Cursor>,
}
