// src/cli.rs
// =============================================================================
// This file defines our command-line interface using the `clap` crate.
//
// We use the "derive" API which lets us define the CLI structure using
// Rust structs and attributes. clap generates all the parsing, help text,
// and error messages from these definitions.
// =============================================================================

use clap::{Parser, Subcommand};

// This struct represents our entire CLI application
#[derive(Parser, Debug)]
#[command(
    name = "notion-atlas",
    version = "0.1.0",
    about = "A CLI tool to crawl a Notion workspace and map every reachable page",
    long_about = "notion-atlas crawls a Notion workspace starting from a seed page and maps every \
                  page reachable from it. The resulting page map is what static-site tooling needs \
                  to pre-generate one output path per discoverable page."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

// This enum defines our subcommands (map, page)
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Crawl the workspace and map every page reachable from a seed page
    ///
    /// Example: notion-atlas map 067dd719a912471ea9a3ac10710e7fdf --concurrency 8
    Map {
        /// Seed page: a page id, dashed UUID, or shared page URL
        page: String,

        /// Workspace id scoping the crawl
        ///
        /// Pages can reference pages in other workspaces; the crawl never
        /// follows those. When omitted, the workspace is auto-detected
        /// from the seed page.
        #[arg(long)]
        space: Option<String>,

        /// Maximum number of page fetches in flight at once
        #[arg(long, default_value_t = 4)]
        concurrency: usize,

        /// Don't traverse the rows of embedded collection views
        ///
        /// Collection rows are pages too, but crawling a large database
        /// can be expensive - this flag limits the crawl to direct
        /// sub-page links.
        #[arg(long)]
        skip_collections: bool,

        /// Output the full result map as JSON instead of a table
        #[arg(long)]
        json: bool,

        /// Notion token_v2 cookie value, for crawling private pages
        #[arg(long, env = "NOTION_TOKEN", hide_env_values = true)]
        token: Option<String>,
    },

    /// Fetch a single page and summarize its contents
    ///
    /// Example: notion-atlas page https://notion.so/My-Page-067dd719a912471ea9a3ac10710e7fdf
    Page {
        /// Page to fetch: a page id, dashed UUID, or shared page URL
        page: String,

        /// Output the raw page record as JSON instead of a summary
        #[arg(long)]
        json: bool,

        /// Notion token_v2 cookie value, for private pages
        #[arg(long, env = "NOTION_TOKEN", hide_env_values = true)]
        token: Option<String>,
    },
}
