// src/main.rs
// =============================================================================
// This is the entry point of our CLI application.
//
// What happens here:
// 1. Parse command-line arguments using clap
// 2. Dispatch to the appropriate subcommand handler
// 3. Run the crawl (or single-page fetch) and print the results
// 4. Exit with proper code (0 = success, 1 = some pages failed, 2 = error)
// =============================================================================

// Module declarations - tells Rust about our other source files
mod cli; // src/cli.rs - command-line parsing
mod crawl; // src/crawl/ - the workspace crawl engine
mod notion; // src/notion/ - page data model + Notion API client
mod page_id; // src/page_id.rs - page identifier normalization

use anyhow::{anyhow, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use cli::{Cli, Commands};
use crawl::{CrawlOptions, CrawlResult, PageFetcher};
use notion::NotionClient;
use page_id::parse_page_id;

// The #[tokio::main] attribute creates a tokio runtime and runs our async
// code inside it
#[tokio::main]
async fn main() {
    // Engine logs (like per-page fetch failures) go to stderr and are
    // controlled with RUST_LOG; table output stays clean on stdout
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let exit_code = match run().await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {}", e);
            2
        }
    };

    std::process::exit(exit_code);
}

// This is the main application logic
// Returns:
//   Ok(0) = everything fetched successfully
//   Ok(1) = crawl finished but some pages failed to fetch
//   Ok(2) = internal error
async fn run() -> Result<i32> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Map {
            page,
            space,
            concurrency,
            skip_collections,
            json,
            token,
        } => handle_map(&page, space, concurrency, skip_collections, json, token).await,
        Commands::Page { page, json, token } => handle_page(&page, json, token).await,
    }
}

// Handles the 'map' subcommand: crawl the workspace from a seed page
async fn handle_map(
    page: &str,
    space: Option<String>,
    concurrency: usize,
    skip_collections: bool,
    json: bool,
    token: Option<String>,
) -> Result<i32> {
    let seed = parse_page_id(page)
        .ok_or_else(|| anyhow!("'{}' is not a valid page id or page URL", page))?;

    let client = NotionClient::new(token)?;

    // Figure out which workspace scopes the crawl. If the user didn't pass
    // one, read it off the seed page - the same shortcut the web app uses.
    let space_id = match space {
        Some(space_id) => space_id,
        None => {
            if !json {
                println!("🔎 Detecting workspace from seed page...");
            }

            let seed_page = client.fetch_page(&seed).await?;
            seed_page.space_id(&seed).ok_or_else(|| {
                anyhow!("could not detect a workspace id from the seed page; pass --space")
            })?
        }
    };

    if !json {
        println!("🗺️  Crawling workspace {} from page {}\n", space_id, seed);
    }

    let options = CrawlOptions {
        concurrency,
        traverse_collections: !skip_collections,
    };

    let result = crawl::crawl(&seed, &space_id, &client, &options).await;

    print_results(&result, json)?;

    // Count pages that couldn't be fetched
    let failed_count = result.values().filter(|entry| !entry.is_ok()).count();

    if failed_count > 0 {
        Ok(1) // Exit code 1 = crawl finished with failures
    } else {
        Ok(0) // Exit code 0 = all pages mapped
    }
}

// Handles the 'page' subcommand: fetch and summarize one page
async fn handle_page(page: &str, json: bool, token: Option<String>) -> Result<i32> {
    let page_id = parse_page_id(page)
        .ok_or_else(|| anyhow!("'{}' is not a valid page id or page URL", page))?;

    let client = NotionClient::new(token)?;
    let record = client.fetch_page(&page_id).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&record)?);
        return Ok(0);
    }

    println!("📄 Page {}", page_id);
    println!(
        "   Title: {}",
        record
            .title(&page_id)
            .unwrap_or_else(|| "(untitled)".to_string())
    );

    if let Some(space_id) = record.space_id(&page_id) {
        println!("   Workspace: {}", space_id);

        let sub_pages = record.sub_page_ids(&space_id);
        println!("   Sub-pages: {}", sub_pages.len());
        for sub_page_id in &sub_pages {
            println!("     - {}", sub_page_id);
        }
    }

    println!("   Blocks: {}", record.block.len());

    let rows = record.collection_row_ids();
    if !rows.is_empty() {
        println!("   Collection rows: {}", rows.len());
    }

    Ok(0)
}

// Prints the crawl result either as a table or as JSON
fn print_results(result: &CrawlResult, json: bool) -> Result<()> {
    if json {
        // Serialize the whole result map and print
        let json_output = serde_json::to_string_pretty(result)?;
        println!("{}", json_output);
    } else {
        // Print human-readable table
        print_table(result);
    }
    Ok(())
}

// Prints the crawl result as a human-readable table in the terminal
fn print_table(result: &CrawlResult) {
    // Print table header
    println!(
        "{:<38} {:<35} {:<10} {:<30}",
        "PAGE", "PATH", "STATUS", "TITLE"
    );
    println!("{}", "=".repeat(115));

    // Sort by page id for stable output; HashMap iteration order isn't
    let mut entries: Vec<_> = result.iter().collect();
    entries.sort_by(|a, b| a.0.cmp(b.0));

    for (page_id, entry) in entries {
        let status = if entry.is_ok() { "✅ OK" } else { "❌ FAILED" };

        let title = entry
            .page()
            .and_then(|page| page.title(page_id))
            .unwrap_or_default();

        println!(
            "{:<38} {:<35} {:<10} {:<30}",
            page_id,
            page_path(page_id),
            status,
            title
        );
    }

    println!();

    // Print summary
    let ok_count = result.values().filter(|entry| entry.is_ok()).count();
    let failed_count = result.len() - ok_count;

    println!("📊 Summary:");
    println!("   ✅ Mapped: {}", ok_count);
    println!("   ❌ Failed: {}", failed_count);
    println!("   📋 Total: {}", result.len());
}

// Maps a page id to the output path site generation would serve it at
// (the undashed id as a single path segment)
fn page_path(page_id: &str) -> String {
    format!("/{}", page_id.replace('-', ""))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_path_strips_dashes() {
        assert_eq!(
            page_path("067dd719-a912-471e-a9a3-ac10710e7fdf"),
            "/067dd719a912471ea9a3ac10710e7fdf"
        );
    }
}
