// src/page_id.rs
// =============================================================================
// This module normalizes raw Notion page identifiers.
//
// Users hand us page ids in many shapes:
// - Bare 32-char hex ids:   067dd719a912471ea9a3ac10710e7fdf
// - Dashed UUIDs:           067dd719-a912-471e-a9a3-ac10710e7fdf
// - Shared page URLs:       https://notion.so/My-Page-067dd719a912471ea9a3ac10710e7fdf?pvs=4
//
// All of them normalize to one canonical form: the lowercase dashed UUID.
// Everything downstream (the crawl engine, the result map) works only with
// canonical ids, so two differently-formatted references to the same page
// always compare equal.
//
// Rust concepts:
// - Option<T>: "maybe a value" - None means the input wasn't a page id
// - String slicing with .get(): safe substring access that can't panic
// =============================================================================

use url::Url;

// Normalizes a raw page identifier to the canonical dashed UUID form
//
// Returns None if the input is not a well-formed page id in any of the
// accepted shapes. This function is pure: same input, same output, no I/O.
//
// Examples:
//   "067dd719a912471ea9a3ac10710e7fdf"   -> Some("067dd719-a912-471e-a9a3-ac10710e7fdf")
//   "https://notion.so/Page-067dd719..." -> Some("067dd719-a912-471e-a9a3-ac10710e7fdf")
//   "not a page id"                      -> None
pub fn parse_page_id(raw: &str) -> Option<String> {
    let raw = raw.trim();

    // Strip any query string (shared links often carry ?v=... or ?pvs=...)
    let raw = raw.split('?').next().unwrap_or_default();
    if raw.is_empty() {
        return None;
    }

    // The easy cases: the whole input is already an id
    if let Some(id) = canonicalize(raw) {
        return Some(id);
    }

    // URL forms: the id is embedded in the final path segment, after the
    // last dash (e.g. /My-Page-Title-<32 hex chars>)
    let segment = if let Ok(url) = Url::parse(raw) {
        url.path_segments()?
            .filter(|s| !s.is_empty())
            .last()?
            .to_string()
    } else {
        // Not an absolute URL; treat the input itself as a path
        raw.trim_end_matches('/').rsplit('/').next()?.to_string()
    };

    if let Some(id) = canonicalize(&segment) {
        return Some(id);
    }

    // Slugs append the id to the title: "My-Page-Title-<id>"
    // Try the tail of the segment in both id widths. .get() returns None
    // instead of panicking if we'd slice through a multi-byte character.
    for width in [32, 36] {
        if segment.len() > width {
            if let Some(id) = segment.get(segment.len() - width..).and_then(canonicalize) {
                return Some(id);
            }
        }
    }

    None
}

// Canonicalizes a candidate that should be exactly one id (no surrounding text)
fn canonicalize(candidate: &str) -> Option<String> {
    if is_bare_id(candidate) {
        return Some(dashify(&candidate.to_ascii_lowercase()));
    }

    if is_dashed_id(candidate) {
        return Some(candidate.to_ascii_lowercase());
    }

    None
}

// A bare id is exactly 32 hex digits
fn is_bare_id(s: &str) -> bool {
    s.len() == 32 && s.chars().all(|c| c.is_ascii_hexdigit())
}

// A dashed id is the standard UUID layout: 8-4-4-4-12 with dashes between
fn is_dashed_id(s: &str) -> bool {
    if s.len() != 36 {
        return false;
    }

    s.char_indices().all(|(i, c)| match i {
        8 | 13 | 18 | 23 => c == '-',
        _ => c.is_ascii_hexdigit(),
    })
}

// Inserts dashes into a 32-char hex id to produce the UUID layout
//
// Callers guarantee the input is exactly 32 ASCII hex digits, so the
// byte-index slicing here is always on a character boundary.
fn dashify(s: &str) -> String {
    format!(
        "{}-{}-{}-{}-{}",
        &s[0..8],
        &s[8..12],
        &s[12..16],
        &s[16..20],
        &s[20..32]
    )
}
