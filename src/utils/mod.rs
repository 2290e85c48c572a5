//! Utility functions and helpers.

pub mod html;

use std::path::Path;

use percent_encoding::percent_decode_str;

/// Characters dropped from titles before slugging.
const SLUG_REMOVE: &[char] = &['*', '+', '~', '.', '(', ')', '\'', '"', '!', ':', '@'];

/// Build a URL slug from a title.
///
/// Lower-cases, turns whitespace runs into `-`, drops punctuation and
/// collapses repeated dashes.
pub fn slugify(title: &str) -> String {
    let mut slug = String::with_capacity(title.len());
    let mut pending_dash = false;

    for c in title.chars() {
        if SLUG_REMOVE.contains(&c) {
            continue;
        }
        if c.is_whitespace() || c == '-' || c == '_' {
            pending_dash = !slug.is_empty();
            continue;
        }
        if !c.is_alphanumeric() {
            continue;
        }
        if pending_dash {
            slug.push('-');
            pending_dash = false;
        }
        slug.extend(c.to_lowercase());
    }
    slug
}

/// Recover the legacy identifier from an export filename.
///
/// `Some-Page_123456.html` yields `123456`. Names without the numeric
/// suffix fall back to their stem so every file keeps a stable key.
pub fn previous_id(filename: &str) -> String {
    let name = file_name(filename);
    let stem = name.strip_suffix(".html").unwrap_or(name);
    match stem.rsplit_once('_') {
        Some((_, digits)) if !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()) => {
            digits.to_string()
        }
        _ => stem.to_string(),
    }
}

/// Last path segment of an href or path, without query or fragment.
pub fn file_name(href: &str) -> &str {
    let href = strip_query(href);
    href.rsplit('/').next().unwrap_or(href)
}

/// Drop `?query` and `#fragment` parts from an href.
pub fn strip_query(href: &str) -> &str {
    let end = href.find(['?', '#']).unwrap_or(href.len());
    &href[..end]
}

/// Canonical form of a local attachment href: no query or fragment,
/// percent-decoded. Manifest keys and rewritten page bodies both use it.
pub fn attachment_path(href: &str) -> String {
    percent_decode_str(strip_query(href))
        .decode_utf8_lossy()
        .into_owned()
}

/// Guess an image MIME type from a filename.
pub fn mime_for(filename: &str) -> &'static str {
    let ext = Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();

    match ext.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "svg" => "image/svg+xml",
        _ => "application/octet-stream",
    }
}

/// Strip a `Space : ` prefix from an exported page title.
pub fn clean_title(raw: &str) -> String {
    let trimmed = raw.trim();
    match trimmed.split_once(" : ") {
        Some((_, rest)) => rest.trim().to_string(),
        None => trimmed.to_string(),
    }
}
