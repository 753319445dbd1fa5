//! Deterministic identity digests for candidate items.
//!
//! The primary fingerprint is a SHA-256 over the normalized origin URL and
//! is the dedup key: two candidates with the same fingerprint map to at
//! most one non-terminal job. The secondary key (title + source name) is
//! advisory only — it flags a possible duplicate, it never merges jobs.

use crate::domain::CandidateItem;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Query parameters that carry tracking state, not identity.
const TRACKING_PARAMS: &[&str] = &["fbclid", "gclid", "ref", "mc_cid", "mc_eid", "igshid"];

/// Deterministic identity digest for a candidate item.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Returns the hex digest as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Advisory fuzzy dedup key derived from title and source name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SecondaryKey(String);

impl SecondaryKey {
    /// Returns the key as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SecondaryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Computes the primary fingerprint for a candidate.
///
/// Pure and deterministic: no side effects, no I/O.
pub fn fingerprint(candidate: &CandidateItem) -> Fingerprint {
    let normalized = normalize_url(&candidate.origin_url);
    let mut hasher = Sha256::new();
    hasher.update(normalized.as_bytes());
    Fingerprint(format!("{:x}", hasher.finalize()))
}

/// Computes the advisory secondary key, when both title and source name
/// are present.
pub fn secondary_key(candidate: &CandidateItem) -> Option<SecondaryKey> {
    let title = candidate.display_title.as_deref()?;
    let source = candidate.source_name.as_deref()?;

    let title = fold_text(title);
    let source = fold_text(source);
    if title.is_empty() || source.is_empty() {
        return None;
    }

    Some(SecondaryKey(format!("{}|{}", title, source)))
}

/// Lowercases, strips punctuation, and collapses whitespace.
fn fold_text(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut pending_space = false;
    for ch in input.chars() {
        if ch.is_alphanumeric() {
            if pending_space && !out.is_empty() {
                out.push(' ');
            }
            pending_space = false;
            out.extend(ch.to_lowercase());
        } else {
            pending_space = true;
        }
    }
    out
}

/// Normalizes a URL for identity comparison.
///
/// Lowercases scheme and host, elides default ports, drops the fragment,
/// strips tracking query parameters, and collapses trailing slashes.
pub fn normalize_url(raw: &str) -> String {
    let trimmed = raw.trim();

    // Fragments never contribute to identity.
    let without_fragment = trimmed.split('#').next().unwrap_or_default();

    let (scheme, rest) = match without_fragment.split_once("://") {
        Some((s, r)) => (s.to_ascii_lowercase(), r),
        None => ("https".to_string(), without_fragment),
    };

    let (authority, path_and_query) = match rest.find('/') {
        Some(idx) => (&rest[..idx], &rest[idx..]),
        None => (rest, ""),
    };

    let mut host = authority.to_ascii_lowercase();
    let default_port = match scheme.as_str() {
        "http" => ":80",
        "https" => ":443",
        _ => "",
    };
    if !default_port.is_empty() {
        if let Some(stripped) = host.strip_suffix(default_port) {
            host = stripped.to_string();
        }
    }

    let (path, query) = match path_and_query.split_once('?') {
        Some((p, q)) => (p, Some(q)),
        None => (path_and_query, None),
    };

    let path = path.trim_end_matches('/');

    let query = query.map(strip_tracking_params).filter(|q| !q.is_empty());

    match query {
        Some(q) => format!("{}://{}{}?{}", scheme, host, path, q),
        None => format!("{}://{}{}", scheme, host, path),
    }
}

/// Removes tracking parameters from a query string, preserving order.
fn strip_tracking_params(query: &str) -> String {
    query
        .split('&')
        .filter(|pair| {
            let key = pair.split('=').next().unwrap_or_default();
            let key = key.to_ascii_lowercase();
            !key.starts_with("utm_") && !TRACKING_PARAMS.contains(&key.as_str())
        })
        .collect::<Vec<_>>()
        .join("&")
}
