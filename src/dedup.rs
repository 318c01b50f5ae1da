//! Cross-run and in-run duplicate detection.
//!
//! Two keys identify a story:
//! - the **URL key**: the link with tracking parameters and fragment removed,
//!   scheme/host lowercased, `www.` and trailing slash dropped
//! - the **fingerprint**: a hash of the normalized title, which catches the
//!   same story syndicated under different URLs
//!
//! The filter is loaded once per run with the URLs and title fingerprints
//! already in the store, then walks candidates in order. Accepted candidates
//! add both keys to the in-run sets; nothing is ever un-accepted. A candidate
//! rejected as already stored still registers its fingerprint, so a
//! syndicated copy of a stored story stays rejected on every later run.
//! Titles with no letters or digits have no fingerprint and are keyed by URL
//! alone.

use crate::matcher::normalize_text;
use crate::models::ArticleCandidate;
use crate::store::StoredKey;
use once_cell::sync::Lazy;
use regex::Regex;
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use tracing::debug;
use url::Url;

/// Query parameters that only carry campaign or click tracking.
const TRACKING_PARAMS: &[&str] = &[
    "fbclid", "gclid", "dclid", "msclkid", "igshid", "mc_cid", "mc_eid", "_ga", "ref", "ref_src",
];

/// Leading `[속보]`, `(종합)`, `【단독】` style labels news desks prepend to titles.
static TITLE_LABELS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*(?:[\[\(【][^\]\)】]{1,12}[\]\)】]\s*)+").unwrap());

fn is_tracking_param(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    lower.starts_with("utm_") || TRACKING_PARAMS.contains(&lower.as_str())
}

/// Remove the fragment and tracking parameters, keeping identity-bearing ones.
///
/// Returns the input trimmed when it does not parse as an absolute URL.
pub fn canonical_url(raw: &str) -> String {
    let raw = raw.trim();
    let Ok(mut url) = Url::parse(raw) else {
        return raw.to_string();
    };
    url.set_fragment(None);

    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(k, _)| !is_tracking_param(k))
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    if kept.is_empty() {
        url.set_query(None);
    } else {
        url.query_pairs_mut().clear().extend_pairs(kept);
    }
    url.to_string()
}

/// The URL component of a dedup key.
pub fn url_key(raw: &str) -> String {
    let canonical = canonical_url(raw);
    let Ok(mut url) = Url::parse(&canonical) else {
        return canonical.to_lowercase();
    };
    if let Some(host) = url.host_str() {
        let host = host.trim_start_matches("www.").to_string();
        let _ = url.set_host(Some(&host));
    }
    // http and https copies of a story are the same story
    let _ = url.set_scheme("https");
    let mut key = url.to_string();
    if url.query().is_none() && key.ends_with('/') {
        key.pop();
    }
    key
}

/// Content fingerprint of a title: 16 hex chars of SHA-256 over the
/// normalized, label-stripped, alphanumeric-only title.
///
/// `None` when nothing alphanumeric is left, e.g. an empty title or one that
/// is only a desk label.
pub fn fingerprint(title: &str) -> Option<String> {
    let normalized = normalize_text(title);
    let unlabeled = TITLE_LABELS.replace(&normalized, "");
    let compact: String = unlabeled.chars().filter(|c| c.is_alphanumeric()).collect();
    if compact.is_empty() {
        return None;
    }
    let digest = Sha256::digest(compact.as_bytes());
    Some(hex::encode(&digest[..8]))
}

/// Why a candidate was turned away.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    /// The URL, or the story under another URL, is already in the store.
    Seen,
    /// Same URL or same story already accepted earlier in this run.
    DuplicateInRun,
}

/// Single-pass filter over one run's candidates.
#[derive(Debug, Default)]
pub struct DedupFilter {
    seen_urls: HashSet<String>,
    seen_fingerprints: HashSet<String>,
    accepted_urls: HashSet<String>,
    accepted_fingerprints: HashSet<String>,
}

impl DedupFilter {
    /// Seed the filter with the keys of every stored record.
    pub fn new<'a, I>(existing: I) -> Self
    where
        I: IntoIterator<Item = &'a StoredKey>,
    {
        let mut filter = Self::default();
        for stored in existing {
            let url = stored.original_url.trim();
            if url.is_empty() {
                continue;
            }
            filter.seen_urls.insert(url_key(url));
            filter.seen_fingerprints.extend(fingerprint(&stored.title));
        }
        filter
    }

    /// Number of distinct stored URLs.
    pub fn seen_count(&self) -> usize {
        self.seen_urls.len()
    }

    /// Accept or reject the next candidate.
    ///
    /// # Arguments
    ///
    /// * `candidate` - the next candidate, in the run's chronological order
    ///
    /// # Returns
    ///
    /// `Ok(())` when the candidate is new. Its URL key and fingerprint are then
    /// recorded, so later copies in the same run are rejected.
    ///
    /// # Errors
    ///
    /// * [`Rejection::Seen`] - its URL or title fingerprint is already stored
    /// * [`Rejection::DuplicateInRun`] - an earlier candidate of this run has the same URL key or fingerprint
    pub fn admit(&mut self, candidate: &ArticleCandidate) -> Result<(), Rejection> {
        let key = url_key(&candidate.original_url);
        let print = fingerprint(&candidate.title);
        let stored_story = print
            .as_ref()
            .is_some_and(|p| self.seen_fingerprints.contains(p));

        if self.seen_urls.contains(&key) || stored_story {
            debug!(url = %candidate.original_url, ?print, "Already in store");
            self.seen_fingerprints.extend(print);
            return Err(Rejection::Seen);
        }
        let repeated_story = print
            .as_ref()
            .is_some_and(|p| self.accepted_fingerprints.contains(p));
        if self.accepted_urls.contains(&key) || repeated_story {
            debug!(url = %candidate.original_url, ?print, "Duplicate within run");
            return Err(Rejection::DuplicateInRun);
        }
        self.accepted_urls.insert(key);
        self.accepted_fingerprints.extend(print);
        Ok(())
    }
}
