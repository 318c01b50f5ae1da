//! Keyword matching and tag derivation.
//!
//! Matching is done on normalized text: compatibility decomposition folds
//! full-width and other presentation forms, combining marks are dropped,
//! and the result is recomposed (so Hangul syllables survive) and lowercased.
//! The same normalization is applied to keywords, so `ＰＡＩＰＴＲＥＥ`,
//! `Paiptree` and `paiptree` all match the keyword `paiptree`.

use crate::models::{ArticleCandidate, RawEntry};
use crate::utils::strip_html;
use unicode_normalization::UnicodeNormalization;
use unicode_normalization::char::is_combining_mark;

/// Fold text for case-, width- and diacritic-insensitive comparison.
pub fn normalize_text(s: &str) -> String {
    let stripped: String = s.nfkd().filter(|c| !is_combining_mark(*c)).collect();
    stripped.nfc().collect::<String>().to_lowercase()
}

#[derive(Debug, Clone)]
struct Keyword {
    display: String,
    normalized: String,
    priority: bool,
}

/// Which configured keywords an entry mentions, and where.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeywordMatch {
    /// Matched keywords in tag order.
    pub keywords: Vec<String>,
    /// Subset of `keywords` found in the title.
    pub in_title: Vec<String>,
}

/// Deterministic keyword filter with tag ranking.
///
/// Tag order: priority keywords first, then keywords present in the title,
/// then keywords present only in the body; ties keep configuration order.
/// Keywords that normalize to the same text are reported once, under the
/// first spelling configured.
#[derive(Debug, Clone)]
pub struct KeywordMatcher {
    keywords: Vec<Keyword>,
}

impl KeywordMatcher {
    pub fn new(keywords: &[String], priority_keywords: &[String]) -> Self {
        let priority: Vec<String> = priority_keywords.iter().map(|k| normalize_text(k)).collect();
        let mut seen = std::collections::HashSet::new();
        let keywords = keywords
            .iter()
            .filter_map(|k| {
                let normalized = normalize_text(k.trim());
                if normalized.is_empty() || !seen.insert(normalized.clone()) {
                    return None;
                }
                Some(Keyword {
                    display: k.trim().to_string(),
                    priority: priority.contains(&normalized),
                    normalized,
                })
            })
            .collect();
        Self { keywords }
    }

    /// Match keywords against a title and body.
    ///
    /// # Arguments
    ///
    /// * `title` - plain-text title
    /// * `body` - plain-text description; markup must already be stripped,
    ///   otherwise keywords inside attributes would count as mentions
    ///
    /// # Returns
    ///
    /// `None` when no keyword occurs in either text. Otherwise the matched
    /// keywords in tag order, plus the subset found in the title.
    pub fn find(&self, title: &str, body: &str) -> Option<KeywordMatch> {
        let title = normalize_text(title);
        let body = normalize_text(body);

        let mut hits: Vec<(usize, &Keyword, bool)> = self
            .keywords
            .iter()
            .enumerate()
            .filter_map(|(idx, kw)| {
                let in_title = title.contains(&kw.normalized);
                (in_title || body.contains(&kw.normalized)).then_some((idx, kw, in_title))
            })
            .collect();

        if hits.is_empty() {
            return None;
        }

        hits.sort_by_key(|(idx, kw, in_title)| (!kw.priority, !*in_title, *idx));

        Some(KeywordMatch {
            keywords: hits.iter().map(|(_, kw, _)| kw.display.clone()).collect(),
            in_title: hits
                .iter()
                .filter(|(_, _, in_title)| *in_title)
                .map(|(_, kw, _)| kw.display.clone())
                .collect(),
        })
    }

    /// Turn a feed entry into a candidate, or drop it when no keyword matches.
    ///
    /// Title and description are stripped of markup first, so every tag
    /// occurs in the text that gets stored.
    pub fn candidate(&self, entry: RawEntry, original_url: String) -> Option<ArticleCandidate> {
        let title = strip_html(&entry.title);
        let description = strip_html(&entry.description);
        let found = self.find(&title, &description)?;
        Some(ArticleCandidate {
            title,
            description,
            source_name: entry.source_name,
            published_at: entry.published_at,
            original_url,
            matched_keywords: found.keywords,
            image_url: entry.image_url,
        })
    }
}
