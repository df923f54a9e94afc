use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Words up to this many characters don't count as significant
const SHORT_WORD_CHARS: usize = 3;

const TITLE_WEIGHT: f32 = 0.7;

/// Per-source text match thresholds. An author threshold of `0.0`
/// disables the author check, for sources whose listings carry no author.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
pub struct MatchThresholds {
    #[serde(default = "default_title_threshold")]
    pub title: f32,
    #[serde(default = "default_author_threshold")]
    pub author: f32,
}

impl MatchThresholds {
    pub fn new(title: f32, author: f32) -> Self {
        Self { title, author }
    }
}

impl Default for MatchThresholds {
    fn default() -> Self {
        Self {
            title: default_title_threshold(),
            author: default_author_threshold(),
        }
    }
}

fn default_title_threshold() -> f32 {
    0.5
}

fn default_author_threshold() -> f32 {
    0.3
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MatchScore {
    pub title: f32,
    /// None when the author check did not apply
    pub author: Option<f32>,
    pub accepted: bool,
}

impl MatchScore {
    /// Weighted title/author overlap in [0, 1]
    pub fn relevance(&self) -> f32 {
        let score = match self.author {
            Some(author) => TITLE_WEIGHT * self.title + (1.0 - TITLE_WEIGHT) * author,
            None => self.title,
        };
        score.clamp(0.0, 1.0)
    }
}

/// Lowercase, alphanumerics only, single spaces. Apostrophes and
/// punctuation split words ("L'amica" -> "l amica").
pub fn normalize_text(value: &str) -> String {
    let mut normalized = String::with_capacity(value.len());
    for ch in value.chars() {
        if ch.is_alphanumeric() {
            normalized.extend(ch.to_lowercase());
        } else {
            normalized.push(' ');
        }
    }
    normalized.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn words(value: &str) -> HashSet<String> {
    normalize_text(value)
        .split_whitespace()
        .map(str::to_string)
        .collect()
}

fn significant(words: &HashSet<String>) -> HashSet<String> {
    words
        .iter()
        .filter(|w| w.chars().count() > SHORT_WORD_CHARS)
        .cloned()
        .collect()
}

/// Share of the query title's significant words found in `candidate`.
/// Titles made only of short words fall back to all words.
pub fn title_overlap(query: &str, candidate: &str) -> f32 {
    let query_words = words(query);
    let candidate_words = words(candidate);
    if query_words.is_empty() || candidate_words.is_empty() {
        return 0.0;
    }

    let mut base = significant(&query_words);
    if base.is_empty() {
        base = query_words;
    }

    let shared = base.intersection(&candidate_words).count();
    shared as f32 / base.len() as f32
}

/// Share of the query author's words found in `candidate`
pub fn author_overlap(query: &str, candidate: &str) -> f32 {
    let query_words = words(query);
    let candidate_words = words(candidate);
    if query_words.is_empty() || candidate_words.is_empty() {
        return 0.0;
    }

    let shared = query_words.intersection(&candidate_words).count();
    shared as f32 / query_words.len() as f32
}

fn shares_significant_word(query: &str, candidate: &str) -> bool {
    let candidate_words = words(candidate);
    significant(&words(query))
        .iter()
        .any(|w| candidate_words.contains(w))
}

/// Match filter for a search result. The title must overlap at least
/// `thresholds.title`; the author must overlap at least
/// `thresholds.author` or share one significant word.
pub fn evaluate(
    query_title: &str,
    query_author: &str,
    result_title: &str,
    result_author: Option<&str>,
    thresholds: &MatchThresholds,
) -> MatchScore {
    let title = title_overlap(query_title, result_title);
    let title_ok = title > 0.0 && title >= thresholds.title;

    let author_check = thresholds.author > 0.0 && !normalize_text(query_author).is_empty();
    if !author_check {
        return MatchScore {
            title,
            author: None,
            accepted: title_ok,
        };
    }

    let (author, author_ok) = match result_author.filter(|a| !normalize_text(a).is_empty()) {
        Some(result_author) => {
            let ratio = author_overlap(query_author, result_author);
            let ok = ratio >= thresholds.author
                || shares_significant_word(query_author, result_author);
            (ratio, ok)
        }
        None => (0.0, false),
    };

    MatchScore {
        title,
        author: Some(author),
        accepted: title_ok && author_ok,
    }
}
