use crate::{sources::Capability, storage::sanitize_filename};
use serde::{Deserialize, Serialize};

/// Input to one resolution
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookRequest {
    pub title: String,
    pub author: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub purchase_link: Option<String>,
}

impl BookRequest {
    pub fn new(title: &str, author: &str) -> Self {
        Self {
            title: title.trim().to_string(),
            author: author.trim().to_string(),
            purchase_link: None,
        }
    }

    pub fn with_link(mut self, link: &str) -> Self {
        let link = link.trim();
        self.purchase_link = (!link.is_empty()).then(|| link.to_string());
        self
    }

    pub fn key(&self) -> BookKey {
        BookKey {
            title: sanitize_filename(&self.title),
            author: sanitize_filename(&self.author),
        }
    }

    /// `title author`, the query most sources are searched with
    pub fn query(&self) -> String {
        format!("{} {}", self.title, self.author).trim().to_string()
    }
}

/// Sanitized `(title, author)`, identity of a book for idempotence
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BookKey {
    pub title: String,
    pub author: String,
}

impl BookKey {
    pub fn file_stem(&self) -> String {
        format!("{}_{}", self.title, self.author)
    }
}

/// An image reference produced by a source. Dimensions are zero until
/// the validator has seen it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub url: String,
    pub source_name: String,
    pub width: u32,
    pub height: u32,
    pub relevance: f32,
}

impl Candidate {
    pub fn new(url: &str, source_name: &str, relevance: f32) -> Self {
        Self {
            url: url.to_string(),
            source_name: source_name.to_string(),
            width: 0,
            height: 0,
            relevance: relevance.clamp(0.0, 1.0),
        }
    }

    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionStatus {
    Found,
    Defaulted,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolutionResult {
    pub status: ResolutionStatus,
    pub url: String,
    pub source_name: Option<String>,
    /// Best rejected candidate, picked because nothing passed the quality gate
    #[serde(default)]
    pub sub_threshold: bool,
    pub width: Option<u32>,
    pub height: Option<u32>,
}

impl ResolutionResult {
    pub fn found(candidate: &Candidate, sub_threshold: bool) -> Self {
        Self {
            status: ResolutionStatus::Found,
            url: candidate.url.clone(),
            source_name: Some(candidate.source_name.clone()),
            sub_threshold,
            width: (candidate.area() > 0).then_some(candidate.width),
            height: (candidate.area() > 0).then_some(candidate.height),
        }
    }

    pub fn defaulted(placeholder_url: &str) -> Self {
        Self {
            status: ResolutionStatus::Defaulted,
            url: placeholder_url.to_string(),
            source_name: None,
            sub_threshold: false,
            width: None,
            height: None,
        }
    }

    pub fn is_found(&self) -> bool {
        self.status == ResolutionStatus::Found
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", content = "detail", rename_all = "snake_case")]
pub enum AttemptOutcome {
    Accepted { url: String, width: u32, height: u32 },
    /// Largest of the candidates this source produced
    Rejected { url: String, width: u32, height: u32 },
    NoCandidate,
    Error(String),
    Skipped(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceAttempt {
    pub source: String,
    pub capability: Capability,
    pub outcome: AttemptOutcome,
    /// Candidates probed by the validator
    pub probed: usize,
    pub duration_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolutionReport {
    pub book: BookRequest,
    pub result: ResolutionResult,
    pub attempts: Vec<SourceAttempt>,
    pub duration_ms: u64,
}
