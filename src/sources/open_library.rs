use super::{SourceAdapter, SourceDescriptor, SourceError};
use crate::{
    config::OpenLibraryConfig,
    scrape::{Accept, NetworkClient},
    types::{BookRequest, Candidate},
};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;

static EDITION_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"/books/(OL\d+M)").unwrap());
static WORK_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"/works/(OL\d+W)").unwrap());

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    docs: Vec<SearchDoc>,
}

#[derive(Debug, Deserialize)]
struct SearchDoc {
    #[serde(default)]
    title: String,
    #[serde(default)]
    author_name: Vec<String>,
    #[serde(default)]
    isbn: Vec<String>,
    cover_i: Option<u64>,
    cover_edition_key: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WorkResponse {
    #[serde(default)]
    covers: Vec<i64>,
}

/// Open Library search API plus the covers service
pub struct OpenLibrary {
    descriptor: SourceDescriptor,
    config: OpenLibraryConfig,
}

impl OpenLibrary {
    pub fn new(descriptor: SourceDescriptor, config: OpenLibraryConfig) -> Self {
        Self { descriptor, config }
    }

    /// `default=false` makes missing covers 404 instead of a blank pixel
    fn cover_url(&self, kind: &str, value: &str) -> String {
        format!(
            "{}/b/{kind}/{value}-L.jpg?default=false",
            self.config.covers_url.trim_end_matches('/')
        )
    }

    fn doc_covers(&self, doc: &SearchDoc) -> Vec<String> {
        let mut urls = vec![];
        if let Some(isbn) = doc.isbn.first() {
            urls.push(self.cover_url("isbn", isbn));
        }
        if let Some(id) = doc.cover_i {
            urls.push(self.cover_url("id", &id.to_string()));
        }
        if let Some(olid) = &doc.cover_edition_key {
            urls.push(self.cover_url("olid", olid));
        }
        urls
    }
}

impl SourceAdapter for OpenLibrary {
    fn descriptor(&self) -> &SourceDescriptor {
        &self.descriptor
    }

    fn search(&self, book: &BookRequest, net: &NetworkClient) -> Result<Vec<Candidate>, SourceError> {
        let query = url::form_urlencoded::Serializer::new(String::new())
            .append_pair("q", &book.query())
            .append_pair("fields", "title,author_name,isbn,cover_i,cover_edition_key")
            .append_pair("limit", "20")
            .finish();
        let url = format!("{}/search.json?{query}", self.descriptor.base_url);

        let resp = self.descriptor.fetch(net, &url, Accept::Json)?;
        let results: SearchResponse = resp
            .json()
            .map_err(|e| SourceError::Parse(e.to_string()))?;

        let mut candidates: Vec<Candidate> = vec![];
        let mut matched = 0;
        for doc in &results.docs {
            let author = (!doc.author_name.is_empty()).then(|| doc.author_name.join(", "));
            let score = self.descriptor.score(book, &doc.title, author.as_deref());
            if !score.accepted {
                continue;
            }

            let covers = self.doc_covers(doc);
            if covers.is_empty() {
                continue;
            }

            for url in covers {
                let candidate = self.descriptor.candidate(&url, score.relevance());
                if !candidates.iter().any(|c| c.url == candidate.url) {
                    candidates.push(candidate);
                }
            }

            matched += 1;
            if matched >= self.config.max_results {
                break;
            }
        }

        candidates.sort_by(|a, b| b.relevance.total_cmp(&a.relevance));
        Ok(candidates)
    }

    fn extract_from_link(
        &self,
        link: &str,
        _book: &BookRequest,
        net: &NetworkClient,
    ) -> Result<Vec<Candidate>, SourceError> {
        if let Some(olid) = EDITION_RE.captures(link).and_then(|c| c.get(1)) {
            let url = self.cover_url("olid", olid.as_str());
            return Ok(vec![self.descriptor.candidate(&url, 1.0)]);
        }

        if let Some(work) = WORK_RE.captures(link).and_then(|c| c.get(1)) {
            let url = format!("{}/works/{}.json", self.descriptor.base_url, work.as_str());
            let resp = self.descriptor.fetch(net, &url, Accept::Json)?;
            let work: WorkResponse = resp
                .json()
                .map_err(|e| SourceError::Parse(e.to_string()))?;

            // negative ids mark deleted covers
            return Ok(work
                .covers
                .iter()
                .filter(|id| **id > 0)
                .map(|id| self.descriptor.candidate(&self.cover_url("id", &id.to_string()), 1.0))
                .collect());
        }

        Ok(vec![])
    }
}
