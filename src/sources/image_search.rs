use super::{SourceAdapter, SourceDescriptor, SourceError};
use crate::{
    config::ImageSearchConfig,
    scrape::{Accept, NetworkClient},
    types::{BookRequest, Candidate},
};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;

static VQD_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r#"vqd=["']?([\d-]+)["']?"#).unwrap());

#[derive(Debug, Deserialize)]
struct ImageResults {
    #[serde(default)]
    results: Vec<ImageResult>,
}

#[derive(Debug, Deserialize)]
struct ImageResult {
    #[serde(default)]
    image: String,
    #[serde(default)]
    title: String,
    /// Page the image was found on
    #[serde(default)]
    url: String,
}

/// DuckDuckGo image search. Needs a `vqd` token from the html search page
/// before the json endpoint answers.
pub struct DuckDuckGoImages {
    descriptor: SourceDescriptor,
    config: ImageSearchConfig,
}

impl DuckDuckGoImages {
    pub fn new(descriptor: SourceDescriptor, config: ImageSearchConfig) -> Self {
        Self { descriptor, config }
    }

    fn query(&self, book: &BookRequest) -> String {
        format!("{} {}", book.query(), self.config.query_suffix)
            .trim()
            .to_string()
    }

    fn token(&self, query: &str, net: &NetworkClient) -> Result<String, SourceError> {
        let params = url::form_urlencoded::Serializer::new(String::new())
            .append_pair("q", query)
            .append_pair("iax", "images")
            .append_pair("ia", "images")
            .finish();
        let url = format!("{}/?{params}", self.descriptor.base_url);

        let page = self.descriptor.fetch(net, &url, Accept::Html)?;
        VQD_RE
            .captures(&page.text())
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_string())
            .ok_or_else(|| SourceError::Parse("vqd token not found".to_string()))
    }

    fn is_relevant_url(&self, result: &ImageResult) -> bool {
        if self.config.url_keywords.is_empty() {
            return true;
        }

        let haystack = format!("{} {}", result.image, result.url).to_lowercase();
        self.config
            .url_keywords
            .iter()
            .any(|k| haystack.contains(&k.to_lowercase()))
    }
}

impl SourceAdapter for DuckDuckGoImages {
    fn descriptor(&self) -> &SourceDescriptor {
        &self.descriptor
    }

    fn search(&self, book: &BookRequest, net: &NetworkClient) -> Result<Vec<Candidate>, SourceError> {
        let query = self.query(book);
        let vqd = self.token(&query, net)?;

        let params = url::form_urlencoded::Serializer::new(String::new())
            .append_pair("l", &self.config.region)
            .append_pair("o", "json")
            .append_pair("q", &query)
            .append_pair("vqd", &vqd)
            .append_pair("f", ",,,,,")
            .append_pair("p", "1")
            .finish();
        let url = format!("{}/i.js?{params}", self.descriptor.base_url);

        let resp = self.descriptor.fetch(net, &url, Accept::Json)?;
        let results: ImageResults = resp
            .json()
            .map_err(|e| SourceError::Parse(e.to_string()))?;

        let mut candidates: Vec<Candidate> = vec![];
        for result in &results.results {
            if result.image.is_empty() || !self.is_relevant_url(result) {
                continue;
            }

            // results carry no author; the source thresholds normally disable that check
            let score = self.descriptor.score(book, &result.title, None);
            if !score.accepted {
                continue;
            }

            let candidate = self.descriptor.candidate(&result.image, score.relevance());
            if !candidates.iter().any(|c| c.url == candidate.url) {
                candidates.push(candidate);
            }

            if candidates.len() >= self.config.max_results {
                break;
            }
        }

        candidates.sort_by(|a, b| b.relevance.total_cmp(&a.relevance));
        Ok(candidates)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::NetworkConfig,
        matching::MatchThresholds,
        sources::Capability,
        tests::mock::{MockTransport, Reply},
    };
    use serde_json::json;
    use std::sync::Arc;

    fn source() -> DuckDuckGoImages {
        let mut descriptor = SourceDescriptor::new(
            "DuckDuckGo Images",
            1,
            "https://ddg.test",
            &[Capability::MetadataSearch],
        );
        descriptor.thresholds = MatchThresholds::new(0.5, 0.0);
        DuckDuckGoImages::new(descriptor, ImageSearchConfig::default())
    }

    fn net(mock: &Arc<MockTransport>) -> NetworkClient {
        let config = NetworkConfig {
            retry_delay_ms: 0,
            block_private_ips: false,
            ..Default::default()
        };
        NetworkClient::with_transport(&config, mock.clone())
    }

    #[test]
    fn test_search_filters_results() {
        let mock = Arc::new(MockTransport::new());
        mock.on_prefix(
            "https://ddg.test/?",
            Reply::html(r#"<script>DDG.deep.initialize('/d.js?q=x&vqd="4-12345678901234567890"&kl=wt-wt');</script>"#),
        );
        mock.on_prefix(
            "https://ddg.test/i.js?",
            Reply::json(json!({
                "results": [
                    {"image": "https://random.test/photo.jpg", "title": "Il nome della rosa", "url": "https://random.test/"},
                    {"image": "https://img.ibs.test/cover/rosa.jpg", "title": "Tutt'altro libro", "url": "https://ibs.test/x"},
                    {"image": "https://img.ibs.test/cover/rosa.jpg", "title": "Il nome della rosa - Umberto Eco", "url": "https://ibs.test/rosa"},
                    {"image": "https://shop.test/i/1.jpg", "title": "Il nome della rosa copertina", "url": "https://shop.test/books/rosa"},
                ]
            })),
        );

        let book = BookRequest::new("Il nome della rosa", "Umberto Eco");
        let candidates = source().search(&book, &net(&mock)).unwrap();
        let urls = candidates.iter().map(|c| c.url.as_str()).collect::<Vec<_>>();
        assert_eq!(
            urls,
            vec!["https://img.ibs.test/cover/rosa.jpg", "https://shop.test/i/1.jpg"]
        );

        let json_url = mock
            .get_urls()
            .into_iter()
            .find(|u| u.contains("i.js"))
            .unwrap();
        assert!(json_url.contains("vqd=4-12345678901234567890"));
        assert!(json_url.contains("libro+copertina"));
    }

    #[test]
    fn test_missing_token_is_parse_error() {
        let mock = Arc::new(MockTransport::new());
        mock.on_prefix("https://ddg.test/?", Reply::html("<html>no token</html>"));

        let book = BookRequest::new("Il nome della rosa", "Umberto Eco");
        assert!(matches!(
            source().search(&book, &net(&mock)),
            Err(SourceError::Parse(_))
        ));
        assert_eq!(mock.total_calls(), 1);
    }

    #[test]
    fn test_link_extract_unsupported() {
        let mock = Arc::new(MockTransport::new());
        let book = BookRequest::new("x", "y");
        assert!(matches!(
            source().extract_from_link("https://ddg.test/", &book, &net(&mock)),
            Err(SourceError::Unsupported)
        ));
    }
}
