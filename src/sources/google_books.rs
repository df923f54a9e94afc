use super::{SourceAdapter, SourceDescriptor, SourceError};
use crate::{
    config::GoogleBooksConfig,
    scrape::{Accept, NetworkClient},
    types::{BookRequest, Candidate},
};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct VolumesResponse {
    #[serde(default)]
    items: Vec<Volume>,
}

#[derive(Debug, Deserialize)]
struct Volume {
    #[serde(rename = "volumeInfo", default)]
    info: VolumeInfo,
}

#[derive(Debug, Default, Deserialize)]
struct VolumeInfo {
    #[serde(default)]
    title: String,
    subtitle: Option<String>,
    #[serde(default)]
    authors: Vec<String>,
    #[serde(rename = "imageLinks")]
    image_links: Option<ImageLinks>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ImageLinks {
    extra_large: Option<String>,
    large: Option<String>,
    medium: Option<String>,
    small: Option<String>,
    thumbnail: Option<String>,
    small_thumbnail: Option<String>,
}

impl ImageLinks {
    /// Largest rendition first
    fn ordered(&self) -> Vec<&str> {
        [
            &self.extra_large,
            &self.large,
            &self.medium,
            &self.small,
            &self.thumbnail,
            &self.small_thumbnail,
        ]
        .into_iter()
        .filter_map(|l| l.as_deref())
        .collect()
    }
}

impl VolumeInfo {
    fn full_title(&self) -> String {
        match &self.subtitle {
            Some(subtitle) if !subtitle.trim().is_empty() => format!("{}: {subtitle}", self.title),
            _ => self.title.clone(),
        }
    }
}

/// Google Books volumes API
pub struct GoogleBooks {
    descriptor: SourceDescriptor,
    config: GoogleBooksConfig,
    api_key: Option<String>,
}

impl GoogleBooks {
    pub fn new(descriptor: SourceDescriptor, config: GoogleBooksConfig) -> Self {
        let api_key = std::env::var(&config.api_key_env)
            .ok()
            .filter(|k| !k.trim().is_empty());

        Self {
            descriptor,
            config,
            api_key,
        }
    }

    fn with_key(&self, mut serializer: url::form_urlencoded::Serializer<String>) -> String {
        if let Some(key) = &self.api_key {
            serializer.append_pair("key", key);
        }
        serializer.finish()
    }

    fn volume_candidates(&self, info: &VolumeInfo, relevance: f32, out: &mut Vec<Candidate>) {
        let Some(links) = &info.image_links else {
            return;
        };

        for url in links.ordered() {
            let candidate = self.descriptor.candidate(url, relevance);
            if !out.iter().any(|c| c.url == candidate.url) {
                out.push(candidate);
            }
        }
    }
}

impl SourceAdapter for GoogleBooks {
    fn descriptor(&self) -> &SourceDescriptor {
        &self.descriptor
    }

    fn search(&self, book: &BookRequest, net: &NetworkClient) -> Result<Vec<Candidate>, SourceError> {
        let mut q = format!("intitle:{}", book.title);
        if !book.author.is_empty() {
            q.push_str(&format!(" inauthor:{}", book.author));
        }

        let mut serializer = url::form_urlencoded::Serializer::new(String::new());
        serializer
            .append_pair("q", &q)
            .append_pair("printType", "books")
            .append_pair("maxResults", "20");
        let url = format!("{}/volumes?{}", self.descriptor.base_url, self.with_key(serializer));

        let resp = self.descriptor.fetch(net, &url, Accept::Json)?;
        let volumes: VolumesResponse = resp
            .json()
            .map_err(|e| SourceError::Parse(e.to_string()))?;

        let mut candidates = vec![];
        let mut matched = 0;
        for volume in &volumes.items {
            let info = &volume.info;
            let author = (!info.authors.is_empty()).then(|| info.authors.join(", "));
            let score = self.descriptor.score(book, &info.full_title(), author.as_deref());
            if !score.accepted || info.image_links.is_none() {
                continue;
            }

            self.volume_candidates(info, score.relevance(), &mut candidates);

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
        let Some(id) = url::Url::parse(link).ok().and_then(|u| {
            u.query_pairs()
                .find(|(k, _)| k == "id")
                .map(|(_, v)| v.to_string())
        }) else {
            return Ok(vec![]);
        };

        let query = self.with_key(url::form_urlencoded::Serializer::new(String::new()));
        let mut url = format!("{}/volumes/{id}", self.descriptor.base_url);
        if !query.is_empty() {
            url = format!("{url}?{query}");
        }

        let resp = self.descriptor.fetch(net, &url, Accept::Json)?;
        let volume: Volume = resp
            .json()
            .map_err(|e| SourceError::Parse(e.to_string()))?;

        let mut candidates = vec![];
        self.volume_candidates(&volume.info, 1.0, &mut candidates);
        Ok(candidates)
    }
}
