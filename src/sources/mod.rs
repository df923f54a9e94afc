pub mod google_books;
pub mod image_search;
pub mod open_library;
pub mod retailer;

use crate::{
    config::{ConfigError, SourceConfig, SourceKind},
    matching::{self, MatchScore, MatchThresholds},
    scrape::{extract::UpgradeRule, Accept, FetchError, NetworkClient, Response},
    types::{BookRequest, Candidate},
};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    /// Read the cover off a purchase link that belongs to the source
    LinkExtract,
    /// Search the source by title and author
    MetadataSearch,
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Capability::LinkExtract => write!(f, "link_extract"),
            Capability::MetadataSearch => write!(f, "metadata_search"),
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum SourceError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("unparseable response: {0}")]
    Parse(String),

    #[error("capability not supported")]
    Unsupported,
}

/// Static description of a source, built from its config entry
#[derive(Clone, Debug)]
pub struct SourceDescriptor {
    pub name: String,
    pub priority: u32,
    pub capabilities: Vec<Capability>,
    pub base_url: String,
    pub link_domains: Vec<String>,
    pub thresholds: MatchThresholds,
    pub accept_language: Option<String>,
    upgrades: Vec<UpgradeRule>,
}

impl SourceDescriptor {
    pub fn new(name: &str, priority: u32, base_url: &str, capabilities: &[Capability]) -> Self {
        Self {
            name: name.to_string(),
            priority,
            capabilities: capabilities.to_vec(),
            base_url: base_url.to_string(),
            link_domains: vec![],
            thresholds: MatchThresholds::default(),
            accept_language: None,
            upgrades: vec![],
        }
    }

    pub fn from_config(config: &SourceConfig) -> Result<Self, ConfigError> {
        let upgrades = config
            .upgrade
            .iter()
            .map(|rule| {
                UpgradeRule::compile(rule).map_err(|e| {
                    ConfigError::source(&config.name, format!("bad upgrade pattern: {e}"))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            name: config.name.clone(),
            priority: config.priority,
            capabilities: config.capabilities(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            link_domains: config
                .link_domains
                .iter()
                .map(|d| d.trim().trim_start_matches("www.").to_ascii_lowercase())
                .filter(|d| !d.is_empty())
                .collect(),
            thresholds: config.thresholds(),
            accept_language: config.accept_language.clone(),
            upgrades,
        })
    }

    pub fn with_link_domains(mut self, domains: &[&str]) -> Self {
        self.link_domains = domains.iter().map(|d| d.to_string()).collect();
        self
    }

    pub fn supports(&self, capability: Capability) -> bool {
        self.capabilities.contains(&capability)
    }

    /// True when the link's host is one of the source's domains or a
    /// subdomain of one
    pub fn owns_link(&self, link: &str) -> bool {
        let Ok(url) = url::Url::parse(&crate::scrape::normalize_url(link)) else {
            return false;
        };
        let Some(host) = url.host_str() else {
            return false;
        };
        let host = host.to_ascii_lowercase();

        self.link_domains
            .iter()
            .any(|d| host == *d || host.ends_with(&format!(".{d}")))
    }

    pub fn upgrade(&self, url: &str) -> String {
        crate::scrape::extract::apply_upgrades(&self.upgrades, url)
    }

    /// Runs the match filter with this source's thresholds
    pub fn score(&self, book: &BookRequest, title: &str, author: Option<&str>) -> MatchScore {
        matching::evaluate(&book.title, &book.author, title, author, &self.thresholds)
    }

    /// Candidate from an extracted url, upgraded to the largest rendition
    pub fn candidate(&self, url: &str, relevance: f32) -> Candidate {
        Candidate::new(&self.upgrade(url), &self.name, relevance)
    }

    pub fn fetch(
        &self,
        net: &NetworkClient,
        url: &str,
        accept: Accept,
    ) -> Result<Response, SourceError> {
        Ok(net.get(url, accept, self.accept_language.as_deref())?)
    }
}

/// One implementation per kind of external source. Adapters return
/// candidates best first; an empty list means nothing matched.
pub trait SourceAdapter: Send + Sync {
    fn descriptor(&self) -> &SourceDescriptor;

    fn search(
        &self,
        book: &BookRequest,
        net: &NetworkClient,
    ) -> Result<Vec<Candidate>, SourceError>;

    fn extract_from_link(
        &self,
        _link: &str,
        _book: &BookRequest,
        _net: &NetworkClient,
    ) -> Result<Vec<Candidate>, SourceError> {
        Err(SourceError::Unsupported)
    }

    fn name(&self) -> &str {
        &self.descriptor().name
    }

    fn priority(&self) -> u32 {
        self.descriptor().priority
    }
}

pub fn build_adapter(config: &SourceConfig) -> Result<Box<dyn SourceAdapter>, ConfigError> {
    let descriptor = SourceDescriptor::from_config(config)?;

    let adapter: Box<dyn SourceAdapter> = match &config.kind {
        SourceKind::HtmlRetailer(kind) => {
            Box::new(retailer::HtmlRetailer::new(descriptor, kind.clone())?)
        }
        SourceKind::OpenLibrary(kind) => {
            Box::new(open_library::OpenLibrary::new(descriptor, kind.clone()))
        }
        SourceKind::GoogleBooks(kind) => {
            Box::new(google_books::GoogleBooks::new(descriptor, kind.clone()))
        }
        SourceKind::ImageSearch(kind) => {
            Box::new(image_search::DuckDuckGoImages::new(descriptor, kind.clone()))
        }
    };

    Ok(adapter)
}

/// Sources in cascade order (ascending priority)
pub struct SourceRegistry {
    sources: Vec<Box<dyn SourceAdapter>>,
}

impl SourceRegistry {
    pub fn new(mut sources: Vec<Box<dyn SourceAdapter>>) -> Result<Self, ConfigError> {
        if sources.is_empty() {
            return Err(ConfigError::NoSources);
        }

        sources.sort_by_key(|s| s.priority());

        for pair in sources.windows(2) {
            if pair[0].priority() == pair[1].priority() {
                return Err(ConfigError::DuplicatePriority {
                    priority: pair[0].priority(),
                    first: pair[0].name().to_string(),
                    second: pair[1].name().to_string(),
                });
            }
        }

        Ok(Self { sources })
    }

    pub fn from_config(configs: &[SourceConfig]) -> Result<Self, ConfigError> {
        let sources = configs
            .iter()
            .filter(|c| c.enabled)
            .map(build_adapter)
            .collect::<Result<Vec<_>, _>>()?;

        Self::new(sources)
    }

    pub fn iter(&self) -> impl Iterator<Item = &dyn SourceAdapter> {
        self.sources.iter().map(|s| s.as_ref())
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    /// The source a purchase link should be read from, if any
    pub fn link_source(&self, link: &str) -> Option<&dyn SourceAdapter> {
        self.iter().find(|s| {
            let d = s.descriptor();
            d.supports(Capability::LinkExtract) && d.owns_link(link)
        })
    }
}
