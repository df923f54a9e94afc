use crate::{
    matching::MatchThresholds,
    sources::Capability,
    storage::{self, StorageManager},
};
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const CONFIG_FILE: &str = "config.yaml";

const DEFAULT_TIMEOUT_SECS: u64 = 15;
const DEFAULT_MAX_ATTEMPTS: u32 = 3;
const DEFAULT_RETRY_DELAY_MS: u64 = 2000;
const DEFAULT_MAX_BODY_BYTES: usize = 15 * 1024 * 1024;
const DEFAULT_ACCEPT_LANGUAGE: &str = "it-IT,it;q=0.8,en-US;q=0.5,en;q=0.3";

const DEFAULT_PLACEHOLDER_URL: &str = "https://www.fillmurray.com/800/1200";
const DEFAULT_PROBE_LIMIT: usize = 15;

const DEFAULT_WORKERS: usize = 3;
const DEFAULT_POLITENESS_DELAY_MS: u64 = 1000;
const DEFAULT_COVERS_DIR: &str = "book_covers";

const DEFAULT_USER_AGENTS: [&str; 5] = [
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/126.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/126.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 14_5) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.5 Safari/605.1.15",
    "Mozilla/5.0 (X11; Linux x86_64; rv:127.0) Gecko/20100101 Firefox/127.0",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:127.0) Gecko/20100101 Firefox/127.0",
];

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("no enabled sources configured")]
    NoSources,

    #[error("sources '{first}' and '{second}' share priority {priority}")]
    DuplicatePriority {
        priority: u32,
        first: String,
        second: String,
    },

    #[error("source '{source_name}': {message}")]
    Source {
        source_name: String,
        message: String,
    },

    #[error("{field}: {message}")]
    Invalid { field: String, message: String },
}

impl ConfigError {
    pub fn invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Invalid {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn source(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Source {
            source_name: name.into(),
            message: message.into(),
        }
    }
}

/// Settings for the shared network client
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NetworkConfig {
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Total attempts per request, including the first one
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Base retry delay; attempt `n` waits `retry_delay_ms * n`
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,

    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,

    #[serde(default = "default_accept_language")]
    pub accept_language: String,

    /// Browser identities rotated per request
    #[serde(default = "default_user_agents")]
    pub user_agents: Vec<String>,

    #[serde(default = "default_allowed_schemes")]
    pub allowed_schemes: Vec<String>,

    #[serde(default)]
    pub blocked_hosts: Vec<String>,

    #[serde(default = "default_true")]
    pub block_private_ips: bool,

    #[serde(default)]
    pub accept_invalid_certs: bool,

    /// Used after the first failed attempt. Falls back to OPT_PROXY.
    #[serde(default)]
    pub proxy: Option<String>,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            retry_delay_ms: DEFAULT_RETRY_DELAY_MS,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
            accept_language: DEFAULT_ACCEPT_LANGUAGE.to_string(),
            user_agents: default_user_agents(),
            allowed_schemes: default_allowed_schemes(),
            blocked_hosts: vec![],
            block_private_ips: true,
            accept_invalid_certs: false,
            proxy: None,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CascadeConfig {
    #[serde(default = "default_placeholder_url")]
    pub placeholder_url: String,

    /// Max candidates validated per source
    #[serde(default = "default_probe_limit")]
    pub probe_limit: usize,

    /// Stop after this many source steps
    #[serde(default)]
    pub max_sources: Option<usize>,

    /// Stop starting new source steps after this many seconds
    #[serde(default)]
    pub time_budget_secs: Option<u64>,

    /// Issue a single unretried HEAD before downloading a candidate
    #[serde(default)]
    pub head_precheck: bool,
}

impl Default for CascadeConfig {
    fn default() -> Self {
        Self {
            placeholder_url: DEFAULT_PLACEHOLDER_URL.to_string(),
            probe_limit: DEFAULT_PROBE_LIMIT,
            max_sources: None,
            time_budget_secs: None,
            head_precheck: false,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SchedulerConfig {
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Pause after each resolved book, per worker
    #[serde(default = "default_politeness_delay_ms")]
    pub politeness_delay_ms: u64,

    /// Rewrite the catalog after every record instead of once at the end
    #[serde(default = "default_true")]
    pub flush_every_record: bool,

    #[serde(default = "default_true")]
    pub download: bool,

    /// Relative paths are resolved against the catalog's directory
    #[serde(default = "default_covers_dir")]
    pub covers_dir: String,

    /// Written into `cover` instead of `covers_dir` for downloaded assets
    #[serde(default)]
    pub cover_path_prefix: Option<String>,

    #[serde(default)]
    pub run_timeout_secs: Option<u64>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            workers: DEFAULT_WORKERS,
            politeness_delay_ms: DEFAULT_POLITENESS_DELAY_MS,
            flush_every_record: true,
            download: true,
            covers_dir: DEFAULT_COVERS_DIR.to_string(),
            cover_path_prefix: None,
            run_timeout_secs: None,
        }
    }
}

/// `{pattern, replacement}` regex substitution applied to extracted image urls
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct UpgradeConfig {
    pub pattern: String,
    #[serde(default)]
    pub replacement: String,
}

impl UpgradeConfig {
    pub fn new(pattern: &str, replacement: &str) -> Self {
        Self {
            pattern: pattern.to_string(),
            replacement: replacement.to_string(),
        }
    }
}

/// Where the image reference is looked up on a page, in order
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ImageStrategy {
    JsonLd,
    Selectors,
    MarkupScan,
}

fn default_extraction() -> Vec<ImageStrategy> {
    vec![
        ImageStrategy::JsonLd,
        ImageStrategy::Selectors,
        ImageStrategy::MarkupScan,
    ]
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct HtmlRetailerConfig {
    /// Search page url; `{query}` is replaced by the url-encoded query
    pub search_url: String,
    pub item_selector: String,
    pub title_selector: String,
    #[serde(default)]
    pub author_selector: Option<String>,
    #[serde(default)]
    pub link_selector: Option<String>,
    /// Image inside a listing item, used when no product page is followed
    #[serde(default)]
    pub listing_image_selector: Option<String>,
    /// Image elements on the product page, in preference order
    #[serde(default)]
    pub image_selectors: Vec<String>,
    #[serde(default = "default_extraction")]
    pub extraction: Vec<ImageStrategy>,
    /// Markup scan only keeps urls containing one of these (empty keeps all)
    #[serde(default)]
    pub markup_hints: Vec<String>,
    #[serde(default = "default_true")]
    pub follow_product_page: bool,
    #[serde(default = "default_max_results")]
    pub max_results: usize,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct OpenLibraryConfig {
    #[serde(default = "default_open_library_covers_url")]
    pub covers_url: String,
    #[serde(default = "default_max_results")]
    pub max_results: usize,
}

impl Default for OpenLibraryConfig {
    fn default() -> Self {
        Self {
            covers_url: default_open_library_covers_url(),
            max_results: default_max_results(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct GoogleBooksConfig {
    /// Environment variable holding an optional API key
    #[serde(default = "default_google_books_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_max_results")]
    pub max_results: usize,
}

impl Default for GoogleBooksConfig {
    fn default() -> Self {
        Self {
            api_key_env: default_google_books_key_env(),
            max_results: default_max_results(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ImageSearchConfig {
    /// Appended to the `title author` query
    #[serde(default = "default_image_query_suffix")]
    pub query_suffix: String,
    /// Result urls must contain one of these (empty keeps all)
    #[serde(default = "default_image_url_keywords")]
    pub url_keywords: Vec<String>,
    #[serde(default = "default_image_region")]
    pub region: String,
    #[serde(default = "default_probe_limit")]
    pub max_results: usize,
}

impl Default for ImageSearchConfig {
    fn default() -> Self {
        Self {
            query_suffix: default_image_query_suffix(),
            url_keywords: default_image_url_keywords(),
            region: default_image_region(),
            max_results: DEFAULT_PROBE_LIMIT,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SourceKind {
    HtmlRetailer(HtmlRetailerConfig),
    OpenLibrary(OpenLibraryConfig),
    GoogleBooks(GoogleBooksConfig),
    ImageSearch(ImageSearchConfig),
}

impl SourceKind {
    pub fn default_capabilities(&self) -> Vec<Capability> {
        match self {
            SourceKind::ImageSearch(_) => vec![Capability::MetadataSearch],
            _ => vec![Capability::LinkExtract, Capability::MetadataSearch],
        }
    }

    pub fn default_thresholds(&self) -> MatchThresholds {
        match self {
            // image search results carry no author
            SourceKind::ImageSearch(_) => MatchThresholds::new(0.5, 0.0),
            _ => MatchThresholds::default(),
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            SourceKind::HtmlRetailer(_) => "html_retailer",
            SourceKind::OpenLibrary(_) => "open_library",
            SourceKind::GoogleBooks(_) => "google_books",
            SourceKind::ImageSearch(_) => "image_search",
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct SourceConfig {
    pub name: String,
    pub priority: u32,
    pub base_url: String,

    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Defaults depend on `kind`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capabilities: Option<Vec<Capability>>,

    /// Purchase links on these domains (or subdomains) go to this source first
    #[serde(default)]
    pub link_domains: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thresholds: Option<MatchThresholds>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accept_language: Option<String>,

    #[serde(default)]
    pub upgrade: Vec<UpgradeConfig>,

    #[serde(flatten)]
    pub kind: SourceKind,
}

impl SourceConfig {
    pub fn capabilities(&self) -> Vec<Capability> {
        self.capabilities
            .clone()
            .unwrap_or_else(|| self.kind.default_capabilities())
    }

    pub fn thresholds(&self) -> MatchThresholds {
        self.thresholds
            .unwrap_or_else(|| self.kind.default_thresholds())
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub network: NetworkConfig,
    #[serde(default)]
    pub cascade: CascadeConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default = "default_sources")]
    pub sources: Vec<SourceConfig>,

    #[serde(skip_serializing, skip_deserializing)]
    base_path: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            network: NetworkConfig::default(),
            cascade: CascadeConfig::default(),
            scheduler: SchedulerConfig::default(),
            sources: default_sources(),
            base_path: PathBuf::new(),
        }
    }
}

impl Config {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let net = &self.network;
        if net.timeout_secs == 0 {
            return Err(ConfigError::invalid("network.timeout_secs", "must be greater than 0"));
        }
        if net.max_attempts == 0 {
            return Err(ConfigError::invalid("network.max_attempts", "must be at least 1"));
        }
        if net.user_agents.iter().all(|ua| ua.trim().is_empty()) {
            return Err(ConfigError::invalid("network.user_agents", "identity pool is empty"));
        }

        let cascade = &self.cascade;
        if url::Url::parse(&cascade.placeholder_url).is_err() {
            return Err(ConfigError::invalid(
                "cascade.placeholder_url",
                format!("'{}' is not an absolute url", cascade.placeholder_url),
            ));
        }
        if cascade.probe_limit == 0 {
            return Err(ConfigError::invalid("cascade.probe_limit", "must be at least 1"));
        }
        if cascade.max_sources == Some(0) {
            return Err(ConfigError::invalid("cascade.max_sources", "must be at least 1"));
        }

        if self.scheduler.workers == 0 {
            return Err(ConfigError::invalid("scheduler.workers", "must be at least 1"));
        }

        let enabled = self.sources.iter().filter(|s| s.enabled).collect::<Vec<_>>();
        if enabled.is_empty() {
            return Err(ConfigError::NoSources);
        }

        for (idx, source) in enabled.iter().enumerate() {
            if source.name.trim().is_empty() {
                return Err(ConfigError::invalid(
                    format!("sources[{idx}].name"),
                    "must not be empty",
                ));
            }
            if url::Url::parse(&source.base_url).is_err() {
                return Err(ConfigError::source(
                    &source.name,
                    format!("base_url '{}' is not an absolute url", source.base_url),
                ));
            }
            if source.capabilities().is_empty() {
                return Err(ConfigError::source(&source.name, "no capabilities"));
            }

            let thresholds = source.thresholds();
            if !(0.0..=1.0).contains(&thresholds.title) || !(0.0..=1.0).contains(&thresholds.author)
            {
                return Err(ConfigError::source(
                    &source.name,
                    "thresholds must be between 0.0 and 1.0",
                ));
            }

            if let Some(other) = enabled[..idx].iter().find(|o| o.priority == source.priority) {
                return Err(ConfigError::DuplicatePriority {
                    priority: source.priority,
                    first: other.name.clone(),
                    second: source.name.clone(),
                });
            }
        }

        Ok(())
    }

    pub fn load_with(base_path: &Path) -> anyhow::Result<Self> {
        let store = storage::BackendLocal::new(base_path)
            .with_context(|| format!("failed to open config dir {}", base_path.display()))?;

        // create new if does not exist
        if !store.exists(CONFIG_FILE) {
            log::info!("writing default config to {}", base_path.join(CONFIG_FILE).display());
            store.write(CONFIG_FILE, serde_yml::to_string(&Self::default())?.as_bytes())?;
        }

        let config_str = String::from_utf8(store.read(CONFIG_FILE)?)
            .context("config file is not valid utf8")?;
        let mut config: Self = serde_yml::from_str(&config_str).context("config is malformed")?;

        config.base_path = base_path.to_path_buf();

        config.validate()?;

        // resave in case config version needs an upgrade
        let upgraded = serde_yml::to_string(&config)?;
        if config_str != upgraded {
            store.write(CONFIG_FILE, upgraded.as_bytes())?;
        }

        Ok(config)
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }
}

/// `BOOKCOVERS_BASE_PATH`, or `~/.local/share/bookcovers`
pub fn default_base_path() -> anyhow::Result<PathBuf> {
    if let Ok(path) = std::env::var("BOOKCOVERS_BASE_PATH") {
        return Ok(PathBuf::from(path));
    }

    let home = homedir::my_home()
        .context("failed to resolve home directory")?
        .context("home directory is not set")?;

    Ok(home.join(".local").join("share").join("bookcovers"))
}

fn default_true() -> bool {
    true
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

fn default_max_attempts() -> u32 {
    DEFAULT_MAX_ATTEMPTS
}

fn default_retry_delay_ms() -> u64 {
    DEFAULT_RETRY_DELAY_MS
}

fn default_max_body_bytes() -> usize {
    DEFAULT_MAX_BODY_BYTES
}

fn default_accept_language() -> String {
    DEFAULT_ACCEPT_LANGUAGE.to_string()
}

fn default_user_agents() -> Vec<String> {
    DEFAULT_USER_AGENTS.iter().map(|ua| ua.to_string()).collect()
}

fn default_allowed_schemes() -> Vec<String> {
    vec!["http".to_string(), "https".to_string()]
}

fn default_placeholder_url() -> String {
    DEFAULT_PLACEHOLDER_URL.to_string()
}

fn default_probe_limit() -> usize {
    DEFAULT_PROBE_LIMIT
}

fn default_workers() -> usize {
    DEFAULT_WORKERS
}

fn default_politeness_delay_ms() -> u64 {
    DEFAULT_POLITENESS_DELAY_MS
}

fn default_covers_dir() -> String {
    DEFAULT_COVERS_DIR.to_string()
}

fn default_max_results() -> usize {
    5
}

fn default_open_library_covers_url() -> String {
    "https://covers.openlibrary.org".to_string()
}

fn default_google_books_key_env() -> String {
    "GOOGLE_BOOKS_API_KEY".to_string()
}

fn default_image_query_suffix() -> String {
    "libro copertina".to_string()
}

fn default_image_url_keywords() -> Vec<String> {
    ["books", "cover", "libro", "copertina", "ibs", "feltrinelli", "mondadori", "goodreads"]
        .iter()
        .map(|k| k.to_string())
        .collect()
}

fn default_image_region() -> String {
    "it-it".to_string()
}

fn retailer(
    search_url: &str,
    item: &str,
    title: &str,
    author: Option<&str>,
    link: Option<&str>,
    image_selectors: &[&str],
) -> HtmlRetailerConfig {
    HtmlRetailerConfig {
        search_url: search_url.to_string(),
        item_selector: item.to_string(),
        title_selector: title.to_string(),
        author_selector: author.map(str::to_string),
        link_selector: link.map(str::to_string),
        listing_image_selector: Some("img".to_string()),
        image_selectors: image_selectors.iter().map(|s| s.to_string()).collect(),
        extraction: default_extraction(),
        markup_hints: vec![],
        follow_product_page: true,
        max_results: default_max_results(),
    }
}

/// Source order follows the cascade the catalog was first enriched with:
/// purchase-link retailers, Italian bookstores, Goodreads, metadata APIs,
/// then generic image search.
pub fn default_sources() -> Vec<SourceConfig> {
    let source = |name: &str, priority: u32, base_url: &str, domains: &[&str], kind: SourceKind| {
        SourceConfig {
            name: name.to_string(),
            priority,
            base_url: base_url.to_string(),
            enabled: true,
            capabilities: None,
            link_domains: domains.iter().map(|d| d.to_string()).collect(),
            thresholds: None,
            accept_language: None,
            upgrade: vec![],
            kind,
        }
    };

    let mut ibs = source(
        "IBS",
        10,
        "https://www.ibs.it",
        &["ibs.it"],
        SourceKind::HtmlRetailer(retailer(
            "/search/?ts=as&query={query}",
            ".cc-product-list-item",
            ".cc-title",
            Some(".cc-author"),
            Some("a.cc-title"),
            &["img.cc-img", ".cc-product-img img", "meta[property='og:image']"],
        )),
    );
    ibs.upgrade = vec![UpgradeConfig::new(r"/(?:\d+x\d+|thumb)/", "/")];

    let mut amazon = source(
        "Amazon",
        20,
        "https://www.amazon.it",
        &["amazon.it", "amazon.com", "amzn.to", "amzn.eu"],
        SourceKind::HtmlRetailer(HtmlRetailerConfig {
            markup_hints: vec!["m.media-amazon.com/images/I/".to_string()],
            ..retailer(
                "/s?k={query}&i=stripbooks",
                "div[data-component-type='s-search-result']",
                "h2",
                Some(".a-row .a-size-base"),
                Some("h2 a, a.a-link-normal"),
                &["#landingImage", "#imgBlkFront", "#ebooksImgBlkFront", "#main-image"],
            )
        }),
    );
    amazon.accept_language = Some("it-IT,it;q=0.9,en-US;q=0.8,en;q=0.7".to_string());
    amazon.upgrade = vec![UpgradeConfig::new(r"\._[A-Za-z0-9_,]+_\.", ".")];

    let mondadori = source(
        "Mondadori",
        30,
        "https://www.mondadoristore.it",
        &["mondadoristore.it"],
        SourceKind::HtmlRetailer(retailer(
            "/search/?tpr=10&g={query}",
            ".product-info, .single-box",
            ".title",
            Some(".author, .nti-author"),
            Some("a"),
            &[".product-img img", "img.cover", "meta[property='og:image']"],
        )),
    );

    let feltrinelli = source(
        "Feltrinelli",
        40,
        "https://www.lafeltrinelli.it",
        &["lafeltrinelli.it"],
        SourceKind::HtmlRetailer(retailer(
            "/search/?query={query}",
            ".cc-product-list-item",
            ".cc-title",
            Some(".cc-author"),
            Some("a.cc-title"),
            &["img.cc-img", "meta[property='og:image']"],
        )),
    );

    let coop = source(
        "Librerie Coop",
        42,
        "https://www.librerie.coop",
        &["librerie.coop"],
        SourceKind::HtmlRetailer(retailer(
            "/search?q={query}",
            ".product-item",
            ".product-item-name",
            Some(".product-item-author"),
            Some("a.product-item-link"),
            &["img.product-image-photo", ".gallery-placeholder img", "meta[property='og:image']"],
        )),
    );

    let hoepli = source(
        "Hoepli",
        44,
        "https://www.hoepli.it",
        &["hoepli.it"],
        SourceKind::HtmlRetailer(retailer(
            "/cerca/libri.aspx?query={query}",
            ".box_prodotto, .product",
            ".titolo, .title",
            Some(".autore, .author"),
            Some("a"),
            &["#imgCopertina", ".copertina img", "meta[property='og:image']"],
        )),
    );

    let bol = source(
        "BOL",
        46,
        "https://www.bol.it",
        &["bol.it"],
        SourceKind::HtmlRetailer(retailer(
            "/search/?query={query}",
            ".cc-product-list-item",
            ".cc-title",
            Some(".cc-author"),
            Some("a.cc-title"),
            &["img.cc-img", "meta[property='og:image']"],
        )),
    );

    let mut goodreads = source(
        "Goodreads",
        50,
        "https://www.goodreads.com",
        &["goodreads.com"],
        SourceKind::HtmlRetailer(retailer(
            "/search?q={query}",
            "tr[itemtype='http://schema.org/Book']",
            ".bookTitle",
            Some(".authorName"),
            Some("a.bookTitle"),
            &["img.ResponsiveImage", "#coverImage", "meta[property='og:image']"],
        )),
    );
    goodreads.accept_language = Some("en-US,en;q=0.9".to_string());
    goodreads.upgrade = vec![UpgradeConfig::new(r"\._S[XY]\d+_", "")];

    let mut open_library = source(
        "Open Library",
        60,
        "https://openlibrary.org",
        &["openlibrary.org"],
        SourceKind::OpenLibrary(OpenLibraryConfig::default()),
    );
    open_library.upgrade = vec![UpgradeConfig::new(r"-[SM]\.jpg", "-L.jpg")];

    let mut google_books = source(
        "Google Books",
        70,
        "https://www.googleapis.com/books/v1",
        &["books.google.com", "books.google.it"],
        SourceKind::GoogleBooks(GoogleBooksConfig::default()),
    );
    google_books.upgrade = vec![
        UpgradeConfig::new(r"^http://", "https://"),
        UpgradeConfig::new(r"&edge=curl", ""),
    ];

    let duckduckgo = source(
        "DuckDuckGo Images",
        80,
        "https://duckduckgo.com",
        &[],
        SourceKind::ImageSearch(ImageSearchConfig::default()),
    );

    vec![
        ibs,
        amazon,
        mondadori,
        feltrinelli,
        coop,
        hoepli,
        bol,
        goodreads,
        open_library,
        google_books,
        duckduckgo,
    ]
}
