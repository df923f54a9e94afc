pub mod extract;
pub mod identity;

pub use identity::{Accept, IdentityPool};

use crate::config::NetworkConfig;
use anyhow::Context;
use serde::de::DeserializeOwned;
use std::{
    collections::HashMap,
    error::Error,
    io::{self, Read},
    net::IpAddr,
    sync::Arc,
    thread::sleep,
    time::Duration,
};

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    /// Timeouts, connection resets, 429 and 503. Worth retrying.
    #[error("transient: {0}")]
    Transient(String),

    /// Any other failure. Never retried.
    #[error("permanent: {0}")]
    Permanent(String),

    /// Refused before any request was made.
    #[error("refused by url policy: {0}")]
    Policy(String),
}

impl FetchError {
    pub fn is_transient(&self) -> bool {
        matches!(self, FetchError::Transient(_))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Method {
    Get,
    Head,
}

#[derive(Clone, Debug)]
pub struct Request {
    pub method: Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    /// Route through the configured proxy, if any
    pub via_proxy: bool,
}

#[derive(Clone, Debug, Default)]
pub struct Response {
    pub status: u16,
    /// Final url after redirects
    pub url: String,
    /// Lowercase header names
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
}

impl Response {
    pub fn is_success(&self) -> bool {
        (200..400).contains(&self.status)
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    /// Media type without parameters, lowercased
    pub fn content_type(&self) -> Option<String> {
        self.header("content-type").map(|ct| {
            ct.split(';')
                .next()
                .unwrap_or_default()
                .trim()
                .to_ascii_lowercase()
        })
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).to_string()
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_slice(&self.body)
    }
}

/// A single HTTP exchange. Any status code is a successful exchange;
/// only transport failures are errors.
pub trait HttpFetch: Send + Sync {
    fn execute(&self, request: &Request) -> Result<Response, FetchError>;
}

pub struct ReqwestFetcher {
    direct: reqwest::blocking::Client,
    proxied: Option<reqwest::blocking::Client>,
    max_body_bytes: usize,
}

impl ReqwestFetcher {
    pub fn new(config: &NetworkConfig) -> anyhow::Result<Self> {
        let builder = || {
            reqwest::blocking::Client::builder()
                .danger_accept_invalid_certs(config.accept_invalid_certs)
                .danger_accept_invalid_hostnames(config.accept_invalid_certs)
                .timeout(Duration::from_secs(config.timeout_secs))
                .pool_idle_timeout(Duration::from_secs(config.timeout_secs))
        };

        let direct = builder().build().context("failed to build http client")?;

        let proxy = config
            .proxy
            .clone()
            .or_else(|| std::env::var("OPT_PROXY").ok())
            .filter(|p| !p.trim().is_empty());

        let proxied = match proxy {
            Some(proxy) => {
                let proxy = reqwest::Proxy::all(&proxy)
                    .with_context(|| format!("invalid proxy {proxy:?}"))?;
                Some(
                    builder()
                        .proxy(proxy)
                        .build()
                        .context("failed to build proxied http client")?,
                )
            }
            None => None,
        };

        Ok(Self {
            direct,
            proxied,
            max_body_bytes: config.max_body_bytes,
        })
    }
}

impl HttpFetch for ReqwestFetcher {
    fn execute(&self, request: &Request) -> Result<Response, FetchError> {
        let client = match (&self.proxied, request.via_proxy) {
            (Some(proxied), true) => proxied,
            _ => &self.direct,
        };

        let mut builder = match request.method {
            Method::Get => client.get(&request.url),
            Method::Head => client.head(&request.url),
        };
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        let mut resp = builder.send().map_err(|err| classify(&err))?;

        let status = resp.status().as_u16();
        let url = resp.url().to_string();
        let headers = resp
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_ascii_lowercase(), v.to_string()))
            })
            .collect::<HashMap<_, _>>();

        if let Some(len) = resp.content_length() {
            if len as usize > self.max_body_bytes {
                return Err(FetchError::Permanent(format!(
                    "body too large: {len} bytes"
                )));
            }
        }

        let body = match request.method {
            Method::Head => vec![],
            Method::Get => read_capped(&mut resp, self.max_body_bytes)?,
        };

        Ok(Response {
            status,
            url,
            headers,
            body,
        })
    }
}

/// Timeouts and connection failures are transient, everything else is not
fn classify(error: &reqwest::Error) -> FetchError {
    if error.is_timeout() || error.is_connect() {
        FetchError::Transient(get_error(error))
    } else {
        FetchError::Permanent(get_error(error))
    }
}

/// Stops reading one byte past `max`; a longer body is an error
fn read_capped(reader: impl Read, max: usize) -> Result<Vec<u8>, FetchError> {
    let mut body = Vec::new();
    reader
        .take(max as u64 + 1)
        .read_to_end(&mut body)
        .map_err(|err| match err.kind() {
            io::ErrorKind::TimedOut
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::UnexpectedEof => FetchError::Transient(format!("body: {err}")),
            _ => FetchError::Permanent(format!("body: {err}")),
        })?;

    if body.len() > max {
        return Err(FetchError::Permanent(format!(
            "body too large: more than {max} bytes"
        )));
    }
    Ok(body)
}

fn get_error(error: &reqwest::Error) -> String {
    let kind = if error.is_timeout() {
        "timeout"
    } else if error.is_connect() {
        "connect"
    } else {
        "request"
    };

    let detail = match error.source() {
        Some(e) => match e.source() {
            Some(e) => e.to_string(),
            None => e.to_string(),
        },
        None => error.to_string(),
    };

    format!("{kind}: {detail}")
}

fn is_ip_private(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            v4.is_loopback() || v4.is_private() || v4.is_link_local() || v4.is_unspecified()
        }
        IpAddr::V6(v6) => {
            v6.is_loopback() || v6.is_unspecified() || (v6.segments()[0] & 0xfe00) == 0xfc00
        }
    }
}

fn is_private_ip(host: &str) -> bool {
    use std::net::ToSocketAddrs;

    let host = host.trim_start_matches('[').trim_end_matches(']');
    if let Ok(ip) = host.parse::<IpAddr>() {
        return is_ip_private(&ip);
    }

    if let Ok(addrs) = (host, 80).to_socket_addrs() {
        for addr in addrs {
            if is_ip_private(&addr.ip()) {
                return true;
            }
        }
    }

    false
}

fn validate_url_policy(url: &url::Url, config: &NetworkConfig) -> Result<(), FetchError> {
    if !config.allowed_schemes.iter().any(|s| s == url.scheme()) {
        return Err(FetchError::Policy(format!(
            "scheme '{}' not allowed",
            url.scheme()
        )));
    }

    let host = url.host_str().unwrap_or_default();
    if host.is_empty() {
        return Err(FetchError::Policy("url has no host".to_string()));
    }

    if config
        .blocked_hosts
        .iter()
        .any(|h| h == host || host.ends_with(&format!(".{h}")))
    {
        return Err(FetchError::Policy(format!("host '{host}' is blocked")));
    }

    if config.block_private_ips && is_private_ip(host) {
        return Err(FetchError::Policy(format!(
            "host '{host}' resolves to a private address"
        )));
    }

    Ok(())
}

/// Protocol-relative urls are fetched over https.
pub fn normalize_url(url: &str) -> String {
    let url = url.trim();
    if url.starts_with("//") {
        format!("https:{url}")
    } else {
        url.to_string()
    }
}

/// Shared by every adapter and the validator. Owns the retry policy,
/// the identity rotation and the url policy.
#[derive(Clone)]
pub struct NetworkClient {
    transport: Arc<dyn HttpFetch>,
    identities: IdentityPool,
    config: NetworkConfig,
}

impl NetworkClient {
    pub fn new(config: &NetworkConfig) -> anyhow::Result<Self> {
        let transport = ReqwestFetcher::new(config)?;
        Ok(Self::with_transport(config, Arc::new(transport)))
    }

    pub fn with_transport(config: &NetworkConfig, transport: Arc<dyn HttpFetch>) -> Self {
        Self {
            transport,
            identities: IdentityPool::new(&config.user_agents),
            config: config.clone(),
        }
    }

    pub fn get(
        &self,
        url: &str,
        accept: Accept,
        accept_language: Option<&str>,
    ) -> Result<Response, FetchError> {
        self.send(Method::Get, url, accept, accept_language, self.config.max_attempts)
    }

    /// Single attempt, never retried
    pub fn head(&self, url: &str, accept: Accept) -> Result<Response, FetchError> {
        self.send(Method::Head, url, accept, None, 1)
    }

    fn send(
        &self,
        method: Method,
        url: &str,
        accept: Accept,
        accept_language: Option<&str>,
        max_attempts: u32,
    ) -> Result<Response, FetchError> {
        let url = normalize_url(url);
        let parsed = url::Url::parse(&url)
            .map_err(|e| FetchError::Permanent(format!("invalid url {url:?}: {e}")))?;

        validate_url_policy(&parsed, &self.config).inspect_err(|e| {
            log::warn!("{url}: {e}");
        })?;

        let iden = format!("{}{}", parsed.host_str().unwrap_or_default(), parsed.path());
        let accept_language = accept_language.unwrap_or(&self.config.accept_language);
        let max_attempts = max_attempts.max(1);

        let mut via_proxy = false;
        let mut last_error = String::new();

        for attempt in 1..=max_attempts {
            if attempt > 1 {
                log::debug!("{iden}: retrying ({attempt}/{max_attempts})");
            }

            let request = Request {
                method,
                url: url.clone(),
                headers: self.identities.headers(accept, accept_language),
                via_proxy,
            };

            log::debug!("{iden}: requesting {method:?}");

            let err = match self.transport.execute(&request) {
                Ok(resp) => match classify_status(resp.status) {
                    None => return Ok(resp),
                    Some(err) => err,
                },
                Err(err) => err,
            };

            if !err.is_transient() {
                log::debug!("{iden}: {err}");
                return Err(err);
            }

            log::debug!("{iden}: {err}");
            last_error = err.to_string();
            via_proxy = true;

            if attempt < max_attempts {
                sleep(Duration::from_millis(
                    self.config.retry_delay_ms * attempt as u64,
                ));
            }
        }

        Err(FetchError::Permanent(format!(
            "gave up after {max_attempts} attempts, last error {last_error}"
        )))
    }
}

fn classify_status(status: u16) -> Option<FetchError> {
    match status {
        429 | 503 => Some(FetchError::Transient(format!("HTTP {status}"))),
        s if s >= 400 => Some(FetchError::Permanent(format!("HTTP {status}"))),
        _ => None,
    }
}
