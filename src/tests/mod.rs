
mod cascade;

use crate::{
    cascade::Cascade,
    config::{CascadeConfig, NetworkConfig, SchedulerConfig},
    scrape::NetworkClient,
    sources::{Capability, SourceAdapter, SourceDescriptor, SourceError, SourceRegistry},
    types::{BookRequest, Candidate},
};
use mock::MockTransport;
use std::sync::{Arc, Mutex};

pub const PLACEHOLDER: &str = "https://placeholder.test/800/1200";

pub fn net_config() -> NetworkConfig {
    NetworkConfig {
        retry_delay_ms: 0,
        block_private_ips: false,
        ..Default::default()
    }
}

pub fn cascade_config() -> CascadeConfig {
    CascadeConfig {
        placeholder_url: PLACEHOLDER.to_string(),
        head_precheck: false,
        ..Default::default()
    }
}

pub fn scheduler_config() -> SchedulerConfig {
    SchedulerConfig {
        workers: 3,
        politeness_delay_ms: 0,
        flush_every_record: true,
        download: false,
        ..Default::default()
    }
}

/// `source:capability` in call order, shared by every source of a test
pub type CallLog = Arc<Mutex<Vec<String>>>;

type Produce = Box<dyn Fn(&BookRequest) -> Result<Vec<Candidate>, SourceError> + Send + Sync>;

fn produce(
    f: impl Fn(&BookRequest) -> Result<Vec<Candidate>, SourceError> + Send + Sync + 'static,
) -> Produce {
    Box::new(f)
}

/// Adapter with canned answers
pub struct StaticSource {
    descriptor: SourceDescriptor,
    search: Produce,
    link: Option<Produce>,
    log: CallLog,
}

impl StaticSource {
    pub fn new(name: &str, priority: u32, log: &CallLog) -> Self {
        Self {
            descriptor: SourceDescriptor::new(
                name,
                priority,
                &format!("https://{}.test", name.to_lowercase()),
                &[Capability::MetadataSearch],
            ),
            search: produce(|_| Ok(vec![])),
            link: None,
            log: log.clone(),
        }
    }

    /// Search always answers with these urls
    pub fn urls(self, urls: &[&str]) -> Self {
        let name = self.descriptor.name.clone();
        let urls = urls.iter().map(|u| u.to_string()).collect::<Vec<_>>();
        self.search_with(move |_| Ok(urls.iter().map(|u| Candidate::new(u, &name, 1.0)).collect()))
    }

    pub fn search_with(
        mut self,
        f: impl Fn(&BookRequest) -> Result<Vec<Candidate>, SourceError> + Send + Sync + 'static,
    ) -> Self {
        self.search = produce(f);
        self
    }

    /// Owns links on `domain` and answers link extraction with `urls`
    pub fn link(mut self, domain: &str, urls: &[&str]) -> Self {
        let name = self.descriptor.name.clone();
        let urls = urls.iter().map(|u| u.to_string()).collect::<Vec<_>>();
        self.descriptor = self.descriptor.with_link_domains(&[domain]);
        self.descriptor.capabilities = vec![Capability::LinkExtract, Capability::MetadataSearch];
        self.link = Some(produce(move |_| {
            Ok(urls.iter().map(|u| Candidate::new(u, &name, 1.0)).collect())
        }));
        self
    }

    pub fn boxed(self) -> Box<dyn SourceAdapter> {
        Box::new(self)
    }
}

impl SourceAdapter for StaticSource {
    fn descriptor(&self) -> &SourceDescriptor {
        &self.descriptor
    }

    fn search(&self, book: &BookRequest, _net: &NetworkClient) -> Result<Vec<Candidate>, SourceError> {
        self.log
            .lock()
            .unwrap()
            .push(format!("{}:{}", self.descriptor.name, Capability::MetadataSearch));
        (self.search)(book)
    }

    fn extract_from_link(
        &self,
        _link: &str,
        book: &BookRequest,
        _net: &NetworkClient,
    ) -> Result<Vec<Candidate>, SourceError> {
        self.log
            .lock()
            .unwrap()
            .push(format!("{}:{}", self.descriptor.name, Capability::LinkExtract));
        match &self.link {
            Some(f) => f(book),
            None => Err(SourceError::Unsupported),
        }
    }
}

pub fn cascade_with(
    sources: Vec<Box<dyn SourceAdapter>>,
    mock: &Arc<MockTransport>,
    config: &CascadeConfig,
) -> Cascade {
    let net = NetworkClient::with_transport(&net_config(), mock.clone());
    Cascade::new(SourceRegistry::new(sources).unwrap(), net, config)
}

pub fn new_log() -> CallLog {
    Arc::new(Mutex::new(vec![]))
}

pub fn calls(log: &CallLog) -> Vec<String> {
    log.lock().unwrap().clone()
}
