use crate::{
    config::{CascadeConfig, Config},
    scrape::NetworkClient,
    sources::{Capability, SourceAdapter, SourceError, SourceRegistry},
    types::{
        AttemptOutcome, BookRequest, Candidate, ResolutionReport, ResolutionResult,
        SourceAttempt,
    },
    validate::{ImageAsset, Validator},
};
use std::{
    collections::HashSet,
    time::{Duration, Instant},
};

/// Outcome of one resolution. `asset` holds the chosen image's bytes
/// when the validator already downloaded them.
#[derive(Debug, Clone)]
pub struct Resolution {
    pub report: ResolutionReport,
    pub asset: Option<ImageAsset>,
}

impl Resolution {
    pub fn result(&self) -> &ResolutionResult {
        &self.report.result
    }
}

struct Step<'a> {
    source: &'a dyn SourceAdapter,
    capability: Capability,
}

/// Tries sources in order and stops at the first candidate that passes
/// the quality gate. Otherwise falls back to the largest rejected
/// candidate, then to the placeholder.
pub struct Cascade {
    registry: SourceRegistry,
    validator: Validator,
    net: NetworkClient,
    config: CascadeConfig,
}

impl Cascade {
    pub fn new(registry: SourceRegistry, net: NetworkClient, config: &CascadeConfig) -> Self {
        Self {
            validator: Validator::new(net.clone(), config.head_precheck),
            registry,
            net,
            config: config.clone(),
        }
    }

    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let net = NetworkClient::new(&config.network)?;
        let registry = SourceRegistry::from_config(&config.sources)?;
        Ok(Self::new(registry, net, &config.cascade))
    }

    pub fn network(&self) -> &NetworkClient {
        &self.net
    }

    pub fn registry(&self) -> &SourceRegistry {
        &self.registry
    }

    pub fn placeholder_url(&self) -> &str {
        &self.config.placeholder_url
    }

    /// Direct link extraction first, when the purchase link belongs to a
    /// known source, then every source's search in priority order.
    fn plan(&self, book: &BookRequest) -> Vec<Step<'_>> {
        let mut steps = vec![];

        if let Some(link) = &book.purchase_link {
            if let Some(source) = self.registry.link_source(link) {
                steps.push(Step {
                    source,
                    capability: Capability::LinkExtract,
                });
            }
        }

        for source in self.registry.iter() {
            if source.descriptor().supports(Capability::MetadataSearch) {
                steps.push(Step {
                    source,
                    capability: Capability::MetadataSearch,
                });
            }
        }

        steps
    }

    fn run_step(&self, step: &Step, book: &BookRequest) -> Result<Vec<Candidate>, SourceError> {
        match step.capability {
            Capability::LinkExtract => {
                let link = book.purchase_link.as_deref().unwrap_or_default();
                step.source.extract_from_link(link, book, &self.net)
            }
            Capability::MetadataSearch => step.source.search(book, &self.net),
        }
    }

    pub fn resolve(&self, book: &BookRequest) -> Resolution {
        let started = Instant::now();
        let deadline = self
            .config
            .time_budget_secs
            .map(|secs| started + Duration::from_secs(secs));

        let mut attempts: Vec<SourceAttempt> = vec![];
        let mut seen: HashSet<String> = HashSet::new();
        let mut best_rejected: Option<(Candidate, Option<ImageAsset>)> = None;
        let mut link_source_yielded: Option<String> = None;
        let mut steps_run = 0;

        for step in self.plan(book) {
            let name = step.source.name().to_string();
            let skip = |reason: &str| SourceAttempt {
                source: name.clone(),
                capability: step.capability,
                outcome: AttemptOutcome::Skipped(reason.to_string()),
                probed: 0,
                duration_ms: 0,
            };

            if step.capability == Capability::MetadataSearch
                && link_source_yielded.as_deref() == Some(name.as_str())
            {
                attempts.push(skip("purchase link already produced candidates"));
                continue;
            }

            if self.config.max_sources.is_some_and(|max| steps_run >= max) {
                log::debug!("source={name} outcome=skip reason=source_budget");
                attempts.push(skip("source budget exhausted"));
                continue;
            }

            if deadline.is_some_and(|d| Instant::now() >= d) {
                log::debug!("source={name} outcome=skip reason=time_budget");
                attempts.push(skip("time budget exhausted"));
                continue;
            }

            steps_run += 1;
            let step_started = Instant::now();

            let candidates = match self.run_step(&step, book) {
                Ok(candidates) => candidates,
                Err(err) => {
                    log::warn!(
                        "source={name} capability={} outcome=error err={err}",
                        step.capability
                    );
                    attempts.push(SourceAttempt {
                        source: name,
                        capability: step.capability,
                        outcome: AttemptOutcome::Error(err.to_string()),
                        probed: 0,
                        duration_ms: step_started.elapsed().as_millis() as u64,
                    });
                    continue;
                }
            };

            if step.capability == Capability::LinkExtract && !candidates.is_empty() {
                link_source_yielded = Some(name.clone());
            }

            let mut probed = 0;
            let mut step_best: Option<Candidate> = None;

            let fresh = candidates
                .into_iter()
                .filter(|c| !c.url.trim().is_empty() && seen.insert(c.url.clone()))
                .take(self.config.probe_limit);

            for mut candidate in fresh {
                probed += 1;
                let validation = self.validator.validate(&candidate.url);
                candidate.width = validation.width;
                candidate.height = validation.height;

                if validation.accepted {
                    log::info!(
                        "source={name} capability={} outcome=accepted url={} size={}x{}",
                        step.capability,
                        candidate.url,
                        candidate.width,
                        candidate.height
                    );
                    attempts.push(SourceAttempt {
                        source: name,
                        capability: step.capability,
                        outcome: AttemptOutcome::Accepted {
                            url: candidate.url.clone(),
                            width: candidate.width,
                            height: candidate.height,
                        },
                        probed,
                        duration_ms: step_started.elapsed().as_millis() as u64,
                    });

                    return Resolution {
                        report: ResolutionReport {
                            book: book.clone(),
                            result: ResolutionResult::found(&candidate, false),
                            attempts,
                            duration_ms: started.elapsed().as_millis() as u64,
                        },
                        asset: validation.asset,
                    };
                }

                if step_best
                    .as_ref()
                    .map_or(true, |best| candidate.area() > best.area())
                {
                    step_best = Some(candidate.clone());
                }

                // undecodable candidates rank with zero area; ties keep the first seen
                if best_rejected
                    .as_ref()
                    .map_or(true, |(best, _)| candidate.area() > best.area())
                {
                    best_rejected = Some((candidate, validation.asset));
                }
            }

            let outcome = match step_best {
                None => AttemptOutcome::NoCandidate,
                Some(best) => AttemptOutcome::Rejected {
                    url: best.url,
                    width: best.width,
                    height: best.height,
                },
            };
            log::debug!(
                "source={name} capability={} outcome={outcome:?} probed={probed}",
                step.capability
            );

            attempts.push(SourceAttempt {
                source: name,
                capability: step.capability,
                outcome,
                probed,
                duration_ms: step_started.elapsed().as_millis() as u64,
            });
        }

        let (result, asset) = match best_rejected {
            Some((candidate, asset)) => {
                log::info!(
                    "{:?}: no candidate passed the quality gate, using best {}x{} from {}",
                    book.title,
                    candidate.width,
                    candidate.height,
                    candidate.source_name
                );
                (ResolutionResult::found(&candidate, true), asset)
            }
            None => {
                log::warn!(
                    "{:?} by {:?}: no source produced a cover, using placeholder",
                    book.title,
                    book.author
                );
                (ResolutionResult::defaulted(&self.config.placeholder_url), None)
            }
        };

        Resolution {
            report: ResolutionReport {
                book: book.clone(),
                result,
                attempts,
                duration_ms: started.elapsed().as_millis() as u64,
            },
            asset,
        }
    }
}
