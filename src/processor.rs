use crate::{
    cascade::{Cascade, Resolution},
    catalog::{Catalog, CatalogError},
    config::SchedulerConfig,
    scrape::Accept,
    storage::AssetStore,
    types::{BookRequest, ResolutionStatus},
    validate::{self, ImageAsset},
};
use anyhow::Context;
use indicatif::ProgressBar;
use serde::Serialize;
use std::{
    fmt,
    panic::{catch_unwind, AssertUnwindSafe},
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicBool, Ordering},
        mpsc, Arc, Mutex,
    },
    thread::{self, sleep},
    time::{Duration, Instant},
};

/// Set from the interrupt handler; workers stop taking new books.
#[derive(Clone, Debug, Default)]
pub struct StopFlag(Arc<AtomicBool>);

impl StopFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub total: usize,
    pub found: usize,
    /// Subset of `found` that is below the quality gate
    pub sub_threshold: usize,
    pub defaulted: usize,
    pub skipped: usize,
    pub download_failures: usize,
    /// Books whose resolution panicked
    pub failed: usize,
    /// Books never dispatched because the run was stopped
    pub cancelled: usize,
}

impl RunSummary {
    /// Percentage of books that ended up with a real cover
    pub fn coverage(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        (self.found + self.skipped) as f64 * 100.0 / self.total as f64
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} books: {} found ({} below quality gate), {} placeholder, {} already done, {} failed, {} cancelled; coverage {:.1}%",
            self.total,
            self.found,
            self.sub_threshold,
            self.defaulted,
            self.skipped,
            self.failed,
            self.cancelled,
            self.coverage()
        )?;
        if self.download_failures > 0 {
            write!(f, ", {} downloads failed", self.download_failures)?;
        }
        Ok(())
    }
}

struct Job {
    index: usize,
    book: BookRequest,
    cover: Option<String>,
}

#[derive(Debug)]
enum BookOutcome {
    /// Nothing to do. `cover` is the reference to keep, if known.
    Skipped { cover: Option<String> },
    Resolved {
        cover: String,
        status: ResolutionStatus,
        sub_threshold: bool,
        download_failed: bool,
    },
    Failed(String),
}

/// Runs the cascade over a catalog with a bounded pool of workers.
/// Workers only resolve; the calling thread is the single writer of
/// the catalog.
pub struct Processor<'a> {
    cascade: &'a Cascade,
    config: SchedulerConfig,
    stop: StopFlag,
    progress: Option<ProgressBar>,
}

impl<'a> Processor<'a> {
    pub fn new(cascade: &'a Cascade, config: &SchedulerConfig) -> Self {
        Self {
            cascade,
            config: config.clone(),
            stop: StopFlag::new(),
            progress: None,
        }
    }

    pub fn with_stop_flag(mut self, stop: StopFlag) -> Self {
        self.stop = stop;
        self
    }

    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.progress = Some(progress);
        self
    }

    fn covers_dir(&self, catalog_dir: &Path) -> PathBuf {
        let dir = PathBuf::from(&self.config.covers_dir);
        if dir.is_absolute() {
            dir
        } else {
            catalog_dir.join(dir)
        }
    }

    /// What goes into `cover` for a downloaded file
    fn cover_ref(&self, file_name: &str) -> String {
        let prefix = self
            .config
            .cover_path_prefix
            .as_deref()
            .unwrap_or(&self.config.covers_dir);
        format!("{}/{file_name}", prefix.trim_end_matches('/'))
    }

    pub fn run(&self, catalog: &mut Catalog) -> anyhow::Result<RunSummary> {
        let assets = AssetStore::new(&self.covers_dir(&catalog.dir())).with_context(|| {
            format!("failed to create covers dir {}", self.config.covers_dir)
        })?;

        let total = catalog.records.len();
        let mut summary = RunSummary {
            total,
            ..Default::default()
        };
        if total == 0 {
            return Ok(summary);
        }

        let deadline = self
            .config
            .run_timeout_secs
            .map(|secs| Instant::now() + Duration::from_secs(secs));
        let workers = self.config.workers.clamp(1, total);

        let (job_tx, job_rx) = mpsc::channel::<Job>();
        for (index, record) in catalog.records.iter().enumerate() {
            let job = Job {
                index,
                book: record.request(),
                cover: record.cover().map(str::to_string),
            };
            // receiver outlives this loop
            let _ = job_tx.send(job);
        }
        drop(job_tx);
        let job_rx = Mutex::new(job_rx);

        let (result_tx, result_rx) = mpsc::channel::<(usize, BookOutcome)>();
        let mut received = 0;
        let mut save_error: Option<CatalogError> = None;

        log::info!("resolving {total} books with {workers} workers");

        thread::scope(|s| {
            for worker in 0..workers {
                let result_tx = result_tx.clone();
                let job_rx = &job_rx;
                let assets = &assets;

                s.spawn(move || {
                    let _span = tracing::info_span!("worker", id = worker).entered();
                    self.work(worker, job_rx, &result_tx, assets, deadline);
                });
            }
            drop(result_tx);

            for (index, outcome) in result_rx {
                received += 1;
                let record = &mut catalog.records[index];

                match outcome {
                    BookOutcome::Skipped { cover } => {
                        summary.skipped += 1;
                        if let Some(cover) = cover {
                            record.set_cover(&cover);
                        }
                    }
                    BookOutcome::Resolved {
                        cover,
                        status,
                        sub_threshold,
                        download_failed,
                    } => {
                        match status {
                            ResolutionStatus::Found => summary.found += 1,
                            ResolutionStatus::Defaulted => summary.defaulted += 1,
                        }
                        if sub_threshold {
                            summary.sub_threshold += 1;
                        }
                        if download_failed {
                            summary.download_failures += 1;
                        }
                        record.set_cover(&cover);
                    }
                    BookOutcome::Failed(_) => {
                        summary.failed += 1;
                        if record.cover().is_none() {
                            record.set_cover(self.cascade.placeholder_url());
                        }
                    }
                }

                if let Some(progress) = &self.progress {
                    progress.set_message(record.title().to_string());
                    progress.inc(1);
                }

                if self.config.flush_every_record && save_error.is_none() {
                    if let Err(err) = catalog.save() {
                        log::error!("{err}");
                        save_error = Some(err);
                        self.stop.stop();
                    }
                }
            }
        });

        summary.cancelled = total - received;

        if let Some(err) = save_error {
            return Err(err.into());
        }
        catalog.save()?;

        log::info!("{summary}");
        Ok(summary)
    }

    /// Worker loop: takes books until the queue drains or the run stops
    fn work(
        &self,
        worker: usize,
        job_rx: &Mutex<mpsc::Receiver<Job>>,
        result_tx: &mpsc::Sender<(usize, BookOutcome)>,
        assets: &AssetStore,
        deadline: Option<Instant>,
    ) {
        loop {
            if self.stop.is_stopped() {
                log::debug!("worker {worker}: stop requested");
                break;
            }
            if deadline.is_some_and(|d| Instant::now() >= d) {
                log::warn!("worker {worker}: run timeout reached");
                self.stop.stop();
                break;
            }

            let job = match job_rx.lock() {
                Ok(rx) => match rx.recv() {
                    Ok(job) => job,
                    Err(_) => break,
                },
                Err(_) => break,
            };

            let outcome = catch_unwind(AssertUnwindSafe(|| self.process(&job, assets)))
                .unwrap_or_else(|panic| {
                    let msg = panic
                        .downcast_ref::<&str>()
                        .map(|s| s.to_string())
                        .or_else(|| panic.downcast_ref::<String>().cloned())
                        .unwrap_or_else(|| "unknown panic".to_string());
                    log::error!("{:?}: resolution panicked: {msg}", job.book.title);
                    BookOutcome::Failed(msg)
                });

            let resolved = !matches!(outcome, BookOutcome::Skipped { .. });
            if result_tx.send((job.index, outcome)).is_err() {
                break;
            }

            // per worker, so the aggregate rate scales with the pool
            if resolved && self.config.politeness_delay_ms > 0 {
                sleep(Duration::from_millis(self.config.politeness_delay_ms));
            }
        }
    }

    fn process(&self, job: &Job, assets: &AssetStore) -> BookOutcome {
        let book = &job.book;
        let key = book.key();

        if let Some(file) = assets.find_existing(&key) {
            log::debug!("{:?}: cover already downloaded as {file}", book.title);
            return BookOutcome::Skipped {
                cover: Some(self.cover_ref(&file)),
            };
        }

        if !self.config.download {
            if let Some(cover) = &job.cover {
                if cover != self.cascade.placeholder_url() {
                    log::debug!("{:?}: already has cover {cover}", book.title);
                    return BookOutcome::Skipped { cover: None };
                }
            }
        }

        if book.title.is_empty() {
            log::warn!("record {} has no title, using placeholder", job.index);
            return BookOutcome::Resolved {
                cover: self.cascade.placeholder_url().to_string(),
                status: ResolutionStatus::Defaulted,
                sub_threshold: false,
                download_failed: false,
            };
        }

        let resolution = self.cascade.resolve(book);
        let result = resolution.result().clone();
        log::info!(
            "{:?} by {:?}: {:?} {} ({}ms)",
            book.title,
            book.author,
            result.status,
            result.url,
            resolution.report.duration_ms
        );

        if !self.config.download {
            return BookOutcome::Resolved {
                cover: result.url,
                status: result.status,
                sub_threshold: result.sub_threshold,
                download_failed: false,
            };
        }

        match self.download(&resolution, assets) {
            Ok(file) => BookOutcome::Resolved {
                cover: self.cover_ref(&file),
                status: result.status,
                sub_threshold: result.sub_threshold,
                download_failed: false,
            },
            Err(err) => {
                log::warn!("{:?}: download of {} failed: {err:#}", book.title, result.url);
                BookOutcome::Resolved {
                    cover: result.url,
                    status: result.status,
                    sub_threshold: result.sub_threshold,
                    download_failed: true,
                }
            }
        }
    }

    /// Stores the chosen image, reusing the bytes the validator fetched
    fn download(&self, resolution: &Resolution, assets: &AssetStore) -> anyhow::Result<String> {
        let result = resolution.result();

        let asset = match &resolution.asset {
            Some(asset) => asset.clone(),
            None => {
                let resp = self
                    .cascade
                    .network()
                    .get(&result.url, Accept::Image, None)?;
                ImageAsset {
                    content_type: resp.content_type(),
                    bytes: resp.body,
                }
            }
        };

        if validate::image_dimensions(&asset.bytes).is_none() {
            anyhow::bail!("response is not a decodable image");
        }

        let file = assets
            .store(
                &resolution.report.book.key(),
                &asset.bytes,
                asset.content_type.as_deref(),
                &result.url,
            )
            .context("failed to write cover")?;

        Ok(file)
    }
}
