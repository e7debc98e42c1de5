//! Caller-facing entry point. Every long operation runs on a spawned task and
//! reports through an event stream; the harvester itself never blocks on I/O.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::{stream::BoxStream, StreamExt};
use tokio::sync::mpsc::{self, UnboundedSender};
use tracing::{info, warn};

use super::batch::{BatchEvent, BatchOrchestrator, ExtractionOptions, RunOutcome};
use super::catalog::{CatalogEvent, ResolutionCatalog};
use super::download_coordinator::{DownloadCoordinator, DownloadEvent};
use super::event_stream;
use super::prober::Prober;
use crate::api::{ClientConfig, HttpClient};
use crate::domain::{AppError, DownloadTask, FilterMode, Result, RunState, ALL_SELECTION};

#[derive(Debug, Clone)]
pub struct HarvestConfig {
    pub client: ClientConfig,
    pub page_workers: usize,
    pub probe_workers: usize,
    pub download_workers: usize,
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            client: ClientConfig::default(),
            page_workers: 5,
            probe_workers: 10,
            download_workers: 10,
        }
    }
}

#[derive(Default)]
struct HarvestState {
    run_state: RunState,
    last_run: Option<RunOutcome>,
    catalog: Option<ResolutionCatalog>,
    /// Bumped on every new run so a catalog built for an older run is dropped.
    generation: u64,
}

#[derive(Clone)]
pub struct Harvester {
    cancel: Arc<AtomicBool>,
    state: Arc<Mutex<HarvestState>>,
    orchestrator: BatchOrchestrator,
    downloader: DownloadCoordinator,
    prober: Prober,
    probe_workers: usize,
}

impl Harvester {
    pub fn new(config: HarvestConfig) -> Result<Self> {
        let client = HttpClient::new(config.client)?;
        Ok(Self {
            cancel: Arc::new(AtomicBool::new(false)),
            state: Arc::default(),
            orchestrator: BatchOrchestrator::new(
                client.clone(),
                config.page_workers,
                config.probe_workers,
            ),
            downloader: DownloadCoordinator::new(client.clone(), config.download_workers),
            prober: Prober::new(client),
            probe_workers: config.probe_workers.max(1),
        })
    }

    fn lock_state(&self) -> MutexGuard<'_, HarvestState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Start a batch run over `pages`. The stream ends after `Completed`,
    /// `Cancelled` or `Failed`.
    pub fn start_extraction(
        &self,
        pages: Vec<String>,
        options: ExtractionOptions,
    ) -> BoxStream<'static, BatchEvent> {
        let (tx, rx) = mpsc::unbounded_channel();

        {
            let mut state = self.lock_state();
            if state.run_state == RunState::Running {
                let _ = tx.send(BatchEvent::Failed(AppError::Input(
                    "an extraction run is already active".to_string(),
                )));
                return event_stream(rx);
            }
            state.run_state = RunState::Running;
            state.last_run = None;
            state.catalog = None;
            state.generation += 1;
        }
        self.cancel.store(false, Ordering::SeqCst);

        let this = self.clone();
        tokio::spawn(async move {
            let result = this
                .orchestrator
                .run(pages, options, Arc::clone(&this.cancel), tx.clone())
                .await;

            match result {
                Ok(outcome) => {
                    let urls = outcome.image_urls();
                    let cancelled = outcome.state == RunState::Cancelled;
                    {
                        let mut state = this.lock_state();
                        state.run_state = outcome.state;
                        state.last_run = Some(outcome);
                    }
                    let event = if cancelled {
                        BatchEvent::Cancelled(urls)
                    } else {
                        BatchEvent::Completed(urls)
                    };
                    let _ = tx.send(event);
                }
                Err(err) => {
                    warn!(%err, "extraction run failed");
                    this.lock_state().run_state = RunState::Idle;
                    let _ = tx.send(BatchEvent::Failed(err));
                }
            }
        });

        event_stream(rx)
    }

    /// Ask every running operation to stop scheduling new work.
    pub fn cancel(&self) {
        info!("cancellation requested");
        self.cancel.store(true, Ordering::SeqCst);
    }

    pub fn run_state(&self) -> RunState {
        self.lock_state().run_state
    }

    pub fn last_results(&self) -> Option<RunOutcome> {
        self.lock_state().last_run.clone()
    }

    /// Re-probe the last completed run's images and replace the catalog.
    pub fn build_resolution_catalog(&self) -> BoxStream<'static, CatalogEvent> {
        let (tx, rx) = mpsc::unbounded_channel();

        let (images, generation) = {
            let state = self.lock_state();
            match &state.last_run {
                Some(run) if state.run_state == RunState::Completed => {
                    (run.images.clone(), state.generation)
                }
                _ => {
                    let _ = tx.send(CatalogEvent::Failed(AppError::Input(
                        "no completed extraction run to catalog".to_string(),
                    )));
                    return event_stream(rx);
                }
            }
        };
        self.cancel.store(false, Ordering::SeqCst);

        let this = self.clone();
        tokio::spawn(async move {
            let built = ResolutionCatalog::build(
                this.prober.clone(),
                images,
                this.probe_workers,
                Arc::clone(&this.cancel),
                tx.clone(),
            )
            .await;

            let Some(catalog) = built else {
                let _ = tx.send(CatalogEvent::Cancelled);
                return;
            };

            let values = catalog.distinct_values();
            {
                let mut state = this.lock_state();
                if state.generation != generation {
                    info!("discarding catalog built for a superseded run");
                    let _ = tx.send(CatalogEvent::Cancelled);
                    return;
                }
                state.catalog = Some(catalog);
            }
            let _ = tx.send(CatalogEvent::Completed(values));
        });

        event_stream(rx)
    }

    /// Distinct values for `mode`; only the `"all"` sentinel before a catalog exists.
    pub fn list_distinct(&self, mode: FilterMode) -> Vec<String> {
        match &self.lock_state().catalog {
            Some(catalog) => catalog.list_distinct(mode),
            None => vec![ALL_SELECTION.to_string()],
        }
    }

    /// Final list for an exact-value selection, always computed from the
    /// run's full result list.
    pub fn filter_by_selection(&self, mode: FilterMode, value: &str) -> Result<Vec<String>> {
        let state = self.lock_state();
        if let Some(catalog) = &state.catalog {
            return Ok(catalog.filter_by_selection(mode, value));
        }

        let narrowing = mode != FilterMode::None && value != ALL_SELECTION;
        match &state.last_run {
            Some(run) if !narrowing => Ok(run.image_urls()),
            Some(_) => Err(AppError::Input(
                "resolution catalog has not been built".to_string(),
            )),
            None => Err(AppError::Input("no extraction results".to_string())),
        }
    }

    /// Download `urls` into `dir`. Fails up front on empty input or when the
    /// directory cannot be created; otherwise reports each item.
    pub fn download_all(
        &self,
        urls: Vec<String>,
        dir: impl Into<PathBuf>,
        prefix: &str,
    ) -> BoxStream<'static, DownloadEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        if urls.is_empty() {
            let _ = tx.send(DownloadEvent::Failed(AppError::Input(
                "no image URLs to download".to_string(),
            )));
            return event_stream(rx);
        }

        let dir = dir.into();
        let tasks: Vec<DownloadTask> = {
            let referers = self.referers();
            urls.into_iter()
                .enumerate()
                .map(|(index, url)| DownloadTask {
                    referer: referers.get(&url).cloned().unwrap_or_else(|| url.clone()),
                    url,
                    destination_dir: dir.clone(),
                    filename_prefix: prefix.to_string(),
                    ordinal: index + 1,
                })
                .collect()
        };
        self.cancel.store(false, Ordering::SeqCst);

        let downloader = self.downloader.clone();
        let cancel = Arc::clone(&self.cancel);
        tokio::spawn(async move {
            if !prepare_dir(&dir, &tx).await {
                return;
            }
            downloader.download_all(tasks, cancel, tx).await;
        });

        event_stream(rx)
    }

    /// Download a single image, streaming byte progress.
    pub fn download_one(
        &self,
        url: &str,
        dir: impl Into<PathBuf>,
        prefix: &str,
    ) -> BoxStream<'static, DownloadEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        let task = DownloadTask {
            referer: self
                .referers()
                .remove(url)
                .unwrap_or_else(|| url.to_string()),
            url: url.to_string(),
            destination_dir: dir.into(),
            filename_prefix: prefix.to_string(),
            ordinal: 1,
        };

        let downloader = self.downloader.clone();
        tokio::spawn(async move {
            if !prepare_dir(&task.destination_dir, &tx).await {
                return;
            }
            let mut events = downloader.download_stream(task);
            while let Some(event) = events.next().await {
                if tx.send(event).is_err() {
                    break;
                }
            }
        });

        event_stream(rx)
    }

    /// Source page of every candidate in the last run, keyed by image URL.
    fn referers(&self) -> HashMap<String, String> {
        self.lock_state()
            .last_run
            .as_ref()
            .map(|run| {
                run.candidates
                    .iter()
                    .map(|c| (c.url.clone(), c.source_page.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }
}

async fn prepare_dir(dir: &Path, tx: &UnboundedSender<DownloadEvent>) -> bool {
    match tokio::fs::create_dir_all(dir).await {
        Ok(()) => true,
        Err(e) => {
            let _ = tx.send(DownloadEvent::Failed(AppError::Filesystem(format!(
                "Failed to create {}: {}",
                dir.display(),
                e
            ))));
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn harvester() -> Harvester {
        Harvester::new(HarvestConfig::default()).expect("harvester")
    }

    #[tokio::test]
    async fn second_run_is_rejected_while_first_is_active() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/")
            .with_status(200)
            .with_body("<p>nothing here</p>")
            .create_async()
            .await;

        let harvester = harvester();
        let first = harvester.start_extraction(vec![server.url()], ExtractionOptions::default());
        assert_eq!(harvester.run_state(), RunState::Running);

        let second: Vec<BatchEvent> = harvester
            .start_extraction(vec![server.url()], ExtractionOptions::default())
            .collect()
            .await;
        assert!(matches!(second.as_slice(), [BatchEvent::Failed(AppError::Input(_))]));

        let events: Vec<BatchEvent> = first.collect().await;
        assert!(matches!(events.last(), Some(BatchEvent::Completed(urls)) if urls.is_empty()));
        assert_eq!(harvester.run_state(), RunState::Completed);
    }

    #[tokio::test]
    async fn empty_input_fails_and_returns_to_idle() {
        let harvester = harvester();
        let events: Vec<BatchEvent> = harvester
            .start_extraction(Vec::new(), ExtractionOptions::default())
            .collect()
            .await;
        assert!(matches!(events.as_slice(), [BatchEvent::Failed(AppError::Input(_))]));
        assert_eq!(harvester.run_state(), RunState::Idle);
    }

    #[tokio::test]
    async fn catalog_requires_a_completed_run() {
        let events: Vec<CatalogEvent> = harvester().build_resolution_catalog().collect().await;
        assert!(matches!(events.as_slice(), [CatalogEvent::Failed(AppError::Input(_))]));
    }

    #[tokio::test]
    async fn selection_without_catalog() {
        let harvester = harvester();
        assert!(harvester
            .filter_by_selection(FilterMode::None, ALL_SELECTION)
            .is_err());
        assert_eq!(harvester.list_distinct(FilterMode::Width), vec!["all"]);
    }

    #[tokio::test]
    async fn download_all_rejects_empty_input() {
        let dir = tempfile::tempdir().expect("tempdir");
        let events: Vec<DownloadEvent> = harvester()
            .download_all(Vec::new(), dir.path(), "img")
            .collect()
            .await;
        assert!(matches!(events.as_slice(), [DownloadEvent::Failed(AppError::Input(_))]));
    }

    #[tokio::test]
    async fn download_into_unwritable_root_fails_up_front() {
        let dir = tempfile::tempdir().expect("tempdir");
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, b"not a directory").expect("seed");

        let events: Vec<DownloadEvent> = harvester()
            .download_all(
                vec!["http://127.0.0.1:9/a.png".to_string()],
                blocker.join("sub"),
                "img",
            )
            .collect()
            .await;
        assert!(matches!(
            events.as_slice(),
            [DownloadEvent::Failed(AppError::Filesystem(_))]
        ));
    }
}
