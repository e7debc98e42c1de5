use std::collections::{BTreeSet, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use futures::future::join_all;
use tokio::sync::{mpsc::UnboundedSender, Semaphore};
use tokio::task;
use tracing::{debug, info, warn};
use url::Url;

use super::prober::Prober;
use crate::api::HttpClient;
use crate::domain::{
    passes_filter, AppError, FilterCriteria, ImageCandidate, Phase, ProbedImage, Result, RunState,
};
use crate::extract::Extractor;
use crate::utils::is_image_url;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractionOptions {
    /// Probe and filter every candidate after extraction.
    pub verify_images: bool,
    pub criteria: FilterCriteria,
}

impl Default for ExtractionOptions {
    fn default() -> Self {
        Self {
            verify_images: true,
            criteria: FilterCriteria::default(),
        }
    }
}

#[derive(Debug, Clone)]
pub enum BatchEvent {
    Progress {
        current: usize,
        total: usize,
        phase: Phase,
    },
    /// Running count of distinct candidates aggregated so far.
    CandidateFound(usize),
    /// A single page or candidate failed; the run continues.
    Error {
        url: String,
        phase: Phase,
        message: String,
    },
    Completed(Vec<String>),
    /// Partial results gathered before cancellation was observed.
    Cancelled(Vec<String>),
    /// The run could not start.
    Failed(AppError),
}

/// What a finished run leaves behind.
#[derive(Debug, Clone, Default)]
pub struct RunOutcome {
    pub state: RunState,
    /// Every distinct candidate found during extraction.
    pub candidates: Vec<ImageCandidate>,
    /// The final list: verified and filtered candidates, or all of them when
    /// verification is off.
    pub images: Vec<ImageCandidate>,
}

impl RunOutcome {
    pub fn image_urls(&self) -> Vec<String> {
        self.images.iter().map(|c| c.url.clone()).collect()
    }
}

/// Set-semantics merge point for concurrent page workers.
#[derive(Debug, Default)]
struct CandidateAccumulator {
    seen: HashSet<String>,
    candidates: Vec<ImageCandidate>,
}

impl CandidateAccumulator {
    /// Merge one page's URLs and return the new distinct total.
    fn merge(&mut self, page: &str, urls: BTreeSet<String>) -> usize {
        for url in urls {
            if self.seen.insert(url.clone()) {
                self.candidates.push(ImageCandidate::new(url, page));
            }
        }
        self.candidates.len()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Drives pages through extraction and, optionally, verification.
#[derive(Clone)]
pub struct BatchOrchestrator {
    client: HttpClient,
    extractor: Extractor,
    prober: Prober,
    page_workers: usize,
    probe_workers: usize,
}

impl BatchOrchestrator {
    pub fn new(client: HttpClient, page_workers: usize, probe_workers: usize) -> Self {
        Self {
            extractor: Extractor::new(client.clone()),
            prober: Prober::new(client.clone()),
            client,
            page_workers: page_workers.max(1),
            probe_workers: probe_workers.max(1),
        }
    }

    /// Run one batch to completion or cancellation. Only an empty page list
    /// fails the whole run; everything else is reported per unit.
    pub async fn run(
        &self,
        pages: Vec<String>,
        options: ExtractionOptions,
        cancel: Arc<AtomicBool>,
        events: UnboundedSender<BatchEvent>,
    ) -> Result<RunOutcome> {
        let pages: Vec<String> = pages
            .into_iter()
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty())
            .collect();
        if pages.is_empty() {
            return Err(AppError::Input("no page URLs supplied".to_string()));
        }

        info!(pages = pages.len(), "starting extraction");
        let candidates = self.extract_all(pages, &cancel, &events).await;

        if cancel.load(Ordering::SeqCst) {
            info!(candidates = candidates.len(), "run cancelled during extraction");
            return Ok(RunOutcome {
                state: RunState::Cancelled,
                images: candidates.clone(),
                candidates,
            });
        }

        if !options.verify_images || candidates.is_empty() {
            return Ok(RunOutcome {
                state: RunState::Completed,
                images: candidates.clone(),
                candidates,
            });
        }

        let images = self
            .verify_all(&candidates, &options.criteria, &cancel, &events)
            .await;
        let state = if cancel.load(Ordering::SeqCst) {
            RunState::Cancelled
        } else {
            RunState::Completed
        };
        info!(
            candidates = candidates.len(),
            images = images.len(),
            ?state,
            "run finished"
        );

        Ok(RunOutcome {
            state,
            candidates,
            images,
        })
    }

    /// Phase A: one worker per page, bounded by `page_workers`.
    async fn extract_all(
        &self,
        pages: Vec<String>,
        cancel: &Arc<AtomicBool>,
        events: &UnboundedSender<BatchEvent>,
    ) -> Vec<ImageCandidate> {
        let total = pages.len();
        let accumulator = Arc::new(Mutex::new(CandidateAccumulator::default()));
        let processed = Arc::new(AtomicUsize::new(0));
        let semaphore = Arc::new(Semaphore::new(self.page_workers));
        let mut handles = Vec::with_capacity(total);

        let _ = events.send(BatchEvent::Progress {
            current: 0,
            total,
            phase: Phase::Extraction,
        });

        for page in pages {
            let Ok(permit) = semaphore.clone().acquire_owned().await else {
                break;
            };
            if cancel.load(Ordering::SeqCst) {
                break;
            }

            let this = self.clone();
            let cancel = Arc::clone(cancel);
            let events = events.clone();
            let accumulator = Arc::clone(&accumulator);
            let processed = Arc::clone(&processed);

            handles.push(task::spawn(async move {
                let _permit = permit;
                if cancel.load(Ordering::SeqCst) {
                    return;
                }

                let result = this.extract_page(&page).await;
                if cancel.load(Ordering::SeqCst) {
                    debug!(page = %page, "discarding page result after cancellation");
                    return;
                }

                match result {
                    Ok(urls) => {
                        let found = lock(&accumulator).merge(&page, urls);
                        let _ = events.send(BatchEvent::CandidateFound(found));
                    }
                    Err(err) => {
                        warn!(page = %page, %err, "page extraction failed");
                        let _ = events.send(BatchEvent::Error {
                            url: page.clone(),
                            phase: Phase::Extraction,
                            message: err.to_string(),
                        });
                    }
                }

                let current = processed.fetch_add(1, Ordering::SeqCst) + 1;
                let _ = events.send(BatchEvent::Progress {
                    current,
                    total,
                    phase: Phase::Extraction,
                });
            }));
        }

        for joined in join_all(handles).await {
            if let Err(err) = joined {
                warn!(%err, "page worker panicked");
            }
        }

        let candidates = std::mem::take(&mut lock(&accumulator).candidates);
        candidates
    }

    /// A page URL that is itself an image becomes a single candidate;
    /// anything else is fetched and run through the extractor.
    async fn extract_page(&self, page: &str) -> Result<BTreeSet<String>> {
        Url::parse(page).map_err(|e| AppError::Input(format!("invalid page URL: {}", e)))?;

        if is_image_url(page) {
            match self.client.is_image_resource(page).await {
                Ok(true) => return Ok(BTreeSet::from([page.to_string()])),
                Ok(false) => {}
                Err(err) => debug!(page, %err, "direct image check failed"),
            }
        }

        let body = self.client.fetch_page(page).await?;
        Ok(self.extractor.extract(&body.text, page).await)
    }

    /// Phase B: probe and filter every candidate, bounded by `probe_workers`.
    /// The returned list keeps extraction order.
    async fn verify_all(
        &self,
        candidates: &[ImageCandidate],
        criteria: &FilterCriteria,
        cancel: &Arc<AtomicBool>,
        events: &UnboundedSender<BatchEvent>,
    ) -> Vec<ImageCandidate> {
        let total = candidates.len();
        let accepted: Arc<Mutex<Vec<(usize, ProbedImage)>>> = Arc::new(Mutex::new(Vec::new()));
        let verified = Arc::new(AtomicUsize::new(0));
        let semaphore = Arc::new(Semaphore::new(self.probe_workers));
        let mut handles = Vec::with_capacity(total);

        let _ = events.send(BatchEvent::Progress {
            current: 0,
            total,
            phase: Phase::Verification,
        });

        for (index, candidate) in candidates.iter().cloned().enumerate() {
            let Ok(permit) = semaphore.clone().acquire_owned().await else {
                break;
            };
            if cancel.load(Ordering::SeqCst) {
                break;
            }

            let prober = self.prober.clone();
            let criteria = criteria.clone();
            let cancel = Arc::clone(cancel);
            let events = events.clone();
            let accepted = Arc::clone(&accepted);
            let verified = Arc::clone(&verified);

            handles.push(task::spawn(async move {
                let _permit = permit;
                if cancel.load(Ordering::SeqCst) {
                    return;
                }

                let result = prober.probe(&candidate).await;
                if cancel.load(Ordering::SeqCst) {
                    return;
                }

                match result {
                    Ok(probed) if passes_filter(&probed, &criteria) => {
                        lock(&accepted).push((index, probed));
                    }
                    Ok(probed) => {
                        debug!(url = %candidate.url, resolution = %probed.resolution, "filtered out");
                    }
                    Err(err) if err.is_rejection() => {
                        debug!(url = %candidate.url, %err, "not an image");
                    }
                    Err(err) => {
                        debug!(url = %candidate.url, %err, "probe failed");
                        let _ = events.send(BatchEvent::Error {
                            url: candidate.url.clone(),
                            phase: Phase::Verification,
                            message: err.to_string(),
                        });
                    }
                }

                let current = verified.fetch_add(1, Ordering::SeqCst) + 1;
                let _ = events.send(BatchEvent::Progress {
                    current,
                    total,
                    phase: Phase::Verification,
                });
            }));
        }

        for joined in join_all(handles).await {
            if let Err(err) = joined {
                warn!(%err, "probe worker panicked");
            }
        }

        let mut accepted = std::mem::take(&mut *lock(&accepted));
        accepted.sort_by_key(|(index, _)| *index);
        accepted
            .into_iter()
            .map(|(_, probed)| probed.candidate)
            .collect()
    }
}
