use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use futures::future::join_all;
use serde::Serialize;
use tokio::sync::{mpsc::UnboundedSender, Semaphore};
use tokio::task;
use tracing::{debug, info, warn};

use super::prober::Prober;
use crate::domain::filter::matches_dimensions;
use crate::domain::{AppError, FilterMode, ImageCandidate, Phase, ALL_SELECTION};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dimensions {
    pub resolution: String,
    pub width: u32,
    pub height: u32,
}

impl Dimensions {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            resolution: format!("{}x{}", width, height),
            width,
            height,
        }
    }

    fn area(&self) -> u64 {
        u64::from(self.width) * u64::from(self.height)
    }

    fn matches(&self, mode: FilterMode, value: &str) -> bool {
        matches_dimensions(&self.resolution, self.width, self.height, mode, value)
    }
}

/// Selectable values per mode, each list led by [`ALL_SELECTION`].
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct DistinctValues {
    pub resolutions: Vec<String>,
    pub widths: Vec<String>,
    pub heights: Vec<String>,
}

#[derive(Debug, Clone)]
pub enum CatalogEvent {
    Progress { current: usize, total: usize },
    /// One image could not be re-probed; the build continues without it.
    Error {
        url: String,
        phase: Phase,
        message: String,
    },
    Completed(DistinctValues),
    Cancelled,
    Failed(AppError),
}

/// Dimensions of one run's final image list, built in a single pass and
/// replaced as a whole on the next build.
#[derive(Debug, Clone, Default)]
pub struct ResolutionCatalog {
    original: Vec<String>,
    entries: HashMap<String, Dimensions>,
}

impl ResolutionCatalog {
    pub fn from_entries(original: Vec<String>, entries: HashMap<String, Dimensions>) -> Self {
        Self { original, entries }
    }

    /// Re-probe every image and record its dimensions. Returns `None` when
    /// cancellation was observed before the pass finished.
    pub async fn build(
        prober: Prober,
        images: Vec<ImageCandidate>,
        workers: usize,
        cancel: Arc<AtomicBool>,
        events: UnboundedSender<CatalogEvent>,
    ) -> Option<Self> {
        let total = images.len();
        let original: Vec<String> = images.iter().map(|c| c.url.clone()).collect();
        let entries = Arc::new(Mutex::new(HashMap::with_capacity(total)));
        let done = Arc::new(AtomicUsize::new(0));
        let semaphore = Arc::new(Semaphore::new(workers.max(1)));
        let mut handles = Vec::with_capacity(total);

        info!(images = total, "building resolution catalog");
        let _ = events.send(CatalogEvent::Progress { current: 0, total });

        for candidate in images {
            let Ok(permit) = semaphore.clone().acquire_owned().await else {
                break;
            };
            if cancel.load(Ordering::SeqCst) {
                break;
            }

            let prober = prober.clone();
            let cancel = Arc::clone(&cancel);
            let events = events.clone();
            let entries = Arc::clone(&entries);
            let done = Arc::clone(&done);

            handles.push(task::spawn(async move {
                let _permit = permit;
                if cancel.load(Ordering::SeqCst) {
                    return;
                }

                match prober.probe(&candidate).await {
                    Ok(probed) => {
                        entries
                            .lock()
                            .unwrap_or_else(PoisonError::into_inner)
                            .insert(candidate.url, Dimensions::new(probed.width, probed.height));
                    }
                    Err(err) if err.is_rejection() => {
                        debug!(url = %candidate.url, %err, "no longer an image");
                    }
                    Err(err) => {
                        debug!(url = %candidate.url, %err, "catalog probe failed");
                        let _ = events.send(CatalogEvent::Error {
                            url: candidate.url.clone(),
                            phase: Phase::Catalog,
                            message: err.to_string(),
                        });
                    }
                }

                let current = done.fetch_add(1, Ordering::SeqCst) + 1;
                let _ = events.send(CatalogEvent::Progress { current, total });
            }));
        }

        for joined in join_all(handles).await {
            if let Err(err) = joined {
                warn!(%err, "catalog worker panicked");
            }
        }

        if cancel.load(Ordering::SeqCst) {
            info!("catalog build cancelled");
            return None;
        }

        let entries = std::mem::take(&mut *entries.lock().unwrap_or_else(PoisonError::into_inner));
        Some(Self::from_entries(original, entries))
    }

    /// Distinct values for a mode: resolutions by descending area, widths and
    /// heights descending. [`FilterMode::None`] yields only the sentinel.
    pub fn list_distinct(&self, mode: FilterMode) -> Vec<String> {
        let mut values = vec![ALL_SELECTION.to_string()];
        match mode {
            FilterMode::None => {}
            FilterMode::Resolution => {
                let mut dims: Vec<&Dimensions> = self.entries.values().collect();
                dims.sort_by(|a, b| {
                    b.area()
                        .cmp(&a.area())
                        .then(b.width.cmp(&a.width))
                        .then(b.height.cmp(&a.height))
                });
                dims.dedup_by(|a, b| a.resolution == b.resolution);
                values.extend(dims.into_iter().map(|d| d.resolution.clone()));
            }
            FilterMode::Width | FilterMode::Height => {
                let distinct: BTreeSet<u32> = self
                    .entries
                    .values()
                    .map(|d| {
                        if mode == FilterMode::Width {
                            d.width
                        } else {
                            d.height
                        }
                    })
                    .collect();
                values.extend(distinct.into_iter().rev().map(|v| v.to_string()));
            }
        }
        values
    }

    pub fn distinct_values(&self) -> DistinctValues {
        DistinctValues {
            resolutions: self.list_distinct(FilterMode::Resolution),
            widths: self.list_distinct(FilterMode::Width),
            heights: self.list_distinct(FilterMode::Height),
        }
    }

    /// Narrow the run's original list to one exact value. Always starts from
    /// the original list, so `"all"` restores it in full.
    pub fn filter_by_selection(&self, mode: FilterMode, value: &str) -> Vec<String> {
        if mode == FilterMode::None || value == ALL_SELECTION {
            return self.original.clone();
        }

        self.original
            .iter()
            .filter(|url| {
                self.entries
                    .get(url.as_str())
                    .is_some_and(|dims| dims.matches(mode, value))
            })
            .cloned()
            .collect()
    }

    pub fn original(&self) -> &[String] {
        &self.original
    }

    pub fn dimensions(&self, url: &str) -> Option<&Dimensions> {
        self.entries.get(url)
    }
}
