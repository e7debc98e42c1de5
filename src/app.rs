use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use futures::StreamExt;
use tracing::debug;

use crate::cli::Args;
use crate::ui::{StatusMessage, StatusView};
use simple_image_downloader::{
    api::ClientConfig,
    application::{
        BatchEvent, CatalogEvent, DistinctValues, DownloadEvent, ExtractionOptions, HarvestConfig,
        Harvester,
    },
    domain::{AppError, DownloadStatus, FilterCriteria, Phase},
    utils::read_url_list,
};

pub struct HarvestApp {
    view: StatusView,
    harvester: Harvester,
    results: Vec<String>,
    distinct: Option<DistinctValues>,
    failure: Option<AppError>,
    cancelled: bool,
    /// Set by Ctrl-C. Unlike the harvester's flag, nothing resets it.
    interrupted: Arc<AtomicBool>,
}

impl HarvestApp {
    pub fn new(args: &Args) -> Result<Self> {
        let config = HarvestConfig {
            client: ClientConfig::default(),
            page_workers: args.page_workers,
            probe_workers: args.probe_workers,
            download_workers: args.download_workers,
        };
        let harvester = Harvester::new(config).context("Failed to build HTTP client")?;

        Ok(Self {
            view: StatusView::default(),
            harvester,
            results: Vec::new(),
            distinct: None,
            failure: None,
            cancelled: false,
            interrupted: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Handle for the signal task: stops the running operation and every
    /// phase after it.
    pub fn interrupter(&self) -> Interrupter {
        Interrupter {
            flag: Arc::clone(&self.interrupted),
            harvester: self.harvester.clone(),
        }
    }

    fn stop_requested(&mut self) -> bool {
        if self.interrupted.load(Ordering::SeqCst) {
            self.view
                .update(StatusMessage::Done("Interrupted".to_string()));
            return true;
        }
        self.cancelled
    }
}

#[derive(Clone)]
pub struct Interrupter {
    flag: Arc<AtomicBool>,
    harvester: Harvester,
}

impl Interrupter {
    /// Record an interrupt. Returns false when one was already recorded.
    pub fn interrupt(&self) -> bool {
        let first = !self.flag.swap(true, Ordering::SeqCst);
        self.harvester.cancel();
        first
    }
}

#[derive(Debug, Clone)]
pub enum Message {
    Batch(BatchEvent),
    Catalog(CatalogEvent),
    Download(DownloadEvent),
}

pub fn update(app: &mut HarvestApp, message: Message) {
    match message {
        Message::Batch(event) => match event {
            BatchEvent::Progress {
                current,
                total,
                phase,
            } => app.view.update(StatusMessage::Progress {
                label: phase.to_string(),
                current,
                total,
            }),
            BatchEvent::CandidateFound(count) => {
                app.view
                    .update(StatusMessage::Status(format!("{} candidates", count)));
            }
            BatchEvent::Error {
                url,
                phase,
                message,
            } => app.view.update(StatusMessage::Note(format!(
                "[{}] {}: {}",
                phase, url, message
            ))),
            BatchEvent::Completed(urls) => {
                app.view
                    .update(StatusMessage::Done(format!("Found {} images", urls.len())));
                app.results = urls;
            }
            BatchEvent::Cancelled(urls) => {
                app.view.update(StatusMessage::Done(format!(
                    "Cancelled, {} images found so far",
                    urls.len()
                )));
                app.results = urls;
                app.cancelled = true;
            }
            BatchEvent::Failed(err) => app.failure = Some(err),
        },
        Message::Catalog(event) => match event {
            CatalogEvent::Progress { current, total } => {
                app.view.update(StatusMessage::Progress {
                    label: "catalog".to_string(),
                    current,
                    total,
                })
            }
            CatalogEvent::Error {
                url,
                phase,
                message,
            } => app.view.update(StatusMessage::Note(format!(
                "[{}] {}: {}",
                phase, url, message
            ))),
            CatalogEvent::Completed(values) => {
                app.view.update(StatusMessage::Done(format!(
                    "Catalogued {} distinct resolutions",
                    values.resolutions.len().saturating_sub(1)
                )));
                app.distinct = Some(values);
            }
            CatalogEvent::Cancelled => {
                app.view
                    .update(StatusMessage::Done("Catalog cancelled".to_string()));
                app.cancelled = true;
            }
            CatalogEvent::Failed(err) => app.failure = Some(err),
        },
        Message::Download(event) => match event {
            DownloadEvent::Progress { current, total } => {
                app.view.update(StatusMessage::Progress {
                    label: "download".to_string(),
                    current,
                    total,
                })
            }
            DownloadEvent::Transfer(progress) => app.view.update(StatusMessage::Transfer(progress)),
            DownloadEvent::Item(result) => match result.status {
                DownloadStatus::Success { path } => {
                    debug!(url = %result.url, path = %path.display(), "saved");
                }
                DownloadStatus::Failed { reason } => app.view.update(StatusMessage::Note(
                    format!("[{}] {}: {}", Phase::Download, result.url, reason),
                )),
            },
            DownloadEvent::Finished { success, total } => {
                app.view.update(StatusMessage::Done(format!(
                    "Downloaded {}/{} images",
                    success, total
                )));
            }
            DownloadEvent::Completed(path) => {
                app.view
                    .update(StatusMessage::Done(format!("Saved: {}", path.display())));
            }
            DownloadEvent::Failed(err) => app.failure = Some(err),
        },
    }
}

/// Extraction, optional catalog and selection, then download.
pub async fn run(app: &mut HarvestApp, args: &Args) -> Result<()> {
    let mut pages = args.urls.clone();
    if let Some(path) = &args.url_file {
        pages.extend(read_url_list(path)?);
    }
    if pages.is_empty() {
        bail!("No page URLs given; pass URLs or --url-file");
    }

    let options = ExtractionOptions {
        verify_images: !args.no_verify,
        criteria: FilterCriteria {
            min_width: args.min_width,
            min_height: args.min_height,
            skip_small_icons: args.skip_small,
            exclude_gif: args.exclude_gif,
            ..Default::default()
        },
    };

    if app.stop_requested() {
        return Ok(());
    }
    let mut events = app.harvester.start_extraction(pages, options);
    while let Some(event) = events.next().await {
        update(app, Message::Batch(event));
    }
    check(app)?;
    if let Some(outcome) = app.harvester.last_results() {
        debug!(
            candidates = outcome.candidates.len(),
            images = outcome.images.len(),
            "extraction summary"
        );
    }
    if app.stop_requested() {
        return Ok(());
    }

    let selection = args.selection();
    if args.list_resolutions || selection.is_some() {
        let mut events = app.harvester.build_resolution_catalog();
        while let Some(event) = events.next().await {
            update(app, Message::Catalog(event));
        }
        check(app)?;
        if app.stop_requested() {
            return Ok(());
        }
    }

    if args.list_resolutions {
        if let Some(values) = &app.distinct {
            if args.json {
                println!("{}", serde_json::to_string_pretty(values)?);
            } else {
                println!("resolutions: {}", values.resolutions.join(", "));
                println!("widths: {}", values.widths.join(", "));
                println!("heights: {}", values.heights.join(", "));
            }
        }
        return Ok(());
    }

    if let Some((mode, value)) = selection {
        app.results = app.harvester.filter_by_selection(mode, &value)?;
        println!("{} images match {} = {}", app.results.len(), mode, value);
    }

    if args.dry_run {
        if args.json {
            println!("{}", serde_json::to_string_pretty(&app.results)?);
        } else {
            for url in &app.results {
                println!("{}", url);
            }
        }
        return Ok(());
    }
    if app.results.is_empty() {
        println!("Nothing to download");
        return Ok(());
    }
    if app.stop_requested() {
        return Ok(());
    }

    let mut events = if app.results.len() == 1 {
        app.harvester
            .download_one(&app.results[0], args.output.clone(), &args.prefix)
    } else {
        app.harvester
            .download_all(app.results.clone(), args.output.clone(), &args.prefix)
    };
    while let Some(event) = events.next().await {
        update(app, Message::Download(event));
    }
    check(app)
}

fn check(app: &mut HarvestApp) -> Result<()> {
    match app.failure.take() {
        Some(err) => Err(err.into()),
        None => Ok(()),
    }
}
