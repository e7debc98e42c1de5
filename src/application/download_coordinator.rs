use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use futures::{future::join_all, stream::BoxStream, StreamExt};
use tokio::io::AsyncWriteExt;
use tokio::sync::{mpsc::UnboundedSender, Semaphore};
use tokio::task;
use tracing::{debug, info, warn};

use crate::{
    api::HttpClient,
    domain::{AppError, DownloadResult, DownloadStatus, DownloadTask},
    utils::image_filename,
};

#[derive(Debug, Clone)]
pub enum DownloadEvent {
    /// Items finished so far in a batch.
    Progress { current: usize, total: usize },
    /// Byte progress of a single download, 0.0 to 1.0 when the size is known.
    Transfer(f32),
    Item(DownloadResult),
    Finished { success: usize, total: usize },
    Completed(PathBuf),
    Failed(AppError),
}

/// Paths handed out to in-flight downloads but not yet on disk.
type Reservations = Arc<Mutex<HashSet<PathBuf>>>;

#[derive(Clone)]
pub struct DownloadCoordinator {
    client: HttpClient,
    workers: usize,
    reserved: Reservations,
}

impl DownloadCoordinator {
    pub fn new(client: HttpClient, workers: usize) -> Self {
        Self {
            client,
            workers: workers.max(1),
            reserved: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Download one image, yielding transfer progress and ending with
    /// `Completed(path)` or `Failed(err)`. A failed download leaves no file behind.
    pub fn download_stream(&self, task: DownloadTask) -> BoxStream<'static, DownloadEvent> {
        futures::stream::unfold(
            DownloadRuntimeState::Start {
                client: self.client.clone(),
                reserved: Arc::clone(&self.reserved),
                task,
            },
            |state| async move {
                match state {
                    DownloadRuntimeState::Start {
                        client,
                        reserved,
                        task,
                    } => {
                        let (content_type, total, stream) =
                            match client.download_file_stream(&task.url, &task.referer).await {
                                Ok(parts) => parts,
                                Err(e) => {
                                    return Some((
                                        DownloadEvent::Failed(e.into()),
                                        DownloadRuntimeState::Finished,
                                    ));
                                }
                            };

                        let filename = image_filename(
                            &task.url,
                            &content_type,
                            &task.filename_prefix,
                            task.ordinal,
                        );
                        let (file, path) =
                            match create_unique(&reserved, &task.destination_dir, &filename).await {
                                Ok(created) => created,
                                Err(e) => {
                                    return Some((
                                        DownloadEvent::Failed(e),
                                        DownloadRuntimeState::Finished,
                                    ));
                                }
                            };

                        Some((
                            DownloadEvent::Transfer(0.0),
                            DownloadRuntimeState::Downloading {
                                file,
                                stream: stream.boxed(),
                                downloaded: 0,
                                total,
                                path,
                                reserved,
                            },
                        ))
                    }
                    DownloadRuntimeState::Downloading {
                        mut file,
                        mut stream,
                        mut downloaded,
                        total,
                        path,
                        reserved,
                    } => match stream.next().await {
                        Some(Ok(chunk)) => {
                            if let Err(e) = file.write_all(&chunk).await {
                                let err = AppError::Filesystem(format!("Write error: {}", e));
                                return Some(abort(file, path, &reserved, err).await);
                            }

                            downloaded += chunk.len() as u64;
                            let progress = match total {
                                Some(total_size) if total_size > 0 => {
                                    downloaded as f32 / total_size as f32
                                }
                                _ => 0.0,
                            };

                            Some((
                                DownloadEvent::Transfer(progress),
                                DownloadRuntimeState::Downloading {
                                    file,
                                    stream,
                                    downloaded,
                                    total,
                                    path,
                                    reserved,
                                },
                            ))
                        }
                        Some(Err(e)) => Some(abort(file, path, &reserved, e.into()).await),
                        None => {
                            if let Err(e) = file.sync_all().await {
                                let err =
                                    AppError::Filesystem(format!("Failed to sync file: {}", e));
                                return Some(abort(file, path, &reserved, err).await);
                            }
                            release(&reserved, &path);

                            debug!(path = %path.display(), bytes = downloaded, "saved image");
                            Some((
                                DownloadEvent::Completed(path),
                                DownloadRuntimeState::Finished,
                            ))
                        }
                    },
                    DownloadRuntimeState::Finished => None,
                }
            },
        )
        .boxed()
    }

    /// Run a single download to its end and return the saved path.
    pub async fn download_one(&self, task: DownloadTask) -> Result<PathBuf, AppError> {
        let mut events = self.download_stream(task);
        while let Some(event) = events.next().await {
            match event {
                DownloadEvent::Completed(path) => return Ok(path),
                DownloadEvent::Failed(err) => return Err(err),
                _ => {}
            }
        }
        Err(AppError::Network("download ended without a result".to_string()))
    }

    /// Download every task with bounded parallelism. Failures are recorded
    /// per item; once `cancel` is set no further items are started.
    /// Results come back in task order, covering only items that ran.
    pub async fn download_all(
        &self,
        tasks: Vec<DownloadTask>,
        cancel: Arc<AtomicBool>,
        events: UnboundedSender<DownloadEvent>,
    ) -> Vec<DownloadResult> {
        let total = tasks.len();
        let finished = Arc::new(AtomicUsize::new(0));
        let semaphore = Arc::new(Semaphore::new(self.workers));
        let mut handles = Vec::with_capacity(total);

        info!(total, "starting downloads");
        let _ = events.send(DownloadEvent::Progress { current: 0, total });

        for task in tasks {
            let Ok(permit) = semaphore.clone().acquire_owned().await else {
                break;
            };
            if cancel.load(Ordering::SeqCst) {
                info!("download scheduling stopped by cancellation");
                break;
            }

            let this = self.clone();
            let events = events.clone();
            let finished = Arc::clone(&finished);

            handles.push(task::spawn(async move {
                let _permit = permit;
                let url = task.url.clone();
                let status = match this.download_one(task).await {
                    Ok(path) => DownloadStatus::Success { path },
                    Err(err) => {
                        warn!(url = %url, %err, "download failed");
                        DownloadStatus::Failed {
                            reason: err.to_string(),
                        }
                    }
                };
                let result = DownloadResult { url, status };

                let _ = events.send(DownloadEvent::Item(result.clone()));
                let current = finished.fetch_add(1, Ordering::SeqCst) + 1;
                let _ = events.send(DownloadEvent::Progress { current, total });
                result
            }));
        }

        let mut results = Vec::with_capacity(handles.len());
        for joined in join_all(handles).await {
            match joined {
                Ok(result) => results.push(result),
                Err(err) => warn!(%err, "download worker panicked"),
            }
        }

        let success = results.iter().filter(|r| r.is_success()).count();
        info!(success, total, "downloads finished");
        let _ = events.send(DownloadEvent::Finished { success, total });
        results
    }
}

enum DownloadRuntimeState {
    Start {
        client: HttpClient,
        reserved: Reservations,
        task: DownloadTask,
    },
    Downloading {
        file: tokio::fs::File,
        stream: BoxStream<'static, crate::api::Result<bytes::Bytes>>,
        downloaded: u64,
        total: Option<u64>,
        path: PathBuf,
        reserved: Reservations,
    },
    Finished,
}

/// Drop the partial file and end the stream with `err`.
async fn abort(
    file: tokio::fs::File,
    path: PathBuf,
    reserved: &Reservations,
    err: AppError,
) -> (DownloadEvent, DownloadRuntimeState) {
    drop(file);
    if let Err(e) = tokio::fs::remove_file(&path).await {
        debug!(path = %path.display(), %e, "could not remove partial file");
    }
    release(reserved, &path);
    (DownloadEvent::Failed(err), DownloadRuntimeState::Finished)
}

/// Pick the first name for `filename` in `dir` that no other download holds
/// and that is not in `taken`, appending `_<n>` before the extension.
fn reserve_path(
    reserved: &Reservations,
    dir: &Path,
    filename: &str,
    taken: &HashSet<PathBuf>,
) -> PathBuf {
    let mut reserved = reserved.lock().unwrap_or_else(PoisonError::into_inner);
    let (stem, ext) = match filename.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => (stem, format!(".{}", ext)),
        _ => (filename, String::new()),
    };

    let mut candidate = dir.join(filename);
    let mut n = 1;
    while reserved.contains(&candidate) || taken.contains(&candidate) {
        candidate = dir.join(format!("{}_{}{}", stem, n, ext));
        n += 1;
    }
    reserved.insert(candidate.clone());
    candidate
}

/// Reserve a name and create it with `create_new`. A name that already exists
/// on disk moves on to the next `_<n>` candidate.
async fn create_unique(
    reserved: &Reservations,
    dir: &Path,
    filename: &str,
) -> Result<(tokio::fs::File, PathBuf), AppError> {
    let mut taken = HashSet::new();
    loop {
        let path = reserve_path(reserved, dir, filename, &taken);
        match tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
        {
            Ok(file) => return Ok((file, path)),
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                release(reserved, &path);
                taken.insert(path);
            }
            Err(e) => {
                release(reserved, &path);
                return Err(AppError::Filesystem(format!(
                    "Failed to create {}: {}",
                    path.display(),
                    e
                )));
            }
        }
    }
}

fn release(reserved: &Reservations, path: &Path) {
    reserved
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .remove(path);
}
