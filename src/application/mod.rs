pub mod batch;
pub mod catalog;
pub mod download_coordinator;
pub mod harvester;
pub mod prober;

pub use batch::{BatchEvent, BatchOrchestrator, ExtractionOptions, RunOutcome};
pub use catalog::{CatalogEvent, Dimensions, DistinctValues, ResolutionCatalog};
pub use download_coordinator::{DownloadCoordinator, DownloadEvent};
pub use harvester::{HarvestConfig, Harvester};
pub use prober::Prober;

use futures::stream::{self, BoxStream, StreamExt};
use tokio::sync::mpsc::UnboundedReceiver;

/// Expose a channel fed by a background task as an event stream that ends
/// when the task drops its sender.
pub(crate) fn event_stream<E: Send + 'static>(rx: UnboundedReceiver<E>) -> BoxStream<'static, E> {
    stream::unfold(rx, |mut rx| async move {
        let event = rx.recv().await?;
        Some((event, rx))
    })
    .boxed()
}
