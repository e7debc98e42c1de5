//! Discover image URLs on web pages, verify and filter them, and download
//! the survivors.
//!
//! [`Harvester`] is the entry point: it runs extraction batches, builds the
//! resolution catalog for exact-value selection, and downloads images, all
//! reported through event streams.

pub mod api;
pub mod application;
pub mod domain;
pub mod extract;
pub mod utils;

#[cfg(test)]
pub(crate) mod test_support;

pub use application::{
    BatchEvent, CatalogEvent, DistinctValues, DownloadEvent, ExtractionOptions, HarvestConfig,
    Harvester, RunOutcome,
};
pub use domain::{AppError, FilterCriteria, FilterMode, Result};
