pub mod error;
pub mod filter;
pub mod model;

pub use error::{AppError, Result};
pub use filter::passes_filter;
pub use model::{
    DownloadResult, DownloadStatus, DownloadTask, FilterCriteria, FilterMode, ImageCandidate,
    Phase, ProbedImage, ResolutionFilter, RunState, ALL_SELECTION,
};
