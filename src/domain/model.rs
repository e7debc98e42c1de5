use std::fmt;
use std::path::PathBuf;

/// Sentinel selection that disables the exact-value filter.
pub const ALL_SELECTION: &str = "all";

/// A URL discovered during extraction, not yet confirmed to be an image.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ImageCandidate {
    pub url: String,
    pub source_page: String,
}

impl ImageCandidate {
    pub fn new(url: impl Into<String>, source_page: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            source_page: source_page.into(),
        }
    }
}

/// A candidate that was fetched and decoded as an image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbedImage {
    pub candidate: ImageCandidate,
    pub content_type: String,
    pub width: u32,
    pub height: u32,
    pub size_bytes: u64,
    /// `"{width}x{height}"`
    pub resolution: String,
}

impl ProbedImage {
    pub fn new(
        candidate: ImageCandidate,
        content_type: String,
        width: u32,
        height: u32,
        size_bytes: u64,
    ) -> Self {
        Self {
            candidate,
            content_type,
            width,
            height,
            size_bytes,
            resolution: format!("{}x{}", width, height),
        }
    }

    pub fn url(&self) -> &str {
        &self.candidate.url
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FilterMode {
    #[default]
    None,
    Resolution,
    Width,
    Height,
}

impl fmt::Display for FilterMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FilterMode::None => "none",
            FilterMode::Resolution => "resolution",
            FilterMode::Width => "width",
            FilterMode::Height => "height",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolutionFilter {
    pub mode: FilterMode,
    pub value: String,
}

impl ResolutionFilter {
    pub fn new(mode: FilterMode, value: impl Into<String>) -> Self {
        Self {
            mode,
            value: value.into(),
        }
    }

    pub fn is_active(&self) -> bool {
        self.mode != FilterMode::None && self.value != ALL_SELECTION
    }
}

impl Default for ResolutionFilter {
    fn default() -> Self {
        Self::new(FilterMode::None, ALL_SELECTION)
    }
}

/// Snapshot of the verification criteria for one run.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FilterCriteria {
    /// 0 disables the check.
    pub min_width: u32,
    /// 0 disables the check.
    pub min_height: u32,
    pub skip_small_icons: bool,
    pub exclude_gif: bool,
    pub resolution_filter: ResolutionFilter,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadTask {
    pub url: String,
    pub destination_dir: PathBuf,
    pub filename_prefix: String,
    /// Sent as `Referer`; the image URL itself when the source page is unknown.
    pub referer: String,
    /// 1-based position, used to name files whose URL has no extension.
    pub ordinal: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadStatus {
    Success { path: PathBuf },
    Failed { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadResult {
    pub url: String,
    pub status: DownloadStatus,
}

impl DownloadResult {
    pub fn is_success(&self) -> bool {
        matches!(self.status, DownloadStatus::Success { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RunState {
    #[default]
    Idle,
    Running,
    Completed,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Extraction,
    Verification,
    Catalog,
    Download,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Extraction => "extraction",
            Phase::Verification => "verification",
            Phase::Catalog => "catalog",
            Phase::Download => "download",
        };
        f.write_str(name)
    }
}
