use std::path::PathBuf;

use clap::{ArgAction, Parser, ValueEnum};
use simple_image_downloader::domain::FilterMode;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum FilterModeArg {
    None,
    Resolution,
    Width,
    Height,
}

impl From<FilterModeArg> for FilterMode {
    fn from(arg: FilterModeArg) -> Self {
        match arg {
            FilterModeArg::None => FilterMode::None,
            FilterModeArg::Resolution => FilterMode::Resolution,
            FilterModeArg::Width => FilterMode::Width,
            FilterModeArg::Height => FilterMode::Height,
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "simple-image-downloader")]
#[command(author, version, about = "Find and download the images on web pages", long_about = None)]
pub struct Args {
    /// Page URLs to scan
    pub urls: Vec<String>,

    /// Text file with one page URL per line
    #[arg(short = 'f', long)]
    pub url_file: Option<PathBuf>,

    /// Output directory
    #[arg(short, long, default_value = "./images")]
    pub output: PathBuf,

    /// Filename prefix for saved images
    #[arg(short, long, default_value = "image")]
    pub prefix: String,

    /// Skip fetching candidates to confirm they are images
    #[arg(long)]
    pub no_verify: bool,

    /// Minimum width in pixels (0 disables)
    #[arg(long, default_value = "0")]
    pub min_width: u32,

    /// Minimum height in pixels (0 disables)
    #[arg(long, default_value = "0")]
    pub min_height: u32,

    /// Drop images smaller than 50x50
    #[arg(long)]
    pub skip_small: bool,

    /// Drop GIF images
    #[arg(long)]
    pub exclude_gif: bool,

    /// Narrow the results to one exact resolution, width or height
    #[arg(long, value_enum, requires = "filter_value")]
    pub filter_mode: Option<FilterModeArg>,

    /// Value for --filter-mode, e.g. 1920x1080 or 800
    #[arg(long)]
    pub filter_value: Option<String>,

    /// Print the distinct resolutions, widths and heights found, then exit
    #[arg(long)]
    pub list_resolutions: bool,

    /// Print the final image list without downloading
    #[arg(long)]
    pub dry_run: bool,

    /// Print lists as JSON
    #[arg(long)]
    pub json: bool,

    /// Pages fetched in parallel
    #[arg(long, default_value = "5")]
    pub page_workers: usize,

    /// Images probed in parallel
    #[arg(long, default_value = "10")]
    pub probe_workers: usize,

    /// Images downloaded in parallel
    #[arg(long, default_value = "10")]
    pub download_workers: usize,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,
}

impl Args {
    /// The selection to apply after extraction, if any.
    pub fn selection(&self) -> Option<(FilterMode, String)> {
        match (self.filter_mode, &self.filter_value) {
            (Some(FilterModeArg::None) | None, _) | (_, None) => None,
            (Some(mode), Some(value)) => Some((mode.into(), value.clone())),
        }
    }
}
