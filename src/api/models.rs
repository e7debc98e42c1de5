use std::time::Duration;

pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";

pub const HTML_ACCEPT: &str =
    "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,image/apng,*/*;q=0.8";

pub const ACCEPT_LANGUAGE: &str = "zh-CN,zh;q=0.9,en;q=0.8";

/// Configuration for the HTTP client
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub user_agent: String,
    pub page_timeout: Duration,
    pub stylesheet_timeout: Duration,
    pub probe_timeout: Duration,
    pub download_timeout: Duration,
    /// Page bodies beyond this are truncated before parsing.
    pub max_page_bytes: u64,
    /// Probe bodies beyond this are rejected.
    pub max_image_bytes: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            user_agent: DEFAULT_USER_AGENT.to_string(),
            page_timeout: Duration::from_secs(15),
            stylesheet_timeout: Duration::from_secs(10),
            probe_timeout: Duration::from_secs(10),
            download_timeout: Duration::from_secs(15),
            max_page_bytes: 100 * 1024 * 1024,
            max_image_bytes: 20 * 1024 * 1024,
        }
    }
}

/// Body of a fetched HTML page.
#[derive(Debug, Clone)]
pub struct PageBody {
    pub text: String,
    pub truncated: bool,
}

/// Body of a fetched image, read fully into memory.
#[derive(Debug, Clone)]
pub struct ImageBody {
    pub content_type: String,
    pub bytes: bytes::Bytes,
}
