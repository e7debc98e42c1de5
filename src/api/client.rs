use bytes::{Bytes, BytesMut};
use futures::{Stream, StreamExt, TryStreamExt};
use reqwest::header::{ACCEPT, ACCEPT_LANGUAGE, CONTENT_TYPE, REFERER};
use reqwest::{Client, Response};
use thiserror::Error;
use tracing::{debug, warn};

use super::models::{ClientConfig, ImageBody, PageBody, HTML_ACCEPT};
use crate::domain::AppError;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("HTTP request failed: {0}")]
    RequestError(#[from] reqwest::Error),

    #[error("Server returned status {0}")]
    Status(reqwest::StatusCode),

    #[error("Not an image (content-type: {0:?})")]
    NotAnImage(String),

    #[error("Body exceeds {0} bytes")]
    TooLarge(u64),
}

pub type Result<T> = std::result::Result<T, ApiError>;

impl From<ApiError> for AppError {
    fn from(err: ApiError) -> Self {
        match err {
            ApiError::NotAnImage(_) | ApiError::TooLarge(_) => AppError::Validation(err.to_string()),
            ApiError::RequestError(_) | ApiError::Status(_) => AppError::Network(err.to_string()),
        }
    }
}

#[derive(Clone)]
pub struct HttpClient {
    client: Client,
    config: ClientConfig,
}

impl HttpClient {
    pub fn new(config: ClientConfig) -> Result<Self> {
        let client = Client::builder().user_agent(&config.user_agent).build()?;
        Ok(Self { client, config })
    }

    /// Fetch an HTML page, truncating bodies beyond `max_page_bytes`.
    pub async fn fetch_page(&self, url: &str) -> Result<PageBody> {
        let response = self
            .client
            .get(url)
            .timeout(self.config.page_timeout)
            .header(ACCEPT, HTML_ACCEPT)
            .header(ACCEPT_LANGUAGE, super::models::ACCEPT_LANGUAGE)
            .header(REFERER, url)
            .send()
            .await?;
        let response = check_status(response)?;

        let limit = self.config.max_page_bytes;
        let (body, truncated) = read_limited(response, limit).await?;
        if truncated {
            warn!(url, limit, "page body too large, analysing a truncated prefix");
        }

        Ok(PageBody {
            text: String::from_utf8_lossy(&body).into_owned(),
            truncated,
        })
    }

    /// Fetch a linked stylesheet as text.
    pub async fn fetch_stylesheet(&self, url: &str, referer: &str) -> Result<String> {
        let response = self
            .client
            .get(url)
            .timeout(self.config.stylesheet_timeout)
            .header(REFERER, referer)
            .send()
            .await?;
        Ok(check_status(response)?.text().await?)
    }

    /// HEAD the URL and report whether it declares an `image/*` content type.
    pub async fn is_image_resource(&self, url: &str) -> Result<bool> {
        let response = self
            .client
            .head(url)
            .timeout(self.config.probe_timeout)
            .send()
            .await?;
        let response = check_status(response)?;
        Ok(is_image_content_type(&content_type(&response)))
    }

    /// Fetch an image body for probing. Non-image content types are rejected
    /// before the body is read.
    pub async fn fetch_image(&self, url: &str) -> Result<ImageBody> {
        let response = self
            .client
            .get(url)
            .timeout(self.config.probe_timeout)
            .send()
            .await?;
        let response = check_status(response)?;

        let content_type = content_type(&response);
        if !is_image_content_type(&content_type) {
            return Err(ApiError::NotAnImage(content_type));
        }

        let limit = self.config.max_image_bytes;
        if response.content_length().is_some_and(|len| len > limit) {
            return Err(ApiError::TooLarge(limit));
        }
        let (bytes, truncated) = read_limited(response, limit).await?;
        if truncated {
            return Err(ApiError::TooLarge(limit));
        }

        Ok(ImageBody {
            content_type,
            bytes,
        })
    }

    /// Start a download and return (content type, total size, body stream).
    pub async fn download_file_stream(
        &self,
        url: &str,
        referer: &str,
    ) -> Result<(
        String,
        Option<u64>,
        impl Stream<Item = Result<Bytes>> + Send + 'static,
    )> {
        let response = self
            .client
            .get(url)
            .timeout(self.config.download_timeout)
            .header(REFERER, referer)
            .send()
            .await?;
        let response = check_status(response)?;

        let content_type = content_type(&response);
        let total_size = response.content_length();
        let stream = response.bytes_stream().map_err(ApiError::RequestError);

        Ok((content_type, total_size, stream))
    }
}

pub fn is_image_content_type(content_type: &str) -> bool {
    content_type.trim().to_ascii_lowercase().starts_with("image/")
}

fn check_status(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        Ok(response)
    } else {
        debug!(url = %response.url(), %status, "request failed");
        Err(ApiError::Status(status))
    }
}

fn content_type(response: &Response) -> String {
    response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string()
}

/// Read at most `limit` bytes of the body; the flag reports whether more followed.
async fn read_limited(response: Response, limit: u64) -> Result<(Bytes, bool)> {
    let limit = usize::try_from(limit).unwrap_or(usize::MAX);
    let mut stream = response.bytes_stream();
    let mut body = BytesMut::new();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        let room = limit - body.len();
        if chunk.len() > room {
            body.extend_from_slice(&chunk[..room]);
            return Ok((body.freeze(), true));
        }
        body.extend_from_slice(&chunk);
    }

    Ok((body.freeze(), false))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(config: ClientConfig) -> HttpClient {
        HttpClient::new(config).expect("client")
    }

    #[tokio::test]
    async fn fetch_page_sends_browser_headers() {
        let mut server = mockito::Server::new_async().await;
        let page_url = format!("{}/gallery", server.url());
        let mock = server
            .mock("GET", "/gallery")
            .match_header("referer", page_url.as_str())
            .match_header("accept-language", mockito::Matcher::Any)
            .match_header(
                "user-agent",
                mockito::Matcher::Regex("Mozilla/5.0".to_string()),
            )
            .with_status(200)
            .with_header("content-type", "text/html")
            .with_body("<html><img src=\"a.png\"></html>")
            .create_async()
            .await;

        let page = client(ClientConfig::default())
            .fetch_page(&page_url)
            .await
            .expect("page");
        mock.assert_async().await;
        assert!(page.text.contains("a.png"));
        assert!(!page.truncated);
    }

    #[tokio::test]
    async fn fetch_page_truncates_oversized_bodies() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/big")
            .with_status(200)
            .with_body("x".repeat(4096))
            .create_async()
            .await;

        let config = ClientConfig {
            max_page_bytes: 100,
            ..Default::default()
        };
        let page = client(config)
            .fetch_page(&format!("{}/big", server.url()))
            .await
            .expect("page");
        assert!(page.truncated);
        assert_eq!(page.text.len(), 100);
    }

    #[tokio::test]
    async fn error_status_maps_to_network_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/missing")
            .with_status(404)
            .create_async()
            .await;

        let err = client(ClientConfig::default())
            .fetch_page(&format!("{}/missing", server.url()))
            .await
            .expect_err("404");
        assert!(matches!(err, ApiError::Status(status) if status.as_u16() == 404));
        assert!(matches!(AppError::from(err), AppError::Network(_)));
    }

    #[tokio::test]
    async fn fetch_image_rejects_non_image_content_type() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/fake.png")
            .with_status(200)
            .with_header("content-type", "text/html")
            .with_body("<html></html>")
            .create_async()
            .await;

        let err = client(ClientConfig::default())
            .fetch_image(&format!("{}/fake.png", server.url()))
            .await
            .expect_err("not an image");
        assert!(AppError::from(err).is_rejection());
    }

    #[tokio::test]
    async fn fetch_image_enforces_size_limit() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/huge.png")
            .with_status(200)
            .with_header("content-type", "image/png")
            .with_body(vec![0u8; 2048])
            .create_async()
            .await;

        let config = ClientConfig {
            max_image_bytes: 1024,
            ..Default::default()
        };
        let err = client(config)
            .fetch_image(&format!("{}/huge.png", server.url()))
            .await
            .expect_err("too large");
        assert!(matches!(err, ApiError::TooLarge(1024)));
    }

    #[tokio::test]
    async fn head_checks_declared_content_type() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("HEAD", "/photo.jpg")
            .with_status(200)
            .with_header("content-type", "image/jpeg")
            .create_async()
            .await;
        server
            .mock("HEAD", "/photo.html")
            .with_status(200)
            .with_header("content-type", "text/html")
            .create_async()
            .await;

        let http = client(ClientConfig::default());
        assert!(http
            .is_image_resource(&format!("{}/photo.jpg", server.url()))
            .await
            .expect("head"));
        assert!(!http
            .is_image_resource(&format!("{}/photo.html", server.url()))
            .await
            .expect("head"));
    }
}
