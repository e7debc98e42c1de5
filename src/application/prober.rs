use std::io::Cursor;

use image::ImageReader;
use tracing::trace;

use crate::api::HttpClient;
use crate::domain::{AppError, ImageCandidate, ProbedImage, Result};

/// Fetches candidates and reads their intrinsic dimensions.
#[derive(Clone)]
pub struct Prober {
    client: HttpClient,
}

impl Prober {
    pub fn new(client: HttpClient) -> Self {
        Self { client }
    }

    /// Confirm that a candidate is an image and measure it.
    ///
    /// Non-image content types and oversized bodies come back as
    /// [`AppError::Validation`]; undecodable bodies as [`AppError::Decode`].
    pub async fn probe(&self, candidate: &ImageCandidate) -> Result<ProbedImage> {
        let body = self.client.fetch_image(&candidate.url).await?;
        let size_bytes = body.bytes.len() as u64;

        let bytes = body.bytes.clone();
        let (width, height) = tokio::task::spawn_blocking(move || read_dimensions(&bytes))
            .await
            .map_err(|e| AppError::Decode(format!("decoder task failed: {}", e)))??;

        trace!(url = %candidate.url, width, height, "probed image");
        Ok(ProbedImage::new(
            candidate.clone(),
            body.content_type,
            width,
            height,
            size_bytes,
        ))
    }
}

/// Read width and height from an encoded image, guessing the format from its bytes.
pub fn read_dimensions(bytes: &[u8]) -> Result<(u32, u32)> {
    let (width, height) = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|e| AppError::Decode(e.to_string()))?
        .into_dimensions()
        .map_err(|e| AppError::Decode(e.to_string()))?;

    if width == 0 || height == 0 {
        return Err(AppError::Decode(format!(
            "image has empty dimensions {}x{}",
            width, height
        )));
    }
    Ok((width, height))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::ClientConfig;
    use crate::test_support::png_bytes;

    fn prober() -> Prober {
        Prober::new(HttpClient::new(ClientConfig::default()).expect("client"))
    }

    #[test]
    fn reads_png_dimensions() {
        assert_eq!(read_dimensions(&png_bytes(64, 32)).expect("png"), (64, 32));
    }

    #[test]
    fn garbage_is_a_decode_error() {
        assert!(matches!(
            read_dimensions(b"definitely not an image"),
            Err(AppError::Decode(_))
        ));
    }

    #[tokio::test]
    async fn probe_measures_served_image() {
        let mut server = mockito::Server::new_async().await;
        let body = png_bytes(120, 80);
        server
            .mock("GET", "/pic.png")
            .with_status(200)
            .with_header("content-type", "image/png")
            .with_body(body.clone())
            .create_async()
            .await;

        let candidate = ImageCandidate::new(format!("{}/pic.png", server.url()), server.url());
        let probed = prober().probe(&candidate).await.expect("probe");
        assert_eq!((probed.width, probed.height), (120, 80));
        assert_eq!(probed.resolution, "120x80");
        assert_eq!(probed.size_bytes, body.len() as u64);
        assert_eq!(probed.content_type, "image/png");
    }

    #[tokio::test]
    async fn probe_rejects_wrong_content_type_and_bad_bodies() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/page.png")
            .with_status(200)
            .with_header("content-type", "text/html")
            .with_body(png_bytes(10, 10))
            .create_async()
            .await;
        server
            .mock("GET", "/broken.png")
            .with_status(200)
            .with_header("content-type", "image/png")
            .with_body("nope")
            .create_async()
            .await;

        let prober = prober();
        let html = ImageCandidate::new(format!("{}/page.png", server.url()), server.url());
        let broken = ImageCandidate::new(format!("{}/broken.png", server.url()), server.url());

        assert!(prober.probe(&html).await.expect_err("html").is_rejection());
        assert!(matches!(
            prober.probe(&broken).await,
            Err(AppError::Decode(_))
        ));
    }
}
