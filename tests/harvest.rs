use std::collections::BTreeSet;
use std::io::Cursor;

use futures::StreamExt;
use image::{DynamicImage, ImageFormat, RgbaImage};
use simple_image_downloader::{
    domain::{DownloadStatus, RunState, ALL_SELECTION},
    BatchEvent, CatalogEvent, DownloadEvent, ExtractionOptions, FilterMode, HarvestConfig,
    Harvester,
};

fn png(width: u32, height: u32) -> Vec<u8> {
    let mut buf = Vec::new();
    DynamicImage::ImageRgba8(RgbaImage::new(width, height))
        .write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
        .expect("encode png");
    buf
}

fn harvester() -> Harvester {
    Harvester::new(HarvestConfig::default()).expect("harvester")
}

async fn serve_png(server: &mut mockito::ServerGuard, path: &str, width: u32, height: u32) {
    server
        .mock("GET", path)
        .with_status(200)
        .with_header("content-type", "image/png")
        .with_body(png(width, height))
        .create_async()
        .await;
}

#[tokio::test]
async fn img_and_lazy_attributes_are_resolved_against_the_page() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", "/")
        .with_status(200)
        .with_body(r#"<img src="/a.jpg"><img data-src="b.png">"#)
        .create_async()
        .await;

    let harvester = harvester();
    let events: Vec<BatchEvent> = harvester
        .start_extraction(
            vec![format!("{}/", server.url())],
            ExtractionOptions {
                verify_images: false,
                ..Default::default()
            },
        )
        .collect()
        .await;

    let Some(BatchEvent::Completed(urls)) = events.last() else {
        panic!("run did not complete: {:?}", events.last());
    };
    let urls: BTreeSet<&str> = urls.iter().map(String::as_str).collect();
    let a = format!("{}/a.jpg", server.url());
    let b = format!("{}/b.png", server.url());
    assert_eq!(urls, BTreeSet::from([a.as_str(), b.as_str()]));
    assert_eq!(harvester.run_state(), RunState::Completed);
}

#[tokio::test]
async fn extract_select_and_download() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", "/gallery")
        .with_status(200)
        .with_body(
            r#"<html><body>
                <img src="/img/wide.png">
                <img src="/img/tall.png">
                <img src="/img/also-wide.png">
                <img src="/img/icon.png">
            </body></html>"#,
        )
        .create_async()
        .await;
    serve_png(&mut server, "/img/wide.png", 200, 100).await;
    serve_png(&mut server, "/img/tall.png", 100, 200).await;
    serve_png(&mut server, "/img/also-wide.png", 200, 100).await;
    serve_png(&mut server, "/img/icon.png", 10, 10).await;

    let harvester = harvester();
    let mut options = ExtractionOptions::default();
    options.criteria.skip_small_icons = true;

    let events: Vec<BatchEvent> = harvester
        .start_extraction(vec![format!("{}/gallery", server.url())], options)
        .collect()
        .await;
    let Some(BatchEvent::Completed(found)) = events.last() else {
        panic!("run did not complete: {:?}", events.last());
    };
    assert_eq!(found.len(), 3);
    let outcome = harvester.last_results().expect("last run");
    assert_eq!(outcome.candidates.len(), 4);
    assert_eq!(outcome.image_urls(), *found);

    let catalog_events: Vec<CatalogEvent> = harvester.build_resolution_catalog().collect().await;
    let Some(CatalogEvent::Completed(values)) = catalog_events.last() else {
        panic!("catalog did not complete: {:?}", catalog_events.last());
    };
    assert_eq!(values.widths, vec!["all", "200", "100"]);
    assert_eq!(
        harvester.list_distinct(FilterMode::Resolution).first().map(String::as_str),
        Some(ALL_SELECTION)
    );

    let wide = harvester
        .filter_by_selection(FilterMode::Resolution, "200x100")
        .expect("selection");
    assert_eq!(wide.len(), 2);
    let tall = harvester
        .filter_by_selection(FilterMode::Height, "200")
        .expect("selection");
    assert_eq!(tall, vec![format!("{}/img/tall.png", server.url())]);
    let all = harvester
        .filter_by_selection(FilterMode::Width, ALL_SELECTION)
        .expect("selection");
    assert_eq!(all.len(), 3);

    let dir = tempfile::tempdir().expect("tempdir");
    let download_events: Vec<DownloadEvent> = harvester
        .download_all(wide.clone(), dir.path(), "shot")
        .collect()
        .await;

    assert!(matches!(
        download_events.last(),
        Some(DownloadEvent::Finished { success: 2, total: 2 })
    ));
    let saved: Vec<_> = download_events
        .iter()
        .filter_map(|event| match event {
            DownloadEvent::Item(result) => match &result.status {
                DownloadStatus::Success { path } => Some(path.clone()),
                DownloadStatus::Failed { .. } => None,
            },
            _ => None,
        })
        .collect();
    assert_eq!(saved.len(), 2);
    assert!(dir.path().join("shot_wide.png").exists());
    assert!(dir.path().join("shot_also-wide.png").exists());
    assert_eq!(
        std::fs::read(dir.path().join("shot_wide.png")).expect("read"),
        png(200, 100)
    );
}

#[tokio::test]
async fn single_download_streams_progress() {
    let mut server = mockito::Server::new_async().await;
    serve_png(&mut server, "/photo", 40, 30).await;

    let dir = tempfile::tempdir().expect("tempdir");
    let events: Vec<DownloadEvent> = harvester()
        .download_one(&format!("{}/photo", server.url()), dir.path(), "  ")
        .collect()
        .await;

    assert!(events
        .iter()
        .any(|e| matches!(e, DownloadEvent::Transfer(_))));
    let Some(DownloadEvent::Completed(path)) = events.last() else {
        panic!("download did not complete: {:?}", events.last());
    };
    assert_eq!(path, &dir.path().join("image_1.png"));
}

#[tokio::test]
async fn cancel_before_run_is_cleared_by_new_run() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", "/")
        .with_status(200)
        .with_body(r#"<img src="/x.png">"#)
        .create_async()
        .await;

    let harvester = harvester();
    harvester.cancel();
    let events: Vec<BatchEvent> = harvester
        .start_extraction(
            vec![server.url()],
            ExtractionOptions {
                verify_images: false,
                ..Default::default()
            },
        )
        .collect()
        .await;
    assert!(matches!(events.last(), Some(BatchEvent::Completed(urls)) if urls.len() == 1));
}
