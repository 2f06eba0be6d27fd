use super::*;
use crate::config::{DownloadConfig, PipelineSettings};
use crate::downloader::test_helpers::{corrupt_bytes, png_bytes};
use crate::types::{DownloadTask, FailureKind, ResultRecord};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn png_settings() -> PipelineSettings {
    let mut settings = PipelineSettings::default();
    settings.conversion.format = "png".to_string();
    settings.thumbnail.format = "png".to_string();
    settings
}

fn pipeline(settings: PipelineSettings) -> ImagePipeline {
    pipeline_with(settings, DownloadConfig::default())
}

fn pipeline_with(settings: PipelineSettings, download: DownloadConfig) -> ImagePipeline {
    ImagePipeline::new(Arc::new(settings), &download).unwrap()
}

async fn serve(server: &MockServer, route: &str, body: Vec<u8>) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(body))
        .mount(server)
        .await;
}

fn task(server: &MockServer, route: &str, id: &str, dir: &Path) -> DownloadTask {
    DownloadTask::new(
        ResultRecord::new(format!("{}{}", server.uri(), route), id),
        dir,
    )
}

fn no_partial_files(dir: &Path) -> bool {
    std::fs::read_dir(dir)
        .unwrap()
        .filter_map(|entry| entry.ok())
        .all(|entry| entry.path().extension().and_then(|e| e.to_str()) != Some("part"))
}

#[tokio::test]
async fn test_process_writes_raw_clean_and_thumbnail() {
    let server = MockServer::start().await;
    serve(&server, "/cat.png", png_bytes(200, 100)).await;
    let dir = TempDir::new().unwrap();

    let processed = pipeline(png_settings())
        .process(task(&server, "/cat.png", "cat", dir.path()))
        .await
        .unwrap();

    assert_eq!(processed.record.image_id, "cat");
    assert_eq!(processed.orig_path, dir.path().join("cat.png"));
    assert_eq!(processed.clean_path, dir.path().join("cat-clean.png"));
    assert_eq!(processed.thumb_path, dir.path().join("cat-thumb-90x90.png"));
    assert!(processed.download_time.unwrap() >= 0.0);

    assert_eq!(
        image::image_dimensions(&processed.clean_path).unwrap(),
        (200, 100)
    );
    assert_eq!(
        image::image_dimensions(&processed.thumb_path).unwrap(),
        (90, 90)
    );
    assert!(no_partial_files(dir.path()));
}

#[tokio::test]
async fn test_process_default_jpeg_outputs() {
    let server = MockServer::start().await;
    serve(&server, "/dog", png_bytes(64, 48)).await;
    let dir = TempDir::new().unwrap();

    let processed = pipeline(PipelineSettings::default())
        .process(task(&server, "/dog", "dog", dir.path()))
        .await
        .unwrap();

    // no URL extension: raw file is just the id
    assert_eq!(processed.orig_path, dir.path().join("dog"));
    assert_eq!(processed.clean_path, dir.path().join("dog-clean.jpg"));
    assert_eq!(
        image::image_dimensions(&processed.clean_path).unwrap(),
        (64, 48)
    );
}

#[tokio::test]
async fn test_process_downsizes_to_conversion_bounds() {
    let server = MockServer::start().await;
    serve(&server, "/wide.png", png_bytes(200, 100)).await;
    let dir = TempDir::new().unwrap();

    let mut settings = png_settings();
    settings.conversion.max_width = 50;
    settings.conversion.max_height = 50;
    settings.conversion.subdir = "clean".to_string();
    settings.thumbnail.subdir = "thumbs".to_string();
    settings.thumbnail.pad_to_size = false;

    let processed = pipeline(settings)
        .process(task(&server, "/wide.png", "wide", dir.path()))
        .await
        .unwrap();

    assert_eq!(
        processed.clean_path,
        dir.path().join("clean").join("wide-clean.png")
    );
    assert_eq!(
        image::image_dimensions(&processed.clean_path).unwrap(),
        (50, 25)
    );
    assert_eq!(
        image::image_dimensions(&processed.thumb_path).unwrap(),
        (90, 45)
    );
}

#[tokio::test]
async fn test_min_width_bound_is_inclusive() {
    let server = MockServer::start().await;
    serve(&server, "/exact.png", png_bytes(120, 80)).await;
    serve(&server, "/narrow.png", png_bytes(119, 80)).await;
    let dir = TempDir::new().unwrap();

    let mut settings = png_settings();
    settings.filter.min_width = 120;
    let pipeline = pipeline(settings);

    pipeline
        .process(task(&server, "/exact.png", "exact", dir.path()))
        .await
        .unwrap();

    let err = pipeline
        .process(task(&server, "/narrow.png", "narrow", dir.path()))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), FailureKind::Filtered);
    match err {
        ItemError::Filtered { path, reason } => {
            assert_eq!(path, dir.path().join("narrow.png"));
            assert_eq!(
                reason,
                crate::error::FilterReason::TooNarrow {
                    width: 119,
                    min: 120
                }
            );
        }
        other => panic!("expected filter rejection, got {other:?}"),
    }
    // rejected raw file is removed, nothing derived from it exists
    assert!(!dir.path().join("narrow.png").exists());
    assert!(!dir.path().join("narrow-clean.png").exists());
}

#[tokio::test]
async fn test_size_estimate_rejects_large_image() {
    let server = MockServer::start().await;
    serve(&server, "/big.png", png_bytes(100, 100)).await;
    let dir = TempDir::new().unwrap();

    let mut settings = png_settings();
    // 100 * 100 * 3 channels = 30000
    settings.filter.max_size_bytes = 29_999;

    let err = pipeline(settings)
        .process(task(&server, "/big.png", "big", dir.path()))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        ItemError::Filtered {
            reason: crate::error::FilterReason::TooLarge { bytes: 30_000, .. },
            ..
        }
    ));
}

#[tokio::test]
async fn test_second_run_is_a_no_op() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/once.png"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(png_bytes(30, 30)))
        .expect(1)
        .mount(&server)
        .await;
    let dir = TempDir::new().unwrap();
    let pipeline = pipeline(png_settings());

    let first = pipeline
        .process(task(&server, "/once.png", "once", dir.path()))
        .await
        .unwrap();
    let clean_modified = std::fs::metadata(&first.clean_path)
        .unwrap()
        .modified()
        .unwrap();

    let second = pipeline
        .process(task(&server, "/once.png", "once", dir.path()))
        .await
        .unwrap();

    assert_eq!(first.clean_path, second.clean_path);
    assert_eq!(first.thumb_path, second.thumb_path);
    assert_eq!(
        std::fs::metadata(&second.clean_path)
            .unwrap()
            .modified()
            .unwrap(),
        clean_modified
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_duplicates_share_one_download() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/dup.png"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(png_bytes(900, 600)))
        .expect(1)
        .mount(&server)
        .await;
    let dir = TempDir::new().unwrap();
    let pipeline = Arc::new(pipeline(png_settings()));

    let mut set = tokio::task::JoinSet::new();
    for _ in 0..8 {
        let pipeline = Arc::clone(&pipeline);
        let task = task(&server, "/dup.png", "dup", dir.path());
        set.spawn(async move { pipeline.process(task).await });
    }

    let mut processed = Vec::new();
    while let Some(joined) = set.join_next().await {
        processed.push(joined.unwrap().unwrap());
    }

    assert_eq!(processed.len(), 8);
    for image in &processed {
        assert_eq!(image::image_dimensions(&image.orig_path).unwrap(), (900, 600));
        assert_eq!(image::image_dimensions(&image.clean_path).unwrap(), (900, 600));
        assert_eq!(image::image_dimensions(&image.thumb_path).unwrap(), (90, 90));
    }
    assert!(no_partial_files(dir.path()));
}

#[tokio::test]
async fn test_http_error_is_transport_failure() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/missing.png"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    let dir = TempDir::new().unwrap();

    let err = pipeline(png_settings())
        .process(task(&server, "/missing.png", "missing", dir.path()))
        .await
        .unwrap_err();

    match err {
        ItemError::Transport { url, reason } => {
            assert!(url.ends_with("/missing.png"));
            assert!(reason.contains("404"), "reason was: {reason}");
        }
        other => panic!("expected transport error, got {other:?}"),
    }
    assert!(!dir.path().join("missing.png").exists());
    assert!(no_partial_files(dir.path()));
}

#[tokio::test]
async fn test_unreachable_host_is_transport_failure() {
    let dir = TempDir::new().unwrap();
    let task = DownloadTask::new(
        ResultRecord::new("http://127.0.0.1:1/nothing.png", "nothing"),
        dir.path(),
    );

    let err = pipeline(png_settings()).process(task).await.unwrap_err();

    assert_eq!(err.kind(), FailureKind::Transport);
    assert!(no_partial_files(dir.path()));
}

#[tokio::test]
async fn test_corrupt_body_is_removed() {
    let server = MockServer::start().await;
    serve(&server, "/broken.jpg", corrupt_bytes()).await;
    let dir = TempDir::new().unwrap();

    let err = pipeline(png_settings())
        .process(task(&server, "/broken.jpg", "broken", dir.path()))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), FailureKind::CorruptImage);
    assert!(!dir.path().join("broken.jpg").exists());
}

#[tokio::test]
async fn test_item_timeout_abandons_slow_download() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/slow.png"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_bytes(png_bytes(10, 10))
                .set_delay(Duration::from_secs(5)),
        )
        .mount(&server)
        .await;
    let dir = TempDir::new().unwrap();

    let download = DownloadConfig {
        item_timeout: Duration::from_millis(200),
        request_timeout: Duration::from_secs(30),
        ..Default::default()
    };
    let err = pipeline_with(png_settings(), download)
        .process(task(&server, "/slow.png", "slow", dir.path()))
        .await
        .unwrap_err();

    match err {
        ItemError::Timeout { url, after } => {
            assert!(url.ends_with("/slow.png"));
            assert_eq!(after, Duration::from_millis(200));
        }
        other => panic!("expected timeout, got {other:?}"),
    }
    assert!(!dir.path().join("slow.png").exists());
    assert!(no_partial_files(dir.path()));
}

#[tokio::test]
async fn test_placeholder_check_passes_ordinary_images() {
    let server = MockServer::start().await;
    serve(&server, "/real.png", png_bytes(20, 20)).await;
    let dir = TempDir::new().unwrap();

    let mut settings = png_settings();
    settings.filter.remove_known_placeholder = true;

    pipeline(settings)
        .process(task(&server, "/real.png", "real", dir.path()))
        .await
        .unwrap();
}

#[test]
fn test_header_read_without_decode() {
    let dir = TempDir::new().unwrap();
    let file = dir.path().join("h.png");
    std::fs::write(&file, png_bytes(33, 17)).unwrap();

    let header = read_header(&file).unwrap();
    assert_eq!((header.width, header.height, header.channels), (33, 17, 3));
    assert_eq!(header.estimated_bytes(), 33 * 17 * 3);
}
