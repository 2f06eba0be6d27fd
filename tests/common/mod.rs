//! Common fixtures for end-to-end acquisition tests

#![allow(dead_code)]

use async_trait::async_trait;
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use imsearch_dl::fetch::page_request_count;
use imsearch_dl::{
    Config, EngineProfile, ImageSize, ImageStyle, OffsetFetcher, PageParams, ResultRecord,
};
use std::io::Cursor;
use std::sync::Mutex;
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Number of images served by [`serve_gallery`]
pub const GALLERY_SIZE: usize = 12;

/// PNG-encoded solid colour image
pub fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let image = RgbImage::from_pixel(width, height, Rgb([200, 40, 90]));
    let mut bytes = Vec::new();
    DynamicImage::ImageRgb8(image)
        .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
        .unwrap();
    bytes
}

/// Serve `/gallery/{i}.png` for every gallery index
///
/// Every fifth image is only 10 pixels wide so a width filter can reject it.
pub async fn serve_gallery(server: &MockServer) {
    for i in 0..GALLERY_SIZE {
        let width = if i % 5 == 0 { 10 } else { 160 };
        Mock::given(method("GET"))
            .and(path(format!("/gallery/{i}.png")))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(png_bytes(width, 120)))
            .mount(server)
            .await;
    }
}

/// Search engine stand-in returning gallery URLs on a wiremock server
///
/// Results past the end of the gallery point at a route with no mock, which
/// answers 404.
pub struct GalleryEngine {
    profile: EngineProfile,
    base: String,
    /// `(offset, aux_params)` of every page request
    pub requests: Mutex<Vec<(usize, Vec<(String, String)>)>>,
}

impl GalleryEngine {
    pub fn new(base: impl Into<String>, per_page: usize) -> Self {
        let profile = EngineProfile::new("gallery", per_page)
            .with_params("imgsz", "imgtype")
            .with_size(ImageSize::Medium, "m")
            .with_size(ImageSize::Large, "l")
            .with_style(ImageStyle::Photo, "photo");
        Self {
            profile,
            base: base.into(),
            requests: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl OffsetFetcher for GalleryEngine {
    fn profile(&self) -> &EngineProfile {
        &self.profile
    }

    async fn fetch_page(
        &self,
        _query: &str,
        offset: usize,
        params: &PageParams,
    ) -> imsearch_dl::Result<Vec<ResultRecord>> {
        let mut aux: Vec<_> = params
            .aux_params
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        aux.sort();
        self.requests.lock().unwrap().push((offset, aux));

        let count = page_request_count(
            offset,
            params.num_results,
            self.profile.results_per_request,
        );
        Ok((offset..offset + count)
            .map(|i| {
                ResultRecord::fingerprinted(
                    format!("{}/gallery/{i}.png", self.base),
                    &format!("{i}.png"),
                )
                .with_rank(i as u32)
            })
            .collect())
    }
}

/// Configuration for end-to-end runs: PNG output, small thumbnails
pub fn e2e_config() -> Config {
    let mut config = Config::default();
    config.pipeline.conversion.format = "png".to_string();
    config.pipeline.thumbnail.format = "png".to_string();
    config.pipeline.thumbnail.width = 48;
    config.pipeline.thumbnail.height = 48;
    config.pipeline.filter.min_width = 100;
    config.pipeline.filter.min_height = 100;
    config.download.batch_timeout = Duration::from_secs(20);
    config.download.item_timeout = Duration::from_secs(10);
    config.download.request_timeout = Duration::from_secs(5);
    config.callbacks.worker_count = Some(3);
    config.callbacks.join_timeout = Duration::from_secs(10);
    config.fetch.timeout = Duration::from_secs(5);
    config
}
