use super::test_helpers::*;
use super::*;
use crate::callbacks::{CallbackRegistry, CallbackResult, CompletionCallback, JoinOutcome};
use crate::error::Error;
use crate::types::{Event, FailureKind, ProcessedImage, ResultRecord};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};


/// Serve `count` distinct PNGs at `/img{i}.png` and return matching records
async fn serve_images(server: &MockServer, count: usize) -> Vec<ResultRecord> {
    let mut records = Vec::with_capacity(count);
    for i in 0..count {
        let route = format!("/img{i}.png");
        Mock::given(method("GET"))
            .and(path(route.as_str()))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(png_bytes(40 + i as u32, 30)))
            .mount(server)
            .await;
        records.push(ResultRecord::new(
            format!("{}{}", server.uri(), route),
            format!("img{i}"),
        ));
    }
    records
}

fn counting_callback(counter: Arc<AtomicUsize>) -> Arc<dyn CompletionCallback> {
    Arc::new(
        move |_: &ProcessedImage, _: Option<&serde_json::Value>| -> CallbackResult {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        },
    )
}

/// Record that fails fast with a connection error
fn unreachable_record(id: &str) -> ResultRecord {
    ResultRecord::new(format!("http://127.0.0.1:1/{id}.png"), id)
}
