use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio_util::sync::CancellationToken;

use muninn::error::EnumError;
use muninn::pipeline::{InputSource, OutputSink, Pipeline, Stage};
use muninn::requests::{DNSRequest, Tag};

/// Source yielding a fixed list of requests, then closing.
struct ListSource {
    items: Mutex<Vec<DNSRequest>>,
}

impl ListSource {
    fn new(names: &[&str]) -> Self {
        Self {
            items: Mutex::new(
                names
                    .iter()
                    .rev()
                    .map(|n| DNSRequest::new(n, "example.com", Tag::Dns, "DNS"))
                    .collect(),
            ),
        }
    }
}

#[async_trait]
impl InputSource for ListSource {
    async fn next(&self) -> Option<DNSRequest> {
        self.items.lock().pop()
    }
}

/// Source that never closes on its own.
struct PendingSource;

#[async_trait]
impl InputSource for PendingSource {
    async fn next(&self) -> Option<DNSRequest> {
        std::future::pending().await
    }
}

struct CollectSink {
    seen: Mutex<Vec<String>>,
}

impl CollectSink {
    fn new() -> Self {
        Self {
            seen: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl OutputSink for CollectSink {
    async fn accept(&self, req: DNSRequest) {
        self.seen.lock().push(req.name);
    }
}

/// Appends a marker to the source label and optionally drops odd names.
struct MarkStage {
    marker: &'static str,
    drop_suffix: Option<&'static str>,
}

#[async_trait]
impl Stage for MarkStage {
    fn name(&self) -> &'static str {
        "mark"
    }

    async fn process(&self, mut req: DNSRequest, _token: &CancellationToken) -> Option<DNSRequest> {
        if let Some(suffix) = self.drop_suffix {
            if req.name.starts_with(suffix) {
                return None;
            }
        }
        req.source = format!("{}{}", req.source, self.marker);
        Some(req)
    }
}

fn gauge() -> Arc<AtomicUsize> {
    Arc::new(AtomicUsize::new(0))
}

#[tokio::test]
async fn test_unbuffered_preserves_order() {
    let source = Arc::new(ListSource::new(&["a.example.com", "b.example.com", "c.example.com"]));
    let sink = Arc::new(CollectSink::new());
    let in_flight = gauge();
    let pipeline = Pipeline::new(
        vec![Arc::new(MarkStage { marker: "+1", drop_suffix: None })],
        in_flight.clone(),
    );

    pipeline
        .execute(CancellationToken::new(), source, sink.clone())
        .await
        .unwrap();

    assert_eq!(
        *sink.seen.lock(),
        vec!["a.example.com", "b.example.com", "c.example.com"]
    );
    assert_eq!(in_flight.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_buffered_processes_everything() {
    let names: Vec<String> = (0..200).map(|i| format!("h{i}.example.com")).collect();
    let refs: Vec<&str> = names.iter().map(|s| s.as_str()).collect();
    let source = Arc::new(ListSource::new(&refs));
    let sink = Arc::new(CollectSink::new());
    let in_flight = gauge();
    let pipeline = Pipeline::new(
        vec![
            Arc::new(MarkStage { marker: "+1", drop_suffix: None }),
            Arc::new(MarkStage { marker: "+2", drop_suffix: None }),
        ],
        in_flight.clone(),
    );

    pipeline
        .execute_buffered(CancellationToken::new(), source, sink.clone(), 50)
        .await
        .unwrap();

    let seen = sink.seen.lock();
    assert_eq!(seen.len(), 200);
    assert_eq!(seen.as_slice(), refs.as_slice());
    assert_eq!(in_flight.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_dropped_items_settle_the_gauge() {
    let source = Arc::new(ListSource::new(&["drop.example.com", "keep.example.com"]));
    let sink = Arc::new(CollectSink::new());
    let in_flight = gauge();
    let pipeline = Pipeline::new(
        vec![Arc::new(MarkStage { marker: "", drop_suffix: Some("drop") })],
        in_flight.clone(),
    );

    pipeline
        .execute_buffered(CancellationToken::new(), source, sink.clone(), 50)
        .await
        .unwrap();

    assert_eq!(*sink.seen.lock(), vec!["keep.example.com"]);
    assert_eq!(in_flight.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_cancellation_returns_cancelled() {
    let source = Arc::new(PendingSource);
    let sink = Arc::new(CollectSink::new());
    let pipeline = Pipeline::new(
        vec![Arc::new(MarkStage { marker: "", drop_suffix: None })],
        gauge(),
    );

    let token = CancellationToken::new();
    let cancel = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        cancel.cancel();
    });

    let err = pipeline
        .execute_buffered(token, source, sink, 50)
        .await
        .unwrap_err();
    assert!(matches!(err, EnumError::Cancelled));
}
