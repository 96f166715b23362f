//! Fan-out of seed requests to the external data sources.
//!
//! Every seed is broadcast to every source, but each source sees at most one
//! in-flight request at a time; the rest wait in that source's FIFO. A
//! single coordinator task observes completions and feeds the next queued
//! element, so per-source ordering never depends on task scheduling.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::datasrcs::DataSource;
use crate::requests::SourceRequest;

pub struct Dispatcher {
    tx: mpsc::UnboundedSender<SourceRequest>,
    busy: Arc<AtomicUsize>,
}

impl Dispatcher {
    /// Spawn the coordinator over the given sources. It runs until the token
    /// is cancelled, then drains and discards whatever is still queued.
    pub fn new(sources: Vec<DataSource>, token: CancellationToken) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let busy = Arc::new(AtomicUsize::new(0));
        tokio::spawn(coordinate(sources, rx, busy.clone(), token));
        Self { tx, busy }
    }

    /// Submit a seed for broadcast. Never blocks.
    pub fn send(&self, req: SourceRequest) {
        let _ = self.tx.send(req);
    }

    /// True while any source is processing a request.
    pub fn pending(&self) -> bool {
        self.busy.load(Ordering::SeqCst) > 0
    }

    /// Gauge of busy sources, shared with the quiescence predicate.
    pub fn busy_gauge(&self) -> Arc<AtomicUsize> {
        self.busy.clone()
    }
}

async fn coordinate(
    sources: Vec<DataSource>,
    mut rx: mpsc::UnboundedReceiver<SourceRequest>,
    busy: Arc<AtomicUsize>,
    token: CancellationToken,
) {
    let mut queues: Vec<VecDeque<SourceRequest>> =
        sources.iter().map(|_| VecDeque::new()).collect();
    let mut active: Vec<bool> = vec![false; sources.len()];
    let (done_tx, mut done_rx) = mpsc::unbounded_channel::<usize>();

    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            req = rx.recv() => {
                let Some(req) = req else { break };
                for (idx, src) in sources.iter().enumerate() {
                    if !src.accepts(&req) {
                        continue;
                    }
                    if !active[idx] && queues[idx].is_empty() {
                        active[idx] = true;
                        busy.fetch_add(1, Ordering::SeqCst);
                        fire(src.clone(), req.clone(), idx, done_tx.clone(), token.clone());
                    } else {
                        queues[idx].push_back(req.clone());
                    }
                }
            }
            Some(idx) = done_rx.recv() => {
                match queues[idx].pop_front() {
                    Some(next) => {
                        fire(sources[idx].clone(), next, idx, done_tx.clone(), token.clone());
                    }
                    None => {
                        active[idx] = false;
                        busy.fetch_sub(1, Ordering::SeqCst);
                    }
                }
            }
        }
    }

    // Shutdown: discard everything still queued and reset the gauge.
    while rx.try_recv().is_ok() {}
    let remaining: usize = queues.iter().map(|q| q.len()).sum();
    if remaining > 0 {
        debug!("dispatcher discarded {remaining} queued seed(s) on shutdown");
    }
    busy.store(0, Ordering::SeqCst);
}

/// Deliver one element to one source, then report completion. The send is
/// raced against run cancellation and the source's own termination.
fn fire(
    src: DataSource,
    req: SourceRequest,
    idx: usize,
    done_tx: mpsc::UnboundedSender<usize>,
    token: CancellationToken,
) {
    tokio::spawn(async move {
        tokio::select! {
            _ = token.cancelled() => {}
            _ = src.done().cancelled() => {}
            sent = src.input().send(req) => {
                if sent.is_err() {
                    debug!("data source {} closed its input", src.name());
                }
            }
        }
        let _ = done_tx.send(idx);
    });
}
