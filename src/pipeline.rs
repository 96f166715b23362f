//! The staged pipeline runtime.
//!
//! Stages form a linear FIFO chain between an input source and an output
//! sink. Passive runs execute unbuffered (one request at a time); active
//! runs give every stage a bounded in-flight window so slow stages apply
//! backpressure upstream instead of stalling the whole chain.

use async_trait::async_trait;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::trace;

use crate::error::{EnumError, Result};
use crate::requests::DNSRequest;

/// One stage of the chain. Returning `None` drops the request; the runtime
/// accounts for the drop.
#[async_trait]
pub trait Stage: Send + Sync {
    fn name(&self) -> &'static str;

    async fn process(&self, req: DNSRequest, token: &CancellationToken) -> Option<DNSRequest>;
}

/// Produces the pipeline's input until it closes.
#[async_trait]
pub trait InputSource: Send + Sync {
    /// The next request, or `None` once the source has closed.
    async fn next(&self) -> Option<DNSRequest>;
}

/// Consumes requests that survive every stage.
#[async_trait]
pub trait OutputSink: Send + Sync {
    async fn accept(&self, req: DNSRequest);
}

pub struct Pipeline {
    stages: Vec<Arc<dyn Stage>>,
    in_flight: Arc<AtomicUsize>,
}

impl Pipeline {
    /// `in_flight` counts requests currently between source and sink; it is
    /// shared with the name source, which samples it for quiescence
    /// detection.
    pub fn new(stages: Vec<Arc<dyn Stage>>, in_flight: Arc<AtomicUsize>) -> Self {
        Self { stages, in_flight }
    }

    /// Pull-driven execution: each request walks the whole chain before the
    /// next is pulled. Cancellation is observed between pulls and between
    /// stage hops, so the request in flight settles its current hop.
    pub async fn execute(
        &self,
        token: CancellationToken,
        source: Arc<dyn InputSource>,
        sink: Arc<dyn OutputSink>,
    ) -> Result<()> {
        loop {
            let req = tokio::select! {
                _ = token.cancelled() => return Err(EnumError::Cancelled),
                req = source.next() => match req {
                    Some(req) => req,
                    None => return Ok(()),
                },
            };

            self.in_flight.fetch_add(1, Ordering::SeqCst);
            let mut current = Some(req);
            for stage in &self.stages {
                let Some(req) = current.take() else { break };
                current = stage.process(req, &token).await;
                if token.is_cancelled() {
                    self.in_flight.fetch_sub(1, Ordering::SeqCst);
                    return Err(EnumError::Cancelled);
                }
            }
            if let Some(req) = current {
                sink.accept(req).await;
            }
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
        }
    }

    /// Buffered execution: every stage runs as its own task joined by
    /// bounded channels, giving each a `bound`-sized in-flight window.
    /// Closing cascades from the source; cancellation lets each stage finish
    /// the request it is processing and discards the rest.
    pub async fn execute_buffered(
        &self,
        token: CancellationToken,
        source: Arc<dyn InputSource>,
        sink: Arc<dyn OutputSink>,
        bound: usize,
    ) -> Result<()> {
        let mut handles = Vec::with_capacity(self.stages.len() + 2);
        let (first_tx, mut prev_rx) = mpsc::channel::<DNSRequest>(bound);

        {
            let token = token.clone();
            let in_flight = self.in_flight.clone();
            let source = source.clone();
            handles.push(tokio::spawn(async move {
                loop {
                    let req = tokio::select! {
                        _ = token.cancelled() => break,
                        req = source.next() => match req {
                            Some(req) => req,
                            None => break,
                        },
                    };
                    in_flight.fetch_add(1, Ordering::SeqCst);
                    tokio::select! {
                        _ = token.cancelled() => {
                            in_flight.fetch_sub(1, Ordering::SeqCst);
                            break;
                        }
                        sent = first_tx.send(req) => {
                            if sent.is_err() {
                                in_flight.fetch_sub(1, Ordering::SeqCst);
                                break;
                            }
                        }
                    }
                }
            }));
        }

        for stage in &self.stages {
            let (tx, rx) = mpsc::channel::<DNSRequest>(bound);
            let mut rx_in = std::mem::replace(&mut prev_rx, rx);
            let stage = stage.clone();
            let token = token.clone();
            let in_flight = self.in_flight.clone();
            handles.push(tokio::spawn(async move {
                loop {
                    let req = tokio::select! {
                        _ = token.cancelled() => break,
                        req = rx_in.recv() => match req {
                            Some(req) => req,
                            None => break,
                        },
                    };
                    match stage.process(req, &token).await {
                        Some(out) => {
                            if tx.send(out).await.is_err() {
                                in_flight.fetch_sub(1, Ordering::SeqCst);
                                break;
                            }
                        }
                        None => {
                            in_flight.fetch_sub(1, Ordering::SeqCst);
                        }
                    }
                }
                trace!("stage {} flushed", stage.name());
            }));
        }

        {
            let token = token.clone();
            let in_flight = self.in_flight.clone();
            handles.push(tokio::spawn(async move {
                loop {
                    let req = tokio::select! {
                        _ = token.cancelled() => break,
                        req = prev_rx.recv() => match req {
                            Some(req) => req,
                            None => break,
                        },
                    };
                    sink.accept(req).await;
                    in_flight.fetch_sub(1, Ordering::SeqCst);
                }
            }));
        }

        for handle in handles {
            let _ = handle.await;
        }

        if token.is_cancelled() {
            Err(EnumError::Cancelled)
        } else {
            Ok(())
        }
    }
}
