//! The pipeline's single input: candidate admission, run-wide name
//! deduplication, and quiescence detection.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::trace;

use crate::config::EnumConfig;
use crate::filter::StringFilter;
use crate::pipeline::InputSource;
use crate::requests::DNSRequest;

/// How often the quiescence predicate is sampled while the queue is empty.
const QUIESCENCE_SAMPLE: Duration = Duration::from_millis(250);

/// Feeds admitted candidate requests to the pipeline until the run goes
/// quiescent or is stopped.
pub struct NameSource {
    config: Arc<EnumConfig>,
    queue: Mutex<VecDeque<DNSRequest>>,
    notify: Notify,
    filter: StringFilter,
    done: CancellationToken,
    /// Requests between pipeline source and sink.
    in_flight: Arc<AtomicUsize>,
    /// Data sources currently busy in the dispatcher.
    dispatcher_busy: Arc<AtomicUsize>,
    /// Upserts outstanding in the data manager.
    store_outstanding: Arc<AtomicUsize>,
}

impl NameSource {
    pub fn new(
        config: Arc<EnumConfig>,
        in_flight: Arc<AtomicUsize>,
        dispatcher_busy: Arc<AtomicUsize>,
        store_outstanding: Arc<AtomicUsize>,
    ) -> Self {
        Self {
            config,
            queue: Mutex::new(VecDeque::new()),
            notify: Notify::new(),
            filter: StringFilter::new(),
            done: CancellationToken::new(),
            in_flight,
            dispatcher_busy,
            store_outstanding,
        }
    }

    /// Admit a candidate. Three filters apply in order: invalid names drop,
    /// names that resolve to no in-scope root drop, and names already seen
    /// this run drop. Admission never blocks.
    pub fn new_name(&self, mut req: DNSRequest) {
        if self.done.is_cancelled() {
            return;
        }

        let Some(name) = crate::names::normalize_fqdn(&req.name) else {
            trace!("dropping invalid name: {}", req.name);
            return;
        };
        req.name = name;

        if req.domain.is_empty() {
            match self.config.which_domain(&req.name) {
                Some(domain) => req.domain = domain.to_string(),
                None => {
                    trace!("dropping out-of-scope name: {}", req.name);
                    return;
                }
            }
        }

        if self.filter.duplicate(&req.name) {
            return;
        }

        self.queue.lock().push_back(req);
        self.notify.notify_one();
    }

    /// Close the source and wake any waiter. Idempotent.
    pub fn stop(&self) {
        self.done.cancel();
        self.notify.notify_one();
    }

    /// Quiescence: nothing queued, nothing in the pipeline, no source busy,
    /// no upsert outstanding. All four sampled together.
    fn quiescent(&self) -> bool {
        self.queue.lock().is_empty()
            && self.in_flight.load(Ordering::SeqCst) == 0
            && self.dispatcher_busy.load(Ordering::SeqCst) == 0
            && self.store_outstanding.load(Ordering::SeqCst) == 0
    }
}

#[async_trait]
impl InputSource for NameSource {
    async fn next(&self) -> Option<DNSRequest> {
        loop {
            if let Some(req) = self.queue.lock().pop_front() {
                return Some(req);
            }
            if self.done.is_cancelled() {
                return None;
            }

            tokio::select! {
                _ = self.notify.notified() => {}
                _ = self.done.cancelled() => return None,
                _ = tokio::time::sleep(QUIESCENCE_SAMPLE) => {
                    if self.quiescent() {
                        // Re-sample after a scheduler pass; a stage may be
                        // between decrementing the gauge and publishing a
                        // derived name.
                        tokio::time::sleep(Duration::from_millis(50)).await;
                        if self.quiescent() {
                            self.stop();
                            return None;
                        }
                    }
                }
            }
        }
    }
}
