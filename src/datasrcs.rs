//! Handles for external data sources.
//!
//! A source is an independent task that consumes seed requests and reports
//! whatever it discovers through the name source. The engine only holds the
//! handle: an input channel, a termination signal, and identity strings.

use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::requests::SourceRequest;

type SeedFilter = Arc<dyn Fn(&SourceRequest) -> bool + Send + Sync>;

/// Handle to a running data source.
#[derive(Clone)]
pub struct DataSource {
    name: String,
    description: String,
    input: mpsc::Sender<SourceRequest>,
    done: CancellationToken,
    filter: Option<SeedFilter>,
}

impl DataSource {
    /// Create a handle and the receiving end the source task consumes.
    pub fn new(
        name: &str,
        description: &str,
        capacity: usize,
    ) -> (Self, mpsc::Receiver<SourceRequest>) {
        let (tx, rx) = mpsc::channel(capacity);
        (
            Self {
                name: name.to_string(),
                description: description.to_string(),
                input: tx,
                done: CancellationToken::new(),
                filter: None,
            },
            rx,
        )
    }

    /// Restrict which seeds this source receives. The default is accept-all,
    /// matching the broadcast behavior of the dispatcher.
    pub fn with_filter(
        mut self,
        filter: impl Fn(&SourceRequest) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.filter = Some(Arc::new(filter));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Describes the source's origin class; parsed as the tag for names
    /// recovered from previous runs.
    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn input(&self) -> &mpsc::Sender<SourceRequest> {
        &self.input
    }

    /// Cancelled when the source task has terminated.
    pub fn done(&self) -> &CancellationToken {
        &self.done
    }

    /// Signal the source task to stop.
    pub fn shutdown(&self) {
        self.done.cancel();
    }

    pub fn accepts(&self, req: &SourceRequest) -> bool {
        self.filter.as_ref().map(|f| f(req)).unwrap_or(true)
    }
}

impl fmt::Debug for DataSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataSource")
            .field("name", &self.name)
            .field("description", &self.description)
            .finish()
    }
}
