//! Brick Trace: per-step execution records
//!
//! The reducer appends one [`TraceRecord`] for every step it attempts,
//! keyed by run id and brick instance id. Queries find the latest call of a
//! step inside loops ([`get_latest_call`]) or scope records to one loop
//! iteration ([`filter_traces_by_call`]).

pub mod query;
pub mod record;
pub mod store;

use std::sync::Arc;
use tracing::trace;

use brick_core::RunId;

pub use query::{filter_traces_by_call, get_latest_call};
pub use record::{ErrorRecord, TraceOutcome, TraceRecord};
pub use store::{InMemoryTraceStore, TraceStore};

/// Sees every step outcome, stored or not (ex: metrics)
pub type StepObserver = Arc<dyn Fn(RunId, &TraceOutcome) + Send + Sync>;

/// Front door used by the reducer
#[derive(Clone)]
pub struct TraceRecorder {
    store: Arc<dyn TraceStore>,
    enabled: bool,
    observer: Option<StepObserver>,
}

impl TraceRecorder {
    pub fn new(store: Arc<dyn TraceStore>) -> Self {
        Self {
            store,
            enabled: true,
            observer: None,
        }
    }

    /// A recorder backed by a fresh in-memory store
    pub fn in_memory(max_records_per_run: Option<usize>) -> Self {
        let store = match max_records_per_run {
            Some(max) => InMemoryTraceStore::with_capacity(max),
            None => InMemoryTraceStore::new(),
        };
        Self::new(Arc::new(store))
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn with_observer(mut self, observer: StepObserver) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn store(&self) -> &Arc<dyn TraceStore> {
        &self.store
    }

    /// Report one step outcome. `build` only runs when records are stored.
    pub fn record_step<F>(&self, run_id: RunId, outcome: TraceOutcome, build: F)
    where
        F: FnOnce(TraceOutcome) -> TraceRecord,
    {
        if let Some(observer) = &self.observer {
            observer(run_id, &outcome);
        }
        if self.enabled {
            self.record(build(outcome));
        }
    }

    pub fn record(&self, record: TraceRecord) {
        if !self.enabled {
            return;
        }
        trace!(
            run_id = %record.run_id,
            brick_id = %record.brick_id,
            instance_id = %record.brick_instance_id,
            status = record.outcome.status(),
            "trace recorded"
        );
        self.store.append(record);
    }
}

impl Default for TraceRecorder {
    fn default() -> Self {
        Self::in_memory(None)
    }
}
