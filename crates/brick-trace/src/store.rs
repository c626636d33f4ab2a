//! Trace storage
//!
//! Runs never share records, so concurrent runs only contend on the outer
//! map lock for the duration of an append.

use std::collections::{HashMap, VecDeque};
use std::sync::{PoisonError, RwLock};

use brick_core::{InstanceId, RunId};

use crate::record::TraceRecord;

/// Append/query backend for trace records
pub trait TraceStore: Send + Sync {
    fn append(&self, record: TraceRecord);

    /// Records of a run in insertion order
    fn list(&self, run_id: RunId) -> Vec<TraceRecord>;

    fn list_for_instance(&self, run_id: RunId, instance_id: InstanceId) -> Vec<TraceRecord> {
        self.list(run_id)
            .into_iter()
            .filter(|record| record.brick_instance_id == instance_id)
            .collect()
    }

    /// Drop a run's records, returning how many were removed
    fn clear(&self, run_id: RunId) -> usize;

    fn runs(&self) -> Vec<RunId>;
}

/// In-memory store with an optional ring capacity per run
#[derive(Debug, Default)]
pub struct InMemoryTraceStore {
    runs: RwLock<HashMap<RunId, VecDeque<TraceRecord>>>,
    max_records_per_run: Option<usize>,
}

impl InMemoryTraceStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep at most `max` records per run, evicting the oldest
    pub fn with_capacity(max: usize) -> Self {
        Self {
            runs: RwLock::default(),
            max_records_per_run: Some(max.max(1)),
        }
    }

    pub fn max_records_per_run(&self) -> Option<usize> {
        self.max_records_per_run
    }
}

impl TraceStore for InMemoryTraceStore {
    fn append(&self, record: TraceRecord) {
        let mut runs = self.runs.write().unwrap_or_else(PoisonError::into_inner);
        let records = runs.entry(record.run_id).or_default();
        if let Some(max) = self.max_records_per_run {
            while records.len() >= max {
                records.pop_front();
            }
        }
        records.push_back(record);
    }

    fn list(&self, run_id: RunId) -> Vec<TraceRecord> {
        let runs = self.runs.read().unwrap_or_else(PoisonError::into_inner);
        runs.get(&run_id)
            .map(|records| records.iter().cloned().collect())
            .unwrap_or_default()
    }

    fn list_for_instance(&self, run_id: RunId, instance_id: InstanceId) -> Vec<TraceRecord> {
        let runs = self.runs.read().unwrap_or_else(PoisonError::into_inner);
        runs.get(&run_id)
            .map(|records| {
                records
                    .iter()
                    .filter(|record| record.brick_instance_id == instance_id)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    fn clear(&self, run_id: RunId) -> usize {
        let mut runs = self.runs.write().unwrap_or_else(PoisonError::into_inner);
        runs.remove(&run_id).map(|records| records.len()).unwrap_or(0)
    }

    fn runs(&self) -> Vec<RunId> {
        let runs = self.runs.read().unwrap_or_else(PoisonError::into_inner);
        let mut ids: Vec<RunId> = runs.keys().copied().collect();
        ids.sort();
        ids
    }
}
