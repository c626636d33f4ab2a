//! Prometheus metrics served on `/metrics`
use std::sync::Arc;

use prometheus::{Encoder, IntCounterVec, Opts, Registry, TextEncoder};

use brick_core::RunId;
use brick_trace::{StepObserver, TraceOutcome};

pub struct ApiMetrics {
    registry: Registry,
    runs: IntCounterVec,
    steps: IntCounterVec,
}

impl ApiMetrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let runs = IntCounterVec::new(
            Opts::new("brickflow_runs_total", "Pipeline runs by final status"),
            &["status"],
        )?;
        let steps = IntCounterVec::new(
            Opts::new("brickflow_steps_total", "Pipeline steps by outcome"),
            &["status"],
        )?;

        registry.register(Box::new(runs.clone()))?;
        registry.register(Box::new(steps.clone()))?;

        Ok(Self {
            registry,
            runs,
            steps,
        })
    }

    /// `status` is `ok` or an error kind
    pub fn observe_run(&self, status: &str) {
        self.runs.with_label_values(&[status]).inc();
    }

    /// Counts steps as the recorder sees them, stored or not
    pub fn step_observer(&self) -> StepObserver {
        let steps = self.steps.clone();
        Arc::new(move |_: RunId, outcome: &TraceOutcome| {
            steps.with_label_values(&[outcome.status()]).inc();
        })
    }

    pub fn encode(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_counts() {
        let metrics = ApiMetrics::new().unwrap();
        metrics.observe_run("ok");
        metrics.observe_run("ok");
        metrics.observe_run("execution");
        let observe = metrics.step_observer();
        let run = RunId::new_v4();
        observe(run, &TraceOutcome::Skipped);
        observe(run, &TraceOutcome::output(serde_json::json!(1), None));
        observe(run, &TraceOutcome::output(serde_json::json!(2), None));

        let text = metrics.encode().unwrap();
        assert!(text.contains("brickflow_runs_total{status=\"ok\"} 2"));
        assert!(text.contains("brickflow_runs_total{status=\"execution\"} 1"));
        assert!(text.contains("brickflow_steps_total{status=\"output\"} 2"));
        assert!(text.contains("brickflow_steps_total{status=\"skipped\"} 1"));
    }
}
