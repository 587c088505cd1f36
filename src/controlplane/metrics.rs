//! Operator Metrics
//!
//! Prometheus collectors for the reconcile loop, registered on a dedicated
//! registry that the metrics server gathers from.

use crate::crd::ReadinessState;
use crate::domain::ObjectKey;
use crate::error::{Error, Result};
use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGaugeVec, Opts, Registry,
    TextEncoder,
};
use std::time::Duration;

const NAMESPACE: &str = "openstack_controlplane";

/// Reconcile loop metrics
#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    pub reconciliations: IntCounterVec,
    pub failures: IntCounterVec,
    pub conflicts: IntCounter,
    pub duration: Histogram,
    pub ready: IntGaugeVec,
}

impl Metrics {
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let reconciliations = IntCounterVec::new(
            Opts::new("reconciliations_total", "Reconciliations by result").namespace(NAMESPACE),
            &["result"],
        )
        .map_err(metrics_error)?;
        let failures = IntCounterVec::new(
            Opts::new("reconcile_failures_total", "Failed reconciliations by error")
                .namespace(NAMESPACE),
            &["error"],
        )
        .map_err(metrics_error)?;
        let conflicts = IntCounter::with_opts(
            Opts::new("status_conflicts_total", "Status writes rejected as stale")
                .namespace(NAMESPACE),
        )
        .map_err(metrics_error)?;
        let duration = Histogram::with_opts(
            HistogramOpts::new("reconcile_duration_seconds", "Duration of reconciliations")
                .namespace(NAMESPACE)
                .buckets(vec![0.005, 0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0]),
        )
        .map_err(metrics_error)?;
        let ready = IntGaugeVec::new(
            Opts::new("ready", "1 when the control plane is ready").namespace(NAMESPACE),
            &["namespace", "name"],
        )
        .map_err(metrics_error)?;

        registry
            .register(Box::new(reconciliations.clone()))
            .map_err(metrics_error)?;
        registry
            .register(Box::new(failures.clone()))
            .map_err(metrics_error)?;
        registry
            .register(Box::new(conflicts.clone()))
            .map_err(metrics_error)?;
        registry
            .register(Box::new(duration.clone()))
            .map_err(metrics_error)?;
        registry
            .register(Box::new(ready.clone()))
            .map_err(metrics_error)?;

        Ok(Self {
            registry,
            reconciliations,
            failures,
            conflicts,
            duration,
            ready,
        })
    }

    pub fn record_success(&self, elapsed: Duration) {
        self.reconciliations.with_label_values(&["success"]).inc();
        self.duration.observe(elapsed.as_secs_f64());
    }

    pub fn record_failure(&self, error: &Error, elapsed: Duration) {
        self.reconciliations.with_label_values(&["error"]).inc();
        self.failures.with_label_values(&[error.metric_label()]).inc();
        self.duration.observe(elapsed.as_secs_f64());
    }

    pub fn record_conflict(&self) {
        self.conflicts.inc();
    }

    pub fn set_readiness(&self, key: &ObjectKey, state: ReadinessState) {
        self.ready
            .with_label_values(&[&key.namespace, &key.name])
            .set(if state.is_ready() { 1 } else { 0 });
    }

    pub fn forget(&self, key: &ObjectKey) {
        let _ = self.ready.remove_label_values(&[&key.namespace, &key.name]);
    }

    /// Text exposition of every collector
    pub fn encode(&self) -> Result<(String, Vec<u8>)> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder
            .encode(&self.registry.gather(), &mut buffer)
            .map_err(metrics_error)?;
        Ok((encoder.format_type().to_string(), buffer))
    }
}

fn metrics_error(e: prometheus::Error) -> Error {
    Error::Internal(format!("Metrics error: {}", e))
}
