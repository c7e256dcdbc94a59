//! Metrics collection for observability
//!
//! Prometheus collectors live on an engine-owned registry so several engines
//! (tests, replays) can coexist in one process.
//!
//! # Metrics
//!
//! - `arbitration_triggers_total{action,result}` - Triggers handled
//! - `arbitration_rejections_total{action,reason}` - Rejected triggers by error kind
//! - `arbitration_claims_resolved_total{status}` - Claims reaching a terminal status
//! - `arbitration_live_claims` - Claims in OPEN or DISPUTING

use prometheus::{Encoder, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};
use std::sync::Arc;

/// Metrics collector
#[derive(Clone)]
pub struct Metrics {
    /// Triggers handled, by action kind and accepted/rejected
    pub triggers_total: IntCounterVec,

    /// Rejections by action kind and error kind
    pub rejections_total: IntCounterVec,

    /// Terminal resolutions by status
    pub claims_resolved: IntCounterVec,

    /// Live claims
    pub live_claims: IntGauge,

    /// Prometheus registry
    pub registry: Arc<Registry>,
}

impl Metrics {
    /// Create new metrics collector
    pub fn new() -> prometheus::Result<Self> {
        let registry = Arc::new(Registry::new());

        let triggers_total = IntCounterVec::new(
            Opts::new("arbitration_triggers_total", "Total number of triggers handled"),
            &["action", "result"],
        )?;
        registry.register(Box::new(triggers_total.clone()))?;

        let rejections_total = IntCounterVec::new(
            Opts::new("arbitration_rejections_total", "Total number of rejected triggers"),
            &["action", "reason"],
        )?;
        registry.register(Box::new(rejections_total.clone()))?;

        let claims_resolved = IntCounterVec::new(
            Opts::new(
                "arbitration_claims_resolved_total",
                "Total number of claims reaching a terminal status",
            ),
            &["status"],
        )?;
        registry.register(Box::new(claims_resolved.clone()))?;

        let live_claims = IntGauge::new("arbitration_live_claims", "Claims in OPEN or DISPUTING")?;
        registry.register(Box::new(live_claims.clone()))?;

        Ok(Self {
            triggers_total,
            rejections_total,
            claims_resolved,
            live_claims,
            registry,
        })
    }

    /// Record a handled trigger
    pub fn record_trigger(&self, action: &str, accepted: bool) {
        let result = if accepted { "accepted" } else { "rejected" };
        self.triggers_total.with_label_values(&[action, result]).inc();
    }

    /// Record why a trigger was rejected
    pub fn record_rejection(&self, action: &str, reason: &str) {
        self.rejections_total.with_label_values(&[action, reason]).inc();
    }

    /// Record a terminal resolution
    pub fn record_resolution(&self, status: &str) {
        self.claims_resolved.with_label_values(&[status]).inc();
    }

    /// Update live claim count
    pub fn set_live_claims(&self, count: usize) {
        self.live_claims.set(i64::try_from(count).unwrap_or(i64::MAX));
    }

    /// Get metrics registry
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Text exposition of every collector
    pub fn render(&self) -> prometheus::Result<String> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

impl std::fmt::Debug for Metrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Metrics")
            .field("live_claims", &self.live_claims.get())
            .finish_non_exhaustive()
    }
}
