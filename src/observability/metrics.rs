use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts, Registry, TextEncoder,
};

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    pub assignments_total: IntCounterVec,
    pub status_transitions_total: IntCounterVec,
    pub locations_ingested_total: IntCounter,
    pub location_broadcasts_total: IntCounterVec,
    pub engine_latency_seconds: HistogramVec,
    pub housekeeping_purged_total: IntCounterVec,
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let assignments_total = IntCounterVec::new(
            Opts::new("assignments_total", "Assignment attempts by operation and outcome"),
            &["operation", "outcome"],
        )
        .expect("valid assignments_total metric");

        let status_transitions_total = IntCounterVec::new(
            Opts::new(
                "status_transitions_total",
                "Applied order status transitions by target status and trigger",
            ),
            &["status", "trigger"],
        )
        .expect("valid status_transitions_total metric");

        let locations_ingested_total = IntCounter::new(
            "locations_ingested_total",
            "Location samples persisted",
        )
        .expect("valid locations_ingested_total metric");

        let location_broadcasts_total = IntCounterVec::new(
            Opts::new(
                "location_broadcasts_total",
                "Rider location broadcasts by outcome",
            ),
            &["outcome"],
        )
        .expect("valid location_broadcasts_total metric");

        let engine_latency_seconds = HistogramVec::new(
            HistogramOpts::new(
                "engine_latency_seconds",
                "Latency of engine operations in seconds",
            ),
            &["operation"],
        )
        .expect("valid engine_latency_seconds metric");

        let housekeeping_purged_total = IntCounterVec::new(
            Opts::new("housekeeping_purged_total", "Rows purged by housekeeping"),
            &["kind"],
        )
        .expect("valid housekeeping_purged_total metric");

        registry
            .register(Box::new(assignments_total.clone()))
            .expect("register assignments_total");
        registry
            .register(Box::new(status_transitions_total.clone()))
            .expect("register status_transitions_total");
        registry
            .register(Box::new(locations_ingested_total.clone()))
            .expect("register locations_ingested_total");
        registry
            .register(Box::new(location_broadcasts_total.clone()))
            .expect("register location_broadcasts_total");
        registry
            .register(Box::new(engine_latency_seconds.clone()))
            .expect("register engine_latency_seconds");
        registry
            .register(Box::new(housekeeping_purged_total.clone()))
            .expect("register housekeeping_purged_total");

        Self {
            registry,
            assignments_total,
            status_transitions_total,
            locations_ingested_total,
            location_broadcasts_total,
            engine_latency_seconds,
            housekeeping_purged_total,
        }
    }

    pub fn encode(&self) -> Result<String, String> {
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();

        TextEncoder::new()
            .encode(&metric_families, &mut buffer)
            .map_err(|err| format!("failed to encode metrics: {err}"))?;

        String::from_utf8(buffer).map_err(|err| format!("metrics are not valid utf8: {err}"))
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
