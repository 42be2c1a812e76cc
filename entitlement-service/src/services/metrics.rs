use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use prometheus::{IntCounterVec, Opts, Registry};
use std::sync::OnceLock;

pub static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();
pub static PROMETHEUS_REGISTRY: OnceLock<Registry> = OnceLock::new();
pub static WEBHOOK_EVENTS_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();
pub static GENERATIONS_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();
pub static ENTITLEMENT_DENIALS_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();

fn counter(name: &str, help: &str, labels: &[&str]) -> Option<IntCounterVec> {
    match IntCounterVec::new(Opts::new(name, help), labels) {
        Ok(counter) => Some(counter),
        Err(e) => {
            tracing::error!(metric = name, error = %e, "Failed to create metric");
            None
        }
    }
}

/// Installs the HTTP metrics recorder and the domain counters. Later calls
/// are no-ops, so every test app can call it.
pub fn init_metrics() {
    if METRICS_HANDLE.get().is_none() {
        match PrometheusBuilder::new().install_recorder() {
            Ok(handle) => {
                let _ = METRICS_HANDLE.set(handle);
            }
            Err(e) => tracing::warn!(error = %e, "Prometheus recorder not installed"),
        }
    }

    PROMETHEUS_REGISTRY.get_or_init(|| {
        let registry = Registry::new();

        let counters = [
            (
                &WEBHOOK_EVENTS_TOTAL,
                counter(
                    "billing_webhook_events_total",
                    "Billing webhook events by type and outcome",
                    &["event_type", "outcome"],
                ),
            ),
            (
                &GENERATIONS_TOTAL,
                counter(
                    "generations_total",
                    "Generation requests by tier and result",
                    &["tier", "result"],
                ),
            ),
            (
                &ENTITLEMENT_DENIALS_TOTAL,
                counter(
                    "entitlement_denials_total",
                    "Entitlement denials by action and reason",
                    &["action", "reason"],
                ),
            ),
        ];

        for (slot, counter) in counters {
            let Some(counter) = counter else { continue };
            if let Err(e) = registry.register(Box::new(counter.clone())) {
                tracing::error!(error = %e, "Failed to register metric");
                continue;
            }
            let _ = slot.set(counter);
        }

        registry
    });
}

pub fn get_metrics() -> String {
    let mut output = METRICS_HANDLE
        .get()
        .map(|handle| handle.render())
        .unwrap_or_else(|| "# Metrics recorder not initialized\n".to_string());

    if let Some(registry) = PROMETHEUS_REGISTRY.get() {
        use prometheus::Encoder;
        let encoder = prometheus::TextEncoder::new();
        let metric_families = registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer).ok();
        if let Ok(custom_metrics) = String::from_utf8(buffer) {
            output.push_str(&custom_metrics);
        }
    }

    output
}

pub fn record_webhook_event(event_type: &str, outcome: &str) {
    if let Some(counter) = WEBHOOK_EVENTS_TOTAL.get() {
        counter.with_label_values(&[event_type, outcome]).inc();
    }
}

pub fn record_generation(tier: &str, result: &str) {
    if let Some(counter) = GENERATIONS_TOTAL.get() {
        counter.with_label_values(&[tier, result]).inc();
    }
}

pub fn record_denial(action: &str, reason: &str) {
    if let Some(counter) = ENTITLEMENT_DENIALS_TOTAL.get() {
        counter.with_label_values(&[action, reason]).inc();
    }
}
