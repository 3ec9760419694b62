//! Prometheus metrics setup and metric definitions

use metrics::{counter, describe_counter};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

pub const RESOLUTIONS_TOTAL: &str = "kroolo_authz_resolutions_total";
pub const PAGE_DECISIONS_TOTAL: &str = "kroolo_authz_page_decisions_total";

/// Install the Prometheus recorder and return a handle for rendering metrics.
pub fn install_prometheus_recorder() -> anyhow::Result<PrometheusHandle> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    Ok(handle)
}

/// Register metric descriptions and emit initial zero values so the
/// exposition output includes HELP/TYPE lines from startup.
pub fn describe_metrics() {
    describe_counter!(
        RESOLUTIONS_TOTAL,
        "Effective permission resolutions by outcome (resolved/store_unavailable)"
    );
    describe_counter!(
        PAGE_DECISIONS_TOTAL,
        "Page access decisions by outcome (allow/deny_unauthenticated/deny_forbidden)"
    );

    counter!(RESOLUTIONS_TOTAL, "outcome" => "resolved").absolute(0);
    counter!(RESOLUTIONS_TOTAL, "outcome" => "store_unavailable").absolute(0);
    for decision in ["allow", "deny_unauthenticated", "deny_forbidden"] {
        counter!(PAGE_DECISIONS_TOTAL, "decision" => decision).absolute(0);
    }
}
