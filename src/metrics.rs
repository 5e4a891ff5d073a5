//! Prometheus metrics for the hall

use prometheus::{Encoder, IntCounter, IntGauge, Registry, TextEncoder};

pub struct HallMetrics {
    registry: Registry,
    pub rounds_started: IntCounter,
    pub rounds_settled: IntCounter,
    pub rounds_reset: IntCounter,
    pub numbers_drawn: IntCounter,
    /// Minor units
    pub stakes_collected: IntCounter,
    pub prizes_paid: IntCounter,
    pub commission_retained: IntCounter,
    /// Stakes of seats never admitted to a pool
    pub forfeited_retained: IntCounter,
    pub withdrawals_requested: IntCounter,
    pub settlement_retries: IntCounter,
    pub active_tables: IntGauge,
}

fn counter(registry: &Registry, name: &str, help: &str) -> prometheus::Result<IntCounter> {
    let counter = IntCounter::new(name, help)?;
    registry.register(Box::new(counter.clone()))?;
    Ok(counter)
}

impl HallMetrics {
    pub fn new() -> prometheus::Result<Self> {
        let registry = Registry::new();
        let active_tables = IntGauge::new("bingohall_active_tables", "Tables with a live round")?;
        registry.register(Box::new(active_tables.clone()))?;

        Ok(Self {
            rounds_started: counter(&registry, "bingohall_rounds_started_total", "Rounds that began drawing")?,
            rounds_settled: counter(&registry, "bingohall_rounds_settled_total", "Rounds settled")?,
            rounds_reset: counter(&registry, "bingohall_rounds_reset_total", "Rounds torn down by an admin")?,
            numbers_drawn: counter(&registry, "bingohall_numbers_drawn_total", "Numbers called")?,
            stakes_collected: counter(
                &registry,
                "bingohall_stakes_collected_minor_total",
                "Stake debits in minor units",
            )?,
            prizes_paid: counter(
                &registry,
                "bingohall_prizes_paid_minor_total",
                "Prize credits in minor units",
            )?,
            commission_retained: counter(
                &registry,
                "bingohall_commission_minor_total",
                "Commission kept in minor units",
            )?,
            forfeited_retained: counter(
                &registry,
                "bingohall_forfeited_stakes_minor_total",
                "Unadmitted stakes kept in minor units",
            )?,
            withdrawals_requested: counter(
                &registry,
                "bingohall_withdrawals_requested_total",
                "Withdrawal requests accepted",
            )?,
            settlement_retries: counter(
                &registry,
                "bingohall_settlement_retries_total",
                "Settlement attempts that had to be retried",
            )?,
            active_tables,
            registry,
        })
    }

    /// Text exposition format
    pub fn render(&self) -> String {
        let mut buffer = Vec::new();
        let encoder = TextEncoder::new();
        if let Err(e) = encoder.encode(&self.registry.gather(), &mut buffer) {
            tracing::warn!("Failed to encode metrics: {}", e);
        }
        String::from_utf8(buffer).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_includes_counters() {
        let metrics = HallMetrics::new().unwrap();
        metrics.rounds_started.inc();
        metrics.stakes_collected.inc_by(1_000);

        let text = metrics.render();
        assert!(text.contains("bingohall_rounds_started_total 1"));
        assert!(text.contains("bingohall_stakes_collected_minor_total 1000"));
    }
}
