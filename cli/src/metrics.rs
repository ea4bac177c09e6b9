//! # Prometheus Metrics
//!
//! Counters and gauges collected while a scenario runs. Rendered in the
//! Prometheus text exposition format by `granary run --metrics`.
//!
//! All metrics are registered in a dedicated [`prometheus::Registry`] under
//! the `granary` namespace so they do not collide with the default global
//! registry.

use prometheus::{Encoder, IntCounter, IntGauge, Registry, TextEncoder};

/// Holds all Prometheus metric handles for a run.
#[derive(Clone)]
pub struct RunMetrics {
    /// Prometheus registry that owns all metrics below.
    registry: Registry,
    /// Successful deposits.
    pub deposits_total: IntCounter,
    /// Successful withdrawals.
    pub withdrawals_total: IntCounter,
    /// Successful controller-driven hard work runs.
    pub hard_works_total: IntCounter,
    /// Successful strategy migrations.
    pub strategy_migrations_total: IntCounter,
    /// Scenario steps that returned an error.
    pub failed_steps_total: IntCounter,
    /// Vault share supply after the latest step.
    pub total_shares: IntGauge,
    /// Vault price per full share after the latest step.
    pub price_per_full_share: IntGauge,
}

impl RunMetrics {
    /// Creates and registers all metrics.
    pub fn new() -> Self {
        let registry = Registry::new_custom(Some("granary".into()), None)
            .expect("failed to create prometheus registry");

        let deposits_total = IntCounter::new("deposits_total", "Successful vault deposits")
            .expect("metric creation");
        registry
            .register(Box::new(deposits_total.clone()))
            .expect("metric registration");

        let withdrawals_total =
            IntCounter::new("withdrawals_total", "Successful vault withdrawals")
                .expect("metric creation");
        registry
            .register(Box::new(withdrawals_total.clone()))
            .expect("metric registration");

        let hard_works_total = IntCounter::new(
            "hard_works_total",
            "Controller-driven hard work runs that completed",
        )
        .expect("metric creation");
        registry
            .register(Box::new(hard_works_total.clone()))
            .expect("metric registration");

        let strategy_migrations_total = IntCounter::new(
            "strategy_migrations_total",
            "Strategy migrations that completed",
        )
        .expect("metric creation");
        registry
            .register(Box::new(strategy_migrations_total.clone()))
            .expect("metric registration");

        let failed_steps_total =
            IntCounter::new("failed_steps_total", "Scenario steps that returned an error")
                .expect("metric creation");
        registry
            .register(Box::new(failed_steps_total.clone()))
            .expect("metric registration");

        let total_shares = IntGauge::new("vault_total_shares", "Vault share supply")
            .expect("metric creation");
        registry
            .register(Box::new(total_shares.clone()))
            .expect("metric registration");

        let price_per_full_share = IntGauge::new(
            "vault_price_per_full_share",
            "Underlying per full share, scaled by 10^decimals",
        )
        .expect("metric creation");
        registry
            .register(Box::new(price_per_full_share.clone()))
            .expect("metric registration");

        Self {
            registry,
            deposits_total,
            withdrawals_total,
            hard_works_total,
            strategy_migrations_total,
            failed_steps_total,
            total_shares,
            price_per_full_share,
        }
    }

    /// Encodes all registered metrics into the Prometheus text exposition format.
    pub fn encode(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

impl Default for RunMetrics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_with_namespace() {
        let metrics = RunMetrics::new();
        metrics.deposits_total.inc();
        metrics.total_shares.set(42);

        let text = metrics.encode().unwrap();
        assert!(text.contains("granary_deposits_total 1"));
        assert!(text.contains("granary_vault_total_shares 42"));
    }
}
