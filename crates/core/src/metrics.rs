//! Prometheus metrics for core components.

use once_cell::sync::Lazy;
use prometheus::{HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts, Registry};

/// Holds created total.
pub static HOLDS_CREATED: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new("tombola_holds_created_total", "Total checkout holds created").unwrap()
});

/// Holds ended total by reason.
pub static HOLDS_ENDED: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("tombola_holds_ended_total", "Total holds ended"),
        &["reason"], // "released", "expired", "superseded", "consumed"
    )
    .unwrap()
});

/// Purchase attempts total by result.
pub static PURCHASES: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("tombola_purchases_total", "Total purchase attempts"),
        &["result"], // "settled", "declined", "expired", "failed"
    )
    .unwrap()
});

/// Tickets sold total.
pub static TICKETS_SOLD: Lazy<IntCounter> =
    Lazy::new(|| IntCounter::new("tombola_tickets_sold_total", "Total tickets sold").unwrap());

/// Refund instructions issued total.
pub static REFUNDS_ISSUED: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "tombola_refunds_issued_total",
        "Total refund instructions issued",
    )
    .unwrap()
});

/// Competitions closed total by outcome.
pub static CLOSEOUTS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("tombola_closeouts_total", "Total competition closeouts"),
        &["outcome"], // "settled", "refunded"
    )
    .unwrap()
});

/// Draws completed total.
pub static DRAWS_COMPLETED: Lazy<IntCounter> =
    Lazy::new(|| IntCounter::new("tombola_draws_total", "Total draws completed").unwrap());

/// Hold quantity distribution.
pub static HOLD_QUANTITY: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new("tombola_hold_quantity", "Tickets per hold")
            .buckets(vec![1.0, 2.0, 5.0, 10.0, 25.0, 50.0, 100.0]),
        &[],
    )
    .unwrap()
});

/// Register all core metrics with the given registry.
pub fn register_metrics(registry: &Registry) {
    let collectors: Vec<Box<dyn prometheus::core::Collector>> = vec![
        Box::new(HOLDS_CREATED.clone()),
        Box::new(HOLDS_ENDED.clone()),
        Box::new(PURCHASES.clone()),
        Box::new(TICKETS_SOLD.clone()),
        Box::new(REFUNDS_ISSUED.clone()),
        Box::new(CLOSEOUTS.clone()),
        Box::new(DRAWS_COMPLETED.clone()),
        Box::new(HOLD_QUANTITY.clone()),
    ];
    for collector in collectors {
        if let Err(e) = registry.register(collector) {
            tracing::warn!("Failed to register metric: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_metrics() {
        let registry = Registry::new();
        register_metrics(&registry);
        PURCHASES.with_label_values(&["settled"]).inc();
        assert!(!registry.gather().is_empty());
    }
}
