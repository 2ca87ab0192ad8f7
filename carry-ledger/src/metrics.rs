//! Metrics collection for observability
//!
//! # Metrics
//!
//! - `carry_ticks_total` - Individual leg applications
//! - `carry_batches_total` - Batch calls committed
//! - `carry_batch_size` - Histogram of batch leg counts
//! - `carry_snapshots_total` - Snapshots sealed
//! - `carry_rejections_total` - Calls rejected before mutation
//! - `carry_net_carry_units` - Current net carry (fixed-point, saturated to i64)

use crate::types::{Carry, CarryEvent};
use prometheus::{Histogram, HistogramOpts, IntCounter, IntGauge, Registry};
use std::sync::Arc;

/// Metrics collector
#[derive(Clone, Debug)]
pub struct Metrics {
    /// Individual leg applications
    pub ticks_total: IntCounter,

    /// Batch calls committed
    pub batches_total: IntCounter,

    /// Batch size histogram
    pub batch_size: Histogram,

    /// Snapshots sealed
    pub snapshots_total: IntCounter,

    /// Rejected calls
    pub rejections_total: IntCounter,

    /// Current net carry
    pub net_carry: IntGauge,

    /// Prometheus registry
    pub registry: Arc<Registry>,
}

impl Metrics {
    /// Create new metrics collector on a private registry
    pub fn new() -> prometheus::Result<Self> {
        let registry = Arc::new(Registry::new());

        let ticks_total = IntCounter::new("carry_ticks_total", "Individual leg applications")?;
        registry.register(Box::new(ticks_total.clone()))?;

        let batches_total = IntCounter::new("carry_batches_total", "Batch calls committed")?;
        registry.register(Box::new(batches_total.clone()))?;

        let batch_size = Histogram::with_opts(
            HistogramOpts::new("carry_batch_size", "Histogram of batch leg counts")
                .buckets(vec![0.0, 1.0, 5.0, 10.0, 25.0, 50.0, 100.0, 250.0, 500.0]),
        )?;
        registry.register(Box::new(batch_size.clone()))?;

        let snapshots_total = IntCounter::new("carry_snapshots_total", "Snapshots sealed")?;
        registry.register(Box::new(snapshots_total.clone()))?;

        let rejections_total =
            IntCounter::new("carry_rejections_total", "Calls rejected before mutation")?;
        registry.register(Box::new(rejections_total.clone()))?;

        let net_carry = IntGauge::new("carry_net_carry_units", "Current net carry (1e8 scale)")?;
        registry.register(Box::new(net_carry.clone()))?;

        Ok(Self {
            ticks_total,
            batches_total,
            batch_size,
            snapshots_total,
            rejections_total,
            net_carry,
            registry,
        })
    }

    /// Record a committed event
    pub fn record_event(&self, event: &CarryEvent) {
        match event {
            CarryEvent::CarryTick { new_net_carry, .. } => {
                self.ticks_total.inc();
                self.set_net_carry(*new_net_carry);
            }
            CarryEvent::CarryTickBatch {
                leg_count,
                new_net_carry,
                ..
            } => {
                self.ticks_total.inc_by(*leg_count);
                self.batches_total.inc();
                self.batch_size.observe(*leg_count as f64);
                self.set_net_carry(*new_net_carry);
            }
            CarryEvent::SnapshotSealed { .. } => {
                self.snapshots_total.inc();
            }
        }
    }

    /// Record a rejected call
    pub fn record_rejection(&self) {
        self.rejections_total.inc();
    }

    fn set_net_carry(&self, net_carry: Carry) {
        let clamped = net_carry.clamp(i64::MIN as Carry, i64::MAX as Carry) as i64;
        self.net_carry.set(clamped);
    }

    /// Get metrics registry
    pub fn registry(&self) -> &Registry {
        &self.registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::LegId;

    #[test]
    fn test_metrics_creation() {
        let metrics = Metrics::new().unwrap();
        assert_eq!(metrics.ticks_total.get(), 0);
        assert_eq!(metrics.registry().gather().len(), 6);

        // Private registries never collide
        assert!(Metrics::new().is_ok());
    }

    #[test]
    fn test_record_events() {
        let metrics = Metrics::new().unwrap();
        metrics.record_event(&CarryEvent::CarryTick {
            leg_id: LegId::from_label("a"),
            delta_carry: 5,
            new_net_carry: 5,
        });
        metrics.record_event(&CarryEvent::CarryTickBatch {
            leg_count: 3,
            total_delta: 10,
            new_net_carry: 15,
        });
        metrics.record_event(&CarryEvent::SnapshotSealed {
            epoch_id: 1,
            sequence: 1,
            net_carry: 15,
        });

        assert_eq!(metrics.ticks_total.get(), 4);
        assert_eq!(metrics.batches_total.get(), 1);
        assert_eq!(metrics.snapshots_total.get(), 1);
        assert_eq!(metrics.net_carry.get(), 15);
    }

    #[test]
    fn test_net_carry_saturates() {
        let metrics = Metrics::new().unwrap();
        metrics.record_event(&CarryEvent::CarryTick {
            leg_id: LegId::from_label("a"),
            delta_carry: Carry::MIN,
            new_net_carry: Carry::MIN,
        });
        assert_eq!(metrics.net_carry.get(), i64::MIN);
    }
}
