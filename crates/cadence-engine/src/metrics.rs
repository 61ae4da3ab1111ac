//! Per-tick metrics for the tick driver.
//!
//! [`TickMetrics`] captures phase timings and counts for one completed
//! tick. The driver hands it to the [`DriverMonitor`](crate::DriverMonitor)
//! and returns it in every [`TickReport`](crate::TickReport).

/// Timing and count metrics collected during a single tick.
///
/// All durations are in microseconds.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TickMetrics {
    /// Wall-clock time of the tick body, excluding pacing, in microseconds.
    pub total_us: u64,
    /// Dispatching and awaiting runners, in microseconds.
    pub runners_us: u64,
    /// Dispatching and awaiting processor phase A, in microseconds.
    pub processors_us: u64,
    /// Publishing the flush barrier and awaiting phase B, in microseconds.
    pub flush_us: u64,
    /// Deleting the tick's effect records, in microseconds.
    pub cleanup_us: u64,
    /// Actors dispatched.
    pub actors_dispatched: usize,
    /// Partitions dispatched.
    pub partitions_dispatched: usize,
    /// Effect records deleted after flush.
    pub effects_deleted: usize,
    /// Effect records addressed to partitions outside the roster.
    pub orphaned_effects: usize,
    /// Effect records whose deletion failed.
    pub cleanup_failures: usize,
    /// `actorFailed` and `partitionFailed` signals received.
    pub failures_reported: usize,
    /// Stall warnings logged.
    pub stall_reports: u64,
    /// `connected` signals that triggered a re-publish.
    pub late_joins: usize,
    /// Rolling average of `total_us` over recent ticks.
    pub avg_tick_us: u64,
}

impl TickMetrics {
    /// Total time in milliseconds, for log fields.
    pub fn total_ms(&self) -> f64 {
        self.total_us as f64 / 1000.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_metrics_are_zero() {
        let m = TickMetrics::default();
        assert_eq!(m.total_us, 0);
        assert_eq!(m.effects_deleted, 0);
        assert_eq!(m.stall_reports, 0);
        assert_eq!(m.total_ms(), 0.0);
    }

    #[test]
    fn total_ms_converts() {
        let m = TickMetrics {
            total_us: 2500,
            ..Default::default()
        };
        assert!((m.total_ms() - 2.5).abs() < f64::EPSILON);
    }
}
