//! Load metrics computed after each distribution pass.
use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LoadMetrics {
    /// Capacity bound used by the pass
    pub ideal_load: usize,
    pub average_load: f64,
    pub min_load: usize,
    pub max_load: usize,
    pub total_servers: usize,
    pub partition_count: usize,
    pub unassigned_partitions: usize,
    pub moved_partitions: usize,
}

impl LoadMetrics {
    /// Scans the per-server loads. With no servers every load statistic is 0.
    pub fn compute(
        loads: &BTreeMap<String, usize>,
        ideal_load: usize,
        partition_count: usize,
        moved_partitions: usize,
    ) -> Self {
        let total_servers = loads.len();
        let total_load: usize = loads.values().sum();
        let min_load = loads.values().copied().min().unwrap_or(0);
        let max_load = loads.values().copied().max().unwrap_or(0);
        let average_load = if total_servers == 0 {
            0.0
        } else {
            total_load as f64 / total_servers as f64
        };

        Self {
            ideal_load,
            average_load,
            min_load,
            max_load,
            total_servers,
            partition_count,
            unassigned_partitions: partition_count.saturating_sub(total_load),
            moved_partitions,
        }
    }

    pub fn moved_percentage(&self) -> f64 {
        if self.partition_count == 0 {
            return 0.0;
        }

        self.moved_partitions as f64 / self.partition_count as f64 * 100.0
    }
}
