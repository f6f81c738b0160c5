//! The [`Ring`] ties the [`HashRing`] and the [`PartitionDistributor`] together.
//!
//! Every membership change updates the virtual nodes on the hash ring and then
//! synchronously recomputes the whole partition assignment. The caller gets back a
//! [`RebalanceReport`] describing how many partitions moved and how the load looks now.
//!
//! The ring is a single-writer structure: mutations take `&mut self` and queries take
//! `&self`. Hosts that need to share it between threads have to put it behind a lock.
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{event, instrument, Level};

use crate::{config::Config, error::Result, hashing::HashFn};

pub mod distributor;
pub mod hash_ring;
pub mod metrics;

pub use distributor::{Distribution, PartitionDistributor, PartitionId};
pub use hash_ring::{HashRing, Server};
pub use metrics::LoadMetrics;

/// Outcome of a membership change
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RebalanceReport {
    pub moved_partitions: usize,
    /// Set when the distribution pass could not place this partition and stopped
    pub halted_at: Option<PartitionId>,
    pub metrics: LoadMetrics,
    /// Partitions per server, ordered by server name
    pub loads: BTreeMap<String, usize>,
}

impl std::fmt::Display for RebalanceReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let metrics = &self.metrics;
        writeln!(f, "====RESULTS=====")?;
        writeln!(f, "Ideal Average Load: {:.2}", metrics.ideal_load as f64)?;
        writeln!(f, "Actual Average Load: {:.2}", metrics.average_load)?;
        writeln!(
            f,
            "Min Load: {:.2}, Max Load: {:.2}",
            metrics.min_load as f64, metrics.max_load as f64
        )?;
        writeln!(f, "--------------")?;
        writeln!(f, "Total Number of Servers: {}", metrics.total_servers)?;
        writeln!(
            f,
            "Partitions Redistributed: {}/{} ({:.2}%)",
            self.moved_partitions,
            metrics.partition_count,
            metrics.moved_percentage()
        )?;
        if let Some(partition_id) = self.halted_at {
            writeln!(
                f,
                "Failed to place partition {}, {} partitions unassigned. Consider increasing the load factor or adding servers",
                partition_id, metrics.unassigned_partitions
            )?;
        }
        writeln!(f, "--------------")?;
        for (name, load) in self.loads.iter() {
            writeln!(
                f,
                "Server: {}, Load (No. Partitions): {:.2}/{:.2}",
                name, *load as f64, metrics.ideal_load as f64
            )?;
        }

        Ok(())
    }
}

#[derive(Clone, Debug)]
pub struct Ring {
    config: Config,
    hash_ring: HashRing,
    distributor: PartitionDistributor,
    last_distribution: Distribution,
}

impl Ring {
    /// Builds a ring with the hash primitive selected in the config and distributes
    /// the partitions over the initial servers.
    pub fn new(servers: Vec<Server>, config: Config) -> Result<Self> {
        let hash_fn = config.hash_function.hash_fn();
        Self::new_with_hash_fn(servers, config, hash_fn)
    }

    /// Same as [`Ring::new`] but with an injected hash primitive. `hash_fn` must be
    /// deterministic across runs for placements to be reproducible.
    pub fn new_with_hash_fn(
        servers: Vec<Server>,
        config: Config,
        hash_fn: HashFn,
    ) -> Result<Self> {
        let config = config.with_defaults()?;
        let mut hash_ring =
            HashRing::new(config.virtual_node_count, config.virtual_node_key, hash_fn);
        hash_ring.add_servers(servers)?;

        let mut distributor = PartitionDistributor::new(
            config.partition_count,
            config.load_factor,
            config.partition_key,
        );
        let last_distribution = distributor.distribute(&hash_ring);

        let ring = Self {
            config,
            hash_ring,
            distributor,
            last_distribution,
        };
        ring.log_distribution(&last_distribution);

        Ok(ring)
    }

    #[instrument(level = "info", skip(self, server), fields(server = server.name()))]
    pub fn add_server(&mut self, server: Server) -> Result<RebalanceReport> {
        self.hash_ring.add_server(server)?;
        Ok(self.rebalance())
    }

    /// Adds every server and runs a single distribution pass.
    /// If any server is rejected none of them is added.
    #[instrument(level = "info", skip(self, servers), fields(servers = servers.len()))]
    pub fn add_servers(&mut self, servers: Vec<Server>) -> Result<RebalanceReport> {
        if servers.is_empty() {
            return Ok(self.report(0, self.last_distribution.halted_at));
        }

        self.hash_ring.add_servers(servers)?;
        Ok(self.rebalance())
    }

    /// Removing a server that is not a member changes nothing and doesn't trigger a
    /// distribution pass. The returned report then has no moved partitions.
    #[instrument(level = "info", skip(self))]
    pub fn remove_server(&mut self, name: &str) -> RebalanceReport {
        if self.hash_ring.remove_server(name).is_none() {
            event!(Level::DEBUG, "Server {} is not a member, nothing to do", name);
            return self.report(0, self.last_distribution.halted_at);
        }

        self.rebalance()
    }

    /// Report for the latest distribution pass
    pub fn last_report(&self) -> RebalanceReport {
        self.report(
            self.last_distribution.moved_partitions,
            self.last_distribution.halted_at,
        )
    }

    pub fn partition_owner(&self, partition_id: PartitionId) -> Option<&Server> {
        self.distributor.owner(partition_id)
    }

    pub fn server_load(&self, name: &str) -> Option<usize> {
        self.distributor.load(name)
    }

    /// Members ordered by name
    pub fn servers(&self) -> impl Iterator<Item = &Server> {
        self.hash_ring.servers()
    }

    pub fn contains_server(&self, name: &str) -> bool {
        self.hash_ring.contains(name)
    }

    pub fn ideal_load(&self) -> usize {
        self.distributor.ideal_load(self.hash_ring.server_count())
    }

    pub fn metrics(&self, moved_partitions: usize) -> LoadMetrics {
        LoadMetrics::compute(
            self.distributor.loads(),
            self.ideal_load(),
            self.config.partition_count,
            moved_partitions,
        )
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn hash_ring(&self) -> &HashRing {
        &self.hash_ring
    }

    pub fn distributor(&self) -> &PartitionDistributor {
        &self.distributor
    }

    fn rebalance(&mut self) -> RebalanceReport {
        let distribution = self.distributor.distribute(&self.hash_ring);
        self.last_distribution = distribution;
        self.log_distribution(&distribution);

        self.report(distribution.moved_partitions, distribution.halted_at)
    }

    fn report(&self, moved_partitions: usize, halted_at: Option<PartitionId>) -> RebalanceReport {
        RebalanceReport {
            moved_partitions,
            halted_at,
            metrics: self.metrics(moved_partitions),
            loads: self.distributor.loads().clone(),
        }
    }

    fn log_distribution(&self, distribution: &Distribution) {
        let metrics = self.metrics(distribution.moved_partitions);
        match distribution.halted_at {
            None => event!(
                Level::INFO,
                servers = metrics.total_servers,
                ideal_load = metrics.ideal_load,
                min_load = metrics.min_load,
                max_load = metrics.max_load,
                moved = distribution.moved_partitions,
                "Partitions distributed"
            ),
            Some(partition_id) => event!(
                Level::WARN,
                servers = metrics.total_servers,
                ideal_load = metrics.ideal_load,
                halted_at = partition_id,
                unassigned = metrics.unassigned_partitions,
                moved = distribution.moved_partitions,
                "Distribution halted early"
            ),
        }
    }
}
