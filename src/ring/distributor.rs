//! Consistent hashing with bounded loads.
//!
//! Based on [Consistent Hashing with Bounded Loads](https://arxiv.org/abs/1608.01350).
//!
//! Every partition is hashed onto the ring and offered to the server owning the closest
//! virtual node going clockwise. A server only accepts it if doing so keeps its load at or
//! below `ceil((partition_count / server_count) * load_factor)`. Otherwise the partition
//! is offered to the owner of the next virtual node, and so on, for at most one full
//! traversal of the ring.
//!
//! Loads are recomputed from scratch on every pass, so the assignment only depends on the
//! current ring and not on the order in which servers joined or left.
use std::collections::BTreeMap;
use tracing::{event, instrument, Level};

use crate::config::PartitionKey;

use super::hash_ring::{HashRing, Server};

pub type PartitionId = usize;

/// Result of a single distribution pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Distribution {
    /// Partitions that ended up on a different server than before the pass
    pub moved_partitions: usize,
    /// The partition that could not be placed, if the pass halted early.
    /// It and every partition after it are left unassigned.
    pub halted_at: Option<PartitionId>,
}

/// Capacity bound for a single server. Zero if there are no servers.
pub fn ideal_load(partition_count: usize, server_count: usize, load_factor: f64) -> usize {
    if server_count == 0 {
        return 0;
    }

    ((partition_count as f64 / server_count as f64) * load_factor).ceil() as usize
}

#[derive(Clone, Debug)]
pub struct PartitionDistributor {
    partition_count: usize,
    load_factor: f64,
    partition_key: PartitionKey,
    partitions: Vec<Option<Server>>,
    server_loads: BTreeMap<String, usize>,
}

impl PartitionDistributor {
    pub fn new(partition_count: usize, load_factor: f64, partition_key: PartitionKey) -> Self {
        Self {
            partition_count,
            load_factor,
            partition_key,
            partitions: vec![None; partition_count],
            server_loads: BTreeMap::new(),
        }
    }

    pub fn ideal_load(&self, server_count: usize) -> usize {
        ideal_load(self.partition_count, server_count, self.load_factor)
    }

    /// Recomputes the whole partition assignment for the given ring.
    ///
    /// Partitions are processed in ascending id order and the first server found with
    /// spare capacity wins. If a partition can't be placed after visiting every virtual
    /// node the pass stops there; the remaining partitions stay unassigned until the
    /// next pass.
    #[instrument(level = "debug", skip(self, ring), fields(servers = ring.server_count()))]
    pub fn distribute(&mut self, ring: &HashRing) -> Distribution {
        let ideal_load = self.ideal_load(ring.server_count());
        let previous_partitions = std::mem::take(&mut self.partitions);

        let mut partitions: Vec<Option<Server>> = vec![None; self.partition_count];
        let mut server_loads: BTreeMap<String, usize> = ring
            .servers()
            .map(|server| (server.name().to_string(), 0))
            .collect();
        let mut moved_partitions = 0;
        let mut halted_at = None;

        if ring.is_empty() {
            event!(
                Level::WARN,
                "No servers on the ring, {} partitions left unassigned",
                self.partition_count
            );
        }

        for partition_id in 0..self.partition_count {
            let partition_hash = ring.hash(&self.partition_key.encode(partition_id));
            let Some(start) = ring.locate_clockwise(partition_hash) else {
                halted_at = Some(partition_id);
                break;
            };

            let mut owner = None;
            for attempt in 0..ring.len() {
                let Some(candidate) = ring.owner_at((start + attempt) % ring.len()) else {
                    continue;
                };
                let Some(load) = server_loads.get_mut(candidate.name()) else {
                    continue;
                };
                if *load < ideal_load {
                    *load += 1;
                    owner = Some(candidate.clone());
                    break;
                }
            }

            let Some(owner) = owner else {
                event!(
                    Level::ERROR,
                    "Failed to place partition {}, all servers are at capacity ({}). Consider increasing the load factor or adding servers",
                    partition_id,
                    ideal_load
                );
                halted_at = Some(partition_id);
                break;
            };

            if let Some(Some(previous_owner)) = previous_partitions.get(partition_id) {
                if *previous_owner != owner {
                    moved_partitions += 1;
                }
            }
            partitions[partition_id] = Some(owner);
        }

        self.partitions = partitions;
        self.server_loads = server_loads;

        event!(
            Level::DEBUG,
            "Distribution pass done: ideal_load={} moved={} halted_at={:?}",
            ideal_load,
            moved_partitions,
            halted_at
        );

        Distribution {
            moved_partitions,
            halted_at,
        }
    }

    /// Current owner of a partition. `None` if the id is out of range or unassigned.
    pub fn owner(&self, partition_id: PartitionId) -> Option<&Server> {
        self.partitions.get(partition_id).and_then(|s| s.as_ref())
    }

    /// Number of partitions currently held by a server. `None` for unknown servers.
    pub fn load(&self, name: &str) -> Option<usize> {
        self.server_loads.get(name).copied()
    }

    /// Loads of every member, ordered by server name
    pub fn loads(&self) -> &BTreeMap<String, usize> {
        &self.server_loads
    }

    pub fn partitions(&self) -> &[Option<Server>] {
        &self.partitions
    }

    pub fn assigned_count(&self) -> usize {
        self.partitions.iter().filter(|p| p.is_some()).count()
    }

    pub fn partition_count(&self) -> usize {
        self.partition_count
    }

    pub fn load_factor(&self) -> f64 {
        self.load_factor
    }
}

#[cfg(test)]
mod tests {
    use super::{ideal_load, PartitionDistributor};
    use crate::{
        config::{PartitionKey, VirtualNodeKey},
        hashing::{murmur3_hash, xxh64_hash},
        ring::hash_ring::{HashRing, Server},
    };
    use quickcheck::Arbitrary;
    use quickcheck_macros::quickcheck;
    use rand::Rng;
    use std::collections::HashMap;

    #[test]
    fn test_ideal_load() {
        assert_eq!(ideal_load(271, 8, 1.2), 41);
        assert_eq!(ideal_load(271, 10, 1.2), 33);
        assert_eq!(ideal_load(100, 10, 1.0), 10);
        assert_eq!(ideal_load(100, 10, 1.25), 13);
        assert_eq!(ideal_load(271, 0, 1.25), 0);
    }

    // Virtual nodes land on the positions listed in the table.
    // Partition keys (8 bytes, little endian) hash to the partition id itself.
    fn test_hash_fn(key: &[u8]) -> u64 {
        if let Ok(bytes) = <[u8; 8]>::try_from(key) {
            return u64::from_le_bytes(bytes);
        }

        let table: HashMap<&[u8], u64> = vec![
            (&b"A:0"[..], 2u64),
            (&b"B:0"[..], 5u64),
            (&b"C:0"[..], 8u64),
        ]
        .into_iter()
        .collect();

        table[key]
    }

    fn test_ring(names: &[&str]) -> HashRing {
        let mut ring = HashRing::new(1, VirtualNodeKey::Separated, test_hash_fn);
        ring.add_servers(names.iter().map(|name| Server::new(*name)).collect())
            .unwrap();
        ring
    }

    fn owners(distributor: &PartitionDistributor) -> Vec<Option<&str>> {
        distributor
            .partitions()
            .iter()
            .map(|p| p.as_ref().map(|s| s.name()))
            .collect()
    }

    #[test]
    fn test_distribute_without_pressure() {
        // 9 partitions, 3 servers, capacity 3 each: every partition goes to its natural owner
        let ring = test_ring(&["A", "B", "C"]);
        let mut distributor = PartitionDistributor::new(9, 1.0, PartitionKey::FullWidth);
        let distribution = distributor.distribute(&ring);

        assert_eq!(distribution.moved_partitions, 0);
        assert_eq!(distribution.halted_at, None);
        // hash 0..=2 -> A, 3..=5 -> B, 6..=8 -> C
        assert_eq!(
            owners(&distributor),
            vec![
                Some("A"),
                Some("A"),
                Some("A"),
                Some("B"),
                Some("B"),
                Some("B"),
                Some("C"),
                Some("C"),
                Some("C"),
            ]
        );
        assert_eq!(distributor.load("A"), Some(3));
        assert_eq!(distributor.load("B"), Some(3));
        assert_eq!(distributor.load("C"), Some(3));
    }

    #[test]
    fn test_full_server_spills_clockwise() {
        // 12 partitions, capacity 4. Natural owners: 0..=2 A, 3..=5 B, 6..=8 C, 9..=11 wrap to A.
        // A fills up with 0,1,2,9; 10 spills over to B and 11 all the way to C.
        let ring = test_ring(&["A", "B", "C"]);
        let mut distributor = PartitionDistributor::new(12, 1.0, PartitionKey::FullWidth);
        let distribution = distributor.distribute(&ring);

        assert_eq!(distribution.halted_at, None);
        let owners = owners(&distributor);
        assert_eq!(owners[9], Some("A"));
        assert_eq!(owners[10], Some("B"));
        assert_eq!(owners[11], Some("C"));
        assert_eq!(distributor.load("A"), Some(4));
        assert_eq!(distributor.load("B"), Some(4));
        assert_eq!(distributor.load("C"), Some(4));
    }

    #[test]
    fn test_halts_when_capacity_is_exhausted() {
        // capacity ceil(9 / 3 * 0.5) = 2, so only 6 partitions fit
        let ring = test_ring(&["A", "B", "C"]);
        let mut distributor = PartitionDistributor::new(9, 0.5, PartitionKey::FullWidth);
        let distribution = distributor.distribute(&ring);

        // 0,1 -> A; 2 spills to B; 3 -> B; 4,5 spill to C; 6 -> nobody
        assert_eq!(distribution.halted_at, Some(6));
        assert_eq!(
            owners(&distributor),
            vec![
                Some("A"),
                Some("A"),
                Some("B"),
                Some("B"),
                Some("C"),
                Some("C"),
                None,
                None,
                None,
            ]
        );
        assert_eq!(distributor.assigned_count(), 6);
    }

    #[test]
    fn test_moved_partitions_after_removal() {
        let mut ring = test_ring(&["A", "B", "C"]);
        let mut distributor = PartitionDistributor::new(9, 1.0, PartitionKey::FullWidth);
        distributor.distribute(&ring);

        ring.remove_server("B");
        let distribution = distributor.distribute(&ring);

        // capacity is now ceil(9 / 2) = 5. B's partitions 3,4,5 move clockwise to C,
        // which then fills up with 3,4,5,6,7 and pushes 8 around to A.
        assert_eq!(distribution.halted_at, None);
        assert_eq!(
            owners(&distributor),
            vec![
                Some("A"),
                Some("A"),
                Some("A"),
                Some("C"),
                Some("C"),
                Some("C"),
                Some("C"),
                Some("C"),
                Some("A"),
            ]
        );
        assert_eq!(distribution.moved_partitions, 4);
        assert_eq!(distributor.load("B"), None);
    }

    #[test]
    fn test_empty_ring_halts_at_first_partition() {
        let ring = test_ring(&[]);
        let mut distributor = PartitionDistributor::new(9, 1.25, PartitionKey::FullWidth);
        let distribution = distributor.distribute(&ring);

        assert_eq!(distribution.halted_at, Some(0));
        assert_eq!(distribution.moved_partitions, 0);
        assert_eq!(distributor.assigned_count(), 0);
        assert!(distributor.loads().is_empty());
    }

    #[test]
    fn test_single_byte_keys_repeat_every_256_partitions() {
        let mut ring = HashRing::new(40, VirtualNodeKey::Separated, xxh64_hash);
        ring.add_servers((0..4).map(|i| Server::new(format!("node{}", i))).collect())
            .unwrap();

        for partition_id in [0usize, 1, 10, 255] {
            assert_eq!(
                ring.hash(&PartitionKey::SingleByte.encode(partition_id)),
                ring.hash(&PartitionKey::SingleByte.encode(partition_id + 256))
            );
            assert_ne!(
                ring.hash(&PartitionKey::FullWidth.encode(partition_id)),
                ring.hash(&PartitionKey::FullWidth.encode(partition_id + 256))
            );
        }
    }

    #[derive(Debug, Clone)]
    struct DistributeTestInput {
        n_servers: usize,
        virtual_node_count: usize,
        partition_count: usize,
        load_factor: f64,
    }

    impl Arbitrary for DistributeTestInput {
        fn arbitrary(_: &mut quickcheck::Gen) -> Self {
            let mut rng = rand::thread_rng();
            Self {
                n_servers: rng.gen_range(1..20),
                virtual_node_count: rng.gen_range(1..50),
                partition_count: rng.gen_range(1..600),
                load_factor: rng.gen_range(1.0..2.0),
            }
        }
    }

    /// With a load factor >= 1.0 the total capacity is always enough, so every pass
    /// must complete, cover every partition and respect the bound.
    #[quickcheck]
    fn test_distribute_randomized(test_input: DistributeTestInput) {
        let mut ring = HashRing::new(
            test_input.virtual_node_count,
            VirtualNodeKey::Separated,
            murmur3_hash,
        );
        ring.add_servers(
            (0..test_input.n_servers)
                .map(|i| Server::new(format!("server-{}", i)))
                .collect(),
        )
        .unwrap();

        let mut distributor = PartitionDistributor::new(
            test_input.partition_count,
            test_input.load_factor,
            PartitionKey::FullWidth,
        );
        let distribution = distributor.distribute(&ring);
        let ideal_load = distributor.ideal_load(test_input.n_servers);

        assert_eq!(distribution.halted_at, None);
        assert_eq!(distribution.moved_partitions, 0);
        assert_eq!(distributor.assigned_count(), test_input.partition_count);
        assert!(distributor.loads().values().all(|load| *load <= ideal_load));
        assert_eq!(
            distributor.loads().values().sum::<usize>(),
            test_input.partition_count
        );
        for owner in distributor.partitions().iter().flatten() {
            assert!(ring.contains(owner.name()));
        }

        // same ring, same answer
        let again = distributor.clone().distribute(&ring);
        assert_eq!(again.moved_partitions, 0);
    }
}
