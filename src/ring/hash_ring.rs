//! The [`HashRing`] owns virtual-node placement.
//!
//! Each server is represented by `virtual_node_count` points on a circular 64-bit hash
//! space. A point is the hash of a key derived from the server name and a replica index
//! (see [`VirtualNodeKey`]). Looking up a hash means finding the first virtual node whose
//! position is greater than or equal to it, wrapping around to the first position when
//! the hash is bigger than every point on the ring.
//!
//! Example with a hash space that goes from 0 to 100 and 2 virtual nodes per server:
//! Virtual nodes: [A:0, B:0, A:1, B:1]
//! Positions:     [ 10,  30,  60,  80]
//!
//! hash 25 -> index 1 (B:0)
//! hash 60 -> index 2 (A:1)
//! hash 95 -> index 0 (A:0), wrapped around
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::{event, Level};

use crate::{
    config::VirtualNodeKey,
    error::{Error, Result},
    hashing::HashFn,
};

/// A member of the ring. Identified by its name.
#[derive(Debug, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize)]
pub struct Server {
    name: String,
}

impl Server {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl std::fmt::Display for Server {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name)
    }
}

#[derive(Clone, Debug)]
pub struct HashRing {
    virtual_node_count: usize,
    virtual_node_key: VirtualNodeKey,
    hash_fn: HashFn,
    // strictly ascending
    sorted_ring: Vec<u64>,
    virtual_node_map: HashMap<u64, Server>,
    servers: BTreeMap<String, Server>,
}

impl HashRing {
    pub fn new(
        virtual_node_count: usize,
        virtual_node_key: VirtualNodeKey,
        hash_fn: HashFn,
    ) -> Self {
        Self {
            virtual_node_count,
            virtual_node_key,
            hash_fn,
            sorted_ring: Vec::new(),
            virtual_node_map: HashMap::new(),
            servers: BTreeMap::new(),
        }
    }

    /// Adds a single server, inserting each of its virtual nodes at its sorted position.
    pub fn add_server(&mut self, server: Server) -> Result<()> {
        let mut placements = self.plan_insertions(std::slice::from_ref(&server))?;
        let (server, hashes) = placements.remove(0);
        for hash in hashes {
            // plan_insertions guarantees the hash is not present yet
            let index = self.sorted_ring.partition_point(|elem| *elem < hash);
            self.sorted_ring.insert(index, hash);
            self.virtual_node_map.insert(hash, server.clone());
        }

        event!(Level::DEBUG, "Server {} joined the ring", server);
        self.servers.insert(server.name.clone(), server);
        Ok(())
    }

    /// Adds a batch of servers and sorts the ring once at the end.
    ///
    /// Either every server is added or, if any of them is a duplicate or collides with an
    /// existing virtual node, none is.
    pub fn add_servers(&mut self, servers: Vec<Server>) -> Result<()> {
        let placements = self.plan_insertions(&servers)?;
        for (server, hashes) in placements {
            for hash in hashes {
                self.sorted_ring.push(hash);
                self.virtual_node_map.insert(hash, server.clone());
            }
            event!(Level::DEBUG, "Server {} joined the ring", server);
            self.servers.insert(server.name.clone(), server);
        }
        self.sorted_ring.sort_unstable();

        Ok(())
    }

    /// Removes a server and all of its virtual nodes.
    /// Returns `None` (and does nothing) if no server with this name is a member.
    pub fn remove_server(&mut self, name: &str) -> Option<Server> {
        let server = self.servers.remove(name)?;
        for hash in self.virtual_node_hashes(name) {
            if let Ok(index) = self.sorted_ring.binary_search(&hash) {
                self.sorted_ring.remove(index);
            }
            self.virtual_node_map.remove(&hash);
        }

        event!(Level::DEBUG, "Server {} left the ring", server);
        Some(server)
    }

    /// Index of the first virtual node at or after `hash`, going clockwise.
    /// Returns `None` if the ring is empty.
    pub fn locate_clockwise(&self, hash: u64) -> Option<usize> {
        if self.sorted_ring.is_empty() {
            return None;
        }

        Some(self.sorted_ring.partition_point(|elem| *elem < hash) % self.sorted_ring.len())
    }

    /// The server owning the virtual node at `index` of the sorted ring
    pub fn owner_at(&self, index: usize) -> Option<&Server> {
        self.sorted_ring
            .get(index)
            .and_then(|hash| self.virtual_node_map.get(hash))
    }

    pub fn hash(&self, key: &[u8]) -> u64 {
        (self.hash_fn)(key)
    }

    /// Number of virtual nodes on the ring
    pub fn len(&self) -> usize {
        self.sorted_ring.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sorted_ring.is_empty()
    }

    pub fn server_count(&self) -> usize {
        self.servers.len()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.servers.contains_key(name)
    }

    /// Members ordered by name
    pub fn servers(&self) -> impl Iterator<Item = &Server> {
        self.servers.values()
    }

    pub fn positions(&self) -> &[u64] {
        &self.sorted_ring
    }

    fn virtual_node_hashes(&self, name: &str) -> Vec<u64> {
        (0..self.virtual_node_count)
            .map(|i| (self.hash_fn)(self.virtual_node_key.encode(name, i).as_bytes()))
            .collect()
    }

    /// Computes the virtual-node hashes of every incoming server and rejects duplicates
    /// and collisions before anything is mutated.
    fn plan_insertions(&self, servers: &[Server]) -> Result<Vec<(Server, Vec<u64>)>> {
        let mut incoming_names = HashSet::new();
        let mut incoming_hashes: HashMap<u64, &str> = HashMap::new();
        let mut placements = Vec::with_capacity(servers.len());

        for server in servers {
            if self.servers.contains_key(&server.name) || !incoming_names.insert(&server.name) {
                return Err(Error::DuplicateServer {
                    name: server.name.clone(),
                });
            }

            let hashes = self.virtual_node_hashes(&server.name);
            for hash in hashes.iter() {
                let existing = self
                    .virtual_node_map
                    .get(hash)
                    .map(|s| s.name.as_str())
                    .or_else(|| incoming_hashes.get(hash).copied());
                if let Some(existing) = existing {
                    return Err(Error::HashCollision {
                        hash: *hash,
                        existing: existing.to_string(),
                        incoming: server.name.clone(),
                    });
                }
                incoming_hashes.insert(*hash, &server.name);
            }

            placements.push((server.clone(), hashes));
        }

        Ok(placements)
    }
}
