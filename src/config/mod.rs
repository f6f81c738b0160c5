//! Ring configuration.
//!
//! Configs are plain serde structs, usually loaded from a JSON file (see `conf/`).
//! Any numeric field that is missing or set to zero falls back to its default.
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{event, Level};

use crate::{
    error::{Error, Result},
    hashing::HashFunction,
};

pub const DEFAULT_PARTITION_COUNT: usize = 271;
pub const DEFAULT_VIRTUAL_NODE_COUNT: usize = 20;
/// With 100 partitions and 10 servers each server ideally owns 10 partitions.
/// A load factor of 1.25 lets a server hold up to 25% more than that.
pub const DEFAULT_LOAD_FACTOR: f64 = 1.25;

/// How a partition id is turned into the bytes that get hashed onto the ring
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PartitionKey {
    /// 8-byte little-endian representation of the id
    #[default]
    FullWidth,
    /// Only the lowest byte of the id. Ids that are equal modulo 256 collapse onto the
    /// same ring position. Kept for compatibility with rings built that way.
    SingleByte,
}

impl PartitionKey {
    pub fn encode(&self, partition_id: usize) -> Vec<u8> {
        match self {
            PartitionKey::FullWidth => (partition_id as u64).to_le_bytes().to_vec(),
            PartitionKey::SingleByte => vec![partition_id as u8],
        }
    }
}

/// How a (server, replica index) pair is turned into the bytes that get hashed onto the ring
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VirtualNodeKey {
    /// `"{name}:{index}"`
    #[default]
    Separated,
    /// `"{name}{index}"`. Ambiguous: `node1` replica 10 and `node11` replica 0 both
    /// produce `node110`, which is reported as a hash collision when both join.
    Concatenated,
}

impl VirtualNodeKey {
    pub fn encode(&self, server_name: &str, replica_index: usize) -> String {
        match self {
            VirtualNodeKey::Separated => format!("{}:{}", server_name, replica_index),
            VirtualNodeKey::Concatenated => format!("{}{}", server_name, replica_index),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Config {
    /// Keys are distributed among partitions. A prime count spreads keys more uniformly.
    #[serde(default)]
    pub partition_count: usize,
    /// How many times each server is represented on the ring
    #[serde(default)]
    pub virtual_node_count: usize,
    /// Multiplier applied to the ideal per-server load to get the capacity bound
    #[serde(default)]
    pub load_factor: f64,
    #[serde(default)]
    pub hash_function: HashFunction,
    #[serde(default)]
    pub partition_key: PartitionKey,
    #[serde(default)]
    pub virtual_node_key: VirtualNodeKey,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            partition_count: DEFAULT_PARTITION_COUNT,
            virtual_node_count: DEFAULT_VIRTUAL_NODE_COUNT,
            load_factor: DEFAULT_LOAD_FACTOR,
            hash_function: HashFunction::default(),
            partition_key: PartitionKey::default(),
            virtual_node_key: VirtualNodeKey::default(),
        }
    }
}

impl Config {
    pub fn new(partition_count: usize, virtual_node_count: usize, load_factor: f64) -> Self {
        Self {
            partition_count,
            virtual_node_count,
            load_factor,
            ..Default::default()
        }
    }

    /// Replaces zero-valued fields with their defaults and validates the load factor.
    ///
    /// A load factor below 1.0 is accepted but means the capacity bound can be smaller
    /// than the ideal load, in which case distribution passes may halt early.
    pub fn with_defaults(mut self) -> Result<Self> {
        if self.partition_count == 0 {
            self.partition_count = DEFAULT_PARTITION_COUNT;
        }
        if self.virtual_node_count == 0 {
            self.virtual_node_count = DEFAULT_VIRTUAL_NODE_COUNT;
        }
        if self.load_factor == 0.0 {
            self.load_factor = DEFAULT_LOAD_FACTOR;
        }

        if !self.load_factor.is_finite() || self.load_factor < 0.0 {
            return Err(Error::InvalidConfig {
                reason: format!(
                    "load_factor must be a positive number, got {}",
                    self.load_factor
                ),
            });
        }

        if self.load_factor < 1.0 {
            event!(
                Level::WARN,
                "load_factor {} is below 1.0, some partitions may not be placed",
                self.load_factor
            );
        }

        Ok(self)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let stringified_json = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&stringified_json)?;
        config.with_defaults()
    }
}
