//! Consistent hashing with bounded loads.
//!
//! A fixed number of partitions is spread over a changing set of servers using a hash
//! ring with virtual nodes. No server ever holds more than
//! `ceil((partitions / servers) * load_factor)` partitions, and membership changes move
//! as few partitions as possible. See [`ring::Ring`] for the entry point.
pub mod config;
pub mod error;
pub mod hashing;
pub mod ring;
pub mod scenario;
pub mod telemetry;
