//! Adapters for the domain ports: in-memory and RocksDB persistence, and the
//! session-token identity provider.

pub mod identity;
pub mod in_memory;
#[cfg(feature = "storage-rocksdb")]
pub mod rocksdb;
