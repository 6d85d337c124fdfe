//! Adapters implementing the domain ports: in-memory stores, the sandbox
//! gateway, and (behind `storage-rocksdb`) persistent RocksDB stores.

pub mod in_memory;
#[cfg(feature = "storage-rocksdb")]
pub mod rocksdb;
pub mod sandbox;
