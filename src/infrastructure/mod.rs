//! Adapters for the domain ports.
//!
//! `in_memory` backs every port and is the default. `rocksdb` persists
//! tickets, the wallet ledger and both work queues when the
//! `storage-rocksdb` feature is enabled.

pub mod fare_table;
pub mod gateway;
pub mod in_memory;
#[cfg(feature = "storage-rocksdb")]
pub mod rocksdb;
