//! Vital-sign relay: decodes GATT measurement notifications from BLE medical
//! devices into records, keeps per-service histories, and replicates them to
//! observers in the same room.

pub mod aggregator;
pub mod catalog;
pub mod decoder;
pub mod device;
pub mod error;
pub mod history;
pub mod ingest;
pub mod logging;
pub mod measurement;
pub mod relay;
pub mod session;
pub mod transport;
