//! Shopkeep Infrastructure - Adapters and implementations
//!
//! This crate provides concrete implementations of the ports
//! defined in the application layer.

pub mod adapters;
pub mod config;
pub mod persistence;
pub mod serialization;

pub use adapters::{LoggingSessionListener, ReqwestTransport, SystemClock};
pub use config::{SettingsError, SettingsLoader};
pub use persistence::{FileStorage, MemoryStorage};
pub use serialization::{SerializationError, from_json_bytes, to_json_stable, to_json_stable_bytes};
