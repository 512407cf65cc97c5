//! Store trait definitions for the domain layer.
//!
//! The authoritative copy of every record lives behind [`RecordStore`]. The trait
//! is deliberately payload-agnostic: records travel as JSON strings addressed by a
//! namespaced key, and typed access is layered on top by the application services.
//!
//! # Implementations
//!
//! - [`crate::infrastructure::persistence::RedisStore`] - Redis-backed store
//! - [`crate::infrastructure::persistence::InMemoryStore`] - Process-local store
//! - Mock implementations are auto-generated via `mockall` for testing

pub mod record_store;

pub use record_store::{RecordStore, VersionToken, Versioned};

#[cfg(test)]
pub use record_store::MockRecordStore;
