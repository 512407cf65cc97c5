//! Infrastructure layer for external integrations.
//!
//! This layer implements interfaces defined by the domain layer, providing
//! concrete implementations for record storage and caching.
//!
//! # Modules
//!
//! - [`cache`] - Process-local recency cache and the no-op cache
//! - [`persistence`] - Redis and in-memory record stores

pub mod cache;
pub mod persistence;
