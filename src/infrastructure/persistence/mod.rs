//! Record store implementations.
//!
//! # Stores
//!
//! - [`RedisStore`] - Redis hashes with a revision field and Lua conditional writes
//! - [`InMemoryStore`] - Mutex-guarded map with identical revision semantics

pub mod memory_store;
pub mod redis_store;

pub use memory_store::InMemoryStore;
pub use redis_store::RedisStore;
