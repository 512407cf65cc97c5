//! # Redirector
//!
//! Low-latency alias resolution backed by Redis, with a process-local LRU in
//! front of the store and lock-free optimistic updates behind it.
//!
//! ## Architecture
//!
//! - **Domain Layer** ([`domain`]) - Redirect and visitor records, the store contract
//! - **Application Layer** ([`application`]) - Services and the optimistic updater
//! - **Infrastructure Layer** ([`infrastructure`]) - Recency cache and store implementations
//!
//! ## Features
//!
//! - Bounded LRU cache with targeted invalidation and periodic full flush
//! - Compare-and-retry updates that never lose a committed write
//! - Page view and unique visitor counting off the redirect path
//! - Operator CLI (`admin`) for alias management, import and export
//!
//! ## Quick Start
//!
//! ```bash
//! export REDIS_URL="redis://localhost:6379/0"
//!
//! cargo run --bin admin -- alias create --alias go --url https://go.dev/
//! cargo run --bin admin -- resolve go
//! ```
//!
//! ## Configuration
//!
//! Service configuration is loaded from environment variables via [`config::Config`].
//! See [`config`] module for available options.

pub mod application;
pub mod config;
pub mod domain;
pub mod error;
pub mod infrastructure;
pub mod state;
pub mod telemetry;
pub mod utils;

pub use error::AppError;
pub use state::AppState;

/// Commonly used types for external consumers.
///
/// Re-exports frequently used types to simplify imports for library users
/// and integration tests.
pub mod prelude {
    pub use crate::application::services::{RedirectService, VisitService};
    pub use crate::application::updater::{Deadline, OptimisticUpdater, RetryPolicy};
    pub use crate::domain::entities::{
        ClientTally, NewRedirect, Redirect, RedirectPatch, VisitorRecord,
    };
    pub use crate::domain::repositories::RecordStore;
    pub use crate::error::AppError;
    pub use crate::infrastructure::cache::{AliasCache, NullCache, RecencyCache, RedirectCache};
    pub use crate::infrastructure::persistence::{InMemoryStore, RedisStore};
    pub use crate::state::AppState;
}
