//! Application layer services implementing business logic.
//!
//! Services compose a [`crate::domain::repositories::RecordStore`], an
//! [`crate::infrastructure::cache::AliasCache`] and the
//! [`updater::OptimisticUpdater`] into the operations the binaries call.
//!
//! # Available Services
//!
//! - [`services::redirect_service::RedirectService`] - Alias management and resolution
//! - [`services::visit_service::VisitService`] - Page view and unique visitor counting

pub mod services;
pub mod updater;
