//! Domain layer containing records and the store contract.
//!
//! - [`entities`] - Redirect and visitor records
//! - [`repositories`] - The [`repositories::RecordStore`] trait
//! - [`visit_event`] - Visit event model
//! - [`visit_worker`] - Background visit counting
//!
//! # Visit Flow
//!
//! 1. A resolve succeeds and the caller enqueues a [`visit_event::VisitEvent`]
//! 2. [`visit_worker::run_visit_worker`] picks it up with bounded concurrency
//! 3. [`crate::application::services::VisitService`] updates the visitor and alias records

pub mod entities;
pub mod repositories;
pub mod visit_event;
pub mod visit_worker;
