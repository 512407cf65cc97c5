//! Helpers shared by the services and the admin CLI.
//!
//! - [`alias`] - Alias generation and validation
//! - [`destination`] - Destination URL validation and canonicalization

pub mod alias;
pub mod destination;
