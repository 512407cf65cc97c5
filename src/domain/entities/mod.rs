//! Core domain entities persisted in the record store.
//!
//! Entities are plain serde documents. The store sees them only as JSON payloads
//! addressed by a namespaced key (see [`Redirect::store_key`] and
//! [`VisitorRecord::store_key`]).
//!
//! # Entity Types
//!
//! - [`Redirect`] - An alias and its destination, with visit counters
//! - [`VisitorRecord`] - The set of aliases a single IP has visited
//! - [`ClientTally`] - Referer and user agent counts for one alias
//!
//! Creation and partial updates use separate input types: [`NewRedirect`] and
//! [`RedirectPatch`].

pub mod client_tally;
pub mod redirect;
pub mod visitor;

pub use client_tally::{CLIENTS_KEY_PREFIX, ClientCount, ClientTally, UNKNOWN_CLIENT};
pub use redirect::{ALIAS_KEY_PREFIX, AliasKind, NewRedirect, Redirect, RedirectPatch};
pub use visitor::{IP_KEY_PREFIX, VisitorRecord};
