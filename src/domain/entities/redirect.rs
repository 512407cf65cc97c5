//! Redirect entity: an alias mapped to a destination URL.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Namespace prefix for alias records in the store.
pub const ALIAS_KEY_PREFIX: &str = "redir:alias:";

/// How an alias was chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AliasKind {
    /// Picked by the operator.
    Short,
    /// Generated by the service.
    Random,
}

/// An alias record with its destination and visit counters.
///
/// `pv` and `uv` only ever grow. Every mutation that goes through the optimistic
/// updater must carry both counters forward unchanged unless it is a visit count.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Redirect {
    pub alias: String,
    pub kind: AliasKind,
    pub url: String,
    #[serde(default)]
    pub private: bool,
    #[serde(default)]
    pub trust: bool,
    pub valid_from: DateTime<Utc>,
    #[serde(default)]
    pub pv: u64,
    #[serde(default)]
    pub uv: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Redirect {
    /// Builds a fresh record with zeroed counters.
    pub fn new(new_redirect: NewRedirect, alias: String, url: String, now: DateTime<Utc>) -> Self {
        Self {
            alias,
            kind: new_redirect.kind,
            url,
            private: new_redirect.private,
            trust: new_redirect.trust,
            valid_from: new_redirect.valid_from.unwrap_or(now),
            pv: 0,
            uv: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Store key for an alias.
    pub fn store_key(alias: &str) -> String {
        format!("{ALIAS_KEY_PREFIX}{alias}")
    }

    /// Returns true once `valid_from` has been reached.
    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.valid_from
    }

    pub fn is_active(&self) -> bool {
        self.is_active_at(Utc::now())
    }

    /// Applies a patch, keeping counters and creation time.
    pub fn apply(&mut self, patch: &RedirectPatch, now: DateTime<Utc>) {
        if let Some(url) = &patch.url {
            self.url = url.clone();
        }
        if let Some(private) = patch.private {
            self.private = private;
        }
        if let Some(trust) = patch.trust {
            self.trust = trust;
        }
        if let Some(valid_from) = patch.valid_from {
            self.valid_from = valid_from;
        }
        self.updated_at = now;
    }

    /// Adds visit counts.
    pub fn count_visit(&mut self, pv: u64, uv: u64, now: DateTime<Utc>) {
        self.pv = self.pv.saturating_add(pv);
        self.uv = self.uv.saturating_add(uv);
        self.updated_at = now;
    }
}

/// Input data for creating a redirect.
///
/// `alias` is required for [`AliasKind::Short`] and ignored for
/// [`AliasKind::Random`], which always receives a generated alias.
#[derive(Debug, Clone)]
pub struct NewRedirect {
    pub alias: Option<String>,
    pub kind: AliasKind,
    pub url: String,
    pub private: bool,
    pub trust: bool,
    pub valid_from: Option<DateTime<Utc>>,
}

impl NewRedirect {
    pub fn short(alias: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            alias: Some(alias.into()),
            kind: AliasKind::Short,
            url: url.into(),
            private: false,
            trust: false,
            valid_from: None,
        }
    }

    pub fn random(url: impl Into<String>) -> Self {
        Self {
            alias: None,
            kind: AliasKind::Random,
            url: url.into(),
            private: false,
            trust: false,
            valid_from: None,
        }
    }
}

/// Partial update for an existing redirect.
///
/// `None` fields are left unchanged.
#[derive(Debug, Clone, Default)]
pub struct RedirectPatch {
    pub url: Option<String>,
    pub private: Option<bool>,
    pub trust: Option<bool>,
    pub valid_from: Option<DateTime<Utc>>,
}

impl RedirectPatch {
    pub fn is_empty(&self) -> bool {
        self.url.is_none()
            && self.private.is_none()
            && self.trust.is_none()
            && self.valid_from.is_none()
    }
}
