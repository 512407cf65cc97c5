//! Per-IP visit history used for unique visitor counting.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Namespace prefix for visitor records in the store.
pub const IP_KEY_PREFIX: &str = "redir:ip:";

/// Aliases an IP has visited, with the time of the first visit to each.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisitorRecord {
    pub ip: String,
    #[serde(default)]
    pub aliases: BTreeMap<String, DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl VisitorRecord {
    /// A visitor seen for the first time on `alias`.
    pub fn first_visit(ip: impl Into<String>, alias: impl Into<String>, now: DateTime<Utc>) -> Self {
        let mut aliases = BTreeMap::new();
        aliases.insert(alias.into(), now);
        Self {
            ip: ip.into(),
            aliases,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn store_key(ip: &str) -> String {
        format!("{IP_KEY_PREFIX}{ip}")
    }

    pub fn has_visited(&self, alias: &str) -> bool {
        self.aliases.contains_key(alias)
    }

    /// Records a visit. Returns true when this is the first visit to `alias`.
    pub fn visit(&mut self, alias: &str, now: DateTime<Utc>) -> bool {
        if self.has_visited(alias) {
            return false;
        }
        self.aliases.insert(alias.to_string(), now);
        self.updated_at = now;
        true
    }
}
