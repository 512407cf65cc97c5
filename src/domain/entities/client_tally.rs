//! Per-alias referer and user agent counts.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Namespace prefix for client tallies in the store.
pub const CLIENTS_KEY_PREFIX: &str = "redir:clients:";

/// Bucket for visits that sent no referer or user agent.
pub const UNKNOWN_CLIENT: &str = "unknown";

/// How often each referer and user agent visited an alias.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientTally {
    pub alias: String,
    #[serde(default)]
    pub referers: BTreeMap<String, u64>,
    #[serde(default)]
    pub user_agents: BTreeMap<String, u64>,
    pub updated_at: DateTime<Utc>,
}

/// One row of a tally, as reported to callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClientCount {
    pub name: String,
    pub count: u64,
}

impl ClientTally {
    pub fn empty(alias: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            alias: alias.into(),
            referers: BTreeMap::new(),
            user_agents: BTreeMap::new(),
            updated_at: now,
        }
    }

    pub fn store_key(alias: &str) -> String {
        format!("{CLIENTS_KEY_PREFIX}{alias}")
    }

    /// Counts one visit. Missing or blank values go to [`UNKNOWN_CLIENT`].
    pub fn record(&mut self, user_agent: Option<&str>, referer: Option<&str>, now: DateTime<Utc>) {
        bump(&mut self.user_agents, user_agent);
        bump(&mut self.referers, referer);
        self.updated_at = now;
    }

    /// Referers, most frequent first.
    pub fn top_referers(&self) -> Vec<ClientCount> {
        ranked(&self.referers)
    }

    /// User agents, most frequent first.
    pub fn top_user_agents(&self) -> Vec<ClientCount> {
        ranked(&self.user_agents)
    }
}

fn bump(counts: &mut BTreeMap<String, u64>, value: Option<&str>) {
    let name = match value.map(str::trim) {
        Some(v) if !v.is_empty() => v,
        _ => UNKNOWN_CLIENT,
    };
    let count = counts.entry(name.to_string()).or_default();
    *count = count.saturating_add(1);
}

// Ties keep name order, since the map iterates sorted and the sort is stable.
fn ranked(counts: &BTreeMap<String, u64>) -> Vec<ClientCount> {
    let mut rows: Vec<ClientCount> = counts
        .iter()
        .map(|(name, count)| ClientCount {
            name: name.clone(),
            count: *count,
        })
        .collect();
    rows.sort_by(|a, b| b.count.cmp(&a.count));
    rows
}
