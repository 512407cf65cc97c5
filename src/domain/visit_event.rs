//! Visit event model for asynchronous visit counting.

/// A visit captured at redirect time, counted later by the background worker.
///
/// Passed from the redirect path to [`crate::domain::visit_worker::run_visit_worker`]
/// through a bounded channel so counting never delays the redirect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VisitEvent {
    pub alias: String,
    pub ip: String,
    pub user_agent: Option<String>,
    pub referer: Option<String>,
}

impl VisitEvent {
    pub fn new(alias: impl Into<String>, ip: impl Into<String>) -> Self {
        Self {
            alias: alias.into(),
            ip: ip.into(),
            user_agent: None,
            referer: None,
        }
    }

    pub fn with_client(mut self, user_agent: Option<&str>, referer: Option<&str>) -> Self {
        self.user_agent = user_agent.map(str::to_string);
        self.referer = referer.map(str::to_string);
        self
    }
}
