use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Subscription tier for an owner (personal or team workspace).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Plan {
    Free,
    Pro,
    Ultra,
}

impl Plan {
    /// Tracked analytics events allowed per calendar month.
    pub fn monthly_event_cap(self) -> i64 {
        match self {
            Plan::Free => 1_000,
            Plan::Pro => 25_000,
            Plan::Ultra => 100_000,
        }
    }

    /// Links that may be created per calendar month. `None` means unlimited.
    pub fn monthly_link_cap(self) -> Option<i64> {
        match self {
            Plan::Free => Some(30),
            Plan::Pro | Plan::Ultra => None,
        }
    }

    pub fn allows_password_protection(self) -> bool {
        !matches!(self, Plan::Free)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Plan::Free => "free",
            Plan::Pro => "pro",
            Plan::Ultra => "ultra",
        }
    }

    /// Parse the plan column. Unknown values fall back to the free tier so a
    /// bad row never blocks resolution.
    pub fn parse(s: &str) -> Plan {
        match s {
            "pro" => Plan::Pro,
            "ultra" => Plan::Ultra,
            _ => Plan::Free,
        }
    }
}

impl std::fmt::Display for Plan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Owner of one or more links. Backs the plan/subscription lookup used by the
/// usage meter; the billing integration that maintains the `plan` column is an
/// external collaborator.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Owner {
    pub id: String,
    pub name: String,
    pub email: String,
    pub plan: String,
}

impl Owner {
    pub fn plan(&self) -> Plan {
        Plan::parse(&self.plan)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_plan_falls_back_to_free() {
        assert_eq!(Plan::parse("enterprise"), Plan::Free);
        assert_eq!(Plan::parse(""), Plan::Free);
    }

    #[test]
    fn free_plan_is_capped() {
        assert_eq!(Plan::Free.monthly_link_cap(), Some(30));
        assert!(!Plan::Free.allows_password_protection());
        assert!(Plan::Pro.allows_password_protection());
        assert_eq!(Plan::Pro.monthly_link_cap(), None);
    }
}
