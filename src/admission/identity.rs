//! Caller identity as supplied by the external SSO collaborator.
//!
//! Nothing here verifies credentials; the identity is taken as given.

use std::fmt;

use serde::{Deserialize, Serialize};

// == Role ==
/// Privilege levels that scale a tenant's rate budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Anonymous,
    Authenticated,
    Staff,
    Administrator,
}

impl Role {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "anonymous" => Some(Role::Anonymous),
            "authenticated" | "user" => Some(Role::Authenticated),
            "staff" => Some(Role::Staff),
            "administrator" | "admin" => Some(Role::Administrator),
            _ => None,
        }
    }

    /// Factor applied to `max_requests` for callers holding this role.
    pub fn multiplier(&self) -> f64 {
        match self {
            Role::Anonymous => 1.0,
            Role::Authenticated => 1.1,
            Role::Staff => 1.5,
            Role::Administrator => 2.0,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Anonymous => "anonymous",
            Role::Authenticated => "authenticated",
            Role::Staff => "staff",
            Role::Administrator => "administrator",
        }
    }

    /// Scales a base limit; never lowers it.
    pub fn scale(&self, max_requests: u64) -> u64 {
        let scaled = (max_requests as f64 * self.multiplier()).floor() as u64;
        scaled.max(max_requests)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// == Identity ==
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub tenant_id: String,
    pub user_id: String,
    #[serde(default)]
    pub roles: Vec<String>,
}

impl Identity {
    pub fn new(tenant_id: impl Into<String>, user_id: impl Into<String>, roles: &[&str]) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            user_id: user_id.into(),
            roles: roles.iter().map(|r| r.to_string()).collect(),
        }
    }

    /// Highest recognised role; an identified caller is at least
    /// `Authenticated`. Unknown role names are ignored.
    pub fn privilege(&self) -> Role {
        self.roles
            .iter()
            .filter_map(|role| Role::parse(role))
            .max()
            .unwrap_or(Role::Authenticated)
            .max(Role::Authenticated)
    }
}
