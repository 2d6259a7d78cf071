use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Role {
    Admin,
    Analyst,
    Viewer,
}

impl Role {
    /// Viewers may observe the table but never trigger an annotation.
    pub fn can_annotate(self) -> bool {
        !matches!(self, Role::Viewer)
    }

    pub fn is_admin(self) -> bool {
        matches!(self, Role::Admin)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Role::Admin => "ADMIN",
            Role::Analyst => "ANALYST",
            Role::Viewer => "VIEWER",
        };
        f.write_str(label)
    }
}

/// Read-only access to the acting principal's role.
pub trait RoleProvider: Send + Sync {
    fn current_role(&self) -> Role;
}

/// Fixed role, handy when no identity provider is wired in.
#[derive(Debug, Clone, Copy)]
pub struct StaticRole(pub Role);

impl RoleProvider for StaticRole {
    fn current_role(&self) -> Role {
        self.0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub name: String,
    pub email: String,
    /// Only held in the in-memory registry, never in session blobs or replies
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    pub role: Role,
    #[serde(default)]
    pub department: Option<String>,
    #[serde(default)]
    pub avatar: String,
}

impl User {
    /// Copy without the password.
    pub fn without_password(&self) -> User {
        User {
            password: None,
            ..self.clone()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub password: String,
    pub role: Role,
    #[serde(default)]
    pub department: Option<String>,
}

/// Partial update applied by an administrator; absent fields are kept.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserUpdate {
    pub name: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
    pub role: Option<Role>,
    pub department: Option<String>,
    pub avatar: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityLog {
    pub id: String,
    pub user_id: String,
    pub user_name: String,
    pub action: String,
    pub details: String,
    pub timestamp: DateTime<Utc>,
    pub ip: String,
}

/// Initials shown when a user has no picture.
pub fn avatar_initials(name: &str) -> String {
    name.chars().take(2).collect::<String>().to_uppercase()
}
