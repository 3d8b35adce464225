//! Office user accounts.

use serde::{Deserialize, Serialize};

/// User roles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Cashier,
    Enforcer,
    Encoder,
}

impl Role {
    /// Get the string representation for storage.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Cashier => "cashier",
            Self::Enforcer => "enforcer",
            Self::Encoder => "encoder",
        }
    }

    /// Parse from string.
    #[must_use]
    pub fn from_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "admin" => Self::Admin,
            "cashier" => Self::Cashier,
            "enforcer" => Self::Enforcer,
            _ => Self::Encoder,
        }
    }
}

impl Default for Role {
    fn default() -> Self {
        Self::Encoder
    }
}

/// An office account. Operators are identified by `username` as the actor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub username: String,
    pub full_name: String,
    pub role: Role,
    pub is_active: bool,
    pub created_at: i64,
    pub updated_at: i64,
}

impl User {
    pub(crate) const COLUMNS: &'static str =
        "id, username, full_name, role, is_active, created_at, updated_at";

    /// Create a new active user.
    pub fn new(username: &str, full_name: &str, role: Role) -> Self {
        let now = chrono::Utc::now().timestamp_millis();
        Self {
            id: format!("usr_{}", &uuid::Uuid::new_v4().to_string()[..12]),
            username: username.trim().to_lowercase(),
            full_name: full_name.trim().to_string(),
            role,
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }

    pub(crate) fn from_row(row: &rusqlite::Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            username: row.get(1)?,
            full_name: row.get(2)?,
            role: Role::from_str(&row.get::<_, String>(3)?),
            is_active: row.get(4)?,
            created_at: row.get(5)?,
            updated_at: row.get(6)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_user_lowercases_username() {
        let user = User::new("  MSantos ", "Maria Santos", Role::Cashier);
        assert!(user.id.starts_with("usr_"));
        assert_eq!(user.username, "msantos");
        assert!(user.is_active);
    }

    #[test]
    fn test_role_parsing() {
        assert_eq!(Role::from_str("ADMIN"), Role::Admin);
        assert_eq!(Role::from_str("cashier"), Role::Cashier);
        assert_eq!(Role::from_str("whatever"), Role::Encoder);
    }
}
