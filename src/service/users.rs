//! Office users and role enforcement.
//!
//! Operators are identified by their `--actor` name. When `enforce_roles`
//! is on, privileged operations require an active user with one of the
//! roles allowed for that privilege.

use crate::config::AppConfig;
use crate::error::{Error, Result};
use crate::model::{Role, User};
use crate::storage::events::EventType;
use crate::storage::SqliteStorage;
use rusqlite::{Connection, OptionalExtension};
use tracing::{debug, info};

/// Operations gated by role when enforcement is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Privilege {
    VoidPayment,
    RefundPayment,
    RestoreBackup,
    ManageViolationTypes,
    ManageUsers,
    MergeDrivers,
}

impl Privilege {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::VoidPayment => "void payments",
            Self::RefundPayment => "refund payments",
            Self::RestoreBackup => "restore backups",
            Self::ManageViolationTypes => "manage violation types",
            Self::ManageUsers => "manage users",
            Self::MergeDrivers => "merge drivers",
        }
    }

    #[must_use]
    pub const fn allowed_roles(&self) -> &'static [Role] {
        match self {
            Self::VoidPayment | Self::RefundPayment => &[Role::Admin, Role::Cashier],
            Self::RestoreBackup
            | Self::ManageViolationTypes
            | Self::ManageUsers
            | Self::MergeDrivers => &[Role::Admin],
        }
    }
}

/// Look up a user by username (case-insensitive).
pub fn find_user(conn: &Connection, username: &str) -> Result<Option<User>> {
    let sql = format!("SELECT {} FROM users WHERE username = ?1", User::COLUMNS);
    Ok(conn
        .query_row(&sql, [username.trim()], User::from_row)
        .optional()?)
}

/// Check that `actor` may perform `privilege`.
///
/// Always succeeds when role enforcement is disabled.
pub fn authorize(
    conn: &Connection,
    config: &AppConfig,
    actor: &str,
    privilege: Privilege,
) -> Result<()> {
    if !config.enforce_roles {
        return Ok(());
    }

    let denied = || Error::PermissionDenied {
        actor: actor.to_string(),
        action: privilege.as_str().to_string(),
    };

    let user = find_user(conn, actor)?.ok_or_else(denied)?;
    if !user.is_active || !privilege.allowed_roles().contains(&user.role) {
        debug!(actor, role = user.role.as_str(), privilege = privilege.as_str(), "Denied");
        return Err(denied());
    }
    Ok(())
}

/// User administration.
pub struct UserService<'a> {
    storage: &'a mut SqliteStorage,
    config: &'a AppConfig,
}

impl<'a> UserService<'a> {
    pub fn new(storage: &'a mut SqliteStorage, config: &'a AppConfig) -> Self {
        Self { storage, config }
    }

    /// Create a user.
    ///
    /// The very first user may be created by anyone so that an office can
    /// bootstrap its admin account with enforcement already on.
    pub fn create(&mut self, username: &str, full_name: &str, role: Role, actor: &str) -> Result<User> {
        if username.trim().is_empty() {
            return Err(Error::RequiredField("username"));
        }
        if full_name.trim().is_empty() {
            return Err(Error::RequiredField("full_name"));
        }

        let has_users: bool = self
            .storage
            .conn()
            .query_row("SELECT EXISTS(SELECT 1 FROM users)", [], |row| row.get(0))?;
        if has_users {
            authorize(self.storage.conn(), self.config, actor, Privilege::ManageUsers)?;
        }

        if find_user(self.storage.conn(), username)?.is_some() {
            return Err(Error::InvalidArgument(format!(
                "username '{}' is already taken",
                username.trim()
            )));
        }

        let user = User::new(username, full_name, role);
        self.storage.mutate("create_user", actor, |tx, ctx| {
            tx.execute(
                "INSERT INTO users (id, username, full_name, role, is_active, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, 1, ?5, ?6)",
                rusqlite::params![
                    user.id,
                    user.username,
                    user.full_name,
                    user.role.as_str(),
                    user.created_at,
                    user.updated_at
                ],
            )?;
            ctx.record_change(
                "user",
                &user.id,
                EventType::UserCreated,
                None,
                Some(user.role.as_str().to_string()),
            );
            Ok(())
        })?;

        info!(username = %user.username, role = user.role.as_str(), "User created");
        Ok(user)
    }

    /// List users, active only unless `include_inactive`.
    pub fn list(&self, include_inactive: bool) -> Result<Vec<User>> {
        let sql = format!(
            "SELECT {} FROM users {} ORDER BY username",
            User::COLUMNS,
            if include_inactive { "" } else { "WHERE is_active = 1" }
        );
        let mut stmt = self.storage.conn().prepare(&sql)?;
        let rows = stmt.query_map([], User::from_row)?;
        Ok(rows.collect::<rusqlite::Result<_>>()?)
    }

    /// Get a user by username.
    pub fn get(&self, username: &str) -> Result<User> {
        find_user(self.storage.conn(), username)?.ok_or_else(|| Error::UserNotFound {
            username: username.to_string(),
        })
    }

    /// Change a user's name, role or active flag.
    pub fn update(
        &mut self,
        username: &str,
        full_name: Option<&str>,
        role: Option<Role>,
        active: Option<bool>,
        actor: &str,
    ) -> Result<User> {
        authorize(self.storage.conn(), self.config, actor, Privilege::ManageUsers)?;
        let mut user = self.get(username)?;
        let before = format!("{}:{}", user.role.as_str(), user.is_active);

        if let Some(name) = full_name.map(str::trim).filter(|n| !n.is_empty()) {
            user.full_name = name.to_string();
        }
        if let Some(role) = role {
            user.role = role;
        }
        if let Some(active) = active {
            user.is_active = active;
        }
        user.updated_at = chrono::Utc::now().timestamp_millis();
        let after = format!("{}:{}", user.role.as_str(), user.is_active);

        self.storage.mutate("update_user", actor, |tx, ctx| {
            tx.execute(
                "UPDATE users SET full_name = ?1, role = ?2, is_active = ?3, updated_at = ?4
                 WHERE id = ?5",
                rusqlite::params![
                    user.full_name,
                    user.role.as_str(),
                    user.is_active,
                    user.updated_at,
                    user.id
                ],
            )?;
            ctx.record_change("user", &user.id, EventType::UserUpdated, Some(before), Some(after));
            Ok(())
        })?;

        Ok(user)
    }
}
