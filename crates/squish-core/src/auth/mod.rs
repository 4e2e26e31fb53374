//! User accounts and access tokens.
//!
//! Accounts live in a JSON file in the data directory. Passwords are
//! stored as Argon2 PHC strings and sessions are stateless HS256 tokens.
//! The first account registered becomes an administrator.

mod password;
mod token;

use std::fs;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::jobs::unix_now;

pub use password::{hash_password, verify_against_dummy, verify_password};
pub use token::{generate_secret, Claims, IssuedToken, TokenIssuer};

/// File name of the user database inside the data directory.
pub const USERS_FILE: &str = "users.json";

/// Minimum password length.
pub const MIN_PASSWORD_LEN: usize = 8;

/// Allowed username length.
pub const USERNAME_LEN: std::ops::RangeInclusive<usize> = 3..=32;

/// Account role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Full access to the dashboard
    Admin,
    /// Regular account
    User,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Admin => write!(f, "admin"),
            Self::User => write!(f, "user"),
        }
    }
}

impl FromStr for Role {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "admin" => Ok(Self::Admin),
            "user" => Ok(Self::User),
            other => Err(Error::InvalidInput(format!("unknown role '{other}'"))),
        }
    }
}

/// A stored account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    /// Unique identifier
    pub id: Uuid,
    /// Login name
    pub username: String,
    /// Argon2 PHC string
    pub password_hash: String,
    /// Role
    pub role: Role,
    /// Unix timestamp of creation
    pub created_at: u64,
}

impl User {
    /// Whether this account is an administrator.
    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    /// Public view of the account, without the password hash.
    #[must_use]
    pub fn info(&self) -> UserInfo {
        UserInfo {
            id: self.id,
            username: self.username.clone(),
            role: self.role,
            created_at: self.created_at,
        }
    }
}

/// Account data safe to return to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserInfo {
    /// Unique identifier
    pub id: Uuid,
    /// Login name
    pub username: String,
    /// Role
    pub role: Role,
    /// Unix timestamp of creation
    pub created_at: u64,
}

/// Check a username: 3 to 32 characters of `[A-Za-z0-9_.-]`.
pub fn validate_username(username: &str) -> Result<()> {
    if !USERNAME_LEN.contains(&username.len()) {
        return Err(Error::InvalidInput(format!(
            "username must be {} to {} characters",
            USERNAME_LEN.start(),
            USERNAME_LEN.end()
        )));
    }

    if !username
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
    {
        return Err(Error::InvalidInput(
            "username may only contain letters, digits, '_', '.' and '-'".to_string(),
        ));
    }

    Ok(())
}

/// Check a password meets the minimum length.
pub fn validate_password(password: &str) -> Result<()> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(Error::InvalidInput(format!(
            "password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }
    Ok(())
}

/// Serializable wrapper for the user database.
#[derive(Debug, Serialize, Deserialize)]
struct UserDatabase {
    /// Version of the user database format
    version: u32,
    /// Accounts in creation order
    users: Vec<User>,
}

/// Persistent account store.
#[derive(Debug)]
pub struct UserStore {
    /// Path to the user database file
    path: PathBuf,
    /// Accounts in creation order
    users: Vec<User>,
}

impl UserStore {
    /// Open the store described by `config`.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be loaded.
    pub fn from_config(config: &Config) -> Result<Self> {
        Self::open(&config.storage.resolved_data_dir())
    }

    /// Open the store in `data_dir`.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be loaded.
    pub fn open(data_dir: &Path) -> Result<Self> {
        let path = data_dir.join(USERS_FILE);
        if !path.exists() {
            return Ok(Self {
                path,
                users: Vec::new(),
            });
        }

        let file = fs::File::open(&path).map_err(|e| {
            Error::StoreError(format!(
                "Failed to open user store at {}: {}",
                path.display(),
                e
            ))
        })?;

        let db: UserDatabase = serde_json::from_reader(BufReader::new(file)).map_err(|e| {
            Error::StoreError(format!(
                "Failed to parse user store at {}: {}",
                path.display(),
                e
            ))
        })?;

        Ok(Self {
            path,
            users: db.users,
        })
    }

    /// Save the user store.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be saved.
    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                Error::StoreError(format!(
                    "Failed to create data directory {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        let db = UserDatabase {
            version: 1,
            users: self.users.clone(),
        };

        let file = fs::File::create(&self.path).map_err(|e| {
            Error::StoreError(format!(
                "Failed to create user store at {}: {}",
                self.path.display(),
                e
            ))
        })?;

        serde_json::to_writer_pretty(BufWriter::new(file), &db).map_err(|e| {
            Error::StoreError(format!(
                "Failed to write user store at {}: {}",
                self.path.display(),
                e
            ))
        })?;

        Ok(())
    }

    /// Register a self-service account. The first account is an admin.
    ///
    /// # Errors
    ///
    /// Returns an error for invalid credentials, a taken username, or if
    /// the store cannot be saved.
    pub fn register(&mut self, username: &str, password: &str) -> Result<User> {
        let role = self.next_role();
        self.create(username, password, role)
    }

    /// Register a self-service account whose password was hashed up front.
    ///
    /// # Errors
    ///
    /// Returns an error for an invalid or taken username, or if the store
    /// cannot be saved.
    pub fn register_hashed(&mut self, username: &str, password_hash: String) -> Result<User> {
        let role = self.next_role();
        self.insert(username, password_hash, role)
    }

    fn next_role(&self) -> Role {
        if self.users.is_empty() {
            Role::Admin
        } else {
            Role::User
        }
    }

    /// Create an account with an explicit role.
    ///
    /// # Errors
    ///
    /// Returns an error for invalid credentials, a taken username, or if
    /// the store cannot be saved.
    pub fn create(&mut self, username: &str, password: &str, role: Role) -> Result<User> {
        validate_username(username)?;
        validate_password(password)?;

        // Taken names fail before paying for a hash.
        if self.find_by_username(username).is_some() {
            return Err(Error::UserExists(username.to_string()));
        }

        self.insert(username, hash_password(password)?, role)
    }

    fn insert(&mut self, username: &str, password_hash: String, role: Role) -> Result<User> {
        validate_username(username)?;
        if self.find_by_username(username).is_some() {
            return Err(Error::UserExists(username.to_string()));
        }

        let user = User {
            id: Uuid::new_v4(),
            username: username.to_string(),
            password_hash,
            role,
            created_at: unix_now(),
        };

        self.users.push(user.clone());
        self.save()?;

        tracing::info!(user = %user.username, role = %user.role, "Created account");
        Ok(user)
    }

    /// Check credentials and return the matching account.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Unauthorized`] when the username or password is wrong.
    pub fn authenticate(&self, username: &str, password: &str) -> Result<User> {
        let Some(user) = self.find_by_username(username) else {
            verify_against_dummy(password);
            return Err(Error::Unauthorized("invalid username or password".to_string()));
        };

        verify_password(password, &user.password_hash)
            .then(|| user.clone())
            .ok_or_else(|| Error::Unauthorized("invalid username or password".to_string()))
    }

    /// Get an account by ID.
    #[must_use]
    pub fn get(&self, id: &Uuid) -> Option<&User> {
        self.users.iter().find(|u| &u.id == id)
    }

    /// Get an account by username (case-insensitive).
    #[must_use]
    pub fn find_by_username(&self, username: &str) -> Option<&User> {
        self.users
            .iter()
            .find(|u| u.username.eq_ignore_ascii_case(username))
    }

    /// All accounts in creation order.
    #[must_use]
    pub fn list(&self) -> &[User] {
        &self.users
    }

    /// Change an account's role. The last admin cannot be demoted.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UserNotFound`] for unknown IDs, [`Error::InvalidInput`]
    /// when demoting the last admin, or an error if the store cannot be saved.
    pub fn set_role(&mut self, id: &Uuid, role: Role) -> Result<User> {
        let index = self.index_of(id)?;

        if role != Role::Admin && self.users[index].is_admin() && self.admin_count() == 1 {
            return Err(Error::InvalidInput(
                "cannot demote the last admin".to_string(),
            ));
        }

        self.users[index].role = role;
        self.save()?;
        Ok(self.users[index].clone())
    }

    /// Replace an account's password.
    ///
    /// # Errors
    ///
    /// Returns an error for unknown users, an invalid password, or if the
    /// store cannot be saved.
    pub fn set_password(&mut self, id: &Uuid, password: &str) -> Result<()> {
        validate_password(password)?;
        let index = self.index_of(id)?;
        self.users[index].password_hash = hash_password(password)?;
        self.save()
    }

    /// Delete an account. The last admin cannot be deleted.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UserNotFound`] for unknown IDs, [`Error::InvalidInput`]
    /// when deleting the last admin, or an error if the store cannot be saved.
    pub fn remove(&mut self, id: &Uuid) -> Result<User> {
        let index = self.index_of(id)?;

        if self.users[index].is_admin() && self.admin_count() == 1 {
            return Err(Error::InvalidInput(
                "cannot delete the last admin".to_string(),
            ));
        }

        let user = self.users.remove(index);
        self.save()?;
        tracing::info!(user = %user.username, "Deleted account");
        Ok(user)
    }

    /// Number of admin accounts.
    #[must_use]
    pub fn admin_count(&self) -> usize {
        self.users.iter().filter(|u| u.is_admin()).count()
    }

    /// Get the total number of accounts.
    #[must_use]
    pub fn len(&self) -> usize {
        self.users.len()
    }

    /// Check if there are no accounts.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }

    /// Get the path to the user database file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn index_of(&self, id: &Uuid) -> Result<usize> {
        self.users
            .iter()
            .position(|u| &u.id == id)
            .ok_or_else(|| Error::UserNotFound(id.to_string()))
    }
}
