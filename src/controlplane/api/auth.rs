//! Access Control
//!
//! Bearer-token authentication and role based permissions for the REST API.
//! Users and their roles come from a YAML file:
//!
//! ```yaml
//! users:
//!   - username: admin
//!     token: s3cr3t
//!     roles: [administrator]
//!   - username: viewer
//!     token: v13w
//!     roles: [read-only]
//! ```
//!
//! An auth file must list at least one user. Authentication is only disabled
//! through `AccessControl::disabled()`, in which case every request acts as
//! an administrator.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::Path;
use tracing::{debug, info};

// =============================================================================
// Scopes, Permissions, Roles
// =============================================================================

/// Area of the cluster a permission applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    Hosts,
    Osd,
}

impl std::fmt::Display for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Scope::Hosts => write!(f, "hosts"),
            Scope::Osd => write!(f, "osd"),
        }
    }
}

/// Operation class on a scope
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Permission {
    Read,
    Create,
    Update,
    Delete,
}

impl std::fmt::Display for Permission {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Permission::Read => write!(f, "read"),
            Permission::Create => write!(f, "create"),
            Permission::Update => write!(f, "update"),
            Permission::Delete => write!(f, "delete"),
        }
    }
}

/// Built-in roles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Role {
    /// Everything
    Administrator,
    /// Read on every scope
    ReadOnly,
    /// Everything on hosts and OSDs
    ClusterManager,
}

impl Role {
    pub fn allows(&self, scope: Scope, permission: Permission) -> bool {
        match self {
            Role::Administrator => true,
            Role::ReadOnly => permission == Permission::Read,
            Role::ClusterManager => matches!(scope, Scope::Hosts | Scope::Osd),
        }
    }
}

// =============================================================================
// Authenticated User
// =============================================================================

/// Identity attached to a request by the authentication middleware
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedUser {
    pub username: String,
    pub roles: Vec<Role>,
}

impl AuthenticatedUser {
    /// Identity used when authentication is disabled
    pub fn anonymous_admin() -> Self {
        Self {
            username: "anonymous".to_string(),
            roles: vec![Role::Administrator],
        }
    }

    /// Fail with `PermissionDenied` unless a role grants the permission
    pub fn authorize(&self, scope: Scope, permission: Permission) -> Result<()> {
        if self.roles.iter().any(|r| r.allows(scope, permission)) {
            return Ok(());
        }
        debug!("{} denied {} on {}", self.username, permission, scope);
        Err(Error::PermissionDenied {
            scope: scope.to_string(),
            permission: permission.to_string(),
        })
    }
}

// =============================================================================
// Configuration
// =============================================================================

/// A configured user
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserEntry {
    pub username: String,
    pub token: String,
    #[serde(default)]
    pub roles: Vec<Role>,
}

/// Contents of the auth file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuthConfig {
    #[serde(default)]
    pub users: Vec<UserEntry>,
}

impl AuthConfig {
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_yaml(&content)
    }
}

// =============================================================================
// Access Control
// =============================================================================

/// Resolves bearer tokens to users
#[derive(Debug, Clone, Default)]
pub struct AccessControl {
    users: Vec<UserEntry>,
}

impl AccessControl {
    /// Access control that lets every request through as administrator
    pub fn disabled() -> Self {
        Self::default()
    }

    /// Validate the configuration and build the token table
    pub fn new(config: AuthConfig) -> Result<Self> {
        if config.users.is_empty() {
            return Err(Error::Configuration("auth file lists no users".into()));
        }
        let mut tokens = BTreeSet::new();
        for user in &config.users {
            if user.username.is_empty() || user.token.is_empty() {
                return Err(Error::Configuration(
                    "auth users need a username and a token".into(),
                ));
            }
            if !tokens.insert(user.token.as_str()) {
                return Err(Error::Configuration(format!(
                    "duplicate token for user {}",
                    user.username
                )));
            }
        }
        info!("Access control loaded with {} user(s)", config.users.len());
        Ok(Self {
            users: config.users,
        })
    }

    pub fn is_enabled(&self) -> bool {
        !self.users.is_empty()
    }

    /// Resolve an `Authorization` header value
    pub fn authenticate(&self, authorization: Option<&str>) -> Result<AuthenticatedUser> {
        if !self.is_enabled() {
            return Ok(AuthenticatedUser::anonymous_admin());
        }

        let token = authorization
            .and_then(|v| v.strip_prefix("Bearer "))
            .ok_or(Error::Unauthenticated)?;

        self.users
            .iter()
            .find(|u| constant_time_eq(&u.token, token))
            .map(|u| AuthenticatedUser {
                username: u.username.clone(),
                roles: u.roles.clone(),
            })
            .ok_or(Error::Unauthenticated)
    }
}

fn constant_time_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.as_bytes()
        .iter()
        .zip(b.as_bytes())
        .fold(0u8, |acc, (x, y)| acc | (x ^ y))
        == 0
}
