//! Caller identity, as supplied by the external auth collaborator.
//!
//! The engine never manages credentials. Every moderation call takes an
//! explicit `IdentityContext` parameter; there is no ambient "current user".

use serde::{Deserialize, Serialize};
use std::fmt;

/// Newtype for a user identifier issued by the identity provider.
///
/// Opaque to the engine; compared only for equality.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserId(pub String);

impl UserId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for UserId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for UserId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Role granted to a user by the identity provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Admin,
}

impl Role {
    /// Parse from the role string used on the wire.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "user" => Some(Self::User),
            "admin" => Some(Self::Admin),
            _ => None,
        }
    }
}

/// The authenticated caller: who they are and what they may do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityContext {
    pub user_id: UserId,
    pub roles: Vec<Role>,
}

impl IdentityContext {
    pub fn new(user_id: impl Into<UserId>, roles: Vec<Role>) -> Self {
        Self {
            user_id: user_id.into(),
            roles,
        }
    }

    /// An ordinary community member with no elevated roles.
    pub fn member(user_id: impl Into<UserId>) -> Self {
        Self::new(user_id, vec![Role::User])
    }

    /// An administrator.
    pub fn admin(user_id: impl Into<UserId>) -> Self {
        Self::new(user_id, vec![Role::User, Role::Admin])
    }

    pub fn is_admin(&self) -> bool {
        self.roles.contains(&Role::Admin)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_parse() {
        assert_eq!(Role::parse("admin"), Some(Role::Admin));
        assert_eq!(Role::parse("user"), Some(Role::User));
        assert_eq!(Role::parse("superuser"), None);
    }

    #[test]
    fn test_is_admin() {
        assert!(IdentityContext::admin("u1").is_admin());
        assert!(!IdentityContext::member("u1").is_admin());
    }
}
