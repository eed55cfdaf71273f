use mongodb::bson::oid::ObjectId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Account roles.
///
/// `User` may review bootcamps, `Publisher` may publish bootcamps and
/// courses, `Admin` may do anything and bypasses ownership checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    User,
    Publisher,
    Admin,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::User => write!(f, "user"),
            Role::Publisher => write!(f, "publisher"),
            Role::Admin => write!(f, "admin"),
        }
    }
}

impl Role {
    /// Parse a role from a string (case-insensitive).
    pub fn from_str_ci(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "user" => Some(Role::User),
            "publisher" => Some(Role::Publisher),
            "admin" => Some(Role::Admin),
            _ => None,
        }
    }

    /// Roles a visitor may pick when registering.
    pub fn is_self_assignable(&self) -> bool {
        !matches!(self, Role::Admin)
    }
}

/// The user resolved from a verified session token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthenticatedUser {
    pub id: ObjectId,
    pub name: String,
    pub email: String,
    pub role: Role,
}

impl AuthenticatedUser {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_str_ci() {
        assert_eq!(Role::from_str_ci("User"), Some(Role::User));
        assert_eq!(Role::from_str_ci("PUBLISHER"), Some(Role::Publisher));
        assert_eq!(Role::from_str_ci("admin"), Some(Role::Admin));
        assert_eq!(Role::from_str_ci("superuser"), None);
    }

    #[test]
    fn test_display_matches_serialization() {
        for role in [Role::User, Role::Publisher, Role::Admin] {
            let json = serde_json::to_value(role).unwrap();
            assert_eq!(json.as_str(), Some(role.to_string().as_str()));
        }
    }

    #[test]
    fn test_admin_is_not_self_assignable() {
        assert!(Role::User.is_self_assignable());
        assert!(Role::Publisher.is_self_assignable());
        assert!(!Role::Admin.is_self_assignable());
    }

    #[test]
    fn test_default_role() {
        assert_eq!(Role::default(), Role::User);
    }
}
