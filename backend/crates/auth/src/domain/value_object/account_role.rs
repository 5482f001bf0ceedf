use serde::{Deserialize, Serialize};
use std::fmt;

/// Account role
///
/// - **User**: regular traveler booking tours
/// - **Guide**: tour guide with listing management access
/// - **Admin**: back-office operator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(i16)]
pub enum AccountRole {
    #[default]
    User = 0,
    Guide = 1,
    Admin = 2,
}

impl AccountRole {
    #[inline]
    pub const fn id(&self) -> i16 {
        *self as i16
    }

    #[inline]
    pub const fn code(&self) -> &'static str {
        use AccountRole::*;
        match self {
            User => "user",
            Guide => "guide",
            Admin => "admin",
        }
    }

    #[inline]
    pub const fn is_guide_or_higher(&self) -> bool {
        use AccountRole::*;
        matches!(self, Guide | Admin)
    }

    #[inline]
    pub const fn is_admin(&self) -> bool {
        matches!(self, AccountRole::Admin)
    }

    #[inline]
    pub fn from_id(id: i16) -> Self {
        use AccountRole::*;
        match id {
            0 => User,
            1 => Guide,
            2 => Admin,
            _ => {
                tracing::error!("Invalid AccountRole id: {}", id);
                unreachable!("Invalid AccountRole id: {}", id)
            }
        }
    }

    #[inline]
    pub fn from_code(code: &str) -> Self {
        use AccountRole::*;
        match code {
            "user" => User,
            "guide" => Guide,
            "admin" => Admin,
            _ => {
                tracing::error!("Invalid AccountRole code: {}", code);
                unreachable!("Invalid AccountRole code: {}", code)
            }
        }
    }
}

impl fmt::Display for AccountRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_account_role_roundtrip() {
        for role in [AccountRole::User, AccountRole::Guide, AccountRole::Admin] {
            assert_eq!(AccountRole::from_id(role.id()), role);
            assert_eq!(AccountRole::from_code(role.code()), role);
        }
    }

    #[test]
    fn test_account_role_checks() {
        assert!(!AccountRole::User.is_guide_or_higher());
        assert!(AccountRole::Guide.is_guide_or_higher());
        assert!(AccountRole::Admin.is_guide_or_higher());
        assert!(!AccountRole::Guide.is_admin());
        assert!(AccountRole::Admin.is_admin());
    }

    #[test]
    fn test_account_role_display() {
        assert_eq!(AccountRole::User.to_string(), "user");
        assert_eq!(AccountRole::Guide.to_string(), "guide");
        assert_eq!(AccountRole::Admin.to_string(), "admin");
    }
}
