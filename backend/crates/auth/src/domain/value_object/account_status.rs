//! Account Status Value Object
//!
//! Deliberately minimal: temporary login lockout is tracked on the
//! credentials record (`locked_until`), not here. Status only covers
//! administrative disabling.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Account status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(i16)]
pub enum AccountStatus {
    /// Normal active account - can sign in and use all features
    #[default]
    Active = 0,

    /// Disabled by an administrator - cannot sign in
    Disabled = 1,
}

impl AccountStatus {
    #[inline]
    pub const fn id(&self) -> i16 {
        *self as i16
    }

    #[inline]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Disabled => "disabled",
        }
    }

    /// Check if sign-in is allowed
    #[inline]
    pub const fn can_login(&self) -> bool {
        matches!(self, Self::Active)
    }

    #[inline]
    pub fn from_id(id: i16) -> Option<Self> {
        match id {
            0 => Some(Self::Active),
            1 => Some(Self::Disabled),
            _ => None,
        }
    }

    #[inline]
    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "active" => Some(Self::Active),
            "disabled" => Some(Self::Disabled),
            _ => None,
        }
    }
}

impl fmt::Display for AccountStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_roundtrip() {
        assert_eq!(AccountStatus::from_id(0), Some(AccountStatus::Active));
        assert_eq!(AccountStatus::from_id(1), Some(AccountStatus::Disabled));
        assert_eq!(AccountStatus::from_id(9), None);
        assert_eq!(
            AccountStatus::from_code("active"),
            Some(AccountStatus::Active)
        );
        assert_eq!(AccountStatus::from_code("nope"), None);
    }

    #[test]
    fn test_can_login() {
        assert!(AccountStatus::Active.can_login());
        assert!(!AccountStatus::Disabled.can_login());
    }
}
