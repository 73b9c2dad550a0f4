//! Identity claims carried inside a login token.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

// --- Role ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Patient,
    Doctor,
    Admin,
}

impl Role {
    /// Doctors and the admin account are staff; patients are not.
    pub fn is_staff(&self) -> bool {
        matches!(self, Self::Doctor | Self::Admin)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Patient => write!(f, "patient"),
            Self::Doctor => write!(f, "doctor"),
            Self::Admin => write!(f, "admin"),
        }
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "patient" => Ok(Self::Patient),
            "doctor" => Ok(Self::Doctor),
            "admin" => Ok(Self::Admin),
            _ => Err(format!("unknown role: {s}")),
        }
    }
}

// --- Claims ---

/// Decoded token payload.
///
/// `user_id` is the patient code (`maBN`) or doctor code (`maBS`) depending on `role`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub user_id: String,
    pub username: String,
    pub role: Role,
    /// Issued-at, seconds since the epoch.
    #[serde(default)]
    pub iat: i64,
    /// Expiry, seconds since the epoch.
    pub exp: i64,
}

impl Claims {
    pub fn new(user_id: &str, username: &str, role: Role, iat: i64, exp: i64) -> Self {
        Self {
            user_id: user_id.to_string(),
            username: username.to_string(),
            role,
            iat,
            exp,
        }
    }

    pub fn is_expired_at(&self, now: i64) -> bool {
        self.exp <= now
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_wire_format_is_lowercase() {
        let json = serde_json::to_string(&Role::Admin).unwrap();
        assert_eq!(json, "\"admin\"");
        let back: Role = serde_json::from_str("\"patient\"").unwrap();
        assert_eq!(back, Role::Patient);
    }

    #[test]
    fn role_from_str_rejects_unknown() {
        assert_eq!("doctor".parse::<Role>(), Ok(Role::Doctor));
        assert!("benhnhan".parse::<Role>().is_err());
    }

    #[test]
    fn staff_roles() {
        assert!(Role::Doctor.is_staff());
        assert!(Role::Admin.is_staff());
        assert!(!Role::Patient.is_staff());
    }

    #[test]
    fn claims_without_iat_still_decode() {
        let json = r#"{"user_id":"BN0001","username":"an.nguyen","role":"patient","exp":1700000000}"#;
        let claims: Claims = serde_json::from_str(json).unwrap();
        assert_eq!(claims.user_id, "BN0001");
        assert_eq!(claims.iat, 0);
        assert!(claims.is_expired_at(1700000000));
        assert!(!claims.is_expired_at(1699999999));
    }
}
