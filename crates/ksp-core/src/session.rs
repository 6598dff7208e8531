use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Member,
}

/// Identity handed over by the authentication provider. Operations receive it explicitly.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub user_id: Uuid,
    pub email: String,
    pub role: Role,
}

impl Session {
    pub fn admin(user_id: Uuid, email: impl Into<String>) -> Self {
        Self {
            user_id,
            email: email.into(),
            role: Role::Admin,
        }
    }

    pub fn member(user_id: Uuid, email: impl Into<String>) -> Self {
        Self {
            user_id,
            email: email.into(),
            role: Role::Member,
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    pub fn require_admin(&self, action: &str) -> Result<()> {
        if self.is_admin() {
            Ok(())
        } else {
            Err(Error::Forbidden(format!("{action} requires an admin session")))
        }
    }

    /// Admins act for anyone; members only for themselves.
    pub fn require_self_or_admin(&self, member_id: Uuid, action: &str) -> Result<()> {
        if self.is_admin() || self.user_id == member_id {
            Ok(())
        } else {
            Err(Error::Forbidden(format!(
                "{action} is not allowed for another member"
            )))
        }
    }
}
