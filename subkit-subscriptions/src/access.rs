//! Who is asking, and what they may touch.
//!
//! Identity comes from outside the crate; operations only see a
//! [`Requester`]. Ownership checks go through [`Requester::require`] so every
//! service enforces the same rules.

use crate::{Result, SubscriptionError};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Admin,
}

/// Authenticated caller
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Requester {
    pub user_id: String,
    pub role: Role,
}

/// Who may act on a user-owned resource
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessPolicy {
    /// Owner or any admin (cancel, renew, reads)
    OwnerOrAdmin,
    /// Owner only, admins included only when they own it (paying)
    OwnerOnly,
}

impl Requester {
    pub fn user(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            role: Role::User,
        }
    }

    pub fn admin(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            role: Role::Admin,
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    pub fn can_access(&self, owner: &str, policy: AccessPolicy) -> bool {
        match policy {
            AccessPolicy::OwnerOrAdmin => self.is_admin() || self.user_id == owner,
            AccessPolicy::OwnerOnly => self.user_id == owner,
        }
    }

    /// Fail with `Unauthorized` unless [`can_access`](Self::can_access).
    pub fn require(&self, owner: &str, policy: AccessPolicy) -> Result<()> {
        if self.can_access(owner, policy) {
            Ok(())
        } else {
            Err(SubscriptionError::Unauthorized(format!(
                "user {} may not act on a resource owned by {}",
                self.user_id, owner
            )))
        }
    }

    pub fn require_admin(&self) -> Result<()> {
        if self.is_admin() {
            Ok(())
        } else {
            Err(SubscriptionError::Unauthorized(format!(
                "user {} is not an administrator",
                self.user_id
            )))
        }
    }
}
