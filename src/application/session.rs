use crate::domain::{MemberId, Role};

use super::AppError;

/// Request-scoped context: who is acting, as resolved at sign-in.
/// Every ledger operation receives one explicitly; nothing is kept globally.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub token: String,
    pub member_id: MemberId,
    pub email: String,
    pub role: Role,
}

impl Session {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    pub fn require_admin(&self) -> Result<(), AppError> {
        if self.is_admin() {
            Ok(())
        } else {
            Err(AppError::AdminOnly)
        }
    }
}
