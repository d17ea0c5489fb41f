use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::Cents;

pub type MemberId = Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Account holder: manages own savings and applies for loans
    Member,
    /// Decides loan applications and sees every member's activity
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Member => "member",
            Role::Admin => "admin",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "member" => Some(Role::Member),
            "admin" => Some(Role::Admin),
            _ => None,
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A cooperative account holder. Both balances are kept non-negative by the
/// ledger operations and by the storage schema.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Member {
    pub id: MemberId,
    pub name: String,
    pub email: String,
    pub role: Role,
    pub savings_balance: Cents,
    pub loan_balance: Cents,
    pub created_at: DateTime<Utc>,
}

impl Member {
    /// A freshly registered member: zero balances, ordinary role.
    pub fn new(name: impl Into<String>, email: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            email: normalize_email(email),
            role: Role::Member,
            savings_balance: 0,
            loan_balance: 0,
            created_at: Utc::now(),
        }
    }

    pub fn with_role(mut self, role: Role) -> Self {
        self.role = role;
        self
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    pub fn can_withdraw(&self, amount: Cents) -> bool {
        amount > 0 && amount <= self.savings_balance
    }
}

/// Emails are the login key; compare them trimmed and lower-cased.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Minimal shape check: something before and after a single '@', and a dot in
/// the domain part.
pub fn is_plausible_email(email: &str) -> bool {
    match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.contains('@')
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
        }
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_member_starts_empty() {
        let member = Member::new("Ada Obi", "  Ada@Example.COM ");
        assert_eq!(member.email, "ada@example.com");
        assert_eq!(member.role, Role::Member);
        assert_eq!(member.savings_balance, 0);
        assert_eq!(member.loan_balance, 0);
        assert!(!member.is_admin());
    }

    #[test]
    fn test_role_parsing() {
        assert_eq!(Role::from_str("ADMIN"), Some(Role::Admin));
        assert_eq!(Role::from_str("member"), Some(Role::Member));
        assert_eq!(Role::from_str("treasurer"), None);
    }

    #[test]
    fn test_can_withdraw() {
        let mut member = Member::new("Ada", "ada@example.com");
        member.savings_balance = 500000;

        assert!(member.can_withdraw(500000));
        assert!(member.can_withdraw(1));
        assert!(!member.can_withdraw(500001));
        assert!(!member.can_withdraw(0));
    }

    #[test]
    fn test_email_shape() {
        assert!(is_plausible_email("ada@example.com"));
        assert!(!is_plausible_email("ada.example.com"));
        assert!(!is_plausible_email("@example.com"));
        assert!(!is_plausible_email("ada@example"));
        assert!(!is_plausible_email("ada@@example.com"));
        assert!(!is_plausible_email("ada@example."));
    }
}
