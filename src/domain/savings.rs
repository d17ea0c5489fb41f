use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{Cents, MemberId};

pub type SavingsTransactionId = Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SavingsKind {
    Deposit,
    Withdraw,
}

impl SavingsKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SavingsKind::Deposit => "Deposit",
            SavingsKind::Withdraw => "Withdraw",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "deposit" => Some(SavingsKind::Deposit),
            "withdraw" => Some(SavingsKind::Withdraw),
            _ => None,
        }
    }

    /// Signed effect of this kind of record on the savings balance.
    pub fn signed(&self, amount: Cents) -> Cents {
        match self {
            SavingsKind::Deposit => amount,
            SavingsKind::Withdraw => -amount,
        }
    }
}

impl std::fmt::Display for SavingsKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One movement of a member's savings. Records are append-only: once stored
/// they are never updated or deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SavingsTransaction {
    pub id: SavingsTransactionId,
    pub member_id: MemberId,
    pub kind: SavingsKind,
    /// Always positive; the direction comes from `kind`
    pub amount: Cents,
    pub created_at: DateTime<Utc>,
    /// Client-supplied idempotency key, unique across savings records
    pub request_key: Option<String>,
}

impl SavingsTransaction {
    pub fn new(member_id: MemberId, kind: SavingsKind, amount: Cents) -> Self {
        assert!(amount > 0, "Savings amount must be positive");
        Self {
            id: Uuid::new_v4(),
            member_id,
            kind,
            amount,
            created_at: Utc::now(),
            request_key: None,
        }
    }

    pub fn with_request_key(mut self, key: Option<String>) -> Self {
        self.request_key = key;
        self
    }
}
