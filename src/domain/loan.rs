use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{Cents, MemberId};

pub type LoanApplicationId = Uuid;
pub type LoanTransactionId = Uuid;

/// Lifecycle of a loan application. `Pending` is the only state with outgoing
/// transitions; `Approved` and `Rejected` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LoanStatus {
    Pending,
    Approved,
    Rejected,
}

impl LoanStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LoanStatus::Pending => "Pending",
            LoanStatus::Approved => "Approved",
            LoanStatus::Rejected => "Rejected",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "pending" => Some(LoanStatus::Pending),
            "approved" => Some(LoanStatus::Approved),
            "rejected" => Some(LoanStatus::Rejected),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, LoanStatus::Pending)
    }

    pub fn can_transition_to(&self, next: LoanStatus) -> bool {
        matches!(
            (self, next),
            (LoanStatus::Pending, LoanStatus::Approved) | (LoanStatus::Pending, LoanStatus::Rejected)
        )
    }
}

impl std::fmt::Display for LoanStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The two ways an admin can settle a pending application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LoanDecision {
    Approve,
    Reject,
}

impl LoanDecision {
    pub fn target_status(&self) -> LoanStatus {
        match self {
            LoanDecision::Approve => LoanStatus::Approved,
            LoanDecision::Reject => LoanStatus::Rejected,
        }
    }

    pub fn action(&self) -> LoanAction {
        match self {
            LoanDecision::Approve => LoanAction::Approved,
            LoanDecision::Reject => LoanAction::Rejected,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoanApplication {
    pub id: LoanApplicationId,
    pub member_id: MemberId,
    pub amount: Cents,
    pub status: LoanStatus,
    pub created_at: DateTime<Utc>,
    pub decided_at: Option<DateTime<Utc>>,
    pub request_key: Option<String>,
}

impl LoanApplication {
    pub fn new(member_id: MemberId, amount: Cents) -> Self {
        assert!(amount > 0, "Loan amount must be positive");
        Self {
            id: Uuid::new_v4(),
            member_id,
            amount,
            status: LoanStatus::Pending,
            created_at: Utc::now(),
            decided_at: None,
            request_key: None,
        }
    }

    pub fn with_request_key(mut self, key: Option<String>) -> Self {
        self.request_key = key;
        self
    }

    pub fn is_pending(&self) -> bool {
        self.status == LoanStatus::Pending
    }

    /// Apply a decision in memory. Fails without touching `self` when the
    /// application has already been settled.
    pub fn decide(&mut self, decision: LoanDecision) -> Result<(), LoanStateError> {
        let next = decision.target_status();
        if !self.status.can_transition_to(next) {
            return Err(LoanStateError {
                id: self.id,
                current: self.status,
                requested: next,
            });
        }
        self.status = next;
        self.decided_at = Some(Utc::now());
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoanStateError {
    pub id: LoanApplicationId,
    pub current: LoanStatus,
    pub requested: LoanStatus,
}

impl std::fmt::Display for LoanStateError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "loan application {} is {}, cannot become {}",
            self.id, self.current, self.requested
        )
    }
}

impl std::error::Error for LoanStateError {}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LoanAction {
    Applied,
    Approved,
    Rejected,
}

impl LoanAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            LoanAction::Applied => "Applied",
            LoanAction::Approved => "Approved",
            LoanAction::Rejected => "Rejected",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "applied" => Some(LoanAction::Applied),
            "approved" => Some(LoanAction::Approved),
            "rejected" => Some(LoanAction::Rejected),
            _ => None,
        }
    }
}

impl std::fmt::Display for LoanAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Append-only log entry for anything that happens to a loan application.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoanTransaction {
    pub id: LoanTransactionId,
    pub member_id: MemberId,
    pub application_id: Option<LoanApplicationId>,
    pub action: LoanAction,
    pub amount: Cents,
    pub created_at: DateTime<Utc>,
}

impl LoanTransaction {
    pub fn for_application(application: &LoanApplication, action: LoanAction) -> Self {
        Self {
            id: Uuid::new_v4(),
            member_id: application.member_id,
            application_id: Some(application.id),
            action,
            amount: application.amount,
            created_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_pending_has_transitions() {
        use LoanStatus::*;
        for from in [Pending, Approved, Rejected] {
            for to in [Pending, Approved, Rejected] {
                let expected = from == Pending && to != Pending;
                assert_eq!(from.can_transition_to(to), expected, "{from} -> {to}");
            }
        }
        assert!(!Pending.is_terminal());
        assert!(Approved.is_terminal());
        assert!(Rejected.is_terminal());
    }

    #[test]
    fn test_decide_once() {
        let mut application = LoanApplication::new(Uuid::new_v4(), 2000000);
        assert!(application.is_pending());

        application.decide(LoanDecision::Approve).unwrap();
        assert_eq!(application.status, LoanStatus::Approved);
        assert!(application.decided_at.is_some());

        let err = application.decide(LoanDecision::Reject).unwrap_err();
        assert_eq!(err.current, LoanStatus::Approved);
        assert_eq!(err.requested, LoanStatus::Rejected);
        assert_eq!(application.status, LoanStatus::Approved);
    }

    #[test]
    fn test_log_entry_mirrors_application() {
        let application = LoanApplication::new(Uuid::new_v4(), 1000000);
        let entry = LoanTransaction::for_application(&application, LoanAction::Applied);

        assert_eq!(entry.member_id, application.member_id);
        assert_eq!(entry.application_id, Some(application.id));
        assert_eq!(entry.amount, 1000000);
        assert_eq!(entry.action, LoanAction::Applied);
    }

    #[test]
    #[should_panic(expected = "Loan amount must be positive")]
    fn test_loan_requires_positive_amount() {
        LoanApplication::new(Uuid::new_v4(), -5);
    }
}
