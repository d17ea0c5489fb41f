use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use super::{
    Cents, LoanAction, LoanApplication, LoanApplicationId, LoanStatus, LoanTransaction, Member,
    MemberId, SavingsTransaction,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum IntegrityIssue {
    NegativeSavings {
        member_id: MemberId,
        balance: Cents,
    },
    NegativeLoan {
        member_id: MemberId,
        balance: Cents,
    },
    SavingsMismatch {
        member_id: MemberId,
        stored: Cents,
        from_log: Cents,
    },
    LoanMismatch {
        member_id: MemberId,
        stored: Cents,
        from_applications: Cents,
    },
    /// A settled application should carry exactly one matching decision record,
    /// a pending one none.
    DecisionRecords {
        application_id: LoanApplicationId,
        status: LoanStatus,
        records: usize,
    },
    NonPositiveAmount {
        record_id: uuid::Uuid,
        amount: Cents,
    },
    UnknownMember {
        record_id: uuid::Uuid,
        member_id: MemberId,
    },
}

impl std::fmt::Display for IntegrityIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IntegrityIssue::NegativeSavings { member_id, balance } => {
                write!(f, "member {} has negative savings ({})", member_id, balance)
            }
            IntegrityIssue::NegativeLoan { member_id, balance } => {
                write!(f, "member {} has negative loan balance ({})", member_id, balance)
            }
            IntegrityIssue::SavingsMismatch {
                member_id,
                stored,
                from_log,
            } => write!(
                f,
                "member {} savings is {} but the log adds up to {}",
                member_id, stored, from_log
            ),
            IntegrityIssue::LoanMismatch {
                member_id,
                stored,
                from_applications,
            } => write!(
                f,
                "member {} loan balance is {} but approved applications add up to {}",
                member_id, stored, from_applications
            ),
            IntegrityIssue::DecisionRecords {
                application_id,
                status,
                records,
            } => write!(
                f,
                "application {} is {} with {} decision record(s)",
                application_id, status, records
            ),
            IntegrityIssue::NonPositiveAmount { record_id, amount } => {
                write!(f, "record {} has non-positive amount {}", record_id, amount)
            }
            IntegrityIssue::UnknownMember {
                record_id,
                member_id,
            } => write!(f, "record {} references unknown member {}", record_id, member_id),
        }
    }
}

/// Result of reconciling stored balances against the transaction logs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntegrityReport {
    pub member_count: usize,
    pub savings_record_count: usize,
    pub loan_record_count: usize,
    pub application_count: usize,
    pub total_savings: Cents,
    pub total_loans: Cents,
    pub issues: Vec<IntegrityIssue>,
}

impl IntegrityReport {
    pub fn is_healthy(&self) -> bool {
        self.issues.is_empty()
    }
}

pub fn build_integrity_report(
    members: &[Member],
    savings: &[SavingsTransaction],
    applications: &[LoanApplication],
    loan_records: &[LoanTransaction],
) -> IntegrityReport {
    let mut issues = Vec::new();
    let known: HashSet<MemberId> = members.iter().map(|m| m.id).collect();

    // Log sums are accumulated wide so near-limit balances cannot overflow.
    let mut savings_by_member: HashMap<MemberId, i128> = HashMap::new();
    for record in savings {
        if record.amount <= 0 {
            issues.push(IntegrityIssue::NonPositiveAmount {
                record_id: record.id,
                amount: record.amount,
            });
        }
        if !known.contains(&record.member_id) {
            issues.push(IntegrityIssue::UnknownMember {
                record_id: record.id,
                member_id: record.member_id,
            });
        }
        *savings_by_member.entry(record.member_id).or_insert(0) +=
            i128::from(record.kind.signed(record.amount));
    }

    let mut loans_by_member: HashMap<MemberId, i128> = HashMap::new();
    for application in applications {
        if application.amount <= 0 {
            issues.push(IntegrityIssue::NonPositiveAmount {
                record_id: application.id,
                amount: application.amount,
            });
        }
        if !known.contains(&application.member_id) {
            issues.push(IntegrityIssue::UnknownMember {
                record_id: application.id,
                member_id: application.member_id,
            });
        }
        if application.status == LoanStatus::Approved {
            *loans_by_member.entry(application.member_id).or_insert(0) +=
                i128::from(application.amount);
        }
    }

    let mut decisions: HashMap<LoanApplicationId, (usize, usize)> = HashMap::new();
    for record in loan_records {
        if record.amount <= 0 {
            issues.push(IntegrityIssue::NonPositiveAmount {
                record_id: record.id,
                amount: record.amount,
            });
        }
        if let Some(application_id) = record.application_id {
            let entry = decisions.entry(application_id).or_insert((0, 0));
            match record.action {
                LoanAction::Approved => entry.0 += 1,
                LoanAction::Rejected => entry.1 += 1,
                LoanAction::Applied => {}
            }
        }
    }

    for application in applications {
        let (approved, rejected) = decisions.get(&application.id).copied().unwrap_or((0, 0));
        let consistent = match application.status {
            LoanStatus::Pending => approved == 0 && rejected == 0,
            LoanStatus::Approved => approved == 1 && rejected == 0,
            LoanStatus::Rejected => approved == 0 && rejected == 1,
        };
        if !consistent {
            issues.push(IntegrityIssue::DecisionRecords {
                application_id: application.id,
                status: application.status,
                records: approved + rejected,
            });
        }
    }

    for member in members {
        if member.savings_balance < 0 {
            issues.push(IntegrityIssue::NegativeSavings {
                member_id: member.id,
                balance: member.savings_balance,
            });
        }
        if member.loan_balance < 0 {
            issues.push(IntegrityIssue::NegativeLoan {
                member_id: member.id,
                balance: member.loan_balance,
            });
        }

        let from_log = savings_by_member.get(&member.id).copied().unwrap_or(0);
        if from_log != i128::from(member.savings_balance) {
            issues.push(IntegrityIssue::SavingsMismatch {
                member_id: member.id,
                stored: member.savings_balance,
                from_log: clamp_cents(from_log),
            });
        }

        let from_applications = loans_by_member.get(&member.id).copied().unwrap_or(0);
        if from_applications != i128::from(member.loan_balance) {
            issues.push(IntegrityIssue::LoanMismatch {
                member_id: member.id,
                stored: member.loan_balance,
                from_applications: clamp_cents(from_applications),
            });
        }
    }

    IntegrityReport {
        member_count: members.len(),
        savings_record_count: savings.len(),
        loan_record_count: loan_records.len(),
        application_count: applications.len(),
        total_savings: members
            .iter()
            .fold(0, |total: Cents, m| total.saturating_add(m.savings_balance)),
        total_loans: members
            .iter()
            .fold(0, |total: Cents, m| total.saturating_add(m.loan_balance)),
        issues,
    }
}

fn clamp_cents(value: i128) -> Cents {
    Cents::try_from(value).unwrap_or(if value < 0 { Cents::MIN } else { Cents::MAX })
}
