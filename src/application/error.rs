use thiserror::Error;

use crate::domain::{Cents, LoanStatus, format_naira};
use crate::identity::IdentityError;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    #[error("Invalid email address: {0}")]
    InvalidEmail(String),

    #[error("Request key already used for a different operation: {0}")]
    RequestKeyReused(String),

    #[error("Insufficient savings balance: have {}, need {}", naira(.balance), naira(.required))]
    InsufficientFunds { balance: Cents, required: Cents },

    #[error("Amount {} would take the balance of {} past the maximum", naira(.amount), naira(.balance))]
    BalanceLimit { balance: Cents, amount: Cents },

    #[error("Member not found: {0}")]
    MemberNotFound(String),

    #[error("Loan application not found: {0}")]
    LoanApplicationNotFound(String),

    #[error("Loan application {id} is already {status}")]
    LoanNotPending { id: String, status: LoanStatus },

    #[error("Invalid email or password")]
    InvalidCredentials,

    #[error("Email already registered: {0}")]
    EmailAlreadyRegistered(String),

    #[error("Password must be at least {0} characters")]
    WeakPassword(usize),

    #[error("Not signed in")]
    NotAuthenticated,

    #[error("Admin access only")]
    AdminOnly,

    #[error("Service unavailable: {0}")]
    Upstream(#[from] anyhow::Error),
}

fn naira(cents: &Cents) -> String {
    format_naira(*cents)
}

/// Coarse classification of `AppError`, for callers that react to the class of
/// failure rather than the exact variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    InsufficientFunds,
    NotFound,
    InvalidState,
    Auth,
    Upstream,
}

impl AppError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AppError::InvalidAmount(_)
            | AppError::MissingField(_)
            | AppError::InvalidEmail(_)
            | AppError::RequestKeyReused(_)
            | AppError::BalanceLimit { .. } => ErrorKind::Validation,
            AppError::InsufficientFunds { .. } => ErrorKind::InsufficientFunds,
            AppError::MemberNotFound(_) | AppError::LoanApplicationNotFound(_) => {
                ErrorKind::NotFound
            }
            AppError::LoanNotPending { .. } => ErrorKind::InvalidState,
            AppError::InvalidCredentials
            | AppError::EmailAlreadyRegistered(_)
            | AppError::WeakPassword(_)
            | AppError::NotAuthenticated
            | AppError::AdminOnly => ErrorKind::Auth,
            AppError::Upstream(_) => ErrorKind::Upstream,
        }
    }
}

impl From<IdentityError> for AppError {
    fn from(e: IdentityError) -> Self {
        match e {
            IdentityError::InvalidCredentials => AppError::InvalidCredentials,
            IdentityError::EmailTaken(email) => AppError::EmailAlreadyRegistered(email),
            IdentityError::WeakPassword(min) => AppError::WeakPassword(min),
            IdentityError::UnknownSession => AppError::NotAuthenticated,
            IdentityError::Backend(e) => AppError::Upstream(e),
        }
    }
}
