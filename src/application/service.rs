use tracing::{debug, error, info, warn};

use crate::domain::{
    Cents, IntegrityReport, LoanApplication, LoanApplicationId, LoanDecision, LoanTransaction,
    Member, Role, SavingsKind, SavingsTransaction, build_integrity_report, is_plausible_email,
    normalize_email,
};
use crate::identity::{IdentityProvider, LocalIdentityProvider};
use crate::storage::{MAX_BALANCE, Repository, WriteOutcome};

use super::{AppError, Session, WithMember};

/// Application service for the cooperative ledger.
/// This is the primary interface for any client (CLI, API, tests).
pub struct LedgerService {
    repo: Repository,
    identity: Box<dyn IdentityProvider>,
}

/// Result of a deposit or withdrawal
#[derive(Debug, Clone)]
pub struct SavingsResult {
    pub transaction: SavingsTransaction,
    /// Savings balance after the operation
    pub balance: Cents,
    /// True when the request key matched an earlier operation and nothing was applied
    pub replayed: bool,
}

/// Result of a loan application
#[derive(Debug, Clone)]
pub struct LoanApplicationResult {
    pub application: LoanApplication,
    pub replayed: bool,
}

/// Result of approving or rejecting a loan application
#[derive(Debug, Clone)]
pub struct LoanDecisionResult {
    pub application: LoanApplication,
    pub record: LoanTransaction,
    /// The applicant, with balances after the decision
    pub member: Member,
}

impl LedgerService {
    pub fn new(repo: Repository, identity: Box<dyn IdentityProvider>) -> Self {
        Self { repo, identity }
    }

    /// Initialize (or upgrade) the database at the given path.
    pub async fn init(database_path: &str) -> Result<Self, AppError> {
        let db_url = format!("sqlite:{}?mode=rwc", database_path);
        let repo = Repository::init(&db_url).await?;
        Ok(Self::with_local_identity(repo))
    }

    /// Connect to an existing database.
    pub async fn connect(database_path: &str) -> Result<Self, AppError> {
        let db_url = format!("sqlite:{}", database_path);
        let repo = Repository::connect(&db_url).await?;
        Ok(Self::with_local_identity(repo))
    }

    fn with_local_identity(repo: Repository) -> Self {
        let identity = LocalIdentityProvider::new(repo.pool().clone());
        Self::new(repo, Box::new(identity))
    }

    // ========================
    // Identity
    // ========================

    /// Register a new member: credentials with the identity provider, then a
    /// member row with zero balances and the ordinary role.
    pub async fn register(
        &self,
        name: &str,
        email: &str,
        password: &str,
    ) -> Result<Member, AppError> {
        self.create_account(name, email, password, Role::Member).await
    }

    /// Create the first admin account. Refused once any admin exists, so this
    /// can seed a fresh database but never grants admin rights later on. The
    /// store allows a single admin row, so concurrent bootstraps yield one.
    pub async fn bootstrap_admin(
        &self,
        name: &str,
        email: &str,
        password: &str,
    ) -> Result<Member, AppError> {
        if self.repo.has_admin().await? {
            return Err(AppError::AdminOnly);
        }
        self.create_account(name, email, password, Role::Admin).await
    }

    async fn create_account(
        &self,
        name: &str,
        email: &str,
        password: &str,
        role: Role,
    ) -> Result<Member, AppError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(AppError::MissingField("name"));
        }
        let email = normalize_email(email);
        if email.is_empty() {
            return Err(AppError::MissingField("email"));
        }
        if !is_plausible_email(&email) {
            return Err(AppError::InvalidEmail(email));
        }
        if password.is_empty() {
            return Err(AppError::MissingField("password"));
        }

        if self.repo.get_member_by_email(&email).await?.is_some() {
            return Err(AppError::EmailAlreadyRegistered(email));
        }

        // The member row goes first: its unique constraints decide races on
        // the email and on the single admin.
        let member = Member::new(name, &email).with_role(role);
        if let WriteOutcome::Duplicate = self.repo.save_member(&member).await? {
            if role == Role::Admin && self.repo.has_admin().await? {
                warn!(%email, "admin bootstrap lost to an existing admin");
                return Err(AppError::AdminOnly);
            }
            return Err(AppError::EmailAlreadyRegistered(email));
        }

        let auth = match self.identity.sign_up(&email, password).await {
            Ok(auth) => auth,
            Err(e) => {
                match self.repo.delete_unused_member(member.id).await {
                    Ok(_) => debug!(%email, "member row removed after failed sign-up"),
                    Err(cleanup) => {
                        error!(%email, error = %cleanup, "member row left without credentials")
                    }
                }
                return Err(e.into());
            }
        };

        // Registration does not log the member in.
        self.identity.sign_out(&auth.token).await?;

        info!(member_id = %member.id, %email, role = %member.role, "account created");
        Ok(member)
    }

    /// Authenticate and build the request-scoped session. The role comes from
    /// the member row, never from the identity provider.
    pub async fn sign_in(&self, email: &str, password: &str) -> Result<Session, AppError> {
        let auth = self.identity.sign_in(email, password).await?;

        match self.repo.get_member_by_email(&auth.email).await? {
            Some(member) => {
                debug!(member_id = %member.id, "signed in");
                Ok(Session {
                    token: auth.token,
                    member_id: member.id,
                    email: member.email,
                    role: member.role,
                })
            }
            None => {
                self.identity.sign_out(&auth.token).await?;
                Err(AppError::MemberNotFound(auth.email))
            }
        }
    }

    /// Rebuild a session from a token issued by `sign_in`.
    pub async fn resume(&self, token: &str) -> Result<Session, AppError> {
        let auth = self.identity.resolve(token).await?;
        let member = self
            .repo
            .get_member_by_email(&auth.email)
            .await?
            .ok_or_else(|| AppError::MemberNotFound(auth.email.clone()))?;

        Ok(Session {
            token: auth.token,
            member_id: member.id,
            email: member.email,
            role: member.role,
        })
    }

    pub async fn sign_out(&self, session: &Session) -> Result<(), AppError> {
        self.identity.sign_out(&session.token).await?;
        debug!(member_id = %session.member_id, "signed out");
        Ok(())
    }

    pub async fn request_password_reset(&self, email: &str) -> Result<(), AppError> {
        let email = normalize_email(email);
        if email.is_empty() {
            return Err(AppError::MissingField("email"));
        }
        self.identity.send_password_reset(&email).await?;
        Ok(())
    }

    // ========================
    // Member views
    // ========================

    /// The signed-in member with current balances.
    pub async fn dashboard(&self, session: &Session) -> Result<Member, AppError> {
        self.member_for(session).await
    }

    async fn member_for(&self, session: &Session) -> Result<Member, AppError> {
        self.repo
            .get_member(session.member_id)
            .await?
            .ok_or_else(|| AppError::MemberNotFound(session.email.clone()))
    }

    /// Own savings records, newest first.
    pub async fn list_savings_transactions(
        &self,
        session: &Session,
    ) -> Result<Vec<SavingsTransaction>, AppError> {
        Ok(self.repo.list_savings_for_member(session.member_id).await?)
    }

    /// Own loan records, newest first.
    pub async fn list_loan_transactions(
        &self,
        session: &Session,
    ) -> Result<Vec<LoanTransaction>, AppError> {
        Ok(self
            .repo
            .list_loan_records_for_member(session.member_id)
            .await?)
    }

    /// Own loan applications, newest first.
    pub async fn list_loan_applications(
        &self,
        session: &Session,
    ) -> Result<Vec<LoanApplication>, AppError> {
        Ok(self
            .repo
            .list_applications_for_member(session.member_id)
            .await?)
    }

    // ========================
    // Savings operations
    // ========================

    pub async fn deposit(
        &self,
        session: &Session,
        amount: Cents,
        request_key: Option<String>,
    ) -> Result<SavingsResult, AppError> {
        validate_amount(amount)?;
        let request_key = clean_key(request_key);

        if let Some(key) = &request_key {
            if let Some(result) = self
                .replay_savings(session, key, SavingsKind::Deposit, amount)
                .await?
            {
                return Ok(result);
            }
        }

        let member = self.member_for(session).await?;
        check_credit(member.savings_balance, amount)?;

        let record = SavingsTransaction::new(member.id, SavingsKind::Deposit, amount)
            .with_request_key(request_key.clone());

        match self.repo.record_deposit(&record).await? {
            WriteOutcome::Committed(balance) => {
                info!(member_id = %member.id, amount, balance, "deposit recorded");
                Ok(SavingsResult {
                    transaction: record,
                    balance,
                    replayed: false,
                })
            }
            WriteOutcome::Conflict => {
                // Either the row is gone or the balance grew past the limit meanwhile.
                let current = self.member_for(session).await?;
                warn!(member_id = %current.id, amount, balance = current.savings_balance, "deposit refused at balance limit");
                Err(AppError::BalanceLimit {
                    balance: current.savings_balance,
                    amount,
                })
            }
            WriteOutcome::Duplicate => {
                self.replay_after_duplicate(session, request_key, SavingsKind::Deposit, amount)
                    .await
            }
        }
    }

    /// Withdraw from savings. The balance check is enforced by the store inside
    /// the same transaction as the debit, so concurrent withdrawals cannot
    /// overdraw the account.
    pub async fn withdraw(
        &self,
        session: &Session,
        amount: Cents,
        request_key: Option<String>,
    ) -> Result<SavingsResult, AppError> {
        validate_amount(amount)?;
        let request_key = clean_key(request_key);

        if let Some(key) = &request_key {
            if let Some(result) = self
                .replay_savings(session, key, SavingsKind::Withdraw, amount)
                .await?
            {
                return Ok(result);
            }
        }

        let member = self.member_for(session).await?;
        if !member.can_withdraw(amount) {
            warn!(member_id = %member.id, amount, balance = member.savings_balance, "withdrawal refused");
            return Err(AppError::InsufficientFunds {
                balance: member.savings_balance,
                required: amount,
            });
        }

        let record = SavingsTransaction::new(member.id, SavingsKind::Withdraw, amount)
            .with_request_key(request_key.clone());

        match self.repo.record_withdrawal(&record).await? {
            WriteOutcome::Committed(balance) => {
                info!(member_id = %member.id, amount, balance, "withdrawal recorded");
                Ok(SavingsResult {
                    transaction: record,
                    balance,
                    replayed: false,
                })
            }
            WriteOutcome::Conflict => {
                // Balance moved between the read and the guarded debit.
                let current = self.member_for(session).await?;
                warn!(member_id = %member.id, amount, balance = current.savings_balance, "withdrawal lost race");
                Err(AppError::InsufficientFunds {
                    balance: current.savings_balance,
                    required: amount,
                })
            }
            WriteOutcome::Duplicate => {
                self.replay_after_duplicate(session, request_key, SavingsKind::Withdraw, amount)
                    .await
            }
        }
    }

    /// Look up an earlier savings operation by request key. A key reused for a
    /// different operation is a validation error.
    async fn replay_savings(
        &self,
        session: &Session,
        key: &str,
        kind: SavingsKind,
        amount: Cents,
    ) -> Result<Option<SavingsResult>, AppError> {
        let Some(existing) = self.repo.find_savings_by_key(key).await? else {
            return Ok(None);
        };

        if existing.member_id != session.member_id || existing.kind != kind || existing.amount != amount
        {
            return Err(AppError::RequestKeyReused(key.to_string()));
        }

        let member = self.member_for(session).await?;
        warn!(member_id = %member.id, key, "duplicate savings request ignored");
        Ok(Some(SavingsResult {
            transaction: existing,
            balance: member.savings_balance,
            replayed: true,
        }))
    }

    async fn replay_after_duplicate(
        &self,
        session: &Session,
        request_key: Option<String>,
        kind: SavingsKind,
        amount: Cents,
    ) -> Result<SavingsResult, AppError> {
        let key = request_key.ok_or_else(|| {
            AppError::Upstream(anyhow::anyhow!("duplicate savings record without request key"))
        })?;
        self.replay_savings(session, &key, kind, amount)
            .await?
            .ok_or_else(|| {
                AppError::Upstream(anyhow::anyhow!(
                    "request key {} reported taken but not found",
                    key
                ))
            })
    }

    // ========================
    // Loan operations
    // ========================

    /// Submit a loan application. No limit relative to savings is applied.
    pub async fn apply_for_loan(
        &self,
        session: &Session,
        amount: Cents,
        request_key: Option<String>,
    ) -> Result<LoanApplicationResult, AppError> {
        validate_amount(amount)?;
        let request_key = clean_key(request_key);

        if let Some(key) = &request_key {
            if let Some(result) = self.replay_application(session, key, amount).await? {
                return Ok(result);
            }
        }

        let member = self.member_for(session).await?;
        let application =
            LoanApplication::new(member.id, amount).with_request_key(request_key.clone());

        match self.repo.record_loan_application(&application).await? {
            WriteOutcome::Committed(_) => {
                info!(member_id = %member.id, application_id = %application.id, amount, "loan application submitted");
                Ok(LoanApplicationResult {
                    application,
                    replayed: false,
                })
            }
            WriteOutcome::Conflict => Err(AppError::MemberNotFound(session.email.clone())),
            WriteOutcome::Duplicate => {
                let key = request_key.unwrap_or_default();
                self.replay_application(session, &key, amount)
                    .await?
                    .ok_or_else(|| {
                        AppError::Upstream(anyhow::anyhow!(
                            "request key {} reported taken but not found",
                            key
                        ))
                    })
            }
        }
    }

    async fn replay_application(
        &self,
        session: &Session,
        key: &str,
        amount: Cents,
    ) -> Result<Option<LoanApplicationResult>, AppError> {
        let Some(existing) = self.repo.find_application_by_key(key).await? else {
            return Ok(None);
        };

        if existing.member_id != session.member_id || existing.amount != amount {
            return Err(AppError::RequestKeyReused(key.to_string()));
        }

        warn!(member_id = %session.member_id, key, "duplicate loan application ignored");
        Ok(Some(LoanApplicationResult {
            application: existing,
            replayed: true,
        }))
    }

    /// Approve a pending application and credit the applicant's loan balance.
    pub async fn approve_loan(
        &self,
        session: &Session,
        application_id: LoanApplicationId,
    ) -> Result<LoanDecisionResult, AppError> {
        self.decide_loan(session, application_id, LoanDecision::Approve)
            .await
    }

    /// Reject a pending application. Balances are untouched.
    pub async fn reject_loan(
        &self,
        session: &Session,
        application_id: LoanApplicationId,
    ) -> Result<LoanDecisionResult, AppError> {
        self.decide_loan(session, application_id, LoanDecision::Reject)
            .await
    }

    async fn decide_loan(
        &self,
        session: &Session,
        application_id: LoanApplicationId,
        decision: LoanDecision,
    ) -> Result<LoanDecisionResult, AppError> {
        session.require_admin()?;

        let mut application = self.get_loan_application(application_id).await?;
        application.decide(decision).map_err(|e| {
            warn!(application_id = %e.id, status = %e.current, "loan already decided");
            AppError::LoanNotPending {
                id: e.id.to_string(),
                status: e.current,
            }
        })?;

        if decision == LoanDecision::Approve {
            let applicant = self.applicant(&application).await?;
            check_credit(applicant.loan_balance, application.amount)?;
        }

        match self.repo.record_loan_decision(&application, decision).await? {
            WriteOutcome::Committed(record) => {
                let member = self.applicant(&application).await?;

                info!(
                    application_id = %application.id,
                    member_id = %member.id,
                    status = %application.status,
                    amount = application.amount,
                    loan_balance = member.loan_balance,
                    admin = %session.email,
                    "loan application decided"
                );
                Ok(LoanDecisionResult {
                    application,
                    record,
                    member,
                })
            }
            WriteOutcome::Conflict | WriteOutcome::Duplicate => {
                // Someone else settled it first, the applicant is gone, or the
                // credit would pass the balance limit.
                let current = self.get_loan_application(application_id).await?;
                if current.status.is_terminal() {
                    warn!(application_id = %current.id, status = %current.status, "loan decided concurrently");
                    return Err(AppError::LoanNotPending {
                        id: current.id.to_string(),
                        status: current.status,
                    });
                }
                let applicant = self.applicant(&current).await?;
                warn!(application_id = %current.id, loan_balance = applicant.loan_balance, "approval refused at balance limit");
                Err(AppError::BalanceLimit {
                    balance: applicant.loan_balance,
                    amount: current.amount,
                })
            }
        }
    }

    async fn applicant(&self, application: &LoanApplication) -> Result<Member, AppError> {
        self.repo
            .get_member(application.member_id)
            .await?
            .ok_or_else(|| AppError::MemberNotFound(application.member_id.to_string()))
    }

    pub async fn get_loan_application(
        &self,
        application_id: LoanApplicationId,
    ) -> Result<LoanApplication, AppError> {
        self.repo
            .get_loan_application(application_id)
            .await?
            .ok_or_else(|| AppError::LoanApplicationNotFound(application_id.to_string()))
    }

    // ========================
    // Admin views
    // ========================

    pub async fn list_members(&self, session: &Session) -> Result<Vec<Member>, AppError> {
        session.require_admin()?;
        Ok(self.repo.list_members().await?)
    }

    pub async fn list_all_loan_applications(
        &self,
        session: &Session,
    ) -> Result<Vec<WithMember<LoanApplication>>, AppError> {
        session.require_admin()?;
        Ok(self.repo.list_all_applications().await?)
    }

    pub async fn list_all_savings_transactions(
        &self,
        session: &Session,
    ) -> Result<Vec<WithMember<SavingsTransaction>>, AppError> {
        session.require_admin()?;
        Ok(self.repo.list_all_savings().await?)
    }

    pub async fn list_all_loan_transactions(
        &self,
        session: &Session,
    ) -> Result<Vec<WithMember<LoanTransaction>>, AppError> {
        session.require_admin()?;
        Ok(self.repo.list_all_loan_records().await?)
    }

    /// Reconcile stored balances against the savings and loan logs.
    pub async fn check_integrity(&self, session: &Session) -> Result<IntegrityReport, AppError> {
        session.require_admin()?;

        let snapshot = self.repo.ledger_snapshot().await?;
        let report = build_integrity_report(
            &snapshot.members,
            &snapshot.savings,
            &snapshot.applications,
            &snapshot.loan_records,
        );
        if !report.is_healthy() {
            warn!(issues = report.issues.len(), "ledger integrity issues found");
        }
        Ok(report)
    }
}

fn validate_amount(amount: Cents) -> Result<(), AppError> {
    if amount <= 0 {
        return Err(AppError::InvalidAmount(
            "Amount must be greater than zero".to_string(),
        ));
    }
    Ok(())
}

/// Refuse a credit that would push a stored balance past `MAX_BALANCE`.
fn check_credit(balance: Cents, amount: Cents) -> Result<(), AppError> {
    match balance.checked_add(amount) {
        Some(total) if total <= MAX_BALANCE => Ok(()),
        _ => Err(AppError::BalanceLimit { balance, amount }),
    }
}

fn clean_key(key: Option<String>) -> Option<String> {
    key.map(|k| k.trim().to_string()).filter(|k| !k.is_empty())
}
