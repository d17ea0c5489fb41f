use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode};
use sqlx::{Row, SqliteConnection, SqlitePool};
use std::time::Duration;
use uuid::Uuid;

use crate::application::WithMember;
use crate::domain::{
    Cents, LoanAction, LoanApplication, LoanApplicationId, LoanDecision, LoanStatus,
    LoanTransaction, Member, MemberId, Role, SavingsKind, SavingsTransaction,
};

use super::{MIGRATION_001_INITIAL, MIGRATION_002_IDENTITY};

const SAVINGS_COLUMNS: &str =
    "s.id AS id, s.member_id AS member_id, s.transaction_type AS transaction_type, s.amount AS amount, s.created_at AS created_at, s.request_key AS request_key";
const APPLICATION_COLUMNS: &str =
    "a.id AS id, a.member_id AS member_id, a.amount AS amount, a.status AS status, a.created_at AS created_at, a.decided_at AS decided_at, a.request_key AS request_key";
const LOAN_RECORD_COLUMNS: &str =
    "l.id AS id, l.member_id AS member_id, l.loan_application_id AS loan_application_id, l.action AS action, l.amount AS amount, l.created_at AS created_at";

const BUSY_TIMEOUT: Duration = Duration::from_secs(10);

/// Largest balance a member row can hold. Credits that would pass it are
/// refused so the INTEGER columns never spill into REAL.
pub const MAX_BALANCE: Cents = Cents::MAX;

/// Members and all ledger rows read inside one database transaction.
#[derive(Debug, Clone, Default)]
pub struct LedgerSnapshot {
    pub members: Vec<Member>,
    pub savings: Vec<SavingsTransaction>,
    pub applications: Vec<LoanApplication>,
    pub loan_records: Vec<LoanTransaction>,
}

/// Outcome of a guarded ledger write. Anything other than `Committed` means the
/// whole database transaction was rolled back and nothing changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOutcome<T> {
    Committed(T),
    /// The guard did not hold: funds ran out, the balance would pass
    /// `MAX_BALANCE`, the application was no longer pending, or the target row
    /// is gone.
    Conflict,
    /// The request key was already used by an earlier write.
    Duplicate,
}

/// Persistence for members, savings and loan ledgers.
///
/// Every balance-changing method runs in one SQLite transaction whose first
/// statement is the guarded write, so concurrent requests against the same
/// member are serialized by the database.
#[derive(Clone)]
pub struct Repository {
    pool: SqlitePool,
}

impl Repository {
    /// Create a new repository with the given SQLite connection pool.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Connect to a SQLite database. Writers queue on the WAL lock for up to
    /// `BUSY_TIMEOUT` instead of failing immediately.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let options = database_url
            .parse::<SqliteConnectOptions>()
            .context("Invalid database URL")?
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(BUSY_TIMEOUT);
        let pool = SqlitePool::connect_with(options)
            .await
            .context("Failed to connect to database")?;
        Ok(Self::new(pool))
    }

    /// Run database migrations. Safe to run more than once.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::query(MIGRATION_001_INITIAL)
            .execute(&self.pool)
            .await
            .context("Failed to run migration 001")?;

        sqlx::query(MIGRATION_002_IDENTITY)
            .execute(&self.pool)
            .await
            .context("Failed to run migration 002")?;

        Ok(())
    }

    /// Initialize a new database (connect + migrate).
    pub async fn init(database_url: &str) -> Result<Self> {
        let repo = Self::connect(database_url).await?;
        repo.migrate().await?;
        Ok(repo)
    }

    /// The underlying pool, shared with the local identity provider.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    // ========================
    // Member operations
    // ========================

    /// Insert a member row. `Duplicate` when the email is taken or, for an
    /// admin, when an admin already exists.
    pub async fn save_member(&self, member: &Member) -> Result<WriteOutcome<()>> {
        let inserted = sqlx::query(
            r#"
            INSERT INTO members (id, name, email, role, savings_balance, loan_balance, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(member.id.to_string())
        .bind(&member.name)
        .bind(&member.email)
        .bind(member.role.as_str())
        .bind(member.savings_balance)
        .bind(member.loan_balance)
        .bind(member.created_at.to_rfc3339())
        .execute(&self.pool)
        .await;

        match inserted {
            Ok(_) => Ok(WriteOutcome::Committed(())),
            Err(e) if is_unique_violation(&e) => Ok(WriteOutcome::Duplicate),
            Err(e) => Err(e).context("Failed to save member"),
        }
    }

    /// Remove a member row that has no ledger history yet. Used to undo a
    /// registration whose credentials could not be stored.
    pub async fn delete_unused_member(&self, id: MemberId) -> Result<bool> {
        let deleted = sqlx::query(
            r#"
            DELETE FROM members
            WHERE id = ?
              AND NOT EXISTS (SELECT 1 FROM savings_transactions WHERE member_id = members.id)
              AND NOT EXISTS (SELECT 1 FROM loan_applications WHERE member_id = members.id)
            "#,
        )
        .bind(id.to_string())
        .execute(&self.pool)
        .await
        .context("Failed to delete member")?;
        Ok(deleted.rows_affected() > 0)
    }

    pub async fn get_member(&self, id: MemberId) -> Result<Option<Member>> {
        let row = sqlx::query(
            r#"
            SELECT id, name, email, role, savings_balance, loan_balance, created_at
            FROM members
            WHERE id = ?
            "#,
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch member")?;

        row.as_ref().map(Self::row_to_member).transpose()
    }

    pub async fn get_member_by_email(&self, email: &str) -> Result<Option<Member>> {
        let row = sqlx::query(
            r#"
            SELECT id, name, email, role, savings_balance, loan_balance, created_at
            FROM members
            WHERE email = ?
            "#,
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch member by email")?;

        row.as_ref().map(Self::row_to_member).transpose()
    }

    pub async fn list_members(&self) -> Result<Vec<Member>> {
        let mut conn = self.pool.acquire().await.context("Failed to acquire connection")?;
        Self::fetch_members(&mut conn).await
    }

    async fn fetch_members(conn: &mut SqliteConnection) -> Result<Vec<Member>> {
        let rows = sqlx::query(
            r#"
            SELECT id, name, email, role, savings_balance, loan_balance, created_at
            FROM members
            ORDER BY name, email
            "#,
        )
        .fetch_all(&mut *conn)
        .await
        .context("Failed to list members")?;

        rows.iter().map(Self::row_to_member).collect()
    }

    /// Read members and every ledger in one transaction, so the parts agree
    /// with each other even while writers are active.
    pub async fn ledger_snapshot(&self) -> Result<LedgerSnapshot> {
        let mut tx = self.pool.begin().await.context("Failed to begin snapshot")?;

        let members = Self::fetch_members(&mut tx).await?;
        let savings = Self::fetch_all_savings(&mut tx).await?;
        let applications = Self::fetch_all_applications(&mut tx).await?;
        let loan_records = Self::fetch_all_loan_records(&mut tx).await?;

        tx.commit().await.context("Failed to end snapshot")?;

        Ok(LedgerSnapshot {
            members,
            savings: savings.into_iter().map(|entry| entry.record).collect(),
            applications: applications.into_iter().map(|entry| entry.record).collect(),
            loan_records: loan_records.into_iter().map(|entry| entry.record).collect(),
        })
    }

    pub async fn has_admin(&self) -> Result<bool> {
        let row = sqlx::query("SELECT COUNT(*) AS count FROM members WHERE role = ?")
            .bind(Role::Admin.as_str())
            .fetch_one(&self.pool)
            .await
            .context("Failed to count admins")?;

        Ok(row.try_get::<i64, _>("count")? > 0)
    }

    fn row_to_member(row: &sqlx::sqlite::SqliteRow) -> Result<Member> {
        let id_str: String = row.try_get("id")?;
        let role_str: String = row.try_get("role")?;
        let created_at_str: String = row.try_get("created_at")?;

        Ok(Member {
            id: Uuid::parse_str(&id_str).context("Invalid member ID")?,
            name: row.try_get("name")?,
            email: row.try_get("email")?,
            role: Role::from_str(&role_str)
                .ok_or_else(|| anyhow::anyhow!("Invalid role: {}", role_str))?,
            savings_balance: row
                .try_get("savings_balance")
                .context("Invalid savings balance")?,
            loan_balance: row.try_get("loan_balance").context("Invalid loan balance")?,
            created_at: parse_timestamp(&created_at_str).context("Invalid created_at timestamp")?,
        })
    }

    // ========================
    // Savings ledger
    // ========================

    /// Credit savings and append the Deposit record in one transaction.
    /// Returns the new savings balance. `Conflict` when the member is gone or
    /// the credit would pass `MAX_BALANCE`.
    pub async fn record_deposit(&self, record: &SavingsTransaction) -> Result<WriteOutcome<Cents>> {
        let mut tx = self.pool.begin().await.context("Failed to begin deposit")?;

        let row = sqlx::query(
            r#"
            UPDATE members
            SET savings_balance = savings_balance + ?
            WHERE id = ? AND savings_balance <= ? - ?
            RETURNING savings_balance
            "#,
        )
        .bind(record.amount)
        .bind(record.member_id.to_string())
        .bind(MAX_BALANCE)
        .bind(record.amount)
        .fetch_optional(&mut *tx)
        .await
        .context("Failed to credit savings")?;

        let Some(row) = row else {
            return Ok(WriteOutcome::Conflict);
        };
        let balance: Cents = row
            .try_get("savings_balance")
            .context("Invalid savings balance")?;

        if !Self::insert_savings(&mut tx, record).await? {
            return Ok(WriteOutcome::Duplicate);
        }

        tx.commit().await.context("Failed to commit deposit")?;
        Ok(WriteOutcome::Committed(balance))
    }

    /// Debit savings only if the balance covers the amount, and append the
    /// Withdraw record, in one transaction. Returns the new savings balance.
    pub async fn record_withdrawal(
        &self,
        record: &SavingsTransaction,
    ) -> Result<WriteOutcome<Cents>> {
        let mut tx = self
            .pool
            .begin()
            .await
            .context("Failed to begin withdrawal")?;

        let row = sqlx::query(
            r#"
            UPDATE members
            SET savings_balance = savings_balance - ?
            WHERE id = ? AND savings_balance >= ?
            RETURNING savings_balance
            "#,
        )
        .bind(record.amount)
        .bind(record.member_id.to_string())
        .bind(record.amount)
        .fetch_optional(&mut *tx)
        .await
        .context("Failed to debit savings")?;

        let Some(row) = row else {
            return Ok(WriteOutcome::Conflict);
        };
        let balance: Cents = row
            .try_get("savings_balance")
            .context("Invalid savings balance")?;

        if !Self::insert_savings(&mut tx, record).await? {
            return Ok(WriteOutcome::Duplicate);
        }

        tx.commit().await.context("Failed to commit withdrawal")?;
        Ok(WriteOutcome::Committed(balance))
    }

    /// Returns false when the request key is already taken.
    async fn insert_savings(
        tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
        record: &SavingsTransaction,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO savings_transactions (id, member_id, transaction_type, amount, created_at, request_key)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(record.id.to_string())
        .bind(record.member_id.to_string())
        .bind(record.kind.as_str())
        .bind(record.amount)
        .bind(record.created_at.to_rfc3339())
        .bind(&record.request_key)
        .execute(&mut **tx)
        .await;

        match result {
            Ok(_) => Ok(true),
            Err(e) if is_unique_violation(&e) => Ok(false),
            Err(e) => Err(e).context("Failed to append savings record"),
        }
    }

    pub async fn find_savings_by_key(&self, key: &str) -> Result<Option<SavingsTransaction>> {
        let query = format!(
            "SELECT {} FROM savings_transactions s WHERE s.request_key = ?",
            SAVINGS_COLUMNS
        );
        let row = sqlx::query(&query)
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to fetch savings record by key")?;

        row.as_ref().map(Self::row_to_savings).transpose()
    }

    /// A member's savings records, newest first.
    pub async fn list_savings_for_member(
        &self,
        member_id: MemberId,
    ) -> Result<Vec<SavingsTransaction>> {
        let query = format!(
            "SELECT {} FROM savings_transactions s WHERE s.member_id = ? ORDER BY s.created_at DESC, s.rowid DESC",
            SAVINGS_COLUMNS
        );
        let rows = sqlx::query(&query)
            .bind(member_id.to_string())
            .fetch_all(&self.pool)
            .await
            .context("Failed to list savings records")?;

        rows.iter().map(Self::row_to_savings).collect()
    }

    /// Every savings record with the owning member's name and email, newest first.
    pub async fn list_all_savings(&self) -> Result<Vec<WithMember<SavingsTransaction>>> {
        let mut conn = self.pool.acquire().await.context("Failed to acquire connection")?;
        Self::fetch_all_savings(&mut conn).await
    }

    async fn fetch_all_savings(
        conn: &mut SqliteConnection,
    ) -> Result<Vec<WithMember<SavingsTransaction>>> {
        let query = format!(
            r#"
            SELECT {}, COALESCE(m.name, '') AS member_name, COALESCE(m.email, '') AS member_email
            FROM savings_transactions s
            LEFT JOIN members m ON m.id = s.member_id
            ORDER BY s.created_at DESC, s.rowid DESC
            "#,
            SAVINGS_COLUMNS
        );
        let rows = sqlx::query(&query)
            .fetch_all(&mut *conn)
            .await
            .context("Failed to list all savings records")?;

        rows.iter()
            .map(|row| Self::with_member(row, Self::row_to_savings(row)?))
            .collect()
    }

    fn row_to_savings(row: &sqlx::sqlite::SqliteRow) -> Result<SavingsTransaction> {
        let id_str: String = row.get("id");
        let member_id_str: String = row.get("member_id");
        let kind_str: String = row.get("transaction_type");
        let created_at_str: String = row.get("created_at");

        Ok(SavingsTransaction {
            id: Uuid::parse_str(&id_str).context("Invalid savings record ID")?,
            member_id: Uuid::parse_str(&member_id_str).context("Invalid member ID")?,
            kind: SavingsKind::from_str(&kind_str)
                .ok_or_else(|| anyhow::anyhow!("Invalid transaction type: {}", kind_str))?,
            amount: row.get("amount"),
            created_at: parse_timestamp(&created_at_str).context("Invalid created_at timestamp")?,
            request_key: row.get("request_key"),
        })
    }

    // ========================
    // Loan ledger
    // ========================

    /// Store a new Pending application together with its Applied record.
    pub async fn record_loan_application(
        &self,
        application: &LoanApplication,
    ) -> Result<WriteOutcome<LoanTransaction>> {
        let mut tx = self
            .pool
            .begin()
            .await
            .context("Failed to begin loan application")?;

        let inserted = sqlx::query(
            r#"
            INSERT INTO loan_applications (id, member_id, amount, status, created_at, decided_at, request_key)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(application.id.to_string())
        .bind(application.member_id.to_string())
        .bind(application.amount)
        .bind(application.status.as_str())
        .bind(application.created_at.to_rfc3339())
        .bind(application.decided_at.map(|dt| dt.to_rfc3339()))
        .bind(&application.request_key)
        .execute(&mut *tx)
        .await;

        match inserted {
            Ok(_) => {}
            Err(e) if is_unique_violation(&e) => return Ok(WriteOutcome::Duplicate),
            Err(e) => return Err(e).context("Failed to save loan application"),
        }

        let record = LoanTransaction::for_application(application, LoanAction::Applied);
        Self::insert_loan_record(&mut tx, &record).await?;

        tx.commit().await.context("Failed to commit loan application")?;
        Ok(WriteOutcome::Committed(record))
    }

    /// Move a Pending application to the decided status, credit the loan balance
    /// on approval, and append the decision record, all in one transaction.
    ///
    /// `application` carries the target status already; the stored row must
    /// still be Pending, and an approval must not push the loan balance past
    /// `MAX_BALANCE`, or the outcome is `Conflict`.
    pub async fn record_loan_decision(
        &self,
        application: &LoanApplication,
        decision: LoanDecision,
    ) -> Result<WriteOutcome<LoanTransaction>> {
        let mut tx = self
            .pool
            .begin()
            .await
            .context("Failed to begin loan decision")?;

        let updated = sqlx::query(
            r#"
            UPDATE loan_applications
            SET status = ?, decided_at = ?
            WHERE id = ? AND status = ?
            "#,
        )
        .bind(decision.target_status().as_str())
        .bind(application.decided_at.unwrap_or_else(Utc::now).to_rfc3339())
        .bind(application.id.to_string())
        .bind(LoanStatus::Pending.as_str())
        .execute(&mut *tx)
        .await
        .context("Failed to update loan application status")?;

        if updated.rows_affected() == 0 {
            return Ok(WriteOutcome::Conflict);
        }

        if decision == LoanDecision::Approve {
            let credited = sqlx::query(
                r#"
                UPDATE members
                SET loan_balance = loan_balance + ?
                WHERE id = ? AND loan_balance <= ? - ?
                "#,
            )
            .bind(application.amount)
            .bind(application.member_id.to_string())
            .bind(MAX_BALANCE)
            .bind(application.amount)
            .execute(&mut *tx)
            .await
            .context("Failed to credit loan balance")?;

            if credited.rows_affected() == 0 {
                return Ok(WriteOutcome::Conflict);
            }
        }

        let record = LoanTransaction::for_application(application, decision.action());
        Self::insert_loan_record(&mut tx, &record).await?;

        tx.commit().await.context("Failed to commit loan decision")?;
        Ok(WriteOutcome::Committed(record))
    }

    async fn insert_loan_record(
        tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
        record: &LoanTransaction,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO loan_transactions (id, member_id, loan_application_id, action, amount, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(record.id.to_string())
        .bind(record.member_id.to_string())
        .bind(record.application_id.map(|id| id.to_string()))
        .bind(record.action.as_str())
        .bind(record.amount)
        .bind(record.created_at.to_rfc3339())
        .execute(&mut **tx)
        .await
        .context("Failed to append loan record")?;
        Ok(())
    }

    pub async fn get_loan_application(
        &self,
        id: LoanApplicationId,
    ) -> Result<Option<LoanApplication>> {
        let query = format!(
            "SELECT {} FROM loan_applications a WHERE a.id = ?",
            APPLICATION_COLUMNS
        );
        let row = sqlx::query(&query)
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .context("Failed to fetch loan application")?;

        row.as_ref().map(Self::row_to_application).transpose()
    }

    pub async fn find_application_by_key(&self, key: &str) -> Result<Option<LoanApplication>> {
        let query = format!(
            "SELECT {} FROM loan_applications a WHERE a.request_key = ?",
            APPLICATION_COLUMNS
        );
        let row = sqlx::query(&query)
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to fetch loan application by key")?;

        row.as_ref().map(Self::row_to_application).transpose()
    }

    /// A member's applications, newest first.
    pub async fn list_applications_for_member(
        &self,
        member_id: MemberId,
    ) -> Result<Vec<LoanApplication>> {
        let query = format!(
            "SELECT {} FROM loan_applications a WHERE a.member_id = ? ORDER BY a.created_at DESC, a.rowid DESC",
            APPLICATION_COLUMNS
        );
        let rows = sqlx::query(&query)
            .bind(member_id.to_string())
            .fetch_all(&self.pool)
            .await
            .context("Failed to list loan applications")?;

        rows.iter().map(Self::row_to_application).collect()
    }

    /// Every application with the applicant's name and email, newest first.
    pub async fn list_all_applications(&self) -> Result<Vec<WithMember<LoanApplication>>> {
        let mut conn = self.pool.acquire().await.context("Failed to acquire connection")?;
        Self::fetch_all_applications(&mut conn).await
    }

    async fn fetch_all_applications(
        conn: &mut SqliteConnection,
    ) -> Result<Vec<WithMember<LoanApplication>>> {
        let query = format!(
            r#"
            SELECT {}, COALESCE(m.name, '') AS member_name, COALESCE(m.email, '') AS member_email
            FROM loan_applications a
            LEFT JOIN members m ON m.id = a.member_id
            ORDER BY a.created_at DESC, a.rowid DESC
            "#,
            APPLICATION_COLUMNS
        );
        let rows = sqlx::query(&query)
            .fetch_all(&mut *conn)
            .await
            .context("Failed to list all loan applications")?;

        rows.iter()
            .map(|row| Self::with_member(row, Self::row_to_application(row)?))
            .collect()
    }

    /// A member's loan records, newest first.
    pub async fn list_loan_records_for_member(
        &self,
        member_id: MemberId,
    ) -> Result<Vec<LoanTransaction>> {
        let query = format!(
            "SELECT {} FROM loan_transactions l WHERE l.member_id = ? ORDER BY l.created_at DESC, l.rowid DESC",
            LOAN_RECORD_COLUMNS
        );
        let rows = sqlx::query(&query)
            .bind(member_id.to_string())
            .fetch_all(&self.pool)
            .await
            .context("Failed to list loan records")?;

        rows.iter().map(Self::row_to_loan_record).collect()
    }

    /// Every loan record with the member's name and email, newest first.
    pub async fn list_all_loan_records(&self) -> Result<Vec<WithMember<LoanTransaction>>> {
        let mut conn = self.pool.acquire().await.context("Failed to acquire connection")?;
        Self::fetch_all_loan_records(&mut conn).await
    }

    async fn fetch_all_loan_records(
        conn: &mut SqliteConnection,
    ) -> Result<Vec<WithMember<LoanTransaction>>> {
        let query = format!(
            r#"
            SELECT {}, COALESCE(m.name, '') AS member_name, COALESCE(m.email, '') AS member_email
            FROM loan_transactions l
            LEFT JOIN members m ON m.id = l.member_id
            ORDER BY l.created_at DESC, l.rowid DESC
            "#,
            LOAN_RECORD_COLUMNS
        );
        let rows = sqlx::query(&query)
            .fetch_all(&mut *conn)
            .await
            .context("Failed to list all loan records")?;

        rows.iter()
            .map(|row| Self::with_member(row, Self::row_to_loan_record(row)?))
            .collect()
    }

    fn row_to_application(row: &sqlx::sqlite::SqliteRow) -> Result<LoanApplication> {
        let id_str: String = row.get("id");
        let member_id_str: String = row.get("member_id");
        let status_str: String = row.get("status");
        let created_at_str: String = row.get("created_at");
        let decided_at_str: Option<String> = row.get("decided_at");

        Ok(LoanApplication {
            id: Uuid::parse_str(&id_str).context("Invalid loan application ID")?,
            member_id: Uuid::parse_str(&member_id_str).context("Invalid member ID")?,
            amount: row.get("amount"),
            status: LoanStatus::from_str(&status_str)
                .ok_or_else(|| anyhow::anyhow!("Invalid loan status: {}", status_str))?,
            created_at: parse_timestamp(&created_at_str).context("Invalid created_at timestamp")?,
            decided_at: decided_at_str
                .map(|s| parse_timestamp(&s))
                .transpose()
                .context("Invalid decided_at timestamp")?,
            request_key: row.get("request_key"),
        })
    }

    fn row_to_loan_record(row: &sqlx::sqlite::SqliteRow) -> Result<LoanTransaction> {
        let id_str: String = row.get("id");
        let member_id_str: String = row.get("member_id");
        let application_str: Option<String> = row.get("loan_application_id");
        let action_str: String = row.get("action");
        let created_at_str: String = row.get("created_at");

        Ok(LoanTransaction {
            id: Uuid::parse_str(&id_str).context("Invalid loan record ID")?,
            member_id: Uuid::parse_str(&member_id_str).context("Invalid member ID")?,
            application_id: application_str
                .map(|s| Uuid::parse_str(&s))
                .transpose()
                .context("Invalid loan application ID")?,
            action: LoanAction::from_str(&action_str)
                .ok_or_else(|| anyhow::anyhow!("Invalid loan action: {}", action_str))?,
            amount: row.get("amount"),
            created_at: parse_timestamp(&created_at_str).context("Invalid created_at timestamp")?,
        })
    }

    fn with_member<T>(row: &sqlx::sqlite::SqliteRow, record: T) -> Result<WithMember<T>> {
        Ok(WithMember {
            record,
            member_name: row.get("member_name"),
            member_email: row.get("member_email"),
        })
    }
}

fn parse_timestamp(s: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(s)?.with_timezone(&Utc))
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_unique_violation())
}
