use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use uuid::Uuid;

use crate::application::{LedgerService, Session};
use crate::domain::{format_naira, parse_cents};

/// Cooperative savings and loan ledger
#[derive(Parser)]
#[command(name = "coopledger")]
#[command(about = "Member savings, loan applications and admin approvals for a cooperative society")]
#[command(version)]
pub struct Cli {
    /// Database file path
    #[arg(short, long, env = "COOP_DATABASE", default_value = "coop.db")]
    pub database: String,

    /// Email to sign in with
    #[arg(long, env = "COOP_EMAIL", global = true)]
    pub email: Option<String>,

    /// Password to sign in with
    #[arg(long, env = "COOP_PASSWORD", global = true, hide_env_values = true)]
    pub password: Option<String>,

    /// Cooperative name shown in headings
    #[arg(long, env = "COOP_NAME", default_value = "Cooperative Society")]
    pub coop_name: String,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize the database, optionally creating the first admin
    Init {
        /// Name of the first admin; needs --admin-email and --admin-password
        #[arg(long, requires_all = ["admin_email", "admin_password"])]
        admin_name: Option<String>,

        /// Email of the first admin
        #[arg(long, requires_all = ["admin_name", "admin_password"])]
        admin_email: Option<String>,

        /// Password of the first admin
        #[arg(long, requires_all = ["admin_name", "admin_email"])]
        admin_password: Option<String>,
    },

    /// Register a new member account
    Register {
        /// Full name
        #[arg(long)]
        name: String,
    },

    /// Request a password reset for the given --email
    ResetPassword,

    /// Show balances for the signed-in member
    Dashboard,

    /// Deposit into savings
    Deposit {
        /// Amount (e.g. "5000" or "5,000.00")
        amount: String,

        /// Idempotency key; resubmitting with the same key applies nothing twice
        #[arg(long)]
        key: Option<String>,
    },

    /// Withdraw from savings
    Withdraw {
        /// Amount (e.g. "5000" or "5,000.00")
        amount: String,

        /// Idempotency key; resubmitting with the same key applies nothing twice
        #[arg(long)]
        key: Option<String>,
    },

    /// Loan applications
    #[command(subcommand)]
    Loan(LoanCommands),

    /// Own transaction history, newest first
    History {
        #[arg(value_enum)]
        kind: LedgerKind,
    },

    /// Admin views across all members
    #[command(subcommand)]
    Admin(AdminCommands),

    /// Export all records (admin only)
    Export {
        #[arg(value_enum)]
        kind: ExportKind,

        /// Output file (stdout if omitted)
        #[arg(short, long)]
        output: Option<String>,

        /// Output format
        #[arg(short, long, value_enum, default_value = "csv")]
        format: ExportFormat,
    },

    /// Reconcile balances against the transaction logs (admin only)
    Check,
}

#[derive(Subcommand)]
pub enum LoanCommands {
    /// Apply for a loan
    Apply {
        /// Amount (e.g. "20000")
        amount: String,

        /// Idempotency key; resubmitting with the same key applies nothing twice
        #[arg(long)]
        key: Option<String>,
    },

    /// List own loan applications
    List,

    /// Approve a pending application (admin only)
    Approve {
        /// Application ID
        id: String,
    },

    /// Reject a pending application (admin only)
    Reject {
        /// Application ID
        id: String,
    },
}

#[derive(Subcommand)]
pub enum AdminCommands {
    /// List all members with balances
    Members,
    /// List all loan applications
    Applications,
    /// List all savings transactions
    Savings,
    /// List all loan transactions
    Loans,
}

#[derive(Clone, Copy, ValueEnum)]
pub enum LedgerKind {
    Savings,
    Loans,
}

#[derive(Clone, Copy, ValueEnum)]
pub enum ExportKind {
    Savings,
    Loans,
    Applications,
}

#[derive(Clone, Copy, ValueEnum)]
pub enum ExportFormat {
    Csv,
    Json,
}

impl Cli {
    pub async fn run(self) -> Result<()> {
        match &self.command {
            Commands::Init {
                admin_name,
                admin_email,
                admin_password,
            } => {
                let service = LedgerService::init(&self.database).await?;
                println!("Database initialized: {}", self.database);

                if let (Some(name), Some(email), Some(password)) =
                    (admin_name, admin_email, admin_password)
                {
                    let admin = service.bootstrap_admin(name, email, password).await?;
                    println!("Created admin: {} <{}>", admin.name, admin.email);
                }
                return Ok(());
            }

            Commands::Register { name } => {
                let service = LedgerService::connect(&self.database).await?;
                let (email, password) = self.credentials()?;
                let member = service.register(name, email, password).await?;
                println!(
                    "Registration successful for {} <{}>. Please sign in.",
                    member.name, member.email
                );
                return Ok(());
            }

            Commands::ResetPassword => {
                let service = LedgerService::connect(&self.database).await?;
                let email = self
                    .email
                    .as_deref()
                    .context("Email required: pass --email or set COOP_EMAIL")?;
                service.request_password_reset(email).await?;
                println!("If {} is registered, a reset has been requested.", email);
                return Ok(());
            }

            _ => {}
        }

        let service = LedgerService::connect(&self.database).await?;
        let (email, password) = self.credentials()?;
        let session = service.sign_in(email, password).await?;

        let result = self.run_signed_in(&service, &session).await;
        service.sign_out(&session).await?;
        result
    }

    fn credentials(&self) -> Result<(&str, &str)> {
        let email = self
            .email
            .as_deref()
            .context("Email required: pass --email or set COOP_EMAIL")?;
        let password = self
            .password
            .as_deref()
            .context("Password required: pass --password or set COOP_PASSWORD")?;
        Ok((email, password))
    }

    async fn run_signed_in(&self, service: &LedgerService, session: &Session) -> Result<()> {
        match &self.command {
            Commands::Dashboard => run_dashboard(service, session, &self.coop_name).await?,

            Commands::Deposit { amount, key } => {
                let amount = parse_amount(amount)?;
                let result = service.deposit(session, amount, key.clone()).await?;
                if result.replayed {
                    println!("Already recorded under this key; nothing applied.");
                }
                println!(
                    "Deposited {}. New balance: {}",
                    format_naira(result.transaction.amount),
                    format_naira(result.balance)
                );
            }

            Commands::Withdraw { amount, key } => {
                let amount = parse_amount(amount)?;
                let result = service.withdraw(session, amount, key.clone()).await?;
                if result.replayed {
                    println!("Already recorded under this key; nothing applied.");
                }
                println!(
                    "Withdrew {}. New balance: {}",
                    format_naira(result.transaction.amount),
                    format_naira(result.balance)
                );
            }

            Commands::Loan(cmd) => run_loan_command(service, session, cmd).await?,

            Commands::History { kind } => run_history_command(service, session, *kind).await?,

            Commands::Admin(cmd) => run_admin_command(service, session, cmd).await?,

            Commands::Export {
                kind,
                output,
                format,
            } => run_export_command(service, session, *kind, output.as_deref(), *format).await?,

            Commands::Check => run_check_command(service, session).await?,

            Commands::Init { .. } | Commands::Register { .. } | Commands::ResetPassword => {
                anyhow::bail!("Command does not run inside a session")
            }
        }
        Ok(())
    }
}

fn parse_amount(input: &str) -> Result<i64> {
    parse_cents(input)
        .with_context(|| format!("Invalid amount '{}'. Use '5000' or '5,000.00'", input))
}

fn parse_id(input: &str) -> Result<Uuid> {
    Uuid::parse_str(input).context("Invalid application ID format (expected UUID)")
}

async fn run_dashboard(service: &LedgerService, session: &Session, coop_name: &str) -> Result<()> {
    let member = service.dashboard(session).await?;

    println!("{} - Member Dashboard", coop_name);
    println!("Welcome, {}", member.name);
    println!();
    println!("  Savings balance:  {:>16}", format_naira(member.savings_balance));
    println!("  Loan outstanding: {:>16}", format_naira(member.loan_balance));
    if member.is_admin() {
        println!();
        println!("  Signed in as admin.");
    }
    Ok(())
}

async fn run_loan_command(
    service: &LedgerService,
    session: &Session,
    cmd: &LoanCommands,
) -> Result<()> {
    match cmd {
        LoanCommands::Apply { amount, key } => {
            let amount = parse_amount(amount)?;
            let result = service.apply_for_loan(session, amount, key.clone()).await?;
            if result.replayed {
                println!("Already submitted under this key; nothing applied.");
            }
            println!(
                "Loan application submitted: {} ({})",
                format_naira(result.application.amount),
                result.application.id
            );
        }

        LoanCommands::List => {
            let applications = service.list_loan_applications(session).await?;
            if applications.is_empty() {
                println!("No loan applications yet.");
            } else {
                println!("{:<36} {:<20} {:>16} {:<9}", "ID", "DATE", "AMOUNT", "STATUS");
                println!("{}", "-".repeat(84));
                for application in applications {
                    println!(
                        "{:<36} {:<20} {:>16} {:<9}",
                        application.id,
                        application.created_at.format("%Y-%m-%d %H:%M:%S"),
                        format_naira(application.amount),
                        application.status
                    );
                }
            }
        }

        LoanCommands::Approve { id } => {
            let result = service.approve_loan(session, parse_id(id)?).await?;
            println!(
                "Approved {} for {}. Loan outstanding: {}",
                format_naira(result.application.amount),
                result.member.name,
                format_naira(result.member.loan_balance)
            );
        }

        LoanCommands::Reject { id } => {
            let result = service.reject_loan(session, parse_id(id)?).await?;
            println!(
                "Rejected {} for {}.",
                format_naira(result.application.amount),
                result.member.name
            );
        }
    }
    Ok(())
}

async fn run_history_command(
    service: &LedgerService,
    session: &Session,
    kind: LedgerKind,
) -> Result<()> {
    match kind {
        LedgerKind::Savings => {
            let records = service.list_savings_transactions(session).await?;
            if records.is_empty() {
                println!("No savings transactions yet.");
                return Ok(());
            }
            println!("{:<20} {:<9} {:>16}", "DATE", "TYPE", "AMOUNT");
            println!("{}", "-".repeat(47));
            for record in records {
                println!(
                    "{:<20} {:<9} {:>16}",
                    record.created_at.format("%Y-%m-%d %H:%M:%S"),
                    record.kind,
                    format_naira(record.amount)
                );
            }
        }
        LedgerKind::Loans => {
            let records = service.list_loan_transactions(session).await?;
            if records.is_empty() {
                println!("No loan transactions yet.");
                return Ok(());
            }
            println!("{:<20} {:<9} {:>16} {:<36}", "DATE", "ACTION", "AMOUNT", "APPLICATION");
            println!("{}", "-".repeat(84));
            for record in records {
                println!(
                    "{:<20} {:<9} {:>16} {:<36}",
                    record.created_at.format("%Y-%m-%d %H:%M:%S"),
                    record.action,
                    format_naira(record.amount),
                    record
                        .application_id
                        .map(|id| id.to_string())
                        .unwrap_or_else(|| "-".to_string())
                );
            }
        }
    }
    Ok(())
}

async fn run_admin_command(
    service: &LedgerService,
    session: &Session,
    cmd: &AdminCommands,
) -> Result<()> {
    match cmd {
        AdminCommands::Members => {
            let members = service.list_members(session).await?;
            println!(
                "{:<24} {:<30} {:<7} {:>16} {:>16}",
                "NAME", "EMAIL", "ROLE", "SAVINGS", "LOAN"
            );
            println!("{}", "-".repeat(97));
            for member in members {
                println!(
                    "{:<24} {:<30} {:<7} {:>16} {:>16}",
                    member.name,
                    member.email,
                    member.role,
                    format_naira(member.savings_balance),
                    format_naira(member.loan_balance)
                );
            }
        }

        AdminCommands::Applications => {
            let entries = service.list_all_loan_applications(session).await?;
            if entries.is_empty() {
                println!("No loan applications found.");
                return Ok(());
            }
            for entry in entries {
                let application = &entry.record;
                println!(
                    "Loan {} | {} ({}) | Amount: {} | Status: {} | Date: {}",
                    application.id,
                    entry.member_name,
                    entry.member_email,
                    format_naira(application.amount),
                    application.status,
                    application.created_at.format("%Y-%m-%d %H:%M:%S")
                );
            }
        }

        AdminCommands::Savings => {
            let entries = service.list_all_savings_transactions(session).await?;
            if entries.is_empty() {
                println!("No savings transactions found.");
                return Ok(());
            }
            println!(
                "{:<20} {:<24} {:<30} {:<9} {:>16}",
                "DATE", "MEMBER", "EMAIL", "TYPE", "AMOUNT"
            );
            println!("{}", "-".repeat(103));
            for entry in entries {
                println!(
                    "{:<20} {:<24} {:<30} {:<9} {:>16}",
                    entry.record.created_at.format("%Y-%m-%d %H:%M:%S"),
                    entry.member_name,
                    entry.member_email,
                    entry.record.kind,
                    format_naira(entry.record.amount)
                );
            }
        }

        AdminCommands::Loans => {
            let entries = service.list_all_loan_transactions(session).await?;
            if entries.is_empty() {
                println!("No loan transactions found.");
                return Ok(());
            }
            println!(
                "{:<20} {:<24} {:<30} {:<9} {:>16}",
                "DATE", "MEMBER", "EMAIL", "ACTION", "AMOUNT"
            );
            println!("{}", "-".repeat(103));
            for entry in entries {
                println!(
                    "{:<20} {:<24} {:<30} {:<9} {:>16}",
                    entry.record.created_at.format("%Y-%m-%d %H:%M:%S"),
                    entry.member_name,
                    entry.member_email,
                    entry.record.action,
                    format_naira(entry.record.amount)
                );
            }
        }
    }
    Ok(())
}

async fn run_export_command(
    service: &LedgerService,
    session: &Session,
    kind: ExportKind,
    output: Option<&str>,
    format: ExportFormat,
) -> Result<()> {
    use crate::io::Exporter;
    use std::fs::File;
    use std::io::{Write, stdout};

    let exporter = Exporter::new(service, session);

    let writer: Box<dyn Write> = match output {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("Failed to create output file: {}", path))?;
            Box::new(file)
        }
        None => Box::new(stdout()),
    };

    let count = match (kind, format) {
        (ExportKind::Savings, ExportFormat::Csv) => exporter.export_savings_csv(writer).await?,
        (ExportKind::Savings, ExportFormat::Json) => exporter.export_savings_json(writer).await?,
        (ExportKind::Loans, ExportFormat::Csv) => exporter.export_loans_csv(writer).await?,
        (ExportKind::Loans, ExportFormat::Json) => exporter.export_loans_json(writer).await?,
        (ExportKind::Applications, ExportFormat::Csv) => {
            exporter.export_applications_csv(writer).await?
        }
        (ExportKind::Applications, ExportFormat::Json) => {
            exporter.export_applications_json(writer).await?
        }
    };

    if output.is_some() {
        eprintln!("Exported {} records", count);
    }
    Ok(())
}

async fn run_check_command(service: &LedgerService, session: &Session) -> Result<()> {
    println!("Checking ledger integrity...\n");

    let report = service.check_integrity(session).await?;

    println!("Members:           {}", report.member_count);
    println!("Savings records:   {}", report.savings_record_count);
    println!("Loan applications: {}", report.application_count);
    println!("Loan records:      {}", report.loan_record_count);
    println!();
    println!("Total savings:     {:>16}", format_naira(report.total_savings));
    println!("Total loans:       {:>16}", format_naira(report.total_loans));
    println!();

    if report.is_healthy() {
        println!("Ledger is consistent.");
    } else {
        println!("Issues found:");
        for issue in &report.issues {
            println!("  - {}", issue);
        }
        anyhow::bail!("Ledger integrity check failed");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_without_admin() {
        let cli = Cli::try_parse_from(["coopledger", "init"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Init {
                admin_name: None,
                admin_email: None,
                admin_password: None
            }
        ));
    }

    #[test]
    fn test_init_with_full_admin() {
        let cli = Cli::try_parse_from([
            "coopledger",
            "init",
            "--admin-name",
            "Treasurer",
            "--admin-email",
            "treasurer@coop.test",
            "--admin-password",
            "correct-horse",
        ])
        .unwrap();
        assert!(matches!(cli.command, Commands::Init { admin_name: Some(_), .. }));
    }

    #[test]
    fn test_partial_admin_flags_rejected() {
        let partial: [&[&str]; 3] = [
            &["--admin-email", "treasurer@coop.test", "--admin-password", "pw"],
            &["--admin-name", "Treasurer", "--admin-password", "pw"],
            &["--admin-password", "pw"],
        ];
        for flags in partial {
            let args: Vec<&str> = ["coopledger", "init"]
                .into_iter()
                .chain(flags.iter().copied())
                .collect();
            assert!(
                Cli::try_parse_from(args).is_err(),
                "accepted partial admin flags: {:?}",
                flags
            );
        }
    }
}
