use anyhow::Result;
use serde::Serialize;
use std::io::Write;

use crate::application::{LedgerService, Session, WithMember};
use crate::domain::{LoanApplication, LoanTransaction, SavingsTransaction, format_cents};

/// Writes the admin aggregate logs as CSV or JSON.
pub struct Exporter<'a> {
    service: &'a LedgerService,
    session: &'a Session,
}

impl<'a> Exporter<'a> {
    pub fn new(service: &'a LedgerService, session: &'a Session) -> Self {
        Self { service, session }
    }

    /// All savings records, newest first.
    pub async fn export_savings_csv<W: Write>(&self, writer: W) -> Result<usize> {
        let entries = self
            .service
            .list_all_savings_transactions(self.session)
            .await?;
        let mut csv_writer = csv::Writer::from_writer(writer);

        csv_writer.write_record(["date", "member", "email", "type", "amount"])?;
        for entry in &entries {
            let record = &entry.record;
            csv_writer.write_record([
                record.created_at.to_rfc3339(),
                entry.member_name.clone(),
                entry.member_email.clone(),
                record.kind.to_string(),
                format_cents(record.amount),
            ])?;
        }

        csv_writer.flush()?;
        Ok(entries.len())
    }

    /// All loan records, newest first.
    pub async fn export_loans_csv<W: Write>(&self, writer: W) -> Result<usize> {
        let entries = self
            .service
            .list_all_loan_transactions(self.session)
            .await?;
        let mut csv_writer = csv::Writer::from_writer(writer);

        csv_writer.write_record(["date", "member", "email", "action", "amount", "application_id"])?;
        for entry in &entries {
            let record = &entry.record;
            csv_writer.write_record([
                record.created_at.to_rfc3339(),
                entry.member_name.clone(),
                entry.member_email.clone(),
                record.action.to_string(),
                format_cents(record.amount),
                record
                    .application_id
                    .map(|id| id.to_string())
                    .unwrap_or_default(),
            ])?;
        }

        csv_writer.flush()?;
        Ok(entries.len())
    }

    /// All loan applications with their current status, newest first.
    pub async fn export_applications_csv<W: Write>(&self, writer: W) -> Result<usize> {
        let entries = self
            .service
            .list_all_loan_applications(self.session)
            .await?;
        let mut csv_writer = csv::Writer::from_writer(writer);

        csv_writer.write_record(["id", "date", "member", "email", "amount", "status", "decided_at"])?;
        for entry in &entries {
            let application = &entry.record;
            csv_writer.write_record([
                application.id.to_string(),
                application.created_at.to_rfc3339(),
                entry.member_name.clone(),
                entry.member_email.clone(),
                format_cents(application.amount),
                application.status.to_string(),
                application
                    .decided_at
                    .map(|dt| dt.to_rfc3339())
                    .unwrap_or_default(),
            ])?;
        }

        csv_writer.flush()?;
        Ok(entries.len())
    }

    pub async fn export_savings_json<W: Write>(&self, writer: W) -> Result<usize> {
        let entries: Vec<WithMember<SavingsTransaction>> = self
            .service
            .list_all_savings_transactions(self.session)
            .await?;
        write_json(writer, &entries)?;
        Ok(entries.len())
    }

    pub async fn export_loans_json<W: Write>(&self, writer: W) -> Result<usize> {
        let entries: Vec<WithMember<LoanTransaction>> = self
            .service
            .list_all_loan_transactions(self.session)
            .await?;
        write_json(writer, &entries)?;
        Ok(entries.len())
    }

    pub async fn export_applications_json<W: Write>(&self, writer: W) -> Result<usize> {
        let entries: Vec<WithMember<LoanApplication>> = self
            .service
            .list_all_loan_applications(self.session)
            .await?;
        write_json(writer, &entries)?;
        Ok(entries.len())
    }
}

fn write_json<W: Write, T: Serialize>(mut writer: W, value: &T) -> Result<()> {
    serde_json::to_writer_pretty(&mut writer, value)?;
    writeln!(writer)?;
    Ok(())
}
