//! Invoice and credit note stores

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};

use core_kernel::{
    BillingPeriod, CreditNoteId, Currency, CustomerId, DomainPort, InvoiceId, Money, PortError,
    SubscriptionId,
};
use domain_invoicing::{CreditNote, CreditNoteStore, Invoice, InvoiceStatus, InvoiceStore};

use crate::error::{corrupt_row, to_port_error};
use crate::repositories::subscription::stale_or_missing;

/// PostgreSQL-backed invoice store with optimistic versioning
///
/// The `(subscription_id, period_start)` unique constraint is the
/// durable guarantee behind once-per-period invoicing; a duplicate
/// insert surfaces as `PortError::Conflict`.
#[derive(Debug, Clone)]
pub struct PgInvoiceStore {
    pool: PgPool,
}

impl PgInvoiceStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

impl DomainPort for PgInvoiceStore {}

fn parse_invoice_status(s: &str) -> Result<InvoiceStatus, PortError> {
    match s {
        "open" => Ok(InvoiceStatus::Open),
        "paid" => Ok(InvoiceStatus::Paid),
        "overdue" => Ok(InvoiceStatus::Overdue),
        "void" => Ok(InvoiceStatus::Void),
        other => Err(corrupt_row("invoices", format!("unknown status {other}"))),
    }
}

fn invoice_from_row(row: &PgRow) -> Result<Invoice, PortError> {
    let map = |e: sqlx::Error| corrupt_row("invoices", e);
    let currency: Currency = row
        .try_get::<String, _>("currency")
        .map_err(map)?
        .parse()
        .map_err(|e| corrupt_row("invoices", e))?;
    let period = BillingPeriod::new(
        row.try_get::<DateTime<Utc>, _>("period_start").map_err(map)?,
        row.try_get::<i32, _>("period_length_days").map_err(map)? as u32,
    )
    .map_err(|e| corrupt_row("invoices", e))?;
    let tax = row
        .try_get::<Option<Decimal>, _>("tax_amount")
        .map_err(map)?
        .map(|amount| Money::new(amount, currency));
    Ok(Invoice {
        id: InvoiceId::from_uuid(row.try_get("id").map_err(map)?),
        invoice_number: row.try_get("invoice_number").map_err(map)?,
        subscription_id: SubscriptionId::from_uuid(row.try_get("subscription_id").map_err(map)?),
        customer_id: CustomerId::from_uuid(row.try_get("customer_id").map_err(map)?),
        issue_date: row.try_get("issue_date").map_err(map)?,
        period,
        due_date: row.try_get("due_date").map_err(map)?,
        amount: Money::new(row.try_get::<Decimal, _>("amount").map_err(map)?, currency),
        tax,
        status: parse_invoice_status(row.try_get::<String, _>("status").map_err(map)?.as_str())?,
        paid_at: row.try_get("paid_at").map_err(map)?,
        version: row.try_get::<i64, _>("version").map_err(map)? as u64,
        created_at: row.try_get("created_at").map_err(map)?,
        updated_at: row.try_get("updated_at").map_err(map)?,
    })
}

#[async_trait]
impl InvoiceStore for PgInvoiceStore {
    async fn insert(&self, invoice: Invoice) -> Result<(), PortError> {
        sqlx::query(
            r#"
            INSERT INTO invoices (
                id, invoice_number, subscription_id, customer_id, issue_date,
                period_start, period_length_days, due_date, amount, currency,
                tax_amount, status, paid_at, version, created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
            "#,
        )
        .bind(*invoice.id.as_uuid())
        .bind(&invoice.invoice_number)
        .bind(*invoice.subscription_id.as_uuid())
        .bind(*invoice.customer_id.as_uuid())
        .bind(invoice.issue_date)
        .bind(invoice.period.start())
        .bind(invoice.period.length_days() as i32)
        .bind(invoice.due_date)
        .bind(invoice.amount.amount())
        .bind(invoice.amount.currency().code())
        .bind(invoice.tax.map(|t| t.amount()))
        .bind(invoice.status.as_str())
        .bind(invoice.paid_at)
        .bind(invoice.version as i64)
        .bind(invoice.created_at)
        .bind(invoice.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| to_port_error(e, "invoices.insert"))?;
        Ok(())
    }

    async fn get(&self, id: InvoiceId) -> Result<Invoice, PortError> {
        let row = sqlx::query("SELECT * FROM invoices WHERE id = $1")
            .bind(*id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| to_port_error(e, "invoices.get"))?
            .ok_or_else(|| PortError::not_found("invoice", id))?;
        invoice_from_row(&row)
    }

    async fn update(&self, invoice: &Invoice, expected_version: u64) -> Result<Invoice, PortError> {
        let result = sqlx::query(
            r#"
            UPDATE invoices
            SET amount = $3, tax_amount = $4, status = $5, paid_at = $6,
                version = version + 1, updated_at = $7
            WHERE id = $1 AND version = $2
            "#,
        )
        .bind(*invoice.id.as_uuid())
        .bind(expected_version as i64)
        .bind(invoice.amount.amount())
        .bind(invoice.tax.map(|t| t.amount()))
        .bind(invoice.status.as_str())
        .bind(invoice.paid_at)
        .bind(invoice.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| to_port_error(e, "invoices.update"))?;

        if result.rows_affected() == 0 {
            return Err(
                stale_or_missing(&self.pool, "invoices", "invoice", *invoice.id.as_uuid()).await,
            );
        }

        let mut stored = invoice.clone();
        stored.version = expected_version + 1;
        Ok(stored)
    }

    async fn find_by_period(
        &self,
        subscription_id: SubscriptionId,
        period_start: DateTime<Utc>,
    ) -> Result<Option<Invoice>, PortError> {
        let row = sqlx::query(
            "SELECT * FROM invoices WHERE subscription_id = $1 AND period_start = $2",
        )
        .bind(*subscription_id.as_uuid())
        .bind(period_start)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| to_port_error(e, "invoices.find_by_period"))?;
        row.as_ref().map(invoice_from_row).transpose()
    }

    async fn list_by_subscription(
        &self,
        subscription_id: SubscriptionId,
    ) -> Result<Vec<Invoice>, PortError> {
        let rows =
            sqlx::query("SELECT * FROM invoices WHERE subscription_id = $1 ORDER BY issue_date")
                .bind(*subscription_id.as_uuid())
                .fetch_all(&self.pool)
                .await
                .map_err(|e| to_port_error(e, "invoices.list_by_subscription"))?;
        rows.iter().map(invoice_from_row).collect()
    }

    async fn list_by_status(&self, status: InvoiceStatus) -> Result<Vec<Invoice>, PortError> {
        let rows = sqlx::query("SELECT * FROM invoices WHERE status = $1 ORDER BY issue_date")
            .bind(status.as_str())
            .fetch_all(&self.pool)
            .await
            .map_err(|e| to_port_error(e, "invoices.list_by_status"))?;
        rows.iter().map(invoice_from_row).collect()
    }
}

/// PostgreSQL-backed, append-only credit note store
#[derive(Debug, Clone)]
pub struct PgCreditNoteStore {
    pool: PgPool,
}

impl PgCreditNoteStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

impl DomainPort for PgCreditNoteStore {}

fn credit_note_from_row(row: &PgRow) -> Result<CreditNote, PortError> {
    let map = |e: sqlx::Error| corrupt_row("credit_notes", e);
    let currency: Currency = row
        .try_get::<String, _>("currency")
        .map_err(map)?
        .parse()
        .map_err(|e| corrupt_row("credit_notes", e))?;
    Ok(CreditNote {
        id: CreditNoteId::from_uuid(row.try_get("id").map_err(map)?),
        subscription_id: SubscriptionId::from_uuid(row.try_get("subscription_id").map_err(map)?),
        customer_id: CustomerId::from_uuid(row.try_get("customer_id").map_err(map)?),
        amount: Money::new(row.try_get::<Decimal, _>("amount").map_err(map)?, currency),
        reason: row.try_get("reason").map_err(map)?,
        created_at: row.try_get("created_at").map_err(map)?,
    })
}

#[async_trait]
impl CreditNoteStore for PgCreditNoteStore {
    async fn insert(&self, note: CreditNote) -> Result<(), PortError> {
        sqlx::query(
            r#"
            INSERT INTO credit_notes (
                id, subscription_id, customer_id, amount, currency, reason, created_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(*note.id.as_uuid())
        .bind(*note.subscription_id.as_uuid())
        .bind(*note.customer_id.as_uuid())
        .bind(note.amount.amount())
        .bind(note.amount.currency().code())
        .bind(&note.reason)
        .bind(note.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| to_port_error(e, "credit_notes.insert"))?;
        Ok(())
    }

    async fn list_by_subscription(
        &self,
        subscription_id: SubscriptionId,
    ) -> Result<Vec<CreditNote>, PortError> {
        let rows = sqlx::query(
            "SELECT * FROM credit_notes WHERE subscription_id = $1 ORDER BY created_at",
        )
        .bind(*subscription_id.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| to_port_error(e, "credit_notes.list_by_subscription"))?;
        rows.iter().map(credit_note_from_row).collect()
    }
}
