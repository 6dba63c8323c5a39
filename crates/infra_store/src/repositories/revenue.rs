//! Recognized and deferred revenue stores

use async_trait::async_trait;
use rust_decimal::Decimal;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use core_kernel::{
    Currency, DeferredEntryId, DomainPort, InvoiceId, Money, PortError, ReportingMonth,
    RevenueEntryId, SubscriptionId,
};
use domain_revenue::{DeferredRevenueEntry, DeferredStatus, RecognizedRevenueEntry, RevenueStore};

use crate::error::{corrupt_row, to_port_error};
use crate::repositories::subscription::stale_or_missing;

/// PostgreSQL-backed revenue store
///
/// Recognized entries are append-only; the `(source_deferred, month)`
/// unique constraint makes amortization passes idempotent even when two
/// workers race on the same month.
#[derive(Debug, Clone)]
pub struct PgRevenueStore {
    pool: PgPool,
}

impl PgRevenueStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

impl DomainPort for PgRevenueStore {}

fn parse_deferred_status(s: &str) -> Result<DeferredStatus, PortError> {
    match s {
        "deferred" => Ok(DeferredStatus::Deferred),
        "released" => Ok(DeferredStatus::Released),
        other => Err(corrupt_row(
            "deferred_revenue",
            format!("unknown status {other}"),
        )),
    }
}

fn recognized_from_row(row: &PgRow) -> Result<RecognizedRevenueEntry, PortError> {
    let map = |e: sqlx::Error| corrupt_row("recognized_revenue", e);
    let currency: Currency = row
        .try_get::<String, _>("currency")
        .map_err(map)?
        .parse()
        .map_err(|e| corrupt_row("recognized_revenue", e))?;
    let month: ReportingMonth = row
        .try_get::<String, _>("month")
        .map_err(map)?
        .parse()
        .map_err(|e| corrupt_row("recognized_revenue", e))?;
    Ok(RecognizedRevenueEntry {
        id: RevenueEntryId::from_uuid(row.try_get("id").map_err(map)?),
        subscription_id: SubscriptionId::from_uuid(row.try_get("subscription_id").map_err(map)?),
        invoice_id: InvoiceId::from_uuid(row.try_get("invoice_id").map_err(map)?),
        month,
        amount: Money::new(row.try_get::<Decimal, _>("amount").map_err(map)?, currency),
        prorated: row.try_get("prorated").map_err(map)?,
        source_deferred: row
            .try_get::<Option<Uuid>, _>("source_deferred")
            .map_err(map)?
            .map(DeferredEntryId::from_uuid),
        created_at: row.try_get("created_at").map_err(map)?,
    })
}

fn deferred_from_row(row: &PgRow) -> Result<DeferredRevenueEntry, PortError> {
    let map = |e: sqlx::Error| corrupt_row("deferred_revenue", e);
    let currency: Currency = row
        .try_get::<String, _>("currency")
        .map_err(map)?
        .parse()
        .map_err(|e| corrupt_row("deferred_revenue", e))?;
    Ok(DeferredRevenueEntry {
        id: DeferredEntryId::from_uuid(row.try_get("id").map_err(map)?),
        subscription_id: SubscriptionId::from_uuid(row.try_get("subscription_id").map_err(map)?),
        invoice_id: InvoiceId::from_uuid(row.try_get("invoice_id").map_err(map)?),
        amount: Money::new(row.try_get::<Decimal, _>("amount").map_err(map)?, currency),
        released_amount: Money::new(
            row.try_get::<Decimal, _>("released_amount").map_err(map)?,
            currency,
        ),
        window_start: row.try_get("window_start").map_err(map)?,
        window_end: row.try_get("window_end").map_err(map)?,
        status: parse_deferred_status(row.try_get::<String, _>("status").map_err(map)?.as_str())?,
        version: row.try_get::<i64, _>("version").map_err(map)? as u64,
        created_at: row.try_get("created_at").map_err(map)?,
        updated_at: row.try_get("updated_at").map_err(map)?,
    })
}

#[async_trait]
impl RevenueStore for PgRevenueStore {
    async fn insert_recognized(&self, entry: RecognizedRevenueEntry) -> Result<(), PortError> {
        sqlx::query(
            r#"
            INSERT INTO recognized_revenue (
                id, subscription_id, invoice_id, month, amount, currency,
                prorated, source_deferred, created_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(*entry.id.as_uuid())
        .bind(*entry.subscription_id.as_uuid())
        .bind(*entry.invoice_id.as_uuid())
        .bind(entry.month.to_string())
        .bind(entry.amount.amount())
        .bind(entry.amount.currency().code())
        .bind(entry.prorated)
        .bind(entry.source_deferred.map(|id| *id.as_uuid()))
        .bind(entry.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| to_port_error(e, "recognized_revenue.insert"))?;
        Ok(())
    }

    async fn insert_deferred(&self, entry: DeferredRevenueEntry) -> Result<(), PortError> {
        sqlx::query(
            r#"
            INSERT INTO deferred_revenue (
                id, subscription_id, invoice_id, amount, released_amount,
                currency, window_start, window_end, status, version,
                created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(*entry.id.as_uuid())
        .bind(*entry.subscription_id.as_uuid())
        .bind(*entry.invoice_id.as_uuid())
        .bind(entry.amount.amount())
        .bind(entry.released_amount.amount())
        .bind(entry.amount.currency().code())
        .bind(entry.window_start)
        .bind(entry.window_end)
        .bind(entry.status.as_str())
        .bind(entry.version as i64)
        .bind(entry.created_at)
        .bind(entry.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| to_port_error(e, "deferred_revenue.insert"))?;
        Ok(())
    }

    async fn update_deferred(
        &self,
        entry: &DeferredRevenueEntry,
        expected_version: u64,
    ) -> Result<DeferredRevenueEntry, PortError> {
        let result = sqlx::query(
            r#"
            UPDATE deferred_revenue
            SET released_amount = $3, status = $4, version = version + 1,
                updated_at = $5
            WHERE id = $1 AND version = $2
            "#,
        )
        .bind(*entry.id.as_uuid())
        .bind(expected_version as i64)
        .bind(entry.released_amount.amount())
        .bind(entry.status.as_str())
        .bind(entry.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| to_port_error(e, "deferred_revenue.update"))?;

        if result.rows_affected() == 0 {
            return Err(stale_or_missing(
                &self.pool,
                "deferred_revenue",
                "deferred entry",
                *entry.id.as_uuid(),
            )
            .await);
        }

        let mut stored = entry.clone();
        stored.version = expected_version + 1;
        Ok(stored)
    }

    async fn list_open_deferred(&self) -> Result<Vec<DeferredRevenueEntry>, PortError> {
        let rows = sqlx::query(
            "SELECT * FROM deferred_revenue WHERE status = 'deferred' ORDER BY created_at",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| to_port_error(e, "deferred_revenue.list_open"))?;
        rows.iter().map(deferred_from_row).collect()
    }

    async fn slice_exists(
        &self,
        deferred_id: DeferredEntryId,
        month: ReportingMonth,
    ) -> Result<bool, PortError> {
        let row = sqlx::query(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM recognized_revenue
                WHERE source_deferred = $1 AND month = $2
            ) AS present
            "#,
        )
        .bind(*deferred_id.as_uuid())
        .bind(month.to_string())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| to_port_error(e, "recognized_revenue.slice_exists"))?;
        row.try_get("present")
            .map_err(|e| corrupt_row("recognized_revenue", e))
    }

    async fn list_recognized_in_month(
        &self,
        month: ReportingMonth,
    ) -> Result<Vec<RecognizedRevenueEntry>, PortError> {
        let rows =
            sqlx::query("SELECT * FROM recognized_revenue WHERE month = $1 ORDER BY created_at")
                .bind(month.to_string())
                .fetch_all(&self.pool)
                .await
                .map_err(|e| to_port_error(e, "recognized_revenue.list_in_month"))?;
        rows.iter().map(recognized_from_row).collect()
    }

    async fn open_deferred_balances(&self) -> Result<Vec<Money>, PortError> {
        let rows = sqlx::query(
            "SELECT amount, released_amount, currency FROM deferred_revenue WHERE status = 'deferred'",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| to_port_error(e, "deferred_revenue.balances"))?;

        rows.iter()
            .map(|row| {
                let map = |e: sqlx::Error| corrupt_row("deferred_revenue", e);
                let currency: Currency = row
                    .try_get::<String, _>("currency")
                    .map_err(map)?
                    .parse()
                    .map_err(|e| corrupt_row("deferred_revenue", e))?;
                let amount = row.try_get::<Decimal, _>("amount").map_err(map)?;
                let released = row.try_get::<Decimal, _>("released_amount").map_err(map)?;
                Ok(Money::new(amount - released, currency))
            })
            .collect()
    }
}
