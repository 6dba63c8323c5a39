//! Payout and payout batch stores

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use core_kernel::{Currency, DomainPort, Money, PayoutBatchId, PayoutId, PortError};
use domain_payout::{BatchStatus, Payout, PayoutBatch, PayoutStatus, PayoutStore};

use crate::error::{corrupt_row, to_port_error};
use crate::repositories::subscription::stale_or_missing;

/// PostgreSQL-backed payout store with optimistic versioning
#[derive(Debug, Clone)]
pub struct PgPayoutStore {
    pool: PgPool,
}

impl PgPayoutStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

impl DomainPort for PgPayoutStore {}

fn parse_payout_status(s: &str) -> Result<PayoutStatus, PortError> {
    match s {
        "pending" => Ok(PayoutStatus::Pending),
        "processing" => Ok(PayoutStatus::Processing),
        "completed" => Ok(PayoutStatus::Completed),
        "failed" => Ok(PayoutStatus::Failed),
        "flagged" => Ok(PayoutStatus::Flagged),
        other => Err(corrupt_row("payouts", format!("unknown status {other}"))),
    }
}

fn parse_batch_status(s: &str) -> Result<BatchStatus, PortError> {
    match s {
        "processing" => Ok(BatchStatus::Processing),
        "completed" => Ok(BatchStatus::Completed),
        "failed" => Ok(BatchStatus::Failed),
        "flagged" => Ok(BatchStatus::Flagged),
        other => Err(corrupt_row(
            "payout_batches",
            format!("unknown status {other}"),
        )),
    }
}

fn payout_from_row(row: &PgRow) -> Result<Payout, PortError> {
    let map = |e: sqlx::Error| corrupt_row("payouts", e);
    let currency: Currency = row
        .try_get::<String, _>("currency")
        .map_err(map)?
        .parse()
        .map_err(|e| corrupt_row("payouts", e))?;
    Ok(Payout {
        id: PayoutId::from_uuid(row.try_get("id").map_err(map)?),
        destination: row.try_get("destination").map_err(map)?,
        amount: Money::new(row.try_get::<Decimal, _>("amount").map_err(map)?, currency),
        fee: Money::new(row.try_get::<Decimal, _>("fee").map_err(map)?, currency),
        net: Money::new(row.try_get::<Decimal, _>("net").map_err(map)?, currency),
        verified: row.try_get("verified").map_err(map)?,
        approved: row.try_get("approved").map_err(map)?,
        scheduled_for: row.try_get("scheduled_for").map_err(map)?,
        idempotency_key: row.try_get("idempotency_key").map_err(map)?,
        tx_ref: row.try_get("tx_ref").map_err(map)?,
        batch_id: row
            .try_get::<Option<Uuid>, _>("batch_id")
            .map_err(map)?
            .map(PayoutBatchId::from_uuid),
        status: parse_payout_status(row.try_get::<String, _>("status").map_err(map)?.as_str())?,
        executed_at: row.try_get("executed_at").map_err(map)?,
        version: row.try_get::<i64, _>("version").map_err(map)? as u64,
        created_at: row.try_get("created_at").map_err(map)?,
        updated_at: row.try_get("updated_at").map_err(map)?,
    })
}

fn batch_from_row(row: &PgRow) -> Result<PayoutBatch, PortError> {
    let map = |e: sqlx::Error| corrupt_row("payout_batches", e);
    let currency: Currency = row
        .try_get::<String, _>("currency")
        .map_err(map)?
        .parse()
        .map_err(|e| corrupt_row("payout_batches", e))?;
    Ok(PayoutBatch {
        id: PayoutBatchId::from_uuid(row.try_get("id").map_err(map)?),
        total_amount: Money::new(
            row.try_get::<Decimal, _>("total_amount").map_err(map)?,
            currency,
        ),
        row_count: row.try_get::<i32, _>("row_count").map_err(map)? as usize,
        status: parse_batch_status(row.try_get::<String, _>("status").map_err(map)?.as_str())?,
        failed_payouts: row
            .try_get::<Vec<Uuid>, _>("failed_payouts")
            .map_err(map)?
            .into_iter()
            .map(PayoutId::from_uuid)
            .collect(),
        created_at: row.try_get("created_at").map_err(map)?,
        updated_at: row.try_get("updated_at").map_err(map)?,
    })
}

#[async_trait]
impl PayoutStore for PgPayoutStore {
    async fn insert(&self, payout: Payout) -> Result<(), PortError> {
        sqlx::query(
            r#"
            INSERT INTO payouts (
                id, destination, amount, fee, net, currency, verified,
                approved, scheduled_for, idempotency_key, tx_ref, batch_id,
                status, executed_at, version, created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)
            "#,
        )
        .bind(*payout.id.as_uuid())
        .bind(&payout.destination)
        .bind(payout.amount.amount())
        .bind(payout.fee.amount())
        .bind(payout.net.amount())
        .bind(payout.amount.currency().code())
        .bind(payout.verified)
        .bind(payout.approved)
        .bind(payout.scheduled_for)
        .bind(payout.idempotency_key)
        .bind(&payout.tx_ref)
        .bind(payout.batch_id.map(|id| *id.as_uuid()))
        .bind(payout.status.as_str())
        .bind(payout.executed_at)
        .bind(payout.version as i64)
        .bind(payout.created_at)
        .bind(payout.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| to_port_error(e, "payouts.insert"))?;
        Ok(())
    }

    async fn get(&self, id: PayoutId) -> Result<Payout, PortError> {
        let row = sqlx::query("SELECT * FROM payouts WHERE id = $1")
            .bind(*id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| to_port_error(e, "payouts.get"))?
            .ok_or_else(|| PortError::not_found("payout", id))?;
        payout_from_row(&row)
    }

    async fn update(&self, payout: &Payout, expected_version: u64) -> Result<Payout, PortError> {
        let result = sqlx::query(
            r#"
            UPDATE payouts
            SET verified = $3, approved = $4, scheduled_for = $5, tx_ref = $6,
                status = $7, executed_at = $8, version = version + 1,
                updated_at = $9
            WHERE id = $1 AND version = $2
            "#,
        )
        .bind(*payout.id.as_uuid())
        .bind(expected_version as i64)
        .bind(payout.verified)
        .bind(payout.approved)
        .bind(payout.scheduled_for)
        .bind(&payout.tx_ref)
        .bind(payout.status.as_str())
        .bind(payout.executed_at)
        .bind(payout.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| to_port_error(e, "payouts.update"))?;

        if result.rows_affected() == 0 {
            return Err(
                stale_or_missing(&self.pool, "payouts", "payout", *payout.id.as_uuid()).await,
            );
        }

        let mut stored = payout.clone();
        stored.version = expected_version + 1;
        Ok(stored)
    }

    async fn list_due_scheduled(&self, now: DateTime<Utc>) -> Result<Vec<Payout>, PortError> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM payouts
            WHERE status = 'pending' AND scheduled_for IS NOT NULL AND scheduled_for <= $1
            ORDER BY scheduled_for
            "#,
        )
        .bind(now)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| to_port_error(e, "payouts.list_due_scheduled"))?;
        rows.iter().map(payout_from_row).collect()
    }

    async fn completed_amounts(&self) -> Result<Vec<Decimal>, PortError> {
        let rows = sqlx::query("SELECT amount FROM payouts WHERE status = 'completed'")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| to_port_error(e, "payouts.completed_amounts"))?;
        rows.iter()
            .map(|row| row.try_get("amount").map_err(|e| corrupt_row("payouts", e)))
            .collect()
    }

    async fn insert_batch(&self, batch: PayoutBatch) -> Result<(), PortError> {
        sqlx::query(
            r#"
            INSERT INTO payout_batches (
                id, total_amount, currency, row_count, status, failed_payouts,
                created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(*batch.id.as_uuid())
        .bind(batch.total_amount.amount())
        .bind(batch.total_amount.currency().code())
        .bind(batch.row_count as i32)
        .bind(batch.status.as_str())
        .bind(
            batch
                .failed_payouts
                .iter()
                .map(|id| *id.as_uuid())
                .collect::<Vec<Uuid>>(),
        )
        .bind(batch.created_at)
        .bind(batch.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| to_port_error(e, "payout_batches.insert"))?;
        Ok(())
    }

    async fn update_batch(&self, batch: PayoutBatch) -> Result<(), PortError> {
        let result = sqlx::query(
            r#"
            UPDATE payout_batches
            SET status = $2, failed_payouts = $3, updated_at = $4
            WHERE id = $1
            "#,
        )
        .bind(*batch.id.as_uuid())
        .bind(batch.status.as_str())
        .bind(
            batch
                .failed_payouts
                .iter()
                .map(|id| *id.as_uuid())
                .collect::<Vec<Uuid>>(),
        )
        .bind(batch.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| to_port_error(e, "payout_batches.update"))?;

        if result.rows_affected() == 0 {
            return Err(PortError::not_found("payout batch", batch.id));
        }
        Ok(())
    }

    async fn get_batch(&self, id: PayoutBatchId) -> Result<PayoutBatch, PortError> {
        let row = sqlx::query("SELECT * FROM payout_batches WHERE id = $1")
            .bind(*id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| to_port_error(e, "payout_batches.get"))?
            .ok_or_else(|| PortError::not_found("payout batch", id))?;
        batch_from_row(&row)
    }

    async fn list_by_batch(&self, batch_id: PayoutBatchId) -> Result<Vec<Payout>, PortError> {
        let rows = sqlx::query("SELECT * FROM payouts WHERE batch_id = $1 ORDER BY created_at")
            .bind(*batch_id.as_uuid())
            .fetch_all(&self.pool)
            .await
            .map_err(|e| to_port_error(e, "payouts.list_by_batch"))?;
        rows.iter().map(payout_from_row).collect()
    }
}
