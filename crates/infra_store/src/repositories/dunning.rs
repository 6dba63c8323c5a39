//! Dunning attempt store

use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};

use core_kernel::{DomainPort, DunningAttemptId, InvoiceId, PortError};
use domain_dunning::{AttemptOutcome, DunningAttempt, DunningStore};

use crate::error::{corrupt_row, to_port_error};

/// PostgreSQL-backed, append-only dunning attempt store
///
/// The `(invoice_id, attempt_number)` unique constraint is the
/// serialization point for concurrent dunning cycles: the second writer
/// of the same attempt number gets `PortError::Conflict` and backs off.
#[derive(Debug, Clone)]
pub struct PgDunningStore {
    pool: PgPool,
}

impl PgDunningStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

impl DomainPort for PgDunningStore {}

fn parse_outcome(s: &str) -> Result<AttemptOutcome, PortError> {
    match s {
        "pending" => Ok(AttemptOutcome::Pending),
        "failed" => Ok(AttemptOutcome::Failed),
        "recovered" => Ok(AttemptOutcome::Recovered),
        other => Err(corrupt_row(
            "dunning_attempts",
            format!("unknown outcome {other}"),
        )),
    }
}

fn attempt_from_row(row: &PgRow) -> Result<DunningAttempt, PortError> {
    let map = |e: sqlx::Error| corrupt_row("dunning_attempts", e);
    Ok(DunningAttempt {
        id: DunningAttemptId::from_uuid(row.try_get("id").map_err(map)?),
        invoice_id: InvoiceId::from_uuid(row.try_get("invoice_id").map_err(map)?),
        attempt_number: row.try_get::<i32, _>("attempt_number").map_err(map)? as u32,
        attempted_at: row.try_get("attempted_at").map_err(map)?,
        outcome: parse_outcome(row.try_get::<String, _>("outcome").map_err(map)?.as_str())?,
    })
}

#[async_trait]
impl DunningStore for PgDunningStore {
    async fn append(&self, attempt: DunningAttempt) -> Result<(), PortError> {
        sqlx::query(
            r#"
            INSERT INTO dunning_attempts (
                id, invoice_id, attempt_number, attempted_at, outcome
            ) VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(*attempt.id.as_uuid())
        .bind(*attempt.invoice_id.as_uuid())
        .bind(attempt.attempt_number as i32)
        .bind(attempt.attempted_at)
        .bind(attempt.outcome.as_str())
        .execute(&self.pool)
        .await
        .map_err(|e| to_port_error(e, "dunning_attempts.append"))?;
        Ok(())
    }

    async fn last_attempt_number(&self, invoice_id: InvoiceId) -> Result<u32, PortError> {
        let row = sqlx::query(
            "SELECT COALESCE(MAX(attempt_number), 0) AS latest FROM dunning_attempts WHERE invoice_id = $1",
        )
        .bind(*invoice_id.as_uuid())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| to_port_error(e, "dunning_attempts.last_attempt_number"))?;
        let latest: i32 = row.try_get("latest").map_err(|e| corrupt_row("dunning_attempts", e))?;
        Ok(latest as u32)
    }

    async fn list_by_invoice(
        &self,
        invoice_id: InvoiceId,
    ) -> Result<Vec<DunningAttempt>, PortError> {
        let rows = sqlx::query(
            "SELECT * FROM dunning_attempts WHERE invoice_id = $1 ORDER BY attempt_number",
        )
        .bind(*invoice_id.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| to_port_error(e, "dunning_attempts.list_by_invoice"))?;
        rows.iter().map(attempt_from_row).collect()
    }
}
