//! Audit and outbox stores

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};

use core_kernel::{AuditEventId, DomainPort, OutboxEntryId, PortError};
use domain_events::{AuditRecord, AuditStore, OutboxEntry, OutboxStatus, OutboxStore};

use crate::error::{corrupt_row, to_port_error};

/// PostgreSQL-backed, append-only audit trail
#[derive(Debug, Clone)]
pub struct PgAuditStore {
    pool: PgPool,
}

impl PgAuditStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

impl DomainPort for PgAuditStore {}

fn audit_from_row(row: &PgRow) -> Result<AuditRecord, PortError> {
    let map = |e: sqlx::Error| corrupt_row("audit_records", e);
    Ok(AuditRecord {
        id: AuditEventId::from_uuid(row.try_get("id").map_err(map)?),
        actor_id: row.try_get("actor_id").map_err(map)?,
        action: row.try_get("action").map_err(map)?,
        details: row.try_get("details").map_err(map)?,
        recorded_at: row.try_get("recorded_at").map_err(map)?,
    })
}

#[async_trait]
impl AuditStore for PgAuditStore {
    async fn append(&self, record: AuditRecord) -> Result<(), PortError> {
        sqlx::query(
            r#"
            INSERT INTO audit_records (id, actor_id, action, details, recorded_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(*record.id.as_uuid())
        .bind(&record.actor_id)
        .bind(&record.action)
        .bind(&record.details)
        .bind(record.recorded_at)
        .execute(&self.pool)
        .await
        .map_err(|e| to_port_error(e, "audit_records.append"))?;
        Ok(())
    }

    async fn list_by_actor(&self, actor_id: &str) -> Result<Vec<AuditRecord>, PortError> {
        let rows =
            sqlx::query("SELECT * FROM audit_records WHERE actor_id = $1 ORDER BY recorded_at")
                .bind(actor_id)
                .fetch_all(&self.pool)
                .await
                .map_err(|e| to_port_error(e, "audit_records.list_by_actor"))?;
        rows.iter().map(audit_from_row).collect()
    }
}

/// PostgreSQL-backed outbox store
#[derive(Debug, Clone)]
pub struct PgOutboxStore {
    pool: PgPool,
}

impl PgOutboxStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

impl DomainPort for PgOutboxStore {}

fn parse_outbox_status(s: &str) -> Result<OutboxStatus, PortError> {
    match s {
        "pending" => Ok(OutboxStatus::Pending),
        "delivered" => Ok(OutboxStatus::Delivered),
        "dead" => Ok(OutboxStatus::Dead),
        other => Err(corrupt_row(
            "outbox_entries",
            format!("unknown status {other}"),
        )),
    }
}

fn entry_from_row(row: &PgRow) -> Result<OutboxEntry, PortError> {
    let map = |e: sqlx::Error| corrupt_row("outbox_entries", e);
    Ok(OutboxEntry {
        id: OutboxEntryId::from_uuid(row.try_get("id").map_err(map)?),
        event: row.try_get("event").map_err(map)?,
        payload: row.try_get::<Value, _>("payload").map_err(map)?,
        attempts: row.try_get::<i32, _>("attempts").map_err(map)? as u32,
        next_attempt_at: row.try_get("next_attempt_at").map_err(map)?,
        status: parse_outbox_status(row.try_get::<String, _>("status").map_err(map)?.as_str())?,
        created_at: row.try_get("created_at").map_err(map)?,
        updated_at: row.try_get("updated_at").map_err(map)?,
    })
}

#[async_trait]
impl OutboxStore for PgOutboxStore {
    async fn insert(&self, entry: OutboxEntry) -> Result<(), PortError> {
        sqlx::query(
            r#"
            INSERT INTO outbox_entries (
                id, event, payload, attempts, next_attempt_at, status,
                created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(*entry.id.as_uuid())
        .bind(&entry.event)
        .bind(&entry.payload)
        .bind(entry.attempts as i32)
        .bind(entry.next_attempt_at)
        .bind(entry.status.as_str())
        .bind(entry.created_at)
        .bind(entry.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| to_port_error(e, "outbox_entries.insert"))?;
        Ok(())
    }

    async fn update(&self, entry: OutboxEntry) -> Result<(), PortError> {
        let result = sqlx::query(
            r#"
            UPDATE outbox_entries
            SET attempts = $2, next_attempt_at = $3, status = $4, updated_at = $5
            WHERE id = $1
            "#,
        )
        .bind(*entry.id.as_uuid())
        .bind(entry.attempts as i32)
        .bind(entry.next_attempt_at)
        .bind(entry.status.as_str())
        .bind(entry.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| to_port_error(e, "outbox_entries.update"))?;

        if result.rows_affected() == 0 {
            return Err(PortError::not_found("outbox entry", entry.id));
        }
        Ok(())
    }

    async fn list_due(&self, now: DateTime<Utc>) -> Result<Vec<OutboxEntry>, PortError> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM outbox_entries
            WHERE status = 'pending' AND next_attempt_at <= $1
            ORDER BY next_attempt_at
            "#,
        )
        .bind(now)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| to_port_error(e, "outbox_entries.list_due"))?;
        rows.iter().map(entry_from_row).collect()
    }

    async fn list_dead(&self) -> Result<Vec<OutboxEntry>, PortError> {
        let rows =
            sqlx::query("SELECT * FROM outbox_entries WHERE status = 'dead' ORDER BY updated_at")
                .fetch_all(&self.pool)
                .await
                .map_err(|e| to_port_error(e, "outbox_entries.list_dead"))?;
        rows.iter().map(entry_from_row).collect()
    }
}
