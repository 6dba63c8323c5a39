//! Payout records

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use core_kernel::{Money, PayoutBatchId, PayoutId};

/// Payout execution state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PayoutStatus {
    /// Scheduled, waiting for execution
    Pending,
    /// Transfer in flight
    Processing,
    /// Transfer confirmed by the rail
    Completed,
    /// Transfer failed after exhausting retries
    Failed,
    /// Held by the fraud screen for manual review
    Flagged,
}

impl PayoutStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PayoutStatus::Pending => "pending",
            PayoutStatus::Processing => "processing",
            PayoutStatus::Completed => "completed",
            PayoutStatus::Failed => "failed",
            PayoutStatus::Flagged => "flagged",
        }
    }
}

/// One outbound transfer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Payout {
    /// Unique identifier
    pub id: PayoutId,
    /// Settlement-rail destination address
    pub destination: String,
    /// Gross amount requested
    pub amount: Money,
    /// Rail fee deducted from the gross amount
    pub fee: Money,
    /// Amount actually transferred (`amount - fee`)
    pub net: Money,
    /// Recipient passed verification at request time
    pub verified: bool,
    /// Manually approved at request time
    pub approved: bool,
    /// Future execution time, if scheduled
    pub scheduled_for: Option<DateTime<Utc>>,
    /// Deterministic key the rail dedupes on
    pub idempotency_key: Uuid,
    /// Rail transaction reference once a transfer ran
    pub tx_ref: Option<String>,
    /// Owning batch, if part of one
    pub batch_id: Option<PayoutBatchId>,
    /// Execution state
    pub status: PayoutStatus,
    /// When the transfer completed or failed
    pub executed_at: Option<DateTime<Utc>>,
    /// Optimistic concurrency version
    pub version: u64,
    /// Created timestamp
    pub created_at: DateTime<Utc>,
    /// Updated timestamp
    pub updated_at: DateTime<Utc>,
}

/// Aggregate state of a batch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BatchStatus {
    /// Rows still executing
    Processing,
    /// Every row completed
    Completed,
    /// At least one row failed; failed rows are retained for retry
    Failed,
    /// Held whole by the fraud screen
    Flagged,
}

impl BatchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BatchStatus::Processing => "processing",
            BatchStatus::Completed => "completed",
            BatchStatus::Failed => "failed",
            BatchStatus::Flagged => "flagged",
        }
    }
}

/// A group of payouts gated and screened together
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PayoutBatch {
    /// Unique identifier
    pub id: PayoutBatchId,
    /// Sum of row amounts
    pub total_amount: Money,
    /// Number of rows
    pub row_count: usize,
    /// Aggregate state
    pub status: BatchStatus,
    /// Rows that failed, for retry
    pub failed_payouts: Vec<PayoutId>,
    /// Created timestamp
    pub created_at: DateTime<Utc>,
    /// Updated timestamp
    pub updated_at: DateTime<Utc>,
}
