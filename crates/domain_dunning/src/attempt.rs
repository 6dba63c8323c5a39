//! Dunning attempt records

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use core_kernel::{DunningAttemptId, InvoiceId};

/// Outcome of one collection attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AttemptOutcome {
    /// Customer notified, payment not yet seen
    Pending,
    /// Notification could not be delivered
    Failed,
    /// Payment arrived after this attempt
    Recovered,
}

impl AttemptOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttemptOutcome::Pending => "pending",
            AttemptOutcome::Failed => "failed",
            AttemptOutcome::Recovered => "recovered",
        }
    }
}

/// One append-only collection attempt against an invoice
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DunningAttempt {
    /// Unique identifier
    pub id: DunningAttemptId,
    /// Invoice being collected on
    pub invoice_id: InvoiceId,
    /// Strictly increasing per invoice, starting at 1
    pub attempt_number: u32,
    /// When the attempt was made
    pub attempted_at: DateTime<Utc>,
    /// Outcome
    pub outcome: AttemptOutcome,
}

impl DunningAttempt {
    pub fn new(
        invoice_id: InvoiceId,
        attempt_number: u32,
        outcome: AttemptOutcome,
        attempted_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: DunningAttemptId::new_v7(),
            invoice_id,
            attempt_number,
            attempted_at,
            outcome,
        }
    }
}
