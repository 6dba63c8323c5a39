//! Credit notes
//!
//! A credit note records an out-of-band adjustment (refund, goodwill, or
//! billing correction) against a subscription. Credit notes are
//! append-only; they never mutate the invoice they relate to.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use core_kernel::{CreditNoteId, CustomerId, Money, SubscriptionId};

use crate::error::InvoicingError;

/// An append-only credit adjustment
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreditNote {
    /// Unique identifier
    pub id: CreditNoteId,
    /// Subscription being credited
    pub subscription_id: SubscriptionId,
    /// Customer being credited
    pub customer_id: CustomerId,
    /// Credited amount, always positive
    pub amount: Money,
    /// Operator-supplied reason
    pub reason: String,
    /// Created timestamp
    pub created_at: DateTime<Utc>,
}

impl CreditNote {
    /// Creates a credit note
    ///
    /// # Errors
    ///
    /// Returns `InvoicingError::Validation` if the amount is not strictly
    /// positive or the reason is empty.
    pub fn new(
        subscription_id: SubscriptionId,
        customer_id: CustomerId,
        amount: Money,
        reason: impl Into<String>,
    ) -> Result<Self, InvoicingError> {
        if !amount.is_positive() {
            return Err(InvoicingError::Validation(format!(
                "credit amount must be positive, got {amount}"
            )));
        }
        let reason = reason.into();
        if reason.trim().is_empty() {
            return Err(InvoicingError::Validation(
                "credit reason must not be empty".to_string(),
            ));
        }
        Ok(Self {
            id: CreditNoteId::new_v7(),
            subscription_id,
            customer_id,
            amount,
            reason,
            created_at: Utc::now(),
        })
    }
}
