//! Customer records
//!
//! Customers are created by onboarding and never deleted; only contact and
//! address fields are mutable, through a structured patch object.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use core_kernel::{CustomerId, OrgId};

/// A billable customer belonging to an organization
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Customer {
    /// Unique identifier
    pub id: CustomerId,
    /// Owning organization
    pub org_id: OrgId,
    /// Display name
    pub name: String,
    /// Contact email
    pub email: String,
    /// Settlement-rail address payouts and payments use
    pub settlement_address: String,
    /// Billing country (ISO 3166-1 alpha-2)
    pub country: String,
    /// Created timestamp
    pub created_at: DateTime<Utc>,
    /// Updated timestamp
    pub updated_at: DateTime<Utc>,
}

impl Customer {
    /// Creates a new customer
    pub fn new(
        org_id: OrgId,
        name: impl Into<String>,
        email: impl Into<String>,
        settlement_address: impl Into<String>,
        country: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: CustomerId::new_v7(),
            org_id,
            name: name.into(),
            email: email.into(),
            settlement_address: settlement_address.into(),
            country: country.into().to_uppercase(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Applies a contact patch; identity and ownership fields are immutable
    pub fn apply_patch(&mut self, patch: CustomerPatch) {
        if let Some(email) = patch.email {
            self.email = email;
        }
        if let Some(address) = patch.settlement_address {
            self.settlement_address = address;
        }
        if let Some(country) = patch.country {
            self.country = country.to_uppercase();
        }
        self.updated_at = Utc::now();
    }
}

/// Structured update for the mutable customer fields
///
/// Every update goes through this fixed shape; there is no dynamic
/// per-field update path.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CustomerPatch {
    /// New contact email
    pub email: Option<String>,
    /// New settlement address
    pub settlement_address: Option<String>,
    /// New billing country
    pub country: Option<String>,
}
