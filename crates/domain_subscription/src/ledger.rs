//! Subscription Ledger
//!
//! Application service over the customer and subscription stores. All
//! writes from the engine flow through here so that validation, tax
//! resolution, and version-checked updates happen in one place.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{info, instrument, warn};

use core_kernel::{CustomerId, OrgId, Rate, SubscriptionId};

use crate::customer::{Customer, CustomerPatch};
use crate::error::SubscriptionError;
use crate::ports::{CustomerStore, SubscriptionStore, TaxPort};
use crate::subscription::{CreateSubscriptionRequest, Subscription};

/// Service coordinating customer and subscription lifecycles
pub struct SubscriptionLedger {
    customers: Arc<dyn CustomerStore>,
    subscriptions: Arc<dyn SubscriptionStore>,
    tax: Arc<dyn TaxPort>,
    fallback_tax_rate: Rate,
}

impl SubscriptionLedger {
    pub fn new(
        customers: Arc<dyn CustomerStore>,
        subscriptions: Arc<dyn SubscriptionStore>,
        tax: Arc<dyn TaxPort>,
        fallback_tax_rate: Rate,
    ) -> Self {
        Self {
            customers,
            subscriptions,
            tax,
            fallback_tax_rate,
        }
    }

    /// Registers a new customer
    ///
    /// # Errors
    ///
    /// Returns `SubscriptionError::Validation` if the name or email is
    /// empty, or a port error if the write fails.
    #[instrument(skip(self))]
    pub async fn create_customer(
        &self,
        org_id: OrgId,
        name: &str,
        email: &str,
        settlement_address: &str,
        country: &str,
    ) -> Result<Customer, SubscriptionError> {
        if name.trim().is_empty() {
            return Err(SubscriptionError::Validation(
                "customer name must not be empty".to_string(),
            ));
        }
        if email.trim().is_empty() || !email.contains('@') {
            return Err(SubscriptionError::Validation(format!(
                "invalid email address: {email}"
            )));
        }

        let customer = Customer::new(org_id, name, email, settlement_address, country);
        self.customers.insert(customer.clone()).await?;

        info!(customer_id = %customer.id, "customer created");
        Ok(customer)
    }

    /// Applies a contact-field patch to an existing customer
    #[instrument(skip(self, patch))]
    pub async fn update_customer(
        &self,
        customer_id: CustomerId,
        patch: CustomerPatch,
    ) -> Result<Customer, SubscriptionError> {
        if let Some(email) = &patch.email {
            if email.trim().is_empty() || !email.contains('@') {
                return Err(SubscriptionError::Validation(format!(
                    "invalid email address: {email}"
                )));
            }
        }

        let mut customer = self.customers.get(customer_id).await?;
        customer.apply_patch(patch);
        let customer = self.customers.update(customer).await?;

        info!(customer_id = %customer.id, "customer updated");
        Ok(customer)
    }

    /// Retrieves a customer by ID
    pub async fn get_customer(&self, customer_id: CustomerId) -> Result<Customer, SubscriptionError> {
        Ok(self.customers.get(customer_id).await?)
    }

    /// Creates a subscription for an existing customer
    ///
    /// The tax rate for the customer's billing country is resolved once,
    /// at creation, and stored on the subscription. When the tax port is
    /// unreachable the configured fallback rate is applied instead.
    ///
    /// # Errors
    ///
    /// Returns `SubscriptionError::NotFound` for an unknown customer and
    /// `SubscriptionError::Validation` for a negative base amount or a
    /// coupon outside [0, 1].
    #[instrument(skip(self, request), fields(customer_id = %request.customer_id))]
    pub async fn create(
        &self,
        request: CreateSubscriptionRequest,
        now: DateTime<Utc>,
    ) -> Result<Subscription, SubscriptionError> {
        if request.base_amount.is_negative() {
            return Err(SubscriptionError::Validation(
                "base amount must not be negative".to_string(),
            ));
        }
        let coupon = request.coupon_pct.as_decimal();
        if coupon < rust_decimal::Decimal::ZERO || coupon > rust_decimal::Decimal::ONE {
            return Err(SubscriptionError::Validation(format!(
                "coupon must be within [0, 1], got {coupon}"
            )));
        }

        let customer = match self.customers.get(request.customer_id).await {
            Ok(customer) => customer,
            Err(e) if e.is_not_found() => {
                return Err(SubscriptionError::NotFound(format!(
                    "customer {}",
                    request.customer_id
                )))
            }
            Err(e) => return Err(e.into()),
        };

        let tax_rate = match self.tax.compute_rate(&customer.country).await {
            Ok(rate) => rate,
            Err(e) => {
                warn!(
                    country = %customer.country,
                    error = %e,
                    "tax lookup failed, applying fallback rate"
                );
                self.fallback_tax_rate
            }
        };

        let subscription = Subscription::new(request, tax_rate, now);
        self.subscriptions.insert(subscription.clone()).await?;

        info!(
            subscription_id = %subscription.id,
            status = subscription.status.as_str(),
            "subscription created"
        );
        Ok(subscription)
    }

    /// Cancels a subscription; repeated cancels are accepted and ignored
    #[instrument(skip(self))]
    pub async fn cancel(&self, id: SubscriptionId) -> Result<Subscription, SubscriptionError> {
        let mut subscription = self.subscriptions.get(id).await?;
        let expected_version = subscription.version;

        if !subscription.cancel() {
            return Ok(subscription);
        }

        let subscription = self
            .subscriptions
            .update(&subscription, expected_version)
            .await?;

        info!(subscription_id = %subscription.id, "subscription canceled");
        Ok(subscription)
    }

    /// Moves a subscription to a new plan and price
    ///
    /// The billing anchor and last bill date are preserved, so the next
    /// invoice covers the same period at the new price.
    #[instrument(skip(self, new_amount))]
    pub async fn upgrade(
        &self,
        id: SubscriptionId,
        new_plan: &str,
        new_amount: core_kernel::Money,
    ) -> Result<Subscription, SubscriptionError> {
        let mut subscription = self.subscriptions.get(id).await?;
        let expected_version = subscription.version;

        subscription.upgrade(new_plan, new_amount)?;

        let subscription = self
            .subscriptions
            .update(&subscription, expected_version)
            .await?;

        info!(
            subscription_id = %subscription.id,
            plan = %subscription.plan,
            "subscription upgraded"
        );
        Ok(subscription)
    }

    /// Retrieves a subscription by ID
    pub async fn get(&self, id: SubscriptionId) -> Result<Subscription, SubscriptionError> {
        Ok(self.subscriptions.get(id).await?)
    }

    /// All subscriptions for one customer
    pub async fn list_by_customer(
        &self,
        customer_id: CustomerId,
    ) -> Result<Vec<Subscription>, SubscriptionError> {
        Ok(self.subscriptions.list_by_customer(customer_id).await?)
    }
}
