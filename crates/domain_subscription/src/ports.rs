//! Subscription Domain Ports
//!
//! Store and external-service interfaces the subscription domain needs.
//! The PostgreSQL adapters live in `infra_store`; in-memory adapters for
//! tests live in the `mock` module here, mirroring the store contract
//! including the compare-and-swap version check.

use async_trait::async_trait;

use core_kernel::{CustomerId, DomainPort, OrgId, PortError, Rate, SubscriptionId};

use crate::customer::Customer;
use crate::subscription::Subscription;

/// Durable storage for customers
#[async_trait]
pub trait CustomerStore: DomainPort {
    /// Persists a new customer
    async fn insert(&self, customer: Customer) -> Result<(), PortError>;

    /// Retrieves a customer by ID
    async fn get(&self, id: CustomerId) -> Result<Customer, PortError>;

    /// Persists patched contact fields
    async fn update(&self, customer: Customer) -> Result<Customer, PortError>;

    /// Whether a customer exists
    async fn exists(&self, id: CustomerId) -> Result<bool, PortError>;

    /// All customers belonging to an organization
    async fn list_by_org(&self, org_id: OrgId) -> Result<Vec<Customer>, PortError>;
}

/// Durable storage for subscriptions
///
/// Updates are compare-and-swap on the subscription's version: the store
/// rejects a write whose `expected_version` is stale with
/// `PortError::Conflict`, and bumps the version on success.
#[async_trait]
pub trait SubscriptionStore: DomainPort {
    /// Persists a new subscription
    async fn insert(&self, subscription: Subscription) -> Result<(), PortError>;

    /// Retrieves a subscription by ID
    async fn get(&self, id: SubscriptionId) -> Result<Subscription, PortError>;

    /// Compare-and-swap update; returns the stored row with bumped version
    async fn update(
        &self,
        subscription: &Subscription,
        expected_version: u64,
    ) -> Result<Subscription, PortError>;

    /// All subscriptions for one customer
    async fn list_by_customer(&self, customer_id: CustomerId)
        -> Result<Vec<Subscription>, PortError>;

    /// Every subscription; used by the periodic billing passes
    async fn list_all(&self) -> Result<Vec<Subscription>, PortError>;
}

/// External tax service
///
/// Resolves the tax rate for a billing country at subscription creation.
/// Callers fall back to a configured default rate when this port fails.
#[async_trait]
pub trait TaxPort: DomainPort {
    /// Computes the applicable tax rate for a country
    async fn compute_rate(&self, country: &str) -> Result<Rate, PortError>;
}

/// In-memory adapters for testing
#[cfg(any(test, feature = "mock"))]
pub mod mock {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Arc;
    use tokio::sync::RwLock;

    /// In-memory customer store
    #[derive(Debug, Default)]
    pub struct MemoryCustomerStore {
        customers: Arc<RwLock<HashMap<CustomerId, Customer>>>,
    }

    impl MemoryCustomerStore {
        pub fn new() -> Self {
            Self::default()
        }
    }

    impl DomainPort for MemoryCustomerStore {}

    #[async_trait]
    impl CustomerStore for MemoryCustomerStore {
        async fn insert(&self, customer: Customer) -> Result<(), PortError> {
            self.customers.write().await.insert(customer.id, customer);
            Ok(())
        }

        async fn get(&self, id: CustomerId) -> Result<Customer, PortError> {
            self.customers
                .read()
                .await
                .get(&id)
                .cloned()
                .ok_or_else(|| PortError::not_found("Customer", id))
        }

        async fn update(&self, customer: Customer) -> Result<Customer, PortError> {
            let mut customers = self.customers.write().await;
            if !customers.contains_key(&customer.id) {
                return Err(PortError::not_found("Customer", customer.id));
            }
            customers.insert(customer.id, customer.clone());
            Ok(customer)
        }

        async fn exists(&self, id: CustomerId) -> Result<bool, PortError> {
            Ok(self.customers.read().await.contains_key(&id))
        }

        async fn list_by_org(&self, org_id: OrgId) -> Result<Vec<Customer>, PortError> {
            Ok(self
                .customers
                .read()
                .await
                .values()
                .filter(|c| c.org_id == org_id)
                .cloned()
                .collect())
        }
    }

    /// In-memory subscription store with the same CAS semantics as the
    /// PostgreSQL adapter
    #[derive(Debug, Default)]
    pub struct MemorySubscriptionStore {
        subscriptions: Arc<RwLock<HashMap<SubscriptionId, Subscription>>>,
    }

    impl MemorySubscriptionStore {
        pub fn new() -> Self {
            Self::default()
        }
    }

    impl DomainPort for MemorySubscriptionStore {}

    #[async_trait]
    impl SubscriptionStore for MemorySubscriptionStore {
        async fn insert(&self, subscription: Subscription) -> Result<(), PortError> {
            let mut subscriptions = self.subscriptions.write().await;
            if subscriptions.contains_key(&subscription.id) {
                return Err(PortError::conflict(format!(
                    "subscription {} already exists",
                    subscription.id
                )));
            }
            subscriptions.insert(subscription.id, subscription);
            Ok(())
        }

        async fn get(&self, id: SubscriptionId) -> Result<Subscription, PortError> {
            self.subscriptions
                .read()
                .await
                .get(&id)
                .cloned()
                .ok_or_else(|| PortError::not_found("Subscription", id))
        }

        async fn update(
            &self,
            subscription: &Subscription,
            expected_version: u64,
        ) -> Result<Subscription, PortError> {
            let mut subscriptions = self.subscriptions.write().await;
            let stored = subscriptions
                .get_mut(&subscription.id)
                .ok_or_else(|| PortError::not_found("Subscription", subscription.id))?;

            if stored.version != expected_version {
                return Err(PortError::conflict(format!(
                    "subscription {}: expected version {}, found {}",
                    subscription.id, expected_version, stored.version
                )));
            }

            let mut updated = subscription.clone();
            updated.version = expected_version + 1;
            *stored = updated.clone();
            Ok(updated)
        }

        async fn list_by_customer(
            &self,
            customer_id: CustomerId,
        ) -> Result<Vec<Subscription>, PortError> {
            Ok(self
                .subscriptions
                .read()
                .await
                .values()
                .filter(|s| s.customer_id == customer_id)
                .cloned()
                .collect())
        }

        async fn list_all(&self) -> Result<Vec<Subscription>, PortError> {
            let mut all: Vec<Subscription> =
                self.subscriptions.read().await.values().cloned().collect();
            all.sort_by_key(|s| s.created_at);
            Ok(all)
        }
    }

    /// Tax port returning a fixed rate, or failing on demand to exercise
    /// the fallback path
    #[derive(Debug)]
    pub struct FixedTaxPort {
        rate: Option<Rate>,
    }

    impl FixedTaxPort {
        pub fn with_rate(rate: Rate) -> Self {
            Self { rate: Some(rate) }
        }

        pub fn failing() -> Self {
            Self { rate: None }
        }
    }

    impl DomainPort for FixedTaxPort {}

    #[async_trait]
    impl TaxPort for FixedTaxPort {
        async fn compute_rate(&self, _country: &str) -> Result<Rate, PortError> {
            self.rate.ok_or_else(|| PortError::ServiceUnavailable {
                service: "tax".to_string(),
            })
        }
    }
}
