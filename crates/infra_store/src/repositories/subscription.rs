//! Customer and subscription stores

use async_trait::async_trait;
use rust_decimal::Decimal;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use core_kernel::{Currency, CustomerId, DomainPort, Money, OrgId, PortError, Rate, SubscriptionId};
use domain_subscription::{Customer, CustomerStore, Subscription, SubscriptionStatus, SubscriptionStore};

use crate::error::{corrupt_row, to_port_error};

/// PostgreSQL-backed customer store
#[derive(Debug, Clone)]
pub struct PgCustomerStore {
    pool: PgPool,
}

impl PgCustomerStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

impl DomainPort for PgCustomerStore {}

fn customer_from_row(row: &PgRow) -> Result<Customer, PortError> {
    let map = |e: sqlx::Error| corrupt_row("customers", e);
    Ok(Customer {
        id: CustomerId::from_uuid(row.try_get("id").map_err(map)?),
        org_id: OrgId::from_uuid(row.try_get("org_id").map_err(map)?),
        name: row.try_get("name").map_err(map)?,
        email: row.try_get("email").map_err(map)?,
        settlement_address: row.try_get("settlement_address").map_err(map)?,
        country: row.try_get("country").map_err(map)?,
        created_at: row.try_get("created_at").map_err(map)?,
        updated_at: row.try_get("updated_at").map_err(map)?,
    })
}

#[async_trait]
impl CustomerStore for PgCustomerStore {
    async fn insert(&self, customer: Customer) -> Result<(), PortError> {
        sqlx::query(
            r#"
            INSERT INTO customers (
                id, org_id, name, email, settlement_address, country,
                created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(*customer.id.as_uuid())
        .bind(*customer.org_id.as_uuid())
        .bind(&customer.name)
        .bind(&customer.email)
        .bind(&customer.settlement_address)
        .bind(&customer.country)
        .bind(customer.created_at)
        .bind(customer.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| to_port_error(e, "customers.insert"))?;
        Ok(())
    }

    async fn get(&self, id: CustomerId) -> Result<Customer, PortError> {
        let row = sqlx::query("SELECT * FROM customers WHERE id = $1")
            .bind(*id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| to_port_error(e, "customers.get"))?
            .ok_or_else(|| PortError::not_found("customer", id))?;
        customer_from_row(&row)
    }

    async fn update(&self, customer: Customer) -> Result<Customer, PortError> {
        let result = sqlx::query(
            r#"
            UPDATE customers
            SET email = $2, settlement_address = $3, country = $4, updated_at = $5
            WHERE id = $1
            "#,
        )
        .bind(*customer.id.as_uuid())
        .bind(&customer.email)
        .bind(&customer.settlement_address)
        .bind(&customer.country)
        .bind(customer.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| to_port_error(e, "customers.update"))?;

        if result.rows_affected() == 0 {
            return Err(PortError::not_found("customer", customer.id));
        }
        Ok(customer)
    }

    async fn exists(&self, id: CustomerId) -> Result<bool, PortError> {
        let row = sqlx::query("SELECT EXISTS (SELECT 1 FROM customers WHERE id = $1) AS present")
            .bind(*id.as_uuid())
            .fetch_one(&self.pool)
            .await
            .map_err(|e| to_port_error(e, "customers.exists"))?;
        row.try_get("present").map_err(|e| corrupt_row("customers", e))
    }

    async fn list_by_org(&self, org_id: OrgId) -> Result<Vec<Customer>, PortError> {
        let rows = sqlx::query("SELECT * FROM customers WHERE org_id = $1 ORDER BY created_at")
            .bind(*org_id.as_uuid())
            .fetch_all(&self.pool)
            .await
            .map_err(|e| to_port_error(e, "customers.list_by_org"))?;
        rows.iter().map(customer_from_row).collect()
    }
}

/// PostgreSQL-backed subscription store with optimistic versioning
#[derive(Debug, Clone)]
pub struct PgSubscriptionStore {
    pool: PgPool,
}

impl PgSubscriptionStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

impl DomainPort for PgSubscriptionStore {}

fn subscription_from_row(row: &PgRow) -> Result<Subscription, PortError> {
    let map = |e: sqlx::Error| corrupt_row("subscriptions", e);
    let currency: Currency = row
        .try_get::<String, _>("currency")
        .map_err(map)?
        .parse()
        .map_err(|e| corrupt_row("subscriptions", e))?;
    let status: SubscriptionStatus = row
        .try_get::<String, _>("status")
        .map_err(map)?
        .parse()
        .map_err(|e: String| corrupt_row("subscriptions", e))?;
    Ok(Subscription {
        id: SubscriptionId::from_uuid(row.try_get("id").map_err(map)?),
        customer_id: CustomerId::from_uuid(row.try_get("customer_id").map_err(map)?),
        plan: row.try_get("plan").map_err(map)?,
        base_amount: Money::new(row.try_get::<Decimal, _>("base_amount").map_err(map)?, currency),
        tax_rate: Rate::new(row.try_get::<Decimal, _>("tax_rate").map_err(map)?),
        coupon_pct: Rate::new(row.try_get::<Decimal, _>("coupon_pct").map_err(map)?),
        trial_days: row.try_get::<i32, _>("trial_days").map_err(map)? as u32,
        entitlement: row.try_get("entitlement").map_err(map)?,
        auto_dunning: row.try_get("auto_dunning").map_err(map)?,
        status,
        start_date: row.try_get("start_date").map_err(map)?,
        last_bill_date: row.try_get("last_bill_date").map_err(map)?,
        version: row.try_get::<i64, _>("version").map_err(map)? as u64,
        created_at: row.try_get("created_at").map_err(map)?,
        updated_at: row.try_get("updated_at").map_err(map)?,
    })
}

#[async_trait]
impl SubscriptionStore for PgSubscriptionStore {
    async fn insert(&self, subscription: Subscription) -> Result<(), PortError> {
        sqlx::query(
            r#"
            INSERT INTO subscriptions (
                id, customer_id, plan, base_amount, currency, tax_rate,
                coupon_pct, trial_days, entitlement, auto_dunning, status,
                start_date, last_bill_date, version, created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
            "#,
        )
        .bind(*subscription.id.as_uuid())
        .bind(*subscription.customer_id.as_uuid())
        .bind(&subscription.plan)
        .bind(subscription.base_amount.amount())
        .bind(subscription.base_amount.currency().code())
        .bind(subscription.tax_rate.as_decimal())
        .bind(subscription.coupon_pct.as_decimal())
        .bind(subscription.trial_days as i32)
        .bind(&subscription.entitlement)
        .bind(subscription.auto_dunning)
        .bind(subscription.status.as_str())
        .bind(subscription.start_date)
        .bind(subscription.last_bill_date)
        .bind(subscription.version as i64)
        .bind(subscription.created_at)
        .bind(subscription.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| to_port_error(e, "subscriptions.insert"))?;
        Ok(())
    }

    async fn get(&self, id: SubscriptionId) -> Result<Subscription, PortError> {
        let row = sqlx::query("SELECT * FROM subscriptions WHERE id = $1")
            .bind(*id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| to_port_error(e, "subscriptions.get"))?
            .ok_or_else(|| PortError::not_found("subscription", id))?;
        subscription_from_row(&row)
    }

    async fn update(
        &self,
        subscription: &Subscription,
        expected_version: u64,
    ) -> Result<Subscription, PortError> {
        let result = sqlx::query(
            r#"
            UPDATE subscriptions
            SET plan = $3, base_amount = $4, tax_rate = $5, coupon_pct = $6,
                status = $7, last_bill_date = $8, version = version + 1,
                updated_at = $9
            WHERE id = $1 AND version = $2
            "#,
        )
        .bind(*subscription.id.as_uuid())
        .bind(expected_version as i64)
        .bind(&subscription.plan)
        .bind(subscription.base_amount.amount())
        .bind(subscription.tax_rate.as_decimal())
        .bind(subscription.coupon_pct.as_decimal())
        .bind(subscription.status.as_str())
        .bind(subscription.last_bill_date)
        .bind(subscription.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| to_port_error(e, "subscriptions.update"))?;

        if result.rows_affected() == 0 {
            return Err(stale_or_missing(
                &self.pool,
                "subscriptions",
                "subscription",
                *subscription.id.as_uuid(),
            )
            .await);
        }

        let mut stored = subscription.clone();
        stored.version = expected_version + 1;
        Ok(stored)
    }

    async fn list_by_customer(
        &self,
        customer_id: CustomerId,
    ) -> Result<Vec<Subscription>, PortError> {
        let rows =
            sqlx::query("SELECT * FROM subscriptions WHERE customer_id = $1 ORDER BY created_at")
                .bind(*customer_id.as_uuid())
                .fetch_all(&self.pool)
                .await
                .map_err(|e| to_port_error(e, "subscriptions.list_by_customer"))?;
        rows.iter().map(subscription_from_row).collect()
    }

    async fn list_all(&self) -> Result<Vec<Subscription>, PortError> {
        let rows = sqlx::query("SELECT * FROM subscriptions ORDER BY created_at")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| to_port_error(e, "subscriptions.list_all"))?;
        rows.iter().map(subscription_from_row).collect()
    }
}

/// Distinguishes a lost version race from a missing row after a
/// zero-row compare-and-swap update.
pub(crate) async fn stale_or_missing(
    pool: &PgPool,
    table: &str,
    entity: &str,
    id: Uuid,
) -> PortError {
    let query = format!("SELECT EXISTS (SELECT 1 FROM {table} WHERE id = $1) AS present");
    match sqlx::query(&query).bind(id).fetch_one(pool).await {
        Ok(row) => match row.try_get::<bool, _>("present") {
            Ok(true) => PortError::conflict(format!("{entity} {id} was modified concurrently")),
            Ok(false) => PortError::not_found(entity, id),
            Err(e) => corrupt_row(table, e),
        },
        Err(e) => to_port_error(e, table),
    }
}
