//! Billing engine daemon
//!
//! Runs the periodic billing passes against PostgreSQL.
//!
//! # Environment variables
//!
//! * `BILLING_DATABASE_URL` - PostgreSQL connection string
//! * `BILLING_LOG_LEVEL` - log level when `RUST_LOG` is unset
//! * `BILLING_JOB_INTERVAL_SECS` - seconds between job passes
//! * `BILLING_WEBHOOK_ENDPOINTS` - comma-separated `event=url` registrations
//!
//! Every other `EngineConfig` field can be overridden with the same
//! `BILLING_` prefix.

use std::sync::Arc;

use rust_decimal_macros::dec;

use core_engine::{
    init_tracing, BillingEngine, EngineConfig, EnginePorts, JobScheduler, LoggingNotifier,
    StaticTaxPort,
};
use core_kernel::{Currency, Money, Rate};
use domain_payout::MockRail;
use infra_store::{
    create_pool, run_migrations, PgAuditStore, PgCreditNoteStore, PgCustomerStore, PgDunningStore,
    PgInvoiceStore, PgOutboxStore, PgPayoutStore, PgRevenueStore, PgSubscriptionStore, StoreConfig,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let config = EngineConfig::from_env().map_err(|e| anyhow::anyhow!("configuration: {e}"))?;
    init_tracing(&config.log_level);

    tracing::info!(interval_secs = config.job_interval_secs, "starting billing daemon");

    let currency: Currency = config
        .default_currency
        .parse()
        .map_err(|e| anyhow::anyhow!("default_currency: {e}"))?;

    let registrations = config
        .webhook_registrations()
        .map_err(|e| anyhow::anyhow!("webhook_endpoints: {e}"))?;

    let pool = create_pool(StoreConfig::new(&config.database_url)).await?;
    run_migrations(&pool).await?;

    let ports = EnginePorts {
        customers: Arc::new(PgCustomerStore::new(pool.clone())),
        subscriptions: Arc::new(PgSubscriptionStore::new(pool.clone())),
        invoices: Arc::new(PgInvoiceStore::new(pool.clone())),
        credit_notes: Arc::new(PgCreditNoteStore::new(pool.clone())),
        revenue: Arc::new(PgRevenueStore::new(pool.clone())),
        dunning: Arc::new(PgDunningStore::new(pool.clone())),
        payouts: Arc::new(PgPayoutStore::new(pool.clone())),
        audit: Arc::new(PgAuditStore::new(pool.clone())),
        outbox: Arc::new(PgOutboxStore::new(pool.clone())),
        tax: Arc::new(StaticTaxPort::new(Rate::from_percentage(
            config.default_tax_rate_pct,
        ))),
        // TODO(rail): replace with the production rail adapter once the
        // settlement provider integration lands.
        rail: Arc::new(MockRail::with_balance(Money::new(dec!(1_000_000), currency))),
        notifier: Arc::new(LoggingNotifier),
    };

    let engine = Arc::new(
        BillingEngine::new(ports, registrations, &config)
            .map_err(|e| anyhow::anyhow!("engine wiring failed: {e}"))?,
    );

    let scheduler = JobScheduler::new(
        engine,
        std::time::Duration::from_secs(config.job_interval_secs),
    );

    tokio::select! {
        _ = scheduler.run() => {}
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutdown signal received");
        }
    }

    Ok(())
}
