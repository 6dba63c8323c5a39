//! Engine configuration

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Deserialize;

use domain_events::WebhookRegistration;

/// Runtime configuration for the billing engine
///
/// Loaded from the environment with the `BILLING_` prefix
/// (e.g. `BILLING_DATABASE_URL`, `BILLING_FRAUD_THRESHOLD`); any field
/// not set falls back to the documented default.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// PostgreSQL connection string
    pub database_url: String,
    /// Minimum log level when `RUST_LOG` is unset
    pub log_level: String,
    /// Currency assumed for reporting and the settlement rail fee
    pub default_currency: String,
    /// Billing period length in days
    pub period_length_days: u32,
    /// Dunning retry offsets in days after the due date
    pub dunning_offsets_days: Vec<i64>,
    /// Fallback tax rate in percent when the tax port is unavailable
    pub default_tax_rate_pct: Decimal,
    /// Modified z-score above which a payout is flagged
    pub fraud_threshold: Decimal,
    /// Flat fee charged per settlement rail transfer
    pub rail_fee: Decimal,
    /// Retry budget for transient rail transfer failures
    pub max_transfer_retries: u32,
    /// Delay between rail transfer retries, in milliseconds
    pub transfer_backoff_ms: u64,
    /// Webhook delivery attempts before an entry dead-letters
    pub outbox_max_attempts: u32,
    /// Base webhook retry backoff, in seconds (doubles per attempt)
    pub outbox_base_backoff_secs: i64,
    /// Interval between periodic job passes, in seconds
    pub job_interval_secs: u64,
    /// Webhook registrations as `event=url` pairs
    /// (e.g. `BILLING_WEBHOOK_ENDPOINTS=invoice_paid=https://a,sub_cancel=https://b`)
    pub webhook_endpoints: Vec<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            database_url: "postgres://localhost/billing".to_string(),
            log_level: "info".to_string(),
            default_currency: "USD".to_string(),
            period_length_days: 30,
            dunning_offsets_days: vec![1, 3, 7],
            default_tax_rate_pct: dec!(10),
            fraud_threshold: dec!(3.5),
            rail_fee: dec!(0.25),
            max_transfer_retries: 3,
            transfer_backoff_ms: 200,
            outbox_max_attempts: 5,
            outbox_base_backoff_secs: 60,
            job_interval_secs: 300,
            webhook_endpoints: Vec::new(),
        }
    }
}

impl EngineConfig {
    /// Loads configuration from the environment
    pub fn from_env() -> Result<Self, config::ConfigError> {
        config::Config::builder()
            .add_source(
                config::Environment::with_prefix("BILLING")
                    .try_parsing(true)
                    .list_separator(","),
            )
            .build()?
            .try_deserialize()
    }

    /// Parses `webhook_endpoints` into registrations, rejecting malformed pairs
    pub fn webhook_registrations(
        &self,
    ) -> Result<Vec<WebhookRegistration>, config::ConfigError> {
        self.webhook_endpoints
            .iter()
            .map(|pair| match pair.split_once('=') {
                Some((event, url)) if !event.is_empty() && !url.is_empty() => {
                    Ok(WebhookRegistration {
                        event: event.to_string(),
                        url: url.to_string(),
                    })
                }
                _ => Err(config::ConfigError::Message(format!(
                    "webhook_endpoints entry {pair:?} is not an event=url pair"
                ))),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_sane() {
        let config = EngineConfig::default();
        assert_eq!(config.period_length_days, 30);
        assert_eq!(config.dunning_offsets_days, vec![1, 3, 7]);
        assert_eq!(config.default_tax_rate_pct, dec!(10));
        assert_eq!(config.fraud_threshold, dec!(3.5));
    }

    #[test]
    fn test_from_env_rejects_malformed_values() {
        std::env::set_var("BILLING_FRAUD_THRESHOLD", "not-a-number");
        let result = EngineConfig::from_env();
        std::env::remove_var("BILLING_FRAUD_THRESHOLD");
        assert!(result.is_err());
    }

    #[test]
    fn test_webhook_endpoint_parsing() {
        let mut config = EngineConfig::default();
        config.webhook_endpoints = vec![
            "invoice_paid=https://hooks.example.com/billing".to_string(),
            "sub_cancel=https://hooks.example.com/churn".to_string(),
        ];
        let regs = config.webhook_registrations().unwrap();
        assert_eq!(regs.len(), 2);
        assert_eq!(regs[0].event, "invoice_paid");
        assert_eq!(regs[1].url, "https://hooks.example.com/churn");

        config.webhook_endpoints = vec!["no-separator".to_string()];
        assert!(config.webhook_registrations().is_err());
    }
}
