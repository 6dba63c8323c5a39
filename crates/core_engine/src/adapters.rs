//! Port adapters owned by the engine

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value;
use tracing::info;

use core_kernel::{DomainPort, PortError, Rate};
use domain_events::NotificationPort;
use domain_subscription::TaxPort;

/// Tax port backed by a static country-to-rate table
///
/// Countries missing from the table get the default rate. A lookup
/// against an external tax service plugs in behind the same port.
#[derive(Debug, Clone)]
pub struct StaticTaxPort {
    rates: HashMap<String, Rate>,
    default_rate: Rate,
}

impl StaticTaxPort {
    pub fn new(default_rate: Rate) -> Self {
        Self {
            rates: HashMap::new(),
            default_rate,
        }
    }

    /// Adds or replaces the rate for one country code
    pub fn with_country(mut self, country: &str, rate: Rate) -> Self {
        self.rates.insert(country.to_uppercase(), rate);
        self
    }
}

impl DomainPort for StaticTaxPort {}

#[async_trait]
impl TaxPort for StaticTaxPort {
    async fn compute_rate(&self, country: &str) -> Result<Rate, PortError> {
        Ok(self
            .rates
            .get(&country.to_uppercase())
            .copied()
            .unwrap_or(self.default_rate))
    }
}

/// Notification port that records deliveries to the log stream
///
/// Stands in where no outbound transport is wired; a webhook or email
/// transport implements the same port.
#[derive(Debug, Clone, Default)]
pub struct LoggingNotifier;

impl DomainPort for LoggingNotifier {}

#[async_trait]
impl NotificationPort for LoggingNotifier {
    async fn send_webhook(&self, url: &str, payload: &Value) -> Result<(), PortError> {
        info!(url, %payload, "webhook dispatched");
        Ok(())
    }

    async fn send_email(&self, to: &str, subject: &str, body: &str) -> Result<(), PortError> {
        info!(to, subject, body_len = body.len(), "email dispatched");
        Ok(())
    }
}
