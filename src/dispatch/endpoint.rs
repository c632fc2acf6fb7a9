// =============================================================================
// Strategy endpoint client — unsigned POST to /update_settings
// =============================================================================
//
// Grounded on the teacher's `binance/client.rs` (`reqwest::Client` built once
// with an explicit timeout, `#[instrument]` on the request method,
// `Context`-wrapped errors) with the HMAC signing dropped: the strategy
// endpoint is an internal, unauthenticated HTTP sink.

use std::time::Duration;

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::instrument;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
const TOTAL_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Serialize)]
struct SettingsPayload {
    strategy_name: String,
    symbol: String,
    settings: Settings,
}

#[derive(Debug, Serialize)]
struct Settings {
    signal_active: bool,
}

/// Thin client for the strategy endpoint contract: `POST
/// http://<host>:3001/update_settings`.
#[derive(Clone)]
pub struct EndpointClient {
    client: reqwest::Client,
}

impl EndpointClient {
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(TOTAL_TIMEOUT)
            .build()
            .expect("failed to build reqwest client");
        Self { client }
    }

    /// Send one `update_settings` POST. Any non-2xx status is treated as a
    /// transport failure by the caller's retry loop.
    #[instrument(skip(self), name = "post_update_settings")]
    pub async fn post_update_settings(&self, host: &str, strategy_name: &str, symbol: &str, signal_active: bool) -> Result<()> {
        let url = format!("http://{host}:3001/update_settings");
        let body = SettingsPayload {
            strategy_name: strategy_name.to_string(),
            symbol: symbol.to_string(),
            settings: Settings { signal_active },
        };

        let response = self.client.post(&url).json(&body).send().await.context("request failed")?;

        if !response.status().is_success() {
            anyhow::bail!("non-2xx response: {}", response.status());
        }

        Ok(())
    }
}

impl Default for EndpointClient {
    fn default() -> Self {
        Self::new()
    }
}
