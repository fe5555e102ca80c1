use anyhow::Result;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use reqwest::Client;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::coordinator::TradingStateCoordinator;

/// HTTP client for the external scanning service. The response body is an
/// opaque JSON document owned by the scanner contract.
#[derive(Clone)]
pub struct ScannerClient {
    base_url: String,
    http: Client,
}

impl ScannerClient {
    pub fn new(base_url: &str, api_key: Option<&str>, user_agent: &str, timeout: Duration) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_str(user_agent)?);
        if let Some(key) = api_key {
            let mut v = HeaderValue::from_str(key)?;
            v.set_sensitive(true);
            headers.insert("x-api-key", v);
        }
        let http = Client::builder().default_headers(headers).timeout(timeout).build()?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http,
        })
    }

    pub fn url_for(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    pub async fn fetch(&self, path: &str, query: &[(&str, &str)]) -> Result<Value> {
        let resp = self
            .http
            .get(self.url_for(path))
            .query(query)
            .send()
            .await?
            .error_for_status()?;
        Ok(resp.json().await?)
    }
}

/// Counts candidates in a scanner response without interpreting them.
pub fn candidate_count(body: &Value) -> usize {
    match body {
        Value::Array(items) => items.len(),
        Value::Object(map) => ["data", "results", "tokens", "items"]
            .iter()
            .find_map(|k| map.get(*k).and_then(Value::as_array))
            .map_or(1, Vec::len),
        Value::Null => 0,
        _ => 1,
    }
}

/// Timer-driven scan loop. Skips ticks while autopilot is off; fetch errors
/// are logged and the next tick proceeds normally.
pub async fn run(
    coordinator: Arc<TradingStateCoordinator>,
    scanner: ScannerClient,
    path: String,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> Result<()> {
    info!(url = %scanner.url_for(&path), interval_secs = interval.as_secs(), "scanner.start");

    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = shutdown.changed() => {
                info!("scanner.stop");
                return Ok(());
            }
        }

        let cfg = coordinator.config().await;
        if !cfg.auto_pilot_enabled {
            debug!("scanner.idle");
            continue;
        }

        match scanner.fetch(&path, &[("mode", cfg.trading_mode.as_str())]).await {
            Ok(body) => {
                let open_positions = coordinator.positions_len().await;
                info!(
                    candidates = candidate_count(&body),
                    risk_level = %cfg.risk_level,
                    open_positions,
                    locked = coordinator.locked_count(),
                    "scanner.tick"
                );
            }
            Err(e) => warn!(error = %e, "scanner.fetch_failed"),
        }
    }
}
