use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use gb_types::agent::Timeframe;
use gb_types::bar::{BarData, BarPoint};
use serde::Deserialize;

/// External collaborator that turns a symbol/timeframe/window into bars with
/// pre-computed indicators. The core only consumes this contract; feature
/// computation and historical storage are out of scope (spec.md §1).
#[async_trait]
pub trait MarketDataClient: Send + Sync {
    async fn get_bar_data(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<BarData>, String>;
}

#[derive(Debug, Deserialize)]
struct RawBar {
    t: DateTime<Utc>,
    o: f64,
    h: f64,
    l: f64,
    c: f64,
    v: f64,
}

#[derive(Debug, Deserialize)]
struct BarsResponse {
    bars: Vec<RawBar>,
}

/// Fetches OHLCV bars from an Alpaca-compatible market-data endpoint. This
/// reuses the broker's REST conventions (same auth headers, same base host
/// family) but has no notion of indicators — those are computed by a
/// separate feature pipeline this repo does not own, so every bar here
/// carries an empty `indicators` map until such a pipeline is wired in.
pub struct AlpacaMarketDataClient {
    http: reqwest::Client,
    base_url: String,
    key_id: String,
    secret_key: String,
}

impl AlpacaMarketDataClient {
    pub fn new(base_url: impl Into<String>, key_id: impl Into<String>, secret_key: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
            key_id: key_id.into(),
            secret_key: secret_key.into(),
        }
    }
}

#[async_trait]
impl MarketDataClient for AlpacaMarketDataClient {
    async fn get_bar_data(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<BarData>, String> {
        let url = format!("{}/v2/stocks/{}/bars", self.base_url.trim_end_matches('/'), symbol);
        let response = self
            .http
            .get(url)
            .header("APCA-API-KEY-ID", &self.key_id)
            .header("APCA-API-SECRET-KEY", &self.secret_key)
            .header("Accept", "application/json")
            .query(&[
                ("timeframe", timeframe.to_string()),
                ("start", start.to_rfc3339()),
                ("end", end.to_rfc3339()),
            ])
            .send()
            .await
            .map_err(|e| e.to_string())?;

        if !response.status().is_success() {
            return Err(format!("market data request failed with status {}", response.status()));
        }

        let body: BarsResponse = response.json().await.map_err(|e| e.to_string())?;
        Ok(body
            .bars
            .into_iter()
            .map(|b| BarData {
                bar: BarPoint {
                    timestamp: b.t,
                    open: b.o,
                    high: b.h,
                    low: b.l,
                    close: b.c,
                    volume: b.v,
                },
                indicators: HashMap::new(),
            })
            .collect())
    }
}
