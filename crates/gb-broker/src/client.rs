use std::time::Duration;

use reqwest::{Method, RequestBuilder};
use rust_decimal::Decimal;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use crate::error::BrokerError;
use crate::model::{Account, BrokerPosition, Clock, OrderRequest, OrderResponse};

const MAX_ATTEMPTS: u32 = 4;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

enum StatusOutcome {
    Success,
    NotFound,
    Unprocessable,
    UnexpectedStatus,
    Retry,
}

fn categorize(status: u16) -> StatusOutcome {
    match status {
        200..=299 => StatusOutcome::Success,
        404 => StatusOutcome::NotFound,
        422 => StatusOutcome::Unprocessable,
        429 => StatusOutcome::Retry,
        500..=599 => StatusOutcome::Retry,
        _ => StatusOutcome::UnexpectedStatus,
    }
}

/// Typed client over an Alpaca-shaped broker REST API: bounded retries,
/// categorized errors, and a minimum interval between calls.
pub struct BrokerClient {
    http: reqwest::Client,
    base_url: String,
    key_id: String,
    secret_key: String,
    min_interval: Duration,
    last_call: Mutex<Option<Instant>>,
}

impl BrokerClient {
    pub fn new(base_url: impl Into<String>, key_id: impl Into<String>, secret_key: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
            key_id: key_id.into(),
            secret_key: secret_key.into(),
            min_interval: Duration::from_millis(200),
            last_call: Mutex::new(None),
        }
    }

    pub fn with_min_interval(mut self, interval: Duration) -> Self {
        self.min_interval = interval;
        self
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }

    fn authed(&self, method: Method, path: &str) -> RequestBuilder {
        self.http
            .request(method, self.url(path))
            .header("APCA-API-KEY-ID", &self.key_id)
            .header("APCA-API-SECRET-KEY", &self.secret_key)
            .header("Accept", "application/json")
    }

    async fn rate_gate(&self, token: &CancellationToken) -> Result<(), BrokerError> {
        let mut last_call = self.last_call.lock().await;
        if let Some(last) = *last_call {
            let elapsed = last.elapsed();
            if elapsed < self.min_interval {
                tokio::select! {
                    _ = token.cancelled() => return Err(BrokerError::Cancelled),
                    _ = tokio::time::sleep(self.min_interval - elapsed) => {}
                }
            }
        }
        *last_call = Some(Instant::now());
        Ok(())
    }

    /// Executes one logical call with the full retry/backoff/cancellation
    /// policy, returning the raw status and body text on any non-retried
    /// outcome (including terminal failures, which the caller maps).
    async fn execute(
        &self,
        build: impl Fn() -> RequestBuilder,
        token: &CancellationToken,
    ) -> Result<(u16, String), BrokerError> {
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            if token.is_cancelled() {
                return Err(BrokerError::Cancelled);
            }
            self.rate_gate(token).await?;

            let request = build().timeout(REQUEST_TIMEOUT);
            let outcome = tokio::select! {
                biased;
                _ = token.cancelled() => return Err(BrokerError::Cancelled),
                res = request.send() => res,
            };

            let (retry_cause, terminal): (Option<BrokerError>, Option<Result<(u16, String), BrokerError>>) = match outcome {
                Ok(response) => {
                    let status = response.status().as_u16();
                    let body = response.text().await.unwrap_or_default();
                    match categorize(status) {
                        StatusOutcome::Success => (None, Some(Ok((status, body)))),
                        StatusOutcome::NotFound => (None, Some(Err(BrokerError::NotFound))),
                        StatusOutcome::Unprocessable => (None, Some(Err(BrokerError::Unprocessable { body }))),
                        StatusOutcome::UnexpectedStatus => {
                            (None, Some(Err(BrokerError::UnexpectedStatus { status, body })))
                        }
                        StatusOutcome::Retry => (Some(BrokerError::UnexpectedStatus { status, body }), None),
                    }
                }
                Err(e) => (Some(BrokerError::Transport(e.to_string())), None),
            };

            if let Some(result) = terminal {
                return result;
            }

            let cause = retry_cause.expect("retry path always carries a cause");
            if attempt >= MAX_ATTEMPTS {
                return Err(BrokerError::RetriesExhausted { cause: Box::new(cause) });
            }

            let backoff_ms = 500u64 * (1u64 << (attempt - 1));
            warn!(attempt, backoff_ms, cause = %cause, "broker call failed, retrying");
            tokio::select! {
                _ = token.cancelled() => return Err(BrokerError::Cancelled),
                _ = tokio::time::sleep(Duration::from_millis(backoff_ms)) => {}
            }
        }
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        token: &CancellationToken,
    ) -> Result<T, BrokerError> {
        let path_owned = path.to_string();
        let (_, body) = self
            .execute(|| self.authed(Method::GET, &path_owned), token)
            .await?;
        serde_json::from_str(&body).map_err(|e| BrokerError::UnexpectedStatus {
            status: 200,
            body: format!("failed to decode response: {}", e),
        })
    }

    #[instrument(skip(self, token))]
    pub async fn get_clock(&self, token: &CancellationToken) -> Result<Clock, BrokerError> {
        self.get_json("/v2/clock", token).await
    }

    #[instrument(skip(self, token))]
    pub async fn get_account(&self, token: &CancellationToken) -> Result<Account, BrokerError> {
        self.get_json("/v2/account", token).await
    }

    /// `404` is special-cased here to mean "no position," not an error. A
    /// genuine transport failure still surfaces as `Err`.
    #[instrument(skip(self, token))]
    pub async fn get_position(
        &self,
        symbol: &str,
        token: &CancellationToken,
    ) -> Result<Option<BrokerPosition>, BrokerError> {
        let path = format!("/v2/positions/{}", symbol);
        match self.execute(|| self.authed(Method::GET, &path), token).await {
            Ok((_, body)) => serde_json::from_str(&body)
                .map(Some)
                .map_err(|e| BrokerError::UnexpectedStatus {
                    status: 200,
                    body: format!("failed to decode response: {}", e),
                }),
            Err(BrokerError::NotFound) => Ok(None),
            Err(e) => Err(e),
        }
    }

    #[instrument(skip(self, token))]
    pub async fn close_position(&self, symbol: &str, token: &CancellationToken) -> Result<(), BrokerError> {
        let path = format!("/v2/positions/{}", symbol);
        self.execute(|| self.authed(Method::DELETE, &path), token).await?;
        info!(symbol, "position closed");
        Ok(())
    }

    #[instrument(skip(self, req, token), fields(symbol = %req.symbol, client_order_id = %req.client_order_id))]
    pub async fn submit_order(
        &self,
        req: &OrderRequest,
        token: &CancellationToken,
    ) -> Result<OrderResponse, BrokerError> {
        let body = serde_json::to_string(req).expect("OrderRequest always serializes");
        let (_, resp_body) = self
            .execute(
                || {
                    self.authed(Method::POST, "/v2/orders")
                        .header("Content-Type", "application/json")
                        .body(body.clone())
                },
                token,
            )
            .await?;
        let order: OrderResponse = serde_json::from_str(&resp_body).map_err(|e| BrokerError::UnexpectedStatus {
            status: 200,
            body: format!("failed to decode response: {}", e),
        })?;
        info!(broker_order_id = %order.id, "order submitted");
        Ok(order)
    }

    #[instrument(skip(self, token))]
    pub async fn get_order(&self, id: &str, token: &CancellationToken) -> Result<OrderResponse, BrokerError> {
        let path = format!("/v2/orders/{}", id);
        self.get_json(&path, token).await
    }

    #[instrument(skip(self, token))]
    pub async fn cancel_order(&self, id: &str, token: &CancellationToken) -> Result<(), BrokerError> {
        let path = format!("/v2/orders/{}", id);
        self.execute(|| self.authed(Method::DELETE, &path), token).await?;
        info!(order_id = id, "order cancelled");
        Ok(())
    }

    /// Builds a bracket take-profit/stop-loss pair from the last close and
    /// ATR, rounded to 2 decimals, per direction.
    pub fn bracket_prices(last_close: Decimal, atr: Decimal, target_mult: Decimal, stop_mult: Decimal, is_long: bool) -> (Decimal, Decimal) {
        if is_long {
            (last_close + target_mult * atr, last_close - stop_mult * atr)
        } else {
            (last_close - target_mult * atr, last_close + stop_mult * atr)
        }
    }
}
