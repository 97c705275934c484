use gb_broker::{BrokerClient, BrokerError, OrderRequest, OrderSide};
use rust_decimal_macros::dec;
use tokio_util::sync::CancellationToken;

fn client(base_url: &str) -> BrokerClient {
    BrokerClient::new(base_url, "key-id", "secret-key")
}

#[tokio::test]
async fn get_clock_returns_open_state() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("GET", "/v2/clock")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"timestamp":"2026-07-30T14:00:00Z","is_open":true,"next_open":"2026-07-31T13:30:00Z","next_close":"2026-07-30T20:00:00Z"}"#)
        .create_async()
        .await;

    let clock = client(&server.url())
        .get_clock(&CancellationToken::new())
        .await
        .unwrap();

    mock.assert_async().await;
    assert!(clock.is_open);
}

#[tokio::test]
async fn get_position_404_is_none_not_error() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", "/v2/positions/AAPL")
        .with_status(404)
        .with_body("not found")
        .create_async()
        .await;

    let position = client(&server.url())
        .get_position("AAPL", &CancellationToken::new())
        .await
        .unwrap();

    assert!(position.is_none());
}

#[tokio::test]
async fn submit_order_422_is_not_retried() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/v2/orders")
        .with_status(422)
        .with_body(r#"{"message":"insufficient buying power"}"#)
        .expect(1)
        .create_async()
        .await;

    let req = OrderRequest::market_day("AAPL", OrderSide::Buy, dec!(10), "agent-1-1".to_string());
    let err = client(&server.url())
        .submit_order(&req, &CancellationToken::new())
        .await
        .unwrap_err();

    mock.assert_async().await;
    match err {
        BrokerError::Unprocessable { body } => assert!(body.contains("insufficient buying power")),
        other => panic!("expected Unprocessable, got {:?}", other),
    }
}

#[tokio::test]
async fn submit_order_500_retries_then_exhausts() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/v2/orders")
        .with_status(500)
        .with_body("internal error")
        .expect(4)
        .create_async()
        .await;

    let req = OrderRequest::market_day("AAPL", OrderSide::Buy, dec!(10), "agent-1-2".to_string());
    let start = std::time::Instant::now();
    let err = client(&server.url())
        .submit_order(&req, &CancellationToken::new())
        .await
        .unwrap_err();
    let elapsed = start.elapsed();

    mock.assert_async().await;
    assert!(matches!(err, BrokerError::RetriesExhausted { .. }));
    // 500 + 1000 + 2000 ms of backoff between the 4 attempts.
    assert!(elapsed.as_millis() >= 3500, "elapsed was {:?}", elapsed);
}

#[tokio::test]
async fn cancellation_short_circuits_before_first_call() {
    let server = mockito::Server::new_async().await;
    let token = CancellationToken::new();
    token.cancel();

    let err = client(&server.url())
        .get_clock(&token)
        .await
        .unwrap_err();

    assert!(matches!(err, BrokerError::Cancelled));
}

#[tokio::test]
async fn close_position_success() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("DELETE", "/v2/positions/AAPL")
        .with_status(200)
        .with_body("{}")
        .create_async()
        .await;

    client(&server.url())
        .close_position("AAPL", &CancellationToken::new())
        .await
        .unwrap();

    mock.assert_async().await;
}
