//! End-to-end tests for the admission gate.

use std::io;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use mcp_gateway::config::{AuthMode, GatewayConfig, LimiterComposition};
use reqwest::StatusCode;
use serde_json::Value;

mod common;

const KEY: &str = "mcp_integration_key_0001";
const OTHER_KEY: &str = "mcp_integration_key_0002";

fn config(mode: AuthMode) -> GatewayConfig {
    let mut config = GatewayConfig::default();
    config.listener.bind_address = "127.0.0.1:0".into();
    config.auth.mode = mode;
    config.auth.api_keys = vec![KEY.into()];
    config
}

#[tokio::test]
async fn test_required_mode_rejects_missing_and_unknown_keys() {
    let gw = common::start_gateway(config(AuthMode::Required)).await;
    let client = common::client();

    let res = client.get(gw.url("/mcp")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "unauthorized");
    assert_eq!(body["message"], "Invalid or missing API key");

    let res = client
        .get(gw.url("/mcp"))
        .bearer_auth(OTHER_KEY)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    let res = client
        .get(gw.url("/mcp"))
        .header("Authorization", KEY)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED, "scheme prefix is required");

    let res = client
        .get(gw.url("/mcp"))
        .bearer_auth(KEY)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["authenticated"], true);
    assert_eq!(body["key_id"], "mcp_inte...");
}

#[tokio::test]
async fn test_optional_mode_annotates_without_failing() {
    let gw = common::start_gateway(config(AuthMode::Optional)).await;
    let client = common::client();

    let body: Value = client
        .post(gw.url("/mcp/tools"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["status"], "admitted");
    assert_eq!(body["authenticated"], false);
    assert!(body["key_id"].is_null());

    let res = client
        .post(gw.url("/mcp/tools"))
        .bearer_auth(OTHER_KEY)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["authenticated"], false);

    let body: Value = client
        .post(gw.url("/mcp/tools"))
        .bearer_auth(KEY)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["authenticated"], true);
}

#[tokio::test]
async fn test_anonymous_limit_and_worked_example() {
    // 100 anonymous / 500 authenticated per minute.
    let gw = common::start_gateway(config(AuthMode::Optional)).await;
    let client = common::client();

    for i in 1..=100u64 {
        let res = client.get(gw.url("/mcp")).send().await.unwrap();
        assert_eq!(res.status(), StatusCode::OK, "anonymous request {i}");
        assert_eq!(
            res.headers()["x-ratelimit-remaining"].to_str().unwrap(),
            (100 - i).to_string()
        );
    }

    let res = client.get(gw.url("/mcp")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::TOO_MANY_REQUESTS);
    let retry_after: u64 = res.headers()["retry-after"]
        .to_str()
        .unwrap()
        .parse()
        .unwrap();
    assert!((1..=60).contains(&retry_after));
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "rate_limited");
    assert_eq!(body["retry_after_secs"], retry_after);

    // The known key from the same, exhausted address is still admitted.
    for i in 0..150 {
        let res = client
            .get(gw.url("/mcp"))
            .bearer_auth(KEY)
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK, "keyed request {i}");
    }
}

#[tokio::test]
async fn test_stacked_composition_applies_ip_ceiling_to_keys() {
    let mut config = config(AuthMode::Optional);
    config.rate_limit.anonymous_max = 5;
    config.rate_limit.authenticated_max = 20;
    config.rate_limit.composition = LimiterComposition::Stacked;
    let gw = common::start_gateway(config).await;
    let client = common::client();

    for _ in 0..5 {
        let res = client
            .get(gw.url("/mcp"))
            .bearer_auth(KEY)
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
    }
    let res = client
        .get(gw.url("/mcp"))
        .bearer_auth(KEY)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::TOO_MANY_REQUESTS);
}

#[tokio::test]
async fn test_window_elapses_and_readmits() {
    let mut config = config(AuthMode::Optional);
    config.rate_limit.window_secs = 1;
    config.rate_limit.anonymous_max = 2;
    config.rate_limit.authenticated_max = 2;
    let gw = common::start_gateway(config).await;
    let client = common::client();

    for _ in 0..2 {
        assert_eq!(
            client.get(gw.url("/")).send().await.unwrap().status(),
            StatusCode::OK
        );
    }
    assert_eq!(
        client.get(gw.url("/")).send().await.unwrap().status(),
        StatusCode::TOO_MANY_REQUESTS
    );

    tokio::time::sleep(Duration::from_millis(1100)).await;

    assert_eq!(
        client.get(gw.url("/")).send().await.unwrap().status(),
        StatusCode::OK
    );
}

#[tokio::test]
async fn test_health_is_not_gated() {
    let mut config = config(AuthMode::Required);
    config.rate_limit.anonymous_max = 1;
    config.rate_limit.authenticated_max = 1;
    let gw = common::start_gateway(config).await;
    let client = common::client();

    for _ in 0..5 {
        let res = client.get(gw.url("/health")).send().await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        let body: Value = res.json().await.unwrap();
        assert_eq!(body["status"], "ok");
    }
}

#[tokio::test]
async fn test_request_id_on_every_response() {
    let gw = common::start_gateway(config(AuthMode::Required)).await;
    let client = common::client();

    let res = client.get(gw.url("/mcp")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    let generated = res.headers()["x-request-id"].to_str().unwrap();
    assert_eq!(generated.len(), 36);

    let res = client
        .get(gw.url("/health"))
        .header("x-request-id", "client-chosen-id")
        .send()
        .await
        .unwrap();
    assert_eq!(res.headers()["x-request-id"], "client-chosen-id");
}

#[tokio::test]
async fn test_forwards_to_upstream_with_annotations() {
    let upstream = common::start_echo_upstream().await;
    let mut config = config(AuthMode::Optional);
    config.upstream.address = Some(upstream.to_string());
    let gw = common::start_gateway(config).await;
    let client = common::client();

    let res = client
        .get(gw.url("/mcp/sse?session=42"))
        .bearer_auth(KEY)
        .header("x-custom", "kept")
        .header("x-mcp-authenticated", "spoofed")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let head = res.text().await.unwrap().to_lowercase();
    assert!(head.starts_with("get /mcp/sse?session=42 http/1.1"), "{head}");
    assert!(head.contains("x-custom: kept"));
    assert!(head.contains(&format!("authorization: bearer {}", KEY.to_lowercase())));
    assert!(head.contains("x-mcp-authenticated: true"));
    assert!(!head.contains("spoofed"));
    assert!(head.contains("x-mcp-key-id: mcp_inte..."));

    let head = client
        .get(gw.url("/mcp"))
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap()
        .to_lowercase();
    assert!(head.contains("x-mcp-authenticated: false"));
    assert!(!head.contains("x-mcp-key-id"));
}

#[tokio::test]
async fn test_unreachable_upstream_is_bad_gateway() {
    let dead = common::dead_address().await;
    let mut config = config(AuthMode::Optional);
    config.upstream.address = Some(dead.to_string());
    let gw = common::start_gateway(config).await;

    let res = common::client().get(gw.url("/mcp")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::BAD_GATEWAY);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "bad_gateway");
}

/// In-memory log sink shared with a `fmt` subscriber.
#[derive(Clone, Default)]
struct LogBuffer(Arc<Mutex<Vec<u8>>>);

impl LogBuffer {
    fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).to_string()
    }
}

impl io::Write for LogBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[tokio::test]
async fn test_timed_out_request_is_logged() {
    // The test runtime is single-threaded, so the server's tasks log through
    // this thread-local subscriber.
    let logs = LogBuffer::default();
    let writer = logs.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(move || writer.clone())
        .with_max_level(tracing::Level::INFO)
        .with_ansi(false)
        .finish();
    let _guard = tracing::subscriber::set_default(subscriber);

    let silent = common::start_silent_upstream().await;
    let mut config = config(AuthMode::Optional);
    config.upstream.address = Some(silent.to_string());
    config.timeouts.request_secs = 1;
    let gw = common::start_gateway(config).await;

    let res = common::client().get(gw.url("/mcp")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::REQUEST_TIMEOUT);
    assert!(res.headers().contains_key("x-request-id"));

    let output = logs.contents();
    assert!(output.contains("Request rejected or failed"), "{output}");
    assert!(output.contains("status=408"), "{output}");
}

#[tokio::test]
async fn test_reloaded_keys_take_effect() {
    let base = config(AuthMode::Required);
    let gw = common::start_gateway(base.clone()).await;
    let client = common::client();

    let mut rotated = base;
    rotated.auth.api_keys = vec![OTHER_KEY.into()];
    gw.config_updates.send(rotated).unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    let res = client
        .get(gw.url("/mcp"))
        .bearer_auth(KEY)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    let res = client
        .get(gw.url("/mcp"))
        .bearer_auth(OTHER_KEY)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
}
