//! HTTP interface probes via reqwest

use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::RwLock;
use reqwest::Client;
use serde::Deserialize;

use super::{HttpCollector, ProbeResult};
use crate::error::{Error, Result};

/// User agent sent with every probe
pub const USER_AGENT: &str = "GWatch-Monitor/1.0";

/// Upper bound for any probe; per-interface timeouts are applied per request
const CLIENT_TIMEOUT: Duration = Duration::from_secs(10);

/// Optional `{code, msg}` envelope returned by many business APIs
#[derive(Debug, Deserialize)]
struct Envelope {
    code: Option<i64>,
    #[serde(default)]
    msg: String,
}

/// [`HttpCollector`] backed by a shared `reqwest` client
#[derive(Default)]
pub struct ReqwestHttpCollector {
    client: RwLock<Option<Client>>,
}

impl ReqwestHttpCollector {
    /// Create an uninitialised collector
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl HttpCollector for ReqwestHttpCollector {
    async fn init(&self) -> Result<()> {
        let client = Client::builder()
            .timeout(CLIENT_TIMEOUT)
            .pool_max_idle_per_host(10)
            .pool_idle_timeout(Duration::from_secs(30))
            .user_agent(USER_AGENT)
            .build()?;
        *self.client.write() = Some(client);
        Ok(())
    }

    async fn check_interface(&self, url: &str, timeout: Duration) -> Result<ProbeResult> {
        let client = self
            .client
            .read()
            .clone()
            .ok_or_else(|| Error::collector("HTTP client not initialised"))?;

        let start = Instant::now();
        let response = match client.get(url).timeout(timeout).send().await {
            Ok(response) => response,
            Err(e) => {
                return Ok(ProbeResult {
                    accessible: false,
                    response_time: start.elapsed(),
                    status_code: 0,
                    error: Some(format!("request failed: {e}")),
                });
            }
        };
        let response_time = start.elapsed();
        let http_status = response.status().as_u16();
        let body = response.bytes().await.unwrap_or_default();

        let mut result = ProbeResult {
            accessible: true,
            response_time,
            status_code: http_status,
            error: None,
        };

        let envelope = serde_json::from_slice::<Envelope>(&body).ok();
        if let Some(code) = envelope.as_ref().and_then(|e| e.code) {
            if code != 0 {
                result.status_code = u16::try_from(code).unwrap_or(http_status);
            }
            if code != 200 && http_status == 200 {
                let msg = envelope.map(|e| e.msg).unwrap_or_default();
                result.accessible = false;
                result.error = Some(format!("business error: {msg} (code: {code})"));
            }
        }

        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn collector() -> ReqwestHttpCollector {
        let collector = ReqwestHttpCollector::new();
        collector.init().await.unwrap();
        collector
    }

    #[tokio::test]
    async fn test_plain_status_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/health"))
            .and(header("user-agent", USER_AGENT))
            .respond_with(ResponseTemplate::new(204))
            .mount(&server)
            .await;

        let result = collector()
            .await
            .check_interface(&format!("{}/health", server.uri()), Duration::from_secs(2))
            .await
            .unwrap();
        assert!(result.accessible);
        assert_eq!(result.status_code, 204);
        assert_eq!(result.error, None);
    }

    #[tokio::test]
    async fn test_business_code_overrides_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"code": 500, "msg": "db down"})),
            )
            .mount(&server)
            .await;

        let result = collector()
            .await
            .check_interface(&server.uri(), Duration::from_secs(2))
            .await
            .unwrap();
        assert!(!result.accessible);
        assert_eq!(result.status_code, 500);
        assert!(result.error.unwrap().contains("db down"));
    }

    #[tokio::test]
    async fn test_business_success_envelope() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"code": 200, "msg": "ok"})),
            )
            .mount(&server)
            .await;

        let result = collector()
            .await
            .check_interface(&server.uri(), Duration::from_secs(2))
            .await
            .unwrap();
        assert!(result.accessible);
        assert_eq!(result.status_code, 200);
    }

    #[tokio::test]
    async fn test_timeout_is_reported_as_inaccessible() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(500)))
            .mount(&server)
            .await;

        let result = collector()
            .await
            .check_interface(&server.uri(), Duration::from_millis(50))
            .await
            .unwrap();
        assert!(!result.accessible);
        assert_eq!(result.status_code, 0);
        assert!(result.error.is_some());
    }

    #[tokio::test]
    async fn test_uninitialised_client_fails() {
        let err = ReqwestHttpCollector::new()
            .check_interface("http://127.0.0.1:1", Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Collector(_)));
    }
}
