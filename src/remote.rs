//! Remote API client.
//!
//! The server contract is fixed and minimal: one batched entry-status
//! endpoint plus per-collection mark-all-read endpoints. Success is a 2xx
//! status; anything else (including a timeout) is a failure, and every
//! caller treats failures identically — stay local, try again later.

use crate::config::Config;
use crate::storage::EntryStatus;
use secrecy::{ExposeSecret, SecretString};
use std::time::Duration;
use thiserror::Error;
use url::Url;

const AUTH_HEADER: &str = "X-Auth-Token";

#[derive(Debug, Error)]
pub enum RemoteError {
    /// No server address configured; the engine can only run offline.
    #[error("No server URL configured")]
    MissingServerUrl,

    #[error("Invalid server URL: {0}")]
    InvalidServerUrl(String),

    #[error("Request timed out")]
    Timeout,

    /// Network-level error (DNS, connection, TLS, etc.)
    #[error("Request failed: {0}")]
    Network(#[from] reqwest::Error),

    /// HTTP response with non-2xx status code
    #[error("HTTP error: status {0}")]
    HttpStatus(u16),

    /// Request body could not be encoded
    #[error("Failed to encode request body: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Client for the status endpoints of a Miniflux-compatible server.
///
/// Cheap to clone via `Arc`; workers receive a shared handle and perform
/// exactly one call each.
pub struct RemoteClient {
    http: reqwest::Client,
    base: Url,
    token: Option<SecretString>,
    timeout: Duration,
}

impl RemoteClient {
    /// Build a client from the engine configuration.
    ///
    /// The READMARK_API_TOKEN env var takes precedence over the config
    /// file's `api_token`.
    pub fn from_config(config: &Config) -> Result<Self, RemoteError> {
        if config.server_url.trim().is_empty() {
            return Err(RemoteError::MissingServerUrl);
        }
        let base = Url::parse(config.server_url.trim())
            .map_err(|e| RemoteError::InvalidServerUrl(e.to_string()))?;

        let token = std::env::var("READMARK_API_TOKEN")
            .ok()
            .or_else(|| config.api_token.clone())
            .map(SecretString::from);

        let http = reqwest::Client::builder()
            .user_agent(concat!("readmark/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            http,
            base,
            token,
            timeout: Duration::from_secs(config.request_timeout_secs),
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base.as_str().trim_end_matches('/'), path)
    }

    /// Issue one PUT and reduce the response to success/failure.
    async fn put(&self, url: String, body: Option<Vec<u8>>) -> Result<(), RemoteError> {
        let mut request = self.http.put(&url);
        if let Some(token) = &self.token {
            request = request.header(AUTH_HEADER, token.expose_secret());
        }
        if let Some(body) = body {
            request = request
                .header(reqwest::header::CONTENT_TYPE, "application/json")
                .body(body);
        }

        let response = tokio::time::timeout(self.timeout, request.send())
            .await
            .map_err(|_| RemoteError::Timeout)?
            .map_err(RemoteError::Network)?;

        if !response.status().is_success() {
            return Err(RemoteError::HttpStatus(response.status().as_u16()));
        }
        Ok(())
    }

    /// Batch-update the status of many entries in one round trip.
    pub async fn update_entries(
        &self,
        entry_ids: &[i64],
        status: EntryStatus,
    ) -> Result<(), RemoteError> {
        if entry_ids.is_empty() {
            return Ok(());
        }
        let body = serde_json::json!({
            "entry_ids": entry_ids,
            "status": status.as_str(),
        });
        tracing::debug!(count = entry_ids.len(), status = %status, "Updating entry statuses");
        self.put(self.endpoint("entries"), Some(serde_json::to_vec(&body)?))
            .await
    }

    /// Mark every entry of a feed as read. Acts on the whole collection;
    /// not batchable across feeds.
    pub async fn mark_feed_read(&self, feed_id: i64) -> Result<(), RemoteError> {
        tracing::debug!(feed_id = feed_id, "Marking feed as read");
        self.put(
            self.endpoint(&format!("feeds/{}/mark-all-as-read", feed_id)),
            None,
        )
        .await
    }

    /// Mark every entry of a category as read.
    pub async fn mark_category_read(&self, category_id: i64) -> Result<(), RemoteError> {
        tracing::debug!(category_id = category_id, "Marking category as read");
        self.put(
            self.endpoint(&format!("categories/{}/mark-all-as-read", category_id)),
            None,
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_config(server_url: &str) -> Config {
        Config {
            server_url: server_url.to_string(),
            api_token: Some("test-token".to_string()),
            request_timeout_secs: 5,
            ..Config::default()
        }
    }

    #[test]
    fn missing_server_url_is_rejected() {
        let result = RemoteClient::from_config(&Config::default());
        assert!(matches!(result, Err(RemoteError::MissingServerUrl)));
    }

    #[test]
    fn malformed_server_url_is_rejected() {
        let result = RemoteClient::from_config(&test_config("not a url"));
        assert!(matches!(result, Err(RemoteError::InvalidServerUrl(_))));
    }

    #[tokio::test]
    async fn update_entries_sends_batch_body_and_token() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/entries"))
            .and(header("X-Auth-Token", "test-token"))
            .and(body_json(serde_json::json!({
                "entry_ids": [1, 2, 3],
                "status": "read",
            })))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let client = RemoteClient::from_config(&test_config(&server.uri())).unwrap();
        client
            .update_entries(&[1, 2, 3], EntryStatus::Read)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn update_entries_with_no_ids_skips_the_network() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .respond_with(ResponseTemplate::new(204))
            .expect(0)
            .mount(&server)
            .await;

        let client = RemoteClient::from_config(&test_config(&server.uri())).unwrap();
        client.update_entries(&[], EntryStatus::Read).await.unwrap();
    }

    #[tokio::test]
    async fn mark_feed_read_hits_collection_endpoint() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/feeds/7/mark-all-as-read"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let client = RemoteClient::from_config(&test_config(&server.uri())).unwrap();
        client.mark_feed_read(7).await.unwrap();
    }

    #[tokio::test]
    async fn mark_category_read_hits_collection_endpoint() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/categories/9/mark-all-as-read"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let client = RemoteClient::from_config(&test_config(&server.uri())).unwrap();
        client.mark_category_read(9).await.unwrap();
    }

    #[tokio::test]
    async fn non_2xx_status_is_a_failure() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let client = RemoteClient::from_config(&test_config(&server.uri())).unwrap();
        let err = client
            .update_entries(&[1], EntryStatus::Read)
            .await
            .unwrap_err();
        assert!(matches!(err, RemoteError::HttpStatus(500)));
    }

    #[tokio::test]
    async fn slow_server_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .respond_with(
                ResponseTemplate::new(204).set_delay(Duration::from_secs(2)),
            )
            .mount(&server)
            .await;

        let mut config = test_config(&server.uri());
        config.request_timeout_secs = 0; // elapses immediately
        let client = RemoteClient::from_config(&config).unwrap();
        let err = client
            .update_entries(&[1], EntryStatus::Read)
            .await
            .unwrap_err();
        assert!(matches!(err, RemoteError::Timeout));
    }
}
