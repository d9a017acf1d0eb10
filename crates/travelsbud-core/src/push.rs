//! Push notification gateway.
//!
//! Delivery is fire-and-forget from the sender's point of view: callers spawn
//! `notify` and log failures, they never surface them.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::AUTHORIZATION;
use serde_json::json;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum PushError {
    #[error("push request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("push gateway rejected notification: HTTP {0}")]
    Rejected(u16),
}

#[async_trait]
pub trait PushGateway: Send + Sync {
    async fn notify(&self, device_token: &str, title: &str, body: &str) -> Result<(), PushError>;
}

/// FCM legacy HTTP endpoint.
pub struct FcmPushGateway {
    client: reqwest::Client,
    endpoint: String,
    server_key: String,
}

impl FcmPushGateway {
    pub const DEFAULT_ENDPOINT: &'static str = "https://fcm.googleapis.com/fcm/send";

    /// Ceiling on a single push request, connecting included.
    pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

    const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

    pub fn new(server_key: impl Into<String>, endpoint: impl Into<String>) -> Result<Self, PushError> {
        Self::with_timeout(server_key, endpoint, Self::REQUEST_TIMEOUT)
    }

    pub fn with_timeout(
        server_key: impl Into<String>,
        endpoint: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, PushError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(Self::CONNECT_TIMEOUT.min(timeout))
            .build()?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
            server_key: server_key.into(),
        })
    }
}

#[async_trait]
impl PushGateway for FcmPushGateway {
    async fn notify(&self, device_token: &str, title: &str, body: &str) -> Result<(), PushError> {
        let payload = json!({
            "to": device_token,
            "notification": {
                "title": title,
                "body": body,
            },
        });

        let resp = self
            .client
            .post(&self.endpoint)
            .header(AUTHORIZATION, format!("key={}", self.server_key))
            .json(&payload)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            return Err(PushError::Rejected(status.as_u16()));
        }

        debug!("Push delivered to device {}", abbreviate(device_token));
        Ok(())
    }
}

/// Used when no push credentials are configured.
pub struct NullPushGateway;

#[async_trait]
impl PushGateway for NullPushGateway {
    async fn notify(&self, device_token: &str, title: &str, _body: &str) -> Result<(), PushError> {
        debug!(
            "Push disabled, dropping {:?} for device {}",
            title,
            abbreviate(device_token)
        );
        Ok(())
    }
}

/// Device tokens are credentials of a sort; logs only get a prefix.
fn abbreviate(token: &str) -> &str {
    let end = token
        .char_indices()
        .nth(8)
        .map(|(i, _)| i)
        .unwrap_or(token.len());
    &token[..end]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn abbreviate_keeps_a_short_prefix() {
        assert_eq!(abbreviate("abcdefghijkl"), "abcdefgh");
        assert_eq!(abbreviate("abc"), "abc");
    }

    #[tokio::test]
    async fn null_gateway_always_succeeds() {
        NullPushGateway.notify("token", "New Message!", "hi").await.unwrap();
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_a_transport_error() {
        let gateway = FcmPushGateway::new("key", "http://127.0.0.1:1/fcm/send").unwrap();
        let err = gateway.notify("token", "t", "b").await.unwrap_err();
        assert!(matches!(err, PushError::Transport(_)));
    }

    #[tokio::test]
    async fn silent_endpoint_times_out() {
        // Accepts connections and never answers.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                held.push(socket);
            }
        });

        let gateway = FcmPushGateway::with_timeout(
            "key",
            format!("http://{}/fcm/send", addr),
            Duration::from_millis(200),
        )
        .unwrap();
        let err = tokio::time::timeout(Duration::from_secs(5), gateway.notify("token", "t", "b"))
            .await
            .expect("notify outlived its timeout")
            .unwrap_err();
        match err {
            PushError::Transport(e) => assert!(e.is_timeout(), "unexpected error {}", e),
            other => panic!("unexpected error {:?}", other),
        }
    }
}
