use crate::error::DeliveryError;
use crate::types::Message;
use reqwest::{Client, StatusCode};
use serde::Serialize;
use tracing::debug;

// ============================================================================
// Delivery trait
// ============================================================================

/// Sends one batch to the destination. Callers await each call before
/// building the next batch, so at most one batch is ever in flight.
#[allow(async_fn_in_trait)]
pub trait Delivery: Send + Sync {
    async fn deliver(&self, batch: &[Message]) -> Result<(), DeliveryError>;
}

// ============================================================================
// PostHogClient (PostHog `/batch` endpoint)
// ============================================================================

#[derive(Serialize)]
struct BatchRequest<'a> {
    api_key: &'a str,
    batch: &'a [Message],
}

pub struct PostHogClient {
    http_client: Client,
    batch_url: String,
    api_key: String,
}

impl PostHogClient {
    pub fn new(api_host: &str, api_key: String) -> Self {
        Self {
            http_client: Client::new(),
            batch_url: format!("{}/batch", api_host.trim_end_matches('/')),
            api_key,
        }
    }

    pub fn batch_url(&self) -> &str {
        &self.batch_url
    }
}

impl Delivery for PostHogClient {
    async fn deliver(&self, batch: &[Message]) -> Result<(), DeliveryError> {
        let response = self
            .http_client
            .post(&self.batch_url)
            .json(&BatchRequest {
                api_key: &self.api_key,
                batch,
            })
            .send()
            .await?;

        let status = response.status();
        if status != StatusCode::OK {
            let body = response
                .text()
                .await
                .unwrap_or_else(|e| format!("<unreadable body: {}>", e));
            return Err(DeliveryError::UnexpectedStatus {
                code: status.as_u16(),
                body,
            });
        }

        debug!(messages = batch.len(), "Batch accepted by PostHog");
        Ok(())
    }
}

// ============================================================================
// Test utilities
// ============================================================================


#[cfg(test)]
mod tests {
    use super::test_utils::{request_body, serve_once, serve_truncated};
    use super::*;
    use crate::types::{AliasMessage, EventMessage};
    use serde_json::{Map, Value};

    fn sample_batch() -> Vec<Message> {
        vec![
            AliasMessage::new("u1", "d1", "2022-01-01T00:00:00.000Z").into(),
            EventMessage {
                event: "$pageview".to_string(),
                distinct_id: Some("u1".to_string()),
                timestamp: "2022-01-01T00:00:00.000Z".to_string(),
                properties: Map::new(),
                uuid: None,
            }
            .into(),
        ]
    }

    #[test]
    fn batch_url_has_no_double_slash() {
        let client = PostHogClient::new("https://app.posthog.com/", "key".to_string());
        assert_eq!(client.batch_url(), "https://app.posthog.com/batch");
    }

    #[tokio::test]
    async fn deliver_posts_api_key_and_ordered_batch() {
        let (base_url, server) = serve_once("200 OK", b"{\"status\":1}".to_vec()).await;
        let client = PostHogClient::new(&base_url, "phc_test".to_string());

        client.deliver(&sample_batch()).await.unwrap();

        let request = server.await.unwrap();
        assert!(request.starts_with("POST /batch "));
        let body: Value = serde_json::from_str(request_body(&request)).unwrap();
        assert_eq!(body["api_key"], "phc_test");
        assert_eq!(body["batch"][0]["event"], "$create_alias");
        assert_eq!(body["batch"][1]["event"], "$pageview");
    }

    #[tokio::test]
    async fn non_200_is_unexpected_status_with_body() {
        let (base_url, server) =
            serve_once("400 Bad Request", b"invalid api key".to_vec()).await;
        let client = PostHogClient::new(&base_url, "bad".to_string());

        let err = client.deliver(&sample_batch()).await.unwrap_err();
        server.await.unwrap();

        match err {
            DeliveryError::UnexpectedStatus { code, body } => {
                assert_eq!(code, 400);
                assert_eq!(body, "invalid api key");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn unreadable_error_body_is_reported() {
        let (base_url, server) = serve_truncated("500 Internal Server Error").await;
        let client = PostHogClient::new(&base_url, "key".to_string());

        let err = client.deliver(&sample_batch()).await.unwrap_err();
        server.await.unwrap();

        match err {
            DeliveryError::UnexpectedStatus { code, body } => {
                assert_eq!(code, 500);
                assert!(body.starts_with("<unreadable body:"), "{body}");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn other_success_codes_are_rejected() {
        let (base_url, server) = serve_once("202 Accepted", Vec::new()).await;
        let client = PostHogClient::new(&base_url, "key".to_string());

        let err = client.deliver(&sample_batch()).await.unwrap_err();
        server.await.unwrap();
        assert!(matches!(err, DeliveryError::UnexpectedStatus { code: 202, .. }));
    }

    #[tokio::test]
    async fn unreachable_host_is_transport_error() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        let client = PostHogClient::new(&format!("http://{addr}"), "key".to_string());

        let err = client.deliver(&sample_batch()).await.unwrap_err();
        assert!(matches!(err, DeliveryError::Transport(_)));
    }
}
