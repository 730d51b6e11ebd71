//! Bearer-token client for the social broadcast API.
//!
//!   POST   {base}/posts        {"text": "..."}  → {"id": "..."}
//!   DELETE {base}/posts/{id}

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use std::time::Duration;
use tracing::debug;

use super::{PublishError, PublishSink};

pub struct BroadcastClient {
    client: reqwest::Client,
    base_url: String,
}

impl BroadcastClient {
    pub fn new(base_url: String, token: &str, timeout: Duration) -> Result<Self, PublishError> {
        let mut headers = HeaderMap::new();
        let bearer = HeaderValue::from_str(&format!("Bearer {}", token))
            .map_err(|e| PublishError::Decode(format!("invalid token: {}", e)))?;
        headers.insert(AUTHORIZATION, bearer);

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn check(resp: reqwest::Response) -> Result<reqwest::Response, PublishError> {
        let status = resp.status().as_u16();
        if status >= 400 {
            let body = resp.text().await.unwrap_or_default();
            return Err(PublishError::Api { status, body });
        }
        Ok(resp)
    }
}

/// Pull the message id out of a publish response. Accepts `{"id": ..}` and
/// the wrapped `{"data": {"id": ..}}` shape; ids may be strings or numbers.
fn extract_id(value: &serde_json::Value) -> Option<String> {
    let id = value
        .get("id")
        .or_else(|| value.get("data").and_then(|d| d.get("id")))?;
    match id {
        serde_json::Value::String(s) if !s.is_empty() => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[async_trait]
impl PublishSink for BroadcastClient {
    async fn publish(&self, text: &str) -> Result<String, PublishError> {
        let url = format!("{}/posts", self.base_url);
        let body = serde_json::json!({ "text": text });
        let resp = self.client.post(&url).json(&body).send().await?;
        let resp = Self::check(resp).await?;

        let value: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| PublishError::Decode(e.to_string()))?;
        let id = extract_id(&value)
            .ok_or_else(|| PublishError::Decode(format!("no message id in {}", value)))?;

        debug!(id = %id, "message published");
        Ok(id)
    }

    async fn retract(&self, message_id: &str) -> Result<(), PublishError> {
        let url = format!("{}/posts/{}", self.base_url, message_id);
        let resp = self.client.delete(&url).send().await?;
        Self::check(resp).await?;
        debug!(id = %message_id, "message retracted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_extract_id_shapes() {
        assert_eq!(extract_id(&json!({ "id": "abc" })).as_deref(), Some("abc"));
        assert_eq!(extract_id(&json!({ "id": 42 })).as_deref(), Some("42"));
        assert_eq!(
            extract_id(&json!({ "data": { "id": "123", "text": "hi" } })).as_deref(),
            Some("123")
        );
        assert_eq!(extract_id(&json!({ "id": "" })), None);
        assert_eq!(extract_id(&json!({ "ok": true })), None);
    }

    #[test]
    fn test_base_url_trailing_slash_is_dropped() {
        let client =
            BroadcastClient::new("https://example.test/api/".to_string(), "t", Duration::from_secs(1)).unwrap();
        assert_eq!(client.base_url, "https://example.test/api");
    }
}
