//! User-account messaging over an HTTP gateway.
//!
//! The gateway holds the signed-in account session and exposes one POST
//! endpoint per provider call. Responses use the Bot API envelope:
//!
//! ```text
//! {"ok": true, "result": ...}
//! {"ok": false, "error_code": 429, "description": "...", "parameters": {"retry_after": 17}}
//! ```

use std::time::Duration;

use async_trait::async_trait;
use serde::{de::DeserializeOwned, de::IgnoredAny, Deserialize};
use serde_json::{json, Value};
use tracing::debug;

use mlk_core::{
    domain::{ChannelId, PeerId, PostRef},
    errors::{ProviderError, ProviderResult},
    messaging::{
        port::MessagingProvider,
        types::{ChannelInfo, Post},
    },
};

/// Used when a 429 carries no `retry_after`.
const DEFAULT_RETRY_AFTER: Duration = Duration::from_secs(30);

#[derive(Clone, Debug)]
pub struct GatewayProvider {
    base_url: String,
    token: Option<String>,
    http: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct Envelope {
    ok: bool,
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error_code: Option<u16>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    parameters: Option<ResponseParameters>,
}

#[derive(Debug, Deserialize)]
struct ResponseParameters {
    #[serde(default)]
    retry_after: Option<u64>,
}

impl GatewayProvider {
    pub fn new(base_url: impl Into<String>, token: Option<String>) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token,
            http,
        }
    }

    async fn call<T: DeserializeOwned>(&self, method: &str, body: Value) -> ProviderResult<T> {
        let url = format!("{}/{method}", self.base_url);
        let mut req = self.http.post(&url).json(&body);
        if let Some(token) = &self.token {
            req = req.bearer_auth(token);
        }

        let resp = req
            .send()
            .await
            .map_err(|e| ProviderError::Transport(format!("{method}: {e}")))?;
        let status = resp.status().as_u16();
        let text = resp
            .text()
            .await
            .map_err(|e| ProviderError::Transport(format!("{method}: {e}")))?;
        debug!(method, status, "gateway call");

        decode_response(method, status, &text)
    }
}

/// Decode a gateway response into `T` or a classified [`ProviderError`].
pub(crate) fn decode_response<T: DeserializeOwned>(
    method: &str,
    status: u16,
    body: &str,
) -> ProviderResult<T> {
    let envelope: Envelope = match serde_json::from_str(body) {
        Ok(e) => e,
        Err(_) => {
            let snippet: String = body.chars().take(200).collect();
            return Err(classify(method, status, &snippet, None));
        }
    };

    if !envelope.ok {
        let code = envelope.error_code.unwrap_or(status);
        let description = envelope.description.unwrap_or_default();
        let retry_after = envelope.parameters.and_then(|p| p.retry_after);
        return Err(classify(method, code, &description, retry_after));
    }

    serde_json::from_value(envelope.result.unwrap_or(Value::Null))
        .map_err(|e| ProviderError::Transport(format!("{method}: unexpected result: {e}")))
}

fn classify(method: &str, code: u16, description: &str, retry_after: Option<u64>) -> ProviderError {
    match code {
        429 => ProviderError::RateLimited {
            wait: retry_after
                .map(Duration::from_secs)
                .unwrap_or(DEFAULT_RETRY_AFTER),
        },
        403 => ProviderError::PermissionDenied(format!("{method}: {description}")),
        400 | 404 => ProviderError::NotFound(format!("{method}: {description}")),
        _ => ProviderError::Transport(format!("{method}: {code} {description}")),
    }
}

#[async_trait]
impl MessagingProvider for GatewayProvider {
    async fn resolve(&self, channel: &ChannelId) -> ProviderResult<ChannelInfo> {
        self.call("resolve", json!({ "username": channel.as_str() }))
            .await
    }

    async fn join(&self, peer: PeerId) -> ProviderResult<()> {
        self.call::<IgnoredAny>("join", json!({ "peer": peer.0 }))
            .await?;
        Ok(())
    }

    async fn leave(&self, peer: PeerId) -> ProviderResult<()> {
        self.call::<IgnoredAny>("leave", json!({ "peer": peer.0 }))
            .await?;
        Ok(())
    }

    async fn recent_posts(&self, peer: PeerId, limit: usize) -> ProviderResult<Vec<Post>> {
        self.call("recent_posts", json!({ "peer": peer.0, "limit": limit }))
            .await
    }

    async fn linked_discussion_group(
        &self,
        channel: &ChannelInfo,
    ) -> ProviderResult<Option<ChannelInfo>> {
        let Some(linked) = channel.linked_chat_id else {
            return Ok(None);
        };
        self.call(
            "linked_discussion_group",
            json!({ "peer": channel.peer.0, "linked_chat_id": linked.0 }),
        )
        .await
    }

    async fn send_message(&self, peer: PeerId, text: &str, reply_to: i32) -> ProviderResult<()> {
        self.call::<IgnoredAny>(
            "send_message",
            json!({ "peer": peer.0, "text": text, "reply_to": reply_to }),
        )
        .await?;
        Ok(())
    }

    async fn send_reaction(&self, post: PostRef, emoji: &str) -> ProviderResult<()> {
        self.call::<IgnoredAny>(
            "send_reaction",
            json!({ "peer": post.peer.0, "message_id": post.message_id, "emoji": emoji }),
        )
        .await?;
        Ok(())
    }
}
