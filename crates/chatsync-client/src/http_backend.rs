//! REST implementation of [`ChatBackend`].
//!
//! Endpoints:
//! - `POST /api/v1/chat/ticket` → `{"ticket": "..."}`
//! - `GET  /api/v1/matches/{id}/messages` → `[Message]` (or `null` when empty)
//! - `POST /api/v1/matches/{id}/messages` with `{"content": "..."}` → `Message`

use std::time::Duration;

use chatsync_core::types::{ConversationId, Message, Ticket};
use reqwest::{RequestBuilder, Response, Url};
use serde::Deserialize;
use serde::de::DeserializeOwned;

use crate::backend::ChatBackend;
use crate::error::BackendError;

/// Explicit credentials and address for REST calls.
#[derive(Clone, PartialEq, Eq)]
pub struct ApiContext {
    pub base_url: Url,
    pub bearer_token: Option<String>,
}

impl std::fmt::Debug for ApiContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiContext")
            .field("base_url", &self.base_url.as_str())
            .field("bearer_token", &self.bearer_token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

#[derive(Debug, Deserialize)]
struct TicketResponse {
    ticket: String,
}

#[derive(Debug, serde::Serialize)]
struct SendMessageRequest<'a> {
    content: &'a str,
}

pub struct HttpBackend {
    client: reqwest::Client,
    ctx: ApiContext,
}

impl HttpBackend {
    pub fn new(ctx: ApiContext, timeout: Duration) -> Result<Self, BackendError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client, ctx })
    }

    pub fn context(&self) -> &ApiContext {
        &self.ctx
    }

    /// Append path segments to the base URL, percent-encoding each one.
    fn endpoint(&self, segments: &[&str]) -> Result<Url, BackendError> {
        let mut url = self.ctx.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| BackendError::Unavailable(format!("base url {} cannot hold a path", self.ctx.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn authorize(&self, req: RequestBuilder) -> RequestBuilder {
        match &self.ctx.bearer_token {
            Some(token) => req.bearer_auth(token),
            None => req,
        }
    }

    fn messages_url(&self, conversation: &ConversationId) -> Result<Url, BackendError> {
        self.endpoint(&["api", "v1", "matches", conversation.as_str(), "messages"])
    }
}

impl ChatBackend for HttpBackend {
    async fn fetch_ticket(&self) -> Result<Ticket, BackendError> {
        let url = self.endpoint(&["api", "v1", "chat", "ticket"])?;
        let resp = self.authorize(self.client.post(url)).send().await?;
        let body: TicketResponse = read_json("fetch_ticket", resp).await?;
        if body.ticket.is_empty() {
            return Err(BackendError::Decode {
                endpoint: "fetch_ticket",
                reason: "empty ticket".to_owned(),
            });
        }
        Ok(Ticket::new(body.ticket))
    }

    async fn fetch_history(
        &self,
        conversation: &ConversationId,
    ) -> Result<Vec<Message>, BackendError> {
        let url = self.messages_url(conversation)?;
        let resp = self.authorize(self.client.get(url)).send().await?;
        let messages: Option<Vec<Message>> = read_json("fetch_history", resp).await?;
        Ok(messages.unwrap_or_default())
    }

    async fn send_message(
        &self,
        conversation: &ConversationId,
        content: &str,
    ) -> Result<Message, BackendError> {
        let url = self.messages_url(conversation)?;
        let req = self
            .client
            .post(url)
            .json(&SendMessageRequest { content });
        let resp = self.authorize(req).send().await?;
        read_json("send_message", resp).await
    }
}

async fn read_json<T: DeserializeOwned>(
    endpoint: &'static str,
    resp: Response,
) -> Result<T, BackendError> {
    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(BackendError::Status {
            endpoint,
            status: status.as_u16(),
            body: body.trim().to_owned(),
        });
    }
    let bytes = resp.bytes().await?;
    serde_json::from_slice(&bytes).map_err(|e| BackendError::Decode {
        endpoint,
        reason: e.to_string(),
    })
}
