pub mod types;

use crate::config::ApiConfig;
use crate::error::TrackerError;
use crate::poller::Fetcher;
use crate::progress::SessionId;
use crate::sync::{ProgressStore, ProgressUpdate};
use async_trait::async_trait;
use reqwest::{RequestBuilder, Response};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use types::*;

/// REST client for the progress and messaging endpoints
pub struct ProgressApi {
    base_url: String,
    token: Option<String>,
    http_client: reqwest::Client,
}

impl ProgressApi {
    pub fn new(config: &ApiConfig) -> Result<Self, TrackerError> {
        let http_client = reqwest::Client::builder().timeout(config.timeout).build()?;
        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            token: config.token.clone(),
            http_client,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match self.token {
            Some(ref token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response, TrackerError> {
        let response = self
            .authorize(request)
            .send()
            .await
            .map_err(|e| TrackerError::FetchFailure(format!("Failed to connect: {}", e)))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ApiErrorBody>(&body)
            .map(|b| b.message)
            .unwrap_or(body);
        Err(TrackerError::Http {
            status: status.as_u16(),
            message,
        })
    }

    async fn parse<T: DeserializeOwned>(response: Response) -> Result<T, TrackerError> {
        let bytes = response.bytes().await?;
        serde_json::from_slice(&bytes).map_err(|e| TrackerError::InvalidResponse(e.to_string()))
    }

    /// Saved progress for a session, or `None` if the backend has none
    pub async fn fetch_progress(&self, session_id: &SessionId) -> Result<Option<ProgressRecord>, TrackerError> {
        let request = self.http_client.get(self.url(&format!("progress/{}", session_id)));
        let response = match self.send(request).await {
            Ok(response) => response,
            Err(TrackerError::Http { status: 404, .. }) => return Ok(None),
            Err(e) => return Err(e),
        };

        let record: ProgressRecord = Self::parse(response).await?;
        record.validate().map(Some)
    }

    pub async fn put_progress(&self, update: &ProgressUpdate) -> Result<(), TrackerError> {
        let request = self
            .http_client
            .put(self.url(&format!("progress/{}", update.session_id)))
            .json(update);
        self.send(request).await?;
        Ok(())
    }

    pub async fn fetch_messages(&self, conversation_id: &str) -> Result<Vec<Message>, TrackerError> {
        let request = self
            .http_client
            .get(self.url(&format!("conversations/{}/messages", conversation_id)));
        let response = self.send(request).await?;
        let page: MessagePage = Self::parse(response).await?;
        Ok(page.messages)
    }

    /// Fetcher for a conversation's messages, for use with the polling scheduler
    pub fn message_fetcher(self: &Arc<Self>, conversation_id: &str) -> impl Fetcher<Vec<Message>> {
        let api = self.clone();
        let conversation_id = conversation_id.to_string();
        move || {
            let api = api.clone();
            let conversation_id = conversation_id.clone();
            async move { api.fetch_messages(&conversation_id).await }
        }
    }
}

#[async_trait]
impl ProgressStore for ProgressApi {
    async fn save_progress(&self, update: &ProgressUpdate) -> Result<(), TrackerError> {
        self.put_progress(update).await
    }
}
