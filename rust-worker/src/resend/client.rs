//! Resend contacts API client.
//!
//! Only the calls the engagement pipeline needs: contact lookup, score
//! update and segment membership management.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::{de::DeserializeOwned, Deserialize};
use serde_json::{json, Map, Value};
use thiserror::Error;
use tracing::debug;
use url::Url;

/// Contact property holding the engagement score.
pub const ENGAGEMENT_SCORE_PROPERTY: &str = "engagement_score";

#[derive(Debug, Error)]
pub enum ResendError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("invalid response body: {0}")]
    Decode(#[source] serde_json::Error),

    #[error("invalid API URL: {0}")]
    InvalidUrl(String),
}

impl ResendError {
    /// Transport failures, rate limits and server errors are worth retrying.
    pub fn is_retryable(&self) -> bool {
        match self {
            ResendError::Http(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            ResendError::Api { status, .. } => *status == 429 || *status >= 500,
            ResendError::Decode(_) | ResendError::InvalidUrl(_) => false,
        }
    }
}

/// A newsletter contact as stored by Resend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Contact {
    pub id: String,
    pub email: String,
    pub engagement_score: Option<i32>,
}

/// Contact and segment operations used by the engagement pipeline.
#[async_trait]
pub trait ContactsApi: Send + Sync {
    /// Look a contact up by email. `Ok(None)` if it does not exist.
    async fn get_contact(&self, email: &str) -> Result<Option<Contact>, ResendError>;

    async fn update_contact_engagement(
        &self,
        contact_id: &str,
        score: i32,
    ) -> Result<(), ResendError>;

    /// Ids of every segment the contact belongs to.
    async fn list_contact_segments(&self, contact_id: &str) -> Result<Vec<String>, ResendError>;

    async fn add_contact_to_segment(
        &self,
        contact_id: &str,
        segment_id: &str,
    ) -> Result<(), ResendError>;

    async fn remove_contact_from_segment(
        &self,
        contact_id: &str,
        segment_id: &str,
    ) -> Result<(), ResendError>;
}

#[derive(Debug, Deserialize)]
struct ContactResponse {
    id: String,
    email: String,
    #[serde(default)]
    properties: HashMap<String, Value>,
}

impl From<ContactResponse> for Contact {
    fn from(raw: ContactResponse) -> Self {
        let engagement_score = raw
            .properties
            .get(ENGAGEMENT_SCORE_PROPERTY)
            .and_then(|v| v.as_i64().or_else(|| v.as_str().and_then(|s| s.parse().ok())))
            .map(|score| score.clamp(i32::MIN as i64, i32::MAX as i64) as i32);

        Contact {
            id: raw.id,
            email: raw.email,
            engagement_score,
        }
    }
}

#[derive(Debug, Deserialize)]
struct SegmentList {
    #[serde(default)]
    data: Vec<SegmentEntry>,
}

#[derive(Debug, Deserialize)]
struct SegmentEntry {
    id: String,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    message: String,
}

/// Resend REST client.
#[derive(Clone)]
pub struct ResendClient {
    client: Client,
    api_key: String,
    base_url: Url,
}

impl ResendClient {
    pub fn new(api_key: String, base_url: &str, timeout: Duration) -> Result<Self, ResendError> {
        let base_url =
            Url::parse(base_url).map_err(|e| ResendError::InvalidUrl(format!("{base_url}: {e}")))?;
        if base_url.cannot_be_a_base() {
            return Err(ResendError::InvalidUrl(base_url.to_string()));
        }

        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            api_key,
            base_url,
        })
    }

    /// Build an endpoint URL; segments are percent-encoded.
    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response, ResendError> {
        let response = request.bearer_auth(&self.api_key).send().await?;
        let status = response.status();

        if status.is_success() || status == StatusCode::NOT_FOUND {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ApiErrorBody>(&body)
            .map(|e| e.message)
            .unwrap_or(body);

        Err(ResendError::Api {
            status: status.as_u16(),
            message,
        })
    }

    /// Like `send`, but a 404 is an error too.
    async fn send_expecting_found(&self, request: RequestBuilder) -> Result<Response, ResendError> {
        let response = self.send(request).await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(ResendError::Api {
                status: StatusCode::NOT_FOUND.as_u16(),
                message: "not found".to_string(),
            });
        }
        Ok(response)
    }
}

/// Read a successful response as JSON. Transport failures stay `Http`.
async fn decode_json<T: DeserializeOwned>(response: Response) -> Result<T, ResendError> {
    let bytes = response.bytes().await?;
    serde_json::from_slice(&bytes).map_err(ResendError::Decode)
}

/// PATCH body setting the engagement score property.
fn engagement_properties(score: i32) -> Value {
    let mut properties = Map::new();
    properties.insert(ENGAGEMENT_SCORE_PROPERTY.to_string(), json!(score));
    json!({ "properties": properties })
}

#[async_trait]
impl ContactsApi for ResendClient {
    async fn get_contact(&self, email: &str) -> Result<Option<Contact>, ResendError> {
        let url = self.endpoint(&["contacts", email]);
        let response = self.send(self.client.get(url)).await?;

        if response.status() == StatusCode::NOT_FOUND {
            debug!(email = %email, "resend_contact_not_found");
            return Ok(None);
        }

        let contact: ContactResponse = decode_json(response).await?;
        Ok(Some(contact.into()))
    }

    async fn update_contact_engagement(
        &self,
        contact_id: &str,
        score: i32,
    ) -> Result<(), ResendError> {
        let url = self.endpoint(&["contacts", contact_id]);
        let body = engagement_properties(score);

        self.send_expecting_found(self.client.patch(url).json(&body))
            .await?;
        Ok(())
    }

    async fn list_contact_segments(&self, contact_id: &str) -> Result<Vec<String>, ResendError> {
        let url = self.endpoint(&["contacts", contact_id, "segments"]);
        let response = self.send_expecting_found(self.client.get(url)).await?;

        let list: SegmentList = decode_json(response).await?;
        Ok(list.data.into_iter().map(|s| s.id).collect())
    }

    async fn add_contact_to_segment(
        &self,
        contact_id: &str,
        segment_id: &str,
    ) -> Result<(), ResendError> {
        let url = self.endpoint(&["contacts", contact_id, "segments", segment_id]);
        self.send_expecting_found(self.client.post(url)).await?;
        Ok(())
    }

    async fn remove_contact_from_segment(
        &self,
        contact_id: &str,
        segment_id: &str,
    ) -> Result<(), ResendError> {
        let url = self.endpoint(&["contacts", contact_id, "segments", segment_id]);
        // Already absent is as good as removed.
        self.send(self.client.delete(url)).await?;
        Ok(())
    }
}
