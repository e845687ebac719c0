//! Delivery side: per-destination incoming webhooks plus the roster
//! lookup used for mention resolution.
use crate::model::Recipient;
use async_trait::async_trait;
use reqwest::{Client, StatusCode, Url};
use serde::Deserialize;
use serde_json::{json, Value};
use std::fmt;
use thiserror::Error;
use tracing::{debug, info};

const SLACK_API_BASE: &str = "https://slack.com/api/";

#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("delivery request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("webhook returned status {status}")]
    Status { status: StatusCode },
    #[error("invalid webhook URL: {0}")]
    InvalidWebhook(String),
    #[error("roster fetch rejected: {0}")]
    Roster(String),
}

/// One message per call, no retry inside. Retry policy, if any, belongs
/// to the caller.
#[async_trait]
pub trait DeliveryService: Send + Sync {
    async fn send(&self, webhook: &str, message: &str) -> Result<(), DeliveryError>;
}

#[derive(Clone)]
pub struct WebhookClient {
    http: Client,
    api_base: Url,
}

impl fmt::Debug for WebhookClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WebhookClient").finish_non_exhaustive()
    }
}

impl Default for WebhookClient {
    fn default() -> Self {
        Self::new()
    }
}

impl WebhookClient {
    pub fn new() -> Self {
        let api_base = Url::parse(SLACK_API_BASE).expect("valid default Slack URL");
        Self::with_api_base(api_base)
    }

    pub fn with_api_base(api_base: Url) -> Self {
        let http = Client::builder()
            .user_agent("refwatch/0.1")
            .build()
            .expect("reqwest client");
        Self { http, api_base }
    }

    /// Active, named members only; deleted accounts and members without a
    /// normalized display name cannot be mentioned.
    pub async fn fetch_roster(&self, token: &str) -> Result<Vec<Recipient>, DeliveryError> {
        let endpoint = self
            .api_base
            .join("users.list")
            .map_err(|_| DeliveryError::Roster("invalid users.list URL".into()))?;
        debug!(url = %endpoint, "fetching recipient roster");
        let res = self.http.get(endpoint).bearer_auth(token).send().await?;
        if !res.status().is_success() {
            return Err(DeliveryError::Status {
                status: res.status(),
            });
        }
        let body: UsersListResponse = res.json().await?;
        if !body.ok {
            return Err(DeliveryError::Roster(
                body.error.unwrap_or_else(|| "unknown error".into()),
            ));
        }
        Ok(roster_from_members(body.members))
    }
}

#[async_trait]
impl DeliveryService for WebhookClient {
    async fn send(&self, webhook: &str, message: &str) -> Result<(), DeliveryError> {
        let url =
            Url::parse(webhook).map_err(|_| DeliveryError::InvalidWebhook(webhook.to_string()))?;
        let res = self
            .http
            .post(url)
            .json(&build_message_payload(message))
            .send()
            .await?;
        if res.status() != StatusCode::OK {
            return Err(DeliveryError::Status {
                status: res.status(),
            });
        }
        Ok(())
    }
}

/// Logs the composed message and reports success without touching the
/// network. Used by `--dry-run`.
#[derive(Debug, Default, Clone)]
pub struct DryRunDelivery;

#[async_trait]
impl DeliveryService for DryRunDelivery {
    async fn send(&self, webhook: &str, message: &str) -> Result<(), DeliveryError> {
        info!(webhook, %message, "dry run, message not sent");
        Ok(())
    }
}

pub fn build_message_payload(text: &str) -> Value {
    json!({
        "blocks": [
            {
                "type": "section",
                "text": {
                    "type": "mrkdwn",
                    "text": text,
                }
            }
        ]
    })
}

#[derive(Debug, Deserialize)]
struct UsersListResponse {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    members: Vec<Member>,
}

#[derive(Debug, Deserialize)]
struct Member {
    #[serde(default)]
    id: String,
    #[serde(default)]
    deleted: bool,
    #[serde(default)]
    profile: Profile,
}

#[derive(Debug, Default, Deserialize)]
struct Profile {
    #[serde(default)]
    display_name_normalized: String,
}

fn roster_from_members(members: Vec<Member>) -> Vec<Recipient> {
    members
        .into_iter()
        .filter(|m| !m.deleted && !m.id.is_empty() && !m.profile.display_name_normalized.is_empty())
        .map(|m| Recipient {
            display_name: m.profile.display_name_normalized,
            id: m.id,
        })
        .collect()
}
