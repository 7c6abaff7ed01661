//! Graph API capability interface
//!
//! [`GraphApi`] is the narrow set of calls the publisher and the token manager
//! need. [`client::GraphClient`] talks HTTP; [`mock::MockGraph`] records calls
//! and replays scripted answers so the protocol can be tested offline.
//!
//! # Examples
//!
//! ```no_run
//! use libgramcast::graph::{ContainerRequest, GraphApi, client::GraphClient};
//!
//! # async fn example() -> libgramcast::error::Result<()> {
//! let client = GraphClient::new(
//!     "https://graph.facebook.com/v18.0",
//!     "17841400000000000",
//!     "EAAB...".to_string().into(),
//! )?;
//!
//! let request = ContainerRequest::image("https://cdn.example.com/a.jpg");
//! let creation_id = client.create_container(&request).await?;
//! let media_id = client.publish(&creation_id).await?;
//! println!("Published {}", media_id);
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use crate::error::Result;

pub mod client;

// Mock is available for all builds (not just tests) to support integration tests
pub mod mock;

/// Identifier of a container that has been created but not published
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CreationId(pub String);

/// Identifier of a live, published post
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MediaId(pub String);

impl std::fmt::Display for CreationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::fmt::Display for MediaId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// `media_type` values sent on container creation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ContainerType {
    Reels,
    Carousel,
    Stories,
}

/// Parameters of a `POST /{account}/media` call
///
/// Unset fields are omitted from the request entirely.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub media_type: Option<ContainerType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_carousel_item: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub children: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub caption: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alt_text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location_id: Option<String>,
    /// Comma-separated handles
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_tags: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cover_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub share_to_feed: Option<bool>,
}

impl ContainerRequest {
    pub fn image(url: impl Into<String>) -> Self {
        Self {
            image_url: Some(url.into()),
            ..Default::default()
        }
    }

    /// Videos are always created as short-form (`REELS`) containers
    pub fn video(url: impl Into<String>) -> Self {
        Self {
            video_url: Some(url.into()),
            media_type: Some(ContainerType::Reels),
            ..Default::default()
        }
    }

    /// Ids of the carousel children, in order
    pub fn child_ids(&self) -> Vec<String> {
        self.children
            .as_deref()
            .map(|c| c.split(',').map(String::from).collect())
            .unwrap_or_default()
    }
}

/// Processing state of a container (`status_code` field)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContainerStatus {
    Finished,
    InProgress,
    Published,
    Expired,
    Error(String),
    Unknown(String),
}

impl ContainerStatus {
    /// Map the `status_code` / `status` pair returned by the API
    pub fn from_api(status_code: &str, status: Option<&str>) -> Self {
        match status_code {
            "FINISHED" => ContainerStatus::Finished,
            "IN_PROGRESS" => ContainerStatus::InProgress,
            "PUBLISHED" => ContainerStatus::Published,
            "EXPIRED" => ContainerStatus::Expired,
            "ERROR" => ContainerStatus::Error(status.unwrap_or("ERROR").to_string()),
            other => ContainerStatus::Unknown(other.to_string()),
        }
    }
}

/// App id and secret, used for token introspection and exchange
pub struct AppCredentials {
    pub app_id: String,
    pub app_secret: SecretString,
}

impl AppCredentials {
    pub fn new(app_id: impl Into<String>, app_secret: SecretString) -> Self {
        Self {
            app_id: app_id.into(),
            app_secret,
        }
    }

    /// App access token in `{app_id}|{app_secret}` form
    pub fn app_token(&self) -> SecretString {
        SecretString::from(format!(
            "{}|{}",
            self.app_id,
            self.app_secret.expose_secret()
        ))
    }
}

/// Fields of the `debug_token` response the token manager cares about
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenIntrospection {
    pub is_valid: bool,
    /// Unix seconds; `None` or `0` means the token does not expire
    pub expires_at: Option<i64>,
    pub error_message: Option<String>,
    pub user_id: Option<String>,
    pub scopes: Vec<String>,
}

/// Result of the `fb_exchange_token` grant
#[derive(Debug)]
pub struct ExchangedToken {
    pub access_token: SecretString,
    /// Seconds until expiry, when the platform reports it
    pub expires_in: Option<u64>,
}

/// The graph API calls used by publishing and token management
#[async_trait]
pub trait GraphApi: Send + Sync {
    /// Create a media container (single item, carousel child, carousel, story or reel)
    async fn create_container(&self, request: &ContainerRequest) -> Result<CreationId>;

    /// Publish a container
    ///
    /// # Errors
    ///
    /// Returns `PlatformError::Processing` while the media is not ready yet;
    /// any other error is final.
    async fn publish(&self, creation_id: &CreationId) -> Result<MediaId>;

    /// Fetch a container's processing status
    async fn container_status(&self, creation_id: &CreationId) -> Result<ContainerStatus>;

    /// Inspect `token` using the app's credentials
    async fn introspect_token(
        &self,
        app: &AppCredentials,
        token: &SecretString,
    ) -> Result<TokenIntrospection>;

    /// Exchange `token` for a fresh long-lived token
    async fn exchange_token(&self, app: &AppCredentials, token: &SecretString) -> Result<ExchangedToken>;
}
