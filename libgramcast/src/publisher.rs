//! Publishing protocol
//!
//! Every post goes through the same steps against the graph API: create one
//! or more containers, optionally assemble them into a carousel, wait for the
//! platform to finish processing, then publish. [`PublishState`] tracks where
//! a post is in that sequence and refuses steps out of order; [`Publisher`]
//! drives the calls.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use libgramcast::config::Config;
//! use libgramcast::graph::mock::MockGraph;
//! use libgramcast::media::MediaItem;
//! use libgramcast::post_config::PostConfig;
//! use libgramcast::publisher::{PublishPolicies, Publisher};
//!
//! # async fn example() -> libgramcast::error::Result<()> {
//! let config = Config::load()?;
//! let publisher = Publisher::new(
//!     Arc::new(MockGraph::new()),
//!     PublishPolicies::from_config(&config)?,
//! );
//!
//! let items = vec![
//!     MediaItem::image("https://cdn.example.com/1.jpg"),
//!     MediaItem::image("https://cdn.example.com/2.jpg"),
//! ];
//! let report = publisher
//!     .post_feed(&items, &PostConfig::with_caption("Weekend"))
//!     .await?;
//! println!("Published {} ({} items)", report.media_id, report.items.len());
//! # Ok(())
//! # }
//! ```

use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::config::Config;
use crate::error::{GramcastError, PlatformError, Result, UploadError};
use crate::graph::{ContainerRequest, ContainerStatus, ContainerType, CreationId, GraphApi, MediaId};
use crate::media::{MediaItem, MediaKind};
use crate::post_config::PostConfig;
use crate::retry::{Poll, RetryPolicy};
use crate::upload::{upload_all, Uploader};

/// Where a post is in the publish sequence
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublishState {
    Uninitialized,
    /// At least one container exists; carousels pass through here once per child
    ContainerCreated(CreationId),
    CompositeAssembled(CreationId),
    Published(MediaId),
    Failed(String),
}

impl PublishState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, PublishState::Published(_) | PublishState::Failed(_))
    }

    pub fn name(&self) -> &'static str {
        match self {
            PublishState::Uninitialized => "uninitialized",
            PublishState::ContainerCreated(_) => "container_created",
            PublishState::CompositeAssembled(_) => "composite_assembled",
            PublishState::Published(_) => "published",
            PublishState::Failed(_) => "failed",
        }
    }

    /// Move to `next`, rejecting transitions the protocol does not allow
    pub fn advance(&mut self, next: PublishState) -> Result<()> {
        use PublishState::*;

        let allowed = match (&*self, &next) {
            (Uninitialized, ContainerCreated(_)) => true,
            (ContainerCreated(_), ContainerCreated(_)) => true,
            (ContainerCreated(_), CompositeAssembled(_)) => true,
            (ContainerCreated(_), Published(_)) => true,
            (CompositeAssembled(_), Published(_)) => true,
            (current, Failed(_)) => !current.is_terminal(),
            _ => false,
        };

        if !allowed {
            return Err(GramcastError::InvalidInput(format!(
                "illegal publish transition {} -> {}",
                self.name(),
                next.name()
            )));
        }

        *self = next;
        Ok(())
    }
}

/// Retry bounds for each waiting loop
#[derive(Debug, Clone, Copy)]
pub struct PublishPolicies {
    /// `media_publish` while the media is still processing
    pub publish: RetryPolicy,
    /// Status polling for reels and feed videos
    pub reels: RetryPolicy,
    /// Status polling for video stories
    pub stories: RetryPolicy,
}

impl PublishPolicies {
    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self {
            publish: config.publish.policy("publish")?,
            reels: config.reels.policy("reels")?,
            stories: config.stories.policy("stories")?,
        })
    }

    /// Policies that never sleep, with `attempts` attempts each
    pub fn immediate(attempts: u32) -> Self {
        let policy = RetryPolicy::new(attempts, Duration::ZERO);
        Self {
            publish: policy,
            reels: policy,
            stories: policy,
        }
    }
}

/// Shape of a published post
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PostKind {
    Single,
    Carousel,
    Story,
    Reel,
}

impl std::fmt::Display for PostKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            PostKind::Single => "single",
            PostKind::Carousel => "carousel",
            PostKind::Story => "story",
            PostKind::Reel => "reel",
        };
        write!(f, "{}", name)
    }
}

/// What was published
#[derive(Debug, Clone, Serialize)]
pub struct PublishReport {
    pub kind: PostKind,
    pub media_id: MediaId,
    /// The container that was published (the carousel for multi-item posts)
    pub creation_id: CreationId,
    /// Published items, in carousel order
    pub items: Vec<MediaItem>,
    /// Local files left out because their upload failed
    pub skipped: Vec<PathBuf>,
}

/// Options for a reel
#[derive(Debug, Clone)]
pub struct ReelOptions {
    pub caption: String,
    pub cover_url: Option<String>,
    /// Also show the reel in the main feed
    pub share_to_feed: bool,
}

impl Default for ReelOptions {
    fn default() -> Self {
        Self {
            caption: String::new(),
            cover_url: None,
            share_to_feed: true,
        }
    }
}

/// Drives the publish protocol for one account
pub struct Publisher {
    graph: Arc<dyn GraphApi>,
    policies: PublishPolicies,
}

impl Publisher {
    pub fn new(graph: Arc<dyn GraphApi>, policies: PublishPolicies) -> Self {
        Self { graph, policies }
    }

    /// Create a standalone container for `item`, carrying the full post metadata
    ///
    /// Alt text is only sent for images; the platform rejects it on videos.
    pub async fn create_media_container(
        &self,
        item: &MediaItem,
        config: &PostConfig,
    ) -> Result<CreationId> {
        let mut request = base_request(item);
        if item.kind == MediaKind::Image {
            request.alt_text = config.alt_text().map(String::from);
        }
        apply_post_metadata(&mut request, config);

        let creation_id = self.graph.create_container(&request).await?;
        info!("Created {} container {}", item.kind, creation_id);
        Ok(creation_id)
    }

    /// Create a carousel child for `item`; children carry no caption or tags
    pub async fn create_carousel_item(&self, item: &MediaItem) -> Result<CreationId> {
        let mut request = base_request(item);
        request.is_carousel_item = Some(true);

        let creation_id = self.graph.create_container(&request).await?;
        info!("Created carousel item {} ({})", creation_id, item.kind);
        Ok(creation_id)
    }

    /// Create the carousel container referencing `children` in order
    pub async fn assemble_composite(
        &self,
        children: &[CreationId],
        config: &PostConfig,
    ) -> Result<CreationId> {
        if children.len() < 2 {
            return Err(GramcastError::InvalidInput(format!(
                "a carousel needs at least 2 items, got {}",
                children.len()
            )));
        }

        let mut request = ContainerRequest {
            media_type: Some(ContainerType::Carousel),
            children: Some(
                children
                    .iter()
                    .map(|id| id.0.as_str())
                    .collect::<Vec<_>>()
                    .join(","),
            ),
            ..Default::default()
        };
        apply_post_metadata(&mut request, config);

        let creation_id = self.graph.create_container(&request).await?;
        info!("Assembled carousel {} from {} items", creation_id, children.len());
        Ok(creation_id)
    }

    /// Publish a container, retrying while the platform is still processing it
    pub async fn publish(&self, creation_id: &CreationId) -> Result<MediaId> {
        let media_id = self
            .policies
            .publish
            .retry_transient("publish", || self.graph.publish(creation_id))
            .await?;

        info!("Published {} as {}", creation_id, media_id);
        Ok(media_id)
    }

    /// Wait until the container has finished processing
    ///
    /// `ERROR` and `EXPIRED` abort immediately; running out of attempts is a
    /// timeout.
    pub async fn poll_status(&self, creation_id: &CreationId, policy: &RetryPolicy) -> Result<()> {
        policy
            .run("media processing", |_| async move {
                let status = self.graph.container_status(creation_id).await?;
                let poll: Result<Poll<()>> = match status {
                    ContainerStatus::Finished => Ok(Poll::Ready(())),
                    ContainerStatus::InProgress => Ok(Poll::Pending("IN_PROGRESS".to_string())),
                    ContainerStatus::Error(message) => {
                        Err(PlatformError::ProcessingFailed(message).into())
                    }
                    ContainerStatus::Expired => Err(PlatformError::ProcessingFailed(
                        "container expired before publishing".to_string(),
                    )
                    .into()),
                    ContainerStatus::Published => Err(PlatformError::ProcessingFailed(
                        "container was already published".to_string(),
                    )
                    .into()),
                    ContainerStatus::Unknown(code) => Ok(Poll::Pending(code)),
                };
                poll
            })
            .await
    }

    /// Publish hosted items to the feed
    ///
    /// One item becomes a single post; two or more become a carousel in the
    /// given order. The choice depends only on `items.len()`.
    pub async fn post_feed(&self, items: &[MediaItem], config: &PostConfig) -> Result<PublishReport> {
        if items.is_empty() {
            return Err(GramcastError::InvalidInput("no media to post".to_string()));
        }

        let mut state = PublishState::Uninitialized;
        let result = if items.len() == 1 {
            self.single_post(&items[0], config, &mut state).await
        } else {
            self.carousel_post(items, config, &mut state).await
        };

        self.finish(result, &mut state)
    }

    /// Upload `files` and publish whatever uploaded
    ///
    /// A partial upload is posted with the failed files listed in
    /// [`PublishReport::skipped`], unless `strict` is set, in which case
    /// nothing is published.
    pub async fn post_files(
        &self,
        uploader: &dyn Uploader,
        files: &[PathBuf],
        config: &PostConfig,
        strict: bool,
    ) -> Result<PublishReport> {
        if files.is_empty() {
            return Err(GramcastError::InvalidInput("no media files found".to_string()));
        }

        let batch = upload_all(uploader, files).await;
        if batch.items.is_empty() {
            return Err(UploadError::NothingUploaded {
                attempted: files.len(),
            }
            .into());
        }

        if !batch.failed.is_empty() {
            if strict {
                return Err(UploadError::Partial {
                    failed: batch.failed.len(),
                    attempted: batch.attempted(),
                }
                .into());
            }
            warn!(
                "{} of {} uploads failed; posting the remaining {} item(s)",
                batch.failed.len(),
                batch.attempted(),
                batch.items.len()
            );
        }

        let mut report = self.post_feed(&batch.items, config).await?;
        report.skipped = batch.failed.into_iter().map(|failed| failed.path).collect();
        Ok(report)
    }

    /// Publish a story; video stories are polled before publishing
    pub async fn post_story(&self, item: &MediaItem) -> Result<PublishReport> {
        let mut state = PublishState::Uninitialized;
        let result: Result<PublishReport> = async {
            let mut request = base_request(item);
            request.media_type = Some(ContainerType::Stories);

            let creation_id = self.graph.create_container(&request).await?;
            info!("Created story container {}", creation_id);
            state.advance(PublishState::ContainerCreated(creation_id.clone()))?;

            if item.kind.is_video() {
                self.poll_status(&creation_id, &self.policies.stories).await?;
            }

            let media_id = self.publish(&creation_id).await?;
            state.advance(PublishState::Published(media_id.clone()))?;
            Ok(PublishReport {
                kind: PostKind::Story,
                media_id,
                creation_id,
                items: vec![item.clone()],
                skipped: Vec::new(),
            })
        }
        .await;

        self.finish(result, &mut state)
    }

    /// Publish a hosted video as a reel
    pub async fn post_reel(&self, video_url: &str, options: &ReelOptions) -> Result<PublishReport> {
        let mut state = PublishState::Uninitialized;
        let item = MediaItem::video(video_url);
        let result: Result<PublishReport> = async {
            let mut request = ContainerRequest::video(video_url);
            if !options.caption.is_empty() {
                request.caption = Some(options.caption.clone());
            }
            request.cover_url = options.cover_url.clone();
            request.share_to_feed = Some(options.share_to_feed);

            let creation_id = self.graph.create_container(&request).await?;
            info!("Created reel container {}", creation_id);
            state.advance(PublishState::ContainerCreated(creation_id.clone()))?;

            self.poll_status(&creation_id, &self.policies.reels).await?;

            let media_id = self.publish(&creation_id).await?;
            state.advance(PublishState::Published(media_id.clone()))?;
            Ok(PublishReport {
                kind: PostKind::Reel,
                media_id,
                creation_id,
                items: vec![item.clone()],
                skipped: Vec::new(),
            })
        }
        .await;

        self.finish(result, &mut state)
    }

    async fn single_post(
        &self,
        item: &MediaItem,
        config: &PostConfig,
        state: &mut PublishState,
    ) -> Result<PublishReport> {
        let creation_id = self.create_media_container(item, config).await?;
        state.advance(PublishState::ContainerCreated(creation_id.clone()))?;

        // Single videos go up as reels and need processing first
        if item.kind.is_video() {
            self.poll_status(&creation_id, &self.policies.reels).await?;
        }

        let media_id = self.publish(&creation_id).await?;
        state.advance(PublishState::Published(media_id.clone()))?;

        Ok(PublishReport {
            kind: PostKind::Single,
            media_id,
            creation_id,
            items: vec![item.clone()],
            skipped: Vec::new(),
        })
    }

    async fn carousel_post(
        &self,
        items: &[MediaItem],
        config: &PostConfig,
        state: &mut PublishState,
    ) -> Result<PublishReport> {
        let mut children = Vec::with_capacity(items.len());
        for item in items {
            let child = self.create_carousel_item(item).await?;
            state.advance(PublishState::ContainerCreated(child.clone()))?;
            children.push(child);
        }

        let creation_id = self.assemble_composite(&children, config).await?;
        state.advance(PublishState::CompositeAssembled(creation_id.clone()))?;

        let media_id = self.publish(&creation_id).await?;
        state.advance(PublishState::Published(media_id.clone()))?;

        Ok(PublishReport {
            kind: PostKind::Carousel,
            media_id,
            creation_id,
            items: items.to_vec(),
            skipped: Vec::new(),
        })
    }

    fn finish(
        &self,
        result: Result<PublishReport>,
        state: &mut PublishState,
    ) -> Result<PublishReport> {
        if let Err(e) = &result {
            let from = state.name();
            if state.advance(PublishState::Failed(e.to_string())).is_ok() {
                warn!("Publishing failed after state {}: {}", from, e);
            }
        }
        result
    }
}

/// Media URL and type marker, nothing else
fn base_request(item: &MediaItem) -> ContainerRequest {
    match item.kind {
        MediaKind::Image => ContainerRequest::image(&item.url),
        MediaKind::Video => ContainerRequest::video(&item.url),
    }
}

/// Caption, location and user tags; optional fields are omitted when empty
fn apply_post_metadata(request: &mut ContainerRequest, config: &PostConfig) {
    request.caption = Some(config.full_caption());
    request.location_id = config.location_id().map(String::from);
    if !config.user_tags.is_empty() {
        request.user_tags = Some(config.user_tags.join(","));
    }
}
