//! Video listing provider contracts + the YouTube and fixture implementations.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use momo_core::{Comment, RawStatistics};
use momo_storage::FetchError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

mod youtube;

pub use youtube::{YouTubeDataApi, YOUTUBE_API_BASE};

pub const CRATE_NAME: &str = "momo-adapters";

pub const SEARCH_PAGE_SIZE: usize = 50;
pub const COMMENT_PAGE_SIZE: usize = 100;

/// Channel + half-open publish window `[published_after, published_before)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelWindow {
    pub channel_id: String,
    pub published_after: DateTime<Utc>,
    pub published_before: DateTime<Utc>,
}

impl ChannelWindow {
    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        instant >= self.published_after && instant < self.published_before
    }
}

/// Snippet-level attributes of one search hit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListingItem {
    pub video_id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub published_at: String,
    #[serde(default)]
    pub thumbnail_url: String,
    #[serde(default)]
    pub channel_title: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ListingPage {
    pub items: Vec<ListingItem>,
    pub next_page_token: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoDetails {
    #[serde(default = "zero_duration")]
    pub duration: String,
    #[serde(default)]
    pub statistics: RawStatistics,
}

fn zero_duration() -> String {
    "PT0S".to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CommentPage {
    pub comments: Vec<Comment>,
    pub next_page_token: Option<String>,
}

#[derive(Debug, Error)]
pub enum SourceError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error("{0}")]
    Message(String),
}

#[async_trait]
pub trait VideoSource: Send + Sync {
    fn source_id(&self) -> &'static str;

    /// One page of videos published by the channel inside the window.
    async fn fetch_listing(
        &self,
        window: &ChannelWindow,
        page_token: Option<&str>,
    ) -> Result<ListingPage, SourceError>;

    /// Duration and statistics for one video; `Ok(None)` when the provider
    /// no longer knows the id.
    async fn fetch_detail(&self, video_id: &str) -> Result<Option<VideoDetails>, SourceError>;

    async fn fetch_comments(
        &self,
        video_id: &str,
        page_token: Option<&str>,
    ) -> Result<CommentPage, SourceError>;
}

/// Captured channel data for offline runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FixtureBundle {
    pub fixture_id: String,
    pub channel_id: String,
    pub captured_at: DateTime<Utc>,
    pub videos: Vec<FixtureVideo>,
    #[serde(default)]
    pub comments: Vec<FixtureCommentThread>,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FixtureVideo {
    #[serde(flatten)]
    pub listing: ListingItem,
    #[serde(default)]
    pub details: Option<VideoDetails>,
    /// Simulates a failing details call.
    #[serde(default)]
    pub detail_error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FixtureCommentThread {
    pub video_id: String,
    pub comments: Vec<Comment>,
}

pub fn load_fixture_bundle(path: impl AsRef<Path>) -> Result<FixtureBundle> {
    let path = path.as_ref();
    let data = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&data).with_context(|| format!("parsing {}", path.display()))
}

/// Serves a [`FixtureBundle`] through the same paging contract as the API.
/// Page tokens are item offsets.
#[derive(Debug, Clone)]
pub struct FixtureVideoSource {
    bundle: FixtureBundle,
    page_size: usize,
}

impl FixtureVideoSource {
    pub fn new(bundle: FixtureBundle) -> Self {
        Self {
            bundle,
            page_size: SEARCH_PAGE_SIZE,
        }
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self::new(load_fixture_bundle(path)?))
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn bundle(&self) -> &FixtureBundle {
        &self.bundle
    }
}

fn parse_offset(page_token: Option<&str>) -> Result<usize, SourceError> {
    match page_token {
        None => Ok(0),
        Some(token) => token
            .parse()
            .map_err(|_| SourceError::Message(format!("invalid page token {token:?}"))),
    }
}

fn page_of<T: Clone>(all: &[T], offset: usize, size: usize) -> (Vec<T>, Option<String>) {
    let end = offset.saturating_add(size).min(all.len());
    let page = all.get(offset..end).map(<[T]>::to_vec).unwrap_or_default();
    let next = (end < all.len()).then(|| end.to_string());
    (page, next)
}

#[async_trait]
impl VideoSource for FixtureVideoSource {
    fn source_id(&self) -> &'static str {
        "fixture"
    }

    async fn fetch_listing(
        &self,
        window: &ChannelWindow,
        page_token: Option<&str>,
    ) -> Result<ListingPage, SourceError> {
        if window.channel_id != self.bundle.channel_id {
            return Ok(ListingPage::default());
        }
        let matching = self
            .bundle
            .videos
            .iter()
            .filter(|v| {
                DateTime::parse_from_rfc3339(&v.listing.published_at)
                    .map(|at| window.contains(at.with_timezone(&Utc)))
                    .unwrap_or(false)
            })
            .map(|v| v.listing.clone())
            .collect::<Vec<_>>();
        let (items, next_page_token) =
            page_of(&matching, parse_offset(page_token)?, self.page_size);
        Ok(ListingPage {
            items,
            next_page_token,
        })
    }

    async fn fetch_detail(&self, video_id: &str) -> Result<Option<VideoDetails>, SourceError> {
        let Some(video) = self
            .bundle
            .videos
            .iter()
            .find(|v| v.listing.video_id == video_id)
        else {
            return Ok(None);
        };
        if let Some(message) = &video.detail_error {
            return Err(SourceError::Message(message.clone()));
        }
        Ok(video.details.clone())
    }

    async fn fetch_comments(
        &self,
        video_id: &str,
        page_token: Option<&str>,
    ) -> Result<CommentPage, SourceError> {
        let all = self
            .bundle
            .comments
            .iter()
            .find(|t| t.video_id == video_id)
            .map(|t| t.comments.as_slice())
            .unwrap_or_default();
        let (comments, next_page_token) =
            page_of(all, parse_offset(page_token)?, COMMENT_PAGE_SIZE);
        Ok(CommentPage {
            comments,
            next_page_token,
        })
    }
}
