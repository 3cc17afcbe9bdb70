//! Core domain model for the channel stats collector.
//!
//! Everything here is pure: record types, the duration/time normalizer,
//! the title classifier and the record enricher. I/O lives in the storage,
//! adapters and sync crates.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub mod classify;
pub mod enrich;
pub mod normalize;

pub use classify::{default_facet_rules, FacetRule, TitleClassifier, TitleFacet, TitleFacets};
pub use enrich::{days_since_published, AnalysisError, RecordEnricher};
pub use normalize::{
    date_partition, format_rfc3339_utc, jst, localize, parse_duration, seconds_to_period,
    year_window, MalformedDurationError, PublishedInfo, TimeOfDay,
};

pub const CRATE_NAME: &str = "momo-core";

/// Parses a provider counter the way the provider encodes it: a string of
/// ASCII digits. Anything else counts as zero.
pub fn parse_count(value: &str) -> u64 {
    if value.is_empty() || !value.bytes().all(|b| b.is_ascii_digit()) {
        return 0;
    }
    value.parse().unwrap_or(0)
}

/// Statistics exactly as returned by the listing provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawStatistics {
    #[serde(rename = "viewCount", default = "zero_count")]
    pub view_count: String,
    #[serde(rename = "likeCount", default = "zero_count")]
    pub like_count: String,
    #[serde(rename = "commentCount", default = "zero_count")]
    pub comment_count: String,
}

fn zero_count() -> String {
    "0".to_string()
}

impl Default for RawStatistics {
    fn default() -> Self {
        Self {
            view_count: zero_count(),
            like_count: zero_count(),
            comment_count: zero_count(),
        }
    }
}

impl RawStatistics {
    pub fn new(view_count: u64, like_count: u64, comment_count: u64) -> Self {
        Self {
            view_count: view_count.to_string(),
            like_count: like_count.to_string(),
            comment_count: comment_count.to_string(),
        }
    }

    pub fn counts(&self) -> Counts {
        Counts {
            views: parse_count(&self.view_count),
            likes: parse_count(&self.like_count),
            comments: parse_count(&self.comment_count),
        }
    }
}

/// Integer view of the three engagement counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Counts {
    pub views: u64,
    pub likes: u64,
    pub comments: u64,
}

impl Counts {
    pub fn total(&self) -> u64 {
        self.views + self.likes + self.comments
    }
}

/// A harvested video before analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawVideo {
    pub video_id: String,
    pub title: String,
    pub description: String,
    pub published_at: String,
    pub thumbnail_url: String,
    pub channel_id: String,
    pub channel_title: String,
    pub statistics: RawStatistics,
    pub duration: String,
    pub fetched_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DailyAverage {
    pub views: f64,
    pub likes: f64,
    pub comments: f64,
}

/// Derived analytics attached to a successfully analyzed video.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoAnalysis {
    pub published_info: PublishedInfo,
    pub duration_seconds: u64,
    pub title_analysis: TitleFacets,
    pub daily_average: DailyAverage,
    pub total_engagement: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RecordStatus {
    Success,
    AnalysisError,
    FetchError,
}

impl RecordStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordStatus::Success => "SUCCESS",
            RecordStatus::AnalysisError => "ANALYSIS_ERROR",
            RecordStatus::FetchError => "FETCH_ERROR",
        }
    }
}

impl std::fmt::Display for RecordStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One harvested video. The status discriminant decides which fields exist:
/// only `Success` carries analytics, and `FetchError` carries no raw
/// attributes beyond identity and title.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VideoRecord {
    Success {
        #[serde(flatten)]
        video: RawVideo,
        analysis: VideoAnalysis,
    },
    AnalysisError {
        #[serde(flatten)]
        video: RawVideo,
        error_message: String,
    },
    FetchError {
        video_id: String,
        title: String,
        error_message: String,
        fetched_at: DateTime<Utc>,
    },
}

impl VideoRecord {
    pub fn fetch_error(
        video_id: impl Into<String>,
        title: impl Into<String>,
        error_message: impl Into<String>,
        fetched_at: DateTime<Utc>,
    ) -> Self {
        VideoRecord::FetchError {
            video_id: video_id.into(),
            title: title.into(),
            error_message: error_message.into(),
            fetched_at,
        }
    }

    pub fn status(&self) -> RecordStatus {
        match self {
            VideoRecord::Success { .. } => RecordStatus::Success,
            VideoRecord::AnalysisError { .. } => RecordStatus::AnalysisError,
            VideoRecord::FetchError { .. } => RecordStatus::FetchError,
        }
    }

    pub fn video_id(&self) -> &str {
        match self {
            VideoRecord::Success { video, .. } | VideoRecord::AnalysisError { video, .. } => {
                &video.video_id
            }
            VideoRecord::FetchError { video_id, .. } => video_id,
        }
    }

    pub fn title(&self) -> &str {
        match self {
            VideoRecord::Success { video, .. } | VideoRecord::AnalysisError { video, .. } => {
                &video.title
            }
            VideoRecord::FetchError { title, .. } => title,
        }
    }

    pub fn fetched_at(&self) -> DateTime<Utc> {
        match self {
            VideoRecord::Success { video, .. } | VideoRecord::AnalysisError { video, .. } => {
                video.fetched_at
            }
            VideoRecord::FetchError { fetched_at, .. } => *fetched_at,
        }
    }

    pub fn raw(&self) -> Option<&RawVideo> {
        match self {
            VideoRecord::Success { video, .. } | VideoRecord::AnalysisError { video, .. } => {
                Some(video)
            }
            VideoRecord::FetchError { .. } => None,
        }
    }

    pub fn analysis(&self) -> Option<&VideoAnalysis> {
        match self {
            VideoRecord::Success { analysis, .. } => Some(analysis),
            _ => None,
        }
    }

    pub fn error_message(&self) -> Option<&str> {
        match self {
            VideoRecord::Success { .. } => None,
            VideoRecord::AnalysisError { error_message, .. }
            | VideoRecord::FetchError { error_message, .. } => Some(error_message),
        }
    }

    /// Engagement counters; records without statistics count as zero.
    pub fn counts(&self) -> Counts {
        self.raw()
            .map(|video| video.statistics.counts())
            .unwrap_or_default()
    }
}

/// Aggregate header of a per-year snapshot document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotMetadata {
    pub year: i32,
    pub total_videos: usize,
    pub total_views: u64,
    pub total_likes: u64,
    pub total_comments: u64,
    pub average_views: f64,
    pub average_likes: f64,
    pub average_comments: f64,
    pub fetched_at: DateTime<Utc>,
}

/// All records harvested for one year plus their aggregates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct YearSnapshot {
    pub metadata: SnapshotMetadata,
    pub videos: Vec<VideoRecord>,
}

impl SnapshotMetadata {
    /// Sums and arithmetic means over `records`; means are 0 for an empty
    /// year.
    pub fn from_records(year: i32, records: &[VideoRecord], fetched_at: DateTime<Utc>) -> Self {
        let mut sums = Counts::default();
        for record in records {
            let counts = record.counts();
            sums.views += counts.views;
            sums.likes += counts.likes;
            sums.comments += counts.comments;
        }

        let mean = |total: u64| {
            if records.is_empty() {
                0.0
            } else {
                total as f64 / records.len() as f64
            }
        };

        Self {
            year,
            total_videos: records.len(),
            total_views: sums.views,
            total_likes: sums.likes,
            total_comments: sums.comments,
            average_views: mean(sums.views),
            average_likes: mean(sums.likes),
            average_comments: mean(sums.comments),
            fetched_at,
        }
    }
}

impl YearSnapshot {
    pub fn new(year: i32, videos: Vec<VideoRecord>, fetched_at: DateTime<Utc>) -> Self {
        let metadata = SnapshotMetadata::from_records(year, &videos, fetched_at);
        Self { metadata, videos }
    }
}

/// A top-level comment on a video.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    pub author: String,
    pub text: String,
    pub like_count: u64,
    pub published_at: String,
}

/// Document written by the comment collector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommentDump {
    pub video_id: String,
    pub timestamp: String,
    pub comments: Vec<Comment>,
}
