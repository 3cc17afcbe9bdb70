//! Derived analytics for a harvested video.

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::classify::TitleClassifier;
use crate::normalize::{localize, parse_duration, MalformedDurationError};
use crate::{DailyAverage, RawVideo, VideoAnalysis, VideoRecord};

#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("invalid published_at {value:?}: {source}")]
    PublishedAt {
        value: String,
        #[source]
        source: chrono::ParseError,
    },
    #[error(transparent)]
    Duration(#[from] MalformedDurationError),
}

/// Whole days between publish and `now`, floored, never below 1 so it can
/// divide the counters.
pub fn days_since_published(published_at: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    (now - published_at)
        .num_seconds()
        .div_euclid(86_400)
        .max(1)
}

#[derive(Debug, Clone, Default)]
pub struct RecordEnricher {
    classifier: TitleClassifier,
}

impl RecordEnricher {
    pub fn new(classifier: TitleClassifier) -> Self {
        Self { classifier }
    }

    pub fn classifier(&self) -> &TitleClassifier {
        &self.classifier
    }

    pub fn analyze(
        &self,
        video: &RawVideo,
        now: DateTime<Utc>,
    ) -> Result<VideoAnalysis, AnalysisError> {
        let published_at = DateTime::parse_from_rfc3339(&video.published_at)
            .map_err(|source| AnalysisError::PublishedAt {
                value: video.published_at.clone(),
                source,
            })?
            .with_timezone(&Utc);
        let days = days_since_published(published_at, now) as f64;
        let counts = video.statistics.counts();

        Ok(VideoAnalysis {
            published_info: localize(published_at),
            duration_seconds: parse_duration(&video.duration)?,
            title_analysis: self.classifier.classify(&video.title),
            daily_average: DailyAverage {
                views: counts.views as f64 / days,
                likes: counts.likes as f64 / days,
                comments: counts.comments as f64 / days,
            },
            total_engagement: counts.total(),
        })
    }

    /// Attaches analytics, or keeps the raw video as `AnalysisError` when
    /// analysis fails.
    pub fn enrich(&self, video: RawVideo, now: DateTime<Utc>) -> VideoRecord {
        match self.analyze(&video, now) {
            Ok(analysis) => VideoRecord::Success { video, analysis },
            Err(err) => VideoRecord::AnalysisError {
                video,
                error_message: err.to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{RawStatistics, RecordStatus, TimeOfDay};
    use chrono::{Duration, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 11, 0, 0, 0).single().unwrap()
    }

    fn video(published_at: &str, duration: &str, stats: RawStatistics) -> RawVideo {
        RawVideo {
            video_id: "vid1".into(),
            title: "【MV】ライブ".into(),
            description: String::new(),
            published_at: published_at.into(),
            thumbnail_url: String::new(),
            channel_id: "chan".into(),
            channel_title: "Channel".into(),
            statistics: stats,
            duration: duration.into(),
            fetched_at: now(),
        }
    }

    #[test]
    fn days_since_published_is_at_least_one() {
        let n = now();
        assert_eq!(days_since_published(n, n), 1);
        assert_eq!(days_since_published(n - Duration::hours(23), n), 1);
        assert_eq!(days_since_published(n - Duration::hours(47), n), 1);
        assert_eq!(days_since_published(n - Duration::hours(48), n), 2);
        assert_eq!(days_since_published(n - Duration::days(400), n), 400);
        // clock skew: publish slightly in the future
        assert_eq!(days_since_published(n + Duration::minutes(5), n), 1);
    }

    #[test]
    fn enrich_computes_averages_and_engagement() {
        let record = RecordEnricher::default().enrich(
            video(
                "2024-06-01T00:00:00Z",
                "PT3M30S",
                RawStatistics::new(1001, 50, 7),
            ),
            now(),
        );
        assert_eq!(record.status(), RecordStatus::Success);
        let analysis = record.analysis().unwrap();
        assert_eq!(analysis.duration_seconds, 210);
        assert_eq!(analysis.total_engagement, 1058);
        assert!((analysis.daily_average.views - 100.1).abs() < 1e-9);
        assert!((analysis.daily_average.likes - 5.0).abs() < 1e-9);
        assert!((analysis.daily_average.comments - 0.7).abs() < 1e-9);
        assert!(analysis.title_analysis.is_mv);
        assert!(analysis.title_analysis.is_live);
        assert_eq!(analysis.published_info.hour, 9);
        assert_eq!(analysis.published_info.weekday, "Saturday");
        assert_eq!(analysis.published_info.time_of_day, TimeOfDay::Morning);
    }

    #[test]
    fn non_numeric_statistics_count_as_zero() {
        let stats = RawStatistics {
            view_count: "12".into(),
            like_count: "hidden".into(),
            comment_count: String::new(),
        };
        let record = RecordEnricher::default().enrich(
            video("2024-06-10T00:00:00Z", "PT1S", stats),
            now(),
        );
        let analysis = record.analysis().unwrap();
        assert_eq!(analysis.total_engagement, 12);
        assert_eq!(analysis.daily_average.likes, 0.0);
    }

    #[test]
    fn bad_duration_degrades_to_analysis_error() {
        let record = RecordEnricher::default().enrich(
            video("2024-06-01T00:00:00Z", "P1Y", RawStatistics::default()),
            now(),
        );
        assert_eq!(record.status(), RecordStatus::AnalysisError);
        assert!(record.analysis().is_none());
        assert!(record.raw().is_some());
        assert!(record.error_message().unwrap().contains("P1Y"));
    }

    #[test]
    fn bad_timestamp_degrades_to_analysis_error() {
        let record = RecordEnricher::default().enrich(
            video("", "PT1M", RawStatistics::default()),
            now(),
        );
        assert_eq!(record.status(), RecordStatus::AnalysisError);
        assert!(record.error_message().unwrap().contains("published_at"));
    }
}
