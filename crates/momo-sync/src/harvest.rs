//! Year-bounded harvesting of a channel's videos.

use chrono::{DateTime, Utc};
use momo_adapters::{ChannelWindow, ListingItem, VideoSource};
use momo_core::{year_window, RawVideo, RecordEnricher, RecordStatus, VideoRecord};
use tracing::{info, info_span, warn, Instrument};

/// Outcome of harvesting one year. When the listing itself failed the
/// records are empty and `listing_error` holds the reason.
#[derive(Debug, Clone, PartialEq)]
pub struct YearHarvest {
    pub year: i32,
    pub records: Vec<VideoRecord>,
    pub listing_error: Option<String>,
}

impl YearHarvest {
    fn listing_failed(year: i32, error: String) -> Self {
        Self {
            year,
            records: Vec::new(),
            listing_error: Some(error),
        }
    }
}

pub struct Harvester<'a> {
    source: &'a dyn VideoSource,
    enricher: &'a RecordEnricher,
    channel_id: &'a str,
}

impl<'a> Harvester<'a> {
    pub fn new(
        source: &'a dyn VideoSource,
        enricher: &'a RecordEnricher,
        channel_id: &'a str,
    ) -> Self {
        Self {
            source,
            enricher,
            channel_id,
        }
    }

    /// Pages through the channel's videos for the local calendar `year`,
    /// fetching details for each one. Records keep provider order.
    pub async fn harvest_year(&self, year: i32, now: DateTime<Utc>) -> YearHarvest {
        let span = info_span!("harvest_year", year, source = self.source.source_id());
        self.harvest_year_inner(year, now).instrument(span).await
    }

    async fn harvest_year_inner(&self, year: i32, now: DateTime<Utc>) -> YearHarvest {
        let Some((published_after, published_before)) = year_window(year) else {
            warn!(year, "year has no representable local window");
            return YearHarvest::listing_failed(year, format!("year {year} is out of range"));
        };
        let window = ChannelWindow {
            channel_id: self.channel_id.to_string(),
            published_after,
            published_before,
        };

        let mut records = Vec::new();
        let mut page_token: Option<String> = None;
        loop {
            let page = match self.source.fetch_listing(&window, page_token.as_deref()).await {
                Ok(page) => page,
                Err(err) => {
                    warn!(year, error = %err, "listing failed; no records kept for year");
                    return YearHarvest::listing_failed(year, err.to_string());
                }
            };

            for item in page.items {
                if let Some(record) = self.harvest_video(item, now).await {
                    records.push(record);
                }
            }

            match page.next_page_token {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        info!(year, videos = records.len(), "harvested year");
        YearHarvest {
            year,
            records,
            listing_error: None,
        }
    }

    /// `None` when the provider returned no details for the id.
    async fn harvest_video(&self, item: ListingItem, now: DateTime<Utc>) -> Option<VideoRecord> {
        info!(video_id = %item.video_id, "processing video");
        let details = match self.source.fetch_detail(&item.video_id).await {
            Ok(Some(details)) => details,
            Ok(None) => {
                warn!(video_id = %item.video_id, "no details returned; skipping");
                return None;
            }
            Err(err) => {
                warn!(video_id = %item.video_id, error = %err, "details fetch failed");
                return Some(VideoRecord::fetch_error(
                    item.video_id,
                    item.title,
                    err.to_string(),
                    Utc::now(),
                ));
            }
        };

        let raw = RawVideo {
            video_id: item.video_id,
            title: item.title,
            description: item.description,
            published_at: item.published_at,
            thumbnail_url: item.thumbnail_url,
            channel_id: self.channel_id.to_string(),
            channel_title: item.channel_title,
            statistics: details.statistics,
            duration: details.duration,
            fetched_at: Utc::now(),
        };
        let record = self.enricher.enrich(raw, now);
        if record.status() == RecordStatus::AnalysisError {
            warn!(
                video_id = %record.video_id(),
                error = record.error_message().unwrap_or_default(),
                "analysis failed; keeping raw record"
            );
        }
        Some(record)
    }
}
