//! Per-year JSON snapshot documents.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use momo_core::{SnapshotMetadata, VideoRecord};
use momo_storage::{ObjectStore, StoredObject, CONTENT_TYPE_JSON};
use serde::Serialize;
use tracing::info;

pub fn snapshot_key(partition: &str, year: i32) -> String {
    format!("{partition}/video_stats_{year}.json")
}

#[derive(Serialize)]
struct SnapshotDocument<'a> {
    metadata: SnapshotMetadata,
    videos: &'a [VideoRecord],
}

/// Serializes `records` with their aggregates and replaces whatever was at
/// the year's key in `partition`.
pub async fn write_snapshot(
    store: &dyn ObjectStore,
    partition: &str,
    year: i32,
    records: &[VideoRecord],
    fetched_at: DateTime<Utc>,
) -> Result<StoredObject> {
    let key = snapshot_key(partition, year);
    let document = SnapshotDocument {
        metadata: SnapshotMetadata::from_records(year, records, fetched_at),
        videos: records,
    };
    let bytes = serde_json::to_vec_pretty(&document)
        .with_context(|| format!("serializing snapshot for {year}"))?;
    let stored = store
        .put(&key, bytes, CONTENT_TYPE_JSON)
        .await
        .with_context(|| format!("writing snapshot {key}"))?;
    info!(
        year,
        key = %stored.key,
        videos = records.len(),
        sha256 = %stored.content_hash,
        "wrote snapshot"
    );
    Ok(stored)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use momo_core::{RawStatistics, RawVideo, RecordEnricher, YearSnapshot};
    use momo_storage::MemoryObjectStore;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 3, 0, 0).single().unwrap()
    }

    fn record(id: &str, views: u64) -> VideoRecord {
        RecordEnricher::default().enrich(
            RawVideo {
                video_id: id.into(),
                title: "【MV】新曲".into(),
                description: String::new(),
                published_at: "2024-05-01T12:00:00Z".into(),
                thumbnail_url: String::new(),
                channel_id: "chan".into(),
                channel_title: "Channel".into(),
                statistics: RawStatistics::new(views, 10, 1),
                duration: "PT4M".into(),
                fetched_at: now(),
            },
            now(),
        )
    }

    #[tokio::test]
    async fn snapshot_lands_under_partition_and_reads_back() {
        let store = MemoryObjectStore::new();
        let records = vec![record("a", 100), record("b", 300)];
        let stored = write_snapshot(&store, "yyyy=2024/mm=06/dd=01", 2024, &records, now())
            .await
            .unwrap();
        assert_eq!(stored.key, "yyyy=2024/mm=06/dd=01/video_stats_2024.json");

        let object = store.object(&stored.key).await.unwrap();
        assert_eq!(object.content_type, CONTENT_TYPE_JSON);
        let snapshot: YearSnapshot = serde_json::from_slice(&object.bytes).unwrap();
        assert_eq!(snapshot.metadata.total_videos, 2);
        assert_eq!(snapshot.metadata.total_views, 400);
        assert_eq!(snapshot.metadata.average_views, 200.0);
        assert_eq!(snapshot.videos, records);
    }

    #[tokio::test]
    async fn rewriting_the_same_day_replaces_the_snapshot() {
        let store = MemoryObjectStore::new();
        let partition = "yyyy=2024/mm=06/dd=01";
        write_snapshot(&store, partition, 2024, &[record("a", 1)], now())
            .await
            .unwrap();
        write_snapshot(&store, partition, 2024, &[record("b", 2)], now())
            .await
            .unwrap();

        let text = store.text(&snapshot_key(partition, 2024)).await.unwrap();
        let snapshot: YearSnapshot = serde_json::from_str(&text).unwrap();
        assert_eq!(snapshot.videos.len(), 1);
        assert_eq!(snapshot.videos[0].video_id(), "b");
    }
}
