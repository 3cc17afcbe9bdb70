//! Top-level comment dumps for a single video.

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use momo_adapters::VideoSource;
use momo_core::{date_partition, jst, Comment, CommentDump};
use momo_storage::{ObjectStore, StoredObject, CONTENT_TYPE_CSV, CONTENT_TYPE_JSON};
use tracing::{info, warn};

pub const COMMENT_TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommentCollection {
    pub video_id: String,
    pub timestamp: String,
    pub comments: usize,
    /// `None` when the corresponding write failed.
    pub json: Option<StoredObject>,
    pub csv: Option<StoredObject>,
}

pub fn comment_keys(partition: &str, video_id: &str, timestamp: &str) -> (String, String) {
    let stem = format!("comments_{video_id}_{timestamp}");
    (
        format!("json/{partition}/{stem}.json"),
        format!("csv/{partition}/{stem}.csv"),
    )
}

/// Pages through every top-level comment. A failing page ends paging and
/// keeps what was gathered before it.
pub async fn fetch_all_comments(source: &dyn VideoSource, video_id: &str) -> Vec<Comment> {
    let mut comments = Vec::new();
    let mut page_token: Option<String> = None;
    loop {
        match source.fetch_comments(video_id, page_token.as_deref()).await {
            Ok(page) => {
                comments.extend(page.comments);
                match page.next_page_token {
                    Some(token) => page_token = Some(token),
                    None => break,
                }
            }
            Err(err) => {
                warn!(video_id, error = %err, kept = comments.len(), "comment page failed");
                break;
            }
        }
    }
    comments
}

fn flat_text(text: &str) -> String {
    text.replace(',', "，").replace('\n', " ")
}

pub fn comments_csv(comments: &[Comment]) -> Result<Vec<u8>> {
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(Vec::new());
    writer.write_record(["author", "publishedAt", "likeCount", "text"])?;
    for comment in comments {
        let like_count = comment.like_count.to_string();
        let text = flat_text(&comment.text);
        writer.write_record([
            comment.author.as_str(),
            comment.published_at.as_str(),
            like_count.as_str(),
            text.as_str(),
        ])?;
    }
    writer
        .into_inner()
        .map_err(|err| anyhow!("flushing comment rows: {}", err.error()))
}

async fn put_logged(
    store: &dyn ObjectStore,
    key: &str,
    bytes: Result<Vec<u8>>,
    content_type: &str,
) -> Option<StoredObject> {
    let written = match bytes {
        Ok(bytes) => store
            .put(key, bytes, content_type)
            .await
            .with_context(|| format!("writing {key}")),
        Err(err) => Err(err),
    };
    match written {
        Ok(stored) => {
            info!(key = %stored.key, sha256 = %stored.content_hash, "saved comments");
            Some(stored)
        }
        Err(err) => {
            let message = format!("{err:#}");
            warn!(key, error = %message, "failed to save comments");
            None
        }
    }
}

/// Collects the video's comments and writes them as a JSON dump and a CSV
/// sheet under the date partition of `now`. Each format is written
/// independently.
pub async fn collect_comments(
    source: &dyn VideoSource,
    store: &dyn ObjectStore,
    video_id: &str,
    now: DateTime<Utc>,
) -> CommentCollection {
    info!(video_id, "collecting comments");
    let comments = fetch_all_comments(source, video_id).await;
    info!(video_id, count = comments.len(), "fetched comments");

    let timestamp = now.with_timezone(&jst()).format(COMMENT_TIMESTAMP_FORMAT).to_string();
    let (json_key, csv_key) = comment_keys(&date_partition(now), video_id, &timestamp);

    let csv_bytes = comments_csv(&comments);
    let dump = CommentDump {
        video_id: video_id.to_string(),
        timestamp: timestamp.clone(),
        comments,
    };
    let json_bytes = serde_json::to_vec_pretty(&dump).context("serializing comment dump");

    let json = put_logged(store, &json_key, json_bytes, CONTENT_TYPE_JSON).await;
    let csv = put_logged(store, &csv_key, csv_bytes, CONTENT_TYPE_CSV).await;

    CommentCollection {
        video_id: video_id.to_string(),
        timestamp,
        comments: dump.comments.len(),
        json,
        csv,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::TimeZone;
    use momo_adapters::{ChannelWindow, CommentPage, ListingPage, SourceError, VideoDetails};
    use momo_storage::{MemoryObjectStore, StorageError};

    struct PagedComments {
        pages: Vec<Result<CommentPage, String>>,
    }

    fn comment(author: &str, text: &str) -> Comment {
        Comment {
            author: author.into(),
            text: text.into(),
            like_count: 2,
            published_at: "2024-05-02T00:00:00Z".into(),
        }
    }

    #[async_trait]
    impl VideoSource for PagedComments {
        fn source_id(&self) -> &'static str {
            "paged"
        }

        async fn fetch_listing(
            &self,
            _window: &ChannelWindow,
            _page_token: Option<&str>,
        ) -> Result<ListingPage, SourceError> {
            Ok(ListingPage::default())
        }

        async fn fetch_detail(&self, _video_id: &str) -> Result<Option<VideoDetails>, SourceError> {
            Ok(None)
        }

        async fn fetch_comments(
            &self,
            _video_id: &str,
            page_token: Option<&str>,
        ) -> Result<CommentPage, SourceError> {
            let index = page_token.map(|t| t.parse::<usize>().unwrap()).unwrap_or(0);
            self.pages[index].clone().map_err(SourceError::Message)
        }
    }

    fn page(comments: Vec<Comment>, next: Option<&str>) -> Result<CommentPage, String> {
        Ok(CommentPage {
            comments,
            next_page_token: next.map(str::to_string),
        })
    }

    fn now() -> DateTime<Utc> {
        // 2024-06-01 00:30:05 local
        Utc.with_ymd_and_hms(2024, 5, 31, 15, 30, 5).single().unwrap()
    }

    #[tokio::test]
    async fn pages_until_the_token_runs_out() {
        let source = PagedComments {
            pages: vec![
                page(vec![comment("a", "one")], Some("1")),
                page(vec![comment("b", "two"), comment("c", "three")], None),
            ],
        };
        let all = fetch_all_comments(&source, "vid").await;
        assert_eq!(all.len(), 3);
    }

    #[tokio::test]
    async fn failing_page_keeps_earlier_comments() {
        let source = PagedComments {
            pages: vec![
                page(vec![comment("a", "one")], Some("1")),
                Err("commentsDisabled".into()),
            ],
        };
        let all = fetch_all_comments(&source, "vid").await;
        assert_eq!(all, vec![comment("a", "one")]);
    }

    #[tokio::test]
    async fn writes_json_and_csv_under_local_partition() {
        let source = PagedComments {
            pages: vec![page(vec![comment("fan", "良い,曲\n最高")], None)],
        };
        let store = MemoryObjectStore::new();
        let collected = collect_comments(&source, &store, "vid", now()).await;

        assert_eq!(collected.timestamp, "20240601_003005");
        assert_eq!(collected.comments, 1);
        let json = collected.json.unwrap();
        let csv = collected.csv.unwrap();
        assert_eq!(
            json.key,
            "json/yyyy=2024/mm=06/dd=01/comments_vid_20240601_003005.json"
        );
        assert_eq!(
            csv.key,
            "csv/yyyy=2024/mm=06/dd=01/comments_vid_20240601_003005.csv"
        );

        let dump: CommentDump =
            serde_json::from_str(&store.text(&json.key).await.unwrap()).unwrap();
        assert_eq!(dump.video_id, "vid");
        assert_eq!(dump.comments[0].text, "良い,曲\n最高");

        assert_eq!(
            store.text(&csv.key).await.unwrap(),
            "author,publishedAt,likeCount,text\nfan,2024-05-02T00:00:00Z,2,良い，曲 最高\n"
        );
    }

    struct CsvOnlyStore(MemoryObjectStore);

    #[async_trait]
    impl ObjectStore for CsvOnlyStore {
        fn describe(&self) -> String {
            "csv-only".into()
        }

        async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
            self.0.get(key).await
        }

        async fn put(
            &self,
            key: &str,
            bytes: Vec<u8>,
            content_type: &str,
        ) -> Result<StoredObject, StorageError> {
            if key.ends_with(".json") {
                return Err(StorageError::Backend {
                    key: key.to_string(),
                    message: "access denied".into(),
                });
            }
            self.0.put(key, bytes, content_type).await
        }
    }

    #[tokio::test]
    async fn a_failed_json_write_still_writes_csv() {
        let source = PagedComments {
            pages: vec![page(vec![comment("fan", "hi")], None)],
        };
        let store = CsvOnlyStore(MemoryObjectStore::new());
        let collected = collect_comments(&source, &store, "vid", now()).await;
        assert!(collected.json.is_none());
        assert!(collected.csv.is_some());
        assert_eq!(store.0.keys().await.len(), 1);
    }
}
