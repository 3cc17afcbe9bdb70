//! YouTube Data API v3 over [`HttpFetcher`].

use async_trait::async_trait;
use momo_core::{format_rfc3339_utc, Comment, RawStatistics};
use momo_storage::HttpFetcher;
use serde::Deserialize;
use tracing::debug;

use crate::{
    ChannelWindow, CommentPage, ListingItem, ListingPage, SourceError, VideoDetails, VideoSource,
    COMMENT_PAGE_SIZE, SEARCH_PAGE_SIZE,
};

pub const YOUTUBE_API_BASE: &str = "https://www.googleapis.com/youtube/v3";

const VIDEO_KIND: &str = "youtube#video";

pub struct YouTubeDataApi {
    http: HttpFetcher,
    api_key: String,
    base_url: String,
}

impl YouTubeDataApi {
    pub fn new(http: HttpFetcher, api_key: impl Into<String>) -> Self {
        Self {
            http,
            api_key: api_key.into(),
            base_url: YOUTUBE_API_BASE.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn endpoint(&self, resource: &str) -> String {
        format!("{}/{}", self.base_url, resource)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchResponse {
    #[serde(default)]
    items: Vec<SearchItem>,
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SearchItem {
    id: SearchItemId,
    #[serde(default)]
    snippet: Snippet,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchItemId {
    kind: String,
    video_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct Snippet {
    title: String,
    description: String,
    published_at: String,
    channel_title: String,
    thumbnails: Thumbnails,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Thumbnails {
    high: Option<Thumbnail>,
}

#[derive(Debug, Deserialize)]
struct Thumbnail {
    url: String,
}

#[derive(Debug, Deserialize)]
struct VideosResponse {
    #[serde(default)]
    items: Vec<VideoItem>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VideoItem {
    #[serde(default)]
    content_details: Option<ContentDetails>,
    #[serde(default)]
    statistics: Option<RawStatistics>,
}

#[derive(Debug, Deserialize)]
struct ContentDetails {
    duration: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CommentThreadsResponse {
    #[serde(default)]
    items: Vec<CommentThread>,
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CommentThread {
    snippet: CommentThreadSnippet,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CommentThreadSnippet {
    top_level_comment: TopLevelComment,
}

#[derive(Debug, Deserialize)]
struct TopLevelComment {
    snippet: CommentSnippet,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CommentSnippet {
    author_display_name: String,
    text_display: String,
    #[serde(default)]
    like_count: u64,
    published_at: String,
}

fn listing_page_from(resp: SearchResponse) -> ListingPage {
    let items = resp
        .items
        .into_iter()
        .filter(|item| item.id.kind == VIDEO_KIND)
        .filter_map(|item| {
            let video_id = item.id.video_id?;
            Some(ListingItem {
                video_id,
                title: item.snippet.title,
                description: item.snippet.description,
                published_at: item.snippet.published_at,
                thumbnail_url: item
                    .snippet
                    .thumbnails
                    .high
                    .map(|t| t.url)
                    .unwrap_or_default(),
                channel_title: item.snippet.channel_title,
            })
        })
        .collect();
    ListingPage {
        items,
        next_page_token: resp.next_page_token.filter(|t| !t.is_empty()),
    }
}

fn details_from(resp: VideosResponse) -> Option<VideoDetails> {
    let item = resp.items.into_iter().next()?;
    Some(VideoDetails {
        duration: item
            .content_details
            .and_then(|c| c.duration)
            .unwrap_or_else(|| "PT0S".to_string()),
        statistics: item.statistics.unwrap_or_default(),
    })
}

fn comment_page_from(resp: CommentThreadsResponse) -> CommentPage {
    let comments = resp
        .items
        .into_iter()
        .map(|thread| {
            let c = thread.snippet.top_level_comment.snippet;
            Comment {
                author: c.author_display_name,
                text: c.text_display,
                like_count: c.like_count,
                published_at: c.published_at,
            }
        })
        .collect();
    CommentPage {
        comments,
        next_page_token: resp.next_page_token.filter(|t| !t.is_empty()),
    }
}

#[async_trait]
impl VideoSource for YouTubeDataApi {
    fn source_id(&self) -> &'static str {
        "youtube"
    }

    async fn fetch_listing(
        &self,
        window: &ChannelWindow,
        page_token: Option<&str>,
    ) -> Result<ListingPage, SourceError> {
        let mut query = vec![
            ("part", "id,snippet".to_string()),
            ("channelId", window.channel_id.clone()),
            ("order", "date".to_string()),
            ("publishedAfter", format_rfc3339_utc(window.published_after)),
            ("publishedBefore", format_rfc3339_utc(window.published_before)),
            ("type", "video".to_string()),
            ("maxResults", SEARCH_PAGE_SIZE.to_string()),
            ("key", self.api_key.clone()),
        ];
        if let Some(token) = page_token {
            query.push(("pageToken", token.to_string()));
        }
        let resp: SearchResponse = self.http.get_json(&self.endpoint("search"), &query).await?;
        let page = listing_page_from(resp);
        debug!(items = page.items.len(), has_next = page.next_page_token.is_some(), "search page");
        Ok(page)
    }

    async fn fetch_detail(&self, video_id: &str) -> Result<Option<VideoDetails>, SourceError> {
        let query = [
            ("part", "statistics,contentDetails".to_string()),
            ("id", video_id.to_string()),
            ("key", self.api_key.clone()),
        ];
        let resp: VideosResponse = self.http.get_json(&self.endpoint("videos"), &query).await?;
        Ok(details_from(resp))
    }

    async fn fetch_comments(
        &self,
        video_id: &str,
        page_token: Option<&str>,
    ) -> Result<CommentPage, SourceError> {
        let mut query = vec![
            ("part", "snippet".to_string()),
            ("videoId", video_id.to_string()),
            ("maxResults", COMMENT_PAGE_SIZE.to_string()),
            ("key", self.api_key.clone()),
        ];
        if let Some(token) = page_token {
            query.push(("pageToken", token.to_string()));
        }
        let resp: CommentThreadsResponse = self
            .http
            .get_json(&self.endpoint("commentThreads"), &query)
            .await?;
        Ok(comment_page_from(resp))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn search_response_keeps_only_videos() {
        let resp: SearchResponse = serde_json::from_str(
            r#"{
                "nextPageToken": "CDIQAA",
                "items": [
                    {"id": {"kind": "youtube#video", "videoId": "v1"},
                     "snippet": {"title": "【MV】新曲", "description": "d",
                                 "publishedAt": "2024-05-01T12:00:00Z",
                                 "channelTitle": "Official",
                                 "thumbnails": {"high": {"url": "https://i.ytimg.com/v1.jpg"}}}},
                    {"id": {"kind": "youtube#playlist", "playlistId": "p1"},
                     "snippet": {"title": "playlist"}},
                    {"id": {"kind": "youtube#video", "videoId": "v2"},
                     "snippet": {"title": "no thumbnail", "publishedAt": "2024-04-01T00:00:00Z"}}
                ]
            }"#,
        )
        .unwrap();
        let page = listing_page_from(resp);
        assert_eq!(page.next_page_token.as_deref(), Some("CDIQAA"));
        assert_eq!(page.items.len(), 2);
        assert_eq!(page.items[0].video_id, "v1");
        assert_eq!(page.items[0].thumbnail_url, "https://i.ytimg.com/v1.jpg");
        assert_eq!(page.items[1].thumbnail_url, "");
        assert_eq!(page.items[1].channel_title, "");
    }

    #[test]
    fn details_default_missing_fields() {
        let resp: VideosResponse = serde_json::from_str(
            r#"{"items": [{"statistics": {"viewCount": "100", "commentCount": "2"}}]}"#,
        )
        .unwrap();
        let details = details_from(resp).unwrap();
        assert_eq!(details.duration, "PT0S");
        assert_eq!(details.statistics.view_count, "100");
        assert_eq!(details.statistics.like_count, "0");

        let empty: VideosResponse = serde_json::from_str(r#"{"items": []}"#).unwrap();
        assert!(details_from(empty).is_none());
    }

    #[test]
    fn comment_threads_flatten_top_level_snippets() {
        let resp: CommentThreadsResponse = serde_json::from_str(
            r#"{"items": [{"snippet": {"topLevelComment": {"snippet": {
                "authorDisplayName": "@fan", "textDisplay": "最高!",
                "likeCount": 12, "publishedAt": "2024-05-02T00:00:00Z"}}}}],
                "nextPageToken": ""}"#,
        )
        .unwrap();
        let page = comment_page_from(resp);
        assert_eq!(page.comments.len(), 1);
        assert_eq!(page.comments[0].author, "@fan");
        assert_eq!(page.comments[0].like_count, 12);
        assert!(page.next_page_token.is_none());
    }
}
