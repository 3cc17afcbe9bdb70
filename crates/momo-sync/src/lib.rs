//! Collection pipeline: harvest per year, write snapshots and the ledger,
//! and wrap a run in the `{statusCode, body}` invocation envelope.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Datelike, Utc};
use momo_adapters::{FixtureVideoSource, VideoSource, YouTubeDataApi};
use momo_core::{date_partition, jst, RecordEnricher};
use momo_storage::{FsObjectStore, HttpClientConfig, HttpFetcher, ObjectStore};
use serde::{Deserialize, Serialize};
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{error, info, warn};

pub mod comments;
pub mod harvest;
pub mod ledger;
pub mod rules;
pub mod snapshot;

pub use comments::{collect_comments, CommentCollection};
pub use harvest::{Harvester, YearHarvest};
pub use ledger::{append_ledger, flatten, ledger_key, LedgerAppend, LedgerRow, LEDGER_FILE};
pub use rules::load_classifier;
pub use snapshot::{snapshot_key, write_snapshot};

pub const CRATE_NAME: &str = "momo-sync";

pub const DEFAULT_CHANNEL_ID: &str = "UC6YNWTm6zuMFsjqd0PO3G-Q";

/// Earliest start year accepted from operators.
pub const MIN_START_YEAR: i32 = 2008;

pub const SUCCESS_MESSAGE: &str = "Successfully processed video data";

#[derive(Debug, Clone)]
pub struct CollectorConfig {
    pub youtube_api_key: Option<String>,
    pub channel_id: String,
    pub source: String,
    pub fixture_path: PathBuf,
    pub storage: String,
    pub output_dir: PathBuf,
    pub stats_bucket: Option<String>,
    pub comments_bucket: Option<String>,
    pub aws_region: String,
    pub rules_path: PathBuf,
    pub user_agent: String,
    pub http_timeout_secs: u64,
    pub scheduler_enabled: bool,
    pub collect_cron: String,
}

fn non_empty_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

impl CollectorConfig {
    pub fn from_env() -> Self {
        let stats_bucket = non_empty_var("S3_BUCKET_NAME");
        Self {
            youtube_api_key: non_empty_var("YOUTUBE_API_KEY"),
            channel_id: std::env::var("MOMO_CHANNEL_ID")
                .unwrap_or_else(|_| DEFAULT_CHANNEL_ID.to_string()),
            source: std::env::var("MOMO_SOURCE").unwrap_or_else(|_| "youtube".to_string()),
            fixture_path: std::env::var("MOMO_FIXTURE_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("fixtures/sample-channel/bundle.json")),
            storage: std::env::var("MOMO_STORAGE").unwrap_or_else(|_| "fs".to_string()),
            output_dir: std::env::var("MOMO_OUTPUT_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("./output")),
            comments_bucket: non_empty_var("S3_BUCKET_NAME_GET_COMMENT").or_else(|| stats_bucket.clone()),
            stats_bucket,
            aws_region: std::env::var("AWS_REGION")
                .unwrap_or_else(|_| "ap-northeast-1".to_string()),
            rules_path: std::env::var("MOMO_RULES_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("rules/title_facets.yaml")),
            user_agent: std::env::var("MOMO_USER_AGENT")
                .unwrap_or_else(|_| "momo-collector/0.1".to_string()),
            http_timeout_secs: std::env::var("MOMO_HTTP_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(30),
            scheduler_enabled: std::env::var("MOMO_SCHEDULER_ENABLED")
                .map(|v| matches!(v.as_str(), "1" | "true" | "TRUE" | "True"))
                .unwrap_or(false),
            collect_cron: std::env::var("MOMO_COLLECT_CRON")
                .unwrap_or_else(|_| "0 0 15 * * *".to_string()),
        }
    }

    pub fn http_config(&self) -> HttpClientConfig {
        HttpClientConfig {
            timeout: Duration::from_secs(self.http_timeout_secs),
            user_agent: Some(self.user_agent.clone()),
        }
    }

    pub fn build_source(&self) -> Result<Arc<dyn VideoSource>> {
        match self.source.as_str() {
            "youtube" => {
                let api_key = self
                    .youtube_api_key
                    .clone()
                    .context("YOUTUBE_API_KEY must be set for the youtube source")?;
                let http = HttpFetcher::new(self.http_config())?;
                Ok(Arc::new(YouTubeDataApi::new(http, api_key)))
            }
            "fixture" => {
                let source = FixtureVideoSource::from_path(&self.fixture_path)?;
                Ok(Arc::new(source))
            }
            other => bail!("unknown MOMO_SOURCE {other:?} (expected youtube or fixture)"),
        }
    }

    pub async fn build_stats_store(&self) -> Result<Arc<dyn ObjectStore>> {
        self.build_store(self.stats_bucket.as_deref()).await
    }

    pub async fn build_comments_store(&self) -> Result<Arc<dyn ObjectStore>> {
        self.build_store(self.comments_bucket.as_deref()).await
    }

    async fn build_store(&self, bucket: Option<&str>) -> Result<Arc<dyn ObjectStore>> {
        match self.storage.as_str() {
            "fs" => Ok(Arc::new(FsObjectStore::new(&self.output_dir))),
            "s3" => {
                #[cfg(feature = "s3")]
                {
                    let bucket = bucket.context("S3_BUCKET_NAME must be set for s3 storage")?;
                    let store =
                        momo_storage::s3::S3ObjectStore::from_env(bucket, self.aws_region.as_str())
                            .await;
                    Ok(Arc::new(store))
                }
                #[cfg(not(feature = "s3"))]
                {
                    let _ = bucket;
                    bail!("MOMO_STORAGE=s3 requires building with the `s3` feature")
                }
            }
            other => bail!("unknown MOMO_STORAGE {other:?} (expected fs or s3)"),
        }
    }
}

/// Invocation input. A missing start year means the current year only;
/// years before [`MIN_START_YEAR`] are rejected.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunRequest {
    #[serde(default)]
    pub start_year: Option<i32>,
}

impl RunRequest {
    /// Rejects start years earlier than [`MIN_START_YEAR`].
    pub fn validate(&self) -> Result<()> {
        if let Some(year) = self.start_year {
            if year < MIN_START_YEAR {
                bail!("start year must be {MIN_START_YEAR} or later (got {year})");
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub years_processed: Vec<i32>,
    pub total_videos: usize,
    pub date_folder: String,
    pub snapshot_keys: Vec<String>,
    pub ledger_key: Option<String>,
    /// Years whose listing failed and therefore contributed nothing.
    pub listing_failures: Vec<i32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RunBody {
    Success {
        message: String,
        years_processed: Vec<i32>,
        total_videos: usize,
        date_folder: String,
    },
    Failure {
        error: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunResponse {
    #[serde(rename = "statusCode")]
    pub status_code: u16,
    pub body: RunBody,
}

impl RunResponse {
    pub fn success(summary: &RunSummary) -> Self {
        Self {
            status_code: 200,
            body: RunBody::Success {
                message: SUCCESS_MESSAGE.to_string(),
                years_processed: summary.years_processed.clone(),
                total_videos: summary.total_videos,
                date_folder: summary.date_folder.clone(),
            },
        }
    }

    pub fn failure(err: &anyhow::Error) -> Self {
        Self {
            status_code: 500,
            body: RunBody::Failure {
                error: format!("{err:#}"),
            },
        }
    }

    pub fn invalid_request(err: &anyhow::Error) -> Self {
        Self {
            status_code: 400,
            body: RunBody::Failure {
                error: format!("{err:#}"),
            },
        }
    }

    pub fn is_success(&self) -> bool {
        self.status_code == 200
    }
}

/// Local (UTC+9) calendar year of `now`.
pub fn current_year(now: DateTime<Utc>) -> i32 {
    now.with_timezone(&jst()).year()
}

pub struct CollectPipeline {
    source: Arc<dyn VideoSource>,
    store: Arc<dyn ObjectStore>,
    enricher: RecordEnricher,
    channel_id: String,
}

impl CollectPipeline {
    pub fn new(
        source: Arc<dyn VideoSource>,
        store: Arc<dyn ObjectStore>,
        channel_id: impl Into<String>,
    ) -> Self {
        Self {
            source,
            store,
            enricher: RecordEnricher::default(),
            channel_id: channel_id.into(),
        }
    }

    pub fn with_enricher(mut self, enricher: RecordEnricher) -> Self {
        self.enricher = enricher;
        self
    }

    pub async fn from_config(config: &CollectorConfig) -> Result<Self> {
        let source = config.build_source()?;
        let store = config.build_stats_store().await?;
        let classifier = load_classifier(&config.rules_path)?;
        info!(
            source = source.source_id(),
            store = %store.describe(),
            channel_id = %config.channel_id,
            "collect pipeline ready"
        );
        Ok(Self::new(source, store, config.channel_id.clone())
            .with_enricher(RecordEnricher::new(classifier)))
    }

    pub fn channel_id(&self) -> &str {
        &self.channel_id
    }

    /// Harvests every year in `start_year..=end_year`, writes one snapshot
    /// per non-empty year and appends all records to the day's ledger once.
    /// A reversed range processes nothing. Storage faults abort the run.
    pub async fn run_once(
        &self,
        start_year: i32,
        end_year: i32,
        now: DateTime<Utc>,
    ) -> Result<RunSummary> {
        let date_folder = date_partition(now);
        let recorded_at = now
            .with_timezone(&jst())
            .format(ledger::RECORDED_AT_FORMAT)
            .to_string();
        let harvester = Harvester::new(self.source.as_ref(), &self.enricher, &self.channel_id);

        let mut all_records = Vec::new();
        let mut snapshot_keys = Vec::new();
        let mut listing_failures = Vec::new();
        for year in start_year..=end_year {
            info!(year, "fetching videos for year");
            let harvest = harvester.harvest_year(year, now).await;
            if harvest.listing_error.is_some() {
                listing_failures.push(year);
            }
            if harvest.records.is_empty() {
                info!(year, "no videos for year");
                continue;
            }

            let stored = write_snapshot(
                self.store.as_ref(),
                &date_folder,
                year,
                &harvest.records,
                now,
            )
            .await?;
            snapshot_keys.push(stored.key);
            all_records.extend(harvest.records);
        }

        let ledger = append_ledger(
            self.store.as_ref(),
            &ledger_key(&date_folder),
            &all_records,
            &recorded_at,
        )
        .await?;

        Ok(RunSummary {
            years_processed: (start_year..=end_year).collect(),
            total_videos: all_records.len(),
            date_folder,
            snapshot_keys,
            ledger_key: ledger.map(|l| l.key),
            listing_failures,
        })
    }

    pub async fn invoke(&self, request: RunRequest) -> RunResponse {
        self.invoke_at(request, Utc::now()).await
    }

    /// Runs from the requested start year through the current year and
    /// folds any escaping fault into a 500 response.
    pub async fn invoke_at(&self, request: RunRequest, now: DateTime<Utc>) -> RunResponse {
        if let Err(err) = request.validate() {
            warn!(error = %err, "rejected collection request");
            return RunResponse::invalid_request(&err);
        }
        let end_year = current_year(now);
        let start_year = request.start_year.unwrap_or(end_year);
        match self.run_once(start_year, end_year, now).await {
            Ok(summary) => {
                info!(
                    total_videos = summary.total_videos,
                    date_folder = %summary.date_folder,
                    listing_failures = summary.listing_failures.len(),
                    "collection run complete"
                );
                RunResponse::success(&summary)
            }
            Err(err) => {
                let message = format!("{err:#}");
                error!(error = %message, "collection run failed");
                RunResponse::failure(&err)
            }
        }
    }
}

/// Cron job that invokes the pipeline with the default request; `None`
/// when scheduling is disabled.
pub async fn maybe_build_scheduler(
    config: &CollectorConfig,
    pipeline: Arc<CollectPipeline>,
) -> Result<Option<JobScheduler>> {
    if !config.scheduler_enabled {
        return Ok(None);
    }

    let sched = JobScheduler::new().await.context("creating scheduler")?;
    let cron = &config.collect_cron;
    let job = Job::new_async(cron, move |_uuid, _l| {
        let pipeline = Arc::clone(&pipeline);
        Box::pin(async move {
            let response = pipeline.invoke(RunRequest::default()).await;
            if response.is_success() {
                info!(status = response.status_code, "scheduled collection finished");
            } else {
                warn!(status = response.status_code, body = ?response.body, "scheduled collection failed");
            }
        })
    })
    .with_context(|| format!("creating scheduler job for cron {cron}"))?;
    sched.add(job).await.context("adding scheduler job")?;
    Ok(Some(sched))
}

pub async fn run_collect_once_from_env(start_year: Option<i32>) -> Result<RunResponse> {
    let config = CollectorConfig::from_env();
    let pipeline = CollectPipeline::from_config(&config).await?;
    Ok(pipeline.invoke(RunRequest { start_year }).await)
}

pub async fn collect_comments_from_env(video_id: &str) -> Result<CommentCollection> {
    let config = CollectorConfig::from_env();
    let source = config.build_source()?;
    let store = config.build_comments_store().await?;
    Ok(collect_comments(source.as_ref(), store.as_ref(), video_id, Utc::now()).await)
}

/// Starts the collection cron job and blocks until Ctrl-C.
pub async fn run_scheduler_from_env() -> Result<()> {
    let mut config = CollectorConfig::from_env();
    config.scheduler_enabled = true;
    let pipeline = Arc::new(CollectPipeline::from_config(&config).await?);
    let Some(mut sched) = maybe_build_scheduler(&config, pipeline).await? else {
        bail!("scheduler could not be built");
    };
    sched.start().await.context("starting scheduler")?;
    info!(cron = %config.collect_cron, "scheduler running; press Ctrl-C to stop");

    tokio::signal::ctrl_c().await.context("waiting for Ctrl-C")?;
    sched.shutdown().await.context("stopping scheduler")?;
    info!("scheduler stopped");
    Ok(())
}
