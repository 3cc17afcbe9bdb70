//! The per-day CSV ledger: one flattened row per harvested video, appended
//! by rewriting the whole object.

use anyhow::{anyhow, Context, Result};
use momo_core::{RawVideo, VideoAnalysis, VideoRecord};
use momo_storage::{ObjectStore, StoredObject, CONTENT_TYPE_CSV};
use tracing::{info, warn};

pub const LEDGER_FILE: &str = "video_stats.csv";

/// Format of the `recorded_at` column, in local (UTC+9) time.
pub const RECORDED_AT_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub fn ledger_key(partition: &str) -> String {
    format!("{partition}/{LEDGER_FILE}")
}

/// Ordered `(column, value)` cells for one ledger line.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LedgerRow {
    cells: Vec<(&'static str, String)>,
}

impl LedgerRow {
    fn push(&mut self, column: &'static str, value: impl Into<String>) {
        self.cells.push((column, value.into()));
    }

    pub fn columns(&self) -> Vec<&'static str> {
        self.cells.iter().map(|(column, _)| *column).collect()
    }

    pub fn get(&self, column: &str) -> Option<&str> {
        self.cells
            .iter()
            .find(|(c, _)| *c == column)
            .map(|(_, value)| value.as_str())
    }

    /// Values laid out in `schema` order. Columns this row lacks are blank;
    /// cells outside the schema are returned separately.
    fn project(&self, schema: &[&'static str]) -> (Vec<&str>, Vec<&'static str>) {
        let values = schema
            .iter()
            .map(|column| self.get(column).unwrap_or(""))
            .collect();
        let extra = self
            .cells
            .iter()
            .map(|(column, _)| *column)
            .filter(|column| !schema.contains(column))
            .collect();
        (values, extra)
    }
}

fn flag(value: bool) -> &'static str {
    if value {
        "True"
    } else {
        "False"
    }
}

/// Two-decimal display form of a daily average. Whole values keep one
/// decimal place, so `12.0` never collapses to `12`.
pub fn format_average(value: f64) -> String {
    let rounded = (value * 100.0).round() / 100.0;
    if rounded.is_finite() && rounded.fract() == 0.0 {
        format!("{rounded:.1}")
    } else {
        format!("{rounded}")
    }
}

fn push_enriched(row: &mut LedgerRow, video: &RawVideo, analysis: Option<&VideoAnalysis>) {
    row.push("published_at", video.published_at.as_str());

    let info = analysis.map(|a| &a.published_info);
    row.push("year", info.map(|i| i.year.to_string()).unwrap_or_default());
    row.push("month", info.map(|i| i.month.to_string()).unwrap_or_default());
    row.push("day", info.map(|i| i.day.to_string()).unwrap_or_default());
    row.push("hour", info.map(|i| i.hour.to_string()).unwrap_or_default());
    row.push("weekday", info.map(|i| i.weekday.clone()).unwrap_or_default());
    row.push(
        "time_of_day",
        info.map(|i| i.time_of_day.as_str()).unwrap_or_default(),
    );
    row.push(
        "duration_seconds",
        analysis.map(|a| a.duration_seconds.to_string()).unwrap_or_default(),
    );

    row.push("view_count", video.statistics.view_count.as_str());
    row.push("like_count", video.statistics.like_count.as_str());
    row.push("comment_count", video.statistics.comment_count.as_str());

    let daily = analysis.map(|a| a.daily_average);
    row.push("daily_avg_views", daily.map(|d| format_average(d.views)).unwrap_or_default());
    row.push("daily_avg_likes", daily.map(|d| format_average(d.likes)).unwrap_or_default());
    row.push(
        "daily_avg_comments",
        daily.map(|d| format_average(d.comments)).unwrap_or_default(),
    );
    row.push(
        "total_engagement",
        analysis.map(|a| a.total_engagement.to_string()).unwrap_or_default(),
    );

    let facets = analysis.map(|a| a.title_analysis);
    row.push("is_live", facets.map(|f| flag(f.is_live)).unwrap_or_default());
    row.push("is_mv", facets.map(|f| flag(f.is_mv)).unwrap_or_default());
    row.push("is_digest", facets.map(|f| flag(f.is_digest)).unwrap_or_default());
    row.push("is_event", facets.map(|f| flag(f.is_event)).unwrap_or_default());
    row.push(
        "has_member_name",
        facets.map(|f| flag(f.is_member_named)).unwrap_or_default(),
    );
}

/// Tabular projection of one record. Fetch failures carry only identity,
/// status, timestamp and the error; every other record carries the full
/// enriched column set, blank where analysis is missing.
pub fn flatten(record: &VideoRecord, recorded_at: &str) -> LedgerRow {
    let mut row = LedgerRow::default();
    row.push("video_id", record.video_id());
    row.push("title", record.title());
    row.push("status", record.status().as_str());
    row.push("recorded_at", recorded_at);

    match record {
        VideoRecord::FetchError { error_message, .. } => {
            row.push("error_message", error_message.as_str());
        }
        VideoRecord::Success { video, analysis } => push_enriched(&mut row, video, Some(analysis)),
        VideoRecord::AnalysisError { video, .. } => push_enriched(&mut row, video, None),
    }
    row
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerAppend {
    pub key: String,
    /// True when no prior ledger existed and a header was written.
    pub created: bool,
    pub rows_appended: usize,
    pub stored: StoredObject,
}

fn csv_writer() -> csv::Writer<Vec<u8>> {
    csv::WriterBuilder::new()
        .has_headers(false)
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(Vec::new())
}

/// Appends one row per record to the ledger at `key`. The column set is
/// taken from the first record; an existing ledger is kept verbatim as the
/// prefix. Returns `None` without touching storage when `records` is empty.
pub async fn append_ledger(
    store: &dyn ObjectStore,
    key: &str,
    records: &[VideoRecord],
    recorded_at: &str,
) -> Result<Option<LedgerAppend>> {
    let Some(first) = records.first() else {
        return Ok(None);
    };
    let schema = flatten(first, recorded_at).columns();

    let existing = store
        .get(key)
        .await
        .with_context(|| format!("reading ledger {key}"))?;
    let mut buffer = Vec::new();
    let mut created = true;
    if let Some(bytes) = existing {
        let text = String::from_utf8(bytes).with_context(|| format!("ledger {key} is not UTF-8"))?;
        let kept = text.trim_end();
        if !kept.is_empty() {
            buffer.extend_from_slice(kept.as_bytes());
            buffer.push(b'\n');
            created = false;
        }
    }

    let mut writer = csv_writer();
    if created {
        writer.write_record(&schema).context("writing ledger header")?;
    }
    for record in records {
        let row = flatten(record, recorded_at);
        let (values, extra) = row.project(&schema);
        if !extra.is_empty() {
            warn!(video_id = %record.video_id(), ?extra, "dropping columns outside ledger schema");
        }
        writer
            .write_record(&values)
            .with_context(|| format!("writing ledger row for {}", record.video_id()))?;
    }
    let rows = writer
        .into_inner()
        .map_err(|err| anyhow!("flushing ledger rows: {}", err.error()))?;
    buffer.extend_from_slice(&rows);

    let stored = store
        .put(key, buffer, CONTENT_TYPE_CSV)
        .await
        .with_context(|| format!("writing ledger {key}"))?;
    info!(
        key = %stored.key,
        rows = records.len(),
        created,
        sha256 = %stored.content_hash,
        "appended ledger"
    );
    Ok(Some(LedgerAppend {
        key: stored.key.clone(),
        created,
        rows_appended: records.len(),
        stored,
    }))
}
