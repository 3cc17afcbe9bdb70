// Fixture-source contract test against the captured sample channel.

use std::path::{Path, PathBuf};

use chrono::{TimeZone, Utc};
use momo_adapters::{load_fixture_bundle, ChannelWindow, FixtureVideoSource, VideoSource};

fn fixture_dir() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("../../fixtures/sample-channel")
}

#[tokio::test]
async fn sample_channel_listing_matches_expected_ids() {
    let bundle = load_fixture_bundle(fixture_dir().join("bundle.json")).expect("bundle");
    let channel_id = bundle.channel_id.clone();
    let source = FixtureVideoSource::new(bundle).with_page_size(3);
    let window = ChannelWindow {
        channel_id,
        published_after: Utc.with_ymd_and_hms(2023, 12, 31, 15, 0, 0).single().unwrap(),
        published_before: Utc.with_ymd_and_hms(2024, 12, 31, 15, 0, 0).single().unwrap(),
    };

    let mut ids = Vec::new();
    let mut token: Option<String> = None;
    loop {
        let page = source
            .fetch_listing(&window, token.as_deref())
            .await
            .expect("listing page");
        ids.extend(page.items.into_iter().map(|i| i.video_id));
        token = page.next_page_token;
        if token.is_none() {
            break;
        }
    }

    let expected: Vec<String> = serde_json::from_str(
        &std::fs::read_to_string(fixture_dir().join("expected_listing_2024.json")).expect("expected"),
    )
    .expect("parse expected");
    assert_eq!(ids, expected);
}
