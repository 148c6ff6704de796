//! Behavior-driven tests for availability discovery.
//!
//! These tests drive full collection passes against an in-memory bucket and
//! check the rows, the cache and the live status the collector leaves behind.

use atlas_core::{
    read_table, write_table, AvailabilityWindow, CacheMode, InstrumentPair, WindowCache,
};
use atlas_tests::{collector, collector_with, config_in, sample_bucket, wired, FakeBucket};

fn lines(rows: &[atlas_core::InstrumentRow]) -> Vec<String> {
    rows.iter()
        .map(|row| {
            format!(
                "{},{},{},{}",
                row.datatype,
                row.instrument,
                row.from_date(),
                row.to_date()
            )
        })
        .collect()
}

// =============================================================================
// Discovery: End-to-end pass
// =============================================================================

#[tokio::test]
async fn when_full_pass_runs_table_lists_every_pair_sorted_with_its_window() {
    // Given: klines with two dated instruments and trades with an empty one
    let dir = tempfile::tempdir().expect("tempdir");
    let config = config_in(dir.path());
    let (collector, _) = wired(sample_bucket().into_arc(), &config);

    // When: A full pass runs and its rows are written
    let rows = collector.collect_all().await.expect("pass succeeds");
    write_table(&config.table_path, &rows).expect("table written");

    // Then: The table holds one sorted row per pair, empty windows as blanks
    assert_eq!(
        lines(&rows),
        [
            "klines,BTCUSDT,2024-01-01,2024-06-01",
            "klines,ETHUSDT,2024-02-01,2024-06-01",
            "trades,BTCUSDT,,",
        ]
    );
    let written = std::fs::read_to_string(&config.table_path).expect("read table");
    assert_eq!(
        written,
        "datatype,instrument,from_date,to_date\n\
         klines,BTCUSDT,2024-01-01,2024-06-01\n\
         klines,ETHUSDT,2024-02-01,2024-06-01\n\
         trades,BTCUSDT,,\n"
    );
    assert_eq!(read_table(&config.table_path).expect("parse back"), rows);
}

#[tokio::test]
async fn when_pass_finishes_status_reports_complete() {
    // Given: The sample bucket
    let collector = collector(sample_bucket().into_arc());

    // When: A pass completes
    collector.collect_all().await.expect("pass succeeds");

    // Then: Progress caught up with total and nothing is running
    let status = collector.status();
    assert!(!status.running);
    assert_eq!(status.total, 3);
    assert_eq!(status.progress, 3);
    assert_eq!(status.errors, 0);
}

// =============================================================================
// Discovery: Failure handling
// =============================================================================

#[tokio::test]
async fn when_one_instrument_listing_fails_row_is_kept_with_empty_window() {
    // Given: ETHUSDT's listing is denied
    let bucket = sample_bucket().with_failure("klines/ETHUSDT/").into_arc();
    let collector = collector(bucket);

    // When: A pass runs
    let rows = collector.collect_all().await.expect("pass still succeeds");

    // Then: Every instrument still has a row and the failure is counted
    assert_eq!(
        lines(&rows),
        [
            "klines,BTCUSDT,2024-01-01,2024-06-01",
            "klines,ETHUSDT,,",
            "trades,BTCUSDT,,",
        ]
    );
    assert_eq!(collector.status().errors, 1);
    assert!(collector.status().is_complete());
}

#[tokio::test]
async fn when_instrument_listing_fails_the_failure_is_not_cached() {
    // Given: A failing instrument and a shared cache
    let cache = WindowCache::in_memory();
    let failing = sample_bucket().with_failure("klines/ETHUSDT/").into_arc();
    collector_with(failing, cache.clone(), CacheMode::Use, 2)
        .collect_all()
        .await
        .expect("first pass");

    // When: The listing recovers and another pass runs against the same cache
    let healthy = sample_bucket().into_arc();
    let rows = collector_with(healthy.clone(), cache.clone(), CacheMode::Use, 2)
        .collect_all()
        .await
        .expect("second pass");

    // Then: Only the previously failed pair is listed again
    assert_eq!(healthy.timestamp_requests(), 1);
    assert!(lines(&rows).contains(&"klines,ETHUSDT,2024-02-01,2024-06-01".to_owned()));
}

#[tokio::test]
async fn when_datatype_listing_fails_collect_one_returns_the_error() {
    // Given: The trades datatype cannot be listed
    let bucket = sample_bucket().with_failure("trades/").into_arc();
    let collector = collector(bucket);

    // When: Only that datatype is collected
    let result = collector.collect_one("trades").await;

    // Then: The transport error propagates and the pass is closed
    let error = result.expect_err("listing denied");
    assert_eq!(error.code(), "atlas.transport");
    assert!(!collector.status().running);
}

#[tokio::test]
async fn when_datatype_listing_fails_during_full_pass_other_datatypes_survive() {
    // Given: The trades datatype cannot be listed
    let bucket = sample_bucket().with_failure("trades/").into_arc();
    let collector = collector(bucket);

    // When: A full pass runs
    let rows = collector.collect_all().await.expect("pass succeeds");

    // Then: klines rows are present and one error is recorded
    assert_eq!(rows.len(), 2);
    assert!(rows.iter().all(|row| row.datatype == "klines"));
    assert_eq!(collector.status().errors, 1);
}

// =============================================================================
// Discovery: Cache behavior
// =============================================================================

#[tokio::test]
async fn when_pass_repeats_with_warm_cache_no_timestamps_are_listed() {
    // Given: A first pass has filled the cache
    let bucket = sample_bucket().into_arc();
    let collector = collector(bucket.clone());
    let first = collector.collect_all().await.expect("first pass");
    let listed = bucket.timestamp_requests();

    // When: The same pass runs again
    let second = collector.collect_all().await.expect("second pass");

    // Then: Output is identical and no pair was listed twice
    assert_eq!(listed, 3);
    assert_eq!(bucket.timestamp_requests(), listed);
    assert_eq!(first, second);
}

#[tokio::test]
async fn when_cache_is_persisted_a_new_process_reuses_it() {
    // Given: A pass that flushed its cache to disk
    let dir = tempfile::tempdir().expect("tempdir");
    let config = config_in(dir.path());
    let (first, _) = wired(sample_bucket().into_arc(), &config);
    first.collect_all().await.expect("first pass");

    // When: A fresh collector loads the same cache file
    let bucket = sample_bucket().into_arc();
    let (second, _) = wired(bucket.clone(), &config);
    second.collect_all().await.expect("second pass");

    // Then: Entries survived the round trip and nothing was re-listed
    let reloaded = WindowCache::load(&config.cache_path);
    assert_eq!(reloaded.len().await, 3);
    assert_eq!(
        reloaded.get("trades-BTCUSDT").await,
        Some(AvailabilityWindow::Empty)
    );
    assert_eq!(bucket.timestamp_requests(), 0);

    let raw = std::fs::read_to_string(&config.cache_path).expect("cache file");
    let json: serde_json::Value = serde_json::from_str(&raw).expect("json");
    assert_eq!(
        json["klines-BTCUSDT"],
        serde_json::json!(["2024-01-01", "2024-06-01"])
    );
    assert_eq!(json["trades-BTCUSDT"], serde_json::json!(["", ""]));
}

#[tokio::test]
async fn when_cache_file_is_corrupt_pass_starts_cold() {
    // Given: A cache file that is not JSON
    let dir = tempfile::tempdir().expect("tempdir");
    let config = config_in(dir.path());
    std::fs::write(&config.cache_path, "{not json").expect("write");

    // When: A pass runs
    let bucket = sample_bucket().into_arc();
    let (collector, _) = wired(bucket.clone(), &config);
    let rows = collector.collect_all().await.expect("pass succeeds");

    // Then: Every pair is resolved and the file is rewritten as valid JSON
    assert_eq!(rows.len(), 3);
    assert_eq!(bucket.timestamp_requests(), 3);
    assert!(WindowCache::read_entries(&config.cache_path)
        .expect("valid json")
        .is_some());
}

#[tokio::test]
async fn when_refresh_mode_is_used_cached_windows_are_replaced() {
    // Given: A cache holding an outdated window for klines/BTCUSDT
    let cache = WindowCache::in_memory();
    let stale = AvailabilityWindow::from_strings("2023-01-01", "2023-01-02").expect("window");
    cache
        .put(InstrumentPair::new("klines", "BTCUSDT").cache_key(), stale)
        .await;

    // When: A refresh pass runs
    let bucket = sample_bucket().into_arc();
    let rows = collector_with(bucket.clone(), cache.clone(), CacheMode::Refresh, 2)
        .collect_all()
        .await
        .expect("pass succeeds");

    // Then: Every pair was re-listed and the new window replaced the old one
    assert_eq!(bucket.timestamp_requests(), 3);
    assert_eq!(rows[0].from_date(), "2024-01-01");
    assert_eq!(
        cache.get("klines-BTCUSDT").await.map(|w| w.from_date_string()),
        Some("2024-01-01".to_owned())
    );
}

// =============================================================================
// Discovery: Concurrency
// =============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn when_fifty_instruments_resolve_in_random_order_cache_and_status_stay_consistent() {
    // Given: 50 instruments answering after random delays and a pool of 5
    let mut bucket = FakeBucket::new().with_random_delay_ms(5);
    for index in 0..50 {
        let instrument = format!("SYM{index:02}USDT");
        bucket = bucket.with_pair("klines", &instrument, &["2024-01-01", "2024-01-09"]);
    }
    let bucket = bucket.into_arc();
    let cache = WindowCache::in_memory();
    let collector = collector_with(bucket.clone(), cache.clone(), CacheMode::Use, 5);

    // When: The datatype is collected
    let rows = collector.collect_one("klines").await.expect("pass succeeds");

    // Then: Nothing was lost, status balanced, and the pool bound held
    assert_eq!(rows.len(), 50);
    assert_eq!(cache.len().await, 50);
    let status = collector.status();
    assert_eq!(status.progress, status.total);
    assert_eq!(status.total, 50);
    assert!(!status.running);
    assert!(bucket.max_in_flight() <= 5);
}

#[tokio::test]
async fn when_pass_is_already_running_second_pass_is_rejected() {
    // Given: A pass in progress
    let collector = collector(sample_bucket().into_arc());
    let pass = collector.begin().expect("first pass");

    // When: Another pass is requested
    let result = collector.collect_all().await;

    // Then: It is rejected without disturbing the running pass
    assert!(result.expect_err("conflict").is_conflict());
    assert!(collector.status().running);
    drop(pass);
    assert!(!collector.status().running);
}
