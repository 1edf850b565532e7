//! Playback hooks and shutdown behaviour of the reconciliation engine.

mod common;

use bridge_traits::KeyScheme;
use common::*;
use core_metadata::RecentDirection;
use core_runtime::EngineTuning;
use core_sync::SweepOutcome;

#[tokio::test]
async fn test_new_track_fetches_immediately_without_delay() {
    let mut config = remote_config();
    config.delay_first_fetch = false;
    let h = Harness::new(config);
    let meta = song("Band", "LP", "Song");
    let key = h.key(&meta, KeyScheme::Current);
    let track = h.library.add("/music/song.flac", meta);
    h.http
        .route("getTrackScrobbles", track_page(vec![scrobble("Song", "LP", T0 - 100)]));

    h.engine.on_playback_new_track(track);
    h.engine.wait_idle().await;

    assert_eq!(h.records.get(key).await.remote_play_times, vec![T0 - 100]);
    h.dispatcher.run_pending().await;
    assert_eq!(h.blobs.refreshes(), vec![vec![key]]);
}

#[tokio::test]
async fn test_delayed_first_fetch_fires_once_after_two_seconds() {
    let h = Harness::new(remote_config());
    let track = h.library.add("/music/song.flac", song("Band", "LP", "Song"));

    h.engine.on_playback_new_track(track);
    h.engine.wait_idle().await;
    assert_eq!(h.http.count("getTrackScrobbles"), 0);

    h.engine.on_playback_time(1.0);
    h.engine.wait_idle().await;
    assert_eq!(h.http.count("getTrackScrobbles"), 0);

    h.engine.on_playback_time(2.5);
    h.engine.wait_idle().await;
    assert_eq!(h.http.count("getTrackScrobbles"), 1);

    h.engine.on_playback_time(10.0);
    h.engine.wait_idle().await;
    assert_eq!(h.http.count("getTrackScrobbles"), 1);
}

#[tokio::test]
async fn test_playback_does_not_fetch_when_disabled() {
    let mut config = remote_config();
    config.enable_remote_lookup = false;
    config.delay_first_fetch = false;
    config.auto_backfill = true;
    let h = Harness::new(config);
    let track = h.library.add("/music/song.flac", song("Band", "LP", "Song"));

    for _ in 0..12 {
        h.engine.on_playback_new_track(track.clone());
    }
    h.engine.on_playback_time(5.0);
    h.engine.wait_idle().await;
    assert!(h.http.urls().is_empty());
}

#[tokio::test]
async fn test_periodic_sweeps_follow_track_counters() {
    let mut config = remote_config();
    config.auto_backfill = true;
    let tuning = EngineTuning {
        forward_sweep_every: 2,
        backward_sweep_every: 3,
        ..fast_tuning()
    };
    let h = Harness::with_tuning(config, tuning);
    let track = h.library.add("/music/song.flac", song("Band", "LP", "Song"));

    h.engine.on_playback_new_track(track.clone());
    h.engine.wait_idle().await;
    assert_eq!(h.http.count("getRecentTracks"), 0);

    // Second track: forward sweep.
    h.engine.on_playback_new_track(track.clone());
    h.engine.wait_idle().await;
    assert_eq!(h.http.count("getRecentTracks"), 1);

    // Third track: backward sweep, the forward counter is at one.
    h.engine.on_playback_new_track(track);
    h.engine.wait_idle().await;
    assert_eq!(h.http.count("getRecentTracks"), 2);
}

#[tokio::test]
async fn test_shutdown_flushes_and_stops_work() {
    let h = Harness::new(remote_config());
    let meta = song("Band", "LP", "Song");
    let key = h.key(&meta, KeyScheme::Current);

    h.engine.pull_for_track(key, &meta).await.unwrap();
    let requests = h.http.urls().len();

    h.engine.shutdown().await;
    assert!(h.engine.is_quitting());
    h.dispatcher.run_pending().await;
    assert_eq!(h.blobs.refreshes(), vec![vec![key]]);

    assert_eq!(h.engine.pull_for_track(key, &meta).await.unwrap(), 0);
    assert_eq!(
        h.engine
            .pull_recent_backfill(RecentDirection::Forward)
            .await
            .unwrap(),
        SweepOutcome::Cancelled
    );
    h.engine
        .on_playback_new_track(h.library.add("/music/other.flac", song("Band", "LP", "Other")));
    assert_eq!(h.http.urls().len(), requests);
}
