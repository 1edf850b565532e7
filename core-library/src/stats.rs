//! Derived play statistics.
//!
//! Combines a [`PlayRecord`] with the host's own first-played, last-played and
//! added values into the figures shown next to a track, and renders them as
//! named display fields.

use bridge_traits::TrackMetadata;
use chrono::{Local, TimeZone};

use crate::models::PlayRecord;

/// A local play this long after the newest remote scrobble counts as a play
/// the remote service has not caught up with yet.
pub const UNSCROBBLED_PLAY_GRACE_SECS: i64 = 300;

const HUMAN_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// How a list of timestamps is rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimestampStyle {
    /// Quoted local date-time strings.
    Human,
    /// JavaScript milliseconds.
    Javascript,
    /// Unix seconds.
    Raw,
}

/// Format one timestamp as local date-time.
pub fn format_timestamp(timestamp: i64) -> String {
    Local
        .timestamp_opt(timestamp, 0)
        .single()
        .map(|dt| dt.format(HUMAN_FORMAT).to_string())
        .unwrap_or_else(|| timestamp.to_string())
}

/// Render timestamps as a JSON array.
pub fn format_timestamps(times: &[i64], style: TimestampStyle) -> String {
    let rendered: Vec<serde_json::Value> = times
        .iter()
        .map(|&t| match style {
            TimestampStyle::Human => serde_json::Value::from(format_timestamp(t)),
            TimestampStyle::Javascript => serde_json::Value::from(t.saturating_mul(1000)),
            TimestampStyle::Raw => serde_json::Value::from(t),
        })
        .collect();
    serde_json::Value::Array(rendered).to_string()
}

/// Figures derived from one record plus host statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlayStats {
    pub remote_play_count: usize,
    pub remote_first_played: Option<i64>,
    pub remote_last_played: Option<i64>,
    /// Earliest of local and remote plays, else the host's first played.
    pub first_played: Option<i64>,
    /// Latest of local and remote plays, else the host's last played.
    pub last_played: Option<i64>,
    /// Earlier of the host's added date and the first remote play.
    pub added: Option<i64>,
}

impl PlayStats {
    pub fn compute(record: &PlayRecord, host: &TrackMetadata, increment_with_local: bool) -> Self {
        let mut remote_play_count = record.remote_play_times.len();
        if increment_with_local {
            if let (Some(last_local), Some(last_remote)) = (record.last_local(), record.last_remote())
            {
                if last_local > last_remote + UNSCROBBLED_PLAY_GRACE_SECS {
                    remote_play_count += 1;
                }
            }
        }

        let first_played = [record.first_local(), record.first_remote()]
            .into_iter()
            .flatten()
            .min()
            .or(host.first_played);

        let last_played = [record.last_local(), record.last_remote()]
            .into_iter()
            .flatten()
            .max()
            .or(host.last_played);

        let added = match (host.added, record.first_remote()) {
            (Some(added), Some(first_remote)) => Some(added.min(first_remote)),
            (Some(added), None) => Some(added),
            (None, _) => None,
        };

        Self {
            remote_play_count,
            remote_first_played: record.first_remote(),
            remote_last_played: record.last_remote(),
            first_played,
            last_played,
            added,
        }
    }
}

/// Named per-track display fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DisplayField {
    PlayedTimes,
    PlayedTimesJs,
    PlayedTimesRaw,
    RemotePlayedTimes,
    RemotePlayedTimesJs,
    RemotePlayCount,
    RemoteAdded,
    RemoteFirstPlayed,
    RemoteLastPlayed,
    FirstPlayedEnhanced,
    LastPlayedEnhanced,
    AddedEnhanced,
}

impl DisplayField {
    pub const ALL: [DisplayField; 12] = [
        DisplayField::PlayedTimes,
        DisplayField::PlayedTimesJs,
        DisplayField::PlayedTimesRaw,
        DisplayField::RemotePlayedTimes,
        DisplayField::RemotePlayedTimesJs,
        DisplayField::RemotePlayCount,
        DisplayField::RemoteAdded,
        DisplayField::RemoteFirstPlayed,
        DisplayField::RemoteLastPlayed,
        DisplayField::FirstPlayedEnhanced,
        DisplayField::LastPlayedEnhanced,
        DisplayField::AddedEnhanced,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            DisplayField::PlayedTimes => "played_times",
            DisplayField::PlayedTimesJs => "played_times_js",
            DisplayField::PlayedTimesRaw => "played_times_raw",
            DisplayField::RemotePlayedTimes => "lastfm_played_times",
            DisplayField::RemotePlayedTimesJs => "lastfm_played_times_js",
            DisplayField::RemotePlayCount => "lastfm_play_count",
            DisplayField::RemoteAdded => "lastfm_added",
            DisplayField::RemoteFirstPlayed => "lastfm_first_played",
            DisplayField::RemoteLastPlayed => "lastfm_last_played",
            DisplayField::FirstPlayedEnhanced => "first_played_enhanced",
            DisplayField::LastPlayedEnhanced => "last_played_enhanced",
            DisplayField::AddedEnhanced => "added_enhanced",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|field| field.name() == name)
    }

    /// Render the field. `None` means the value is not available.
    pub fn render(
        &self,
        record: &PlayRecord,
        host: &TrackMetadata,
        increment_with_local: bool,
    ) -> Option<String> {
        let stats = || PlayStats::compute(record, host, increment_with_local);
        match self {
            DisplayField::PlayedTimes => Some(format_timestamps(
                &record.local_play_times,
                TimestampStyle::Human,
            )),
            DisplayField::PlayedTimesJs => Some(format_timestamps(
                &record.local_play_times,
                TimestampStyle::Javascript,
            )),
            DisplayField::PlayedTimesRaw => Some(format_timestamps(
                &record.local_play_times,
                TimestampStyle::Raw,
            )),
            DisplayField::RemotePlayedTimes => Some(format_timestamps(
                &record.remote_play_times,
                TimestampStyle::Human,
            )),
            DisplayField::RemotePlayedTimesJs => Some(format_timestamps(
                &record.remote_play_times,
                TimestampStyle::Javascript,
            )),
            DisplayField::RemotePlayCount => {
                let count = stats().remote_play_count;
                (count > 0).then(|| count.to_string())
            }
            DisplayField::RemoteAdded | DisplayField::RemoteFirstPlayed => {
                record.first_remote().map(format_timestamp)
            }
            DisplayField::RemoteLastPlayed => record.last_remote().map(format_timestamp),
            DisplayField::FirstPlayedEnhanced => stats().first_played.map(format_timestamp),
            DisplayField::LastPlayedEnhanced => stats().last_played.map(format_timestamp),
            DisplayField::AddedEnhanced => stats().added.map(format_timestamp),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(local: &[i64], remote: &[i64]) -> PlayRecord {
        PlayRecord {
            version: 1,
            local_play_times: local.to_vec(),
            remote_play_times: remote.to_vec(),
        }
    }

    #[test]
    fn test_remote_count_increments_for_unscrobbled_local_play() {
        let host = TrackMetadata::default();
        let r = record(&[10_000], &[5_000, 9_000]);
        assert_eq!(PlayStats::compute(&r, &host, true).remote_play_count, 3);
        assert_eq!(PlayStats::compute(&r, &host, false).remote_play_count, 2);

        let recent = record(&[9_200], &[5_000, 9_000]);
        assert_eq!(PlayStats::compute(&recent, &host, true).remote_play_count, 2);

        let no_remote = record(&[9_200], &[]);
        assert_eq!(PlayStats::compute(&no_remote, &host, true).remote_play_count, 0);
    }

    #[test]
    fn test_enhanced_first_and_last_played() {
        let host = TrackMetadata {
            first_played: Some(1),
            last_played: Some(2),
            ..Default::default()
        };
        let stats = PlayStats::compute(&record(&[500, 900], &[300, 700]), &host, true);
        assert_eq!(stats.first_played, Some(300));
        assert_eq!(stats.last_played, Some(900));

        let fallback = PlayStats::compute(&PlayRecord::empty(), &host, true);
        assert_eq!(fallback.first_played, Some(1));
        assert_eq!(fallback.last_played, Some(2));
    }

    #[test]
    fn test_enhanced_added() {
        let host = TrackMetadata {
            added: Some(1_000),
            ..Default::default()
        };
        assert_eq!(
            PlayStats::compute(&record(&[], &[400]), &host, true).added,
            Some(400)
        );
        assert_eq!(
            PlayStats::compute(&record(&[], &[4_000]), &host, true).added,
            Some(1_000)
        );
        assert_eq!(
            PlayStats::compute(&record(&[], &[400]), &TrackMetadata::default(), true).added,
            None
        );
    }

    #[test]
    fn test_format_timestamps() {
        assert_eq!(format_timestamps(&[], TimestampStyle::Raw), "[]");
        assert_eq!(format_timestamps(&[1, 2], TimestampStyle::Raw), "[1,2]");
        assert_eq!(
            format_timestamps(&[1, 2], TimestampStyle::Javascript),
            "[1000,2000]"
        );
        let human = format_timestamps(&[1_600_000_000], TimestampStyle::Human);
        assert!(human.starts_with("[\"20"));
        assert_eq!(human.len(), "[\"2020-09-13 12:26:40\"]".len());
    }

    #[test]
    fn test_display_field_names_round_trip() {
        for field in DisplayField::ALL {
            assert_eq!(DisplayField::from_name(field.name()), Some(field));
        }
        assert_eq!(DisplayField::from_name("play_count"), None);
    }

    #[test]
    fn test_render_missing_values() {
        let host = TrackMetadata::default();
        let empty = PlayRecord::empty();
        assert_eq!(
            DisplayField::PlayedTimes.render(&empty, &host, true),
            Some("[]".to_string())
        );
        assert_eq!(DisplayField::RemotePlayCount.render(&empty, &host, true), None);
        assert_eq!(DisplayField::RemoteLastPlayed.render(&empty, &host, true), None);
        assert_eq!(DisplayField::AddedEnhanced.render(&empty, &host, true), None);
    }
}
