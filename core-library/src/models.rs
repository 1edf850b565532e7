//! Domain models for play history
//!
//! Timestamps are Unix seconds. Both sequences of a [`PlayRecord`] are kept
//! in ascending order.

use serde::{Deserialize, Serialize};

/// Version stamped on every record written by this crate.
pub const CURRENT_RECORD_VERSION: u32 = 1;

/// Version stamped on every artist side record.
pub const CURRENT_ARTIST_VERSION: u32 = 1;

// =============================================================================
// Play Record
// =============================================================================

/// Play history of one track identity key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayRecord {
    /// Selects the decode path. Always [`CURRENT_RECORD_VERSION`] once written.
    pub version: u32,
    /// Local playback times, ascending.
    pub local_play_times: Vec<i64>,
    /// Play times confirmed by the remote service, ascending.
    pub remote_play_times: Vec<i64>,
}

impl Default for PlayRecord {
    fn default() -> Self {
        Self::empty()
    }
}

impl PlayRecord {
    /// The canonical empty record.
    pub fn empty() -> Self {
        Self {
            version: CURRENT_RECORD_VERSION,
            local_play_times: Vec::new(),
            remote_play_times: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.local_play_times.is_empty() && self.remote_play_times.is_empty()
    }

    pub fn first_local(&self) -> Option<i64> {
        self.local_play_times.first().copied()
    }

    pub fn last_local(&self) -> Option<i64> {
        self.local_play_times.last().copied()
    }

    pub fn first_remote(&self) -> Option<i64> {
        self.remote_play_times.first().copied()
    }

    pub fn last_remote(&self) -> Option<i64> {
        self.remote_play_times.last().copied()
    }

    pub fn total_timestamps(&self) -> usize {
        self.local_play_times.len() + self.remote_play_times.len()
    }

    /// Record a local play, keeping the sequence ascending.
    pub fn push_local(&mut self, timestamp: i64) {
        match self.local_play_times.last() {
            Some(&last) if timestamp < last => {
                let pos = self.local_play_times.partition_point(|&t| t <= timestamp);
                self.local_play_times.insert(pos, timestamp);
            }
            _ => self.local_play_times.push(timestamp),
        }
    }

    /// Seed an empty local history from the host's own first/last played
    /// values. Does nothing if local plays are already recorded.
    pub fn bootstrap_local(&mut self, first_played: Option<i64>, last_played: Option<i64>) {
        if !self.local_play_times.is_empty() {
            return;
        }
        if let Some(first) = first_played.filter(|t| *t > 0) {
            self.local_play_times.push(first);
        }
        if let Some(last) = last_played.filter(|t| *t > 0) {
            if Some(last) != self.local_play_times.first().copied() {
                self.push_local(last);
            }
        }
    }

    /// Append ascending remote timestamps that are newer than the last one
    /// already stored. Returns how many were added.
    pub fn merge_remote(&mut self, ascending: &[i64]) -> usize {
        let mut added = 0;
        for &timestamp in ascending {
            if self.last_remote().map_or(true, |last| timestamp > last) {
                self.remote_play_times.push(timestamp);
                added += 1;
            }
        }
        added
    }

    /// Drop every remote timestamp. Returns true if anything was removed.
    pub fn clear_remote(&mut self) -> bool {
        let had_any = !self.remote_play_times.is_empty();
        self.remote_play_times.clear();
        had_any
    }

    /// Whether both sequences are ascending.
    pub fn is_well_formed(&self) -> bool {
        is_ascending(&self.local_play_times) && is_ascending(&self.remote_play_times)
    }
}

fn is_ascending(values: &[i64]) -> bool {
    values.windows(2).all(|pair| pair[0] <= pair[1])
}

// =============================================================================
// Artist Record
// =============================================================================

/// Per-artist side record. Last write wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtistRecord {
    pub version: u32,
    pub last_played: i64,
}

impl Default for ArtistRecord {
    fn default() -> Self {
        Self {
            version: CURRENT_ARTIST_VERSION,
            last_played: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_record() {
        let record = PlayRecord::empty();
        assert_eq!(record.version, CURRENT_RECORD_VERSION);
        assert!(record.is_empty());
        assert_eq!(record.last_local(), None);
        assert_eq!(record.last_remote(), None);
    }

    #[test]
    fn test_push_local_keeps_order() {
        let mut record = PlayRecord::empty();
        record.push_local(100);
        record.push_local(300);
        record.push_local(200);
        assert_eq!(record.local_play_times, vec![100, 200, 300]);
        assert!(record.is_well_formed());
    }

    #[test]
    fn test_bootstrap_local() {
        let mut record = PlayRecord::empty();
        record.bootstrap_local(Some(100), Some(500));
        assert_eq!(record.local_play_times, vec![100, 500]);

        let mut single = PlayRecord::empty();
        single.bootstrap_local(Some(100), Some(100));
        assert_eq!(single.local_play_times, vec![100]);

        let mut untouched = PlayRecord::empty();
        untouched.push_local(42);
        untouched.bootstrap_local(Some(1), Some(2));
        assert_eq!(untouched.local_play_times, vec![42]);

        let mut unknown = PlayRecord::empty();
        unknown.bootstrap_local(None, Some(0));
        assert!(unknown.local_play_times.is_empty());
    }

    #[test]
    fn test_merge_remote_skips_known() {
        let mut record = PlayRecord::empty();
        assert_eq!(record.merge_remote(&[10, 50]), 2);
        assert_eq!(record.merge_remote(&[40, 50, 90]), 1);
        assert_eq!(record.remote_play_times, vec![10, 50, 90]);
    }

    #[test]
    fn test_clear_remote() {
        let mut record = PlayRecord::empty();
        record.push_local(5);
        record.merge_remote(&[10]);
        assert!(record.clear_remote());
        assert!(!record.clear_remote());
        assert_eq!(record.local_play_times, vec![5]);
    }
}
