//! Key-space migration.
//!
//! Records can end up under a key that is no longer the one the identity
//! collaborator computes for their track: either because they were written
//! under the obsolete key scheme, or because the track's tags were edited.
//! [`plan_transfer`] decides, without side effects, whether such a record
//! should be moved. The move only happens when the destination does not
//! already hold more plays in either sequence than the source.

use std::collections::HashSet;

use bridge_traits::{
    CollectionId, FieldPatterns, KeyScheme, LibrarySearch, MetadataReader, TrackIdentity,
    TrackKey,
};
use tracing::{debug, info, instrument};

use crate::error::{LibraryError, Result};
use crate::models::PlayRecord;
use crate::repositories::RecordStore;

/// Why a record was left where it is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Old and new keys are the same.
    SameKey,
    /// The source has no plays to move.
    SourceEmpty,
    /// The destination already holds more local or remote plays.
    DestinationRicher,
}

/// Outcome of [`plan_transfer`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MigrationAction {
    Transfer {
        from: TrackKey,
        to: TrackKey,
        record: PlayRecord,
    },
    Skip(SkipReason),
}

/// Decide whether the record under `old_key` moves to `new_key`.
pub fn plan_transfer(
    old_key: TrackKey,
    new_key: TrackKey,
    old_record: &PlayRecord,
    new_record: Option<&PlayRecord>,
) -> MigrationAction {
    if old_key == new_key {
        return MigrationAction::Skip(SkipReason::SameKey);
    }

    if old_record.is_empty() {
        return MigrationAction::Skip(SkipReason::SourceEmpty);
    }

    if let Some(dest) = new_record {
        if dest.local_play_times.len() > old_record.local_play_times.len()
            || dest.remote_play_times.len() > old_record.remote_play_times.len()
        {
            return MigrationAction::Skip(SkipReason::DestinationRicher);
        }
    }

    MigrationAction::Transfer {
        from: old_key,
        to: new_key,
        record: old_record.clone(),
    }
}

/// Result of a migration pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MigrationReport {
    /// Library tracks whose legacy key had a stored record.
    pub examined: usize,
    /// Destination keys that received a record.
    pub transferred: Vec<TrackKey>,
    /// Records left in place.
    pub skipped: usize,
}

/// Apply `action` to `records`. Returns the destination key on transfer.
pub async fn apply_action(
    records: &RecordStore,
    action: MigrationAction,
) -> Result<Option<TrackKey>> {
    match action {
        MigrationAction::Transfer { from, to, record } => {
            debug!(from = %from, to = %to, "Transferring play record");
            records.set(to, record).await?;
            Ok(Some(to))
        }
        MigrationAction::Skip(reason) => {
            debug!(?reason, "Play record left in place");
            Ok(None)
        }
    }
}

/// Move every legacy-keyed record of the library to its current key.
///
/// Walks the whole library once, recomputing both keys per track.
/// Tracks whose metadata cannot be read or keyed are skipped.
#[instrument(skip_all)]
pub async fn migrate_legacy_records(
    records: &RecordStore,
    identity: &dyn TrackIdentity,
    reader: &dyn MetadataReader,
    library: &dyn LibrarySearch,
    patterns: &FieldPatterns,
) -> Result<MigrationReport> {
    let legacy = records.with_collection(CollectionId::LegacyPlayHistory);
    let legacy_keys: HashSet<TrackKey> = legacy.known_keys().await?.into_iter().collect();
    let mut report = MigrationReport::default();

    if legacy_keys.is_empty() {
        return Ok(report);
    }

    let tracks = library
        .all_tracks()
        .await
        .map_err(|e| LibraryError::Migration(format!("Cannot enumerate library: {}", e)))?;

    for track in tracks {
        let metadata = match reader.read(&track, patterns).await {
            Ok(metadata) => metadata,
            Err(e) => {
                debug!(location = %track.location, error = %e, "Skipping unreadable track");
                continue;
            }
        };

        let Some(old_key) = identity.compute_key(&metadata, &track, KeyScheme::Legacy) else {
            continue;
        };
        if !legacy_keys.contains(&old_key) {
            continue;
        }
        let Some(new_key) = identity.compute_key(&metadata, &track, KeyScheme::Current) else {
            continue;
        };

        report.examined += 1;
        let old_record = legacy.get(old_key).await;
        let new_record = records.get(new_key).await;
        let dest = (!new_record.is_empty()).then_some(&new_record);

        match apply_action(records, plan_transfer(old_key, new_key, &old_record, dest)).await? {
            Some(key) => report.transferred.push(key),
            None => report.skipped += 1,
        }
    }

    info!(
        examined = report.examined,
        transferred = report.transferred.len(),
        skipped = report.skipped,
        "Legacy play history migration finished"
    );
    Ok(report)
}
