//! Binary encoding of play records.
//!
//! ## Current layout (version 1)
//!
//! All integers little-endian.
//!
//! ```text
//! offset  size  field
//! 0       4     version      (u32, = 1)
//! 4       4     local count  (u32)
//! 8       4     remote count (u32)
//! 12      4     reserved     (u32, = 0)
//! 16      8*L   local play times  (i64 each)
//! ...     8*R   remote play times (i64 each)
//! ```
//!
//! ## Legacy layout
//!
//! A bare array of `i64` local play times with no header.
//!
//! The first header word selects the path: `1..=8` is a versioned header
//! (only version 1 is understood, the rest decode to the empty record),
//! anything else is read as the legacy array.

use bytes::{Buf, BufMut};
use tracing::debug;

use crate::error::{LibraryError, Result};
use crate::models::{ArtistRecord, PlayRecord, CURRENT_ARTIST_VERSION, CURRENT_RECORD_VERSION};

/// Width of one encoded element.
pub const ELEMENT_WIDTH: usize = 8;
const HEADER_LEN: usize = 16;
const HIGHEST_HEADER_VERSION: u32 = 8;
const ARTIST_BLOB_LEN: usize = 24;

/// Maximum number of timestamps (local + remote) in one encoded record.
pub const MAX_ENCODED_TIMESTAMPS: usize = 16_384;

/// Serialize `record` in the current layout.
///
/// The version word is always written as [`CURRENT_RECORD_VERSION`].
pub fn encode_record(record: &PlayRecord) -> Result<Vec<u8>> {
    let count = record.total_timestamps();
    if count > MAX_ENCODED_TIMESTAMPS {
        return Err(LibraryError::RecordTooLarge {
            count,
            max: MAX_ENCODED_TIMESTAMPS,
        });
    }

    let mut buf = Vec::with_capacity(HEADER_LEN + count * ELEMENT_WIDTH);
    buf.put_u32_le(CURRENT_RECORD_VERSION);
    buf.put_u32_le(record.local_play_times.len() as u32);
    buf.put_u32_le(record.remote_play_times.len() as u32);
    buf.put_u32_le(0);
    for &timestamp in record
        .local_play_times
        .iter()
        .chain(record.remote_play_times.iter())
    {
        buf.put_i64_le(timestamp);
    }
    Ok(buf)
}

/// Decode a stored blob. Never fails: anything structurally invalid decodes
/// to [`PlayRecord::empty`].
pub fn decode_record(bytes: &[u8]) -> PlayRecord {
    if bytes.is_empty() {
        return PlayRecord::empty();
    }

    if bytes.len() % ELEMENT_WIDTH != 0 {
        debug!(len = bytes.len(), "Record blob is not a whole number of elements");
        return PlayRecord::empty();
    }

    let mut header = bytes;
    let first_word = header.get_u32_le();

    match first_word {
        CURRENT_RECORD_VERSION => decode_versioned(bytes).unwrap_or_else(|| {
            debug!(len = bytes.len(), "Record header does not match its payload");
            PlayRecord::empty()
        }),
        2..=HIGHEST_HEADER_VERSION => {
            debug!(version = first_word, "Unknown record version");
            PlayRecord::empty()
        }
        _ => decode_legacy(bytes),
    }
}

fn decode_versioned(bytes: &[u8]) -> Option<PlayRecord> {
    if bytes.len() < HEADER_LEN {
        return None;
    }

    let mut cursor = bytes;
    let version = cursor.get_u32_le();
    let local_count = cursor.get_u32_le() as usize;
    let remote_count = cursor.get_u32_le() as usize;
    let _reserved = cursor.get_u32_le();

    let expected = local_count
        .checked_add(remote_count)?
        .checked_mul(ELEMENT_WIDTH)?
        .checked_add(HEADER_LEN)?;
    if expected != bytes.len() {
        return None;
    }

    let local_play_times: Vec<i64> = (0..local_count).map(|_| cursor.get_i64_le()).collect();
    let remote_play_times: Vec<i64> = (0..remote_count).map(|_| cursor.get_i64_le()).collect();

    let record = PlayRecord {
        version,
        local_play_times,
        remote_play_times,
    };
    record.is_well_formed().then_some(record)
}

fn decode_legacy(bytes: &[u8]) -> PlayRecord {
    let mut cursor = bytes;
    let mut local_play_times = Vec::with_capacity(bytes.len() / ELEMENT_WIDTH);
    while cursor.remaining() >= ELEMENT_WIDTH {
        let timestamp = cursor.get_i64_le();
        if timestamp > 0 {
            local_play_times.push(timestamp);
        }
    }
    local_play_times.sort_unstable();

    PlayRecord {
        version: CURRENT_RECORD_VERSION,
        local_play_times,
        remote_play_times: Vec::new(),
    }
}

/// Serialize an artist side record: version, reserved word, last played,
/// unused slot.
pub fn encode_artist(record: &ArtistRecord) -> Vec<u8> {
    let mut buf = Vec::with_capacity(ARTIST_BLOB_LEN);
    buf.put_u32_le(CURRENT_ARTIST_VERSION);
    buf.put_u32_le(0);
    buf.put_i64_le(record.last_played);
    buf.put_i64_le(0);
    buf
}

/// Decode an artist side record; invalid input yields the default record.
pub fn decode_artist(bytes: &[u8]) -> ArtistRecord {
    if bytes.len() != ARTIST_BLOB_LEN {
        return ArtistRecord::default();
    }
    let mut cursor = bytes;
    let version = cursor.get_u32_le();
    if version == 0 || version > CURRENT_ARTIST_VERSION {
        return ArtistRecord::default();
    }
    let _reserved = cursor.get_u32_le();
    ArtistRecord {
        version,
        last_played: cursor.get_i64_le(),
    }
}
