//! Content-derived track keys.

use bridge_traits::{KeyScheme, TrackIdentity, TrackKey, TrackMetadata, TrackRef};
use sha2::{Digest, Sha256};

/// [`TrackIdentity`] that hashes formatted tag values.
///
/// Two files with the same tags share a key regardless of their location.
/// The [`KeyScheme::Legacy`] text keeps the original casing and no release
/// year, so keys written under it are only reachable through migration.
#[derive(Debug, Clone, Copy, Default)]
pub struct HashingTrackIdentity;

impl HashingTrackIdentity {
    pub fn new() -> Self {
        Self
    }

    fn key_text(metadata: &TrackMetadata, scheme: KeyScheme) -> String {
        let disc = metadata.disc_number.unwrap_or(1);
        let track = metadata
            .track_number
            .map(|n| n.to_string())
            .unwrap_or_default();

        match scheme {
            KeyScheme::Current => format!(
                "{} - {} - {} {}-{} {}",
                metadata.artist,
                release_year(metadata.date.as_deref()),
                metadata.album,
                disc,
                track,
                metadata.title
            )
            .to_lowercase(),
            KeyScheme::Legacy => format!(
                "{} {} {} {} {}",
                metadata.artist, metadata.album, disc, track, metadata.title
            ),
            KeyScheme::Artist => metadata.artist.to_lowercase(),
        }
    }
}

impl TrackIdentity for HashingTrackIdentity {
    fn compute_key(
        &self,
        metadata: &TrackMetadata,
        _track: &TrackRef,
        scheme: KeyScheme,
    ) -> Option<TrackKey> {
        let required = match scheme {
            KeyScheme::Artist => &metadata.artist,
            KeyScheme::Current | KeyScheme::Legacy => &metadata.title,
        };
        if required.trim().is_empty() {
            return None;
        }

        Some(fold_digest(Self::key_text(metadata, scheme).as_bytes()))
    }
}

/// First run of four digits in a date tag ("2003-05-01" -> "2003").
fn release_year(date: Option<&str>) -> &str {
    let Some(date) = date else {
        return "";
    };
    let bytes = date.as_bytes();
    bytes
        .windows(4)
        .position(|w| w.iter().all(u8::is_ascii_digit))
        .map(|start| &date[start..start + 4])
        .unwrap_or("")
}

fn fold_digest(text: &[u8]) -> TrackKey {
    let digest = Sha256::digest(text);
    let folded = digest
        .chunks_exact(8)
        .fold(0u64, |acc, chunk| {
            let mut word = [0u8; 8];
            word.copy_from_slice(chunk);
            acc ^ u64::from_le_bytes(word)
        });
    TrackKey(folded)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(artist: &str, album: &str, title: &str) -> TrackMetadata {
        TrackMetadata {
            artist: artist.to_string(),
            album: album.to_string(),
            title: title.to_string(),
            track_number: Some(3),
            date: Some("2003-05-01".to_string()),
            ..Default::default()
        }
    }

    fn key(metadata: &TrackMetadata, scheme: KeyScheme) -> Option<TrackKey> {
        HashingTrackIdentity::new().compute_key(metadata, &TrackRef::new("/a.flac", 0), scheme)
    }

    #[test]
    fn test_key_text_layout() {
        let m = meta("Band", "LP", "Song");
        assert_eq!(
            HashingTrackIdentity::key_text(&m, KeyScheme::Current),
            "band - 2003 - lp 1-3 song"
        );
        assert_eq!(
            HashingTrackIdentity::key_text(&m, KeyScheme::Legacy),
            "Band LP 1 3 Song"
        );
        assert_eq!(HashingTrackIdentity::key_text(&m, KeyScheme::Artist), "band");
    }

    #[test]
    fn test_current_key_ignores_case_and_location() {
        let a = key(&meta("Band", "LP", "Song"), KeyScheme::Current);
        let b = HashingTrackIdentity::new().compute_key(
            &meta("BAND", "lp", "song"),
            &TrackRef::new("/elsewhere.mp3", 2),
            KeyScheme::Current,
        );
        assert!(a.is_some());
        assert_eq!(a, b);
        assert_ne!(
            key(&meta("Band", "LP", "Song"), KeyScheme::Legacy),
            key(&meta("BAND", "lp", "song"), KeyScheme::Legacy)
        );
    }

    #[test]
    fn test_schemes_produce_distinct_keys() {
        let m = meta("Band", "LP", "Song");
        let current = key(&m, KeyScheme::Current);
        assert_ne!(current, key(&m, KeyScheme::Legacy));
        assert_ne!(current, key(&m, KeyScheme::Artist));
    }

    #[test]
    fn test_missing_fields_yield_no_key() {
        assert_eq!(key(&meta("Band", "LP", ""), KeyScheme::Current), None);
        assert_eq!(key(&meta("", "LP", "Song"), KeyScheme::Artist), None);
        assert!(key(&meta("", "", "Song"), KeyScheme::Current).is_some());
    }

    #[test]
    fn test_release_year() {
        assert_eq!(release_year(Some("2003-05-01")), "2003");
        assert_eq!(release_year(Some("May 1999")), "1999");
        assert_eq!(release_year(Some("n/a")), "");
        assert_eq!(release_year(None), "");
    }
}
