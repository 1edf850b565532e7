//! Fuzzy field equality and scrobble deduplication.
//!
//! Remote services normalise tags differently from the local library:
//! apostrophes disappear, dashes change, whitespace collapses. Fields are
//! therefore compared after stripping punctuation and folding case.
//! `&`, `(` and `)` are kept because they carry meaning
//! ("Abbey Road (Remastered)" is a different release from "Abbey Road").

/// Replacement written for an embedded double quote in library search
/// queries.
pub const QUOTE_ESCAPE: &str = "$char(34)";

fn is_stripped_punctuation(c: char) -> bool {
    match c {
        '&' | '(' | ')' => false,
        c if c.is_ascii_punctuation() => true,
        // Typographic quotes, dashes and ellipsis.
        '\u{2018}' | '\u{2019}' | '\u{201A}' | '\u{201B}' | '\u{201C}' | '\u{201D}'
        | '\u{2010}' | '\u{2011}' | '\u{2012}' | '\u{2013}' | '\u{2014}' | '\u{2026}'
        | '\u{00B4}' => true,
        _ => false,
    }
}

/// Strip punctuation, collapse whitespace runs and lowercase.
pub fn normalize_field(value: &str) -> String {
    let stripped: String = value
        .chars()
        .filter(|c| !is_stripped_punctuation(*c))
        .collect();
    stripped
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Case- and punctuation-insensitive equality.
///
/// If normalising leaves either side empty (a title made only of
/// punctuation) the raw strings are compared case-insensitively instead.
pub fn fields_equal(a: &str, b: &str) -> bool {
    let na = normalize_field(a);
    let nb = normalize_field(b);
    if na.is_empty() || nb.is_empty() {
        return a.to_lowercase() == b.to_lowercase();
    }
    na == nb
}

/// Collapse near-duplicate scrobbles.
///
/// `newest_first` must be sorted newest to oldest. A timestamp is kept only
/// if it lies more than `min_separation_secs` before the last kept one.
/// Returns the kept timestamps oldest first.
pub fn dedup_filter(newest_first: &[i64], min_separation_secs: i64) -> Vec<i64> {
    let mut kept: Vec<i64> = Vec::with_capacity(newest_first.len());
    for &ts in newest_first {
        match kept.last() {
            Some(&last) if ts >= last.saturating_sub(min_separation_secs) => {}
            _ => kept.push(ts),
        }
    }
    kept.reverse();
    kept
}

/// Replace embedded double quotes with [`QUOTE_ESCAPE`].
///
/// Backslash-escaped quotes are replaced as a unit. The flag reports whether
/// anything was replaced.
pub fn escape_quotes(value: &str) -> (String, bool) {
    if !value.contains('"') {
        return (value.to_string(), false);
    }
    let escaped = value.replace("\\\"", QUOTE_ESCAPE).replace('"', QUOTE_ESCAPE);
    (escaped, true)
}

/// Which fields must agree for a remote entry to count as a play of a track.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatchPolicy {
    pub compare_album: bool,
    /// Minimum separation for [`dedup_filter`], `None` keeps every scrobble.
    pub dedup_window_secs: Option<i64>,
}

impl Default for MatchPolicy {
    fn default() -> Self {
        Self {
            compare_album: true,
            dedup_window_secs: Some(29),
        }
    }
}

impl MatchPolicy {
    /// Title always has to match, album only when enabled.
    ///
    /// The artist is part of the remote query itself and is not compared.
    pub fn matches(&self, local_title: &str, local_album: &str, remote_title: &str, remote_album: &str) -> bool {
        fields_equal(local_title, remote_title)
            && (!self.compare_album || fields_equal(local_album, remote_album))
    }

    /// Apply the dedup window, if any, to newest-first timestamps.
    pub fn dedup(&self, newest_first: &[i64]) -> Vec<i64> {
        match self.dedup_window_secs {
            Some(window) => dedup_filter(newest_first, window),
            None => {
                let mut ascending = newest_first.to_vec();
                ascending.reverse();
                ascending
            }
        }
    }
}
