//! Sweep watermarks.
//!
//! `latest` is the newest remote timestamp known to be fully reconciled and
//! only ever moves forward. `earliest` bounds the history already swept
//! backwards and only ever moves back. Both are remote-time Unix seconds.

/// Process-wide sweep progress.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Watermarks {
    pub latest: Option<i64>,
    pub earliest: Option<i64>,
}

impl Watermarks {
    pub fn new(latest: Option<i64>, earliest: Option<i64>) -> Self {
        Self { latest, earliest }
    }

    /// Fold an accounted-for remote timestamp into the watermarks.
    ///
    /// `earliest` is only lowered when `allow_earliest` is set; an unset
    /// `earliest` is always initialised. Returns whether anything changed.
    pub fn observe(&mut self, timestamp: i64, allow_earliest: bool) -> bool {
        if timestamp <= 0 {
            return false;
        }

        let mut changed = false;
        if self.latest.map_or(true, |latest| timestamp > latest) {
            self.latest = Some(timestamp);
            changed = true;
        }

        match self.earliest {
            None => {
                self.earliest = Some(timestamp);
                changed = true;
            }
            Some(earliest) if allow_earliest && timestamp < earliest => {
                self.earliest = Some(timestamp);
                changed = true;
            }
            Some(_) => {}
        }
        changed
    }
}
