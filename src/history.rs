// Last-scrobbled record
// Duplicate suppression for players that restart the same song without a
// visible track change in between

use crate::track::Identity;
use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

/// A listen that was accepted for submission
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScrobbleRecord {
    pub identity: Identity,
    pub started_at: DateTime<Utc>,
    pub length: Duration,
}

impl ScrobbleRecord {
    /// Same track, and it started before `last` could have finished playing
    pub fn repeats(&self, last: &ScrobbleRecord) -> bool {
        let finished_at = last.started_at + chrono::Duration::seconds(last.length.as_secs() as i64);
        self.identity == last.identity && self.started_at <= finished_at
    }
}

/// Single-owner store for the most recent scrobble. Sessions never read and
/// write it separately; `claim` does both under one lock.
#[derive(Debug, Clone, Default)]
pub struct ScrobbleHistory {
    last: Arc<Mutex<Option<ScrobbleRecord>>>,
}

impl ScrobbleHistory {
    /// Record `candidate` as the latest scrobble unless it repeats the current
    /// one. Returns `false` for a duplicate, leaving the store untouched.
    pub fn claim(&self, candidate: ScrobbleRecord) -> bool {
        let mut last = self.last.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(previous) = last.as_ref() {
            if candidate.repeats(previous) {
                return false;
            }
        }
        *last = Some(candidate);
        true
    }

    #[cfg(test)]
    pub fn last(&self) -> Option<ScrobbleRecord> {
        self.last
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}
