use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

pub type Result<T> = std::result::Result<T, PlayoutError>;

/// Engine error taxonomy.
///
/// Only two variants abort the run: `DriftExceeded` and `BrokenPipe`.
/// Everything else is recovered by substitution (filler/dummy clips) or by
/// treating the offending document as empty.
#[derive(thiserror::Error, Debug)]
pub enum PlayoutError {
    #[error("source missing: {0}")]
    SourceMissing(String),

    #[error("playlist invalid: {0}")]
    PlaylistInvalid(String),

    #[error("playlist runs {0:.1}s short of the configured day length")]
    PlaylistTooShort(f64),

    #[error("playlist overruns the configured day length by {0:.1}s")]
    PlaylistTooLong(f64),

    #[error("playback drifted {delta:.2}s from schedule (stop threshold {limit:.2}s)")]
    DriftExceeded { delta: f64, limit: f64 },

    #[error("encoder pipe closed: {0}")]
    BrokenPipe(String),

    // The field is deliberately not called `source`; thiserror would treat
    // that name as the error's source() and demand an Error impl.
    #[error("probe failed for {path}: {reason}")]
    ProbeFailure { path: String, reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl PlayoutError {
    /// True if the run must terminate after cleanup instead of degrading.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            PlayoutError::DriftExceeded { .. } | PlayoutError::BrokenPipe(_)
        )
    }
}

/// Suppresses repeated identical report messages inside a time window.
///
/// A dead NAS mount or a bad playlist entry can produce the same warning on
/// every cycle; operators need to see it once per window, not once per clip.
pub struct RateGate {
    window: Duration,
    seen: Mutex<HashMap<String, Instant>>,
}

impl RateGate {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            seen: Mutex::new(HashMap::new()),
        }
    }

    /// Returns true when the message keyed by `key` should be emitted now.
    pub fn allow(&self, key: &str) -> bool {
        let mut seen = self.seen.lock().unwrap_or_else(|e| e.into_inner());
        let now = Instant::now();
        match seen.get(key) {
            Some(last) if now.duration_since(*last) < self.window => false,
            _ => {
                seen.insert(key.to_string(), now);
                true
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fatal_variants() {
        assert!(PlayoutError::DriftExceeded {
            delta: 12.0,
            limit: 11.0
        }
        .is_fatal());
        assert!(PlayoutError::BrokenPipe("encoder stdin".into()).is_fatal());
        assert!(!PlayoutError::SourceMissing("/nope.mp4".into()).is_fatal());
        assert!(!PlayoutError::PlaylistInvalid("bad json".into()).is_fatal());
    }

    #[test]
    fn probe_failure_carries_path_and_reason() {
        let err = PlayoutError::ProbeFailure {
            path: "/media/clip.mp4".into(),
            reason: "no such file".into(),
        };
        assert_eq!(
            err.to_string(),
            "probe failed for /media/clip.mp4: no such file"
        );
        assert!(!err.is_fatal());
        // The path is plain data, not a wrapped cause.
        assert!(std::error::Error::source(&err).is_none());
    }

    #[test]
    fn rate_gate_suppresses_duplicates() {
        let gate = RateGate::new(Duration::from_secs(60));
        assert!(gate.allow("missing /a.mp4"));
        assert!(!gate.allow("missing /a.mp4"));
        assert!(gate.allow("missing /b.mp4"));
    }

    #[test]
    fn rate_gate_reopens_after_window() {
        let gate = RateGate::new(Duration::from_millis(0));
        assert!(gate.allow("msg"));
        assert!(gate.allow("msg"));
    }
}
