use serde::Deserialize;

use crate::filters::FilterArguments;
use crate::probe::ProbeResult;

/// Raw playlist entry as stored in the JSON document.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct ProgramEntry {
    #[serde(rename = "in")]
    pub in_point: f64,
    pub out: f64,
    pub duration: f64,
    pub source: String,
    #[serde(default)]
    pub category: Option<String>,
}

/// One calendar day of programming, keyed by `(date, source)`. Immutable
/// once read; the scheduler re-reads only when the backing resource's
/// modification time changes.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct PlaylistDocument {
    #[serde(default)]
    pub channel: String,
    #[serde(default)]
    pub date: String,
    #[serde(default)]
    pub program: Vec<ProgramEntry>,
}

impl PlaylistDocument {
    /// Declared total play time of the document.
    pub fn total_length(&self) -> f64 {
        self.program.iter().map(|e| e.out - e.in_point).sum()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NodeKind {
    #[default]
    Regular,
    /// Configured filler asset covering a gap.
    Filler,
    /// Synthesized color+silence clip; used when no filler is configured.
    Dummy,
}

/// One scheduled instance of media to play.
///
/// Constructed by the scheduler from a playlist entry (or synthesized when
/// data is missing), mutated in place as drift correction resolves seek/out
/// values, consumed exactly once by the orchestrator, never persisted back.
#[derive(Debug, Clone, Default)]
pub struct ClipNode {
    /// Path, URL, or (for `Dummy` nodes) a lavfi generator descriptor.
    pub source: String,
    /// Seconds since local midnight at which this clip is scheduled to start.
    pub scheduled_begin: f64,
    pub sequence_number: usize,
    pub in_point: f64,
    pub out_point: f64,
    pub intrinsic_duration: f64,
    /// Absolute media position playback must start from. Initialized to
    /// `in_point`; drift correction pushes it forward, never below zero.
    pub seek_offset: f64,
    pub category: Option<String>,
    pub kind: NodeKind,
    pub probe_result: Option<ProbeResult>,
    pub decoder_arguments: Vec<String>,
    pub filter_arguments: Option<FilterArguments>,
}

impl ClipNode {
    pub fn from_entry(entry: &ProgramEntry, scheduled_begin: f64, sequence_number: usize) -> Self {
        Self {
            source: entry.source.clone(),
            scheduled_begin,
            sequence_number,
            in_point: entry.in_point,
            out_point: entry.out,
            intrinsic_duration: entry.duration,
            seek_offset: entry.in_point,
            category: entry.category.clone(),
            ..Default::default()
        }
    }

    /// How long this node will actually play. Must be > 0 before the node
    /// is yielded; nodes violating this are dropped with a warning.
    pub fn effective_length(&self) -> f64 {
        self.out_point - self.seek_offset
    }

    /// Nominal length as scheduled, ignoring any drift correction.
    pub fn scheduled_length(&self) -> f64 {
        self.out_point - self.in_point
    }

    pub fn is_advertisement(&self) -> bool {
        self.category.as_deref() == Some("advertisement")
    }

    /// Whether the node plays to its natural end (no out-trim).
    pub fn plays_to_end(&self) -> bool {
        (self.out_point - self.intrinsic_duration).abs() < f64::EPSILON
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(in_point: f64, out: f64, duration: f64) -> ProgramEntry {
        ProgramEntry {
            in_point,
            out,
            duration,
            source: "X".into(),
            category: None,
        }
    }

    #[test]
    fn document_parses_renamed_in_key() {
        let raw = r#"{
            "channel": "one",
            "date": "2026-08-30",
            "program": [
                {"in": 0, "out": 300, "duration": 300, "source": "/a.mp4"},
                {"in": 10, "out": 280, "duration": 300, "source": "/b.mp4",
                 "category": "advertisement"}
            ]
        }"#;
        let doc: PlaylistDocument = serde_json::from_str(raw).unwrap();
        assert_eq!(doc.program.len(), 2);
        assert_eq!(doc.program[0].in_point, 0.0);
        assert_eq!(doc.program[1].category.as_deref(), Some("advertisement"));
        assert_eq!(doc.total_length(), 570.0);
    }

    #[test]
    fn zero_drift_round_trip() {
        let node = ClipNode::from_entry(&entry(0.0, 300.0, 300.0), 21600.0, 0);
        assert_eq!(node.seek_offset, 0.0);
        assert_eq!(node.effective_length(), 300.0);
        assert!(node.plays_to_end());
    }

    #[test]
    fn seek_shrinks_effective_length() {
        let mut node = ClipNode::from_entry(&entry(0.0, 300.0, 300.0), 21600.0, 0);
        node.seek_offset = 20.0;
        assert_eq!(node.effective_length(), 280.0);
    }

    #[test]
    fn advertisement_category() {
        let mut node = ClipNode::from_entry(&entry(0.0, 30.0, 30.0), 0.0, 0);
        assert!(!node.is_advertisement());
        node.category = Some("advertisement".into());
        assert!(node.is_advertisement());
    }
}
