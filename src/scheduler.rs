use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use chrono::{Local, NaiveDate, Timelike};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::DAY_IN_SECONDS;
use crate::error::{PlayoutError, Result};
use crate::node::{ClipNode, PlaylistDocument};
use crate::probe::is_remote_source;
use crate::source::{self, PlayoutContext};

/// Nodes with less play time than this are dropped instead of yielded.
pub const MINIMAL_LENGTH: f64 = 1.0;
/// Slack before the validation worker reports a short or long document.
const VALIDATE_TOLERANCE: f64 = 10.0;
/// Deltas within this distance of a full day are treated as day rollover
/// even when the drift stop check is disabled.
const ROLLOVER_GRACE: f64 = 6.0;
/// Upper bound on one remote playlist fetch.
const FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// Wall-clock seconds since local midnight, with sub-second precision.
pub fn time_in_seconds() -> f64 {
    let now = Local::now().time();
    f64::from(now.num_seconds_from_midnight()) + f64::from(now.nanosecond()) / 1e9
}

/// The date whose playlist covers `now`: today, unless the day start has
/// not been reached yet, in which case yesterday's list is still running.
pub fn playlist_date(start: f64, now: f64, today: NaiveDate) -> NaiveDate {
    if start > now {
        today.pred_opt().unwrap_or(today)
    } else {
        today
    }
}

/// Drift and remaining-day arithmetic for one scheduled begin time.
///
/// Returns `(drift, total_remaining)`. `drift` is the signed difference
/// between where the schedule says playback should be and where the wall
/// clock says it is (negative means behind). `total_remaining` is how much
/// of the scheduling day is left at the adjusted wall clock.
///
/// A clip that begins before the day start but is evaluated after midnight
/// is shifted by one day; near-exact 24h differences are folded back so
/// drift does not accumulate a full day at the boundary.
pub fn time_delta(
    begin: f64,
    start: f64,
    length: Option<f64>,
    mut current: f64,
    tolerance: f64,
) -> (f64, f64) {
    let target = length.unwrap_or(DAY_IN_SECONDS);

    if begin == start && start == 0.0 && DAY_IN_SECONDS - current < 4.0 {
        current -= DAY_IN_SECONDS;
    } else if start >= current && begin != start {
        current += DAY_IN_SECONDS;
    }

    let mut drift = begin - current;
    if (drift - DAY_IN_SECONDS).abs() < tolerance.max(ROLLOVER_GRACE) {
        drift -= DAY_IN_SECONDS;
    }

    let total_remaining = if current < start {
        start - current
    } else {
        start + target - current
    };

    (drift, total_remaining)
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum DocumentStamp {
    File(SystemTime),
    Http(String),
}

enum DocumentLocation {
    File(PathBuf),
    Http(String),
}

/// Time-synchronized cursor over one day's playlist documents.
///
/// First call after startup locates the clip covering "now" and seeks into
/// it; steady state consumes entries in order, writing the measured drift
/// into the shared sync state before every node. Gaps (short, empty, or
/// unreadable documents) are covered with filler or dummy placeholders so
/// the output never stalls, and days roll over by advancing the target
/// date and reloading.
pub struct Scheduler {
    ctx: Arc<PlayoutContext>,
    http: reqwest::Client,
    document: PlaylistDocument,
    stamp: Option<DocumentStamp>,
    current_date: NaiveDate,
    index: usize,
    /// Absolute schedule position (seconds since midnight) of the next node.
    begin: f64,
    sequence: usize,
    /// Still seeking the live position; the drift stop check does not apply
    /// to the locating step itself.
    init: bool,
    previous: Option<ClipNode>,
    validation: Option<JoinHandle<Vec<String>>>,
}

impl Scheduler {
    pub fn new(ctx: Arc<PlayoutContext>) -> Self {
        let now = time_in_seconds();
        let start = ctx.settings.playlist.start_sec;
        let current_date = playlist_date(start, now, Local::now().date_naive());
        Self {
            ctx,
            // Bounded so one stalled fetch cannot hold up scheduling.
            http: reqwest::Client::builder()
                .timeout(FETCH_TIMEOUT)
                .build()
                .unwrap_or_default(),
            document: PlaylistDocument::default(),
            stamp: None,
            current_date,
            index: 0,
            begin: start,
            sequence: 0,
            init: true,
            previous: None,
            validation: None,
        }
    }

    /// Emit the next ready-to-play node, or a fatal error when playback has
    /// drifted past the stop threshold.
    pub async fn next_node(&mut self) -> Result<ClipNode> {
        let node = self.plan_node(time_in_seconds()).await?;
        Ok(self.finish(node))
    }

    /// Re-arm the "seek to current wall-clock position" step, used after a
    /// live ingest session ends with the schedule position unknown.
    pub fn rearm_live_seek(&mut self) {
        self.init = true;
    }

    /// Scheduling decisions only; probing and filter-graph attachment happen
    /// in [`Scheduler::finish`].
    async fn plan_node(&mut self, now: f64) -> Result<ClipNode> {
        loop {
            self.refresh_document().await;

            if self.init {
                self.init = false;
                if let Some(node) = self.locate_live_position(now) {
                    return Ok(node);
                }
            }

            while self.index < self.document.program.len() {
                let entry = self.document.program[self.index].clone();
                self.index += 1;
                let mut node = ClipNode::from_entry(&entry, self.begin, self.next_seq());

                let limit = self.stop_limit();
                let playlist = &self.ctx.settings.playlist;
                let (drift, total_remaining) = time_delta(
                    node.scheduled_begin,
                    playlist.start_sec,
                    playlist.length_sec,
                    now,
                    limit,
                );
                self.ctx.sync.set_time_delta(drift);
                debug!(drift, total_remaining, source = %node.source, "schedule check");

                if limit > 0.0 && drift.abs() > limit {
                    error!(drift, limit, "drift exceeds stop threshold");
                    return Err(PlayoutError::DriftExceeded { delta: drift, limit });
                }

                if total_remaining <= 0.0 {
                    debug!(source = %node.source, "window already passed, skipping");
                    self.begin += node.scheduled_length();
                    continue;
                }

                if drift < -MINIMAL_LENGTH {
                    node.seek_offset = (node.in_point - drift).min(node.out_point);
                }
                if total_remaining < node.effective_length() {
                    node.out_point = node.seek_offset + total_remaining;
                }
                if node.effective_length() < MINIMAL_LENGTH {
                    warn!(source = %node.source, "dropping sub-second remainder");
                    self.begin += node.scheduled_length();
                    continue;
                }

                self.begin += node.scheduled_length();
                return Ok(node);
            }

            if let Some(node) = self.handle_list_end(now) {
                return Ok(node);
            }
        }
    }

    /// Walk the document until the clip whose window covers `now`, seeking
    /// into it. `None` when the list is empty or already over.
    fn locate_live_position(&mut self, now: f64) -> Option<ClipNode> {
        let start = self.ctx.settings.playlist.start_sec;
        let now_adjusted = if now < start { now + DAY_IN_SECONDS } else { now };
        let mut begin = start;

        for i in 0..self.document.program.len() {
            let entry = self.document.program[i].clone();
            let window = entry.out - entry.in_point;
            if begin + window > now_adjusted {
                self.index = i + 1;
                let seq = self.next_seq();
                let mut node = ClipNode::from_entry(&entry, begin, seq);
                node.seek_offset = node.in_point + (now_adjusted - begin).max(0.0);
                self.begin = begin + window;
                if node.effective_length() < MINIMAL_LENGTH {
                    begin += window;
                    continue;
                }
                self.ctx.sync.set_time_delta(0.0);
                info!(
                    source = %node.source,
                    seek = node.seek_offset,
                    "joining schedule in progress"
                );
                return Some(node);
            }
            begin += window;
        }

        self.index = self.document.program.len();
        self.begin = begin;
        None
    }

    /// End of the in-memory list: loop, fill the rest of the day with a
    /// placeholder, or roll over to the next date. `None` means state was
    /// adjusted and planning should run another cycle.
    fn handle_list_end(&mut self, now: f64) -> Option<ClipNode> {
        let playlist = &self.ctx.settings.playlist;
        let start = playlist.start_sec;
        let target = playlist.length_sec.unwrap_or(DAY_IN_SECONDS);
        if playlist.loop_list && !self.document.program.is_empty() {
            debug!("end of list, looping");
            self.index = 0;
            self.begin = now;
            return None;
        }

        let remaining = self.total_remaining(now);
        if remaining > MINIMAL_LENGTH {
            let seq = self.next_seq();
            let node = source::placeholder_node(&self.ctx, self.begin, seq, remaining);
            self.begin += node.scheduled_length();
            return Some(node);
        }

        let next = self.current_date.succ_opt().unwrap_or(self.current_date);
        info!(date = %next, "day complete, advancing playlist date");
        self.current_date = next;
        self.begin = start;
        self.index = 0;
        self.stamp = None;
        self.document = PlaylistDocument::default();

        // Fold the finished day's tail into the fresh one and yield a
        // placeholder immediately. Rolling the date and retrying against
        // the same clock sample would spin here whenever the next day's
        // document is not in place yet.
        let seq = self.next_seq();
        let node = source::placeholder_node(&self.ctx, self.begin, seq, remaining.max(0.0) + target);
        self.begin += node.scheduled_length();
        Some(node)
    }

    fn total_remaining(&self, now: f64) -> f64 {
        let playlist = &self.ctx.settings.playlist;
        let start = playlist.start_sec;
        let target = playlist.length_sec.unwrap_or(DAY_IN_SECONDS);
        let now_adjusted = if now < start { now + DAY_IN_SECONDS } else { now };
        start + target - now_adjusted
    }

    /// Probe, substitute on failure, and attach filter/decoder arguments.
    fn finish(&mut self, mut node: ClipNode) -> ClipNode {
        let next = self
            .document
            .program
            .get(self.index)
            .map(|entry| ClipNode::from_entry(entry, 0.0, 0));
        source::prepare_node(&self.ctx, &mut node, self.previous.as_ref(), next.as_ref());
        info!(
            source = %node.source,
            begin = %crate::config::sec_to_time(node.scheduled_begin),
            length = node.effective_length(),
            "play"
        );
        self.previous = Some(node.clone());
        node
    }

    fn next_seq(&mut self) -> usize {
        let seq = self.sequence;
        self.sequence += 1;
        seq
    }

    fn stop_limit(&self) -> f64 {
        self.ctx.settings.general.stop_threshold.unwrap_or(0.0)
    }

    fn document_location(&self) -> DocumentLocation {
        if let Some(path) = &self.ctx.settings.playlist.override_file {
            return DocumentLocation::File(path.clone());
        }
        let root = &self.ctx.settings.playlist.path;
        let leaf = self.current_date.format("%Y/%m/%Y-%m-%d.json");
        if root.starts_with("http://") || root.starts_with("https://") {
            DocumentLocation::Http(format!("{}/{leaf}", root.trim_end_matches('/')))
        } else {
            DocumentLocation::File(Path::new(root).join(leaf.to_string()))
        }
    }

    /// Reload the document when its backing resource changed. Unreadable or
    /// malformed content clears the cached list rather than reusing stale
    /// data, and is reported once per change.
    async fn refresh_document(&mut self) {
        self.poll_validation().await;
        match self.document_location() {
            DocumentLocation::File(path) => self.refresh_from_file(&path).await,
            DocumentLocation::Http(url) => self.refresh_from_http(&url).await,
        }
    }

    async fn refresh_from_file(&mut self, path: &Path) {
        let modified = match tokio::fs::metadata(path).await.and_then(|m| m.modified()) {
            Ok(modified) => modified,
            Err(_) => {
                if self.ctx.gate.allow(&format!("no playlist {}", path.display())) {
                    warn!(path = %path.display(), "playlist document not found");
                }
                self.clear_document();
                return;
            }
        };
        if self.stamp == Some(DocumentStamp::File(modified)) {
            return;
        }
        self.stamp = Some(DocumentStamp::File(modified));
        match tokio::fs::read_to_string(path).await {
            Ok(raw) => self.install_document(&raw, &path.display().to_string()),
            Err(e) => {
                warn!(path = %path.display(), "unreadable playlist: {e}");
                self.clear_document();
            }
        }
    }

    async fn refresh_from_http(&mut self, url: &str) {
        let mut request = self.http.get(url);
        if let Some(DocumentStamp::Http(modified)) = &self.stamp {
            request = request.header(reqwest::header::IF_MODIFIED_SINCE, modified);
        }
        let response = match request.send().await {
            Ok(response) => response,
            Err(e) => {
                if self.ctx.gate.allow(&format!("fetch {url}")) {
                    warn!(url, "playlist fetch failed: {e}");
                }
                self.clear_document();
                return;
            }
        };
        if response.status() == reqwest::StatusCode::NOT_MODIFIED {
            return;
        }
        if !response.status().is_success() {
            if self.ctx.gate.allow(&format!("status {url}")) {
                warn!(url, status = %response.status(), "playlist fetch rejected");
            }
            self.clear_document();
            return;
        }
        let modified = response
            .headers()
            .get(reqwest::header::LAST_MODIFIED)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        self.stamp = Some(DocumentStamp::Http(modified));
        match response.text().await {
            Ok(raw) => self.install_document(&raw, url),
            Err(e) => {
                warn!(url, "playlist body unreadable: {e}");
                self.clear_document();
            }
        }
    }

    fn install_document(&mut self, raw: &str, origin: &str) {
        match serde_json::from_str::<PlaylistDocument>(raw) {
            Ok(document) => {
                info!(
                    origin,
                    entries = document.program.len(),
                    length = %crate::config::sec_to_time(document.total_length()),
                    "playlist loaded"
                );
                self.spawn_validation(document.clone());
                self.document = document;
                self.index = self.index.min(self.document.program.len());
            }
            Err(e) => {
                warn!("{}", PlayoutError::PlaylistInvalid(format!("{origin}: {e}")));
                self.clear_document();
            }
        }
    }

    fn clear_document(&mut self) {
        self.document = PlaylistDocument::default();
        self.index = 0;
    }

    /// Best-effort background check of a freshly loaded document; findings
    /// are picked up on the next refresh and reported, never blocking.
    fn spawn_validation(&mut self, document: PlaylistDocument) {
        let target = self.ctx.settings.playlist.length_sec;
        if let Some(old) = self.validation.replace(tokio::task::spawn_blocking(move || {
            validate_document(&document, target)
        })) {
            old.abort();
        }
    }

    async fn poll_validation(&mut self) {
        if self
            .validation
            .as_ref()
            .map(|handle| handle.is_finished())
            .unwrap_or(false)
        {
            if let Some(handle) = self.validation.take() {
                for issue in handle.await.unwrap_or_default() {
                    warn!("playlist validation: {issue}");
                }
            }
        }
    }
}

fn validate_document(document: &PlaylistDocument, target: Option<f64>) -> Vec<String> {
    let mut issues = Vec::new();
    for (i, entry) in document.program.iter().enumerate() {
        if entry.out <= entry.in_point {
            issues.push(format!(
                "entry {i}: out ({}) not after in ({})",
                entry.out, entry.in_point
            ));
        }
        if entry.duration <= 0.0 {
            issues.push(format!("entry {i}: non-positive duration"));
        }
        if !is_remote_source(&entry.source) && !Path::new(&entry.source).is_file() {
            issues.push(PlayoutError::SourceMissing(entry.source.clone()).to_string());
        }
    }
    if let Some(target) = target {
        let total = document.total_length();
        if total < target - VALIDATE_TOLERANCE {
            issues.push(PlayoutError::PlaylistTooShort(target - total).to_string());
        } else if total > target + VALIDATE_TOLERANCE {
            issues.push(PlayoutError::PlaylistTooLong(total - target).to_string());
        }
    }
    issues
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;
    use crate::error::RateGate;
    use crate::filters::FilterRegistry;
    use crate::node::NodeKind;
    use crate::sync::SyncState;
    use std::time::Duration;

    fn context(mut settings: Settings) -> Arc<PlayoutContext> {
        settings.finalize().unwrap();
        Arc::new(PlayoutContext {
            settings: Arc::new(settings),
            registry: FilterRegistry::default(),
            sync: Arc::new(SyncState::new(false)),
            gate: RateGate::new(Duration::from_secs(30)),
        })
    }

    fn scheduler_with_doc(settings: Settings, raw: &str) -> (Scheduler, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let mut settings = settings;
        let file = dir.path().join("list.json");
        std::fs::write(&file, raw).unwrap();
        settings.playlist.override_file = Some(file);
        let ctx = context(settings);
        (Scheduler::new(ctx), dir)
    }

    fn day_settings(day_start: &str, length: &str) -> Settings {
        let mut settings = Settings::default();
        settings.playlist.day_start = day_start.into();
        settings.playlist.length = length.into();
        settings
    }

    #[test]
    fn delta_on_schedule() {
        let (drift, total) = time_delta(21600.0, 21565.0, Some(86400.0), 21600.0, 11.0);
        assert_eq!(drift, 0.0);
        assert_eq!(total, 21565.0 + 86400.0 - 21600.0);
    }

    #[test]
    fn delta_before_day_start_uses_previous_day() {
        // evaluated at 01:00, for a clip from yesterday evening
        let (drift, _) = time_delta(80000.0, 21565.0, Some(86400.0), 3600.0, 11.0);
        assert_eq!(drift, 80000.0 - (3600.0 + 86400.0));
    }

    #[test]
    fn delta_normalizes_midnight_start_early_eval() {
        // first clip of a midnight-start day, evaluated 2s before midnight
        let (drift, _) = time_delta(0.0, 0.0, Some(86400.0), 86398.0, 11.0);
        assert!((drift - 2.0).abs() < 1e-9);
    }

    #[test]
    fn delta_folds_near_full_day() {
        // clip near day end evaluated just past midnight
        let (drift, _) = time_delta(86398.0, 0.0, Some(86400.0), 0.5, 11.0);
        assert!((drift + 2.5).abs() < 1e-9);
    }

    #[test]
    fn date_selection_before_day_start() {
        let today = NaiveDate::from_ymd_opt(2026, 8, 30).unwrap();
        assert_eq!(
            playlist_date(21565.0, 3600.0, today),
            NaiveDate::from_ymd_opt(2026, 8, 29).unwrap()
        );
        assert_eq!(playlist_date(21565.0, 30000.0, today), today);
    }

    #[test]
    fn validation_reports_short_document() {
        let doc: PlaylistDocument = serde_json::from_str(
            r#"{"program": [{"in": 0, "out": 300, "duration": 200, "source": "/missing.mp4"}]}"#,
        )
        .unwrap();
        let issues = validate_document(&doc, Some(600.0));
        assert!(issues.iter().any(|i| i.contains("short")));
        assert!(issues.iter().any(|i| i.contains("source missing")));
        assert!(validate_document(&doc, Some(300.0)).len() == 1);
    }

    const TWO_CLIPS: &str = r#"{
        "channel": "one",
        "date": "2026-08-30",
        "program": [
            {"in": 0, "out": 300, "duration": 300, "source": "/a.mp4"},
            {"in": 0, "out": 300, "duration": 300, "source": "/b.mp4"}
        ]
    }"#;

    #[tokio::test]
    async fn startup_joins_schedule_mid_clip() {
        let (mut scheduler, _dir) = scheduler_with_doc(day_settings("00:00:00", "24:00:00"), TWO_CLIPS);
        let node = scheduler.plan_node(30.0).await.unwrap();
        assert_eq!(node.source, "/a.mp4");
        assert_eq!(node.seek_offset, 30.0);
        assert_eq!(node.effective_length(), 270.0);
    }

    #[tokio::test]
    async fn startup_drift_seek() {
        let raw = r#"{"program": [{"in": 0, "out": 300, "duration": 300, "source": "X"}]}"#;
        let (mut scheduler, _dir) = scheduler_with_doc(day_settings("06:00:00", "24:00:00"), raw);
        let node = scheduler.plan_node(21620.0).await.unwrap();
        assert_eq!(node.seek_offset, 20.0);
        assert_eq!(node.effective_length(), 280.0);
    }

    #[tokio::test]
    async fn startup_skips_expired_clips() {
        let (mut scheduler, _dir) = scheduler_with_doc(day_settings("00:00:00", "24:00:00"), TWO_CLIPS);
        let node = scheduler.plan_node(350.0).await.unwrap();
        assert_eq!(node.source, "/b.mp4");
        assert_eq!(node.seek_offset, 50.0);
    }

    #[tokio::test]
    async fn steady_state_consumes_in_order() {
        let (mut scheduler, _dir) = scheduler_with_doc(day_settings("00:00:00", "24:00:00"), TWO_CLIPS);
        let first = scheduler.plan_node(0.0).await.unwrap();
        assert_eq!(first.source, "/a.mp4");
        assert_eq!(first.seek_offset, 0.0);
        let second = scheduler.plan_node(300.0).await.unwrap();
        assert_eq!(second.source, "/b.mp4");
        assert_eq!(second.scheduled_begin, 300.0);
    }

    #[tokio::test]
    async fn last_window_truncates_to_day_end() {
        let raw = r#"{"program": [
            {"in": 0, "out": 300, "duration": 300, "source": "/a.mp4"},
            {"in": 0, "out": 600, "duration": 600, "source": "/b.mp4"}
        ]}"#;
        let (mut scheduler, _dir) = scheduler_with_doc(day_settings("00:00:00", "00:10:00"), raw);
        scheduler.plan_node(0.0).await.unwrap();
        let second = scheduler.plan_node(300.0).await.unwrap();
        assert_eq!(second.out_point, 300.0);
        assert_eq!(second.effective_length(), 300.0);
    }

    #[tokio::test]
    async fn drift_past_threshold_is_fatal() {
        let (mut scheduler, _dir) = scheduler_with_doc(day_settings("00:00:00", "24:00:00"), TWO_CLIPS);
        scheduler.init = false;
        let err = scheduler.plan_node(50.0).await.unwrap_err();
        assert!(matches!(err, PlayoutError::DriftExceeded { .. }));
        assert!(err.is_fatal());
        // the measured drift was published before aborting
        assert!((scheduler.ctx.sync.time_delta() + 50.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn empty_document_fills_with_placeholders() {
        let (mut scheduler, _dir) =
            scheduler_with_doc(day_settings("00:00:00", "24:00:00"), r#"{"program": []}"#);
        let first = scheduler.plan_node(0.0).await.unwrap();
        assert_eq!(first.kind, NodeKind::Dummy);
        assert!(first.source.starts_with("color="));
        let gap = first.scheduled_length();
        assert!(gap > MINIMAL_LENGTH);
        // next cycle keeps filling from where the previous placeholder ends
        let second = scheduler.plan_node(gap).await.unwrap();
        assert_eq!(second.kind, NodeKind::Dummy);
        assert_eq!(second.scheduled_begin, gap);
    }

    #[tokio::test]
    async fn day_boundary_rolls_date_and_still_yields() {
        let (mut scheduler, _dir) =
            scheduler_with_doc(day_settings("00:00:00", "24:00:00"), r#"{"program": []}"#);
        let before = scheduler.current_date;
        // half a second before the day boundary, with nothing left to play
        let node = scheduler.plan_node(86399.5).await.unwrap();
        assert_eq!(node.kind, NodeKind::Dummy);
        assert!(node.scheduled_length() > MINIMAL_LENGTH);
        assert_eq!(scheduler.current_date, before.succ_opt().unwrap());
    }

    #[tokio::test]
    async fn malformed_document_degrades_to_placeholders() {
        let (mut scheduler, _dir) =
            scheduler_with_doc(day_settings("00:00:00", "24:00:00"), "{ not json");
        let node = scheduler.plan_node(0.0).await.unwrap();
        assert_eq!(node.kind, NodeKind::Dummy);
    }

    #[tokio::test]
    async fn unchanged_document_is_not_reloaded() {
        let (mut scheduler, _dir) = scheduler_with_doc(day_settings("00:00:00", "24:00:00"), TWO_CLIPS);
        scheduler.refresh_document().await;
        assert_eq!(scheduler.document.program.len(), 2);
        // marker survives a second refresh only if no reload happened
        scheduler.document.channel = "marker".into();
        scheduler.refresh_document().await;
        assert_eq!(scheduler.document.channel, "marker");
    }

    #[tokio::test]
    async fn loop_mode_rewinds_instead_of_rolling_over() {
        let mut settings = day_settings("00:00:00", "24:00:00");
        settings.playlist.loop_list = true;
        let raw = r#"{"program": [{"in": 0, "out": 300, "duration": 300, "source": "/a.mp4"}]}"#;
        let (mut scheduler, _dir) = scheduler_with_doc(settings, raw);
        scheduler.plan_node(0.0).await.unwrap();
        let again = scheduler.plan_node(300.0).await.unwrap();
        assert_eq!(again.source, "/a.mp4");
        assert_eq!(again.scheduled_begin, 300.0);
    }

    #[tokio::test]
    async fn sub_second_remainder_is_dropped() {
        let raw = r#"{"program": [
            {"in": 0, "out": 0.5, "duration": 0.5, "source": "/tiny.mp4"},
            {"in": 0, "out": 300, "duration": 300, "source": "/a.mp4"}
        ]}"#;
        let (mut scheduler, _dir) = scheduler_with_doc(day_settings("00:00:00", "24:00:00"), raw);
        let node = scheduler.plan_node(0.0).await.unwrap();
        assert_eq!(node.source, "/a.mp4");
    }
}
