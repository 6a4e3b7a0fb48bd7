use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::Deserialize;

use crate::cli::Args;

pub const DAY_IN_SECONDS: f64 = 86400.0;

/// Immutable runtime configuration snapshot.
///
/// Loaded once at startup (YAML), merged with CLI overrides, then shared via
/// `Arc`. A config reload produces a fresh `Settings`; nothing mutates a
/// snapshot that an in-flight node may still reference.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct Settings {
    pub general: General,
    pub processing: Processing,
    pub playlist: Playlist,
    pub storage: Storage,
    pub text: Text,
    pub ingest: Ingest,
    pub out: Out,
    pub logging: Logging,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct General {
    /// Abort the run when |drift| exceeds this many seconds. `None` disables
    /// the check entirely.
    pub stop_threshold: Option<f64>,
}

impl Default for General {
    fn default() -> Self {
        Self {
            stop_threshold: Some(11.0),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Processing {
    pub width: i64,
    pub height: i64,
    pub aspect: f64,
    pub fps: f64,
    pub add_logo: bool,
    pub logo: String,
    pub logo_opacity: f64,
    pub logo_geometry: String,
    pub add_loudnorm: bool,
    pub loudnorm_i: f64,
    pub loudnorm_tp: f64,
    pub loudnorm_lra: f64,
    /// Number of independent output legs the filter graph fans out into.
    pub output_count: usize,
}

impl Default for Processing {
    fn default() -> Self {
        Self {
            width: 1024,
            height: 576,
            aspect: 1.778,
            fps: 25.0,
            add_logo: false,
            logo: String::new(),
            logo_opacity: 0.7,
            logo_geometry: "W-w-12:12".into(),
            add_loudnorm: false,
            loudnorm_i: -18.0,
            loudnorm_tp: -1.5,
            loudnorm_lra: 11.0,
            output_count: 1,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Playlist {
    /// Playlist root: a directory laid out as `<root>/<YYYY>/<MM>/<date>.json`
    /// or an HTTP base URL with the same path shape.
    pub path: String,
    /// Wall-clock time beginning a scheduling day, "HH:MM:SS".
    pub day_start: String,
    /// Target day length, "HH:MM:SS", or empty / "none" for no limit.
    pub length: String,
    #[serde(rename = "loop")]
    pub loop_list: bool,
    /// Explicit single playlist file, normally supplied via CLI.
    #[serde(skip)]
    pub override_file: Option<PathBuf>,
    #[serde(skip)]
    pub start_sec: f64,
    #[serde(skip)]
    pub length_sec: Option<f64>,
}

impl Default for Playlist {
    fn default() -> Self {
        Self {
            path: "/var/lib/aircast/playlists".into(),
            day_start: "05:59:25".into(),
            length: "24:00:00".into(),
            loop_list: false,
            override_file: None,
            start_sec: 0.0,
            length_sec: Some(DAY_IN_SECONDS),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Storage {
    pub path: PathBuf,
    pub extensions: Vec<String>,
    pub shuffle: bool,
    /// Fallback asset looped/trimmed into schedule gaps. Empty means "no
    /// filler configured"; gaps are then covered by synthesized dummy clips.
    pub filler_clip: String,
}

impl Default for Storage {
    fn default() -> Self {
        Self {
            path: PathBuf::from("/var/lib/aircast/media"),
            extensions: vec!["mp4".into(), "mkv".into(), "mov".into()],
            shuffle: false,
            filler_clip: String::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Text {
    pub add_text: bool,
    pub text_from_filename: bool,
    pub style: String,
    /// Listening endpoint for live text updates (drawtext zmq).
    pub address: String,
}

impl Default for Text {
    fn default() -> Self {
        Self {
            add_text: false,
            text_from_filename: false,
            style: "x=(w-tw)/2:y=(h-line_h)*0.9:fontsize=24:fontcolor=#ffffff".into(),
            address: "127.0.0.1:5555".into(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Ingest {
    pub enable: bool,
    /// Raw ffmpeg input arguments for the listener, e.g.
    /// `-f live_flv -listen 1 -i rtmp://0.0.0.0:1936/live/stream`.
    pub input_param: String,
}

impl Default for Ingest {
    fn default() -> Self {
        Self {
            enable: false,
            input_param: String::new(),
        }
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Deserialize, clap::ValueEnum, Default,
)]
#[serde(rename_all = "lowercase")]
pub enum OutputMode {
    #[default]
    Desktop,
    Hls,
    Stream,
    Null,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Out {
    pub mode: OutputMode,
    /// Raw ffmpeg output arguments appended after the pipe input.
    pub output_param: String,
}

impl Default for Out {
    fn default() -> Self {
        Self {
            mode: OutputMode::Desktop,
            output_param: String::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Logging {
    pub path: Option<PathBuf>,
    pub level: String,
    /// Log level passed to spawned ffmpeg/ffplay processes.
    pub ffmpeg_level: String,
    /// Identical report messages inside this window are emitted once.
    pub dedup_seconds: u64,
}

impl Default for Logging {
    fn default() -> Self {
        Self {
            path: None,
            level: "info".into(),
            ffmpeg_level: "error".into(),
            dedup_seconds: 30,
        }
    }
}

/// Parse "HH:MM:SS" (seconds may carry fractions) into seconds since
/// midnight.
pub fn time_to_sec(clock: &str) -> Option<f64> {
    let mut parts = clock.trim().splitn(3, ':');
    let h: f64 = parts.next()?.parse().ok()?;
    let m: f64 = parts.next()?.parse().ok()?;
    let s: f64 = parts.next().unwrap_or("0").parse().ok()?;
    Some(h * 3600.0 + m * 60.0 + s)
}

pub fn sec_to_time(mut sec: f64) -> String {
    if sec < 0.0 {
        sec += DAY_IN_SECONDS;
    }
    let h = (sec / 3600.0).floor();
    let m = ((sec - h * 3600.0) / 60.0).floor();
    let s = sec - h * 3600.0 - m * 60.0;
    format!("{h:02.0}:{m:02.0}:{s:06.3}")
}

impl Settings {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let mut settings: Settings = serde_yaml::from_str(&raw)
            .with_context(|| format!("parsing config {}", path.display()))?;
        settings.finalize()?;
        Ok(settings)
    }

    /// Resolve the derived second-based fields from their string forms.
    pub fn finalize(&mut self) -> anyhow::Result<()> {
        self.playlist.start_sec = time_to_sec(&self.playlist.day_start)
            .with_context(|| format!("invalid day_start '{}'", self.playlist.day_start))?;
        let length = self.playlist.length.trim();
        self.playlist.length_sec = if length.is_empty() || length.eq_ignore_ascii_case("none") {
            None
        } else {
            Some(
                time_to_sec(length)
                    .with_context(|| format!("invalid playlist length '{length}'"))?,
            )
        };
        if self.processing.output_count == 0 {
            anyhow::bail!("processing.output_count must be at least 1");
        }
        Ok(())
    }

    /// Apply per-run CLI overrides on top of the loaded file.
    pub fn apply_args(&mut self, args: &Args) -> anyhow::Result<()> {
        if let Some(folder) = &args.folder {
            self.storage.path = folder.clone();
        }
        if let Some(log) = &args.log {
            self.logging.path = Some(log.clone());
        }
        if args.loop_list {
            self.playlist.loop_list = true;
        }
        if let Some(mode) = args.output {
            self.out.mode = mode;
        }
        if let Some(playlist) = &args.playlist {
            self.playlist.override_file = Some(playlist.clone());
        }
        if let Some(start) = &args.start {
            self.playlist.day_start = if start.eq_ignore_ascii_case("now") {
                let now = chrono::Local::now().time();
                format!("{}", now.format("%H:%M:%S"))
            } else {
                start.clone()
            };
        }
        if let Some(length) = &args.length {
            self.playlist.length = length.clone();
        }
        self.finalize()
    }

    /// Folder mode is selected by an explicit `-f` folder, a play-mode
    /// override, or a playlist path that is not configured.
    pub fn folder_mode(&self, args: &Args) -> bool {
        if let Some(mode) = &args.play_mode {
            return mode.eq_ignore_ascii_case("folder");
        }
        if args.folder.is_some() {
            return true;
        }
        self.playlist.path.is_empty() && self.playlist.override_file.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn time_parsing() {
        assert_eq!(time_to_sec("06:00:00"), Some(21600.0));
        assert_eq!(time_to_sec("00:00:30.5"), Some(30.5));
        assert_eq!(time_to_sec("garbage"), None);
    }

    #[test]
    fn sec_formatting_wraps_negative() {
        assert_eq!(sec_to_time(21600.0), "06:00:00.000");
        assert_eq!(sec_to_time(-10.0), "23:59:50.000");
    }

    #[test]
    fn finalize_resolves_day_bounds() {
        let mut settings = Settings::default();
        settings.playlist.day_start = "05:59:25".into();
        settings.playlist.length = "24:00:00".into();
        settings.finalize().unwrap();
        assert!((settings.playlist.start_sec - 21565.0).abs() < 1e-9);
        assert_eq!(settings.playlist.length_sec, Some(DAY_IN_SECONDS));
    }

    #[test]
    fn no_limit_length() {
        let mut settings = Settings::default();
        settings.playlist.length = "none".into();
        settings.finalize().unwrap();
        assert_eq!(settings.playlist.length_sec, None);
    }

    #[test]
    fn folder_mode_selection() {
        let settings = Settings::default();
        assert!(!settings.folder_mode(&Args::default()));
        assert!(settings.folder_mode(&Args {
            folder: Some("/media".into()),
            ..Default::default()
        }));
        assert!(settings.folder_mode(&Args {
            play_mode: Some("folder".into()),
            ..Default::default()
        }));

        let mut unconfigured = Settings::default();
        unconfigured.playlist.path = String::new();
        assert!(unconfigured.folder_mode(&Args::default()));
    }

    #[test]
    fn yaml_round_trip_with_overrides() {
        let raw = r#"
playlist:
  path: /srv/playlists
  day_start: "00:00:00"
  length: "24:00:00"
  loop: false
processing:
  width: 1920
  height: 1080
  aspect: 1.778
out:
  mode: stream
  output_param: "-c:v libx264 -f flv rtmp://example/live"
"#;
        let mut settings: Settings = serde_yaml::from_str(raw).unwrap();
        settings.finalize().unwrap();
        assert_eq!(settings.processing.width, 1920);
        assert_eq!(settings.out.mode, OutputMode::Stream);

        let args = Args {
            loop_list: true,
            output: Some(OutputMode::Null),
            ..Default::default()
        };
        settings.apply_args(&args).unwrap();
        assert!(settings.playlist.loop_list);
        assert_eq!(settings.out.mode, OutputMode::Null);
    }
}
