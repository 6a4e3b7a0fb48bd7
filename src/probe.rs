use std::path::Path;
use std::process::Command;

use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};
use serde::Deserialize;

use crate::error::{PlayoutError, Result};

const REMOTE_SCHEMES: [&str; 5] = ["http", "https", "ftp", "smb", "sftp"];

/// Characters escaped when a remote source is placed on an ffmpeg command
/// line. Spaces and quotes are the ones that actually break argument
/// handling in practice.
const SOURCE_ESCAPE: &AsciiSet = &CONTROLS.add(b' ').add(b'"').add(b'\'');

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProbeResult {
    /// Container duration in seconds; `None` when the container does not
    /// declare one longer than 0.1s.
    pub duration: Option<f64>,
    pub video: Vec<VideoStream>,
    pub audio: Vec<AudioStream>,
    pub is_remote: bool,
}

impl ProbeResult {
    /// The failure signal callers must check: a source with neither video
    /// nor audio streams is unplayable, whatever ffprobe's exit code said.
    pub fn is_empty(&self) -> bool {
        self.video.is_empty() && self.audio.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct VideoStream {
    pub width: i64,
    pub height: i64,
    pub aspect: f64,
    pub fps: f64,
    pub field_order: Option<String>,
}

impl VideoStream {
    pub fn interlaced(&self) -> bool {
        !matches!(self.field_order.as_deref(), None | Some("progressive"))
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AudioStream {
    pub channels: Option<i64>,
    pub sample_rate: Option<i64>,
}

#[derive(Deserialize)]
struct FfProbeOut {
    #[serde(default)]
    streams: Vec<FfStream>,
    format: Option<FfFormat>,
}

#[derive(Deserialize)]
struct FfStream {
    codec_type: Option<String>,
    width: Option<i64>,
    height: Option<i64>,
    display_aspect_ratio: Option<String>,
    avg_frame_rate: Option<String>,
    r_frame_rate: Option<String>,
    field_order: Option<String>,
    channels: Option<i64>,
    sample_rate: Option<String>,
}

#[derive(Deserialize)]
struct FfFormat {
    duration: Option<String>,
}

pub fn is_remote_source(source: &str) -> bool {
    source
        .split_once("://")
        .map(|(scheme, _)| REMOTE_SCHEMES.contains(&scheme.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

/// Percent-escape a remote source for use as a single ffmpeg argument.
/// Local paths pass through untouched.
pub fn escaped_source(source: &str) -> String {
    if is_remote_source(source) {
        utf8_percent_encode(source, SOURCE_ESCAPE).to_string()
    } else {
        source.to_string()
    }
}

/// Reduce an ffprobe rational like "25/1" or "30000/1001" to a float.
fn parse_rational(raw: &str) -> Option<f64> {
    match raw.split_once('/') {
        Some((num, den)) => {
            let num: f64 = num.trim().parse().ok()?;
            let den: f64 = den.trim().parse().ok()?;
            if den == 0.0 {
                None
            } else {
                Some(num / den)
            }
        }
        None => raw.trim().parse().ok(),
    }
}

/// Aspect ratio from a declared DAR ("16:9"), falling back to width/height.
fn stream_aspect(stream: &FfStream) -> f64 {
    if let Some(dar) = stream.display_aspect_ratio.as_deref() {
        if let Some((w, h)) = dar.split_once(':') {
            if let (Ok(w), Ok(h)) = (w.trim().parse::<f64>(), h.trim().parse::<f64>()) {
                if h > 0.0 {
                    return w / h;
                }
            }
        }
    }
    match (stream.width, stream.height) {
        (Some(w), Some(h)) if h > 0 => w as f64 / h as f64,
        _ => 1.0,
    }
}

fn map_streams(parsed: FfProbeOut, is_remote: bool) -> ProbeResult {
    let mut result = ProbeResult {
        is_remote,
        ..Default::default()
    };

    result.duration = parsed
        .format
        .and_then(|f| f.duration)
        .and_then(|d| d.parse::<f64>().ok())
        .filter(|d| *d > 0.1);

    for stream in parsed.streams {
        match stream.codec_type.as_deref() {
            Some("video") => {
                let fps = stream
                    .avg_frame_rate
                    .as_deref()
                    .and_then(parse_rational)
                    .filter(|f| *f > 0.0)
                    .or_else(|| stream.r_frame_rate.as_deref().and_then(parse_rational))
                    .unwrap_or(0.0);
                result.video.push(VideoStream {
                    width: stream.width.unwrap_or(0),
                    height: stream.height.unwrap_or(0),
                    aspect: stream_aspect(&stream),
                    fps,
                    field_order: stream.field_order,
                });
            }
            Some("audio") => {
                result.audio.push(AudioStream {
                    channels: stream.channels,
                    sample_rate: stream
                        .sample_rate
                        .and_then(|s| s.parse().ok()),
                });
            }
            _ => {}
        }
    }

    result
}

/// Probe a local path or remote URL with ffprobe.
///
/// Missing files, a failing ffprobe, and malformed JSON all surface as
/// `ProbeFailure`; nothing raised by the external binary escapes this
/// boundary. Remote sources are only percent-escaped, never checked for
/// local existence.
pub fn probe(source: &str) -> Result<ProbeResult> {
    let is_remote = is_remote_source(source);
    let target = escaped_source(source);

    if !is_remote && !Path::new(source).is_file() {
        return Err(PlayoutError::ProbeFailure {
            path: source.to_string(),
            reason: "no such file".into(),
        });
    }

    let ffprobe = std::env::var("AIRCAST_FFPROBE").unwrap_or_else(|_| "ffprobe".to_string());
    let out = Command::new(ffprobe)
        .args([
            "-v",
            "error",
            "-print_format",
            "json",
            "-show_streams",
            "-show_format",
        ])
        .arg(&target)
        .output()
        .map_err(|e| PlayoutError::ProbeFailure {
            path: source.to_string(),
            reason: format!("failed to run ffprobe: {e}"),
        })?;

    if !out.status.success() {
        return Err(PlayoutError::ProbeFailure {
            path: source.to_string(),
            reason: String::from_utf8_lossy(&out.stderr).trim().to_string(),
        });
    }

    let parsed: FfProbeOut =
        serde_json::from_slice(&out.stdout).map_err(|e| PlayoutError::ProbeFailure {
            path: source.to_string(),
            reason: format!("ffprobe json parse failed: {e}"),
        })?;

    Ok(map_streams(parsed, is_remote))
}
