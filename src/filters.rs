use std::path::Path;

use tracing::warn;

use crate::config::Settings;
use crate::node::{ClipNode, NodeKind};
use crate::sync::SyncState;

/// Source aspect ratios within this absolute distance of the target are not
/// padded.
pub const ASPECT_TOLERANCE: f64 = 0.03;
/// Probed durations this close to the scheduled length are not pad-extended.
pub const DURATION_TOLERANCE: f64 = 0.1;
/// Corrective playback speed never reaches this factor; anything faster is
/// visibly distorted, so we clamp back to 1x and let seek correction catch
/// up instead.
pub const MAX_SPEED: f64 = 1.1;

const FADE_IN_DURATION: f64 = 0.5;
const FADE_OUT_DURATION: f64 = 1.0;
const LOGO_FADE_DURATION: f64 = 1.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterCategory {
    Video,
    Audio,
}

pub type FilterFn = fn(&ClipNode, &Settings) -> Option<String>;

/// Explicit registry of custom filter stages, populated at startup.
///
/// Registered functions run after the built-in normalization stages and
/// before the fades, in registration order. A function returning `None`
/// contributes nothing for that node.
#[derive(Default)]
pub struct FilterRegistry {
    video: Vec<FilterFn>,
    audio: Vec<FilterFn>,
}

impl FilterRegistry {
    pub fn register(&mut self, category: FilterCategory, f: FilterFn) {
        match category {
            FilterCategory::Video => self.video.push(f),
            FilterCategory::Audio => self.audio.push(f),
        }
    }

    fn apply(&self, category: FilterCategory, node: &ClipNode, settings: &Settings) -> Vec<String> {
        let slot = match category {
            FilterCategory::Video => &self.video,
            FilterCategory::Audio => &self.audio,
        };
        slot.iter().filter_map(|f| f(node, settings)).collect()
    }
}

/// Filter-chain output of the builder, kept structured so the scheduler's
/// tests can inspect individual stages before everything is flattened into
/// a `-filter_complex` argument.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterArguments {
    pub video_chain: Vec<String>,
    pub audio_chain: Vec<String>,
    /// `movie=...` source chain for the logo leg, fades included.
    pub logo_source: Option<String>,
    /// The overlay stage combining the logo leg onto the video leg.
    pub logo_overlay: Option<String>,
    /// Audio was synthesized from silence because the source has no audio
    /// stream; the chain then starts with a lavfi source, not `[0:a]`.
    pub synthetic_audio: bool,
    pub has_video: bool,
    pub output_count: usize,
}

impl FilterArguments {
    fn fan_out(&self, split: &str, label: &str) -> String {
        let count = self.output_count.max(1);
        if count == 1 {
            return format!("[{label}0]");
        }
        let legs: String = (0..count).map(|i| format!("[{label}{i}]")).collect();
        format!(",{split}={count}{legs}")
    }

    /// Flatten into one `-filter_complex` graph string.
    pub fn graph(&self) -> String {
        let mut parts: Vec<String> = Vec::new();

        if self.has_video {
            let stages = if self.video_chain.is_empty() {
                "null".to_string()
            } else {
                self.video_chain.join(",")
            };
            match (&self.logo_source, &self.logo_overlay) {
                (Some(logo), Some(overlay)) => {
                    parts.push(format!("[0:v]{stages}[vpre]"));
                    parts.push(format!("{logo}[logo]"));
                    parts.push(format!(
                        "[vpre][logo]{overlay}{}",
                        self.fan_out("split", "vout")
                    ));
                }
                _ => parts.push(format!("[0:v]{stages}{}", self.fan_out("split", "vout"))),
            }
        }

        let audio_stages = if self.audio_chain.is_empty() {
            "anull".to_string()
        } else {
            self.audio_chain.join(",")
        };
        let audio_input = if self.synthetic_audio { "" } else { "[0:a]" };
        parts.push(format!(
            "{audio_input}{audio_stages}{}",
            self.fan_out("asplit", "aout")
        ));

        parts.join(";")
    }

    /// Complete argument slice for the decoder invocation.
    pub fn to_cmd(&self) -> Vec<String> {
        let mut cmd = vec!["-filter_complex".to_string(), self.graph()];
        for i in 0..self.output_count.max(1) {
            if self.has_video {
                cmd.push("-map".into());
                cmd.push(format!("[vout{i}]"));
            }
            cmd.push("-map".into());
            cmd.push(format!("[aout{i}]"));
        }
        cmd
    }
}

/// Builds the normalization filter graph for one clip node.
///
/// Pure given its inputs, aside from reading the sync state's drift and
/// logging a warning when a source carries no audio.
pub struct FilterGraphBuilder<'a> {
    settings: &'a Settings,
    registry: &'a FilterRegistry,
    sync: &'a SyncState,
}

impl<'a> FilterGraphBuilder<'a> {
    pub fn new(settings: &'a Settings, registry: &'a FilterRegistry, sync: &'a SyncState) -> Self {
        Self {
            settings,
            registry,
            sync,
        }
    }

    pub fn build(
        &self,
        node: &ClipNode,
        previous: Option<&ClipNode>,
        next: Option<&ClipNode>,
    ) -> FilterArguments {
        let mut args = FilterArguments {
            output_count: self.settings.processing.output_count,
            ..Default::default()
        };

        self.build_video(node, &mut args);
        if args.has_video {
            self.build_logo(node, previous, next, &mut args);
        }
        self.build_audio(node, &mut args);
        self.build_pacing(node, &mut args);

        args
    }

    fn build_video(&self, node: &ClipNode, args: &mut FilterArguments) {
        let Some(video) = node
            .probe_result
            .as_ref()
            .and_then(|p| p.video.first())
            .cloned()
        else {
            // Audio-only or pure-generator source: a valid branch mapping
            // only an audio leg, not an error.
            return;
        };
        args.has_video = true;
        let proc = &self.settings.processing;
        let chain = &mut args.video_chain;

        if let Some(text) = self.text_filter(node) {
            chain.push(text);
        }

        if video.interlaced() {
            chain.push("yadif=0:-1:0".into());
        }

        let aspect_delta = (video.aspect - proc.aspect).abs();
        if aspect_delta > ASPECT_TOLERANCE && video.aspect > 0.0 {
            if video.aspect < proc.aspect {
                // Narrower than the house format: pillarbox.
                chain.push(format!(
                    "pad=ih*{}/{}/sar:ih:(ow-iw)/2:(oh-ih)/2",
                    proc.width, proc.height
                ));
            } else {
                // Wider: letterbox.
                chain.push(format!(
                    "pad=iw:iw*{}/{}/sar:(ow-iw)/2:(oh-ih)/2",
                    proc.height, proc.width
                ));
            }
        }

        if video.fps > 0.0 && (video.fps - proc.fps).abs() > f64::EPSILON {
            chain.push(format!("fps={}", proc.fps));
        }

        if video.width != proc.width || video.height != proc.height {
            chain.push(format!("scale={}:{}", proc.width, proc.height));
        }
        chain.push(format!("setdar=dar={}", proc.aspect));

        if let Some(shortfall) = self.duration_shortfall(node) {
            chain.push(format!("tpad=stop_mode=add:stop_duration={shortfall:.3}"));
        }

        chain.extend(
            self.registry
                .apply(FilterCategory::Video, node, self.settings),
        );

        if node.seek_offset > 0.0 {
            chain.push(format!("fade=in:st=0:d={FADE_IN_DURATION}"));
        }
        if let Some(start) = self.fade_out_start(node) {
            chain.push(format!("fade=out:st={start:.3}:d={FADE_OUT_DURATION}"));
        }
    }

    fn build_logo(
        &self,
        node: &ClipNode,
        previous: Option<&ClipNode>,
        next: Option<&ClipNode>,
        args: &mut FilterArguments,
    ) {
        let proc = &self.settings.processing;
        // The logo never runs over advertisements; it fades in coming out of
        // an ad block and fades out going into one.
        if !proc.add_logo || node.is_advertisement() || !Path::new(&proc.logo).is_file() {
            return;
        }

        let mut logo = format!(
            "movie={}:loop=0,setpts=N/(FRAME_RATE*TB),format=rgba,colorchannelmixer=aa={}",
            proc.logo, proc.logo_opacity
        );
        if previous.map(ClipNode::is_advertisement).unwrap_or(false) {
            logo.push_str(&format!(",fade=in:st=0:d={LOGO_FADE_DURATION}:alpha=1"));
        }
        if next.map(ClipNode::is_advertisement).unwrap_or(false) {
            let start = (node.effective_length() - LOGO_FADE_DURATION).max(0.0);
            logo.push_str(&format!(",fade=out:st={start:.3}:d={LOGO_FADE_DURATION}:alpha=1"));
        }

        args.logo_source = Some(logo);
        args.logo_overlay = Some(format!("overlay={}:shortest=1", proc.logo_geometry));
    }

    fn build_audio(&self, node: &ClipNode, args: &mut FilterArguments) {
        let proc = &self.settings.processing;
        let chain = &mut args.audio_chain;
        let has_audio = node
            .probe_result
            .as_ref()
            .map(|p| !p.audio.is_empty())
            .unwrap_or(false);

        if !has_audio {
            if node.kind == NodeKind::Regular {
                warn!(source = %node.source, "clip has no audio stream, synthesizing silence");
            }
            args.synthetic_audio = true;
            chain.push(format!(
                "anullsrc=channel_layout=stereo:sample_rate=48000,atrim=duration={:.3}",
                node.effective_length().max(0.0)
            ));
            return;
        }

        if proc.add_loudnorm {
            chain.push(format!(
                "loudnorm=I={}:TP={}:LRA={}",
                proc.loudnorm_i, proc.loudnorm_tp, proc.loudnorm_lra
            ));
        }

        if let Some(shortfall) = self.duration_shortfall(node) {
            chain.push(format!("apad=pad_dur={shortfall:.3}"));
        }

        chain.extend(
            self.registry
                .apply(FilterCategory::Audio, node, self.settings),
        );

        if node.seek_offset > 0.0 {
            chain.push(format!("afade=in:st=0:d={FADE_IN_DURATION}"));
        }
        if let Some(start) = self.fade_out_start(node) {
            chain.push(format!("afade=out:st={start:.3}:d={FADE_OUT_DURATION}"));
        }
    }

    /// Realtime pacing stage. When behind schedule, speeds up just enough
    /// to converge, but never past `MAX_SPEED`.
    fn build_pacing(&self, node: &ClipNode, args: &mut FilterArguments) {
        if !self.sync.realtime() {
            return;
        }
        let mut speed = 1.0;
        let delta = self.sync.time_delta();
        let length = node.effective_length();
        if delta < 0.0 && length > 0.0 && length + delta > 0.0 {
            let candidate = length / (length + delta);
            if candidate < MAX_SPEED {
                speed = candidate;
            }
        }
        if args.has_video {
            args.video_chain.push(format!("realtime=speed={speed:.5}"));
        }
        if !args.synthetic_audio {
            args.audio_chain.push(format!("atempo={speed:.5}"));
        }
    }

    fn text_filter(&self, node: &ClipNode) -> Option<String> {
        let text = &self.settings.text;
        if !text.add_text {
            return None;
        }
        if text.text_from_filename {
            let name = Path::new(&node.source)
                .file_stem()
                .map(|s| s.to_string_lossy().replace('\'', ""))
                .unwrap_or_default();
            Some(format!("drawtext=text='{name}':{}", text.style))
        } else {
            let address = text.address.replace(':', "\\:");
            Some(format!(
                "drawtext=text='':zmq=b=tcp\\\\://{address}:{}",
                text.style
            ))
        }
    }

    /// Seconds by which the probed duration falls short of the scheduled
    /// play window, when that shortfall exceeds the tolerance. Filler is
    /// already looped at the decoder input and never needs padding.
    fn duration_shortfall(&self, node: &ClipNode) -> Option<f64> {
        if node.kind == NodeKind::Filler {
            return None;
        }
        let probed = node.probe_result.as_ref().and_then(|p| p.duration)?;
        let shortfall = node.out_point - probed;
        (shortfall > DURATION_TOLERANCE).then_some(shortfall)
    }

    fn fade_out_start(&self, node: &ClipNode) -> Option<f64> {
        if node.plays_to_end() {
            return None;
        }
        let start = node.effective_length() - FADE_OUT_DURATION;
        (start > 0.0).then_some(start)
    }
}
