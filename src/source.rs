use std::path::Path;
use std::sync::Arc;

use tokio::sync::Notify;
use tracing::warn;

use crate::config::Settings;
use crate::error::{PlayoutError, RateGate, Result};
use crate::filters::{FilterArguments, FilterGraphBuilder, FilterRegistry};
use crate::folder::FolderSource;
use crate::node::{ClipNode, NodeKind};
use crate::probe::{escaped_source, is_remote_source, probe, ProbeResult, VideoStream};
use crate::scheduler::Scheduler;
use crate::sync::SyncState;

/// Upper bound on one synthesized placeholder cycle when filling an open
/// gap; keeps an empty day producing a steady stream of short nodes instead
/// of one day-long clip.
pub const DUMMY_LENGTH: f64 = 60.0;
/// Probed duration may differ from the declared one by this much before a
/// correction is applied.
const DURATION_TOLERANCE: f64 = 3.0;

/// Shared engine state threaded into both node providers.
pub struct PlayoutContext {
    pub settings: Arc<Settings>,
    pub registry: FilterRegistry,
    pub sync: Arc<SyncState>,
    pub gate: RateGate,
}

/// The two interchangeable "next clip" sources.
pub enum NodeProvider {
    Playlist(Scheduler),
    Folder(FolderSource),
}

impl NodeProvider {
    pub async fn next_node(&mut self) -> Result<ClipNode> {
        match self {
            NodeProvider::Playlist(scheduler) => scheduler.next_node().await,
            NodeProvider::Folder(folder) => folder.next_node().await,
        }
    }

    /// After a live ingest session the schedule position is unknown; the
    /// playlist provider must re-locate "now" before its next node. Folder
    /// mode carries no wall-clock contract, so there is nothing to re-arm.
    pub fn rearm_live_seek(&mut self) {
        if let NodeProvider::Playlist(scheduler) = self {
            scheduler.rearm_live_seek();
        }
    }

    /// Signal fired when the currently playing file disappears (folder mode
    /// only); the orchestrator kills the active decoder and advances.
    pub fn interrupt(&self) -> Option<Arc<Notify>> {
        match self {
            NodeProvider::Playlist(_) => None,
            NodeProvider::Folder(folder) => Some(folder.interrupt()),
        }
    }

    /// Secondary cleanup hook, invoked once on every shutdown path.
    pub fn stop(&mut self) {
        if let NodeProvider::Folder(folder) = self {
            folder.stop();
        }
    }
}

/// Probe the node, substitute filler/dummy when its source is unusable,
/// and attach filter and decoder arguments. After this the node is ready
/// for the orchestrator as-is, whatever its origin.
pub fn prepare_node(
    ctx: &PlayoutContext,
    node: &mut ClipNode,
    previous: Option<&ClipNode>,
    next: Option<&ClipNode>,
) {
    if node.kind != NodeKind::Dummy && node.probe_result.is_none() {
        match probe_source(node) {
            Ok(result) => {
                correct_duration(ctx, node, &result);
                node.probe_result = Some(result);
            }
            Err(e) => {
                // Substitution happens on every affected node; only the
                // log line is deduplicated.
                if ctx.gate.allow(&format!("substitute {}", node.source)) {
                    warn!(source = %node.source, "{e}, substituting");
                }
                *node = substitute_node(ctx, node);
            }
        }
    }

    let builder = FilterGraphBuilder::new(&ctx.settings, &ctx.registry, &ctx.sync);
    let args = builder.build(node, previous, next);
    node.decoder_arguments = decoder_arguments(&ctx.settings, node, &args);
    node.filter_arguments = Some(args);
}

fn probe_source(node: &ClipNode) -> Result<ProbeResult> {
    if !is_remote_source(&node.source) && !Path::new(&node.source).is_file() {
        return Err(PlayoutError::SourceMissing(node.source.clone()));
    }
    let result = probe(&node.source)?;
    if result.is_empty() {
        return Err(PlayoutError::SourceMissing(format!(
            "{}: no usable streams",
            node.source
        )));
    }
    Ok(result)
}

/// Reconcile the declared duration with what the probe measured.
fn correct_duration(ctx: &PlayoutContext, node: &mut ClipNode, result: &ProbeResult) {
    let Some(real) = result.duration else {
        return;
    };
    if node.out_point <= 0.0 {
        // Folder nodes arrive without timing; they play front to back.
        node.out_point = real;
        node.intrinsic_duration = real;
        return;
    }
    if (real - node.intrinsic_duration).abs() > DURATION_TOLERANCE {
        if ctx.gate.allow(&format!("duration {}", node.source)) {
            warn!(
                source = %node.source,
                declared = node.intrinsic_duration,
                real,
                "duration mismatch, correcting"
            );
        }
        node.intrinsic_duration = real;
        if node.out_point > real {
            node.out_point = real;
            node.seek_offset = node.seek_offset.min(node.out_point);
        }
    }
}

/// Replace an unplayable node with filler (looped/trimmed to the same
/// window) or, without a configured filler, a synthesized color+silence
/// clip of exactly the needed duration.
fn substitute_node(ctx: &PlayoutContext, node: &ClipNode) -> ClipNode {
    let gap = node.effective_length().max(0.0);
    let mut replacement = match filler_probe(ctx) {
        Some((source, result)) => ClipNode {
            source,
            in_point: 0.0,
            out_point: gap,
            intrinsic_duration: result.duration.unwrap_or(gap),
            seek_offset: 0.0,
            kind: NodeKind::Filler,
            probe_result: Some(result),
            ..Default::default()
        },
        None => dummy_node(&ctx.settings, node.scheduled_begin, node.sequence_number, gap),
    };
    replacement.scheduled_begin = node.scheduled_begin;
    replacement.sequence_number = node.sequence_number;
    replacement.category = node.category.clone();
    replacement
}

/// Placeholder covering an open schedule gap, one cycle at a time: the
/// filler's natural length when one is configured, else a bounded dummy.
pub fn placeholder_node(ctx: &PlayoutContext, begin: f64, sequence: usize, remaining: f64) -> ClipNode {
    match filler_probe(ctx) {
        Some((source, result)) => {
            let natural = result.duration.unwrap_or(DUMMY_LENGTH);
            ClipNode {
                source,
                scheduled_begin: begin,
                sequence_number: sequence,
                in_point: 0.0,
                out_point: natural.min(remaining),
                intrinsic_duration: natural,
                seek_offset: 0.0,
                kind: NodeKind::Filler,
                probe_result: Some(result),
                ..Default::default()
            }
        }
        None => dummy_node(&ctx.settings, begin, sequence, remaining.min(DUMMY_LENGTH)),
    }
}

fn filler_probe(ctx: &PlayoutContext) -> Option<(String, ProbeResult)> {
    let filler = &ctx.settings.storage.filler_clip;
    if filler.is_empty() || !Path::new(filler).is_file() {
        return None;
    }
    match probe(filler) {
        Ok(result) if !result.is_empty() => Some((filler.clone(), result)),
        Ok(_) => None,
        Err(e) => {
            if ctx.gate.allow("filler probe") {
                warn!(filler, "filler unusable: {e}");
            }
            None
        }
    }
}

/// Synthesized color+silence clip. The lavfi descriptor carries the exact
/// requested duration; the audio leg comes from the filter graph's silence
/// synthesis.
pub fn dummy_node(settings: &Settings, begin: f64, sequence: usize, duration: f64) -> ClipNode {
    let proc = &settings.processing;
    ClipNode {
        source: format!(
            "color=c=#121212:s={}x{}:r={}:d={:.3}",
            proc.width, proc.height, proc.fps, duration
        ),
        scheduled_begin: begin,
        sequence_number: sequence,
        in_point: 0.0,
        out_point: duration,
        intrinsic_duration: duration,
        seek_offset: 0.0,
        kind: NodeKind::Dummy,
        probe_result: Some(ProbeResult {
            duration: Some(duration),
            video: vec![VideoStream {
                width: proc.width,
                height: proc.height,
                aspect: proc.aspect,
                fps: proc.fps,
                field_order: None,
            }],
            audio: Vec::new(),
            is_remote: false,
        }),
        ..Default::default()
    }
}

/// Codec/container contract between every decoder and the long-lived
/// encoder: near-lossless intra-only video plus PCM-carrying audio in an
/// MPEG-TS stream on stdout.
pub fn pipe_format_args(settings: &Settings) -> Vec<String> {
    // Intra-only bitrate scaled to the frame size, in kbit/s.
    let bitrate = settings.processing.width * settings.processing.height / 16;
    let bufsize = bitrate / 2;
    let mut args: Vec<String> = vec![
        "-c:v".into(),
        "mpeg2video".into(),
        "-g".into(),
        "1".into(),
        "-b:v".into(),
        format!("{bitrate}k"),
        "-minrate".into(),
        format!("{bitrate}k"),
        "-maxrate".into(),
        format!("{bitrate}k"),
        "-bufsize".into(),
        format!("{bufsize}k"),
        "-c:a".into(),
        "s302m".into(),
        "-strict".into(),
        "-2".into(),
        "-ar".into(),
        "48000".into(),
        "-ac".into(),
        "2".into(),
    ];
    args.extend(["-f".into(), "mpegts".into(), "pipe:1".into()]);
    args
}

/// Full decoder argument vector for one node.
fn decoder_arguments(settings: &Settings, node: &ClipNode, filter: &FilterArguments) -> Vec<String> {
    let mut args: Vec<String> = vec![
        "-hide_banner".into(),
        "-nostats".into(),
        "-v".into(),
        settings.logging.ffmpeg_level.clone(),
    ];

    match node.kind {
        NodeKind::Dummy => {
            args.extend(["-f".into(), "lavfi".into(), "-i".into(), node.source.clone()]);
        }
        kind => {
            if kind == NodeKind::Filler {
                // Loop the filler so it covers windows longer than itself.
                args.extend(["-stream_loop".into(), "-1".into()]);
            }
            if node.seek_offset > 0.0 {
                args.extend(["-ss".into(), format!("{:.3}", node.seek_offset)]);
            }
            let source = if is_remote_source(&node.source) {
                escaped_source(&node.source)
            } else {
                node.source.clone()
            };
            args.extend(["-i".into(), source]);
            if node.seek_offset > 0.0 || !node.plays_to_end() || kind == NodeKind::Filler {
                args.extend(["-t".into(), format!("{:.3}", node.effective_length().max(0.0))]);
            }
        }
    }

    args.extend(filter.to_cmd());
    args.extend(pipe_format_args(settings));
    args
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn context() -> PlayoutContext {
        let mut settings = Settings::default();
        settings.finalize().unwrap();
        PlayoutContext {
            settings: Arc::new(settings),
            registry: FilterRegistry::default(),
            sync: Arc::new(SyncState::new(false)),
            gate: RateGate::new(Duration::from_secs(30)),
        }
    }

    fn missing_node(gap: f64) -> ClipNode {
        ClipNode {
            source: "/no/such/file.mp4".into(),
            in_point: 0.0,
            out_point: gap,
            intrinsic_duration: gap,
            ..Default::default()
        }
    }

    #[test]
    fn dummy_duration_matches_requested_gap() {
        let ctx = context();
        let node = dummy_node(&ctx.settings, 0.0, 0, 30.0);
        assert_eq!(node.intrinsic_duration, 30.0);
        assert_eq!(node.effective_length(), 30.0);
        assert!(node.source.contains("d=30.000"));
    }

    #[test]
    fn missing_source_becomes_dummy_of_same_window() {
        let ctx = context();
        let mut node = missing_node(30.0);
        node.scheduled_begin = 1200.0;
        node.sequence_number = 7;
        prepare_node(&ctx, &mut node, None, None);
        assert_eq!(node.kind, NodeKind::Dummy);
        assert_eq!(node.effective_length(), 30.0);
        assert_eq!(node.scheduled_begin, 1200.0);
        assert_eq!(node.sequence_number, 7);
        assert!(node.filter_arguments.is_some());
    }

    #[test]
    fn repeated_failures_substitute_independently() {
        let ctx = context();
        let mut first = missing_node(30.0);
        let mut second = missing_node(45.0);
        prepare_node(&ctx, &mut first, None, None);
        prepare_node(&ctx, &mut second, None, None);
        assert_eq!(first.kind, NodeKind::Dummy);
        assert_eq!(second.kind, NodeKind::Dummy);
        assert_eq!(second.effective_length(), 45.0);
    }

    #[test]
    fn placeholder_bounds_dummy_cycles() {
        let ctx = context();
        let node = placeholder_node(&ctx, 0.0, 0, 86400.0);
        assert_eq!(node.kind, NodeKind::Dummy);
        assert_eq!(node.scheduled_length(), DUMMY_LENGTH);
        let short = placeholder_node(&ctx, 0.0, 0, 12.5);
        assert_eq!(short.scheduled_length(), 12.5);
    }

    #[test]
    fn decoder_arguments_for_seeked_trimmed_clip() {
        let ctx = context();
        let mut node = ClipNode {
            source: "/media/clip.mp4".into(),
            in_point: 0.0,
            out_point: 290.0,
            intrinsic_duration: 300.0,
            seek_offset: 20.0,
            probe_result: Some(ProbeResult {
                duration: Some(300.0),
                video: vec![VideoStream::default()],
                audio: Vec::new(),
                is_remote: false,
            }),
            ..Default::default()
        };
        let builder = FilterGraphBuilder::new(&ctx.settings, &ctx.registry, &ctx.sync);
        let filter = builder.build(&node, None, None);
        node.decoder_arguments = decoder_arguments(&ctx.settings, &node, &filter);

        let args = &node.decoder_arguments;
        let ss = args.iter().position(|a| a == "-ss").unwrap();
        assert_eq!(args[ss + 1], "20.000");
        let input = args.iter().position(|a| a == "-i").unwrap();
        assert!(ss < input);
        let t = args.iter().position(|a| a == "-t").unwrap();
        assert_eq!(args[t + 1], "270.000");
        assert!(args.iter().any(|a| a == "-filter_complex"));
        assert_eq!(args.last().unwrap(), "pipe:1");
    }

    #[test]
    fn dummy_decoder_uses_lavfi_input() {
        let ctx = context();
        let mut node = dummy_node(&ctx.settings, 0.0, 0, 30.0);
        prepare_node(&ctx, &mut node, None, None);
        let args = &node.decoder_arguments;
        let lavfi = args.iter().position(|a| a == "lavfi").unwrap();
        assert_eq!(args[lavfi - 1], "-f");
        assert!(!args.iter().any(|a| a == "-ss"));
    }

    #[test]
    fn remote_source_is_escaped_not_stat_checked() {
        let args = {
            let ctx = context();
            let mut node = ClipNode {
                source: "https://example.org/live stream.m3u8".into(),
                in_point: 0.0,
                out_point: 60.0,
                intrinsic_duration: 60.0,
                probe_result: Some(ProbeResult {
                    duration: Some(60.0),
                    video: vec![VideoStream::default()],
                    audio: Vec::new(),
                    is_remote: true,
                }),
                ..Default::default()
            };
            prepare_node(&ctx, &mut node, None, None);
            node.decoder_arguments
        };
        let input = args.iter().position(|a| a == "-i").unwrap();
        assert!(args[input + 1].contains("%20"));
    }
}
