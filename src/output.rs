use crate::config::{OutputMode, Settings};

pub fn ffmpeg_binary() -> String {
    std::env::var("AIRCAST_FFMPEG").unwrap_or_else(|_| "ffmpeg".to_string())
}

pub fn ffplay_binary() -> String {
    std::env::var("AIRCAST_FFPLAY").unwrap_or_else(|_| "ffplay".to_string())
}

/// Program and argument vector for the long-lived encoder. It reads the
/// decoders' MPEG-TS byte stream on stdin for the whole run; only decoders
/// churn per clip.
pub fn encoder_command(settings: &Settings) -> (String, Vec<String>) {
    let level = settings.logging.ffmpeg_level.clone();
    match settings.out.mode {
        OutputMode::Desktop => (
            ffplay_binary(),
            vec![
                "-hide_banner".into(),
                "-nostats".into(),
                "-v".into(),
                level,
                "-autoexit".into(),
                "-window_title".into(),
                "aircast".into(),
                "-i".into(),
                "pipe:0".into(),
            ],
        ),
        OutputMode::Stream | OutputMode::Hls => {
            let mut args = base_encoder_args(&level);
            args.extend(
                settings
                    .out
                    .output_param
                    .split_whitespace()
                    .map(str::to_string),
            );
            (ffmpeg_binary(), args)
        }
        OutputMode::Null => {
            let mut args = base_encoder_args(&level);
            args.extend(["-c".into(), "copy".into(), "-f".into(), "null".into(), "-".into()]);
            (ffmpeg_binary(), args)
        }
    }
}

fn base_encoder_args(level: &str) -> Vec<String> {
    vec![
        "-hide_banner".into(),
        "-nostats".into(),
        "-v".into(),
        level.to_string(),
        "-re".into(),
        "-i".into(),
        "pipe:0".into(),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn desktop_mode_uses_player() {
        let settings = Settings::default();
        let (program, args) = encoder_command(&settings);
        assert!(program.ends_with("ffplay"));
        assert!(args.contains(&"-autoexit".to_string()));
        assert_eq!(args.last().unwrap(), "pipe:0");
    }

    #[test]
    fn stream_mode_appends_output_params() {
        let mut settings = Settings::default();
        settings.out.mode = OutputMode::Stream;
        settings.out.output_param = "-c:v libx264 -f flv rtmp://example/live".into();
        let (program, args) = encoder_command(&settings);
        assert!(program.ends_with("ffmpeg"));
        assert!(args.contains(&"-re".to_string()));
        assert_eq!(args.last().unwrap(), "rtmp://example/live");
        let pipe = args.iter().position(|a| a == "pipe:0").unwrap();
        let codec = args.iter().position(|a| a == "-c:v").unwrap();
        assert!(pipe < codec);
    }

    #[test]
    fn null_mode_discards_output() {
        let mut settings = Settings::default();
        settings.out.mode = OutputMode::Null;
        let (_, args) = encoder_command(&settings);
        assert_eq!(args.last().unwrap(), "-");
        assert!(args.windows(2).any(|w| w[0] == "-f" && w[1] == "null"));
    }
}
