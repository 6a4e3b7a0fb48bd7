use std::path::PathBuf;

use clap::Parser;

use crate::config::OutputMode;

/// Command-line surface. Every flag here overrides the corresponding value
/// from the YAML configuration file for this run only.
#[derive(Parser, Debug, Default)]
#[command(name = "aircast", version, about = "24/7 broadcast playout engine")]
pub struct Args {
    /// Path to the runtime configuration file
    #[arg(short, long, default_value = "/etc/aircast/aircast.yml")]
    pub config: PathBuf,

    /// Play files from this folder instead of a playlist (implies folder mode)
    #[arg(short, long)]
    pub folder: Option<PathBuf>,

    /// Write logs to this file instead of the configured path
    #[arg(long)]
    pub log: Option<PathBuf>,

    /// Loop the playlist (or folder listing) forever
    #[arg(long = "loop")]
    pub loop_list: bool,

    /// Output mode for the encoder
    #[arg(short, long, value_enum)]
    pub output: Option<OutputMode>,

    /// Play this playlist file, ignoring the configured playlist root
    #[arg(short, long)]
    pub playlist: Option<PathBuf>,

    /// Override the scheduling day start, "HH:MM:SS" or "now"
    #[arg(short, long)]
    pub start: Option<String>,

    /// Override the target day length, "HH:MM:SS" or "none"
    #[arg(short = 't', long)]
    pub length: Option<String>,

    /// Force "playlist" or "folder" mode regardless of other flags
    #[arg(short = 'm', long)]
    pub play_mode: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_overrides() {
        let args = Args::parse_from([
            "aircast",
            "-c",
            "/tmp/conf.yml",
            "--loop",
            "-o",
            "stream",
            "-s",
            "06:00:00",
        ]);
        assert_eq!(args.config, PathBuf::from("/tmp/conf.yml"));
        assert!(args.loop_list);
        assert_eq!(args.output, Some(OutputMode::Stream));
        assert_eq!(args.start.as_deref(), Some("06:00:00"));
        assert!(args.folder.is_none());
    }

    #[test]
    fn folder_flag_is_optional() {
        let args = Args::parse_from(["aircast", "-f", "/media/clips"]);
        assert_eq!(args.folder, Some(PathBuf::from("/media/clips")));
    }
}
