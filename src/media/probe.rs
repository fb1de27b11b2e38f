use std::path::Path;

use serde::{Deserialize, Serialize};
use tokio::process::Command;
use tracing::debug;

use crate::media::format::format_duration;

/// Output of `ffprobe -v error -print_format json -show_format -show_streams`.
#[derive(Deserialize)]
struct FfProbeOutput {
    format: Option<FormatSection>,
    streams: Option<Vec<Stream>>,
}

#[derive(Deserialize)]
struct FormatSection {
    duration: Option<String>,
    bit_rate: Option<String>,
}

#[derive(Deserialize)]
struct Stream {
    codec_type: Option<String>,
    codec_name: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    r_frame_rate: Option<String>,
    bit_rate: Option<String>,
}

/// Best-effort structured metadata for one media file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaInfo {
    pub duration_secs: f64,
    pub duration_text: String,
    pub bitrate_bps: u64,
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    pub video_codec: String,
    pub has_audio: bool,
    pub audio_codec: Option<String>,
    pub audio_bitrate_kbps: u32,
}

/// Probe a file with ffprobe. Never fails past this boundary: any spawn,
/// exit or parse problem comes back as `None`.
pub async fn probe(ffprobe_bin: &str, path: &Path) -> Option<MediaInfo> {
    let output = Command::new(ffprobe_bin)
        .args(["-v", "error", "-print_format", "json", "-show_format", "-show_streams"])
        .arg(path)
        .output()
        .await
        .ok()?;

    if !output.status.success() {
        debug!(path = %path.display(), code = ?output.status.code(), "ffprobe failed");
        return None;
    }

    let parsed: FfProbeOutput = serde_json::from_slice(&output.stdout).ok()?;
    Some(from_probe_output(parsed))
}

fn from_probe_output(parsed: FfProbeOutput) -> MediaInfo {
    let streams = parsed.streams.unwrap_or_default();
    let video = streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("video"));
    let audio = streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("audio"));

    let duration_secs = parsed
        .format
        .as_ref()
        .and_then(|f| f.duration.as_deref())
        .and_then(|d| d.parse().ok())
        .unwrap_or(0.0);
    let bitrate_bps = parsed
        .format
        .as_ref()
        .and_then(|f| f.bit_rate.as_deref())
        .and_then(|b| b.parse().ok())
        .unwrap_or(0);

    MediaInfo {
        duration_secs,
        duration_text: format_duration(duration_secs),
        bitrate_bps,
        width: video.and_then(|s| s.width).unwrap_or(0),
        height: video.and_then(|s| s.height).unwrap_or(0),
        fps: video
            .and_then(|s| s.r_frame_rate.as_deref())
            .map(parse_frame_rate)
            .unwrap_or(0.0),
        video_codec: video
            .and_then(|s| s.codec_name.as_deref())
            .unwrap_or("unknown")
            .to_uppercase(),
        has_audio: audio.is_some(),
        audio_codec: audio
            .and_then(|s| s.codec_name.as_deref())
            .map(str::to_uppercase),
        audio_bitrate_kbps: audio
            .and_then(|s| s.bit_rate.as_deref())
            .and_then(|b| b.parse::<u64>().ok())
            .map(|b| (b / 1000) as u32)
            .unwrap_or(0),
    }
}

/// ffprobe reports frame rates as a fraction like "30000/1001".
fn parse_frame_rate(raw: &str) -> f64 {
    match raw.split_once('/') {
        Some((num, den)) => {
            let num: f64 = num.parse().unwrap_or(0.0);
            let den: f64 = den.parse().unwrap_or(0.0);
            if den > 0.0 {
                (num / den * 10.0).round() / 10.0
            } else {
                0.0
            }
        }
        None => raw.parse().unwrap_or(0.0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_rate_fractions() {
        assert_eq!(parse_frame_rate("30/1"), 30.0);
        assert_eq!(parse_frame_rate("30000/1001"), 30.0);
        assert_eq!(parse_frame_rate("24000/1001"), 24.0);
        assert_eq!(parse_frame_rate("0/0"), 0.0);
        assert_eq!(parse_frame_rate("garbage"), 0.0);
    }

    #[test]
    fn probe_output_mapping() {
        let raw = r#"{
            "format": {"duration": "63.500000", "bit_rate": "2500000"},
            "streams": [
                {"codec_type": "video", "codec_name": "h264", "width": 1920,
                 "height": 1080, "r_frame_rate": "30000/1001"},
                {"codec_type": "audio", "codec_name": "aac", "bit_rate": "128000"}
            ]
        }"#;
        let parsed: FfProbeOutput = serde_json::from_str(raw).unwrap();
        let info = from_probe_output(parsed);
        assert_eq!(info.duration_secs, 63.5);
        assert_eq!(info.duration_text, "01:03");
        assert_eq!(info.bitrate_bps, 2_500_000);
        assert_eq!((info.width, info.height), (1920, 1080));
        assert_eq!(info.video_codec, "H264");
        assert!(info.has_audio);
        assert_eq!(info.audio_codec.as_deref(), Some("AAC"));
        assert_eq!(info.audio_bitrate_kbps, 128);
    }

    #[test]
    fn probe_output_video_only() {
        let raw = r#"{
            "format": {"duration": "10.0"},
            "streams": [{"codec_type": "video", "codec_name": "vp9",
                         "width": 640, "height": 360, "r_frame_rate": "24/1"}]
        }"#;
        let parsed: FfProbeOutput = serde_json::from_str(raw).unwrap();
        let info = from_probe_output(parsed);
        assert!(!info.has_audio);
        assert_eq!(info.audio_bitrate_kbps, 0);
        assert_eq!(info.bitrate_bps, 0);
        assert_eq!(info.fps, 24.0);
    }
}
