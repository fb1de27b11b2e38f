use serde::{Deserialize, Serialize};

use crate::media::probe::MediaInfo;

/// Container extensions accepted on the upload surface.
pub const SUPPORTED_FORMATS: [&str; 5] = ["mp4", "mov", "mkv", "avi", "webm"];

/// Audio track settings applied whenever the source audio is kept.
pub const AUDIO_CODEC: &str = "aac";
pub const AUDIO_BITRATE_KBPS: u32 = 96;
pub const AUDIO_CHANNELS: u32 = 2;

/// Anything below this is not worth encoding at any resolution.
const MIN_VIDEO_KBPS: u32 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResolutionTier {
    #[serde(rename = "original")]
    Original,
    #[serde(rename = "1080p")]
    P1080,
    #[serde(rename = "720p")]
    P720,
    #[serde(rename = "480p")]
    P480,
    #[serde(rename = "360p")]
    P360,
}

impl ResolutionTier {
    pub fn target_height(self) -> Option<u32> {
        match self {
            Self::Original => None,
            Self::P1080 => Some(1080),
            Self::P720 => Some(720),
            Self::P480 => Some(480),
            Self::P360 => Some(360),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Speed {
    Ultrafast,
    Fast,
    Medium,
    Slow,
    Veryslow,
}

impl Speed {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ultrafast => "ultrafast",
            Self::Fast => "fast",
            Self::Medium => "medium",
            Self::Slow => "slow",
            Self::Veryslow => "veryslow",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AspectRatio {
    #[serde(rename = "16:9")]
    Wide,
    #[serde(rename = "9:16")]
    Tall,
    #[serde(rename = "1:1")]
    Square,
    #[serde(rename = "4:3")]
    Classic,
}

impl AspectRatio {
    /// The ratio as an ffmpeg expression fragment.
    fn ratio_expr(self) -> &'static str {
        match self {
            Self::Wide => "16/9",
            Self::Tall => "9/16",
            Self::Square => "1",
            Self::Classic => "4/3",
        }
    }

    /// Centered crop of whichever axis overshoots the target ratio.
    pub fn crop_expr(self) -> String {
        let r = self.ratio_expr();
        format!("crop=if(gt(iw/ih,{r}),ih*{r},iw):if(gt(iw/ih,{r}),ih,iw/({r}))")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Container {
    Mp4,
    Webm,
    Gif,
}

impl Container {
    pub fn ext(self) -> &'static str {
        match self {
            Self::Mp4 => "mp4",
            Self::Webm => "webm",
            Self::Gif => "gif",
        }
    }

    pub fn mime(self) -> &'static str {
        match self {
            Self::Mp4 => "video/mp4",
            Self::Webm => "video/webm",
            Self::Gif => "image/gif",
        }
    }
}

/// A platform target with its fixed encoding parameters.
#[derive(Debug, Clone, Serialize)]
pub struct Preset {
    pub name: &'static str,
    pub crf: u8,
    pub speed: Speed,
    pub resolution: ResolutionTier,
    pub max_bitrate: Option<&'static str>,
    pub fps: Option<u32>,
    pub aspect: Option<AspectRatio>,
    pub description: &'static str,
}

pub static PLATFORM_PRESETS: &[Preset] = &[
    Preset {
        name: "Custom",
        crf: 28,
        speed: Speed::Medium,
        resolution: ResolutionTier::P720,
        max_bitrate: None,
        fps: None,
        aspect: None,
        description: "Set every parameter manually.",
    },
    Preset {
        name: "WhatsApp",
        crf: 28,
        speed: Speed::Medium,
        resolution: ResolutionTier::P720,
        max_bitrate: Some("2M"),
        fps: Some(30),
        aspect: None,
        description: "Optimized for sending over WhatsApp.",
    },
    Preset {
        name: "Instagram Feed",
        crf: 23,
        speed: Speed::Slow,
        resolution: ResolutionTier::P1080,
        max_bitrate: Some("3.5M"),
        fps: Some(30),
        aspect: Some(AspectRatio::Square),
        description: "Square format for the Instagram feed.",
    },
    Preset {
        name: "Instagram Story",
        crf: 23,
        speed: Speed::Slow,
        resolution: ResolutionTier::P1080,
        max_bitrate: Some("4M"),
        fps: Some(30),
        aspect: Some(AspectRatio::Tall),
        description: "Vertical format for Stories and Reels.",
    },
    Preset {
        name: "Telegram",
        crf: 26,
        speed: Speed::Medium,
        resolution: ResolutionTier::P720,
        max_bitrate: None,
        fps: None,
        aspect: None,
        description: "Balanced size and quality for Telegram.",
    },
    Preset {
        name: "Email",
        crf: 32,
        speed: Speed::Slow,
        resolution: ResolutionTier::P480,
        max_bitrate: Some("1M"),
        fps: Some(24),
        aspect: None,
        description: "Minimal file size for mail attachments.",
    },
];

pub fn find_preset(name: &str) -> Option<&'static Preset> {
    PLATFORM_PRESETS.iter().find(|p| p.name == name)
}

/// Settings as submitted by the form. Everything optional; preset values
/// fill the gaps, and non-Custom presets lock their own fields.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CompressSettings {
    pub preset: Option<String>,
    pub crf: Option<u8>,
    pub speed: Option<Speed>,
    pub resolution: Option<ResolutionTier>,
    pub fps: Option<u32>,
    pub aspect: Option<AspectRatio>,
    pub mute: Option<bool>,
    pub trim_start: Option<f64>,
    pub trim_end: Option<f64>,
    pub container: Option<Container>,
    pub target_size_mb: Option<f64>,
}

/// Fully resolved encode parameters. Deterministic given settings + probe.
#[derive(Debug, Clone, PartialEq)]
pub struct EncodeParams {
    pub crf: u8,
    pub speed: Speed,
    pub resolution: ResolutionTier,
    pub fps: Option<u32>,
    pub aspect: Option<AspectRatio>,
    pub mute: bool,
    pub trim_start: Option<f64>,
    pub trim_end: Option<f64>,
    pub max_bitrate: Option<String>,
    pub target_video_kbps: Option<u32>,
    pub container: Container,
    /// Duration of the segment actually encoded, for progress reporting.
    /// Zero when unknown; progress streaming is disabled in that case.
    pub duration_secs: f64,
}

pub fn resolve(settings: &CompressSettings, probe: Option<&MediaInfo>) -> EncodeParams {
    let preset = settings
        .preset
        .as_deref()
        .and_then(find_preset)
        .unwrap_or(&PLATFORM_PRESETS[0]);
    let is_custom = preset.name == "Custom";

    // Platform presets pin quality, speed, resolution, fps, aspect and
    // bitrate ceiling; only Custom honors the form's values for those.
    let (crf, speed, resolution, fps, aspect, max_bitrate) = if is_custom {
        (
            settings.crf.unwrap_or(preset.crf).clamp(18, 36),
            settings.speed.unwrap_or(preset.speed),
            settings.resolution.unwrap_or(preset.resolution),
            settings.fps,
            settings.aspect,
            None,
        )
    } else {
        (
            preset.crf,
            preset.speed,
            preset.resolution,
            preset.fps,
            preset.aspect,
            preset.max_bitrate.map(str::to_owned),
        )
    };

    let trim_start = settings.trim_start.filter(|&s| s > 0.0);
    let trim_end = settings.trim_end.filter(|&e| e > 0.0);
    let mute = settings.mute.unwrap_or(false);

    let source_duration = probe.map(|m| m.duration_secs).unwrap_or(0.0);
    let duration_secs = effective_duration(source_duration, trim_start, trim_end);

    let container = settings.container.unwrap_or(Container::Mp4);
    // Full-rate gif output balloons; cap at 15 unless asked otherwise.
    let fps = match (container, fps) {
        (Container::Gif, None) => Some(15),
        (_, fps) => fps,
    };

    let target_video_kbps = settings.target_size_mb.filter(|&mb| mb > 0.0).and_then(|mb| {
        // Only charge the audio track against the budget when the output
        // will actually carry one. Unknown sources assume audio.
        let has_audio = probe.map_or(true, |m| m.has_audio);
        let audio_kbps = if mute || !has_audio { 0 } else { AUDIO_BITRATE_KBPS };
        target_video_kbps(mb, duration_secs, audio_kbps)
    });

    EncodeParams {
        crf,
        speed,
        resolution,
        fps,
        aspect,
        mute,
        trim_start,
        trim_end,
        max_bitrate,
        target_video_kbps,
        container,
        duration_secs,
    }
}

/// Length of the segment the encoder will actually process.
pub fn effective_duration(total: f64, trim_start: Option<f64>, trim_end: Option<f64>) -> f64 {
    if trim_start.is_none() && trim_end.is_none() {
        return total.max(0.0);
    }
    let start = trim_start.unwrap_or(0.0);
    let end = trim_end.unwrap_or(total);
    (end - start).max(0.0)
}

/// Back-calculate a video bitrate that lands the output near the requested
/// size once the audio track is paid for. `None` when the budget does not
/// leave room for video at all, otherwise clamped to a usable floor.
pub fn target_video_kbps(target_size_mb: f64, duration_secs: f64, audio_kbps: u32) -> Option<u32> {
    if duration_secs <= 0.0 {
        return None;
    }
    let total_bits = target_size_mb * 8.0 * 1024.0 * 1024.0;
    let audio_bits = audio_kbps as f64 * 1000.0 * duration_secs;
    let kbps = (total_bits - audio_bits) / duration_secs / 1000.0;
    if kbps <= 0.0 {
        return None;
    }
    Some((kbps as u32).max(MIN_VIDEO_KBPS))
}

impl EncodeParams {
    /// The `-vf` filter chain: tier scale, optional centered crop with an
    /// even-rounding rescale after it, optional fps resample. Mirrors the
    /// graph the presets were tuned against.
    pub fn filter_chain(&self) -> String {
        let mut filters = Vec::new();

        match self.resolution.target_height() {
            Some(h) => filters.push(format!("scale=trunc(oh*a/2)*2:{}", h)),
            None => filters.push("scale=trunc(iw/2)*2:trunc(ih/2)*2".to_owned()),
        }

        if let Some(aspect) = self.aspect {
            filters.push(aspect.crop_expr());
            filters.push("scale=trunc(iw/2)*2:trunc(ih/2)*2".to_owned());
        }

        if let Some(fps) = self.fps {
            filters.push(format!("fps={}", fps));
        }

        filters.join(",")
    }
}
