use tokio::process::Command;

use crate::media::params::{
    Container, EncodeParams, AUDIO_BITRATE_KBPS, AUDIO_CHANNELS, AUDIO_CODEC,
};

/// BT.709 calibration applied to every video output. Keeps colors stable
/// across players that guess the matrix from resolution.
pub const COLOR_PROFILE: &[(&str, &str)] = &[
    ("-pix_fmt", "yuv420p"),
    ("-colorspace", "bt709"),
    ("-color_primaries", "bt709"),
    ("-color_trc", "bt709"),
    ("-color_range", "tv"),
];

/// Appends codec-specific encoder arguments to an ffmpeg invocation.
pub trait Encoder {
    fn apply(&self, params: &EncodeParams, ff: &mut Command);
}

pub struct H264;

impl Encoder for H264 {
    fn apply(&self, params: &EncodeParams, ff: &mut Command) {
        ff.arg("-c:v").arg("libx264");

        // An explicit size target switches to bitrate mode; otherwise
        // constant quality.
        if let Some(kbps) = params.target_video_kbps {
            let rate = format!("{}k", kbps);
            ff.arg("-b:v").arg(&rate).arg("-maxrate").arg(&rate);
            ff.arg("-bufsize").arg(format!("{}k", kbps * 2));
        } else {
            ff.arg("-crf").arg(params.crf.to_string());
            if let Some(cap) = &params.max_bitrate {
                ff.arg("-maxrate").arg(cap).arg("-bufsize").arg(cap);
            }
        }

        ff.arg("-preset").arg(params.speed.as_str());
        ff.arg("-profile:v").arg("high");
        ff.arg("-tune").arg("film");
        ff.arg("-movflags").arg("+faststart");
        for (key, value) in COLOR_PROFILE {
            ff.arg(key).arg(value);
        }
    }
}

pub struct Vp9;

impl Encoder for Vp9 {
    fn apply(&self, params: &EncodeParams, ff: &mut Command) {
        ff.arg("-c:v").arg("libvpx-vp9");

        if let Some(kbps) = params.target_video_kbps {
            ff.arg("-b:v").arg(format!("{}k", kbps));
        } else {
            // -b:v 0 puts libvpx in constant-quality mode.
            ff.arg("-crf").arg(params.crf.to_string());
            ff.arg("-b:v").arg("0");
            if let Some(cap) = &params.max_bitrate {
                ff.arg("-maxrate").arg(cap).arg("-bufsize").arg(cap);
            }
        }

        ff.arg("-row-mt").arg("1");
        for (key, value) in COLOR_PROFILE {
            ff.arg(key).arg(value);
        }
    }
}

/// Gif has no single-pass encoder; it goes through the palette pipeline in
/// `run`, so only mp4 and webm resolve here.
pub fn encoder_for(container: Container) -> Option<Box<dyn Encoder + Send + Sync>> {
    match container {
        Container::Mp4 => Some(Box::new(H264)),
        Container::Webm => Some(Box::new(Vp9)),
        Container::Gif => None,
    }
}

/// Audio track arguments for the chosen container.
pub fn apply_audio(params: &EncodeParams, ff: &mut Command) {
    if params.mute || params.container == Container::Gif {
        ff.arg("-an");
        return;
    }
    let codec = match params.container {
        Container::Webm => "libopus",
        _ => AUDIO_CODEC,
    };
    ff.arg("-c:a").arg(codec);
    ff.arg("-b:a").arg(format!("{}k", AUDIO_BITRATE_KBPS));
    ff.arg("-ac").arg(AUDIO_CHANNELS.to_string());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::params::{resolve, CompressSettings};

    fn args_of(ff: &Command) -> Vec<String> {
        ff.as_std()
            .get_args()
            .map(|a| a.to_string_lossy().into_owned())
            .collect()
    }

    fn has_pair(args: &[String], key: &str, value: &str) -> bool {
        args.windows(2).any(|w| w[0] == key && w[1] == value)
    }

    #[test]
    fn h264_constant_quality_args() {
        let params = resolve(&CompressSettings::default(), None);
        let mut ff = Command::new("ffmpeg");
        H264.apply(&params, &mut ff);
        let args = args_of(&ff);
        assert!(has_pair(&args, "-c:v", "libx264"));
        assert!(has_pair(&args, "-crf", "28"));
        assert!(has_pair(&args, "-preset", "medium"));
        assert!(has_pair(&args, "-profile:v", "high"));
        assert!(has_pair(&args, "-movflags", "+faststart"));
        assert!(has_pair(&args, "-pix_fmt", "yuv420p"));
        assert!(has_pair(&args, "-colorspace", "bt709"));
        assert!(!args.contains(&"-b:v".to_owned()));
    }

    #[test]
    fn h264_bitrate_mode_replaces_crf() {
        let mut params = resolve(&CompressSettings::default(), None);
        params.target_video_kbps = Some(1302);
        let mut ff = Command::new("ffmpeg");
        H264.apply(&params, &mut ff);
        let args = args_of(&ff);
        assert!(has_pair(&args, "-b:v", "1302k"));
        assert!(has_pair(&args, "-maxrate", "1302k"));
        assert!(has_pair(&args, "-bufsize", "2604k"));
        assert!(!args.contains(&"-crf".to_owned()));
    }

    #[test]
    fn h264_preset_bitrate_ceiling() {
        let settings = CompressSettings {
            preset: Some("WhatsApp".to_owned()),
            ..Default::default()
        };
        let params = resolve(&settings, None);
        let mut ff = Command::new("ffmpeg");
        H264.apply(&params, &mut ff);
        let args = args_of(&ff);
        assert!(has_pair(&args, "-maxrate", "2M"));
        assert!(has_pair(&args, "-bufsize", "2M"));
    }

    #[test]
    fn vp9_constant_quality_args() {
        let params = resolve(&CompressSettings::default(), None);
        let mut ff = Command::new("ffmpeg");
        Vp9.apply(&params, &mut ff);
        let args = args_of(&ff);
        assert!(has_pair(&args, "-c:v", "libvpx-vp9"));
        assert!(has_pair(&args, "-b:v", "0"));
    }

    #[test]
    fn audio_args_by_container() {
        let mut params = resolve(&CompressSettings::default(), None);

        let mut ff = Command::new("ffmpeg");
        apply_audio(&params, &mut ff);
        let args = args_of(&ff);
        assert!(has_pair(&args, "-c:a", "aac"));
        assert!(has_pair(&args, "-b:a", "96k"));
        assert!(has_pair(&args, "-ac", "2"));

        params.mute = true;
        let mut ff = Command::new("ffmpeg");
        apply_audio(&params, &mut ff);
        assert_eq!(args_of(&ff), vec!["-an"]);

        params.mute = false;
        params.container = Container::Webm;
        let mut ff = Command::new("ffmpeg");
        apply_audio(&params, &mut ff);
        assert!(has_pair(&args_of(&ff), "-c:a", "libopus"));

        params.container = Container::Gif;
        let mut ff = Command::new("ffmpeg");
        apply_audio(&params, &mut ff);
        assert_eq!(args_of(&ff), vec!["-an"]);
    }

    #[test]
    fn gif_has_no_single_pass_encoder() {
        assert!(encoder_for(Container::Mp4).is_some());
        assert!(encoder_for(Container::Webm).is_some());
        assert!(encoder_for(Container::Gif).is_none());
    }
}
