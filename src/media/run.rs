use std::{
    collections::VecDeque,
    path::Path,
    process::Stdio,
    sync::OnceLock,
};

use regex::Regex;
use thiserror::Error;
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    process::Command,
};
use tracing::{debug, info};

use crate::media::{
    encode::{apply_audio, encoder_for},
    params::{Container, EncodeParams},
};

/// How much of the child's diagnostic stream is surfaced on failure.
const ERROR_TAIL_LINES: usize = 50;

#[derive(Error, Debug)]
pub enum RunError {
    #[error("encoder exited with a non-zero status")]
    Failed { tail: String },
    #[error("failed to launch encoder: {0}")]
    Io(#[from] std::io::Error),
}

/// Run the full transcode for one session. Gif goes through the palette
/// two-pass pipeline; everything else is a single invocation.
pub async fn run_transcode<F>(
    ffmpeg_bin: &str,
    input: &Path,
    output: &Path,
    palette: &Path,
    params: &EncodeParams,
    on_progress: F,
) -> Result<(), RunError>
where
    F: Fn(f64) + Send + Sync,
{
    match params.container {
        Container::Gif => {
            let cb = &on_progress;
            let pass1 = build_palette_pass(ffmpeg_bin, input, palette, params);
            execute(pass1, params.duration_secs, |p| cb(p * 0.5)).await?;
            let pass2 = build_render_pass(ffmpeg_bin, input, palette, output, params);
            execute(pass2, params.duration_secs, |p| cb(0.5 + p * 0.5)).await?;
        }
        _ => {
            let ff = build_single_pass(ffmpeg_bin, input, output, params);
            execute(ff, params.duration_secs, on_progress).await?;
        }
    }
    info!(output = %output.display(), "transcode finished");
    Ok(())
}

/// Common head of every invocation: overwrite, optional trim window, input.
fn base_command(ffmpeg_bin: &str, input: &Path, params: &EncodeParams) -> Command {
    let mut ff = Command::new(ffmpeg_bin);
    ff.arg("-hide_banner").arg("-y");
    if let Some(start) = params.trim_start {
        ff.arg("-ss").arg(start.to_string());
    }
    if let Some(end) = params.trim_end {
        ff.arg("-to").arg(end.to_string());
    }
    ff.arg("-i").arg(input);
    ff
}

pub(crate) fn build_single_pass(
    ffmpeg_bin: &str,
    input: &Path,
    output: &Path,
    params: &EncodeParams,
) -> Command {
    let mut ff = base_command(ffmpeg_bin, input, params);
    ff.arg("-vf").arg(params.filter_chain());
    if let Some(encoder) = encoder_for(params.container) {
        encoder.apply(params, &mut ff);
    }
    apply_audio(params, &mut ff);
    ff.arg("-threads").arg("0");
    ff.arg(output);
    ff
}

pub(crate) fn build_palette_pass(
    ffmpeg_bin: &str,
    input: &Path,
    palette: &Path,
    params: &EncodeParams,
) -> Command {
    let mut ff = base_command(ffmpeg_bin, input, params);
    ff.arg("-vf").arg(format!("{},palettegen", params.filter_chain()));
    ff.arg(palette);
    ff
}

pub(crate) fn build_render_pass(
    ffmpeg_bin: &str,
    input: &Path,
    palette: &Path,
    output: &Path,
    params: &EncodeParams,
) -> Command {
    let mut ff = base_command(ffmpeg_bin, input, params);
    ff.arg("-i").arg(palette);
    ff.arg("-filter_complex")
        .arg(format!("{}[v];[v][1:v]paletteuse", params.filter_chain()));
    ff.arg("-an");
    ff.arg(output);
    ff
}

/// Execute one invocation. With a known duration the child's stderr is
/// tailed incrementally and `time=` stamps are turned into a fraction of
/// the target duration; otherwise the output is captured whole and only
/// inspected on failure.
async fn execute<F>(mut ff: Command, total_duration: f64, on_progress: F) -> Result<(), RunError>
where
    F: Fn(f64) + Send + Sync,
{
    debug!(args = ?ff.as_std().get_args().collect::<Vec<_>>(), "running ffmpeg");

    if total_duration <= 0.0 {
        let output = ff.output().await?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(RunError::Failed {
                tail: last_lines(&stderr, ERROR_TAIL_LINES),
            });
        }
        return Ok(());
    }

    ff.stdout(Stdio::null()).stderr(Stdio::piped());
    let mut child = ff.spawn()?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| std::io::Error::other("missing piped stderr"))?;

    // ffmpeg terminates its stats updates with \r, not \n; ordinary log
    // lines use \n. Split on \r and break up any embedded newlines.
    let mut tail: VecDeque<String> = VecDeque::with_capacity(ERROR_TAIL_LINES);
    let mut segments = BufReader::new(stderr).split(b'\r');
    while let Some(segment) = segments.next_segment().await? {
        let text = String::from_utf8_lossy(&segment);
        for line in text.split('\n').filter(|l| !l.trim().is_empty()) {
            if tail.len() == ERROR_TAIL_LINES {
                tail.pop_front();
            }
            tail.push_back(line.to_owned());
        }
        if let Some(elapsed) = parse_time(&text) {
            on_progress((elapsed / total_duration).min(1.0));
        }
    }

    let status = child.wait().await?;
    if !status.success() {
        debug!(code = ?status.code(), "ffmpeg failed");
        return Err(RunError::Failed {
            tail: tail.into_iter().collect::<Vec<_>>().join("\n"),
        });
    }
    Ok(())
}

/// Extract the elapsed encode time from an ffmpeg stats line.
pub(crate) fn parse_time(line: &str) -> Option<f64> {
    static TIME_RE: OnceLock<Regex> = OnceLock::new();
    let re = TIME_RE.get_or_init(|| {
        Regex::new(r"time=(\d+):(\d+):(\d+\.\d+)").expect("time pattern is valid")
    });
    let caps = re.captures(line)?;
    let hours: f64 = caps[1].parse().ok()?;
    let minutes: f64 = caps[2].parse().ok()?;
    let seconds: f64 = caps[3].parse().ok()?;
    Some(hours * 3600.0 + minutes * 60.0 + seconds)
}

fn last_lines(text: &str, n: usize) -> String {
    let lines: Vec<&str> = text.lines().filter(|l| !l.trim().is_empty()).collect();
    let start = lines.len().saturating_sub(n);
    lines[start..].join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::params::{resolve, CompressSettings, Container};
    use std::path::PathBuf;

    fn args_of(ff: &Command) -> Vec<String> {
        ff.as_std()
            .get_args()
            .map(|a| a.to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn time_stamp_parsing() {
        let line = "frame= 1234 fps= 45 q=28.0 size=  1024kB time=00:01:23.45 bitrate= 820.5kbits/s speed=1.5x";
        assert_eq!(parse_time(line), Some(83.45));
        assert_eq!(parse_time("time=01:00:00.00"), Some(3600.0));
        assert_eq!(parse_time("no progress here"), None);
        assert_eq!(parse_time("time=N/A"), None);
    }

    #[test]
    fn tail_is_bounded() {
        let text = (0..120).map(|i| format!("line {}\n", i)).collect::<String>();
        let tail = last_lines(&text, 50);
        assert_eq!(tail.lines().count(), 50);
        assert!(tail.starts_with("line 70"));
        assert!(tail.ends_with("line 119"));
    }

    #[test]
    fn single_pass_command_shape() {
        let mut settings = CompressSettings::default();
        settings.trim_start = Some(5.0);
        settings.trim_end = Some(20.0);
        let params = resolve(&settings, None);
        let ff = build_single_pass(
            "ffmpeg",
            &PathBuf::from("in.mp4"),
            &PathBuf::from("out.mp4"),
            &params,
        );
        let args = args_of(&ff);
        let ss = args.iter().position(|a| a == "-ss").unwrap();
        let input = args.iter().position(|a| a == "-i").unwrap();
        assert!(ss < input, "trim options are input options");
        assert_eq!(args[ss + 1], "5");
        assert!(args.contains(&"-vf".to_owned()));
        assert_eq!(args.last().unwrap(), "out.mp4");
    }

    #[test]
    fn gif_two_pass_commands() {
        let settings = CompressSettings {
            container: Some(Container::Gif),
            ..Default::default()
        };
        let params = resolve(&settings, None);
        let input = PathBuf::from("in.mp4");
        let palette = PathBuf::from("palette.png");
        let output = PathBuf::from("out.gif");

        let pass1 = args_of(&build_palette_pass("ffmpeg", &input, &palette, &params));
        assert!(pass1.iter().any(|a| a.ends_with(",palettegen")));
        assert_eq!(pass1.last().unwrap(), "palette.png");

        let pass2 = args_of(&build_render_pass("ffmpeg", &input, &palette, &output, &params));
        assert_eq!(pass2.iter().filter(|a| *a == "-i").count(), 2);
        assert!(pass2
            .iter()
            .any(|a| a.ends_with("[v];[v][1:v]paletteuse")));
        assert!(pass2.contains(&"-an".to_owned()));
        assert_eq!(pass2.last().unwrap(), "out.gif");
    }
}
