//! Reverse-transcode job runner.
//!
//! One job wraps one ffmpeg invocation over one input file: video frames and
//! audio samples reversed, mp4 output. Progress is parsed from the engine's
//! `-progress` key/value stream and reported through a caller-supplied
//! callback; the numbers are advisory only and drive no control decisions.

use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::LazyLock;

use anyhow::{Context, Result, anyhow};
use log::{info, warn};
use regex::Regex;

static REGEX_OUT_TIME_US: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"out_time_us=(\d+)").unwrap());

const FFMPEG_PROGRESS_PIPE: &str = "pipe:2";

/// Keys ffmpeg emits on the progress pipe; everything else on stderr is an
/// error worth keeping.
const PROGRESS_KEYS: &'static [&'static str] = &[
    "frame=",
    "fps=",
    "stream_0",
    "bitrate=",
    "total_size=",
    "out_time",
    "dup_frames=",
    "drop_frames=",
    "speed=",
    "progress=",
];

const ERROR_TAIL_LINES: usize = 8;

/// One request-scoped transcode of `input` into its time-reversed `output`.
/// The output path is allocated by the caller before the job starts, so the
/// failure path knows what to clean up.
pub struct ReverseJob {
    input: PathBuf,
    output: PathBuf,
}

impl ReverseJob {
    pub fn new(input: impl Into<PathBuf>, output: impl Into<PathBuf>) -> Self {
        Self {
            input: input.into(),
            output: output.into(),
        }
    }

    /// Blocks until ffmpeg exits. On success the output file is valid and
    /// readable; on failure any partial output is the caller's to remove,
    /// along with the input.
    pub fn run(self, mut on_progress: impl FnMut(f64)) -> Result<()> {
        let total_duration = match probe_duration(&self.input) {
            Ok(secs) if secs > 0.0 => Some(secs),
            Ok(_) => None,
            Err(err) => {
                warn!("Could not probe duration of {:?}: {:#}", self.input, err);
                None
            }
        };
        reverse_with_ffmpeg(&self.input, &self.output, total_duration, &mut on_progress)
    }
}

/// Argument layout for one reverse invocation. Split out so the command line
/// is testable without spawning anything.
pub fn reverse_args(input: &Path, output: &Path) -> Vec<String> {
    vec![
        "-y".to_string(),
        "-i".to_string(),
        input.to_string_lossy().into_owned(),
        "-vf".to_string(),
        "reverse".to_string(),
        "-af".to_string(),
        "areverse".to_string(),
        "-movflags".to_string(),
        "faststart".to_string(),
        "-progress".to_string(),
        FFMPEG_PROGRESS_PIPE.to_string(),
        output.to_string_lossy().into_owned(),
    ]
}

fn reverse_with_ffmpeg(
    input: &Path,
    output: &Path,
    total_duration: Option<f64>,
    on_progress: &mut impl FnMut(f64),
) -> Result<()> {
    let args = reverse_args(input, output);
    info!("FFmpeg command: ffmpeg {}", args.join(" "));

    let mut cmd = create_quiet_ffmpeg_command();
    cmd.args(&args);

    let mut child = cmd
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .spawn()
        .context("failed to spawn ffmpeg")?;

    let mut error_tail = Vec::new();
    if let Some(stderr) = child.stderr.take() {
        monitor_progress(
            BufReader::new(stderr),
            total_duration,
            &mut error_tail,
            on_progress,
        );
    }

    let status = child.wait().context("failed to wait for ffmpeg")?;
    if !status.success() {
        let code = status
            .code()
            .map(|code| code.to_string())
            .unwrap_or_else(|| "signal".to_string());
        return Err(anyhow!(
            "ffmpeg exited with status {}: {}",
            code,
            error_tail.join(" | ")
        ));
    }
    Ok(())
}

/// Reads the engine's stderr to completion, turning `out_time_us` lines into
/// progress callbacks and retaining the last few non-progress lines for the
/// failure message.
fn monitor_progress<R: BufRead>(
    reader: R,
    total_duration: Option<f64>,
    error_tail: &mut Vec<String>,
    on_progress: &mut impl FnMut(f64),
) {
    for line in reader.lines().filter_map(Result::ok) {
        if let Some(caps) = REGEX_OUT_TIME_US.captures(&line) {
            if let (Some(total), Ok(microseconds)) = (total_duration, caps[1].parse::<f64>()) {
                on_progress(percent_complete(microseconds, total));
            }
            continue;
        }
        if is_progress_noise(&line) {
            continue;
        }
        if error_tail.len() == ERROR_TAIL_LINES {
            error_tail.remove(0);
        }
        error_tail.push(line);
    }
}

fn is_progress_noise(line: &str) -> bool {
    let line = line.trim_start();
    line.is_empty() || PROGRESS_KEYS.iter().any(|key| line.starts_with(key))
}

fn percent_complete(out_time_us: f64, total_duration_secs: f64) -> f64 {
    (out_time_us / 1_000_000.0 / total_duration_secs * 100.0).clamp(0.0, 100.0)
}

/// Duration in seconds via ffprobe. A failure here does not fail the job;
/// it only suppresses progress reporting.
pub fn probe_duration(file_path: &Path) -> Result<f64> {
    let output = Command::new("ffprobe")
        .args([
            "-v",
            "error",
            "-show_entries",
            "format=duration",
            "-of",
            "default=noprint_wrappers=1:nokey=1",
        ])
        .arg(file_path)
        .output()
        .context(format!("failed to spawn ffprobe for {:?}", file_path))?;

    if !output.status.success() {
        return Err(anyhow!(
            "ffprobe duration check failed: {}",
            String::from_utf8_lossy(&output.stderr)
        ));
    }

    String::from_utf8(output.stdout)?
        .trim()
        .parse::<f64>()
        .context(format!("failed to parse duration of {:?}", file_path))
}

fn create_quiet_ffmpeg_command() -> Command {
    let mut cmd = Command::new("ffmpeg");
    cmd.args(["-v", "error", "-hide_banner", "-nostats", "-nostdin"]);
    cmd
}
