use std::path::PathBuf;
use std::sync::LazyLock;

use regex::Regex;

/// A yt-dlp completion line, e.g. `[ExtractAudio] Destination: /music/a.mp3`.
static DESTINATION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[\w+\]\s+Destination:\s+(\S.*)").expect("valid regex"));

/// An ffmpeg encode position, e.g. `frame= 101 fps= 30 ... time=00:01:02.34 bitrate=...`.
static TIME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"time=(\d+):(\d{2}):(\d{2}(?:\.\d+)?)").expect("valid regex"));

/// A transfer-rate marker, e.g. `[download]  15.2% of 3.00MiB at 123.45KiB/s ETA 00:21`.
static RATE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)at\s+(\d+(?:\.\d+)?[KMGT]?i?B/s)").expect("valid regex"));

/// Structured event extracted from one raw output line.
#[derive(Debug, Clone, PartialEq)]
pub enum OutputEvent {
    /// Fractional completion in [0, 1].
    Progress(f64),
    /// An output file the tool announced as written.
    FileProduced(PathBuf),
    /// A transfer rate such as `1.2MiB/s`. Observational only.
    ThroughputSample(String),
    /// Anything the parser does not understand. Never an error.
    Unrecognized(String),
}

/// Stateless scanner for external tool output. The expected total duration,
/// when known (ffmpeg transcodes), turns `time=` markers into progress
/// fractions; without it those markers are left unrecognized.
#[derive(Debug, Clone, Default)]
pub struct LineParser {
    total_duration_secs: Option<f64>,
}

impl LineParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_total_duration(secs: f64) -> Self {
        Self {
            total_duration_secs: Some(secs),
        }
    }

    /// Scan one line and return every event it carries. Malformed input is
    /// classified `Unrecognized`, never an error.
    pub fn parse(&self, line: &str) -> Vec<OutputEvent> {
        let mut events = Vec::new();

        if let Some(caps) = DESTINATION_RE.captures(line) {
            let path = caps[1].trim().trim_matches('"');
            if !path.is_empty() {
                events.push(OutputEvent::FileProduced(PathBuf::from(path)));
            }
        }

        if let (Some(total), Some(caps)) = (self.total_duration_secs, TIME_RE.captures(line)) {
            if total > 0.0 {
                if let Some(position) = parse_timestamp(&caps[1], &caps[2], &caps[3]) {
                    events.push(OutputEvent::Progress((position / total).clamp(0.0, 1.0)));
                }
            }
        }

        if let Some(caps) = RATE_RE.captures(line) {
            events.push(OutputEvent::ThroughputSample(caps[1].to_string()));
        }

        if events.is_empty() {
            events.push(OutputEvent::Unrecognized(line.to_string()));
        }

        events
    }
}

fn parse_timestamp(hours: &str, minutes: &str, seconds: &str) -> Option<f64> {
    let hours: f64 = hours.parse().ok()?;
    let minutes: f64 = minutes.parse().ok()?;
    let seconds: f64 = seconds.parse().ok()?;
    Some(hours * 3600.0 + minutes * 60.0 + seconds)
}
