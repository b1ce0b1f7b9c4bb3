//! Cover stream detection.
//!
//! Two backends share one acceptance rule: a stream is a cover when it is a
//! video stream flagged as an attached picture and coded as MJPEG. Subtitle
//! streams are never accepted.

use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::path::Path;
use std::process::{Command as ProcCommand, Stdio};

use crate::{ExtractOptions, FfmpegConfig, StreamId};

/// How the detector inspects a container
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProbeBackend {
    /// Scan the diagnostic text printed by an `ffmpeg -f null` pass
    #[default]
    FfmpegLog,
    /// Filter the JSON stream list printed by `ffprobe -show_streams`
    Ffprobe,
}

const STREAM_MARKER: &str = "Stream #0:";

/// Find a cover stream in `input`, logging instead of failing.
///
/// Returns `None` when the probe fails or nothing qualifies. In that case the
/// caller falls back to the generic attachment extraction.
pub fn detect_cover_stream(input: &Path, ffmpeg: &FfmpegConfig, options: &ExtractOptions) -> Option<StreamId> {
    let probed = match options.probe {
        ProbeBackend::FfmpegLog => probe_with_ffmpeg(input, ffmpeg),
        ProbeBackend::Ffprobe => probe_with_ffprobe(input, ffmpeg),
    };

    match probed {
        Ok(Some(id)) => {
            log::info!("{}: cover stream {}", input.display(), id);
            Some(id)
        }
        Ok(None) => {
            if options.verbose {
                log::info!("{}: no attached mjpeg picture stream", input.display());
            } else {
                log::warn!("no usable cover stream found in {}", input.display());
            }
            None
        }
        Err(e) => {
            if options.verbose {
                log::error!("cover stream probe failed for {}: {:#}", input.display(), e);
            } else {
                log::warn!("no usable cover stream found in {}", input.display());
            }
            None
        }
    }
}

pub(crate) fn probe_args(input: &Path) -> Vec<String> {
    vec![
        "-hide_banner".into(),
        "-i".into(),
        input.to_string_lossy().into_owned(),
        "-c".into(),
        "copy".into(),
        "-f".into(),
        "null".into(),
        "-".into(),
    ]
}

fn probe_with_ffmpeg(input: &Path, ffmpeg: &FfmpegConfig) -> Result<Option<StreamId>> {
    let args = probe_args(input);
    log::debug!("{} {}", ffmpeg.ffmpeg_cmd().display(), args.join(" "));

    let output = ProcCommand::new(ffmpeg.ffmpeg_cmd())
        .args(&args)
        .stdin(Stdio::null())
        .output()
        .context("running ffmpeg probe")?;

    let diagnostics = String::from_utf8_lossy(&output.stderr);
    if !output.status.success() {
        return Err(anyhow!("ffmpeg probe exited with {}: {}", output.status, diagnostics.trim()));
    }
    Ok(find_cover_stream(&diagnostics))
}

/// Scan ffmpeg diagnostic text for the first attached MJPEG picture stream.
///
/// ```
/// let text = "  Stream #0:2[0x3](eng): Video: mjpeg (Baseline), yuvj420p, 600x600 (attached pic)";
/// assert_eq!(covergrab::find_cover_stream(text).unwrap().to_string(), "0:2");
/// ```
pub fn find_cover_stream(diagnostics: &str) -> Option<StreamId> {
    diagnostics
        .lines()
        .filter(|line| is_cover_line(line))
        .find_map(stream_index)
        .map(|stream| StreamId { file: 0, stream })
}

fn is_cover_line(line: &str) -> bool {
    line.contains(STREAM_MARKER)
        && line.contains("Video")
        && line.contains("(attached pic)")
        && !line.contains("Subtitle")
        && line.to_ascii_lowercase().contains("mjpeg")
}

// Leading digits after the marker; "2[0x3](eng)" and "2(eng)" both give 2.
fn stream_index(line: &str) -> Option<u32> {
    let (_, rest) = line.split_once(STREAM_MARKER)?;
    let end = rest.find(|c: char| !c.is_ascii_digit()).unwrap_or(rest.len());
    rest[..end].parse().ok()
}

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    streams: Vec<ProbeStream>,
}

#[derive(Debug, Deserialize)]
struct ProbeStream {
    index: u32,
    #[serde(default)]
    codec_type: Option<String>,
    #[serde(default)]
    codec_name: Option<String>,
    #[serde(default)]
    disposition: Disposition,
}

#[derive(Debug, Default, Deserialize)]
struct Disposition {
    #[serde(default)]
    attached_pic: u8,
}

impl ProbeStream {
    fn is_cover(&self) -> bool {
        let video = self.codec_type.as_deref() == Some("video");
        let mjpeg = self.codec_name.as_deref().is_some_and(|c| c.eq_ignore_ascii_case("mjpeg"));
        video && self.disposition.attached_pic == 1 && mjpeg
    }
}

pub(crate) fn ffprobe_args(input: &Path) -> Vec<String> {
    vec![
        "-v".into(),
        "error".into(),
        "-print_format".into(),
        "json".into(),
        "-show_streams".into(),
        input.to_string_lossy().into_owned(),
    ]
}

fn probe_with_ffprobe(input: &Path, ffmpeg: &FfmpegConfig) -> Result<Option<StreamId>> {
    let args = ffprobe_args(input);
    log::debug!("{} {}", ffmpeg.ffprobe_cmd().display(), args.join(" "));

    let output = ProcCommand::new(ffmpeg.ffprobe_cmd())
        .args(&args)
        .stdin(Stdio::null())
        .output()
        .context("running ffprobe")?;

    if !output.status.success() {
        return Err(anyhow!(
            "ffprobe exited with {}: {}",
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        ));
    }
    find_cover_stream_json(&output.stdout)
}

/// Pick the first attached MJPEG picture from `ffprobe -print_format json -show_streams` output.
pub fn find_cover_stream_json(json: &[u8]) -> Result<Option<StreamId>> {
    let parsed: ProbeOutput = serde_json::from_slice(json).context("parsing ffprobe json")?;
    Ok(parsed
        .streams
        .iter()
        .find(|s| s.is_cover())
        .map(|s| StreamId { file: 0, stream: s.index }))
}

#[cfg(test)]
mod tests {
    use super::*;

    const MP4_WITH_COVER: &str = "\
Input #0, mov,mp4,m4a,3gp,3g2,mj2, from 'a.mp4':
  Duration: 00:03:12.05, start: 0.000000, bitrate: 1289 kb/s
  Stream #0:0[0x1](und): Video: h264 (High) (avc1 / 0x31637661), yuv420p, 1920x1080, 1150 kb/s, 30 fps (default)
  Stream #0:1[0x2](eng): Audio: aac (LC) (mp4a / 0x6134706D), 44100 Hz, stereo, fltp, 128 kb/s (default)
  Stream #0:2[0x0]: Video: mjpeg (Baseline), yuvj420p(pc, bt470bg/unknown/unknown), 1280x720, 90k tbr, 90k tbn (attached pic)
Output #0, null, to 'pipe:':";

    #[test]
    fn detects_attached_mjpeg_stream() {
        assert_eq!(find_cover_stream(MP4_WITH_COVER), Some(StreamId { file: 0, stream: 2 }));
    }

    #[test]
    fn detects_stream_with_language_tag() {
        let line = "  Stream #0:2[0x1](eng): Video: mjpeg, yuvj444p, 500x500 (attached pic)";
        assert_eq!(find_cover_stream(line).map(|id| id.to_string()), Some("0:2".to_string()));
    }

    #[test]
    fn accepts_index_without_hex_tag() {
        let line = "    Stream #0:3(und): Video: MJPEG (Progressive), yuvj420p, 320x240 (attached pic)";
        assert_eq!(find_cover_stream(line), Some(StreamId { file: 0, stream: 3 }));
    }

    #[test]
    fn rejects_line_mentioning_subtitle() {
        let line = "  Stream #0:4: Video: mjpeg, Subtitle, 600x600 (attached pic)";
        assert_eq!(find_cover_stream(line), None);
    }

    #[test]
    fn rejects_non_jpeg_attachment() {
        let line = "  Stream #0:2[0x0]: Video: png, rgb24(pc), 600x600, 90k tbr (attached pic)";
        assert_eq!(find_cover_stream(line), None);
    }

    #[test]
    fn rejects_plain_video_stream() {
        let line = "  Stream #0:0[0x1](und): Video: mjpeg, yuvj420p, 640x480, 30 fps (default)";
        assert_eq!(find_cover_stream(line), None);
    }

    #[test]
    fn ignores_other_inputs() {
        let line = "  Stream #1:2: Video: mjpeg, yuvj420p, 600x600 (attached pic)";
        assert_eq!(find_cover_stream(line), None);
    }

    #[test]
    fn first_match_wins() {
        let text = "\
  Stream #0:3: Video: mjpeg, yuvj420p, 600x600 (attached pic)
  Stream #0:5: Video: mjpeg, yuvj420p, 1200x1200 (attached pic)";
        assert_eq!(find_cover_stream(text), Some(StreamId { file: 0, stream: 3 }));
    }

    #[test]
    fn skips_subtitle_line_and_keeps_scanning() {
        let text = "\
  Stream #0:2: Video: mjpeg, Subtitle (attached pic)
  Stream #0:4: Video: mjpeg, yuvj420p, 600x600 (attached pic)";
        assert_eq!(find_cover_stream(text), Some(StreamId { file: 0, stream: 4 }));
    }

    #[test]
    fn no_streams_means_not_found() {
        assert_eq!(find_cover_stream(""), None);
        assert_eq!(find_cover_stream("a.mp4: Invalid data found when processing input"), None);
    }

    #[test]
    fn ffprobe_json_selects_attached_mjpeg() {
        let json = br#"{
            "streams": [
                {"index": 0, "codec_name": "h264", "codec_type": "video", "disposition": {"attached_pic": 0}},
                {"index": 1, "codec_name": "aac", "codec_type": "audio", "disposition": {"attached_pic": 0}},
                {"index": 2, "codec_name": "png", "codec_type": "video", "disposition": {"attached_pic": 1}},
                {"index": 3, "codec_name": "mjpeg", "codec_type": "video", "disposition": {"attached_pic": 1}}
            ]
        }"#;
        assert_eq!(find_cover_stream_json(json).unwrap(), Some(StreamId { file: 0, stream: 3 }));
    }

    #[test]
    fn ffprobe_json_ignores_subtitles_and_missing_fields() {
        let json = br#"{"streams": [
            {"index": 0, "codec_name": "mjpeg", "codec_type": "subtitle", "disposition": {"attached_pic": 1}},
            {"index": 1}
        ]}"#;
        assert_eq!(find_cover_stream_json(json).unwrap(), None);
        assert_eq!(find_cover_stream_json(b"{}").unwrap(), None);
    }

    #[test]
    fn ffprobe_json_rejects_garbage() {
        assert!(find_cover_stream_json(b"not json").is_err());
    }

    #[test]
    fn probe_runs_null_copy_pass() {
        let args = probe_args(Path::new("in.mp4"));
        assert_eq!(args, ["-hide_banner", "-i", "in.mp4", "-c", "copy", "-f", "null", "-"]);
    }
}
