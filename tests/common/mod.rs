//! Shared helpers for integration tests.
//!
//! The stub ffmpeg is a shell script that appends its argument list to a log
//! file and then behaves according to what was asked of it.

#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use covergrab::FfmpegConfig;

pub const COVER_DIAGNOSTICS: &str = "\
Input #0, mov,mp4,m4a,3gp,3g2,mj2, from 'a.mp4':
  Duration: 00:00:05.00, start: 0.000000, bitrate: 512 kb/s
  Stream #0:0[0x1](und): Video: h264 (High) (avc1 / 0x31637661), yuv420p, 640x360, 400 kb/s, 25 fps (default)
  Stream #0:1[0x2](eng): Audio: aac (LC) (mp4a / 0x6134706D), 44100 Hz, stereo, fltp, 96 kb/s (default)
  Stream #0:2[0x0]: Video: mjpeg (Baseline), yuvj420p(pc, bt470bg/unknown/unknown), 800x600, 90k tbr, 90k tbn (attached pic)
Output #0, null, to 'pipe:':";

pub const PLAIN_DIAGNOSTICS: &str = "\
Input #0, mov,mp4,m4a,3gp,3g2,mj2, from 'b.mp4':
  Stream #0:0[0x1](und): Video: h264 (High) (avc1 / 0x31637661), yuv420p, 640x360, 400 kb/s, 25 fps (default)
  Stream #0:1[0x2](eng): Audio: aac (LC) (mp4a / 0x6134706D), 44100 Hz, stereo, fltp, 96 kb/s (default)
Output #0, null, to 'pipe:':";

/// Behaviour of the stub for one kind of invocation
pub struct StubBehaviour {
    /// Diagnostic text printed for `-f null` probes of files whose name contains the key
    pub diagnostics: Vec<(&'static str, &'static str)>,
    /// File streamed to stdout for `image2pipe` requests
    pub pipe_file: Option<PathBuf>,
    /// Exit code for `-map 0:t` attachment requests
    pub attachment_exit: i32,
    /// Exit code for stream-copy requests
    pub copy_exit: i32,
    /// Exit code for the probe itself
    pub probe_exit: i32,
}

impl Default for StubBehaviour {
    fn default() -> Self {
        Self {
            diagnostics: vec![("/a.mp4", COVER_DIAGNOSTICS), ("/b.mp4", PLAIN_DIAGNOSTICS)],
            pipe_file: None,
            attachment_exit: 1,
            copy_exit: 0,
            probe_exit: 0,
        }
    }
}

pub struct StubFfmpeg {
    pub config: FfmpegConfig,
    pub log: PathBuf,
}

impl StubFfmpeg {
    /// Every argument list the stub has received, one line per call
    pub fn calls(&self) -> Vec<String> {
        fs::read_to_string(&self.log)
            .unwrap_or_default()
            .lines()
            .map(str::to_string)
            .collect()
    }

    pub fn calls_for(&self, name: &str) -> Vec<String> {
        self.calls().into_iter().filter(|c| c.contains(name)).collect()
    }
}

#[cfg(unix)]
pub fn write_stub_ffmpeg(dir: &Path, behaviour: &StubBehaviour) -> StubFfmpeg {
    use std::os::unix::fs::PermissionsExt;

    let log = dir.join("ffmpeg_calls.log");
    let mut probe_cases = String::new();
    for (key, text) in &behaviour.diagnostics {
        probe_cases.push_str(&format!("      *'{key} '*) cat >&2 <<'EOF'\n{text}\nEOF\n        ;;\n"));
    }
    let pipe = match &behaviour.pipe_file {
        Some(p) => format!("cat '{}'", p.display()),
        None => "printf 'not an image'".to_string(),
    };

    let script = format!(
        r#"#!/bin/sh
echo "$*" >> '{log}'
for last; do :; done
case "$*" in
  *"-f null"*)
    case "$*" in
{probe_cases}    esac
    exit {probe_exit}
    ;;
  *image2pipe*)
    {pipe}
    exit 0
    ;;
  *"-map 0:t"*)
    if [ {attachment_exit} -eq 0 ]; then printf 'ATTACHMENT' > "$last"; exit 0; fi
    echo "Stream map '0:t' matches no streams." >&2
    exit {attachment_exit}
    ;;
  *)
    if [ {copy_exit} -eq 0 ]; then printf 'COVER' > "$last"; exit 0; fi
    echo "Invalid data found when processing input" >&2
    exit {copy_exit}
    ;;
esac
"#,
        log = log.display(),
        probe_cases = probe_cases,
        probe_exit = behaviour.probe_exit,
        pipe = pipe,
        attachment_exit = behaviour.attachment_exit,
        copy_exit = behaviour.copy_exit,
    );

    let path = dir.join("ffmpeg-stub");
    fs::write(&path, script).expect("Failed to write stub ffmpeg");
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).expect("Failed to chmod stub ffmpeg");

    StubFfmpeg {
        config: FfmpegConfig {
            ffmpeg: path,
            ffprobe: PathBuf::from("ffprobe"),
        },
        log,
    }
}

/// Create empty placeholder videos; the stub never reads them
pub fn touch_videos(dir: &Path, names: &[&str]) {
    fs::create_dir_all(dir).expect("Failed to create input dir");
    for name in names {
        let path = dir.join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("Failed to create input subdir");
        }
        fs::write(path, b"").expect("Failed to create placeholder video");
    }
}

/// Whether a working ffmpeg is on PATH
pub fn ffmpeg_available() -> bool {
    Command::new("ffmpeg")
        .arg("-version")
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}
