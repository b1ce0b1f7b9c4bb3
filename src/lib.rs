//! # covergrab - Video Cover Extractor
//!
//! `covergrab` pulls the embedded cover picture out of video files using `ffmpeg`.
//!
//! ## Features
//!
//! - Detect the attached MJPEG picture stream of a container
//! - Stream-copy the cover without re-encoding
//! - Optionally upscale the cover to a minimum resolution and re-encode it as JPEG
//! - Batch-process a directory tree with per-file reports
//!
//! ## Example
//!
//! ```no_run
//! use covergrab::{CoverExtractor, ExtractOptions};
//! use std::path::Path;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let extractor = CoverExtractor::new();
//! let options = ExtractOptions::default().with_resize(true);
//! extractor.extract_cover(
//!     Path::new("movie.mp4"),
//!     Path::new("movie.jpg"),
//!     &options
//! )?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Batch Processing
//!
//! ```no_run
//! use covergrab::{CoverExtractor, ExtractOptions};
//! use std::path::Path;
//!
//! let extractor = CoverExtractor::new();
//! let reports = extractor.process_directory_with_progress(
//!     Path::new("videos"),
//!     Path::new("covers"),
//!     &ExtractOptions::default(),
//!     |report, completed, total| {
//!         println!("{}/{} {}", completed, total, report.input.display());
//!     },
//! ).unwrap();
//! println!("{} files", reports.len());
//! ```

use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use walkdir::WalkDir;

pub mod detect;
pub mod extract;

pub use detect::{detect_cover_stream, find_cover_stream, find_cover_stream_json, ProbeBackend};
pub use extract::{upscale_dimensions, upscale_image};

/// Addresses one demuxed stream as `<file>:<stream>`, e.g. `0:2`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StreamId {
    pub file: u32,
    pub stream: u32,
}

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.file, self.stream)
    }
}

impl FromStr for StreamId {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let (file, stream) = s
            .trim()
            .split_once(':')
            .ok_or_else(|| anyhow!("invalid stream id '{}', expected <file>:<stream> such as 0:3", s))?;
        let parse = |part: &str| -> Result<u32> {
            if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
                return Err(anyhow!("invalid stream id '{}', expected <file>:<stream> such as 0:3", s));
            }
            part.parse::<u32>().with_context(|| format!("stream id '{}' out of range", s))
        };
        Ok(Self { file: parse(file)?, stream: parse(stream)? })
    }
}

/// Minimum output resolution used when resizing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MinSize {
    pub width: u32,
    pub height: u32,
}

impl Default for MinSize {
    fn default() -> Self {
        Self { width: 1920, height: 1080 }
    }
}

impl fmt::Display for MinSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

impl FromStr for MinSize {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || anyhow!("invalid size format '{}', expected <width>x<height> such as 1920x1080", s);
        let (w, h) = s.trim().split_once(['x', 'X']).ok_or_else(invalid)?;
        let width: u32 = w.trim().parse().map_err(|_| invalid())?;
        let height: u32 = h.trim().parse().map_err(|_| invalid())?;
        if width == 0 || height == 0 {
            return Err(anyhow!("size '{}' must have a positive width and height", s));
        }
        Ok(Self { width, height })
    }
}

/// Locations of the external `ffmpeg` and `ffprobe` executables
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FfmpegConfig {
    pub ffmpeg: PathBuf,
    pub ffprobe: PathBuf,
}

impl Default for FfmpegConfig {
    fn default() -> Self {
        Self {
            ffmpeg: PathBuf::from("ffmpeg"),
            ffprobe: PathBuf::from("ffprobe"),
        }
    }
}

impl FfmpegConfig {
    pub fn ffmpeg_cmd(&self) -> &Path {
        &self.ffmpeg
    }

    pub fn ffprobe_cmd(&self) -> &Path {
        &self.ffprobe
    }
}

fn default_min_size() -> String {
    MinSize::default().to_string()
}
fn default_video_extensions() -> Vec<String> {
    vec!["mp4".to_string()]
}
fn default_image_extension() -> String {
    "jpg".to_string()
}
fn default_jpeg_quality() -> u8 {
    95
}
fn default_ffmpeg() -> PathBuf {
    PathBuf::from("ffmpeg")
}
fn default_ffprobe() -> PathBuf {
    PathBuf::from("ffprobe")
}

/// Application configuration, loaded from `covergrab.json` when present
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct AppConfig {
    #[serde(default = "default_min_size")]
    pub min_size: String,
    #[serde(default = "default_video_extensions")]
    pub video_extensions: Vec<String>,
    #[serde(default = "default_image_extension")]
    pub image_extension: String,
    #[serde(default = "default_jpeg_quality")]
    pub jpeg_quality: u8,
    #[serde(default = "default_ffmpeg")]
    pub ffmpeg: PathBuf,
    #[serde(default = "default_ffprobe")]
    pub ffprobe: PathBuf,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            min_size: default_min_size(),
            video_extensions: default_video_extensions(),
            image_extension: default_image_extension(),
            jpeg_quality: default_jpeg_quality(),
            ffmpeg: default_ffmpeg(),
            ffprobe: default_ffprobe(),
        }
    }
}

impl AppConfig {
    /// Parse and validate a JSON config document
    pub fn from_json(text: &str) -> Result<Self> {
        let mut config: AppConfig = serde_json::from_str(text).context("parsing config json")?;
        config.validate()?;
        Ok(config)
    }

    /// Check value ranges and normalize extensions (leading dots are dropped)
    pub fn validate(&mut self) -> Result<()> {
        if !(1..=100).contains(&self.jpeg_quality) {
            return Err(anyhow!("jpeg_quality must be between 1 and 100, got {}", self.jpeg_quality));
        }
        self.min_size
            .parse::<MinSize>()
            .context("invalid min_size in config")?;

        for ext in self.video_extensions.iter_mut().chain(std::iter::once(&mut self.image_extension)) {
            let trimmed = ext.trim().trim_start_matches('.');
            if trimmed.is_empty() {
                return Err(anyhow!("file extensions in config must not be empty"));
            }
            *ext = trimmed.to_string();
        }
        if self.video_extensions.is_empty() {
            return Err(anyhow!("video_extensions must list at least one extension"));
        }
        Ok(())
    }

    pub fn ffmpeg_config(&self) -> FfmpegConfig {
        FfmpegConfig {
            ffmpeg: self.ffmpeg.clone(),
            ffprobe: self.ffprobe.clone(),
        }
    }
}

/// Options for a single cover extraction
#[derive(Debug, Clone)]
pub struct ExtractOptions {
    /// Explicit stream to extract; replaced by a detected stream when `detect` finds one
    pub stream: Option<StreamId>,
    /// Probe the container for an attached picture before extracting
    pub detect: bool,
    /// Decode, upscale to `min_size` and re-encode instead of stream-copying
    pub resize: bool,
    pub min_size: MinSize,
    /// JPEG quality for the resize path (1-100)
    pub jpeg_quality: u8,
    /// Surface the external tool's error text
    pub verbose: bool,
    pub probe: ProbeBackend,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self {
            stream: None,
            detect: true,
            resize: false,
            min_size: MinSize::default(),
            jpeg_quality: default_jpeg_quality(),
            verbose: false,
            probe: ProbeBackend::default(),
        }
    }
}

impl ExtractOptions {
    pub fn with_stream(mut self, stream: Option<StreamId>) -> Self {
        self.stream = stream;
        self
    }

    pub fn with_detect(mut self, detect: bool) -> Self {
        self.detect = detect;
        self
    }

    pub fn with_resize(mut self, resize: bool) -> Self {
        self.resize = resize;
        self
    }

    pub fn with_min_size(mut self, min_size: MinSize) -> Self {
        self.min_size = min_size;
        self
    }

    pub fn with_jpeg_quality(mut self, quality: u8) -> Self {
        self.jpeg_quality = quality;
        self
    }

    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn with_probe(mut self, probe: ProbeBackend) -> Self {
        self.probe = probe;
        self
    }
}

/// Which path produced a cover
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractionMethod {
    /// The stream was copied to disk as-is
    StreamCopy(StreamId),
    /// The stream was decoded, upscaled and re-encoded
    Resized(StreamId),
    /// No stream was known; the first attachment stream was copied
    AttachmentFallback,
}

impl fmt::Display for ExtractionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExtractionMethod::StreamCopy(id) => write!(f, "stream {} copied", id),
            ExtractionMethod::Resized(id) => write!(f, "stream {} resized", id),
            ExtractionMethod::AttachmentFallback => write!(f, "attachment stream"),
        }
    }
}

/// Outcome of processing one video in a batch
#[derive(Debug, Clone)]
pub struct FileReport {
    pub input: PathBuf,
    pub output: PathBuf,
    /// The extraction path on success, the error chain as text on failure
    pub outcome: std::result::Result<ExtractionMethod, String>,
}

impl FileReport {
    pub fn succeeded(&self) -> bool {
        self.outcome.is_ok()
    }

    pub fn error(&self) -> Option<&str> {
        self.outcome.as_ref().err().map(String::as_str)
    }
}

/// Succeeded/failed counts for a batch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub succeeded: usize,
    pub failed: usize,
}

impl BatchSummary {
    pub fn from_reports(reports: &[FileReport]) -> Self {
        let succeeded = reports.iter().filter(|r| r.succeeded()).count();
        Self { succeeded, failed: reports.len() - succeeded }
    }
}

/// Main entry point for cover extraction
pub struct CoverExtractor {
    ffmpeg: FfmpegConfig,
    video_extensions: Vec<String>,
    image_extension: String,
}

impl CoverExtractor {
    /// Create an extractor with default configuration
    pub fn new() -> Self {
        Self::with_config(&AppConfig::default())
    }

    /// Create an extractor from an application config
    pub fn with_config(config: &AppConfig) -> Self {
        Self {
            ffmpeg: config.ffmpeg_config(),
            video_extensions: config.video_extensions.clone(),
            image_extension: config.image_extension.clone(),
        }
    }

    /// Replace the ffmpeg/ffprobe executables
    pub fn with_ffmpeg(mut self, ffmpeg: FfmpegConfig) -> Self {
        self.ffmpeg = ffmpeg;
        self
    }

    /// Replace the video extensions picked up by the directory walk
    pub fn with_video_extensions<I, S>(mut self, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.video_extensions = extensions.into_iter().map(Into::into).collect();
        self
    }

    pub fn ffmpeg(&self) -> &FfmpegConfig {
        &self.ffmpeg
    }

    /// Find the attached cover stream of `input`, if any
    pub fn detect_stream(&self, input: &Path, options: &ExtractOptions) -> Option<StreamId> {
        detect_cover_stream(input, &self.ffmpeg, options)
    }

    /// Extract the cover of a single video
    ///
    /// # Arguments
    ///
    /// * `input` - Path to the video container
    /// * `output` - Path of the image to write (overwritten if present)
    /// * `options` - Extraction options
    ///
    /// Returns the path that produced the cover. On failure the error carries
    /// ffmpeg's stderr or the decode error; a partial file may remain at `output`.
    pub fn extract_cover(&self, input: &Path, output: &Path, options: &ExtractOptions) -> Result<ExtractionMethod> {
        extract::extract_cover(input, output, options, &self.ffmpeg)
    }

    /// Output path for `input` inside `output_dir`: same stem, image extension
    pub fn output_path_for(&self, input: &Path, output_dir: &Path) -> Result<PathBuf> {
        let file_stem = input
            .file_stem()
            .and_then(|s| s.to_str())
            .ok_or_else(|| anyhow!("bad file name: {}", input.display()))?;
        Ok(output_dir.join(format!("{}.{}", file_stem, self.image_extension)))
    }

    /// Whether `path` has one of the configured video extensions (ASCII case-insensitive)
    pub fn is_video(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .is_some_and(|ext| self.video_extensions.iter().any(|v| v.eq_ignore_ascii_case(ext)))
    }

    /// Recursively collect video files under `input_dir`, in walk order
    pub fn find_videos(&self, input_dir: &Path) -> Result<Vec<PathBuf>> {
        if !input_dir.is_dir() {
            return Err(anyhow!("Input directory does not exist: {}", input_dir.display()));
        }
        Ok(WalkDir::new(input_dir)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .map(|e| e.into_path())
            .filter(|p| self.is_video(p))
            .collect())
    }

    /// Extract covers for every video under `input_dir` into `output_dir`
    pub fn process_directory(&self, input_dir: &Path, output_dir: &Path, options: &ExtractOptions) -> Result<Vec<FileReport>> {
        self.process_directory_with_progress(input_dir, output_dir, options, |_, _, _| {})
    }

    /// Extract covers for every video under `input_dir`, reporting each file as it finishes
    ///
    /// The callback receives `(report, completed, total)`. Per-file failures are
    /// recorded in the report and never abort the batch; only a missing input
    /// directory or an uncreatable output directory is an error.
    pub fn process_directory_with_progress<F>(
        &self,
        input_dir: &Path,
        output_dir: &Path,
        options: &ExtractOptions,
        mut progress_callback: F,
    ) -> Result<Vec<FileReport>>
    where
        F: FnMut(&FileReport, usize, usize),
    {
        let videos = self.find_videos(input_dir)?;
        fs::create_dir_all(output_dir)
            .with_context(|| format!("creating output directory {}", output_dir.display()))?;

        let total = videos.len();
        let mut reports = Vec::with_capacity(total);
        for (idx, input) in videos.into_iter().enumerate() {
            let report = self.process_file(input, output_dir, options);
            progress_callback(&report, idx + 1, total);
            reports.push(report);
        }
        Ok(reports)
    }

    fn process_file(&self, input: PathBuf, output_dir: &Path, options: &ExtractOptions) -> FileReport {
        let output = match self.output_path_for(&input, output_dir) {
            Ok(p) => p,
            Err(e) => {
                return FileReport {
                    output: output_dir.to_path_buf(),
                    input,
                    outcome: Err(format!("{:#}", e)),
                }
            }
        };

        let outcome = self
            .extract_cover(&input, &output, options)
            .map_err(|e| format!("{:#}", e));
        if let Err(e) = &outcome {
            log::debug!("{} failed: {}", input.display(), e);
        }
        FileReport { input, output, outcome }
    }
}

impl Default for CoverExtractor {
    fn default() -> Self {
        Self::new()
    }
}
