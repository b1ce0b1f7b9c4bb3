use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use covergrab::{AppConfig, BatchSummary, CoverExtractor, ExtractOptions, MinSize, ProbeBackend, StreamId};
use indicatif::{ProgressBar, ProgressStyle};
use std::fs;
use std::path::PathBuf;

fn load_config() -> Result<AppConfig> {
    // Look for covergrab.json in app support, current dir fallback, then built-in default
    let mut tried: Vec<PathBuf> = Vec::new();
    if let Some(mut d) = dirs::data_dir() {
        d.push("covergrab");
        d.push("covergrab.json");
        tried.push(d);
    }
    tried.push(PathBuf::from("covergrab.json"));

    for p in &tried {
        if p.exists() {
            let text = fs::read_to_string(p).with_context(|| format!("reading config {}", p.display()))?;
            let cfg = AppConfig::from_json(&text).with_context(|| format!("loading config {}", p.display()))?;
            log::debug!("using config {}", p.display());
            return Ok(cfg);
        }
    }

    Ok(AppConfig::default())
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum Probe {
    /// Scan ffmpeg's diagnostic output
    FfmpegLog,
    /// Read ffprobe's JSON stream list
    Ffprobe,
}

impl From<Probe> for ProbeBackend {
    fn from(p: Probe) -> Self {
        match p {
            Probe::FfmpegLog => ProbeBackend::FfmpegLog,
            Probe::Ffprobe => ProbeBackend::Ffprobe,
        }
    }
}

#[derive(Parser, Debug)]
#[command(version, about = "Batch-extract cover images from video files.")]
struct Args {
    /// Input directory, searched recursively
    #[arg(short, long)]
    input: PathBuf,

    /// Output directory (default: same as input)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Cover stream to extract, e.g. 0:3
    #[arg(short, long)]
    map: Option<StreamId>,

    /// Detect the cover stream before extracting (default: on; pass --detect_map=false to disable)
    #[arg(long = "detect_map", num_args = 0..=1, default_value_t = true, default_missing_value = "true", action = clap::ArgAction::Set)]
    detect_map: bool,

    /// Upscale the cover to --min_size and re-encode it as JPEG
    #[arg(long, default_value_t = false)]
    resize: bool,

    /// Minimum output size as WIDTHxHEIGHT (default: 1920x1080)
    #[arg(long = "min_size")]
    min_size: Option<MinSize>,

    /// Print ffmpeg error output for failed files
    #[arg(long, default_value_t = false)]
    verbose: bool,

    /// How to find the cover stream
    #[arg(long, value_enum, default_value_t = Probe::FfmpegLog)]
    probe: Probe,

    /// Video file extension to pick up (repeatable; default: mp4)
    #[arg(long = "ext")]
    extensions: Vec<String>,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let default_filter = if args.verbose { "info" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .format_timestamp(None)
        .init();

    let mut cfg = load_config()?;
    if !args.extensions.is_empty() {
        cfg.video_extensions = args.extensions.clone();
        cfg.validate().context("invalid --ext value")?;
    }

    let min_size = match args.min_size {
        Some(size) => size,
        None => cfg.min_size.parse::<MinSize>()?,
    };

    let output_dir = args.output.clone().unwrap_or_else(|| args.input.clone());

    let options = ExtractOptions::default()
        .with_stream(args.map)
        .with_detect(args.detect_map)
        .with_resize(args.resize)
        .with_min_size(min_size)
        .with_jpeg_quality(cfg.jpeg_quality)
        .with_verbose(args.verbose)
        .with_probe(args.probe.into());

    let extractor = CoverExtractor::with_config(&cfg);

    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} [{elapsed_precise}] {pos}/{len} {msg}")
            .unwrap(),
    );

    let reports = extractor.process_directory_with_progress(&args.input, &output_dir, &options, |report, completed, total| {
        pb.set_length(total as u64);
        pb.set_position(completed as u64);
        let status = if report.succeeded() { "ok" } else { "failed" };
        let name = |p: &PathBuf| p.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
        // suspend keeps the line visible even when the bar is hidden
        pb.suspend(|| {
            println!("[{}] {} -> {}", status, name(&report.input), name(&report.output));
            if args.verbose {
                if let Some(err) = report.error() {
                    eprintln!("  {}", err);
                }
            }
        });
        pb.set_message(name(&report.input));
    })?;
    pb.finish_and_clear();

    let summary = BatchSummary::from_reports(&reports);
    if reports.is_empty() {
        println!("No video files found in {}", args.input.display());
    } else {
        println!(
            "\nCover extraction complete: {} succeeded, {} failed ({})",
            summary.succeeded,
            summary.failed,
            output_dir.display()
        );
    }

    Ok(())
}
