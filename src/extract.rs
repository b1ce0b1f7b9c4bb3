use anyhow::{anyhow, Context, Result};
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::DynamicImage;
use std::fs;
use std::io::BufWriter;
use std::path::Path;
use std::process::{Command as ProcCommand, Stdio};

use crate::detect::detect_cover_stream;
use crate::{ExtractOptions, ExtractionMethod, FfmpegConfig, MinSize, StreamId};

/// Extract one cover image from `input` into `output`.
///
/// Decision order: a detected stream overrides `options.stream`; a known stream
/// is either stream-copied or decoded and upscaled; with no stream at all a single
/// attachment extraction (`-map 0:t`) is attempted. There is no first-frame fallback.
pub fn extract_cover(input: &Path, output: &Path, options: &ExtractOptions, ffmpeg: &FfmpegConfig) -> Result<ExtractionMethod> {
    let mut stream = options.stream;
    if options.detect {
        if let Some(detected) = detect_cover_stream(input, ffmpeg, options) {
            stream = Some(detected);
        }
    }

    match stream {
        Some(id) if options.resize => {
            log::info!("{}: decoding stream {} for resize", input.display(), id);
            extract_resized(input, output, id, options.min_size, options.jpeg_quality, ffmpeg)?;
            Ok(ExtractionMethod::Resized(id))
        }
        Some(id) => {
            log::info!("{}: copying stream {}", input.display(), id);
            run_ffmpeg(ffmpeg, &stream_copy_args(input, id, output)).context("extracting cover stream")?;
            Ok(ExtractionMethod::StreamCopy(id))
        }
        None => {
            log::info!("{}: trying attachment streams", input.display());
            run_ffmpeg(ffmpeg, &attachment_args(input, output)).context("extracting attachment stream")?;
            Ok(ExtractionMethod::AttachmentFallback)
        }
    }
}

fn base_args(input: &Path) -> Vec<String> {
    vec![
        "-hide_banner".into(),
        "-loglevel".into(),
        "error".into(),
        "-y".into(),
        "-i".into(),
        input.to_string_lossy().into_owned(),
    ]
}

pub(crate) fn stream_copy_args(input: &Path, stream: StreamId, output: &Path) -> Vec<String> {
    let mut args = base_args(input);
    args.extend(["-map".to_string(), stream.to_string(), "-vframes".to_string(), "1".to_string()]);
    args.extend(["-c".to_string(), "copy".to_string()]);
    args.push(output.to_string_lossy().into_owned());
    args
}

pub(crate) fn pipe_args(input: &Path, stream: StreamId) -> Vec<String> {
    let mut args = base_args(input);
    args.extend(["-map".to_string(), stream.to_string(), "-vframes".to_string(), "1".to_string()]);
    args.extend(["-f".to_string(), "image2pipe".to_string(), "-vcodec".to_string(), "png".to_string(), "-".to_string()]);
    args
}

pub(crate) fn attachment_args(input: &Path, output: &Path) -> Vec<String> {
    let mut args = base_args(input);
    args.extend(["-map".to_string(), "0:t".to_string(), "-c".to_string(), "copy".to_string()]);
    args.extend(["-f".to_string(), "image2".to_string(), "-vframes".to_string(), "1".to_string()]);
    args.push(output.to_string_lossy().into_owned());
    args
}

/// Run ffmpeg to completion and return its stdout.
///
/// A non-zero exit becomes an error carrying ffmpeg's stderr.
fn run_ffmpeg(ffmpeg: &FfmpegConfig, args: &[String]) -> Result<Vec<u8>> {
    log::debug!("{} {}", ffmpeg.ffmpeg_cmd().display(), args.join(" "));

    let output = ProcCommand::new(ffmpeg.ffmpeg_cmd())
        .args(args)
        .stdin(Stdio::null())
        .output()
        .context("running ffmpeg")?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        let stderr = stderr.trim();
        if stderr.is_empty() {
            return Err(anyhow!("ffmpeg exited with {}", output.status));
        }
        return Err(anyhow!("ffmpeg exited with {}: {}", output.status, stderr));
    }
    Ok(output.stdout)
}

fn extract_resized(input: &Path, output: &Path, stream: StreamId, min_size: MinSize, quality: u8, ffmpeg: &FfmpegConfig) -> Result<()> {
    let bytes = run_ffmpeg(ffmpeg, &pipe_args(input, stream)).context("decoding cover stream")?;
    if bytes.is_empty() {
        return Err(anyhow!("ffmpeg produced no image data for stream {}", stream));
    }

    let img = image::load_from_memory(&bytes).context("decoding piped cover image")?;
    let img = upscale_image(img, min_size)?;
    save_jpeg(&img, output, quality)
}

/// Largest resize target accepted, in pixels (8192x8192).
pub const MAX_OUTPUT_PIXELS: u64 = 1 << 26;

/// Target size for `(width, height)` so that both sides reach `min`.
///
/// Scales uniformly by the larger of the two per-axis factors, never below 1.0,
/// so 800x600 with a 1920x1080 minimum becomes 1920x1440, not 1440x1080. The
/// image is never shrunk and the aspect ratio is kept within rounding.
///
/// Fails when the target exceeds `u32` sides or [`MAX_OUTPUT_PIXELS`].
pub fn upscale_dimensions(width: u32, height: u32, min: MinSize) -> Result<(u32, u32)> {
    if width == 0 || height == 0 {
        return Ok((width, height));
    }

    let (w, h) = (width as f64, height as f64);
    let scale_w = width.max(min.width) as f64 / w;
    let scale_h = height.max(min.height) as f64 / h;
    let scale = scale_w.max(scale_h);

    let (target_w, target_h) = ((w * scale).round(), (h * scale).round());
    let too_large = || anyhow!("resize target {:.0}x{:.0} for {}x{} exceeds {} pixels", target_w, target_h, width, height, MAX_OUTPUT_PIXELS);
    if target_w > u32::MAX as f64 || target_h > u32::MAX as f64 {
        return Err(too_large());
    }

    let new_w = (target_w as u32).max(width);
    let new_h = (target_h as u32).max(height);

    // the governing axis must not fall one pixel short through rounding
    let (new_w, new_h) = if scale_w >= scale_h {
        (new_w.max(min.width), new_h)
    } else {
        (new_w, new_h.max(min.height))
    };

    let pixels = (new_w as u64).checked_mul(new_h as u64).ok_or_else(too_large)?;
    if pixels > MAX_OUTPUT_PIXELS && (new_w, new_h) != (width, height) {
        return Err(too_large());
    }
    Ok((new_w, new_h))
}

/// Lanczos-upscale `img` until it satisfies `min`. Images already large enough pass through.
pub fn upscale_image(img: DynamicImage, min: MinSize) -> Result<DynamicImage> {
    let (orig_w, orig_h) = (img.width(), img.height());
    let (target_w, target_h) = upscale_dimensions(orig_w, orig_h, min)?;
    if target_w == orig_w && target_h == orig_h {
        return Ok(img);
    }
    log::debug!("resizing {}x{} -> {}x{}", orig_w, orig_h, target_w, target_h);
    Ok(img.resize_exact(target_w, target_h, FilterType::Lanczos3))
}

fn save_jpeg(img: &DynamicImage, path: &Path, quality: u8) -> Result<()> {
    let file = fs::File::create(path).with_context(|| format!("creating {}", path.display()))?;
    let encoder = JpegEncoder::new_with_quality(BufWriter::new(file), quality);
    // jpeg has no alpha channel
    DynamicImage::ImageRgb8(img.to_rgb8())
        .write_with_encoder(encoder)
        .with_context(|| format!("writing {}", path.display()))?;
    Ok(())
}
