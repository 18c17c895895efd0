//! Stage Runner: executes a single [`Step`](crate::plan::Step) against a
//! job, under a deadline, producing either the final JXL output directly
//! or an intermediate raster file for a subsequent `cjxl` pass.
//!
//! A stage only counts as successful when it exits 0 AND leaves a
//! non-empty output file before its deadline — a clean exit code with an
//! empty or missing file is still a failure.

use crate::error::JobError;
use crate::job::Job;
use crate::plan::Step;
use crate::tool_registry::{Capability, ToolRegistry};
use shared_utils::stage_process::StageProcess;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::{Duration, Instant};

/// Where a step's output lands: directly as the final JXL, or as an
/// intermediate that still needs a `cjxl` pass.
pub enum StageProduct {
    FinalJxl(PathBuf),
    Intermediate(PathBuf),
}

pub fn run_step(
    step: Step,
    job: &Job,
    scratch_dir: &Path,
    registry: &ToolRegistry,
    deadline: Instant,
    encoder_threads: Option<usize>,
) -> Result<StageProduct, JobError> {
    match step {
        Step::CjxlLosslessJpeg => {
            let out = job.tmp_output_path();
            run_cjxl(&job.source, &out, &["--lossless_jpeg=1"], registry, deadline, encoder_threads)?;
            Ok(StageProduct::FinalJxl(out))
        }
        Step::CjxlLosslessRaster => {
            let out = job.tmp_output_path();
            run_cjxl(&job.source, &out, &["-d", "0"], registry, deadline, encoder_threads)?;
            Ok(StageProduct::FinalJxl(out))
        }
        Step::CjxlAnimatedDirect => {
            let out = job.tmp_output_path();
            run_cjxl(&job.source, &out, &["-d", "0"], registry, deadline, encoder_threads)?;
            Ok(StageProduct::FinalJxl(out))
        }
        Step::RasterConvertToPng => {
            let intermediate = scratch_path(scratch_dir, job, "png");
            run_raster_convert(&job.source, &intermediate, false, registry, deadline)?;
            Ok(StageProduct::Intermediate(intermediate))
        }
        Step::RasterConvertHeicToPng => {
            let intermediate = scratch_path(scratch_dir, job, "png");
            run_raster_convert(&job.source, &intermediate, true, registry, deadline)?;
            Ok(StageProduct::Intermediate(intermediate))
        }
        Step::FfmpegExtractFrame => {
            let intermediate = scratch_path(scratch_dir, job, "png");
            run_ffmpeg_extract_frame(&job.source, &intermediate, registry, deadline)?;
            Ok(StageProduct::Intermediate(intermediate))
        }
        Step::HeifNativeDecode => {
            let intermediate = scratch_path(scratch_dir, job, "png");
            decode_heif_native(&job.source, &intermediate)?;
            Ok(StageProduct::Intermediate(intermediate))
        }
        Step::HeifConvertToTiff => {
            let intermediate = scratch_path(scratch_dir, job, "tiff");
            run_raster_convert(&job.source, &intermediate, false, registry, deadline)?;
            Ok(StageProduct::Intermediate(intermediate))
        }
    }
}

/// Run `cjxl` against `intermediate`, producing the job's final output.
pub fn finish_from_intermediate(
    job: &Job,
    intermediate: &Path,
    registry: &ToolRegistry,
    deadline: Instant,
    encoder_threads: Option<usize>,
) -> Result<PathBuf, JobError> {
    let out = job.tmp_output_path();
    run_cjxl(intermediate, &out, &["-d", "0"], registry, deadline, encoder_threads)?;
    Ok(out)
}

fn scratch_path(scratch_dir: &Path, job: &Job, ext: &str) -> PathBuf {
    let stem = job.source.file_stem().and_then(|s| s.to_str()).unwrap_or("job");
    scratch_dir.join(format!("{}.{}", stem, ext))
}

fn run_cjxl(
    input: &Path,
    output: &Path,
    extra_args: &[&str],
    registry: &ToolRegistry,
    deadline: Instant,
    encoder_threads: Option<usize>,
) -> Result<(), JobError> {
    require_tool(registry, Capability::Cjxl, input)?;
    let mut cmd = Command::new("cjxl");
    cmd.arg(input).arg(output).args(extra_args);
    if let Some(threads) = encoder_threads {
        cmd.arg(format!("--num_threads={}", threads));
    }
    run_with_deadline(cmd, input, "cjxl", deadline)?;
    ensure_non_empty(output, input)
}

/// Re-raster `input` to `output` via ImageMagick. `security_limits` applies
/// the tile-count/image-size overrides required for AVIF/HEIC sources,
/// which can otherwise be crafted to exhaust memory during decode.
fn run_raster_convert(
    input: &Path,
    output: &Path,
    security_limits: bool,
    registry: &ToolRegistry,
    deadline: Instant,
) -> Result<(), JobError> {
    require_tool(registry, Capability::RasterConvert, input)?;
    let mut cmd = Command::new("magick");
    if security_limits {
        cmd.args(["-limit", "width", "20000"])
            .args(["-limit", "height", "20000"])
            .args(["-limit", "area", "400MB"]);
    }
    cmd.arg(input).arg(output);
    run_with_deadline(cmd, input, "magick", deadline)?;
    ensure_non_empty(output, input)
}

/// Probe a source's pixel dimensions via `exiftool`, so the first
/// extraction attempt below can request the frame at source resolution
/// rather than whatever default ffmpeg picks.
fn probe_dimensions(input: &Path, registry: &ToolRegistry) -> Option<(u32, u32)> {
    if !registry.is_available(Capability::Exiftool) {
        return None;
    }
    let output = Command::new("exiftool")
        .arg("-s")
        .arg("-s")
        .arg("-s")
        .arg("-ImageWidth")
        .arg("-ImageHeight")
        .arg(input)
        .output()
        .ok()?;
    if !output.status.success() {
        return None;
    }
    let text = String::from_utf8_lossy(&output.stdout);
    let mut lines = text.lines();
    let width: u32 = lines.next()?.trim().parse().ok()?;
    let height: u32 = lines.next()?.trim().parse().ok()?;
    Some((width, height))
}

/// Extract frame 1 from a video-wrapped image source. Tries source
/// dimensions first (via `exiftool` probing), falling back to ffmpeg's own
/// default scaling if that attempt fails or no dimensions could be probed.
fn run_ffmpeg_extract_frame(
    input: &Path,
    output: &Path,
    registry: &ToolRegistry,
    deadline: Instant,
) -> Result<(), JobError> {
    require_tool(registry, Capability::FfmpegExtractFrame, input)?;

    if let Some((width, height)) = probe_dimensions(input, registry) {
        let mut cmd = Command::new("ffmpeg");
        cmd.arg("-y")
            .arg("-i")
            .arg(input)
            .arg("-frames:v")
            .arg("1")
            .arg("-s")
            .arg(format!("{}x{}", width, height))
            .arg(output);
        if run_with_deadline(cmd, input, "ffmpeg", deadline).is_ok() && ensure_non_empty(output, input).is_ok() {
            return Ok(());
        }
        tracing::debug!(
            path = %input.display(),
            width, height,
            "frame extraction at source dimensions failed, retrying at default dimensions"
        );
    }

    let mut cmd = Command::new("ffmpeg");
    cmd.arg("-y").arg("-i").arg(input).arg("-frames:v").arg("1").arg(output);
    run_with_deadline(cmd, input, "ffmpeg", deadline)?;
    ensure_non_empty(output, input)
}

/// Decode via `libheif-rs` in-process rather than shelling out; the last
/// resort before giving up on a HEIC/HEIF source entirely.
fn decode_heif_native(input: &Path, output: &Path) -> Result<(), JobError> {
    use libheif_rs::{ColorSpace, HeifContext, LibHeif, RgbChroma};

    let lib_heif = LibHeif::new();
    let ctx = HeifContext::read_from_file(&input.to_string_lossy())
        .map_err(|e| plan_decode_error(input, e))?;
    let handle = ctx.primary_image_handle().map_err(|e| plan_decode_error(input, e))?;
    let image = lib_heif
        .decode(&handle, ColorSpace::Rgb(RgbChroma::Rgba), None)
        .map_err(|e| plan_decode_error(input, e))?;

    let plane = image
        .planes()
        .interleaved
        .ok_or_else(|| JobError::PlanFailure {
            path: input.to_path_buf(),
            reason: "libheif produced no interleaved plane".to_string(),
        })?;

    let width = plane.width;
    let height = plane.height;
    let stride = plane.stride;
    let data = plane.data;

    let mut buf = image::RgbaImage::new(width, height);
    for y in 0..height as usize {
        let row = &data[y * stride..y * stride + (width as usize * 4)];
        for x in 0..width as usize {
            let px = &row[x * 4..x * 4 + 4];
            buf.put_pixel(x as u32, y as u32, image::Rgba([px[0], px[1], px[2], px[3]]));
        }
    }

    buf.save(output).map_err(|e| JobError::PlanFailure {
        path: input.to_path_buf(),
        reason: format!("failed to write decoded frame: {}", e),
    })
}

fn plan_decode_error(input: &Path, e: impl std::fmt::Display) -> JobError {
    JobError::PlanFailure {
        path: input.to_path_buf(),
        reason: format!("libheif decode failed: {}", e),
    }
}

fn require_tool(registry: &ToolRegistry, capability: Capability, path: &Path) -> Result<(), JobError> {
    if registry.is_available(capability) {
        Ok(())
    } else {
        Err(JobError::PlanFailure {
            path: path.to_path_buf(),
            reason: format!("required tool '{}' not found on PATH", capability.binary_name()),
        })
    }
}

fn run_with_deadline(
    mut cmd: Command,
    input: &Path,
    stage_name: &str,
    deadline: Instant,
) -> Result<(), JobError> {
    let started = Instant::now();
    let mut process = StageProcess::spawn(&mut cmd).map_err(|e| JobError::FilesystemFatal {
        path: input.to_path_buf(),
        source: std::io::Error::other(e.to_string()),
    })?;

    loop {
        match process.try_wait() {
            Ok(Some(status)) => {
                if status.success() {
                    return Ok(());
                }
                return Err(JobError::PlanFailure {
                    path: input.to_path_buf(),
                    reason: format!("{} exited with status {:?}", stage_name, status.code()),
                });
            }
            Ok(None) => {
                if Instant::now() >= deadline {
                    let _ = process.kill();
                    return Err(JobError::Timeout {
                        path: input.to_path_buf(),
                        stage: stage_name.to_string(),
                        elapsed_secs: started.elapsed().as_secs(),
                    });
                }
                std::thread::sleep(Duration::from_millis(50));
            }
            Err(e) => {
                return Err(JobError::FilesystemFatal {
                    path: input.to_path_buf(),
                    source: std::io::Error::other(e.to_string()),
                });
            }
        }
    }
}

fn ensure_non_empty(output: &Path, input: &Path) -> Result<(), JobError> {
    match std::fs::metadata(output) {
        Ok(meta) if meta.len() > 0 => Ok(()),
        Ok(_) => Err(JobError::PlanFailure {
            path: input.to_path_buf(),
            reason: "stage produced an empty output file".to_string(),
        }),
        Err(e) => Err(JobError::filesystem(output.to_path_buf(), e)),
    }
}
