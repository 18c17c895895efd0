//! Plan Builder: maps a classified [`Job`](crate::job::Job) to an ordered
//! sequence of stage [`Step`]s and a verification policy.
//!
//! For most formats the sequence has a single step. AVIF/HEIC/HEIF and
//! animated GIF get a fallback chain (see [`crate::fallback`]) because the
//! primary conversion path can fail on inputs the source format's own
//! tools don't agree on how to decode.

use crate::classifier::Format;
use crate::error::JobError;
use crate::job::Job;
use crate::verify::VerificationPolicy;

/// Extensions that have no raster-equivalent JXL pipeline: vector/layered
/// formats. Still walked and counted by the scheduler, they just never
/// reach a stage.
const UNSUPPORTED_EXTENSIONS: &[&str] = &["psd", "xcf", "ora", "kra", "svg", "eps", "ai"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// `cjxl --lossless_jpeg=1` direct JPEG transcode.
    CjxlLosslessJpeg,
    /// `cjxl -d 0` direct lossless raster transcode (PNG/BMP/TIFF/static WebP).
    CjxlLosslessRaster,
    /// `cjxl` invoked directly against an animated GIF/WebP/APNG source.
    CjxlAnimatedDirect,
    /// Re-raster through an intermediate PNG via an external converter,
    /// then `cjxl` that PNG.
    RasterConvertToPng,
    /// Re-raster an AVIF/HEIC/HEIF source to an intermediate PNG via an
    /// external converter with security-limit overrides for tile count
    /// and image size, then `cjxl` that PNG.
    RasterConvertHeicToPng,
    /// Extract the first frame of a video-wrapped image via ffmpeg, then
    /// `cjxl` that frame.
    FfmpegExtractFrame,
    /// Decode via `libheif-rs` in-process and feed raw pixels to `cjxl`.
    HeifNativeDecode,
    /// raster-convert to TIFF, then `cjxl` that TIFF. Last resort for HEIC/HEIF.
    HeifConvertToTiff,
}

#[derive(Debug, Clone)]
pub struct ConversionPlan {
    pub steps: Vec<Step>,
    pub verification: VerificationPolicy,
}

pub fn build_plan(job: &Job) -> Result<ConversionPlan, JobError> {
    if let Some(ext) = job.source.extension().and_then(|e| e.to_str()) {
        let ext_lower = ext.to_lowercase();
        if UNSUPPORTED_EXTENSIONS.contains(&ext_lower.as_str()) {
            return Err(JobError::PlanFailure {
                path: job.source.clone(),
                reason: format!("no JXL-equivalent raster pipeline for .{}", ext_lower),
            });
        }
    }

    let Some(format) = job.format() else {
        return Err(JobError::Skipped {
            path: job.source.clone(),
            reason: "unrecognized file format".to_string(),
        });
    };

    let (steps, verification) = match format {
        Format::Jpeg => (
            vec![Step::CjxlLosslessJpeg],
            VerificationPolicy::PixelExactRequiredWhenRoundTripPossible,
        ),
        Format::Png | Format::Bmp | Format::Tiff => {
            (vec![Step::CjxlLosslessRaster], VerificationPolicy::PixelExact)
        }
        Format::WebP if job.is_animated() => (
            vec![Step::CjxlAnimatedDirect, Step::RasterConvertToPng],
            VerificationPolicy::FirstFrameAndFrameCount,
        ),
        Format::WebP => (vec![Step::CjxlLosslessRaster], VerificationPolicy::PixelExact),
        Format::Gif if job.is_animated() => (
            vec![Step::CjxlAnimatedDirect, Step::RasterConvertToPng],
            VerificationPolicy::FirstFrameAndFrameCount,
        ),
        Format::Gif => (vec![Step::CjxlAnimatedDirect], VerificationPolicy::PixelExact),
        Format::Avif | Format::Heic | Format::Heif => (
            vec![
                Step::RasterConvertHeicToPng,
                Step::FfmpegExtractFrame,
                Step::HeifNativeDecode,
                Step::HeifConvertToTiff,
            ],
            VerificationPolicy::DecodeOnly,
        ),
        Format::Jxl => {
            return Err(JobError::Skipped {
                path: job.source.clone(),
                reason: "already JPEG XL".to_string(),
            });
        }
    };

    Ok(ConversionPlan { steps, verification })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::Classification;
    use std::path::PathBuf;

    fn job_with(ext: &str, format: Option<Format>, animated: bool) -> Job {
        Job::new(
            PathBuf::from(format!("/photos/a.{}", ext)),
            Classification { format, animated, is_live_photo: false },
        )
    }

    #[test]
    fn unsupported_extension_is_plan_failure() {
        let job = job_with("psd", None, false);
        let err = build_plan(&job).unwrap_err();
        assert!(matches!(err, JobError::PlanFailure { .. }));
    }

    #[test]
    fn jpeg_uses_lossless_jpeg_step_and_roundtrip_policy() {
        let job = job_with("jpg", Some(Format::Jpeg), false);
        let plan = build_plan(&job).unwrap();
        assert_eq!(plan.steps, vec![Step::CjxlLosslessJpeg]);
        assert_eq!(
            plan.verification,
            VerificationPolicy::PixelExactRequiredWhenRoundTripPossible
        );
    }

    #[test]
    fn animated_gif_gets_a_fallback_chain() {
        let job = job_with("gif", Some(Format::Gif), true);
        let plan = build_plan(&job).unwrap();
        assert_eq!(plan.steps, vec![Step::CjxlAnimatedDirect, Step::RasterConvertToPng]);
    }

    #[test]
    fn heic_gets_the_full_four_step_fallback_chain() {
        let job = job_with("heic", Some(Format::Heic), false);
        let plan = build_plan(&job).unwrap();
        assert_eq!(
            plan.steps,
            vec![
                Step::RasterConvertHeicToPng,
                Step::FfmpegExtractFrame,
                Step::HeifNativeDecode,
                Step::HeifConvertToTiff,
            ]
        );
        assert_eq!(plan.verification, VerificationPolicy::DecodeOnly);
    }

    #[test]
    fn avif_gets_the_same_fallback_chain_as_heic() {
        let job = job_with("avif", Some(Format::Avif), false);
        let plan = build_plan(&job).unwrap();
        assert_eq!(
            plan.steps,
            vec![
                Step::RasterConvertHeicToPng,
                Step::FfmpegExtractFrame,
                Step::HeifNativeDecode,
                Step::HeifConvertToTiff,
            ]
        );
        assert_eq!(plan.verification, VerificationPolicy::DecodeOnly);
    }

    #[test]
    fn already_jxl_is_skipped_not_failed() {
        let job = job_with("jxl", Some(Format::Jxl), false);
        let err = build_plan(&job).unwrap_err();
        assert!(matches!(err, JobError::Skipped { .. }));
    }

    #[test]
    fn unrecognized_format_is_skipped() {
        let job = job_with("dat", None, false);
        let err = build_plan(&job).unwrap_err();
        assert!(matches!(err, JobError::Skipped { .. }));
    }
}
