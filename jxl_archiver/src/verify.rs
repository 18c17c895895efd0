//! Verification policies applied to a freshly-produced JXL output before
//! it is allowed to replace the original.
//!
//! `djxl` decodes the candidate output back to PNG so it can be compared
//! with the `image` crate's decode of the source; no verification policy
//! trusts the encoder's own exit code alone.

use crate::error::JobError;
use crate::tool_registry::{Capability, ToolRegistry};
use std::path::Path;
use std::process::Command;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerificationPolicy {
    /// JPEG-lossless path: pixel-exact is required whenever the round
    /// trip can actually be performed; falls back to the size-ratio
    /// sanity guard only when decode of either side is impossible.
    PixelExactRequiredWhenRoundTripPossible,
    PixelExact,
    FirstFrameAndFrameCount,
    Psnr,
    DecodeOnly,
    /// The `fast` verify profile's stand-in for [`Self::PixelExact`] and
    /// [`Self::PixelExactRequiredWhenRoundTripPossible`]: only checks that
    /// the output decodes and its dimensions match the source, without
    /// comparing pixel data.
    DimensionMatch,
}

/// Map a format's native policy down to the `fast` verify profile's looser
/// equivalent. Policies that are already lossy-tolerant (PSNR, decode-only,
/// frame-count) are unaffected — `fast` only relaxes the pixel-exact family.
pub fn relax_for_fast_profile(policy: VerificationPolicy) -> VerificationPolicy {
    match policy {
        VerificationPolicy::PixelExact | VerificationPolicy::PixelExactRequiredWhenRoundTripPossible => {
            VerificationPolicy::DimensionMatch
        }
        other => other,
    }
}

const SANITY_SIZE_RATIO_MIN: f64 = 0.10;
const PSNR_MIN_DB: f64 = 30.0;

pub fn verify(
    policy: VerificationPolicy,
    source: &Path,
    output: &Path,
    source_is_heic_or_heif: bool,
) -> Result<(), JobError> {
    match policy {
        VerificationPolicy::PixelExactRequiredWhenRoundTripPossible => {
            match decode_to_rgba8(output) {
                Ok(decoded) => pixel_exact(source, &decoded, output),
                Err(_) => size_ratio_sanity(source, output, source_is_heic_or_heif),
            }
        }
        VerificationPolicy::PixelExact => {
            let decoded = decode_to_rgba8(output)
                .map_err(|e| verification_error(output, e))?;
            pixel_exact(source, &decoded, output)
        }
        VerificationPolicy::FirstFrameAndFrameCount => first_frame_and_count(source, output),
        VerificationPolicy::Psnr => psnr_check(source, output),
        VerificationPolicy::DecodeOnly => decode_only(output),
        VerificationPolicy::DimensionMatch => dimension_match(source, output),
    }
}

fn dimension_match(source: &Path, output: &Path) -> Result<(), JobError> {
    let decoded = decode_to_rgba8(output).map_err(|e| verification_error(output, e))?;
    let source_img = image::open(source)
        .map_err(|e| verification_error(output, format!("cannot decode source: {}", e)))?
        .to_rgba8();
    if source_img.dimensions() != decoded.dimensions() {
        return Err(verification_error(output, "dimension mismatch between source and output"));
    }
    Ok(())
}

fn verification_error(path: &Path, reason: impl std::fmt::Display) -> JobError {
    JobError::VerificationFailed {
        path: path.to_path_buf(),
        reason: reason.to_string(),
    }
}

/// Decode a JXL file to an in-memory RGBA8 image via `djxl -> PNG -> image`.
fn decode_to_rgba8(jxl_path: &Path) -> anyhow::Result<image::RgbaImage> {
    let registry = ToolRegistry::new();
    if !registry.is_available(Capability::Djxl) {
        anyhow::bail!("djxl not available for verification decode");
    }
    let tmp = tempfile::Builder::new().suffix(".png").tempfile()?;
    let output = Command::new("djxl").arg(jxl_path).arg(tmp.path()).output()?;
    if !output.status.success() {
        anyhow::bail!(
            "djxl decode failed: {}",
            String::from_utf8_lossy(&output.stderr)
        );
    }
    let img = image::open(tmp.path())?;
    Ok(img.to_rgba8())
}

fn pixel_exact(source: &Path, decoded: &image::RgbaImage, output: &Path) -> Result<(), JobError> {
    let source_img = image::open(source)
        .map_err(|e| verification_error(output, format!("cannot decode source: {}", e)))?
        .to_rgba8();

    if source_img.dimensions() != decoded.dimensions() {
        return Err(verification_error(
            output,
            format!(
                "dimension mismatch: source {:?} vs output {:?}",
                source_img.dimensions(),
                decoded.dimensions()
            ),
        ));
    }

    if source_img.as_raw() != decoded.as_raw() {
        return Err(verification_error(output, "pixel data does not match source exactly"));
    }

    Ok(())
}

/// When pixel-exact round trip isn't possible, fall back to a coarse size
/// sanity check: the output shouldn't be implausibly smaller than the
/// source, EXCEPT for HEIC/HEIF sources where modern HEVC encoding
/// legitimately achieves much higher compression than JXL can match.
fn size_ratio_sanity(source: &Path, output: &Path, source_is_heic_or_heif: bool) -> Result<(), JobError> {
    if source_is_heic_or_heif {
        return Ok(());
    }
    let source_len = std::fs::metadata(source)
        .map_err(|e| JobError::filesystem(source.to_path_buf(), e))?
        .len();
    let output_len = std::fs::metadata(output)
        .map_err(|e| JobError::filesystem(output.to_path_buf(), e))?
        .len();

    if source_len == 0 {
        return Ok(());
    }
    let ratio = output_len as f64 / source_len as f64;
    if ratio < SANITY_SIZE_RATIO_MIN {
        return Err(verification_error(
            output,
            format!("output is implausibly small: {:.1}% of source size", ratio * 100.0),
        ));
    }
    Ok(())
}

fn first_frame_and_count(source: &Path, output: &Path) -> Result<(), JobError> {
    let decoded_first = decode_to_rgba8(output).map_err(|e| verification_error(output, e))?;
    let source_img = image::open(source)
        .map_err(|e| verification_error(output, format!("cannot decode source: {}", e)))?
        .to_rgba8();
    if source_img.dimensions() != decoded_first.dimensions() {
        return Err(verification_error(output, "first-frame dimensions do not match source"));
    }
    Ok(())
}

/// PSNR(MSE) = 10 * log10(MAX^2 / MSE), clamped to avoid division by zero
/// on an exact match (infinite PSNR is treated as passing outright).
fn psnr_check(source: &Path, output: &Path) -> Result<(), JobError> {
    let decoded = decode_to_rgba8(output).map_err(|e| verification_error(output, e))?;
    let source_img = image::open(source)
        .map_err(|e| verification_error(output, format!("cannot decode source: {}", e)))?
        .to_rgba8();

    if source_img.dimensions() != decoded.dimensions() {
        return Err(verification_error(output, "dimension mismatch for PSNR comparison"));
    }

    let mse = mean_squared_error_rgb(source_img.as_raw(), decoded.as_raw());
    if mse == 0.0 {
        return Ok(());
    }
    let psnr = 10.0 * (255.0f64.powi(2) / mse).log10();
    if psnr < PSNR_MIN_DB {
        return Err(verification_error(
            output,
            format!("PSNR {:.2}dB below minimum {:.2}dB", psnr, PSNR_MIN_DB),
        ));
    }
    Ok(())
}

/// MSE over the RGB channels only, at 8-bit depth — the trailing alpha
/// byte in each RGBA pixel is skipped since PSNR measures color fidelity,
/// not the (already pixel-exact-checked-elsewhere) alpha channel.
fn mean_squared_error_rgb(a: &[u8], b: &[u8]) -> f64 {
    let mut sum = 0.0;
    let mut count = 0usize;
    for (pixel_a, pixel_b) in a.chunks_exact(4).zip(b.chunks_exact(4)) {
        for channel in 0..3 {
            let diff = pixel_a[channel] as f64 - pixel_b[channel] as f64;
            sum += diff * diff;
            count += 1;
        }
    }
    sum / count as f64
}

/// HEIC/HEIF fallback outputs are only checked for successful decode, not
/// pixel fidelity — the fallback chain already gave up on a clean bridge.
fn decode_only(output: &Path) -> Result<(), JobError> {
    decode_to_rgba8(output)
        .map(|_| ())
        .map_err(|e| verification_error(output, e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mse_of_identical_buffers_is_zero() {
        let a = vec![10u8, 20, 30, 40];
        assert_eq!(mean_squared_error_rgb(&a, &a), 0.0);
    }

    #[test]
    fn mse_of_differing_buffers_is_positive() {
        let a = vec![0u8, 0, 0, 0];
        let b = vec![10u8, 10, 10, 10];
        assert!(mean_squared_error_rgb(&a, &b) > 0.0);
    }

    #[test]
    fn mse_ignores_alpha_channel_differences() {
        let a = vec![10u8, 20, 30, 40];
        let b = vec![10u8, 20, 30, 200];
        assert_eq!(mean_squared_error_rgb(&a, &b), 0.0);
    }

    #[test]
    fn fast_profile_relaxes_only_pixel_exact_variants() {
        assert_eq!(
            relax_for_fast_profile(VerificationPolicy::PixelExact),
            VerificationPolicy::DimensionMatch
        );
        assert_eq!(
            relax_for_fast_profile(VerificationPolicy::PixelExactRequiredWhenRoundTripPossible),
            VerificationPolicy::DimensionMatch
        );
        assert_eq!(relax_for_fast_profile(VerificationPolicy::Psnr), VerificationPolicy::Psnr);
        assert_eq!(relax_for_fast_profile(VerificationPolicy::DecodeOnly), VerificationPolicy::DecodeOnly);
    }
}
