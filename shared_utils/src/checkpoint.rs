//! Atomic replace safety primitives.
//!
//! Before the original is deleted, the freshly-written output must pass a
//! minimal sanity check: it exists, it is non-empty, and it clears a
//! format-specific minimum size floor. This catches the case where an
//! external encoder exits 0 but wrote a truncated or empty file.

use std::io;
use std::path::Path;

/// Minimum plausible output size (bytes) for a still-image encode.
pub const MIN_OUTPUT_SIZE_BEFORE_DELETE_IMAGE: u64 = 100;

/// Minimum plausible output size (bytes) for a video/animation encode.
pub const MIN_OUTPUT_SIZE_BEFORE_DELETE_VIDEO: u64 = 1000;

/// Verify that `output` exists, is non-empty, meets `min_size`, and that
/// its first 16 bytes are actually readable (catches files that report a
/// size but are unreadable due to a filesystem race).
pub fn verify_output_integrity(output: &Path, min_size: u64) -> Result<(), String> {
    let metadata = std::fs::metadata(output)
        .map_err(|e| format!("output file missing: {}", e))?;

    if !metadata.is_file() {
        return Err("output path is not a regular file".to_string());
    }

    let size = metadata.len();
    if size == 0 {
        return Err("output file is empty".to_string());
    }
    if size < min_size {
        return Err(format!(
            "output file too small: {} bytes (minimum {})",
            size, min_size
        ));
    }

    let mut buf = [0u8; 16];
    use std::io::Read;
    let mut file = std::fs::File::open(output).map_err(|e| format!("cannot open output: {}", e))?;
    let read = file
        .read(&mut buf[..(16.min(size as usize))])
        .map_err(|e| format!("cannot read output: {}", e))?;
    if read == 0 {
        return Err("output file unreadable".to_string());
    }

    Ok(())
}

/// Verify `output` then remove `input`. On verification failure, `input`
/// is left untouched and the verification message is surfaced as an error.
pub fn safe_delete_original(input: &Path, output: &Path, min_output_size: u64) -> io::Result<()> {
    verify_output_integrity(output, min_output_size)
        .map_err(io::Error::other)?;
    std::fs::remove_file(input)
}
