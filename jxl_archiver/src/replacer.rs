//! Atomic Replacer: the only place the original file is ever removed.
//!
//! Exact sequence, each step only attempted once the previous one
//! succeeded:
//!
//! 1. Propagate metadata from source onto the tmp output.
//! 2. Apply filesystem timestamps to the tmp output (folded into step 1).
//! 3. macOS Finder/creation-date handling (folded into step 1).
//! 4. Re-verify the tmp output clears the minimum size floor, then unlink
//!    the source file.
//! 5. Rename tmp -> final path.
//! 6. Re-apply timestamps to the final path, since the rename can itself
//!    touch the containing directory's view of mtime on some filesystems.
//!
//! The source is never removed before the tmp file exists and has passed
//! verification upstream of this module — by the time `replace` runs, the
//! only remaining risk is a crash between steps 4 and 5, which would leave
//! neither file present. That narrow window is the unavoidable cost of a
//! same-filesystem rename being the only truly atomic step available.

use crate::error::JobError;
use shared_utils::PropagationTier;
use std::path::Path;

pub fn replace(source: &Path, tmp_output: &Path, final_output: &Path) -> Result<PropagationTier, JobError> {
    let tier = shared_utils::propagate_metadata(source, tmp_output)
        .map_err(|e| JobError::filesystem(tmp_output.to_path_buf(), e))?;

    // Verify while the source still exists — once it's unlinked below
    // there's nothing left to compare against.
    shared_utils::verify_metadata(source, tmp_output, tier);

    // Capture the tmp file's timestamps now, while it still carries the
    // ones `propagate_metadata` just set — the source is about to be
    // deleted and the rename below can itself touch mtime on some
    // filesystems, so this is what step 6 restores from.
    let stamped = std::fs::metadata(tmp_output)
        .map_err(|e| JobError::filesystem(tmp_output.to_path_buf(), e))?;

    shared_utils::safe_delete_original(source, tmp_output, shared_utils::MIN_OUTPUT_SIZE_BEFORE_DELETE_IMAGE)
        .map_err(|e| JobError::filesystem(source.to_path_buf(), e))?;

    std::fs::rename(tmp_output, final_output)
        .map_err(|e| JobError::filesystem(final_output.to_path_buf(), e))?;

    let atime = filetime::FileTime::from_last_access_time(&stamped);
    let mtime = filetime::FileTime::from_last_modification_time(&stamped);
    if let Err(e) = filetime::set_file_times(final_output, atime, mtime) {
        tracing::warn!(error = %e, path = %final_output.display(), "failed to restamp final output after rename");
    }

    Ok(tier)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn replace_removes_source_and_produces_final_output() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("a.png");
        let tmp = dir.path().join("a.jxl.tmp");
        let final_path = dir.path().join("a.jxl");
        let jxl_bytes = vec![0xABu8; 200];
        fs::write(&source, b"source bytes").unwrap();
        fs::write(&tmp, &jxl_bytes).unwrap();

        replace(&source, &tmp, &final_path).unwrap();

        assert!(!source.exists());
        assert!(!tmp.exists());
        assert!(final_path.exists());
        assert_eq!(fs::read(&final_path).unwrap(), jxl_bytes);
    }

    #[test]
    fn replace_fails_without_touching_source_when_tmp_missing() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("a.png");
        let tmp = dir.path().join("missing.jxl.tmp");
        let final_path = dir.path().join("a.jxl");
        fs::write(&source, b"source bytes").unwrap();

        let result = replace(&source, &tmp, &final_path);
        assert!(result.is_err());
        assert!(source.exists());
    }
}
