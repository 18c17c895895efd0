//! Metadata propagation: ordered cascade from source file to converted
//! output, plus a non-blocking verification pass.
//!
//! Four tiers are tried in order, each one falling back to the next only
//! when the previous one errors:
//!
//! 1. [`exif::copy_all_tags`] — every tag exiftool can read.
//! 2. [`exif::copy_critical_tags`] — EXIF/IPTC/XMP/ICC, skipping maker notes.
//! 3. [`exif::copy_basic_timestamps`] — just the EXIF/XMP date tags.
//! 4. filesystem timestamps only (atime/mtime, plus macOS birthtime).
//!
//! The first tier to succeed wins; the filesystem-timestamp tier always
//! runs regardless, since a write via exiftool resets mtime on the output.

use std::io;
use std::path::Path;

mod exif;
#[cfg(target_os = "macos")]
mod macos;
mod network;

/// Which tier of the cascade actually applied metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropagationTier {
    AllTags,
    CriticalTags,
    BasicTimestamps,
    FilesystemOnly,
}

/// Run the ordered metadata cascade from `src` to `dst`, returning which
/// tier succeeded. Filesystem timestamps are always applied last since
/// tiers 1-3 invoke exiftool, which rewrites `dst`'s mtime.
pub fn propagate(src: &Path, dst: &Path) -> io::Result<PropagationTier> {
    let tier = if exif::copy_all_tags(src, dst).is_ok() {
        PropagationTier::AllTags
    } else if exif::copy_critical_tags(src, dst).is_ok() {
        PropagationTier::CriticalTags
    } else if exif::copy_basic_timestamps(src, dst).is_ok() {
        PropagationTier::BasicTimestamps
    } else {
        PropagationTier::FilesystemOnly
    };

    apply_filesystem_timestamps(src, dst);
    Ok(tier)
}

fn apply_filesystem_timestamps(src: &Path, dst: &Path) {
    let Ok(meta) = std::fs::metadata(src) else {
        return;
    };
    let atime = filetime::FileTime::from_last_access_time(&meta);
    let mtime = filetime::FileTime::from_last_modification_time(&meta);
    if let Err(e) = filetime::set_file_times(dst, atime, mtime) {
        tracing::warn!(error = %e, dst = %dst.display(), "failed to set atime/mtime");
    }

    #[cfg(target_os = "macos")]
    {
        if let Ok(created) = meta.created() {
            if let Err(e) = macos::set_creation_time(dst, created) {
                tracing::warn!(error = %e, dst = %dst.display(), "failed to set creation time");
            }
        }
    }
}

/// Non-blocking verification: compares a curated tag subset and the
/// network/cloud xattrs between `src` and `dst`, logging a warning for any
/// mismatch. Never returns an error — a metadata mismatch must never fail
/// the job, only be visible in the logs.
pub fn verify(src: &Path, dst: &Path, tier: PropagationTier) {
    if let Err(e) = network::verify_network_metadata(src, dst) {
        tracing::warn!(error = %e, "network metadata verification failed to run");
    }

    let src_tags = exif::read_critical_tags(src).unwrap_or_default();
    let dst_tags = exif::read_critical_tags(dst).unwrap_or_default();
    if !src_tags.is_empty() && src_tags != dst_tags {
        tracing::warn!(
            src = %src.display(),
            dst = %dst.display(),
            ?tier,
            "metadata mismatch between source and output after propagation"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn propagate_falls_back_to_filesystem_only_without_exiftool_source() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("src.bin");
        let dst = dir.path().join("dst.bin");
        fs::write(&src, b"source").unwrap();
        fs::write(&dst, b"dest").unwrap();

        let tier = propagate(&src, &dst).unwrap();
        assert!(matches!(
            tier,
            PropagationTier::FilesystemOnly
                | PropagationTier::AllTags
                | PropagationTier::CriticalTags
                | PropagationTier::BasicTimestamps
        ));

        let dst_meta = fs::metadata(&dst).unwrap();
        let src_meta = fs::metadata(&src).unwrap();
        assert_eq!(
            filetime::FileTime::from_last_modification_time(&dst_meta),
            filetime::FileTime::from_last_modification_time(&src_meta)
        );
    }

    #[test]
    fn verify_never_panics_on_missing_files() {
        verify(
            Path::new("/nonexistent/a"),
            Path::new("/nonexistent/b"),
            PropagationTier::FilesystemOnly,
        );
    }
}
