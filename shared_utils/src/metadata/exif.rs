//! ExifTool wrapper used by the metadata cascade.
//!
//! Each tier of the cascade shells out to `exiftool` with a progressively
//! smaller tag set; cheaper tiers are tried first so that a corrupt or
//! partially-unsupported metadata block on a weird source file doesn't
//! make the whole job fail.

use std::io;
use std::path::Path;
use std::process::Command;
use std::sync::OnceLock;

static EXIFTOOL_AVAILABLE: OnceLock<bool> = OnceLock::new();

pub fn is_exiftool_available() -> bool {
    *EXIFTOOL_AVAILABLE.get_or_init(|| which::which("exiftool").is_ok())
}

/// Tier 1: copy every tag exiftool knows how to read, including maker notes.
pub fn copy_all_tags(src: &Path, dst: &Path) -> io::Result<()> {
    run_exiftool(
        src,
        dst,
        &["-tagsfromfile", "@SRC@", "-all:all", "-icc_profile", "-unsafe"],
    )
}

/// Tier 2: a curated set of tags that matter to downstream consumers
/// (EXIF orientation/date, IPTC caption/keywords, XMP rating/subject, ICC
/// profile) without touching maker-note blocks that often don't survive
/// a format change cleanly.
pub fn copy_critical_tags(src: &Path, dst: &Path) -> io::Result<()> {
    run_exiftool(
        src,
        dst,
        &[
            "-tagsfromfile",
            "@SRC@",
            "-EXIF:all",
            "-IPTC:all",
            "-XMP:all",
            "-icc_profile",
        ],
    )
}

/// Tier 3: just the handful of date/time tags. Used when the source file's
/// metadata block is too damaged for exiftool to copy wholesale.
pub fn copy_basic_timestamps(src: &Path, dst: &Path) -> io::Result<()> {
    run_exiftool(
        src,
        dst,
        &[
            "-tagsfromfile",
            "@SRC@",
            "-EXIF:DateTimeOriginal",
            "-EXIF:CreateDate",
            "-EXIF:ModifyDate",
            "-XMP:DateCreated",
            "-XMP:CreateDate",
        ],
    )
}

fn run_exiftool(src: &Path, dst: &Path, tag_args: &[&str]) -> io::Result<()> {
    if !is_exiftool_available() {
        return Err(io::Error::new(io::ErrorKind::NotFound, "exiftool not found"));
    }

    let mut cmd = Command::new("exiftool");
    for arg in tag_args {
        if *arg == "@SRC@" {
            cmd.arg(src);
        } else {
            cmd.arg(arg);
        }
    }
    cmd.arg("-use").arg("MWG");
    cmd.arg("-api").arg("LargeFileSupport=1");
    cmd.arg("-q").arg("-m");
    cmd.arg(dst);

    let output = cmd.output()?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        if !stderr.contains("Warning") {
            return Err(io::Error::other(format!("exiftool failed: {}", stderr)));
        }
    }

    let mut backup_name = dst.file_name().unwrap_or_default().to_os_string();
    backup_name.push("_original");
    let backup_path = dst.with_file_name(backup_name);
    let _ = std::fs::remove_file(&backup_path);

    Ok(())
}

/// Read back a curated subset of tags from `path` as a sorted `(tag, value)`
/// list, used by the non-blocking verification pass to compare source and
/// destination without re-running the whole copy.
pub fn read_critical_tags(path: &Path) -> io::Result<Vec<(String, String)>> {
    if !is_exiftool_available() {
        return Ok(Vec::new());
    }
    let output = Command::new("exiftool")
        .arg("-s")
        .arg("-EXIF:DateTimeOriginal")
        .arg("-EXIF:Orientation")
        .arg("-XMP:Rating")
        .arg("-IPTC:Keywords")
        .arg(path)
        .output()?;
    if !output.status.success() {
        return Ok(Vec::new());
    }
    let stdout = String::from_utf8_lossy(&output.stdout);
    let mut tags = Vec::new();
    for line in stdout.lines() {
        if let Some((tag, value)) = line.split_once(':') {
            tags.push((tag.trim().to_string(), value.trim().to_string()));
        }
    }
    tags.sort();
    Ok(tags)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_critical_tags_without_exiftool_is_empty_not_error() {
        // Cannot assume exiftool is installed in CI; only assert the call
        // itself never errors out — verification must stay non-blocking.
        let result = read_critical_tags(Path::new("/nonexistent/path.jpg"));
        assert!(result.is_ok());
    }
}
