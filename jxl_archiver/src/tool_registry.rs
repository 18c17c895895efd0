//! Lazily-checked, process-wide cache of which external conversion tools
//! are on `PATH`.
//!
//! Mirrors the caching idiom used for `exiftool` detection elsewhere in
//! this codebase (a `OnceLock<bool>` per tool, populated on first query)
//! rather than probing every tool up front — most runs only ever touch a
//! handful of the named capabilities.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Mutex, OnceLock};

/// A named external capability the pipeline can invoke.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    Cjxl,
    Djxl,
    FfmpegExtractFrame,
    RasterConvert,
    Exiftool,
}

impl Capability {
    pub(crate) fn binary_name(self) -> &'static str {
        match self {
            Capability::Cjxl => "cjxl",
            Capability::Djxl => "djxl",
            Capability::FfmpegExtractFrame => "ffmpeg",
            Capability::RasterConvert => "magick",
            Capability::Exiftool => "exiftool",
        }
    }
}

/// Capabilities resolved up front, before any job is dispatched: jxl-encode,
/// jxl-decode, and exif-tool. A run with any of these missing cannot make
/// progress on any job, so it aborts immediately rather than failing jobs
/// one at a time.
pub const REQUIRED_CAPABILITIES: &[Capability] = &[Capability::Cjxl, Capability::Djxl, Capability::Exiftool];

struct Cache {
    paths: Mutex<HashMap<&'static str, Option<PathBuf>>>,
}

static REGISTRY: OnceLock<Cache> = OnceLock::new();

fn cache() -> &'static Cache {
    REGISTRY.get_or_init(|| Cache {
        paths: Mutex::new(HashMap::new()),
    })
}

/// A registry wrapper so call sites don't reach for the bare module
/// functions directly; keeps the dependency on a shared process-wide cache
/// explicit at the type level.
#[derive(Debug, Clone, Copy, Default)]
pub struct ToolRegistry;

impl ToolRegistry {
    pub fn new() -> Self {
        ToolRegistry
    }

    /// Resolved path of the binary backing `capability`, if it's on PATH.
    /// Cached for the lifetime of the process.
    pub fn resolve(&self, capability: Capability) -> Option<PathBuf> {
        let name = capability.binary_name();
        let mut paths = cache().paths.lock().unwrap_or_else(|e| e.into_inner());
        paths
            .entry(name)
            .or_insert_with(|| which::which(name).ok())
            .clone()
    }

    pub fn is_available(&self, capability: Capability) -> bool {
        self.resolve(capability).is_some()
    }

    /// Resolve every required capability, returning the binary names of any
    /// that are missing. An empty result means the run is clear to start.
    pub fn check_required(&self) -> Result<(), Vec<&'static str>> {
        let missing: Vec<&'static str> = REQUIRED_CAPABILITIES
            .iter()
            .filter(|cap| !self.is_available(**cap))
            .map(|cap| cap.binary_name())
            .collect();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(missing)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeated_lookups_return_same_answer() {
        let registry = ToolRegistry::new();
        let first = registry.is_available(Capability::Cjxl);
        let second = registry.is_available(Capability::Cjxl);
        assert_eq!(first, second);
    }

    #[test]
    fn unknown_binary_resolves_to_none() {
        let registry = ToolRegistry::new();
        // exiftool may or may not be installed in CI; only assert this
        // doesn't panic and stays consistent.
        let a = registry.resolve(Capability::Exiftool);
        let b = registry.resolve(Capability::Exiftool);
        assert_eq!(a, b);
    }

    #[test]
    fn check_required_is_consistent_with_individual_lookups() {
        let registry = ToolRegistry::new();
        let expect_ok = REQUIRED_CAPABILITIES.iter().all(|cap| registry.is_available(*cap));
        assert_eq!(registry.check_required().is_ok(), expect_ok);
    }
}
