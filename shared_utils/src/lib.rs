//! Shared utilities for the jxl_archiver tool.
//!
//! - Safety checks (dangerous directory detection)
//! - Atomic-replace integrity verification
//! - Metadata preservation (EXIF/IPTC/xattr/timestamps)
//! - Structured logging setup
//! - Thread/process budget calculation
//! - Generic external-process wrapper
//! - Common path/filesystem helpers

pub mod checkpoint;
pub mod common_utils;
pub mod logging;
pub mod metadata;
pub mod path_safety;
pub mod safety;
pub mod stage_process;
pub mod thread_manager;

pub use checkpoint::{
    safe_delete_original, verify_output_integrity, MIN_OUTPUT_SIZE_BEFORE_DELETE_IMAGE,
    MIN_OUTPUT_SIZE_BEFORE_DELETE_VIDEO,
};

pub use common_utils::{
    compute_relative_path, copy_file_with_context, detect_real_extension, ensure_dir_exists,
    ensure_parent_dir_exists, execute_command_with_logging, extract_digits,
    extract_suggested_extension, format_command_string, get_command_version,
    get_extension_lowercase, has_extension, is_command_available, is_hidden_file,
    normalize_path_string, parse_float_or_default, truncate_string,
};

pub use logging::{
    flush_logs, init_logging, log_external_tool, log_operation_end, log_operation_start, LogConfig,
};

pub use metadata::{propagate as propagate_metadata, verify as verify_metadata, PropagationTier};

pub use path_safety::safe_path_arg;

pub use safety::{check_dangerous_directory, check_extension_whitelist, check_safe_for_destructive};

pub use stage_process::{StageProcess, StageProcessOutput};

pub use thread_manager::{
    calculate_optimal_threads, disable_multi_instance_mode, enable_multi_instance_mode,
    get_balanced_thread_config, get_ffmpeg_threads, get_optimal_threads, is_multi_instance,
    ThreadAllocation, ThreadConfig, WorkloadType,
};
