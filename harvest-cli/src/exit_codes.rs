//! Exit codes following sysexits.h conventions.
//!
//! Scripts driving `harvest` can tell a cancelled run (partial report on
//! stdout) apart from a misconfiguration or an unreachable provider.

use harvest_core::{HarvestError, RunError};

use crate::commands::acquire::ProvidersUnavailable;

/// Successful execution.
pub const SUCCESS: i32 = 0;

/// General error (catch-all).
pub const GENERAL_ERROR: i32 = 1;

/// Command line usage error (invalid arguments).
/// Maps to EX_USAGE from sysexits.h.
pub const USAGE_ERROR: i32 = 64;

/// Input is not a decodable image.
/// Maps to EX_DATAERR from sysexits.h.
pub const DATA_ERROR: i32 = 65;

/// Cannot open input file.
/// Maps to EX_NOINPUT from sysexits.h.
pub const INPUT_ERROR: i32 = 66;

/// Every search provider failed.
/// Maps to EX_UNAVAILABLE from sysexits.h.
pub const NETWORK_ERROR: i32 = 69;

/// Output directory or hash registry could not be written.
/// Maps to EX_IOERR from sysexits.h.
pub const IO_ERROR: i32 = 74;

/// Run cancelled by signal or deadline.
/// Maps to EX_TEMPFAIL from sysexits.h.
pub const CANCELLED: i32 = 75;

/// Missing or invalid configuration.
/// Maps to EX_CONFIG from sysexits.h.
pub const CONFIG_ERROR: i32 = 78;

/// Represents an exit code with optional error context.
pub struct ExitCode {
    pub code: i32,
    pub message: Option<String>,
}

impl ExitCode {
    pub const fn success() -> Self {
        Self {
            code: SUCCESS,
            message: None,
        }
    }

    pub fn from_anyhow(err: &anyhow::Error) -> Self {
        let code = err
            .chain()
            .find_map(classify)
            .unwrap_or(GENERAL_ERROR);

        Self {
            code,
            message: Some(format!("{err:#}")),
        }
    }
}

/// Exit code for one error in the chain, if it is one we recognise.
fn classify(cause: &(dyn std::error::Error + 'static)) -> Option<i32> {
    if let Some(run) = cause.downcast_ref::<RunError>() {
        return Some(match run {
            RunError::Cancelled { .. } => CANCELLED,
            RunError::Registry { .. } => IO_ERROR,
            RunError::Setup(inner) => classify_harvest(inner),
        });
    }
    if let Some(err) = cause.downcast_ref::<HarvestError>() {
        return Some(classify_harvest(err));
    }
    if cause.downcast_ref::<ProvidersUnavailable>().is_some() {
        return Some(NETWORK_ERROR);
    }
    if let Some(io) = cause.downcast_ref::<std::io::Error>() {
        return Some(match io.kind() {
            std::io::ErrorKind::NotFound | std::io::ErrorKind::PermissionDenied => INPUT_ERROR,
            _ => IO_ERROR,
        });
    }
    None
}

fn classify_harvest(err: &HarvestError) -> i32 {
    match err {
        HarvestError::ConfigError(_) => CONFIG_ERROR,
        HarvestError::PerceptualHashError(_) => DATA_ERROR,
        HarvestError::RegistryPersistenceFailed(_) | HarvestError::StorageError(_) => IO_ERROR,
        HarvestError::Provider(_) => NETWORK_ERROR,
        HarvestError::WorkerPoolError(_) => GENERAL_ERROR,
    }
}
