// Licensed under the Apache-2.0 license

use log::{info, warn};
use std::path::Path;
use thiserror::Error;
use z9664f_platform::{CommandRunner, ExecError};

const ONIE_STAGE_FWPKG: &str = "onie_stage_fwpkg";
const ONIE_MODE_SET: &str = "onie_mode_set";
const REBOOT: &str = "reboot";

/// `onie_stage_fwpkg` exit code for "staged, with something to tell the operator".
const STAGE_ADVISORY_EXIT: i32 = 2;

pub const STAGED_MESSAGE: &str = "INFO: Firmware upgrade staged";

#[derive(Error, Debug)]
pub enum StageError {
    #[error(transparent)]
    Exec(#[from] ExecError),
    /// The package could not be staged.
    #[error("{0}")]
    Stage(String),
    /// The package was staged but ONIE was not switched into update mode.
    #[error("{0}")]
    ModeSwitch(String),
}

/// Stages `image` with ONIE so that it is applied on the next reboot.
///
/// # Returns
///
/// * `Result<String, StageError>` - The advisory printed by the staging tool when it
///   exits with status 2, otherwise a fixed confirmation.
///
/// Nothing is rolled back if the mode switch fails after a successful stage.
pub fn stage_firmware_package<C: CommandRunner>(
    runner: &C,
    image: &Path,
) -> Result<String, StageError> {
    let image = image.to_string_lossy();
    let output = runner.run(ONIE_STAGE_FWPKG, &["-a", &image])?;
    let advisory = match output.status {
        Some(0) => None,
        Some(STAGE_ADVISORY_EXIT) => Some(output.combined().trim().to_string()),
        _ => return Err(StageError::Stage(output.combined().trim().to_string())),
    };

    let output = runner.run(ONIE_MODE_SET, &["-o", "update"])?;
    if !output.success() {
        return Err(StageError::ModeSwitch(output.combined().trim().to_string()));
    }

    Ok(advisory
        .filter(|advisory| !advisory.is_empty())
        .unwrap_or_else(|| STAGED_MESSAGE.to_string()))
}

/// Reboots the system so that a staged package is applied.
pub fn trigger_reboot<C: CommandRunner>(runner: &C) -> Result<(), ExecError> {
    info!("Rebooting to apply staged firmware");
    let output = runner.run(REBOOT, &[])?;
    if !output.success() {
        warn!("{} exited with {:?}", REBOOT, output.status);
    }
    Ok(())
}
