// Licensed under the Apache-2.0 license

use crate::catalog::ComponentKind;
use crate::config::PlatformConfig;
use crate::manifest::{FirmwareImage, ManifestError};
use crate::stage::{self, StageError};
use log::{error, info};
use num_derive::{FromPrimitive, ToPrimitive};
use num_traits::ToPrimitive;
use std::cell::OnceCell;
use std::path::{Path, PathBuf};
use thiserror::Error;
use z9664f_platform::{CommandRunner, ExecError, HwAccess};

pub const COLD_REBOOT_NOTIFICATION: &str = "Cold reboot is required to perform firmware upgrade";
const UP_TO_DATE_MESSAGE: &str = "Firmware version up-to-date";

/// The only boot type a staged update can be scheduled for.
pub const COLD_BOOT: &str = "cold";

#[derive(Error, Debug)]
pub enum ComponentError {
    #[error("no component at index {0}")]
    UnknownIndex(usize),
}

/// A hard update failure, carrying the underlying diagnostic.
#[derive(Error, Debug)]
pub enum UpdateError {
    #[error(transparent)]
    Manifest(#[from] ManifestError),
    #[error(transparent)]
    Stage(#[from] StageError),
    #[error("failed to reboot: {0}")]
    Reboot(#[source] ExecError),
}

/// Result of [`ComponentBase::auto_update_firmware`]. Positive codes are
/// successes, negative codes failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromPrimitive, ToPrimitive)]
pub enum AutoUpdateStatus {
    /// The image carries the version that is already installed.
    Installed = 1,
    /// Applied immediately. This platform only schedules updates, so this is never returned.
    Updated = 2,
    /// Staged, applied on the next cold reboot.
    Scheduled = 3,
    /// An update is needed but the requested boot type cannot apply it.
    ErrBootType = -1,
    /// The image or its version manifest could not be read.
    ErrImage = -2,
    /// Reserved for failures the host detects itself.
    ErrUnknown = -3,
}

impl AutoUpdateStatus {
    pub fn code(&self) -> i32 {
        self.to_i32().unwrap_or(AutoUpdateStatus::ErrUnknown as i32)
    }

    pub fn is_success(&self) -> bool {
        self.code() > 0
    }
}

/// What [`ComponentBase::update_firmware`] did when it did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// The image path is not a file; nothing was attempted.
    ImageNotFound,
    /// The installed version already matches the image.
    UpToDate,
    /// The update was staged and a reboot was issued.
    RebootIssued,
}

/// The component interface expected by the platform host.
pub trait ComponentBase {
    fn get_name(&self) -> &str;

    fn get_description(&self) -> &str;

    /// The installed firmware version, or the reader's sentinel when it
    /// cannot be read.
    fn get_firmware_version(&self) -> &str;

    fn get_presence(&self) -> bool {
        true
    }

    fn get_model(&self) -> &str {
        "NA"
    }

    fn get_serial(&self) -> &str {
        "NA"
    }

    fn get_status(&self) -> bool {
        true
    }

    /// 1-based position in the parent device, or -1 when it cannot be determined.
    fn get_position_in_parent(&self) -> i32 {
        -1
    }

    fn is_replaceable(&self) -> bool {
        false
    }

    /// The version `image` would install, or `"NA"`.
    fn get_available_firmware_version(&self, image: &Path) -> String;

    /// What the operator must do to complete an update from `image`, or
    /// `None` if no action is required.
    fn get_firmware_update_notification(&self, image: &Path) -> Option<String>;

    /// Installs `image` without activating it. Returns `true` on success,
    /// including when no update is needed.
    fn install_firmware(&self, image: &Path) -> bool;

    /// Installs `image` and performs whatever is needed to activate it.
    fn update_firmware(&self, image: &Path) -> Result<UpdateOutcome, UpdateError>;

    /// Installs `image` and schedules activation for the given boot type.
    fn auto_update_firmware(
        &self,
        image: &Path,
        boot_type: &str,
    ) -> Result<AutoUpdateStatus, UpdateError>;
}

/// One Z9664F firmware component.
///
/// The installed version is read on first use and kept for the life of the
/// object. The cache is not synchronized; a `Component` is used from one
/// thread.
pub struct Component<C: CommandRunner, H: HwAccess> {
    kind: ComponentKind,
    runner: C,
    hw: H,
    work_dir: Option<PathBuf>,
    version: OnceCell<String>,
}

impl<C: CommandRunner, H: HwAccess> Component<C, H> {
    /// Creates the component at catalog position `index`.
    pub fn new(index: usize, runner: C, hw: H) -> Result<Self, ComponentError> {
        let kind = ComponentKind::from_index(index).ok_or(ComponentError::UnknownIndex(index))?;
        Ok(Self::from_kind(kind, runner, hw))
    }

    pub fn from_kind(kind: ComponentKind, runner: C, hw: H) -> Self {
        Self {
            kind,
            runner,
            hw,
            work_dir: None,
            version: OnceCell::new(),
        }
    }

    /// Parent directory for the scratch space used while reading images.
    pub fn with_work_dir(mut self, work_dir: Option<PathBuf>) -> Self {
        self.work_dir = work_dir;
        self
    }

    pub fn kind(&self) -> ComponentKind {
        self.kind
    }

    fn firmware_image(&self, image: &Path) -> FirmwareImage {
        FirmwareImage::new(image).with_work_dir(self.work_dir.clone())
    }

    /// The version `image` would install if it differs from the installed one.
    fn pending_update(&self, image: &Path) -> Result<Option<String>, ManifestError> {
        let manifest = self.firmware_image(image).available_versions()?;
        Ok(manifest
            .available_version(self.kind.name())
            .filter(|available| *available != self.get_firmware_version())
            .map(str::to_string))
    }
}

impl<C: CommandRunner, H: HwAccess> ComponentBase for Component<C, H> {
    fn get_name(&self) -> &str {
        self.kind.name()
    }

    fn get_description(&self) -> &str {
        self.kind.description()
    }

    fn get_firmware_version(&self) -> &str {
        self.version
            .get_or_init(|| self.kind.reader().read_or_unavailable(&self.runner, &self.hw))
    }

    fn get_available_firmware_version(&self, image: &Path) -> String {
        match self.firmware_image(image).available_versions() {
            Ok(manifest) => manifest
                .available_version(self.kind.name())
                .unwrap_or("NA")
                .to_string(),
            Err(e) => {
                error!("{}", e);
                "NA".to_string()
            }
        }
    }

    fn get_firmware_update_notification(&self, image: &Path) -> Option<String> {
        match self.pending_update(image) {
            Ok(Some(_)) => Some(COLD_REBOOT_NOTIFICATION.to_string()),
            Ok(None) => None,
            Err(e) => {
                error!("{}", e);
                None
            }
        }
    }

    fn install_firmware(&self, image: &Path) -> bool {
        match self.pending_update(image) {
            Ok(Some(version)) => {
                info!("{}: staging version {}", self.kind, version);
                match stage::stage_firmware_package(&self.runner, image) {
                    Ok(message) => {
                        info!("{}", message);
                        true
                    }
                    Err(e) => {
                        error!("{}", e);
                        false
                    }
                }
            }
            Ok(None) => {
                info!("{}", UP_TO_DATE_MESSAGE);
                true
            }
            Err(e) => {
                error!("{}", e);
                false
            }
        }
    }

    fn update_firmware(&self, image: &Path) -> Result<UpdateOutcome, UpdateError> {
        if !image.is_file() {
            return Ok(UpdateOutcome::ImageNotFound);
        }

        match self.pending_update(image)? {
            Some(version) => {
                info!("{}: staging version {}", self.kind, version);
                let message = stage::stage_firmware_package(&self.runner, image)?;
                info!("{}", message);
                stage::trigger_reboot(&self.runner).map_err(UpdateError::Reboot)?;
                Ok(UpdateOutcome::RebootIssued)
            }
            None => {
                info!("{}", UP_TO_DATE_MESSAGE);
                Ok(UpdateOutcome::UpToDate)
            }
        }
    }

    fn auto_update_firmware(
        &self,
        image: &Path,
        boot_type: &str,
    ) -> Result<AutoUpdateStatus, UpdateError> {
        let pending = match self.pending_update(image) {
            Ok(pending) => pending,
            Err(e) => {
                error!("{}", e);
                return Ok(AutoUpdateStatus::ErrImage);
            }
        };

        match pending {
            Some(_) if boot_type != COLD_BOOT => Ok(AutoUpdateStatus::ErrBootType),
            Some(version) => {
                info!("{}: scheduling version {}", self.kind, version);
                let message = stage::stage_firmware_package(&self.runner, image)?;
                info!("{}", message);
                Ok(AutoUpdateStatus::Scheduled)
            }
            None => {
                info!("{}", UP_TO_DATE_MESSAGE);
                Ok(AutoUpdateStatus::Installed)
            }
        }
    }
}

/// Builds every catalog component, in catalog order.
pub fn all_components<C, H>(runner: C, hw: H, config: &PlatformConfig) -> Vec<Component<C, H>>
where
    C: CommandRunner + Clone,
    H: HwAccess + Clone,
{
    ComponentKind::ALL
        .iter()
        .map(|kind| {
            Component::from_kind(*kind, runner.clone(), hw.clone())
                .with_work_dir(config.work_dir.clone())
        })
        .collect()
}
