// Licensed under the Apache-2.0 license

//! Firmware components of the Dell Z9664F switch.
//!
//! Reports the installed firmware version of the BIOS, FPGA, BMC, the three
//! CPLDs and the ASIC PCIe firmware, and stages ONIE firmware update packages
//! so that they are applied on the next reboot.

pub mod catalog;
pub mod component;
pub mod config;
pub mod manifest;
pub mod stage;
pub mod version;

pub use catalog::ComponentKind;
pub use component::{
    all_components, AutoUpdateStatus, Component, ComponentBase, ComponentError, UpdateError,
    UpdateOutcome,
};
pub use config::PlatformConfig;
pub use manifest::{FirmwareImage, ManifestError, PlatformManifest, PLATFORM_KEY};
pub use version::VersionReader;
