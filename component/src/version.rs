// Licensed under the Apache-2.0 license

//! Installed-version readers, one per kind of firmware source.
//!
//! Each reader reports failure explicitly through [`ReadError`]; callers that
//! only need a display value use [`VersionReader::read_or_unavailable`], which
//! maps any failure to the reader's sentinel.

use lazy_static::lazy_static;
use log::debug;
use regex::Regex;
use thiserror::Error;
use z9664f_platform::{CommandOutput, CommandRunner, ExecError, HwAccess, HwAccessError};

const DMIDECODE: &str = "dmidecode";
const IPMITOOL: &str = "ipmitool";
const SSDUTIL: &str = "ssdutil";
const BCMCMD: &str = "bcmcmd";

const BMC_REVISION_LABEL: &str = "Firmware Revision";

/// Sentinel of readers whose source has no natural "not available" value.
pub const EMPTY_VERSION: &str = "";
pub const NA_VERSION: &str = "NA";

lazy_static! {
    static ref SSD_FIRMWARE_RE: Regex = Regex::new(r"Firmware\s*:(.*)").unwrap();
    static ref PCIE_LOADER_RE: Regex = Regex::new(r"PCIe FW loader version:\s(.*)").unwrap();
}

#[derive(Error, Debug)]
pub enum ReadError {
    #[error(transparent)]
    Exec(#[from] ExecError),
    #[error("{program} exited with {status:?}")]
    CommandFailed {
        program: &'static str,
        status: Option<i32>,
    },
    #[error("register read failed: {0}")]
    Register(#[from] HwAccessError),
    #[error("no version in {0} output")]
    NotFound(&'static str),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VersionReader {
    /// `dmidecode -s system-version`
    Bios,
    /// Register 0 of the FPGA BAR, high byte major and low byte minor.
    Fpga,
    /// Firmware revision reported by `ipmitool mc info`.
    Bmc,
    /// Byte 1 (major) and byte 0 (minor) of a CPLD on the I2C bus.
    Cpld { bus: u32, addr: u8 },
    /// `ssdutil -v`
    Ssd,
    /// `bcmcmd 'pciephy fw version'`
    Pcie,
}

impl VersionReader {
    pub fn read<C: CommandRunner, H: HwAccess>(
        &self,
        runner: &C,
        hw: &H,
    ) -> Result<String, ReadError> {
        match *self {
            VersionReader::Bios => {
                let output = run_checked(runner, DMIDECODE, &["-s", "system-version"])?;
                Ok(output.stdout.trim().to_string())
            }
            VersionReader::Fpga => {
                let value = hw.pci_get_value(&hw.fpga_resource(), 0)?;
                Ok(format!("{}.{}", (value >> 8) & 0xff, value & 0xff))
            }
            VersionReader::Bmc => {
                let output = run_checked(runner, IPMITOOL, &["mc", "info"])?;
                Ok(bmc_revision(&output.stdout))
            }
            VersionReader::Cpld { bus, addr } => {
                let major = hw.i2c_get(bus, addr, 1)?;
                let minor = hw.i2c_get(bus, addr, 0)?;
                Ok(format!("{}.{}", major, minor))
            }
            VersionReader::Ssd => {
                let output = run_checked(runner, SSDUTIL, &["-v"])?;
                capture_trimmed(&SSD_FIRMWARE_RE, &output.combined())
                    .ok_or(ReadError::NotFound(SSDUTIL))
            }
            VersionReader::Pcie => {
                let output = run_checked(runner, BCMCMD, &["pciephy fw version"])?;
                capture_trimmed(&PCIE_LOADER_RE, &output.combined())
                    .ok_or(ReadError::NotFound(BCMCMD))
            }
        }
    }

    /// The value reported when the version cannot be read.
    pub fn unavailable(&self) -> &'static str {
        match self {
            VersionReader::Ssd | VersionReader::Pcie => NA_VERSION,
            _ => EMPTY_VERSION,
        }
    }

    pub fn read_or_unavailable<C: CommandRunner, H: HwAccess>(
        &self,
        runner: &C,
        hw: &H,
    ) -> String {
        match self.read(runner, hw) {
            Ok(version) => version,
            Err(e) => {
                debug!("{:?} version unavailable: {}", self, e);
                self.unavailable().to_string()
            }
        }
    }
}

fn run_checked<C: CommandRunner>(
    runner: &C,
    program: &'static str,
    args: &[&str],
) -> Result<CommandOutput, ReadError> {
    let output = runner.run(program, args)?;
    if !output.success() {
        return Err(ReadError::CommandFailed {
            program,
            status: output.status,
        });
    }
    Ok(output)
}

/// Last field of every line mentioning the firmware revision, one per line.
fn bmc_revision(mc_info: &str) -> String {
    mc_info
        .lines()
        .filter(|line| line.contains(BMC_REVISION_LABEL))
        .filter_map(|line| line.split_whitespace().last())
        .collect::<Vec<_>>()
        .join("\n")
}

fn capture_trimmed(re: &Regex, text: &str) -> Option<String> {
    re.captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bmc_revision_takes_last_field() {
        let mc_info = "Device ID                 : 32\n\
                       Device Revision           : 1\n\
                       Firmware Revision         : 2.14\n\
                       IPMI Version              : 2.0\n";
        assert_eq!(bmc_revision(mc_info), "2.14");
        assert_eq!(bmc_revision("Device ID : 32\n"), "");
    }

    #[test]
    fn test_ssd_firmware_capture() {
        let out = "Device Model : SFSA064GM1AA4TO\nFirmware     : 0202-000\nSerial Number: X\n";
        assert_eq!(
            capture_trimmed(&SSD_FIRMWARE_RE, out).as_deref(),
            Some("0202-000")
        );
        assert_eq!(capture_trimmed(&SSD_FIRMWARE_RE, "Serial: X\n"), None);
    }

    #[test]
    fn test_pcie_loader_capture() {
        let out = "PCIe FW loader version: 1.8\nPCIe FW version: D102_0E\n";
        assert_eq!(
            capture_trimmed(&PCIE_LOADER_RE, out).as_deref(),
            Some("1.8")
        );
    }

    #[test]
    fn test_unavailable_sentinels() {
        assert_eq!(VersionReader::Bios.unavailable(), "");
        assert_eq!(VersionReader::Cpld { bus: 600, addr: 0x38 }.unavailable(), "");
        assert_eq!(VersionReader::Ssd.unavailable(), "NA");
        assert_eq!(VersionReader::Pcie.unavailable(), "NA");
    }
}
