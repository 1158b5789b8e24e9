// Licensed under the Apache-2.0 license

use crate::exec::{CommandRunner, ExecError};
use log::{debug, warn};
use nix::sys::mman::{mmap, munmap, MapFlags, ProtFlags};
use std::fs::File;
use std::io;
use std::num::NonZeroUsize;
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const DEFAULT_I2CGET: &str = "/usr/sbin/i2cget";
pub const DEFAULT_FPGA_RESOURCE: &str = "/sys/bus/pci/devices/0000:04:00.0/resource0";

const LSPCI: &str = "lspci";
const FPGA_LSPCI_MATCH: &str = "Co-processor: Xilinx";

#[derive(Error, Debug)]
pub enum HwAccessError {
    #[error(transparent)]
    Exec(#[from] ExecError),
    #[error("{program} exited with {status:?}")]
    CommandFailed {
        program: String,
        status: Option<i32>,
    },
    #[error("unexpected register value {0:?}")]
    Parse(String),
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("mmap failed: {0}")]
    Mmap(#[from] nix::Error),
    #[error("offset 0x{offset:x} outside of {len} byte resource")]
    OutOfRange { offset: u64, len: u64 },
}

/// Register access used by the version readers.
pub trait HwAccess {
    /// Reads one byte at `offset` from the I2C device at `addr` on `bus`.
    fn i2c_get(&self, bus: u32, addr: u8, offset: u8) -> Result<u8, HwAccessError>;

    /// Reads a 32-bit value at `offset` of a memory-mapped PCI resource.
    fn pci_get_value(&self, resource: &Path, offset: u64) -> Result<u32, HwAccessError>;

    /// Sysfs resource file of the FPGA's register BAR.
    fn fpga_resource(&self) -> PathBuf;
}

/// Register access on a running Linux system.
///
/// I2C reads go through `i2cget`; PCI reads map the sysfs resource file.
#[derive(Debug, Clone)]
pub struct LinuxHwAccess<C: CommandRunner> {
    runner: C,
    i2cget: String,
    fpga_fallback: PathBuf,
}

impl<C: CommandRunner> LinuxHwAccess<C> {
    pub fn new(runner: C) -> Self {
        Self {
            runner,
            i2cget: DEFAULT_I2CGET.to_string(),
            fpga_fallback: PathBuf::from(DEFAULT_FPGA_RESOURCE),
        }
    }

    pub fn with_i2cget(mut self, program: impl Into<String>) -> Self {
        self.i2cget = program.into();
        self
    }

    pub fn with_fpga_fallback(mut self, resource: impl Into<PathBuf>) -> Self {
        self.fpga_fallback = resource.into();
        self
    }
}

impl<C: CommandRunner> HwAccess for LinuxHwAccess<C> {
    fn i2c_get(&self, bus: u32, addr: u8, offset: u8) -> Result<u8, HwAccessError> {
        let bus = bus.to_string();
        let addr = format!("0x{:02x}", addr);
        let offset = format!("0x{:02x}", offset);
        let output = self.runner.run(&self.i2cget, &["-y", &bus, &addr, &offset])?;
        if !output.success() {
            return Err(HwAccessError::CommandFailed {
                program: self.i2cget.clone(),
                status: output.status,
            });
        }
        parse_i2cget_output(&output.stdout)
    }

    fn pci_get_value(&self, resource: &Path, offset: u64) -> Result<u32, HwAccessError> {
        let file = File::open(resource)?;
        let len = file.metadata()?.len();
        if offset % 4 != 0 || offset.checked_add(4).map_or(true, |end| end > len) {
            return Err(HwAccessError::OutOfRange { offset, len });
        }
        let map_len = NonZeroUsize::new(len as usize)
            .ok_or(HwAccessError::OutOfRange { offset, len })?;

        // SAFETY: the mapping is private to this call, covers the whole file, and the
        // read below stays inside it at a 4-byte aligned offset.
        unsafe {
            let base = mmap(
                None,
                map_len,
                ProtFlags::PROT_READ,
                MapFlags::MAP_SHARED,
                file.as_raw_fd(),
                0,
            )?;
            let value = (base as *const u8)
                .add(offset as usize)
                .cast::<u32>()
                .read_volatile();
            munmap(base, map_len.get())?;
            debug!("{}[0x{:x}] = 0x{:08x}", resource.display(), offset, value);
            Ok(value)
        }
    }

    fn fpga_resource(&self) -> PathBuf {
        let lookup = self
            .runner
            .run(LSPCI, &["-D"])
            .ok()
            .filter(|output| output.success())
            .and_then(|output| find_fpga_address(&output.stdout));
        match lookup {
            Some(addr) => PathBuf::from(format!("/sys/bus/pci/devices/{}/resource0", addr)),
            None => {
                warn!(
                    "FPGA not found by {}, using {}",
                    LSPCI,
                    self.fpga_fallback.display()
                );
                self.fpga_fallback.clone()
            }
        }
    }
}

fn parse_i2cget_output(stdout: &str) -> Result<u8, HwAccessError> {
    let text = stdout.trim();
    let digits = text
        .strip_prefix("0x")
        .or_else(|| text.strip_prefix("0X"))
        .unwrap_or(text);
    u8::from_str_radix(digits, 16).map_err(|_| HwAccessError::Parse(text.to_string()))
}

fn find_fpga_address(lspci: &str) -> Option<String> {
    lspci
        .lines()
        .find(|line| line.contains(FPGA_LSPCI_MATCH))
        .and_then(|line| line.split_whitespace().next())
        .map(str::to_string)
}
