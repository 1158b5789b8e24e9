// Licensed under the Apache-2.0 license

//! Platform access shared by the Z9664F component crates.
//!
//! Two seams are provided: [`CommandRunner`] for external programs and
//! [`HwAccess`] for register reads. Both have Linux implementations and are
//! replaced by mocks in tests.

pub mod exec;
pub mod hwaccess;

pub use exec::{CommandOutput, CommandRunner, ExecError, SystemCommandRunner};
pub use hwaccess::{HwAccess, HwAccessError, LinuxHwAccess};
