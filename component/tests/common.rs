// Licensed under the Apache-2.0 license
#![allow(dead_code)]

use log::LevelFilter;
use simple_logger::SimpleLogger;
use std::collections::HashMap;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tempfile::NamedTempFile;
use xz2::write::XzEncoder;
use z9664f_platform::{CommandOutput, CommandRunner, ExecError, HwAccess, HwAccessError};

pub const INSTALLER_PROLOGUE: &[u8] = b"#!/bin/sh\n\
echo \"ONIE firmware update installer\"\n\
exit 0\n\
exit_marker\n";

pub fn init_logger() {
    let _ = SimpleLogger::new().with_level(LevelFilter::Debug).init();
}

/// Records every command and answers with canned outputs keyed by program name.
/// Programs without an answer fail to spawn, like a tool that is not installed.
#[derive(Clone, Default)]
pub struct MockRunner {
    responses: Arc<Mutex<HashMap<String, CommandOutput>>>,
    calls: Arc<Mutex<Vec<Vec<String>>>>,
}

impl MockRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(&self, program: &str, status: i32, stdout: &str) -> &Self {
        self.responses.lock().unwrap().insert(
            program.to_string(),
            CommandOutput {
                status: Some(status),
                stdout: stdout.to_string(),
                stderr: String::new(),
            },
        );
        self
    }

    /// Answers the staging tools the way a successful staging run does.
    pub fn onie_tools_succeed(&self) -> &Self {
        self.respond("onie_stage_fwpkg", 0, "")
            .respond("onie_mode_set", 0, "")
            .respond("reboot", 0, "")
    }

    pub fn calls(&self) -> Vec<Vec<String>> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self, program: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|call| call[0] == program)
            .count()
    }
}

impl CommandRunner for MockRunner {
    fn run(&self, program: &str, args: &[&str]) -> Result<CommandOutput, ExecError> {
        let mut call = vec![program.to_string()];
        call.extend(args.iter().map(|arg| arg.to_string()));
        self.calls.lock().unwrap().push(call);

        match self.responses.lock().unwrap().get(program) {
            Some(output) => Ok(output.clone()),
            None => Err(ExecError::Spawn {
                program: program.to_string(),
                source: io::Error::new(io::ErrorKind::NotFound, "No such file or directory"),
            }),
        }
    }
}

/// Register file backed by a map. Unset registers fail the read.
#[derive(Clone, Default)]
pub struct MockHwAccess {
    i2c: Arc<Mutex<HashMap<(u32, u8, u8), u8>>>,
    pci: Arc<Mutex<Option<u32>>>,
    reads: Arc<Mutex<usize>>,
}

impl MockHwAccess {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_i2c(&self, bus: u32, addr: u8, offset: u8, value: u8) -> &Self {
        self.i2c.lock().unwrap().insert((bus, addr, offset), value);
        self
    }

    pub fn set_cpld_version(&self, addr: u8, major: u8, minor: u8) -> &Self {
        self.set_i2c(600, addr, 1, major).set_i2c(600, addr, 0, minor)
    }

    pub fn set_pci(&self, value: u32) -> &Self {
        *self.pci.lock().unwrap() = Some(value);
        self
    }

    pub fn reads(&self) -> usize {
        *self.reads.lock().unwrap()
    }
}

impl HwAccess for MockHwAccess {
    fn i2c_get(&self, bus: u32, addr: u8, offset: u8) -> Result<u8, HwAccessError> {
        *self.reads.lock().unwrap() += 1;
        self.i2c
            .lock()
            .unwrap()
            .get(&(bus, addr, offset))
            .copied()
            .ok_or_else(|| HwAccessError::Parse("Error: Read failed".to_string()))
    }

    fn pci_get_value(&self, _resource: &Path, offset: u64) -> Result<u32, HwAccessError> {
        *self.reads.lock().unwrap() += 1;
        self.pci
            .lock()
            .unwrap()
            .ok_or(HwAccessError::OutOfRange { offset, len: 0 })
    }

    fn fpga_resource(&self) -> PathBuf {
        PathBuf::from("/sys/bus/pci/devices/0000:04:00.0/resource0")
    }
}

pub fn tar_archive(members: &[(&str, &[u8])]) -> Vec<u8> {
    let mut builder = tar::Builder::new(Vec::new());
    for (path, data) in members {
        let mut header = tar::Header::new_gnu();
        header.set_size(data.len() as u64);
        header.set_mode(0o644);
        builder.append_data(&mut header, path, *data).unwrap();
    }
    builder.into_inner().unwrap()
}

pub fn xz(data: &[u8]) -> Vec<u8> {
    let mut encoder = XzEncoder::new(Vec::new(), 6);
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}

/// An updater archive carrying `version_document` as its version manifest.
pub fn updater_archive(version_document: Option<&str>) -> Vec<u8> {
    let mut members: Vec<(&str, &[u8])> =
        vec![("firmware/onie-firmware-update", &b"#!/bin/sh\n"[..])];
    if let Some(document) = version_document {
        members.push(("firmware/fw-component-version", document.as_bytes()));
    }
    xz(&tar_archive(&members))
}

/// Writes a self-extracting firmware image: installer prologue then a tar payload.
pub fn write_image(prologue: &[u8], payload: &[u8]) -> NamedTempFile {
    let mut image = NamedTempFile::new().unwrap();
    image.write_all(prologue).unwrap();
    image.write_all(payload).unwrap();
    image.flush().unwrap();
    image
}

/// A well formed firmware image whose manifest is `version_document`.
pub fn firmware_image(version_document: &str) -> NamedTempFile {
    let updater = updater_archive(Some(version_document));
    let payload = tar_archive(&[("installer/onie-update.tar.xz", updater.as_slice())]);
    write_image(INSTALLER_PROLOGUE, &payload)
}

/// Version document listing `versions` under this platform's key.
pub fn version_document(versions: &[(&str, &str)]) -> String {
    let components: serde_json::Map<String, serde_json::Value> = versions
        .iter()
        .map(|(name, version)| (name.to_string(), serde_json::json!({ "version": version })))
        .collect();
    serde_json::json!({ "x86_64-dell_z9664f-r0": components }).to_string()
}

/// Number of entries left in a directory.
pub fn dir_entries(dir: &Path) -> usize {
    std::fs::read_dir(dir).unwrap().count()
}
