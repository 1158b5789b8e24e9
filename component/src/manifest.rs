// Licensed under the Apache-2.0 license

//! Reads the component version manifest bundled in an ONIE firmware image.
//!
//! A firmware image is a self-extracting shell installer. Its text prologue
//! ends with a line reading `exit_marker`; a tar stream follows, holding the
//! compressed updater archive `installer/onie-update.tar.xz`. The updater in
//! turn carries `firmware/fw-component-version`, a JSON object keyed by
//! platform identifier.

use log::debug;
use serde::Serialize;
use serde_json::{Map, Value};
use std::fs::File;
use std::io::{self, BufRead, BufReader, Read};
use std::path::{Path, PathBuf};
use tar::Archive;
use tempfile::TempDir;
use thiserror::Error;
use xz2::read::XzDecoder;

pub const PLATFORM_KEY: &str = "x86_64-dell_z9664f-r0";

const EXIT_MARKER: &[u8] = b"exit_marker";
const UPDATER_MEMBER: &str = "installer/onie-update.tar.xz";
const VERSION_MEMBER: &str = "firmware/fw-component-version";
const XZ_MAGIC: &[u8] = &[0xfd, b'7', b'z', b'X', b'Z', 0x00];
const WORK_DIR_PREFIX: &str = "fwpkg";

#[derive(Error, Debug)]
pub enum ManifestError {
    #[error("File not found: {}", .0.display())]
    FileNotFound(PathBuf),
    #[error("Unable to extract firmware updater")]
    ExtractUpdater(#[source] io::Error),
    #[error("Version info not available")]
    VersionInfoUnavailable,
    #[error("Malformed version info: {0}")]
    MalformedVersionInfo(#[from] serde_json::Error),
}

/// The versions one image would install on this platform, by component name.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct PlatformManifest {
    components: Map<String, Value>,
}

impl PlatformManifest {
    /// Selects this platform's section of a decoded version document.
    pub fn from_document(document: &Value) -> Result<Self, ManifestError> {
        match document.get(PLATFORM_KEY) {
            Some(Value::Object(components)) if !components.is_empty() => Ok(Self {
                components: components.clone(),
            }),
            _ => Err(ManifestError::VersionInfoUnavailable),
        }
    }

    /// The update-info record of `component`, if the image lists it.
    pub fn entry(&self, component: &str) -> Option<&Map<String, Value>> {
        self.components.get(component).and_then(Value::as_object)
    }

    /// The non-empty `version` of `component`.
    ///
    /// A missing entry, a missing field and a non-string or empty value all
    /// read as `None`.
    pub fn available_version(&self, component: &str) -> Option<&str> {
        self.entry(component)
            .and_then(|entry| entry.get("version"))
            .and_then(Value::as_str)
            .filter(|version| !version.is_empty())
    }

    pub fn component_names(&self) -> impl Iterator<Item = &str> {
        self.components.keys().map(String::as_str)
    }
}

/// A firmware image on disk.
#[derive(Debug, Clone)]
pub struct FirmwareImage {
    path: PathBuf,
    work_dir: Option<PathBuf>,
}

impl FirmwareImage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            work_dir: None,
        }
    }

    /// Parent of the scratch directory used while extracting. Defaults to the
    /// system temporary directory.
    pub fn with_work_dir(mut self, work_dir: Option<PathBuf>) -> Self {
        self.work_dir = work_dir;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Extracts and decodes this platform's version manifest.
    ///
    /// The manifest is rebuilt from the image on every call. The scratch
    /// directory holding the extracted updater is removed before returning,
    /// on success and on failure.
    pub fn available_versions(&self) -> Result<PlatformManifest, ManifestError> {
        if !self.path.is_file() {
            return Err(ManifestError::FileNotFound(self.path.clone()));
        }

        let scratch = self.scratch_dir().map_err(ManifestError::ExtractUpdater)?;
        debug!(
            "Extracting {} from {} into {}",
            UPDATER_MEMBER,
            self.path.display(),
            scratch.path().display()
        );
        let updater = self
            .extract_updater(scratch.path())
            .map_err(ManifestError::ExtractUpdater)?;
        let document = read_version_document(&updater)?;
        PlatformManifest::from_document(&document)
    }

    fn scratch_dir(&self) -> io::Result<TempDir> {
        let mut builder = tempfile::Builder::new();
        builder.prefix(WORK_DIR_PREFIX);
        match &self.work_dir {
            Some(dir) => builder.tempdir_in(dir),
            None => builder.tempdir(),
        }
    }

    /// Unpacks the updater archive that follows the installer prologue into `dest`.
    fn extract_updater(&self, dest: &Path) -> io::Result<PathBuf> {
        let mut reader = BufReader::new(File::open(&self.path)?);
        skip_installer_prologue(&mut reader)?;

        let mut payload = Archive::new(reader);
        for entry in payload.entries()? {
            let mut entry = entry?;
            if member_matches(&entry.path()?, UPDATER_MEMBER) {
                entry.unpack_in(dest)?;
                return Ok(dest.join(UPDATER_MEMBER));
            }
        }
        Err(io::Error::new(
            io::ErrorKind::NotFound,
            format!("{} not in image payload", UPDATER_MEMBER),
        ))
    }
}

/// Consumes everything up to and including the `exit_marker` line.
///
/// The first line is always consumed and is never taken as the marker.
fn skip_installer_prologue<R: BufRead>(reader: &mut R) -> io::Result<()> {
    let mut line = Vec::new();
    let mut first = true;
    loop {
        line.clear();
        if reader.read_until(b'\n', &mut line)? == 0 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "installer marker not found",
            ));
        }
        let content = line.strip_suffix(b"\n").unwrap_or(&line);
        if !first && content == EXIT_MARKER {
            return Ok(());
        }
        first = false;
    }
}

fn member_matches(path: &Path, member: &str) -> bool {
    path.strip_prefix(".").unwrap_or(path) == Path::new(member)
}

fn read_version_document(updater: &Path) -> Result<Value, ManifestError> {
    let mut file = File::open(updater).map_err(ManifestError::ExtractUpdater)?;
    let mut magic = [0u8; 6];
    let is_xz = match file.read_exact(&mut magic) {
        Ok(()) => magic == XZ_MAGIC,
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => false,
        Err(e) => return Err(ManifestError::ExtractUpdater(e)),
    };
    let file = File::open(updater).map_err(ManifestError::ExtractUpdater)?;
    let contents: Box<dyn Read> = if is_xz {
        Box::new(XzDecoder::new(file))
    } else {
        Box::new(file)
    };

    let mut archive = Archive::new(contents);
    let entries = archive.entries().map_err(ManifestError::ExtractUpdater)?;
    let mut members = 0usize;
    for entry in entries {
        let mut entry = entry.map_err(ManifestError::ExtractUpdater)?;
        members += 1;
        let path = entry.path().map_err(ManifestError::ExtractUpdater)?;
        if member_matches(&path, VERSION_MEMBER) {
            let mut data = Vec::new();
            entry
                .read_to_end(&mut data)
                .map_err(ManifestError::ExtractUpdater)?;
            return Ok(serde_json::from_slice(&data)?);
        }
    }
    if members == 0 {
        return Err(ManifestError::ExtractUpdater(io::Error::new(
            io::ErrorKind::InvalidData,
            "empty updater archive",
        )));
    }
    Err(ManifestError::VersionInfoUnavailable)
}
