// src/config.rs

//! Runtime configuration
//!
//! There is no configuration file. Everything is detected from the host
//! (`/etc/slackware-version`, `uname -m`, the user's home directory) and can
//! be overridden from the command line.

use crate::error::{Error, Result};
use crate::repository::HTTP_TIMEOUT;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;
use tracing::debug;

pub const DEFAULT_BASE_URL: &str = "https://slackbuilds.org/slackbuilds";
pub const DEFAULT_SCRATCH_DIR: &str = "/tmp/sbomanager";
pub const DEFAULT_REGISTRY_DIR: &str = "/var/log/packages";
pub const DEFAULT_INSTALLPKG: &str = "/sbin/installpkg";
pub const DEFAULT_SHELL: &str = "/bin/sh";
pub const SLACKWARE_VERSION_FILE: &str = "/etc/slackware-version";

/// Directory under `$HOME` holding the local catalog
pub const CATALOG_DIR_NAME: &str = ".sbomanager";
pub const CATALOG_FILE_NAME: &str = "pkglist";

/// Settings shared by every command
#[derive(Debug, Clone)]
pub struct Config {
    /// Repository root, without the version component
    pub base_url: String,
    /// Slackware release the repository is browsed for, e.g. `15.0`
    pub distro_version: String,
    /// Host machine architecture as reported by `uname -m`
    pub arch: String,
    /// Root of the per-package scratch workspaces
    pub scratch_dir: PathBuf,
    /// Local JSON catalog
    pub catalog_path: PathBuf,
    /// Installed package registry (`/var/log/packages`)
    pub registry_dir: PathBuf,
    pub installpkg: PathBuf,
    /// Interpreter for `.SlackBuild` scripts
    pub shell: PathBuf,
    pub http_timeout: Duration,
    /// Reject sources whose MD5 does not match the catalog
    pub verify_checksums: bool,
}

/// Command line overrides; `None` means detect or use the default
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub base_url: Option<String>,
    pub distro_version: Option<String>,
    pub arch: Option<String>,
    pub scratch_dir: Option<PathBuf>,
    pub catalog_path: Option<PathBuf>,
    pub registry_dir: Option<PathBuf>,
    pub verify_checksums: Option<bool>,
}

impl Config {
    /// Build the configuration, detecting anything not overridden
    pub fn load(overrides: Overrides) -> Result<Self> {
        let distro_version = match overrides.distro_version {
            Some(version) => version,
            None => detect_distro_version(Path::new(SLACKWARE_VERSION_FILE))?,
        };

        let arch = overrides.arch.unwrap_or_else(detect_arch);

        let catalog_path = match overrides.catalog_path {
            Some(path) => path,
            None => default_catalog_path()?,
        };

        let config = Self {
            base_url: overrides
                .base_url
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            distro_version,
            arch,
            scratch_dir: overrides
                .scratch_dir
                .unwrap_or_else(|| PathBuf::from(DEFAULT_SCRATCH_DIR)),
            catalog_path,
            registry_dir: overrides
                .registry_dir
                .unwrap_or_else(|| PathBuf::from(DEFAULT_REGISTRY_DIR)),
            installpkg: PathBuf::from(DEFAULT_INSTALLPKG),
            shell: PathBuf::from(DEFAULT_SHELL),
            http_timeout: HTTP_TIMEOUT,
            verify_checksums: overrides.verify_checksums.unwrap_or(true),
        };

        debug!("Configuration: {:?}", config);
        Ok(config)
    }
}

/// Read the release number from `/etc/slackware-version`
pub fn detect_distro_version(path: &Path) -> Result<String> {
    let contents = fs::read_to_string(path).map_err(|e| {
        Error::Config(format!(
            "Failed to read {}: {} (use --distro-version)",
            path.display(),
            e
        ))
    })?;

    parse_distro_version(&contents).ok_or_else(|| {
        Error::Config(format!(
            "Unrecognized contents in {}: {:?}",
            path.display(),
            contents.trim()
        ))
    })
}

/// `Slackware 15.0` -> `15.0`
pub fn parse_distro_version(contents: &str) -> Option<String> {
    contents.split_whitespace().nth(1).map(str::to_string)
}

/// Machine architecture from `uname -m`, or the compile target as a fallback
pub fn detect_arch() -> String {
    let uname = Command::new("uname")
        .arg("-m")
        .output()
        .ok()
        .filter(|output| output.status.success())
        .map(|output| String::from_utf8_lossy(&output.stdout).trim().to_string())
        .filter(|arch| !arch.is_empty());

    uname.unwrap_or_else(|| std::env::consts::ARCH.to_string())
}

/// `~/.sbomanager/pkglist`
pub fn default_catalog_path() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| Error::Config("Unable to determine home directory (use --catalog)".to_string()))?;
    Ok(home.join(CATALOG_DIR_NAME).join(CATALOG_FILE_NAME))
}
