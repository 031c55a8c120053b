// src/build/installer.rs

//! Installed state and `installpkg`
//!
//! Slackware records every installed package as a file named
//! `<name>-<version>-<arch>-<build>` in `/var/log/packages`. Installing is
//! delegated to pkgtools; nothing here writes to the registry directly.

use super::Installer;
use crate::error::{Error, Result};
use glob::Pattern;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::{debug, info};

/// Installs with `/sbin/installpkg`, probes `/var/log/packages`
#[derive(Debug, Clone)]
pub struct PkgtoolInstaller {
    registry_dir: PathBuf,
    installpkg: PathBuf,
}

impl PkgtoolInstaller {
    pub fn new(registry_dir: impl Into<PathBuf>, installpkg: impl Into<PathBuf>) -> Self {
        Self {
            registry_dir: registry_dir.into(),
            installpkg: installpkg.into(),
        }
    }
}

impl Installer for PkgtoolInstaller {
    fn is_installed(&self, name: &str) -> Result<bool> {
        let pattern = self
            .registry_dir
            .join(format!("{}-*", Pattern::escape(name)));
        let pattern = pattern.to_string_lossy();

        let entries = glob::glob(&pattern)
            .map_err(|e| Error::Config(format!("Invalid registry pattern {}: {}", pattern, e)))?;

        let installed = entries
            .filter_map(|entry| entry.ok())
            .filter_map(|path| path.file_name().map(|n| n.to_string_lossy().into_owned()))
            .any(|entry| is_registry_entry_for(&entry, name));

        debug!("{} installed: {}", name, installed);
        Ok(installed)
    }

    fn install(&self, name: &str, artifact: &Path) -> Result<()> {
        info!("Installing {} from {}", name, artifact.display());

        let status = Command::new(&self.installpkg)
            .arg(artifact)
            .status()
            .map_err(|e| Error::InstallFailed {
                package: name.to_string(),
                reason: format!("failed to run {}: {}", self.installpkg.display(), e),
            })?;

        if !status.success() {
            return Err(Error::InstallFailed {
                package: name.to_string(),
                reason: format!("{} exited with {}", self.installpkg.display(), status),
            });
        }

        Ok(())
    }
}

/// Whether a registry file name belongs to package `name`
///
/// The remainder after `<name>-` must be exactly `version-arch-build`, so
/// `foo` does not claim `foo-bar-1.0-x86_64-1`.
pub fn is_registry_entry_for(entry: &str, name: &str) -> bool {
    entry
        .strip_prefix(name)
        .and_then(|rest| rest.strip_prefix('-'))
        .map(|rest| {
            let fields: Vec<&str> = rest.split('-').collect();
            fields.len() == 3 && fields.iter().all(|f| !f.is_empty())
        })
        .unwrap_or(false)
}
