// src/build/workspace.rs

//! Per-package scratch workspace
//!
//! Bundles from SlackBuilds.org unpack to a single top-level directory named
//! after the package, so extracting into the scratch root yields
//! `<scratch>/<name>/<name>.SlackBuild` plus the README, .info file and any
//! patches. Sources are downloaded next to the script.

use crate::catalog::is_valid_package_name;
use crate::error::{Error, Result};
use flate2::read::GzDecoder;
use std::fs;
use std::io::Read;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use tar::Archive;
use tracing::{debug, warn};

/// Scratch directory for one package
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Workspace {
    name: String,
    root: PathBuf,
    dir: PathBuf,
}

impl Workspace {
    pub fn new(scratch_root: &Path, name: &str) -> Self {
        Self {
            name: name.to_string(),
            root: scratch_root.to_path_buf(),
            dir: scratch_root.join(name),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Scratch root the bundle is extracted into
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// `<scratch>/<name>`
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// `<name>.SlackBuild`
    pub fn script_name(&self) -> String {
        format!("{}.SlackBuild", self.name)
    }

    pub fn script_path(&self) -> PathBuf {
        self.dir.join(self.script_name())
    }

    pub fn source_path(&self, file_name: &str) -> PathBuf {
        self.dir.join(file_name)
    }

    /// Create the scratch root and clear leftovers from an earlier run
    ///
    /// The package name must be a single path component, so the directory
    /// removed here is always a child of the scratch root.
    pub fn prepare(&self) -> Result<()> {
        if !is_valid_package_name(&self.name) {
            return Err(Error::FetchFailed {
                package: self.name.clone(),
                reason: format!("'{}' cannot be used as a workspace directory", self.name),
            });
        }

        fs::create_dir_all(&self.root)?;
        if self.dir.exists() {
            debug!("Removing stale workspace {}", self.dir.display());
            fs::remove_dir_all(&self.dir)?;
        }
        Ok(())
    }

    /// Check the bundle provided the build script and make it executable
    pub fn make_script_executable(&self) -> Result<()> {
        let script = self.script_path();
        if !script.is_file() {
            return Err(Error::FetchFailed {
                package: self.name.clone(),
                reason: format!("bundle did not contain {}", self.script_name()),
            });
        }

        fs::set_permissions(&script, fs::Permissions::from_mode(0o755))?;
        Ok(())
    }
}

/// Unpack a `.tar.gz` stream into `dest`, returning the number of entries
///
/// Entries whose path would land outside `dest` are skipped.
pub fn extract_archive<R: Read>(reader: R, dest: &Path) -> Result<usize> {
    fs::create_dir_all(dest)?;

    let mut archive = Archive::new(GzDecoder::new(reader));
    let mut count = 0;

    for entry in archive.entries()? {
        let mut entry = entry?;
        let path = entry.path()?.into_owned();

        if entry.unpack_in(dest)? {
            debug!("{}", dest.join(&path).display());
            count += 1;
        } else {
            warn!("Skipping archive entry outside workspace: {}", path.display());
        }
    }

    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::Compression;
    use flate2::write::GzEncoder;

    fn bundle(name: &str) -> Vec<u8> {
        let encoder = GzEncoder::new(Vec::new(), Compression::default());
        let mut builder = tar::Builder::new(encoder);

        let mut dir = tar::Header::new_gnu();
        dir.set_entry_type(tar::EntryType::Directory);
        dir.set_mode(0o755);
        dir.set_size(0);
        dir.set_cksum();
        builder
            .append_data(&mut dir, format!("{}/", name), std::io::empty())
            .unwrap();

        for (file, body) in [
            (format!("{}/{}.SlackBuild", name, name), "#!/bin/sh\necho build\n"),
            (format!("{}/README", name), "readme\n"),
        ] {
            let mut header = tar::Header::new_gnu();
            header.set_mode(0o644);
            header.set_size(body.len() as u64);
            header.set_cksum();
            builder.append_data(&mut header, file, body.as_bytes()).unwrap();
        }

        builder.into_inner().unwrap().finish().unwrap()
    }

    #[test]
    fn test_workspace_paths() {
        let ws = Workspace::new(Path::new("/tmp/sbomanager"), "htop");
        assert_eq!(ws.dir(), Path::new("/tmp/sbomanager/htop"));
        assert_eq!(
            ws.script_path(),
            PathBuf::from("/tmp/sbomanager/htop/htop.SlackBuild")
        );
        assert_eq!(
            ws.source_path("htop-3.3.0.tar.xz"),
            PathBuf::from("/tmp/sbomanager/htop/htop-3.3.0.tar.xz")
        );
    }

    #[test]
    fn test_extract_and_make_executable() {
        let temp_dir = tempfile::tempdir().unwrap();
        let ws = Workspace::new(temp_dir.path(), "htop");
        ws.prepare().unwrap();

        let count = extract_archive(bundle("htop").as_slice(), ws.root()).unwrap();
        assert_eq!(count, 3);
        assert!(ws.dir().join("README").is_file());

        ws.make_script_executable().unwrap();
        let mode = fs::metadata(ws.script_path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o755);
    }

    #[test]
    fn test_prepare_clears_stale_workspace() {
        let temp_dir = tempfile::tempdir().unwrap();
        let ws = Workspace::new(temp_dir.path(), "htop");
        fs::create_dir_all(ws.dir()).unwrap();
        fs::write(ws.source_path("old.tar.gz"), b"stale").unwrap();

        ws.prepare().unwrap();
        assert!(!ws.dir().exists());
        assert!(ws.root().exists());
    }

    #[test]
    fn test_prepare_refuses_names_outside_scratch_root() {
        let temp_dir = tempfile::tempdir().unwrap();
        let scratch = temp_dir.path().join("scratch");
        let victim = temp_dir.path().join("victim");
        fs::create_dir_all(&scratch).unwrap();
        fs::create_dir_all(&victim).unwrap();
        fs::write(victim.join("keep"), b"data").unwrap();

        for name in ["../victim", "..", "."] {
            let ws = Workspace::new(&scratch, name);
            assert!(matches!(ws.prepare(), Err(Error::FetchFailed { .. })));
        }

        assert!(victim.join("keep").is_file());
        assert!(scratch.is_dir());
    }

    #[test]
    fn test_missing_script() {
        let temp_dir = tempfile::tempdir().unwrap();
        let ws = Workspace::new(temp_dir.path(), "htop");
        extract_archive(bundle("other").as_slice(), ws.root()).unwrap();

        assert!(matches!(
            ws.make_script_executable(),
            Err(Error::FetchFailed { .. })
        ));
    }
}
