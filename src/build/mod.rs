// src/build/mod.rs

//! Build and install pipeline
//!
//! Every package in a build list goes through the same steps:
//!
//! 1. fetch the build script bundle and unpack it into `<scratch>/<name>`
//! 2. download the sources next to the script and check their MD5 sums
//! 3. run the SlackBuild and pick up the package it reports
//! 4. hand that package to `installpkg`, unless it is already installed
//!
//! Packages are processed one at a time, in order. The first failure aborts
//! the rest of the list. Network, build script and installer access go
//! through the `Fetcher`, `BuildRunner` and `Installer` traits.

pub mod installer;
pub mod script;
pub mod workspace;

pub use installer::PkgtoolInstaller;
pub use script::SlackBuildRunner;
pub use workspace::Workspace;

use crate::catalog::{Catalog, PackageDescriptor};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::repository;
use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Downloads bundles and source files
pub trait Fetcher {
    /// Download a `.tar.gz` bundle and unpack it under `dest`
    fn fetch_archive(&self, url: &str, dest: &Path) -> Result<()>;

    /// Download a single file to `dest`
    fn download(&self, url: &str, dest: &Path) -> Result<()>;
}

/// Runs a package's build script
pub trait BuildRunner {
    /// Build in `workspace`, returning the path of the package produced
    fn run(&self, workspace: &Workspace) -> Result<PathBuf>;
}

/// Host package database
pub trait Installer {
    fn is_installed(&self, name: &str) -> Result<bool>;

    fn install(&self, name: &str, artifact: &Path) -> Result<()>;
}

/// Where a package is in the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildState {
    NotStarted,
    Fetched,
    SourcesFetched,
    Built,
    Installed,
    /// Built, but an installed copy was already present
    Skipped,
}

impl BuildState {
    pub fn as_str(&self) -> &str {
        match self {
            BuildState::NotStarted => "not started",
            BuildState::Fetched => "fetched",
            BuildState::SourcesFetched => "sources fetched",
            BuildState::Built => "built",
            BuildState::Installed => "installed",
            BuildState::Skipped => "skipped",
        }
    }
}

impl fmt::Display for BuildState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome for one package
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageReport {
    pub name: String,
    pub state: BuildState,
    pub artifact: PathBuf,
}

/// Outcome of a whole build list
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstallReport {
    pub packages: Vec<PackageReport>,
}

impl InstallReport {
    pub fn installed(&self) -> impl Iterator<Item = &PackageReport> {
        self.packages
            .iter()
            .filter(|p| p.state == BuildState::Installed)
    }

    pub fn skipped(&self) -> impl Iterator<Item = &PackageReport> {
        self.packages.iter().filter(|p| p.state == BuildState::Skipped)
    }
}

/// Settings the pipeline needs from `Config`
#[derive(Debug, Clone)]
pub struct BuildSettings {
    pub base_url: String,
    pub distro_version: String,
    pub arch: String,
    pub scratch_dir: PathBuf,
    pub verify_checksums: bool,
}

impl From<&Config> for BuildSettings {
    fn from(config: &Config) -> Self {
        Self {
            base_url: config.base_url.clone(),
            distro_version: config.distro_version.clone(),
            arch: config.arch.clone(),
            scratch_dir: config.scratch_dir.clone(),
            verify_checksums: config.verify_checksums,
        }
    }
}

/// Drives packages through fetch, source download, build and install
pub struct Orchestrator<F, R, I> {
    settings: BuildSettings,
    fetcher: F,
    runner: R,
    installer: I,
}

impl<F: Fetcher, R: BuildRunner, I: Installer> Orchestrator<F, R, I> {
    pub fn new(settings: BuildSettings, fetcher: F, runner: R, installer: I) -> Self {
        Self {
            settings,
            fetcher,
            runner,
            installer,
        }
    }

    pub fn fetcher(&self) -> &F {
        &self.fetcher
    }

    pub fn installer(&self) -> &I {
        &self.installer
    }

    /// Build and install every package of `build_list`, in order
    ///
    /// A name already handled earlier in the list is not processed again.
    /// On failure the error reports how far the list got.
    pub fn install_all(&self, build_list: &[String], catalog: &Catalog) -> Result<InstallReport> {
        let mut seen = HashSet::new();
        let unique: Vec<&String> = build_list
            .iter()
            .filter(|name| seen.insert(name.as_str()))
            .collect();
        let total = unique.len();

        let mut report = InstallReport::default();
        for (i, name) in unique.into_iter().enumerate() {
            info!("[{}/{}] {}", i + 1, total, name);

            let mut reached = BuildState::NotStarted;
            match self.run_steps(name, catalog, &mut reached) {
                Ok(package) => report.packages.push(package),
                Err(e) => {
                    return Err(Error::Aborted {
                        package: name.clone(),
                        completed: report.packages.len(),
                        total,
                        reached,
                        source: Box::new(e),
                    });
                }
            }
        }

        Ok(report)
    }

    /// Run one package through every step
    pub fn build(&self, name: &str, catalog: &Catalog) -> Result<PackageReport> {
        let mut reached = BuildState::NotStarted;
        self.run_steps(name, catalog, &mut reached)
    }

    /// Like `build`, leaving the last completed step in `reached`
    fn run_steps(
        &self,
        name: &str,
        catalog: &Catalog,
        reached: &mut BuildState,
    ) -> Result<PackageReport> {
        let pkg = catalog
            .get(name)
            .ok_or_else(|| Error::PackageNotFound(name.to_string()))?;

        let workspace = self.fetch(pkg)?;
        advance(name, reached, BuildState::Fetched);

        self.fetch_sources(pkg, &workspace)?;
        advance(name, reached, BuildState::SourcesFetched);

        let artifact = self.run_build(&workspace)?;
        advance(name, reached, BuildState::Built);

        let installed = self.install(name, &artifact)?;
        advance(name, reached, installed);

        Ok(PackageReport {
            name: name.to_string(),
            state: *reached,
            artifact,
        })
    }

    /// Step 1: download and unpack the build script bundle
    fn fetch(&self, pkg: &PackageDescriptor) -> Result<Workspace> {
        let workspace = Workspace::new(&self.settings.scratch_dir, &pkg.name);
        let url = repository::archive_url(
            &self.settings.base_url,
            &self.settings.distro_version,
            pkg,
        );

        workspace
            .prepare()
            .and_then(|_| self.fetcher.fetch_archive(&url, workspace.root()))
            .and_then(|_| workspace.make_script_executable())
            .map_err(|e| fetch_failed(&pkg.name, e))?;

        Ok(workspace)
    }

    /// Step 2: download sources into the workspace and verify them
    fn fetch_sources(&self, pkg: &PackageDescriptor, workspace: &Workspace) -> Result<()> {
        let sources = pkg.sources_for(&self.settings.arch)?;

        for source in sources {
            let file_name =
                repository::source_file_name(source.url).ok_or_else(|| Error::FetchFailed {
                    package: pkg.name.clone(),
                    reason: format!("cannot derive a file name from {}", source.url),
                })?;
            let dest = workspace.source_path(&file_name);

            info!("Downloading source at {}", source.url);
            self.fetcher
                .download(source.url, &dest)
                .map_err(|e| fetch_failed(&pkg.name, e))?;

            match source.md5 {
                Some(expected) if self.settings.verify_checksums => {
                    repository::verify_md5(&pkg.name, &dest, expected)?;
                }
                Some(_) => debug!("Checksum verification disabled for {}", file_name),
                None => debug!("No checksum listed for {}", file_name),
            }
        }

        Ok(())
    }

    /// Step 3: run the build script
    fn run_build(&self, workspace: &Workspace) -> Result<PathBuf> {
        self.runner.run(workspace).map_err(|e| match e {
            Error::BuildFailed { .. } => e,
            other => Error::BuildFailed {
                package: workspace.name().to_string(),
                reason: other.to_string(),
            },
        })
    }

    /// Step 4: install the built package unless already installed
    fn install(&self, name: &str, artifact: &Path) -> Result<BuildState> {
        let already = self.installer.is_installed(name).map_err(|e| install_failed(name, e))?;
        if already {
            info!("{} is already installed, skipping installpkg", name);
            return Ok(BuildState::Skipped);
        }

        self.installer
            .install(name, artifact)
            .map_err(|e| install_failed(name, e))?;
        info!("Installed {}", name);
        Ok(BuildState::Installed)
    }
}

fn advance(name: &str, state: &mut BuildState, to: BuildState) {
    debug!("{}: {} -> {}", name, state, to);
    *state = to;
}

fn fetch_failed(package: &str, e: Error) -> Error {
    match e {
        Error::FetchFailed { .. } => e,
        other => Error::FetchFailed {
            package: package.to_string(),
            reason: other.to_string(),
        },
    }
}

fn install_failed(package: &str, e: Error) -> Error {
    match e {
        Error::InstallFailed { .. } => e,
        other => Error::InstallFailed {
            package: package.to_string(),
            reason: other.to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::{Cell, RefCell};
    use std::collections::HashMap;
    use std::fs;

    /// Serves bundles containing only a build script, and canned source files
    #[derive(Default)]
    struct FakeFetcher {
        sources: HashMap<String, Vec<u8>>,
        archives: RefCell<Vec<String>>,
    }

    impl Fetcher for FakeFetcher {
        fn fetch_archive(&self, url: &str, dest: &Path) -> Result<()> {
            self.archives.borrow_mut().push(url.to_string());
            let name = url
                .rsplit('/')
                .next()
                .and_then(|f| f.strip_suffix(".tar.gz"))
                .unwrap();
            let dir = dest.join(name);
            fs::create_dir_all(&dir)?;
            fs::write(dir.join(format!("{}.SlackBuild", name)), "#!/bin/sh\n")?;
            Ok(())
        }

        fn download(&self, url: &str, dest: &Path) -> Result<()> {
            let body = self
                .sources
                .get(url)
                .ok_or_else(|| Error::Download(format!("HTTP 404 Not Found from {}", url)))?;
            fs::write(dest, body)?;
            Ok(())
        }
    }

    #[derive(Default)]
    struct FakeRunner {
        fail: Option<String>,
    }

    impl BuildRunner for FakeRunner {
        fn run(&self, workspace: &Workspace) -> Result<PathBuf> {
            if self.fail.as_deref() == Some(workspace.name()) {
                return Err(Error::BuildFailed {
                    package: workspace.name().to_string(),
                    reason: "exit status: 1".to_string(),
                });
            }
            Ok(PathBuf::from(format!("/tmp/{}-1.0-x86_64-1_SBo.tgz", workspace.name())))
        }
    }

    #[derive(Default)]
    struct FakeInstaller {
        installed: RefCell<HashSet<String>>,
        calls: Cell<usize>,
    }

    impl FakeInstaller {
        fn with_installed(names: &[&str]) -> Self {
            let installer = Self::default();
            installer
                .installed
                .borrow_mut()
                .extend(names.iter().map(|n| n.to_string()));
            installer
        }
    }

    impl Installer for FakeInstaller {
        fn is_installed(&self, name: &str) -> Result<bool> {
            Ok(self.installed.borrow().contains(name))
        }

        fn install(&self, name: &str, _artifact: &Path) -> Result<()> {
            self.calls.set(self.calls.get() + 1);
            self.installed.borrow_mut().insert(name.to_string());
            Ok(())
        }
    }

    fn settings(scratch: &Path) -> BuildSettings {
        BuildSettings {
            base_url: "https://slackbuilds.org/slackbuilds".to_string(),
            distro_version: "15.0".to_string(),
            arch: "x86_64".to_string(),
            scratch_dir: scratch.to_path_buf(),
            verify_checksums: true,
        }
    }

    fn chain_catalog() -> Catalog {
        let mut a = PackageDescriptor::new("a", "./misc/a").with_requires(["b"]);
        a.download = vec!["https://example.com/a-1.0.tar.gz".to_string()];
        // md5("hello\n")
        a.md5sum = vec!["b1946ac92492d2347c6235b4d2611184".to_string()];
        let b = PackageDescriptor::new("b", "./misc/b").with_requires(["c"]);
        let c = PackageDescriptor::new("c", "./misc/c");
        [a, b, c].into_iter().collect()
    }

    fn fetcher() -> FakeFetcher {
        let mut fetcher = FakeFetcher::default();
        fetcher
            .sources
            .insert("https://example.com/a-1.0.tar.gz".to_string(), b"hello\n".to_vec());
        fetcher
    }

    fn list(names: &[&str]) -> Vec<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    #[test]
    fn test_install_all_in_order() {
        let temp_dir = tempfile::tempdir().unwrap();
        let orchestrator = Orchestrator::new(
            settings(temp_dir.path()),
            fetcher(),
            FakeRunner::default(),
            FakeInstaller::default(),
        );

        let report = orchestrator
            .install_all(&list(&["c", "b", "a"]), &chain_catalog())
            .unwrap();

        assert_eq!(report.installed().count(), 3);
        assert_eq!(orchestrator.installer().calls.get(), 3);
        assert_eq!(
            *orchestrator.fetcher().archives.borrow(),
            vec![
                "https://slackbuilds.org/slackbuilds/15.0/misc/c.tar.gz",
                "https://slackbuilds.org/slackbuilds/15.0/misc/b.tar.gz",
                "https://slackbuilds.org/slackbuilds/15.0/misc/a.tar.gz",
            ]
        );

        let ws = Workspace::new(temp_dir.path(), "a");
        assert_eq!(fs::read(ws.source_path("a-1.0.tar.gz")).unwrap(), b"hello\n");
        let mode = {
            use std::os::unix::fs::PermissionsExt;
            fs::metadata(ws.script_path()).unwrap().permissions().mode()
        };
        assert_eq!(mode & 0o777, 0o755);
    }

    #[test]
    fn test_install_all_when_everything_is_installed() {
        let temp_dir = tempfile::tempdir().unwrap();
        let orchestrator = Orchestrator::new(
            settings(temp_dir.path()),
            fetcher(),
            FakeRunner::default(),
            FakeInstaller::with_installed(&["a", "b", "c"]),
        );

        let report = orchestrator
            .install_all(&list(&["c", "b", "a"]), &chain_catalog())
            .unwrap();

        assert_eq!(orchestrator.installer().calls.get(), 0);
        assert_eq!(report.skipped().count(), 3);
    }

    #[test]
    fn test_install_all_twice_is_idempotent() {
        let temp_dir = tempfile::tempdir().unwrap();
        let orchestrator = Orchestrator::new(
            settings(temp_dir.path()),
            fetcher(),
            FakeRunner::default(),
            FakeInstaller::default(),
        );
        let catalog = chain_catalog();
        let build_list = list(&["c", "b", "a"]);

        orchestrator.install_all(&build_list, &catalog).unwrap();
        orchestrator.install_all(&build_list, &catalog).unwrap();
        assert_eq!(orchestrator.installer().calls.get(), 3);
    }

    #[test]
    fn test_repeated_names_processed_once() {
        let temp_dir = tempfile::tempdir().unwrap();
        let orchestrator = Orchestrator::new(
            settings(temp_dir.path()),
            fetcher(),
            FakeRunner::default(),
            FakeInstaller::default(),
        );

        let report = orchestrator
            .install_all(&list(&["c", "b", "c", "a"]), &chain_catalog())
            .unwrap();

        assert_eq!(report.packages.len(), 3);
        assert_eq!(orchestrator.fetcher().archives.borrow().len(), 3);
        assert_eq!(orchestrator.installer().calls.get(), 3);
    }

    #[test]
    fn test_build_failure_aborts_remaining_list() {
        let temp_dir = tempfile::tempdir().unwrap();
        let orchestrator = Orchestrator::new(
            settings(temp_dir.path()),
            fetcher(),
            FakeRunner {
                fail: Some("b".to_string()),
            },
            FakeInstaller::default(),
        );

        let err = orchestrator
            .install_all(&list(&["c", "b", "a"]), &chain_catalog())
            .unwrap_err();

        match err {
            Error::Aborted {
                package,
                completed,
                total,
                reached,
                source,
            } => {
                assert_eq!(package, "b");
                assert_eq!(completed, 1);
                assert_eq!(total, 3);
                assert_eq!(reached, BuildState::SourcesFetched);
                assert!(matches!(*source, Error::BuildFailed { .. }));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(orchestrator.installer().calls.get(), 1);
        assert_eq!(orchestrator.fetcher().archives.borrow().len(), 2);
    }

    #[test]
    fn test_checksum_mismatch_stops_before_build() {
        let temp_dir = tempfile::tempdir().unwrap();
        let mut fetcher = fetcher();
        fetcher
            .sources
            .insert("https://example.com/a-1.0.tar.gz".to_string(), b"tampered\n".to_vec());
        let orchestrator = Orchestrator::new(
            settings(temp_dir.path()),
            fetcher,
            FakeRunner::default(),
            FakeInstaller::default(),
        );

        let err = orchestrator.build("a", &chain_catalog()).unwrap_err();
        assert!(matches!(err, Error::ChecksumMismatch { .. }));
        assert_eq!(orchestrator.installer().calls.get(), 0);
    }

    #[test]
    fn test_abort_reports_step_reached() {
        let temp_dir = tempfile::tempdir().unwrap();
        let mut fetcher = fetcher();
        fetcher
            .sources
            .insert("https://example.com/a-1.0.tar.gz".to_string(), b"tampered\n".to_vec());
        let orchestrator = Orchestrator::new(
            settings(temp_dir.path()),
            fetcher,
            FakeRunner::default(),
            FakeInstaller::default(),
        );

        let err = orchestrator
            .install_all(&list(&["c", "b", "a"]), &chain_catalog())
            .unwrap_err();
        match err {
            Error::Aborted {
                package,
                completed,
                reached,
                ..
            } => {
                assert_eq!(package, "a");
                assert_eq!(completed, 2);
                assert_eq!(reached, BuildState::Fetched);
            }
            other => panic!("unexpected error: {other}"),
        }

        let err = orchestrator
            .install_all(&list(&["zzz"]), &chain_catalog())
            .unwrap_err();
        assert!(err.to_string().contains("zzz (not started)"));
    }

    #[test]
    fn test_package_name_cannot_escape_scratch_root() {
        let temp_dir = tempfile::tempdir().unwrap();
        let scratch = temp_dir.path().join("scratch");
        let victim = temp_dir.path().join("victim");
        fs::create_dir_all(&victim).unwrap();
        fs::write(victim.join("keep"), b"data").unwrap();

        let catalog: Catalog = [PackageDescriptor::new("../victim", "./misc/victim")]
            .into_iter()
            .collect();
        let orchestrator = Orchestrator::new(
            settings(&scratch),
            fetcher(),
            FakeRunner::default(),
            FakeInstaller::default(),
        );

        assert!(matches!(
            orchestrator.build("../victim", &catalog),
            Err(Error::FetchFailed { .. })
        ));
        assert!(victim.join("keep").is_file());
        assert!(orchestrator.fetcher().archives.borrow().is_empty());
    }

    #[test]
    fn test_checksum_not_enforced_when_disabled() {
        let temp_dir = tempfile::tempdir().unwrap();
        let mut fetcher = fetcher();
        fetcher
            .sources
            .insert("https://example.com/a-1.0.tar.gz".to_string(), b"tampered\n".to_vec());
        let mut settings = settings(temp_dir.path());
        settings.verify_checksums = false;
        let orchestrator = Orchestrator::new(
            settings,
            fetcher,
            FakeRunner::default(),
            FakeInstaller::default(),
        );

        let report = orchestrator.build("a", &chain_catalog()).unwrap();
        assert_eq!(report.state, BuildState::Installed);
    }

    #[test]
    fn test_source_download_failure() {
        let temp_dir = tempfile::tempdir().unwrap();
        let orchestrator = Orchestrator::new(
            settings(temp_dir.path()),
            FakeFetcher::default(),
            FakeRunner::default(),
            FakeInstaller::default(),
        );

        match orchestrator.build("a", &chain_catalog()).unwrap_err() {
            Error::FetchFailed { package, reason } => {
                assert_eq!(package, "a");
                assert!(reason.contains("404"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_build_unknown_package() {
        let temp_dir = tempfile::tempdir().unwrap();
        let orchestrator = Orchestrator::new(
            settings(temp_dir.path()),
            fetcher(),
            FakeRunner::default(),
            FakeInstaller::default(),
        );

        assert!(matches!(
            orchestrator.build("zzz", &chain_catalog()),
            Err(Error::PackageNotFound(_))
        ));
    }
}
