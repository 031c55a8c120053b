// src/main.rs

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use sbomanager::build::{BuildSettings, Installer, Orchestrator, PkgtoolInstaller, SlackBuildRunner};
use sbomanager::catalog::{Catalog, CatalogStore};
use sbomanager::config::{Config, Overrides};
use sbomanager::repository::RepositoryClient;
use sbomanager::resolver;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use tracing::info;

#[derive(Parser)]
#[command(name = "sbomanager")]
#[command(author, version, about = "Build and install packages from SlackBuilds.org", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Repository root (default: https://slackbuilds.org/slackbuilds)
    #[arg(long, global = true)]
    base_url: Option<String>,

    /// Slackware release (default: read from /etc/slackware-version)
    #[arg(long, global = true)]
    distro_version: Option<String>,

    /// Machine architecture (default: uname -m)
    #[arg(long, global = true)]
    arch: Option<String>,

    /// Scratch directory for builds (default: /tmp/sbomanager)
    #[arg(long, global = true)]
    scratch_dir: Option<PathBuf>,

    /// Local catalog file (default: ~/.sbomanager/pkglist)
    #[arg(long, global = true)]
    catalog: Option<PathBuf>,

    /// Installed package registry (default: /var/log/packages)
    #[arg(long, global = true)]
    registry: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Search package names
    Search {
        /// Keyword to look for
        keyword: String,
    },
    /// Download the package list from SlackBuilds.org
    Update,
    /// Show package details
    Show {
        /// Package name
        keyword: String,
    },
    /// Build and install a package with its dependencies
    Install {
        /// Package name
        keyword: String,
        /// Do not ask for confirmation
        #[arg(short, long)]
        yes: bool,
        /// Do not check source MD5 sums
        #[arg(long)]
        no_verify: bool,
    },
    /// Generate shell completion scripts
    Completions {
        /// Shell type
        shell: Shell,
    },
}

impl Cli {
    fn overrides(&self) -> Overrides {
        Overrides {
            base_url: self.base_url.clone(),
            distro_version: self.distro_version.clone(),
            arch: self.arch.clone(),
            scratch_dir: self.scratch_dir.clone(),
            catalog_path: self.catalog.clone(),
            registry_dir: self.registry.clone(),
            verify_checksums: None,
        }
    }
}

fn load_catalog(config: &Config) -> Result<Catalog> {
    let store = CatalogStore::new(&config.catalog_path);
    store.load().context("Unable to load the package list")
}

/// Read a Y/n answer; empty input counts as yes
fn confirm(prompt: &str) -> Result<bool> {
    print!("{} (Y/n) ", prompt);
    io::stdout().flush()?;

    let mut answer = String::new();
    io::stdin().lock().read_line(&mut answer)?;
    Ok(is_affirmative(&answer))
}

fn is_affirmative(answer: &str) -> bool {
    matches!(answer.trim(), "" | "y" | "Y")
}

fn cmd_update(config: &Config) -> Result<()> {
    println!("Updating package list...");

    let client = RepositoryClient::new(config.http_timeout)?;
    let parsed = client
        .sync_catalog(&config.base_url, &config.distro_version)
        .context("Unable to fetch the package list")?;

    if !parsed.skipped.is_empty() {
        println!("Skipped {} malformed record(s):", parsed.skipped.len());
        for err in &parsed.skipped {
            println!("  {}", err);
        }
    }

    let store = CatalogStore::new(&config.catalog_path);
    store.save(&parsed.catalog)?;
    println!(
        "Package list updated ({} packages in {})",
        parsed.catalog.len(),
        store.path().display()
    );
    Ok(())
}

fn cmd_search(config: &Config, keyword: &str) -> Result<()> {
    let catalog = load_catalog(config)?;
    println!("searching for {}...", keyword);

    let matches = catalog.search(keyword);
    for pkg in &matches {
        println!("{}", pkg.name);
    }
    if matches.is_empty() {
        println!("No packages found.");
    }
    Ok(())
}

fn cmd_show(config: &Config, keyword: &str) -> Result<()> {
    let catalog = load_catalog(config)?;
    let Some(pkg) = catalog.get(keyword) else {
        println!("Package not found");
        return Ok(());
    };

    println!("PACKAGE DESCRIPTION");
    println!("Name: {}", pkg.name);
    println!("Version: {}", pkg.version);
    println!("Location: {}", pkg.location);
    println!("Description: {}", pkg.description.trim());
    println!("Requires: {}", pkg.requires.join(" "));

    match resolver::resolve(&pkg.name, &catalog) {
        Ok(order) => println!("Build order: {}", order.join(" ")),
        Err(e) => println!("Build order: unavailable ({})", e),
    }

    match pkg.sources_for(&config.arch) {
        Ok(sources) => {
            println!("Sources:");
            for source in sources {
                println!("  {}", source.url);
            }
        }
        Err(e) => println!("Sources: {}", e),
    }

    let rdeps = resolver::reverse_dependencies(&pkg.name, &catalog);
    if !rdeps.is_empty() {
        println!("Required by: {}", rdeps.join(" "));
    }

    let installer = PkgtoolInstaller::new(&config.registry_dir, &config.installpkg);
    let installed = installer.is_installed(&pkg.name)?;
    println!("Installed: {}", if installed { "yes" } else { "no" });

    Ok(())
}

fn cmd_install(config: &Config, keyword: &str, yes: bool) -> Result<()> {
    let catalog = load_catalog(config)?;
    if !catalog.contains(keyword) {
        println!("Package not found");
        return Ok(());
    }

    let build_list = resolver::resolve(keyword, &catalog)
        .with_context(|| format!("Unable to resolve dependencies of {}", keyword))?;

    println!("Building the following packages:");
    println!("  {}", build_list.join(" "));
    if !yes && !confirm("Continue?")? {
        println!("Aborted.");
        return Ok(());
    }

    let orchestrator = Orchestrator::new(
        BuildSettings::from(config),
        RepositoryClient::new(config.http_timeout)?,
        SlackBuildRunner::new(&config.shell),
        PkgtoolInstaller::new(&config.registry_dir, &config.installpkg),
    );

    let report = match orchestrator.install_all(&build_list, &catalog) {
        Ok(report) => report,
        Err(sbomanager::Error::Aborted {
            package,
            completed,
            total,
            reached,
            source,
        }) => {
            println!("Built {} of {} packages before failure", completed, total);
            println!("{} stopped after step: {}", package, reached);
            return Err(anyhow::Error::new(*source)
                .context(format!("Building {} failed", package)));
        }
        Err(e) => return Err(e.into()),
    };

    for package in &report.packages {
        println!(
            "  {} {} ({})",
            package.name,
            package.state.as_str(),
            package.artifact.display()
        );
    }
    println!(
        "Installed {} package(s), {} already installed",
        report.installed().count(),
        report.skipped().count()
    );
    Ok(())
}

fn main() -> Result<()> {
    // Initialize tracing subscriber for logging
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let Some(command) = &cli.command else {
        // No command provided, show help
        println!("sbomanager v{}", env!("CARGO_PKG_VERSION"));
        println!("Run 'sbomanager --help' for usage information");
        return Ok(());
    };

    if let Commands::Completions { shell } = command {
        clap_complete::generate(*shell, &mut Cli::command(), "sbomanager", &mut io::stdout());
        return Ok(());
    }

    let mut overrides = cli.overrides();
    if let Commands::Install { no_verify: true, .. } = command {
        overrides.verify_checksums = Some(false);
    }
    let config = Config::load(overrides)?;
    info!(
        "Using {} for Slackware {} ({})",
        config.base_url, config.distro_version, config.arch
    );

    match command {
        Commands::Search { keyword } => cmd_search(&config, keyword),
        Commands::Update => cmd_update(&config),
        Commands::Show { keyword } => cmd_show(&config, keyword),
        Commands::Install { keyword, yes, .. } => cmd_install(&config, keyword, *yes),
        Commands::Completions { .. } => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_affirmative() {
        assert!(is_affirmative("\n"));
        assert!(is_affirmative(""));
        assert!(is_affirmative("y\n"));
        assert!(is_affirmative("Y"));
        assert!(!is_affirmative("n\n"));
        assert!(!is_affirmative("yes"));
    }

    #[test]
    fn test_cli_parses_install() {
        let cli = Cli::try_parse_from([
            "sbomanager",
            "install",
            "htop",
            "--yes",
            "--no-verify",
            "--distro-version",
            "15.0",
        ])
        .unwrap();

        match cli.command {
            Some(Commands::Install {
                ref keyword,
                yes,
                no_verify,
            }) => {
                assert_eq!(keyword, "htop");
                assert!(yes);
                assert!(no_verify);
            }
            _ => panic!("expected install command"),
        }
        assert_eq!(cli.overrides().distro_version.as_deref(), Some("15.0"));
    }

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }
}
