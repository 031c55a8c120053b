// build.rs

use clap::{Arg, ArgAction, Command};
use clap_mangen::Man;
use std::env;
use std::fs;
use std::path::PathBuf;

fn global_arg(id: &'static str, long: &'static str, help: &'static str) -> Arg {
    Arg::new(id)
        .long(long)
        .value_name("VALUE")
        .global(true)
        .help(help)
}

fn build_cli() -> Command {
    Command::new("sbomanager")
        .version(env!("CARGO_PKG_VERSION"))
        .author("sbomanager Contributors")
        .about("Build and install packages from SlackBuilds.org")
        .subcommand_required(false)
        .arg(global_arg(
            "base_url",
            "base-url",
            "Repository root (default: https://slackbuilds.org/slackbuilds)",
        ))
        .arg(global_arg(
            "distro_version",
            "distro-version",
            "Slackware release (default: read from /etc/slackware-version)",
        ))
        .arg(global_arg("arch", "arch", "Machine architecture (default: uname -m)"))
        .arg(global_arg(
            "scratch_dir",
            "scratch-dir",
            "Scratch directory for builds (default: /tmp/sbomanager)",
        ))
        .arg(global_arg(
            "catalog",
            "catalog",
            "Local catalog file (default: ~/.sbomanager/pkglist)",
        ))
        .arg(global_arg(
            "registry",
            "registry",
            "Installed package registry (default: /var/log/packages)",
        ))
        .subcommand(
            Command::new("search")
                .about("Search package names")
                .arg(Arg::new("keyword").required(true).help("Keyword to look for")),
        )
        .subcommand(Command::new("update").about("Download the package list from SlackBuilds.org"))
        .subcommand(
            Command::new("show")
                .about("Show package details")
                .arg(Arg::new("keyword").required(true).help("Package name")),
        )
        .subcommand(
            Command::new("install")
                .about("Build and install a package with its dependencies")
                .arg(Arg::new("keyword").required(true).help("Package name"))
                .arg(
                    Arg::new("yes")
                        .short('y')
                        .long("yes")
                        .action(ArgAction::SetTrue)
                        .help("Do not ask for confirmation"),
                )
                .arg(
                    Arg::new("no_verify")
                        .long("no-verify")
                        .action(ArgAction::SetTrue)
                        .help("Do not check source MD5 sums"),
                ),
        )
        .subcommand(
            Command::new("completions")
                .about("Generate shell completion scripts")
                .arg(
                    Arg::new("shell")
                        .required(true)
                        .value_parser(["bash", "elvish", "fish", "powershell", "zsh"])
                        .help("Shell type"),
                ),
        )
}

fn main() {
    println!("cargo:rerun-if-changed=build.rs");

    // Create man directory
    let out_dir = PathBuf::from(env::var("CARGO_MANIFEST_DIR").unwrap());
    let man_dir = out_dir.join("man");
    fs::create_dir_all(&man_dir).expect("Failed to create man directory");

    // Generate main man page
    let cmd = build_cli();
    let man = Man::new(cmd);
    let mut buffer = Vec::new();
    man.render(&mut buffer)
        .expect("Failed to render man page");

    let man_path = man_dir.join("sbomanager.1");
    fs::write(&man_path, buffer).expect("Failed to write man page");
}
