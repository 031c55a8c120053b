// src/build/script.rs

//! Running `.SlackBuild` scripts
//!
//! A SlackBuild ends by calling `makepkg`, which prints
//! `Slackware package /tmp/htop-3.3.0-x86_64-1_SBo.tgz created.` followed by
//! a blank line. Output is forwarded to the terminal while the last lines of
//! stdout are kept so the package path can be recovered from that trailer.

use super::{BuildRunner, Workspace};
use crate::error::{Error, Result};
use std::collections::VecDeque;
use std::io::{self, BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::thread;
use tracing::{debug, info, warn};

const TRAILER_PREFIX: &str = "Slackware package ";
const TRAILER_SUFFIX: &str = " created.";

/// How many trailing stdout lines are searched for the trailer
const TAIL_LINES: usize = 10;

/// Runs `<shell> ./<name>.SlackBuild` inside the workspace
#[derive(Debug, Clone)]
pub struct SlackBuildRunner {
    shell: PathBuf,
}

impl SlackBuildRunner {
    pub fn new(shell: impl Into<PathBuf>) -> Self {
        Self {
            shell: shell.into(),
        }
    }
}

impl BuildRunner for SlackBuildRunner {
    fn run(&self, workspace: &Workspace) -> Result<PathBuf> {
        let package = workspace.name();
        let failed = |reason: String| Error::BuildFailed {
            package: package.to_string(),
            reason,
        };

        info!("Running {} in {}", workspace.script_name(), workspace.dir().display());

        let mut child = Command::new(&self.shell)
            .arg(format!("./{}", workspace.script_name()))
            .current_dir(workspace.dir())
            .stdin(Stdio::inherit())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| failed(format!("failed to start {}: {}", self.shell.display(), e)))?;

        let stderr_forwarder = child.stderr.take().map(|mut stderr| {
            thread::spawn(move || io::copy(&mut stderr, &mut io::stderr()))
        });

        let tail = match child.stdout.take() {
            Some(stdout) => forward_and_tail(BufReader::new(stdout), &mut io::stdout(), TAIL_LINES)
                .map_err(|e| failed(format!("failed to read build output: {}", e)))?,
            None => Vec::new(),
        };

        let status = child
            .wait()
            .map_err(|e| failed(format!("failed to wait for build script: {}", e)))?;

        if let Some(handle) = stderr_forwarder {
            // The copy ends when the script closes stderr
            if let Some(reason) = forwarder_failure(handle.join()) {
                warn!("{}: {}", package, reason);
            }
        }

        if !status.success() {
            return Err(failed(format!("build script exited with {}", status)));
        }

        let artifact = find_package_path(&tail)
            .ok_or_else(|| failed("build script did not report a package file".to_string()))?;

        debug!("{} produced {}", package, artifact.display());
        Ok(artifact)
    }
}

/// Why the stderr forwarder stopped early, if it did
fn forwarder_failure(result: thread::Result<io::Result<u64>>) -> Option<String> {
    match result {
        Ok(Ok(bytes)) => {
            debug!("Forwarded {} bytes of build stderr", bytes);
            None
        }
        Ok(Err(e)) => Some(format!("failed to forward build stderr: {}", e)),
        Err(_) => Some("stderr forwarder panicked".to_string()),
    }
}

/// Copy every line from `reader` to `out`, returning the last `keep` lines
pub fn forward_and_tail<R: BufRead, W: Write>(
    mut reader: R,
    out: &mut W,
    keep: usize,
) -> io::Result<Vec<String>> {
    let mut tail = VecDeque::with_capacity(keep + 1);
    let mut line = Vec::new();

    loop {
        line.clear();
        if reader.read_until(b'\n', &mut line)? == 0 {
            break;
        }
        out.write_all(&line)?;

        let text = String::from_utf8_lossy(&line);
        tail.push_back(text.trim_end_matches(['\n', '\r']).to_string());
        if tail.len() > keep {
            tail.pop_front();
        }
    }
    out.flush()?;

    Ok(tail.into_iter().collect())
}

/// Package path from the makepkg trailer, searching from the last line back
pub fn find_package_path(lines: &[String]) -> Option<PathBuf> {
    lines.iter().rev().find_map(|line| {
        line.trim()
            .strip_prefix(TRAILER_PREFIX)
            .and_then(|rest| rest.strip_suffix(TRAILER_SUFFIX))
            .map(str::trim)
            .filter(|path| !path.is_empty())
            .map(PathBuf::from)
    })
}
