// src/catalog/parser.rs

//! SLACKBUILDS.TXT parser
//!
//! The index is a sequence of blank-line separated records. Every record is
//! exactly ten lines, each starting with a fixed `SLACKBUILD <FIELD>:` label:
//!
//! ```text
//! SLACKBUILD NAME: htop
//! SLACKBUILD LOCATION: ./system/htop
//! SLACKBUILD FILES: README htop.SlackBuild htop.info slack-desc
//! SLACKBUILD VERSION: 3.3.0
//! SLACKBUILD DOWNLOAD: https://github.com/htop-dev/htop/releases/download/3.3.0/htop-3.3.0.tar.xz
//! SLACKBUILD DOWNLOAD_x86_64:
//! SLACKBUILD MD5SUM: 84fd0a1d5e6a1a4a1a6e2b2b7a2d4f33
//! SLACKBUILD MD5SUM_x86_64:
//! SLACKBUILD REQUIRES:
//! SLACKBUILD SHORT DESCRIPTION:  htop (interactive process viewer)
//! ```

use super::{Catalog, PackageDescriptor, is_valid_package_name};
use crate::error::{Error, Result};
use tracing::{debug, info, warn};

/// Name of the index file in each distribution version directory
pub const INDEX_FILE_NAME: &str = "SLACKBUILDS.TXT";

const NAME: &str = "SLACKBUILD NAME:";
const LOCATION: &str = "SLACKBUILD LOCATION:";
const FILES: &str = "SLACKBUILD FILES:";
const VERSION: &str = "SLACKBUILD VERSION:";
const DOWNLOAD: &str = "SLACKBUILD DOWNLOAD:";
const DOWNLOAD_X86_64: &str = "SLACKBUILD DOWNLOAD_x86_64:";
const MD5SUM: &str = "SLACKBUILD MD5SUM:";
const MD5SUM_X86_64: &str = "SLACKBUILD MD5SUM_x86_64:";
const REQUIRES: &str = "SLACKBUILD REQUIRES:";
const SHORT_DESCRIPTION: &str = "SLACKBUILD SHORT DESCRIPTION:";

const RECORD_LINES: usize = 10;

/// Result of parsing a whole index
#[derive(Debug, Default)]
pub struct ParsedCatalog {
    pub catalog: Catalog,

    /// Records that were skipped, as `MalformedRecord` errors
    pub skipped: Vec<Error>,
}

/// Parse the full index text into a catalog
///
/// Malformed records are logged and collected in `skipped` rather than
/// failing the whole update.
pub fn parse_catalog(text: &str) -> ParsedCatalog {
    let mut parsed = ParsedCatalog::default();

    for (index, record) in split_records(text).enumerate() {
        match parse_record(index, record) {
            Ok(pkg) => {
                let name = pkg.name.clone();
                if parsed.catalog.insert(pkg).is_some() {
                    warn!("Duplicate record for {}, keeping the later one", name);
                }
            }
            Err(e) => {
                warn!("Skipping record: {}", e);
                parsed.skipped.push(e);
            }
        }
    }

    info!(
        "Parsed {} packages ({} records skipped)",
        parsed.catalog.len(),
        parsed.skipped.len()
    );
    parsed
}

/// Split the index on blank lines, ignoring leading and trailing blank lines
fn split_records(text: &str) -> impl Iterator<Item = &str> {
    text.split("\n\n")
        .flat_map(|chunk| chunk.split("\r\n\r\n"))
        .map(|chunk| chunk.trim_matches(|c| c == '\n' || c == '\r'))
        .filter(|chunk| !chunk.is_empty())
}

/// Parse a single ten-line record
///
/// `index` is the record's position in the file and only used for error
/// reporting.
pub fn parse_record(index: usize, record: &str) -> Result<PackageDescriptor> {
    let lines: Vec<&str> = record
        .lines()
        .map(|line| line.strip_suffix('\r').unwrap_or(line))
        .collect();

    if lines.len() != RECORD_LINES {
        return Err(Error::MalformedRecord {
            index,
            reason: format!("expected {} lines, found {}", RECORD_LINES, lines.len()),
        });
    }

    let field = |line: usize, label: &str| field_value(&lines, index, line, label);

    let name = field(0, NAME)?;
    if name.trim().is_empty() {
        return Err(Error::MalformedRecord {
            index,
            reason: "empty package name".to_string(),
        });
    }
    if !is_valid_package_name(name) {
        return Err(Error::MalformedRecord {
            index,
            reason: format!("package name '{}' is not a plain file name", name),
        });
    }

    let pkg = PackageDescriptor {
        name: name.to_string(),
        location: field(1, LOCATION)?.to_string(),
        files: split_list(field(2, FILES)?),
        version: field(3, VERSION)?.to_string(),
        download: split_list(field(4, DOWNLOAD)?),
        download_x86_64: split_list(field(5, DOWNLOAD_X86_64)?),
        md5sum: split_list(field(6, MD5SUM)?),
        md5sum_x86_64: split_list(field(7, MD5SUM_X86_64)?),
        requires: split_list(field(8, REQUIRES)?),
        description: field(9, SHORT_DESCRIPTION)?.to_string(),
    };

    debug!("Parsed record {}: {} {}", index, pkg.name, pkg.version);
    Ok(pkg)
}

/// Strip `label` from `lines[line]`
fn field_value<'a>(lines: &[&'a str], index: usize, line: usize, label: &str) -> Result<&'a str> {
    let value = lines[line]
        .strip_prefix(label)
        .ok_or_else(|| Error::MalformedRecord {
            index,
            reason: format!("line {} does not start with '{}'", line + 1, label),
        })?;
    // The label is followed by one space unless the field is empty
    Ok(value.strip_prefix(' ').unwrap_or(value))
}

/// Split a space separated list field, dropping empty tokens
fn split_list(value: &str) -> Vec<String> {
    value
        .split(' ')
        .filter(|token| !token.is_empty())
        .map(str::to_string)
        .collect()
}
