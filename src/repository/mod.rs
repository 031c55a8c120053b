// src/repository/mod.rs

//! SlackBuilds.org repository access
//!
//! This module provides functionality for:
//! - Composing catalog, build script bundle and source URLs
//! - Fetching and parsing the SLACKBUILDS.TXT index
//! - Downloading and unpacking build script bundles
//! - Downloading source artifacts and verifying their MD5 sums
//!
//! Network operations are not retried; a failure is returned to the caller.

use crate::build::{Fetcher, workspace};
use crate::catalog::parser::{INDEX_FILE_NAME, ParsedCatalog, parse_catalog};
use crate::catalog::PackageDescriptor;
use crate::error::{Error, Result};
use md5::{Digest, Md5};
use reqwest::Url;
use reqwest::blocking::{Client, Response};
use std::fs::{self, File};
use std::io;
use std::path::Path;
use std::time::Duration;
use tempfile::NamedTempFile;
use tracing::{debug, info};

/// Default timeout for connecting and for fetching the index (60 seconds)
pub const HTTP_TIMEOUT: Duration = Duration::from_secs(60);

/// URL of the index for one distribution version
pub fn index_url(base_url: &str, version: &str) -> String {
    format!("{}/{}/{}", base_url.trim_end_matches('/'), version, INDEX_FILE_NAME)
}

/// URL of a package's build script bundle
pub fn archive_url(base_url: &str, version: &str, pkg: &PackageDescriptor) -> String {
    format!(
        "{}/{}/{}.tar.gz",
        base_url.trim_end_matches('/'),
        version,
        pkg.relative_location()
    )
}

/// Local file name for a source URL: the last segment of its path
pub fn source_file_name(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    parsed
        .path_segments()?
        .next_back()
        .filter(|segment| !segment.is_empty())
        .map(str::to_string)
}

/// Blocking HTTP client for the repository and upstream source hosts
pub struct RepositoryClient {
    client: Client,
    timeout: Duration,
}

impl RepositoryClient {
    /// Create a new repository client
    ///
    /// `timeout` bounds connecting to any host and the whole index request.
    /// Source downloads are only bounded on connect since they can be large.
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(timeout)
            .timeout(None)
            .user_agent(concat!("sbomanager/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { client, timeout })
    }

    fn get(&self, url: &str, timeout: Option<Duration>) -> Result<Response> {
        let mut request = self.client.get(url);
        if let Some(timeout) = timeout {
            request = request.timeout(timeout);
        }

        let response = request
            .send()
            .map_err(|e| Error::Download(format!("Failed to download {}: {}", url, e)))?;

        if !response.status().is_success() {
            return Err(Error::Download(format!(
                "HTTP {} from {}",
                response.status(),
                url
            )));
        }

        Ok(response)
    }

    /// Fetch the SLACKBUILDS.TXT index for `version` and parse it
    pub fn sync_catalog(&self, base_url: &str, version: &str) -> Result<ParsedCatalog> {
        let url = index_url(base_url, version);
        info!("Fetching package index from {}", url);

        let text = self
            .get(&url, Some(self.timeout))
            .and_then(|response| {
                response
                    .text()
                    .map_err(|e| Error::Download(format!("Failed to read response: {}", e)))
            })
            .map_err(|e| Error::CatalogUnavailable(e.to_string()))?;

        debug!("Fetched index: {} bytes", text.len());
        Ok(parse_catalog(&text))
    }
}

impl Fetcher for RepositoryClient {
    fn fetch_archive(&self, url: &str, dest: &Path) -> Result<()> {
        info!("Downloading build script bundle {}", url);
        let response = self.get(url, None)?;

        let entries = workspace::extract_archive(response, dest)?;
        debug!("Extracted {} entries into {}", entries, dest.display());
        Ok(())
    }

    fn download(&self, url: &str, dest: &Path) -> Result<()> {
        info!("Downloading {} to {}", url, dest.display());

        let dir = dest
            .parent()
            .ok_or_else(|| Error::Download(format!("No parent directory for {}", dest.display())))?;
        fs::create_dir_all(dir)?;

        let mut response = self.get(url, None)?;

        // Write to a temporary file first so a failed transfer leaves nothing behind
        let mut temp = NamedTempFile::new_in(dir)?;
        io::copy(&mut response, temp.as_file_mut())
            .map_err(|e| Error::Download(format!("Failed to write downloaded data: {}", e)))?;

        temp.persist(dest).map_err(|e| {
            Error::Download(format!(
                "Failed to move download to {}: {}",
                dest.display(),
                e.error
            ))
        })?;

        debug!("Successfully downloaded to {}", dest.display());
        Ok(())
    }
}

/// MD5 of a file as lowercase hex
pub fn md5_file(path: &Path) -> Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Md5::new();
    io::copy(&mut file, &mut hasher)?;
    Ok(format!("{:x}", hasher.finalize()))
}

/// Verify a downloaded source against its catalog checksum
///
/// A mismatching file is removed so it cannot be picked up by the build.
pub fn verify_md5(package: &str, path: &Path, expected: &str) -> Result<()> {
    debug!("Verifying checksum for {}", path.display());

    let actual = md5_file(path)?;
    if !actual.eq_ignore_ascii_case(expected) {
        fs::remove_file(path)?;
        let file = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        return Err(Error::ChecksumMismatch {
            package: package.to_string(),
            file,
            expected: expected.to_string(),
            actual,
        });
    }

    debug!("Checksum verified: {}", expected);
    Ok(())
}
