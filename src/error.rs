// src/error.rs

use crate::build::BuildState;
use thiserror::Error;

/// Core error types for sbomanager
#[derive(Error, Debug)]
pub enum Error {
    /// The catalog could not be fetched, read or deserialized
    #[error("Catalog unavailable: {0}")]
    CatalogUnavailable(String),

    /// A SLACKBUILDS.TXT record did not have the expected shape
    #[error("Malformed record #{index}: {reason}")]
    MalformedRecord { index: usize, reason: String },

    /// Requested package is not in the catalog
    #[error("Package not found: {0}")]
    PackageNotFound(String),

    /// The requires graph loops back on itself
    #[error("Cyclic dependency: {}", cycle.join(" -> "))]
    CyclicDependency { cycle: Vec<String> },

    /// A requires entry names a package that is not in the catalog
    #[error("Missing dependency: {name} (required by {required_by})")]
    MissingDependency { name: String, required_by: String },

    /// Download or extraction failed
    #[error("Fetch failed for {package}: {reason}")]
    FetchFailed { package: String, reason: String },

    /// Downloaded source does not match the catalog checksum
    #[error("Checksum mismatch for {package} ({file}): expected {expected}, got {actual}")]
    ChecksumMismatch {
        package: String,
        file: String,
        expected: String,
        actual: String,
    },

    /// Source URLs and checksums of a catalog entry do not pair up
    #[error("Invalid source list for {package}: {reason}")]
    InvalidSources { package: String, reason: String },

    /// Package is marked UNSUPPORTED for the host architecture
    #[error("Package {package} is not supported on {arch}")]
    UnsupportedArchitecture { package: String, arch: String },

    /// Build script exited non-zero or did not report a package
    #[error("Build failed for {package}: {reason}")]
    BuildFailed { package: String, reason: String },

    /// installpkg exited non-zero
    #[error("Install failed for {package}: {reason}")]
    InstallFailed { package: String, reason: String },

    /// A build list was abandoned part way through
    ///
    /// `reached` is the last step the failing package completed.
    #[error("Aborted at {package} ({reached}) after {completed} of {total} packages: {source}")]
    Aborted {
        package: String,
        completed: usize,
        total: usize,
        reached: BuildState,
        #[source]
        source: Box<Error>,
    },

    /// HTTP request failed or returned a non-success status
    #[error("Download error: {0}")]
    Download(String),

    /// Invalid or undetectable configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias using sbomanager's Error type
pub type Result<T> = std::result::Result<T, Error>;
