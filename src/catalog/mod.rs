// src/catalog/mod.rs

//! SlackBuilds.org package catalog
//!
//! The catalog is the full set of buildable packages described by the
//! repository's `SLACKBUILDS.TXT` index. It is parsed once per `update`,
//! persisted locally, and passed by reference to the resolver and the
//! build orchestrator. It is never patched in place; a refresh replaces it.

pub mod parser;
pub mod store;

pub use parser::{ParsedCatalog, parse_catalog, parse_record};
pub use store::CatalogStore;

use crate::error::{Error, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Component, Path};

/// Architecture that the `*_x86_64` fields of a record apply to
pub const ARCH_X86_64: &str = "x86_64";

/// Marker used in `DOWNLOAD_x86_64` for packages that do not build on x86_64
pub const UNSUPPORTED: &str = "UNSUPPORTED";

/// Marker used in `DOWNLOAD_x86_64` for packages nobody has built on x86_64
pub const UNTESTED: &str = "UNTESTED";

/// Whether `name` is usable as a single directory under the scratch root
///
/// Rejects empty names, `.` and `..`, and anything containing a separator.
pub fn is_valid_package_name(name: &str) -> bool {
    let mut components = Path::new(name).components();
    !name.contains('/')
        && matches!(
            (components.next(), components.next()),
            (Some(Component::Normal(_)), None)
        )
}

/// One entry of the catalog
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageDescriptor {
    /// Package name, unique within the catalog
    pub name: String,

    /// Path inside the repository, e.g. `./system/htop`
    pub location: String,

    /// Files shipped in the build script bundle
    pub files: Vec<String>,

    /// Upstream version (opaque)
    pub version: String,

    /// Source URLs for any architecture
    pub download: Vec<String>,

    /// Source URLs used instead of `download` on x86_64
    pub download_x86_64: Vec<String>,

    /// MD5 of each entry in `download`
    pub md5sum: Vec<String>,

    /// MD5 of each entry in `download_x86_64`
    pub md5sum_x86_64: Vec<String>,

    /// Names of packages that must be installed first
    pub requires: Vec<String>,

    /// Short description
    pub description: String,
}

/// A source artifact to download, paired with its expected checksum
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile<'a> {
    pub url: &'a str,
    pub md5: Option<&'a str>,
}

impl PackageDescriptor {
    /// Create a descriptor with only a name and location, for testing and tooling
    pub fn new(name: impl Into<String>, location: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            location: location.into(),
            files: Vec::new(),
            version: String::new(),
            download: Vec::new(),
            download_x86_64: Vec::new(),
            md5sum: Vec::new(),
            md5sum_x86_64: Vec::new(),
            requires: Vec::new(),
            description: String::new(),
        }
    }

    /// Builder-style helper to set the requires list
    pub fn with_requires<I, S>(mut self, requires: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.requires = requires.into_iter().map(Into::into).collect();
        self
    }

    /// Pick the source list for `arch`
    ///
    /// The x86_64 list wins on x86_64 when it carries real URLs.
    /// `UNSUPPORTED` is an error; `UNTESTED` falls back to the generic list.
    /// A generic list holding only a marker means no other arch is supported.
    pub fn sources_for(&self, arch: &str) -> Result<Vec<SourceFile<'_>>> {
        let unsupported = || Error::UnsupportedArchitecture {
            package: self.name.clone(),
            arch: arch.to_string(),
        };

        let (urls, sums) = if arch == ARCH_X86_64 && !self.download_x86_64.is_empty() {
            match self.download_x86_64.first().map(String::as_str) {
                Some(UNSUPPORTED) => return Err(unsupported()),
                Some(UNTESTED) => {
                    tracing::warn!("{} is untested on {}, using generic sources", self.name, arch);
                    (&self.download, &self.md5sum)
                }
                _ => (&self.download_x86_64, &self.md5sum_x86_64),
            }
        } else {
            (&self.download, &self.md5sum)
        };

        if matches!(urls.first().map(String::as_str), Some(UNSUPPORTED | UNTESTED)) {
            return Err(unsupported());
        }

        if !sums.is_empty() && sums.len() != urls.len() {
            return Err(Error::InvalidSources {
                package: self.name.clone(),
                reason: format!("{} URLs but {} checksums", urls.len(), sums.len()),
            });
        }

        Ok(urls
            .iter()
            .enumerate()
            .map(|(i, url)| SourceFile {
                url,
                md5: sums.get(i).map(String::as_str),
            })
            .collect())
    }

    /// Location with its leading `./` or `/` removed
    pub fn relative_location(&self) -> &str {
        self.location.trim_start_matches('.').trim_start_matches('/')
    }
}

/// Mapping of package name to descriptor
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Catalog {
    packages: BTreeMap<String, PackageDescriptor>,
}

impl Catalog {
    /// Create an empty catalog
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a descriptor under its own name, returning any replaced entry
    pub fn insert(&mut self, descriptor: PackageDescriptor) -> Option<PackageDescriptor> {
        self.packages.insert(descriptor.name.clone(), descriptor)
    }

    /// Look up a package by exact name
    pub fn get(&self, name: &str) -> Option<&PackageDescriptor> {
        self.packages.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.packages.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.packages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }

    /// All descriptors, ordered by name
    pub fn iter(&self) -> impl Iterator<Item = &PackageDescriptor> {
        self.packages.values()
    }

    /// Names containing `keyword` as an alphanumeric run
    ///
    /// A name matches when it is `keyword` padded only by letters and digits
    /// on either side, so `gtk` matches `pygtk` and `gtk2` but not `gtk-doc`.
    pub fn search(&self, keyword: &str) -> Vec<&PackageDescriptor> {
        let pattern = format!("^[A-Za-z0-9]*{}[A-Za-z0-9]*$", regex::escape(keyword));
        let re = match Regex::new(&pattern) {
            Ok(re) => re,
            Err(e) => {
                tracing::warn!("Invalid search pattern {}: {}", pattern, e);
                return Vec::new();
            }
        };

        self.packages
            .iter()
            .filter(|(name, _)| re.is_match(name))
            .map(|(_, pkg)| pkg)
            .collect()
    }

    /// Check that every descriptor is stored under its own, usable name
    pub fn validate(&self) -> Result<()> {
        for (key, pkg) in &self.packages {
            if !is_valid_package_name(&pkg.name) {
                return Err(Error::CatalogUnavailable(format!(
                    "invalid package name '{}'",
                    pkg.name
                )));
            }
            if key != &pkg.name {
                return Err(Error::CatalogUnavailable(format!(
                    "catalog key '{}' holds package '{}'",
                    key, pkg.name
                )));
            }
        }
        Ok(())
    }
}

impl FromIterator<PackageDescriptor> for Catalog {
    fn from_iter<T: IntoIterator<Item = PackageDescriptor>>(iter: T) -> Self {
        let mut catalog = Catalog::new();
        for pkg in iter {
            catalog.insert(pkg);
        }
        catalog
    }
}
