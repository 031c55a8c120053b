// src/catalog/store.rs

//! Local copy of the catalog
//!
//! The catalog is stored as a single JSON file (by default
//! `~/.sbomanager/pkglist`). Writes go to a temporary file in the same
//! directory which is renamed over the target, so a crash mid-write leaves
//! the previous catalog intact.

use super::Catalog;
use crate::error::{Error, Result};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, info};

/// JSON catalog file on disk
#[derive(Debug, Clone)]
pub struct CatalogStore {
    path: PathBuf,
}

impl CatalogStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Write the catalog, replacing any previous one atomically
    pub fn save(&self, catalog: &Catalog) -> Result<()> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };

        fs::create_dir_all(dir).map_err(|e| {
            Error::CatalogUnavailable(format!(
                "Failed to create directory {}: {}",
                dir.display(),
                e
            ))
        })?;

        let temp = NamedTempFile::new_in(dir).map_err(|e| {
            Error::CatalogUnavailable(format!(
                "Failed to create temporary file in {}: {}",
                dir.display(),
                e
            ))
        })?;

        {
            let mut writer = BufWriter::new(temp.as_file());
            serde_json::to_writer(&mut writer, catalog).map_err(|e| {
                Error::CatalogUnavailable(format!("Failed to serialize catalog: {}", e))
            })?;
            writer.flush()?;
        }
        temp.as_file().sync_all()?;

        temp.persist(&self.path).map_err(|e| {
            Error::CatalogUnavailable(format!(
                "Failed to move catalog into place at {}: {}",
                self.path.display(),
                e.error
            ))
        })?;

        info!("Saved {} packages to {}", catalog.len(), self.path.display());
        Ok(())
    }

    /// Read the catalog saved by the last `update`
    pub fn load(&self) -> Result<Catalog> {
        debug!("Loading catalog from {}", self.path.display());

        let file = File::open(&self.path).map_err(|e| {
            Error::CatalogUnavailable(format!(
                "Failed to open {}: {} (run 'sbomanager update' first)",
                self.path.display(),
                e
            ))
        })?;

        let catalog: Catalog = serde_json::from_reader(BufReader::new(file)).map_err(|e| {
            Error::CatalogUnavailable(format!(
                "Failed to parse {}: {}",
                self.path.display(),
                e
            ))
        })?;
        catalog.validate()?;

        debug!("Loaded {} packages", catalog.len());
        Ok(catalog)
    }
}
