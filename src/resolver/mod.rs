// src/resolver/mod.rs

//! Dependency resolution
//!
//! Expands a package into a build order by walking the `requires` graph
//! depth first. Dependencies are emitted before their dependents, siblings
//! in `requires` order, and every package at most once. Names that are
//! currently being expanded are tracked so a loop in the graph is reported
//! instead of recursing forever.

use crate::catalog::Catalog;
use crate::error::{Error, Result};
use std::collections::HashSet;
use tracing::{debug, info};

/// Token SlackBuilds.org puts in REQUIRES when the README lists optional deps
pub const README_MARKER: &str = "%README%";

/// Ordered list of package names, dependencies first
pub type BuildList = Vec<String>;

/// Resolve `name` and everything it requires into a build order
pub fn resolve(name: &str, catalog: &Catalog) -> Result<BuildList> {
    if !catalog.contains(name) {
        return Err(Error::PackageNotFound(name.to_string()));
    }

    let mut walk = Walk {
        catalog,
        order: Vec::new(),
        done: HashSet::new(),
        path: Vec::new(),
    };
    walk.visit(name)?;

    debug!("Build order for {}: {:?}", name, walk.order);
    Ok(walk.order)
}

/// Packages in the catalog that list `name` in their requires
pub fn reverse_dependencies<'a>(name: &str, catalog: &'a Catalog) -> Vec<&'a str> {
    catalog
        .iter()
        .filter(|pkg| pkg.requires.iter().any(|dep| dep == name))
        .map(|pkg| pkg.name.as_str())
        .collect()
}

struct Walk<'a> {
    catalog: &'a Catalog,
    order: BuildList,
    done: HashSet<String>,
    /// Names currently being expanded, outermost first
    path: Vec<String>,
}

impl Walk<'_> {
    fn visit(&mut self, name: &str) -> Result<()> {
        if self.done.contains(name) {
            return Ok(());
        }

        if let Some(start) = self.path.iter().position(|p| p == name) {
            let mut cycle = self.path[start..].to_vec();
            cycle.push(name.to_string());
            return Err(Error::CyclicDependency { cycle });
        }

        let catalog = self.catalog;
        let pkg = catalog
            .get(name)
            .ok_or_else(|| Error::PackageNotFound(name.to_string()))?;

        self.path.push(name.to_string());
        for dep in &pkg.requires {
            if dep == README_MARKER {
                info!("{} lists optional dependencies in its README", name);
                continue;
            }
            if !catalog.contains(dep) {
                return Err(Error::MissingDependency {
                    name: dep.clone(),
                    required_by: name.to_string(),
                });
            }
            self.visit(dep)?;
        }
        self.path.pop();

        self.done.insert(name.to_string());
        self.order.push(name.to_string());
        Ok(())
    }
}
