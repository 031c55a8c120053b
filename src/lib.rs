// src/lib.rs

//! sbomanager
//!
//! Source package manager for the SlackBuilds.org build script repository.
//!
//! # Architecture
//!
//! - Catalog: `SLACKBUILDS.TXT` parsed into name -> descriptor, kept as JSON
//! - Resolver: depth-first walk of REQUIRES into a build order
//! - Build: fetch bundle, fetch sources, run the SlackBuild, installpkg
//! - Catalog and configuration are passed explicitly; there is no global state

pub mod build;
pub mod catalog;
pub mod config;
mod error;
pub mod repository;
pub mod resolver;

pub use error::{Error, Result};
