//! Normalisation of legacy-compressed archives.
//!
//! The canonical store holds archives named after their artifact UUID.
//! Some of them use compression methods that current tools no longer
//! decode: the early PKZIP methods (Shrunk, Reduced, Imploded) and whole
//! formats such as ARC, ARJ, LHA and RAR. This crate finds those archives,
//! extracts them with the legacy tool for their family, rebuilds the
//! content as a Deflate-only zip, and places it in a separate overlay
//! directory as `<uuid>.zip`. The canonical store is never written.
//!
//! The building blocks are:
//!
//! - [`method`] classifies the compression methods inside a zip;
//! - [`diagnostic`] decodes tool exit statuses;
//! - [`exec`] runs external tools behind the [`exec::CommandExecutor`] seam;
//! - [`family`] describes each archive family as data;
//! - [`checker`] applies one family's rules to a single archive;
//! - [`rezip`] and [`place`] build and publish the replacement;
//! - [`pass`] drives a checker over the whole canonical store.

pub mod app;
pub mod artifact;
pub mod checker;
pub mod cli;
pub mod diagnostic;
pub mod error;
pub mod exec;
pub mod family;
pub mod method;
pub mod pass;
pub mod place;
pub mod rezip;

#[cfg(any(test, feature = "test-support"))]
pub mod test_utils;
