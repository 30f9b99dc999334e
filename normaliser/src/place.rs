//! Moves a staged zip into the overlay without ever replacing a file.
//!
//! Two workers may rebuild the same artifact concurrently. Whichever places
//! its copy first wins; the other sees `AlreadyExists` and discards its own.
//! A hard link is tried first because it is atomic and exclusive. When the
//! work area lives on another filesystem the staged file is copied into a
//! temporary sibling of the destination, flushed, then persisted with the
//! same no-clobber guarantee.

use std::fs::{self, File};
use std::io;
use std::path::Path;

/// Places `staged` at `dest` unless something already exists there.
///
/// On success `staged` is removed (best effort; it normally lives in a
/// temporary work area anyway).
///
/// # Errors
///
/// Returns an error of kind [`io::ErrorKind::AlreadyExists`] when `dest`
/// exists, or any other I/O error from linking, copying or persisting.
pub fn place_noclobber(staged: &Path, dest: &Path) -> io::Result<()> {
    match fs::hard_link(staged, dest) {
        Ok(()) => {}
        Err(err) if err.kind() == io::ErrorKind::AlreadyExists => return Err(err),
        // Cross-device links and filesystems without link support land here.
        Err(_) => copy_noclobber(staged, dest)?,
    }
    let _ = fs::remove_file(staged);
    Ok(())
}

fn copy_noclobber(staged: &Path, dest: &Path) -> io::Result<()> {
    let parent = dest
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let mut temp = tempfile::Builder::new()
        .prefix(".retrofix-")
        .suffix(".partial")
        .tempfile_in(parent)?;
    io::copy(&mut File::open(staged)?, temp.as_file_mut())?;
    temp.as_file().sync_all()?;
    temp.persist_noclobber(dest).map_err(|err| err.error)?;
    Ok(())
}
