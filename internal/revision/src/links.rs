//! Symbolic references between entries of one resource directory.
//!
//! Every reference stores a bare basename, never a path: the target always
//! lives in the same directory as the link itself. Absolute targets are a
//! legacy format repaired on startup.

use std::{
    fs, io,
    path::{Path, PathBuf},
};

use walkdir::WalkDir;

/// Atomically replaces any reference at `link` with one pointing at the
/// basename of `target`.
///
/// The replacement is unlink-then-symlink: a missing link is not an error,
/// anything else is reported to the caller.
pub fn write(target: &Path, link: &Path) -> io::Result<()> {
    let basename = target.file_name().ok_or_else(|| {
        io::Error::new(io::ErrorKind::InvalidInput, "link target has no basename")
    })?;

    match fs::remove_file(link) {
        Ok(()) => {}
        Err(err) if err.kind() == io::ErrorKind::NotFound => {}
        Err(err) => return Err(err),
    }
    std::os::unix::fs::symlink(basename, link)
}

/// Reads a reference back as an absolute path.
///
/// A relative stored target resolves against the link's own directory; an
/// absolute one is returned as-is.
pub fn read(link: &Path) -> io::Result<PathBuf> {
    let stored = fs::read_link(link)?;
    if stored.is_absolute() {
        return Ok(stored);
    }
    Ok(match link.parent() {
        Some(dir) => dir.join(stored),
        None => stored,
    })
}

/// Rewrites every legacy absolute reference under `root` (one level of
/// sub-directories included) into the relative basename form. Returns the
/// number of links rewritten.
pub fn repair_tree(root: &Path) -> io::Result<usize> {
    let mut repaired = 0;

    for entry in WalkDir::new(root).min_depth(1).max_depth(2) {
        let entry = entry?;
        if !entry.path_is_symlink() {
            continue;
        }
        let stored = fs::read_link(entry.path())?;
        if stored.is_absolute() {
            log::debug!(
                "repairing {}: {}",
                entry.path().display(),
                stored.display()
            );
            write(&stored, entry.path())?;
            repaired += 1;
        }
    }

    Ok(repaired)
}
