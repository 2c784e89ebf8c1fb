//! The revision engine: an append-only linear history per resource.

use std::{
    fs,
    io::{self, Write},
    os::unix::fs::OpenOptionsExt,
    path::{Path, PathBuf},
};

use filetime::FileTime;

use crate::{links, names, scan, Error};

/// One store serves every repository of the process; operations address
/// resources by absolute local path. The host and proxy names are reported
/// in history documents.
pub struct RevisionStore {
    pub(crate) host: String,
    pub(crate) proxy: Option<String>,
}

impl RevisionStore {
    pub fn new(host: &str, proxy: Option<&str>) -> Self {
        Self {
            host: host.to_string(),
            proxy: proxy.map(str::to_string),
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    /// Opens the named revision of a resource for reading.
    ///
    /// `revision` may be a number, a tag name, or one of the reserved tags;
    /// anything that does not resolve to a readable file is reported as not
    /// found.
    pub fn checkout(&self, filename: &str, revision: &str) -> Result<fs::File, Error> {
        if !names::is_valid_token(revision) {
            return Err(Error::NotFound);
        }
        let fullname = names::decorated(filename, revision);
        log::debug!("checkout {}", fullname);
        fs::File::open(&fullname).map_err(|_| Error::NotFound)
    }

    /// Stores `data` as the new current revision of a resource.
    ///
    /// The new revision number is one above the `latest` reference. A
    /// payload identical to the latest revision is silently dropped: no
    /// number is allocated, and only the file times change when the client
    /// supplied a timestamp. On success the `latest`, `current` and bare
    /// references all point at the new revision.
    pub fn checkin(
        &self,
        clientname: &str,
        filename: &str,
        timestamp: i64,
        data: &[u8],
    ) -> Result<(), Error> {
        if !filename.contains('/') || filename.contains(names::SEPARATOR) {
            return Err(Error::InvalidFileName);
        }
        let (_, base) = names::split_dir_base(filename);
        if base == names::TAG_ALL {
            return Err(Error::InvalidFileName);
        }

        // Which revision number to use for this new revision: one above
        // whatever `latest` references, or 1 for a brand new resource.
        let latest_link = names::decorated(filename, names::TAG_LATEST);
        let latest_target = links::read(Path::new(&latest_link)).ok();
        let newrev = match &latest_target {
            Some(target) => {
                log::debug!("{}: FOUND latest {}", clientname, target.display());
                let rev = revision_from_target(target)?;
                rev.checked_add(1).ok_or(Error::InvalidRevisionNumber)?
            }
            None => 1,
        };

        // Successive identical revisions collapse onto the existing one.
        if let Some(target) = &latest_target {
            if let Ok(existing) = fs::read(target) {
                if existing == data {
                    if timestamp > 0 {
                        let time = FileTime::from_unix_time(timestamp, 0);
                        let _ = filetime::set_file_times(target, time, time);
                    }
                    log::debug!("{}: DUPLICATES {}", clientname, target.display());
                    return Ok(());
                }
            }
        }

        let fullname = names::decorated(filename, &newrev.to_string());
        log::debug!("{}: NEW REVISION {}", clientname, fullname);
        let mut file = fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o644)
            .open(&fullname)
            .map_err(|_| Error::CannotOpenForWriting)?;
        if file.write_all(data).and_then(|_| file.flush()).is_err() {
            // Leave the history consistent so the next checkin allocates
            // the same number again.
            drop(file);
            let _ = fs::remove_file(&fullname);
            return Err(Error::CannotWriteData);
        }
        drop(file);

        if timestamp > 0 {
            let time = FileTime::from_unix_time(timestamp, 0);
            let _ = filetime::set_file_times(&fullname, time, time);
        }

        let target = PathBuf::from(&fullname);
        links::write(&target, Path::new(&latest_link)).map_err(|_| Error::LatestLink)?;
        let current_link = names::decorated(filename, names::TAG_CURRENT);
        links::write(&target, Path::new(&current_link)).map_err(|_| Error::CurrentLink)?;
        links::write(&target, Path::new(filename)).map_err(|_| Error::DefaultLink)?;

        log::info!("{}: CHECKED IN REVISION {}", clientname, newrev);
        Ok(())
    }

    /// Resolves a revision number or tag name to the absolute path of the
    /// revision file it denotes. Only existing, readable files resolve.
    pub fn resolve(&self, filename: &str, token: &str) -> Result<PathBuf, Error> {
        if !names::is_valid_token(token) {
            return Err(Error::InvalidRevision);
        }
        // Callers may pass an already-decorated name.
        let stripped = names::without_suffix(filename);
        let path = if names::is_numeric(token) {
            PathBuf::from(names::decorated(stripped, token))
        } else {
            let link = names::decorated(stripped, token);
            links::read(Path::new(&link)).map_err(|_| Error::InvalidRevision)?
        };
        fs::File::open(&path).map_err(|_| Error::InvalidRevision)?;
        Ok(path)
    }

    /// Applies a tag to a revision, moving the tag if it already exists.
    ///
    /// `latest` and `all` are never assignable; `current` is, and moving it
    /// also moves the bare default reference.
    pub fn apply(
        &self,
        tag: &str,
        clientname: &str,
        filename: &str,
        revision: Option<&str>,
    ) -> Result<(), Error> {
        if !names::is_valid_token(tag) {
            return Err(Error::InvalidTagName);
        }
        if names::is_numeric(tag) {
            return Err(Error::InvalidNumericTagName);
        }
        if tag == names::TAG_ALL {
            return Err(Error::CannotAssignAll);
        }
        if tag == names::TAG_LATEST {
            return Err(Error::CannotAssignLatest);
        }

        let target = self.resolve(filename, revision.unwrap_or(names::TAG_CURRENT))?;
        let revname = target
            .file_name()
            .and_then(|name| name.to_str())
            .and_then(names::suffix)
            .unwrap_or("?")
            .to_string();

        log::debug!("{}: APPLY {} {}", clientname, tag, target.display());
        let link = names::decorated(filename, tag);
        links::write(&target, Path::new(&link)).map_err(|_| Error::TagLink)?;

        if tag == names::TAG_CURRENT {
            links::write(&target, Path::new(filename)).map_err(|_| Error::DefaultLink)?;
        }

        log::info!("{}: APPLIED TAG {} TO REVISION {}", clientname, tag, revname);
        Ok(())
    }

    /// Deletes one revision, one user tag, or (with `all`) every trace of
    /// the resource.
    ///
    /// The revisions referenced by `current` and `latest` are protected.
    /// Deleting a revision first unlinks every user tag referencing it.
    pub fn delete(&self, clientname: &str, filename: &str, revision: &str) -> Result<(), Error> {
        if !names::is_valid_token(revision) {
            return Err(Error::InvalidRevision);
        }
        if revision == names::TAG_CURRENT {
            return Err(Error::CannotDeleteCurrent);
        }
        if revision == names::TAG_LATEST {
            return Err(Error::CannotDeleteLatest);
        }

        let (dir, base) = names::split_dir_base(filename);
        let dir = Path::new(dir);

        if revision == names::TAG_ALL {
            return self.purge(clientname, dir, base);
        }

        if !names::is_numeric(revision) {
            // A user tag: unlink the reference, leave the revision alone.
            let link = names::decorated(filename, revision);
            fs::remove_file(&link).map_err(|err| match err.kind() {
                io::ErrorKind::NotFound => Error::NoSuchFile,
                _ => Error::Io(err),
            })?;
            log::info!("{}: REMOVED TAG {}", clientname, revision);
            return Ok(());
        }

        let revpath = PathBuf::from(names::decorated(filename, revision));
        if let Ok(current) = self.resolve(filename, names::TAG_CURRENT) {
            if current == revpath {
                return Err(Error::CannotDeleteCurrent);
            }
        }
        if let Ok(latest) = self.resolve(filename, names::TAG_LATEST) {
            if latest == revpath {
                return Err(Error::CannotDeleteLatest);
            }
        }

        // Unlink every tag still referencing the doomed revision.
        for entry in scan::scan(dir, base)? {
            if entry.kind != scan::EntryKind::Link {
                continue;
            }
            let link = dir.join(&entry.name);
            match links::read(&link) {
                Ok(target) if target == revpath => {
                    fs::remove_file(&link)?;
                    if let Some(tagname) = entry.suffix() {
                        log::info!("{}: DELETED TAG {}", clientname, tagname);
                    }
                }
                _ => {}
            }
        }

        fs::remove_file(&revpath).map_err(|err| match err.kind() {
            io::ErrorKind::NotFound => Error::NoSuchFile,
            _ => Error::Io(err),
        })?;
        log::info!("{}: DELETED REVISION {}", clientname, revision);
        Ok(())
    }

    fn purge(&self, clientname: &str, dir: &Path, base: &str) -> Result<(), Error> {
        let entries = match scan::scan_for_purge(dir, base) {
            Ok(entries) => entries,
            Err(_) => return Err(Error::NoSuchFile),
        };
        let mut removed = 0;
        for entry in entries {
            if entry.kind == scan::EntryKind::Directory {
                continue;
            }
            let path = dir.join(&entry.name);
            log::debug!("{}: PURGE {}", clientname, path.display());
            fs::remove_file(&path)?;
            removed += 1;
        }
        if removed == 0 {
            return Err(Error::NoSuchFile);
        }
        log::info!("{}: DELETED REVISION {}", clientname, names::TAG_ALL);
        Ok(())
    }

    /// Removes every revision old enough to fall outside the retention
    /// depth. Revisions pinned by `current` or `latest` survive, silently.
    pub fn prune(&self, clientname: &str, filename: &str, depth: u32) -> Result<(), Error> {
        if depth < 2 {
            return Ok(());
        }
        let latest_link = names::decorated(filename, names::TAG_LATEST);
        let top = match links::read(Path::new(&latest_link)) {
            Ok(target) => match target
                .file_name()
                .and_then(|name| name.to_str())
                .and_then(names::revision_of)
            {
                Some(rev) => rev,
                None => return Ok(()),
            },
            Err(_) => return Ok(()),
        };
        let threshold = top.saturating_sub(depth);
        if threshold < 1 {
            return Ok(());
        }

        let (dir, base) = names::split_dir_base(filename);
        for entry in scan::scan(Path::new(dir), base)? {
            if entry.kind != scan::EntryKind::File {
                continue;
            }
            let rev = match entry.suffix().and_then(|s| s.parse::<u32>().ok()) {
                Some(rev) => rev,
                None => continue,
            };
            if rev > threshold {
                continue;
            }
            if let Err(err) = self.delete(clientname, filename, &rev.to_string()) {
                // A pinned revision refuses deletion; that is not an error
                // worth reporting to the writer that triggered the prune.
                log::debug!("{}: prune kept revision {}: {}", clientname, rev, err);
            }
        }
        Ok(())
    }
}

// The latest reference carries the only record of the top revision number.
// A suffix that is not all digits means the history itself is corrupt; a
// suffix of digits too large for a revision number is a counter problem.
fn revision_from_target(target: &Path) -> Result<u32, Error> {
    let suffix = target
        .file_name()
        .and_then(|name| name.to_str())
        .and_then(names::suffix)
        .ok_or(Error::InvalidRevisionDatabase)?;
    if suffix.is_empty() || !suffix.bytes().all(|b| b.is_ascii_digit()) {
        return Err(Error::InvalidRevisionDatabase);
    }
    suffix.parse().map_err(|_| Error::InvalidRevisionNumber)
}
