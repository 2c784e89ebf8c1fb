//! JSON documents describing revision histories and repository contents.

use std::{
    fs,
    path::Path,
    time::{SystemTime, UNIX_EPOCH},
};

use serde::Serialize;

use crate::{links, names, scan, Error, RevisionStore};

#[derive(Serialize)]
struct HistoryDoc<'a> {
    host: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    proxy: Option<&'a str>,
    timestamp: i64,
    file: &'a str,
    tags: Vec<(String, u32)>,
    history: Vec<HistoryEntry>,
}

#[derive(Serialize)]
struct HistoryEntry {
    rev: u32,
    time: i64,
}

#[derive(Serialize)]
struct ListDoc<'a> {
    host: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    proxy: Option<&'a str>,
    timestamp: i64,
    files: Vec<ListEntry>,
}

#[derive(Serialize)]
struct ListEntry {
    name: String,
    rev: String,
    time: i64,
}

impl RevisionStore {
    /// Describes one resource's history: every tag with the revision it
    /// references, then every surviving revision with its modification
    /// time.
    pub fn history(&self, clientname: &str, filename: &str) -> Result<String, Error> {
        let (dir, base) = names::split_dir_base(filename);
        let dir = Path::new(dir);

        let entries = scan::scan(dir, base)?;
        if entries.is_empty() {
            return Err(Error::NotFound);
        }

        let mut tags = Vec::new();
        let mut history = Vec::new();
        for entry in entries {
            match entry.kind {
                scan::EntryKind::Link => {
                    let tagname = match entry.suffix() {
                        Some(tagname) => tagname,
                        None => continue,
                    };
                    if let Ok(target) = self.resolve(filename, tagname) {
                        let rev = target
                            .file_name()
                            .and_then(|name| name.to_str())
                            .and_then(names::revision_of);
                        if let Some(rev) = rev {
                            tags.push((tagname.to_string(), rev));
                        }
                    }
                }
                scan::EntryKind::File => {
                    let rev = match entry.suffix().and_then(|s| s.parse().ok()) {
                        Some(rev) => rev,
                        None => continue,
                    };
                    let time = mtime_seconds(&dir.join(&entry.name))?;
                    history.push(HistoryEntry { rev, time });
                }
                _ => {}
            }
        }

        let doc = HistoryDoc {
            host: &self.host,
            proxy: self.proxy.as_deref(),
            timestamp: now_seconds(),
            file: clientname,
            tags,
            history,
        };
        Ok(serde_json::to_string(&doc)?)
    }

    /// Lists every resource in a repository: the default reference of each
    /// resource under the root, plus one level of sub-directories whose
    /// names pass the visibility check.
    pub fn list<F>(&self, uri: &str, root: &Path, visible: F) -> Result<String, Error>
    where
        F: Fn(&str) -> bool,
    {
        let mut files = Vec::new();
        list_directory(uri, root, &mut files)?;

        let mut groups = Vec::new();
        for item in fs::read_dir(root)? {
            let item = item?;
            if !item.file_type()?.is_dir() {
                continue;
            }
            if let Ok(name) = item.file_name().into_string() {
                if !name.starts_with('.') && visible(&name) {
                    groups.push(name);
                }
            }
        }
        groups.sort();
        for group in &groups {
            list_directory(&format!("{}/{}", uri, group), &root.join(group), &mut files)?;
        }

        let doc = ListDoc {
            host: &self.host,
            proxy: self.proxy.as_deref(),
            timestamp: now_seconds(),
            files,
        };
        Ok(serde_json::to_string(&doc)?)
    }
}

// The default reference of a resource is the one entry with no suffix;
// its target names the revision the resource currently serves.
fn list_directory(uri: &str, dir: &Path, out: &mut Vec<ListEntry>) -> Result<(), Error> {
    let mut found = Vec::new();
    for item in fs::read_dir(dir)? {
        let item = item?;
        if !item.file_type()?.is_symlink() {
            continue;
        }
        let name = match item.file_name().into_string() {
            Ok(name) => name,
            Err(_) => continue,
        };
        if name.contains(names::SEPARATOR) {
            continue;
        }
        let target = match links::read(&item.path()) {
            Ok(target) => target,
            Err(_) => continue,
        };
        let rev = match target
            .file_name()
            .and_then(|n| n.to_str())
            .and_then(names::revision_of)
        {
            Some(rev) => rev,
            None => continue,
        };
        let time = mtime_seconds(&target)?;
        found.push(ListEntry {
            name: format!("{}/{}", uri, name),
            rev: rev.to_string(),
            time,
        });
    }
    found.sort_by(|a, b| a.name.cmp(&b.name));
    out.extend(found);
    Ok(())
}

fn mtime_seconds(path: &Path) -> Result<i64, Error> {
    let modified = fs::metadata(path)?.modified()?;
    Ok(modified
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0))
}

fn now_seconds() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}
