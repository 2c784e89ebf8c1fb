//! Startup discovery of repositories.
//!
//! Every non-hidden sub-directory of the configured parent directory
//! becomes a repository served under `/depot/<name>`; additional
//! repositories come from repeated `--repo <name>:<path>` options. Each
//! repository may carry a `.options` file whose `depth <N>` line sets its
//! prune depth.

use std::{
    fs, io,
    path::{Path, PathBuf},
};

/// A repository found at startup, before routing is set up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Discovered {
    pub name: String,
    pub root: PathBuf,
    pub depth: Option<u32>,
}

/// Scans `parent` for repositories. A missing parent directory yields an
/// empty set rather than an error, so a service can start before its
/// first repository exists.
pub fn discover(parent: &Path) -> io::Result<Vec<Discovered>> {
    let items = match fs::read_dir(parent) {
        Ok(items) => items,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(err) => return Err(err),
    };

    let mut found = Vec::new();
    for item in items {
        let item = item?;
        if !item.file_type()?.is_dir() {
            continue;
        }
        let name = match item.file_name().into_string() {
            Ok(name) => name,
            Err(_) => continue,
        };
        if name.starts_with('.') {
            continue;
        }
        let root = item.path();
        let depth = read_options(&root);
        found.push(Discovered { name, root, depth });
    }
    found.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(found)
}

/// Parses a `--repo <name>:<path>` option value.
pub fn parse_repo_option(value: &str) -> Option<Discovered> {
    let (name, path) = match value.find(':') {
        Some(pos) => (&value[..pos], &value[pos + 1..]),
        None => return None,
    };
    if name.is_empty() || path.is_empty() {
        return None;
    }
    let root = PathBuf::from(path);
    let depth = read_options(&root);
    Some(Discovered {
        name: name.to_string(),
        root,
        depth,
    })
}

/// Reads the prune depth from `<root>/.options`.
///
/// Only the `depth <N>` directive is recognized; extra tokens on the line
/// and unparseable lines are ignored.
pub fn read_options(root: &Path) -> Option<u32> {
    let contents = fs::read_to_string(root.join(".options")).ok()?;
    for line in contents.lines() {
        let mut tokens = line.split_whitespace();
        if tokens.next() == Some("depth") {
            if let Some(depth) = tokens.next().and_then(|t| t.parse().ok()) {
                return Some(depth);
            }
        }
    }
    None
}
