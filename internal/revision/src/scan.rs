//! Resource directory enumeration.
//!
//! Every listing of a resource's entries uses the same composite order:
//! tag references first (lexical), then revisions in ascending numeric
//! order, sub-directories last.

use std::{cmp::Ordering, fs, io, path::Path};

use crate::names;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    Link,
    File,
    Directory,
    Other,
}

#[derive(Debug)]
pub struct Entry {
    pub name: String,
    pub kind: EntryKind,
}

impl Entry {
    /// The revision or tag suffix of this entry, if it has one.
    pub fn suffix(&self) -> Option<&str> {
        names::suffix(&self.name)
    }
}

/// Lists the entries of `dir` belonging to the resource `base`, in
/// composite order. Only names of the form `<base>~<suffix>` match.
pub fn scan(dir: &Path, base: &str) -> io::Result<Vec<Entry>> {
    scan_matching(dir, base, false)
}

/// Like [`scan`], but also matches the bare `<base>` reference, so a purge
/// can remove every trace of the resource.
pub fn scan_for_purge(dir: &Path, base: &str) -> io::Result<Vec<Entry>> {
    scan_matching(dir, base, true)
}

fn scan_matching(dir: &Path, base: &str, include_bare: bool) -> io::Result<Vec<Entry>> {
    let pattern = format!("{}{}", base, names::SEPARATOR);
    let mut entries = Vec::new();

    for item in fs::read_dir(dir)? {
        let item = item?;
        let name = match item.file_name().into_string() {
            Ok(name) => name,
            Err(_) => continue,
        };
        if !name.starts_with(&pattern) && !(include_bare && name == base) {
            continue;
        }
        let file_type = item.file_type()?;
        let kind = if file_type.is_symlink() {
            EntryKind::Link
        } else if file_type.is_dir() {
            EntryKind::Directory
        } else if file_type.is_file() {
            EntryKind::File
        } else {
            EntryKind::Other
        };
        entries.push(Entry { name, kind });
    }

    entries.sort_by(compare);
    Ok(entries)
}

fn compare(a: &Entry, b: &Entry) -> Ordering {
    rank(a).cmp(&rank(b)).then_with(|| match (a.suffix(), b.suffix()) {
        (Some(sa), Some(sb)) if numeric(sa) && numeric(sb) => {
            numeric_value(sa).cmp(&numeric_value(sb))
        }
        _ => a.name.cmp(&b.name),
    })
}

// Tags sort before revisions; sub-directories always last.
fn rank(entry: &Entry) -> u8 {
    if entry.kind == EntryKind::Directory {
        return 3;
    }
    match entry.suffix() {
        Some(suffix) if numeric(suffix) => 2,
        _ => 1,
    }
}

fn numeric(suffix: &str) -> bool {
    suffix.as_bytes().first().map_or(false, u8::is_ascii_digit)
}

fn numeric_value(suffix: &str) -> u32 {
    suffix
        .bytes()
        .take_while(u8::is_ascii_digit)
        .fold(0u32, |acc, b| {
            acc.wrapping_mul(10).wrapping_add(u32::from(b - b'0'))
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_composite_order() -> io::Result<()> {
        let dir = tempfile::tempdir()?;
        for rev in &["10", "2", "1"] {
            fs::write(dir.path().join(format!("a.json~{}", rev)), rev)?;
        }
        for tag in &["latest", "current", "stable"] {
            std::os::unix::fs::symlink("a.json~2", dir.path().join(format!("a.json~{}", tag)))?;
        }
        fs::create_dir(dir.path().join("a.json~dir"))?;
        // Unrelated resources are filtered out.
        fs::write(dir.path().join("b.json~1"), b"other")?;
        fs::write(dir.path().join("a.jsonx~1"), b"other")?;

        let names: Vec<String> = scan(dir.path(), "a.json")?
            .into_iter()
            .map(|e| e.name)
            .collect();
        assert_eq!(
            names,
            vec![
                "a.json~current",
                "a.json~latest",
                "a.json~stable",
                "a.json~1",
                "a.json~2",
                "a.json~10",
                "a.json~dir",
            ]
        );
        Ok(())
    }

    #[test]
    fn test_purge_includes_bare_reference() -> io::Result<()> {
        let dir = tempfile::tempdir()?;
        fs::write(dir.path().join("a.json~1"), b"one")?;
        std::os::unix::fs::symlink("a.json~1", dir.path().join("a.json"))?;

        let names: Vec<String> = scan_for_purge(dir.path(), "a.json")?
            .into_iter()
            .map(|e| e.name)
            .collect();
        assert_eq!(names, vec!["a.json", "a.json~1"]);

        let names: Vec<String> = scan(dir.path(), "a.json")?
            .into_iter()
            .map(|e| e.name)
            .collect();
        assert_eq!(names, vec!["a.json~1"]);
        Ok(())
    }
}
