use std::collections::HashSet;

/// Controls which resource groups (top-level sub-directories of a
/// repository) appear in listings. An entry with a trailing `.` matches
/// every group name starting with the entry.
pub struct GroupFilter {
    exact: HashSet<String>,
    prefixes: Vec<String>,
    // A whitelist keeps matches; a blacklist drops them.
    keep_matches: bool,
}

impl GroupFilter {
    pub fn all() -> Self {
        Self {
            exact: HashSet::new(),
            prefixes: Vec::new(),
            keep_matches: false,
        }
    }

    pub fn whitelist(csv: &str) -> Self {
        Self::from_csv(csv, true)
    }

    pub fn blacklist(csv: &str) -> Self {
        Self::from_csv(csv, false)
    }

    fn from_csv(csv: &str, keep_matches: bool) -> Self {
        let mut exact = HashSet::new();
        let mut prefixes = Vec::new();
        for entry in csv.split(',').map(str::trim).filter(|e| !e.is_empty()) {
            match entry.strip_suffix('.') {
                Some(prefix) => prefixes.push(prefix.to_string()),
                None => {
                    exact.insert(entry.to_string());
                }
            }
        }
        Self {
            exact,
            prefixes,
            keep_matches,
        }
    }

    pub fn allows(&self, group: &str) -> bool {
        if self.exact.is_empty() && self.prefixes.is_empty() {
            return true;
        }
        let matched = self.exact.contains(group)
            || self.prefixes.iter().any(|p| group.starts_with(p.as_str()));
        matched == self.keep_matches
    }
}
