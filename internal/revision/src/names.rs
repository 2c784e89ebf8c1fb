//! Naming rules shared by every revision operation.

/// The byte separating a resource basename from its revision or tag suffix.
/// It is forbidden inside resource names to keep the scheme unambiguous.
pub const SEPARATOR: char = '~';

/// Reserved tag selecting the revision served by default.
pub const TAG_CURRENT: &str = "current";

/// Reserved tag tracking the highest revision ever written.
pub const TAG_LATEST: &str = "latest";

/// Reserved pseudo-tag addressing the whole history of a resource.
pub const TAG_ALL: &str = "all";

/// Checks that a revision or tag name is non-empty and contains only
/// alphanumerics, `.`, `_` and `-`.
pub fn is_valid_token(token: &str) -> bool {
    !token.is_empty()
        && token
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'.' || b == b'_' || b == b'-')
}

/// Splits a path at its last `/`. A path without any `/` belongs to the
/// current directory.
pub fn split_dir_base(path: &str) -> (&str, &str) {
    match path.rfind('/') {
        Some(pos) => (&path[..pos], &path[pos + 1..]),
        None => (".", path),
    }
}

/// True when the URI attempts to escape its root.
pub fn has_traversal(uri: &str) -> bool {
    uri.contains("../")
}

/// Appends a revision or tag suffix to a resource name.
pub fn decorated(filename: &str, token: &str) -> String {
    format!("{}{}{}", filename, SEPARATOR, token)
}

/// Returns the suffix after the last separator, if any.
pub fn suffix(name: &str) -> Option<&str> {
    name.rfind(SEPARATOR).map(|pos| &name[pos + 1..])
}

/// Strips any revision or tag suffix, leaving the bare resource name.
pub fn without_suffix(name: &str) -> &str {
    match name.rfind(SEPARATOR) {
        Some(pos) => &name[..pos],
        None => name,
    }
}

/// Parses the suffix of `name` as a revision number.
pub fn revision_of(name: &str) -> Option<u32> {
    suffix(name).and_then(|s| s.parse().ok())
}

/// True when the token denotes a revision number rather than a tag name.
pub fn is_numeric(token: &str) -> bool {
    token.as_bytes().first().map_or(false, u8::is_ascii_digit)
}
