//! Repository routing: URL prefixes mapped to local directories, and the
//! method dispatch running every resource request against the revision
//! engine.

use std::{collections::HashMap, os::unix::fs::DirBuilderExt, path::PathBuf, sync::Arc};

use axum::{
    body::Body,
    extract::{Query, Request, State},
    http::{header, Method, StatusCode},
    response::{IntoResponse, Response},
};
use tokio_util::io::ReaderStream;

use filedepot_revision::names;

use crate::service::ServiceState;

/// The largest accepted PUT payload.
const MAX_CONTENT: usize = 16 * 1024 * 1024;

/// One registered repository: a URL prefix bound to a root directory,
/// with an optional prune depth.
#[derive(Debug, Clone)]
pub struct Repository {
    pub name: String,
    pub uri: String,
    pub root: PathBuf,
    pub depth: Option<u32>,
}

/// The longest-prefix routing table.
#[derive(Debug, Default)]
pub struct Repositories {
    repos: Vec<Repository>,
}

impl Repositories {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a repository under `/depot/<name>`. Re-registering a name
    /// replaces the previous mapping.
    pub fn route(&mut self, name: &str, root: PathBuf, depth: Option<u32>) {
        let uri = format!("/depot/{}", name);
        log::info!("serving {} from {}", uri, root.display());
        self.repos.retain(|r| r.uri != uri);
        self.repos.push(Repository {
            name: name.to_string(),
            uri,
            root,
            depth,
        });
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.repos.iter().map(|r| r.name.as_str()).collect();
        names.sort_unstable();
        names
    }

    pub fn iter(&self) -> impl Iterator<Item = &Repository> {
        self.repos.iter()
    }

    /// Finds the longest registered prefix matching `uri`.
    ///
    /// The remainder after the prefix may be a resource basename, or one
    /// sub-directory segment plus a basename; the intermediate segment
    /// must be made of token characters. Anything deeper does not match.
    pub fn find<'a>(&self, uri: &'a str) -> Option<(&Repository, &'a str)> {
        let mut best: Option<&Repository> = None;
        for repo in &self.repos {
            if uri != repo.uri && !uri.starts_with(&format!("{}/", repo.uri)) {
                continue;
            }
            if best.map_or(true, |b| repo.uri.len() > b.uri.len()) {
                best = Some(repo);
            }
        }
        let repo = best?;
        let rest = &uri[repo.uri.len()..];

        if !rest.is_empty() {
            let segments: Vec<&str> = rest[1..].split('/').collect();
            if segments.len() > 2 || segments.iter().any(|s| s.is_empty()) {
                return None;
            }
            // Everything up to the basename must look like a group name.
            for segment in &segments[..segments.len() - 1] {
                if !names::is_valid_token(segment) {
                    return None;
                }
            }
        }
        Some((repo, rest))
    }
}

pub(crate) fn reply(status: StatusCode, reason: &str) -> Response {
    (status, reason.to_string()).into_response()
}

fn json_reply(doc: String) -> Response {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "application/json")],
        doc,
    )
        .into_response()
}

// Text-based formats only: the revision engine is not meant for binary
// data, anything else is served without a declared type.
fn content_type_for(filename: &str) -> Option<&'static str> {
    let extension = &filename[filename.rfind('.')? + 1..];
    match extension {
        "html" | "htm" => Some("text/html"),
        "css" => Some("text/css"),
        "csv" => Some("text/csv"),
        "json" | "jsn" => Some("application/json"),
        "js" => Some("application/javascript"),
        "xml" => Some("text/xml"),
        "txt" => Some("text/plain"),
        _ => None,
    }
}

/// Streams an opened revision back to the client.
fn transfer(file: std::fs::File, filename: &str) -> Response {
    let regular = file.metadata().map(|meta| meta.is_file()).unwrap_or(false);
    if !regular {
        return reply(StatusCode::NOT_ACCEPTABLE, "Not Acceptable");
    }

    let body = Body::from_stream(ReaderStream::new(tokio::fs::File::from_std(file)));
    match content_type_for(filename) {
        Some(content) => {
            log::debug!("serving {} as {}", filename, content);
            (StatusCode::OK, [(header::CONTENT_TYPE, content)], body).into_response()
        }
        None => (StatusCode::OK, body).into_response(),
    }
}

/// Handles every request under a repository prefix.
pub async fn dispatch(
    State(state): State<Arc<ServiceState>>,
    Query(params): Query<HashMap<String, String>>,
    request: Request,
) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();

    // Nothing touches the filesystem before this check.
    if names::has_traversal(&path) {
        log::debug!("rejecting traversal in {}", path);
        return reply(StatusCode::NOT_ACCEPTABLE, "Not Acceptable");
    }

    // A trailing `all` segment addresses the repository as a whole.
    let (uri, is_all) = match path.strip_suffix("/all") {
        Some(stripped) => (stripped, true),
        None => (path.as_str(), false),
    };

    let (repo, rest) = match state.repositories.find(uri) {
        Some(found) => found,
        None => return reply(StatusCode::NOT_FOUND, "Path not found"),
    };
    let filename = format!("{}{}", repo.root.to_string_lossy(), rest);

    // Handlers run to completion in arrival order, one at a time, so
    // every operation observes a consistent history.
    let _serial = state.serial.lock().await;

    if method == Method::GET {
        if is_all {
            return match state
                .store
                .list(&repo.uri, &repo.root, |group| state.filter.allows(group))
            {
                Ok(doc) => json_reply(doc),
                Err(_) => reply(StatusCode::NOT_FOUND, "Not found"),
            };
        }
        let revision = params
            .get("revision")
            .map(String::as_str)
            .unwrap_or(names::TAG_CURRENT);
        if revision == names::TAG_ALL {
            return match state.store.history(uri, &filename) {
                Ok(doc) => json_reply(doc),
                Err(_) => reply(StatusCode::NOT_FOUND, "Not found"),
            };
        }
        return match state.store.checkout(&filename, revision) {
            Ok(file) => transfer(file, &filename),
            Err(_) => reply(StatusCode::NOT_FOUND, "Not found"),
        };
    }

    if method == Method::PUT {
        if is_all {
            return reply(StatusCode::INTERNAL_SERVER_ERROR, "Invalid URI");
        }
        let (dir, _) = names::split_dir_base(&filename);
        if dir != repo.root.to_string_lossy() {
            let mut builder = std::fs::DirBuilder::new();
            builder.mode(0o750);
            if let Err(err) = builder.create(dir) {
                if err.kind() != std::io::ErrorKind::AlreadyExists {
                    return reply(StatusCode::INTERNAL_SERVER_ERROR, "URI too deep");
                }
            }
        }
        let timestamp: i64 = params
            .get("time")
            .and_then(|t| t.parse().ok())
            .unwrap_or(0);
        let data = match axum::body::to_bytes(request.into_body(), MAX_CONTENT).await {
            Ok(data) => data,
            Err(_) => return reply(StatusCode::INTERNAL_SERVER_ERROR, "Cannot read the data"),
        };
        return match state.store.checkin(uri, &filename, timestamp, &data) {
            Ok(()) => {
                state.touch();
                if let Some(depth) = repo.depth {
                    if let Err(err) = state.store.prune(uri, &filename, depth) {
                        return reply(StatusCode::INTERNAL_SERVER_ERROR, &err.to_string());
                    }
                }
                StatusCode::OK.into_response()
            }
            Err(err) => reply(StatusCode::INTERNAL_SERVER_ERROR, &err.to_string()),
        };
    }

    if method == Method::POST {
        if is_all {
            return reply(StatusCode::INTERNAL_SERVER_ERROR, "Invalid URI");
        }
        let tag = params.get("tag").map(String::as_str);
        let revision = params.get("revision").map(String::as_str);
        if tag.is_none() && revision.is_none() {
            // Nothing requested, nothing done.
            return StatusCode::OK.into_response();
        }
        if revision == Some(names::TAG_ALL) {
            return reply(StatusCode::BAD_REQUEST, "invalid tag name");
        }
        let tag = tag.unwrap_or(names::TAG_CURRENT);
        return match state.store.apply(tag, uri, &filename, revision) {
            Ok(()) => {
                state.touch();
                StatusCode::OK.into_response()
            }
            Err(err) => reply(StatusCode::INTERNAL_SERVER_ERROR, &err.to_string()),
        };
    }

    if method == Method::DELETE {
        if is_all {
            return reply(StatusCode::INTERNAL_SERVER_ERROR, "Invalid URI");
        }
        let revision = match params.get("revision") {
            Some(revision) => revision,
            None => return reply(StatusCode::FORBIDDEN, "Revision to delete not specified"),
        };
        return match state.store.delete(uri, &filename, revision) {
            Ok(()) => {
                state.touch();
                StatusCode::OK.into_response()
            }
            Err(err) => reply(StatusCode::INTERNAL_SERVER_ERROR, &err.to_string()),
        };
    }

    // No other method is allowed.
    reply(StatusCode::METHOD_NOT_ALLOWED, "Method Not Allowed")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> Repositories {
        let mut repos = Repositories::new();
        repos.route("config", PathBuf::from("/srv/depot/config"), None);
        repos.route("config-archive", PathBuf::from("/srv/depot/archive"), Some(4));
        repos
    }

    #[test]
    fn test_longest_prefix_wins() {
        let repos = table();

        let (repo, rest) = repos.find("/depot/config/a.json").expect("match");
        assert_eq!(repo.name, "config");
        assert_eq!(rest, "/a.json");

        let (repo, rest) = repos.find("/depot/config-archive/a.json").expect("match");
        assert_eq!(repo.name, "config-archive");
        assert_eq!(rest, "/a.json");
    }

    #[test]
    fn test_one_group_level_is_addressable() {
        let repos = table();

        let (repo, rest) = repos.find("/depot/config/lan/a.json").expect("match");
        assert_eq!(repo.name, "config");
        assert_eq!(rest, "/lan/a.json");

        assert!(repos.find("/depot/config/a/b/c.json").is_none());
        assert!(repos.find("/depot/config//a.json").is_none());
        assert!(repos.find("/depot/other/a.json").is_none());
        assert!(repos.find("/depot").is_none());
    }

    #[test]
    fn test_exact_prefix_matches_with_empty_rest() {
        let repos = table();
        let (repo, rest) = repos.find("/depot/config").expect("match");
        assert_eq!(repo.name, "config");
        assert_eq!(rest, "");
    }

    #[test]
    fn test_reregistration_replaces() {
        let mut repos = table();
        repos.route("config", PathBuf::from("/elsewhere"), Some(2));
        let (repo, _) = repos.find("/depot/config").expect("match");
        assert_eq!(repo.root, PathBuf::from("/elsewhere"));
        assert_eq!(repo.depth, Some(2));
        assert_eq!(repos.names(), vec!["config", "config-archive"]);
    }

    #[test]
    fn test_content_types() {
        assert_eq!(content_type_for("a.json"), Some("application/json"));
        assert_eq!(content_type_for("a.html"), Some("text/html"));
        assert_eq!(content_type_for("a.htm"), Some("text/html"));
        assert_eq!(content_type_for("a.js"), Some("application/javascript"));
        assert_eq!(content_type_for("a.txt"), Some("text/plain"));
        assert_eq!(content_type_for("a.bin"), None);
        assert_eq!(content_type_for("no-extension"), None);
        // The lookup is case-sensitive.
        assert_eq!(content_type_for("a.JSON"), None);
    }
}
