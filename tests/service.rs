//! End-to-end tests driving the daemon over real HTTP.

use std::{fs, net::SocketAddr, path::Path, path::PathBuf, sync::Arc};

use tokio::io::{AsyncReadExt, AsyncWriteExt};

use filedepot::{
    discovery,
    repository::Repositories,
    service::{self, ServiceState},
    visibility::GroupFilter,
};

async fn start(parent: &Path) -> SocketAddr {
    let mut repositories = Repositories::new();
    for repo in discovery::discover(parent).expect("discover") {
        repositories.route(&repo.name, repo.root, repo.depth);
    }
    let state = Arc::new(ServiceState::new(
        repositories,
        GroupFilter::all(),
        "testhost",
        None,
    ));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        let _ = axum::serve(listener, service::router(state)).await;
    });
    addr
}

fn link_target(path: PathBuf) -> PathBuf {
    fs::read_link(path).expect("link should exist")
}

#[tokio::test]
async fn test_revision_lifecycle() {
    let parent = tempfile::tempdir().expect("tempdir");
    let root = parent.path().join("config");
    fs::create_dir(&root).expect("mkdir");
    let addr = start(parent.path()).await;
    let client = reqwest::Client::new();
    let base = format!("http://{}/depot/config/a.json", addr);

    // First checkin materializes the resource and all three references.
    let resp = client
        .put(&base)
        .body("{\"k\":1}")
        .send()
        .await
        .expect("put");
    assert_eq!(resp.status(), 200);
    for link in &["a.json", "a.json~current", "a.json~latest"] {
        assert_eq!(link_target(root.join(link)), PathBuf::from("a.json~1"));
    }

    // An identical payload does not allocate a new revision, but the
    // client-supplied timestamp lands on the existing file.
    let resp = client
        .put(format!("{}?time=1700000000", base))
        .body("{\"k\":1}")
        .send()
        .await
        .expect("put duplicate");
    assert_eq!(resp.status(), 200);
    assert!(!root.join("a.json~2").exists());
    let modified = fs::metadata(root.join("a.json~1"))
        .expect("metadata")
        .modified()
        .expect("mtime");
    let expect = std::time::UNIX_EPOCH + std::time::Duration::from_secs(1_700_000_000);
    assert_eq!(modified, expect);

    // A changed payload continues the history.
    let resp = client
        .put(&base)
        .body("{\"k\":2}")
        .send()
        .await
        .expect("put 2");
    assert_eq!(resp.status(), 200);
    assert_eq!(
        link_target(root.join("a.json~latest")),
        PathBuf::from("a.json~2")
    );

    // Tag revision 1 and read it back by tag.
    let resp = client
        .post(format!("{}?tag=stable&revision=1", base))
        .send()
        .await
        .expect("post tag");
    assert_eq!(resp.status(), 200);

    let resp = client
        .get(format!("{}?revision=stable", base))
        .send()
        .await
        .expect("get stable");
    assert_eq!(resp.status(), 200);
    assert_eq!(
        resp.headers()[reqwest::header::CONTENT_TYPE],
        "application/json"
    );
    assert_eq!(resp.text().await.expect("body"), "{\"k\":1}");

    // The default read serves the current revision.
    let resp = client.get(&base).send().await.expect("get current");
    assert_eq!(resp.text().await.expect("body"), "{\"k\":2}");

    // Reserved references are protected from deletion.
    let resp = client
        .delete(format!("{}?revision=2", base))
        .send()
        .await
        .expect("delete 2");
    assert_eq!(resp.status(), 500);
    assert_eq!(resp.text().await.expect("body"), "cannot delete current");

    let resp = client
        .delete(format!("{}?revision=latest", base))
        .send()
        .await
        .expect("delete latest");
    assert_eq!(resp.status(), 500);
    assert_eq!(resp.text().await.expect("body"), "Cannot delete latest");

    let resp = client.delete(&base).send().await.expect("delete");
    assert_eq!(resp.status(), 403);

    // History lists tags first, then revisions in ascending order.
    let resp = client
        .get(format!("{}?revision=all", base))
        .send()
        .await
        .expect("history");
    assert_eq!(resp.status(), 200);
    let doc: serde_json::Value =
        serde_json::from_str(&resp.text().await.expect("body")).expect("json");
    assert_eq!(doc["host"], "testhost");
    assert_eq!(doc["file"], "/depot/config/a.json");
    assert_eq!(
        doc["tags"],
        serde_json::json!([["current", 2], ["latest", 2], ["stable", 1]])
    );
    let history = doc["history"].as_array().expect("history");
    assert_eq!(history[0]["rev"], 1);
    assert_eq!(history[1]["rev"], 2);

    // Deleting revision 1 also removes the tag referencing it.
    let resp = client
        .delete(format!("{}?revision=1", base))
        .send()
        .await
        .expect("delete 1");
    assert_eq!(resp.status(), 200);
    assert!(!root.join("a.json~1").exists());
    assert!(!root.join("a.json~stable").exists());
    assert!(root.join("a.json~2").exists());
}

#[tokio::test]
async fn test_repository_listing_and_top_endpoints() {
    let parent = tempfile::tempdir().expect("tempdir");
    fs::create_dir(parent.path().join("config")).expect("mkdir");
    fs::create_dir(parent.path().join("scripts")).expect("mkdir");
    let addr = start(parent.path()).await;
    let client = reqwest::Client::new();

    let resp = client
        .put(format!("http://{}/depot/config/a.json", addr))
        .body("one")
        .send()
        .await
        .expect("put");
    assert_eq!(resp.status(), 200);
    let resp = client
        .put(format!("http://{}/depot/config/lan/b.json", addr))
        .body("two")
        .send()
        .await
        .expect("put nested");
    assert_eq!(resp.status(), 200);
    assert!(parent.path().join("config/lan/b.json~1").exists());

    let resp = client
        .get(format!("http://{}/depot/config/all", addr))
        .send()
        .await
        .expect("list");
    assert_eq!(resp.status(), 200);
    let doc: serde_json::Value =
        serde_json::from_str(&resp.text().await.expect("body")).expect("json");
    let names: Vec<&str> = doc["files"]
        .as_array()
        .expect("files")
        .iter()
        .map(|f| f["name"].as_str().expect("name"))
        .collect();
    assert_eq!(names, vec!["/depot/config/a.json", "/depot/config/lan/b.json"]);

    let resp = client
        .get(format!("http://{}/depot/all", addr))
        .send()
        .await
        .expect("all");
    let doc: serde_json::Value =
        serde_json::from_str(&resp.text().await.expect("body")).expect("json");
    assert_eq!(doc["host"], "testhost");
    assert_eq!(doc["repositories"], serde_json::json!(["config", "scripts"]));

    let resp = client
        .get(format!("http://{}/depot/check", addr))
        .send()
        .await
        .expect("check");
    let doc: serde_json::Value =
        serde_json::from_str(&resp.text().await.expect("body")).expect("json");
    assert!(doc["updated"].as_i64().expect("updated") > 0);
}

#[tokio::test]
async fn test_prune_policy_applies_after_checkin() {
    let parent = tempfile::tempdir().expect("tempdir");
    let root = parent.path().join("scripts");
    fs::create_dir(&root).expect("mkdir");
    fs::write(root.join(".options"), "depth 2\n").expect("options");
    let addr = start(parent.path()).await;
    let client = reqwest::Client::new();
    let base = format!("http://{}/depot/scripts/job.txt", addr);

    for i in 1..=5 {
        let resp = client
            .put(&base)
            .body(format!("revision {}", i))
            .send()
            .await
            .expect("put");
        assert_eq!(resp.status(), 200);
    }

    for gone in &["job.txt~1", "job.txt~2", "job.txt~3"] {
        assert!(!root.join(gone).exists(), "{} should be pruned", gone);
    }
    for kept in &["job.txt~4", "job.txt~5"] {
        assert!(root.join(kept).exists(), "{} should survive", kept);
    }
    assert_eq!(
        link_target(root.join("job.txt~latest")),
        PathBuf::from("job.txt~5")
    );
    assert_eq!(
        link_target(root.join("job.txt~current")),
        PathBuf::from("job.txt~5")
    );
}

#[tokio::test]
async fn test_error_paths() {
    let parent = tempfile::tempdir().expect("tempdir");
    fs::create_dir(parent.path().join("config")).expect("mkdir");
    let addr = start(parent.path()).await;
    let client = reqwest::Client::new();

    // Unknown repository and unknown resource.
    let resp = client
        .get(format!("http://{}/depot/nowhere/a.json", addr))
        .send()
        .await
        .expect("get");
    assert_eq!(resp.status(), 404);
    assert_eq!(resp.text().await.expect("body"), "Path not found");

    let resp = client
        .get(format!("http://{}/depot/config/missing.json", addr))
        .send()
        .await
        .expect("get");
    assert_eq!(resp.status(), 404);
    assert_eq!(resp.text().await.expect("body"), "Not found");

    // Unsupported method.
    let resp = client
        .request(
            reqwest::Method::PATCH,
            format!("http://{}/depot/config/a.json", addr),
        )
        .send()
        .await
        .expect("patch");
    assert_eq!(resp.status(), 405);

    // Tagging the whole history is meaningless.
    let resp = client
        .put(format!("http://{}/depot/config/a.json", addr))
        .body("x")
        .send()
        .await
        .expect("put");
    assert_eq!(resp.status(), 200);
    let resp = client
        .post(format!(
            "http://{}/depot/config/a.json?tag=t&revision=all",
            addr
        ))
        .send()
        .await
        .expect("post");
    assert_eq!(resp.status(), 400);

    // A POST with neither parameter is accepted and does nothing.
    let resp = client
        .post(format!("http://{}/depot/config/a.json", addr))
        .send()
        .await
        .expect("post");
    assert_eq!(resp.status(), 200);

    // Writes to the whole repository are refused.
    let resp = client
        .put(format!("http://{}/depot/config/all", addr))
        .body("x")
        .send()
        .await
        .expect("put all");
    assert_eq!(resp.status(), 500);
    assert_eq!(resp.text().await.expect("body"), "Invalid URI");
}

// The HTTP client normalizes `..` away, so the traversal check needs a
// raw connection to be exercised.
#[tokio::test]
async fn test_traversal_is_rejected_before_any_lookup() {
    let parent = tempfile::tempdir().expect("tempdir");
    fs::create_dir(parent.path().join("config")).expect("mkdir");
    let addr = start(parent.path()).await;

    let mut stream = tokio::net::TcpStream::connect(addr).await.expect("connect");
    stream
        .write_all(
            b"GET /depot/config/../etc/passwd HTTP/1.1\r\n\
              Host: localhost\r\nConnection: close\r\n\r\n",
        )
        .await
        .expect("write");
    let mut response = String::new();
    stream
        .read_to_string(&mut response)
        .await
        .expect("read");
    assert!(
        response.starts_with("HTTP/1.1 406"),
        "unexpected response: {}",
        response
    );
}
