//! Dispatcher-level checks that need no cluster and no HTTP socket: the
//! router is driven directly through `axum_test::TestServer`, backed by a
//! lone in-process engine. Covers the query grammar, reserved paths, and
//! root-node rules.

use std::sync::Arc;
use std::time::Duration;

use axum::http::StatusCode;
use axum_test::TestServer;
use parking_lot::RwLock;
use pulsefs_core::log::CommandLog;
use pulsefs_core::tree::Tree;
use pulsefs_core::watch::WatchRegistry;
use pulsefs_server::replication::{self, EngineConfig};
use pulsefs_server::{AppState, routes};
use tempfile::TempDir;

/// The router over a single-member engine. Returns the member identity for
/// reserved-path assertions; the scratch dir lives as long as the fixture.
async fn test_app() -> (TestServer, String, TempDir) {
    let data_root = TempDir::new().expect("tempdir");
    let peer = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("peer listener");
    let id = peer.local_addr().expect("peer addr").to_string();
    let data_dir = data_root.path().join(&id);
    std::fs::create_dir_all(&data_dir).expect("data dir");

    let tree = Arc::new(RwLock::new(Tree::new()));
    let watches = Arc::new(WatchRegistry::new());
    let log = Arc::new(CommandLog::new());
    let engine = replication::spawn(
        EngineConfig {
            id: id.clone(),
            join: None,
            timeout: Duration::from_secs(1),
            data_dir,
        },
        tree.clone(),
        watches.clone(),
        log,
        peer,
    );
    let app = routes::create_app(AppState {
        tree,
        watches,
        engine,
    });
    (TestServer::new(app).expect("test server"), id, data_root)
}

/// Poll until the lone member has elected itself and registered.
async fn wait_registered(server: &TestServer, id: &str) {
    for _ in 0..50 {
        let res = server.get(&format!("/pulsefs/servers/{id}")).await;
        if res.status_code() == StatusCode::OK {
            return;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    panic!("member {id} never registered");
}

#[tokio::test]
async fn test_put_on_root() {
    let (server, _id, _scratch) = test_app().await;

    let res = server.put("/").text("test").await;
    assert_eq!(res.status_code(), StatusCode::BAD_REQUEST);
    assert_eq!(res.text(), "/ is a directory");

    let res = server.put("/").add_raw_query_param("dir").await;
    assert_eq!(res.status_code(), StatusCode::BAD_REQUEST);
    assert_eq!(res.text(), "/ already exists");

    let res = server.delete("/").await;
    assert_eq!(res.status_code(), StatusCode::FORBIDDEN);
    assert_eq!(res.text(), "Forbidden");
}

#[tokio::test]
async fn test_forbidden_reserved_paths() {
    let (server, id, _scratch) = test_app().await;
    wait_registered(&server, &id).await;

    let res = server.put("/pulsefs/servers/file").text("x").await;
    assert_eq!(res.status_code(), StatusCode::FORBIDDEN);
    assert_eq!(res.text(), "Forbidden");

    // the registered member node cannot be deleted by clients
    let res = server.delete(&format!("/pulsefs/servers/{id}")).await;
    assert_eq!(res.status_code(), StatusCode::FORBIDDEN);

    let res = server.put("/pulsefs").add_raw_query_param("dir").await;
    assert_eq!(res.status_code(), StatusCode::FORBIDDEN);

    let res = server.post("/pulsefs/servers").await;
    assert_eq!(res.status_code(), StatusCode::FORBIDDEN);

    // reads stay open
    let res = server.get(&format!("/pulsefs/servers/{id}")).await;
    assert_eq!(res.status_code(), StatusCode::OK);
}

#[tokio::test]
async fn test_bad_query_parameters() {
    let (server, _id, _scratch) = test_app().await;

    let cases = [
        server.get("/").add_raw_query_param("wait=abc"),
        server.get("/").add_raw_query_param("wait"),
        server.put("/x").add_raw_query_param("bogus"),
        server.put("/x").add_raw_query_param("dir=true"),
        server.delete("/x").add_raw_query_param("version=-2"),
    ];
    for request in cases {
        let res = request.await;
        assert_eq!(res.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(res.text(), "bad query parameter");
    }
}

#[tokio::test]
async fn test_missing_node_reason() {
    let (server, _id, _scratch) = test_app().await;

    let res = server.get("/none").await;
    assert_eq!(res.status_code(), StatusCode::NOT_FOUND);
    assert_eq!(res.text(), "/none does not exist");

    // waiting with a non-zero threshold on a missing node is a plain 404
    let res = server.get("/none").add_raw_query_param("wait=3").await;
    assert_eq!(res.status_code(), StatusCode::NOT_FOUND);
}
