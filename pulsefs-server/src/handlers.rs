//! The request dispatcher: HTTP verbs mapped onto state-machine commands.
//!
//! Paths are taken verbatim from the request URI (percent-escapes are node
//! name bytes, never decoded) and queries are parsed by the typed grammar
//! in pulsefs-core. Writes go through the replication engine; reads are
//! answered from the locally applied tree, suspending on a watch when the
//! caller asked to `wait`.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode, Uri, header};
use axum::response::{IntoResponse, Json, Response};
use pulsefs_core::command::Command;
use pulsefs_core::node::{NodeKind, NodeView};
use pulsefs_core::query::Query;
use pulsefs_core::watch::WatchOutcome;
use pulsefs_core::{StoreError, path};
use tracing::debug;

use crate::AppState;
use crate::errors::{ApiError, ApiResult};

pub async fn get_node(State(state): State<AppState>, uri: Uri) -> ApiResult<Response> {
    let node_path = path::canonical(uri.path());
    let query = Query::parse(uri.query()).map_err(ApiError::from)?;

    let Some(threshold) = query.wait else {
        let view = state
            .tree
            .read()
            .view(&node_path)
            .ok_or_else(|| not_found(&node_path))?;
        return Ok(read_response(&view));
    };

    // register before reading the tree: an apply that lands in between will
    // find the watch, so no version can slip through unobserved
    let watch = state.watches.register(&node_path, threshold);
    {
        let tree = state.tree.read();
        match tree.view(&node_path) {
            Some(view) if view.version >= threshold => return Ok(read_response(&view)),
            Some(_) => {}
            // only wait-for-create (threshold 0) may target a missing node
            None if threshold > 0 => return Err(not_found(&node_path)),
            None => {}
        }
    }

    debug!(path = %node_path, threshold, "read suspended on watch");
    match watch.await {
        Ok(WatchOutcome::Updated(view)) => Ok(read_response(&view)),
        Ok(WatchOutcome::Deleted) => Err(not_found(&node_path)),
        Err(_) => Err(ApiError::unavailable()),
    }
}

pub async fn put_node(
    State(state): State<AppState>,
    uri: Uri,
    body: Bytes,
) -> ApiResult<Response> {
    let node_path = path::canonical(uri.path());
    let query = Query::parse(uri.query()).map_err(ApiError::from)?;
    reject_reserved(&node_path)?;

    let command = if query.dir {
        Command::CreateDir {
            path: node_path,
            recursive: query.recursive,
            transient: query.transient,
            expected_version: query.version,
        }
    } else {
        Command::PutFile {
            path: node_path,
            content: body.to_vec(),
            recursive: query.recursive,
            transient: query.transient,
            expected_version: query.version,
        }
    };

    let applied = state.engine.submit(command).await?;
    let status = if applied.created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    let view = applied.view.ok_or_else(ApiError::unavailable)?;
    Ok(node_response(status, &view))
}

pub async fn post_node(
    State(state): State<AppState>,
    uri: Uri,
    body: Bytes,
) -> ApiResult<Response> {
    let parent = path::canonical(uri.path());
    Query::parse(uri.query()).map_err(ApiError::from)?;
    reject_reserved(&parent)?;

    let applied = state
        .engine
        .submit(Command::CreateSequential {
            parent,
            content: body.to_vec(),
        })
        .await?;
    let view = applied.view.ok_or_else(ApiError::unavailable)?;

    let mut response = node_response(StatusCode::CREATED, &view);
    if let Ok(location) = HeaderValue::from_str(&applied.path) {
        response.headers_mut().insert(header::LOCATION, location);
    }
    Ok(response)
}

pub async fn delete_node(State(state): State<AppState>, uri: Uri) -> ApiResult<Response> {
    let node_path = path::canonical(uri.path());
    let query = Query::parse(uri.query()).map_err(ApiError::from)?;
    reject_reserved(&node_path)?;

    state
        .engine
        .submit(Command::Delete {
            path: node_path,
            recursive: query.recursive,
            expected_version: query.version,
        })
        .await?;
    Ok(StatusCode::OK.into_response())
}

fn reject_reserved(node_path: &str) -> ApiResult<()> {
    if path::is_reserved(node_path) {
        Err(ApiError::from(StoreError::Forbidden))
    } else {
        Ok(())
    }
}

fn not_found(node_path: &str) -> ApiError {
    ApiError::not_found(StoreError::NotFound(node_path.to_string()).to_string())
}

/// `path`, `type`, `version`, `checksum`: mirrored on every 2xx node
/// response, body included or not.
fn node_headers(view: &NodeView) -> HeaderMap {
    let mut headers = HeaderMap::new();
    let pairs = [
        ("path", view.path.clone()),
        ("type", view.kind.to_string()),
        ("version", view.version.to_string()),
        ("checksum", view.checksum.clone()),
    ];
    for (name, value) in pairs {
        if let Ok(value) = HeaderValue::from_str(&value) {
            headers.insert(HeaderName::from_static(name), value);
        }
    }
    headers
}

/// Write responses carry the node JSON.
fn node_response(status: StatusCode, view: &NodeView) -> Response {
    (status, node_headers(view), Json(view)).into_response()
}

/// Read responses: files answer with their raw content bytes (exactly as
/// stored), directories with the node JSON (children as stubs).
fn read_response(view: &NodeView) -> Response {
    match view.kind {
        NodeKind::File => {
            let content = view.content.clone().unwrap_or_default();
            (
                StatusCode::OK,
                node_headers(view),
                [(header::CONTENT_TYPE, "application/octet-stream")],
                content,
            )
                .into_response()
        }
        NodeKind::Dir | NodeKind::TransientDir => node_response(StatusCode::OK, view),
    }
}
