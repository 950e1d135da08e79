use axum::Router;
use axum::routing::get;
use tower_http::trace::TraceLayer;

use crate::AppState;
use crate::handlers;

/// Every path in the tree is addressable, so the router is just the root
/// plus a catch-all, with the four verbs dispatching per node.
pub fn create_app(state: AppState) -> Router {
    let node = get(handlers::get_node)
        .put(handlers::put_node)
        .post(handlers::post_node)
        .delete(handlers::delete_node);

    Router::new()
        .route("/", node.clone())
        .route("/{*path}", node)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
