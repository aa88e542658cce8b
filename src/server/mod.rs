//! HTTP Server
//!
//! Assembles the member RPC routes (`/ring/...`) and the client routes
//! (`/kv/...`) into one router. Every route is scoped by member name, so one
//! server hosts all members registered in its [`Directory`].

use axum::{
    Json, Router,
    extract::Extension,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;

use crate::error::{ErrorKind, RingError};
use crate::query;
use crate::ring;
use crate::ring::peer::Directory;

impl IntoResponse for RingError {
    fn into_response(self) -> Response {
        let status = match self.kind() {
            ErrorKind::NotFound | ErrorKind::NotBound => StatusCode::NOT_FOUND,
            ErrorKind::InvalidArgument => StatusCode::BAD_REQUEST,
            ErrorKind::StaleLink => StatusCode::CONFLICT,
            ErrorKind::NotOwner => StatusCode::MISDIRECTED_REQUEST,
            ErrorKind::RingInconsistency => StatusCode::INTERNAL_SERVER_ERROR,
            ErrorKind::Unreachable | ErrorKind::Transport => StatusCode::BAD_GATEWAY,
        };
        (status, Json(self.to_response())).into_response()
    }
}

pub fn router(directory: Arc<Directory>) -> Router {
    use ring::handlers as rpc;
    use ring::protocol as rp;

    let ring_path = |endpoint: &str| rp::member_path(":name", endpoint);
    let kv_path = |endpoint: &str| query::protocol::member_path(":name", endpoint);

    Router::new()
        // Member RPC
        .route(&ring_path(rp::ENDPOINT_VIEW), get(rpc::handle_view))
        .route(&ring_path(rp::ENDPOINT_SUCCESSOR), post(rpc::handle_replace_link))
        .route(&ring_path(rp::ENDPOINT_PREDECESSOR), post(rpc::handle_replace_link))
        .route(&ring_path(rp::ENDPOINT_LOOKUP), post(rpc::handle_lookup))
        .route(&ring_path(rp::ENDPOINT_FINGERS), post(rpc::handle_fingers))
        .route(&ring_path(rp::ENDPOINT_REFRESH), post(rpc::handle_refresh))
        .route(&ring_path(rp::ENDPOINT_HANDOVER), post(rpc::handle_handover))
        .route(&ring_path(rp::ENDPOINT_ABSORB), post(rpc::handle_absorb))
        .route(&ring_path(rp::ENDPOINT_RETRACT), post(rpc::handle_retract))
        .route(
            &format!("{}/:key", ring_path(rp::ENDPOINT_FETCH)),
            get(rpc::handle_fetch),
        )
        .route(&ring_path(rp::ENDPOINT_STORE), post(rpc::handle_store))
        .route(&ring_path(rp::ENDPOINT_REMOVE), post(rpc::handle_remove))
        .route(&ring_path(rp::ENDPOINT_VALUES), get(rpc::handle_values))
        .route(&ring_path(rp::ENDPOINT_PROBE), post(rpc::handle_probe))
        .route(&ring_path(rp::ENDPOINT_MEMBERS), get(rpc::handle_members))
        // Client surface
        .route(
            &kv_path(query::protocol::ENDPOINT_PUT),
            post(query::handlers::handle_put),
        )
        .route(
            &kv_path(query::protocol::ENDPOINT_GET),
            get(query::handlers::handle_get),
        )
        .route(
            &kv_path(query::protocol::ENDPOINT_DELETE),
            post(query::handlers::handle_delete),
        )
        .route(
            &kv_path(query::protocol::ENDPOINT_VALUES),
            get(query::handlers::handle_values),
        )
        .route(
            &kv_path(query::protocol::ENDPOINT_REFRESH),
            post(query::handlers::handle_refresh),
        )
        .route(
            &kv_path(query::protocol::ENDPOINT_MEMBERS),
            get(query::handlers::handle_members),
        )
        .route(
            &kv_path(query::protocol::ENDPOINT_LEAVE),
            post(query::handlers::handle_leave),
        )
        .route(
            &kv_path(query::protocol::ENDPOINT_PROBE),
            post(query::handlers::handle_probe),
        )
        .layer(Extension(directory))
}

/// Serves [`router`] on `listener` until `shutdown` resolves.
pub async fn serve<F>(
    listener: TcpListener,
    directory: Arc<Directory>,
    shutdown: F,
) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let addr = listener.local_addr()?;
    tracing::info!("HTTP server listening on {}", addr);
    axum::serve(listener, router(directory))
        .with_graceful_shutdown(shutdown)
        .await
}
