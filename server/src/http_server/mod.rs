use std::net::SocketAddr;

use axum::response::Response;
use color_eyre::eyre::Context;
use tokio::net::TcpListener;

use crate::AppState;

mod api;
pub(crate) mod errors;
mod extract;
pub(crate) mod routes;
#[cfg(test)]
pub(crate) mod test_helpers;
mod trace;

pub(crate) use errors::ServerError;

type ResponseResult<T = Response> = Result<T, ServerError>;

/// Builds the full application: routes, state and the request tracing layer.
pub(crate) fn app(state: AppState) -> axum::Router {
    let tracer = trace::Tracer;
    let trace_layer = tower_http::trace::TraceLayer::new_for_http()
        .make_span_with(tracer)
        .on_response(tracer);

    routes::make_router().with_state(state).layer(trace_layer)
}

pub(crate) async fn run_server(state: AppState) -> crate::Result<()> {
    let port = state.config.port;
    let app = app(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("Starting server on port {}", port);
    let listener = TcpListener::bind(&addr)
        .await
        .wrap_err("Failed to open port")?;

    let addr = listener.local_addr()?;
    tracing::info!("Listening on {}", addr);

    axum::serve(listener, app)
        .await
        .wrap_err("Failed to run server")
}
