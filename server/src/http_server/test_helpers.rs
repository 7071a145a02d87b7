use std::sync::Arc;

use axum::{
    body::Body,
    http::{header, Method, Request, Response},
    Router,
};
use db::cooking::MemoryStore;
use serde::de::DeserializeOwned;

use crate::{
    auth::{AllowAll, Authorizer, BearerToken},
    AppConfig, AppState,
};

fn build(authorizer: Arc<dyn Authorizer>) -> (Router, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    let config = AppConfig {
        port: 0,
        database_url: None,
        api_token: None,
    };

    let state = AppState::new(store.clone(), authorizer, config);
    (super::app(state), store)
}

/// An app over a fresh in-memory store that allows every write. The store is
/// returned so tests can seed it directly.
pub fn test_app() -> (Router, Arc<MemoryStore>) {
    build(Arc::new(AllowAll))
}

pub fn test_app_with_token(token: &str) -> (Router, Arc<MemoryStore>) {
    build(Arc::new(BearerToken::new(token.to_string())))
}

pub fn json_request(method: Method, uri: &str, body: &serde_json::Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

pub fn empty_request(method: Method, uri: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

pub async fn response_body_json<T: DeserializeOwned>(response: Response<Body>) -> T {
    let body_bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body_bytes).unwrap()
}
