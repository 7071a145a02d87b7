//! Write authorization. Reads are always open; handlers that mutate state
//! take a [`WriteAccess`] extractor, which asks the injected [`Authorizer`].

use axum::{
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts, StatusCode},
};
use color_eyre::eyre::eyre;

use crate::{
    http_server::errors::{ServerError, WithStatus as _},
    AppState,
};

pub(crate) trait Authorizer: Send + Sync {
    /// `credentials` is the raw `Authorization` header value, if any.
    fn can_write(&self, credentials: Option<&str>) -> bool;
}

#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct AllowAll;

impl Authorizer for AllowAll {
    fn can_write(&self, _credentials: Option<&str>) -> bool {
        true
    }
}

#[derive(Clone)]
pub(crate) struct BearerToken {
    token: String,
}

impl BearerToken {
    pub(crate) fn new(token: String) -> Self {
        Self { token }
    }
}

impl Authorizer for BearerToken {
    fn can_write(&self, credentials: Option<&str>) -> bool {
        credentials
            .and_then(|value| value.strip_prefix("Bearer "))
            .is_some_and(|token| token.trim() == self.token)
    }
}

/// Proof that the caller may mutate state.
#[derive(Debug, Clone, Copy)]
pub(crate) struct WriteAccess;

impl FromRequestParts<AppState> for WriteAccess {
    type Rejection = ServerError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let credentials = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok());

        if state.authorizer.can_write(credentials) {
            Ok(WriteAccess)
        } else {
            tracing::debug!(
                has_credentials = credentials.is_some(),
                "Rejected write request"
            );
            Err::<Self, _>(eyre!("a valid bearer token is required"))
                .with_status(StatusCode::UNAUTHORIZED)
        }
    }
}
