//! Request extractors shared by the admin handlers.

use crate::error::ApiError;
use axum::async_trait;
use axum::body::Bytes;
use axum::extract::{FromRequest, FromRequestParts, Request};
use axum::http::{header, request::Parts, HeaderMap};
use serde::de::DeserializeOwned;

/// Header set by the gateway for authenticated users
pub const USER_HEADER: &str = "x-user";

/// Authenticated caller, taken from the `X-User` header.
///
/// The gateway forwards `{}` for anonymous requests, so that counts as
/// missing.
#[derive(Debug, Clone)]
pub struct AdminUser(pub String);

#[async_trait]
impl<S> FromRequestParts<S> for AdminUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user = parts
            .headers
            .get(USER_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .unwrap_or_default();

        if user.is_empty() || user == "{}" {
            return Err(ApiError::Unauthorized);
        }
        Ok(AdminUser(user.to_string()))
    }
}

/// JSON body that insists on an `application/json` content type.
///
/// Unlike `axum::Json`, rejections are rendered as [`ApiError`] bodies.
#[derive(Debug)]
pub struct JsonBody<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for JsonBody<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        if !is_json(req.headers()) {
            return Err(ApiError::UnsupportedMediaType);
        }

        let bytes = Bytes::from_request(req, state)
            .await
            .map_err(|e| ApiError::InvalidRequest(e.body_text()))?;

        let value = serde_json::from_slice(&bytes)
            .map_err(|e| ApiError::InvalidRequest(format!("Invalid JSON body: {e}")))?;
        Ok(JsonBody(value))
    }
}

fn is_json(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .and_then(|ct| ct.split(';').next())
        .is_some_and(|mime| mime.trim().eq_ignore_ascii_case("application/json"))
}
