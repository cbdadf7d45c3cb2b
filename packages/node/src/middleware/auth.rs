//! Requesting-user extractors.
//!
//! Identity is established upstream (a gateway or the hosting application)
//! and forwarded in the [`USER_HEADER`] header as a numeric user id.
//!
//! Provides two extractors:
//! - [`Viewer`]: the requesting user, or [`ANONYMOUS`] when the header is absent.
//! - [`RequireUser`]: a signed-in user; returns 401 if the header is absent.
//!
//! Both return 401 for a header that is not a valid user id.

use axum::{
    extract::FromRequestParts,
    http::{request::Parts, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use hgroups::{UserId, ANONYMOUS};
use hgroups_node_api::{error::codes, ErrorResponse, USER_HEADER};

// ---------------------------------------------------------------------------
// Auth errors
// ---------------------------------------------------------------------------

/// An authentication failure that maps to HTTP 401.
#[derive(Debug)]
pub struct AuthError(pub String);

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let body = ErrorResponse::new(codes::UNAUTHENTICATED, self.0);
        (StatusCode::UNAUTHORIZED, Json(body)).into_response()
    }
}

/// Read the user id from the request headers.
///
/// `Ok(None)` when the header is absent. `0` is accepted and means anonymous.
pub(crate) fn user_from_parts(parts: &Parts) -> Result<Option<UserId>, String> {
    let Some(raw) = parts.headers.get(USER_HEADER) else {
        return Ok(None);
    };
    let value = raw
        .to_str()
        .map_err(|_| format!("{USER_HEADER} header is not valid ASCII"))?;
    value
        .trim()
        .parse::<UserId>()
        .map(Some)
        .map_err(|_| format!("{USER_HEADER} must be a numeric user id, got {value:?}"))
}

// ---------------------------------------------------------------------------
// Viewer extractor
// ---------------------------------------------------------------------------

/// The requesting user. Anonymous requests yield [`ANONYMOUS`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Viewer(pub UserId);

impl<S> FromRequestParts<S> for Viewer
where
    S: Send + Sync,
{
    type Rejection = AuthError;

    fn from_request_parts(
        parts: &mut Parts,
        _state: &S,
    ) -> impl std::future::Future<Output = Result<Self, Self::Rejection>> + Send {
        let result = user_from_parts(parts);
        async move {
            let user = result.map_err(AuthError)?;
            Ok(Viewer(user.unwrap_or(ANONYMOUS)))
        }
    }
}

// ---------------------------------------------------------------------------
// RequireUser extractor
// ---------------------------------------------------------------------------

/// A signed-in requesting user.
///
/// Returns 401 if the header is absent or names the anonymous user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequireUser(pub UserId);

impl<S> FromRequestParts<S> for RequireUser
where
    S: Send + Sync,
{
    type Rejection = AuthError;

    fn from_request_parts(
        parts: &mut Parts,
        _state: &S,
    ) -> impl std::future::Future<Output = Result<Self, Self::Rejection>> + Send {
        let result = user_from_parts(parts);
        async move {
            match result.map_err(AuthError)? {
                Some(user) if user != ANONYMOUS => Ok(RequireUser(user)),
                _ => Err(AuthError("sign in required".into())),
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    fn parts(header: Option<&str>) -> Parts {
        let mut builder = Request::builder().uri("/v1/groups");
        if let Some(value) = header {
            builder = builder.header(USER_HEADER, value);
        }
        builder.body(()).unwrap().into_parts().0
    }

    #[tokio::test]
    async fn absent_header_is_anonymous() {
        let mut p = parts(None);
        let Viewer(user) = Viewer::from_request_parts(&mut p, &()).await.unwrap();
        assert_eq!(user, ANONYMOUS);
        assert!(RequireUser::from_request_parts(&mut p, &()).await.is_err());
    }

    #[tokio::test]
    async fn numeric_header_is_the_user() {
        let mut p = parts(Some(" 42 "));
        let RequireUser(user) = RequireUser::from_request_parts(&mut p, &()).await.unwrap();
        assert_eq!(user, 42);
    }

    #[tokio::test]
    async fn zero_is_not_signed_in() {
        let mut p = parts(Some("0"));
        assert!(Viewer::from_request_parts(&mut p, &()).await.is_ok());
        assert!(RequireUser::from_request_parts(&mut p, &()).await.is_err());
    }

    #[tokio::test]
    async fn malformed_header_is_rejected() {
        let mut p = parts(Some("alice"));
        let err = Viewer::from_request_parts(&mut p, &()).await.unwrap_err();
        assert!(err.0.contains("numeric"));
    }
}
