use std::ops::Deref;

use axum::extract::{FromRef, FromRequestParts, OptionalFromRequestParts};
use axum::http::request::Parts;

use super::request::AxumRequest;
use super::state::AuthLayerState;
use crate::error::Error;
use crate::types::UserContext;

/// Authenticated user.
///
/// Taken from the request extensions when [`require_auth`](super::require_auth)
/// already ran; otherwise the request is authenticated on the spot. Rejects
/// with `401 Unauthorized` when that fails.
///
/// # Example
///
/// ```rust,ignore
/// async fn protected(AuthUser(user): AuthUser) -> impl IntoResponse {
///     format!("Hello, {} ({})", user.email, user.id)
/// }
///
/// // Optional: accessible to both authenticated and anonymous users
/// async fn public(user: Option<AuthUser>) -> impl IntoResponse {
///     match user {
///         Some(u) => format!("Hello, {}", u.email),
///         None => "Hello, guest".to_string(),
///     }
/// }
/// ```
#[derive(Debug, Clone)]
pub struct AuthUser(pub UserContext);

impl Deref for AuthUser {
    type Target = UserContext;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl<S> FromRequestParts<S> for AuthUser
where
    AuthLayerState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        if let Some(user) = parts.extensions.get::<UserContext>() {
            return Ok(Self(user.clone()));
        }

        let state = AuthLayerState::from_ref(state);
        let request = AxumRequest::from_parts(parts);
        state.authenticator.authenticate(&request).await.map(Self)
    }
}

impl<S> OptionalFromRequestParts<S> for AuthUser
where
    AuthLayerState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = Error;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &S,
    ) -> Result<Option<Self>, Self::Rejection> {
        match <Self as FromRequestParts<S>>::from_request_parts(parts, state).await {
            Ok(user) => Ok(Some(user)),
            Err(Error::Unauthenticated(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }
}
