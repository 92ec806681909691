use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::Response;

use super::request::AxumRequest;
use super::state::AuthLayerState;
use crate::error::Error;
use crate::server::AuthRequest;
use crate::types::UserContext;

/// Future returned by the guard factories.
type GuardFuture = Pin<Box<dyn Future<Output = Result<Response, Error>> + Send>>;

/// Authenticate the request and store its [`UserContext`] in the request
/// extensions. Use with `from_fn_with_state`.
pub async fn require_auth(
    State(state): State<AuthLayerState>,
    mut req: Request,
    next: Next,
) -> Result<Response, Error> {
    let user = {
        let request = AxumRequest::from_request(&req);
        state.authenticator.authenticate(&request).await?
    };

    req.extensions_mut().insert(user);

    Ok(next.run(req).await)
}

/// Require at least one of `roles`. Must run after [`require_auth`].
///
/// Every check is reported to the role-check hook.
pub fn require_roles<I, S>(
    roles: I,
) -> impl Fn(State<AuthLayerState>, Request, Next) -> GuardFuture + Clone + Send + Sync + 'static
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let roles: Arc<[String]> = roles.into_iter().map(Into::into).collect();
    move |State(state): State<AuthLayerState>, req: Request, next: Next| {
        let roles = roles.clone();
        Box::pin(async move {
            let user = authenticated_user(&req)?;
            let meta = AxumRequest::from_request(&req).meta();
            state.authenticator.require_roles(user, &roles[..], &meta)?;
            Ok(next.run(req).await)
        })
    }
}

/// Require every one of `permissions`. Must run after [`require_auth`].
pub fn require_permissions<I, S>(
    permissions: I,
) -> impl Fn(State<AuthLayerState>, Request, Next) -> GuardFuture + Clone + Send + Sync + 'static
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let permissions: Arc<[String]> = permissions.into_iter().map(Into::into).collect();
    move |State(state): State<AuthLayerState>, req: Request, next: Next| {
        let permissions = permissions.clone();
        Box::pin(async move {
            let user = authenticated_user(&req)?;
            state.authenticator.require_permissions(user, &permissions[..])?;
            Ok(next.run(req).await)
        })
    }
}

/// Require a verified second factor when the configured policy demands one
/// for the user's context. Must run after [`require_auth`].
pub async fn require_mfa(
    State(state): State<AuthLayerState>,
    req: Request,
    next: Next,
) -> Result<Response, Error> {
    let user = authenticated_user(&req)?;
    let meta = AxumRequest::from_request(&req).meta();
    state.authenticator.require_mfa(user, &meta)?;
    Ok(next.run(req).await)
}

/// Require the user to be in `context`. Must run after [`require_auth`].
pub fn require_context(
    context: impl Into<String>,
) -> impl Fn(State<AuthLayerState>, Request, Next) -> GuardFuture + Clone + Send + Sync + 'static {
    let context: Arc<str> = Arc::from(context.into());
    move |State(state): State<AuthLayerState>, req: Request, next: Next| {
        let context = context.clone();
        Box::pin(async move {
            let user = authenticated_user(&req)?;
            state.authenticator.require_context(user, &context)?;
            Ok(next.run(req).await)
        })
    }
}

fn authenticated_user(req: &Request) -> Result<&UserContext, Error> {
    req.extensions()
        .get::<UserContext>()
        .ok_or_else(|| Error::Unauthenticated("Authentication required".into()))
}
