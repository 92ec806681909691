//! Axum integration for the server SDK.
//!
//! [`require_auth`] authenticates the request and stores the
//! [`UserContext`](crate::UserContext) in the request extensions; the guard
//! factories run after it and read that context back.
//!
//! ```rust,ignore
//! use axum::middleware::from_fn_with_state;
//! use aether_identity::server::axum::{
//!     require_auth, require_context, require_mfa, require_roles, AuthLayerState, AuthUser,
//! };
//!
//! let state = AuthLayerState::from(&server);
//!
//! let admin = Router::new()
//!     .route("/users", get(list_users))
//!     .route_layer(from_fn_with_state(state.clone(), require_context("admin")))
//!     .route_layer(from_fn_with_state(state.clone(), require_mfa))
//!     .route_layer(from_fn_with_state(state.clone(), require_roles(["admin"])));
//!
//! let app = Router::new()
//!     .nest("/admin", admin)
//!     .route("/me", get(|AuthUser(user): AuthUser| async move { user.email }))
//!     .route_layer(from_fn_with_state(state, require_auth));
//! ```
//!
//! Layers run bottom-up: `require_auth` is added last so it runs first.

mod error;
mod extractor;
mod middleware;
mod request;
mod state;

pub use extractor::AuthUser;
pub use middleware::{
    require_auth, require_context, require_mfa, require_permissions, require_roles,
};
pub use request::AxumRequest;
pub use state::AuthLayerState;
