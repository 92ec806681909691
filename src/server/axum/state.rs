use crate::server::{Authenticator, IdentityServer};

/// State for the authentication middleware.
///
/// Embed it in a larger application state and implement
/// [`FromRef`](axum::extract::FromRef) for it to use [`AuthUser`](super::AuthUser)
/// without `require_auth`.
#[derive(Debug, Clone)]
pub struct AuthLayerState {
    pub(super) authenticator: Authenticator,
}

impl AuthLayerState {
    #[must_use]
    pub fn new(authenticator: Authenticator) -> Self {
        Self { authenticator }
    }

    #[must_use]
    pub fn authenticator(&self) -> &Authenticator {
        &self.authenticator
    }
}

impl From<&IdentityServer> for AuthLayerState {
    fn from(server: &IdentityServer) -> Self {
        Self::new(server.authenticator().clone())
    }
}
