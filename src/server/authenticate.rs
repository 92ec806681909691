//! Framework-independent request authentication.
//!
//! Framework adapters implement [`AuthRequest`] for their request type and
//! translate the returned [`Error`] into a response; everything else lives
//! here.

use std::sync::Arc;

use super::config::{MfaPolicy, TokenSource};
use super::hooks::{HookManager, RequestMeta};
use super::validator::{extract_token_from_header, has_permission, has_role, Validator};
use crate::error::Error;
use crate::types::UserContext;

/// Read access to an incoming request.
pub trait AuthRequest {
    /// Header value by name (case-insensitive). Non-UTF-8 values read as absent.
    fn header(&self, name: &str) -> Option<&str>;

    fn cookie(&self, name: &str) -> Option<String>;

    /// Client details reported to hooks.
    fn meta(&self) -> RequestMeta {
        RequestMeta::default()
    }
}

/// Authenticates requests and enforces role, permission, MFA and context
/// requirements, reporting failures to the hooks.
#[derive(Debug, Clone)]
pub struct Authenticator {
    validator: Arc<Validator>,
    hooks: Arc<HookManager>,
    source: TokenSource,
    mfa_policy: MfaPolicy,
}

impl Authenticator {
    pub(crate) fn new(
        validator: Arc<Validator>,
        hooks: Arc<HookManager>,
        source: TokenSource,
        mfa_policy: MfaPolicy,
    ) -> Self {
        Self {
            validator,
            hooks,
            source,
            mfa_policy,
        }
    }

    /// Token carried by the request.
    ///
    /// The configured header wins when present, and must then be
    /// `<prefix> <token>`; the cookie is consulted only without the header.
    #[must_use]
    pub fn extract_token<R: AuthRequest + ?Sized>(&self, request: &R) -> Option<String> {
        match request
            .header(&self.source.header)
            .filter(|value| !value.trim().is_empty())
        {
            Some(value) => {
                extract_token_from_header(Some(value), &self.source.prefix).map(str::to_string)
            }
            None => request
                .cookie(&self.source.cookie)
                .filter(|token| !token.is_empty()),
        }
    }

    /// Resolve the user behind a request.
    ///
    /// # Errors
    ///
    /// [`Error::Unauthenticated`] when the request carries no usable token or
    /// the token does not validate.
    pub async fn authenticate<R: AuthRequest + ?Sized>(
        &self,
        request: &R,
    ) -> Result<UserContext, Error> {
        let Some(token) = self.extract_token(request) else {
            self.hooks
                .on_unauthorized_attempt(&request.meta(), "No token provided", None);
            return Err(Error::Unauthenticated("Authentication required".into()));
        };

        match self.validator.validate_token(&token).await {
            Some(user) => Ok(user),
            None => {
                self.hooks
                    .on_unauthorized_attempt(&request.meta(), "Invalid token", Some(&token));
                Err(Error::Unauthenticated("Invalid token".into()))
            }
        }
    }

    /// Require at least one of `roles`.
    ///
    /// # Errors
    ///
    /// [`Error::Forbidden`] when the user holds none of them.
    pub fn require_roles<S: AsRef<str>>(
        &self,
        user: &UserContext,
        roles: &[S],
        meta: &RequestMeta,
    ) -> Result<(), Error> {
        let allowed = has_role(user, roles);
        let required: Vec<String> = roles.iter().map(|r| r.as_ref().to_string()).collect();
        self.hooks.on_role_check(meta, &user.id, &required, allowed);
        if allowed {
            Ok(())
        } else {
            Err(Error::Forbidden("Insufficient permissions".into()))
        }
    }

    /// Require every one of `permissions`.
    ///
    /// # Errors
    ///
    /// [`Error::Forbidden`] when any is missing.
    pub fn require_permissions<S: AsRef<str>>(
        &self,
        user: &UserContext,
        permissions: &[S],
    ) -> Result<(), Error> {
        if has_permission(user, permissions) {
            Ok(())
        } else {
            Err(Error::Forbidden("Insufficient permissions".into()))
        }
    }

    /// Require a verified second factor when the policy demands one for the
    /// user's context.
    ///
    /// # Errors
    ///
    /// [`Error::MfaRequired`] when MFA applies and the user is unverified.
    pub fn require_mfa(&self, user: &UserContext, meta: &RequestMeta) -> Result<(), Error> {
        if self.mfa_policy.applies_to(&user.context) && !user.mfa_verified {
            self.hooks.on_mfa_required(meta, &user.id);
            return Err(Error::MfaRequired);
        }
        Ok(())
    }

    /// Require the user to be in `context`.
    ///
    /// # Errors
    ///
    /// [`Error::Forbidden`] for any other context.
    pub fn require_context(&self, user: &UserContext, context: &str) -> Result<(), Error> {
        if user.context == context {
            Ok(())
        } else {
            Err(Error::Forbidden(format!(
                "Context '{context}' required, got '{}'",
                user.context
            )))
        }
    }
}
