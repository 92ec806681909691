//! Lifecycle hooks.
//!
//! Each event has one optional async callback. Callbacks are spawned on the
//! tokio runtime and never awaited by the operation that fired them; a failing
//! or panicking callback only affects its own task.
//!
//! ```rust,ignore
//! use aether_identity::server::ServerHooks;
//!
//! let hooks = ServerHooks::new()
//!     .on_login(|event| async move {
//!         audit_log.record(&event.user_id, event.success).await?;
//!         Ok(())
//!     })
//!     .on_unauthorized_attempt(|event| async move {
//!         tracing::warn!(reason = %event.reason, ip = ?event.context.ip, "Rejected request");
//!         Ok(())
//!     });
//! ```

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use derive_more::{Display, From, Into};
use futures_util::future::{BoxFuture, FutureExt};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

/// Outcome of a hook callback. Errors are logged and otherwise ignored.
pub type HookResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;

/// Type-erased async hook callback.
pub type HookFn<E> = Arc<dyn Fn(E) -> BoxFuture<'static, HookResult> + Send + Sync>;

/// Identifier generated for every fired event.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, From, Into,
)]
#[serde(transparent)]
pub struct RequestId(pub Uuid);

impl RequestId {
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

/// Request details the caller knows about the incoming request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[non_exhaustive]
pub struct RequestMeta {
    pub ip: Option<String>,
    pub user_agent: Option<String>,
    pub path: Option<String>,
}

impl RequestMeta {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_ip(mut self, ip: impl Into<String>) -> Self {
        self.ip = Some(ip.into());
        self
    }

    #[must_use]
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    #[must_use]
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }
}

/// Fields shared by every hook event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[non_exhaustive]
pub struct HookContext {
    pub ip: Option<String>,
    pub user_agent: Option<String>,
    pub request_id: RequestId,
    pub path: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
}

impl HookContext {
    fn from_meta(meta: &RequestMeta) -> Self {
        Self {
            ip: meta.ip.clone(),
            user_agent: meta.user_agent.clone(),
            request_id: RequestId::new(),
            path: meta.path.clone(),
            timestamp: OffsetDateTime::now_utc(),
        }
    }
}

#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct LoginEvent {
    pub context: HookContext,
    pub user_id: String,
    pub email: String,
    pub success: bool,
}

#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct LogoutEvent {
    pub context: HookContext,
    pub user_id: String,
}

#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct TokenRefreshEvent {
    pub context: HookContext,
    pub user_id: String,
}

#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct UnauthorizedAttemptEvent {
    pub context: HookContext,
    pub reason: String,
    /// The rejected token, when one was presented.
    pub token: Option<String>,
}

#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct MfaRequiredEvent {
    pub context: HookContext,
    pub user_id: String,
}

#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct RoleCheckEvent {
    pub context: HookContext,
    pub user_id: String,
    pub required_roles: Vec<String>,
    pub has_role: bool,
}

/// One optional callback per lifecycle event.
#[derive(Clone, Default)]
pub struct ServerHooks {
    login: Option<HookFn<LoginEvent>>,
    logout: Option<HookFn<LogoutEvent>>,
    token_refresh: Option<HookFn<TokenRefreshEvent>>,
    unauthorized_attempt: Option<HookFn<UnauthorizedAttemptEvent>>,
    mfa_required: Option<HookFn<MfaRequiredEvent>>,
    role_check: Option<HookFn<RoleCheckEvent>>,
}

impl fmt::Debug for ServerHooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerHooks")
            .field("login", &self.login.is_some())
            .field("logout", &self.logout.is_some())
            .field("token_refresh", &self.token_refresh.is_some())
            .field("unauthorized_attempt", &self.unauthorized_attempt.is_some())
            .field("mfa_required", &self.mfa_required.is_some())
            .field("role_check", &self.role_check.is_some())
            .finish()
    }
}

fn boxed<E, F, Fut>(f: F) -> HookFn<E>
where
    F: Fn(E) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HookResult> + Send + 'static,
{
    Arc::new(move |event| f(event).boxed())
}

impl ServerHooks {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn on_login<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(LoginEvent) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HookResult> + Send + 'static,
    {
        self.login = Some(boxed(f));
        self
    }

    #[must_use]
    pub fn on_logout<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(LogoutEvent) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HookResult> + Send + 'static,
    {
        self.logout = Some(boxed(f));
        self
    }

    #[must_use]
    pub fn on_token_refresh<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(TokenRefreshEvent) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HookResult> + Send + 'static,
    {
        self.token_refresh = Some(boxed(f));
        self
    }

    #[must_use]
    pub fn on_unauthorized_attempt<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(UnauthorizedAttemptEvent) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HookResult> + Send + 'static,
    {
        self.unauthorized_attempt = Some(boxed(f));
        self
    }

    #[must_use]
    pub fn on_mfa_required<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(MfaRequiredEvent) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HookResult> + Send + 'static,
    {
        self.mfa_required = Some(boxed(f));
        self
    }

    #[must_use]
    pub fn on_role_check<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(RoleCheckEvent) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HookResult> + Send + 'static,
    {
        self.role_check = Some(boxed(f));
        self
    }
}

/// Dispatches lifecycle events to the registered [`ServerHooks`].
///
/// Every `on_*` method returns immediately. Without a registered callback it
/// does nothing, not even build the event.
#[derive(Debug, Default)]
pub struct HookManager {
    hooks: RwLock<ServerHooks>,
}

impl HookManager {
    #[must_use]
    pub fn new(hooks: ServerHooks) -> Self {
        Self {
            hooks: RwLock::new(hooks),
        }
    }

    /// Swap in a new set of callbacks. Events already dispatched keep
    /// running with the old ones.
    pub fn replace(&self, hooks: ServerHooks) {
        *self.hooks.write() = hooks;
    }

    pub fn on_login(&self, meta: &RequestMeta, user_id: &str, email: &str, success: bool) {
        let Some(hook) = self.hooks.read().login.clone() else {
            return;
        };
        dispatch(
            "login",
            hook,
            LoginEvent {
                context: HookContext::from_meta(meta),
                user_id: user_id.to_string(),
                email: email.to_string(),
                success,
            },
        );
    }

    pub fn on_logout(&self, meta: &RequestMeta, user_id: &str) {
        let Some(hook) = self.hooks.read().logout.clone() else {
            return;
        };
        dispatch(
            "logout",
            hook,
            LogoutEvent {
                context: HookContext::from_meta(meta),
                user_id: user_id.to_string(),
            },
        );
    }

    pub fn on_token_refresh(&self, meta: &RequestMeta, user_id: &str) {
        let Some(hook) = self.hooks.read().token_refresh.clone() else {
            return;
        };
        dispatch(
            "token_refresh",
            hook,
            TokenRefreshEvent {
                context: HookContext::from_meta(meta),
                user_id: user_id.to_string(),
            },
        );
    }

    pub fn on_unauthorized_attempt(&self, meta: &RequestMeta, reason: &str, token: Option<&str>) {
        let Some(hook) = self.hooks.read().unauthorized_attempt.clone() else {
            return;
        };
        dispatch(
            "unauthorized_attempt",
            hook,
            UnauthorizedAttemptEvent {
                context: HookContext::from_meta(meta),
                reason: reason.to_string(),
                token: token.map(str::to_string),
            },
        );
    }

    pub fn on_mfa_required(&self, meta: &RequestMeta, user_id: &str) {
        let Some(hook) = self.hooks.read().mfa_required.clone() else {
            return;
        };
        dispatch(
            "mfa_required",
            hook,
            MfaRequiredEvent {
                context: HookContext::from_meta(meta),
                user_id: user_id.to_string(),
            },
        );
    }

    pub fn on_role_check(
        &self,
        meta: &RequestMeta,
        user_id: &str,
        required_roles: &[String],
        has_role: bool,
    ) {
        let Some(hook) = self.hooks.read().role_check.clone() else {
            return;
        };
        dispatch(
            "role_check",
            hook,
            RoleCheckEvent {
                context: HookContext::from_meta(meta),
                user_id: user_id.to_string(),
                required_roles: required_roles.to_vec(),
                has_role,
            },
        );
    }
}

fn dispatch<E: Send + 'static>(name: &'static str, hook: HookFn<E>, event: E) {
    let Ok(runtime) = tokio::runtime::Handle::try_current() else {
        tracing::debug!(hook = name, "No tokio runtime, hook skipped");
        return;
    };
    runtime.spawn(async move {
        if let Err(e) = hook(event).await {
            tracing::debug!(hook = name, error = %e, "Hook failed");
        }
    });
}
