use serde_json::Value as JsonValue;

use crate::error::Error;
use crate::session::SessionManager;
use crate::transport::Transport;
use crate::types::{UserProfile, UserRole};

/// Current user profile and roles.
#[derive(Debug, Clone, Copy)]
pub struct Users<'a> {
    transport: &'a Transport,
    session: &'a SessionManager,
}

impl<'a> Users<'a> {
    pub(super) fn new(transport: &'a Transport, session: &'a SessionManager) -> Self {
        Self { transport, session }
    }

    pub async fn profile(&self) -> Result<UserProfile, Error> {
        let token = self.session.access_token();
        self.transport
            .get("/api/v1/users/me", token.as_deref())
            .await
    }

    /// Roles of the current user, derived from userinfo.
    ///
    /// Userinfo carries at most one `role`; it is returned together with the
    /// top-level `permissions`. No `role` yields an empty list.
    pub async fn roles(&self) -> Result<Vec<UserRole>, Error> {
        let token = self.session.access_token();
        let info: JsonValue = self
            .transport
            .get("/api/v1/userinfo", token.as_deref())
            .await?;
        Ok(role_from_userinfo(&info).into_iter().collect())
    }

    pub async fn has_permission(&self, permission: &str) -> Result<bool, Error> {
        let roles = self.roles().await?;
        Ok(roles
            .iter()
            .any(|role| role.permissions.iter().any(|p| p == permission)))
    }
}

fn role_from_userinfo(info: &JsonValue) -> Option<UserRole> {
    let name = info.get("role")?.as_str()?;
    let permissions = info
        .get("permissions")
        .and_then(JsonValue::as_array)
        .map(|list| {
            list.iter()
                .filter_map(JsonValue::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    Some(UserRole {
        id: info
            .get("id")
            .and_then(JsonValue::as_str)
            .unwrap_or_default()
            .to_string(),
        name: name.to_string(),
        permissions,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_role_needs_role_field() {
        assert!(role_from_userinfo(&json!({ "id": "u1" })).is_none());
        assert!(role_from_userinfo(&json!({})).is_none());
    }

    #[test]
    fn test_role_carries_permissions() {
        let role = role_from_userinfo(&json!({
            "id": "u1",
            "role": "admin",
            "permissions": ["users:read", "users:write"]
        }))
        .unwrap();

        assert_eq!(role.id, "u1");
        assert_eq!(role.name, "admin");
        assert_eq!(role.permissions, vec!["users:read", "users:write"]);
    }

    #[test]
    fn test_role_without_permissions_or_id() {
        let role = role_from_userinfo(&json!({ "role": "viewer" })).unwrap();
        assert_eq!(role.id, "");
        assert!(role.permissions.is_empty());
    }
}
