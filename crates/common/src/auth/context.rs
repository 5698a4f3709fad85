use http::HeaderMap;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const USER_ID_HEADER: &str = "x-user-id";
pub const PROJECT_ID_HEADER: &str = "x-project-id";
pub const ROLES_HEADER: &str = "x-roles";
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Caller identity established by the upstream authentication layer.
///
/// Travels with every conductor call so the worker sees who asked.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestContext {
    pub request_id: String,
    pub user_id: Option<String>,
    pub project_id: Option<String>,
    pub roles: Vec<String>,
}

impl RequestContext {
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let header = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let roles = header(ROLES_HEADER)
            .map(|roles| {
                roles
                    .split(',')
                    .map(|role| role.trim().to_string())
                    .filter(|role| !role.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        Self {
            request_id: header(REQUEST_ID_HEADER)
                .unwrap_or_else(|| format!("req-{}", Uuid::new_v4())),
            user_id: header(USER_ID_HEADER),
            project_id: header(PROJECT_ID_HEADER),
            roles,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.user_id.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_from_identity_headers() {
        let mut headers = HeaderMap::new();
        headers.insert(USER_ID_HEADER, "alice".parse().unwrap());
        headers.insert(PROJECT_ID_HEADER, "proj".parse().unwrap());
        headers.insert(ROLES_HEADER, "admin, member".parse().unwrap());
        headers.insert(REQUEST_ID_HEADER, "req-1".parse().unwrap());

        let ctx = RequestContext::from_headers(&headers);
        assert_eq!(ctx.user_id.as_deref(), Some("alice"));
        assert_eq!(ctx.project_id.as_deref(), Some("proj"));
        assert_eq!(ctx.roles, vec!["admin".to_string(), "member".to_string()]);
        assert_eq!(ctx.request_id, "req-1");
        assert!(ctx.is_authenticated());
    }

    #[test]
    fn test_missing_request_id_is_generated() {
        let ctx = RequestContext::from_headers(&HeaderMap::new());
        assert!(ctx.request_id.starts_with("req-"));
        assert!(!ctx.is_authenticated());
        assert!(ctx.roles.is_empty());
    }
}
