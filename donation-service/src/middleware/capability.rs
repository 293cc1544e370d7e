//! Caller identity and capability checks.
//!
//! The gateway in front of this service authenticates the user and forwards
//! the identity as `X-User-ID` with the granted capabilities as a comma
//! separated `X-User-Capabilities` list.

use axum::async_trait;
use axum::extract::{FromRequestParts, Request};
use axum::http::request::Parts;
use axum::http::HeaderMap;
use axum::middleware::Next;
use axum::response::Response;
use service_core::error::AppError;

pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_CAPABILITIES_HEADER: &str = "x-user-capabilities";

/// Capability required to read donor records.
pub const EDIT_POSTS: &str = "edit_posts";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserContext {
    pub user_id: String,
    pub capabilities: Vec<String>,
}

impl UserContext {
    /// Identity from the forwarded headers. A missing or blank user id is
    /// an authentication failure.
    pub fn from_headers(headers: &HeaderMap) -> Result<Self, AppError> {
        let user_id = headers
            .get(USER_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .ok_or_else(|| {
                AppError::Unauthorized(anyhow::anyhow!("You must be logged in to view donors"))
            })?;

        let capabilities = headers
            .get(USER_CAPABILITIES_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|c| !c.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            user_id: user_id.to_string(),
            capabilities,
        })
    }

    pub fn has_capability(&self, required: &str) -> bool {
        self.capabilities.iter().any(|granted| granted == required)
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for UserContext
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        if let Some(context) = parts.extensions.get::<UserContext>() {
            return Ok(context.clone());
        }

        let context = UserContext::from_headers(&parts.headers)?;
        tracing::Span::current().record("user_id", context.user_id.as_str());
        Ok(context)
    }
}

/// Reject callers without an identity (401) or without `edit_posts` (403).
pub async fn require_edit_posts(mut req: Request, next: Next) -> Result<Response, AppError> {
    let context = UserContext::from_headers(req.headers())?;

    if !context.has_capability(EDIT_POSTS) {
        tracing::warn!(
            user_id = %context.user_id,
            required_capability = EDIT_POSTS,
            granted_capabilities = ?context.capabilities,
            "Insufficient capabilities"
        );
        return Err(AppError::Forbidden(anyhow::anyhow!(
            "You do not have permission to view donors"
        )));
    }

    tracing::Span::current().record("user_id", context.user_id.as_str());
    req.extensions_mut().insert(context);
    Ok(next.run(req).await)
}
