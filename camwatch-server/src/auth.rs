//! Token 鉴权中间件

use crate::error::ApiError;
use crate::state::AppState;
use axum::{
    extract::{Query, Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::Response,
};
use serde::Deserialize;

/// 校验请求携带的 token
pub trait TokenValidator: Send + Sync {
    fn validate(&self, token: &str) -> bool;
}

/// 配置文件中的固定 token
pub struct StaticToken(String);

impl StaticToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }
}

impl TokenValidator for StaticToken {
    fn validate(&self, token: &str) -> bool {
        !token.is_empty() && token == self.0
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct TokenQuery {
    token: Option<String>,
}

/// `Authorization: Bearer <token>` 优先，其次是 `?token=` (浏览器的 WebSocket 无法设置请求头)
pub async fn require_token(
    State(state): State<AppState>,
    Query(query): Query<TokenQuery>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let Some(validator) = state.validator.as_ref() else {
        return Ok(next.run(request).await);
    };

    let header = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim);
    let authorized = match header.or(query.token.as_deref()) {
        Some(token) => validator.validate(token),
        None => return Err(ApiError::Unauthorized("missing token".into())),
    };
    if !authorized {
        return Err(ApiError::Unauthorized("invalid token".into()));
    }

    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn static_token_matches_exactly() {
        let validator = StaticToken::new("s3cret");
        assert!(validator.validate("s3cret"));
        assert!(!validator.validate("s3cret "));
        assert!(!validator.validate(""));
        assert!(!StaticToken::new("").validate(""));
    }
}
