use axum::extract::{Request, State};
use axum::http::header::AUTHORIZATION;
use axum::middleware::Next;
use axum::response::Response;
use tracing::warn;

use crate::error::ObserverError;
use crate::state::SharedState;

/// Rejects any request whose `Authorization: Bearer` token does not match
/// the configured one.
pub async fn require_bearer(
    State(state): State<SharedState>,
    request: Request,
    next: Next,
) -> Result<Response, ObserverError> {
    let authorized = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .is_some_and(|token| tokens_match(token.trim(), &state.config.auth_token));

    if !authorized {
        warn!(
            "Rejected unauthenticated request: {} {}",
            request.method(),
            request.uri().path()
        );
        return Err(ObserverError::Unauthorized);
    }

    Ok(next.run(request).await)
}

/// Constant-time for equal-length inputs.
pub fn tokens_match(provided: &str, expected: &str) -> bool {
    let a = provided.as_bytes();
    let b = expected.as_bytes();
    if a.len() != b.len() || b.is_empty() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokens_match() {
        assert!(tokens_match("s3cret", "s3cret"));
        assert!(!tokens_match("s3cret", "s3creT"));
        assert!(!tokens_match("s3cre", "s3cret"));
        assert!(!tokens_match("", ""));
    }
}
