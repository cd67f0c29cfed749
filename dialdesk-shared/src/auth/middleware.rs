/// Authentication middleware for Axum
///
/// Validates the identity-provider token from `Authorization: Bearer <token>`,
/// resolves its subject to an active user row and adds an [`AuthContext`] to
/// the request extensions. Handlers take the context as an extractor.
///
/// # Example
///
/// ```no_run
/// use axum::{Router, routing::get, middleware};
/// use dialdesk_shared::auth::jwt::JwtConfig;
/// use dialdesk_shared::auth::middleware::{create_auth_middleware, AuthContext, AuthState};
/// use sqlx::PgPool;
///
/// async fn me(auth: AuthContext) -> String {
///     format!("user {} in tenant {}", auth.user_id, auth.tenant_id)
/// }
///
/// fn router(pool: PgPool, jwt: JwtConfig) -> Router {
///     Router::new()
///         .route("/me", get(me))
///         .layer(middleware::from_fn(create_auth_middleware(AuthState { pool, jwt })))
/// }
/// ```

use axum::{
    async_trait,
    extract::{FromRequestParts, Request},
    http::{header, request::Parts, HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

use super::jwt::{validate_token, JwtConfig, JwtError};
use crate::models::user::{User, UserRole};

/// Authenticated caller, available to every handler behind the middleware
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthContext {
    pub user_id: Uuid,
    pub tenant_id: Uuid,
    pub role: UserRole,

    /// Identity-provider subject
    pub external_id: String,
}

impl AuthContext {
    pub fn from_user(user: &User) -> Self {
        Self {
            user_id: user.id,
            tenant_id: user.tenant_id,
            role: user.role,
            external_id: user.external_id.clone(),
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role.is_admin()
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthContext
where
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthContext>()
            .cloned()
            .ok_or(AuthError::MissingCredentials)
    }
}

/// Error type for authentication
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Missing credentials")]
    MissingCredentials,

    #[error("{0}")]
    InvalidFormat(String),

    #[error("{0}")]
    InvalidToken(String),

    /// Token was valid but its subject is not provisioned
    #[error("Unknown user")]
    UnknownUser,

    #[error("User is deactivated")]
    Inactive,

    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),
}

impl AuthError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AuthError::DatabaseError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::UNAUTHORIZED,
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let (error, message) = match &self {
            AuthError::DatabaseError(e) => {
                tracing::error!(error = %e, "Database error during authentication");
                ("internal_error", "An internal error occurred".to_string())
            }
            other => ("unauthorized", other.to_string()),
        };

        let mut response = (
            status,
            Json(serde_json::json!({ "error": error, "message": message })),
        )
            .into_response();

        if status == StatusCode::UNAUTHORIZED {
            response.headers_mut().insert(
                header::WWW_AUTHENTICATE,
                header::HeaderValue::from_static("Bearer"),
            );
        }

        response
    }
}

/// What the middleware needs to authenticate a request
#[derive(Debug, Clone)]
pub struct AuthState {
    pub pool: PgPool,
    pub jwt: JwtConfig,
}

/// Extracts the bearer token from request headers
pub fn bearer_token(headers: &HeaderMap) -> Result<&str, AuthError> {
    let value = headers
        .get(header::AUTHORIZATION)
        .ok_or(AuthError::MissingCredentials)?
        .to_str()
        .map_err(|_| AuthError::InvalidFormat("Invalid Authorization header".to_string()))?;

    value
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| AuthError::InvalidFormat("Expected Bearer token".to_string()))
}

/// Validates a token and resolves it to an active user
///
/// Used by the middleware and by the WebSocket upgrade, which may receive
/// the token as a query parameter.
pub async fn authenticate(state: &AuthState, token: &str) -> Result<AuthContext, AuthError> {
    let claims = validate_token(token, &state.jwt).map_err(|e| match e {
        JwtError::Expired => AuthError::InvalidToken("Token expired".to_string()),
        other => AuthError::InvalidToken(other.to_string()),
    })?;

    let user = User::find_by_external_id(&state.pool, &claims.sub)
        .await?
        .ok_or(AuthError::UnknownUser)?;

    if !user.active {
        return Err(AuthError::Inactive);
    }

    Ok(AuthContext::from_user(&user))
}

/// JWT authentication middleware
///
/// # Errors
///
/// Returns 401 if the header is missing or malformed, the token fails
/// validation, or the subject is unknown or deactivated.
pub async fn jwt_auth_middleware(
    state: AuthState,
    mut req: Request,
    next: Next,
) -> Result<Response, AuthError> {
    let token = bearer_token(req.headers())?.to_string();
    let auth = authenticate(&state, &token).await?;

    tracing::Span::current().record("tenant_id", tracing::field::display(auth.tenant_id));
    req.extensions_mut().insert(auth);

    Ok(next.run(req).await)
}

/// Creates the JWT authentication middleware closure
pub fn create_auth_middleware(
    state: AuthState,
) -> impl Fn(Request, Next) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<Response, AuthError>> + Send>> + Clone {
    move |req, next| {
        let state = state.clone();
        Box::pin(jwt_auth_middleware(state, req, next))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_bearer_token() {
        let mut headers = HeaderMap::new();
        assert!(matches!(bearer_token(&headers), Err(AuthError::MissingCredentials)));

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Basic abc"));
        assert!(matches!(bearer_token(&headers), Err(AuthError::InvalidFormat(_))));

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer "));
        assert!(matches!(bearer_token(&headers), Err(AuthError::InvalidFormat(_))));

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer abc.def"));
        assert_eq!(bearer_token(&headers).unwrap(), "abc.def");
    }

    #[test]
    fn test_auth_error_status() {
        assert_eq!(
            AuthError::MissingCredentials.into_response().status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(AuthError::UnknownUser.into_response().status(), StatusCode::UNAUTHORIZED);
        assert_eq!(AuthError::Inactive.into_response().status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            AuthError::DatabaseError(sqlx::Error::PoolTimedOut).into_response().status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_unauthorized_sets_www_authenticate() {
        let response = AuthError::MissingCredentials.into_response();
        assert_eq!(response.headers()[header::WWW_AUTHENTICATE], "Bearer");
    }

    #[test]
    fn test_context_from_user() {
        let user = User {
            id: Uuid::new_v4(),
            tenant_id: Uuid::new_v4(),
            external_id: "idp|1".to_string(),
            email: "a@example.com".to_string(),
            name: None,
            role: UserRole::Admin,
            active: true,
            created_at: chrono::Utc::now(),
            updated_at: chrono::Utc::now(),
        };

        let context = AuthContext::from_user(&user);
        assert_eq!(context.user_id, user.id);
        assert_eq!(context.tenant_id, user.tenant_id);
        assert!(context.is_admin());
    }
}
