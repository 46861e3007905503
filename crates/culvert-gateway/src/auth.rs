//! User accounts and the bearer-token middleware.

use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::Response;

use culvert_core::auth::{self, Claims};
use culvert_core::{epoch_secs, new_id};
use culvert_state::{StateStore, User};

use crate::error::{GatewayError, GatewayResult};
use crate::ApiState;

/// Registration, login, and token verification for platform users.
pub struct AuthService {
    store: StateStore,
    jwt_secret: Vec<u8>,
}

impl AuthService {
    pub fn new(store: StateStore, jwt_secret: &[u8]) -> Self {
        Self {
            store,
            jwt_secret: jwt_secret.to_vec(),
        }
    }

    pub fn register_user(&self, username: &str, password: &str) -> GatewayResult<User> {
        if username.len() < 3 {
            return Err(GatewayError::Validation(
                "username must be at least 3 characters".to_string(),
            ));
        }
        if password.len() < 7 {
            return Err(GatewayError::Validation(
                "password must be at least 7 characters".to_string(),
            ));
        }
        if self.store.find_user_by_username(username)?.is_some() {
            return Err(GatewayError::Conflict("username already taken".to_string()));
        }

        let user = User {
            id: new_id(),
            username: username.to_string(),
            password_hash: auth::hash_password(password),
            created_at: epoch_secs(),
        };
        self.store.put_user(&user)?;
        tracing::info!(user_id = %user.id, %username, "user registered");
        Ok(user)
    }

    /// Exchange credentials for a bearer token.
    pub fn login_user(&self, username: &str, password: &str) -> GatewayResult<String> {
        let user = self
            .store
            .find_user_by_username(username)?
            .ok_or(GatewayError::Unauthorized)?;

        if !auth::verify_password(password, &user.password_hash) {
            return Err(GatewayError::Unauthorized);
        }

        auth::sign_token(&self.jwt_secret, &user.id, &user.username)
            .map_err(|e| GatewayError::Internal(e.to_string()))
    }

    pub fn verify(&self, token: &str) -> GatewayResult<Claims> {
        auth::verify_token(&self.jwt_secret, token).map_err(|_| GatewayError::Unauthorized)
    }
}

/// Middleware guarding every route that is not `/auth/*`, sink
/// self-service, or the health probe.
pub async fn require_bearer(
    State(state): State<ApiState>,
    request: Request,
    next: Next,
) -> Result<Response, GatewayError> {
    let token = request
        .headers()
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .ok_or(GatewayError::Unauthorized)?;

    state.auth.verify(token)?;
    Ok(next.run(request).await)
}
