pub mod client;
pub mod resolver;

use axum::extract::{FromRequestParts, State};
use axum::http::request::Parts;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use log::error;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::auth::client::{AuthSession, Identity, UserMetadata};
use crate::auth::resolver::{resolve_role, Role, SIGNUP_ROLE};
use crate::shared::state::AppState;

/// Identity and role resolved once per request and passed to handlers
/// explicitly. `role` is `None` when the profile lookup failed; role-gated
/// operations then reject, which is the least-privileged rendering.
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub identity: Identity,
    pub role: Option<Role>,
}

fn bearer_token(parts: &Parts) -> Option<String> {
    parts
        .headers
        .get(axum::http::header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::to_string)
}

#[axum::async_trait]
impl FromRequestParts<Arc<AppState>> for CurrentUser {
    type Rejection = (StatusCode, String);

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts)
            .ok_or_else(|| (StatusCode::UNAUTHORIZED, "Non authentifié".to_string()))?;

        let identity = state
            .auth
            .get_current_user(&token)
            .await
            .map_err(|e| {
                error!("Auth service error: {e}");
                (
                    StatusCode::BAD_GATEWAY,
                    "Erreur lors de la récupération de la session".to_string(),
                )
            })?
            .ok_or_else(|| (StatusCode::UNAUTHORIZED, "Non authentifié".to_string()))?;

        // A failed role lookup is non-blocking: the request proceeds with no
        // role and role-gated operations reject it.
        let role = match state.conn.get() {
            Ok(mut conn) => match resolve_role(&mut conn, &identity) {
                Ok(role) => Some(role),
                Err(e) => {
                    error!("Failed to resolve role for {}: {e}", identity.id);
                    None
                }
            },
            Err(e) => {
                error!("Failed to get database connection: {e}");
                None
            }
        };

        Ok(Self { identity, role })
    }
}

#[derive(Debug, Deserialize)]
pub struct SignUpForm {
    pub email: String,
    pub password: String,
    pub name: String,
    pub company: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginForm {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct SessionInfo {
    pub user: Identity,
    pub role: Option<Role>,
}

pub async fn sign_up(
    State(state): State<Arc<AppState>>,
    Json(form): Json<SignUpForm>,
) -> Result<Json<Identity>, (StatusCode, String)> {
    let metadata = UserMetadata {
        name: Some(form.name),
        company: Some(form.company),
        role: Some(SIGNUP_ROLE.as_str().to_string()),
    };
    let identity = state
        .auth
        .sign_up(&form.email, &form.password, metadata)
        .await
        .map_err(|e| {
            error!("Sign up failed: {e}");
            (
                StatusCode::BAD_GATEWAY,
                "Erreur lors de la création du compte".to_string(),
            )
        })?;
    Ok(Json(identity))
}

pub async fn login(
    State(state): State<Arc<AppState>>,
    Json(form): Json<LoginForm>,
) -> Result<Json<AuthSession>, (StatusCode, String)> {
    let session = state
        .auth
        .sign_in(&form.email, &form.password)
        .await
        .map_err(|e| {
            error!("Sign in failed: {e}");
            (
                StatusCode::UNAUTHORIZED,
                "Erreur de connexion. Vérifiez vos identifiants.".to_string(),
            )
        })?;
    Ok(Json(session))
}

pub async fn logout(
    State(state): State<Arc<AppState>>,
    parts: axum::http::HeaderMap,
) -> Result<StatusCode, (StatusCode, String)> {
    let token = parts
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or_else(|| (StatusCode::UNAUTHORIZED, "Non authentifié".to_string()))?;

    state.auth.sign_out(token).await.map_err(|e| {
        error!("Sign out failed: {e}");
        (
            StatusCode::BAD_GATEWAY,
            "Erreur lors de la déconnexion".to_string(),
        )
    })?;
    Ok(StatusCode::NO_CONTENT)
}

/// Resolver endpoint: reports the identity and its stored role, provisioning
/// the profile on first sight of the identity.
pub async fn session(user: CurrentUser) -> Json<SessionInfo> {
    Json(SessionInfo {
        user: user.identity,
        role: user.role,
    })
}

pub fn configure_auth_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/auth/signup", post(sign_up))
        .route("/api/auth/login", post(login))
        .route("/api/auth/logout", post(logout))
        .route("/api/session", get(session))
}
