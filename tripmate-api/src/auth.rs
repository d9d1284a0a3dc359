use axum::{extract::State, routing::post, Json, Router};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{info, warn};
use tripmate_shared::pii::redact_email;

use crate::{error::AppError, middleware::auth::{SessionClaims, SESSION_COOKIE}, state::AppState};

/// Claims we read from the identity provider's id token
#[derive(Debug, Deserialize)]
struct IdTokenClaims {
    sub: String,
    #[serde(default)]
    email: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SessionRequest {
    id_token: String,
}

#[derive(Debug, Serialize)]
struct SessionResponse {
    uid: String,
    has_profile: bool,
    admin: bool,
}

pub fn routes() -> Router<AppState> {
    Router::new().route("/api/auth/session", post(create_session).delete(end_session))
}

/// POST /api/auth/session
async fn create_session(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(body): Json<SessionRequest>,
) -> Result<(CookieJar, Json<SessionResponse>), AppError> {
    // Provider tokens carry an audience we do not pin
    let mut validation = Validation::new(Algorithm::HS256);
    validation.validate_aud = false;

    let id_token = decode::<IdTokenClaims>(
        &body.id_token,
        &DecodingKey::from_secret(state.settings.auth.id_token_secret.as_bytes()),
        &validation,
    )
    .map_err(|e| {
        warn!("Rejected id token: {}", e);
        AppError::AuthenticationError("invalid id token".to_string())
    })?
    .claims;

    let claims = session_claims(&state, id_token.sub, id_token.email).await?;
    info!(
        uid = %claims.sub,
        email = %claims.email.as_deref().map(redact_email).unwrap_or_default(),
        "Session issued"
    );

    let response = SessionResponse {
        uid: claims.sub.clone(),
        has_profile: claims.role.is_some(),
        admin: claims.admin,
    };
    let jar = jar.add(session_cookie(&state, &claims)?);
    Ok((jar, Json(response)))
}

/// DELETE /api/auth/session
async fn end_session(jar: CookieJar) -> (CookieJar, Json<Value>) {
    let jar = jar.remove(Cookie::build(SESSION_COOKIE).path("/"));
    (jar, Json(json!({ "status": "ok" })))
}

/// Build claims from the current profile and admin membership.
pub async fn session_claims(state: &AppState, uid: String, email: Option<String>) -> Result<SessionClaims, AppError> {
    let role = state.users.get_user(&uid).await?.map(|user| user.role);
    let admin = state.users.is_admin(&uid).await?;
    let ttl = state.settings.auth.session_ttl_seconds as i64;

    Ok(SessionClaims {
        sub: uid,
        email,
        role,
        admin,
        exp: (Utc::now() + Duration::seconds(ttl)).timestamp() as usize,
    })
}

pub fn encode_session(state: &AppState, claims: &SessionClaims) -> Result<String, AppError> {
    encode(
        &Header::default(),
        claims,
        &EncodingKey::from_secret(state.settings.auth.session_secret.as_bytes()),
    )
    .map_err(|e| AppError::InternalServerError(format!("Token encoding failed: {}", e)))
}

pub fn session_cookie(state: &AppState, claims: &SessionClaims) -> Result<Cookie<'static>, AppError> {
    let token = encode_session(state, claims)?;
    Ok(Cookie::build((SESSION_COOKIE, token))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(state.settings.auth.secure_cookies)
        .max_age(time::Duration::seconds(state.settings.auth.session_ttl_seconds as i64))
        .build())
}
