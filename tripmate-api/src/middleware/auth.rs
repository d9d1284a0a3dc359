use axum::{
    extract::{Request, State},
    http::{header, StatusCode},
    middleware::Next,
    response::Response,
};
use axum_extra::extract::cookie::CookieJar;
use jsonwebtoken::{decode, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use tripmate_core::Role;
use tripmate_lifecycle::Actor;

use crate::state::AppState;

pub const SESSION_COOKIE: &str = "session";

// ============================================================================
// Session Claims
// ============================================================================

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SessionClaims {
    pub sub: String,
    pub email: Option<String>,
    /// Absent until the user has created a profile
    pub role: Option<Role>,
    #[serde(default)]
    pub admin: bool,
    pub exp: usize,
}

impl SessionClaims {
    pub fn actor(&self) -> Actor {
        Actor::new(self.sub.clone(), self.role, self.admin)
    }
}

// ============================================================================
// Session Authentication Middleware
// ============================================================================

pub async fn session_auth_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    // 1. Cookie first, then bearer header for non-browser clients
    let jar = CookieJar::from_headers(req.headers());
    let token = match jar.get(SESSION_COOKIE) {
        Some(cookie) => cookie.value().to_string(),
        None => req
            .headers()
            .get(header::AUTHORIZATION)
            .and_then(|h| h.to_str().ok())
            .and_then(|h| h.strip_prefix("Bearer "))
            .map(str::to_string)
            .ok_or(StatusCode::UNAUTHORIZED)?,
    };

    // 2. Decode and validate
    let token_data = decode::<SessionClaims>(
        &token,
        &DecodingKey::from_secret(state.settings.auth.session_secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|_| StatusCode::UNAUTHORIZED)?;

    // 3. Inject claims
    req.extensions_mut().insert(token_data.claims);

    Ok(next.run(req).await)
}
