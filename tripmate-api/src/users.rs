use axum::{
    extract::State,
    routing::{get, post, put},
    Extension, Json, Router,
};
use axum_extra::extract::cookie::CookieJar;
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;
use tripmate_core::request::Purpose;
use tripmate_core::user::{Address, Contact, DisabilityExpertise, Gender, TravelerProfile};
use tripmate_core::{GuideProfile, OnboardingState, Role, User};

use crate::{
    auth::{session_claims, session_cookie},
    error::AppError,
    middleware::auth::SessionClaims,
    state::AppState,
};

#[derive(Debug, Deserialize)]
struct CreateUserRequest {
    role: Role,
    display_name: String,
    #[serde(default)]
    gender: Option<Gender>,
    #[serde(default)]
    traveler: Option<TravelerProfile>,
}

#[derive(Debug, Deserialize)]
struct UpdateUserRequest {
    #[serde(default)]
    display_name: Option<String>,
    #[serde(default)]
    gender: Option<Gender>,
    #[serde(default)]
    traveler: Option<TravelerProfile>,
}

#[derive(Debug, Deserialize)]
struct GuideProfileRequest {
    #[serde(default)]
    address: Option<Address>,
    #[serde(default)]
    contact: Option<Contact>,
    #[serde(default)]
    disability_expertise: DisabilityExpertise,
    #[serde(default)]
    local_expertise: Vec<Purpose>,
    #[serde(default)]
    id_document_ref: Option<String>,
    #[serde(default)]
    certificate_refs: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct AvailabilityRequest {
    is_available: bool,
}

#[derive(Debug, Deserialize)]
struct PushTokenRequest {
    token: String,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/users", post(create_user))
        .route("/api/users/me", get(get_me).put(update_me))
        .route("/api/users/me/guide-profile", get(get_guide_profile).put(save_guide_profile))
        .route("/api/users/me/availability", put(set_availability))
        .route("/api/users/me/push-tokens", post(add_push_token))
}

/// POST /api/users
///
/// Creates the caller's profile. The role cannot change afterwards, and the
/// session cookie is re-issued so it carries the role.
async fn create_user(
    State(state): State<AppState>,
    Extension(claims): Extension<SessionClaims>,
    jar: CookieJar,
    Json(body): Json<CreateUserRequest>,
) -> Result<(CookieJar, Json<User>), AppError> {
    let display_name = body.display_name.trim();
    if display_name.is_empty() {
        return Err(AppError::ValidationError("display_name is required".to_string()));
    }

    let mut user = User::new(claims.sub.clone(), body.role, display_name.to_string());
    user.email = claims.email.clone();
    user.gender = body.gender;
    if body.role == Role::Traveler {
        user.traveler = body.traveler;
    }

    state.users.insert_user(&user).await?;
    info!(uid = %user.uid, role = user.role.as_str(), "User profile created");

    let refreshed = session_claims(&state, claims.sub, claims.email).await?;
    let jar = jar.add(session_cookie(&state, &refreshed)?);
    Ok((jar, Json(user)))
}

/// GET /api/users/me
async fn get_me(
    State(state): State<AppState>,
    Extension(claims): Extension<SessionClaims>,
) -> Result<Json<User>, AppError> {
    let user = load_user(&state, &claims.sub).await?;
    Ok(Json(user))
}

/// PUT /api/users/me
async fn update_me(
    State(state): State<AppState>,
    Extension(claims): Extension<SessionClaims>,
    Json(body): Json<UpdateUserRequest>,
) -> Result<Json<User>, AppError> {
    let mut user = load_user(&state, &claims.sub).await?;

    if let Some(name) = body.display_name {
        let name = name.trim();
        if name.is_empty() {
            return Err(AppError::ValidationError("display_name cannot be blank".to_string()));
        }
        user.display_name = name.to_string();
    }
    if body.gender.is_some() {
        user.gender = body.gender;
    }
    if let Some(traveler) = body.traveler {
        if user.is_guide() {
            return Err(AppError::ValidationError(
                "guides keep their details in the guide profile".to_string(),
            ));
        }
        user.traveler = Some(traveler);
    }

    state.users.update_profile(&user).await?;
    Ok(Json(user))
}

/// GET /api/users/me/guide-profile
async fn get_guide_profile(
    State(state): State<AppState>,
    Extension(claims): Extension<SessionClaims>,
) -> Result<Json<GuideProfile>, AppError> {
    require_guide(&claims)?;
    let profile = state
        .users
        .get_guide_profile(&claims.sub)
        .await?
        .ok_or_else(|| AppError::NotFoundError("Guide profile not found".to_string()))?;
    Ok(Json(profile))
}

/// PUT /api/users/me/guide-profile
///
/// Any edit by a guide who is not yet active sends the profile (back) to review.
async fn save_guide_profile(
    State(state): State<AppState>,
    Extension(claims): Extension<SessionClaims>,
    Json(body): Json<GuideProfileRequest>,
) -> Result<Json<GuideProfile>, AppError> {
    require_guide(&claims)?;

    let mut profile = state
        .users
        .get_guide_profile(&claims.sub)
        .await?
        .unwrap_or_else(|| GuideProfile::new(claims.sub.clone()));

    profile.address = body.address;
    profile.contact = body.contact;
    profile.disability_expertise = body.disability_expertise;
    profile.local_expertise = body.local_expertise;
    profile.verification.id_document_ref = body.id_document_ref;
    profile.verification.certificate_refs = body.certificate_refs;
    if profile.onboarding_state != OnboardingState::Active {
        profile.onboarding_state = OnboardingState::VerificationPending;
    }
    profile.updated_at = Utc::now();

    state.users.save_guide_profile(&profile).await?;
    info!(uid = %profile.uid, state = ?profile.onboarding_state, "Guide profile saved");
    Ok(Json(profile))
}

/// PUT /api/users/me/availability
async fn set_availability(
    State(state): State<AppState>,
    Extension(claims): Extension<SessionClaims>,
    Json(body): Json<AvailabilityRequest>,
) -> Result<Json<GuideProfile>, AppError> {
    require_guide(&claims)?;

    let mut profile = state
        .users
        .get_guide_profile(&claims.sub)
        .await?
        .ok_or_else(|| AppError::NotFoundError("Guide profile not found".to_string()))?;
    profile.is_available = body.is_available;
    profile.updated_at = Utc::now();

    state.users.save_guide_profile(&profile).await?;
    Ok(Json(profile))
}

/// POST /api/users/me/push-tokens
async fn add_push_token(
    State(state): State<AppState>,
    Extension(claims): Extension<SessionClaims>,
    Json(body): Json<PushTokenRequest>,
) -> Result<Json<Value>, AppError> {
    let token = body.token.trim();
    if token.is_empty() {
        return Err(AppError::ValidationError("token is required".to_string()));
    }
    state.users.add_push_token(&claims.sub, token).await?;
    Ok(Json(json!({ "status": "ok" })))
}

async fn load_user(state: &AppState, uid: &str) -> Result<User, AppError> {
    state
        .users
        .get_user(uid)
        .await?
        .ok_or_else(|| AppError::NotFoundError("User not found".to_string()))
}

fn require_guide(claims: &SessionClaims) -> Result<(), AppError> {
    if claims.role == Some(Role::Guide) {
        Ok(())
    } else {
        Err(AppError::AuthorizationError("permission denied".to_string()))
    }
}
