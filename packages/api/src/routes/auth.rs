use crate::credentials::{self, MAX_PASSWORD_BYTES};
use crate::error::ApiError;
use crate::state::AppState;
use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use serde::{Deserialize, Serialize};

const BAD_CREDENTIALS: &str = "Incorrect email or password";

#[derive(Debug, Deserialize)]
pub struct CredentialsInput {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RegisterOut {
    pub user_id: i32,
    pub email: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LoginOut {
    pub user_id: i32,
    pub email: String,
    pub token: String,
}

fn validate(input: &CredentialsInput) -> Result<(), ApiError> {
    if input.email.trim().is_empty() {
        return Err(ApiError::bad_request("Email must not be empty"));
    }
    if input.password.is_empty() {
        return Err(ApiError::bad_request("Password must not be empty"));
    }
    if input.password.len() > MAX_PASSWORD_BYTES {
        return Err(ApiError::bad_request(format!(
            "Password must be at most {} bytes",
            MAX_PASSWORD_BYTES
        )));
    }
    Ok(())
}

#[tracing::instrument(name = "POST /register", skip(state, input), fields(email = %input.email))]
pub async fn register(
    State(state): State<AppState>,
    Json(input): Json<CredentialsInput>,
) -> Result<(StatusCode, Json<RegisterOut>), ApiError> {
    validate(&input)?;

    let password = input.password;
    let password_hash = tokio::task::spawn_blocking(move || credentials::hash_password(&password))
        .await
        .map_err(|e| ApiError::internal(format!("Hashing task failed: {}", e)))??;

    let user = state.store.create_user(&input.email, password_hash).await?;
    tracing::info!(user_id = user.id, "user registered");

    Ok((
        StatusCode::CREATED,
        Json(RegisterOut {
            user_id: user.id,
            email: user.email,
        }),
    ))
}

#[tracing::instrument(name = "POST /login", skip(state, input), fields(email = %input.email))]
pub async fn login(
    State(state): State<AppState>,
    Json(input): Json<CredentialsInput>,
) -> Result<Json<LoginOut>, ApiError> {
    let user = state.store.find_user_by_email(&input.email).await?;

    let password = input.password;
    let stored = user.as_ref().map(|u| u.password_hash.clone());
    let verified = tokio::task::spawn_blocking(move || match stored {
        Some(hash) => credentials::verify_password(&password, &hash),
        None => credentials::reject_unknown_user(&password),
    })
    .await
    .map_err(|e| ApiError::internal(format!("Verification task failed: {}", e)))?;

    let user = match user {
        Some(user) if verified => user,
        _ => return Err(ApiError::unauthorized(BAD_CREDENTIALS)),
    };

    let token = state.tokens.issue(user.id, &user.email)?;
    Ok(Json(LoginOut {
        user_id: user.id,
        email: user.email,
        token,
    }))
}
