use std::sync::Arc;

use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier, password_hash::SaltString};
use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use axum_extra::extract::WithRejection;
use jsonwebtoken::{EncodingKey, Header, encode};
use rand_core::OsRng;
use tracing::{error, info};
use uuid::Uuid;

use parley_db::Database;
use parley_gateway::DeliveryCoordinator;
use parley_types::api::{Claims, LoginRequest, LoginResponse, RegisterRequest, RegisterResponse};

use crate::bot::TextGenerator;
use crate::error::{ApiError, ApiResult, FieldError};

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Arc<Database>,
    pub jwt_secret: String,
    pub token_ttl_days: i64,
    pub delivery: DeliveryCoordinator,
    pub bot: Arc<dyn TextGenerator>,
}

/// Run a blocking store call off the async runtime.
pub(crate) async fn with_db<F, T>(state: &AppState, f: F) -> ApiResult<T>
where
    F: FnOnce(&Database) -> parley_db::Result<T> + Send + 'static,
    T: Send + 'static,
{
    let db = state.db.clone();
    Ok(tokio::task::spawn_blocking(move || f(&db)).await??)
}

fn check_credentials(username: &str, password: &str, errors: &mut Vec<FieldError>) {
    if username.chars().count() < 5 {
        errors.push(FieldError {
            field: "username",
            message: "Username must be at least 5 characters".into(),
        });
    }
    if password.trim().chars().count() < 8 {
        errors.push(FieldError {
            field: "password",
            message: "Password must be at least 8 characters".into(),
        });
    }
}

fn validate_register(username: &str, req: &RegisterRequest) -> Vec<FieldError> {
    let mut errors = Vec::new();
    check_credentials(username, &req.password, &mut errors);

    if req.number.len() != 10 {
        errors.push(FieldError {
            field: "number",
            message: "Mobile number must be 10 digits".into(),
        });
    }
    if req.number.is_empty() || !req.number.bytes().all(|b| b.is_ascii_digit()) {
        errors.push(FieldError {
            field: "number",
            message: "Mobile number must contain only digits".into(),
        });
    }
    errors
}

pub async fn register(
    State(state): State<AppState>,
    WithRejection(Json(req), _): WithRejection<Json<RegisterRequest>, ApiError>,
) -> ApiResult<impl IntoResponse> {
    let username = req.username.trim().to_string();
    let errors = validate_register(&username, &req);
    if !errors.is_empty() {
        return Err(ApiError::invalid(errors));
    }

    // Hash password with Argon2id. Surrounding whitespace is not part of it.
    let salt = SaltString::generate(&mut OsRng);
    let password_hash = Argon2::default()
        .hash_password(req.password.trim().as_bytes(), &salt)
        .map_err(|e| ApiError::Storage(format!("password hashing failed: {}", e)))?
        .to_string();

    let user_id = Uuid::new_v4();
    let (name, number) = (username.clone(), req.number.clone());
    with_db(&state, move |db| db.create_user(user_id, &name, &password_hash, &number)).await?;

    let token = create_token(&state, user_id, &username)?;
    info!("Registered {} ({})", username, user_id);

    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            message: "Registration successful".into(),
            token,
        }),
    ))
}

pub async fn login(
    State(state): State<AppState>,
    WithRejection(Json(req), _): WithRejection<Json<LoginRequest>, ApiError>,
) -> ApiResult<Json<LoginResponse>> {
    let username = req.username.trim().to_string();
    let mut errors = Vec::new();
    check_credentials(&username, &req.password, &mut errors);
    if !errors.is_empty() {
        return Err(ApiError::invalid(errors));
    }

    let user = with_db(&state, move |db| db.get_user_by_username(&username))
        .await?
        .ok_or(ApiError::BadCredentials)?;

    // Verify password
    let parsed_hash = PasswordHash::new(&user.password).map_err(|e| {
        error!("Stored hash for {} is unreadable: {}", user.id, e);
        ApiError::BadCredentials
    })?;
    Argon2::default()
        .verify_password(req.password.trim().as_bytes(), &parsed_hash)
        .map_err(|_| ApiError::BadCredentials)?;

    let user_id = user.id;
    let profile = with_db(&state, move |db| db.get_profile(user_id))
        .await?
        .ok_or_else(|| ApiError::NotFound("User not found".into()))?;

    let token = create_token(&state, user.id, &user.username)?;

    Ok(Json(LoginResponse {
        message: "Login successful".into(),
        token,
        user: profile,
    }))
}

pub fn create_token(state: &AppStateInner, user_id: Uuid, username: &str) -> ApiResult<String> {
    let ttl = chrono::Duration::try_days(state.token_ttl_days)
        .filter(|ttl| *ttl > chrono::Duration::zero())
        .ok_or_else(|| ApiError::Storage(format!("invalid token lifetime: {} days", state.token_ttl_days)))?;
    let claims = Claims {
        sub: user_id,
        username: username.to_string(),
        exp: (chrono::Utc::now() + ttl).timestamp() as usize,
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(state.jwt_secret.as_bytes()),
    )
    .map_err(|e| ApiError::Storage(format!("token signing failed: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(username: &str, password: &str, number: &str) -> RegisterRequest {
        RegisterRequest {
            username: username.into(),
            password: password.into(),
            number: number.into(),
        }
    }

    fn fields(errors: &[FieldError]) -> Vec<&'static str> {
        errors.iter().map(|e| e.field).collect()
    }

    #[test]
    fn accepts_well_formed_registration() {
        let req = request("alice1", "password1", "1111111111");
        assert!(validate_register("alice1", &req).is_empty());
    }

    #[test]
    fn reports_each_bad_field() {
        let req = request("al", "short", "12345abcde");
        let errors = validate_register("al", &req);
        assert_eq!(fields(&errors), ["username", "password", "number"]);
        assert_eq!(errors[2].message, "Mobile number must contain only digits");

        let req = request("alice1", "password1", "123");
        assert_eq!(fields(&validate_register("alice1", &req)), ["number"]);
    }

    #[test]
    fn username_length_counts_after_trimming() {
        let req = request("  abc  ", "password1", "1111111111");
        let trimmed = req.username.trim().to_string();
        assert_eq!(fields(&validate_register(&trimmed, &req)), ["username"]);
    }

    #[test]
    fn blank_password_padding_does_not_count() {
        let mut errors = Vec::new();
        check_credentials("alice1", "   abc   ", &mut errors);
        assert_eq!(fields(&errors), ["password"]);
    }

    fn state(token_ttl_days: i64) -> AppStateInner {
        let db = Arc::new(Database::open_in_memory().unwrap());
        AppStateInner {
            delivery: DeliveryCoordinator::new(
                db.clone(),
                parley_gateway::RoomRouter::new(),
                parley_gateway::DeliveryMode::Confirmed,
            ),
            db,
            jwt_secret: "secret".into(),
            token_ttl_days,
            bot: Arc::new(crate::bot::GeminiClient::new(None, "gemini-2.0-flash")),
        }
    }

    #[test]
    fn token_lifetime_must_be_a_positive_day_count() {
        let id = Uuid::new_v4();
        assert!(create_token(&state(30), id, "alice1").is_ok());
        assert!(matches!(create_token(&state(0), id, "alice1"), Err(ApiError::Storage(_))));
        assert!(matches!(create_token(&state(-1), id, "alice1"), Err(ApiError::Storage(_))));
        assert!(matches!(create_token(&state(i64::MAX), id, "alice1"), Err(ApiError::Storage(_))));
    }
}
