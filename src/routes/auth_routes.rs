use axum::{
    Json, Router,
    extract::State,
    routing::{get, post},
};
use chrono::{Duration, Utc};

use crate::{
    auth::{generate_access_token, hash_access_token, verify_password},
    error::ApiError,
    middleware::auth_context::AuthContext,
    models::*,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/login", post(login))
        .route("/me", get(me))
        .route("/logout", post(logout))
}

const USER_COLUMNS: &str = r#"
    u.user_id, u.email, u.username, u.full_name, u.password_hash, u.role, u.is_active,
    p.id AS patient_id, d.id AS doctor_id
"#;

fn profile(user: UserRow) -> Result<UserProfile, ApiError> {
    let role = Role::from_code(user.role).ok_or_else(|| {
        ApiError::Forbidden("FORBIDDEN", "Account role is not supported".into())
    })?;
    Ok(UserProfile {
        user_id: user.user_id,
        email: user.email,
        username: user.username,
        full_name: user.full_name,
        role,
        patient_id: user.patient_id,
        doctor_id: user.doctor_id,
    })
}

fn validate_login(req: &LoginRequest) -> Result<&str, ApiError> {
    let login = req.login.trim();
    if login.is_empty() || req.password.is_empty() {
        return Err(ApiError::BadRequest(
            "VALIDATION_ERROR",
            "login and password are required".into(),
        ));
    }
    Ok(login)
}

pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<ApiOk<LoginResponseData>>, ApiError> {
    let login = validate_login(&req)?;

    let user: UserRow = sqlx::query_as::<_, UserRow>(&format!(
        r#"
        SELECT {USER_COLUMNS}
        FROM app_user u
        LEFT JOIN patient p ON p.user_id = u.user_id
        LEFT JOIN doctor d ON d.user_id = u.user_id
        WHERE lower(u.email) = lower($1) OR u.username = $1
        "#
    ))
    .bind(login)
    .fetch_optional(&state.db)
    .await
    .map_err(|e| ApiError::Internal(format!("db error: {e}")))?
    .ok_or_else(ApiError::invalid_credentials)?;

    if !user.is_active {
        return Err(ApiError::Forbidden("FORBIDDEN", "Account is disabled".into()));
    }
    if !verify_password(&req.password, &user.password_hash) {
        return Err(ApiError::invalid_credentials());
    }

    let access_token = generate_access_token();
    let expires_at = Utc::now() + Duration::hours(state.session_ttl_hours);

    let session: SessionTokenRow = sqlx::query_as::<_, SessionTokenRow>(
        r#"
        INSERT INTO session_token (user_id, session_token_hash, expires_at)
        VALUES ($1, $2, $3)
        RETURNING session_token_id, expires_at
        "#,
    )
    .bind(user.user_id)
    .bind(hash_access_token(&access_token))
    .bind(expires_at)
    .fetch_one(&state.db)
    .await
    .map_err(|e| ApiError::Internal(format!("db error: {e}")))?;

    tracing::info!(user_id = %user.user_id, session_token_id = %session.session_token_id, "login");

    Ok(Json(ApiOk {
        data: LoginResponseData {
            access_token,
            token_type: "bearer",
            expires_at: session.expires_at,
            user: profile(user)?,
        },
    }))
}

pub async fn me(
    State(state): State<AppState>,
    auth: AuthContext,
) -> Result<Json<ApiOk<UserProfile>>, ApiError> {
    let user: UserRow = sqlx::query_as::<_, UserRow>(&format!(
        r#"
        SELECT {USER_COLUMNS}
        FROM app_user u
        LEFT JOIN patient p ON p.user_id = u.user_id
        LEFT JOIN doctor d ON d.user_id = u.user_id
        WHERE u.user_id = $1
        "#
    ))
    .bind(auth.actor.user_id)
    .fetch_optional(&state.db)
    .await
    .map_err(|e| ApiError::Internal(format!("db error: {e}")))?
    .ok_or_else(ApiError::session_expired)?;

    Ok(Json(ApiOk { data: profile(user)? }))
}

pub async fn logout(
    State(state): State<AppState>,
    auth: AuthContext,
) -> Result<Json<ApiOk<OkData>>, ApiError> {
    sqlx::query(
        r#"
        UPDATE session_token
        SET revoked_at = now()
        WHERE session_token_id = $1
          AND revoked_at IS NULL
        "#,
    )
    .bind(auth.session_token_id)
    .execute(&state.db)
    .await
    .map_err(|e| ApiError::Internal(format!("db error: {e}")))?;

    Ok(Json(ApiOk {
        data: OkData { ok: true },
    }))
}
