use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum_extra::TypedHeader;
use headers::{Authorization, authorization::Bearer};
use uuid::Uuid;

use crate::auth::hash_access_token;
use crate::error::ApiError;
use crate::models::{Actor, AppState, Role};

/// The authenticated caller, resolved from `Authorization: Bearer <token>`.
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub actor: Actor,
    pub session_token_id: Uuid,
}

#[derive(Debug, sqlx::FromRow)]
struct SessionLookupRow {
    session_token_id: Uuid,
    user_id: Uuid,
    role: i16,
    patient_id: Option<i64>,
    doctor_id: Option<i64>,
}

impl FromRequestParts<AppState> for AuthContext {
    type Rejection = ApiError;

    fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> impl std::future::Future<Output = Result<Self, Self::Rejection>> + Send {
        async move {
            let TypedHeader(authz): TypedHeader<Authorization<Bearer>> =
                TypedHeader::from_request_parts(parts, state)
                    .await
                    .map_err(|_| ApiError::session_expired())?;

            let token_hash = hash_access_token(authz.token());

            let row: SessionLookupRow = sqlx::query_as::<_, SessionLookupRow>(
                r#"
                SELECT st.session_token_id, u.user_id, u.role,
                       p.id AS patient_id, d.id AS doctor_id
                FROM session_token st
                JOIN app_user u ON u.user_id = st.user_id
                LEFT JOIN patient p ON p.user_id = u.user_id
                LEFT JOIN doctor d ON d.user_id = u.user_id
                WHERE st.session_token_hash = $1
                  AND st.revoked_at IS NULL
                  AND st.expires_at > now()
                  AND u.is_active = true
                "#,
            )
            .bind(&token_hash)
            .fetch_optional(&state.db)
            .await
            .map_err(|e| ApiError::Internal(format!("db error: {e}")))?
            .ok_or_else(ApiError::session_expired)?;

            let role = Role::from_code(row.role).ok_or_else(|| {
                ApiError::Forbidden("FORBIDDEN", "Account role is not supported".into())
            })?;

            // best-effort
            let _ = sqlx::query("UPDATE session_token SET last_seen_at = now() WHERE session_token_id = $1")
                .bind(row.session_token_id)
                .execute(&state.db)
                .await;

            Ok(AuthContext {
                actor: Actor {
                    user_id: row.user_id,
                    role,
                    patient_id: row.patient_id,
                    doctor_id: row.doctor_id,
                },
                session_token_id: row.session_token_id,
            })
        }
    }
}
