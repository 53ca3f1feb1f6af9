// src/routes/appointment_routes.rs

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};

use crate::{
    actions::ActionSet,
    error::ApiError,
    middleware::auth_context::AuthContext,
    models::{
        ApiOk, AppState, Appointment, CreateAppointmentRequest, ListAppointmentsQuery, OkData,
        UpdateAppointmentRequest,
    },
    service::ListFilter,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/appointments", get(list_appointments).post(create_appointment))
        .route(
            "/appointments/{appointment_id}",
            get(get_appointment)
                .put(update_appointment)
                .delete(delete_appointment),
        )
        .route("/appointments/{appointment_id}/actions", get(get_actions))
}

/* ============================================================
   POST /appointments
   ============================================================ */

pub async fn create_appointment(
    State(state): State<AppState>,
    auth: AuthContext,
    Json(req): Json<CreateAppointmentRequest>,
) -> Result<(StatusCode, Json<ApiOk<Appointment>>), ApiError> {
    let apt = state.appointments.create(&auth.actor, &req).await?;
    Ok((StatusCode::CREATED, Json(ApiOk { data: apt })))
}

/* ============================================================
   GET /appointments
   ============================================================ */

pub async fn list_appointments(
    State(state): State<AppState>,
    auth: AuthContext,
    Query(q): Query<ListAppointmentsQuery>,
) -> Result<Json<ApiOk<Vec<Appointment>>>, ApiError> {
    let filter = ListFilter {
        status: q.status,
        skip: q.skip,
        limit: q.limit,
    };
    let data = state.appointments.list(&auth.actor, &filter).await?;
    Ok(Json(ApiOk { data }))
}

/* ============================================================
   GET /appointments/{id}
   ============================================================ */

pub async fn get_appointment(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(appointment_id): Path<i64>,
) -> Result<Json<ApiOk<Appointment>>, ApiError> {
    let data = state.appointments.get(&auth.actor, appointment_id).await?;
    Ok(Json(ApiOk { data }))
}

/* ============================================================
   GET /appointments/{id}/actions
   ============================================================ */

pub async fn get_actions(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(appointment_id): Path<i64>,
) -> Result<Json<ApiOk<ActionSet>>, ApiError> {
    let data = state.appointments.actions(&auth.actor, appointment_id).await?;
    Ok(Json(ApiOk { data }))
}

/* ============================================================
   PUT /appointments/{id}
   ============================================================ */

pub async fn update_appointment(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(appointment_id): Path<i64>,
    Json(req): Json<UpdateAppointmentRequest>,
) -> Result<Json<ApiOk<Appointment>>, ApiError> {
    let data = state
        .appointments
        .update(&auth.actor, appointment_id, &req)
        .await?;
    Ok(Json(ApiOk { data }))
}

/* ============================================================
   DELETE /appointments/{id}
   ============================================================ */

pub async fn delete_appointment(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(appointment_id): Path<i64>,
) -> Result<Json<ApiOk<OkData>>, ApiError> {
    state.appointments.delete(&auth.actor, appointment_id).await?;
    Ok(Json(ApiOk {
        data: OkData { ok: true },
    }))
}
