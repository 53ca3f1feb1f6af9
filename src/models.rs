use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::db::PgAppointmentStore;
use crate::lifecycle::AppointmentStatus;
use crate::service::AppointmentService;

#[derive(Clone)]
pub struct AppState {
    pub db: sqlx::PgPool,
    pub appointments: Arc<AppointmentService<PgAppointmentStore>>,
    pub session_ttl_hours: i64,
}

/* -------------------------
   Domain
--------------------------*/

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Patient,
    Doctor,
    Admin,
}

impl Role {
    /// Role mapping of `app_user.role` (smallint):
    /// 0 patient, 1 admin, 2 doctor
    pub fn from_code(code: i16) -> Option<Role> {
        match code {
            0 => Some(Role::Patient),
            1 => Some(Role::Admin),
            2 => Some(Role::Doctor),
            _ => None,
        }
    }

    pub fn code(self) -> i16 {
        match self {
            Role::Patient => 0,
            Role::Admin => 1,
            Role::Doctor => 2,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Role::Patient => "patient",
            Role::Doctor => "doctor",
            Role::Admin => "admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whoever requests an action. Passed explicitly to every engine call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    pub user_id: Uuid,
    pub role: Role,
    /// Patient profile of this user, if any.
    pub patient_id: Option<i64>,
    /// Doctor profile of this user, if any.
    pub doctor_id: Option<i64>,
}

impl Actor {
    pub fn patient(user_id: Uuid, patient_id: i64) -> Self {
        Actor {
            user_id,
            role: Role::Patient,
            patient_id: Some(patient_id),
            doctor_id: None,
        }
    }

    pub fn doctor(user_id: Uuid, doctor_id: i64) -> Self {
        Actor {
            user_id,
            role: Role::Doctor,
            patient_id: None,
            doctor_id: Some(doctor_id),
        }
    }

    pub fn admin(user_id: Uuid) -> Self {
        Actor {
            user_id,
            role: Role::Admin,
            patient_id: None,
            doctor_id: None,
        }
    }

    /// The ownership fact fed to the action resolver.
    pub fn owns(&self, appointment: &Appointment) -> bool {
        self.role == Role::Patient && self.patient_id == Some(appointment.patient_id)
    }

    pub fn is_assigned_doctor(&self, appointment: &Appointment) -> bool {
        self.role == Role::Doctor && self.doctor_id == Some(appointment.doctor_id)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClinicalRecord {
    pub notes: Option<String>,
    pub diagnosis: Option<String>,
    pub prescription: Option<String>,
}

impl ClinicalRecord {
    pub fn is_empty(&self) -> bool {
        self.notes.is_none() && self.diagnosis.is_none() && self.prescription.is_none()
    }

    /// Overwrites the fields present in `update`; never clears a field.
    pub fn merge(&mut self, update: &ClinicalRecord) {
        if let Some(notes) = &update.notes {
            self.notes = Some(notes.clone());
        }
        if let Some(diagnosis) = &update.diagnosis {
            self.diagnosis = Some(diagnosis.clone());
        }
        if let Some(prescription) = &update.prescription {
            self.prescription = Some(prescription.clone());
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Appointment {
    pub id: i64,
    pub appointment_number: String,
    pub patient_id: i64,
    pub doctor_id: i64,
    pub appointment_date: DateTime<Utc>,
    pub reason: Option<String>,
    pub status: AppointmentStatus,
    pub clinical_record: Option<ClinicalRecord>,
    /// Advances on every accepted change.
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// `APT-000042` for id 42.
pub fn appointment_number(id: i64) -> String {
    format!("APT-{id:06}")
}

/* -------------------------
   API DTOs
--------------------------*/

#[derive(Debug, Serialize)]
pub struct ApiOk<T> {
    pub data: T,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateAppointmentRequest {
    pub doctor_id: i64,
    pub appointment_date: DateTime<Utc>,
    pub reason: Option<String>,
}

/// Partial update. A `status` is interpreted as a transition; clinical
/// fields are an attach-details request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateAppointmentRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<AppointmentStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diagnosis: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prescription: Option<String>,
}

impl UpdateAppointmentRequest {
    pub fn status(status: AppointmentStatus) -> Self {
        UpdateAppointmentRequest {
            status: Some(status),
            ..Default::default()
        }
    }

    pub fn clinical(record: &ClinicalRecord) -> Self {
        UpdateAppointmentRequest {
            status: None,
            notes: record.notes.clone(),
            diagnosis: record.diagnosis.clone(),
            prescription: record.prescription.clone(),
        }
    }

    pub fn clinical_record(&self) -> Option<ClinicalRecord> {
        let record = ClinicalRecord {
            notes: self.notes.clone(),
            diagnosis: self.diagnosis.clone(),
            prescription: self.prescription.clone(),
        };
        (!record.is_empty()).then_some(record)
    }
}

#[derive(Debug, Deserialize)]
pub struct ListAppointmentsQuery {
    pub status: Option<AppointmentStatus>,
    pub skip: Option<i64>,
    pub limit: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    /// Email or username.
    pub login: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponseData {
    pub access_token: String,
    pub token_type: &'static str,
    pub expires_at: DateTime<Utc>,
    pub user: UserProfile,
}

#[derive(Debug, Serialize)]
pub struct UserProfile {
    pub user_id: Uuid,
    pub email: String,
    pub username: String,
    pub full_name: String,
    pub role: Role,
    pub patient_id: Option<i64>,
    pub doctor_id: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct OkData {
    pub ok: bool,
}

/* -------------------------
   DB Row Models
--------------------------*/

#[derive(Debug, sqlx::FromRow)]
pub struct UserRow {
    pub user_id: Uuid,
    pub email: String,
    pub username: String,
    pub full_name: String,
    pub password_hash: String,
    pub role: i16,
    pub is_active: bool,
    pub patient_id: Option<i64>,
    pub doctor_id: Option<i64>,
}

#[derive(Debug, sqlx::FromRow)]
pub struct SessionTokenRow {
    pub session_token_id: Uuid,
    pub expires_at: DateTime<Utc>,
}
