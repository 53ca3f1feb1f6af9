use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

use crate::lifecycle::AppointmentStatus;
use crate::models::{appointment_number, Appointment, ClinicalRecord};
use crate::store::{AppointmentStore, ListScope, NewAppointment, StoreError};

pub async fn connect_pg(database_url: &str) -> anyhow::Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(database_url)
        .await?;

    sqlx::migrate!("./migrations").run(&pool).await?;
    tracing::info!("database ready");
    Ok(pool)
}

#[derive(Clone)]
pub struct PgAppointmentStore {
    pool: PgPool,
}

impl PgAppointmentStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct AppointmentRow {
    id: i64,
    patient_id: i64,
    doctor_id: i64,
    appointment_date: DateTime<Utc>,
    reason: Option<String>,
    status: String,
    notes: Option<String>,
    diagnosis: Option<String>,
    prescription: Option<String>,
    clinical_attached: bool,
    version: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<AppointmentRow> for Appointment {
    type Error = StoreError;

    fn try_from(r: AppointmentRow) -> Result<Self, Self::Error> {
        let status: AppointmentStatus = r
            .status
            .parse()
            .map_err(|e| StoreError::Corrupt(format!("appointment {}: {e}", r.id)))?;

        let clinical_record = r.clinical_attached.then(|| ClinicalRecord {
            notes: r.notes,
            diagnosis: r.diagnosis,
            prescription: r.prescription,
        });

        Ok(Appointment {
            id: r.id,
            appointment_number: appointment_number(r.id),
            patient_id: r.patient_id,
            doctor_id: r.doctor_id,
            appointment_date: r.appointment_date,
            reason: r.reason,
            status,
            clinical_record,
            version: r.version,
            created_at: r.created_at,
            updated_at: r.updated_at,
        })
    }
}

const APPOINTMENT_COLUMNS: &str = r#"
    id, patient_id, doctor_id, appointment_date, reason, status,
    notes, diagnosis, prescription, clinical_attached,
    version, created_at, updated_at
"#;

#[async_trait]
impl AppointmentStore for PgAppointmentStore {
    async fn insert(&self, new: NewAppointment) -> Result<Appointment, StoreError> {
        let row: AppointmentRow = sqlx::query_as(&format!(
            r#"
            INSERT INTO appointment (patient_id, doctor_id, appointment_date, reason, status, version)
            VALUES ($1, $2, $3, $4, $5, 1)
            RETURNING {APPOINTMENT_COLUMNS}
            "#
        ))
        .bind(new.patient_id)
        .bind(new.doctor_id)
        .bind(new.appointment_date)
        .bind(new.reason)
        .bind(AppointmentStatus::Pending.as_str())
        .fetch_one(&self.pool)
        .await?;

        row.try_into()
    }

    async fn fetch(&self, id: i64) -> Result<Option<Appointment>, StoreError> {
        let row: Option<AppointmentRow> = sqlx::query_as(&format!(
            "SELECT {APPOINTMENT_COLUMNS} FROM appointment WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Appointment::try_from).transpose()
    }

    async fn list(&self, scope: &ListScope) -> Result<Vec<Appointment>, StoreError> {
        let rows: Vec<AppointmentRow> = sqlx::query_as(&format!(
            r#"
            SELECT {APPOINTMENT_COLUMNS}
            FROM appointment
            WHERE ($1::BIGINT IS NULL OR patient_id = $1)
              AND ($2::BIGINT IS NULL OR doctor_id = $2)
              AND ($3::TEXT IS NULL OR status = $3)
            ORDER BY appointment_date DESC
            OFFSET $4
            LIMIT $5
            "#
        ))
        .bind(scope.patient_id)
        .bind(scope.doctor_id)
        .bind(scope.status.map(AppointmentStatus::as_str))
        .bind(scope.skip)
        .bind(scope.limit)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Appointment::try_from).collect()
    }

    async fn replace(&self, next: &Appointment, expected_version: i64) -> Result<bool, StoreError> {
        let record = next.clinical_record.clone().unwrap_or_default();
        let res = sqlx::query(
            r#"
            UPDATE appointment
            SET status = $3,
                notes = $4,
                diagnosis = $5,
                prescription = $6,
                clinical_attached = $7,
                version = $8,
                updated_at = $9
            WHERE id = $1
              AND version = $2
            "#,
        )
        .bind(next.id)
        .bind(expected_version)
        .bind(next.status.as_str())
        .bind(record.notes)
        .bind(record.diagnosis)
        .bind(record.prescription)
        .bind(next.clinical_record.is_some())
        .bind(next.version)
        .bind(next.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(res.rows_affected() == 1)
    }

    async fn remove(&self, id: i64) -> Result<bool, StoreError> {
        let res = sqlx::query("DELETE FROM appointment WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(res.rows_affected() > 0)
    }

    async fn doctor_exists(&self, doctor_id: i64) -> Result<bool, StoreError> {
        let found: Option<i64> = sqlx::query_scalar("SELECT id FROM doctor WHERE id = $1")
            .bind(doctor_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(found.is_some())
    }
}
