//! Appointment persistence boundary.

use std::collections::{BTreeMap, HashSet};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::sync::Mutex;

use crate::lifecycle::AppointmentStatus;
use crate::models::{appointment_number, Appointment};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("db error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("row decode error: {0}")]
    Corrupt(String),
}

#[derive(Debug, Clone)]
pub struct NewAppointment {
    pub patient_id: i64,
    pub doctor_id: i64,
    pub appointment_date: DateTime<Utc>,
    pub reason: Option<String>,
}

/// Which appointments a listing may return.
#[derive(Debug, Clone, Default)]
pub struct ListScope {
    pub patient_id: Option<i64>,
    pub doctor_id: Option<i64>,
    pub status: Option<AppointmentStatus>,
    pub skip: i64,
    pub limit: i64,
}

impl ListScope {
    fn admits(&self, apt: &Appointment) -> bool {
        self.patient_id.is_none_or(|id| id == apt.patient_id)
            && self.doctor_id.is_none_or(|id| id == apt.doctor_id)
            && self.status.is_none_or(|s| s == apt.status)
    }
}

#[async_trait]
pub trait AppointmentStore: Send + Sync {
    /// Inserts a new `pending` appointment at version 1.
    async fn insert(&self, new: NewAppointment) -> Result<Appointment, StoreError>;

    async fn fetch(&self, id: i64) -> Result<Option<Appointment>, StoreError>;

    /// Newest `appointment_date` first.
    async fn list(&self, scope: &ListScope) -> Result<Vec<Appointment>, StoreError>;

    /// Compare-and-swap on `version`: writes `next` only if the stored row
    /// is still at `expected_version`. Returns whether the write happened.
    async fn replace(&self, next: &Appointment, expected_version: i64) -> Result<bool, StoreError>;

    async fn remove(&self, id: i64) -> Result<bool, StoreError>;

    async fn doctor_exists(&self, doctor_id: i64) -> Result<bool, StoreError>;
}

/// In-process store. Backs tests and local demos.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<MemoryInner>,
}

#[derive(Debug, Default)]
struct MemoryInner {
    next_id: i64,
    appointments: BTreeMap<i64, Appointment>,
    doctors: HashSet<i64>,
}

impl MemoryStore {
    pub fn with_doctors(doctors: impl IntoIterator<Item = i64>) -> Self {
        MemoryStore {
            inner: Mutex::new(MemoryInner {
                next_id: 0,
                appointments: BTreeMap::new(),
                doctors: doctors.into_iter().collect(),
            }),
        }
    }

    /// Writes an appointment as-is, bypassing the lifecycle. Stands in for
    /// changes made by processes outside this crate.
    pub async fn put_raw(&self, appointment: Appointment) {
        let mut inner = self.inner.lock().await;
        inner.next_id = inner.next_id.max(appointment.id);
        inner.appointments.insert(appointment.id, appointment);
    }
}

#[async_trait]
impl AppointmentStore for MemoryStore {
    async fn insert(&self, new: NewAppointment) -> Result<Appointment, StoreError> {
        let mut inner = self.inner.lock().await;
        inner.next_id += 1;
        let id = inner.next_id;
        let now = Utc::now();
        let apt = Appointment {
            id,
            appointment_number: appointment_number(id),
            patient_id: new.patient_id,
            doctor_id: new.doctor_id,
            appointment_date: new.appointment_date,
            reason: new.reason,
            status: AppointmentStatus::Pending,
            clinical_record: None,
            version: 1,
            created_at: now,
            updated_at: now,
        };
        inner.appointments.insert(id, apt.clone());
        Ok(apt)
    }

    async fn fetch(&self, id: i64) -> Result<Option<Appointment>, StoreError> {
        Ok(self.inner.lock().await.appointments.get(&id).cloned())
    }

    async fn list(&self, scope: &ListScope) -> Result<Vec<Appointment>, StoreError> {
        let inner = self.inner.lock().await;
        let mut rows: Vec<Appointment> = inner
            .appointments
            .values()
            .filter(|apt| scope.admits(apt))
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.appointment_date.cmp(&a.appointment_date));
        Ok(rows
            .into_iter()
            .skip(scope.skip.max(0) as usize)
            .take(scope.limit.max(0) as usize)
            .collect())
    }

    async fn replace(&self, next: &Appointment, expected_version: i64) -> Result<bool, StoreError> {
        let mut inner = self.inner.lock().await;
        match inner.appointments.get_mut(&next.id) {
            Some(current) if current.version == expected_version => {
                *current = next.clone();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn remove(&self, id: i64) -> Result<bool, StoreError> {
        Ok(self.inner.lock().await.appointments.remove(&id).is_some())
    }

    async fn doctor_exists(&self, doctor_id: i64) -> Result<bool, StoreError> {
        Ok(self.inner.lock().await.doctors.contains(&doctor_id))
    }
}
