//! Authoritative appointment service.
//!
//! Runs the same lifecycle engine the client embeds, then persists through
//! an [`AppointmentStore`]. Every write is a compare-and-swap on `version`.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use thiserror::Error;
use tracing::{info, warn};

use crate::actions::{attach_clinical_record, authorize, available_actions, Action, ActionSet};
use crate::error::{ApiError, WorkflowError};
use crate::lifecycle::{transition, trigger_for, AppointmentStatus};
use crate::models::{
    Actor, Appointment, CreateAppointmentRequest, Role, UpdateAppointmentRequest,
};
use crate::reconcile::{AppointmentApi, RemoteError};
use crate::store::{AppointmentStore, ListScope, NewAppointment, StoreError};

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Workflow(#[from] WorkflowError),
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    Validation(String),
    #[error("appointment {0} not found")]
    NotFound(i64),
    #[error("doctor {0} not found")]
    DoctorNotFound(i64),
    #[error("appointment {0} was changed by someone else; reload it and try again")]
    Conflict(i64),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<ServiceError> for ApiError {
    fn from(err: ServiceError) -> Self {
        let message = err.to_string();
        match err {
            ServiceError::Workflow(e) => e.into(),
            ServiceError::Forbidden(_) => ApiError::Forbidden("FORBIDDEN", message),
            ServiceError::Validation(_) => ApiError::BadRequest("VALIDATION_ERROR", message),
            ServiceError::NotFound(_) | ServiceError::DoctorNotFound(_) => {
                ApiError::NotFound("NOT_FOUND", message)
            }
            ServiceError::Conflict(_) => ApiError::Conflict("VERSION_CONFLICT", message),
            ServiceError::Store(e) => ApiError::Internal(e.to_string()),
        }
    }
}

/// Listing parameters after HTTP decoding.
#[derive(Debug, Clone, Default)]
pub struct ListFilter {
    pub status: Option<AppointmentStatus>,
    pub skip: Option<i64>,
    pub limit: Option<i64>,
}

pub struct AppointmentService<S> {
    store: S,
    list_limit: i64,
}

impl<S: AppointmentStore> AppointmentService<S> {
    pub fn new(store: S, list_limit: i64) -> Self {
        Self {
            store,
            list_limit: list_limit.max(1),
        }
    }

    pub async fn create(
        &self,
        actor: &Actor,
        req: &CreateAppointmentRequest,
    ) -> Result<Appointment, ServiceError> {
        if actor.role != Role::Patient {
            return Err(ServiceError::Forbidden("Only patients can book appointments".into()));
        }
        let Some(patient_id) = actor.patient_id else {
            return Err(ServiceError::Forbidden("Patient profile not found".into()));
        };

        if !self.store.doctor_exists(req.doctor_id).await? {
            return Err(ServiceError::DoctorNotFound(req.doctor_id));
        }
        if req.appointment_date <= Utc::now() {
            return Err(ServiceError::Validation(
                "Appointment date must be in the future".into(),
            ));
        }

        let reason = req
            .reason
            .as_deref()
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .map(str::to_string);

        let apt = self
            .store
            .insert(NewAppointment {
                patient_id,
                doctor_id: req.doctor_id,
                appointment_date: req.appointment_date,
                reason,
            })
            .await?;

        info!(
            appointment_id = apt.id,
            patient_id,
            doctor_id = apt.doctor_id,
            "appointment booked"
        );
        Ok(apt)
    }

    pub async fn list(
        &self,
        actor: &Actor,
        filter: &ListFilter,
    ) -> Result<Vec<Appointment>, ServiceError> {
        let skip = filter.skip.unwrap_or(0);
        if skip < 0 {
            return Err(ServiceError::Validation("skip must be >= 0".into()));
        }
        let limit = filter.limit.unwrap_or(self.list_limit);
        if limit < 1 {
            return Err(ServiceError::Validation("limit must be >= 1".into()));
        }

        let mut scope = ListScope {
            status: filter.status,
            skip,
            limit: limit.min(self.list_limit),
            ..Default::default()
        };
        match actor.role {
            Role::Patient => match actor.patient_id {
                Some(id) => scope.patient_id = Some(id),
                None => return Ok(Vec::new()),
            },
            Role::Doctor => match actor.doctor_id {
                Some(id) => scope.doctor_id = Some(id),
                None => return Ok(Vec::new()),
            },
            Role::Admin => {}
        }

        Ok(self.store.list(&scope).await?)
    }

    pub async fn get(&self, actor: &Actor, id: i64) -> Result<Appointment, ServiceError> {
        self.load_visible(actor, id).await
    }

    /// The caller's current action menu for one appointment.
    pub async fn actions(&self, actor: &Actor, id: i64) -> Result<ActionSet, ServiceError> {
        let apt = self.load_visible(actor, id).await?;
        Ok(available_actions(actor.role, &apt, actor.owns(&apt)))
    }

    /// Clinical fields are attached first, then the status change is applied
    /// to the result. The request advances `version` exactly once.
    pub async fn update(
        &self,
        actor: &Actor,
        id: i64,
        req: &UpdateAppointmentRequest,
    ) -> Result<Appointment, ServiceError> {
        let current = self.load_visible(actor, id).await?;
        let clinical = req.clinical_record();
        if clinical.is_none() && req.status.is_none() {
            return Err(ServiceError::Validation("nothing to update".into()));
        }

        let owner = actor.owns(&current);
        let mut next = current.clone();

        if let Some(record) = &clinical {
            self.check(actor, &next, owner, Action::AttachDetails)?;
            next = attach_clinical_record(&next, record)?;
        }
        if let Some(target) = req.status {
            let trigger = trigger_for(next.status, target)?;
            self.check(actor, &next, owner, Action::from(trigger))?;
            next = transition(&next, trigger)?;
        }

        next.version = current.version + 1;
        next.updated_at = Utc::now();

        if !self.store.replace(&next, current.version).await? {
            warn!(appointment_id = id, version = current.version, "lost update race");
            return Err(ServiceError::Conflict(id));
        }

        info!(
            appointment_id = id,
            role = %actor.role,
            from = %current.status,
            to = %next.status,
            clinical = clinical.is_some(),
            version = next.version,
            "appointment updated"
        );
        Ok(next)
    }

    pub async fn delete(&self, actor: &Actor, id: i64) -> Result<(), ServiceError> {
        let current = self.load_visible(actor, id).await?;
        self.check(actor, &current, actor.owns(&current), Action::Delete)?;

        if !self.store.remove(id).await? {
            return Err(ServiceError::NotFound(id));
        }
        info!(appointment_id = id, role = %actor.role, "appointment deleted");
        Ok(())
    }

    fn check(
        &self,
        actor: &Actor,
        apt: &Appointment,
        owner: bool,
        action: Action,
    ) -> Result<(), ServiceError> {
        authorize(actor.role, apt, owner, action).map_err(|e| {
            warn!(appointment_id = apt.id, role = %actor.role, %action, error = %e, "action refused");
            ServiceError::from(e)
        })
    }

    async fn load_visible(&self, actor: &Actor, id: i64) -> Result<Appointment, ServiceError> {
        let apt = self
            .store
            .fetch(id)
            .await?
            .ok_or(ServiceError::NotFound(id))?;

        let visible = match actor.role {
            Role::Admin => true,
            Role::Patient => actor.owns(&apt),
            Role::Doctor => actor.is_assigned_doctor(&apt),
        };
        if !visible {
            return Err(ServiceError::Forbidden("Not enough permissions".into()));
        }
        Ok(apt)
    }
}

/// In-process [`AppointmentApi`]: one actor talking straight to a service.
pub struct LocalApi<S> {
    service: Arc<AppointmentService<S>>,
    actor: Actor,
}

impl<S> LocalApi<S> {
    pub fn new(service: Arc<AppointmentService<S>>, actor: Actor) -> Self {
        Self { service, actor }
    }
}

fn remote(err: ServiceError) -> RemoteError {
    match err {
        ServiceError::NotFound(id) => RemoteError::NotFound(id),
        other => RemoteError::Failure(other.to_string()),
    }
}

#[async_trait]
impl<S: AppointmentStore + 'static> AppointmentApi for LocalApi<S> {
    async fn create(&self, req: &CreateAppointmentRequest) -> Result<Appointment, RemoteError> {
        self.service.create(&self.actor, req).await.map_err(remote)
    }

    async fn list(
        &self,
        status: Option<AppointmentStatus>,
    ) -> Result<Vec<Appointment>, RemoteError> {
        let filter = ListFilter {
            status,
            ..Default::default()
        };
        self.service.list(&self.actor, &filter).await.map_err(remote)
    }

    async fn get(&self, id: i64) -> Result<Appointment, RemoteError> {
        self.service.get(&self.actor, id).await.map_err(remote)
    }

    async fn update(
        &self,
        id: i64,
        req: &UpdateAppointmentRequest,
    ) -> Result<Appointment, RemoteError> {
        self.service.update(&self.actor, id, req).await.map_err(remote)
    }

    async fn delete(&self, id: i64) -> Result<(), RemoteError> {
        self.service.delete(&self.actor, id).await.map_err(remote)
    }
}
