//! Client-side reconciliation.
//!
//! An [`AppointmentBoard`] holds one actor's snapshots and applies changes
//! pessimistically: nothing moves locally until the remote side confirms,
//! and every confirmation is re-checked against the local engine before it
//! replaces a snapshot. Menus are derived from the snapshot on every call.
//!
//! Actions are two-phase so the engine never performs I/O itself:
//! [`AppointmentBoard::begin`] validates and reserves the appointment,
//! the caller talks to its [`AppointmentApi`], then
//! [`AppointmentBoard::settle`] folds the outcome back in.
//! [`AppointmentBoard::perform`] does all three.

use std::collections::{BTreeMap, HashSet};

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, warn};

use crate::actions::{attach_clinical_record, authorize, available_actions, Action, ActionSet};
use crate::error::WorkflowError;
use crate::lifecycle::{transition, AppointmentStatus, Transition};
use crate::models::{
    Actor, Appointment, ClinicalRecord, CreateAppointmentRequest, UpdateAppointmentRequest,
};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RemoteError {
    #[error("appointment {0} not found")]
    NotFound(i64),
    #[error("{0}")]
    Failure(String),
}

/// The remote appointment API.
#[async_trait]
pub trait AppointmentApi: Send + Sync {
    async fn create(&self, req: &CreateAppointmentRequest) -> Result<Appointment, RemoteError>;

    /// Order of the result carries no meaning.
    async fn list(&self, status: Option<AppointmentStatus>)
        -> Result<Vec<Appointment>, RemoteError>;

    async fn get(&self, id: i64) -> Result<Appointment, RemoteError>;

    async fn update(
        &self,
        id: i64,
        req: &UpdateAppointmentRequest,
    ) -> Result<Appointment, RemoteError>;

    async fn delete(&self, id: i64) -> Result<(), RemoteError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReconcileError {
    #[error(transparent)]
    Workflow(#[from] WorkflowError),
    #[error("remote call failed: {0}")]
    RemoteFailure(String),
    #[error("appointment {0} no longer exists; refresh the list")]
    NotFound(i64),
    #[error("appointment {0} already has an action in flight")]
    ActionInFlight(i64),
    #[error("appointment {0} must be re-fetched before acting on it")]
    StaleSnapshot(i64),
    #[error("appointment {0} is not on this board")]
    UnknownAppointment(i64),
    #[error("appointment {id}: expected status {expected}, server reported {actual}")]
    RuleDrift {
        id: i64,
        expected: AppointmentStatus,
        actual: AppointmentStatus,
    },
    #[error("appointment {id}: response version {remote} does not advance local version {local}")]
    StaleResponse { id: i64, local: i64, remote: i64 },
    #[error("appointment {expected}: response describes appointment {actual}")]
    MismatchedResponse { expected: i64, actual: i64 },
}

impl From<RemoteError> for ReconcileError {
    fn from(err: RemoteError) -> Self {
        match err {
            RemoteError::NotFound(id) => ReconcileError::NotFound(id),
            RemoteError::Failure(msg) => ReconcileError::RemoteFailure(msg),
        }
    }
}

/// What the caller asks to do with one appointment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Confirm,
    Cancel,
    Complete,
    Delete,
    AttachDetails(ClinicalRecord),
}

impl Command {
    pub fn action(&self) -> Action {
        match self {
            Command::Confirm => Action::Confirm,
            Command::Cancel => Action::Cancel,
            Command::Complete => Action::Complete,
            Command::Delete => Action::Delete,
            Command::AttachDetails(_) => Action::AttachDetails,
        }
    }
}

/// The request to send for a reserved action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    Update(UpdateAppointmentRequest),
    Delete,
}

/// What the remote side answered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Updated(Appointment),
    Deleted,
}

/// A reserved action. Must be handed back to [`AppointmentBoard::settle`].
#[derive(Debug)]
#[must_use = "an in-flight action blocks its appointment until settled"]
pub struct InFlight {
    id: i64,
    action: Action,
    base_version: i64,
    expected: Option<AppointmentStatus>,
    request: Request,
}

impl InFlight {
    pub fn id(&self) -> i64 {
        self.id
    }

    pub fn action(&self) -> Action {
        self.action
    }

    pub fn request(&self) -> &Request {
        &self.request
    }
}

pub struct AppointmentBoard {
    actor: Actor,
    snapshots: BTreeMap<i64, Appointment>,
    in_flight: HashSet<i64>,
    stale: HashSet<i64>,
}

impl AppointmentBoard {
    pub fn new(actor: Actor) -> Self {
        Self {
            actor,
            snapshots: BTreeMap::new(),
            in_flight: HashSet::new(),
            stale: HashSet::new(),
        }
    }

    pub fn actor(&self) -> &Actor {
        &self.actor
    }

    pub fn appointments(&self) -> impl Iterator<Item = &Appointment> {
        self.snapshots.values()
    }

    pub fn appointment(&self, id: i64) -> Option<&Appointment> {
        self.snapshots.get(&id)
    }

    pub fn is_in_flight(&self, id: i64) -> bool {
        self.in_flight.contains(&id)
    }

    pub fn is_stale(&self, id: i64) -> bool {
        self.stale.contains(&id)
    }

    /// Actions to offer for `id`. Empty while an action is in flight or the
    /// snapshot needs re-fetching.
    pub fn menu(&self, id: i64) -> ActionSet {
        if self.in_flight.contains(&id) || self.stale.contains(&id) {
            return ActionSet::empty();
        }
        match self.snapshots.get(&id) {
            Some(apt) => available_actions(self.actor.role, apt, self.actor.owns(apt)),
            None => ActionSet::empty(),
        }
    }

    /// Replaces the whole collection with a fresh listing.
    pub fn load(&mut self, appointments: Vec<Appointment>) {
        self.snapshots = appointments.into_iter().map(|a| (a.id, a)).collect();
        self.stale.clear();
    }

    /// Validates `command` against the current snapshot and reserves the
    /// appointment. Nothing is changed locally besides the reservation.
    pub fn begin(&mut self, id: i64, command: Command) -> Result<InFlight, ReconcileError> {
        if self.in_flight.contains(&id) {
            return Err(ReconcileError::ActionInFlight(id));
        }
        if self.stale.contains(&id) {
            return Err(ReconcileError::StaleSnapshot(id));
        }
        let apt = self
            .snapshots
            .get(&id)
            .ok_or(ReconcileError::UnknownAppointment(id))?;

        let action = command.action();
        authorize(self.actor.role, apt, self.actor.owns(apt), action)?;

        let edge = |t: Transition| -> Result<_, WorkflowError> {
            let target = transition(apt, t)?.status;
            Ok((Some(target), Request::Update(UpdateAppointmentRequest::status(target))))
        };
        let (expected, request) = match command {
            Command::Confirm => edge(Transition::Confirm)?,
            Command::Cancel => edge(Transition::Cancel)?,
            Command::Complete => edge(Transition::Complete)?,
            Command::AttachDetails(record) => {
                let next = attach_clinical_record(apt, &record)?;
                (Some(next.status), Request::Update(UpdateAppointmentRequest::clinical(&record)))
            }
            Command::Delete => (None, Request::Delete),
        };

        let pending = InFlight {
            id,
            action,
            base_version: apt.version,
            expected,
            request,
        };
        self.in_flight.insert(id);
        debug!(appointment_id = id, %action, "action in flight");
        Ok(pending)
    }

    /// Folds the remote outcome of `pending` back into the board.
    ///
    /// On any failure the snapshot is left as it was and marked stale.
    pub fn settle(
        &mut self,
        pending: InFlight,
        outcome: Result<Outcome, RemoteError>,
    ) -> Result<Option<&Appointment>, ReconcileError> {
        let id = pending.id;
        self.in_flight.remove(&id);

        let checked = outcome
            .map_err(ReconcileError::from)
            .and_then(|o| self.check_outcome(&pending, o));

        match checked {
            Ok(Outcome::Deleted) => {
                self.snapshots.remove(&id);
                self.stale.remove(&id);
                Ok(None)
            }
            Ok(Outcome::Updated(apt)) => match self.snapshots.get_mut(&id) {
                Some(slot) => {
                    self.stale.remove(&id);
                    *slot = apt;
                    Ok(Some(&*slot))
                }
                None => {
                    // dropped by a reload while the request was out
                    warn!(appointment_id = id, action = %pending.action, "settled after leaving the board");
                    self.stale.insert(id);
                    Err(ReconcileError::UnknownAppointment(id))
                }
            },
            Err(err) => {
                warn!(appointment_id = id, action = %pending.action, error = %err, "action not applied");
                self.stale.insert(id);
                Err(err)
            }
        }
    }

    fn check_outcome(&self, pending: &InFlight, outcome: Outcome) -> Result<Outcome, ReconcileError> {
        let id = pending.id;
        match (&pending.request, outcome) {
            (Request::Delete, Outcome::Deleted) => Ok(Outcome::Deleted),
            (Request::Update(_), Outcome::Updated(apt)) => {
                if apt.id != id {
                    return Err(ReconcileError::MismatchedResponse {
                        expected: id,
                        actual: apt.id,
                    });
                }
                let local = self
                    .snapshots
                    .get(&id)
                    .map_or(pending.base_version, |s| s.version.max(pending.base_version));
                if apt.version <= local {
                    return Err(ReconcileError::StaleResponse {
                        id,
                        local,
                        remote: apt.version,
                    });
                }
                if let Some(expected) = pending.expected {
                    if apt.status != expected {
                        return Err(ReconcileError::RuleDrift {
                            id,
                            expected,
                            actual: apt.status,
                        });
                    }
                }
                Ok(Outcome::Updated(apt))
            }
            (Request::Delete, Outcome::Updated(_)) | (Request::Update(_), Outcome::Deleted) => {
                Err(ReconcileError::RemoteFailure(format!(
                    "unexpected response kind for {} on appointment {id}",
                    pending.action
                )))
            }
        }
    }

    fn check_fetched(&self, id: i64, apt: &Appointment) -> Result<(), ReconcileError> {
        if apt.id != id {
            return Err(ReconcileError::MismatchedResponse {
                expected: id,
                actual: apt.id,
            });
        }
        let Some(local) = self.snapshots.get(&id) else {
            return Ok(());
        };
        if apt.version < local.version {
            return Err(ReconcileError::StaleResponse {
                id,
                local: local.version,
                remote: apt.version,
            });
        }
        let moved_forward = apt.version > local.version && local.status.can_reach(apt.status);
        if apt.status != local.status && !moved_forward {
            return Err(ReconcileError::RuleDrift {
                id,
                expected: local.status,
                actual: apt.status,
            });
        }
        Ok(())
    }

    pub async fn perform<A: AppointmentApi + ?Sized>(
        &mut self,
        api: &A,
        id: i64,
        command: Command,
    ) -> Result<Option<&Appointment>, ReconcileError> {
        let pending = self.begin(id, command)?;
        let outcome = match pending.request() {
            Request::Update(req) => api.update(id, req).await.map(Outcome::Updated),
            Request::Delete => api.delete(id).await.map(|()| Outcome::Deleted),
        };
        self.settle(pending, outcome)
    }

    pub async fn attach_details<A: AppointmentApi + ?Sized>(
        &mut self,
        api: &A,
        id: i64,
        record: ClinicalRecord,
    ) -> Result<Option<&Appointment>, ReconcileError> {
        self.perform(api, id, Command::AttachDetails(record)).await
    }

    pub async fn delete<A: AppointmentApi + ?Sized>(
        &mut self,
        api: &A,
        id: i64,
    ) -> Result<(), ReconcileError> {
        self.perform(api, id, Command::Delete).await.map(|_| ())
    }

    /// Re-fetches the full list. On failure the board is unchanged.
    pub async fn refresh<A: AppointmentApi + ?Sized>(&mut self, api: &A) -> Result<(), ReconcileError> {
        let list = api.list(None).await?;
        self.load(list);
        Ok(())
    }

    /// Re-fetches one appointment, clearing its stale mark. A vanished
    /// appointment is dropped from the board.
    ///
    /// The answer must describe `id`, must not be older than the snapshot,
    /// and may only move the status forward along the lifecycle. A rejected
    /// answer leaves the snapshot as it was and marked stale.
    pub async fn refresh_one<A: AppointmentApi + ?Sized>(
        &mut self,
        api: &A,
        id: i64,
    ) -> Result<Option<&Appointment>, ReconcileError> {
        match api.get(id).await {
            Ok(apt) => {
                if let Err(err) = self.check_fetched(id, &apt) {
                    warn!(appointment_id = id, error = %err, "refreshed appointment rejected");
                    self.stale.insert(id);
                    return Err(err);
                }
                self.stale.remove(&id);
                self.snapshots.insert(id, apt);
                Ok(self.snapshots.get(&id))
            }
            Err(RemoteError::NotFound(_)) => {
                self.stale.remove(&id);
                self.snapshots.remove(&id);
                Ok(None)
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Books a new appointment. The server must answer with a `pending`
    /// appointment; anything else is treated as rule drift.
    pub async fn book<A: AppointmentApi + ?Sized>(
        &mut self,
        api: &A,
        req: &CreateAppointmentRequest,
    ) -> Result<&Appointment, ReconcileError> {
        let apt = api.create(req).await?;
        if !apt.status.is_initial() {
            warn!(appointment_id = apt.id, status = %apt.status, "new appointment not pending");
            return Err(ReconcileError::RuleDrift {
                id: apt.id,
                expected: AppointmentStatus::Pending,
                actual: apt.status,
            });
        }
        let id = apt.id;
        self.stale.remove(&id);
        self.snapshots.insert(id, apt);
        Ok(&self.snapshots[&id])
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{Duration, Utc};
    use tokio::sync::Mutex;
    use uuid::Uuid;

    use super::*;
    use crate::models::fixtures::{appointment, DOCTOR_ID, PATIENT_ID};
    use crate::service::{AppointmentService, LocalApi};
    use crate::store::MemoryStore;

    /// Answers every update with a canned response.
    struct ScriptedApi {
        reply: Mutex<Option<Result<Appointment, RemoteError>>>,
    }

    impl ScriptedApi {
        fn replying(reply: Result<Appointment, RemoteError>) -> Self {
            Self {
                reply: Mutex::new(Some(reply)),
            }
        }
    }

    #[async_trait]
    impl AppointmentApi for ScriptedApi {
        async fn create(&self, _: &CreateAppointmentRequest) -> Result<Appointment, RemoteError> {
            self.next().await
        }
        async fn list(&self, _: Option<AppointmentStatus>) -> Result<Vec<Appointment>, RemoteError> {
            Err(RemoteError::Failure("offline".into()))
        }
        async fn get(&self, _: i64) -> Result<Appointment, RemoteError> {
            self.next().await
        }
        async fn update(&self, _: i64, _: &UpdateAppointmentRequest) -> Result<Appointment, RemoteError> {
            self.next().await
        }
        async fn delete(&self, _: i64) -> Result<(), RemoteError> {
            self.next().await.map(|_| ())
        }
    }

    impl ScriptedApi {
        async fn next(&self) -> Result<Appointment, RemoteError> {
            self.reply
                .lock()
                .await
                .take()
                .unwrap_or_else(|| Err(RemoteError::Failure("no scripted reply".into())))
        }
    }

    fn doctor_board(status: AppointmentStatus) -> AppointmentBoard {
        let mut board = AppointmentBoard::new(Actor::doctor(Uuid::new_v4(), DOCTOR_ID));
        board.load(vec![appointment(status)]);
        board
    }

    #[test]
    fn second_action_waits_for_the_first() {
        let mut board = doctor_board(AppointmentStatus::Pending);
        let pending = board.begin(1, Command::Confirm).unwrap();

        assert!(board.menu(1).is_empty());
        assert_eq!(
            board.begin(1, Command::Cancel).unwrap_err(),
            ReconcileError::ActionInFlight(1)
        );

        let mut confirmed = appointment(AppointmentStatus::Confirmed);
        confirmed.version = 2;
        board.settle(pending, Ok(Outcome::Updated(confirmed))).unwrap();

        assert!(!board.is_in_flight(1));
        assert!(board.menu(1).contains(Action::Complete));
    }

    #[test]
    fn begin_sends_only_legal_targets() {
        let mut board = doctor_board(AppointmentStatus::Pending);
        let pending = board.begin(1, Command::Confirm).unwrap();
        assert_eq!(
            pending.request(),
            &Request::Update(UpdateAppointmentRequest::status(AppointmentStatus::Confirmed))
        );
        board
            .settle(pending, Err(RemoteError::Failure("timeout".into())))
            .unwrap_err();

        let mut board = doctor_board(AppointmentStatus::Pending);
        assert!(matches!(
            board.begin(1, Command::Complete).unwrap_err(),
            ReconcileError::Workflow(WorkflowError::InvalidTransition { .. })
        ));
        assert!(!board.is_in_flight(1), "refused actions reserve nothing");
    }

    #[test]
    fn attach_before_confirmation_fails_locally() {
        let mut board = doctor_board(AppointmentStatus::Pending);
        let err = board
            .begin(
                1,
                Command::AttachDetails(ClinicalRecord {
                    notes: Some("n/a".into()),
                    ..Default::default()
                }),
            )
            .unwrap_err();
        assert!(matches!(
            err,
            ReconcileError::Workflow(WorkflowError::PreconditionFailed { .. })
        ));
    }

    #[tokio::test]
    async fn remote_failure_leaves_snapshot_and_blocks_menu() {
        let mut board = doctor_board(AppointmentStatus::Pending);
        let api = ScriptedApi::replying(Err(RemoteError::Failure("502 bad gateway".into())));

        let err = board.perform(&api, 1, Command::Confirm).await.unwrap_err();
        assert_eq!(err, ReconcileError::RemoteFailure("502 bad gateway".into()));
        assert_eq!(board.appointment(1).map(|a| a.status), Some(AppointmentStatus::Pending));
        assert!(board.is_stale(1));
        assert!(board.menu(1).is_empty());
        assert_eq!(
            board.begin(1, Command::Confirm).unwrap_err(),
            ReconcileError::StaleSnapshot(1)
        );
    }

    #[tokio::test]
    async fn unexpected_status_is_rule_drift() {
        let mut board = doctor_board(AppointmentStatus::Pending);
        let mut odd = appointment(AppointmentStatus::Cancelled);
        odd.version = 2;
        let api = ScriptedApi::replying(Ok(odd));

        let err = board.perform(&api, 1, Command::Confirm).await.unwrap_err();
        assert_eq!(
            err,
            ReconcileError::RuleDrift {
                id: 1,
                expected: AppointmentStatus::Confirmed,
                actual: AppointmentStatus::Cancelled,
            }
        );
        assert_eq!(board.appointment(1).map(|a| a.status), Some(AppointmentStatus::Pending));
        assert!(board.is_stale(1));
    }

    #[tokio::test]
    async fn response_must_advance_version() {
        let mut board = doctor_board(AppointmentStatus::Pending);
        let api = ScriptedApi::replying(Ok(appointment(AppointmentStatus::Confirmed)));

        let err = board.perform(&api, 1, Command::Confirm).await.unwrap_err();
        assert_eq!(
            err,
            ReconcileError::StaleResponse {
                id: 1,
                local: 1,
                remote: 1
            }
        );
    }

    #[tokio::test]
    async fn vanished_appointment_is_dropped_on_refresh() {
        let mut board = doctor_board(AppointmentStatus::Pending);
        let api = ScriptedApi::replying(Err(RemoteError::NotFound(1)));

        let err = board.perform(&api, 1, Command::Confirm).await.unwrap_err();
        assert_eq!(err, ReconcileError::NotFound(1));
        assert!(board.is_stale(1));

        let api = ScriptedApi::replying(Err(RemoteError::NotFound(1)));
        assert_eq!(board.refresh_one(&api, 1).await.unwrap(), None);
        assert!(board.appointment(1).is_none());
        assert!(!board.is_stale(1));
    }

    #[tokio::test]
    async fn failed_refresh_keeps_the_board() {
        let mut board = doctor_board(AppointmentStatus::Pending);
        let api = ScriptedApi::replying(Err(RemoteError::Failure("unused".into())));

        assert!(board.refresh(&api).await.is_err());
        assert_eq!(board.appointments().count(), 1);
    }

    fn completed_at_version_5() -> AppointmentBoard {
        let mut apt = appointment(AppointmentStatus::Completed);
        apt.version = 5;
        let mut board = AppointmentBoard::new(Actor::doctor(Uuid::new_v4(), DOCTOR_ID));
        board.load(vec![apt]);
        board
    }

    #[tokio::test]
    async fn refresh_rejects_another_appointment() {
        let mut board = completed_at_version_5();
        let mut other = appointment(AppointmentStatus::Pending);
        other.id = 99;
        let api = ScriptedApi::replying(Ok(other));

        assert_eq!(
            board.refresh_one(&api, 1).await.unwrap_err(),
            ReconcileError::MismatchedResponse {
                expected: 1,
                actual: 99
            }
        );
        let kept = board.appointment(1).unwrap();
        assert_eq!((kept.id, kept.status, kept.version), (1, AppointmentStatus::Completed, 5));
        assert!(board.appointment(99).is_none());
        assert!(board.is_stale(1));
        assert!(board.menu(1).is_empty());
    }

    #[tokio::test]
    async fn refresh_rejects_an_older_version() {
        let mut board = completed_at_version_5();
        let mut old = appointment(AppointmentStatus::Completed);
        old.version = 4;
        let api = ScriptedApi::replying(Ok(old));

        assert_eq!(
            board.refresh_one(&api, 1).await.unwrap_err(),
            ReconcileError::StaleResponse {
                id: 1,
                local: 5,
                remote: 4
            }
        );
        assert_eq!(board.appointment(1).map(|a| a.version), Some(5));
        assert!(board.is_stale(1));
    }

    #[tokio::test]
    async fn refresh_rejects_status_going_backwards() {
        let mut board = completed_at_version_5();
        let mut reopened = appointment(AppointmentStatus::Pending);
        reopened.version = 6;
        let api = ScriptedApi::replying(Ok(reopened));

        assert_eq!(
            board.refresh_one(&api, 1).await.unwrap_err(),
            ReconcileError::RuleDrift {
                id: 1,
                expected: AppointmentStatus::Completed,
                actual: AppointmentStatus::Pending,
            }
        );
        assert_eq!(
            board.appointment(1).map(|a| a.status),
            Some(AppointmentStatus::Completed)
        );
        assert!(board.is_stale(1));
        assert!(board.menu(1).is_empty());
    }

    #[tokio::test]
    async fn refresh_rejects_a_status_change_without_a_new_version() {
        let mut board = doctor_board(AppointmentStatus::Pending);
        let api = ScriptedApi::replying(Ok(appointment(AppointmentStatus::Confirmed)));

        assert!(matches!(
            board.refresh_one(&api, 1).await.unwrap_err(),
            ReconcileError::RuleDrift { .. }
        ));
        assert!(board.is_stale(1));
    }

    #[tokio::test]
    async fn refresh_accepts_forward_progress_and_clears_stale() {
        let mut board = doctor_board(AppointmentStatus::Pending);
        let api = ScriptedApi::replying(Err(RemoteError::Failure("timeout".into())));
        board.perform(&api, 1, Command::Confirm).await.unwrap_err();
        assert!(board.is_stale(1));

        // confirmed and completed elsewhere in the meantime
        let mut done = appointment(AppointmentStatus::Completed);
        done.version = 3;
        let api = ScriptedApi::replying(Ok(done));
        let fresh = board.refresh_one(&api, 1).await.unwrap().cloned().unwrap();

        assert_eq!((fresh.status, fresh.version), (AppointmentStatus::Completed, 3));
        assert!(!board.is_stale(1));
        assert!(board.menu(1).is_empty());
    }

    #[test]
    fn settle_after_reload_does_not_resurrect() {
        let mut board = doctor_board(AppointmentStatus::Pending);
        let pending = board.begin(1, Command::Confirm).unwrap();
        board.load(Vec::new());

        let mut confirmed = appointment(AppointmentStatus::Confirmed);
        confirmed.version = 2;
        let err = board
            .settle(pending, Ok(Outcome::Updated(confirmed)))
            .unwrap_err();

        assert_eq!(err, ReconcileError::UnknownAppointment(1));
        assert!(board.appointment(1).is_none());
        assert!(!board.is_in_flight(1));
        assert!(board.menu(1).is_empty());
    }

    #[test]
    fn settle_rejects_a_response_older_than_a_reload() {
        let mut board = doctor_board(AppointmentStatus::Pending);
        let pending = board.begin(1, Command::Confirm).unwrap();
        let mut newer = appointment(AppointmentStatus::Pending);
        newer.version = 4;
        board.load(vec![newer]);

        let mut confirmed = appointment(AppointmentStatus::Confirmed);
        confirmed.version = 2;
        assert_eq!(
            board.settle(pending, Ok(Outcome::Updated(confirmed))).unwrap_err(),
            ReconcileError::StaleResponse {
                id: 1,
                local: 4,
                remote: 2
            }
        );
        assert_eq!(board.appointment(1).map(|a| a.version), Some(4));
    }

    #[tokio::test]
    async fn externally_recorded_no_show_offers_only_admin_delete() {
        let store = MemoryStore::with_doctors([DOCTOR_ID]);
        store.put_raw(appointment(AppointmentStatus::NoShow)).await;
        let service = Arc::new(AppointmentService::new(store, 100));

        for (actor, expected) in [
            (Actor::patient(Uuid::new_v4(), PATIENT_ID), ActionSet::empty()),
            (Actor::doctor(Uuid::new_v4(), DOCTOR_ID), ActionSet::empty()),
            (
                Actor::admin(Uuid::new_v4()),
                [Action::Delete].into_iter().collect::<ActionSet>(),
            ),
        ] {
            let api = LocalApi::new(service.clone(), actor.clone());
            let mut board = AppointmentBoard::new(actor);
            board.refresh(&api).await.unwrap();

            assert_eq!(
                board.appointment(1).map(|a| a.status),
                Some(AppointmentStatus::NoShow)
            );
            assert_eq!(board.menu(1), expected);
        }
    }

    #[tokio::test]
    async fn booking_must_come_back_pending() {
        let mut board = AppointmentBoard::new(Actor::patient(Uuid::new_v4(), PATIENT_ID));
        let req = CreateAppointmentRequest {
            doctor_id: DOCTOR_ID,
            appointment_date: Utc::now() + Duration::days(1),
            reason: None,
        };
        let api = ScriptedApi::replying(Ok(appointment(AppointmentStatus::Confirmed)));

        assert!(matches!(
            board.book(&api, &req).await.unwrap_err(),
            ReconcileError::RuleDrift { .. }
        ));
        assert_eq!(board.appointments().count(), 0);
    }

    #[tokio::test]
    async fn full_visit_against_the_service() {
        let service = Arc::new(AppointmentService::new(MemoryStore::with_doctors([DOCTOR_ID]), 100));
        let patient = Actor::patient(Uuid::new_v4(), PATIENT_ID);
        let doctor = Actor::doctor(Uuid::new_v4(), DOCTOR_ID);
        let admin = Actor::admin(Uuid::new_v4());
        let patient_api = LocalApi::new(service.clone(), patient.clone());
        let doctor_api = LocalApi::new(service.clone(), doctor.clone());
        let admin_api = LocalApi::new(service.clone(), admin.clone());

        let mut patient_board = AppointmentBoard::new(patient);
        let id = patient_board
            .book(
                &patient_api,
                &CreateAppointmentRequest {
                    doctor_id: DOCTOR_ID,
                    appointment_date: Utc::now() + Duration::days(3),
                    reason: Some("knee pain".into()),
                },
            )
            .await
            .unwrap()
            .id;
        assert_eq!(
            patient_board.menu(id),
            [Action::Cancel].into_iter().collect::<ActionSet>()
        );

        let mut doctor_board = AppointmentBoard::new(doctor);
        doctor_board.refresh(&doctor_api).await.unwrap();
        assert_eq!(
            doctor_board.menu(id),
            [Action::Confirm, Action::Cancel].into_iter().collect::<ActionSet>()
        );

        doctor_board.perform(&doctor_api, id, Command::Confirm).await.unwrap();
        assert_eq!(
            doctor_board.menu(id),
            [Action::Complete, Action::AttachDetails].into_iter().collect::<ActionSet>()
        );

        let saved = doctor_board
            .attach_details(
                &doctor_api,
                id,
                ClinicalRecord {
                    diagnosis: Some("patellar tendinitis".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap()
            .cloned()
            .unwrap();
        assert_eq!(saved.version, 3);

        let done = doctor_board
            .perform(&doctor_api, id, Command::Complete)
            .await
            .unwrap()
            .cloned()
            .unwrap();
        assert_eq!(done.status, AppointmentStatus::Completed);
        assert!(doctor_board.menu(id).is_empty());

        // the patient's snapshot is still pending: the server refuses the
        // cancel and the board keeps its copy until refreshed
        let err = patient_board
            .perform(&patient_api, id, Command::Cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, ReconcileError::RemoteFailure(_)));
        assert_eq!(
            patient_board.appointment(id).map(|a| a.status),
            Some(AppointmentStatus::Pending)
        );
        patient_board.refresh(&patient_api).await.unwrap();
        assert!(patient_board.menu(id).is_empty());

        let mut admin_board = AppointmentBoard::new(admin);
        admin_board.refresh(&admin_api).await.unwrap();
        assert_eq!(
            admin_board.menu(id),
            [Action::Delete].into_iter().collect::<ActionSet>()
        );
        admin_board.delete(&admin_api, id).await.unwrap();
        assert!(admin_board.appointment(id).is_none());
    }
}
