//! Role-gated action menus.
//!
//! The menu for `(role, appointment, owner)` is a pure function of its
//! inputs. Transition actions in a menu always succeed under
//! [`crate::lifecycle::transition`]; `delete` and `attach_details` are
//! checked against the status directly.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::WorkflowError;
use crate::lifecycle::{next_status, AppointmentStatus, Transition};
use crate::models::{Appointment, ClinicalRecord, Role};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Confirm,
    Cancel,
    Complete,
    Delete,
    AttachDetails,
}

impl Action {
    pub const ALL: [Action; 5] = [
        Action::Confirm,
        Action::Cancel,
        Action::Complete,
        Action::Delete,
        Action::AttachDetails,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Action::Confirm => "confirm",
            Action::Cancel => "cancel",
            Action::Complete => "complete",
            Action::Delete => "delete",
            Action::AttachDetails => "attach_details",
        }
    }

    /// The graph edge behind this action, if it is one.
    pub fn transition(self) -> Option<Transition> {
        match self {
            Action::Confirm => Some(Transition::Confirm),
            Action::Cancel => Some(Transition::Cancel),
            Action::Complete => Some(Transition::Complete),
            Action::Delete | Action::AttachDetails => None,
        }
    }
}

impl From<Transition> for Action {
    fn from(t: Transition) -> Self {
        match t {
            Transition::Confirm => Action::Confirm,
            Transition::Cancel => Action::Cancel,
            Transition::Complete => Action::Complete,
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An action menu. Serializes as a sorted list of action names.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ActionSet(BTreeSet<Action>);

impl ActionSet {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn contains(&self, action: Action) -> bool {
        self.0.contains(&action)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = Action> + '_ {
        self.0.iter().copied()
    }
}

impl FromIterator<Action> for ActionSet {
    fn from_iter<I: IntoIterator<Item = Action>>(iter: I) -> Self {
        ActionSet(iter.into_iter().collect())
    }
}

/// The actions `role` may invoke on `appointment` right now.
pub fn available_actions(role: Role, appointment: &Appointment, is_owner: bool) -> ActionSet {
    use AppointmentStatus::*;

    let actions: &[Action] = match (role, appointment.status) {
        (Role::Doctor, Pending) => &[Action::Confirm, Action::Cancel],
        (Role::Doctor, Confirmed) => &[Action::Complete, Action::AttachDetails],
        (Role::Doctor, Completed | Cancelled | NoShow) => &[],
        (Role::Patient, Pending | Confirmed) if is_owner => &[Action::Cancel],
        (Role::Patient, Cancelled) if is_owner => &[Action::Delete],
        (Role::Patient, _) => &[],
        // admins only ever delete
        (Role::Admin, _) => &[Action::Delete],
    };
    actions.iter().copied().collect()
}

/// Checks a single action against the menu and explains a refusal.
///
/// Graph violations win over role checks, so a cancel on a completed
/// appointment reports `InvalidTransition` whoever asks.
pub fn authorize(
    role: Role,
    appointment: &Appointment,
    is_owner: bool,
    action: Action,
) -> Result<(), WorkflowError> {
    if available_actions(role, appointment, is_owner).contains(action) {
        return Ok(());
    }

    let status = appointment.status;
    match action {
        Action::AttachDetails if role == Role::Doctor && status != AppointmentStatus::Confirmed => {
            Err(WorkflowError::PreconditionFailed {
                action,
                required: AppointmentStatus::Confirmed,
                status,
            })
        }
        Action::Delete
            if role == Role::Patient && is_owner && status != AppointmentStatus::Cancelled =>
        {
            Err(WorkflowError::PreconditionFailed {
                action,
                required: AppointmentStatus::Cancelled,
                status,
            })
        }
        _ => {
            if let Some(t) = action.transition() {
                next_status(status, t)?;
            }
            Err(WorkflowError::Unauthorized { role, action })
        }
    }
}

/// Merges `update` into the appointment's clinical record.
///
/// Only a confirmed appointment accepts clinical content. Provided fields
/// overwrite, absent fields keep their previous value.
pub fn attach_clinical_record(
    appointment: &Appointment,
    update: &ClinicalRecord,
) -> Result<Appointment, WorkflowError> {
    if appointment.status != AppointmentStatus::Confirmed {
        return Err(WorkflowError::PreconditionFailed {
            action: Action::AttachDetails,
            required: AppointmentStatus::Confirmed,
            status: appointment.status,
        });
    }
    if update.is_empty() {
        return Err(WorkflowError::EmptyClinicalUpdate);
    }

    let mut next = appointment.clone();
    next.clinical_record
        .get_or_insert_with(ClinicalRecord::default)
        .merge(update);
    next.version += 1;
    Ok(next)
}
