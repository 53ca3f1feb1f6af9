//! Appointment status lifecycle.
//!
//! Five statuses, four edges:
//!
//! ```text
//! pending --confirm--> confirmed --complete--> completed
//!    |                     |
//!    +------cancel---------+--cancel--> cancelled
//! ```
//!
//! `no_show` is terminal and has no inbound edge here; only the external
//! system ever reports it.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::actions::Action;
use crate::error::WorkflowError;
use crate::models::Appointment;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentStatus {
    Pending,
    Confirmed,
    Completed,
    Cancelled,
    NoShow,
}

impl AppointmentStatus {
    pub const ALL: [AppointmentStatus; 5] = [
        AppointmentStatus::Pending,
        AppointmentStatus::Confirmed,
        AppointmentStatus::Completed,
        AppointmentStatus::Cancelled,
        AppointmentStatus::NoShow,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            AppointmentStatus::Pending => "pending",
            AppointmentStatus::Confirmed => "confirmed",
            AppointmentStatus::Completed => "completed",
            AppointmentStatus::Cancelled => "cancelled",
            AppointmentStatus::NoShow => "no_show",
        }
    }

    pub fn is_initial(self) -> bool {
        self == AppointmentStatus::Pending
    }

    pub fn is_terminal(self) -> bool {
        self.legal_transitions().is_empty()
    }

    /// Outgoing edges of this status.
    pub fn legal_transitions(self) -> &'static [Transition] {
        match self {
            AppointmentStatus::Pending => &[Transition::Confirm, Transition::Cancel],
            AppointmentStatus::Confirmed => &[Transition::Complete, Transition::Cancel],
            AppointmentStatus::Completed
            | AppointmentStatus::Cancelled
            | AppointmentStatus::NoShow => &[],
        }
    }

    /// True if `to` follows `self` through one or more edges.
    pub fn can_reach(self, to: AppointmentStatus) -> bool {
        self.legal_transitions().iter().any(|t| match next_status(self, *t) {
            Ok(next) => next == to || next.can_reach(to),
            Err(_) => false,
        })
    }
}

impl fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown appointment status: {0}")]
pub struct UnknownStatus(pub String);

impl FromStr for AppointmentStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AppointmentStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| UnknownStatus(s.to_string()))
    }
}

/// The named triggers of the graph. `delete` and `attachDetails` are not
/// edges and live in [`Action`] only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Transition {
    Confirm,
    Cancel,
    Complete,
}

impl Transition {
    pub const ALL: [Transition; 3] = [Transition::Confirm, Transition::Cancel, Transition::Complete];
}

/// Target status of `transition` applied to `from`.
pub fn next_status(
    from: AppointmentStatus,
    transition: Transition,
) -> Result<AppointmentStatus, WorkflowError> {
    use AppointmentStatus::*;

    match (from, transition) {
        (Pending, Transition::Confirm) => Ok(Confirmed),
        (Pending | Confirmed, Transition::Cancel) => Ok(Cancelled),
        (Confirmed, Transition::Complete) => Ok(Completed),
        _ => Err(WorkflowError::InvalidTransition {
            from,
            action: Action::from(transition),
        }),
    }
}

/// The trigger whose edge leads from `from` to `to`, if one exists.
pub fn trigger_for(
    from: AppointmentStatus,
    to: AppointmentStatus,
) -> Result<Transition, WorkflowError> {
    Transition::ALL
        .into_iter()
        .find(|t| next_status(from, *t) == Ok(to))
        .ok_or(WorkflowError::UnreachableStatus { from, to })
}

/// Applies `transition` to a snapshot. The input is left untouched; the
/// returned snapshot carries the new status and an advanced version.
pub fn transition(
    appointment: &Appointment,
    transition: Transition,
) -> Result<Appointment, WorkflowError> {
    let status = next_status(appointment.status, transition)?;
    let mut next = appointment.clone();
    next.status = status;
    next.version += 1;
    Ok(next)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::fixtures::appointment;

    const EDGES: [(AppointmentStatus, Transition, AppointmentStatus); 4] = [
        (AppointmentStatus::Pending, Transition::Confirm, AppointmentStatus::Confirmed),
        (AppointmentStatus::Pending, Transition::Cancel, AppointmentStatus::Cancelled),
        (AppointmentStatus::Confirmed, Transition::Complete, AppointmentStatus::Completed),
        (AppointmentStatus::Confirmed, Transition::Cancel, AppointmentStatus::Cancelled),
    ];

    #[test]
    fn only_table_edges_are_legal() {
        for from in AppointmentStatus::ALL {
            for t in Transition::ALL {
                let expected = EDGES
                    .iter()
                    .find(|(f, tr, _)| *f == from && *tr == t)
                    .map(|(_, _, to)| *to);
                match expected {
                    Some(to) => assert_eq!(next_status(from, t), Ok(to)),
                    None => assert!(
                        next_status(from, t).is_err_and(|e| e.is_invalid_transition()),
                        "{from} --{t:?}--> should be rejected"
                    ),
                }
            }
        }
    }

    #[test]
    fn completed_is_terminal() {
        let done = appointment(AppointmentStatus::Completed);
        assert_eq!(
            transition(&done, Transition::Cancel),
            Err(WorkflowError::InvalidTransition {
                from: AppointmentStatus::Completed,
                action: Action::Cancel,
            })
        );
    }

    #[test]
    fn terminal_and_initial_states() {
        assert!(AppointmentStatus::Pending.is_initial());
        assert!(!AppointmentStatus::Confirmed.is_initial());

        let terminal: Vec<_> = AppointmentStatus::ALL
            .into_iter()
            .filter(|s| s.is_terminal())
            .collect();
        assert_eq!(
            terminal,
            vec![
                AppointmentStatus::Completed,
                AppointmentStatus::Cancelled,
                AppointmentStatus::NoShow
            ]
        );
    }

    #[test]
    fn reachability_follows_edges_forward_only() {
        use AppointmentStatus::*;

        assert!(Pending.can_reach(Confirmed));
        assert!(Pending.can_reach(Completed));
        assert!(Pending.can_reach(Cancelled));
        assert!(Confirmed.can_reach(Completed));
        assert!(!Completed.can_reach(Pending));
        assert!(!Confirmed.can_reach(Pending));
        assert!(!Cancelled.can_reach(Confirmed));
        for status in AppointmentStatus::ALL {
            assert!(!status.can_reach(status), "{status} loops");
            assert!(!status.can_reach(NoShow));
        }
    }

    #[test]
    fn no_show_is_never_a_target() {
        for from in AppointmentStatus::ALL {
            assert!(trigger_for(from, AppointmentStatus::NoShow).is_err());
        }
    }

    #[test]
    fn trigger_for_inverts_the_table() {
        for (from, t, to) in EDGES {
            assert_eq!(trigger_for(from, to), Ok(t));
        }
        assert_eq!(
            trigger_for(AppointmentStatus::Pending, AppointmentStatus::Completed),
            Err(WorkflowError::UnreachableStatus {
                from: AppointmentStatus::Pending,
                to: AppointmentStatus::Completed,
            })
        );
    }

    #[test]
    fn transition_advances_version_and_keeps_input() {
        let pending = appointment(AppointmentStatus::Pending);
        let confirmed = transition(&pending, Transition::Confirm).unwrap();

        assert_eq!(pending.status, AppointmentStatus::Pending);
        assert_eq!(confirmed.status, AppointmentStatus::Confirmed);
        assert_eq!(confirmed.version, pending.version + 1);
        assert_eq!(confirmed.id, pending.id);
    }

    #[test]
    fn status_wire_names_round_trip() {
        assert_eq!("no_show".parse::<AppointmentStatus>(), Ok(AppointmentStatus::NoShow));
        assert_eq!(
            "archived".parse::<AppointmentStatus>().unwrap_err().to_string(),
            "unknown appointment status: archived"
        );
        assert_eq!(
            serde_json::to_string(&AppointmentStatus::NoShow).unwrap(),
            "\"no_show\""
        );
    }
}
