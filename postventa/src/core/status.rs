//! Status state machines for claims, appointments, visits and debris requests.
//!
//! Each entity has exactly one transition function (`apply`). Callers never
//! assign a status directly; they submit an event and store the result.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A rejected transition: `event` is not legal while the entity is in `from`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{entity} in state '{from}' does not accept '{event}'")]
pub struct TransitionError {
    pub entity: &'static str,
    pub from: &'static str,
    pub event: &'static str,
}

/// Lifecycle of a warranty claim.
///
/// Legacy vocabulary is accepted on read (`pendiente`, `en_ejecucion`,
/// `completado`) and normalized on write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ClaimStatus {
    #[serde(rename = "ingresado", alias = "pendiente")]
    Filed,
    #[serde(rename = "asignado")]
    Assigned,
    #[serde(rename = "en_proceso", alias = "en_ejecucion")]
    InProgress,
    #[serde(rename = "resuelto", alias = "completado")]
    Resolved,
    #[serde(rename = "cerrado")]
    Closed,
    #[serde(rename = "cancelado")]
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimEvent {
    Assign,
    VisitCompleted { resolved: bool },
    Close,
    Cancel,
}

impl ClaimEvent {
    fn label(self) -> &'static str {
        match self {
            ClaimEvent::Assign => "assign",
            ClaimEvent::VisitCompleted { resolved: false } => "visit_completed",
            ClaimEvent::VisitCompleted { resolved: true } => "visit_completed_resolved",
            ClaimEvent::Close => "close",
            ClaimEvent::Cancel => "cancel",
        }
    }
}

impl ClaimStatus {
    pub fn apply(self, event: ClaimEvent) -> Result<ClaimStatus, TransitionError> {
        use ClaimStatus::{Assigned, Cancelled, Closed, Filed, InProgress, Resolved};
        let next = match (self, event) {
            (Filed | Assigned, ClaimEvent::Assign) => Some(Assigned),
            (InProgress, ClaimEvent::Assign) => Some(InProgress),
            (Assigned | InProgress, ClaimEvent::VisitCompleted { resolved: false }) => {
                Some(InProgress)
            }
            (Assigned | InProgress, ClaimEvent::VisitCompleted { resolved: true }) => {
                Some(Resolved)
            }
            (Resolved, ClaimEvent::Close) => Some(Closed),
            (Filed | Assigned | InProgress, ClaimEvent::Cancel) => Some(Cancelled),
            _ => None,
        };
        next.ok_or(TransitionError {
            entity: "claim",
            from: self.as_str(),
            event: event.label(),
        })
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ClaimStatus::Filed => "ingresado",
            ClaimStatus::Assigned => "asignado",
            ClaimStatus::InProgress => "en_proceso",
            ClaimStatus::Resolved => "resuelto",
            ClaimStatus::Closed => "cerrado",
            ClaimStatus::Cancelled => "cancelado",
        }
    }

    /// Still waiting on work (not resolved, closed or cancelled).
    pub fn is_open(self) -> bool {
        matches!(
            self,
            ClaimStatus::Filed | ClaimStatus::Assigned | ClaimStatus::InProgress
        )
    }

    /// Work finished, whether or not the paperwork is closed.
    pub fn is_resolved(self) -> bool {
        matches!(self, ClaimStatus::Resolved | ClaimStatus::Closed)
    }
}

impl fmt::Display for ClaimStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle of a scheduled technician visit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AppointmentStatus {
    #[serde(rename = "pendiente")]
    Pending,
    #[serde(rename = "confirmada")]
    Confirmed,
    #[serde(rename = "en_curso")]
    InCourse,
    #[serde(rename = "completada")]
    Completed,
    #[serde(rename = "cancelada")]
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppointmentEvent {
    Confirm,
    Start,
    Complete,
    Cancel,
    /// Retire this appointment in favour of a new one at another time.
    Reschedule,
}

impl AppointmentEvent {
    fn label(self) -> &'static str {
        match self {
            AppointmentEvent::Confirm => "confirm",
            AppointmentEvent::Start => "start",
            AppointmentEvent::Complete => "complete",
            AppointmentEvent::Cancel => "cancel",
            AppointmentEvent::Reschedule => "reschedule",
        }
    }
}

impl AppointmentStatus {
    pub fn apply(self, event: AppointmentEvent) -> Result<AppointmentStatus, TransitionError> {
        use AppointmentStatus::{Cancelled, Completed, Confirmed, InCourse, Pending};
        let next = match (self, event) {
            (Pending, AppointmentEvent::Confirm) => Some(Confirmed),
            (Pending | Confirmed, AppointmentEvent::Start) => Some(InCourse),
            (InCourse, AppointmentEvent::Complete) => Some(Completed),
            (Pending | Confirmed, AppointmentEvent::Cancel | AppointmentEvent::Reschedule) => {
                Some(Cancelled)
            }
            _ => None,
        };
        next.ok_or(TransitionError {
            entity: "appointment",
            from: self.as_str(),
            event: event.label(),
        })
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AppointmentStatus::Pending => "pendiente",
            AppointmentStatus::Confirmed => "confirmada",
            AppointmentStatus::InCourse => "en_curso",
            AppointmentStatus::Completed => "completada",
            AppointmentStatus::Cancelled => "cancelada",
        }
    }

    /// Occupies the technician's calendar.
    pub fn is_active(self) -> bool {
        matches!(
            self,
            AppointmentStatus::Pending | AppointmentStatus::Confirmed | AppointmentStatus::InCourse
        )
    }
}

impl fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VisitStatus {
    #[serde(rename = "en_curso")]
    InCourse,
    #[serde(rename = "completada")]
    Completed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VisitEvent {
    Close,
}

impl VisitStatus {
    pub fn apply(self, event: VisitEvent) -> Result<VisitStatus, TransitionError> {
        match (self, event) {
            (VisitStatus::InCourse, VisitEvent::Close) => Ok(VisitStatus::Completed),
            (VisitStatus::Completed, VisitEvent::Close) => Err(TransitionError {
                entity: "visit",
                from: self.as_str(),
                event: "close",
            }),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            VisitStatus::InCourse => "en_curso",
            VisitStatus::Completed => "completada",
        }
    }
}

/// Lifecycle of a debris-removal request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DebrisStatus {
    #[serde(rename = "pendiente")]
    Pending,
    #[serde(rename = "programado")]
    Scheduled,
    #[serde(rename = "completado")]
    Completed,
    #[serde(rename = "cancelado")]
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebrisEvent {
    Approve,
    Reject,
    Complete,
}

impl DebrisEvent {
    fn label(self) -> &'static str {
        match self {
            DebrisEvent::Approve => "approve",
            DebrisEvent::Reject => "reject",
            DebrisEvent::Complete => "complete",
        }
    }
}

impl DebrisStatus {
    pub fn apply(self, event: DebrisEvent) -> Result<DebrisStatus, TransitionError> {
        use DebrisStatus::{Cancelled, Completed, Pending, Scheduled};
        let next = match (self, event) {
            (Pending | Scheduled, DebrisEvent::Approve) => Some(Scheduled),
            (Pending | Scheduled, DebrisEvent::Reject) => Some(Cancelled),
            (Scheduled, DebrisEvent::Complete) => Some(Completed),
            _ => None,
        };
        next.ok_or(TransitionError {
            entity: "debris",
            from: self.as_str(),
            event: event.label(),
        })
    }

    pub fn as_str(self) -> &'static str {
        match self {
            DebrisStatus::Pending => "pendiente",
            DebrisStatus::Scheduled => "programado",
            DebrisStatus::Completed => "completado",
            DebrisStatus::Cancelled => "cancelado",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn claim_happy_path_reaches_closed() {
        let status = ClaimStatus::Filed
            .apply(ClaimEvent::Assign)
            .and_then(|s| s.apply(ClaimEvent::VisitCompleted { resolved: false }))
            .and_then(|s| s.apply(ClaimEvent::VisitCompleted { resolved: true }))
            .and_then(|s| s.apply(ClaimEvent::Close))
            .expect("legal path");
        assert_eq!(status, ClaimStatus::Closed);
    }

    #[test]
    fn reassigning_in_progress_claim_keeps_progress() {
        assert_eq!(
            ClaimStatus::InProgress.apply(ClaimEvent::Assign),
            Ok(ClaimStatus::InProgress)
        );
    }

    #[test]
    fn finished_claims_reject_cancel() {
        for from in [
            ClaimStatus::Resolved,
            ClaimStatus::Closed,
            ClaimStatus::Cancelled,
        ] {
            let err = from.apply(ClaimEvent::Cancel).expect_err("must reject");
            assert_eq!(err.event, "cancel");
            assert_eq!(err.from, from.as_str());
        }
    }

    #[test]
    fn visit_cannot_complete_unassigned_claim() {
        let err = ClaimStatus::Filed
            .apply(ClaimEvent::VisitCompleted { resolved: true })
            .expect_err("no technician yet");
        assert_eq!(
            err.to_string(),
            "claim in state 'ingresado' does not accept 'visit_completed_resolved'"
        );
    }

    #[test]
    fn legacy_claim_vocabulary_is_read_and_normalized() {
        let parsed: Vec<ClaimStatus> =
            serde_json::from_str(r#"["pendiente","en_ejecucion","completado"]"#).expect("parse");
        assert_eq!(
            parsed,
            vec![
                ClaimStatus::Filed,
                ClaimStatus::InProgress,
                ClaimStatus::Resolved
            ]
        );
        let written = serde_json::to_string(&parsed).expect("serialize");
        assert_eq!(written, r#"["ingresado","en_proceso","resuelto"]"#);
    }

    #[test]
    fn in_course_appointment_cannot_be_rescheduled_or_cancelled() {
        assert!(
            AppointmentStatus::InCourse
                .apply(AppointmentEvent::Reschedule)
                .is_err()
        );
        assert!(
            AppointmentStatus::InCourse
                .apply(AppointmentEvent::Cancel)
                .is_err()
        );
    }

    #[test]
    fn appointment_must_start_before_completing() {
        assert!(
            AppointmentStatus::Confirmed
                .apply(AppointmentEvent::Complete)
                .is_err()
        );
        let done = AppointmentStatus::Pending
            .apply(AppointmentEvent::Start)
            .and_then(|s| s.apply(AppointmentEvent::Complete));
        assert_eq!(done, Ok(AppointmentStatus::Completed));
    }

    #[test]
    fn active_appointments_block_the_calendar() {
        assert!(AppointmentStatus::InCourse.is_active());
        assert!(!AppointmentStatus::Cancelled.is_active());
        assert!(!AppointmentStatus::Completed.is_active());
    }

    #[test]
    fn visit_closes_once() {
        let closed = VisitStatus::InCourse.apply(VisitEvent::Close).expect("close");
        assert!(closed.apply(VisitEvent::Close).is_err());
    }

    #[test]
    fn debris_reapproval_is_allowed_but_completion_is_final() {
        let scheduled = DebrisStatus::Pending
            .apply(DebrisEvent::Approve)
            .expect("approve");
        assert_eq!(
            scheduled.apply(DebrisEvent::Approve),
            Ok(DebrisStatus::Scheduled)
        );
        let completed = scheduled.apply(DebrisEvent::Complete).expect("complete");
        assert!(completed.apply(DebrisEvent::Reject).is_err());
        assert!(DebrisStatus::Pending.apply(DebrisEvent::Complete).is_err());
    }
}
