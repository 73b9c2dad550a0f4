//! Domain event fan-out.
//!
//! Events arrive from the CRUD clients over the same WebSocket channel. Each
//! event type maps to a recipient rule; targets named in the payload are read
//! from `maBS` (doctor) and `maBN` (patient). Delivery is at most once.

use serde_json::Value;
use tracing::warn;

use crate::ws::{ADMIN_ID, ClientMessage, EventSender, ParticipantId, ServerMessage};

/// Payload key naming the doctor.
pub const DOCTOR_KEY: &str = "maBS";
/// Payload key naming the patient.
pub const PATIENT_KEY: &str = "maBN";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    NewAppointment,
    CancelAppointment,
    AppointmentExamined,
    InteractPatient,
    InteractDrug,
    InteractRecord,
    InteractExam,
    CreatedSchedule,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NewAppointment => "new_appointment",
            Self::CancelAppointment => "cancel_appointment",
            Self::AppointmentExamined => "appointment_examined",
            Self::InteractPatient => "interact_patient",
            Self::InteractDrug => "interact_drug",
            Self::InteractRecord => "interact_record",
            Self::InteractExam => "interact_exam",
            Self::CreatedSchedule => "created_schedule",
        }
    }
}

/// A domain event as received; `sender` is absent only for `new_appointment`.
#[derive(Debug, Clone, PartialEq)]
pub struct DomainEvent {
    pub kind: EventKind,
    pub sender: Option<EventSender>,
    pub data: Value,
}

impl DomainEvent {
    /// Split a domain event off an inbound message. Chat and identity
    /// messages come back unchanged in `Err`.
    pub fn from_client(message: ClientMessage) -> Result<Self, ClientMessage> {
        let (kind, sender, data) = match message {
            ClientMessage::NewAppointment { data } => (EventKind::NewAppointment, None, data),
            ClientMessage::CancelAppointment { sender, data } => {
                (EventKind::CancelAppointment, Some(sender), data)
            }
            ClientMessage::AppointmentExamined { sender, data } => {
                (EventKind::AppointmentExamined, Some(sender), data)
            }
            ClientMessage::InteractPatient { sender, data } => {
                (EventKind::InteractPatient, Some(sender), data)
            }
            ClientMessage::InteractDrug { sender, data } => {
                (EventKind::InteractDrug, Some(sender), data)
            }
            ClientMessage::InteractRecord { sender, data } => {
                (EventKind::InteractRecord, Some(sender), data)
            }
            ClientMessage::InteractExam { sender, data } => {
                (EventKind::InteractExam, Some(sender), data)
            }
            ClientMessage::CreatedSchedule { sender, data } => {
                (EventKind::CreatedSchedule, Some(sender), data)
            }
            other => return Err(other),
        };
        Ok(Self { kind, sender, data })
    }
}

/// Recipient selection rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Audience {
    /// The doctor registered under this code
    Doctor(ParticipantId),
    /// The patient registered under this code
    Patient(ParticipantId),
    Admin,
    /// Every connected doctor (not the admin desk)
    AllDoctors,
    /// Every connected doctor plus the admin desk
    AllStaff,
}

/// What to send and to whom.
#[derive(Debug, Clone, PartialEq)]
pub struct FanoutPlan {
    pub message: ServerMessage,
    pub audiences: Vec<Audience>,
}

fn target(data: &Value, key: &str, kind: EventKind) -> Option<ParticipantId> {
    match data.get(key) {
        Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => {
            warn!(event = kind.as_str(), key, "event payload has no target id, recipient skipped");
            None
        }
    }
}

/// Resolve an event to its outbound envelope and audiences.
///
/// `None` when the (type, sender) pair has no routing rule.
pub fn plan(event: &DomainEvent) -> Option<FanoutPlan> {
    use EventKind::*;
    use EventSender::{Admin, Doctor};

    let data = event.data.clone();
    let doctor = || target(&event.data, DOCTOR_KEY, event.kind).map(Audience::Doctor);
    let patient = || target(&event.data, PATIENT_KEY, event.kind).map(Audience::Patient);

    let (message, audiences) = match (event.kind, event.sender) {
        (NewAppointment, _) => (
            ServerMessage::AppointmentUpdate { data },
            [doctor(), Some(Audience::Admin)].into_iter().flatten().collect(),
        ),
        (CancelAppointment, Some(Admin)) => (
            ServerMessage::AppointmentCancelled { data },
            [patient(), doctor()].into_iter().flatten().collect(),
        ),
        (AppointmentExamined, Some(Doctor)) => (
            ServerMessage::AppointmentExamined { data },
            [patient(), Some(Audience::Admin)].into_iter().flatten().collect(),
        ),
        (InteractPatient, Some(Doctor)) => {
            (ServerMessage::PatientUpdate { data }, vec![Audience::Admin])
        }
        (InteractPatient, Some(Admin)) => {
            (ServerMessage::PatientUpdate { data }, vec![Audience::AllDoctors])
        }
        (InteractDrug, Some(Doctor)) => {
            (ServerMessage::DrugUpdate { data }, vec![Audience::AllStaff])
        }
        (InteractDrug, Some(Admin)) => {
            (ServerMessage::DrugUpdate { data }, vec![Audience::AllDoctors])
        }
        (InteractRecord, Some(Doctor)) => {
            (ServerMessage::RecordCreated { data }, vec![Audience::Admin])
        }
        (InteractExam, Some(Doctor)) => {
            (ServerMessage::ExamCreated { data }, vec![Audience::Admin])
        }
        (CreatedSchedule, Some(Admin)) => (
            ServerMessage::CreatedSchedule { data },
            doctor().into_iter().collect(),
        ),
        _ => return None,
    };
    Some(FanoutPlan { message, audiences })
}

/// Expand audiences to concrete participant ids, in order, without duplicates.
///
/// `doctors` is the list of connected doctor ids.
pub fn resolve(
    audiences: &[Audience],
    doctors: &[ParticipantId],
) -> Vec<(ParticipantId, Audience)> {
    let mut out: Vec<(ParticipantId, Audience)> = Vec::new();
    let mut push = |id: &str, audience: &Audience| {
        if !out.iter().any(|(seen, _)| seen == id) {
            out.push((id.to_string(), audience.clone()));
        }
    };
    for audience in audiences {
        match audience {
            Audience::Doctor(id) | Audience::Patient(id) => push(id.as_str(), audience),
            Audience::Admin => push(ADMIN_ID, audience),
            Audience::AllDoctors => {
                for id in doctors {
                    push(id.as_str(), audience);
                }
            }
            Audience::AllStaff => {
                for id in doctors {
                    push(id.as_str(), audience);
                }
                push(ADMIN_ID, audience);
            }
        }
    }
    out
}
