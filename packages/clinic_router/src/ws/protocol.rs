//! WebSocket Protocol Types
//!
//! Envelopes exchanged with doctors, the admin desk, patients and guests.
//! Every envelope is a JSON object tagged by `type` (snake_case) with camelCase fields.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Logical participant key: doctor code, `"Admin"`, patient code, or guest id.
pub type ParticipantId = String;

/// Reserved participant id of the single human support operator.
pub const ADMIN_ID: &str = "Admin";

/// Who produced a domain event, as declared by the CRUD client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventSender {
    #[serde(rename = "Admin")]
    Admin,
    #[serde(rename = "doctor")]
    Doctor,
}

/// Messages sent FROM the client TO the server
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ClientMessage {
    // === Identity ===
    /// Doctor (or the `"Admin"` desk) announces itself
    Init { doctor_id: String },
    /// Logged-in patient announces itself; the token decides authentication
    InitPatient {
        patient_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        token: Option<String>,
    },
    /// Anonymous visitor of the public site
    InitGuest { guest_id: String },
    /// Login or logout happened after the connection was opened.
    /// A missing token means the participant logged out.
    UpdateLoginStatus {
        user_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        token: Option<String>,
    },

    // === Chat ===
    /// Free text for the bot (or for the operator while a handoff is active)
    ChatMessage { user_id: String, message: String },
    /// Ask for a human operator; `context` is the conversation so far
    RequestHumanHandoff {
        user_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        context: Option<Value>,
    },
    /// Direct message inside a handoff. From the admin desk `sender` is
    /// `"Admin"` and `recipientId` names the participant; from a participant
    /// `sender`/`userId` name the participant itself.
    HumanChatMessage {
        sender: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        user_id: Option<String>,
        text: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        recipient_id: Option<String>,
    },
    /// Either side closes the handoff for `userId`
    EndHumanChat { user_id: String, initiated_by: String },

    // === Domain events from the CRUD clients ===
    NewAppointment { data: Value },
    CancelAppointment { sender: EventSender, data: Value },
    AppointmentExamined { sender: EventSender, data: Value },
    InteractPatient { sender: EventSender, data: Value },
    InteractDrug { sender: EventSender, data: Value },
    InteractRecord { sender: EventSender, data: Value },
    InteractExam { sender: EventSender, data: Value },
    CreatedSchedule { sender: EventSender, data: Value },
}

impl ClientMessage {
    /// Wire tag, for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Init { .. } => "init",
            Self::InitPatient { .. } => "init_patient",
            Self::InitGuest { .. } => "init_guest",
            Self::UpdateLoginStatus { .. } => "update_login_status",
            Self::ChatMessage { .. } => "chat_message",
            Self::RequestHumanHandoff { .. } => "request_human_handoff",
            Self::HumanChatMessage { .. } => "human_chat_message",
            Self::EndHumanChat { .. } => "end_human_chat",
            Self::NewAppointment { .. } => "new_appointment",
            Self::CancelAppointment { .. } => "cancel_appointment",
            Self::AppointmentExamined { .. } => "appointment_examined",
            Self::InteractPatient { .. } => "interact_patient",
            Self::InteractDrug { .. } => "interact_drug",
            Self::InteractRecord { .. } => "interact_record",
            Self::InteractExam { .. } => "interact_exam",
            Self::CreatedSchedule { .. } => "created_schedule",
        }
    }
}

/// One reply unit from the NLU service (Rasa REST channel shape).
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct BotMessage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recipient_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub buttons: Option<Vec<Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom: Option<Value>,
}

impl BotMessage {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Default::default()
        }
    }
}

/// A participant currently waiting for the operator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WaitingEntry {
    pub user_id: ParticipantId,
    pub history: Value,
    /// RFC 3339
    pub requested_at: String,
}

/// Messages sent FROM the server TO the client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ServerMessage {
    // === Fan-out of domain events (payload forwarded unchanged) ===
    AppointmentUpdate { data: Value },
    AppointmentCancelled { data: Value },
    AppointmentExamined { data: Value },
    PatientUpdate { data: Value },
    DrugUpdate { data: Value },
    RecordCreated { data: Value },
    ExamCreated { data: Value },
    CreatedSchedule { data: Value },

    // === Chat ===
    /// Bot reply, gate refusal, fallback, or "no agent available" notice
    BotResponse {
        messages: Vec<BotMessage>,
        session_id: String,
    },
    /// The handoff request reached the operator
    HandoffInitiated { message: String },
    /// Sent to the operator when a participant asks for a human
    NewSupportRequest { user_id: ParticipantId, history: Value },
    /// Relayed message inside a handoff
    HumanChatMessage {
        sender: ParticipantId,
        user_id: ParticipantId,
        text: String,
        timestamp: String,
    },
    /// The counterpart closed the handoff
    HandoffEnded {
        user_id: ParticipantId,
        initiated_by: String,
    },
    /// Sent to the operator on connect
    WaitingList { users: Vec<WaitingEntry> },

    /// A request was refused (identity mismatch, invalid transition, ...)
    Error { message: String },
}

impl ServerMessage {
    /// Wire tag, for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::AppointmentUpdate { .. } => "appointment_update",
            Self::AppointmentCancelled { .. } => "appointment_cancelled",
            Self::AppointmentExamined { .. } => "appointment_examined",
            Self::PatientUpdate { .. } => "patient_update",
            Self::DrugUpdate { .. } => "drug_update",
            Self::RecordCreated { .. } => "record_created",
            Self::ExamCreated { .. } => "exam_created",
            Self::CreatedSchedule { .. } => "created_schedule",
            Self::BotResponse { .. } => "bot_response",
            Self::HandoffInitiated { .. } => "handoff_initiated",
            Self::NewSupportRequest { .. } => "new_support_request",
            Self::HumanChatMessage { .. } => "human_chat_message",
            Self::HandoffEnded { .. } => "handoff_ended",
            Self::WaitingList { .. } => "waiting_list",
            Self::Error { .. } => "error",
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_client_message_init() {
        let json = r#"{"type":"init","doctorId":"BS0001"}"#;
        let msg: ClientMessage = serde_json::from_str(json).unwrap();

        match msg {
            ClientMessage::Init { doctor_id } => assert_eq!(doctor_id, "BS0001"),
            _ => panic!("Expected Init message"),
        }
    }

    #[test]
    fn test_client_message_init_patient_without_token() {
        let json = r#"{"type":"init_patient","patientId":"BN0001"}"#;
        let msg: ClientMessage = serde_json::from_str(json).unwrap();

        match msg {
            ClientMessage::InitPatient { patient_id, token } => {
                assert_eq!(patient_id, "BN0001");
                assert!(token.is_none());
            }
            _ => panic!("Expected InitPatient message"),
        }
    }

    #[test]
    fn test_client_message_update_login_status_logout() {
        let json = r#"{"type":"update_login_status","userId":"BN0001","token":null}"#;
        let msg: ClientMessage = serde_json::from_str(json).unwrap();

        match msg {
            ClientMessage::UpdateLoginStatus { user_id, token } => {
                assert_eq!(user_id, "BN0001");
                assert!(token.is_none());
            }
            _ => panic!("Expected UpdateLoginStatus message"),
        }
    }

    #[test]
    fn test_client_message_human_chat_from_admin() {
        let json = r#"{"type":"human_chat_message","sender":"Admin","recipientId":"BN0001","text":"Chào bạn"}"#;
        let msg: ClientMessage = serde_json::from_str(json).unwrap();

        match msg {
            ClientMessage::HumanChatMessage {
                sender,
                user_id,
                text,
                recipient_id,
            } => {
                assert_eq!(sender, ADMIN_ID);
                assert!(user_id.is_none());
                assert_eq!(text, "Chào bạn");
                assert_eq!(recipient_id.as_deref(), Some("BN0001"));
            }
            _ => panic!("Expected HumanChatMessage"),
        }
    }

    #[test]
    fn test_client_message_end_human_chat() {
        let json = r#"{"type":"end_human_chat","userId":"BN0001","initiatedBy":"Admin"}"#;
        let msg: ClientMessage = serde_json::from_str(json).unwrap();
        assert_eq!(msg.kind(), "end_human_chat");
    }

    #[test]
    fn test_domain_event_sender_casing() {
        let json = r#"{"type":"cancel_appointment","sender":"Admin","data":{"maBN":"BN0001","maBS":"BS0001"}}"#;
        let msg: ClientMessage = serde_json::from_str(json).unwrap();
        match msg {
            ClientMessage::CancelAppointment { sender, data } => {
                assert_eq!(sender, EventSender::Admin);
                assert_eq!(data["maBN"], "BN0001");
            }
            _ => panic!("Expected CancelAppointment"),
        }

        let json = r#"{"type":"interact_drug","sender":"doctor","data":{"maThuoc":"T01","soLuong":3}}"#;
        let msg: ClientMessage = serde_json::from_str(json).unwrap();
        assert!(matches!(
            msg,
            ClientMessage::InteractDrug {
                sender: EventSender::Doctor,
                ..
            }
        ));
    }

    #[test]
    fn test_unknown_sender_is_rejected() {
        let json = r#"{"type":"interact_drug","sender":"nurse","data":{}}"#;
        assert!(serde_json::from_str::<ClientMessage>(json).is_err());
    }

    #[test]
    fn test_unknown_type_is_rejected() {
        let json = r#"{"type":"drop_tables"}"#;
        assert!(serde_json::from_str::<ClientMessage>(json).is_err());
        assert!(serde_json::from_str::<ClientMessage>("not json").is_err());
    }

    #[test]
    fn test_server_message_bot_response_shape() {
        let msg = ServerMessage::BotResponse {
            messages: vec![BotMessage::text("Xin chào")],
            session_id: "sess-1".into(),
        };
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(
            value,
            json!({
                "type": "bot_response",
                "messages": [{"text": "Xin chào"}],
                "sessionId": "sess-1"
            })
        );
    }

    #[test]
    fn test_server_message_support_request_shape() {
        let msg = ServerMessage::NewSupportRequest {
            user_id: "BN0001".into(),
            history: json!([{"from": "user", "text": "hi"}]),
        };
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["type"], "new_support_request");
        assert_eq!(value["userId"], "BN0001");
        assert_eq!(value["history"][0]["text"], "hi");
    }

    #[test]
    fn test_server_message_handoff_ended_shape() {
        let msg = ServerMessage::HandoffEnded {
            user_id: "BN0001".into(),
            initiated_by: ADMIN_ID.into(),
        };
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(
            value,
            json!({"type": "handoff_ended", "userId": "BN0001", "initiatedBy": "Admin"})
        );
    }

    #[test]
    fn test_bot_message_decodes_rasa_reply() {
        let json = r#"[
            {"recipient_id":"sess-1","text":"Phòng khám mở cửa 7h-17h"},
            {"recipient_id":"sess-1","image":"https://example.test/map.png"}
        ]"#;
        let msgs: Vec<BotMessage> = serde_json::from_str(json).unwrap();
        assert_eq!(msgs.len(), 2);
        assert_eq!(msgs[0].text.as_deref(), Some("Phòng khám mở cửa 7h-17h"));
        assert!(msgs[1].text.is_none());
        assert!(msgs[1].image.is_some());
    }

    #[test]
    fn test_kind_matches_wire_tag() {
        let msg = ServerMessage::WaitingList { users: vec![] };
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["type"], msg.kind());
    }
}
