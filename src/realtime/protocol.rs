use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::api::models::null_as_default;

/// Event names shared with the backend. These strings are a wire contract.
pub mod events {
    pub const JOIN_QUIZ_MONITORING: &str = "join-quiz-monitoring";
    pub const TEACHER_INTERVENTION: &str = "teacher-intervention";
    pub const START_QUIZ_SESSION: &str = "start-quiz-session";
    pub const VIOLATION_DETECTED: &str = "violation-detected";
    pub const QUIZ_PROGRESS: &str = "quiz-progress";
    pub const QUIZ_COMPLETED: &str = "quiz-completed";

    pub const STUDENT_STARTED_QUIZ: &str = "student-started-quiz";
    pub const VIOLATION_ALERT: &str = "violation-alert";
    pub const STUDENT_PROGRESS: &str = "student-progress";
    pub const STUDENT_COMPLETED_QUIZ: &str = "student-completed-quiz";
    pub const STUDENT_DISCONNECTED: &str = "student-disconnected";
}

/// One JSON text frame on the socket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub event: String,
    #[serde(default)]
    pub data: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
}

impl Envelope {
    pub fn new(event: impl Into<String>, data: Value, id: u64) -> Self {
        Self {
            event: event.into(),
            data,
            id: Some(id),
        }
    }

    pub fn to_text(&self) -> crate::error::Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    #[serde(other)]
    Unknown,
}

impl Default for Severity {
    fn default() -> Self {
        Self::Unknown
    }
}

/// A proctoring anomaly as reported by the student client or relayed by
/// the server. Fields the client does not know are kept in `extra`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Violation {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub severity: Severity,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

pub const DISCONNECTION_VIOLATION: &str = "disconnection";

impl Violation {
    pub fn new(kind: impl Into<String>, severity: Severity) -> Self {
        Self {
            kind: kind.into(),
            severity,
            details: None,
            timestamp: None,
            extra: serde_json::Map::new(),
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn disconnection() -> Self {
        Self::new(DISCONNECTION_VIOLATION, Severity::High)
            .with_details("Student disconnected from the quiz session")
    }

    pub fn is_disconnection(&self) -> bool {
        self.kind == DISCONNECTION_VIOLATION
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizProgress {
    #[serde(default, deserialize_with = "null_as_default")]
    pub current_question: u32,
    #[serde(default, deserialize_with = "null_as_default")]
    pub answered_count: u32,
    #[serde(default, deserialize_with = "null_as_default")]
    pub total_questions: u32,
}

// Outbound payloads

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinMonitoring {
    pub quiz_id: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InterventionRequest {
    pub session_id: String,
    pub action: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StartSession {
    pub session_id: String,
    pub quiz_id: String,
    pub idempotency_key: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ViolationReport {
    pub session_id: String,
    pub violation: Violation,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressReport {
    pub session_id: String,
    #[serde(flatten)]
    pub progress: QuizProgress,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionCompleted {
    pub session_id: String,
}

// Inbound payloads

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentStarted {
    pub student_id: String,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub student_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViolationAlert {
    pub student_id: String,
    pub violation: Violation,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentProgress {
    pub student_id: String,
    #[serde(flatten)]
    pub progress: QuizProgress,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentCompleted {
    pub student_id: String,
    #[serde(flatten)]
    pub payload: serde_json::Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentDisconnected {
    pub student_id: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Intervention {
    pub action: String,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub session_id: Option<String>,
}

/// Inbound events the monitoring view consumes, decoded from an envelope.
#[derive(Debug, Clone, PartialEq)]
pub enum MonitoringEvent {
    Started(StudentStarted),
    Violation(ViolationAlert),
    Progress(StudentProgress),
    Completed(StudentCompleted),
    Disconnected(StudentDisconnected),
}

impl MonitoringEvent {
    pub const EVENT_NAMES: [&'static str; 5] = [
        events::STUDENT_STARTED_QUIZ,
        events::VIOLATION_ALERT,
        events::STUDENT_PROGRESS,
        events::STUDENT_COMPLETED_QUIZ,
        events::STUDENT_DISCONNECTED,
    ];

    /// Decodes the payload of a named inbound event. Returns `Ok(None)` for
    /// events the monitoring view does not handle.
    pub fn decode(event: &str, data: &Value) -> serde_json::Result<Option<Self>> {
        let decoded = match event {
            events::STUDENT_STARTED_QUIZ => Self::Started(StudentStarted::deserialize(data)?),
            events::VIOLATION_ALERT => Self::Violation(ViolationAlert::deserialize(data)?),
            events::STUDENT_PROGRESS => Self::Progress(StudentProgress::deserialize(data)?),
            events::STUDENT_COMPLETED_QUIZ => {
                Self::Completed(StudentCompleted::deserialize(data)?)
            }
            events::STUDENT_DISCONNECTED => {
                Self::Disconnected(StudentDisconnected::deserialize(data)?)
            }
            _ => return Ok(None),
        };
        Ok(Some(decoded))
    }

    pub fn student_id(&self) -> &str {
        match self {
            Self::Started(e) => &e.student_id,
            Self::Violation(e) => &e.student_id,
            Self::Progress(e) => &e.student_id,
            Self::Completed(e) => &e.student_id,
            Self::Disconnected(e) => &e.student_id,
        }
    }
}
