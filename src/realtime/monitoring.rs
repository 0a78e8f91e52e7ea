//! Teacher-side aggregation of live quiz sessions.
//!
//! [`MonitoringState`] is a pure state machine fed by inbound events;
//! [`MonitoringChannel`] wires it to an [`EventChannel`] and re-joins the
//! quiz's monitoring room on every new connection. Everything held here is
//! a soft cache of server state and is rebuilt from scratch on reconnect.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::SystemTime;

use serde_json::Value;
use tokio::task::JoinHandle;

use super::channel::EventChannel;
use super::protocol::{
    events, InterventionRequest, JoinMonitoring, MonitoringEvent, QuizProgress, Violation,
};
use super::registry::SubscriptionId;
use crate::error::{ClientError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StudentState {
    NotStarted,
    Active,
    Completed,
    Disconnected,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ActiveStudent {
    pub student_id: String,
    pub session_id: Option<String>,
    pub student_name: Option<String>,
    pub joined_at: SystemTime,
    pub progress: Option<QuizProgress>,
}

/// Where a violation entry came from. Disconnections are reported in the
/// same list as proctoring alerts but tagged separately.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViolationSource {
    Proctoring,
    Transport,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ViolationEntry {
    pub student_id: String,
    pub violation: Violation,
    pub received_at: SystemTime,
    pub source: ViolationSource,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompletionEntry {
    pub student_id: String,
    pub payload: serde_json::Map<String, Value>,
    pub received_at: SystemTime,
}

#[derive(Debug, Clone, Default)]
pub struct MonitoringState {
    active: Vec<ActiveStudent>,
    violations: Vec<ViolationEntry>,
    completions: Vec<CompletionEntry>,
    last_state: HashMap<String, StudentState>,
}

impl MonitoringState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Active students in the order their sessions started.
    pub fn active_students(&self) -> &[ActiveStudent] {
        &self.active
    }

    pub fn active_student(&self, student_id: &str) -> Option<&ActiveStudent> {
        self.active.iter().find(|s| s.student_id == student_id)
    }

    pub fn is_active(&self, student_id: &str) -> bool {
        self.active_student(student_id).is_some()
    }

    /// Violations in arrival order, never deduplicated.
    pub fn violations(&self) -> &[ViolationEntry] {
        &self.violations
    }

    pub fn violations_for<'a>(
        &'a self,
        student_id: &'a str,
    ) -> impl Iterator<Item = &'a ViolationEntry> + 'a {
        self.violations
            .iter()
            .filter(move |entry| entry.student_id == student_id)
    }

    pub fn completions(&self) -> &[CompletionEntry] {
        &self.completions
    }

    pub fn student_state(&self, student_id: &str) -> StudentState {
        self.last_state
            .get(student_id)
            .copied()
            .unwrap_or(StudentState::NotStarted)
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn apply(&mut self, event: MonitoringEvent, received_at: SystemTime) {
        match event {
            MonitoringEvent::Started(started) => {
                self.remove_active(&started.student_id);
                self.last_state
                    .insert(started.student_id.clone(), StudentState::Active);
                self.active.push(ActiveStudent {
                    student_id: started.student_id,
                    session_id: started.session_id,
                    student_name: started.student_name,
                    joined_at: received_at,
                    progress: None,
                });
            }
            MonitoringEvent::Violation(alert) => {
                self.violations.push(ViolationEntry {
                    student_id: alert.student_id,
                    violation: alert.violation,
                    received_at,
                    source: ViolationSource::Proctoring,
                });
            }
            MonitoringEvent::Progress(update) => {
                match self
                    .active
                    .iter_mut()
                    .find(|s| s.student_id == update.student_id)
                {
                    Some(student) => student.progress = Some(update.progress),
                    None => tracing::debug!(
                        student_id = %update.student_id,
                        "Ignoring progress for inactive student"
                    ),
                }
            }
            MonitoringEvent::Completed(done) => {
                if self.remove_active(&done.student_id) {
                    self.last_state
                        .insert(done.student_id.clone(), StudentState::Completed);
                }
                self.completions.push(CompletionEntry {
                    student_id: done.student_id,
                    payload: done.payload,
                    received_at,
                });
            }
            MonitoringEvent::Disconnected(gone) => {
                // Only an active student transitions; the violation is kept either way
                if self.remove_active(&gone.student_id) {
                    self.last_state
                        .insert(gone.student_id.clone(), StudentState::Disconnected);
                }
                self.violations.push(ViolationEntry {
                    student_id: gone.student_id,
                    violation: Violation::disconnection(),
                    received_at,
                    source: ViolationSource::Transport,
                });
            }
        }
    }

    /// Returns whether the student was active.
    fn remove_active(&mut self, student_id: &str) -> bool {
        let before = self.active.len();
        self.active.retain(|s| s.student_id != student_id);
        self.active.len() != before
    }
}

/// Live monitoring of one quiz over an [`EventChannel`].
pub struct MonitoringChannel {
    channel: EventChannel,
    quiz_id: String,
    state: Arc<Mutex<MonitoringState>>,
    subscriptions: Vec<(&'static str, SubscriptionId)>,
    rejoin_task: Option<JoinHandle<()>>,
}

impl MonitoringChannel {
    /// Subscribes to the monitoring events and joins the quiz's monitoring
    /// room whenever a connection comes up.
    pub fn join(channel: EventChannel, quiz_id: impl Into<String>) -> Result<Self> {
        let quiz_id = quiz_id.into();
        let state = Arc::new(Mutex::new(MonitoringState::new()));

        let mut monitor = Self {
            channel: channel.clone(),
            quiz_id: quiz_id.clone(),
            state: state.clone(),
            subscriptions: Vec::new(),
            rejoin_task: None,
        };

        for event in MonitoringEvent::EVENT_NAMES {
            let state = state.clone();
            let id = channel.subscribe(event, move |data: &Value| {
                match MonitoringEvent::decode(event, data) {
                    Ok(Some(decoded)) => {
                        let mut state = state.lock().unwrap_or_else(|e| e.into_inner());
                        state.apply(decoded, SystemTime::now());
                    }
                    Ok(None) => {}
                    Err(e) => tracing::warn!(
                        error = %e,
                        event = %event,
                        "Discarding malformed monitoring event"
                    ),
                }
            });

            match id {
                Some(id) => monitor.subscriptions.push((event, id)),
                // Drop unsubscribes whatever was already registered
                None => return Err(ClientError::ShutDown),
            }
        }

        monitor.rejoin_task = Some(tokio::spawn(Self::rejoin_on_connect(
            channel, quiz_id, state,
        )));

        Ok(monitor)
    }

    pub fn quiz_id(&self) -> &str {
        &self.quiz_id
    }

    pub fn snapshot(&self) -> MonitoringState {
        self.state.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Best-effort delivery of a teacher action to one student session.
    pub fn send_intervention(&self, session_id: &str, action: &str, message: Option<&str>) -> bool {
        let sent = self.channel.emit_json(
            events::TEACHER_INTERVENTION,
            &InterventionRequest {
                session_id: session_id.to_string(),
                action: action.to_string(),
                message: message.map(str::to_string),
            },
        );

        tracing::info!(
            quiz_id = %self.quiz_id,
            session_id = %session_id,
            action = %action,
            sent,
            "Teacher intervention"
        );

        sent
    }

    pub fn close(mut self) {
        self.teardown();
    }

    fn teardown(&mut self) {
        if let Some(task) = self.rejoin_task.take() {
            task.abort();
        }
        for (event, id) in self.subscriptions.drain(..) {
            self.channel.unsubscribe(event, Some(id));
        }
    }

    async fn rejoin_on_connect(
        channel: EventChannel,
        quiz_id: String,
        state: Arc<Mutex<MonitoringState>>,
    ) {
        let mut status_rx = channel.watch_status();
        let mut joined_generation = 0u64;

        loop {
            let status = status_rx.borrow_and_update().clone();

            if status.connected && status.generation != joined_generation {
                state.lock().unwrap_or_else(|e| e.into_inner()).reset();

                let joined = channel.emit_json(
                    events::JOIN_QUIZ_MONITORING,
                    &JoinMonitoring {
                        quiz_id: quiz_id.clone(),
                    },
                );

                if joined {
                    joined_generation = status.generation;
                    tracing::info!(
                        quiz_id = %quiz_id,
                        generation = status.generation,
                        "Joined quiz monitoring"
                    );
                }
            }

            if status_rx.changed().await.is_err() {
                break;
            }
        }
    }
}

impl Drop for MonitoringChannel {
    fn drop(&mut self) {
        self.teardown();
    }
}
