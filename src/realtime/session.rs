//! Student-side quiz session channel.

use std::sync::{Arc, Mutex};
use std::time::SystemTime;

use rand::Rng;
use tokio::task::JoinHandle;

use super::channel::EventChannel;
use super::protocol::{
    events, Intervention, ProgressReport, QuizProgress, SessionCompleted, StartSession,
    Violation, ViolationReport,
};
use super::registry::SubscriptionId;
use crate::error::{ClientError, Result};

#[derive(Debug, Clone, PartialEq)]
pub struct InterventionEntry {
    pub action: String,
    pub message: Option<String>,
    pub received_at: SystemTime,
}

/// Local lifecycle flags of one quiz attempt plus received interventions.
#[derive(Debug, Clone, Default)]
pub struct SessionState {
    started: bool,
    completed: bool,
    interventions: Vec<InterventionEntry>,
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has_started(&self) -> bool {
        self.started
    }

    pub fn has_completed(&self) -> bool {
        self.completed
    }

    pub fn interventions(&self) -> &[InterventionEntry] {
        &self.interventions
    }

    /// True only for the first call.
    pub fn mark_started(&mut self) -> bool {
        !std::mem::replace(&mut self.started, true)
    }

    /// True only once, and only if the session had started.
    pub fn mark_completed(&mut self) -> bool {
        if !self.started || self.completed {
            return false;
        }
        self.completed = true;
        true
    }

    pub fn record_intervention(&mut self, intervention: Intervention, received_at: SystemTime) {
        self.interventions.push(InterventionEntry {
            action: intervention.action,
            message: intervention.message,
            received_at,
        });
    }
}

/// Identifies the attempt a [`SessionChannel`] reports for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionInfo {
    pub session_id: String,
    pub quiz_id: String,
}

/// Emits the lifecycle of one quiz attempt and collects teacher
/// interventions addressed to it.
///
/// `start-quiz-session` goes out once, on the first connection that comes
/// up. `quiz-completed` goes out once on [`finish`](Self::finish) or drop,
/// and only if the start was sent.
pub struct SessionChannel {
    channel: EventChannel,
    info: SessionInfo,
    idempotency_key: String,
    state: Arc<Mutex<SessionState>>,
    subscription: Option<SubscriptionId>,
    start_task: Option<JoinHandle<()>>,
    finished: bool,
}

impl SessionChannel {
    pub fn open(channel: EventChannel, info: SessionInfo) -> Result<Self> {
        let state = Arc::new(Mutex::new(SessionState::new()));
        let idempotency_key = generate_idempotency_key();

        let intervention_state = state.clone();
        let session_id = info.session_id.clone();
        let subscription = channel
            .subscribe_typed(events::TEACHER_INTERVENTION, move |intervention: Intervention| {
                if let Some(target) = intervention.session_id.as_deref() {
                    if target != session_id {
                        return;
                    }
                }

                tracing::info!(
                    session_id = %session_id,
                    action = %intervention.action,
                    "Received teacher intervention"
                );

                intervention_state
                    .lock()
                    .unwrap_or_else(|e| e.into_inner())
                    .record_intervention(intervention, SystemTime::now());
            })
            .ok_or(ClientError::ShutDown)?;

        let start_task = tokio::spawn(Self::start_on_connect(
            channel.clone(),
            info.clone(),
            idempotency_key.clone(),
            state.clone(),
        ));

        Ok(Self {
            channel,
            info,
            idempotency_key,
            state,
            subscription: Some(subscription),
            start_task: Some(start_task),
            finished: false,
        })
    }

    pub fn info(&self) -> &SessionInfo {
        &self.info
    }

    pub fn idempotency_key(&self) -> &str {
        &self.idempotency_key
    }

    pub fn has_started(&self) -> bool {
        self.lock_state().has_started()
    }

    pub fn interventions(&self) -> Vec<InterventionEntry> {
        self.lock_state().interventions().to_vec()
    }

    pub fn report_violation(&self, violation: Violation) -> bool {
        tracing::debug!(
            session_id = %self.info.session_id,
            kind = %violation.kind,
            "Reporting violation"
        );

        self.channel.emit_json(
            events::VIOLATION_DETECTED,
            &ViolationReport {
                session_id: self.info.session_id.clone(),
                violation,
            },
        )
    }

    pub fn report_progress(&self, progress: QuizProgress) -> bool {
        self.channel.emit_json(
            events::QUIZ_PROGRESS,
            &ProgressReport {
                session_id: self.info.session_id.clone(),
                progress,
            },
        )
    }

    /// Tears the channel down. Returns whether `quiz-completed` was sent.
    pub fn finish(mut self) -> bool {
        self.teardown()
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn teardown(&mut self) -> bool {
        if self.finished {
            return false;
        }
        self.finished = true;

        if let Some(task) = self.start_task.take() {
            task.abort();
        }
        if let Some(id) = self.subscription.take() {
            self.channel.unsubscribe(events::TEACHER_INTERVENTION, Some(id));
        }

        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if !state.mark_completed() {
            return false;
        }

        let sent = self.channel.emit_json(
            events::QUIZ_COMPLETED,
            &SessionCompleted {
                session_id: self.info.session_id.clone(),
            },
        );

        tracing::info!(session_id = %self.info.session_id, sent, "Quiz session completed");
        sent
    }

    async fn start_on_connect(
        channel: EventChannel,
        info: SessionInfo,
        idempotency_key: String,
        state: Arc<Mutex<SessionState>>,
    ) {
        let mut status_rx = channel.watch_status();

        loop {
            let connected = status_rx.borrow_and_update().connected;

            if connected {
                let mut state = state.lock().unwrap_or_else(|e| e.into_inner());
                if state.has_started() {
                    return;
                }

                let sent = channel.emit_json(
                    events::START_QUIZ_SESSION,
                    &StartSession {
                        session_id: info.session_id.clone(),
                        quiz_id: info.quiz_id.clone(),
                        idempotency_key: idempotency_key.clone(),
                    },
                );

                if sent {
                    state.mark_started();
                    tracing::info!(
                        session_id = %info.session_id,
                        quiz_id = %info.quiz_id,
                        "Quiz session started"
                    );
                    return;
                }
            }

            if status_rx.changed().await.is_err() {
                return;
            }
        }
    }
}

impl Drop for SessionChannel {
    fn drop(&mut self) {
        self.teardown();
    }
}

fn generate_idempotency_key() -> String {
    let mut rng = rand::thread_rng();
    format!("{:016x}{:016x}", rng.gen::<u64>(), rng.gen::<u64>())
}
