//! Real-time quiz proctoring channel.
//!
//! # Architecture
//!
//! - `connection`: one WebSocket per [`AuthSession`](crate::auth::AuthSession),
//!   torn down and re-established on token change, explicit backoff
//! - `channel`: fire-and-forget emit/subscribe/unsubscribe over a connection
//! - `monitoring`: teacher-side aggregation of live student sessions
//! - `session`: student-side lifecycle, progress and violation reporting
//!
//! # Usage
//!
//! ```rust,ignore
//! let manager = ConnectionManager::connect(config.realtime.clone(), auth.clone());
//! let channel = EventChannel::new(manager);
//!
//! let monitor = MonitoringChannel::join(channel.clone(), "quiz-42")?;
//! monitor.send_intervention("session-7", "warn", Some("Stay on the quiz tab"));
//! ```

mod channel;
mod connection;
mod monitoring;
pub mod protocol;
mod reconnect;
mod registry;
mod session;

pub use channel::EventChannel;
pub use connection::{ConnectionManager, ConnectionStatus};
pub use monitoring::{
    ActiveStudent, CompletionEntry, MonitoringChannel, MonitoringState, StudentState,
    ViolationEntry, ViolationSource,
};
pub use protocol::{events, QuizProgress, Severity, Violation};
pub use reconnect::ReconnectPolicy;
pub use registry::{EventHandler, SubscriptionId, SubscriptionRegistry};
pub use session::{InterventionEntry, SessionChannel, SessionInfo, SessionState};
