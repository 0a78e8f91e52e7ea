//! Client library for the classroom platform: a REST client over the
//! backend API and the real-time channel used for quiz proctoring.
//!
//! Both halves share one [`AuthSession`]. Signing in through the
//! [`ApiClient`] stores the token, which brings the real-time connection
//! up; a 401 from any request clears it, which takes the connection down.

pub mod api;
pub mod auth;
pub mod config;
pub mod error;
pub mod realtime;
pub mod telemetry;

pub use api::ApiClient;
pub use auth::{AuthSession, AuthToken};
pub use config::Config;
pub use error::{ClientError, Result};
