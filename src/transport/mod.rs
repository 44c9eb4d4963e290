//! Messaging transport layer for the live-monitoring channel
//!
//! Defines the abstract publish/subscribe interface the monitoring session
//! talks to, plus an in-process simulated transport for tests and demos.
//! A production implementation would speak STOMP over WebSocket to the
//! backend; the session only sees this trait.

pub mod simulated;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::broadcast;

/// Destination the session sends a patient id to when arming monitoring.
pub const START_MONITORING: &str = "/app/start-monitoring";
/// Destination for disarming monitoring.
pub const STOP_MONITORING: &str = "/app/stop-monitoring";
/// Destination requesting one synthetic sample for a patient.
pub const SEND_TEST_INDICATORS: &str = "/app/send-test-indicators";

/// Topic a patient's indicator stream publishes to.
pub fn indicators_topic(patient_id: i64) -> String {
    format!("/topic/medical-indicators/{}", patient_id)
}

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Not connected")]
    NotConnected,

    #[error("Subscribe error: {0}")]
    Subscribe(String),

    #[error("Send error: {0}")]
    Send(String),
}

/// Abstract pub/sub transport owned by one monitoring session.
///
/// Message bodies are opaque JSON strings; deserialization is the
/// subscriber's concern. `disconnect()` resolves only once the close has
/// completed, so callers can sequence teardown-then-reconnect without
/// timers.
#[async_trait]
pub trait MonitorTransport: Send + Sync {
    /// Open the connection. Idempotent once connected.
    async fn connect(&self) -> Result<(), TransportError>;

    /// Subscribe to a topic. Returns a receiver of raw message bodies.
    async fn subscribe(&self, topic: &str)
        -> Result<broadcast::Receiver<String>, TransportError>;

    /// Send a payload to a destination.
    async fn send(&self, destination: &str, payload: &str) -> Result<(), TransportError>;

    /// Close the connection. Completes when the close is acknowledged.
    /// Safe to call when already disconnected.
    async fn disconnect(&self) -> Result<(), TransportError>;

    /// Whether the connection is currently open.
    fn is_connected(&self) -> bool;
}
