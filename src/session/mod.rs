//! Monitoring session manager
//!
//! One `MonitoringSession` owns the transport connection and the per-patient
//! subscription for a single patient's live-monitoring lifecycle: connect,
//! start/stop monitoring, test-sample requests, reload, inbound sample
//! handling with classification and a bounded alert history. All rendering
//! goes through the injected [`RenderPort`].
//!
//! The session is single-task: every method takes `&mut self`, inbound
//! messages are pulled by [`MonitoringSession::drive`], so no two handlers
//! ever run concurrently and no locking is needed.

use std::collections::VecDeque;
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::broadcast;

use crate::render::{BannerKind, Field, RenderPort};
use crate::transport::{
    indicators_topic, MonitorTransport, TransportError, SEND_TEST_INDICATORS, START_MONITORING,
    STOP_MONITORING,
};
use crate::types::{AlertRecord, Category, IndicatorSample};

/// Maximum number of alert records kept; oldest entries are evicted.
pub const ALERT_HISTORY_CAP: usize = 50;

/// Patient identifier used when neither the page nor the URL provides one.
pub const DEFAULT_PATIENT_ID: i64 = 1001;

/// Resolve the patient id: page-embedded value first, then the URL query
/// value, then the fixed fallback. Non-numeric values fall through.
pub fn resolve_patient_id(embedded: Option<&str>, query: Option<&str>) -> i64 {
    embedded
        .and_then(|v| v.trim().parse().ok())
        .or_else(|| query.and_then(|v| v.trim().parse().ok()))
        .unwrap_or(DEFAULT_PATIENT_ID)
}

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Connection failed: {0}")]
    Connection(TransportError),

    #[error("Operation requires an active connection")]
    NotConnected,

    #[error("Reload failed: {0}")]
    Reload(String),

    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Client-side coordinator of connection, subscription and monitoring state
/// for one patient.
pub struct MonitoringSession {
    patient_id: i64,
    transport: Arc<dyn MonitorTransport>,
    render: Arc<dyn RenderPort>,
    connected: bool,
    monitoring: bool,
    current_sample: Option<IndicatorSample>,
    alert_history: VecDeque<AlertRecord>,
    samples: Option<broadcast::Receiver<String>>,
}

impl MonitoringSession {
    pub fn new(
        patient_id: i64,
        transport: Arc<dyn MonitorTransport>,
        render: Arc<dyn RenderPort>,
    ) -> Self {
        Self {
            patient_id,
            transport,
            render,
            connected: false,
            monitoring: false,
            current_sample: None,
            alert_history: VecDeque::new(),
            samples: None,
        }
    }

    pub fn patient_id(&self) -> i64 {
        self.patient_id
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn is_monitoring(&self) -> bool {
        self.monitoring
    }

    pub fn current_sample(&self) -> Option<&IndicatorSample> {
        self.current_sample.as_ref()
    }

    /// Alert history, newest first. Never longer than [`ALERT_HISTORY_CAP`].
    pub fn alert_history(&self) -> &VecDeque<AlertRecord> {
        &self.alert_history
    }

    /// Open the transport and subscribe to this patient's indicator topic.
    ///
    /// A failure is non-fatal: the session renders the disconnected state and
    /// an error banner, and can be asked to connect again.
    pub async fn connect(&mut self) -> Result<(), SessionError> {
        if let Err(e) = self.transport.connect().await {
            return Err(self.fail_connect(e));
        }
        let topic = indicators_topic(self.patient_id);
        let rx = match self.transport.subscribe(&topic).await {
            Ok(rx) => rx,
            Err(e) => return Err(self.fail_connect(e)),
        };

        self.samples = Some(rx);
        self.connected = true;
        self.render.set_field(Field::ConnectionStatus, "Connected");
        log::info!(
            "Connected to monitoring channel, subscribed to {} for patient {}",
            topic,
            self.patient_id
        );
        Ok(())
    }

    fn fail_connect(&mut self, cause: TransportError) -> SessionError {
        log::error!("Monitoring connection failed: {}", cause);
        self.connected = false;
        self.samples = None;
        self.render.set_field(Field::ConnectionStatus, "Disconnected");
        self.render
            .show_banner(BannerKind::Error, &format!("Failed to connect: {}", cause));
        SessionError::Connection(cause)
    }

    /// Arm monitoring. Rejected with a user notice when disconnected;
    /// a second call while already monitoring is a no-op.
    pub async fn start_monitoring(&mut self) -> Result<(), SessionError> {
        if !self.connected {
            self.render
                .show_banner(BannerKind::Error, "Monitoring channel is not connected");
            return Err(SessionError::NotConnected);
        }
        if self.monitoring {
            log::debug!("Monitoring already started for patient {}", self.patient_id);
            return Ok(());
        }

        self.transport
            .send(START_MONITORING, &self.patient_id.to_string())
            .await?;
        self.monitoring = true;
        self.render.set_field(Field::MonitoringStatus, "Active");
        log::info!("Started monitoring for patient {}", self.patient_id);
        Ok(())
    }

    /// Disarm monitoring. No-op when not monitoring. Clears the displayed
    /// sample but leaves the alert history intact. The stop signal is
    /// best-effort; a dead transport must not block teardown.
    pub async fn stop_monitoring(&mut self) {
        if !self.monitoring {
            log::debug!("Monitoring not started for patient {}", self.patient_id);
            return;
        }

        if let Err(e) = self
            .transport
            .send(STOP_MONITORING, &self.patient_id.to_string())
            .await
        {
            log::warn!("Failed to send stop signal: {}", e);
        }
        self.monitoring = false;
        self.render.set_field(Field::MonitoringStatus, "Stopped");
        self.clear_display();
        log::info!("Stopped monitoring for patient {}", self.patient_id);
    }

    /// Ask the backend to emit one synthetic sample for this patient.
    pub async fn send_test_sample(&mut self) -> Result<(), SessionError> {
        if !self.connected {
            self.render
                .show_banner(BannerKind::Error, "Monitoring channel is not connected");
            return Err(SessionError::NotConnected);
        }
        self.transport
            .send(SEND_TEST_INDICATORS, &self.patient_id.to_string())
            .await?;
        log::info!("Requested test indicators for patient {}", self.patient_id);
        Ok(())
    }

    /// Tear the connection down and re-establish it. The transport's
    /// `disconnect` resolves only once the close has completed, so the
    /// reconnect needs no timer. Monitoring is re-armed when it was active
    /// before the reload.
    pub async fn reload(&mut self) -> Result<(), SessionError> {
        log::info!("Reloading monitoring connection for patient {}", self.patient_id);
        let was_monitoring = self.monitoring;

        self.disconnect().await;
        self.clear_display();
        self.render.set_field(Field::ConnectionStatus, "Reconnecting...");
        self.render.set_field(Field::MonitoringStatus, "Reloading");

        match self.connect().await {
            Ok(()) => {
                if was_monitoring {
                    self.start_monitoring()
                        .await
                        .map_err(|e| SessionError::Reload(e.to_string()))?;
                } else {
                    self.render.set_field(Field::MonitoringStatus, "Stopped");
                }
                log::info!("Monitoring connection reloaded");
                Ok(())
            }
            Err(e) => {
                self.render.set_field(Field::MonitoringStatus, "Stopped");
                self.render
                    .show_banner(BannerKind::Error, &format!("Failed to reload connection: {}", e));
                Err(SessionError::Reload(e.to_string()))
            }
        }
    }

    /// Handle one inbound sample: update the displayed reading, classify it,
    /// and append an alert record when it is out of range.
    pub fn on_sample(&mut self, sample: IndicatorSample) {
        log::debug!(
            "New indicators for patient {}: {} bpm, {}°C, {}%",
            sample.patient_id,
            sample.heartrate,
            sample.temperature,
            sample.spo2
        );

        self.render_sample(&sample);

        if let Some(record) = AlertRecord::for_sample(&sample) {
            self.render.show_banner(BannerKind::Warning, &record.message);
            self.alert_history.push_front(record);
            self.alert_history.truncate(ALERT_HISTORY_CAP);
        }

        self.current_sample = Some(sample);
    }

    /// Pump inbound messages into [`on_sample`](Self::on_sample) until the
    /// subscription closes. Messages that fail to parse are logged and
    /// skipped.
    pub async fn drive(&mut self) {
        loop {
            let received = match self.samples.as_mut() {
                Some(rx) => rx.recv().await,
                None => return,
            };
            match received {
                Ok(body) => match serde_json::from_str::<IndicatorSample>(&body) {
                    Ok(sample) => self.on_sample(sample),
                    Err(e) => log::warn!("Failed to parse indicator message: {}", e),
                },
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    log::warn!("Monitoring subscription lagged, dropped {} messages", n);
                }
                Err(broadcast::error::RecvError::Closed) => return,
            }
        }
    }

    /// Stop monitoring if active and close the transport. Idempotent; called
    /// on page teardown.
    pub async fn disconnect(&mut self) {
        if self.monitoring {
            self.stop_monitoring().await;
        }
        if let Err(e) = self.transport.disconnect().await {
            log::warn!("Transport close failed: {}", e);
        }
        self.connected = false;
        self.monitoring = false;
        self.samples = None;
        self.render.set_field(Field::ConnectionStatus, "Disconnected");
        log::info!("Disconnected from monitoring channel");
    }

    /// Visibility loss stops monitoring but keeps the connection open.
    pub async fn on_visibility_hidden(&mut self) {
        if self.monitoring {
            self.stop_monitoring().await;
        }
    }

    fn render_sample(&self, sample: &IndicatorSample) {
        let category = Category::of(sample);

        self.render
            .set_field(Field::Heartrate, &format!("{} bpm", sample.heartrate));
        self.render
            .set_field(Field::Temperature, &format!("{}°C", sample.temperature));
        self.render
            .set_field(Field::Spo2, &format!("{}%", sample.spo2));
        self.render.set_field(
            Field::Timestamp,
            &sample.timestamp.format("%H:%M:%S").to_string(),
        );
        self.render.set_field(Field::Status, &category.to_string());
        self.render
            .set_field(Field::StatusDescription, category.description());
        self.render.set_field(
            Field::StatusColor,
            &category.to_string().to_lowercase(),
        );
    }

    fn clear_display(&mut self) {
        self.current_sample = None;
        self.render.set_field(Field::Heartrate, "--");
        self.render.set_field(Field::Temperature, "--");
        self.render.set_field(Field::Spo2, "--");
        self.render.set_field(Field::Timestamp, "--");
        self.render.set_field(Field::Status, "Normal");
        self.render
            .set_field(Field::StatusDescription, "Monitoring stopped");
        self.render.set_field(Field::StatusColor, "normal");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::RecordingRender;
    use crate::transport::simulated::SimMonitorNetwork;
    use std::time::Duration;

    fn make_session(
        network: &Arc<SimMonitorNetwork>,
        patient_id: i64,
    ) -> (MonitoringSession, Arc<RecordingRender>) {
        let render = Arc::new(RecordingRender::new());
        let session = MonitoringSession::new(
            patient_id,
            Arc::new(network.create_client()),
            render.clone(),
        );
        (session, render)
    }

    fn warning_sample(heartrate: i32, patient_id: i64) -> IndicatorSample {
        // Heart rate above 100 forces Warning regardless of the rest.
        IndicatorSample::new(heartrate, 36.6, 99, patient_id)
    }

    #[test]
    fn test_resolve_patient_id_precedence() {
        assert_eq!(resolve_patient_id(Some("42"), Some("7")), 42);
        assert_eq!(resolve_patient_id(None, Some("7")), 7);
        assert_eq!(resolve_patient_id(None, None), DEFAULT_PATIENT_ID);
        assert_eq!(resolve_patient_id(Some("abc"), Some("7")), 7);
        assert_eq!(resolve_patient_id(Some("abc"), Some("xyz")), DEFAULT_PATIENT_ID);
        assert_eq!(resolve_patient_id(Some(" 15 "), None), 15);
    }

    #[tokio::test]
    async fn test_connect_success_updates_status() {
        let network = SimMonitorNetwork::new();
        let (mut session, render) = make_session(&network, 1001);

        session.connect().await.unwrap();
        assert!(session.is_connected());
        assert_eq!(render.field(Field::ConnectionStatus).as_deref(), Some("Connected"));
        assert!(render.banners().is_empty());
    }

    #[tokio::test]
    async fn test_connect_failure_is_reported_not_fatal() {
        let network = SimMonitorNetwork::new();
        network.fail_connects(true);
        let (mut session, render) = make_session(&network, 1001);

        let err = session.connect().await.unwrap_err();
        assert!(matches!(err, SessionError::Connection(_)));
        assert!(!session.is_connected());
        assert_eq!(
            render.field(Field::ConnectionStatus).as_deref(),
            Some("Disconnected")
        );
        assert_eq!(render.banners().len(), 1);
        assert_eq!(render.banners()[0].0, BannerKind::Error);

        // The session recovers once the transport does.
        network.fail_connects(false);
        session.connect().await.unwrap();
        assert!(session.is_connected());
    }

    #[tokio::test]
    async fn test_start_monitoring_rejected_when_disconnected() {
        let network = SimMonitorNetwork::new();
        let (mut session, render) = make_session(&network, 1001);

        let err = session.start_monitoring().await.unwrap_err();
        assert!(matches!(err, SessionError::NotConnected));
        assert!(!session.is_monitoring());
        assert!(network.sent_log().is_empty());
        assert_eq!(render.banners().len(), 1);
    }

    #[tokio::test]
    async fn test_start_monitoring_is_idempotent() {
        let network = SimMonitorNetwork::new();
        let (mut session, _render) = make_session(&network, 1001);

        session.connect().await.unwrap();
        session.start_monitoring().await.unwrap();
        session.start_monitoring().await.unwrap();

        assert!(session.is_monitoring());
        assert_eq!(network.sends_to(START_MONITORING), 1);
    }

    #[tokio::test]
    async fn test_send_test_sample_rejected_when_disconnected() {
        let network = SimMonitorNetwork::new();
        let (mut session, _render) = make_session(&network, 1001);

        assert!(matches!(
            session.send_test_sample().await,
            Err(SessionError::NotConnected)
        ));
        assert_eq!(network.sends_to(SEND_TEST_INDICATORS), 0);
    }

    #[tokio::test]
    async fn test_stop_clears_display_keeps_history() {
        let network = SimMonitorNetwork::new();
        let (mut session, render) = make_session(&network, 1001);

        session.connect().await.unwrap();
        session.start_monitoring().await.unwrap();
        session.on_sample(warning_sample(120, 1001));
        assert_eq!(session.alert_history().len(), 1);
        assert!(session.current_sample().is_some());

        session.stop_monitoring().await;

        assert!(!session.is_monitoring());
        assert!(session.current_sample().is_none());
        assert_eq!(render.field(Field::Heartrate).as_deref(), Some("--"));
        assert_eq!(
            render.field(Field::StatusDescription).as_deref(),
            Some("Monitoring stopped")
        );
        assert_eq!(session.alert_history().len(), 1);
        assert_eq!(network.sends_to(STOP_MONITORING), 1);
    }

    #[tokio::test]
    async fn test_stop_when_not_monitoring_is_noop() {
        let network = SimMonitorNetwork::new();
        let (mut session, _render) = make_session(&network, 1001);

        session.connect().await.unwrap();
        session.stop_monitoring().await;
        assert_eq!(network.sends_to(STOP_MONITORING), 0);
    }

    #[tokio::test]
    async fn test_normal_sample_renders_without_alert() {
        let network = SimMonitorNetwork::new();
        let (mut session, render) = make_session(&network, 1001);

        session.on_sample(IndicatorSample::new(72, 36.6, 99, 1001));

        assert!(session.alert_history().is_empty());
        assert!(render.banners().is_empty());
        assert_eq!(render.field(Field::Heartrate).as_deref(), Some("72 bpm"));
        assert_eq!(render.field(Field::Status).as_deref(), Some("Normal"));
        assert_eq!(render.field(Field::StatusColor).as_deref(), Some("normal"));
    }

    #[tokio::test]
    async fn test_warning_sample_alerts_with_all_violations() {
        let network = SimMonitorNetwork::new();
        let (mut session, render) = make_session(&network, 1002);

        session.on_sample(IndicatorSample::new(45, 39.2, 88, 1002));

        assert_eq!(session.alert_history().len(), 1);
        let record = &session.alert_history()[0];
        assert_eq!(record.category, Category::Warning);
        assert!(record.message.contains("High temperature"));
        assert!(record.message.contains("Low heart rate"));
        assert!(record.message.contains("Low SpO2"));

        let banners = render.banners();
        assert_eq!(banners.len(), 1);
        assert_eq!(banners[0].0, BannerKind::Warning);
        assert_eq!(render.field(Field::Status).as_deref(), Some("Warning"));
    }

    #[tokio::test]
    async fn test_alert_history_capped_at_50_newest_first() {
        let network = SimMonitorNetwork::new();
        let (mut session, _render) = make_session(&network, 1001);

        for i in 0..51 {
            session.on_sample(warning_sample(101 + i, 1001));
        }

        assert_eq!(session.alert_history().len(), ALERT_HISTORY_CAP);
        // Newest first; the very first sample (101 bpm) was evicted.
        assert_eq!(session.alert_history()[0].sample.heartrate, 151);
        assert_eq!(session.alert_history()[49].sample.heartrate, 102);
        assert!(session
            .alert_history()
            .iter()
            .all(|r| r.sample.heartrate != 101));
    }

    #[tokio::test]
    async fn test_reload_rearms_monitoring() {
        let network = SimMonitorNetwork::new();
        let (mut session, render) = make_session(&network, 1001);

        session.connect().await.unwrap();
        session.start_monitoring().await.unwrap();

        session.reload().await.unwrap();

        assert!(session.is_connected());
        assert!(session.is_monitoring());
        assert_eq!(network.sends_to(START_MONITORING), 2);
        assert_eq!(render.field(Field::ConnectionStatus).as_deref(), Some("Connected"));
        assert_eq!(render.field(Field::MonitoringStatus).as_deref(), Some("Active"));
    }

    #[tokio::test]
    async fn test_reload_without_monitoring_does_not_arm() {
        let network = SimMonitorNetwork::new();
        let (mut session, _render) = make_session(&network, 1001);

        session.connect().await.unwrap();
        session.reload().await.unwrap();

        assert!(session.is_connected());
        assert!(!session.is_monitoring());
        assert_eq!(network.sends_to(START_MONITORING), 0);
    }

    #[tokio::test]
    async fn test_reload_failure_leaves_session_disconnected() {
        let network = SimMonitorNetwork::new();
        let (mut session, render) = make_session(&network, 1001);

        session.connect().await.unwrap();
        session.start_monitoring().await.unwrap();

        network.fail_connects(true);
        let err = session.reload().await.unwrap_err();

        assert!(matches!(err, SessionError::Reload(_)));
        assert!(!session.is_connected());
        assert!(!session.is_monitoring());
        assert_eq!(
            render.field(Field::ConnectionStatus).as_deref(),
            Some("Disconnected")
        );
        assert!(render
            .banners()
            .iter()
            .any(|(kind, text)| *kind == BannerKind::Error && text.contains("reload")));
    }

    #[tokio::test]
    async fn test_disconnect_is_idempotent_and_stops_monitoring() {
        let network = SimMonitorNetwork::new();
        let (mut session, render) = make_session(&network, 1001);

        session.connect().await.unwrap();
        session.start_monitoring().await.unwrap();

        session.disconnect().await;
        assert!(!session.is_connected());
        assert!(!session.is_monitoring());
        assert_eq!(network.sends_to(STOP_MONITORING), 1);

        // Second disconnect must be safe.
        session.disconnect().await;
        assert!(!session.is_connected());
        assert_eq!(
            render.field(Field::ConnectionStatus).as_deref(),
            Some("Disconnected")
        );
    }

    #[tokio::test]
    async fn test_visibility_loss_stops_monitoring_keeps_connection() {
        let network = SimMonitorNetwork::new();
        let (mut session, _render) = make_session(&network, 1001);

        session.connect().await.unwrap();
        session.start_monitoring().await.unwrap();

        session.on_visibility_hidden().await;

        assert!(!session.is_monitoring());
        assert!(session.is_connected());
    }

    #[tokio::test]
    async fn test_drive_delivers_published_samples() {
        let network = SimMonitorNetwork::new();
        let (mut session, _render) = make_session(&network, 1001);
        session.connect().await.unwrap();

        network.publish_sample(&IndicatorSample::new(72, 36.6, 99, 1001));
        // drive() runs until the subscription closes; give it a short window.
        let _ = tokio::time::timeout(Duration::from_millis(100), session.drive()).await;

        let current = session.current_sample().unwrap();
        assert_eq!(current.heartrate, 72);
    }

    #[tokio::test]
    async fn test_drive_skips_malformed_messages() {
        let network = SimMonitorNetwork::new();
        let (mut session, _render) = make_session(&network, 1001);
        session.connect().await.unwrap();

        // Garbage first, then a valid sample; only the latter should land.
        network.publish_raw(&indicators_topic(1001), "not json".to_string());
        network.publish_sample(&IndicatorSample::new(80, 36.5, 98, 1001));

        let _ = tokio::time::timeout(Duration::from_millis(100), session.drive()).await;
        assert_eq!(session.current_sample().unwrap().heartrate, 80);
    }
}
