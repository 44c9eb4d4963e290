//! Rendering port for the monitoring dashboard
//!
//! The session never touches a rendering environment directly; it pushes
//! named field updates and transient banners through this port. Implementing
//! it over a real UI (or over nothing at all, in tests) keeps the session
//! logic independent of any display technology.

use std::fmt;
use std::sync::Mutex;
use std::time::Duration;

/// Advisory lifetime for transient banners. Implementations that display
/// banners persistently are expected to drop them after this long
/// (fire-and-forget; dropping earlier on user dismissal is fine).
pub const BANNER_DISMISS_AFTER: Duration = Duration::from_secs(10);

/// Named dashboard fields the session updates.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Field {
    Heartrate,
    Temperature,
    Spo2,
    Timestamp,
    Status,
    StatusDescription,
    StatusColor,
    ConnectionStatus,
    MonitoringStatus,
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Field::Heartrate => "heartrate",
            Field::Temperature => "temperature",
            Field::Spo2 => "spo2",
            Field::Timestamp => "timestamp",
            Field::Status => "status",
            Field::StatusDescription => "status-description",
            Field::StatusColor => "status-color",
            Field::ConnectionStatus => "connection-status",
            Field::MonitoringStatus => "monitoring-status",
        };
        write!(f, "{}", name)
    }
}

/// Severity of a transient banner.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BannerKind {
    Info,
    Warning,
    Error,
}

impl fmt::Display for BannerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BannerKind::Info => "INFO",
            BannerKind::Warning => "WARNING",
            BannerKind::Error => "ERROR",
        };
        write!(f, "{}", name)
    }
}

/// The port the session renders through.
pub trait RenderPort: Send + Sync {
    /// Update a named field with a display value.
    fn set_field(&self, field: Field, value: &str);

    /// Show an ephemeral banner.
    fn show_banner(&self, kind: BannerKind, text: &str);
}

/// Render port that writes to the terminal. Used by the demo binary.
pub struct ConsoleRender;

impl RenderPort for ConsoleRender {
    fn set_field(&self, field: Field, value: &str) {
        println!("  {} = {}", field, value);
    }

    fn show_banner(&self, kind: BannerKind, text: &str) {
        match kind {
            BannerKind::Error => log::error!("[banner] {}", text),
            BannerKind::Warning => log::warn!("[banner] {}", text),
            BannerKind::Info => log::info!("[banner] {}", text),
        }
        println!("! {}: {}", kind, text);
    }
}

/// Render port that records everything it is given. Test double.
#[derive(Default)]
pub struct RecordingRender {
    fields: Mutex<Vec<(Field, String)>>,
    banners: Mutex<Vec<(BannerKind, String)>>,
}

impl RecordingRender {
    pub fn new() -> Self {
        Self::default()
    }

    /// Most recent value written to a field, if any.
    pub fn field(&self, field: Field) -> Option<String> {
        self.fields
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|(f, _)| *f == field)
            .map(|(_, v)| v.clone())
    }

    /// All banners shown so far.
    pub fn banners(&self) -> Vec<(BannerKind, String)> {
        self.banners.lock().unwrap().clone()
    }

    /// Full field update log, in order.
    pub fn field_log(&self) -> Vec<(Field, String)> {
        self.fields.lock().unwrap().clone()
    }
}

impl RenderPort for RecordingRender {
    fn set_field(&self, field: Field, value: &str) {
        self.fields.lock().unwrap().push((field, value.to_string()));
    }

    fn show_banner(&self, kind: BannerKind, text: &str) {
        self.banners
            .lock()
            .unwrap()
            .push((kind, text.to_string()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_render_keeps_latest_field_value() {
        let render = RecordingRender::new();
        render.set_field(Field::Heartrate, "72 bpm");
        render.set_field(Field::Heartrate, "75 bpm");
        assert_eq!(render.field(Field::Heartrate).as_deref(), Some("75 bpm"));
        assert_eq!(render.field(Field::Spo2), None);
        assert_eq!(render.field_log().len(), 2);
    }

    #[test]
    fn test_banner_log_preserves_order() {
        let render = RecordingRender::new();
        render.show_banner(BannerKind::Warning, "first");
        render.show_banner(BannerKind::Error, "second");
        let banners = render.banners();
        assert_eq!(banners[0], (BannerKind::Warning, "first".to_string()));
        assert_eq!(banners[1], (BannerKind::Error, "second".to_string()));
    }
}
