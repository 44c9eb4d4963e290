// src/bin/monitor_demo.rs
//! Live-monitoring demo over the in-process simulated broker: connects a
//! session, requests a test sample, watches the per-patient emitter for a
//! while, reloads the connection mid-stream, and tears down cleanly.

use std::sync::Arc;
use std::time::Duration;

use vitalink::render::ConsoleRender;
use vitalink::session::{resolve_patient_id, MonitoringSession};
use vitalink::transport::simulated::SimMonitorNetwork;

const WATCH_WINDOW: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();

    let patient_arg = std::env::args().nth(1);
    let patient_env = std::env::var("PATIENT_ID").ok();
    let patient_id = resolve_patient_id(patient_arg.as_deref(), patient_env.as_deref());

    println!("Starting vitalink monitoring demo for patient {}", patient_id);

    let network = SimMonitorNetwork::new();
    let mut session = MonitoringSession::new(
        patient_id,
        Arc::new(network.create_client()),
        Arc::new(ConsoleRender),
    );

    session.connect().await?;
    session.send_test_sample().await?;
    session.start_monitoring().await?;

    println!("Watching live indicators for {:?}...", WATCH_WINDOW);
    let _ = tokio::time::timeout(WATCH_WINDOW, session.drive()).await;

    println!("Reloading the monitoring connection...");
    session.reload().await?;

    println!("Watching live indicators for {:?} after reload...", WATCH_WINDOW);
    let _ = tokio::time::timeout(WATCH_WINDOW, session.drive()).await;

    session.disconnect().await;
    println!(
        "Demo complete: {} alerts recorded",
        session.alert_history().len()
    );
    Ok(())
}
