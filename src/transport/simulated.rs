//! In-process monitoring transport simulator
//!
//! Provides a simulated message broker with the same destination semantics
//! as the backend: starting monitoring spawns a per-patient emitter that
//! publishes a stable random-walk sample once per tick, stopping cancels it,
//! and the test destination publishes a single random normal sample. Used
//! for integration testing and the demo binary without a real backend.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use tokio::sync::broadcast;

use super::{
    indicators_topic, MonitorTransport, TransportError, SEND_TEST_INDICATORS, START_MONITORING,
    STOP_MONITORING,
};
use crate::types::IndicatorSample;

/// Capacity of each per-topic broadcast channel.
const TOPIC_CHANNEL_CAPACITY: usize = 128;

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// Generate one random sample inside the normal ranges
/// (SpO2 98-100, heartrate 60-100, temperature 36.0-36.9).
pub fn random_normal_sample(patient_id: i64) -> IndicatorSample {
    let mut rng = rand::thread_rng();
    IndicatorSample::new(
        rng.gen_range(60..=100),
        round1(36.0 + rng.gen::<f64>() * 0.9),
        rng.gen_range(98..=100),
        patient_id,
    )
}

/// Generate the next sample of a stable series: small variations around the
/// previous reading, clamped to the normal ranges. Seeds a fresh random
/// sample when there is no previous reading.
pub fn stable_next_sample(previous: Option<&IndicatorSample>, patient_id: i64) -> IndicatorSample {
    let previous = match previous {
        Some(p) => p,
        None => return random_normal_sample(patient_id),
    };
    let mut rng = rand::thread_rng();

    let temperature = (previous.temperature + (rng.gen::<f64>() - 0.5) * 0.2).clamp(36.0, 36.9);
    let heartrate = (previous.heartrate + rng.gen_range(-5..=5)).clamp(60, 100);
    let spo2 = (previous.spo2 + rng.gen_range(-1..=1)).clamp(98, 100);

    IndicatorSample::new(heartrate, round1(temperature), spo2, patient_id)
}

/// The simulated broker — a shared medium carrying topics and reacting to
/// the monitoring destinations the way the backend does.
pub struct SimMonitorNetwork {
    topics: Mutex<HashMap<String, broadcast::Sender<String>>>,
    /// Per-patient emitter liveness flags. An emitter task exits once its
    /// flag is cleared.
    active_monitors: Mutex<HashMap<i64, Arc<AtomicBool>>>,
    last_samples: Mutex<HashMap<i64, IndicatorSample>>,
    /// Every (destination, payload) pair accepted from clients, for test
    /// assertions.
    sent: Mutex<Vec<(String, String)>>,
    fail_connects: AtomicBool,
    emit_interval: Mutex<Duration>,
}

impl SimMonitorNetwork {
    /// Create a new simulated broker.
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            topics: Mutex::new(HashMap::new()),
            active_monitors: Mutex::new(HashMap::new()),
            last_samples: Mutex::new(HashMap::new()),
            sent: Mutex::new(Vec::new()),
            fail_connects: AtomicBool::new(false),
            emit_interval: Mutex::new(Duration::from_secs(1)),
        })
    }

    /// Create a new client on this broker.
    pub fn create_client(self: &Arc<Self>) -> SimMonitorClient {
        SimMonitorClient {
            network: Arc::clone(self),
            connected: AtomicBool::new(false),
        }
    }

    /// Make subsequent connect() calls fail, for error-path tests.
    pub fn fail_connects(&self, fail: bool) {
        self.fail_connects.store(fail, Ordering::SeqCst);
    }

    /// Override the emitter tick (default 1 s). Tests shorten it.
    pub fn set_emit_interval(&self, interval: Duration) {
        *self.emit_interval.lock().unwrap() = interval;
    }

    /// Destinations and payloads accepted so far, in order.
    pub fn sent_log(&self) -> Vec<(String, String)> {
        self.sent.lock().unwrap().clone()
    }

    /// Number of sends to a given destination.
    pub fn sends_to(&self, destination: &str) -> usize {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter(|(d, _)| d == destination)
            .count()
    }

    /// Whether an emitter is currently running for the patient.
    pub fn is_monitoring(&self, patient_id: i64) -> bool {
        self.active_monitors
            .lock()
            .unwrap()
            .get(&patient_id)
            .map(|flag| flag.load(Ordering::SeqCst))
            .unwrap_or(false)
    }

    /// Publish a sample directly onto the patient's topic, bypassing the
    /// emitter. Tests use this to inject exact readings.
    pub fn publish_sample(&self, sample: &IndicatorSample) {
        let body = match serde_json::to_string(sample) {
            Ok(body) => body,
            Err(e) => {
                log::warn!("[SimMonitor] Failed to serialize sample: {}", e);
                return;
            }
        };
        self.publish(&indicators_topic(sample.patient_id), body);
    }

    /// Publish a raw message body onto a topic. Tests use this to exercise
    /// subscriber handling of malformed payloads.
    pub fn publish_raw(&self, topic: &str, body: String) {
        self.publish(topic, body);
    }

    fn topic_sender(&self, topic: &str) -> broadcast::Sender<String> {
        let mut topics = self.topics.lock().unwrap();
        topics
            .entry(topic.to_string())
            .or_insert_with(|| broadcast::channel(TOPIC_CHANNEL_CAPACITY).0)
            .clone()
    }

    fn publish(&self, topic: &str, body: String) {
        // A send error just means no subscribers yet.
        let _ = self.topic_sender(topic).send(body);
    }

    fn handle_send(self: &Arc<Self>, destination: &str, payload: &str) -> Result<(), TransportError> {
        self.sent
            .lock()
            .unwrap()
            .push((destination.to_string(), payload.to_string()));

        let patient_id: i64 = payload
            .trim()
            .parse()
            .map_err(|_| TransportError::Send(format!("invalid patient id payload: {payload:?}")))?;

        match destination {
            START_MONITORING => {
                self.start_emitter(patient_id);
                Ok(())
            }
            STOP_MONITORING => {
                self.stop_emitter(patient_id);
                Ok(())
            }
            SEND_TEST_INDICATORS => {
                let sample = random_normal_sample(patient_id);
                self.last_samples
                    .lock()
                    .unwrap()
                    .insert(patient_id, sample.clone());
                self.publish_sample(&sample);
                Ok(())
            }
            other => Err(TransportError::Send(format!("unknown destination: {other}"))),
        }
    }

    fn start_emitter(self: &Arc<Self>, patient_id: i64) {
        let mut monitors = self.active_monitors.lock().unwrap();
        if let Some(flag) = monitors.get(&patient_id) {
            if flag.load(Ordering::SeqCst) {
                log::debug!("[SimMonitor] Emitter already running for patient {}", patient_id);
                return;
            }
        }

        let active = Arc::new(AtomicBool::new(true));
        monitors.insert(patient_id, Arc::clone(&active));
        drop(monitors);

        let network = Arc::clone(self);
        let interval = *self.emit_interval.lock().unwrap();
        tokio::spawn(async move {
            log::info!("[SimMonitor] Starting emitter for patient {}", patient_id);
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                if !active.load(Ordering::SeqCst) {
                    break;
                }
                let sample = {
                    let mut last = network.last_samples.lock().unwrap();
                    let next = stable_next_sample(last.get(&patient_id), patient_id);
                    last.insert(patient_id, next.clone());
                    next
                };
                network.publish_sample(&sample);
            }
            log::info!("[SimMonitor] Emitter stopped for patient {}", patient_id);
        });
    }

    fn stop_emitter(&self, patient_id: i64) {
        if let Some(flag) = self.active_monitors.lock().unwrap().remove(&patient_id) {
            flag.store(false, Ordering::SeqCst);
        }
        self.last_samples.lock().unwrap().remove(&patient_id);
    }
}

/// A client connection to the simulated broker.
pub struct SimMonitorClient {
    network: Arc<SimMonitorNetwork>,
    connected: AtomicBool,
}

#[async_trait]
impl MonitorTransport for SimMonitorClient {
    async fn connect(&self) -> Result<(), TransportError> {
        if self.network.fail_connects.load(Ordering::SeqCst) {
            return Err(TransportError::Connection(
                "simulated connect failure".to_string(),
            ));
        }
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn subscribe(
        &self,
        topic: &str,
    ) -> Result<broadcast::Receiver<String>, TransportError> {
        if !self.is_connected() {
            return Err(TransportError::NotConnected);
        }
        Ok(self.network.topic_sender(topic).subscribe())
    }

    async fn send(&self, destination: &str, payload: &str) -> Result<(), TransportError> {
        if !self.is_connected() {
            return Err(TransportError::NotConnected);
        }
        self.network.handle_send(destination, payload)
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        // In-process close completes immediately; the contract is only that
        // it has completed by the time this returns.
        self.connected.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}
