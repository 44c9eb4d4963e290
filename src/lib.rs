// Vitalink - Medical Telemetry Monitoring Client

pub mod api;
pub mod demo;
pub mod render;
pub mod session;
pub mod transport;
pub mod types;
