//! Telemetry sessions: the live source the exporter reads on every scrape.

use std::collections::BTreeMap;

use thiserror::Error;

use crate::types::{
    BoardInfo, CpuUsage, DiskUsage, MemoryUsage, PowerUsage, SensorReading, Uptime,
};

#[cfg(test)]
pub mod fake;
mod jetson;

pub use jetson::{JetsonSession, SessionOptions};

/// Failures opening or closing a session.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("no Jetson board found under {0} (missing device tree model)")]
    DeviceNotFound(String),

    #[error("telemetry session is not ready")]
    NotReady,

    #[error("failed to start telemetry refresher: {0}")]
    Io(#[from] std::io::Error),
}

/// Failures reading one field from an open session.
#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("telemetry session is closed")]
    Closed,

    #[error("telemetry snapshot is stale ({age_secs}s old)")]
    Stale { age_secs: u64 },

    #[error("{field} telemetry is unavailable")]
    Unavailable { field: &'static str },

    #[error("{field} telemetry is missing")]
    MissingField { field: &'static str },

    #[error("malformed {field} telemetry: {reason}")]
    Malformed { field: &'static str, reason: String },
}

impl TelemetryError {
    /// Whether the session itself failed, as opposed to one odd field.
    pub fn is_source_failure(&self) -> bool {
        matches!(
            self,
            TelemetryError::Closed | TelemetryError::Stale { .. } | TelemetryError::Unavailable { .. }
        )
    }
}

pub type TelemetryResult<T> = Result<T, TelemetryError>;

/// A read-only view of board telemetry, refreshed by the session itself.
///
/// Accessors return owned copies of the current snapshot so the caller never
/// holds a lock across metric construction.
pub trait TelemetrySession: Send + Sync {
    fn is_ready(&self) -> bool;

    /// Stop refreshing and release the device. Calling it again is a no-op.
    fn close(&self);

    fn board(&self) -> TelemetryResult<BoardInfo>;
    fn uptime(&self) -> TelemetryResult<Uptime>;
    fn cpu(&self) -> TelemetryResult<CpuUsage>;
    /// GPU load in percent.
    fn gpu_load(&self) -> TelemetryResult<f64>;
    fn memory(&self) -> TelemetryResult<MemoryUsage>;
    fn disk(&self) -> TelemetryResult<DiskUsage>;
    /// Fan speeds in percent.
    fn fans(&self) -> TelemetryResult<Vec<f64>>;
    fn temperatures(&self) -> TelemetryResult<BTreeMap<String, SensorReading>>;
    fn power(&self) -> TelemetryResult<PowerUsage>;
    /// Interface name to IP address.
    fn interfaces(&self) -> TelemetryResult<BTreeMap<String, String>>;
}
