//! Data types describing one telemetry snapshot of a Jetson board.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

/// Placeholder used for board identity fields the board does not expose.
pub const NOT_AVAILABLE: &str = "N/A";

const GIB: f64 = 1024.0 * 1024.0 * 1024.0;

/// Board input rails end with this; they already include every other rail.
const INPUT_RAIL_SUFFIX: &str = "_IN";

/// Board identity, read once when the session opens.
#[derive(Clone, Debug, PartialEq)]
pub struct BoardInfo {
    pub machine: String,
    pub distribution: String,
    pub release: String,
    pub jetpack: String,
    pub l4t: String,
    pub module: String,
    pub model: String,
    pub codename: String,
    pub soc: String,
    pub cuda_arch_bin: String,
    pub serial_number: String,
    pub power_mode: String,
}

impl Default for BoardInfo {
    fn default() -> Self {
        let na = || NOT_AVAILABLE.to_string();
        Self {
            machine: na(),
            distribution: na(),
            release: na(),
            jetpack: na(),
            l4t: na(),
            module: na(),
            model: na(),
            codename: na(),
            soc: na(),
            cuda_arch_bin: na(),
            serial_number: na(),
            power_mode: na(),
        }
    }
}

/// System uptime as whole days plus the remaining seconds of the current day.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Uptime {
    pub days: u64,
    pub seconds: u64,
}

impl Uptime {
    pub fn from_secs(total: u64) -> Self {
        Self {
            days: total / 86_400,
            seconds: total % 86_400,
        }
    }

    /// Whole hours contained in the remainder seconds.
    pub fn hours(&self) -> u64 {
        self.seconds / 3600
    }

    /// Minutes past the hour.
    pub fn minutes(&self) -> u64 {
        (self.seconds / 60) % 60
    }
}

/// CPU idle percentages, per core and aggregate.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CpuUsage {
    pub cores: Vec<f64>,
    pub total_idle: f64,
}

/// Used/total pair in kilobytes.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct MemoryPool {
    pub used: f64,
    pub total: f64,
}

/// Memory and swap information.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct MemoryUsage {
    pub ram: MemoryPool,
    pub swap: MemoryPool,
}

/// Root filesystem usage in GiB.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct DiskUsage {
    pub total: f64,
    pub used: f64,
    pub available: f64,
    pub available_no_root: f64,
}

impl DiskUsage {
    /// Build from raw `statvfs` block counts.
    pub fn from_blocks(fragment_size: u64, blocks: u64, free: u64, available: u64) -> Self {
        let gib = |n: u64| (n as f64 * fragment_size as f64) / GIB;
        Self {
            total: gib(blocks),
            used: gib(blocks.saturating_sub(free)),
            available: gib(free),
            available_no_root: gib(available),
        }
    }
}

/// One thermal zone.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct SensorReading {
    pub online: bool,
    /// Degrees Celsius.
    pub temp: f64,
}

/// One monitored power rail.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct RailReading {
    pub online: bool,
    /// Milliwatts.
    pub power: f64,
    /// Millivolts.
    pub volt: f64,
}

/// Power rails plus the board draw: the online input rail when there is
/// one, else the sum of all online rails.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PowerUsage {
    pub rails: BTreeMap<String, RailReading>,
    pub total: f64,
}

impl PowerUsage {
    pub fn from_rails(rails: BTreeMap<String, RailReading>) -> Self {
        let input = rails
            .iter()
            .find(|(name, rail)| rail.online && name.ends_with(INPUT_RAIL_SUFFIX))
            .map(|(_, rail)| rail.power);
        let total = input
            .unwrap_or_else(|| rails.values().filter(|r| r.online).map(|r| r.power).sum());
        Self { rails, total }
    }
}

/// Aggregated board telemetry captured by one refresh.
#[derive(Clone, Debug)]
pub struct Snapshot {
    pub captured_at: DateTime<Utc>,
    pub board: BoardInfo,
    pub uptime: Uptime,
    pub cpu: CpuUsage,
    pub gpu_load: Option<f64>,
    pub memory: MemoryUsage,
    pub disk: Option<DiskUsage>,
    /// Fan speeds in percent, in discovery order.
    pub fans: Vec<f64>,
    pub temperatures: BTreeMap<String, SensorReading>,
    pub power: PowerUsage,
    /// Interface name to IP address.
    pub interfaces: BTreeMap<String, String>,
}
