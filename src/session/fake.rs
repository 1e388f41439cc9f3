use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use chrono::Utc;

use super::{TelemetryError, TelemetryResult, TelemetrySession};
use crate::types::{
    BoardInfo, CpuUsage, DiskUsage, MemoryPool, MemoryUsage, PowerUsage, RailReading,
    SensorReading, Snapshot, Uptime,
};

/// In-memory session used in tests; any field can be made to fail.
pub struct FakeSession {
    snapshot: Mutex<Snapshot>,
    ready: bool,
    failing: Mutex<HashSet<&'static str>>,
    closed: AtomicBool,
    close_calls: AtomicUsize,
}

impl FakeSession {
    pub fn new(snapshot: Snapshot) -> Self {
        Self {
            snapshot: Mutex::new(snapshot),
            ready: true,
            failing: Mutex::new(HashSet::new()),
            closed: AtomicBool::new(false),
            close_calls: AtomicUsize::new(0),
        }
    }

    pub fn not_ready(snapshot: Snapshot) -> Self {
        Self {
            ready: false,
            ..Self::new(snapshot)
        }
    }

    /// Make reads of `field` fail. Source failures use `Unavailable`, every
    /// other field a `Malformed` error.
    pub fn fail(&self, field: &'static str) {
        self.failing.lock().unwrap().insert(field);
    }

    pub fn update(&self, f: impl FnOnce(&mut Snapshot)) {
        f(&mut self.snapshot.lock().unwrap());
    }

    pub fn close_calls(&self) -> usize {
        self.close_calls.load(Ordering::SeqCst)
    }

    fn read<T>(&self, field: &'static str, f: impl FnOnce(&Snapshot) -> T) -> TelemetryResult<T> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(TelemetryError::Closed);
        }
        if self.failing.lock().unwrap().contains(field) {
            return Err(match field {
                "memory" | "power" => TelemetryError::Unavailable { field },
                _ => TelemetryError::Malformed {
                    field,
                    reason: "injected".into(),
                },
            });
        }
        Ok(f(&self.snapshot.lock().unwrap()))
    }
}

impl TelemetrySession for FakeSession {
    fn is_ready(&self) -> bool {
        self.ready && !self.closed.load(Ordering::SeqCst)
    }

    fn close(&self) {
        self.close_calls.fetch_add(1, Ordering::SeqCst);
        self.closed.store(true, Ordering::SeqCst);
    }

    fn board(&self) -> TelemetryResult<BoardInfo> {
        self.read("board", |s| s.board.clone())
    }

    fn uptime(&self) -> TelemetryResult<Uptime> {
        self.read("uptime", |s| s.uptime)
    }

    fn cpu(&self) -> TelemetryResult<CpuUsage> {
        self.read("cpu", |s| s.cpu.clone())
    }

    fn gpu_load(&self) -> TelemetryResult<f64> {
        self.read("gpu", |s| s.gpu_load)?
            .ok_or(TelemetryError::MissingField { field: "gpu" })
    }

    fn memory(&self) -> TelemetryResult<MemoryUsage> {
        self.read("memory", |s| s.memory)
    }

    fn disk(&self) -> TelemetryResult<DiskUsage> {
        self.read("disk", |s| s.disk)?
            .ok_or(TelemetryError::MissingField { field: "disk" })
    }

    fn fans(&self) -> TelemetryResult<Vec<f64>> {
        self.read("fans", |s| s.fans.clone())
    }

    fn temperatures(&self) -> TelemetryResult<BTreeMap<String, SensorReading>> {
        self.read("temperatures", |s| s.temperatures.clone())
    }

    fn power(&self) -> TelemetryResult<PowerUsage> {
        self.read("power", |s| s.power.clone())
    }

    fn interfaces(&self) -> TelemetryResult<BTreeMap<String, String>> {
        self.read("interfaces", |s| s.interfaces.clone())
    }
}

/// A Jetson Nano at rest: two cores, one offline sensor, one offline rail.
pub fn nano_snapshot() -> Snapshot {
    let mut temperatures = BTreeMap::new();
    temperatures.insert(
        "CPU".to_string(),
        SensorReading {
            online: true,
            temp: 36.5,
        },
    );
    temperatures.insert(
        "GPU".to_string(),
        SensorReading {
            online: true,
            temp: 34.0,
        },
    );
    temperatures.insert("PMIC".to_string(), SensorReading::default());

    let mut rails = BTreeMap::new();
    rails.insert(
        "POM_5V_IN".to_string(),
        RailReading {
            online: true,
            power: 2100.0,
            volt: 5064.0,
        },
    );
    rails.insert(
        "POM_5V_GPU".to_string(),
        RailReading {
            online: true,
            power: 40.0,
            volt: 5048.0,
        },
    );
    rails.insert("POM_5V_CPU".to_string(), RailReading::default());

    let mut interfaces = BTreeMap::new();
    interfaces.insert("eth0".to_string(), "192.168.1.40".to_string());
    interfaces.insert("wlan0".to_string(), "10.0.0.7".to_string());

    Snapshot {
        captured_at: Utc::now(),
        board: BoardInfo {
            machine: "aarch64".into(),
            distribution: "Ubuntu 18.04".into(),
            release: "4.9.253-tegra".into(),
            jetpack: "4.6.1".into(),
            l4t: "32.7.1".into(),
            module: "NVIDIA Jetson Nano Developer Kit".into(),
            model: "Jetson Nano Developer Kit".into(),
            codename: "jetson-nano".into(),
            soc: "tegra210".into(),
            cuda_arch_bin: "5.3".into(),
            serial_number: "1422019012345".into(),
            power_mode: "MAXN".into(),
        },
        uptime: Uptime {
            days: 1,
            seconds: 3661,
        },
        cpu: CpuUsage {
            cores: vec![20.0, 40.0],
            total_idle: 30.0,
        },
        gpu_load: Some(12.5),
        memory: MemoryUsage {
            ram: MemoryPool {
                used: 1_500_000.0,
                total: 4_057_104.0,
            },
            swap: MemoryPool {
                used: 0.0,
                total: 2_028_544.0,
            },
        },
        disk: Some(DiskUsage {
            total: 31.2,
            used: 14.8,
            available: 16.4,
            available_no_root: 14.8,
        }),
        fans: vec![35.0, 80.0],
        temperatures,
        power: PowerUsage::from_rails(rails),
        interfaces,
    }
}
