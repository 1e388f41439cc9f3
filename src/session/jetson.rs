//! Live session backed by sysfs, procfs and `sysinfo`, refreshed on a
//! background thread.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use chrono::{DateTime, Utc};
use sysinfo::{Networks, System, MINIMUM_CPU_UPDATE_INTERVAL};
use tracing::{debug, info, warn};

use super::{SessionError, TelemetryError, TelemetryResult, TelemetrySession};
use crate::metrics::{
    collect_cpu, collect_disk, collect_interfaces, collect_memory, collect_uptime,
    query_power_mode, read_board_info, read_fans, read_gpu_load, read_power_rails,
    read_temperatures,
};
use crate::types::{
    BoardInfo, CpuUsage, DiskUsage, MemoryUsage, PowerUsage, SensorReading, Snapshot, Uptime,
};
use crate::utils::{format_duration, format_kilobytes};

/// Snapshots older than this many refresh intervals are reported stale.
const STALE_AFTER_INTERVALS: u32 = 5;

/// `nvpmodel` is a subprocess, so the power mode is re-queried less often.
const POWER_MODE_EVERY: u64 = 30;

#[derive(Clone, Debug)]
pub struct SessionOptions {
    /// Filesystem root the sysfs/procfs paths are resolved against.
    pub root: PathBuf,
    pub interval: Duration,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            root: PathBuf::from("/"),
            interval: Duration::from_secs(1),
        }
    }
}

/// Owns the data sources; lives on the refresher thread.
struct Sampler {
    root: PathBuf,
    system: System,
    networks: Networks,
    board: BoardInfo,
    samples: u64,
}

impl Sampler {
    fn new(root: PathBuf, board: BoardInfo) -> Self {
        let mut system = System::new();
        system.refresh_cpu_usage();
        Self {
            root,
            system,
            networks: Networks::new_with_refreshed_list(),
            board,
            samples: 0,
        }
    }

    fn sample(&mut self) -> Snapshot {
        self.system.refresh_cpu_usage();
        self.system.refresh_memory();
        self.networks.refresh_list();

        if self.samples % POWER_MODE_EVERY == 0 {
            if let Some(mode) = query_power_mode() {
                self.board.power_mode = mode;
            }
        }
        self.samples += 1;

        let disk = match collect_disk(&self.root) {
            Ok(disk) => Some(disk),
            Err(errno) => {
                debug!(error = %errno, "statvfs failed");
                None
            }
        };

        Snapshot {
            captured_at: Utc::now(),
            board: self.board.clone(),
            uptime: collect_uptime(),
            cpu: collect_cpu(&self.system),
            gpu_load: read_gpu_load(&self.root),
            memory: collect_memory(&self.system),
            disk,
            fans: read_fans(&self.root),
            temperatures: read_temperatures(&self.root),
            power: PowerUsage::from_rails(read_power_rails(&self.root)),
            interfaces: collect_interfaces(&self.networks),
        }
    }
}

/// Telemetry session for the board the process runs on.
pub struct JetsonSession {
    snapshot: Arc<RwLock<Snapshot>>,
    closed: AtomicBool,
    stop: Mutex<Option<Sender<()>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
    max_age: Duration,
}

impl JetsonSession {
    /// Detect the board, take the first snapshot and start the refresher.
    pub fn open(options: SessionOptions) -> Result<Self, SessionError> {
        let board = read_board_info(&options.root)
            .ok_or_else(|| SessionError::DeviceNotFound(options.root.display().to_string()))?;

        let mut sampler = Sampler::new(options.root, board);
        // CPU usage is a delta between two refreshes.
        thread::sleep(MINIMUM_CPU_UPDATE_INTERVAL);
        let first = sampler.sample();

        info!(
            module = %first.board.module,
            l4t = %first.board.l4t,
            jetpack = %first.board.jetpack,
            power_mode = %first.board.power_mode,
            ram = %format_kilobytes(first.memory.ram.total),
            uptime = %format_duration(first.uptime.days * 86_400 + first.uptime.seconds),
            "telemetry session opened"
        );

        let snapshot = Arc::new(RwLock::new(first));
        let (stop_tx, stop_rx) = mpsc::channel();
        let shared = Arc::clone(&snapshot);
        let interval = options.interval;
        let worker = thread::Builder::new()
            .name("jetson-telemetry".into())
            .spawn(move || {
                loop {
                    match stop_rx.recv_timeout(interval) {
                        Err(RecvTimeoutError::Timeout) => {
                            let next = sampler.sample();
                            *shared.write().unwrap_or_else(PoisonError::into_inner) = next;
                        }
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
                debug!("telemetry refresher stopped");
            })?;

        Ok(Self {
            snapshot,
            closed: AtomicBool::new(false),
            stop: Mutex::new(Some(stop_tx)),
            worker: Mutex::new(Some(worker)),
            max_age: interval * STALE_AFTER_INTERVALS,
        })
    }

    fn read<T>(&self, f: impl FnOnce(&Snapshot) -> T) -> TelemetryResult<T> {
        if self.closed.load(Ordering::Acquire) {
            return Err(TelemetryError::Closed);
        }
        if !self.worker_alive() {
            return Err(TelemetryError::Unavailable { field: "refresher" });
        }
        let snapshot = self.snapshot.read().unwrap_or_else(PoisonError::into_inner);
        check_age(snapshot.captured_at, Utc::now(), self.max_age)?;
        Ok(f(&snapshot))
    }

    fn worker_alive(&self) -> bool {
        self.worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }
}

impl TelemetrySession for JetsonSession {
    fn is_ready(&self) -> bool {
        self.read(|_| ()).is_ok()
    }

    fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        drop(self.stop.lock().unwrap_or_else(PoisonError::into_inner).take());
        let worker = self
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = worker {
            if handle.join().is_err() {
                warn!("telemetry refresher panicked");
            }
        }
    }

    fn board(&self) -> TelemetryResult<BoardInfo> {
        self.read(|s| s.board.clone())
    }

    fn uptime(&self) -> TelemetryResult<Uptime> {
        self.read(|s| s.uptime)
    }

    fn cpu(&self) -> TelemetryResult<CpuUsage> {
        let cpu = self.read(|s| s.cpu.clone())?;
        if cpu.cores.is_empty() {
            return Err(TelemetryError::MissingField { field: "cpu" });
        }
        Ok(cpu)
    }

    fn gpu_load(&self) -> TelemetryResult<f64> {
        self.read(|s| s.gpu_load)?
            .ok_or(TelemetryError::MissingField { field: "gpu" })
    }

    fn memory(&self) -> TelemetryResult<MemoryUsage> {
        self.read(|s| s.memory)
    }

    fn disk(&self) -> TelemetryResult<DiskUsage> {
        self.read(|s| s.disk)?
            .ok_or(TelemetryError::MissingField { field: "disk" })
    }

    fn fans(&self) -> TelemetryResult<Vec<f64>> {
        self.read(|s| s.fans.clone())
    }

    fn temperatures(&self) -> TelemetryResult<BTreeMap<String, SensorReading>> {
        self.read(|s| s.temperatures.clone())
    }

    fn power(&self) -> TelemetryResult<PowerUsage> {
        let power = self.read(|s| s.power.clone())?;
        if !power.total.is_finite() {
            return Err(TelemetryError::Malformed {
                field: "power",
                reason: format!("total draw {}", power.total),
            });
        }
        Ok(power)
    }

    fn interfaces(&self) -> TelemetryResult<BTreeMap<String, String>> {
        self.read(|s| s.interfaces.clone())
    }
}

impl Drop for JetsonSession {
    fn drop(&mut self) {
        self.close();
    }
}

fn check_age(captured_at: DateTime<Utc>, now: DateTime<Utc>, max_age: Duration) -> TelemetryResult<()> {
    match (now - captured_at).to_std() {
        Ok(age) if age > max_age => Err(TelemetryError::Stale {
            age_secs: age.as_secs(),
        }),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;

    fn fake_board(root: &Path) {
        let dt = root.join("proc/device-tree");
        fs::create_dir_all(&dt).unwrap();
        fs::write(dt.join("model"), b"NVIDIA Jetson Xavier NX Developer Kit\0").unwrap();
        fs::write(
            dt.join("compatible"),
            b"nvidia,p3509-0000+p3668-0001\0nvidia,jetson-xavier-nx\0nvidia,tegra194\0",
        )
        .unwrap();

        let zone = root.join("sys/class/thermal/thermal_zone0");
        fs::create_dir_all(&zone).unwrap();
        fs::write(zone.join("type"), "CPU-therm\n").unwrap();
        fs::write(zone.join("temp"), "38000\n").unwrap();

        let gpu = root.join("sys/devices/gpu.0");
        fs::create_dir_all(&gpu).unwrap();
        fs::write(gpu.join("load"), "120\n").unwrap();
    }

    fn options(root: &Path) -> SessionOptions {
        SessionOptions {
            root: root.to_path_buf(),
            interval: Duration::from_millis(100),
        }
    }

    #[test]
    fn open_fails_without_a_board() {
        let dir = TempDir::new().unwrap();
        let err = JetsonSession::open(options(dir.path())).err().unwrap();
        assert!(matches!(err, SessionError::DeviceNotFound(_)));
    }

    #[test]
    fn open_reads_the_fake_board() {
        let dir = TempDir::new().unwrap();
        fake_board(dir.path());

        let session = JetsonSession::open(options(dir.path())).unwrap();
        assert!(session.is_ready());

        let board = session.board().unwrap();
        assert_eq!(board.soc, "tegra194");
        assert_eq!(board.codename, "jetson-xavier-nx");
        assert_eq!(session.gpu_load().unwrap(), 12.0);
        assert!(session.temperatures().unwrap()["CPU"].online);
        assert!(session.fans().unwrap().is_empty());

        session.close();
    }

    #[test]
    fn close_is_idempotent_and_stops_reads() {
        let dir = TempDir::new().unwrap();
        fake_board(dir.path());

        let session = JetsonSession::open(options(dir.path())).unwrap();
        session.close();
        session.close();

        assert!(!session.is_ready());
        assert!(matches!(session.uptime(), Err(TelemetryError::Closed)));
    }

    #[test]
    fn refresher_keeps_snapshot_fresh() {
        let dir = TempDir::new().unwrap();
        fake_board(dir.path());

        let session = JetsonSession::open(options(dir.path())).unwrap();
        thread::sleep(Duration::from_millis(400));
        assert!(session.memory().is_ok());
        session.close();
    }

    #[test]
    fn old_snapshots_are_stale() {
        let now = Utc::now();
        let max_age = Duration::from_secs(5);
        assert!(check_age(now, now, max_age).is_ok());

        let old = now - chrono::Duration::seconds(10);
        let err = check_age(old, now, max_age).unwrap_err();
        assert!(matches!(err, TelemetryError::Stale { age_secs: 10 }));
        assert!(err.is_source_failure());

        // Clock skew into the future is not staleness.
        let ahead = now + chrono::Duration::seconds(10);
        assert!(check_age(ahead, now, max_age).is_ok());
    }
}
