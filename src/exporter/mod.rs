//! The scrape-time collector: turns the current telemetry snapshot into
//! Prometheus metric families.

mod family;

use std::sync::Arc;

use prometheus::core::{Collector, Desc};
use prometheus::proto::MetricFamily;
use thiserror::Error;
use tracing::{debug, error, trace, warn};

use crate::session::{SessionError, TelemetryError, TelemetrySession};
use crate::shutdown::ShutdownHook;
use family::{gauge_desc, info_desc, Family};

const BOARD: &str = "jetson_board";
const UPTIME: &str = "jetson_uptime";
const CPU: &str = "jetson_usage_cpu";
const GPU: &str = "jetson_usage_gpu";
const RAM: &str = "jetson_usage_ram";
const DISK: &str = "jetson_usage_disk";
const FAN: &str = "jetson_usage_fan";
const TEMPERATURES: &str = "jetson_temperatures";
const POWER: &str = "jetson_usage_power";
const VOLTAGES: &str = "jetson_voltages";
const NETWORK: &str = "jetson_network";

const BOARD_ATTRS: [&str; 12] = [
    "machine",
    "distribution",
    "release",
    "jetpack",
    "l4t",
    "module",
    "type",
    "codename",
    "soc",
    "cuda_arch_bin",
    "serial_number",
    "nvpmode",
];
const NETWORK_LABELS: [&str; 1] = ["interface_name"];
const NETWORK_ATTRS: [&str; 1] = ["ip_address"];

/// (family name, help, label names) for every gauge family.
const GAUGES: [(&str, &str, &[&str]); 9] = [
    (UPTIME, "System uptime", &["uptime"]),
    (CPU, "CPU % schedutil", &["cpu"]),
    (GPU, "GPU % schedutil", &["gpu"]),
    (RAM, "Memory usage", &["device", "type"]),
    (DISK, "Disk space usage", &["disk"]),
    (FAN, "Fan usage", &["fan"]),
    (TEMPERATURES, "Sensor temperatures", &["device"]),
    (POWER, "Power usage", &["power"]),
    (VOLTAGES, "Voltages", &["volts"]),
];

/// Label value of the aggregate power sample.
const POWER_TOTAL: &str = "total";

const BOARD_HELP: &str = "Board sys info";
const NETWORK_HELP: &str = "Network info";

/// Why one family was left out of a scrape.
#[derive(Debug, Error)]
pub enum CollectError {
    #[error(transparent)]
    Telemetry(#[from] TelemetryError),

    #[error("failed to build metric family: {0}")]
    Metric(#[from] prometheus::Error),
}

/// Why the collector could not be constructed.
#[derive(Debug, Error)]
pub enum StartError {
    #[error(transparent)]
    Session(#[from] SessionError),

    #[error("invalid metric descriptor: {0}")]
    Descriptor(#[from] prometheus::Error),
}

type SubCollector = fn(&TelemetryCollector) -> Result<Family, CollectError>;

/// Scrape order of the families.
const SUB_COLLECTORS: [(&str, SubCollector); 11] = [
    (BOARD, TelemetryCollector::collect_board_info),
    (UPTIME, TelemetryCollector::collect_uptime),
    (CPU, TelemetryCollector::collect_cpu_usage),
    (GPU, TelemetryCollector::collect_gpu_usage),
    (RAM, TelemetryCollector::collect_ram_usage),
    (DISK, TelemetryCollector::collect_disk_usage),
    (FAN, TelemetryCollector::collect_fan_usage),
    (TEMPERATURES, TelemetryCollector::collect_temperatures),
    (POWER, TelemetryCollector::collect_power_usage),
    (VOLTAGES, TelemetryCollector::collect_voltages),
    (NETWORK, TelemetryCollector::collect_network_interfaces),
];

/// Prometheus collector reading a [`TelemetrySession`] on every scrape.
pub struct TelemetryCollector {
    session: Arc<dyn TelemetrySession>,
    descs: Vec<Desc>,
}

impl TelemetryCollector {
    /// Register `session` with the shutdown hook and make sure it is ready.
    pub fn new(session: Arc<dyn TelemetrySession>, hook: &ShutdownHook) -> Result<Self, StartError> {
        hook.register(Arc::clone(&session));
        if !session.is_ready() {
            return Err(SessionError::NotReady.into());
        }
        Ok(Self {
            session,
            descs: descriptors()?,
        })
    }

    /// Build every family, omitting those whose telemetry could not be read.
    pub fn collect_families(&self) -> Vec<MetricFamily> {
        let mut families = Vec::with_capacity(SUB_COLLECTORS.len());

        for (name, collect) in SUB_COLLECTORS {
            match collect(self) {
                Ok(family) => {
                    trace!(family = name, samples = family.len(), "family collected");
                    families.extend(family.into_metric_families());
                }
                Err(CollectError::Telemetry(e)) if e.is_source_failure() => {
                    warn!(family = name, error = %e, "telemetry unavailable, family skipped");
                }
                Err(e) => {
                    error!(family = name, error = %e, "error collecting family, skipped");
                }
            }
        }

        debug!(families = families.len(), "collection pass finished");
        families
    }

    fn collect_board_info(&self) -> Result<Family, CollectError> {
        let board = self.session.board()?;
        let mut family = Family::info(BOARD, BOARD_HELP, &[], &BOARD_ATTRS)?;
        family.add_info(
            &[],
            &[
                board.machine.as_str(),
                board.distribution.as_str(),
                board.release.as_str(),
                board.jetpack.as_str(),
                board.l4t.as_str(),
                board.module.as_str(),
                board.model.as_str(),
                board.codename.as_str(),
                board.soc.as_str(),
                board.cuda_arch_bin.as_str(),
                board.serial_number.as_str(),
                board.power_mode.as_str(),
            ],
        )?;
        Ok(family)
    }

    fn collect_uptime(&self) -> Result<Family, CollectError> {
        let uptime = self.session.uptime()?;
        let mut family = gauge(UPTIME)?;
        family.add(&["days"], uptime.days as f64)?;
        family.add(&["hours"], uptime.hours() as f64)?;
        family.add(&["minutes"], uptime.minutes() as f64)?;
        Ok(family)
    }

    fn collect_cpu_usage(&self) -> Result<Family, CollectError> {
        let cpu = self.session.cpu()?;
        let mut family = gauge(CPU)?;
        for (i, idle) in cpu.cores.iter().enumerate() {
            let label = format!("cpu_{}", i + 1);
            family.add(&[label.as_str()], 100.0 - idle)?;
        }
        family.add(&["cpu_total"], 100.0 - cpu.total_idle)?;
        Ok(family)
    }

    fn collect_gpu_usage(&self) -> Result<Family, CollectError> {
        let load = self.session.gpu_load()?;
        let mut family = gauge(GPU)?;
        family.add(&["val"], load)?;
        Ok(family)
    }

    fn collect_ram_usage(&self) -> Result<Family, CollectError> {
        let memory = self.session.memory()?;
        let mut family = gauge(RAM)?;
        family.add(&["ram", "used"], memory.ram.used)?;
        family.add(&["ram", "total"], memory.ram.total)?;
        family.add(&["swap", "used"], memory.swap.used)?;
        family.add(&["swap", "total"], memory.swap.total)?;
        Ok(family)
    }

    fn collect_disk_usage(&self) -> Result<Family, CollectError> {
        let disk = self.session.disk()?;
        let mut family = gauge(DISK)?;
        family.add(&["used"], disk.used)?;
        family.add(&["total"], disk.total)?;
        family.add(&["available"], disk.available)?;
        family.add(&["available_no_root"], disk.available_no_root)?;
        Ok(family)
    }

    fn collect_fan_usage(&self) -> Result<Family, CollectError> {
        let fans = self.session.fans()?;
        let speed = fans
            .first()
            .copied()
            .ok_or(TelemetryError::MissingField { field: "fan" })?;
        let mut family = gauge(FAN)?;
        family.add(&["speed"], speed)?;
        Ok(family)
    }

    fn collect_temperatures(&self) -> Result<Family, CollectError> {
        let sensors = self.session.temperatures()?;
        let mut family = gauge(TEMPERATURES)?;
        for (name, sensor) in sensors.iter().filter(|(_, s)| s.online) {
            family.add(&[name.as_str()], sensor.temp)?;
        }
        Ok(family)
    }

    fn collect_power_usage(&self) -> Result<Family, CollectError> {
        let power = self.session.power()?;
        let mut family = gauge(POWER)?;
        for (name, rail) in power.rails.iter().filter(|(_, r)| r.online) {
            if name == POWER_TOTAL {
                warn!(rail = %name, "rail name collides with the power total, skipped");
                continue;
            }
            family.add(&[name.as_str()], rail.power)?;
        }
        family.add(&[POWER_TOTAL], power.total)?;
        Ok(family)
    }

    fn collect_voltages(&self) -> Result<Family, CollectError> {
        let power = self.session.power()?;
        let mut family = gauge(VOLTAGES)?;
        for (name, rail) in power.rails.iter().filter(|(_, r)| r.online) {
            family.add(&[name.as_str()], rail.volt)?;
        }
        Ok(family)
    }

    fn collect_network_interfaces(&self) -> Result<Family, CollectError> {
        let interfaces = self.session.interfaces()?;
        let mut family = Family::info(NETWORK, NETWORK_HELP, &NETWORK_LABELS, &NETWORK_ATTRS)?;
        for (name, ip) in &interfaces {
            family.add_info(&[name.as_str()], &[ip.as_str()])?;
        }
        Ok(family)
    }
}

impl Collector for TelemetryCollector {
    fn desc(&self) -> Vec<&Desc> {
        self.descs.iter().collect()
    }

    fn collect(&self) -> Vec<MetricFamily> {
        self.collect_families()
    }
}

fn gauge(name: &str) -> prometheus::Result<Family> {
    let (_, help, labels) = GAUGES
        .iter()
        .find(|(n, _, _)| *n == name)
        .ok_or_else(|| prometheus::Error::Msg(format!("unknown family {name}")))?;
    Family::gauge(name, help, labels)
}

fn descriptors() -> prometheus::Result<Vec<Desc>> {
    let mut descs = vec![info_desc(BOARD, BOARD_HELP, &[], &BOARD_ATTRS)?];
    for (name, help, labels) in GAUGES {
        descs.push(gauge_desc(name, help, labels)?);
    }
    descs.push(info_desc(NETWORK, NETWORK_HELP, &NETWORK_LABELS, &NETWORK_ATTRS)?);
    Ok(descs)
}
