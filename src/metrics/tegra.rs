//! Tegra sysfs telemetry: GPU load, fans, thermal zones and INA3221 power
//! monitors.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::types::{RailReading, SensorReading};

/// GPU load nodes, in lookup order (Nano/TX2/Xavier first, then Orin).
const GPU_LOAD_PATHS: &[&str] = &[
    "sys/devices/gpu.0/load",
    "sys/devices/platform/gpu.0/load",
    "sys/devices/platform/17000000.ga10b/load",
    "sys/devices/platform/17000000.gv11b/load",
];

const LEGACY_FAN_PWM: &str = "sys/devices/pwm-fan/target_pwm";
const HWMON_DIR: &str = "sys/class/hwmon";
const THERMAL_DIR: &str = "sys/class/thermal";
const INA3221X_DIR: &str = "sys/bus/i2c/drivers/ina3221x";

/// Tegra thermal drivers report this when a zone has no sensor behind it.
const OFFLINE_TEMP_MILLI: i64 = -256_000;

/// Aggregate channel exposed by the INA3221 driver, not a rail.
const SHUNT_SUM_LABEL: &str = "sum of shunt voltages";

/// GPU load in percent.
pub fn read_gpu_load(root: &Path) -> Option<f64> {
    GPU_LOAD_PATHS
        .iter()
        .find_map(|rel| read_number(&root.join(rel)))
        .map(|per_mille| per_mille / 10.0)
}

/// Fan speeds in percent of full PWM.
pub fn read_fans(root: &Path) -> Vec<f64> {
    if let Some(pwm) = read_number(&root.join(LEGACY_FAN_PWM)) {
        return vec![pwm_to_percent(pwm)];
    }

    sorted_entries(&root.join(HWMON_DIR))
        .into_iter()
        .filter(|dir| {
            matches!(
                read_trimmed(&dir.join("name")).as_deref(),
                Some("pwmfan") | Some("pwm-fan") | Some("pwm_fan")
            )
        })
        .filter_map(|dir| read_number(&dir.join("pwm1")))
        .map(pwm_to_percent)
        .collect()
}

/// Thermal zones keyed by sensor name. A zone whose short name is already
/// taken keeps its full type.
pub fn read_temperatures(root: &Path) -> BTreeMap<String, SensorReading> {
    let mut sensors = BTreeMap::new();

    for zone in sorted_entries(&root.join(THERMAL_DIR)) {
        let is_zone = zone
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.starts_with("thermal_zone"));
        if !is_zone {
            continue;
        }
        let Some(kind) = read_trimmed(&zone.join("type")) else {
            continue;
        };

        let reading = match read_number(&zone.join("temp")) {
            Some(milli) if milli as i64 != OFFLINE_TEMP_MILLI => SensorReading {
                online: true,
                temp: milli / 1000.0,
            },
            _ => SensorReading::default(),
        };
        let name = sensor_name(&kind);
        let name = if sensors.contains_key(&name) { kind } else { name };
        sensors.insert(name, reading);
    }

    sensors
}

/// Power rails from every INA3221 monitor on the board.
pub fn read_power_rails(root: &Path) -> BTreeMap<String, RailReading> {
    let mut rails = BTreeMap::new();

    for dir in sorted_entries(&root.join(HWMON_DIR)) {
        if read_trimmed(&dir.join("name")).as_deref() == Some("ina3221") {
            read_hwmon_rails(&dir, &mut rails);
        }
    }

    for device in sorted_entries(&root.join(INA3221X_DIR)) {
        for iio in sorted_entries(&device) {
            let is_iio = iio
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with("iio:device"));
            if is_iio {
                read_iio_rails(&iio, &mut rails);
            }
        }
    }

    rails
}

/// Mainline `ina3221` hwmon driver: `in<N>_label`, `in<N>_input` (mV),
/// `curr<N>_input` (mA).
fn read_hwmon_rails(dir: &Path, rails: &mut BTreeMap<String, RailReading>) {
    for channel in 1..=3 {
        let Some(label) = read_trimmed(&dir.join(format!("in{channel}_label"))) else {
            continue;
        };
        if label.eq_ignore_ascii_case(SHUNT_SUM_LABEL) {
            continue;
        }
        let enabled = read_number(&dir.join(format!("in{channel}_enable"))).unwrap_or(1.0) != 0.0;
        let volt = read_number(&dir.join(format!("in{channel}_input")));
        let curr = read_number(&dir.join(format!("curr{channel}_input")));

        let reading = match (enabled, volt, curr) {
            (true, Some(volt), Some(curr)) => RailReading {
                online: true,
                power: volt * curr / 1000.0,
                volt,
            },
            _ => RailReading::default(),
        };
        rails.insert(label, reading);
    }
}

/// Downstream `ina3221x` iio driver (L4T 32): `rail_name_<N>`,
/// `in_power<N>_input` (mW), `in_voltage<N>_input` (mV).
fn read_iio_rails(dir: &Path, rails: &mut BTreeMap<String, RailReading>) {
    for channel in 0..3 {
        let Some(label) = read_trimmed(&dir.join(format!("rail_name_{channel}"))) else {
            continue;
        };
        let power = read_number(&dir.join(format!("in_power{channel}_input")));
        let volt = read_number(&dir.join(format!("in_voltage{channel}_input")));

        let reading = match (power, volt) {
            (Some(power), Some(volt)) => RailReading {
                online: true,
                power,
                volt,
            },
            _ => RailReading::default(),
        };
        rails.insert(label, reading);
    }
}

/// `CPU-therm` becomes `CPU`, `gpu_thermal` becomes `gpu`.
fn sensor_name(kind: &str) -> String {
    ["-therm", "_thermal", "-thermal"]
        .iter()
        .find_map(|suffix| kind.strip_suffix(suffix))
        .unwrap_or(kind)
        .to_string()
}

fn pwm_to_percent(pwm: f64) -> f64 {
    pwm.clamp(0.0, 255.0) * 100.0 / 255.0
}

fn read_trimmed(path: &Path) -> Option<String> {
    let value = fs::read_to_string(path).ok()?;
    let value = value.trim();
    (!value.is_empty()).then(|| value.to_string())
}

fn read_number(path: &Path) -> Option<f64> {
    read_trimmed(path)?.parse().ok()
}

fn sorted_entries(dir: &Path) -> Vec<PathBuf> {
    let mut entries: Vec<PathBuf> = fs::read_dir(dir)
        .map(|rd| rd.filter_map(|e| e.ok()).map(|e| e.path()).collect())
        .unwrap_or_default();
    entries.sort();
    entries
}
