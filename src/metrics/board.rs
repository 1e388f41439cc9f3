//! Board identity: device tree, L4T release file and the active power mode.

use std::fs;
use std::path::Path;
use std::process::Command;

use sysinfo::System;

use crate::types::{BoardInfo, NOT_AVAILABLE};

const DT_MODEL: &str = "proc/device-tree/model";
const DT_COMPATIBLE: &str = "proc/device-tree/compatible";
const DT_SERIAL: &str = "proc/device-tree/serial-number";
const TEGRA_RELEASE: &str = "etc/nv_tegra_release";

/// L4T release to JetPack version.
const JETPACK_RELEASES: &[(&str, &str)] = &[
    ("36.4.3", "6.2"),
    ("36.4.0", "6.1"),
    ("36.3.0", "6.0"),
    ("36.2.0", "6.0 DP"),
    ("35.6.0", "5.1.4"),
    ("35.5.0", "5.1.3"),
    ("35.4.1", "5.1.2"),
    ("35.3.1", "5.1.1"),
    ("35.2.1", "5.1"),
    ("35.1.0", "5.0.2"),
    ("34.1.1", "5.0.1 DP"),
    ("34.1.0", "5.0 DP"),
    ("32.7.6", "4.6.6"),
    ("32.7.5", "4.6.5"),
    ("32.7.4", "4.6.4"),
    ("32.7.3", "4.6.3"),
    ("32.7.2", "4.6.2"),
    ("32.7.1", "4.6.1"),
    ("32.6.1", "4.6"),
    ("32.5.2", "4.5.1"),
    ("32.5.1", "4.5.1"),
    ("32.5.0", "4.5"),
    ("32.4.4", "4.4.1"),
    ("32.4.3", "4.4"),
    ("32.4.2", "4.4 DP"),
    ("32.3.1", "4.3"),
    ("32.2.3", "4.2.3"),
    ("32.2.1", "4.2.2"),
    ("32.2.0", "4.2.1"),
    ("32.1.0", "4.2"),
];

/// SoC to CUDA compute capability.
const CUDA_ARCH: &[(&str, &str)] = &[
    ("tegra210", "5.3"),
    ("tegra186", "6.2"),
    ("tegra194", "7.2"),
    ("tegra234", "8.7"),
];

/// Read the board identity below `root`.
///
/// Returns `None` when the device tree has no model, i.e. the host is not a
/// Jetson (or the tree is not mounted).
pub fn read_board_info(root: &Path) -> Option<BoardInfo> {
    let module = read_dt_string(&root.join(DT_MODEL))?;

    let compatible = fs::read(root.join(DT_COMPATIBLE)).unwrap_or_default();
    let (codename, soc) = parse_compatible(&compatible);

    let l4t = fs::read_to_string(root.join(TEGRA_RELEASE))
        .ok()
        .and_then(|s| parse_l4t_release(&s));
    let jetpack = l4t.as_deref().and_then(jetpack_for_l4t);
    let cuda_arch_bin = soc.as_deref().and_then(cuda_arch_for_soc);

    let distribution = match (System::name(), System::os_version()) {
        (Some(name), Some(version)) => format!("{name} {version}"),
        (Some(name), None) => name,
        _ => NOT_AVAILABLE.into(),
    };

    Some(BoardInfo {
        machine: System::cpu_arch().unwrap_or_else(|| NOT_AVAILABLE.into()),
        distribution,
        release: System::kernel_version().unwrap_or_else(|| NOT_AVAILABLE.into()),
        jetpack: jetpack.unwrap_or(NOT_AVAILABLE).to_string(),
        l4t: l4t.unwrap_or_else(|| NOT_AVAILABLE.into()),
        model: model_type(&module),
        module,
        codename: codename.unwrap_or_else(|| NOT_AVAILABLE.into()),
        soc: soc.unwrap_or_else(|| NOT_AVAILABLE.into()),
        cuda_arch_bin: cuda_arch_bin.unwrap_or(NOT_AVAILABLE).to_string(),
        serial_number: read_dt_string(&root.join(DT_SERIAL))
            .unwrap_or_else(|| NOT_AVAILABLE.into()),
        power_mode: NOT_AVAILABLE.into(),
    })
}

/// Query the active nvpmodel power mode name.
pub fn query_power_mode() -> Option<String> {
    let output = Command::new("nvpmodel").arg("-q").output().ok()?;
    if !output.status.success() {
        return None;
    }
    parse_power_mode(&String::from_utf8_lossy(&output.stdout))
}

/// Device tree strings are NUL terminated.
fn read_dt_string(path: &Path) -> Option<String> {
    let raw = fs::read(path).ok()?;
    let text = String::from_utf8_lossy(&raw);
    let value = text.trim_end_matches('\0').trim();
    (!value.is_empty()).then(|| value.to_string())
}

/// Split a device tree `compatible` list into (codename, soc).
///
/// `nvidia,p3450-0000\0nvidia,jetson-nano\0nvidia,tegra210\0` gives
/// `("jetson-nano", "tegra210")`.
fn parse_compatible(raw: &[u8]) -> (Option<String>, Option<String>) {
    let entries: Vec<&str> = raw
        .split(|b| *b == 0)
        .filter_map(|e| std::str::from_utf8(e).ok())
        .map(|e| e.rsplit(',').next().unwrap_or(e).trim())
        .filter(|e| !e.is_empty())
        .collect();

    let soc = entries
        .iter()
        .rev()
        .find(|e| e.starts_with("tegra"))
        .map(|e| e.to_string());
    let codename = entries
        .iter()
        .rev()
        .find(|e| !e.starts_with("tegra") && !e.starts_with('p'))
        .or_else(|| entries.iter().rev().find(|e| !e.starts_with("tegra")))
        .map(|e| e.to_string());

    (codename, soc)
}

/// `# R32 (release), REVISION: 7.1, GCID: ...` becomes `32.7.1`.
fn parse_l4t_release(contents: &str) -> Option<String> {
    let line = contents.lines().find(|l| l.starts_with("# R"))?;
    let major = line
        .trim_start_matches("# R")
        .split_whitespace()
        .next()?
        .trim();
    let revision = line
        .split(',')
        .find_map(|part| part.trim().strip_prefix("REVISION:"))?
        .trim();
    if major.is_empty() || revision.is_empty() {
        return None;
    }
    Some(format!("{major}.{revision}"))
}

fn jetpack_for_l4t(l4t: &str) -> Option<&'static str> {
    JETPACK_RELEASES
        .iter()
        .find(|(release, _)| *release == l4t)
        .map(|(_, jetpack)| *jetpack)
}

fn cuda_arch_for_soc(soc: &str) -> Option<&'static str> {
    CUDA_ARCH
        .iter()
        .find(|(name, _)| *name == soc)
        .map(|(_, arch)| *arch)
}

/// `NVIDIA Jetson Nano Developer Kit` becomes `Jetson Nano Developer Kit`.
fn model_type(module: &str) -> String {
    module
        .strip_prefix("NVIDIA ")
        .unwrap_or(module)
        .to_string()
}

fn parse_power_mode(output: &str) -> Option<String> {
    output
        .lines()
        .find_map(|l| l.trim().strip_prefix("NV Power Mode:"))
        .map(|mode| mode.trim().to_string())
        .filter(|mode| !mode.is_empty())
}
