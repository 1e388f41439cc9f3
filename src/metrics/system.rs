//! System metrics collection (uptime, CPU, memory, disk, network).

use std::collections::BTreeMap;
use std::net::IpAddr;
use std::path::Path;

use sysinfo::{Networks, System};

use crate::types::{CpuUsage, DiskUsage, MemoryPool, MemoryUsage, Uptime};

/// Seconds since boot, split into days and remainder.
pub fn collect_uptime() -> Uptime {
    Uptime::from_secs(System::uptime())
}

/// Per-core and aggregate idle percentages.
///
/// `system` must have had its CPU usage refreshed at least twice, with
/// `sysinfo::MINIMUM_CPU_UPDATE_INTERVAL` between them.
pub fn collect_cpu(system: &System) -> CpuUsage {
    CpuUsage {
        cores: system
            .cpus()
            .iter()
            .map(|cpu| idle_from_usage(cpu.cpu_usage()))
            .collect(),
        total_idle: idle_from_usage(system.global_cpu_usage()),
    }
}

/// RAM and swap in kilobytes.
pub fn collect_memory(system: &System) -> MemoryUsage {
    let kb = |bytes: u64| bytes as f64 / 1024.0;
    MemoryUsage {
        ram: MemoryPool {
            used: kb(system.used_memory()),
            total: kb(system.total_memory()),
        },
        swap: MemoryPool {
            used: kb(system.used_swap()),
            total: kb(system.total_swap()),
        },
    }
}

/// Filesystem usage of the volume holding `path`.
pub fn collect_disk(path: &Path) -> nix::Result<DiskUsage> {
    let stat = nix::sys::statvfs::statvfs(path)?;
    Ok(DiskUsage::from_blocks(
        stat.fragment_size() as u64,
        stat.blocks() as u64,
        stat.blocks_free() as u64,
        stat.blocks_available() as u64,
    ))
}

/// Interface name to address, skipping loopback; IPv4 preferred.
pub fn collect_interfaces(networks: &Networks) -> BTreeMap<String, String> {
    networks
        .iter()
        .filter(|(name, _)| !name.starts_with("lo"))
        .filter_map(|(name, data)| {
            let addrs: Vec<IpAddr> = data.ip_networks().iter().map(|n| n.addr).collect();
            pick_address(&addrs).map(|addr| (name.clone(), addr.to_string()))
        })
        .collect()
}

fn pick_address(addrs: &[IpAddr]) -> Option<IpAddr> {
    addrs
        .iter()
        .find(|a| a.is_ipv4())
        .or_else(|| addrs.first())
        .copied()
}

fn idle_from_usage(usage: f32) -> f64 {
    (100.0 - f64::from(usage)).clamp(0.0, 100.0)
}
