//! Telemetry acquisition modules.

mod board;
mod system;
mod tegra;

pub use board::{query_power_mode, read_board_info};
pub use system::{collect_cpu, collect_disk, collect_interfaces, collect_memory, collect_uptime};
pub use tegra::{read_fans, read_gpu_load, read_power_rails, read_temperatures};
