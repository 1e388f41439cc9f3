use clap::Parser;

pub const DEFAULT_PORT: u16 = 8000;

/// Prometheus exporter for NVIDIA Jetson board telemetry.
#[derive(Debug, Parser)]
#[command(name = "jetson-exporter", version, about)]
pub struct Args {
    /// Metrics collector port number
    #[arg(long, default_value_t = DEFAULT_PORT)]
    pub port: u16,
}
