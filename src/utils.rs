//! Utility functions for formatting log output.

use humansize::{format_size, BINARY};

/// Format a kilobyte amount as a human-readable size.
pub fn format_kilobytes(kb: f64) -> String {
    format_size((kb.max(0.0) * 1024.0) as u64, BINARY)
}

/// Format a duration in seconds to a human-readable string.
pub fn format_duration(secs: u64) -> String {
    let days = secs / 86400;
    let hours = (secs % 86400) / 3600;
    let mins = (secs % 3600) / 60;

    if days > 0 {
        format!("{}d {:02}h {:02}m", days, hours, mins)
    } else if hours > 0 {
        format!("{:02}h {:02}m", hours, mins)
    } else {
        format!("{:02}m", mins)
    }
}
