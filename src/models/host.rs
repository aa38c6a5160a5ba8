// Host identity shown in the dashboard header

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HostInfo {
    pub os_name: String,
    pub kernel_version: String,
    pub uptime_secs: u64,
    pub cpu_model: String,
    pub logical_cores: u32,
    pub physical_cores: Option<u32>,
}

impl HostInfo {
    pub fn summary(&self) -> String {
        let physical = self
            .physical_cores
            .map(|c| c.to_string())
            .unwrap_or_else(|| "?".into());
        format!(
            "{} (Kernel: {}) | Uptime: {} | CPU: {} {}p/{}l",
            self.os_name,
            self.kernel_version,
            format_uptime(self.uptime_secs),
            self.cpu_model,
            physical,
            self.logical_cores
        )
    }
}

/// "3 days, 4:05:06" style uptime.
pub fn format_uptime(secs: u64) -> String {
    let days = secs / 86_400;
    let rem = secs % 86_400;
    let clock = format!("{}:{:02}:{:02}", rem / 3600, (rem % 3600) / 60, rem % 60);
    match days {
        0 => clock,
        1 => format!("1 day, {}", clock),
        d => format!("{} days, {}", d, clock),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uptime_formats_days_and_clock() {
        assert_eq!(format_uptime(59), "0:00:59");
        assert_eq!(format_uptime(3_661), "1:01:01");
        assert_eq!(format_uptime(86_400 + 5), "1 day, 0:00:05");
        assert_eq!(format_uptime(3 * 86_400 + 4 * 3600 + 5 * 60 + 6), "3 days, 4:05:06");
    }
}
