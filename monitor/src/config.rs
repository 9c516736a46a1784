//! Runtime configuration for probing and refresh scheduling.

use shared::{
    AUTO_DETECT_TIMEOUT, CONNECT_TIMEOUT, INTER_PROBE_DELAY, KNOWN_PROTOCOL_TIMEOUT,
    REFRESH_INTERVAL, RESOLVE_TIMEOUT,
};
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_SERVERS_FILE: &str = "servers.json";

/// Per-tier time budgets of a probe. Each tier owns its budget; a tier that
/// runs out simply hands over to the next one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeTimeouts {
    pub resolve: Duration,
    /// Structured query when the port maps to a known protocol.
    pub known_protocol: Duration,
    /// Each structured query attempted during auto-detection.
    pub auto_detect: Duration,
    /// Bare TCP connect of the last tier.
    pub connect: Duration,
}

impl Default for ProbeTimeouts {
    fn default() -> Self {
        Self {
            resolve: RESOLVE_TIMEOUT,
            known_protocol: KNOWN_PROTOCOL_TIMEOUT,
            auto_detect: AUTO_DETECT_TIMEOUT,
            connect: CONNECT_TIMEOUT,
        }
    }
}

impl ProbeTimeouts {
    /// Same budget for every tier; handy for tests and quick scans.
    pub fn uniform(timeout: Duration) -> Self {
        Self {
            resolve: timeout,
            known_protocol: timeout,
            auto_detect: timeout,
            connect: timeout,
        }
    }

    /// Longest a probe can take when `candidates` protocols are auto-detected.
    pub fn worst_case(&self, candidates: usize) -> Duration {
        let structured = self
            .known_protocol
            .max(self.auto_detect * candidates as u32);
        self.resolve + structured + self.connect
    }
}

#[derive(Debug, Clone)]
pub struct MonitorConfig {
    pub refresh_interval: Duration,
    /// Pause between two endpoints of the same refresh pass.
    pub inter_probe_delay: Duration,
    pub timeouts: ProbeTimeouts,
    pub servers_file: PathBuf,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            refresh_interval: REFRESH_INTERVAL,
            inter_probe_delay: INTER_PROBE_DELAY,
            timeouts: ProbeTimeouts::default(),
            servers_file: PathBuf::from(DEFAULT_SERVERS_FILE),
        }
    }
}
