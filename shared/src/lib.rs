//! Data model shared by the probing engine, the history store and any
//! presentation front-end.

pub mod error;
pub mod protocols;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

pub use error::MonitorError;

/// Snapshots retained per endpoint.
pub const HISTORY_CAPACITY: usize = 10;
/// Player names kept on a snapshot.
pub const MAX_PLAYER_NAMES: usize = 20;
/// Ping value used whenever round-trip latency was not measured.
pub const UNKNOWN_PING: i32 = -1;
/// Placeholder for map and version strings a probe could not determine.
pub const UNKNOWN: &str = "Unknown";

pub const RESOLVE_TIMEOUT: Duration = Duration::from_secs(5);
pub const KNOWN_PROTOCOL_TIMEOUT: Duration = Duration::from_secs(10);
pub const AUTO_DETECT_TIMEOUT: Duration = Duration::from_secs(5);
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(8);
pub const INTER_PROBE_DELAY: Duration = Duration::from_millis(500);
pub const REFRESH_INTERVAL: Duration = Duration::from_secs(30);

/// Identity of a tracked endpoint. Hosts are compared verbatim, so
/// `localhost` and `127.0.0.1` are distinct endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EndpointKey {
    pub host: String,
    pub port: u16,
}

impl EndpointKey {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl fmt::Display for EndpointKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// A monitored server. Field names on disk follow the `servers.json` layout
/// (`ip`, `port`, `name`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    #[serde(rename = "ip")]
    pub host: String,
    pub port: u16,
    #[serde(rename = "name", default)]
    pub display_name: String,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16, display_name: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port,
            display_name: display_name.into(),
        }
    }

    pub fn key(&self) -> EndpointKey {
        EndpointKey::new(self.host.clone(), self.port)
    }

    pub fn matches(&self, key: &EndpointKey) -> bool {
        self.host == key.host && self.port == key.port
    }
}

/// Result of a single probe. Built only through the constructors below so
/// that an offline snapshot never reports players.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub online: bool,
    pub players: u32,
    pub max_players: u32,
    pub player_names: Vec<String>,
    pub protocol_label: String,
    pub map_name: String,
    pub version: String,
    pub ping_ms: i32,
    /// Address the probe actually talked to (resolved IP or the literal host).
    pub address: String,
    pub checked_at: DateTime<Utc>,
    pub response_time_ms: u32,
    pub error_message: Option<String>,
}

/// Fields extracted from a successful structured query, already normalized.
#[derive(Debug, Clone, PartialEq)]
pub struct QueriedStatus {
    pub players: u32,
    pub max_players: u32,
    pub player_names: Vec<String>,
    pub map_name: Option<String>,
    pub version: Option<String>,
    pub ping_ms: i32,
}

impl StatusSnapshot {
    /// Online snapshot from a structured query that succeeded.
    pub fn queried(
        status: QueriedStatus,
        protocol_label: impl Into<String>,
        address: impl Into<String>,
        response_time: Duration,
    ) -> Self {
        let mut player_names = status.player_names;
        player_names.truncate(MAX_PLAYER_NAMES);

        Self {
            online: true,
            players: status.players,
            max_players: status.max_players,
            player_names,
            protocol_label: protocol_label.into(),
            map_name: status.map_name.unwrap_or_else(|| UNKNOWN.to_string()),
            version: status.version.unwrap_or_else(|| UNKNOWN.to_string()),
            ping_ms: status.ping_ms.max(UNKNOWN_PING),
            address: address.into(),
            checked_at: Utc::now(),
            response_time_ms: duration_ms(response_time),
            error_message: None,
        }
    }

    /// Online snapshot from a bare connection: nothing but reachability is known.
    pub fn reachable(
        protocol_label: impl Into<String>,
        address: impl Into<String>,
        response_time: Duration,
    ) -> Self {
        Self::bare(true, protocol_label.into(), address.into(), response_time, None)
    }

    pub fn offline(
        protocol_label: impl Into<String>,
        address: impl Into<String>,
        response_time: Duration,
        error_message: impl Into<String>,
    ) -> Self {
        Self::bare(
            false,
            protocol_label.into(),
            address.into(),
            response_time,
            Some(error_message.into()),
        )
    }

    fn bare(
        online: bool,
        protocol_label: String,
        address: String,
        response_time: Duration,
        error_message: Option<String>,
    ) -> Self {
        Self {
            online,
            players: 0,
            max_players: 0,
            player_names: Vec::new(),
            protocol_label,
            map_name: UNKNOWN.to_string(),
            version: UNKNOWN.to_string(),
            ping_ms: UNKNOWN_PING,
            address,
            checked_at: Utc::now(),
            response_time_ms: duration_ms(response_time),
            error_message,
        }
    }

    /// `players/max` as shown next to the endpoint name.
    pub fn occupancy(&self) -> String {
        format!("{}/{}", self.players, self.max_players)
    }
}

/// Rounds a measured latency to whole milliseconds. Missing, negative or
/// non-finite measurements become [`UNKNOWN_PING`].
pub fn normalize_ping(measured_ms: Option<f64>) -> i32 {
    match measured_ms {
        Some(ms) if ms.is_finite() && ms >= 0.0 => ms.round().min(i32::MAX as f64) as i32,
        _ => UNKNOWN_PING,
    }
}

/// Trims names, drops blank entries and keeps at most [`MAX_PLAYER_NAMES`].
pub fn normalize_player_names<I, S>(names: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    names
        .into_iter()
        .filter_map(|name| {
            let trimmed = name.as_ref().trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        })
        .take(MAX_PLAYER_NAMES)
        .collect()
}

fn duration_ms(duration: Duration) -> u32 {
    duration.as_millis().min(u32::MAX as u128) as u32
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    fn queried(players: u32, max_players: u32) -> QueriedStatus {
        QueriedStatus {
            players,
            max_players,
            player_names: vec!["alice".to_string(), "bob".to_string()],
            map_name: Some("gm_construct".to_string()),
            version: None,
            ping_ms: 42,
        }
    }

    #[test]
    fn test_endpoint_key_identity() {
        let a = Endpoint::new("mc.example.net", 25565, "Minecraft - mc.example.net");
        let b = Endpoint::new("mc.example.net", 25565, "renamed");
        let c = Endpoint::new("MC.example.net", 25565, "Minecraft - MC.example.net");

        assert_eq!(a.key(), b.key());
        assert_ne!(a.key(), c.key());
        assert!(a.matches(&b.key()));
        assert_eq!(a.key().to_string(), "mc.example.net:25565");
    }

    #[test]
    fn test_endpoint_serialization_uses_file_field_names() {
        let endpoint = Endpoint::new("google.com", 80, "Google Web Server");
        let json = serde_json::to_value(&endpoint).unwrap();

        assert_eq!(json["ip"], "google.com");
        assert_eq!(json["port"], 80);
        assert_eq!(json["name"], "Google Web Server");
    }

    #[test]
    fn test_offline_snapshot_has_zeroed_stats() {
        let snapshot = StatusSnapshot::offline(
            "Web Server",
            "203.0.113.9",
            Duration::from_millis(8000),
            "connection timed out",
        );

        assert!(!snapshot.online);
        assert_eq!(snapshot.players, 0);
        assert_eq!(snapshot.max_players, 0);
        assert!(snapshot.player_names.is_empty());
        assert_eq!(snapshot.ping_ms, UNKNOWN_PING);
        assert_eq!(snapshot.map_name, UNKNOWN);
        assert_eq!(snapshot.response_time_ms, 8000);
        assert_eq!(snapshot.error_message.as_deref(), Some("connection timed out"));
    }

    #[test]
    fn test_reachable_snapshot() {
        let snapshot = StatusSnapshot::reachable("Port 8080", "127.0.0.1", Duration::from_millis(3));

        assert!(snapshot.online);
        assert_eq!(snapshot.occupancy(), "0/0");
        assert_eq!(snapshot.ping_ms, UNKNOWN_PING);
        assert!(snapshot.error_message.is_none());
    }

    #[test]
    fn test_queried_snapshot() {
        let snapshot = StatusSnapshot::queried(
            queried(0, 16),
            "Garry's Mod",
            "10.0.0.5",
            Duration::from_millis(120),
        );

        // Liveness comes from the query succeeding, not from occupancy.
        assert!(snapshot.online);
        assert_eq!(snapshot.occupancy(), "0/16");
        assert_eq!(snapshot.map_name, "gm_construct");
        assert_eq!(snapshot.version, UNKNOWN);
        assert_eq!(snapshot.ping_ms, 42);
    }

    #[test]
    fn test_queried_snapshot_caps_names() {
        let mut status = queried(30, 32);
        status.player_names = (0..30).map(|i| format!("player{}", i)).collect();

        let snapshot = StatusSnapshot::queried(status, "Rust", "10.0.0.5", Duration::ZERO);
        assert_eq!(snapshot.player_names.len(), MAX_PLAYER_NAMES);
        assert_eq!(snapshot.player_names[19], "player19");
    }

    #[test]
    fn test_normalize_ping() {
        assert_eq!(normalize_ping(Some(41.6)), 42);
        assert_eq!(normalize_ping(Some(41.4)), 41);
        assert_eq!(normalize_ping(Some(0.2)), 0);
        assert_eq!(normalize_ping(Some(-3.0)), UNKNOWN_PING);
        assert_eq!(normalize_ping(Some(f64::NAN)), UNKNOWN_PING);
        assert_eq!(normalize_ping(None), UNKNOWN_PING);
    }

    #[test]
    fn test_normalize_player_names() {
        let names = normalize_player_names(["  alice ", "", "   ", "bob"]);
        assert_eq!(names, vec!["alice".to_string(), "bob".to_string()]);

        let many: Vec<String> = (0..25).map(|i| format!(" p{} ", i)).collect();
        let names = normalize_player_names(&many);
        assert_eq!(names.len(), MAX_PLAYER_NAMES);
        assert_eq!(names[0], "p0");
    }

    #[test]
    fn test_response_time_conversion() {
        let snapshot = StatusSnapshot::reachable("Port 1", "h", Duration::from_micros(1500));
        assert_approx_eq!(snapshot.response_time_ms as f64, 1.0, 0.001);
    }
}
