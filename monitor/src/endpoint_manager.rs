//! Tracked endpoint management for the monitor
//!
//! This module owns the list of monitored endpoints, including:
//! - Validation of user supplied host/port pairs
//! - Default display names from the protocol registry
//! - Keeping the history store in step with additions and removals
//!
//! Endpoints are identified by `(host, port)` and kept in insertion order so
//! presentation and refresh passes see a stable sequence.

use crate::history::SharedHistory;
use log::info;
use shared::protocols::default_display_name;
use shared::{Endpoint, EndpointKey, MonitorError};
use std::sync::Arc;
use tokio::sync::RwLock;

pub type SharedEndpoints = Arc<RwLock<EndpointRegistry>>;

/// Owns the tracked endpoints and registers/drops their history records.
pub struct EndpointRegistry {
    /// Endpoints in the order they were added
    endpoints: Vec<Endpoint>,
    /// History store kept in step with the endpoint list
    history: SharedHistory,
}

impl EndpointRegistry {
    pub fn new(history: SharedHistory) -> Self {
        Self {
            endpoints: Vec::new(),
            history,
        }
    }

    /// Validates and adds an endpoint
    ///
    /// The host is trimmed; an empty host, a port outside `1..=65535` or an
    /// already tracked `(host, port)` pair is rejected with `InvalidInput`.
    /// Without an explicit name the protocol registry supplies one. An empty
    /// history record is created for the new endpoint.
    pub async fn add(
        &mut self,
        host: &str,
        port: u32,
        display_name: Option<String>,
    ) -> Result<Endpoint, MonitorError> {
        let (host, port) = validate(host, port)?;
        let display_name = display_name
            .map(|name| name.trim().to_string())
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| default_display_name(&host, port));

        self.insert(Endpoint::new(host, port, display_name)).await
    }

    /// Adds an already built endpoint, e.g. one loaded from disk
    ///
    /// Goes through the same validation as [`add`](Self::add) but keeps the
    /// stored name, falling back to the default one when it is blank.
    pub async fn restore(&mut self, endpoint: Endpoint) -> Result<Endpoint, MonitorError> {
        let name = Some(endpoint.display_name);
        self.add(&endpoint.host, u32::from(endpoint.port), name).await
    }

    async fn insert(&mut self, endpoint: Endpoint) -> Result<Endpoint, MonitorError> {
        let key = endpoint.key();
        if self.contains(&key) {
            return Err(MonitorError::invalid(format!("{} is already monitored", key)));
        }

        self.history.write().await.register(key.clone());
        info!("Monitoring {} as \"{}\"", key, endpoint.display_name);
        self.endpoints.push(endpoint.clone());
        Ok(endpoint)
    }

    /// Removes an endpoint and its history
    ///
    /// Unknown keys are ignored. Returns the removed endpoint, if any.
    pub async fn remove(&mut self, key: &EndpointKey) -> Option<Endpoint> {
        let index = self.endpoints.iter().position(|e| e.matches(key))?;
        let endpoint = self.endpoints.remove(index);
        self.history.write().await.drop_history(key);
        info!("Stopped monitoring {}", key);
        Some(endpoint)
    }

    /// Snapshot of the tracked endpoints in insertion order
    pub fn list(&self) -> Vec<Endpoint> {
        self.endpoints.clone()
    }

    pub fn get(&self, key: &EndpointKey) -> Option<&Endpoint> {
        self.endpoints.iter().find(|e| e.matches(key))
    }

    pub fn contains(&self, key: &EndpointKey) -> bool {
        self.get(key).is_some()
    }

    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }
}

fn validate(host: &str, port: u32) -> Result<(String, u16), MonitorError> {
    let host = host.trim();
    if host.is_empty() {
        return Err(MonitorError::invalid("host must not be empty"));
    }
    let port = u16::try_from(port)
        .ok()
        .filter(|p| *p != 0)
        .ok_or_else(|| MonitorError::invalid(format!("port {} is outside 1-65535", port)))?;
    Ok((host.to_string(), port))
}

/// Parses `host:port` as typed on the command line. IPv6 literals go in
/// brackets: `[::1]:25565`.
pub fn parse_host_port(arg: &str) -> Result<(String, u32), MonitorError> {
    let arg = arg.trim();
    let (host, port) = arg
        .rsplit_once(':')
        .ok_or_else(|| MonitorError::invalid(format!("expected host:port, got \"{}\"", arg)))?;
    let host = host.trim_start_matches('[').trim_end_matches(']');
    let port = port
        .parse::<u32>()
        .map_err(|_| MonitorError::invalid(format!("\"{}\" is not a port number", port)))?;
    Ok((host.to_string(), port))
}
