//! Probe engine: turns an endpoint into a [`StatusSnapshot`].
//!
//! Tiers, each bounded by its own timeout:
//! 1. resolve the host (a failed lookup keeps the literal host),
//! 2. structured query of the protocol mapped to the port, or
//! 3. auto-detection across [`AUTO_DETECT_CANDIDATES`] when the port is unmapped,
//! 4. bare TCP connect.
//!
//! A known protocol that fails goes straight to tier 4; auto-detection is
//! only for ports without a mapping.

use crate::config::ProbeTimeouts;
use crate::query::{NativeQuery, QueryClient, QueryError, QueryResponse};
use log::debug;
use shared::protocols::{self, AUTO_DETECT_CANDIDATES};
use shared::{normalize_ping, normalize_player_names, Endpoint, QueriedStatus, StatusSnapshot};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{lookup_host, TcpStream};
use tokio::time::{timeout, Instant};

pub struct Prober {
    client: Arc<dyn QueryClient>,
    timeouts: ProbeTimeouts,
}

impl Prober {
    pub fn new(client: Arc<dyn QueryClient>, timeouts: ProbeTimeouts) -> Self {
        Self { client, timeouts }
    }

    /// Prober speaking the wire protocols in [`crate::query`].
    pub fn native(timeouts: ProbeTimeouts) -> Self {
        Self::new(Arc::new(NativeQuery::new()), timeouts)
    }

    pub fn timeouts(&self) -> &ProbeTimeouts {
        &self.timeouts
    }

    /// Probes with the configured budgets. Never fails: every failure path
    /// ends in an offline snapshot carrying the reason.
    pub async fn probe(&self, endpoint: &Endpoint) -> StatusSnapshot {
        self.probe_with(endpoint, &self.timeouts).await
    }

    pub async fn probe_with(&self, endpoint: &Endpoint, timeouts: &ProbeTimeouts) -> StatusSnapshot {
        let started = Instant::now();
        let port = endpoint.port;
        let address = resolve_or_literal(&endpoint.host, port, timeouts.resolve).await;

        let structured = match protocols::protocol_id_for_port(port) {
            Some(protocol) => {
                debug!("Querying {}:{} as {}", address, port, protocol);
                self.query(protocol, &address, port, timeouts.known_protocol)
                    .await
                    .map(|response| (protocol, response))
            }
            None => self.auto_detect(&address, port, timeouts.auto_detect).await,
        };

        match structured {
            Ok((protocol, response)) => {
                debug!(
                    "{}:{} answered as {}: {}/{}",
                    address, port, protocol, response.players, response.max_players
                );
                StatusSnapshot::queried(
                    queried_status(response),
                    protocols::display_name_for_protocol_id(protocol),
                    address,
                    started.elapsed(),
                )
            }
            Err(query_error) => {
                debug!("Structured query of {}:{} failed: {}", address, port, query_error);
                let label = protocols::label_for_port(port);
                match connect(&address, port, timeouts.connect).await {
                    Ok(()) => StatusSnapshot::reachable(label, address, started.elapsed()),
                    Err(connect_error) => StatusSnapshot::offline(
                        label,
                        address,
                        started.elapsed(),
                        format!("{} (status query: {})", connect_error, query_error),
                    ),
                }
            }
        }
    }

    async fn query(
        &self,
        protocol: &str,
        address: &str,
        port: u16,
        budget: Duration,
    ) -> Result<QueryResponse, QueryError> {
        timeout(budget, self.client.query(protocol, address, port, budget))
            .await
            .map_err(|_| QueryError::Timeout(budget))?
    }

    /// First candidate that answers wins; otherwise the last failure.
    async fn auto_detect(
        &self,
        address: &str,
        port: u16,
        budget: Duration,
    ) -> Result<(&'static str, QueryResponse), QueryError> {
        let mut last_error = QueryError::Unsupported("auto-detection".to_string());

        for protocol in AUTO_DETECT_CANDIDATES {
            debug!("Trying {}:{} as {}", address, port, protocol);
            match self.query(protocol, address, port, budget).await {
                Ok(response) => return Ok((protocol, response)),
                Err(e) => {
                    debug!("{}:{} is not {}: {}", address, port, protocol, e);
                    last_error = e;
                }
            }
        }

        debug!("No protocol detected for {}:{}", address, port);
        Err(last_error)
    }
}

fn queried_status(response: QueryResponse) -> QueriedStatus {
    QueriedStatus {
        players: response.players,
        max_players: response.max_players,
        player_names: normalize_player_names(response.player_names),
        map_name: response.map,
        version: response.version,
        ping_ms: normalize_ping(response.ping_ms),
    }
}

/// Resolved IP as text, or the host unchanged when the lookup fails.
async fn resolve_or_literal(host: &str, port: u16, budget: Duration) -> String {
    match timeout(budget, lookup_host((host, port))).await {
        Ok(Ok(addrs)) => {
            let addrs: Vec<_> = addrs.collect();
            match addrs.iter().find(|a| a.is_ipv4()).or_else(|| addrs.first()) {
                Some(addr) => addr.ip().to_string(),
                None => host.to_string(),
            }
        }
        Ok(Err(e)) => {
            debug!("Could not resolve {}: {}, using it literally", host, e);
            host.to_string()
        }
        Err(_) => {
            debug!("Resolving {} timed out, using it literally", host);
            host.to_string()
        }
    }
}

async fn connect(address: &str, port: u16, budget: Duration) -> Result<(), String> {
    match timeout(budget, TcpStream::connect((address, port))).await {
        Ok(Ok(_stream)) => Ok(()),
        Ok(Err(e)) => Err(format!("connection failed: {}", e)),
        Err(_) => Err(format!("connection timed out after {:?}", budget)),
    }
}
