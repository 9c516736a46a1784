//! Structured status queries.
//!
//! Every supported game protocol sits behind one asynchronous contract,
//! [`QueryClient::query`], so the probe engine can walk its fallback tiers
//! without knowing which wire format answered. [`NativeQuery`] implements the
//! contract with the wire formats in this module; tests substitute scripted
//! clients.

pub mod minecraft;
pub mod source;
pub mod teamspeak;

use async_trait::async_trait;
use shared::protocols::{self, QueryFamily};
use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;
use tokio::net::lookup_host;
use tokio::time::Instant;

/// Raw answer of a structured query, before normalization.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryResponse {
    pub players: u32,
    pub max_players: u32,
    /// Names as reported by the server; may contain blanks.
    pub player_names: Vec<String>,
    pub map: Option<String>,
    pub version: Option<String>,
    /// Measured round trip in milliseconds, if the protocol allows one.
    pub ping_ms: Option<f64>,
}

#[derive(Debug, Error)]
pub enum QueryError {
    #[error("query timed out after {0:?}")]
    Timeout(Duration),
    #[error("network error: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed response: {0}")]
    Malformed(String),
    #[error("protocol {0} has no status query")]
    Unsupported(String),
    #[error("server refused query: {0}")]
    Rejected(String),
}

/// One structured status query against `host:port` speaking `protocol`.
/// Implementations must give up once `timeout` has elapsed.
#[async_trait]
pub trait QueryClient: Send + Sync {
    async fn query(
        &self,
        protocol: &str,
        host: &str,
        port: u16,
        timeout: Duration,
    ) -> Result<QueryResponse, QueryError>;
}

/// Queries servers directly over the network.
#[derive(Debug, Clone, Copy, Default)]
pub struct NativeQuery;

impl NativeQuery {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl QueryClient for NativeQuery {
    async fn query(
        &self,
        protocol: &str,
        host: &str,
        port: u16,
        timeout: Duration,
    ) -> Result<QueryResponse, QueryError> {
        let family = protocols::query_family(protocol)
            .ok_or_else(|| QueryError::Unsupported(protocol.to_string()))?;
        let deadline = Instant::now() + timeout;

        let attempt = async {
            match family {
                QueryFamily::Source { port_offset } => {
                    source::query(host, port.saturating_add(port_offset), deadline).await
                }
                QueryFamily::Minecraft => minecraft::query(host, port).await,
                QueryFamily::TeamSpeak3 { query_port } => {
                    teamspeak::query(host, query_port, port).await
                }
                QueryFamily::Unsupported => Err(QueryError::Unsupported(protocol.to_string())),
            }
        };

        tokio::time::timeout_at(deadline, attempt)
            .await
            .map_err(|_| QueryError::Timeout(timeout))?
    }
}

/// Resolves `host:port`, preferring IPv4 the way most game servers listen.
pub(crate) async fn resolve(host: &str, port: u16) -> Result<SocketAddr, QueryError> {
    let addrs: Vec<SocketAddr> = lookup_host((host, port)).await?.collect();
    addrs
        .iter()
        .find(|addr| addr.is_ipv4())
        .or_else(|| addrs.first())
        .copied()
        .ok_or_else(|| {
            QueryError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("no address for {}", host),
            ))
        })
}
