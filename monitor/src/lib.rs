//! # Server Monitor Library
//!
//! This library probes game and network servers, records a short history of
//! their status and keeps that history fresh on a timer. It is the engine
//! behind the `monitor` binary; any other front-end can drive it through
//! [`context::MonitorContext`].
//!
//! ## Core Responsibilities
//!
//! ### Probing
//! A probe turns a `(host, port)` pair into a status snapshot through a
//! chain of increasingly weaker checks:
//! - A structured status query when the port maps to a known game protocol
//! - Auto-detection across the common game protocols for unmapped ports
//! - A bare TCP connect as the last resort
//!
//! Every tier has its own timeout and a failing tier hands over to the next,
//! so a probe always completes with a snapshot.
//!
//! ### History
//! The last ten snapshots of every endpoint are retained for trend display.
//! Removing an endpoint drops its history with it.
//!
//! ### Refresh Scheduling
//! Refresh passes probe the endpoints one after another with a short pause
//! in between. A timer triggers passes periodically, and triggers arriving
//! while a pass is still running are dropped.
//!
//! ## Module Organization
//!
//! ### Query Module (`query`)
//! Wire-level status queries behind the [`query::QueryClient`] trait:
//! - Source engine A2S over UDP
//! - Minecraft Server List Ping over TCP
//! - TeamSpeak 3 ServerQuery over TCP
//!
//! ### Probe Module (`probe`)
//! The tiered probe engine.
//!
//! ### History and Endpoint Modules (`history`, `endpoint_manager`)
//! Bounded per-endpoint history and the validated list of tracked endpoints.
//!
//! ### Scheduler Module (`scheduler`)
//! Sequential refresh passes and the periodic timer.
//!
//! ### Persistence and Context Modules (`persistence`, `context`)
//! The `servers.json` store and the wiring of all of the above.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use monitor::config::MonitorConfig;
//! use monitor::context::MonitorContext;
//! use monitor::persistence::JsonFileStore;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = MonitorConfig::default();
//!     let store = Arc::new(JsonFileStore::new(&config.servers_file));
//!     let context = MonitorContext::with_native_queries(config, store).await;
//!
//!     context.add_endpoint("play.example.org", 25565, None).await?;
//!     context.refresh_all().await;
//!
//!     for endpoint in context.endpoints().await {
//!         if let Some(snapshot) = context.latest(&endpoint.key()).await {
//!             println!("{}: {}", endpoint.display_name, snapshot.occupancy());
//!         }
//!     }
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod context;
pub mod endpoint_manager;
pub mod history;
pub mod persistence;
pub mod probe;
pub mod query;
pub mod scheduler;
