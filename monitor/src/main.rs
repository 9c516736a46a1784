use clap::Parser;
use log::{error, info, warn};
use monitor::config::{MonitorConfig, ProbeTimeouts, DEFAULT_SERVERS_FILE};
use monitor::context::MonitorContext;
use monitor::endpoint_manager::parse_host_port;
use monitor::persistence::JsonFileStore;
use shared::{EndpointKey, StatusSnapshot, UNKNOWN_PING};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Endpoint list file
    #[arg(short = 's', long, default_value = DEFAULT_SERVERS_FILE)]
    servers: PathBuf,

    /// Seconds between refresh passes
    #[arg(short = 'i', long, default_value = "30")]
    interval: u64,

    /// Pause between two probes of a pass, in milliseconds
    #[arg(long, default_value = "500")]
    delay_ms: u64,

    /// Budget of the bare TCP connect, in milliseconds
    #[arg(long)]
    connect_timeout_ms: Option<u64>,

    /// Budget of a known protocol query, in milliseconds
    #[arg(long)]
    query_timeout_ms: Option<u64>,

    /// Budget of each auto-detection attempt, in milliseconds
    #[arg(long)]
    detect_timeout_ms: Option<u64>,

    /// Run a single refresh pass and exit
    #[arg(long)]
    once: bool,

    /// Track an endpoint, as host:port (repeatable)
    #[arg(short = 'a', long = "add", value_name = "HOST:PORT")]
    add: Vec<String>,

    /// Stop tracking an endpoint, as host:port (repeatable)
    #[arg(short = 'r', long = "remove", value_name = "HOST:PORT")]
    remove: Vec<String>,
}

impl Args {
    fn config(&self) -> MonitorConfig {
        let mut timeouts = ProbeTimeouts::default();
        if let Some(ms) = self.connect_timeout_ms {
            timeouts.connect = Duration::from_millis(ms);
        }
        if let Some(ms) = self.query_timeout_ms {
            timeouts.known_protocol = Duration::from_millis(ms);
        }
        if let Some(ms) = self.detect_timeout_ms {
            timeouts.auto_detect = Duration::from_millis(ms);
        }

        MonitorConfig {
            refresh_interval: Duration::from_secs(self.interval.max(1)),
            inter_probe_delay: Duration::from_millis(self.delay_ms),
            timeouts,
            servers_file: self.servers.clone(),
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let config = args.config();

    info!("Starting server monitor...");
    info!("Endpoint list: {}", config.servers_file.display());

    let store = Arc::new(JsonFileStore::new(&config.servers_file));
    let context = MonitorContext::with_native_queries(config, store).await;

    for arg in &args.remove {
        let (host, port) = parse_host_port(arg)?;
        let removed = u16::try_from(port)
            .ok()
            .map(|port| EndpointKey::new(host, port));
        match removed {
            Some(key) if context.remove_endpoint(&key).await.is_some() => {}
            _ => warn!("{} is not monitored", arg),
        }
    }

    for arg in &args.add {
        let (host, port) = parse_host_port(arg)?;
        match context.add_endpoint(&host, port, None).await {
            Ok((endpoint, Some(snapshot))) => {
                info!("{}", summary_line(&endpoint.display_name, &snapshot, &[]));
            }
            Ok(_) => {}
            Err(e) => error!("Cannot add {}: {}", arg, e),
        }
    }

    info!(
        "Monitoring {} endpoints, refreshing every {}s",
        context.endpoints().await.len(),
        context.config().refresh_interval.as_secs()
    );

    context.refresh_all().await;
    present(&context).await;

    if args.once {
        return Ok(());
    }

    let mut reports = context.scheduler().subscribe();
    let periodic = context.start_periodic();

    loop {
        tokio::select! {
            changed = reports.changed() => {
                if changed.is_err() {
                    break;
                }
                present(&context).await;
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Received Ctrl+C, shutting down gracefully...");
                break;
            }
        }
    }

    periodic.stop().await;
    Ok(())
}

/// Logs one line per endpoint with its latest snapshot.
async fn present(context: &MonitorContext) {
    for endpoint in context.endpoints().await {
        let key = endpoint.key();
        match context.latest(&key).await {
            Some(snapshot) => {
                let series = context.player_series(&key).await;
                info!("{}", summary_line(&endpoint.display_name, &snapshot, &series));
            }
            None => info!("{:<32} not checked yet", endpoint.display_name),
        }
    }
}

fn summary_line(name: &str, snapshot: &StatusSnapshot, series: &[u32]) -> String {
    let status = if snapshot.online { "ONLINE " } else { "OFFLINE" };
    let ping = if snapshot.ping_ms == UNKNOWN_PING {
        "-".to_string()
    } else {
        format!("{}ms", snapshot.ping_ms)
    };

    let mut line = format!(
        "{:<32} {} {:>9} ping {:>6}  {} @ {} [{}]",
        name,
        status,
        snapshot.occupancy(),
        ping,
        snapshot.protocol_label,
        snapshot.address,
        snapshot.checked_at.format("%H:%M:%S")
    );
    if let Some(trend) = trend(series) {
        line.push_str(&format!("  trend {}", trend));
    }
    if let Some(message) = &snapshot.error_message {
        line.push_str(&format!("  ({})", message));
    }
    line
}

/// Player count change across the retained history, e.g. `+3` or `-1`.
fn trend(series: &[u32]) -> Option<String> {
    let (first, last) = (series.first()?, series.last()?);
    if series.len() < 2 {
        return None;
    }
    let delta = i64::from(*last) - i64::from(*first);
    Some(format!("{:+}", delta))
}
