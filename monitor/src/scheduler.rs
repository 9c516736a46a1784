//! Refresh scheduling: drives the probe engine over every tracked endpoint.
//!
//! A pass walks the endpoint list in order, one probe at a time, pausing
//! between endpoints so a large list does not burst connections. An endpoint
//! already being probed (by an overlapping pass) is skipped rather than
//! probed twice, and periodic triggers that land while a pass is running
//! are dropped instead of queued.

use crate::endpoint_manager::SharedEndpoints;
use crate::history::SharedHistory;
use crate::probe::Prober;
use log::{debug, info, warn};
use shared::{Endpoint, EndpointKey, StatusSnapshot};
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval, sleep, Instant, MissedTickBehavior};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeState {
    Idle,
    Probing,
}

/// Outcome of one refresh pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RefreshReport {
    pub probed: usize,
    pub online: usize,
    /// Endpoints skipped because another pass was probing them.
    pub skipped: usize,
    pub elapsed: Duration,
}

#[derive(Clone)]
pub struct RefreshScheduler {
    endpoints: SharedEndpoints,
    history: SharedHistory,
    prober: Arc<Prober>,
    inter_probe_delay: Duration,
    in_flight: Arc<Mutex<HashSet<EndpointKey>>>,
    active_passes: Arc<AtomicUsize>,
    reports: Arc<watch::Sender<RefreshReport>>,
}

impl RefreshScheduler {
    pub fn new(
        endpoints: SharedEndpoints,
        history: SharedHistory,
        prober: Arc<Prober>,
        inter_probe_delay: Duration,
    ) -> Self {
        Self {
            endpoints,
            history,
            prober,
            inter_probe_delay,
            in_flight: Arc::new(Mutex::new(HashSet::new())),
            active_passes: Arc::new(AtomicUsize::new(0)),
            reports: Arc::new(watch::channel(RefreshReport::default()).0),
        }
    }

    /// Probes every tracked endpoint once, in list order.
    pub async fn refresh_all(&self) -> RefreshReport {
        let _pass = PassGuard::enter(&self.active_passes);
        let started = Instant::now();
        let endpoints = self.endpoints.read().await.list();
        let mut report = RefreshReport::default();

        for (index, endpoint) in endpoints.iter().enumerate() {
            match self.probe_endpoint(endpoint).await {
                Some(snapshot) => {
                    report.probed += 1;
                    if snapshot.online {
                        report.online += 1;
                    }
                    if index + 1 < endpoints.len() {
                        sleep(self.inter_probe_delay).await;
                    }
                }
                None => report.skipped += 1,
            }
        }

        report.elapsed = started.elapsed();
        info!(
            "Refresh pass: {} probed, {} online, {} skipped in {:.1}s",
            report.probed,
            report.online,
            report.skipped,
            report.elapsed.as_secs_f32()
        );
        self.reports.send_replace(report);
        report
    }

    /// Receiver notified with the report of every finished pass.
    pub fn subscribe(&self) -> watch::Receiver<RefreshReport> {
        self.reports.subscribe()
    }

    /// Probes a single tracked endpoint right away. `None` if the key is not
    /// tracked or a probe for it is already running.
    pub async fn refresh_one(&self, key: &EndpointKey) -> Option<StatusSnapshot> {
        let endpoint = self.endpoints.read().await.get(key).cloned()?;
        self.probe_endpoint(&endpoint).await
    }

    pub fn probe_state(&self, key: &EndpointKey) -> ProbeState {
        if lock(&self.in_flight).contains(key) {
            ProbeState::Probing
        } else {
            ProbeState::Idle
        }
    }

    /// True while any refresh pass is running.
    pub fn is_refreshing(&self) -> bool {
        self.active_passes.load(Ordering::SeqCst) > 0
    }

    /// Runs [`refresh_all`](Self::refresh_all) every `period` until the
    /// handle is stopped. The first pass happens one period from now.
    pub fn start_periodic(&self, period: Duration) -> PeriodicHandle {
        let scheduler = self.clone();
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();

        let task = tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            // Skip the first tick since it fires immediately
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if scheduler.is_refreshing() {
                            debug!("Refresh still running, skipping periodic trigger");
                            continue;
                        }
                        scheduler.refresh_all().await;
                    }
                    _ = &mut shutdown_rx => {
                        debug!("Periodic refresh stopped");
                        break;
                    }
                }
            }
        });

        PeriodicHandle {
            shutdown: Some(shutdown_tx),
            task,
        }
    }

    /// `Idle -> Probing -> Idle` for one endpoint, recording the result.
    async fn probe_endpoint(&self, endpoint: &Endpoint) -> Option<StatusSnapshot> {
        let key = endpoint.key();
        let Some(_probing) = ProbeGuard::acquire(&self.in_flight, key.clone()) else {
            debug!("{} is already being probed, skipping", key);
            return None;
        };

        let snapshot = self.prober.probe(endpoint).await;

        let endpoints = self.endpoints.read().await;
        if endpoints.contains(&key) {
            self.history.write().await.record(&key, snapshot.clone());
        } else {
            debug!("{} was removed while probing, discarding result", key);
        }
        Some(snapshot)
    }
}

pub struct PeriodicHandle {
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl PeriodicHandle {
    /// Stops the timer, letting a running pass finish first.
    pub async fn stop(mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        if let Err(e) = (&mut self.task).await {
            warn!("Periodic refresh task ended abnormally: {}", e);
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

/// Marks an endpoint as `Probing` for as long as it lives.
struct ProbeGuard<'a> {
    in_flight: &'a Mutex<HashSet<EndpointKey>>,
    key: EndpointKey,
}

impl<'a> ProbeGuard<'a> {
    fn acquire(in_flight: &'a Mutex<HashSet<EndpointKey>>, key: EndpointKey) -> Option<Self> {
        if !lock(in_flight).insert(key.clone()) {
            return None;
        }
        Some(Self { in_flight, key })
    }
}

impl Drop for ProbeGuard<'_> {
    fn drop(&mut self) {
        lock(self.in_flight).remove(&self.key);
    }
}

struct PassGuard<'a>(&'a AtomicUsize);

impl<'a> PassGuard<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for PassGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

// The set only holds keys, so a poisoned lock still has consistent contents.
fn lock(in_flight: &Mutex<HashSet<EndpointKey>>) -> MutexGuard<'_, HashSet<EndpointKey>> {
    in_flight.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
