//! Latency-based selection among several object-store endpoints.
//!
//! Every configured endpoint is probed concurrently. The first endpoint to
//! answer opens a short grace window during which a faster answer may still
//! replace it. Request handlers only ever read the already-selected handle;
//! probing happens at startup and on a background interval.

use crate::config::S3Config;
use crate::models::EndpointHealth;
use crate::services::storage::ObjectStore;
use chrono::Utc;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio::time::{Instant, sleep, timeout, timeout_at};

#[derive(Clone)]
pub struct Endpoint {
    pub address: String,
    pub store: Arc<dyn ObjectStore>,
}

impl Endpoint {
    pub fn new(address: impl Into<String>, store: Arc<dyn ObjectStore>) -> Self {
        Self {
            address: address.into(),
            store,
        }
    }
}

impl std::fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Endpoint")
            .field("address", &self.address)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ProbeSettings {
    pub timeout: Duration,
    pub grace: Duration,
    pub interval: Duration,
}

impl From<&S3Config> for ProbeSettings {
    fn from(config: &S3Config) -> Self {
        Self {
            timeout: config.probe_timeout,
            grace: config.probe_grace,
            interval: config.probe_interval,
        }
    }
}

#[derive(Debug, Error)]
pub enum PoolError {
    #[error("no object store endpoints configured")]
    NoEndpoints,

    #[error("no object store endpoint answered within {0:?}")]
    Unreachable(Duration),
}

#[derive(Debug, Clone)]
pub struct Selected {
    pub endpoint: Endpoint,
    pub latency: Duration,
}

/// Outcome of one probe round.
#[derive(Debug)]
pub struct ProbeReport {
    pub winner: Option<Selected>,
    pub health: Vec<EndpointHealth>,
}

/// Probes every candidate concurrently and returns the fastest responder.
///
/// Waits at most `probe_timeout` overall, and at most `grace` after the first
/// successful probe. Probes still running when the round ends are aborted.
pub async fn select_best(
    candidates: &[Endpoint],
    probe_timeout: Duration,
    grace: Duration,
) -> Result<ProbeReport, PoolError> {
    if candidates.is_empty() {
        return Err(PoolError::NoEndpoints);
    }

    let mut probes = JoinSet::new();
    for (index, endpoint) in candidates.iter().enumerate() {
        let store = endpoint.store.clone();
        probes.spawn(async move {
            let begin = Instant::now();
            let result = timeout(probe_timeout, store.probe()).await;
            (index, begin.elapsed(), result)
        });
    }

    let probed_at = Utc::now();
    let mut health: Vec<EndpointHealth> = candidates
        .iter()
        .map(|endpoint| EndpointHealth {
            endpoint: endpoint.address.clone(),
            reachable: false,
            latency_ms: None,
            probed_at,
        })
        .collect();

    let mut best: Option<(usize, Duration)> = None;
    let mut cutoff = Instant::now() + probe_timeout;

    while let Ok(Some(joined)) = timeout_at(cutoff, probes.join_next()).await {
        let (index, latency, result) = match joined {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::warn!("Probe task failed: {}", e);
                continue;
            }
        };
        let address = &candidates[index].address;

        match result {
            Ok(Ok(())) => {
                tracing::debug!("Probe of {} answered in {:?}", address, latency);
                health[index].reachable = true;
                health[index].latency_ms = Some(latency.as_millis() as u64);

                if best.is_none() {
                    cutoff = cutoff.min(Instant::now() + grace);
                }
                if best.is_none_or(|(_, fastest)| latency < fastest) {
                    best = Some((index, latency));
                }
            }
            Ok(Err(e)) => tracing::debug!("Probe of {} failed: {}", address, e),
            Err(_) => tracing::debug!("Probe of {} timed out", address),
        }
    }

    Ok(ProbeReport {
        winner: best.map(|(index, latency)| Selected {
            endpoint: candidates[index].clone(),
            latency,
        }),
        health,
    })
}

/// Holds the currently selected endpoint for concurrent readers.
pub struct EndpointPool {
    candidates: Vec<Endpoint>,
    current: RwLock<Endpoint>,
    health: RwLock<Vec<EndpointHealth>>,
    settings: ProbeSettings,
}

impl EndpointPool {
    /// Runs the initial probe round. Failing to reach any endpoint is fatal here.
    pub async fn connect(
        candidates: Vec<Endpoint>,
        settings: ProbeSettings,
    ) -> Result<Self, PoolError> {
        let report = select_best(&candidates, settings.timeout, settings.grace).await?;
        let winner = report
            .winner
            .ok_or(PoolError::Unreachable(settings.timeout))?;

        tracing::info!(
            "🎯 Selected object store endpoint {} ({:?})",
            winner.endpoint.address,
            winner.latency
        );

        Ok(Self {
            candidates,
            current: RwLock::new(winner.endpoint),
            health: RwLock::new(report.health),
            settings,
        })
    }

    /// The presently selected store. Never waits on a probe round.
    pub fn current_client(&self) -> Arc<dyn ObjectStore> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .store
            .clone()
    }

    pub fn current_address(&self) -> String {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .address
            .clone()
    }

    /// Results of the latest probe round.
    pub fn health(&self) -> Vec<EndpointHealth> {
        self.health
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Re-probes all endpoints and swaps in the winner.
    /// Keeps the previous selection when nothing answers.
    pub async fn refresh(&self) -> Result<(), PoolError> {
        let report =
            select_best(&self.candidates, self.settings.timeout, self.settings.grace).await?;

        *self.health.write().unwrap_or_else(PoisonError::into_inner) = report.health;

        let Some(winner) = report.winner else {
            return Err(PoolError::Unreachable(self.settings.timeout));
        };

        let mut current = self.current.write().unwrap_or_else(PoisonError::into_inner);
        if current.address != winner.endpoint.address {
            tracing::info!(
                "🔀 Switching object store endpoint {} -> {} ({:?})",
                current.address,
                winner.endpoint.address,
                winner.latency
            );
        }
        *current = winner.endpoint;
        Ok(())
    }

    /// Periodic re-probe loop; returns once `shutdown` changes.
    pub async fn run_refresh(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        tracing::info!(
            "🚀 Endpoint re-probe started (every {:?})",
            self.settings.interval
        );

        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    tracing::info!("🛑 Endpoint re-probe shutting down");
                    break;
                }
                _ = sleep(self.settings.interval) => {
                    if let Err(e) = self.refresh().await {
                        tracing::warn!(
                            "Endpoint re-probe failed, keeping {}: {}",
                            self.current_address(),
                            e
                        );
                    }
                }
            }
        }
    }
}
