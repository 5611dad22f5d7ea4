//! # Preload Coordination
//!
//! Warms plugins before they are first called. A preload covers the services
//! asked for, the configured system plugins, and everything those depend on,
//! loaded wave by wave: each wave loads concurrently, and the dependencies it
//! reveals form the next wave.
//!
//! Preloading is a hint. A service that fails to load is logged and skipped;
//! it is not remembered as failed, so the next call to it loads it again.

use std::collections::HashSet;

use futures::future::join_all;
use serde::Serialize;

use crate::supervisor::Supervisor;

/// What a preload achieved.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct PreloadReport {
    /// Services resident at the end, in the order their wave finished.
    pub loaded: Vec<String>,
    /// Services that could not be loaded, with the reason.
    pub failed: Vec<(String, String)>,
}

impl PreloadReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

pub(crate) async fn run(supervisor: &Supervisor, services: Vec<String>) -> PreloadReport {
    let config = supervisor.config();
    let mut report = PreloadReport::default();
    let mut seen = HashSet::new();

    let mut wave = next_wave(
        supervisor,
        &mut seen,
        services.into_iter().chain(config.system_plugins.iter().cloned()),
    );

    while !wave.is_empty() {
        tracing::debug!(services = ?wave, "preloading wave");
        let outcomes = join_all(wave.iter().map(|service| supervisor.resolve(service))).await;

        let mut revealed = Vec::new();
        for (service, outcome) in wave.into_iter().zip(outcomes) {
            match outcome {
                Ok(plugin) => {
                    revealed.extend(plugin.dependencies(&config.host_namespaces));
                    report.loaded.push(service);
                }
                Err(e) => {
                    tracing::warn!(service = %service, error = %e, "preload failed");
                    report.failed.push((service, e.to_string()));
                }
            }
        }

        wave = next_wave(supervisor, &mut seen, revealed.into_iter());
    }

    tracing::info!(loaded = report.loaded.len(), failed = report.failed.len(), "preload finished");
    report
}

/// Resolves aliases and drops host namespaces and services already visited.
fn next_wave(supervisor: &Supervisor, seen: &mut HashSet<String>, candidates: impl Iterator<Item = String>) -> Vec<String> {
    let config = supervisor.config();
    let mut wave = Vec::new();
    for candidate in candidates {
        let service = config.resolve_alias(&candidate).to_string();
        if config.is_host_namespace(&service) {
            continue;
        }
        if seen.insert(service.clone()) {
            wave.push(service);
        }
    }
    wave
}
