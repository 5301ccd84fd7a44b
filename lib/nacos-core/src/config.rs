//! Controller configuration

use std::time::Duration;

use tracing::warn;

const ENV_PREFIX: &str = "NACOS_OPERATOR_";

/// Tunables for the controller and the reconcile pass
#[derive(Clone, Debug)]
pub struct ControllerConfig {
    /// Delay before re-running a pass that completed
    pub resync_interval: Duration,
    /// Delay before re-running a pass whose object fetch failed
    pub error_requeue_interval: Duration,
    /// Timeout for a single node-status request
    pub health_timeout: Duration,
    /// Maximum node-status requests in flight
    pub health_concurrency: usize,
    /// Upper bound on one healer invocation
    pub heal_timeout: Duration,
    /// DNS domain of the Kubernetes cluster
    pub cluster_domain: String,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            resync_interval: Duration::from_secs(30),
            error_requeue_interval: Duration::from_secs(60),
            health_timeout: Duration::from_secs(5),
            health_concurrency: 4,
            heal_timeout: Duration::from_secs(10),
            cluster_domain: "cluster.local".to_string(),
        }
    }
}

impl ControllerConfig {
    /// Build a config from `NACOS_OPERATOR_*` environment variables,
    /// falling back to defaults for anything unset or malformed
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let secs = |name: &str, fallback: Duration| {
            parse_or(&lookup, name, fallback.as_secs()).map_or(fallback, Duration::from_secs)
        };

        Self {
            resync_interval: secs("RESYNC_SECONDS", defaults.resync_interval),
            error_requeue_interval: secs("ERROR_REQUEUE_SECONDS", defaults.error_requeue_interval),
            health_timeout: secs("HEALTH_TIMEOUT_SECONDS", defaults.health_timeout),
            health_concurrency: parse_or(&lookup, "HEALTH_CONCURRENCY", defaults.health_concurrency)
                .unwrap_or(defaults.health_concurrency)
                .max(1),
            heal_timeout: secs("HEAL_TIMEOUT_SECONDS", defaults.heal_timeout),
            cluster_domain: lookup(&format!("{}CLUSTER_DOMAIN", ENV_PREFIX))
                .filter(|d| !d.is_empty())
                .unwrap_or(defaults.cluster_domain),
        }
    }
}

fn parse_or<F, T>(lookup: &F, name: &str, fallback: T) -> Option<T>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    let key = format!("{}{}", ENV_PREFIX, name);
    match lookup(&key) {
        None => Some(fallback),
        Some(raw) => match raw.trim().parse() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(key = %key, value = %raw, "ignoring malformed setting");
                None
            }
        },
    }
}
