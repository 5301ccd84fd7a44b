//! Remediation hook for objects whose last pass failed

use async_trait::async_trait;
use kube::ResourceExt;
use nacos_api::Nacos;
use tracing::debug;

/// Best-effort remediation. Runs on every pass while the object is Failed,
/// so implementations must be idempotent and return promptly; the caller
/// enforces a time bound.
#[async_trait]
pub trait Heal: Send + Sync {
    async fn heal(&self, nacos: &Nacos);
}

/// Heal that takes no action
#[derive(Clone, Debug, Default)]
pub struct NoopHealer;

#[async_trait]
impl Heal for NoopHealer {
    async fn heal(&self, nacos: &Nacos) {
        debug!(
            namespace = %nacos.namespace().unwrap_or_default(),
            name = %nacos.name_any(),
            "no remediation configured"
        );
    }
}
