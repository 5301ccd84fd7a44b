//! Per-object reconcile pass
//!
//! One pass runs Validate -> Ensure -> Heal (when the object was Failed) ->
//! Check -> status update. Every failure below this module is returned as an
//! `Error`; `Reconciler::reconcile` is the only place they are handled.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use kube::ResourceExt;
use nacos_api::{Nacos, Phase};
use tracing::{debug, error, info, warn};

use crate::checker::Checker;
use crate::client::KubeApi;
use crate::config::ControllerConfig;
use crate::ensurer::Ensurer;
use crate::error::{Error, Result};
use crate::healer::{Heal, NoopHealer};
use crate::nacos::NodeStatusProbe;
use crate::status::StatusReporter;
use crate::validator;

/// How a pass ended
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PassOutcome {
    /// The object no longer exists
    NotFound,
    /// Children applied and the cluster is healthy
    Converged,
    /// A fatal error was recorded in the object's status
    Failed { code: i32 },
    /// An unexpected error or panic ended the pass; status untouched
    Aborted,
}

pub struct Reconciler<C, P, H = NoopHealer> {
    client: Arc<C>,
    ensurer: Ensurer<C>,
    checker: Checker<C, P>,
    healer: H,
    status: StatusReporter<C>,
    heal_timeout: Duration,
}

impl<C, P, H> Reconciler<C, P, H>
where
    C: KubeApi,
    P: NodeStatusProbe,
    H: Heal,
{
    pub fn new(client: Arc<C>, probe: Arc<P>, healer: H, config: &ControllerConfig) -> Self {
        Self {
            ensurer: Ensurer::new(client.clone(), config.cluster_domain.clone()),
            checker: Checker::new(client.clone(), probe, config.health_concurrency),
            status: StatusReporter::new(client.clone()),
            client,
            healer,
            heal_timeout: config.heal_timeout,
        }
    }

    /// Run one pass for `namespace/name`. Only a failure to fetch the object
    /// is returned as an error; everything after that is terminal for the
    /// pass and left to the next resync.
    pub async fn reconcile(&self, namespace: &str, name: &str) -> Result<PassOutcome> {
        let Some(mut nacos) = self.client.get::<Nacos>(namespace, name).await? else {
            debug!(namespace = %namespace, name = %name, "object gone, nothing to reconcile");
            return Ok(PassOutcome::NotFound);
        };

        let result = AssertUnwindSafe(self.run_pass(&mut nacos))
            .catch_unwind()
            .await;

        let outcome = match result {
            Ok(Ok(())) => {
                info!(namespace = %namespace, name = %name, "reconciled");
                PassOutcome::Converged
            }
            Ok(Err(Error::Fatal { code, message })) => {
                warn!(namespace = %namespace, name = %name, code, message = %message, "fatal");
                self.status.report_failure(&mut nacos, code, &message).await;
                PassOutcome::Failed { code }
            }
            Ok(Err(e)) => {
                if e.is_conflict() {
                    warn!(namespace = %namespace, name = %name, error = %e, "write conflict, retrying next pass");
                } else {
                    error!(namespace = %namespace, name = %name, error = %e, "reconcile failed");
                }
                PassOutcome::Aborted
            }
            Err(panic) => {
                error!(
                    namespace = %namespace,
                    name = %name,
                    panic = %panic_message(panic.as_ref()),
                    "reconcile panicked"
                );
                PassOutcome::Aborted
            }
        };
        Ok(outcome)
    }

    async fn run_pass(&self, nacos: &mut Nacos) -> Result<()> {
        let previous = nacos.status.as_ref().map(|s| s.phase).unwrap_or_default();

        validator::validate(&mut nacos.spec);
        self.ensurer.ensure(nacos).await?;

        match previous {
            Phase::None => self.status.mark_creating(nacos).await,
            Phase::Failed => self.heal(nacos).await,
            _ => {}
        }

        self.checker.check(nacos).await?;
        self.status.report_running(nacos).await;
        Ok(())
    }

    async fn heal(&self, nacos: &Nacos) {
        if tokio::time::timeout(self.heal_timeout, self.healer.heal(nacos))
            .await
            .is_err()
        {
            warn!(
                name = %nacos.name_any(),
                timeout = ?self.heal_timeout,
                "healer did not finish in time"
            );
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
