//! Watches Nacos objects and their children and drives reconcile passes

use std::sync::Arc;

use futures::StreamExt;
use k8s_openapi::api::apps::v1::StatefulSet;
use k8s_openapi::api::core::v1::{ConfigMap, Service};
use kube::{Api, Client, ResourceExt};
use kube_runtime::{
    controller::Action, predicates, reflector, watcher, Controller, WatchStreamExt,
};
use nacos_api::Nacos;
use nacos_core::{
    ControllerConfig, HttpNodeStatusProbe, KubeClient, NoopHealer, PassOutcome, Reconciler,
};
use thiserror::Error;
use tracing::{debug, error, info, warn};

#[derive(Debug, Error)]
#[error("Reconciliation error: {0}")]
pub struct ReconcileError(#[from] nacos_core::Error);

struct Context {
    reconciler: Reconciler<KubeClient, HttpNodeStatusProbe, NoopHealer>,
    config: ControllerConfig,
}

pub struct NacosController {
    client: Client,
    context: Arc<Context>,
}

impl NacosController {
    pub fn new(client: Client, config: ControllerConfig) -> anyhow::Result<Self> {
        let probe = HttpNodeStatusProbe::new(config.health_timeout)?;
        let reconciler = Reconciler::new(
            Arc::new(KubeClient::new(client.clone())),
            Arc::new(probe),
            NoopHealer,
            &config,
        );
        Ok(Self {
            client,
            context: Arc::new(Context { reconciler, config }),
        })
    }

    pub async fn run(&self) -> anyhow::Result<()> {
        info!("Starting Nacos reconciliation");

        let nacos: Api<Nacos> = Api::all(self.client.clone());
        let config_maps: Api<ConfigMap> = Api::all(self.client.clone());
        let stateful_sets: Api<StatefulSet> = Api::all(self.client.clone());
        let services: Api<Service> = Api::all(self.client.clone());

        // Status writes do not bump the generation, so they never retrigger
        // a pass. Spec edits and child changes do.
        let (reader, writer) = reflector::store();
        let spec_changes = watcher(nacos, watcher::Config::default())
            .default_backoff()
            .reflect(writer)
            .applied_objects()
            .predicate_filter(predicates::generation);

        let mut stream = Controller::for_stream(spec_changes, reader)
            .owns(config_maps, watcher::Config::default())
            .owns(stateful_sets, watcher::Config::default())
            .owns(services, watcher::Config::default())
            .run(reconcile, error_policy, self.context.clone())
            .boxed();

        while let Some(item) = stream.next().await {
            match item {
                Ok((object, _)) => debug!(name = %object.name, "reconciled Nacos"),
                Err(e) => error!("Error in reconciliation stream: {}", e),
            }
        }

        Ok(())
    }
}

async fn reconcile(nacos: Arc<Nacos>, ctx: Arc<Context>) -> Result<Action, ReconcileError> {
    let namespace = nacos.namespace().unwrap_or_default();
    let name = nacos.name_any();

    match ctx.reconciler.reconcile(&namespace, &name).await? {
        PassOutcome::NotFound => Ok(Action::await_change()),
        outcome => {
            debug!(namespace = %namespace, name = %name, ?outcome, "pass finished");
            Ok(Action::requeue(ctx.config.resync_interval))
        }
    }
}

fn error_policy(nacos: Arc<Nacos>, err: &ReconcileError, ctx: Arc<Context>) -> Action {
    warn!(
        namespace = %nacos.namespace().unwrap_or_default(),
        name = %nacos.name_any(),
        error = %err,
        "failed to fetch Nacos, requeueing"
    );
    Action::requeue(ctx.config.error_requeue_interval)
}
