//! Replica, quorum and application health checks

use std::sync::Arc;

use futures::stream::{self, StreamExt};
use k8s_openapi::api::apps::v1::StatefulSet;
use k8s_openapi::api::core::v1::Pod;
use kube::ResourceExt;
use nacos_api::Nacos;
use tracing::{debug, warn};

use crate::client::KubeApi;
use crate::constants::{codes, DEFAULT_REPLICAS, HEALTHY_NODE_CODE};
use crate::error::{Error, Result};
use crate::manifest::label_selector;
use crate::nacos::NodeStatusProbe;

/// Minimum number of Ready instances for a cluster of `replicas`
pub fn quorum(replicas: i32) -> i32 {
    replicas / 2 + 1
}

pub fn is_ready(pod: &Pod) -> bool {
    pod.status
        .as_ref()
        .and_then(|s| s.conditions.as_ref())
        .map(|conditions| {
            conditions
                .iter()
                .any(|c| c.type_ == "Ready" && c.status == "True")
        })
        .unwrap_or(false)
}

/// StatefulSet ordinal parsed from the pod name
fn ordinal(pod: &Pod) -> Option<u32> {
    pod.name_any().rsplit('-').next()?.parse().ok()
}

pub struct Checker<C, P> {
    client: Arc<C>,
    probe: Arc<P>,
    concurrency: usize,
}

impl<C: KubeApi, P: NodeStatusProbe> Checker<C, P> {
    pub fn new(client: Arc<C>, probe: Arc<P>, concurrency: usize) -> Self {
        Self {
            client,
            probe,
            concurrency: concurrency.max(1),
        }
    }

    /// Verify the running cluster and return its Ready pods in ordinal order.
    /// The first failed check aborts the rest.
    pub async fn check(&self, nacos: &Nacos) -> Result<Vec<Pod>> {
        let namespace = nacos.namespace().unwrap_or_default();
        let name = nacos.name_any();
        let replicas = nacos.spec.replicas.unwrap_or(DEFAULT_REPLICAS);

        let workload: StatefulSet = self.client.get(&namespace, &name).await?.ok_or_else(|| {
            Error::fatal(
                codes::REPLICA_MISMATCH,
                format!("workload {}/{} does not exist", namespace, name),
            )
        })?;
        let spec = workload.spec.unwrap_or_default();
        if spec.replicas != Some(replicas) {
            return Err(Error::fatal(
                codes::REPLICA_MISMATCH,
                format!(
                    "workload replicas {:?} do not match spec replicas {}",
                    spec.replicas, replicas
                ),
            ));
        }

        let selector = label_selector(&spec.selector.match_labels.unwrap_or_default());
        let pods: Vec<Pod> = self.client.list(&namespace, Some(selector.as_str())).await?;
        let mut ready: Vec<Pod> = pods.into_iter().filter(is_ready).collect();
        ready.sort_by_key(|pod| (ordinal(pod).unwrap_or(u32::MAX), pod.name_any()));

        let ready_count = ready.len() as i32;
        let required = quorum(replicas);
        if ready_count < required {
            return Err(Error::fatal(
                codes::QUORUM_LOST,
                format!(
                    "too few ready instances: {} ready, {} required of {}",
                    ready_count, required, replicas
                ),
            ));
        }
        if ready_count != replicas {
            warn!(
                namespace = %namespace,
                name = %name,
                ready = ready_count,
                replicas,
                "not every instance is ready"
            );
        }

        {
            let pending: Vec<_> = ready.iter().map(|pod| self.probe_pod(pod)).collect();
            let mut probes = stream::iter(pending)
                .buffered(self.concurrency);
            while let Some(result) = probes.next().await {
                result?;
            }
        }

        debug!(namespace = %namespace, name = %name, ready = ready_count, "cluster healthy");
        Ok(ready)
    }

    async fn probe_pod(&self, pod: &Pod) -> Result<()> {
        let pod_name = pod.name_any();
        let address = pod
            .status
            .as_ref()
            .and_then(|s| s.pod_ip.as_deref())
            .ok_or_else(|| {
                Error::fatal(
                    codes::NACOS_UNREACHABLE,
                    format!("pod {} is ready but has no address", pod_name),
                )
            })?;

        let nodes = self.probe.cluster_nodes(address).await.map_err(|e| {
            Error::fatal(
                codes::NACOS_UNREACHABLE,
                format!("nacos on {} ({}) is unreachable: {}", pod_name, address, e),
            )
        })?;

        if nodes.code != HEALTHY_NODE_CODE {
            return Err(Error::fatal(
                codes::NACOS_UNREACHABLE,
                format!(
                    "nacos on {} ({}) reported code {}",
                    pod_name, address, nodes.code
                ),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ensurer::Ensurer;
    use crate::testing::{nacos, pod, FakeKube, FakeProbe};

    async fn setup(cluster_type: &str, replicas: i32) -> (Arc<FakeKube>, Arc<FakeProbe>, Nacos) {
        let kube = Arc::new(FakeKube::new());
        let nc = nacos("nc", cluster_type, replicas);
        Ensurer::new(kube.clone(), "cluster.local").ensure(&nc).await.unwrap();
        (kube, Arc::new(FakeProbe::healthy()), nc)
    }

    #[test]
    fn test_quorum_arithmetic() {
        assert_eq!(quorum(1), 1);
        assert_eq!(quorum(2), 2);
        assert_eq!(quorum(3), 2);
        assert_eq!(quorum(5), 3);
    }

    #[tokio::test]
    async fn test_two_of_five_ready_fails() {
        let (kube, probe, nc) = setup("cluster", 5).await;
        for i in 0..5 {
            kube.insert_pod(pod("nc", i, i < 2));
        }

        let err = Checker::new(kube, probe.clone(), 4).check(&nc).await.unwrap_err();
        assert_eq!(err.code(), Some(codes::QUORUM_LOST));
        assert_eq!(probe.calls().len(), 0);
    }

    #[tokio::test]
    async fn test_three_of_five_ready_passes() {
        let (kube, probe, nc) = setup("cluster", 5).await;
        for i in 0..5 {
            kube.insert_pod(pod("nc", i, i < 3));
        }

        let ready = Checker::new(kube, probe.clone(), 4).check(&nc).await.unwrap();
        assert_eq!(ready.len(), 3);
        assert_eq!(probe.calls().len(), 3);
    }

    #[tokio::test]
    async fn test_replica_mismatch_before_polling() {
        let (kube, probe, mut nc) = setup("cluster", 2).await;
        for i in 0..2 {
            kube.insert_pod(pod("nc", i, true));
        }
        nc.spec.replicas = Some(3);

        let err = Checker::new(kube, probe.clone(), 4).check(&nc).await.unwrap_err();
        assert_eq!(err.code(), Some(codes::REPLICA_MISMATCH));
        assert!(probe.calls().is_empty());
    }

    #[tokio::test]
    async fn test_unhealthy_code_reports_lowest_ordinal() {
        let (kube, _, nc) = setup("cluster", 3).await;
        for i in [2, 0, 1] {
            kube.insert_pod(pod("nc", i, true));
        }
        let probe = Arc::new(
            FakeProbe::healthy()
                .with_code("10.0.0.1", 500)
                .with_code("10.0.0.2", 500),
        );

        let err = Checker::new(kube, probe, 3).check(&nc).await.unwrap_err();
        assert_eq!(err.code(), Some(codes::NACOS_UNREACHABLE));
        assert!(err.to_string().contains("10.0.0.1"), "{}", err);
    }

    #[tokio::test]
    async fn test_unreachable_instance_is_fatal() {
        let (kube, _, nc) = setup("standalone", 1).await;
        kube.insert_pod(pod("nc", 0, true));
        let probe = Arc::new(FakeProbe::healthy().unreachable("10.0.0.0"));

        let err = Checker::new(kube, probe, 1).check(&nc).await.unwrap_err();
        assert_eq!(err.code(), Some(codes::NACOS_UNREACHABLE));
        assert!(err.to_string().contains("10.0.0.0"));
    }

    #[tokio::test]
    async fn test_pods_of_other_workloads_are_ignored() {
        let (kube, probe, nc) = setup("standalone", 1).await;
        kube.insert_pod(pod("nc", 0, true));
        kube.insert_pod(pod("other", 0, true));

        let ready = Checker::new(kube, probe, 1).check(&nc).await.unwrap();
        assert_eq!(ready.len(), 1);
        assert_eq!(ready[0].name_any(), "nc-0");
    }
}
