//! Idempotent create-or-update of child resources

use std::collections::BTreeMap;

use k8s_openapi::api::apps::v1::StatefulSet;
use k8s_openapi::api::core::v1::{
    ConfigMap, Container, Probe, ResourceRequirements, Service, ServiceSpec, Volume,
};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use kube::{Resource, ResourceExt};
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::client::{ChildResource, KubeApi};
use crate::error::Result;

/// A child kind the operator fully owns
pub trait Managed: ChildResource {
    /// Whether the live object differs from `self` in a field the operator
    /// manages
    fn drifted_from(&self, live: &Self) -> bool;

    /// Copy server-owned state from the live object before an update
    fn adopt(&mut self, live: &Self) {
        self.meta_mut().resource_version = live.meta().resource_version.clone();
    }
}

/// What `apply` did
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Applied {
    Created,
    Updated,
    Unchanged,
}

/// Make the stored object match `desired`: create when absent, update with
/// the stored resource version when it drifted, otherwise do nothing
pub async fn apply<C, K>(client: &C, namespace: &str, mut desired: K) -> Result<Applied>
where
    C: KubeApi,
    K: Managed,
{
    let name = desired.name_any();
    match client.get::<K>(namespace, &name).await? {
        None => {
            client.create(namespace, &desired).await?;
            Ok(Applied::Created)
        }
        Some(live) if desired.drifted_from(&live) => {
            desired.adopt(&live);
            client.update(namespace, &desired).await?;
            Ok(Applied::Updated)
        }
        Some(_) => {
            debug!(kind = %K::kind(&()), namespace = %namespace, name = %name, "unchanged");
            Ok(Applied::Unchanged)
        }
    }
}

fn first_container(ss: &StatefulSet) -> Option<&Container> {
    ss.spec
        .as_ref()
        .and_then(|s| s.template.spec.as_ref())
        .and_then(|p| p.containers.first())
}

fn pod_volumes(ss: &StatefulSet) -> Vec<Volume> {
    ss.spec
        .as_ref()
        .and_then(|s| s.template.spec.as_ref())
        .and_then(|p| p.volumes.clone())
        .unwrap_or_default()
}

/// Whether every field set in `want` holds the same value in `have`.
/// Fields present only in `have` were defaulted by the API server.
fn covered_by(want: &Value, have: &Value) -> bool {
    match (want, have) {
        (Value::Null, _) => true,
        (Value::Object(w), Value::Null) => w.is_empty(),
        (Value::Array(w), Value::Null) => w.is_empty(),
        (Value::Object(w), Value::Object(h)) => w
            .iter()
            .all(|(key, value)| covered_by(value, h.get(key).unwrap_or(&Value::Null))),
        (Value::Array(w), Value::Array(h)) => {
            w.len() == h.len() && w.iter().zip(h).all(|(a, b)| covered_by(a, b))
        }
        _ => want == have,
    }
}

fn same_fields<T: Serialize>(want: &T, have: &T) -> bool {
    match (serde_json::to_value(want), serde_json::to_value(have)) {
        (Ok(want), Ok(have)) => covered_by(&want, &have),
        _ => false,
    }
}

/// Numeric value of a quantity such as `500m`, `0.5`, `2Gi` or `1e3`
fn quantity_value(quantity: &Quantity) -> Option<f64> {
    const SUFFIXES: [(&str, f64); 15] = [
        ("Ki", 1024.0),
        ("Mi", 1_048_576.0),
        ("Gi", 1_073_741_824.0),
        ("Ti", 1_099_511_627_776.0),
        ("Pi", 1_125_899_906_842_624.0),
        ("Ei", 1_152_921_504_606_846_976.0),
        ("n", 1e-9),
        ("u", 1e-6),
        ("m", 1e-3),
        ("k", 1e3),
        ("M", 1e6),
        ("G", 1e9),
        ("T", 1e12),
        ("P", 1e15),
        ("E", 1e18),
    ];

    let raw = quantity.0.trim();
    let (number, scale) = SUFFIXES
        .iter()
        .find_map(|(suffix, scale)| raw.strip_suffix(suffix).map(|n| (n, *scale)))
        .unwrap_or((raw, 1.0));
    number.parse::<f64>().ok().map(|n| n * scale)
}

fn same_quantity(a: &Quantity, b: &Quantity) -> bool {
    if a == b {
        return true;
    }
    match (quantity_value(a), quantity_value(b)) {
        (Some(x), Some(y)) => (x - y).abs() <= 1e-9 * x.abs().max(y.abs()),
        _ => false,
    }
}

fn same_quantities(
    want: Option<&BTreeMap<String, Quantity>>,
    have: Option<&BTreeMap<String, Quantity>>,
) -> bool {
    let empty = BTreeMap::new();
    let (want, have) = (want.unwrap_or(&empty), have.unwrap_or(&empty));
    want.len() == have.len()
        && want
            .iter()
            .all(|(name, q)| have.get(name).map_or(false, |other| same_quantity(q, other)))
}

fn same_resources(want: Option<&ResourceRequirements>, have: Option<&ResourceRequirements>) -> bool {
    let none = ResourceRequirements::default();
    let (want, have) = (want.unwrap_or(&none), have.unwrap_or(&none));
    same_quantities(want.limits.as_ref(), have.limits.as_ref())
        && same_quantities(want.requests.as_ref(), have.requests.as_ref())
}

fn same_probe(want: Option<&Probe>, have: Option<&Probe>) -> bool {
    match (want, have) {
        (None, None) => true,
        (Some(want), Some(have)) => same_fields(want, have),
        _ => false,
    }
}

impl Managed for StatefulSet {
    /// Compares replicas and the pod template. Claim templates are immutable
    /// once the workload exists and are not compared.
    fn drifted_from(&self, live: &Self) -> bool {
        let replicas = |ss: &StatefulSet| ss.spec.as_ref().and_then(|s| s.replicas);
        if replicas(self) != replicas(live) {
            return true;
        }
        if !same_fields(&pod_volumes(self), &pod_volumes(live)) {
            return true;
        }

        match (first_container(self), first_container(live)) {
            (Some(want), Some(have)) => {
                want.image != have.image
                    || !same_resources(want.resources.as_ref(), have.resources.as_ref())
                    || !same_fields(
                        &want.env.clone().unwrap_or_default(),
                        &have.env.clone().unwrap_or_default(),
                    )
                    || !same_fields(
                        &want.volume_mounts.clone().unwrap_or_default(),
                        &have.volume_mounts.clone().unwrap_or_default(),
                    )
                    || !same_probe(want.liveness_probe.as_ref(), have.liveness_probe.as_ref())
                    || !same_probe(want.readiness_probe.as_ref(), have.readiness_probe.as_ref())
            }
            (want, have) => want.is_some() != have.is_some(),
        }
    }

    fn adopt(&mut self, live: &Self) {
        self.metadata.resource_version = live.metadata.resource_version.clone();
        if let (Some(want), Some(have)) = (self.spec.as_mut(), live.spec.as_ref()) {
            want.volume_claim_templates = have.volume_claim_templates.clone();
        }
    }
}

impl Managed for ConfigMap {
    fn drifted_from(&self, live: &Self) -> bool {
        self.data.clone().unwrap_or_default() != live.data.clone().unwrap_or_default()
    }
}

impl Managed for Service {
    fn drifted_from(&self, live: &Self) -> bool {
        let (want, have) = match (self.spec.as_ref(), live.spec.as_ref()) {
            (Some(want), Some(have)) => (want, have),
            (want, have) => return want.is_some() != have.is_some(),
        };

        let ports = |spec: &ServiceSpec| {
            spec.ports
                .iter()
                .flatten()
                .map(|p| (p.name.clone(), p.port))
                .collect::<Vec<_>>()
        };
        let headless = |spec: &ServiceSpec| {
            spec.cluster_ip.as_deref() == Some("None")
        };

        ports(want) != ports(have)
            || want.selector != have.selector
            || headless(want) != headless(have)
            || want.publish_not_ready_addresses.unwrap_or(false)
                != have.publish_not_ready_addresses.unwrap_or(false)
    }

    fn adopt(&mut self, live: &Self) {
        self.metadata.resource_version = live.metadata.resource_version.clone();
        if let (Some(want), Some(have)) = (self.spec.as_mut(), live.spec.as_ref()) {
            want.cluster_ip = have.cluster_ip.clone();
            want.cluster_ips = have.cluster_ips.clone();
        }
    }
}
