use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::{EnvVar, Probe, ResourceRequirements};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Nacos declares a Nacos naming/config server deployment, either a single
/// standalone instance or a peer-replicated cluster
#[derive(CustomResource, Clone, Debug, Default, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "nacos.io",
    version = "v1alpha1",
    kind = "Nacos",
    plural = "nacos",
    namespaced,
    derive = "Default",
    status = "NacosStatus",
    printcolumn = r#"{"name":"Type","type":"string","jsonPath":".spec.type"}"#,
    printcolumn = r#"{"name":"Replicas","type":"integer","jsonPath":".spec.replicas"}"#,
    printcolumn = r#"{"name":"Phase","type":"string","jsonPath":".status.phase"}"#,
)]
#[serde(rename_all = "camelCase")]
pub struct NacosSpec {
    /// Deployment mode: "standalone" or "cluster" (defaults to "standalone")
    #[serde(rename = "type", default)]
    pub cluster_type: String,

    /// Container image running the Nacos server
    #[serde(default)]
    pub image: String,

    /// Number of server instances. Unset is distinct from zero.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub replicas: Option<i32>,

    /// Backing database settings
    #[serde(default)]
    pub database: Database,

    /// Raw `custom.properties` text mounted into every instance
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config: Option<String>,

    /// Persistent storage for the server data directory
    #[serde(default)]
    pub volume: Volume,

    /// Extra environment variables for the server container
    #[serde(default)]
    pub env: Vec<EnvVar>,

    /// Container resource requests and limits
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resources: Option<ResourceRequirements>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub liveness_probe: Option<Probe>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub readiness_probe: Option<Probe>,
}

/// Database configuration. Fields other than `type` only apply to mysql.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Database {
    /// "embedded" or "mysql" (defaults to "embedded")
    #[serde(rename = "type", default)]
    pub database_type: String,

    #[serde(default)]
    pub host: String,

    #[serde(default)]
    pub port: String,

    #[serde(default)]
    pub db: String,

    #[serde(default)]
    pub user: String,

    #[serde(default)]
    pub password: String,
}

/// Persistent volume settings for the data directory
#[derive(Clone, Debug, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Volume {
    #[serde(default)]
    pub enabled: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub storage_class: Option<String>,

    /// Storage requests, e.g. `storage: 10Gi`
    #[serde(default)]
    pub requests: BTreeMap<String, Quantity>,
}

/// Observed state of a Nacos deployment
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct NacosStatus {
    /// Coarse lifecycle phase
    #[serde(default)]
    pub phase: Phase,

    /// Failure history, oldest first. Consecutive failures with the same
    /// code share one entry.
    #[serde(default)]
    pub events: Vec<Event>,

    #[serde(default)]
    pub conditions: Vec<Condition>,
}

/// Lifecycle phase. Failed and Running may alternate.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum Phase {
    #[default]
    None,
    Creating,
    Running,
    Failed,
    Scale,
}

/// One entry in the failure history
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub code: i32,

    #[serde(default)]
    pub message: String,

    #[serde(default)]
    pub status: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_appear_time: Option<Time>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_transition_time: Option<Time>,
}

/// Kubernetes-style status condition
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    /// Type of condition
    #[serde(rename = "type")]
    pub condition_type: String,

    /// Status: "True", "False", "Unknown"
    pub status: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_probe_time: Option<Time>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_transition_time: Option<Time>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl NacosStatus {
    /// Most recent entry of the failure history
    pub fn last_event(&self) -> Option<&Event> {
        self.events.last()
    }

    pub fn condition(&self, condition_type: &str) -> Option<&Condition> {
        self.conditions
            .iter()
            .find(|c| c.condition_type == condition_type)
    }
}
