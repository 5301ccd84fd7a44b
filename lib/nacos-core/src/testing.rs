//! In-memory fakes of the orchestration API and the node-status endpoint

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Pod, PodCondition, PodStatus};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::{Resource, ResourceExt};
use nacos_api::{Nacos, NacosSpec};
use serde_json::Value;

use crate::client::{ChildResource, KubeApi};
use crate::error::{Error, Result};
use crate::manifest::selector_labels;
use crate::nacos::{ClusterNodes, NodeStatusProbe};
use crate::validator;

type Key = (String, String, String);

#[derive(Default)]
struct State {
    objects: BTreeMap<Key, Value>,
    creates: usize,
    updates: usize,
    status_updates: usize,
    version: u64,
    fail_writes: Option<String>,
    concurrent_writer: bool,
}

impl State {
    fn next_version(&mut self) -> String {
        self.version += 1;
        self.version.to_string()
    }
}

fn key<K: ChildResource>(namespace: &str, name: &str) -> Key {
    (K::kind(&()).to_string(), namespace.to_string(), name.to_string())
}

fn selector_matches(selector: &str, labels: &Value) -> bool {
    selector
        .split(',')
        .filter(|term| !term.is_empty())
        .all(|term| match term.split_once('=') {
            Some((k, v)) => labels.get(k).and_then(Value::as_str) == Some(v),
            None => false,
        })
}

/// Orchestration API backed by a map of JSON objects
#[derive(Default)]
pub(crate) struct FakeKube {
    state: Mutex<State>,
}

impl FakeKube {
    pub fn new() -> Self {
        Self::default()
    }

    /// Child creates plus updates
    pub fn writes(&self) -> usize {
        let state = self.state.lock().unwrap();
        state.creates + state.updates
    }

    pub fn updates(&self) -> usize {
        self.state.lock().unwrap().updates
    }

    pub fn status_updates(&self) -> usize {
        self.state.lock().unwrap().status_updates
    }

    pub fn count<K: ChildResource>(&self) -> usize {
        let kind = K::kind(&()).to_string();
        let state = self.state.lock().unwrap();
        state.objects.keys().filter(|(k, _, _)| *k == kind).count()
    }

    /// Make every child create/update/delete fail
    pub fn fail_writes(&self, reason: &str) {
        self.state.lock().unwrap().fail_writes = Some(reason.to_string());
    }

    /// Let another writer bump every object right before each update,
    /// so updates carry a stale resource version
    pub fn race_updates(&self) {
        self.state.lock().unwrap().concurrent_writer = true;
    }

    fn insert<K: ChildResource>(&self, mut obj: K) {
        let mut state = self.state.lock().unwrap();
        obj.meta_mut().resource_version = Some(state.next_version());
        let namespace = obj.namespace().unwrap_or_default();
        let value = serde_json::to_value(&obj).unwrap();
        state.objects.insert(key::<K>(&namespace, &obj.name_any()), value);
    }

    pub fn insert_nacos(&self, nacos: Nacos) {
        self.insert(nacos);
    }

    pub fn insert_pod(&self, pod: Pod) {
        self.insert(pod);
    }
}

#[async_trait]
impl KubeApi for FakeKube {
    async fn get<K: ChildResource>(&self, namespace: &str, name: &str) -> Result<Option<K>> {
        let state = self.state.lock().unwrap();
        state
            .objects
            .get(&key::<K>(namespace, name))
            .map(|v| serde_json::from_value(v.clone()))
            .transpose()
            .map_err(Error::from)
    }

    async fn create<K: ChildResource>(&self, namespace: &str, obj: &K) -> Result<K> {
        let mut state = self.state.lock().unwrap();
        if let Some(reason) = &state.fail_writes {
            return Err(Error::Internal(reason.clone()));
        }
        let key = key::<K>(namespace, &obj.name_any());
        if state.objects.contains_key(&key) {
            return Err(Error::Conflict(format!("{:?} already exists", key)));
        }

        let mut created = obj.clone();
        created.meta_mut().resource_version = Some(state.next_version());
        state.objects.insert(key, serde_json::to_value(&created)?);
        state.creates += 1;
        Ok(created)
    }

    async fn update<K: ChildResource>(&self, namespace: &str, obj: &K) -> Result<K> {
        let mut state = self.state.lock().unwrap();
        if let Some(reason) = &state.fail_writes {
            return Err(Error::Internal(reason.clone()));
        }
        let key = key::<K>(namespace, &obj.name_any());
        if state.concurrent_writer {
            let version = state.next_version();
            if let Some(stored) = state.objects.get_mut(&key) {
                stored["metadata"]["resourceVersion"] = Value::String(version);
            }
        }
        let stored_version = state
            .objects
            .get(&key)
            .ok_or_else(|| Error::Internal(format!("{:?} not found", key)))?
            .pointer("/metadata/resourceVersion")
            .and_then(Value::as_str)
            .map(str::to_string);
        if stored_version != obj.meta().resource_version {
            return Err(Error::Conflict(format!("{:?} has a newer version", key)));
        }

        let mut updated = obj.clone();
        updated.meta_mut().resource_version = Some(state.next_version());
        state.objects.insert(key, serde_json::to_value(&updated)?);
        state.updates += 1;
        Ok(updated)
    }

    async fn delete<K: ChildResource>(&self, namespace: &str, name: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if let Some(reason) = &state.fail_writes {
            return Err(Error::Internal(reason.clone()));
        }
        state.objects.remove(&key::<K>(namespace, name));
        Ok(())
    }

    async fn list<K: ChildResource>(
        &self,
        namespace: &str,
        label_selector: Option<&str>,
    ) -> Result<Vec<K>> {
        let kind = K::kind(&()).to_string();
        let state = self.state.lock().unwrap();
        state
            .objects
            .iter()
            .filter(|((k, ns, _), _)| *k == kind && ns == namespace)
            .filter(|(_, v)| {
                let labels = v.pointer("/metadata/labels").cloned().unwrap_or(Value::Null);
                label_selector.map_or(true, |s| selector_matches(s, &labels))
            })
            .map(|(_, v)| serde_json::from_value(v.clone()).map_err(Error::from))
            .collect()
    }

    async fn update_status(&self, nacos: &Nacos) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        let key = key::<Nacos>(&nacos.namespace().unwrap_or_default(), &nacos.name_any());
        let status = serde_json::to_value(&nacos.status)?;
        let stored = state
            .objects
            .get_mut(&key)
            .ok_or_else(|| Error::Internal(format!("{:?} not found", key)))?;
        stored["status"] = status;
        state.status_updates += 1;
        Ok(())
    }
}

/// Node-status endpoint returning scripted codes per pod address
pub(crate) struct FakeProbe {
    codes: HashMap<String, i32>,
    unreachable: HashSet<String>,
    calls: Mutex<Vec<String>>,
}

impl FakeProbe {
    /// Every address answers with code 200
    pub fn healthy() -> Self {
        Self {
            codes: HashMap::new(),
            unreachable: HashSet::new(),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn with_code(mut self, address: &str, code: i32) -> Self {
        self.codes.insert(address.to_string(), code);
        self
    }

    pub fn unreachable(mut self, address: &str) -> Self {
        self.unreachable.insert(address.to_string());
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl NodeStatusProbe for FakeProbe {
    async fn cluster_nodes(&self, pod_address: &str) -> Result<ClusterNodes> {
        self.calls.lock().unwrap().push(pod_address.to_string());
        if self.unreachable.contains(pod_address) {
            return Err(Error::Internal("connection refused".to_string()));
        }
        Ok(ClusterNodes {
            code: self.codes.get(pod_address).copied().unwrap_or(200),
            ..Default::default()
        })
    }
}

/// Defaulted Nacos object in namespace `default` with an image and a uid
pub(crate) fn nacos(name: &str, cluster_type: &str, replicas: i32) -> Nacos {
    let mut nacos = Nacos::new(
        name,
        NacosSpec {
            cluster_type: cluster_type.to_string(),
            image: "nacos:v2".to_string(),
            replicas: Some(replicas),
            ..Default::default()
        },
    );
    nacos.metadata.namespace = Some("default".to_string());
    nacos.metadata.uid = Some(format!("uid-{}", name));
    validator::validate(&mut nacos.spec);
    nacos
}

/// Pod `<workload>-<ordinal>` at address `10.0.0.<ordinal>`
pub(crate) fn pod(workload: &str, ordinal: u32, ready: bool) -> Pod {
    Pod {
        metadata: ObjectMeta {
            name: Some(format!("{}-{}", workload, ordinal)),
            namespace: Some("default".to_string()),
            labels: Some(selector_labels(workload)),
            ..Default::default()
        },
        status: Some(PodStatus {
            pod_ip: Some(format!("10.0.0.{}", ordinal)),
            conditions: Some(vec![PodCondition {
                type_: "Ready".to_string(),
                status: if ready { "True" } else { "False" }.to_string(),
                ..Default::default()
            }]),
            ..Default::default()
        }),
        ..Default::default()
    }
}
