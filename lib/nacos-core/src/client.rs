//! Kubernetes client for Nacos child resources

use std::fmt::Debug;

use async_trait::async_trait;
use k8s_openapi::NamespaceResourceScope;
use kube::api::{DeleteParams, ListParams, Patch, PatchParams, PostParams};
use kube::{Api, Client, Resource, ResourceExt};
use nacos_api::Nacos;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info};

use crate::error::{Error, Result};

const FIELD_MANAGER: &str = "nacos-operator";

/// Any namespaced kind the engine reads or writes
pub trait ChildResource:
    Resource<Scope = NamespaceResourceScope, DynamicType = ()>
    + Clone
    + Debug
    + Serialize
    + DeserializeOwned
    + Send
    + Sync
    + 'static
{
}

impl<K> ChildResource for K where
    K: Resource<Scope = NamespaceResourceScope, DynamicType = ()>
        + Clone
        + Debug
        + Serialize
        + DeserializeOwned
        + Send
        + Sync
        + 'static
{
}

/// Orchestration API used by the engine, keyed by namespace and name.
/// Holds no kind-specific logic.
#[async_trait]
pub trait KubeApi: Send + Sync {
    async fn get<K: ChildResource>(&self, namespace: &str, name: &str) -> Result<Option<K>>;

    async fn create<K: ChildResource>(&self, namespace: &str, obj: &K) -> Result<K>;

    /// Replace an object. `obj` must carry the resource version it was read at.
    async fn update<K: ChildResource>(&self, namespace: &str, obj: &K) -> Result<K>;

    async fn delete<K: ChildResource>(&self, namespace: &str, name: &str) -> Result<()>;

    async fn list<K: ChildResource>(
        &self,
        namespace: &str,
        label_selector: Option<&str>,
    ) -> Result<Vec<K>>;

    /// Write the status subresource of a Nacos object
    async fn update_status(&self, nacos: &Nacos) -> Result<()>;
}

/// KubeClient wraps the Kubernetes client for Nacos operations
#[derive(Clone)]
pub struct KubeClient {
    client: Client,
}

impl KubeClient {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn api<K: ChildResource>(&self, namespace: &str) -> Api<K> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

fn map_write_error<K: ChildResource>(namespace: &str, name: &str, err: kube::Error) -> Error {
    match err {
        kube::Error::Api(ae) if ae.code == 409 => {
            Error::Conflict(format!("{} {}/{}: {}", K::kind(&()), namespace, name, ae.message))
        }
        other => Error::Kubernetes(other),
    }
}

#[async_trait]
impl KubeApi for KubeClient {
    async fn get<K: ChildResource>(&self, namespace: &str, name: &str) -> Result<Option<K>> {
        Ok(self.api::<K>(namespace).get_opt(name).await?)
    }

    async fn create<K: ChildResource>(&self, namespace: &str, obj: &K) -> Result<K> {
        let name = obj.name_any();
        let created = self
            .api::<K>(namespace)
            .create(&PostParams::default(), obj)
            .await
            .map_err(|e| map_write_error::<K>(namespace, &name, e))?;
        info!(kind = %K::kind(&()), namespace = %namespace, name = %name, "created");
        Ok(created)
    }

    async fn update<K: ChildResource>(&self, namespace: &str, obj: &K) -> Result<K> {
        let name = obj.name_any();
        let updated = self
            .api::<K>(namespace)
            .replace(&name, &PostParams::default(), obj)
            .await
            .map_err(|e| map_write_error::<K>(namespace, &name, e))?;
        info!(kind = %K::kind(&()), namespace = %namespace, name = %name, "updated");
        Ok(updated)
    }

    async fn delete<K: ChildResource>(&self, namespace: &str, name: &str) -> Result<()> {
        match self.api::<K>(namespace).delete(name, &DeleteParams::foreground()).await {
            Ok(_) => {
                info!(kind = %K::kind(&()), namespace = %namespace, name = %name, "deleted");
                Ok(())
            }
            Err(kube::Error::Api(ae)) if ae.code == 404 => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn list<K: ChildResource>(
        &self,
        namespace: &str,
        label_selector: Option<&str>,
    ) -> Result<Vec<K>> {
        let mut params = ListParams::default();
        if let Some(selector) = label_selector {
            params = params.labels(selector);
        }
        let list = self.api::<K>(namespace).list(&params).await?;
        debug!(kind = %K::kind(&()), namespace = %namespace, count = list.items.len(), "listed");
        Ok(list.items)
    }

    async fn update_status(&self, nacos: &Nacos) -> Result<()> {
        let namespace = nacos.namespace().unwrap_or_default();
        let name = nacos.name_any();
        let api: Api<Nacos> = Api::namespaced(self.client.clone(), &namespace);
        let patch = serde_json::json!({ "status": nacos.status });

        let params = PatchParams {
            field_manager: Some(FIELD_MANAGER.to_string()),
            ..Default::default()
        };

        api.patch_status(&name, &params, &Patch::Merge(&patch))
            .await
            .map_err(|e| map_write_error::<Nacos>(&namespace, &name, e))?;
        debug!(namespace = %namespace, name = %name, "status updated");
        Ok(())
    }
}
