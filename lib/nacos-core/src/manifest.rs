//! Derivation of child resource manifests from a Nacos spec
//!
//! Every child object is a pure function of the declared object: the
//! ConfigMap, the StatefulSet, and one Service (standalone) or a headless
//! plus a client-facing Service (cluster).

use std::collections::BTreeMap;

use k8s_openapi::api::apps::v1::{StatefulSet, StatefulSetSpec};
use k8s_openapi::api::core::v1::{
    ConfigMap, ConfigMapVolumeSource, Container, ContainerPort, EnvVar, KeyToPath,
    PersistentVolumeClaim, PersistentVolumeClaimSpec, PodSpec, PodTemplateSpec, Service,
    ServicePort, ServiceSpec, Volume, VolumeMount, VolumeResourceRequirements,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::{Resource, ResourceExt};
use nacos_api::Nacos;

use crate::constants::{
    codes, env, ClusterType, DatabaseType, APPLICATION_PROPERTIES_KEY, CLIENT_PORT,
    CLIENT_PORT_NAME, CLUSTER_CONF_KEY, CONFIG_MOUNT_PATH, CONFIG_VOLUME, CUSTOM_PROPERTIES_KEY,
    DATA_MOUNT_PATH, DATA_VOLUME, DEFAULT_REPLICAS, HEADLESS_SUFFIX, LABEL_APP, LABEL_COMPONENT,
    LABEL_MIDDLEWARE, MIDDLEWARE, POD_MANAGEMENT_PARALLEL, RAFT_PORT, RAFT_PORT_NAME,
};
use crate::error::{Error, Result};

const LAST_APPLIED_ANNOTATION: &str = "kubectl.kubernetes.io/last-applied-configuration";

/// Server configuration used when the object declares no `config` text.
/// Follows the upstream nacos-docker `application.properties`.
pub const DEFAULT_APPLICATION_PROPERTIES: &str = r#"# spring
server.servlet.contextPath=${SERVER_SERVLET_CONTEXTPATH:/nacos}
server.contextPath=/nacos
server.port=${NACOS_APPLICATION_PORT:8848}
spring.datasource.platform=${SPRING_DATASOURCE_PLATFORM:""}
nacos.cmdb.dumpTaskInterval=3600
nacos.cmdb.eventTaskInterval=10
nacos.cmdb.labelTaskInterval=300
nacos.cmdb.loadDataAtStart=false
db.num=${MYSQL_DATABASE_NUM:1}
db.url.0=jdbc:mysql://${MYSQL_SERVICE_HOST}:${MYSQL_SERVICE_PORT:3306}/${MYSQL_SERVICE_DB_NAME}?${MYSQL_SERVICE_DB_PARAM:characterEncoding=utf8&connectTimeout=1000&socketTimeout=3000&autoReconnect=true}
db.user=${MYSQL_SERVICE_USER}
db.password=${MYSQL_SERVICE_PASSWORD}
### auth
nacos.core.auth.enabled=${NACOS_AUTH_ENABLE:false}
nacos.core.auth.system.type=${NACOS_AUTH_SYSTEM_TYPE:nacos}
nacos.core.auth.default.token.expire.seconds=${NACOS_AUTH_TOKEN_EXPIRE_SECONDS:18000}
nacos.core.auth.default.token.secret.key=${NACOS_AUTH_TOKEN:SecretKey012345678901234567890123456789012345678901234567890123456789}
nacos.core.auth.caching.enabled=${NACOS_AUTH_CACHE_ENABLE:false}
nacos.core.auth.enable.userAgentAuthWhite=${NACOS_AUTH_USER_AGENT_AUTH_WHITE_ENABLE:false}
nacos.core.auth.server.identity.key=${NACOS_AUTH_IDENTITY_KEY:serverIdentity}
nacos.core.auth.server.identity.value=${NACOS_AUTH_IDENTITY_VALUE:security}
### logging
server.tomcat.accesslog.enabled=${TOMCAT_ACCESSLOG_ENABLED:false}
server.tomcat.accesslog.pattern=%h %l %u %t "%r" %s %b %D
server.tomcat.basedir=
### security
nacos.security.ignore.urls=${NACOS_SECURITY_IGNORE_URLS:/,/error,/**/*.css,/**/*.js,/**/*.html,/**/*.map,/**/*.svg,/**/*.png,/**/*.ico,/console-fe/public/**,/v1/auth/**,/v1/console/health/**,/actuator/**,/v1/console/server/**}
management.metrics.export.elastic.enabled=false
management.metrics.export.influx.enabled=false
### distro
nacos.naming.distro.taskDispatchThreadCount=10
nacos.naming.distro.taskDispatchPeriod=200
nacos.naming.distro.batchSyncKeyCount=1000
nacos.naming.distro.initDataRatio=0.9
nacos.naming.distro.syncRetryDelay=5000
nacos.naming.data.warmup=true
"#;

/// Labels shared by every child object and used as the pod selector
pub fn selector_labels(name: &str) -> BTreeMap<String, String> {
    BTreeMap::from([
        (LABEL_APP.to_string(), name.to_string()),
        (LABEL_MIDDLEWARE.to_string(), MIDDLEWARE.to_string()),
        (LABEL_COMPONENT.to_string(), MIDDLEWARE.to_string()),
    ])
}

/// Render a label map as a `k=v,k=v` selector
pub fn label_selector(labels: &BTreeMap<String, String>) -> String {
    labels
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join(",")
}

/// Builds the child resource set of one Nacos object
pub struct ManifestBuilder<'a> {
    nacos: &'a Nacos,
    name: String,
    namespace: String,
    cluster_type: ClusterType,
    database_type: DatabaseType,
    replicas: i32,
    cluster_domain: &'a str,
}

impl<'a> ManifestBuilder<'a> {
    /// Parse the (already defaulted) spec. Invalid type fields or negative
    /// replicas are fatal parameter errors.
    pub fn new(nacos: &'a Nacos, cluster_domain: &'a str) -> Result<Self> {
        let namespace = nacos
            .namespace()
            .ok_or_else(|| Error::Internal(format!("Nacos {} has no namespace", nacos.name_any())))?;
        let cluster_type = nacos.spec.cluster_type.parse::<ClusterType>()?;
        let database_type = nacos.spec.database.database_type.parse::<DatabaseType>()?;
        let replicas = nacos.spec.replicas.unwrap_or(DEFAULT_REPLICAS);
        if replicas < 0 {
            return Err(Error::fatal(
                codes::PARAMETER_ERROR,
                format!("spec.replicas must not be negative, got {}", replicas),
            ));
        }

        Ok(Self {
            nacos,
            name: nacos.name_any(),
            namespace,
            cluster_type,
            database_type,
            replicas,
            cluster_domain,
        })
    }

    pub fn cluster_type(&self) -> ClusterType {
        self.cluster_type
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn headless_service_name(&self) -> String {
        format!("{}-{}", self.name, HEADLESS_SUFFIX)
    }

    /// Fully qualified DNS name of the headless service
    pub fn headless_fqdn(&self) -> String {
        format!(
            "{}.{}.svc.{}",
            self.headless_service_name(),
            self.namespace,
            self.cluster_domain
        )
    }

    /// Stable per-ordinal addresses of every replica, ordinal order
    pub fn peer_addresses(&self) -> Vec<String> {
        let fqdn = self.headless_fqdn();
        (0..self.replicas)
            .map(|ordinal| format!("{}-{}.{}:{}", self.name, ordinal, fqdn, CLIENT_PORT))
            .collect()
    }

    fn labels(&self) -> BTreeMap<String, String> {
        let mut labels = self.nacos.labels().clone();
        labels.extend(selector_labels(&self.name));
        labels
    }

    fn metadata(&self, name: String) -> ObjectMeta {
        let mut annotations = self.nacos.annotations().clone();
        annotations.remove(LAST_APPLIED_ANNOTATION);

        ObjectMeta {
            name: Some(name),
            namespace: Some(self.namespace.clone()),
            labels: Some(self.labels()),
            annotations: if annotations.is_empty() { None } else { Some(annotations) },
            owner_references: self.nacos.controller_owner_ref(&()).map(|r| vec![r]),
            ..Default::default()
        }
    }

    fn declared_config(&self) -> Option<&str> {
        self.nacos.spec.config.as_deref().filter(|c| !c.is_empty())
    }

    pub fn config_map(&self) -> ConfigMap {
        let mut data = BTreeMap::new();
        match self.declared_config() {
            Some(config) => {
                data.insert(CUSTOM_PROPERTIES_KEY.to_string(), config.to_string());
            }
            None => {
                data.insert(
                    APPLICATION_PROPERTIES_KEY.to_string(),
                    DEFAULT_APPLICATION_PROPERTIES.to_string(),
                );
            }
        }

        if self.cluster_type == ClusterType::Cluster {
            let conf: String = self
                .peer_addresses()
                .into_iter()
                .map(|peer| peer + "\n")
                .collect();
            data.insert(CLUSTER_CONF_KEY.to_string(), conf);
        }

        ConfigMap {
            metadata: self.metadata(self.name.clone()),
            data: Some(data),
            ..Default::default()
        }
    }

    /// Server container environment: declared overrides first, then the
    /// operator-managed variables
    pub fn container_env(&self) -> Vec<EnvVar> {
        let spec = &self.nacos.spec;
        let mut vars = spec.env.clone();
        vars.push(env_var(env::PREFER_HOST_MODE, env::HOST_MODE_HOSTNAME));

        match self.database_type {
            DatabaseType::Embedded => {
                vars.push(env_var(env::EMBEDDED_STORAGE, DatabaseType::Embedded.as_str()));
            }
            DatabaseType::Mysql => {
                let db = &spec.database;
                vars.push(env_var(env::MYSQL_SERVICE_HOST, &db.host));
                vars.push(env_var(env::MYSQL_SERVICE_PORT, &db.port));
                vars.push(env_var(env::MYSQL_SERVICE_DB_NAME, &db.db));
                vars.push(env_var(env::MYSQL_SERVICE_USER, &db.user));
                vars.push(env_var(env::MYSQL_SERVICE_PASSWORD, &db.password));
            }
        }

        match self.cluster_type {
            ClusterType::Standalone => {
                vars.push(env_var(env::MODE, ClusterType::Standalone.as_str()));
            }
            ClusterType::Cluster => {
                vars.push(env_var(env::NACOS_REPLICAS, &self.replicas.to_string()));
                vars.push(env_var(env::NACOS_SERVERS, &self.peer_addresses().join(" ")));
            }
        }
        vars
    }

    pub fn stateful_set(&self) -> StatefulSet {
        let spec = &self.nacos.spec;

        let mut volume_mounts = Vec::new();
        let mut volumes = Vec::new();
        let mut claims = Vec::new();

        if spec.volume.enabled {
            claims.push(PersistentVolumeClaim {
                metadata: ObjectMeta {
                    name: Some(DATA_VOLUME.to_string()),
                    labels: Some(self.labels()),
                    ..Default::default()
                },
                spec: Some(PersistentVolumeClaimSpec {
                    access_modes: Some(vec!["ReadWriteOnce".to_string()]),
                    storage_class_name: spec.volume.storage_class.clone(),
                    resources: Some(VolumeResourceRequirements {
                        requests: Some(spec.volume.requests.clone()),
                        ..Default::default()
                    }),
                    ..Default::default()
                }),
                ..Default::default()
            });
            volume_mounts.push(VolumeMount {
                name: DATA_VOLUME.to_string(),
                mount_path: DATA_MOUNT_PATH.to_string(),
                ..Default::default()
            });
        }

        if self.declared_config().is_some() {
            volumes.push(Volume {
                name: CONFIG_VOLUME.to_string(),
                config_map: Some(ConfigMapVolumeSource {
                    name: self.name.clone(),
                    items: Some(vec![KeyToPath {
                        key: CUSTOM_PROPERTIES_KEY.to_string(),
                        path: CUSTOM_PROPERTIES_KEY.to_string(),
                        ..Default::default()
                    }]),
                    ..Default::default()
                }),
                ..Default::default()
            });
            volume_mounts.push(VolumeMount {
                name: CONFIG_VOLUME.to_string(),
                mount_path: CONFIG_MOUNT_PATH.to_string(),
                sub_path: Some(CUSTOM_PROPERTIES_KEY.to_string()),
                ..Default::default()
            });
        }

        let service_name = match self.cluster_type {
            ClusterType::Standalone => self.name.clone(),
            ClusterType::Cluster => self.headless_service_name(),
        };

        let container = Container {
            name: self.name.clone(),
            image: Some(spec.image.clone()),
            ports: Some(vec![
                container_port(CLIENT_PORT_NAME, CLIENT_PORT),
                container_port(RAFT_PORT_NAME, RAFT_PORT),
            ]),
            env: Some(self.container_env()),
            resources: spec.resources.clone(),
            liveness_probe: spec.liveness_probe.clone(),
            readiness_probe: spec.readiness_probe.clone(),
            volume_mounts: non_empty(volume_mounts),
            ..Default::default()
        };

        StatefulSet {
            metadata: self.metadata(self.name.clone()),
            spec: Some(StatefulSetSpec {
                replicas: Some(self.replicas),
                service_name,
                pod_management_policy: Some(POD_MANAGEMENT_PARALLEL.to_string()),
                selector: LabelSelector {
                    match_labels: Some(selector_labels(&self.name)),
                    ..Default::default()
                },
                template: PodTemplateSpec {
                    metadata: Some(ObjectMeta {
                        labels: Some(self.labels()),
                        ..Default::default()
                    }),
                    spec: Some(PodSpec {
                        containers: vec![container],
                        volumes: non_empty(volumes),
                        ..Default::default()
                    }),
                },
                volume_claim_templates: non_empty(claims),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    fn service_ports() -> Vec<ServicePort> {
        [(CLIENT_PORT_NAME, CLIENT_PORT), (RAFT_PORT_NAME, RAFT_PORT)]
            .into_iter()
            .map(|(name, port)| ServicePort {
                name: Some(name.to_string()),
                port,
                target_port: Some(IntOrString::Int(port)),
                protocol: Some("TCP".to_string()),
                ..Default::default()
            })
            .collect()
    }

    /// Client-facing service with a virtual IP
    pub fn service(&self) -> Service {
        Service {
            metadata: self.metadata(self.name.clone()),
            spec: Some(ServiceSpec {
                ports: Some(Self::service_ports()),
                selector: Some(selector_labels(&self.name)),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    /// Headless service publishing not-ready addresses so peers can resolve
    /// each other before they become ready
    pub fn headless_service(&self) -> Service {
        Service {
            metadata: self.metadata(self.headless_service_name()),
            spec: Some(ServiceSpec {
                cluster_ip: Some("None".to_string()),
                publish_not_ready_addresses: Some(true),
                ports: Some(Self::service_ports()),
                selector: Some(selector_labels(&self.name)),
                ..Default::default()
            }),
            ..Default::default()
        }
    }
}

fn env_var(name: &str, value: &str) -> EnvVar {
    EnvVar {
        name: name.to_string(),
        value: Some(value.to_string()),
        ..Default::default()
    }
}

fn container_port(name: &str, port: i32) -> ContainerPort {
    ContainerPort {
        name: Some(name.to_string()),
        container_port: port,
        protocol: Some("TCP".to_string()),
        ..Default::default()
    }
}

fn non_empty<T>(items: Vec<T>) -> Option<Vec<T>> {
    if items.is_empty() {
        None
    } else {
        Some(items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::nacos;

    fn env_value(vars: &[EnvVar], name: &str) -> Option<String> {
        vars.iter()
            .find(|v| v.name == name)
            .and_then(|v| v.value.clone())
    }

    #[test]
    fn test_peer_list_rendering() {
        let nc = nacos("nc", "cluster", 3);
        let builder = ManifestBuilder::new(&nc, "cluster.local").unwrap();

        let servers = env_value(&builder.container_env(), env::NACOS_SERVERS).unwrap();
        assert_eq!(
            servers,
            "nc-0.nc-headless.default.svc.cluster.local:8848 \
             nc-1.nc-headless.default.svc.cluster.local:8848 \
             nc-2.nc-headless.default.svc.cluster.local:8848"
        );
        assert_eq!(servers.split(' ').count(), 3);
        assert!(!servers.starts_with(' ') && !servers.ends_with(' '));
        assert_eq!(env_value(&builder.container_env(), env::NACOS_REPLICAS).unwrap(), "3");
    }

    #[test]
    fn test_standalone_env() {
        let nc = nacos("nc", "standalone", 1);
        let vars = ManifestBuilder::new(&nc, "cluster.local").unwrap().container_env();

        assert_eq!(env_value(&vars, env::PREFER_HOST_MODE).unwrap(), "hostname");
        assert_eq!(env_value(&vars, env::EMBEDDED_STORAGE).unwrap(), "embedded");
        assert_eq!(env_value(&vars, env::MODE).unwrap(), "standalone");
        assert!(env_value(&vars, env::NACOS_SERVERS).is_none());
        assert!(env_value(&vars, env::MYSQL_SERVICE_HOST).is_none());
    }

    #[test]
    fn test_mysql_env_and_user_env_first() {
        let mut nc = nacos("nc", "standalone", 1);
        nc.spec.database.database_type = "mysql".to_string();
        crate::validator::validate(&mut nc.spec);
        nc.spec.env = vec![env_var("JVM_XMS", "1g")];

        let vars = ManifestBuilder::new(&nc, "cluster.local").unwrap().container_env();
        assert_eq!(vars[0].name, "JVM_XMS");
        assert_eq!(env_value(&vars, env::MYSQL_SERVICE_HOST).unwrap(), "127.0.0.1");
        assert_eq!(env_value(&vars, env::MYSQL_SERVICE_PORT).unwrap(), "3306");
        assert_eq!(env_value(&vars, env::MYSQL_SERVICE_DB_NAME).unwrap(), "nacos");
        assert!(env_value(&vars, env::EMBEDDED_STORAGE).is_none());
    }

    #[test]
    fn test_invalid_type_is_fatal() {
        let nc = nacos("nc", "replicated", 1);
        let err = ManifestBuilder::new(&nc, "cluster.local").err().unwrap();
        assert_eq!(err.code(), Some(codes::PARAMETER_ERROR));
    }

    #[test]
    fn test_default_config_map() {
        let nc = nacos("nc", "standalone", 1);
        let cm = ManifestBuilder::new(&nc, "cluster.local").unwrap().config_map();
        let data = cm.data.unwrap();

        let props = &data[APPLICATION_PROPERTIES_KEY];
        assert!(props.contains("server.servlet.contextPath"));
        assert!(props.contains("server.port"));
        assert!(props.contains("nacos.core.auth.default.token.expire.seconds"));
        assert!(props.contains("nacos.security.ignore.urls"));
        assert!(props.contains("nacos.naming.distro.taskDispatchThreadCount"));
        assert!(!data.contains_key(CUSTOM_PROPERTIES_KEY));
        assert!(!data.contains_key(CLUSTER_CONF_KEY));
        assert!(cm.metadata.owner_references.is_some());
    }

    #[test]
    fn test_cluster_config_map() {
        let mut nc = nacos("nc", "cluster", 2);
        nc.spec.config = Some("nacos.core.auth.enabled=true".to_string());
        let data = ManifestBuilder::new(&nc, "cluster.local")
            .unwrap()
            .config_map()
            .data
            .unwrap();

        assert_eq!(data[CUSTOM_PROPERTIES_KEY], "nacos.core.auth.enabled=true");
        assert_eq!(
            data[CLUSTER_CONF_KEY],
            "nc-0.nc-headless.default.svc.cluster.local:8848\n\
             nc-1.nc-headless.default.svc.cluster.local:8848\n"
        );
    }

    #[test]
    fn test_stateful_set_volumes() {
        let mut nc = nacos("nc", "cluster", 3);
        nc.spec.volume.enabled = true;
        nc.spec.volume.storage_class = Some("fast".to_string());
        nc.spec.config = Some("a=b".to_string());

        let ss = ManifestBuilder::new(&nc, "cluster.local").unwrap().stateful_set();
        let spec = ss.spec.unwrap();
        assert_eq!(spec.replicas, Some(3));
        assert_eq!(spec.pod_management_policy.as_deref(), Some("Parallel"));

        let claims = spec.volume_claim_templates.unwrap();
        assert_eq!(claims.len(), 1);
        assert_eq!(claims[0].metadata.name.as_deref(), Some(DATA_VOLUME));

        let pod = spec.template.spec.unwrap();
        let mounts = pod.containers[0].volume_mounts.clone().unwrap();
        assert!(mounts.iter().any(|m| m.mount_path == DATA_MOUNT_PATH));
        assert!(mounts.iter().any(|m| m.mount_path == CONFIG_MOUNT_PATH));
        assert_eq!(pod.volumes.unwrap().len(), 1);
    }

    #[test]
    fn test_stateful_set_without_storage_or_config() {
        let nc = nacos("nc", "standalone", 1);
        let ss = ManifestBuilder::new(&nc, "cluster.local").unwrap().stateful_set();
        let spec = ss.spec.unwrap();

        assert!(spec.volume_claim_templates.unwrap_or_default().is_empty());
        let pod = spec.template.spec.unwrap();
        assert!(pod.containers[0].volume_mounts.clone().unwrap_or_default().is_empty());
        assert_eq!(pod.containers[0].image.as_deref(), Some("nacos:v2"));
        assert_eq!(spec.selector.match_labels, Some(selector_labels("nc")));
    }

    #[test]
    fn test_services() {
        let nc = nacos("nc", "cluster", 3);
        let builder = ManifestBuilder::new(&nc, "cluster.local").unwrap();

        let headless = builder.headless_service();
        assert_eq!(headless.metadata.name.as_deref(), Some("nc-headless"));
        let spec = headless.spec.unwrap();
        assert_eq!(spec.cluster_ip.as_deref(), Some("None"));
        assert_eq!(spec.publish_not_ready_addresses, Some(true));

        let client = builder.service().spec.unwrap();
        assert!(client.cluster_ip.is_none());
        assert_eq!(client.ports.unwrap()[0].port, CLIENT_PORT);
    }

    #[test]
    fn test_label_selector() {
        assert_eq!(
            label_selector(&selector_labels("nc")),
            "app=nc,component=nacos,middleware=nacos"
        );
    }
}
