//! Fixed names, ports and codes shared across the engine

use std::fmt;
use std::str::FromStr;

use crate::error::Error;

/// Client (HTTP API) port of every Nacos instance
pub const CLIENT_PORT: i32 = 8848;
/// Raft/peer port of every Nacos instance
pub const RAFT_PORT: i32 = 7848;

pub const CLIENT_PORT_NAME: &str = "client";
pub const RAFT_PORT_NAME: &str = "rpc";

/// Path of the node-status endpoint polled by the checker
pub const NODE_STATUS_PATH: &str = "/nacos/v1/core/cluster/nodes";
/// `code` reported by a healthy node-status endpoint
pub const HEALTHY_NODE_CODE: i32 = 200;

pub const DATA_VOLUME: &str = "db";
pub const DATA_MOUNT_PATH: &str = "/home/nacos/data";
pub const CONFIG_VOLUME: &str = "config";
pub const CONFIG_MOUNT_PATH: &str = "/home/nacos/init.d/custom.properties";

pub const CUSTOM_PROPERTIES_KEY: &str = "custom.properties";
pub const APPLICATION_PROPERTIES_KEY: &str = "application.properties";
pub const CLUSTER_CONF_KEY: &str = "cluster.conf";

pub const HEADLESS_SUFFIX: &str = "headless";
pub const POD_MANAGEMENT_PARALLEL: &str = "Parallel";

pub const LABEL_APP: &str = "app";
pub const LABEL_MIDDLEWARE: &str = "middleware";
pub const LABEL_COMPONENT: &str = "component";
pub const MIDDLEWARE: &str = "nacos";

pub const DEFAULT_REPLICAS: i32 = 1;
pub const DEFAULT_MYSQL_HOST: &str = "127.0.0.1";
pub const DEFAULT_MYSQL_PORT: &str = "3306";
pub const DEFAULT_MYSQL_DB: &str = "nacos";
pub const DEFAULT_MYSQL_USER: &str = "root";
pub const DEFAULT_MYSQL_PASSWORD: &str = "123456";

/// Environment variable names injected into the server container
pub mod env {
    pub const PREFER_HOST_MODE: &str = "PREFER_HOST_MODE";
    pub const HOST_MODE_HOSTNAME: &str = "hostname";
    pub const EMBEDDED_STORAGE: &str = "EMBEDDED_STORAGE";
    pub const MYSQL_SERVICE_HOST: &str = "MYSQL_SERVICE_HOST";
    pub const MYSQL_SERVICE_PORT: &str = "MYSQL_SERVICE_PORT";
    pub const MYSQL_SERVICE_DB_NAME: &str = "MYSQL_SERVICE_DB_NAME";
    pub const MYSQL_SERVICE_USER: &str = "MYSQL_SERVICE_USER";
    pub const MYSQL_SERVICE_PASSWORD: &str = "MYSQL_SERVICE_PASSWORD";
    pub const MODE: &str = "MODE";
    pub const NACOS_REPLICAS: &str = "NACOS_REPLICAS";
    pub const NACOS_SERVERS: &str = "NACOS_SERVERS";
}

/// Codes carried by fatal errors and recorded in `status.events`
pub mod codes {
    /// Invalid field in the declared spec
    pub const PARAMETER_ERROR: i32 = 400;
    /// Live workload replica count differs from the declared count
    pub const REPLICA_MISMATCH: i32 = 501;
    /// Fewer Ready instances than the quorum
    pub const QUORUM_LOST: i32 = 502;
    /// An instance's node-status endpoint is unreachable or unhealthy
    pub const NACOS_UNREACHABLE: i32 = 503;
}

/// Deployment mode of a Nacos object
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ClusterType {
    Standalone,
    Cluster,
}

impl ClusterType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClusterType::Standalone => "standalone",
            ClusterType::Cluster => "cluster",
        }
    }
}

impl FromStr for ClusterType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "standalone" => Ok(ClusterType::Standalone),
            "cluster" => Ok(ClusterType::Cluster),
            other => Err(Error::fatal(
                codes::PARAMETER_ERROR,
                format!("invalid value {:?} for spec.type", other),
            )),
        }
    }
}

impl fmt::Display for ClusterType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Storage backend of a Nacos object
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DatabaseType {
    Embedded,
    Mysql,
}

impl DatabaseType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DatabaseType::Embedded => "embedded",
            DatabaseType::Mysql => "mysql",
        }
    }
}

impl FromStr for DatabaseType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "embedded" => Ok(DatabaseType::Embedded),
            "mysql" => Ok(DatabaseType::Mysql),
            other => Err(Error::fatal(
                codes::PARAMETER_ERROR,
                format!("invalid value {:?} for spec.database.type", other),
            )),
        }
    }
}

impl fmt::Display for DatabaseType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
