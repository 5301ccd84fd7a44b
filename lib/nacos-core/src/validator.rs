//! Defaulting of a declared Nacos spec

use nacos_api::NacosSpec;

use crate::constants::{
    ClusterType, DatabaseType, DEFAULT_MYSQL_DB, DEFAULT_MYSQL_HOST, DEFAULT_MYSQL_PASSWORD,
    DEFAULT_MYSQL_PORT, DEFAULT_MYSQL_USER, DEFAULT_REPLICAS,
};

/// Fill absent fields of `spec` with their defaults. Never fails; values that
/// are present but invalid are rejected later, when manifests are derived.
pub fn validate(spec: &mut NacosSpec) {
    if spec.cluster_type.is_empty() {
        spec.cluster_type = ClusterType::Standalone.as_str().to_string();
    }

    if spec.replicas.is_none() {
        spec.replicas = Some(DEFAULT_REPLICAS);
    }

    let database = &mut spec.database;
    if database.database_type.is_empty() {
        database.database_type = DatabaseType::Embedded.as_str().to_string();
    }

    if database.database_type == DatabaseType::Mysql.as_str() {
        default_if_empty(&mut database.host, DEFAULT_MYSQL_HOST);
        default_if_empty(&mut database.user, DEFAULT_MYSQL_USER);
        default_if_empty(&mut database.db, DEFAULT_MYSQL_DB);
        default_if_empty(&mut database.password, DEFAULT_MYSQL_PASSWORD);
        default_if_empty(&mut database.port, DEFAULT_MYSQL_PORT);
    }
}

fn default_if_empty(field: &mut String, default: &str) {
    if field.is_empty() {
        *field = default.to_string();
    }
}
