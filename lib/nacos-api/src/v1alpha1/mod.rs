/// API version v1alpha1 for the Nacos operator CRDs

pub mod nacos;

pub use nacos::{
    Condition, Database, Event, Nacos, NacosSpec, NacosStatus, Phase, Volume,
};

/// API group for Nacos operator resources
pub const API_GROUP: &str = "nacos.io";
/// API version for Nacos operator resources
pub const API_VERSION: &str = "v1alpha1";
