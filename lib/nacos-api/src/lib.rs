//! Nacos operator API types and CRDs for Kubernetes integration
//!
//! This library defines the custom resource managed by the nacos operator:
//! - Nacos: a standalone or clustered Nacos deployment and its observed status

pub mod v1alpha1;

pub use v1alpha1::{Condition, Event, Nacos, NacosSpec, NacosStatus, Phase};
