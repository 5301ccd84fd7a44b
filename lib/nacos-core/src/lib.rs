//! Reconciliation engine for Nacos deployments
//!
//! This library provides:
//! - Spec defaulting and child manifest derivation
//! - Idempotent apply of ConfigMaps, StatefulSets and Services
//! - Replica, quorum and application health checks
//! - Phase/event status reporting and the per-object reconcile pass

pub mod apply;
pub mod checker;
pub mod client;
pub mod config;
pub mod constants;
pub mod ensurer;
pub mod error;
pub mod healer;
pub mod manifest;
pub mod nacos;
pub mod reconciler;
pub mod status;
pub mod validator;

#[cfg(test)]
pub(crate) mod testing;

pub use checker::Checker;
pub use client::{KubeApi, KubeClient};
pub use config::ControllerConfig;
pub use ensurer::Ensurer;
pub use error::{Error, Result};
pub use healer::{Heal, NoopHealer};
pub use nacos::{HttpNodeStatusProbe, NodeStatusProbe};
pub use reconciler::{PassOutcome, Reconciler};
pub use status::StatusReporter;
