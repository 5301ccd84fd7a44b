//! Phase and event history reporting

use std::sync::Arc;

use chrono::{DateTime, Utc};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use kube::ResourceExt;
use nacos_api::{Condition, Event, Nacos, NacosStatus, Phase};
use tracing::{debug, warn};

use crate::client::KubeApi;

pub const CONDITION_READY: &str = "Ready";
pub const REASON_HEALTHY: &str = "ClusterHealthy";
const EVENT_STATUS_FAILED: &str = "false";

/// Record a fully successful pass
pub fn record_running(status: &mut NacosStatus, now: DateTime<Utc>) {
    status.phase = Phase::Running;
    set_condition(status, "True", REASON_HEALTHY, None, now);
}

/// Record a fatal failure. A failure with the same code as the most recent
/// event only refreshes that event's transition time.
pub fn record_failure(status: &mut NacosStatus, code: i32, message: &str, now: DateTime<Utc>) {
    match status.events.last_mut() {
        Some(last) if last.code == code => {
            last.last_transition_time = Some(Time(now));
        }
        _ => status.events.push(Event {
            code,
            message: message.to_string(),
            status: EVENT_STATUS_FAILED.to_string(),
            first_appear_time: Some(Time(now)),
            last_transition_time: Some(Time(now)),
        }),
    }
    status.phase = Phase::Failed;
    set_condition(
        status,
        "False",
        &format!("Fatal{}", code),
        Some(message.to_string()),
        now,
    );
}

fn set_condition(
    status: &mut NacosStatus,
    value: &str,
    reason: &str,
    message: Option<String>,
    now: DateTime<Utc>,
) {
    let existing = status
        .conditions
        .iter_mut()
        .find(|c| c.condition_type == CONDITION_READY);

    match existing {
        Some(condition) => {
            let reason = Some(reason.to_string());
            if condition.status != value || condition.reason != reason {
                if condition.status != value {
                    condition.status = value.to_string();
                    condition.last_transition_time = Some(Time(now));
                }
                condition.reason = reason;
                condition.last_probe_time = Some(Time(now));
            }
            condition.message = message;
        }
        None => status.conditions.push(Condition {
            condition_type: CONDITION_READY.to_string(),
            status: value.to_string(),
            last_probe_time: Some(Time(now)),
            last_transition_time: Some(Time(now)),
            reason: Some(reason.to_string()),
            message,
        }),
    }
}

/// Writes phase/event outcomes to the status subresource. Write failures are
/// logged and never escalated.
pub struct StatusReporter<C> {
    client: Arc<C>,
}

impl<C: KubeApi> StatusReporter<C> {
    pub fn new(client: Arc<C>) -> Self {
        Self { client }
    }

    /// First observation of an object: show it as Creating while the
    /// cluster comes up
    pub async fn mark_creating(&self, nacos: &mut Nacos) {
        self.update(nacos, |status| status.phase = Phase::Creating).await;
    }

    pub async fn report_running(&self, nacos: &mut Nacos) {
        self.update(nacos, |status| record_running(status, Utc::now())).await;
    }

    pub async fn report_failure(&self, nacos: &mut Nacos, code: i32, message: &str) {
        self.update(nacos, |status| record_failure(status, code, message, Utc::now()))
            .await;
    }

    /// Apply `record` and persist only when the status actually changed
    async fn update<F>(&self, nacos: &mut Nacos, record: F)
    where
        F: FnOnce(&mut NacosStatus) + Send,
    {
        let before = nacos.status.clone();
        record(nacos.status.get_or_insert_with(Default::default));
        if nacos.status == before {
            debug!(name = %nacos.name_any(), "status unchanged");
            return;
        }
        self.persist(nacos).await;
    }

    async fn persist(&self, nacos: &Nacos) {
        let phase = nacos.status.as_ref().map(|s| s.phase).unwrap_or_default();
        match self.client.update_status(nacos).await {
            Ok(()) => debug!(name = %nacos.name_any(), ?phase, "status persisted"),
            Err(e) => warn!(
                namespace = %nacos.namespace().unwrap_or_default(),
                name = %nacos.name_any(),
                ?phase,
                error = %e,
                "failed to persist status"
            ),
        }
    }
}
