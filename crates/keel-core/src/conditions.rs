//! Typed status conditions and the idempotent setter used by every controller step.

use chrono::Utc;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use serde::{Deserialize, Serialize};

/// Cluster reachability through the kubeconfig secret
pub const REMOTE_CONNECTION_PROBE: &str = "RemoteConnectionProbe";
/// Mirrors the infrastructure object's readiness
pub const INFRASTRUCTURE_READY: &str = "InfrastructureReady";
/// Control plane initialization milestone
pub const CONTROL_PLANE_INITIALIZED: &str = "ControlPlaneInitialized";
/// Deletion progress
pub const DELETING: &str = "Deleting";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConditionStatus {
    True,
    False,
    Unknown,
}

impl From<bool> for ConditionStatus {
    fn from(value: bool) -> Self {
        if value {
            ConditionStatus::True
        } else {
            ConditionStatus::False
        }
    }
}

/// A typed, reasoned status field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    #[serde(rename = "type")]
    pub type_: String,
    pub status: ConditionStatus,
    #[serde(default)]
    pub reason: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_transition_time: Option<Time>,
}

impl Condition {
    pub fn new(type_: impl Into<String>, status: bool, reason: impl Into<String>) -> Self {
        Self {
            type_: type_.into(),
            status: status.into(),
            reason: reason.into(),
            message: None,
            last_transition_time: None,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        let message = message.into();
        self.message = if message.is_empty() {
            None
        } else {
            Some(message)
        };
        self
    }

    pub fn is_true(&self) -> bool {
        self.status == ConditionStatus::True
    }

    fn same_value(&self, other: &Condition) -> bool {
        self.status == other.status && self.reason == other.reason && self.message == other.message
    }
}

/// Find a condition by type
pub fn get<'a>(conditions: &'a [Condition], type_: &str) -> Option<&'a Condition> {
    conditions.iter().find(|c| c.type_ == type_)
}

/// True when the condition exists and has status True
pub fn is_true(conditions: &[Condition], type_: &str) -> bool {
    get(conditions, type_).is_some_and(Condition::is_true)
}

/// Set a condition, returning whether anything changed.
///
/// Setting a value identical to the current one is a no-op. The transition
/// time only moves when the status flips; reason or message changes keep the
/// previous timestamp.
pub fn set(conditions: &mut Vec<Condition>, mut condition: Condition) -> bool {
    match conditions.iter_mut().find(|c| c.type_ == condition.type_) {
        Some(existing) => {
            if existing.same_value(&condition) {
                return false;
            }
            condition.last_transition_time = if existing.status == condition.status {
                existing.last_transition_time.clone()
            } else {
                Some(Time(Utc::now()))
            };
            *existing = condition;
            true
        }
        None => {
            condition.last_transition_time = Some(Time(Utc::now()));
            conditions.push(condition);
            true
        }
    }
}
