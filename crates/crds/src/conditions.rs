//! Status conditions for CapacityBuffer
//!
//! Conditions are merged by type: writing a condition replaces the entry of
//! the same type and leaves every other type untouched. The transition time
//! only advances when the status actually flips.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::capacity_buffer::CapacityBufferStatus;

/// Condition type set by the translators once a buffer's desired state is
/// fully resolved.
pub const READY_FOR_PROVISIONING_CONDITION: &str = "ReadyForProvisioning";

/// Condition type set by the pod-list hook after emitting placeholder pods.
pub const PROVISIONING_CONDITION: &str = "Provisioning";

/// Condition type set by the quota allocator when replicas were trimmed.
pub const LIMITED_BY_QUOTAS_CONDITION: &str = "LimitedByQuotas";

/// Status of a buffer condition.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub enum ConditionStatus {
    /// The condition holds.
    True,
    /// The condition does not hold.
    False,
}

/// A single typed condition on a buffer's status.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    /// Condition type, unique within the condition list.
    #[serde(rename = "type")]
    pub type_: String,

    /// Whether the condition currently holds.
    pub status: ConditionStatus,

    /// Machine-readable reason for the last transition.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,

    /// Human-readable message accompanying the reason.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    /// Time of the last status flip. Unchanged while status stays the same.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_transition_time: Option<DateTime<Utc>>,
}

/// Look up a condition by type.
pub fn get_condition<'a>(
    status: &'a CapacityBufferStatus,
    condition_type: &str,
) -> Option<&'a Condition> {
    status
        .conditions
        .as_ref()?
        .iter()
        .find(|c| c.type_ == condition_type)
}

/// Check whether the status carries a `(type, status)` pair.
pub fn has_condition(
    status: &CapacityBufferStatus,
    condition_type: &str,
    condition_status: ConditionStatus,
) -> bool {
    get_condition(status, condition_type).is_some_and(|c| c.status == condition_status)
}

/// Write a condition, merging by type.
///
/// Conditions of other types are preserved. `lastTransitionTime` is carried
/// over from the previous entry when the status did not flip.
pub fn set_condition(
    status: &mut CapacityBufferStatus,
    condition_type: &str,
    condition_status: ConditionStatus,
    reason: &str,
    message: &str,
) {
    let conditions = status.conditions.get_or_insert_with(Vec::new);
    let transition_time = match conditions.iter().find(|c| c.type_ == condition_type) {
        Some(existing) if existing.status == condition_status => existing.last_transition_time,
        _ => Some(Utc::now()),
    };
    let condition = Condition {
        type_: condition_type.to_string(),
        status: condition_status,
        reason: Some(reason.to_string()),
        message: Some(message.to_string()),
        last_transition_time: transition_time,
    };
    match conditions.iter_mut().find(|c| c.type_ == condition_type) {
        Some(slot) => *slot = condition,
        None => conditions.push(condition),
    }
}

/// Mark the buffer as fully translated and safe to provision.
pub fn mark_ready_for_provisioning(status: &mut CapacityBufferStatus) {
    set_condition(
        status,
        READY_FOR_PROVISIONING_CONDITION,
        ConditionStatus::True,
        "translated",
        "buffer spec resolved to a pod template and replica count",
    );
}

/// Mark the buffer as not translatable, with the failure reason.
pub fn mark_not_ready_for_provisioning(status: &mut CapacityBufferStatus, message: &str) {
    set_condition(
        status,
        READY_FOR_PROVISIONING_CONDITION,
        ConditionStatus::False,
        "translationFailed",
        message,
    );
}

/// Record the outcome of placeholder-pod emission.
pub fn mark_provisioning(status: &mut CapacityBufferStatus, provisioned: bool, message: &str) {
    set_condition(
        status,
        PROVISIONING_CONDITION,
        if provisioned {
            ConditionStatus::True
        } else {
            ConditionStatus::False
        },
        if provisioned {
            "fakePodsEmitted"
        } else {
            "provisioningFailed"
        },
        message,
    );
}

/// Record whether resource quotas trimmed the buffer's replicas.
pub fn mark_limited_by_quotas(status: &mut CapacityBufferStatus, limited: bool, message: &str) {
    set_condition(
        status,
        LIMITED_BY_QUOTAS_CONDITION,
        if limited {
            ConditionStatus::True
        } else {
            ConditionStatus::False
        },
        if limited { "quotaExceeded" } else { "withinQuota" },
        message,
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_condition_preserves_other_types() {
        let mut status = CapacityBufferStatus::default();
        mark_ready_for_provisioning(&mut status);
        mark_limited_by_quotas(&mut status, true, "cpu quota exhausted");

        assert!(has_condition(
            &status,
            READY_FOR_PROVISIONING_CONDITION,
            ConditionStatus::True
        ));
        assert!(has_condition(
            &status,
            LIMITED_BY_QUOTAS_CONDITION,
            ConditionStatus::True
        ));
        assert_eq!(status.conditions.as_ref().map(Vec::len), Some(2));
    }

    #[test]
    fn set_condition_replaces_same_type() {
        let mut status = CapacityBufferStatus::default();
        mark_ready_for_provisioning(&mut status);
        mark_not_ready_for_provisioning(&mut status, "pod template missing");

        assert_eq!(status.conditions.as_ref().map(Vec::len), Some(1));
        let cond = get_condition(&status, READY_FOR_PROVISIONING_CONDITION)
            .expect("condition should exist");
        assert_eq!(cond.status, ConditionStatus::False);
        assert_eq!(cond.message.as_deref(), Some("pod template missing"));
    }

    #[test]
    fn transition_time_advances_only_on_flip() {
        let mut status = CapacityBufferStatus::default();
        mark_ready_for_provisioning(&mut status);
        let first = get_condition(&status, READY_FOR_PROVISIONING_CONDITION)
            .and_then(|c| c.last_transition_time);

        // Same status, new message: transition time must be carried over.
        set_condition(
            &mut status,
            READY_FOR_PROVISIONING_CONDITION,
            ConditionStatus::True,
            "translated",
            "still fine",
        );
        let second = get_condition(&status, READY_FOR_PROVISIONING_CONDITION)
            .and_then(|c| c.last_transition_time);
        assert_eq!(first, second);

        mark_not_ready_for_provisioning(&mut status, "broken");
        let third = get_condition(&status, READY_FOR_PROVISIONING_CONDITION)
            .and_then(|c| c.last_transition_time);
        assert!(third >= second);
    }
}
