//! Resource quota allocator
//!
//! Trims buffer replicas so that aggregated placeholder demand, on top of
//! the usage each quota already observes, never exceeds the quota's hard
//! limits. Allocation is order-sensitive: earlier buffers get first claim
//! on shared quota, and reservations made for them are carried into later
//! buffers' evaluations. Quota evaluation reads `status.hard`/`status.used`,
//! which reflect what the quota admission controller currently enforces.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use k8s_openapi::api::core::v1::{
    Pod, PodAffinityTerm, ResourceQuota, ScopedResourceSelectorRequirement,
    WeightedPodAffinityTerm,
};
use tracing::{debug, warn};

use buffer_client::BufferClientTrait;
use crds::{mark_limited_by_quotas, CapacityBuffer};

use crate::error::ControllerError;
use crate::filters::buffer_key;
use crate::quantity::{clamp_replicas, milli_div_floor, quantity_milli};
use crate::resolver::{pod_requests, DefaultingPodResolver};

/// Prefix under which quota keys alias plain resource names.
const REQUESTS_PREFIX: &str = "requests.";

type MilliRequests = BTreeMap<String, i128>;

pub struct QuotaAllocator {
    client: Arc<dyn BufferClientTrait>,
    resolver: DefaultingPodResolver,
}

impl QuotaAllocator {
    pub fn new(client: Arc<dyn BufferClientTrait>) -> Self {
        Self {
            client,
            resolver: DefaultingPodResolver,
        }
    }

    /// Trim the buffers of one namespace against its quotas, in the order
    /// given. Statuses are mutated in place; errors never abort the batch.
    pub async fn allocate(
        &self,
        namespace: &str,
        buffers: &mut [CapacityBuffer],
    ) -> Vec<ControllerError> {
        let quotas = match self.client.list_resource_quotas(namespace).await {
            Ok(quotas) => quotas,
            Err(err) => return vec![err.into()],
        };

        // Reservations by quota UID made for earlier buffers in this pass.
        let mut reserved: HashMap<String, MilliRequests> = HashMap::new();
        let mut errors = Vec::new();

        for buffer in buffers.iter_mut() {
            if buffer.metadata.namespace.as_deref().unwrap_or_default() != namespace {
                warn!(buffer = %buffer_key(buffer), namespace, "buffer namespace mismatch");
                continue;
            }
            let Some((template_name, current)) = buffer.status.as_ref().and_then(|s| {
                Some((s.pod_template_ref.as_ref()?.name.clone(), s.replicas?))
            }) else {
                continue;
            };

            let template = match self.client.get_pod_template(namespace, &template_name).await {
                Ok(template) => template,
                Err(err) => {
                    errors.push(err.into());
                    continue;
                }
            };
            let Some(template_spec) = template.template else {
                errors.push(ControllerError::translation(
                    namespace,
                    buffer.metadata.name.as_deref().unwrap_or_default(),
                    format!("pod template {template_name} has no template spec"),
                ));
                continue;
            };
            let pod = self.resolver.resolve(namespace, &template_spec);
            let requests = match pod_requests(&pod) {
                Ok(requests) => requests,
                Err(err) => {
                    errors.push(err);
                    continue;
                }
            };
            if requests.is_empty() {
                // Best-effort pods consume no quota-tracked compute.
                continue;
            }
            let requests = with_request_aliases(requests);

            let mut allowed = current;
            let mut blocking: Vec<String> = Vec::new();
            let mut matching: Vec<&ResourceQuota> = Vec::new();
            for quota in &quotas {
                match pod_matches_quota_scope(&pod, quota) {
                    Ok(true) => {}
                    Ok(false) => continue,
                    Err(err) => {
                        // The quota cannot be evaluated; it neither trims
                        // nor accumulates reservations for this buffer.
                        errors.push(err);
                        continue;
                    }
                }
                let quota_name = quota.metadata.name.clone().unwrap_or_default();
                let uid = quota.metadata.uid.as_deref().unwrap_or_default();
                let max_for_quota =
                    match max_replicas_for_quota(quota, &requests, reserved.get(uid)) {
                        Ok(max) => max,
                        Err(err) => {
                            errors.push(err);
                            continue;
                        }
                    };
                matching.push(quota);
                if max_for_quota < current {
                    blocking.push(quota_name);
                }
                allowed = allowed.min(max_for_quota);
            }

            let Some(status) = buffer.status.as_mut() else {
                continue;
            };
            if allowed < current {
                status.replicas = Some(allowed);
                mark_limited_by_quotas(
                    status,
                    true,
                    &format!(
                        "replicas limited from {current} to {allowed} by resource quotas: {}",
                        blocking.join(", ")
                    ),
                );
                debug!(
                    buffer = %buffer_key(buffer),
                    from = current,
                    to = allowed,
                    "buffer limited by quotas"
                );
            } else {
                mark_limited_by_quotas(status, false, "");
            }

            if allowed > 0 {
                update_reserved(&matching, &mut reserved, &requests, allowed);
            }
        }
        errors
    }
}

fn with_request_aliases(requests: MilliRequests) -> MilliRequests {
    let mut aliased = requests.clone();
    for (name, value) in requests {
        aliased.insert(format!("{REQUESTS_PREFIX}{name}"), value);
    }
    aliased
}

/// How many replicas of a pod with the given requests fit into the quota's
/// remaining room. Iterates the quota's hard keys; resources the pod does
/// not request never constrain.
fn max_replicas_for_quota(
    quota: &ResourceQuota,
    requests: &MilliRequests,
    reserved: Option<&MilliRequests>,
) -> Result<i32, ControllerError> {
    let Some(status) = quota.status.as_ref() else {
        return Ok(i32::MAX);
    };
    let hard = status.hard.clone().unwrap_or_default();
    let used = status.used.clone().unwrap_or_default();

    let mut max: i128 = i128::from(i32::MAX);
    for (name, hard_limit) in &hard {
        let Some(&request) = requests.get(name) else {
            continue;
        };
        if request <= 0 {
            continue;
        }
        let hard_milli = quantity_milli(hard_limit)?;
        let used_milli = used.get(name).map(quantity_milli).transpose()?.unwrap_or(0);
        let reserved_milli = reserved.and_then(|r| r.get(name)).copied().unwrap_or(0);
        let available = hard_milli - used_milli - reserved_milli;
        if available < 0 {
            return Ok(0);
        }
        max = max.min(milli_div_floor(available, request));
    }
    Ok(clamp_replicas(max))
}

/// Credit `replicas` pods' worth of requests to every matching quota, for
/// the resources each quota actually tracks.
fn update_reserved(
    matching: &[&ResourceQuota],
    reserved: &mut HashMap<String, MilliRequests>,
    requests: &MilliRequests,
    replicas: i32,
) {
    for quota in matching {
        let Some(hard) = quota.status.as_ref().and_then(|s| s.hard.as_ref()) else {
            continue;
        };
        let uid = quota.metadata.uid.clone().unwrap_or_default();
        let entry = reserved.entry(uid).or_default();
        for (name, request) in requests {
            if !hard.contains_key(name) {
                continue;
            }
            *entry.entry(name.clone()).or_insert(0) += request * i128::from(replicas);
        }
    }
}

fn scope_selectors(quota: &ResourceQuota) -> Vec<ScopedResourceSelectorRequirement> {
    let mut selectors = Vec::new();
    let Some(spec) = quota.spec.as_ref() else {
        return selectors;
    };
    // Plain scopes are implicit Exists selectors.
    for scope in spec.scopes.iter().flatten() {
        selectors.push(ScopedResourceSelectorRequirement {
            scope_name: scope.clone(),
            operator: "Exists".to_string(),
            values: None,
        });
    }
    if let Some(selector) = spec.scope_selector.as_ref() {
        selectors.extend(selector.match_expressions.iter().flatten().cloned());
    }
    selectors
}

/// A pod matches a quota iff it satisfies all of the quota's scope
/// selectors.
fn pod_matches_quota_scope(pod: &Pod, quota: &ResourceQuota) -> Result<bool, ControllerError> {
    for selector in scope_selectors(quota) {
        if !pod_matches_selector(pod, quota, &selector)? {
            return Ok(false);
        }
    }
    Ok(true)
}

fn pod_matches_selector(
    pod: &Pod,
    quota: &ResourceQuota,
    selector: &ScopedResourceSelectorRequirement,
) -> Result<bool, ControllerError> {
    match selector.scope_name.as_str() {
        // Placeholder pods are never terminating.
        "NotTerminating" => Ok(true),
        "Terminating" => Ok(false),
        "BestEffort" => Ok(is_best_effort(pod)),
        "NotBestEffort" => Ok(!is_best_effort(pod)),
        "PriorityClass" => matches_priority_class(pod, quota, selector),
        "CrossNamespacePodAffinity" => Ok(uses_cross_namespace_pod_affinity(pod)),
        _ => Ok(false),
    }
}

fn has_request_key(pod: &Pod, key: &str) -> bool {
    let Some(spec) = pod.spec.as_ref() else {
        return false;
    };
    let containers = spec.containers.iter().chain(spec.init_containers.iter().flatten());
    for container in containers {
        if container
            .resources
            .as_ref()
            .and_then(|r| r.requests.as_ref())
            .is_some_and(|r| r.contains_key(key))
        {
            return true;
        }
    }
    spec.resources
        .as_ref()
        .and_then(|r| r.requests.as_ref())
        .is_some_and(|r| r.contains_key(key))
}

/// The pod is best-effort if it requests neither CPU nor memory. Callers
/// pass the already-defaulted pod, so limit-only containers count.
fn is_best_effort(pod: &Pod) -> bool {
    !has_request_key(pod, "cpu") && !has_request_key(pod, "memory")
}

fn matches_priority_class(
    pod: &Pod,
    quota: &ResourceQuota,
    selector: &ScopedResourceSelectorRequirement,
) -> Result<bool, ControllerError> {
    let quota_name = quota.metadata.name.as_deref().unwrap_or_default();
    let class = pod
        .spec
        .as_ref()
        .and_then(|s| s.priority_class_name.as_deref())
        .unwrap_or_default();
    let values = selector.values.clone().unwrap_or_default();
    match selector.operator.as_str() {
        "Exists" => Ok(!class.is_empty()),
        "DoesNotExist" => {
            if !values.is_empty() {
                return Err(ControllerError::QuotaScope {
                    quota: quota_name.to_string(),
                    reason: "DoesNotExist selector must not carry values".to_string(),
                });
            }
            Ok(class.is_empty())
        }
        "In" => {
            if values.is_empty() {
                return Err(ControllerError::QuotaScope {
                    quota: quota_name.to_string(),
                    reason: "In selector requires a non-empty values set".to_string(),
                });
            }
            Ok(!class.is_empty() && values.iter().any(|v| v == class))
        }
        "NotIn" => {
            if values.is_empty() {
                return Err(ControllerError::QuotaScope {
                    quota: quota_name.to_string(),
                    reason: "NotIn selector requires a non-empty values set".to_string(),
                });
            }
            Ok(class.is_empty() || !values.iter().any(|v| v == class))
        }
        op => Err(ControllerError::QuotaScope {
            quota: quota_name.to_string(),
            reason: format!("{op:?} is not a valid scope selector operator"),
        }),
    }
}

fn is_cross_namespace_term(term: &PodAffinityTerm) -> bool {
    term.namespaces.as_ref().is_some_and(|n| !n.is_empty()) || term.namespace_selector.is_some()
}

fn any_cross_namespace(
    required: Option<&Vec<PodAffinityTerm>>,
    preferred: Option<&Vec<WeightedPodAffinityTerm>>,
) -> bool {
    required.into_iter().flatten().any(is_cross_namespace_term)
        || preferred
            .into_iter()
            .flatten()
            .any(|t| is_cross_namespace_term(&t.pod_affinity_term))
}

fn uses_cross_namespace_pod_affinity(pod: &Pod) -> bool {
    let Some(affinity) = pod.spec.as_ref().and_then(|s| s.affinity.as_ref()) else {
        return false;
    };
    if let Some(affinity) = affinity.pod_affinity.as_ref() {
        if any_cross_namespace(
            affinity.required_during_scheduling_ignored_during_execution.as_ref(),
            affinity.preferred_during_scheduling_ignored_during_execution.as_ref(),
        ) {
            return true;
        }
    }
    if let Some(anti) = affinity.pod_anti_affinity.as_ref() {
        if any_cross_namespace(
            anti.required_during_scheduling_ignored_during_execution.as_ref(),
            anti.preferred_during_scheduling_ignored_during_execution.as_ref(),
        ) {
            return true;
        }
    }
    false
}
