//! Unit tests for the resource-limit translator

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use k8s_openapi::api::core::v1::{
        Container, PodTemplate, PodTemplateSpec, ResourceRequirements,
    };
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

    use buffer_client::MockBufferClient;
    use crds::{has_condition, ConditionStatus, READY_FOR_PROVISIONING_CONDITION};

    use crate::test_utils::{buffer_with_template_ref, pod_template, quantities, translated_buffer};
    use crate::translators::{BufferTranslator, ResourceLimitTranslator};

    #[tokio::test]
    async fn clamps_to_the_tightest_resource() {
        let client = MockBufferClient::new();
        client.add_pod_template(pod_template(
            "default",
            "pt",
            1,
            &[("memory", "4Gi"), ("cpu", "100m")],
        ));
        let translator = ResourceLimitTranslator::new(Arc::new(client));

        let mut b = translated_buffer("default", "buf", "pt", 1, 5);
        b.spec.limits = Some(quantities(&[("memory", "9Gi"), ("cpu", "200m")]));
        let mut buffers = vec![b];
        let errors = translator.translate(&mut buffers).await;

        assert!(errors.is_empty());
        // min(floor(9Gi/4Gi), floor(200m/100m)) = 2
        assert_eq!(buffers[0].status.as_ref().and_then(|s| s.replicas), Some(2));
        assert!(has_condition(
            buffers[0].status.as_ref().unwrap(),
            READY_FOR_PROVISIONING_CONDITION,
            ConditionStatus::True
        ));
    }

    #[tokio::test]
    async fn keeps_current_replicas_when_budget_is_looser() {
        let client = MockBufferClient::new();
        client.add_pod_template(pod_template("default", "pt", 1, &[("cpu", "100m")]));
        let translator = ResourceLimitTranslator::new(Arc::new(client));

        let mut b = translated_buffer("default", "buf", "pt", 1, 5);
        b.spec.limits = Some(quantities(&[("cpu", "10")]));
        let mut buffers = vec![b];
        let errors = translator.translate(&mut buffers).await;

        assert!(errors.is_empty());
        // Budget fits 100 pods; the earlier translator's 5 stands.
        assert_eq!(buffers[0].status.as_ref().and_then(|s| s.replicas), Some(5));
    }

    #[tokio::test]
    async fn requires_a_resolved_pod_template() {
        let translator = ResourceLimitTranslator::new(Arc::new(MockBufferClient::new()));

        let mut b = buffer_with_template_ref("default", "buf", "pt", Some(5));
        b.spec.limits = Some(quantities(&[("cpu", "1")]));
        let mut buffers = vec![b];
        let errors = translator.translate(&mut buffers).await;

        assert_eq!(errors.len(), 1);
        assert!(has_condition(
            buffers[0].status.as_ref().unwrap(),
            READY_FOR_PROVISIONING_CONDITION,
            ConditionStatus::False
        ));
    }

    #[tokio::test]
    async fn no_matching_resource_marks_not_ready() {
        let client = MockBufferClient::new();
        client.add_pod_template(pod_template("default", "pt", 1, &[("cpu", "100m")]));
        let translator = ResourceLimitTranslator::new(Arc::new(client));

        let mut b = translated_buffer("default", "buf", "pt", 1, 5);
        b.spec.limits = Some(quantities(&[("nvidia.com/gpu", "4")]));
        let mut buffers = vec![b];
        let errors = translator.translate(&mut buffers).await;

        assert_eq!(errors.len(), 1);
        assert!(has_condition(
            buffers[0].status.as_ref().unwrap(),
            READY_FOR_PROVISIONING_CONDITION,
            ConditionStatus::False
        ));
    }

    #[tokio::test]
    async fn defaults_requests_from_limits_before_clamping() {
        // Template declares container limits only; the defaulting resolver
        // fills requests from them before the division.
        let client = MockBufferClient::new();
        client.add_pod_template(PodTemplate {
            metadata: ObjectMeta {
                name: Some("pt".to_string()),
                namespace: Some("default".to_string()),
                generation: Some(1),
                ..Default::default()
            },
            template: Some(PodTemplateSpec {
                metadata: None,
                spec: Some(k8s_openapi::api::core::v1::PodSpec {
                    containers: vec![Container {
                        name: "app".to_string(),
                        resources: Some(ResourceRequirements {
                            limits: Some(quantities(&[("cpu", "500m")])),
                            ..Default::default()
                        }),
                        ..Default::default()
                    }],
                    ..Default::default()
                }),
            }),
        });
        let translator = ResourceLimitTranslator::new(Arc::new(client));

        let mut b = translated_buffer("default", "buf", "pt", 1, 10);
        b.spec.limits = Some(quantities(&[("cpu", "2")]));
        let mut buffers = vec![b];
        let errors = translator.translate(&mut buffers).await;

        assert!(errors.is_empty());
        // floor(2000m / 500m) = 4
        assert_eq!(buffers[0].status.as_ref().and_then(|s| s.replicas), Some(4));
    }
}
