//! Unit tests for the pod-template translator

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use buffer_client::MockBufferClient;
    use crds::{
        get_condition, has_condition, ConditionStatus, ACTIVE_CAPACITY_STRATEGY,
        READY_FOR_PROVISIONING_CONDITION,
    };

    use crate::test_utils::{buffer, buffer_with_template_ref, pod_template};
    use crate::translators::{BufferTranslator, PodTemplateTranslator};

    #[tokio::test]
    async fn translates_happy_path() {
        let client = MockBufferClient::new();
        client.add_pod_template(pod_template("default", "pt", 3, &[("cpu", "1")]));
        let translator = PodTemplateTranslator::new(Arc::new(client));

        let mut buffers = vec![buffer_with_template_ref("default", "buf", "pt", Some(5))];
        let errors = translator.translate(&mut buffers).await;

        assert!(errors.is_empty());
        let status = buffers[0].status.as_ref().expect("status should be set");
        assert_eq!(status.pod_template_ref.as_ref().map(|r| r.name.as_str()), Some("pt"));
        assert_eq!(status.pod_template_generation, Some(3));
        assert_eq!(status.replicas, Some(5));
        assert_eq!(
            status.provisioning_strategy.as_deref(),
            Some(ACTIVE_CAPACITY_STRATEGY)
        );
        assert!(has_condition(
            status,
            READY_FOR_PROVISIONING_CONDITION,
            ConditionStatus::True
        ));
    }

    #[tokio::test]
    async fn missing_template_marks_not_ready_without_touching_ref() {
        let translator = PodTemplateTranslator::new(Arc::new(MockBufferClient::new()));

        let mut buffers = vec![buffer_with_template_ref("default", "buf", "gone", Some(5))];
        let errors = translator.translate(&mut buffers).await;

        assert_eq!(errors.len(), 1);
        let status = buffers[0].status.as_ref().expect("status should be set");
        assert!(status.pod_template_ref.is_none());
        assert!(status.pod_template_generation.is_none());
        assert!(has_condition(
            status,
            READY_FOR_PROVISIONING_CONDITION,
            ConditionStatus::False
        ));
    }

    #[tokio::test]
    async fn nil_replicas_marks_not_ready() {
        let client = MockBufferClient::new();
        client.add_pod_template(pod_template("default", "pt", 1, &[("cpu", "1")]));
        let translator = PodTemplateTranslator::new(Arc::new(client));

        let mut buffers = vec![buffer_with_template_ref("default", "buf", "pt", None)];
        let errors = translator.translate(&mut buffers).await;

        assert_eq!(errors.len(), 1);
        let status = buffers[0].status.as_ref().expect("status should be set");
        let condition = get_condition(status, READY_FOR_PROVISIONING_CONDITION)
            .expect("condition should be set");
        assert_eq!(condition.status, ConditionStatus::False);
        assert!(condition
            .message
            .as_deref()
            .unwrap_or_default()
            .contains("cannot determine replica count"));
    }

    #[tokio::test]
    async fn negative_replicas_clamp_to_zero() {
        let client = MockBufferClient::new();
        client.add_pod_template(pod_template("default", "pt", 1, &[("cpu", "1")]));
        let translator = PodTemplateTranslator::new(Arc::new(client));

        let mut buffers = vec![buffer_with_template_ref("default", "buf", "pt", Some(-4))];
        let errors = translator.translate(&mut buffers).await;

        assert!(errors.is_empty());
        assert_eq!(buffers[0].status.as_ref().and_then(|s| s.replicas), Some(0));
    }

    #[tokio::test]
    async fn skips_buffers_without_template_ref() {
        let translator = PodTemplateTranslator::new(Arc::new(MockBufferClient::new()));

        let mut buffers = vec![buffer("default", "scalable-only")];
        let errors = translator.translate(&mut buffers).await;

        assert!(errors.is_empty());
        assert!(buffers[0].status.is_none());
    }
}
