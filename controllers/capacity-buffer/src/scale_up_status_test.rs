//! Unit tests for the scale-up status processor

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use k8s_openapi::api::core::v1::Pod;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

    use crate::hook::FakePodsRegistry;
    use crate::scale_up_status::{
        CollectingEventSink, FakePodsScaleUpStatusProcessor, NoScaleUpInfo, ScaleUpInfo,
        ScaleUpResult, ScaleUpStatus, NOT_TRIGGER_SCALE_UP_REASON, TRIGGERED_SCALE_UP_REASON,
    };
    use crate::test_utils::buffer;

    fn real_pod(name: &str) -> Pod {
        Pod {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                uid: Some(format!("{name}-uid")),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    fn fake_pod(name: &str, uid: &str) -> Pod {
        let mut pod = real_pod(name);
        pod.metadata.uid = Some(uid.to_string());
        pod.metadata.annotations = Some(
            [(
                crds::POD_TYPE_ANNOTATION.to_string(),
                crds::FAKE_POD_ANNOTATION_VALUE.to_string(),
            )]
            .into_iter()
            .collect(),
        );
        pod
    }

    fn processor(
        entries: &[(&str, &str)],
    ) -> (FakePodsScaleUpStatusProcessor, Arc<CollectingEventSink>) {
        let mut registry = FakePodsRegistry::default();
        for (uid, buffer_name) in entries {
            registry.insert(uid.to_string(), buffer("default", buffer_name));
        }
        let sink = Arc::new(CollectingEventSink::default());
        let processor = FakePodsScaleUpStatusProcessor::new(
            Arc::new(Mutex::new(registry)),
            sink.clone(),
        );
        (processor, sink)
    }

    fn status(result: ScaleUpResult) -> ScaleUpStatus {
        ScaleUpStatus {
            result,
            scale_up_infos: Vec::new(),
            pods_triggered_scale_up: Vec::new(),
            pods_awaiting_evaluation: Vec::new(),
            pods_remain_unschedulable: Vec::new(),
        }
    }

    fn scale_up_info(group: &str) -> ScaleUpInfo {
        ScaleUpInfo {
            group: group.to_string(),
            current_size: 5,
            new_size: 6,
        }
    }

    #[tokio::test]
    async fn placeholders_are_stripped_from_every_list() {
        let (processor, _) = processor(&[]);
        let mut status = status(ScaleUpResult::Successful);
        status.pods_triggered_scale_up = vec![real_pod("p1"), fake_pod("f1", "f1-uid")];
        status.pods_awaiting_evaluation = vec![real_pod("p2"), fake_pod("f2", "f2-uid")];
        status.pods_remain_unschedulable = vec![
            NoScaleUpInfo { pod: real_pod("p3"), reasons: vec![] },
            NoScaleUpInfo { pod: fake_pod("f3", "f3-uid"), reasons: vec![] },
        ];

        processor.process(&mut status).await;

        assert_eq!(status.pods_triggered_scale_up.len(), 1);
        assert_eq!(status.pods_triggered_scale_up[0].metadata.name.as_deref(), Some("p1"));
        assert_eq!(status.pods_awaiting_evaluation.len(), 1);
        assert_eq!(status.pods_remain_unschedulable.len(), 1);
        assert_eq!(
            status.pods_remain_unschedulable[0].pod.metadata.name.as_deref(),
            Some("p3")
        );
    }

    #[tokio::test]
    async fn successful_scale_up_emits_one_event_per_buffer() {
        let (processor, sink) = processor(&[("f1", "b1"), ("f2", "b1"), ("f3", "b2")]);
        let mut status = status(ScaleUpResult::Successful);
        status.scale_up_infos = vec![scale_up_info("ng-1")];
        status.pods_triggered_scale_up = vec![
            real_pod("p1"),
            fake_pod("fake-1", "f1"),
            fake_pod("fake-2", "f2"),
            fake_pod("fake-3", "f3"),
        ];

        processor.process(&mut status).await;

        // Two placeholders of b1 collapse into a single event.
        assert_eq!(
            sink.events(),
            vec![
                ("b1".to_string(), TRIGGERED_SCALE_UP_REASON.to_string()),
                ("b2".to_string(), TRIGGERED_SCALE_UP_REASON.to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn errored_attempt_emits_no_events() {
        let (processor, sink) = processor(&[("f1", "b1")]);
        let mut status = status(ScaleUpResult::Error);
        status.scale_up_infos = vec![scale_up_info("ng-1")];
        status.pods_triggered_scale_up = vec![fake_pod("fake-1", "f1")];
        status.pods_remain_unschedulable = vec![NoScaleUpInfo {
            pod: fake_pod("fake-2", "f1"),
            reasons: vec!["no capacity".to_string()],
        }];

        processor.process(&mut status).await;

        assert!(sink.events().is_empty());
        assert!(status.pods_triggered_scale_up.is_empty());
        assert!(status.pods_remain_unschedulable.is_empty());
    }

    #[tokio::test]
    async fn empty_scale_up_infos_means_nothing_was_triggered() {
        let (processor, sink) = processor(&[("f1", "b1")]);
        let mut status = status(ScaleUpResult::Successful);
        status.pods_triggered_scale_up = vec![fake_pod("fake-1", "f1")];

        processor.process(&mut status).await;

        assert!(sink.events().is_empty());
    }

    #[tokio::test]
    async fn unschedulable_placeholders_emit_not_triggered_events() {
        let (processor, sink) = processor(&[("f1", "b1"), ("f2", "b2")]);
        let mut status = status(ScaleUpResult::NoOptionsAvailable);
        status.scale_up_infos = vec![scale_up_info("ng-1")];
        status.pods_triggered_scale_up = vec![fake_pod("fake-1", "f1")];
        status.pods_remain_unschedulable = vec![NoScaleUpInfo {
            pod: fake_pod("fake-2", "f2"),
            reasons: vec!["would not fit ng-1".to_string()],
        }];

        processor.process(&mut status).await;

        assert_eq!(
            sink.events(),
            vec![
                ("b1".to_string(), TRIGGERED_SCALE_UP_REASON.to_string()),
                ("b2".to_string(), NOT_TRIGGER_SCALE_UP_REASON.to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn unregistered_placeholders_are_stripped_without_events() {
        let (processor, sink) = processor(&[]);
        let mut status = status(ScaleUpResult::Successful);
        status.scale_up_infos = vec![scale_up_info("ng-1")];
        status.pods_triggered_scale_up = vec![fake_pod("fake-1", "unknown-uid")];

        processor.process(&mut status).await;

        assert!(sink.events().is_empty());
        assert!(status.pods_triggered_scale_up.is_empty());
    }
}
