//! Unit tests for the buffer filters

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use buffer_client::MockBufferClient;
    use crds::{
        ConditionStatus, ACTIVE_CAPACITY_STRATEGY, PROVISIONING_CONDITION,
        READY_FOR_PROVISIONING_CONDITION,
    };

    use crate::filters::{
        AnyFilter, BufferFilter, BufferGenerationFilter, ConditionFilter,
        PodTemplateGenerationFilter, StrategyFilter, StrategySource,
    };
    use crate::test_utils::{buffer, pod_template, translated_buffer};

    fn names(buffers: &[crds::CapacityBuffer]) -> Vec<String> {
        buffers
            .iter()
            .map(|b| b.metadata.name.clone().unwrap_or_default())
            .collect()
    }

    #[tokio::test]
    async fn strategy_filter_treats_missing_strategy_as_empty() {
        let mut with_strategy = buffer("default", "explicit");
        with_strategy.spec.provisioning_strategy = Some(ACTIVE_CAPACITY_STRATEGY.to_string());
        let defaulted = buffer("default", "defaulted");
        let mut foreign = buffer("default", "foreign");
        foreign.spec.provisioning_strategy = Some("someone-elses-strategy".to_string());

        let mut filter = StrategyFilter::new(
            vec![ACTIVE_CAPACITY_STRATEGY.to_string(), String::new()],
            StrategySource::Spec,
        );
        let (kept, dropped) = filter
            .filter(vec![with_strategy, defaulted, foreign])
            .await;

        assert_eq!(names(&kept), vec!["explicit", "defaulted"]);
        assert_eq!(names(&dropped), vec!["foreign"]);
    }

    #[tokio::test]
    async fn strategy_filter_reads_status_when_asked() {
        let translated = translated_buffer("default", "ready", "pt", 1, 2);
        let untranslated = buffer("default", "new");

        let mut filter = StrategyFilter::new(
            vec![ACTIVE_CAPACITY_STRATEGY.to_string()],
            StrategySource::Status,
        );
        let (kept, dropped) = filter.filter(vec![translated, untranslated]).await;

        assert_eq!(names(&kept), vec!["ready"]);
        assert_eq!(names(&dropped), vec!["new"]);
    }

    #[tokio::test]
    async fn exclusion_filter_drops_on_any_pair() {
        let ready = translated_buffer("default", "ready", "pt", 1, 2);
        let mut provisioned = translated_buffer("default", "provisioned", "pt", 1, 2);
        crds::mark_provisioning(provisioned.status.as_mut().unwrap(), true, "emitted");
        let untouched = buffer("default", "untouched");

        let mut filter = ConditionFilter::excluding(vec![(
            PROVISIONING_CONDITION.to_string(),
            ConditionStatus::True,
        )]);
        let (kept, dropped) = filter.filter(vec![ready, provisioned, untouched]).await;

        assert_eq!(names(&kept), vec!["ready", "untouched"]);
        assert_eq!(names(&dropped), vec!["provisioned"]);
    }

    #[tokio::test]
    async fn inclusion_filter_requires_all_pairs() {
        let ready = translated_buffer("default", "ready", "pt", 1, 2);
        let mut not_ready = translated_buffer("default", "not-ready", "pt", 1, 2);
        crds::mark_not_ready_for_provisioning(
            not_ready.status.as_mut().unwrap(),
            "template missing",
        );
        let no_status = buffer("default", "no-status");

        let mut filter = ConditionFilter::requiring(vec![(
            READY_FOR_PROVISIONING_CONDITION.to_string(),
            ConditionStatus::True,
        )]);
        let (kept, dropped) = filter.filter(vec![ready, not_ready, no_status]).await;

        assert_eq!(names(&kept), vec!["ready"]);
        assert_eq!(names(&dropped), vec!["not-ready", "no-status"]);
    }

    #[tokio::test]
    async fn generation_filter_keeps_unseen_and_changed_only() {
        let mut filter = BufferGenerationFilter::new();
        let b = buffer("default", "b");

        let (kept, _) = filter.filter(vec![b.clone()]).await;
        assert_eq!(names(&kept), vec!["b"]);

        // Same generation on the second pass: nothing to re-translate.
        let (kept, dropped) = filter.filter(vec![b.clone()]).await;
        assert!(kept.is_empty());
        assert_eq!(names(&dropped), vec!["b"]);

        let mut edited = b.clone();
        edited.metadata.generation = Some(2);
        let (kept, _) = filter.filter(vec![edited]).await;
        assert_eq!(names(&kept), vec!["b"]);

        // Cleanup resets the cache, so the old generation looks new again.
        filter.cleanup();
        let (kept, _) = filter.filter(vec![b]).await;
        assert_eq!(names(&kept), vec!["b"]);
    }

    #[tokio::test]
    async fn pod_template_generation_filter_compares_live_generation() {
        let client = MockBufferClient::new();
        client.add_pod_template(pod_template("default", "pt", 3, &[("cpu", "1")]));

        let unchanged = translated_buffer("default", "unchanged", "pt", 3, 2);
        let stale = translated_buffer("default", "stale", "pt", 2, 2);
        let no_record = buffer("default", "no-record");
        let missing_template = translated_buffer("default", "missing", "gone", 1, 2);

        let mut filter = PodTemplateGenerationFilter::new(Arc::new(client));
        let (kept, dropped) = filter
            .filter(vec![unchanged, stale, no_record, missing_template])
            .await;

        // Stale generation re-translates; a failed lookup keeps the buffer
        // so translation surfaces the error.
        assert_eq!(names(&kept), vec!["stale", "missing"]);
        assert_eq!(names(&dropped), vec!["unchanged", "no-record"]);
    }

    #[tokio::test]
    async fn any_filter_unions_kept_buffers_in_input_order() {
        let mut edited = buffer("default", "edited");
        edited.metadata.generation = Some(5);
        let mut not_ready = translated_buffer("default", "not-ready", "pt", 1, 2);
        crds::mark_not_ready_for_provisioning(
            not_ready.status.as_mut().unwrap(),
            "still broken",
        );
        let settled = translated_buffer("default", "settled", "pt", 1, 2);

        let mut generation_filter = BufferGenerationFilter::new();
        // Prime the cache so "settled" and "not-ready" are not generation-new.
        let _ = generation_filter
            .filter(vec![not_ready.clone(), settled.clone()])
            .await;

        let mut filter = AnyFilter::new(vec![
            Box::new(generation_filter),
            Box::new(ConditionFilter::requiring(vec![(
                READY_FOR_PROVISIONING_CONDITION.to_string(),
                ConditionStatus::False,
            )])),
        ]);

        let (kept, dropped) = filter.filter(vec![edited, not_ready, settled]).await;
        assert_eq!(names(&kept), vec!["edited", "not-ready"]);
        assert_eq!(names(&dropped), vec!["settled"]);
    }
}
