use chrono::{Duration, Utc};
use refresh::notification::Priority;
use refresh::record::RefreshRecord;
use refresh::stage::RefreshStage;
use refresh::store::HistoryStore;
use refresh::test_utils::fakes::Call;
use refresh::test_utils::refresh::{DORMANT_DATABASE, DORMANT_TIER, LATEST_VERSION, TestRefresh};
use telemetry::tracing::init_test_tracing;

/// Stores an unfinished record whose run stopped sending heartbeats an hour ago.
async fn seed_abandoned_record(test: &TestRefresh) -> RefreshRecord {
    let mut record = RefreshRecord::new(DORMANT_DATABASE, LATEST_VERSION);
    record.requested_at = Utc::now() - Duration::hours(3);
    record.last_heartbeat_at = Some(Utc::now() - Duration::hours(1));
    record.completed_stages = [
        RefreshStage::ScaleUp,
        RefreshStage::RebuildMetadataDictionary,
    ]
    .into_iter()
    .collect();

    test.store.create(record.clone()).await.unwrap();

    record
}

#[tokio::test(flavor = "multi_thread")]
async fn cleanup_without_in_progress_records_only_logs() {
    init_test_tracing();
    let test = TestRefresh::new();

    let outcome = test.cleanup.run_data_refresh_cleanup().await;

    assert!(outcome.is_noop());
    assert!(test.services.calls().await.is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn abandoned_record_is_torn_down() {
    init_test_tracing();
    let test = TestRefresh::new();
    let record = seed_abandoned_record(&test).await;

    let outcome = test.cleanup.run_data_refresh_cleanup().await;

    assert_eq!(outcome.cleaned_up, vec![record.id]);

    let calls = test.services.calls().await;
    assert_eq!(calls.len(), 3);
    assert!(matches!(&calls[0], Call::Notify(notification) if notification.priority == Priority::High));
    assert_eq!(calls[1], Call::resize(DORMANT_DATABASE, DORMANT_TIER));
    assert_eq!(calls[2], Call::EnableImportTrigger);

    let finished = test.store.get_record(record.id).await.unwrap().unwrap();
    assert_eq!(finished.succeeded, Some(false));
    assert!(finished.finished_at.is_some());
    assert_eq!(finished.completed_stages, record.completed_stages);
}

#[tokio::test(flavor = "multi_thread")]
async fn record_with_fresh_heartbeat_is_skipped() {
    init_test_tracing();
    let test = TestRefresh::new();
    let record = test.seed_in_progress_record(&[RefreshStage::ScaleUp]).await;

    let outcome = test.cleanup.run_data_refresh_cleanup().await;

    assert_eq!(outcome.skipped, vec![record.id]);
    assert!(outcome.cleaned_up.is_empty());
    assert!(test.services.calls().await.is_empty());
    assert!(test.current_record().await.is_in_progress());
}

#[tokio::test(flavor = "multi_thread")]
async fn forced_cleanup_ignores_heartbeat() {
    init_test_tracing();
    let test = TestRefresh::new();
    let record = test.seed_in_progress_record(&[RefreshStage::ScaleUp]).await;

    let outcome = test.cleanup.run_forced_data_refresh_cleanup().await;

    assert_eq!(outcome.cleaned_up, vec![record.id]);
    assert_eq!(
        test.services
            .count_calls(&Call::resize(DORMANT_DATABASE, DORMANT_TIER))
            .await,
        1
    );
    assert_eq!(test.current_record().await.succeeded, Some(false));
}

#[tokio::test(flavor = "multi_thread")]
async fn failed_scale_down_leaves_record_for_a_retry() {
    init_test_tracing();
    let test = TestRefresh::new();
    let record = seed_abandoned_record(&test).await;
    test.services.fail_resize_to(DORMANT_TIER).await;

    let outcome = test.cleanup.run_data_refresh_cleanup().await;

    assert_eq!(outcome.failed, vec![record.id]);
    assert!(test.current_record().await.is_in_progress());
    assert_eq!(test.services.count_calls(&Call::EnableImportTrigger).await, 0);

    let alerts = test.services.notifications_with_priority(Priority::High).await;
    assert!(
        alerts
            .iter()
            .any(|alert| alert.summary == "Data refresh teardown failed")
    );

    test.services.clear_failures().await;
    let retry = test.cleanup.run_data_refresh_cleanup().await;

    assert_eq!(retry.cleaned_up, vec![record.id]);
    assert_eq!(test.current_record().await.succeeded, Some(false));
}

#[tokio::test(flavor = "multi_thread")]
async fn cleaned_up_refresh_can_be_started_again() {
    init_test_tracing();
    let test = TestRefresh::new();
    seed_abandoned_record(&test).await;
    test.cleanup.run_data_refresh_cleanup().await;
    let (_shutdown_tx, shutdown_rx) = refresh::concurrency::shutdown::create_shutdown_channel();

    let outcome = test.orchestrator.refresh_data_if_necessary(shutdown_rx).await;

    assert!(matches!(
        outcome,
        refresh::orchestrator::RefreshOutcome::Succeeded { .. }
    ));
    assert_eq!(test.store.records().await.len(), 2);
}
