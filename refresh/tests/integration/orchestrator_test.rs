use refresh::concurrency::shutdown::create_shutdown_channel;
use refresh::error::ErrorKind;
use refresh::notification::Priority;
use refresh::orchestrator::RefreshOutcome;
use refresh::stage::RefreshStage;
use refresh::test_utils::fakes::{Call, FakeMethod};
use refresh::test_utils::refresh::{
    ACTIVE_VERSION, DORMANT_DATABASE, DORMANT_TIER, LATEST_VERSION, TestRefresh,
};
use telemetry::tracing::init_test_tracing;

#[tokio::test(flavor = "multi_thread")]
async fn equal_versions_do_nothing() {
    init_test_tracing();
    let test = TestRefresh::new();
    test.services
        .set_versions(LATEST_VERSION, LATEST_VERSION)
        .await;
    let (_shutdown_tx, shutdown_rx) = create_shutdown_channel();

    let outcome = test.orchestrator.refresh_data_if_necessary(shutdown_rx).await;

    assert_eq!(outcome, RefreshOutcome::UpToDate);
    assert!(test.services.calls().await.is_empty());
    assert!(test.store.records().await.is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn in_progress_record_prevents_a_new_refresh() {
    init_test_tracing();
    let test = TestRefresh::new();
    test.seed_in_progress_record(&[RefreshStage::ScaleUp]).await;
    let (_shutdown_tx, shutdown_rx) = create_shutdown_channel();

    let outcome = test.orchestrator.refresh_data_if_necessary(shutdown_rx).await;

    assert_eq!(outcome, RefreshOutcome::AlreadyInProgress);
    assert!(test.services.calls().await.is_empty());
    assert_eq!(test.store.records().await.len(), 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn successful_refresh_is_recorded_and_announced() {
    init_test_tracing();
    let test = TestRefresh::new();
    let (_shutdown_tx, shutdown_rx) = create_shutdown_channel();

    let outcome = test.orchestrator.refresh_data_if_necessary(shutdown_rx).await;

    assert_eq!(
        outcome,
        RefreshOutcome::Succeeded {
            nomenclature_version: LATEST_VERSION.to_owned()
        }
    );

    let record = test.current_record().await;
    assert_eq!(record.succeeded, Some(true));
    assert!(record.finished_at.is_some());
    assert_eq!(record.nomenclature_version, LATEST_VERSION);

    let calls = test.services.calls().await;
    assert_eq!(calls.first(), Some(&Call::DisableImportTrigger));
    let replay = calls
        .iter()
        .position(|call| *call == Call::ReplayQueuedUpdates)
        .unwrap();
    let enable = calls
        .iter()
        .position(|call| *call == Call::EnableImportTrigger)
        .unwrap();
    assert!(enable > replay);

    let announcements = test.services.notifications_with_priority(Priority::Low).await;
    assert_eq!(announcements.len(), 1);
    assert!(announcements[0].detail.contains(LATEST_VERSION));
    assert!(
        test.services
            .notifications_with_priority(Priority::High)
            .await
            .is_empty()
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn failed_refresh_is_recorded_and_alerted() {
    init_test_tracing();
    let test = TestRefresh::new();
    test.services.fail_on(FakeMethod::ProcessHla).await;
    let (_shutdown_tx, shutdown_rx) = create_shutdown_channel();

    let outcome = test.orchestrator.refresh_data_if_necessary(shutdown_rx).await;

    let RefreshOutcome::Failed(err) = outcome else {
        panic!("expected a failed outcome, got {outcome:?}");
    };
    assert_eq!(err.kind(), ErrorKind::StageWorkerFailed);

    let record = test.current_record().await;
    assert_eq!(record.succeeded, Some(false));
    assert!(record.finished_at.is_some());

    let alerts = test.services.notifications_with_priority(Priority::High).await;
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].summary, "Data refresh failed");

    assert_eq!(test.services.count_calls(&Call::EnableImportTrigger).await, 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn version_lookup_failure_is_alerted_without_creating_a_record() {
    init_test_tracing();
    let test = TestRefresh::new();
    test.services.fail_on(FakeMethod::GetLatestVersion).await;
    let (_shutdown_tx, shutdown_rx) = create_shutdown_channel();

    let outcome = test.orchestrator.refresh_data_if_necessary(shutdown_rx).await;

    let RefreshOutcome::Failed(err) = outcome else {
        panic!("expected a failed outcome, got {outcome:?}");
    };
    assert_eq!(err.kind(), ErrorKind::VersionProviderFailed);
    assert!(test.store.records().await.is_empty());
    assert_eq!(
        test.services
            .notifications_with_priority(Priority::High)
            .await
            .len(),
        1
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn force_refresh_ignores_equal_versions() {
    init_test_tracing();
    let test = TestRefresh::new();
    test.services
        .set_versions(ACTIVE_VERSION, ACTIVE_VERSION)
        .await;
    let (_shutdown_tx, shutdown_rx) = create_shutdown_channel();

    let outcome = test.orchestrator.force_refresh(shutdown_rx).await;

    assert_eq!(
        outcome,
        RefreshOutcome::Succeeded {
            nomenclature_version: ACTIVE_VERSION.to_owned()
        }
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn force_refresh_still_honours_in_progress_record() {
    init_test_tracing();
    let test = TestRefresh::new();
    test.seed_in_progress_record(&[]).await;
    let (_shutdown_tx, shutdown_rx) = create_shutdown_channel();

    let outcome = test.orchestrator.force_refresh(shutdown_rx).await;

    assert_eq!(outcome, RefreshOutcome::AlreadyInProgress);
}

#[tokio::test(flavor = "multi_thread")]
async fn continue_refresh_resumes_the_interrupted_record() {
    init_test_tracing();
    let test = TestRefresh::new();
    let seeded = test
        .seed_in_progress_record(&[
            RefreshStage::ScaleUp,
            RefreshStage::RebuildMetadataDictionary,
            RefreshStage::RemoveIndexes,
            RefreshStage::DeleteDonorData,
            RefreshStage::ImportDonors,
        ])
        .await;
    let (_shutdown_tx, shutdown_rx) = create_shutdown_channel();

    let outcome = test.orchestrator.continue_refresh(shutdown_rx).await;

    assert!(matches!(outcome, RefreshOutcome::Succeeded { .. }));
    assert_eq!(test.services.count_calls(&Call::ImportAllDonors).await, 0);
    assert_eq!(
        test.services
            .count_calls(&Call::ProcessHla {
                nomenclature_version: LATEST_VERSION.to_owned(),
                is_continuation: true,
            })
            .await,
        1
    );

    let record = test.current_record().await;
    assert_eq!(record.id, seeded.id);
    assert_eq!(record.succeeded, Some(true));
}

#[tokio::test(flavor = "multi_thread")]
async fn continue_refresh_without_interrupted_record_does_nothing() {
    init_test_tracing();
    let test = TestRefresh::new();
    let (_shutdown_tx, shutdown_rx) = create_shutdown_channel();

    let outcome = test.orchestrator.continue_refresh(shutdown_rx).await;

    assert_eq!(outcome, RefreshOutcome::NothingToContinue);
    assert!(test.services.calls().await.is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn cancelled_refresh_is_torn_down_and_recorded_as_failed() {
    init_test_tracing();
    let test = TestRefresh::new();
    let (shutdown_tx, shutdown_rx) = create_shutdown_channel();
    test.services
        .shutdown_on(FakeMethod::RebuildMetadata, shutdown_tx)
        .await;

    let outcome = test.orchestrator.refresh_data_if_necessary(shutdown_rx).await;

    assert_eq!(outcome, RefreshOutcome::Cancelled);
    let record = test.current_record().await;
    assert!(record.finished_at.is_some());
    assert_eq!(record.succeeded, Some(false));
    assert_eq!(
        test.services
            .count_calls(&Call::resize(DORMANT_DATABASE, DORMANT_TIER))
            .await,
        1
    );
    assert_eq!(test.services.count_calls(&Call::RemoveIndexes).await, 0);

    let alerts = test.services.notifications_with_priority(Priority::High).await;
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].summary, "Data refresh cancelled");
    assert_eq!(test.services.count_calls(&Call::EnableImportTrigger).await, 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn running_refresh_rejects_a_second_one() {
    init_test_tracing();
    let test = TestRefresh::new();
    let blocked = test.services.block_on(FakeMethod::ImportAllDonors).await;
    let (_shutdown_tx, shutdown_rx) = create_shutdown_channel();

    let orchestrator = test.orchestrator.clone();
    let first_rx = shutdown_rx.clone();
    let first =
        tokio::spawn(async move { orchestrator.refresh_data_if_necessary(first_rx).await });
    blocked.reached.notified().await;

    let second = test.orchestrator.refresh_data_if_necessary(shutdown_rx).await;
    assert_eq!(second, RefreshOutcome::AlreadyInProgress);

    blocked.release();
    let first = first.await.unwrap();
    assert!(matches!(first, RefreshOutcome::Succeeded { .. }));
    assert_eq!(test.store.records().await.len(), 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn disable_trigger_failure_finishes_the_record() {
    init_test_tracing();
    let test = TestRefresh::new();
    test.services.fail_on(FakeMethod::DisableImportTrigger).await;
    let (_shutdown_tx, shutdown_rx) = create_shutdown_channel();

    let outcome = test.orchestrator.refresh_data_if_necessary(shutdown_rx).await;

    assert!(matches!(outcome, RefreshOutcome::Failed(_)));
    assert!(test.services.stage_calls().await.is_empty());

    let record = test.current_record().await;
    assert_eq!(record.succeeded, Some(false));
}
