use refresh::concurrency::shutdown::create_shutdown_channel;
use refresh::error::ErrorKind;
use refresh::notification::Priority;
use refresh::stage::RefreshStage;
use refresh::store::HistoryStore;
use refresh::test_utils::fakes::{Call, FakeMethod};
use refresh::test_utils::refresh::{
    ACTIVE_TIER, DORMANT_DATABASE, DORMANT_TIER, LATEST_VERSION, REFRESH_TIER, TestRefresh,
};
use telemetry::tracing::init_test_tracing;

fn process_hla(is_continuation: bool) -> Call {
    Call::ProcessHla {
        nomenclature_version: LATEST_VERSION.to_owned(),
        is_continuation,
    }
}

fn scale_down_tail() -> Vec<Call> {
    vec![
        Call::resize(DORMANT_DATABASE, ACTIVE_TIER),
        Call::ReplayQueuedUpdates,
    ]
}

#[tokio::test(flavor = "multi_thread")]
async fn refresh_without_record_runs_every_stage_in_order() {
    init_test_tracing();
    let test = TestRefresh::new();
    let (_shutdown_tx, shutdown_rx) = create_shutdown_channel();

    let version = test.runner.refresh_data(shutdown_rx).await.unwrap();

    assert_eq!(version, LATEST_VERSION);
    assert_eq!(
        test.services.stage_calls().await,
        vec![
            Call::resize(DORMANT_DATABASE, REFRESH_TIER),
            Call::RebuildMetadata {
                nomenclature_version: LATEST_VERSION.to_owned()
            },
            Call::RemoveIndexes,
            Call::DeleteAllDonors,
            Call::DeleteAllDonors,
            Call::ImportAllDonors,
            process_hla(false),
            Call::CreateIndexes,
            Call::resize(DORMANT_DATABASE, ACTIVE_TIER),
            Call::ReplayQueuedUpdates,
        ]
    );

    let record = test.current_record().await;
    assert_eq!(record.target_database, DORMANT_DATABASE);
    assert_eq!(record.nomenclature_version, LATEST_VERSION);
    assert_eq!(
        record.completed_stages.iter().copied().collect::<Vec<_>>(),
        RefreshStage::ALL.to_vec()
    );
    // Success is recorded by the orchestrator, not by the runner.
    assert!(record.is_in_progress());
}

#[tokio::test(flavor = "multi_thread")]
async fn all_data_stages_completed_only_scales_down_and_replays() {
    init_test_tracing();
    let test = TestRefresh::new();
    let mut completed = vec![RefreshStage::ScaleUp];
    completed.extend(RefreshStage::DATA);
    test.seed_in_progress_record(&completed).await;
    let (_shutdown_tx, shutdown_rx) = create_shutdown_channel();

    test.runner.refresh_data(shutdown_rx).await.unwrap();

    assert_eq!(test.services.stage_calls().await, scale_down_tail());
    assert_eq!(
        test.services
            .count_calls(&Call::resize(DORMANT_DATABASE, REFRESH_TIER))
            .await,
        0
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn resume_after_import_skips_import_and_continues_hla() {
    init_test_tracing();
    let test = TestRefresh::new();
    test.seed_in_progress_record(&[
        RefreshStage::ScaleUp,
        RefreshStage::RebuildMetadataDictionary,
        RefreshStage::RemoveIndexes,
        RefreshStage::DeleteDonorData,
        RefreshStage::ImportDonors,
    ])
    .await;
    let (_shutdown_tx, shutdown_rx) = create_shutdown_channel();

    test.runner.refresh_data(shutdown_rx).await.unwrap();

    let mut expected = vec![process_hla(true), Call::CreateIndexes];
    expected.extend(scale_down_tail());
    assert_eq!(test.services.stage_calls().await, expected);
}

#[tokio::test(flavor = "multi_thread")]
async fn resume_at_import_clears_donors_exactly_once_first() {
    init_test_tracing();
    let test = TestRefresh::new();
    test.seed_in_progress_record(&[
        RefreshStage::ScaleUp,
        RefreshStage::RebuildMetadataDictionary,
        RefreshStage::RemoveIndexes,
        RefreshStage::DeleteDonorData,
    ])
    .await;
    let (_shutdown_tx, shutdown_rx) = create_shutdown_channel();

    test.runner.refresh_data(shutdown_rx).await.unwrap();

    let mut expected = vec![
        Call::DeleteAllDonors,
        Call::ImportAllDonors,
        process_hla(false),
        Call::CreateIndexes,
    ];
    expected.extend(scale_down_tail());
    assert_eq!(test.services.stage_calls().await, expected);
}

#[tokio::test(flavor = "multi_thread")]
async fn resume_at_delete_donor_data_does_not_scale_up_again() {
    init_test_tracing();
    let test = TestRefresh::new();
    let seeded = test
        .seed_in_progress_record(&[
            RefreshStage::ScaleUp,
            RefreshStage::RebuildMetadataDictionary,
            RefreshStage::RemoveIndexes,
        ])
        .await;
    let (_shutdown_tx, shutdown_rx) = create_shutdown_channel();

    test.runner.refresh_data(shutdown_rx).await.unwrap();

    let calls = test.services.stage_calls().await;
    assert_eq!(calls[0], Call::DeleteAllDonors);
    assert_eq!(
        test.services
            .count_calls(&Call::resize(DORMANT_DATABASE, REFRESH_TIER))
            .await,
        0
    );
    assert_eq!(
        test.services
            .count_calls(&Call::resize(DORMANT_DATABASE, ACTIVE_TIER))
            .await,
        1
    );
    assert_eq!(test.services.count_calls(&Call::ReplayQueuedUpdates).await, 1);

    let record = test.current_record().await;
    assert_eq!(record.id, seeded.id);
    assert!(record.last_continued_at.is_some());
    assert!(record.completed_stages.is_superset(&seeded.completed_stages));
}

#[tokio::test(flavor = "multi_thread")]
async fn data_stage_failure_scales_down_once_and_returns_original_error() {
    init_test_tracing();
    let test = TestRefresh::new();
    test.services.fail_on(FakeMethod::RemoveIndexes).await;
    let (_shutdown_tx, shutdown_rx) = create_shutdown_channel();

    let err = test.runner.refresh_data(shutdown_rx).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::StageWorkerFailed);
    assert!(err.detail().unwrap().contains("RemoveIndexes"));
    assert_eq!(
        test.services
            .count_calls(&Call::resize(DORMANT_DATABASE, DORMANT_TIER))
            .await,
        1
    );
    assert_eq!(test.services.count_calls(&Call::DeleteAllDonors).await, 0);

    let record = test.current_record().await;
    assert_eq!(record.succeeded, Some(false));
    assert!(record.finished_at.is_some());
    assert_eq!(
        record.completed_stages.iter().copied().collect::<Vec<_>>(),
        vec![
            RefreshStage::ScaleUp,
            RefreshStage::RebuildMetadataDictionary
        ]
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn scale_up_failure_is_compensated() {
    init_test_tracing();
    let test = TestRefresh::new();
    test.services.fail_resize_to(REFRESH_TIER).await;
    let (_shutdown_tx, shutdown_rx) = create_shutdown_channel();

    let err = test.runner.refresh_data(shutdown_rx).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::StageWorkerFailed);
    assert_eq!(
        test.services.stage_calls().await,
        vec![
            Call::resize(DORMANT_DATABASE, REFRESH_TIER),
            Call::resize(DORMANT_DATABASE, DORMANT_TIER),
        ]
    );
    assert!(test.current_record().await.completed_stages.is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn compensation_failure_sends_teardown_alert_and_keeps_original_error() {
    init_test_tracing();
    let test = TestRefresh::new();
    test.services.fail_on(FakeMethod::CreateIndexes).await;
    test.services.fail_resize_to(DORMANT_TIER).await;
    let (_shutdown_tx, shutdown_rx) = create_shutdown_channel();

    let err = test.runner.refresh_data(shutdown_rx).await.unwrap_err();

    assert!(err.detail().unwrap().contains("CreateIndexes"));

    let alerts = test
        .services
        .notifications_with_priority(Priority::High)
        .await;
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].summary, "Data refresh teardown failed");
    assert!(alerts[0].detail.contains(DORMANT_DATABASE));

    assert_eq!(test.current_record().await.succeeded, Some(false));
}

#[tokio::test(flavor = "multi_thread")]
async fn cancelled_refresh_is_torn_down_and_finished() {
    init_test_tracing();
    let test = TestRefresh::new();
    let (shutdown_tx, shutdown_rx) = create_shutdown_channel();
    test.services
        .shutdown_on(FakeMethod::ImportAllDonors, shutdown_tx)
        .await;

    let err = test.runner.refresh_data(shutdown_rx).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::RefreshCancelled);
    assert_eq!(test.services.count_calls(&process_hla(false)).await, 0);
    assert_eq!(
        test.services
            .count_calls(&Call::resize(DORMANT_DATABASE, DORMANT_TIER))
            .await,
        1
    );

    let cancelled = test.current_record().await;
    assert!(cancelled.finished_at.is_some());
    assert_eq!(cancelled.succeeded, Some(false));
    assert!(cancelled.has_completed(RefreshStage::ImportDonors));
    assert!(!cancelled.has_completed(RefreshStage::ProcessDonorHla));

    // The next run starts over, scaling the database up again.
    let (_shutdown_tx, shutdown_rx) = create_shutdown_channel();
    test.runner.refresh_data(shutdown_rx).await.unwrap();

    let records = test.store.records().await;
    assert_eq!(records.len(), 2);
    assert_eq!(
        test.services
            .count_calls(&Call::resize(DORMANT_DATABASE, REFRESH_TIER))
            .await,
        2
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn refresh_record_resumes_the_given_record() {
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

    let version = test
        .runner
        .refresh_record(seeded.id, shutdown_rx)
        .await
        .unwrap();

    assert_eq!(version, LATEST_VERSION);
    let mut expected = vec![process_hla(true), Call::CreateIndexes];
    expected.extend(scale_down_tail());
    assert_eq!(test.services.stage_calls().await, expected);
    assert!(test.current_record().await.last_continued_at.is_some());
}

#[tokio::test(flavor = "multi_thread")]
async fn refresh_record_rejects_a_finished_record_without_starting_another() {
    init_test_tracing();
    let test = TestRefresh::new();
    let seeded = test.seed_in_progress_record(&[RefreshStage::ScaleUp]).await;
    test.store.mark_finished(seeded.id, false).await.unwrap();
    let (_shutdown_tx, shutdown_rx) = create_shutdown_channel();

    let err = test
        .runner
        .refresh_record(seeded.id, shutdown_rx)
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::InvalidState);
    assert!(test.services.calls().await.is_empty());
    assert_eq!(test.store.records().await.len(), 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn refresh_record_rejects_an_unknown_record() {
    init_test_tracing();
    let test = TestRefresh::new();
    let (_shutdown_tx, shutdown_rx) = create_shutdown_channel();

    let err = test
        .runner
        .refresh_record(uuid::Uuid::new_v4(), shutdown_rx)
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::RecordNotFound);
    assert!(test.store.records().await.is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn finished_record_starts_a_new_refresh() {
    init_test_tracing();
    let test = TestRefresh::new();
    let (_shutdown_tx, shutdown_rx) = create_shutdown_channel();
    test.services.fail_on(FakeMethod::RebuildMetadata).await;
    test.runner.refresh_data(shutdown_rx.clone()).await.unwrap_err();
    let failed = test.current_record().await;

    test.services.clear_failures().await;
    test.runner.refresh_data(shutdown_rx).await.unwrap();

    let records = test.store.records().await;
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].id, failed.id);
    assert_eq!(records[0].succeeded, Some(false));
    assert_eq!(records[1].completed_stages.len(), RefreshStage::ALL.len());
}
