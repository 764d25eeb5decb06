use refresh::concurrency::shutdown::create_shutdown_channel;
use refresh::error::ErrorKind;
use refresh::failpoints::{
    COMPENSATE__BEFORE_RESIZE, RUN_STAGE__BEFORE_RECORD, RUN_STAGE__BEFORE_WORKER,
};
use refresh::notification::Priority;
use refresh::stage::RefreshStage;
use refresh::test_utils::failpoints::CustomFailScenario;
use refresh::test_utils::fakes::{Call, FakeMethod};
use refresh::test_utils::refresh::{DORMANT_DATABASE, DORMANT_TIER, REFRESH_TIER, TestRefresh};
use telemetry::tracing::init_test_tracing;

#[tokio::test(flavor = "multi_thread")]
async fn failure_before_second_stage_keeps_first_stage_recorded() {
    let _scenario = CustomFailScenario::setup(&[(RUN_STAGE__BEFORE_WORKER, "1*off->return")]);
    init_test_tracing();
    let test = TestRefresh::new();
    let (_shutdown_tx, shutdown_rx) = create_shutdown_channel();

    let err = test.runner.refresh_data(shutdown_rx).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::FailpointTriggered);
    assert_eq!(
        test.services.stage_calls().await,
        vec![
            Call::resize(DORMANT_DATABASE, REFRESH_TIER),
            Call::resize(DORMANT_DATABASE, DORMANT_TIER),
        ]
    );

    let record = test.current_record().await;
    assert_eq!(
        record.completed_stages.iter().copied().collect::<Vec<_>>(),
        vec![RefreshStage::ScaleUp]
    );
    assert_eq!(record.succeeded, Some(false));
}

#[tokio::test(flavor = "multi_thread")]
async fn stage_is_not_recorded_when_failing_after_its_worker() {
    let _scenario = CustomFailScenario::setup(&[(RUN_STAGE__BEFORE_RECORD, "return")]);
    init_test_tracing();
    let test = TestRefresh::new();
    let (_shutdown_tx, shutdown_rx) = create_shutdown_channel();

    let err = test.runner.refresh_data(shutdown_rx).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::FailpointTriggered);
    assert_eq!(
        test.services
            .count_calls(&Call::resize(DORMANT_DATABASE, REFRESH_TIER))
            .await,
        1
    );

    let record = test.current_record().await;
    assert!(record.completed_stages.is_empty());
    assert!(!record.is_in_progress());
}

#[tokio::test(flavor = "multi_thread")]
async fn failed_compensation_is_alerted_and_original_error_returned() {
    let _scenario = CustomFailScenario::setup(&[(COMPENSATE__BEFORE_RESIZE, "return")]);
    init_test_tracing();
    let test = TestRefresh::new();
    test.services.fail_on(FakeMethod::RemoveIndexes).await;
    let (_shutdown_tx, shutdown_rx) = create_shutdown_channel();

    let err = test.runner.refresh_data(shutdown_rx).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::StageWorkerFailed);
    assert_eq!(
        test.services
            .count_calls(&Call::resize(DORMANT_DATABASE, DORMANT_TIER))
            .await,
        0
    );

    let alerts = test.services.notifications_with_priority(Priority::High).await;
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].summary, "Data refresh teardown failed");
    assert_eq!(test.current_record().await.succeeded, Some(false));
}
