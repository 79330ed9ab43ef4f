// Job protocol end to end, against the in-memory container runtime
//
// Every test checks the same thing last: no environment outlives its job.

use futures::future::join_all;
use qrgen_core::application::{
    cancel_channel, AdmissionControl, CancelToken, LifecycleManager, RenderConfig, RenderService,
};
use qrgen_core::domain::{JobError, JobState, RawJobRequest, PNG_MAGIC};
use qrgen_core::port::container_runtime::mocks::{
    rendered_bytes, MockBehavior, MockContainerRuntime,
};
use qrgen_core::port::providers::mocks::{SequentialIds, SteppingClock};
use qrgen_core::port::ResourceLimits;
use qrgen_core::AppError;
use std::sync::Arc;
use std::time::Duration;

const IMAGE: &str = "qrcode-worker:latest";

struct Harness {
    runtime: Arc<MockContainerRuntime>,
    service: Arc<RenderService>,
}

fn harness_with(
    behavior: MockBehavior,
    slots: usize,
    config: RenderConfig,
    cancel: CancelToken,
) -> Harness {
    let runtime = Arc::new(MockContainerRuntime::new(behavior));
    let lifecycle = Arc::new(LifecycleManager::new(
        runtime.clone(),
        IMAGE,
        ResourceLimits::default(),
    ));
    let service = Arc::new(RenderService::new(
        lifecycle,
        Arc::new(AdmissionControl::new(slots, Duration::from_millis(50))),
        Arc::new(SequentialIds::default()),
        Arc::new(SteppingClock::new(1_700_000_000_000, 3)),
        config,
        cancel,
    ));
    Harness { runtime, service }
}

fn harness(behavior: MockBehavior) -> Harness {
    harness_with(behavior, 4, RenderConfig::default(), CancelToken::never())
}

async fn wait_until(mut done: impl FnMut() -> bool) {
    for _ in 0..200 {
        if done() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition not reached within 1s");
}

#[tokio::test]
async fn scenario_a_default_request_renders_png() {
    let h = harness(MockBehavior::Render);

    let report = h
        .service
        .render(RawJobRequest::new("https://example.com"))
        .await
        .unwrap();

    let artifact = report.outcome.unwrap();
    assert!(!artifact.is_empty());
    assert!(artifact.bytes().starts_with(&PNG_MAGIC));
    assert_eq!(artifact.bytes(), rendered_bytes("https://example.com"));
    assert_eq!(report.final_state, JobState::Cleaned);
    assert_eq!(h.runtime.live_count(), 0);

    // Defaults reached the worker
    let env = h.runtime.last_spec().unwrap().env;
    assert_eq!(env["QR_BOX_SIZE"], "10");
    assert_eq!(env["QR_BORDER"], "4");
    assert_eq!(env["QR_ERROR_CORRECTION"], "M");
    assert_eq!(env["QR_FILL_COLOR"], "black");
    assert_eq!(env["QR_BACK_COLOR"], "white");
}

#[tokio::test]
async fn scenario_b_zero_box_size_rejected_before_launch() {
    let h = harness(MockBehavior::Render);
    let mut raw = RawJobRequest::new("https://example.com");
    raw.box_size = Some(0);

    let err = h.service.render(raw).await.unwrap_err();

    assert!(matches!(err, AppError::Validation(ref v) if v.field == "box_size"));
    assert_eq!(h.runtime.launched_count(), 0);
}

#[tokio::test]
async fn invalid_options_never_create_an_environment() {
    let h = harness(MockBehavior::Render);

    let mut cases = Vec::new();
    for (box_size, border, level) in [
        (Some(51), None, None),
        (Some(-3), None, None),
        (None, Some(21), None),
        (None, Some(-1), None),
        (None, None, Some("X")),
        (None, None, Some("")),
    ] {
        let mut raw = RawJobRequest::new("payload");
        raw.box_size = box_size;
        raw.border = border;
        raw.error_correction = level.map(str::to_string);
        cases.push(raw);
    }
    let mut blank = RawJobRequest::new("   ");
    blank.box_size = Some(5);
    cases.push(blank);

    for raw in cases {
        let res = h.service.render(raw.clone()).await;
        assert!(
            matches!(res, Err(AppError::Validation(_))),
            "accepted {:?}",
            raw
        );
    }
    assert_eq!(h.runtime.launched_count(), 0);
}

#[tokio::test]
async fn scenario_c_missing_image_names_it() {
    let h = harness(MockBehavior::ImageMissing);

    let report = h.service.render(RawJobRequest::new("x")).await.unwrap();

    let err = report.outcome.unwrap_err();
    assert_eq!(
        err,
        JobError::ImageNotFound {
            image: IMAGE.to_string()
        }
    );
    assert!(err.to_string().contains(IMAGE));
    assert_eq!(report.final_state, JobState::Cleaned);
    assert_eq!(h.runtime.live_count(), 0);
}

#[tokio::test]
async fn scenario_d_non_zero_exit_removes_environment() {
    let h = harness(MockBehavior::Exit(1));

    let report = h.service.render(RawJobRequest::new("x")).await.unwrap();

    assert_eq!(
        report.outcome.unwrap_err(),
        JobError::WorkerNonZeroExit { code: 1 }
    );
    assert_eq!(h.runtime.launched_count(), 1);
    assert_eq!(h.runtime.remove_calls(), 1);
    assert_eq!(h.runtime.live_count(), 0);
}

#[tokio::test]
async fn scenario_e_missing_artifact_removes_environment() {
    for behavior in [MockBehavior::NoArtifact, MockBehavior::WrongEntry] {
        let h = harness(behavior);

        let report = h.service.render(RawJobRequest::new("x")).await.unwrap();

        assert_eq!(
            report.outcome.unwrap_err(),
            JobError::ArtifactMissing {
                path: "/app/qrcode.png".to_string()
            }
        );
        assert_eq!(h.runtime.live_count(), 0);
    }
}

#[tokio::test]
async fn transport_failures_remove_environment() {
    for behavior in [
        MockBehavior::TruncatedArchive,
        MockBehavior::StreamError("connection reset by peer".to_string()),
    ] {
        let h = harness(behavior);

        let report = h.service.render(RawJobRequest::new("x")).await.unwrap();

        assert_eq!(report.outcome.unwrap_err().kind(), "transport_error");
        assert_eq!(h.runtime.live_count(), 0);
    }
}

#[tokio::test]
async fn timeout_removes_hung_worker() {
    let config = RenderConfig {
        job_timeout: Some(Duration::from_millis(30)),
        ..Default::default()
    };
    let h = harness_with(MockBehavior::Hang, 1, config, CancelToken::never());

    let report = h.service.render(RawJobRequest::new("x")).await.unwrap();

    assert_eq!(
        report.outcome.unwrap_err(),
        JobError::Timeout { after_ms: 30 }
    );
    assert_eq!(h.runtime.live_count(), 0);
}

#[tokio::test]
async fn removal_failure_keeps_primary_outcome() {
    let h = harness(MockBehavior::Render);
    h.runtime.set_remove_fails(true);

    let report = h.service.render(RawJobRequest::new("keep me")).await.unwrap();

    assert!(report.is_success());
    assert_eq!(
        report.outcome.as_ref().unwrap().bytes(),
        rendered_bytes("keep me")
    );
    let failure = report.cleanup_failure.unwrap();
    assert!(failure.detail.contains("removal refused"));
    assert_eq!(report.final_state, JobState::Cleaned);
    assert_eq!(h.runtime.remove_calls(), 1);
}

#[tokio::test]
async fn removal_failure_keeps_failure_outcome() {
    let h = harness(MockBehavior::Exit(1));
    h.runtime.set_remove_fails(true);

    let report = h.service.render(RawJobRequest::new("x")).await.unwrap();

    assert_eq!(
        report.outcome.unwrap_err(),
        JobError::WorkerNonZeroExit { code: 1 }
    );
    let failure = report.cleanup_failure.unwrap();
    assert!(failure.detail.contains("removal refused"));
    assert_eq!(report.final_state, JobState::Cleaned);
    assert_eq!(h.runtime.remove_calls(), 1);
}

#[tokio::test]
async fn saturated_admission_throttles_without_launching() {
    let config = RenderConfig {
        job_timeout: None,
        ..Default::default()
    };
    let (tx, token) = cancel_channel();
    let h = harness_with(MockBehavior::Hang, 1, config, token);

    let first = {
        let service = h.service.clone();
        tokio::spawn(async move { service.render(RawJobRequest::new("slow")).await })
    };
    let runtime = h.runtime.clone();
    wait_until(|| runtime.live_count() == 1).await;

    let err = h
        .service
        .render(RawJobRequest::new("second"))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Throttled(_)));
    assert_eq!(h.runtime.launched_count(), 1);

    tx.cancel();
    let report = first.await.unwrap().unwrap();
    assert_eq!(report.outcome.unwrap_err(), JobError::Cancelled);
    assert_eq!(h.runtime.live_count(), 0);
}

#[tokio::test]
async fn dropped_job_still_removes_environment() {
    let config = RenderConfig {
        job_timeout: None,
        ..Default::default()
    };
    let h = harness_with(MockBehavior::Hang, 1, config, CancelToken::never());

    let job = {
        let service = h.service.clone();
        tokio::spawn(async move { service.render(RawJobRequest::new("abandoned")).await })
    };
    let runtime = h.runtime.clone();
    wait_until(|| runtime.live_count() == 1).await;
    tokio::time::sleep(Duration::from_millis(20)).await;

    job.abort();
    assert!(job.await.unwrap_err().is_cancelled());

    let runtime = h.runtime.clone();
    wait_until(|| runtime.live_count() == 0).await;
    assert_eq!(h.runtime.remove_calls(), 1);

    // The slot comes back once removal is done
    let mut freed = false;
    for _ in 0..200 {
        if h.service.health().await.available_slots == 1 {
            freed = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert!(freed, "slot not returned");
}

#[tokio::test]
async fn concurrent_jobs_are_isolated() {
    let h = harness_with(
        MockBehavior::Render,
        8,
        RenderConfig::default(),
        CancelToken::never(),
    );

    let targets: Vec<String> = (0..16).map(|i| format!("https://example.com/{}", i)).collect();
    let reports = join_all(targets.iter().map(|t| {
        let service = h.service.clone();
        let target = t.clone();
        async move { service.render(RawJobRequest::new(target)).await }
    }))
    .await;

    let mut ids = std::collections::HashSet::new();
    for (target, report) in targets.iter().zip(reports) {
        let report = report.unwrap();
        assert!(ids.insert(report.job_id.clone()), "duplicate job id");
        assert_eq!(report.outcome.unwrap().bytes(), rendered_bytes(target));
    }
    assert_eq!(h.runtime.launched_count(), 16);
    assert_eq!(h.runtime.live_count(), 0);
}

#[tokio::test]
async fn net_zero_environments_across_mixed_outcomes() {
    let h = harness(MockBehavior::Render);

    for behavior in [
        MockBehavior::Render,
        MockBehavior::Exit(137),
        MockBehavior::NoArtifact,
        MockBehavior::WrongEntry,
        MockBehavior::TruncatedArchive,
        MockBehavior::PanicOnRetrieve,
        MockBehavior::Render,
    ] {
        h.runtime.set_behavior(behavior);
        let report = h.service.render(RawJobRequest::new("x")).await.unwrap();
        assert_eq!(report.final_state, JobState::Cleaned);
        assert_eq!(h.runtime.live_count(), 0);
    }
    assert_eq!(h.runtime.launched_count(), h.runtime.remove_calls());
}
