use std::collections::BTreeMap;
use std::time::Duration;

use geocad_core::geo::{GeoFeature, GeoLocation};
use geocad_engine::ConversionRequest;
use geocad_engine::errors::ConversionError;
use geocad_jobs::errors::StoreError;
use geocad_jobs::{JobService, JobServiceConfig, JobStatus, ProgressEvent};
use tokio_stream::StreamExt;

fn fast_config() -> JobServiceConfig {
    JobServiceConfig {
        retention: Duration::from_secs(60),
        sweep_interval: Duration::from_secs(60),
        poll_interval: Duration::from_millis(5),
    }
}

fn building_request() -> ConversionRequest {
    let degrees = |meters: f64| meters * 180.0 / (std::f64::consts::PI * 6_378_137.0);
    let corner = |x: f64, y: f64| GeoLocation::new(degrees(y), degrees(x));
    let mut tags = BTreeMap::new();
    tags.insert("building".to_string(), "yes".to_string());
    ConversionRequest::new(
        vec![GeoFeature::Area {
            id: "way/1".into(),
            ring: vec![
                corner(0.0, 0.0),
                corner(10.0, 0.0),
                corner(10.0, 10.0),
                corner(0.0, 10.0),
                corner(0.0, 0.0),
            ],
            tags,
        }],
        GeoLocation::new(0.0, 0.0),
    )
}

async fn wait_terminal(service: &JobService, id: geocad_jobs::JobId) -> Vec<ProgressEvent> {
    let events: Vec<ProgressEvent> = tokio::time::timeout(
        Duration::from_secs(10),
        service.watch(id).collect::<Vec<_>>(),
    )
    .await
    .expect("进度流应在超时前结束");
    events
}

#[tokio::test]
async fn submitted_job_completes_and_exposes_the_document() {
    let service = JobService::start(fast_config());
    let id = service.submit(building_request()).expect("提交成功");

    let events = wait_terminal(&service, id).await;
    let last = events.last().expect("至少一个事件");
    assert_eq!(last.status, JobStatus::Completed);
    assert_eq!(last.progress, 100);
    assert!(
        events.windows(2).all(|pair| pair[0].progress <= pair[1].progress),
        "进度不应倒退"
    );

    let bytes = service.result(id).expect("已完成任务可下载");
    let text = String::from_utf8(bytes.to_vec()).expect("UTF-8");
    assert!(text.starts_with("  0\nSECTION"));
    assert!(text.trim_end().ends_with("EOF"));
    service.shutdown();
}

#[tokio::test]
async fn empty_and_invalid_submissions_are_rejected_synchronously() {
    let service = JobService::new(fast_config());
    let empty = ConversionRequest::new(Vec::new(), GeoLocation::new(0.0, 0.0));
    assert!(matches!(
        service.submit(empty),
        Err(ConversionError::EmptyFeatureSet)
    ));

    let mut invalid = building_request();
    invalid.options.contour_interval = Some(0.0);
    assert!(matches!(
        service.submit(invalid),
        Err(ConversionError::InvalidConfig(_))
    ));
    assert!(service.store().is_empty(), "被拒绝的请求不应创建任务");
}

#[tokio::test]
async fn cancelled_job_fails_with_a_message() {
    let service = JobService::new(fast_config());
    let id = service.submit(building_request()).expect("提交成功");
    // 单线程运行时下后台任务尚未开始执行。
    service.cancel(id).expect("任务存在");

    let events = wait_terminal(&service, id).await;
    let last = events.last().expect("至少一个事件");
    assert_eq!(last.status, JobStatus::Failed);
    assert_eq!(last.error.as_deref(), Some("转换已取消"));
    assert!(matches!(service.result(id), Err(StoreError::Failed { .. })));
}

#[tokio::test]
async fn unknown_job_stream_yields_a_single_expired_event() {
    let service = JobService::new(fast_config());
    let events = wait_terminal(&service, uuid::Uuid::new_v4()).await;
    assert_eq!(events, vec![ProgressEvent::expired()]);
}

#[tokio::test]
async fn swept_job_becomes_not_found() {
    let config = JobServiceConfig {
        retention: Duration::ZERO,
        ..fast_config()
    };
    let service = JobService::new(config);
    let id = service.submit(building_request()).expect("提交成功");
    tokio::time::sleep(Duration::from_millis(5)).await;
    service.sweep();
    assert!(service.get(id).is_none());
    assert_eq!(service.result(id), Err(StoreError::NotFound(id)));
}
