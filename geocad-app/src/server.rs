use std::sync::Arc;

use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, post},
};
use geocad_config::AppConfig;
use geocad_jobs::{JobService, JobServiceConfig};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;

use crate::routes;

/// 处理器共享的状态。
#[derive(Clone)]
pub struct AppState {
    pub jobs: Arc<JobService>,
}

pub fn job_config(config: &AppConfig) -> JobServiceConfig {
    JobServiceConfig {
        retention: config.jobs.retention(),
        sweep_interval: config.jobs.sweep_interval(),
        poll_interval: config.server.progress_poll(),
    }
}

pub fn router(state: AppState, body_limit: usize) -> Router {
    Router::new()
        .route("/", get(routes::info))
        .route("/api/dxf/start", post(routes::start))
        .route("/api/dxf/progress/:id", get(routes::progress))
        .route("/api/dxf/download/:id", get(routes::download))
        .route("/api/dxf/jobs/:id", get(routes::status).delete(routes::cancel))
        .route("/api/dxf/convert", post(routes::convert))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// 启动 HTTP 服务，收到 Ctrl-C 后停止并关闭任务服务。
pub async fn serve(config: AppConfig) -> anyhow::Result<()> {
    let addr = config.server.socket_addr()?;
    let jobs = JobService::start(job_config(&config));
    let app = router(
        AppState { jobs: jobs.clone() },
        config.server.body_limit_bytes(),
    );

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "HTTP 服务已启动");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    jobs.shutdown();
    info!("HTTP 服务已停止");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %err, "无法监听退出信号");
        std::future::pending::<()>().await;
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use axum::body::{Body, to_bytes};
    use axum::http::{Request, StatusCode};
    use serde_json::Value;
    use tower::ServiceExt;

    use super::*;

    fn app() -> Router {
        let config = JobServiceConfig {
            poll_interval: Duration::from_millis(5),
            ..JobServiceConfig::default()
        };
        router(
            AppState {
                jobs: Arc::new(JobService::new(config)),
            },
            1024 * 1024,
        )
    }

    const TREE_REQUEST: &str = r#"{
        "elements": [
            {"type": "way", "id": 2, "tags": {"building": "yes", "height": "6"},
             "geometry": [
                {"lat": 0.0, "lon": 0.0}, {"lat": 0.0, "lon": 0.0001},
                {"lat": 0.0001, "lon": 0.0001}, {"lat": 0.0001, "lon": 0.0},
                {"lat": 0.0, "lon": 0.0}
             ]}
        ],
        "center": {"lat": 0.0, "lng": 0.0}
    }"#;

    fn post_json(uri: &str, body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .expect("构造请求")
    }

    async fn body_text(response: axum::response::Response) -> String {
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("读取响应体");
        String::from_utf8(bytes.to_vec()).expect("UTF-8")
    }

    #[tokio::test]
    async fn synchronous_convert_returns_a_dxf_attachment() {
        let response = app()
            .oneshot(post_json("/api/dxf/convert", TREE_REQUEST))
            .await
            .expect("请求完成");
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()["content-type"],
            "application/dxf"
        );
        assert_eq!(response.headers()["x-geocad-skipped"], "0");
        let text = body_text(response).await;
        assert!(text.contains("BLD_GENERIC"));
        assert!(text.trim_end().ends_with("EOF"));
    }

    #[tokio::test]
    async fn invalid_options_are_a_bad_request() {
        let body = r#"{"elements": [], "center": {"lat": 0, "lng": 0},
                       "options": {"projection": "mercator"}}"#;
        let response = app()
            .oneshot(post_json("/api/dxf/convert", body))
            .await
            .expect("请求完成");
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let json: Value = serde_json::from_str(&body_text(response).await).expect("JSON 错误体");
        assert_eq!(json["code"], "INVALID_CONFIG");
    }

    #[tokio::test]
    async fn empty_submission_is_rejected() {
        let body = r#"{"elements": [], "center": {"lat": 0, "lng": 0}}"#;
        let response = app()
            .oneshot(post_json("/api/dxf/start", body))
            .await
            .expect("请求完成");
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let json: Value = serde_json::from_str(&body_text(response).await).expect("JSON 错误体");
        assert_eq!(json["code"], "EMPTY_FEATURE_SET");
    }

    #[tokio::test]
    async fn job_flow_start_stream_download() {
        let app = app();
        let response = app
            .clone()
            .oneshot(post_json("/api/dxf/start", TREE_REQUEST))
            .await
            .expect("请求完成");
        assert_eq!(response.status(), StatusCode::OK);
        let json: Value = serde_json::from_str(&body_text(response).await).expect("JSON");
        let job_id = json["jobId"].as_str().expect("任务编号").to_string();

        let progress = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri(format!("/api/dxf/progress/{job_id}"))
                    .body(Body::empty())
                    .expect("构造请求"),
            )
            .await
            .expect("请求完成");
        assert_eq!(progress.status(), StatusCode::OK);
        let stream = tokio::time::timeout(Duration::from_secs(10), body_text(progress))
            .await
            .expect("进度流应结束");
        assert!(stream.contains(r#""status":"completed""#));

        let download = app
            .oneshot(
                Request::builder()
                    .uri(format!("/api/dxf/download/{job_id}"))
                    .body(Body::empty())
                    .expect("构造请求"),
            )
            .await
            .expect("请求完成");
        assert_eq!(download.status(), StatusCode::OK);
        assert!(body_text(download).await.contains("SECTION"));
    }

    #[tokio::test]
    async fn unknown_job_download_is_not_found() {
        let response = app()
            .oneshot(
                Request::builder()
                    .uri(format!("/api/dxf/download/{}", uuid::Uuid::new_v4()))
                    .body(Body::empty())
                    .expect("构造请求"),
            )
            .await
            .expect("请求完成");
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
