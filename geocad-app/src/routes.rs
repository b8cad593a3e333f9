//! `/api/dxf` 接口。

use std::convert::Infallible;

use axum::{
    Json,
    extract::{Path, State},
    http::header,
    response::{
        IntoResponse, Response,
        sse::{Event, KeepAlive, Sse},
    },
};
use futures::{Stream, StreamExt};
use geocad_engine::convert as convert_request;
use geocad_jobs::{JobId, JobSnapshot};
use serde::Serialize;
use serde_json::{Value, json};

use crate::error::ApiError;
use crate::request::DxfRequest;
use crate::server::AppState;

const DXF_CONTENT_TYPE: &str = "application/dxf";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StartResponse {
    pub job_id: JobId,
}

/// GET / - 服务信息。
pub async fn info() -> Json<Value> {
    Json(json!({
        "name": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": [
            "POST /api/dxf/start",
            "GET /api/dxf/progress/:id",
            "GET /api/dxf/download/:id",
            "GET /api/dxf/jobs/:id",
            "DELETE /api/dxf/jobs/:id",
            "POST /api/dxf/convert",
        ],
    }))
}

/// POST /api/dxf/start - 提交异步转换。
pub async fn start(
    State(state): State<AppState>,
    Json(body): Json<DxfRequest>,
) -> Result<Json<StartResponse>, ApiError> {
    let request = body.into_conversion()?;
    let job_id = state.jobs.submit(request)?;
    Ok(Json(StartResponse { job_id }))
}

/// GET /api/dxf/progress/:id - SSE 进度流，到达终态后结束。
pub async fn progress(
    State(state): State<AppState>,
    Path(id): Path<JobId>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let stream = state.jobs.watch(id).map(|event| {
        let event = Event::default()
            .json_data(&event)
            .unwrap_or_else(|err| Event::default().event("error").data(err.to_string()));
        Ok(event)
    });
    Sse::new(stream).keep_alive(KeepAlive::default())
}

/// GET /api/dxf/jobs/:id - 任务快照。
pub async fn status(
    State(state): State<AppState>,
    Path(id): Path<JobId>,
) -> Result<Json<JobSnapshot>, ApiError> {
    let snapshot = state
        .jobs
        .get(id)
        .ok_or(geocad_jobs::errors::StoreError::NotFound(id))?;
    Ok(Json(snapshot))
}

/// GET /api/dxf/download/:id - 下载已完成任务的 DXF。
pub async fn download(
    State(state): State<AppState>,
    Path(id): Path<JobId>,
) -> Result<Response, ApiError> {
    let bytes = state.jobs.result(id)?;
    Ok(dxf_response(bytes.as_ref().clone(), &format!("geocad-{id}.dxf")))
}

/// DELETE /api/dxf/jobs/:id - 请求取消。
pub async fn cancel(
    State(state): State<AppState>,
    Path(id): Path<JobId>,
) -> Result<Json<JobSnapshot>, ApiError> {
    Ok(Json(state.jobs.cancel(id)?))
}

/// POST /api/dxf/convert - 同步转换，直接返回 DXF。
pub async fn convert(Json(body): Json<DxfRequest>) -> Result<Response, ApiError> {
    let request = body.into_conversion()?;
    let output = tokio::task::spawn_blocking(move || convert_request(&request)).await??;
    let skipped = output.report.skipped.len();
    let mut response = dxf_response(output.bytes, "geocad.dxf");
    response
        .headers_mut()
        .insert("x-geocad-skipped", header::HeaderValue::from(skipped));
    Ok(response)
}

fn dxf_response(bytes: Vec<u8>, filename: &str) -> Response {
    (
        [
            (header::CONTENT_TYPE, DXF_CONTENT_TYPE.to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{filename}\""),
            ),
        ],
        bytes,
    )
        .into_response()
}
