//
// web.rs
// Dicom-Ingest-rs
//
// Axum-based HTTP server exposing batch upload, series listing, stack ids, blob access, and session reset APIs.
//
// Thales Matheus Mendonça Santos - October 2026

use std::fmt::Display;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{multipart::MultipartError, DefaultBodyLimit, Multipart, Path, State},
    http::{header, HeaderValue, StatusCode},
    response::IntoResponse,
    routing::{delete, get, post},
    Json, Router,
};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tower_http::cors::CorsLayer;
use tracing::info;

use crate::config::IngestConfig;
use crate::models::{SeriesRecord, SessionStatistics};
use crate::session::{IngestSummary, Session};
use crate::source::RawFile;

#[derive(Clone)]
pub struct AppState {
    session: Arc<Mutex<Session>>,
    upload_limit: usize,
}

impl AppState {
    pub fn new(config: IngestConfig) -> Self {
        Self {
            upload_limit: config.upload_limit,
            session: Arc::new(Mutex::new(Session::new(config))),
        }
    }
}

type ApiResult<T> = Result<T, (StatusCode, String)>;

/// Routes of the ingestion API over one shared session.
pub fn router(state: AppState) -> Router {
    let upload_limit = state.upload_limit;
    Router::new()
        .route("/api/ingest", post(ingest_handler))
        .route("/api/series", get(series_handler))
        .route("/api/series/:series_id/images", get(series_images_handler))
        .route("/api/statistics", get(statistics_handler))
        .route("/api/blob/:handle", get(blob_handler))
        .route("/api/session", delete(clear_handler))
        .with_state(state)
        .layer(DefaultBodyLimit::max(upload_limit))
        .layer(CorsLayer::permissive())
}

/// Bootstraps the Axum HTTP server and wires up API routes.
pub async fn start_server(host: &str, port: u16, config: IngestConfig) -> anyhow::Result<()> {
    let app = router(AppState::new(config));

    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    info!("Server running at http://{}", addr);

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

async fn ingest_handler(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> ApiResult<Json<IngestSummary>> {
    let mut files = Vec::new();

    // Every part named "file" is one member of the batch, in upload order.
    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        if field.name() != Some("file") {
            continue;
        }
        let name = field
            .file_name()
            .map(|s| s.to_string())
            .unwrap_or_else(|| format!("upload-{}", files.len() + 1));
        let content_type = field.content_type().map(|s| s.to_string());
        let data = field.bytes().await.map_err(multipart_error)?;
        files.push(RawFile::from_bytes(name, content_type, data.to_vec()));
    }

    if files.is_empty() {
        return Err(bad_request("No file uploaded"));
    }

    let mut session = state.session.lock().await;
    let summary = session.ingest(&files).await;
    info!(
        "Ingested {} upload(s): {} image(s) added, {} skipped, {} failed",
        files.len(),
        summary.images_added,
        summary.skipped,
        summary.failed
    );
    Ok(Json(summary))
}

async fn series_handler(State(state): State<AppState>) -> Json<Vec<SeriesRecord>> {
    let session = state.session.lock().await;
    Json(session.series_with_thumbnails().await)
}

async fn series_images_handler(
    State(state): State<AppState>,
    Path(series_id): Path<String>,
) -> ApiResult<Json<Value>> {
    let session = state.session.lock().await;
    let image_ids = session
        .image_ids(&series_id)
        .ok_or_else(|| not_found(format!("Unknown series {}", series_id)))?;
    Ok(Json(json!({
        "series_id": series_id,
        "image_ids": image_ids
    })))
}

async fn statistics_handler(State(state): State<AppState>) -> Json<SessionStatistics> {
    let session = state.session.lock().await;
    Json(session.statistics())
}

async fn blob_handler(
    State(state): State<AppState>,
    Path(handle): Path<String>,
) -> ApiResult<impl IntoResponse> {
    // Clone the handle out so the session is not locked during the read.
    let file = {
        let session = state.session.lock().await;
        session
            .resolve_blob(&handle)
            .cloned()
            .ok_or_else(|| not_found(format!("Unknown or revoked handle {}", handle)))?
    };
    let bytes = file.read_all().await.map_err(internal_error)?;
    let disposition = HeaderValue::from_str(&format!("inline; filename=\"{}\"", file.name()))
        .map_err(internal_error)?;
    Ok((
        [
            (
                header::CONTENT_TYPE,
                HeaderValue::from_static(crate::source::DICOM_MEDIA_TYPE),
            ),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        bytes,
    ))
}

async fn clear_handler(State(state): State<AppState>) -> Json<Value> {
    let mut session = state.session.lock().await;
    let revoked = session.clear();
    Json(json!({ "success": true, "revoked_handles": revoked }))
}

// Keeps the status axum picked, so an oversized body stays a 413.
fn multipart_error(err: MultipartError) -> (StatusCode, String) {
    (err.status(), err.body_text())
}

fn bad_request<E: Display>(err: E) -> (StatusCode, String) {
    (StatusCode::BAD_REQUEST, err.to_string())
}

fn internal_error<E: Display>(err: E) -> (StatusCode, String) {
    (StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
}

fn not_found<E: Display>(err: E) -> (StatusCode, String) {
    (StatusCode::NOT_FOUND, err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use tower::ServiceExt;

    use crate::config::ValidationPolicy;

    const BOUNDARY: &str = "ingest-boundary";

    fn multipart_body(parts: &[(&str, &str, &[u8])]) -> Vec<u8> {
        let mut body = Vec::new();
        for (name, content_type, data) in parts {
            body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
            body.extend_from_slice(
                format!(
                    "Content-Disposition: form-data; name=\"file\"; filename=\"{name}\"\r\n\
                     Content-Type: {content_type}\r\n\r\n"
                )
                .as_bytes(),
            );
            body.extend_from_slice(data);
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
        body
    }

    fn ingest_request(body: Vec<u8>) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/api/ingest")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(body))
            .expect("request")
    }

    async fn json_body(response: axum::response::Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body");
        serde_json::from_slice(&bytes).expect("json")
    }

    fn lenient_state() -> AppState {
        AppState::new(IngestConfig {
            policy: ValidationPolicy::Lenient,
            ..IngestConfig::default()
        })
    }

    #[tokio::test]
    async fn empty_session_has_no_series() {
        let app = router(lenient_state());
        let response = app
            .oneshot(Request::get("/api/statistics").body(Body::empty()).expect("request"))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        let value = json_body(response).await;
        assert_eq!(value["series_count"], 0);
        assert_eq!(value["total_images"], 0);
    }

    #[tokio::test]
    async fn upload_then_list_then_clear() {
        let state = lenient_state();
        let body = multipart_body(&[
            ("IM0001", "application/octet-stream", &[0xAB; 48]),
            ("notes.txt", "text/plain", b"not an image"),
        ]);

        let response = router(state.clone())
            .oneshot(ingest_request(body))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        let summary = json_body(response).await;
        assert_eq!(summary["images_added"], 1);
        assert_eq!(summary["skipped"], 1);

        let response = router(state.clone())
            .oneshot(Request::get("/api/series").body(Body::empty()).expect("request"))
            .await
            .expect("response");
        let series = json_body(response).await;
        let first = &series[0];
        assert_eq!(first["image_count"], 1);
        assert!(first["thumbnail"]
            .as_str()
            .expect("thumbnail")
            .starts_with("data:image/svg+xml;base64,"));

        let image_id = first["representative_image_id"].as_str().expect("id");
        let handle = image_id.trim_start_matches("dicomfile:").to_string();
        let blob_uri = format!("/api/blob/{handle}");

        let response = router(state.clone())
            .oneshot(Request::get(blob_uri.as_str()).body(Body::empty()).expect("request"))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            crate::source::DICOM_MEDIA_TYPE
        );

        let response = router(state.clone())
            .oneshot(
                Request::delete("/api/session")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");
        assert_eq!(json_body(response).await["revoked_handles"], 1);

        let response = router(state)
            .oneshot(Request::get(blob_uri.as_str()).body(Body::empty()).expect("request"))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn upload_without_files_is_rejected() {
        let body = format!("--{BOUNDARY}--\r\n").into_bytes();
        let response = router(lenient_state())
            .oneshot(ingest_request(body))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn oversized_upload_is_refused() {
        let state = AppState::new(IngestConfig {
            header_window: 1024,
            upload_limit: 2048,
            ..IngestConfig::default()
        });
        let body = multipart_body(&[("IM0001", "application/octet-stream", &[0xAB; 8192])]);
        let response = router(state.clone())
            .oneshot(ingest_request(body))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);

        let response = router(state)
            .oneshot(Request::get("/api/statistics").body(Body::empty()).expect("request"))
            .await
            .expect("response");
        assert_eq!(json_body(response).await["total_images"], 0);
    }

    #[tokio::test]
    async fn unknown_series_is_not_found() {
        let response = router(lenient_state())
            .oneshot(
                Request::get("/api/series/nope/images")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
