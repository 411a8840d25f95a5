use anyhow::{Context, Result};
use axum::body::Body;
use axum::extract::State;
use axum::http::{HeaderMap, HeaderValue, Method, Request, Response, StatusCode, header};
use axum::middleware::Next;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use std::sync::Arc;
use tracing::info;

use super::models::{LanguagesResponse, ServerError, TranslatePdfRequest};
use crate::pipeline::{DefaultPipeline, off_runtime};

type ServerState = Arc<DefaultPipeline>;

pub fn router(pipeline: DefaultPipeline) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/languages", get(languages))
        .route("/translate_pdf", post(translate_pdf))
        .with_state(Arc::new(pipeline))
        .layer(axum::middleware::from_fn(cors_middleware))
}

pub async fn run_server(pipeline: DefaultPipeline, addr: String) -> Result<()> {
    let app = router(pipeline);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| "failed to bind server address")?;
    info!("listening on {}", addr);
    axum::serve(listener, app).await?;
    Ok(())
}

async fn health() -> impl IntoResponse {
    (StatusCode::OK, Json(serde_json::json!({ "status": "ok" })))
}

async fn languages(State(state): State<ServerState>) -> Json<LanguagesResponse> {
    Json(LanguagesResponse {
        languages: state.languages(),
    })
}

async fn translate_pdf(
    State(state): State<ServerState>,
    Json(payload): Json<TranslatePdfRequest>,
) -> Result<Response<Body>, ServerError> {
    let document = payload.document;
    if document.from_lang.trim().is_empty() || document.to_lang.trim().is_empty() {
        return Err(ServerError::bad_request("from_lang and to_lang are required"));
    }
    let pdf = BASE64
        .decode(payload.pdf_base64.trim())
        .map_err(|err| ServerError::bad_request(format!("invalid pdf_base64: {}", err)))?;
    if pdf.is_empty() {
        return Err(ServerError::bad_request("pdf_base64 is empty"));
    }

    let bytes = off_runtime(move || async move {
        let dir = tempfile::tempdir().with_context(|| "failed to create request dir")?;
        let output = state.translate_pdf(&pdf, &document, dir.path()).await?;
        std::fs::read(&output.pdf_path)
            .with_context(|| format!("failed to read {}", output.pdf_path.display()))
    })
    .await?;

    let mut response = Response::new(Body::from(bytes));
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/pdf"),
    );
    Ok(response)
}

async fn cors_middleware(req: Request<Body>, next: Next) -> Result<Response<Body>, StatusCode> {
    if req.method() == Method::OPTIONS {
        let mut response = Response::new(Body::empty());
        *response.status_mut() = StatusCode::NO_CONTENT;
        apply_cors_headers(response.headers_mut());
        return Ok(response);
    }
    let mut response = next.run(req).await;
    apply_cors_headers(response.headers_mut());
    Ok(response)
}

fn apply_cors_headers(headers: &mut HeaderMap) {
    headers.insert("access-control-allow-origin", HeaderValue::from_static("*"));
    headers.insert(
        "access-control-allow-methods",
        HeaderValue::from_static("GET,POST,OPTIONS"),
    );
    headers.insert(
        "access-control-allow-headers",
        HeaderValue::from_static("content-type,authorization"),
    );
}
