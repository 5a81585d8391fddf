use anyhow::{Context, Result};
use axum::body::Body;
use axum::extract::State;
use axum::http::{HeaderMap, HeaderValue, Method, Request, Response, StatusCode};
use axum::middleware::Next;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use std::sync::Arc;
use tracing::{info, warn};

use super::models::{
    AnalyzeRequest, AnalyzeResponse, ErrorResponse, LayoutRequest, LayoutResponse,
};
use super::state::ServerState;
use crate::data;
use crate::overlay::{Viewport, compose};
use crate::pipeline::{AnalyzeError, DetectionPipeline};
use crate::providers::{self, Provider};
use crate::settings;

type HandlerError = (StatusCode, Json<ErrorResponse>);

fn error(status: StatusCode, message: impl Into<String>) -> HandlerError {
    (
        status,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
}

pub async fn run_server(
    settings: settings::Settings,
    key: Option<String>,
    addr: String,
) -> Result<()> {
    let state = Arc::new(ServerState { settings, key });
    let app = router(state);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| "failed to bind server address")?;
    info!("listening on {}", addr);
    axum::serve(listener, app).await?;
    Ok(())
}

fn router(state: Arc<ServerState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/analyze", post(analyze))
        .route("/layout", post(layout))
        .with_state(state)
        .layer(axum::middleware::from_fn(cors_middleware))
}

async fn health() -> impl IntoResponse {
    (StatusCode::OK, Json(serde_json::json!({ "status": "ok" })))
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

async fn analyze(
    State(state): State<Arc<ServerState>>,
    Json(payload): Json<AnalyzeRequest>,
) -> Result<Json<AnalyzeResponse>, HandlerError> {
    let key = providers::resolve_key(payload.key.as_deref().or(state.key.as_deref()))
        .map_err(|err| error(StatusCode::BAD_REQUEST, err.to_string()))?;
    let model = payload
        .model
        .clone()
        .unwrap_or_else(|| state.settings.model.clone());
    let pipeline = DetectionPipeline::new(providers::build_provider(key, Some(&model)));
    analyze_request(&pipeline, &state.settings, payload)
        .await
        .map(Json)
}

pub(crate) async fn analyze_request<P: Provider>(
    pipeline: &DetectionPipeline<P>,
    settings: &settings::Settings,
    payload: AnalyzeRequest,
) -> Result<AnalyzeResponse, HandlerError> {
    let bytes = BASE64
        .decode(payload.image_base64.trim())
        .map_err(|err| error(StatusCode::BAD_REQUEST, format!("invalid image_base64: {}", err)))?;
    let image = data::load_image_from_bytes(bytes, payload.image_mime.as_deref(), None)
        .map_err(|err| error(StatusCode::BAD_REQUEST, err.to_string()))?;
    let (image_width, image_height) = image
        .dimensions()
        .map_err(|err| error(StatusCode::BAD_REQUEST, format!("{:#}", err)))?;
    let viewport = Viewport::for_display(
        (image_width, image_height),
        payload.viewport_width,
        payload.viewport_height,
    );
    if !viewport.is_valid() {
        return Err(error(StatusCode::BAD_REQUEST, "viewport must be positive"));
    }
    let lang = payload
        .lang
        .filter(|value| !value.trim().is_empty())
        .unwrap_or_else(|| settings.target_lang.clone());

    let output = pipeline.analyze(image, &lang).await.map_err(|err| {
        warn!("analysis failed: {}", err);
        match err {
            AnalyzeError::EmptyResult => error(StatusCode::UNPROCESSABLE_ENTITY, err.to_string()),
            AnalyzeError::Provider(_) => error(StatusCode::BAD_GATEWAY, err.to_string()),
        }
    })?;
    let overlays = compose(&output.detections, viewport);
    Ok(AnalyzeResponse {
        detections: output.detections,
        overlays,
        image_width,
        image_height,
        model: output.model,
        usage: output.usage,
    })
}

async fn layout(Json(payload): Json<LayoutRequest>) -> Result<Json<LayoutResponse>, HandlerError> {
    layout_request(payload).map(Json)
}

pub(crate) fn layout_request(payload: LayoutRequest) -> Result<LayoutResponse, HandlerError> {
    let viewport = Viewport::new(payload.viewport_width, payload.viewport_height);
    if !viewport.is_valid() {
        return Err(error(StatusCode::BAD_REQUEST, "viewport must be positive"));
    }
    Ok(LayoutResponse {
        overlays: compose(&payload.detections, viewport),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::tests::FixedProvider;
    use serde_json::json;
    use std::io::Cursor;

    fn png_base64(width: u32, height: u32) -> String {
        let image = image::RgbaImage::from_pixel(width, height, image::Rgba([0, 0, 0, 255]));
        let mut bytes = Vec::new();
        image::DynamicImage::ImageRgba8(image)
            .write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)
            .unwrap();
        BASE64.encode(bytes)
    }

    fn detections_args() -> serde_json::Value {
        json!({
            "detections": [
                {"original_text": "出口", "translated_text": "Exit", "orientation": "horizontal", "box_2d": [100, 100, 300, 400]},
                {"original_text": "?", "translated_text": "?", "orientation": "horizontal", "box_2d": [1, 2]}
            ]
        })
    }

    #[tokio::test]
    async fn analyze_uses_natural_size_by_default() {
        let pipeline = DetectionPipeline::new(FixedProvider::new(detections_args()));
        let request = AnalyzeRequest {
            image_base64: png_base64(200, 100),
            ..AnalyzeRequest::default()
        };
        let response = analyze_request(&pipeline, &settings::Settings::default(), request)
            .await
            .unwrap();
        assert_eq!((response.image_width, response.image_height), (200, 100));
        assert_eq!(response.detections.len(), 2);
        assert_eq!(response.overlays.len(), 1);
        assert_eq!(response.overlays[0].rect.x, 20.0);
        assert_eq!(response.overlays[0].rect.height, 20.0);
    }

    #[tokio::test]
    async fn analyze_scales_to_requested_width() {
        let pipeline = DetectionPipeline::new(FixedProvider::new(detections_args()));
        let request = AnalyzeRequest {
            image_base64: png_base64(200, 100),
            viewport_width: Some(1000.0),
            ..AnalyzeRequest::default()
        };
        let response = analyze_request(&pipeline, &settings::Settings::default(), request)
            .await
            .unwrap();
        let rect = response.overlays[0].rect;
        assert_eq!((rect.x, rect.y, rect.width, rect.height), (100.0, 50.0, 300.0, 100.0));
    }

    #[tokio::test]
    async fn empty_analysis_maps_to_422() {
        let pipeline = DetectionPipeline::new(FixedProvider::new(json!({"detections": []})));
        let request = AnalyzeRequest {
            image_base64: png_base64(4, 4),
            ..AnalyzeRequest::default()
        };
        let (status, _) = analyze_request(&pipeline, &settings::Settings::default(), request)
            .await
            .unwrap_err();
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn provider_failure_maps_to_502() {
        let pipeline = DetectionPipeline::new(FixedProvider::failing());
        let request = AnalyzeRequest {
            image_base64: png_base64(4, 4),
            ..AnalyzeRequest::default()
        };
        let (status, body) = analyze_request(&pipeline, &settings::Settings::default(), request)
            .await
            .unwrap_err();
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert!(body.0.error.contains("boom"));
    }

    #[tokio::test]
    async fn bad_base64_is_rejected_before_calling_provider() {
        let provider = FixedProvider::new(detections_args());
        let calls = provider.calls.clone();
        let pipeline = DetectionPipeline::new(provider);
        let request = AnalyzeRequest {
            image_base64: "***".to_string(),
            ..AnalyzeRequest::default()
        };
        let (status, _) = analyze_request(&pipeline, &settings::Settings::default(), request)
            .await
            .unwrap_err();
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(calls.lock().unwrap().is_empty());
    }

    #[test]
    fn layout_recomputes_for_new_viewport() {
        let request: LayoutRequest = serde_json::from_value(json!({
            "detections": [
                {"original_text": "a", "translated_text": "A", "orientation": "vertical",
                 "quad": [{"x": 0, "y": 0}, {"x": 500, "y": 0}, {"x": 500, "y": 500}, {"x": 0, "y": 500}]}
            ],
            "viewport_width": 640,
            "viewport_height": 480
        }))
        .unwrap();
        let response = layout_request(request).unwrap();
        assert_eq!(response.overlays.len(), 1);
        assert_eq!(response.overlays[0].rect.width, 320.0);
        assert_eq!(response.overlays[0].rect.height, 240.0);
    }

    #[test]
    fn layout_rejects_zero_viewport() {
        let request = LayoutRequest {
            detections: Vec::new(),
            viewport_width: 0.0,
            viewport_height: 480.0,
        };
        let (status, _) = layout_request(request).unwrap_err();
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}
