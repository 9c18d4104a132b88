//! Axum REST API handlers

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use axum::{
    Router,
    routing::{get, post},
    extract::{State, Multipart, DefaultBodyLimit},
    http::StatusCode,
    response::Json,
};
use tower_http::cors::{CorsLayer, Any};
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::dataset::ImageFormat;
use crate::engine::TrainedModel;
use crate::error::ClassifyError;
use crate::service::PredictionService;
use crate::utils::image::save_upload;

use super::dto::*;

/// Multipart field carrying the image
pub const IMAGE_FIELD: &str = "imageFile";

type ApiError = (StatusCode, Json<ErrorResponse>);

/// Application state shared across handlers
pub struct AppState<M: TrainedModel> {
    pub service: PredictionService<M>,
    /// Accepted uploads are copied here when set
    pub upload_dir: Option<PathBuf>,
    pub start_time: Instant,
}

/// Create the REST API router
pub fn create_rest_router<M: TrainedModel>(state: Arc<AppState<M>>, max_upload_bytes: usize) -> Router {
    Router::new()
        // Classification
        .route("/api/ImageClassification", get(heartbeat_handler))
        .route("/api/ImageClassification/classifyImage", post(classify_handler::<M>))
        // System endpoints
        .route("/health", get(health_handler::<M>))
        // Middleware
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Map a classification error to its HTTP status and error code
pub fn error_status(err: &ClassifyError) -> (StatusCode, &'static str) {
    match err {
        ClassifyError::EmptyPayload => (StatusCode::BAD_REQUEST, "EMPTY_IMAGE"),
        ClassifyError::UnsupportedFormat(_) => (StatusCode::UNSUPPORTED_MEDIA_TYPE, "UNSUPPORTED_FORMAT"),
        e if e.is_unknown_label() => (StatusCode::UNPROCESSABLE_ENTITY, "UNKNOWN_LABEL"),
        ClassifyError::PoolTimeout(_) | ClassifyError::PoolClosed => {
            (StatusCode::SERVICE_UNAVAILABLE, "ENGINE_UNAVAILABLE")
        }
        e if e.is_client_error() => (StatusCode::BAD_REQUEST, "INVALID_IMAGE"),
        _ => (StatusCode::INTERNAL_SERVER_ERROR, "CLASSIFICATION_FAILED"),
    }
}

fn api_error(err: ClassifyError) -> ApiError {
    let (status, code) = error_status(&err);
    if status.is_server_error() {
        error!("Classification failed: {}", err);
    } else {
        warn!("Classification rejected: {}", err);
    }
    (status, Json(ErrorResponse::new(&err.to_string(), code)))
}

/// Heartbeat
async fn heartbeat_handler() -> Json<Vec<&'static str>> {
    Json(vec!["ACK Heart beat 1", "ACK Heart beat 2"])
}

/// Classify an uploaded image
async fn classify_handler<M: TrainedModel>(
    State(state): State<Arc<AppState<M>>>,
    mut multipart: Multipart,
) -> Result<Json<ClassifyResponse>, ApiError> {
    let mut image_data: Option<Vec<u8>> = None;
    let mut file_name: Option<String> = None;

    while let Some(field) = multipart.next_field().await.map_err(|e| {
        (StatusCode::BAD_REQUEST, Json(ErrorResponse::new(&e.to_string(), "MULTIPART_ERROR")))
    })? {
        if field.name() == Some(IMAGE_FIELD) {
            file_name = field.file_name().map(str::to_string);
            image_data = Some(field.bytes().await.map_err(|e| {
                (StatusCode::BAD_REQUEST, Json(ErrorResponse::new(&e.to_string(), "READ_ERROR")))
            })?.to_vec());
        }
    }

    let image_data = image_data.ok_or_else(|| {
        (StatusCode::BAD_REQUEST, Json(ErrorResponse::new("Missing imageFile field", "MISSING_IMAGE")))
    })?;

    let format: ImageFormat = PredictionService::<M>::validate(&image_data).map_err(api_error)?;

    let image_id = file_name.unwrap_or_else(|| format!("upload.{}", format.extension()));

    if let Some(dir) = &state.upload_dir {
        match save_upload(dir, &image_data, format).await {
            Ok(path) => info!("Saved upload {} as {:?}", image_id, path),
            Err(e) => {
                error!("Failed to save upload: {}", e);
                return Err((
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(ErrorResponse::new(&e.to_string(), "SAVE_FAILED")),
                ));
            }
        }
    }

    let summary = state.service.classify(image_data, image_id).await.map_err(api_error)?;
    info!(
        "Image {} classified as {} ({:.4}) in {} ms",
        summary.image_id, summary.predicted_label, summary.probability, summary.execution_time_ms
    );

    Ok(Json(ClassifyResponse::from(summary)))
}

/// Health check
async fn health_handler<M: TrainedModel>(
    State(state): State<Arc<AppState<M>>>,
) -> Json<HealthResponse> {
    let pool = state.service.pool();
    Json(HealthResponse {
        healthy: !pool.is_closed(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        labels: state.service.labels().to_vec(),
        pool: pool.stats(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use axum::body::Body;
    use axum::extract::FromRequest;
    use axum::http::{header, Request};
    use image::{DynamicImage, Rgb, RgbImage};

    use crate::dataset::{KeyOrdinality, LabelKeyMapper};
    use crate::engine::{
        CentroidModel, CentroidTrainer, EnginePool, ModelTrainer, PixelBuffer, PoolConfig, TrainingExample,
    };
    use crate::utils::image::encode_png;

    #[test]
    fn test_error_status_mapping() {
        let status = |e: ClassifyError| error_status(&e).0;
        assert_eq!(status(ClassifyError::EmptyPayload), StatusCode::BAD_REQUEST);
        assert_eq!(
            status(ClassifyError::UnsupportedFormat(ImageFormat::Bmp)),
            StatusCode::UNSUPPORTED_MEDIA_TYPE
        );
        assert_eq!(
            status(ClassifyError::UnknownLabel("tulip".into())),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            status(ClassifyError::PoolTimeout(Duration::from_secs(1))),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            status(ClassifyError::InvalidImage { width: 1, height: 1, channels: 3, actual: 1 }),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status(ClassifyError::Model("boom".into())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[tokio::test]
    async fn test_heartbeat() {
        let Json(body) = heartbeat_handler().await;
        assert_eq!(body, vec!["ACK Heart beat 1", "ACK Heart beat 2"]);
    }

    const BOUNDARY: &str = "imgclass-boundary";

    fn state(upload_dir: Option<PathBuf>) -> Arc<AppState<CentroidModel>> {
        let labels = LabelKeyMapper::build(["dark", "light"], KeyOrdinality::ByValue);
        let example = |value: u8, key: u32| TrainingExample {
            input: PixelBuffer::new(4, 4, 1, vec![value; 16]).unwrap(),
            key,
        };
        let train = vec![example(10, 0), example(240, 1)];
        let model = CentroidTrainer::default().fit(&train, &labels, None).unwrap();
        Arc::new(AppState {
            service: PredictionService::new(EnginePool::new(Arc::new(model), PoolConfig::default())),
            upload_dir,
            start_time: Instant::now(),
        })
    }

    async fn multipart(file_name: &str, data: &[u8]) -> Multipart {
        let mut body = format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{IMAGE_FIELD}\"; filename=\"{file_name}\"\r\nContent-Type: image/png\r\n\r\n"
        )
        .into_bytes();
        body.extend_from_slice(data);
        body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());

        let request = Request::builder()
            .method("POST")
            .uri("/api/ImageClassification/classifyImage")
            .header(header::CONTENT_TYPE, format!("multipart/form-data; boundary={BOUNDARY}"))
            .body(Body::from(body))
            .unwrap();
        Multipart::from_request(request, &()).await.unwrap()
    }

    fn light_png() -> Vec<u8> {
        encode_png(&DynamicImage::ImageRgb8(RgbImage::from_pixel(8, 8, Rgb([235, 235, 235])))).unwrap()
    }

    #[tokio::test]
    async fn test_image_id_is_client_file_name_when_saving() {
        let dir = tempfile::tempdir().unwrap();
        let state = state(Some(dir.path().to_path_buf()));

        let form = multipart("rose.png", &light_png()).await;
        let Ok(Json(response)) = classify_handler(State(state), form).await else {
            panic!("classification failed");
        };
        assert_eq!(response.image_id, "rose.png");
        assert_eq!(response.predicted_label, "light");

        let saved: Vec<_> = std::fs::read_dir(dir.path()).unwrap().map(|e| e.unwrap().path()).collect();
        assert_eq!(saved.len(), 1);
        assert_ne!(saved[0].file_name().unwrap(), "rose.png");
        assert_eq!(saved[0].extension().unwrap(), "png");
    }

    #[tokio::test]
    async fn test_unsupported_upload_is_not_saved() {
        let dir = tempfile::tempdir().unwrap();
        let state = state(Some(dir.path().to_path_buf()));

        let form = multipart("anim.gif", b"GIF89a....").await;
        let Err((status, _)) = classify_handler(State(state), form).await else {
            panic!("gif was accepted");
        };
        assert_eq!(status, StatusCode::UNSUPPORTED_MEDIA_TYPE);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_classify_response_uses_camel_case() {
        let response = ClassifyResponse {
            image_id: "a.jpg".into(),
            predicted_label: "roses".into(),
            probability: 0.5,
            prediction_execution_time: 12,
            scores: Vec::new(),
        };
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["predictedLabel"], "roses");
        assert_eq!(json["predictionExecutionTime"], 12);
        assert_eq!(json["imageId"], "a.jpg");
    }
}
