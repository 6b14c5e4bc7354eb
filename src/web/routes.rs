//! HTTP route handlers for the JSON API.

use crate::display::DetectionError;
use crate::models::{DisplaySettingsUpdate, ImageDither, ImageFeedConfiguration, SlideshowConfiguration};
use crate::services::{ServiceError, Services};
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;

type AppState = Arc<Services>;

/// Success body: `{message?, data}`
#[derive(Debug, Serialize)]
pub struct Envelope<T: Serialize> {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<&'static str>,
    pub data: T,
}

fn data<T: Serialize>(data: T) -> Json<Envelope<T>> {
    Json(Envelope {
        message: None,
        data,
    })
}

fn with_message<T: Serialize>(message: &'static str, data: T) -> Json<Envelope<T>> {
    Json(Envelope {
        message: Some(message),
        data,
    })
}

/// Failure body: `{message, errors}`
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: &'static str,
    errors: Vec<String>,
}

impl ApiError {
    fn validation(errors: Vec<String>) -> Self {
        tracing::error!("Invalid request: {:?}", errors);
        Self {
            status: StatusCode::BAD_REQUEST,
            message: "Validation errors",
            errors,
        }
    }

    fn from_service(message: &'static str, error: ServiceError) -> Self {
        match error {
            ServiceError::Validation(e) => Self::validation(vec![e.to_string()]),
            ServiceError::ShuttingDown => Self {
                status: StatusCode::SERVICE_UNAVAILABLE,
                message,
                errors: vec![ServiceError::ShuttingDown.to_string()],
            },
            other => {
                tracing::error!("{}: {}", message, other);
                Self {
                    status: StatusCode::INTERNAL_SERVER_ERROR,
                    message,
                    errors: vec![other.to_string()],
                }
            }
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::validation(vec![rejection.body_text()])
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = json!({ "message": self.message, "errors": self.errors });
        (self.status, Json(body)).into_response()
    }
}

type ApiResult<T> = Result<Json<Envelope<T>>, ApiError>;

fn success() -> Value {
    json!({ "success": true })
}

/// GET /api/settings
pub async fn get_settings(State(services): State<AppState>) -> impl IntoResponse {
    data(services.get_display_settings().await)
}

/// PATCH /api/settings
pub async fn apply_settings(
    State(services): State<AppState>,
    payload: Result<Json<DisplaySettingsUpdate>, JsonRejection>,
) -> ApiResult<Value> {
    let Json(update) = payload?;
    tracing::debug!("PATCH /api/settings: {:?}", update);

    services
        .update_display_settings(update)
        .await
        .map_err(|e| ApiError::from_service("Failed to update display", e))?;

    Ok(with_message("Display settings updated", success()))
}

/// GET /api/detect-display
pub async fn detect_display(State(services): State<AppState>) -> impl IntoResponse {
    match services.detect_display().await {
        Ok(Some(display_type)) => data(json!({ "type": display_type })),
        Ok(None) => with_message("No display detected", json!({ "type": null })),
        Err(DetectionError::Unsupported(_)) => {
            with_message("Your display is not supported", json!({ "type": "unsupported" }))
        }
    }
}

/// GET /api/current-image
pub async fn get_current_image(State(services): State<AppState>) -> impl IntoResponse {
    match services.get_current_rendered_image() {
        Some(current) => data(json!({
            "current_image": current.image,
            "rendered_at": current.rendered_at,
        })),
        None => with_message(
            "Unable to get currently displayed image",
            json!({ "current_image": null }),
        ),
    }
}

/// GET /api/slideshow
pub async fn get_slideshow(State(services): State<AppState>) -> impl IntoResponse {
    data(services.get_slideshow_configuration().await)
}

/// POST /api/slideshow
pub async fn update_slideshow(
    State(services): State<AppState>,
    payload: Result<Json<SlideshowConfiguration>, JsonRejection>,
) -> ApiResult<Value> {
    let Json(configuration) = payload?;
    tracing::debug!(
        "POST /api/slideshow: {} images, delay {}s",
        configuration.images.len(),
        configuration.change_delay
    );

    services
        .update_slideshow_configuration(configuration)
        .await
        .map_err(|e| ApiError::from_service("Failed to update slideshow", e))?;

    Ok(with_message("Slideshow should now be updating", success()))
}

/// GET /api/image-feed
pub async fn get_image_feed(State(services): State<AppState>) -> impl IntoResponse {
    match services.get_image_feed_configuration().await {
        Some(configuration) => data(Some(configuration)),
        None => with_message("No existing image feed configuration found", None),
    }
}

/// POST /api/image-feed
pub async fn update_image_feed(
    State(services): State<AppState>,
    payload: Result<Json<ImageFeedConfiguration>, JsonRejection>,
) -> ApiResult<Value> {
    let Json(configuration) = payload?;
    tracing::debug!("POST /api/image-feed: {:?}", configuration);

    services
        .update_image_feed_configuration(configuration)
        .await
        .map_err(|e| ApiError::from_service("Failed to update image feed", e))?;

    Ok(with_message("Image feed should now be updating", success()))
}

/// POST /api/utils/dither
pub async fn dither_image(
    State(services): State<AppState>,
    payload: Result<Json<ImageDither>, JsonRejection>,
) -> ApiResult<Value> {
    let Json(request) = payload?;

    let image = services
        .dither(request)
        .await
        .map_err(|e| ApiError::from_service("Error dithering the image", e))?;

    Ok(with_message("Dither done", json!({ "image": image })))
}

/// Health check endpoint
pub async fn health() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

#[cfg(test)]
mod tests {
    use super::super::WebServer;
    use super::*;
    use crate::config::AppConfig;
    use crate::display::{MockProvider, MockRecorder};
    use crate::store::MemoryStore;

    async fn serve() -> (String, Arc<Services>) {
        let services = Arc::new(
            Services::start(
                &AppConfig::default(),
                Arc::new(MemoryStore::new()),
                Arc::new(MockProvider::new(MockRecorder::new())),
            )
            .await
            .unwrap(),
        );
        let router = WebServer::new(services.clone()).router();
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        (format!("http://{addr}"), services)
    }

    async fn body(response: reqwest::Response) -> (u16, Value) {
        let status = response.status().as_u16();
        let text = response.text().await.unwrap();
        (status, serde_json::from_str(&text).unwrap())
    }

    #[tokio::test]
    async fn settings_can_be_read_and_patched() {
        let (base, services) = serve().await;
        let client = reqwest::Client::new();

        let (status, json) = body(client.get(format!("{base}/api/settings")).send().await.unwrap()).await;
        assert_eq!(status, 200);
        assert_eq!(json["data"]["type"], "phat104");
        assert_eq!(json["data"]["mode"], "slideshow");

        let (status, json) = body(
            client
                .patch(format!("{base}/api/settings"))
                .header("content-type", "application/json")
                .body(r#"{"colour_palette": "yellow"}"#)
                .send()
                .await
                .unwrap(),
        )
        .await;
        assert_eq!(status, 200);
        assert_eq!(json["data"]["success"], true);
        assert_eq!(
            services.get_display_settings().await.colour_palette,
            crate::models::ColourPalette::Yellow
        );
        services.shutdown().await;
    }

    #[tokio::test]
    async fn invalid_requests_get_400_with_errors() {
        let (base, services) = serve().await;
        let client = reqwest::Client::new();

        let (status, json) = body(
            client
                .post(format!("{base}/api/image-feed"))
                .header("content-type", "application/json")
                .body(r#"{"polling_interval": 5, "image_feed_url": "http://example.com/a.png"}"#)
                .send()
                .await
                .unwrap(),
        )
        .await;
        assert_eq!(status, 400);
        assert_eq!(json["message"], "Validation errors");
        assert!(json["errors"][0].as_str().unwrap().contains("polling_interval"));

        let (status, _) = body(
            client
                .patch(format!("{base}/api/settings"))
                .header("content-type", "application/json")
                .body(r#"{"type": "impression448"}"#)
                .send()
                .await
                .unwrap(),
        )
        .await;
        assert_eq!(status, 400);

        let (status, json) = body(
            client
                .post(format!("{base}/api/slideshow"))
                .header("content-type", "application/json")
                .body("{not json")
                .send()
                .await
                .unwrap(),
        )
        .await;
        assert_eq!(status, 400);
        assert_eq!(json["message"], "Validation errors");
        services.shutdown().await;
    }

    #[tokio::test]
    async fn detect_and_feed_report_missing_state() {
        let (base, services) = serve().await;
        let client = reqwest::Client::new();

        let (_, json) = body(client.get(format!("{base}/api/detect-display")).send().await.unwrap()).await;
        assert_eq!(json["message"], "No display detected");
        assert!(json["data"]["type"].is_null());

        let (_, json) = body(client.get(format!("{base}/api/image-feed")).send().await.unwrap()).await;
        assert!(json["data"].is_null());

        let health = client.get(format!("{base}/health")).send().await.unwrap();
        assert_eq!(health.text().await.unwrap(), "OK");
        services.shutdown().await;
    }
}
