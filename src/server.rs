use std::{future::Future, net::SocketAddr, sync::Arc, time::Duration};

use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::post,
};
use serde_json::json;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{
    config::ServerConfig,
    errors::{DescriberError, Result},
    pipeline::{ListingDescriber, ListingRequest},
};

#[derive(Clone)]
struct AppState {
    describer: Arc<ListingDescriber>,
    request_timeout: Option<Duration>,
}

pub fn router(describer: Arc<ListingDescriber>, config: &ServerConfig) -> Router {
    let state = AppState {
        describer,
        request_timeout: config.request_timeout,
    };

    Router::new()
        .route("/improve-description", post(improve_description_handler))
        .layer(DefaultBodyLimit::max(config.max_body_bytes))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn run_server(
    addr: SocketAddr,
    app: Router,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(target: "server", %addr, "HTTP server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|err| DescriberError::other(format!("HTTP server error: {err}")))?;

    Ok(())
}

async fn improve_description_handler(
    State(state): State<AppState>,
    Json(request): Json<ListingRequest>,
) -> std::result::Result<Json<serde_json::Value>, ApiError> {
    let work = state.describer.improve_description(&request);

    // Expiry drops the pipeline future, including any caption backoff in progress.
    let improved = match state.request_timeout {
        Some(limit) => tokio::time::timeout(limit, work)
            .await
            .map_err(|_| ApiError::TimedOut(limit))??,
        None => work.await?,
    };

    Ok(Json(json!({ "improved_description": improved })))
}

enum ApiError {
    Pipeline(DescriberError),
    TimedOut(Duration),
}

impl From<DescriberError> for ApiError {
    fn from(value: DescriberError) -> Self {
        Self::Pipeline(value)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::Pipeline(DescriberError::GenerationFailed(cause)) => {
                (StatusCode::INTERNAL_SERVER_ERROR, cause)
            }
            ApiError::Pipeline(other) => (StatusCode::INTERNAL_SERVER_ERROR, other.to_string()),
            ApiError::TimedOut(limit) => {
                tracing::warn!(target: "server", limit_secs = limit.as_secs_f64(), "request timed out");
                (
                    StatusCode::GATEWAY_TIMEOUT,
                    format!("request timed out after {} seconds", limit.as_secs_f64()),
                )
            }
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        captioning::{CAPTION_FAILURE_SENTINEL, ImageDescriber, RetryPolicy},
        providers::{CaptionError, ImageCaptioner, TextImprover},
        storage::{ObjectStore, StoredImage},
    };
    use async_trait::async_trait;
    use axum::body::{Body, to_bytes};
    use axum::http::{Request, header};
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
    use bytes::Bytes;
    use serde_json::Value;
    use std::{sync::Mutex, time::Duration};
    use tower::ServiceExt;

    struct FakeStore;

    #[async_trait]
    impl ObjectStore for FakeStore {
        async fn store(&self, _image: Bytes) -> Result<StoredImage> {
            Ok(StoredImage::new("gs://test/images/photo.jpg"))
        }
    }

    struct FailingCaptioner;

    #[async_trait]
    impl ImageCaptioner for FailingCaptioner {
        async fn describe(
            &self,
            _image: &StoredImage,
            _instruction: &str,
        ) -> std::result::Result<String, CaptionError> {
            Err(CaptionError::Fatal("400 Bad Request".into()))
        }
    }

    struct ScriptedImprover {
        reply: std::result::Result<String, String>,
        prompts: Mutex<Vec<String>>,
    }

    impl ScriptedImprover {
        fn replying(reply: std::result::Result<&str, &str>) -> Arc<Self> {
            Arc::new(Self {
                reply: reply.map(str::to_string).map_err(str::to_string),
                prompts: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl TextImprover for ScriptedImprover {
        async fn improve(&self, prompt: &str) -> Result<String> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            self.reply.clone().map_err(DescriberError::generation)
        }
    }

    fn app(improver: Arc<ScriptedImprover>) -> Router {
        let describer = ListingDescriber::new(
            Arc::new(FakeStore),
            ImageDescriber::new(Arc::new(FailingCaptioner), RetryPolicy::default()),
            improver,
        );
        let config = ServerConfig {
            bind_addr: "127.0.0.1:0".parse().unwrap(),
            max_body_bytes: 1024 * 1024,
            request_timeout: Some(Duration::from_secs(30)),
        };
        router(Arc::new(describer), &config)
    }

    async fn post_json(app: Router, body: Value) -> (StatusCode, Value) {
        let response = app
            .oneshot(
                Request::post("/improve-description")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();

        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn description_without_images_still_generates() {
        let improver = ScriptedImprover::replying(Ok("A cozy cottage, reimagined."));

        let (status, body) = post_json(
            app(improver.clone()),
            json!({ "description": "A cozy cottage", "images": [] }),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "improved_description": "A cozy cottage, reimagined." }));
        let prompts = improver.prompts.lock().unwrap();
        assert_eq!(prompts.len(), 1);
        assert!(prompts[0].contains("A cozy cottage"));
        assert!(!prompts[0].contains("Image "));
    }

    #[tokio::test]
    async fn caption_failure_does_not_fail_the_request() {
        let improver = ScriptedImprover::replying(Ok("Generated text."));
        let image = BASE64_STANDARD.encode(b"\xFF\xD8\xFF\xE0");

        let (status, body) = post_json(
            app(improver.clone()),
            json!({ "rooms": 2, "property_type": "Lviv", "images": [image] }),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["improved_description"], "Generated text.");
        let prompts = improver.prompts.lock().unwrap();
        assert!(prompts[0].contains(&format!("Image 1: {CAPTION_FAILURE_SENTINEL}")));
        assert!(prompts[0].contains("- Number of rooms: 2\n"));
        assert!(prompts[0].contains("- Location: Lviv\n"));
    }

    #[tokio::test]
    async fn generation_failure_maps_to_500() {
        let improver = ScriptedImprover::replying(Err("chat completion failed (503)"));

        let (status, body) = post_json(app(improver), json!({ "description": "Flat" })).await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body, json!({ "error": "chat completion failed (503)" }));
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_during_caption_backoff_returns_json_error() {
        struct QuotaExhaustedCaptioner;

        #[async_trait]
        impl ImageCaptioner for QuotaExhaustedCaptioner {
            async fn describe(
                &self,
                _image: &StoredImage,
                _instruction: &str,
            ) -> std::result::Result<String, CaptionError> {
                Err(CaptionError::RateLimited("429 Resource exhausted".into()))
            }
        }

        let improver = ScriptedImprover::replying(Ok("unreachable"));
        let describer = ListingDescriber::new(
            Arc::new(FakeStore),
            ImageDescriber::new(Arc::new(QuotaExhaustedCaptioner), RetryPolicy::default()),
            improver.clone(),
        );
        let config = ServerConfig {
            bind_addr: "127.0.0.1:0".parse().unwrap(),
            max_body_bytes: 1024 * 1024,
            request_timeout: Some(Duration::from_secs(5)),
        };
        let image = BASE64_STANDARD.encode(b"\xFF\xD8\xFF\xE0");

        let (status, body) = post_json(
            router(Arc::new(describer), &config),
            json!({ "images": [image] }),
        )
        .await;

        assert_eq!(status, StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(body, json!({ "error": "request timed out after 5 seconds" }));
        assert!(improver.prompts.lock().unwrap().is_empty());
    }
}
