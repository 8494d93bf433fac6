//! HTTP surface over the visualization pipeline

use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::{Dataset, FragmentId, FragmentReceipt, PipelineError, SharedPipeline};

/// A raw model reply plus the rows to bind into it
#[derive(Debug, Deserialize)]
pub struct VisualizeRequest {
    pub reply: String,
    #[serde(default)]
    pub data: Dataset,
}

/// Error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub stage: String,
    pub details: Option<String>,
}

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub version: String,
}

#[derive(Debug, Serialize)]
pub struct FragmentsResponse {
    pub artifact: String,
    pub fragments: Vec<FragmentId>,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn api_error(err: PipelineError) -> ApiError {
    let status = if err.is_fatal() {
        StatusCode::INTERNAL_SERVER_ERROR
    } else {
        StatusCode::UNPROCESSABLE_ENTITY
    };
    (
        status,
        Json(ErrorResponse {
            error: "Visualization rejected".to_string(),
            stage: err.stage().to_string(),
            details: Some(err.to_string()),
        }),
    )
}

/// Turn a model reply into a fragment appended to the artifact
async fn visualize_handler(
    State(pipeline): State<SharedPipeline>,
    Json(req): Json<VisualizeRequest>,
) -> Result<Json<FragmentReceipt>, ApiError> {
    info!(
        "Received visualize request: {} reply bytes, {} rows",
        req.reply.len(),
        req.data.len()
    );

    match pipeline.process_reply(&req.reply, &req.data).await {
        Ok(receipt) => Ok(Json(receipt)),
        Err(e) => {
            if e.is_fatal() {
                error!("Visualization failed: {:?}", e);
            } else {
                info!("Visualization rejected at {} stage: {}", e.stage(), e);
            }
            Err(api_error(e))
        }
    }
}

/// List fragment ids currently in the artifact
async fn fragments_handler(
    State(pipeline): State<SharedPipeline>,
) -> Result<Json<FragmentsResponse>, ApiError> {
    let accumulator = pipeline.accumulator();
    let fragments = accumulator.fragment_ids().await.map_err(api_error)?;
    Ok(Json(FragmentsResponse {
        artifact: accumulator.path().display().to_string(),
        fragments,
    }))
}

/// Health check handler
async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        service: "chartforge".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Create and configure the HTTP server
pub fn create_router(pipeline: SharedPipeline) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/visualize", post(visualize_handler))
        .route("/fragments", get(fragments_handler))
        .with_state(pipeline)
}

/// Run the HTTP server
pub async fn run_server(pipeline: SharedPipeline, port: u16) -> anyhow::Result<()> {
    let addr = format!("0.0.0.0:{}", port);
    info!("Starting chartforge server on {}", addr);

    pipeline.accumulator().ensure_initialized().await?;
    let app = create_router(pipeline);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Server listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{PipelineConfig, VisualizationPipeline};
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    async fn post_visualize(pipeline: SharedPipeline, body: Value) -> (StatusCode, Value) {
        let request = Request::builder()
            .method("POST")
            .uri("/visualize")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        let response = create_router(pipeline).oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    fn request(reply: &str) -> Value {
        json!({
            "reply": reply,
            "data": [{"Category": "A", "Value": 10}, {"Category": "B", "Value": 20}]
        })
    }

    const BAR: &str = r#"{"mark": "bar", "encoding": {"x": {"field": "Category"}, "y": {"field": "Value"}}}"#;

    #[tokio::test]
    async fn test_visualize_appends_and_lists_fragment() {
        let dir = tempfile::tempdir().unwrap();
        let config = PipelineConfig {
            output_path: dir.path().join("dashboard.html"),
            ..Default::default()
        };
        let pipeline = VisualizationPipeline::new_simple(&config);

        let (status, body) = post_visualize(pipeline.clone(), request(BAR)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["rows_bound"], json!(2));

        let response = create_router(pipeline)
            .oneshot(Request::builder().uri("/fragments").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let listed: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(listed["fragments"][0], body["fragment_id"]);
    }

    #[tokio::test]
    async fn test_turn_local_rejection_is_unprocessable() {
        let dir = tempfile::tempdir().unwrap();
        let config = PipelineConfig {
            output_path: dir.path().join("dashboard.html"),
            ..Default::default()
        };
        let pipeline = VisualizationPipeline::new_simple(&config);

        let (status, body) = post_visualize(pipeline, request("no chart here")).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["stage"], json!("extraction"));

        let arc = r#"{"mark": "arc"}"#;
        let pipeline = VisualizationPipeline::new_simple(&config);
        let (status, body) = post_visualize(pipeline, request(arc)).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["stage"], json!("validation"));
    }

    #[tokio::test]
    async fn test_write_failure_is_internal_error() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("not-a-dir");
        std::fs::write(&blocker, "file in the way").unwrap();
        let config = PipelineConfig {
            output_path: blocker.join("dashboard.html"),
            write_retries: 1,
            retry_backoff_ms: 1,
            ..Default::default()
        };
        let pipeline = VisualizationPipeline::new_simple(&config);

        let (status, body) = post_visualize(pipeline, request(BAR)).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["stage"], json!("artifact_write"));
    }
}
