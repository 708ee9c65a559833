use crate::api::models::health::HealthResponse;
use axum::Json;

#[utoipa::path(
    get,
    path = "/health",
    tag = "health",
    summary = "Health check",
    responses(
        (status = 200, description = "Service is up", body = HealthResponse)
    )
)]
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        service: "ocr-service".to_string(),
    })
}

#[cfg(test)]
mod tests {
    use crate::test_utils::{StaticRecognizer, create_test_app};
    use serde_json::json;
    use wiremock::MockServer;

    #[tokio::test]
    async fn test_health() {
        let llm = MockServer::start().await;
        let storage = tempfile::tempdir().unwrap();
        let app = create_test_app(storage.path(), &llm, StaticRecognizer::new("")).await;

        let response = app.get("/health").await;

        response.assert_status_ok();
        response.assert_json(&json!({"status": "healthy", "service": "ocr-service"}));
    }
}
