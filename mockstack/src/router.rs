//! HTTP router for MockStack services

use axum::{
    body::Body,
    extract::State,
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Extension, Json, Router,
};
use bytes::Bytes;
use mockstack_auth::{CallerContext, ScopeDefaults};
use mockstack_core::{AwsError, ErrorCode};
use mockstack_iam::{IamState, IamStorage};
use mockstack_lambda::{Executor, LambdaService, LambdaState, SubprocessExecutor};
use mockstack_logs::{LogsState, LogsStorage};
use serde_json::json;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{debug, info};

use crate::config::{Config, ServicesConfig};

/// Service state for the main router
pub struct AppState {
    iam: Arc<IamState>,
    logs: Arc<LogsState>,
    lambda: Arc<LambdaState>,
    services: ServicesConfig,
}

impl AppState {
    /// Wire the services together
    ///
    /// Lambda shares the IAM store for role validation and the Logs store
    /// for function output.
    pub fn new(config: &Config) -> Self {
        info!(python = %config.lambda.python, "Using subprocess executor");
        Self::with_executor(
            config,
            Arc::new(SubprocessExecutor::new(config.lambda.python.clone())),
        )
    }

    /// Same wiring with a caller-supplied handler executor
    pub fn with_executor(config: &Config, executor: Arc<dyn Executor>) -> Self {
        let iam_storage = Arc::new(IamStorage::with_account(config.scope.account_id.clone()));
        let logs_storage = Arc::new(LogsStorage::new());

        let service = LambdaService::new(iam_storage.clone(), logs_storage.clone(), executor);

        info!(account_id = %config.scope.account_id, "Services initialized");

        Self {
            iam: Arc::new(IamState::with_storage(iam_storage)),
            logs: Arc::new(LogsState::with_storage(logs_storage)),
            lambda: Arc::new(LambdaState::new(Arc::new(service))),
            services: config.services.clone(),
        }
    }
}

/// Create the main application router
pub fn create_router(state: AppState, defaults: ScopeDefaults) -> Router {
    let lambda_enabled = state.services.lambda;
    let lambda_state = state.lambda.clone();
    let shared_state = Arc::new(state);

    let mut router = Router::new()
        .route("/health", get(health_check))
        .route("/_mockstack/health", get(health_check))
        // Query (IAM) and JSON 1.1 (Logs) protocols both post to the root
        .route("/", post(handle_root))
        .with_state(shared_state);

    if lambda_enabled {
        router = router.merge(mockstack_lambda::router(lambda_state));
    }

    router
        .layer(Extension(defaults))
        .layer(TraceLayer::new_for_http())
}

async fn health_check(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let status = |enabled: bool| if enabled { "running" } else { "disabled" };
    Json(json!({
        "status": "running",
        "services": {
            "iam": status(state.services.iam),
            "logs": status(state.services.logs),
            "lambda": status(state.services.lambda),
        }
    }))
}

async fn handle_root(
    State(state): State<Arc<AppState>>,
    caller: CallerContext,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let target = headers
        .get("x-amz-target")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    if let Some(target) = target {
        if target.starts_with(mockstack_logs::TARGET_PREFIX) {
            if !state.services.logs {
                return service_disabled("logs");
            }
            debug!(target = %target, scope = %caller.scope, "Logs request");
            return mockstack_logs::handle_request(State(state.logs.clone()), caller, headers, body)
                .await;
        }
        return unknown_target(&target);
    }

    if let Some(service) = caller.service.as_deref() {
        if !caller.signed_for("iam") {
            return unsupported_service(service);
        }
    }

    if !state.services.iam {
        return service_disabled("iam");
    }

    mockstack_iam::handle_request(State(state.iam.clone()), headers, body).await
}

fn unknown_target(target: &str) -> Response {
    let error = AwsError::new(
        ErrorCode::UnknownOperation,
        format!("Operation {} is not supported", target),
    );
    (
        StatusCode::BAD_REQUEST,
        [(header::CONTENT_TYPE, "application/x-amz-json-1.1")],
        error.to_json(),
    )
        .into_response()
}

fn unsupported_service(service: &str) -> Response {
    let error = AwsError::new(
        ErrorCode::InvalidAction,
        format!("Service {} is not supported", service),
    );
    (
        StatusCode::BAD_REQUEST,
        [(header::CONTENT_TYPE, "text/xml")],
        error.to_query_xml(),
    )
        .into_response()
}

fn service_disabled(service: &str) -> Response {
    (
        StatusCode::SERVICE_UNAVAILABLE,
        Body::from(format!("Service '{}' is disabled", service)),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::to_bytes, http::Request};
    use tower::ServiceExt;

    const SIGNED_LOGS: &str = "AWS4-HMAC-SHA256 Credential=test/20240101/eu-west-1/logs/aws4_request, SignedHeaders=host;x-amz-date, Signature=abc";
    const SIGNED_LAMBDA: &str = "AWS4-HMAC-SHA256 Credential=test/20240101/eu-west-1/lambda/aws4_request, SignedHeaders=host;x-amz-date, Signature=abc";
    const SIGNED_SQS: &str = "AWS4-HMAC-SHA256 Credential=test/20240101/eu-west-1/sqs/aws4_request, SignedHeaders=host;x-amz-date, Signature=abc";

    fn app(config: Config) -> Router {
        create_router(AppState::new(&config), ScopeDefaults::default())
    }

    async fn body_string(response: Response) -> String {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    fn logs_request(operation: &str, body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/")
            .header("x-amz-target", format!("Logs_20140328.{}", operation))
            .header(header::CONTENT_TYPE, "application/x-amz-json-1.1")
            .header(header::AUTHORIZATION, SIGNED_LOGS)
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let response = app(Config::default())
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body: serde_json::Value = serde_json::from_str(&body_string(response).await).unwrap();
        assert_eq!(body["services"]["lambda"], "running");
    }

    #[tokio::test]
    async fn test_iam_query_request() {
        let body = concat!(
            "Action=CreateRole&RoleName=test-iam-role&Version=2010-05-08&AssumeRolePolicyDocument=",
            "%7B%22Version%22%3A%222012-10-17%22%2C%22Statement%22%3A%5B%7B%22Effect%22%3A%22Allow%22%2C",
            "%22Principal%22%3A%7B%22Service%22%3A%22lambda.amazonaws.com%22%7D%2C",
            "%22Action%22%3A%22sts%3AAssumeRole%22%7D%5D%7D"
        );
        let response = app(Config::default())
            .oneshot(
                Request::post("/")
                    .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
                    .body(Body::from(body))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert!(body_string(response).await.contains("<RoleName>test-iam-role</RoleName>"));
    }

    #[tokio::test]
    async fn test_logs_json_request() {
        let app = app(Config::default());

        let response = app
            .clone()
            .oneshot(logs_request("CreateLogGroup", r#"{"logGroupName": "/aws/lambda/fn"}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app
            .oneshot(logs_request("DescribeLogGroups", "{}"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(body_string(response).await.contains("/aws/lambda/fn"));
    }

    #[tokio::test]
    async fn test_unknown_target() {
        let response = app(Config::default())
            .oneshot(
                Request::post("/")
                    .header("x-amz-target", "DynamoDB_20120810.ListTables")
                    .body(Body::from("{}"))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(body_string(response).await.contains("UnknownOperationException"));
    }

    #[tokio::test]
    async fn test_unsupported_query_service() {
        let response = app(Config::default())
            .oneshot(
                Request::post("/")
                    .header(header::AUTHORIZATION, SIGNED_SQS)
                    .body(Body::from("Action=ListQueues"))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(body_string(response).await.contains("InvalidAction"));
    }

    #[tokio::test]
    async fn test_lambda_routes_merged() {
        let response = app(Config::default())
            .oneshot(
                Request::get("/2015-03-31/functions/")
                    .header(header::AUTHORIZATION, SIGNED_LAMBDA)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert!(body_string(response).await.contains("\"Functions\":[]"));
    }

    #[tokio::test]
    async fn test_disabled_services() {
        let mut config = Config::default();
        config.services.logs = false;
        config.services.lambda = false;
        let app = app(config);

        let response = app
            .clone()
            .oneshot(logs_request("DescribeLogGroups", "{}"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

        let response = app
            .oneshot(Request::get("/2015-03-31/functions/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
