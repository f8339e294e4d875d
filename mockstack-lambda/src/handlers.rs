//! Lambda HTTP API handlers
//!
//! Implements the AWS Lambda REST JSON endpoints under `/2015-03-31/functions`.

use axum::{
    body::Body,
    extract::{Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::Response,
    routing::{get, post, put},
    Router,
};
use base64::{engine::general_purpose, Engine};
use bytes::Bytes;
use mockstack_auth::CallerContext;
use mockstack_core::{AccountRegionKey, AwsError, ErrorCode};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, error, info};

use crate::executor::ExecutorError;
use crate::function::{Function, FunctionConfig, Runtime, LATEST_VERSION};
use crate::invocation::{InvocationError, InvocationType, LogType};
use crate::package::DeploymentPackage;
use crate::service::{FunctionConfigUpdate, LambdaService, LambdaServiceError};

const DEFAULT_MAX_ITEMS: usize = 50;

/// Shared state for Lambda handlers
pub struct LambdaState {
    pub service: Arc<LambdaService>,
}

impl LambdaState {
    pub fn new(service: Arc<LambdaService>) -> Self {
        Self { service }
    }
}

/// Routes for the Lambda control and invoke APIs
pub fn router(state: Arc<LambdaState>) -> Router {
    Router::new()
        .route(
            "/2015-03-31/functions",
            get(list_functions).post(create_function),
        )
        .route(
            "/2015-03-31/functions/",
            get(list_functions).post(create_function),
        )
        .route(
            "/2015-03-31/functions/:function_name",
            get(get_function).delete(delete_function),
        )
        .route(
            "/2015-03-31/functions/:function_name/configuration",
            get(get_function_configuration).put(update_function_configuration),
        )
        .route(
            "/2015-03-31/functions/:function_name/code",
            put(update_function_code),
        )
        .route(
            "/2015-03-31/functions/:function_name/invocations",
            post(invoke_function),
        )
        .with_state(state)
}

/// Create function request
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CreateFunctionRequest {
    pub function_name: String,
    pub runtime: String,
    pub role: String,
    pub handler: String,
    pub code: CodeRequest,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default = "default_timeout")]
    pub timeout: i32,
    #[serde(default = "default_memory_size")]
    pub memory_size: i32,
    #[serde(default)]
    pub environment: Option<EnvironmentRequest>,
}

fn default_timeout() -> i32 {
    3
}

fn default_memory_size() -> i32 {
    128
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CodeRequest {
    /// Base64 encoded zip
    #[serde(default)]
    pub zip_file: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct EnvironmentRequest {
    #[serde(default)]
    pub variables: HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct UpdateFunctionCodeRequest {
    #[serde(default)]
    pub zip_file: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct UpdateFunctionConfigRequest {
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub handler: Option<String>,
    #[serde(default)]
    pub memory_size: Option<i32>,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub runtime: Option<String>,
    #[serde(default)]
    pub timeout: Option<i32>,
    #[serde(default)]
    pub environment: Option<EnvironmentRequest>,
}

/// Function configuration as returned by every control plane call
#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct FunctionResponse {
    pub function_name: String,
    pub function_arn: String,
    pub runtime: String,
    pub role: String,
    pub handler: String,
    pub code_size: i64,
    pub description: String,
    pub timeout: i32,
    pub memory_size: i32,
    pub last_modified: String,
    pub code_sha256: String,
    pub version: String,
    pub state: String,
    pub last_update_status: String,
    pub package_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub environment: Option<EnvironmentResponse>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct EnvironmentResponse {
    pub variables: HashMap<String, String>,
}

impl From<&Function> for FunctionResponse {
    fn from(f: &Function) -> Self {
        Self {
            function_name: f.config.function_name.clone(),
            function_arn: f.arn.clone(),
            runtime: f.config.runtime.as_str().to_string(),
            role: f.config.role.clone(),
            handler: f.config.handler.clone(),
            code_size: f.code_size,
            description: f.config.description.clone().unwrap_or_default(),
            timeout: f.config.timeout,
            memory_size: f.config.memory_size,
            last_modified: f.last_modified.format("%Y-%m-%dT%H:%M:%S%.3f+0000").to_string(),
            code_sha256: f.code_sha256.clone(),
            version: f.version.clone(),
            state: format!("{:?}", f.state),
            last_update_status: "Successful".to_string(),
            package_type: "Zip".to_string(),
            environment: if f.config.environment.is_empty() {
                None
            } else {
                Some(EnvironmentResponse {
                    variables: f.config.environment.clone(),
                })
            },
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct GetFunctionResponse {
    pub configuration: FunctionResponse,
    pub code: FunctionCodeResponse,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct FunctionCodeResponse {
    pub repository_type: String,
    pub location: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct ListFunctionsResponse {
    pub functions: Vec<FunctionResponse>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_marker: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ListFunctionsQuery {
    #[serde(rename = "MaxItems")]
    pub max_items: Option<usize>,
    #[serde(rename = "Marker")]
    pub marker: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct InvokeQuery {
    #[serde(rename = "Qualifier")]
    pub qualifier: Option<String>,
}

// === Handler functions ===

/// POST /2015-03-31/functions
pub async fn create_function(
    State(state): State<Arc<LambdaState>>,
    caller: CallerContext,
    body: Bytes,
) -> Response {
    let result = parse_body::<CreateFunctionRequest>(&body)
        .and_then(|req| {
            info!(function_name = %req.function_name, scope = %caller.scope, "CreateFunction");
            function_from_request(req)
        })
        .and_then(|(config, package)| {
            state
                .service
                .create_function(&caller.scope, config, package)
        });

    match result {
        Ok(function) => json_response(StatusCode::CREATED, &FunctionResponse::from(function.as_ref())),
        Err(e) => service_error(e),
    }
}

/// GET /2015-03-31/functions/{functionName}
pub async fn get_function(
    State(state): State<Arc<LambdaState>>,
    caller: CallerContext,
    Path(function_name): Path<String>,
) -> Response {
    debug!(function_name = %function_name, "GetFunction");

    match state.service.get_function(&caller.scope, &function_name) {
        Ok(function) => {
            let response = GetFunctionResponse {
                configuration: FunctionResponse::from(function.as_ref()),
                code: FunctionCodeResponse {
                    repository_type: "S3".to_string(),
                    location: code_location(&caller.scope, &function.config.function_name),
                },
            };
            json_response(StatusCode::OK, &response)
        }
        Err(e) => service_error(e),
    }
}

/// GET /2015-03-31/functions/{functionName}/configuration
pub async fn get_function_configuration(
    State(state): State<Arc<LambdaState>>,
    caller: CallerContext,
    Path(function_name): Path<String>,
) -> Response {
    debug!(function_name = %function_name, "GetFunctionConfiguration");

    match state.service.get_function(&caller.scope, &function_name) {
        Ok(function) => json_response(StatusCode::OK, &FunctionResponse::from(function.as_ref())),
        Err(e) => service_error(e),
    }
}

/// DELETE /2015-03-31/functions/{functionName}
pub async fn delete_function(
    State(state): State<Arc<LambdaState>>,
    caller: CallerContext,
    Path(function_name): Path<String>,
) -> Response {
    info!(function_name = %function_name, "DeleteFunction");

    match state.service.delete_function(&caller.scope, &function_name) {
        Ok(()) => empty_response(StatusCode::NO_CONTENT),
        Err(e) => service_error(e),
    }
}

/// GET /2015-03-31/functions
pub async fn list_functions(
    State(state): State<Arc<LambdaState>>,
    caller: CallerContext,
    Query(query): Query<ListFunctionsQuery>,
) -> Response {
    debug!(scope = %caller.scope, "ListFunctions");

    let functions = state.service.list_functions(&caller.scope);
    let start = query
        .marker
        .as_deref()
        .and_then(|m| m.parse::<usize>().ok())
        .unwrap_or(0)
        .min(functions.len());
    let max_items = query
        .max_items
        .unwrap_or(DEFAULT_MAX_ITEMS)
        .clamp(1, DEFAULT_MAX_ITEMS);
    let end = start.saturating_add(max_items).min(functions.len());

    let response = ListFunctionsResponse {
        functions: functions[start..end]
            .iter()
            .map(|f| FunctionResponse::from(f.as_ref()))
            .collect(),
        next_marker: (end < functions.len()).then(|| end.to_string()),
    };

    json_response(StatusCode::OK, &response)
}

/// PUT /2015-03-31/functions/{functionName}/code
pub async fn update_function_code(
    State(state): State<Arc<LambdaState>>,
    caller: CallerContext,
    Path(function_name): Path<String>,
    body: Bytes,
) -> Response {
    info!(function_name = %function_name, "UpdateFunctionCode");

    let result = parse_body::<UpdateFunctionCodeRequest>(&body)
        .and_then(|req| decode_package(req.zip_file.as_deref()))
        .and_then(|package| {
            state
                .service
                .update_function_code(&caller.scope, &function_name, package)
        });

    match result {
        Ok(function) => json_response(StatusCode::OK, &FunctionResponse::from(function.as_ref())),
        Err(e) => service_error(e),
    }
}

/// PUT /2015-03-31/functions/{functionName}/configuration
pub async fn update_function_configuration(
    State(state): State<Arc<LambdaState>>,
    caller: CallerContext,
    Path(function_name): Path<String>,
    body: Bytes,
) -> Response {
    info!(function_name = %function_name, "UpdateFunctionConfiguration");

    let result = parse_body::<UpdateFunctionConfigRequest>(&body)
        .and_then(config_update_from_request)
        .and_then(|update| {
            state
                .service
                .update_function_configuration(&caller.scope, &function_name, update)
        });

    match result {
        Ok(function) => json_response(StatusCode::OK, &FunctionResponse::from(function.as_ref())),
        Err(e) => service_error(e),
    }
}

/// POST /2015-03-31/functions/{functionName}/invocations
pub async fn invoke_function(
    State(state): State<Arc<LambdaState>>,
    caller: CallerContext,
    Path(function_name): Path<String>,
    Query(query): Query<InvokeQuery>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    info!(function_name = %function_name, payload_size = %body.len(), "Invoke");

    if let Some(qualifier) = query.qualifier.as_deref() {
        if qualifier != LATEST_VERSION {
            let arn = caller
                .scope
                .arn("lambda", &format!("function:{}:{}", function_name, qualifier));
            return service_error(LambdaServiceError::FunctionNotFound(arn));
        }
    }

    let invocation_type = match header_value(&headers, "x-amz-invocation-type") {
        None => InvocationType::default(),
        Some(value) => match InvocationType::from_str(value) {
            Some(t) => t,
            None => return invalid_header("X-Amz-Invocation-Type", value),
        },
    };
    let log_type = match header_value(&headers, "x-amz-log-type") {
        None => LogType::default(),
        Some(value) => match LogType::from_str(value) {
            Some(t) => t,
            None => return invalid_header("X-Amz-Log-Type", value),
        },
    };

    match state
        .service
        .invoke(&caller.scope, &function_name, body, invocation_type, log_type)
        .await
    {
        Ok(result) => {
            let status = StatusCode::from_u16(result.status_code).unwrap_or(StatusCode::OK);
            let mut builder = Response::builder()
                .status(status)
                .header(header::CONTENT_TYPE, "application/json");

            if !result.executed_version.is_empty() {
                builder = builder.header("X-Amz-Executed-Version", &result.executed_version);
            }
            if let Some(error) = &result.function_error {
                builder = builder.header("X-Amz-Function-Error", error);
            }
            if let Some(logs) = &result.log_result {
                builder = builder.header("X-Amz-Log-Result", logs);
            }

            builder
                .body(Body::from(result.payload.unwrap_or_default()))
                .unwrap_or_else(|_| empty_response(StatusCode::INTERNAL_SERVER_ERROR))
        }
        Err(e) => service_error(e),
    }
}

// === Helpers ===

fn function_from_request(
    req: CreateFunctionRequest,
) -> Result<(FunctionConfig, DeploymentPackage), LambdaServiceError> {
    let runtime = Runtime::from_str(&req.runtime)
        .ok_or_else(|| LambdaServiceError::InvalidRuntime(req.runtime.clone()))?;
    let package = decode_package(req.code.zip_file.as_deref())?;

    let config = FunctionConfig {
        function_name: req.function_name,
        runtime,
        handler: req.handler,
        role: req.role,
        memory_size: req.memory_size,
        timeout: req.timeout,
        environment: req.environment.map(|e| e.variables).unwrap_or_default(),
        description: req.description,
    };

    Ok((config, package))
}

fn config_update_from_request(
    req: UpdateFunctionConfigRequest,
) -> Result<FunctionConfigUpdate, LambdaServiceError> {
    let runtime = req
        .runtime
        .map(|rt| Runtime::from_str(&rt).ok_or(LambdaServiceError::InvalidRuntime(rt)))
        .transpose()?;

    Ok(FunctionConfigUpdate {
        description: req.description,
        handler: req.handler,
        memory_size: req.memory_size,
        role: req.role,
        runtime,
        timeout: req.timeout,
        environment: req.environment.map(|e| e.variables),
    })
}

fn parse_body<T: DeserializeOwned>(body: &[u8]) -> Result<T, LambdaServiceError> {
    serde_json::from_slice(body)
        .map_err(|e| InvocationError::InvalidPayload(e.to_string()).into())
}

fn decode_package(zip_file: Option<&str>) -> Result<DeploymentPackage, LambdaServiceError> {
    let encoded = zip_file.ok_or_else(|| {
        LambdaServiceError::InvalidParameter("Code must specify a ZipFile".to_string())
    })?;
    let bytes = general_purpose::STANDARD.decode(encoded).map_err(|e| {
        LambdaServiceError::InvalidParameter(format!("Invalid base64 in ZipFile: {}", e))
    })?;
    Ok(DeploymentPackage::from_zip_bytes(bytes)?)
}

fn header_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

fn code_location(scope: &AccountRegionKey, function_name: &str) -> String {
    format!(
        "https://awslambda-{region}-tasks.s3.{region}.amazonaws.com/snapshots/{}/{}-{}",
        scope.account_id,
        function_name,
        uuid::Uuid::new_v4(),
        region = scope.region,
    )
}

fn to_aws_error(error: &LambdaServiceError) -> AwsError {
    let code = match error {
        LambdaServiceError::FunctionExists(_) => ErrorCode::ResourceConflict,
        LambdaServiceError::FunctionNotFound(_) => ErrorCode::ResourceNotFound,
        LambdaServiceError::InvalidRuntime(_)
        | LambdaServiceError::InvalidHandler(_)
        | LambdaServiceError::InvalidRole(_)
        | LambdaServiceError::InvalidParameter(_)
        | LambdaServiceError::Package(_) => ErrorCode::InvalidParameterValue,
        LambdaServiceError::Invocation(InvocationError::InvalidPayload(_)) => {
            ErrorCode::InvalidRequestContent
        }
        LambdaServiceError::Invocation(InvocationError::FunctionNotActive(_)) => {
            ErrorCode::ResourceConflict
        }
        LambdaServiceError::Invocation(InvocationError::Executor(
            ExecutorError::UnsupportedRuntime(_),
        )) => ErrorCode::InvalidRuntime,
        LambdaServiceError::Invocation(_) => ErrorCode::ServiceException,
    };
    AwsError::new(code, error.to_string())
}

fn service_error(error: LambdaServiceError) -> Response {
    let error = to_aws_error(&error);
    if error.code.is_server_error() {
        error!(code = %error.code.as_str(), message = %error.message, "Lambda request failed");
    } else {
        debug!(code = %error.code.as_str(), message = %error.message, "Lambda request rejected");
    }
    error_response(&error)
}

fn invalid_header(name: &str, value: &str) -> Response {
    error_response(&AwsError::new(
        ErrorCode::InvalidParameterValue,
        format!("Invalid value for {}: {}", name, value),
    ))
}

fn error_response(error: &AwsError) -> Response {
    let status = StatusCode::from_u16(error.code.http_status())
        .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    Response::builder()
        .status(status)
        .header(header::CONTENT_TYPE, "application/json")
        .header("x-amzn-ErrorType", error.code.as_str())
        .body(Body::from(error.to_rest_json()))
        .unwrap_or_else(|_| empty_response(StatusCode::INTERNAL_SERVER_ERROR))
}

fn json_response<T: Serialize>(status: StatusCode, value: &T) -> Response {
    match serde_json::to_vec(value) {
        Ok(body) => Response::builder()
            .status(status)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body))
            .unwrap_or_else(|_| empty_response(StatusCode::INTERNAL_SERVER_ERROR)),
        Err(e) => error_response(&AwsError::new(ErrorCode::ServiceException, e.to_string())),
    }
}

fn empty_response(status: StatusCode) -> Response {
    let mut response = Response::new(Body::empty());
    *response.status_mut() = status;
    response
}
