//! CloudWatch Logs JSON 1.1 handlers
//!
//! Operations arrive as `POST /` with `X-Amz-Target: Logs_20140328.{Action}`.

use axum::{
    body::Body,
    extract::State,
    http::{header, HeaderMap, StatusCode},
    response::Response,
};
use bytes::Bytes;
use mockstack_auth::CallerContext;
use mockstack_core::{AccountRegionKey, AwsError, ErrorCode};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::storage::{
    DescribeStreamsQuery, GetEventsQuery, InputLogEvent, LogEvent, LogGroupInfo, LogStreamInfo,
    LogsError, LogsState, StreamOrder,
};

const CONTENT_TYPE: &str = "application/x-amz-json-1.1";

/// Target prefix shared by every CloudWatch Logs operation
pub const TARGET_PREFIX: &str = "Logs_20140328.";

// === Request/Response types ===

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LogGroupRequest {
    log_group_name: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DescribeLogGroupsRequest {
    log_group_name_prefix: Option<String>,
    limit: Option<usize>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct DescribeLogGroupsResponse {
    log_groups: Vec<LogGroupInfo>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateLogStreamRequest {
    log_group_name: String,
    log_stream_name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DescribeLogStreamsRequest {
    log_group_name: String,
    log_stream_name_prefix: Option<String>,
    order_by: Option<String>,
    descending: Option<bool>,
    limit: Option<usize>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct DescribeLogStreamsResponse {
    log_streams: Vec<LogStreamInfo>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PutLogEventsRequest {
    log_group_name: String,
    log_stream_name: String,
    log_events: Vec<InputLogEventRequest>,
}

#[derive(Debug, Deserialize)]
struct InputLogEventRequest {
    timestamp: i64,
    message: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PutLogEventsResponse {
    next_sequence_token: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GetLogEventsRequest {
    log_group_name: String,
    log_stream_name: String,
    start_time: Option<i64>,
    end_time: Option<i64>,
    start_from_head: Option<bool>,
    limit: Option<usize>,
    next_token: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GetLogEventsResponse {
    events: Vec<LogEvent>,
    next_forward_token: String,
    next_backward_token: String,
}

// === Handler ===

pub async fn handle_request(
    State(state): State<Arc<LogsState>>,
    caller: CallerContext,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let target = headers
        .get("x-amz-target")
        .and_then(|t| t.to_str().ok())
        .unwrap_or_default();

    let action = target.strip_prefix(TARGET_PREFIX).unwrap_or(target);
    debug!(action = %action, scope = %caller.scope, "CloudWatch Logs request");

    let result = dispatch(&state, &caller.scope, action, &body);

    match result {
        Ok(body) => json_response(StatusCode::OK, body),
        Err(e) => {
            debug!(action = %action, error = %e, "CloudWatch Logs request failed");
            error_response(&e)
        }
    }
}

fn dispatch(
    state: &LogsState,
    scope: &AccountRegionKey,
    action: &str,
    body: &[u8],
) -> Result<String, AwsError> {
    let storage = &state.storage;

    match action {
        "CreateLogGroup" => {
            let req: LogGroupRequest = parse(body)?;
            storage
                .create_log_group(scope, &req.log_group_name)
                .map_err(to_aws_error)?;
            Ok("{}".to_string())
        }
        "DeleteLogGroup" => {
            let req: LogGroupRequest = parse(body)?;
            storage
                .delete_log_group(scope, &req.log_group_name)
                .map_err(to_aws_error)?;
            Ok("{}".to_string())
        }
        "DescribeLogGroups" => {
            let req: DescribeLogGroupsRequest = if body.is_empty() {
                DescribeLogGroupsRequest::default()
            } else {
                parse(body)?
            };
            let log_groups =
                storage.describe_log_groups(scope, req.log_group_name_prefix.as_deref(), req.limit);
            to_json(&DescribeLogGroupsResponse { log_groups })
        }
        "CreateLogStream" => {
            let req: CreateLogStreamRequest = parse(body)?;
            storage
                .create_log_stream(scope, &req.log_group_name, &req.log_stream_name)
                .map_err(to_aws_error)?;
            Ok("{}".to_string())
        }
        "DescribeLogStreams" => {
            let req: DescribeLogStreamsRequest = parse(body)?;
            let order_by = match req.order_by.as_deref() {
                None | Some("LogStreamName") => StreamOrder::LogStreamName,
                Some("LastEventTime") => StreamOrder::LastEventTime,
                Some(other) => {
                    return Err(AwsError::new(
                        ErrorCode::InvalidParameter,
                        format!("Invalid orderBy: {}", other),
                    ))
                }
            };
            let query = DescribeStreamsQuery {
                log_stream_name_prefix: req.log_stream_name_prefix,
                order_by,
                descending: req.descending.unwrap_or(false),
                limit: req.limit,
            };
            let log_streams = storage
                .describe_log_streams(scope, &req.log_group_name, &query)
                .map_err(to_aws_error)?;
            to_json(&DescribeLogStreamsResponse { log_streams })
        }
        "PutLogEvents" => {
            let req: PutLogEventsRequest = parse(body)?;
            let events = req
                .log_events
                .into_iter()
                .map(|e| InputLogEvent {
                    timestamp: e.timestamp,
                    message: e.message,
                })
                .collect();
            let next_sequence_token = storage
                .put_log_events(scope, &req.log_group_name, &req.log_stream_name, events)
                .map_err(to_aws_error)?;
            to_json(&PutLogEventsResponse { next_sequence_token })
        }
        "GetLogEvents" => {
            let req: GetLogEventsRequest = parse(body)?;
            let query = GetEventsQuery {
                start_time: req.start_time,
                end_time: req.end_time,
                start_from_head: req.start_from_head.unwrap_or(false),
                limit: req.limit,
                next_token: req.next_token,
            };
            let page = storage
                .get_log_events(scope, &req.log_group_name, &req.log_stream_name, &query)
                .map_err(to_aws_error)?;
            to_json(&GetLogEventsResponse {
                events: page.events,
                next_forward_token: page.next_forward_token,
                next_backward_token: page.next_backward_token,
            })
        }
        _ => {
            warn!(action = %action, "Unknown CloudWatch Logs operation");
            Err(AwsError::new(
                ErrorCode::UnknownOperation,
                format!("Unknown operation: {}", action),
            ))
        }
    }
}

// === Helpers ===

fn parse<T: DeserializeOwned>(body: &[u8]) -> Result<T, AwsError> {
    serde_json::from_slice(body).map_err(|e| {
        AwsError::new(
            ErrorCode::SerializationException,
            format!("Invalid request body: {}", e),
        )
    })
}

fn to_json<T: Serialize>(value: &T) -> Result<String, AwsError> {
    serde_json::to_string(value)
        .map_err(|e| AwsError::new(ErrorCode::ServiceUnavailable, e.to_string()))
}

fn to_aws_error(error: LogsError) -> AwsError {
    let code = match &error {
        LogsError::GroupNotFound(_) | LogsError::StreamNotFound(_) => ErrorCode::ResourceNotFound,
        LogsError::GroupAlreadyExists(_) | LogsError::StreamAlreadyExists(_) => {
            ErrorCode::ResourceAlreadyExists
        }
        LogsError::InvalidParameter(_) => ErrorCode::InvalidParameter,
    };
    AwsError::new(code, error.to_string())
}

fn json_response(status: StatusCode, body: String) -> Response {
    Response::builder()
        .status(status)
        .header(header::CONTENT_TYPE, CONTENT_TYPE)
        .body(Body::from(body))
        .unwrap_or_else(|_| Response::new(Body::empty()))
}

fn error_response(error: &AwsError) -> Response {
    let status = StatusCode::from_u16(error.json_status()).unwrap_or(StatusCode::BAD_REQUEST);
    json_response(status, error.to_json())
}
