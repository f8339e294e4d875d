//! HTTP handlers for IAM

use axum::{
    extract::State,
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use bytes::Bytes;
use mockstack_core::{AwsError, ErrorCode, RequestId};
use percent_encoding::{utf8_percent_encode, NON_ALPHANUMERIC};
use quick_xml::escape::escape;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

use crate::storage::{IamError, IamState, Role};

const XMLNS: &str = "https://iam.amazonaws.com/doc/2010-05-08/";

/// Handle IAM requests
/// IAM uses the Query protocol: the action is a form parameter, not X-Amz-Target
pub async fn handle_request(
    State(state): State<Arc<IamState>>,
    _headers: HeaderMap,
    body: Bytes,
) -> Response {
    let params: HashMap<String, String> = form_urlencoded::parse(&body)
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

    let action = params.get("Action").map(|s| s.as_str()).unwrap_or("");

    info!(action = %action, "IAM request");

    let result = match action {
        "CreateRole" => handle_create_role(&state, &params),
        "GetRole" => handle_get_role(&state, &params),
        "DeleteRole" => handle_delete_role(&state, &params),
        "ListRoles" => handle_list_roles(&state, &params),
        _ => {
            warn!(action = %action, "Unknown IAM operation");
            Err(AwsError::new(
                ErrorCode::InvalidAction,
                format!("Unknown action: {}", action),
            ))
        }
    };

    match result {
        Ok(xml) => xml_response(StatusCode::OK, xml),
        Err(e) => error_response(&e),
    }
}

// === Handlers ===

fn handle_create_role(state: &IamState, params: &HashMap<String, String>) -> Result<String, AwsError> {
    let role_name = required(params, "RoleName")?;
    let assume_role_policy = required(params, "AssumeRolePolicyDocument")?;
    let description = params.get("Description").cloned();
    let path = params.get("Path").cloned();

    let role = state
        .storage
        .create_role(role_name, assume_role_policy, description, path)
        .map_err(to_aws_error)?;

    Ok(envelope(
        "CreateRole",
        Some(format!("    <Role>\n{}    </Role>\n", role_xml(&role))),
    ))
}

fn handle_get_role(state: &IamState, params: &HashMap<String, String>) -> Result<String, AwsError> {
    let role_name = required(params, "RoleName")?;
    let role = state.storage.get_role(role_name).map_err(to_aws_error)?;

    Ok(envelope(
        "GetRole",
        Some(format!("    <Role>\n{}    </Role>\n", role_xml(&role))),
    ))
}

fn handle_delete_role(state: &IamState, params: &HashMap<String, String>) -> Result<String, AwsError> {
    let role_name = required(params, "RoleName")?;
    state.storage.delete_role(role_name).map_err(to_aws_error)?;

    Ok(envelope("DeleteRole", None))
}

fn handle_list_roles(state: &IamState, params: &HashMap<String, String>) -> Result<String, AwsError> {
    let prefix = params.get("PathPrefix").map(String::as_str);
    let members: String = state
        .storage
        .list_roles(prefix)
        .iter()
        .map(|role| format!("      <member>\n{}      </member>\n", role_xml(role)))
        .collect();

    Ok(envelope(
        "ListRoles",
        Some(format!(
            "    <Roles>\n{}    </Roles>\n    <IsTruncated>false</IsTruncated>\n",
            members
        )),
    ))
}

// === Helpers ===

fn required<'a>(params: &'a HashMap<String, String>, name: &str) -> Result<&'a str, AwsError> {
    params.get(name).map(String::as_str).ok_or_else(|| {
        AwsError::new(ErrorCode::ValidationError, format!("{} is required", name))
    })
}

fn to_aws_error(error: IamError) -> AwsError {
    let code = match &error {
        IamError::EntityAlreadyExists(_) => ErrorCode::EntityAlreadyExists,
        IamError::NoSuchEntity(_) => ErrorCode::NoSuchEntity,
        IamError::MalformedPolicy(_) => ErrorCode::MalformedPolicyDocument,
        IamError::InvalidInput(_) => ErrorCode::ValidationError,
    };
    AwsError::new(code, error.to_string())
}

/// Render the inner fields of a `Role` element
fn role_xml(role: &Role) -> String {
    let description = role
        .description
        .as_ref()
        .map(|d| format!("      <Description>{}</Description>\n", escape(d.as_str())))
        .unwrap_or_default();

    format!(
        "      <Path>{}</Path>\n      <RoleName>{}</RoleName>\n      <RoleId>{}</RoleId>\n      <Arn>{}</Arn>\n      <CreateDate>{}</CreateDate>\n      <AssumeRolePolicyDocument>{}</AssumeRolePolicyDocument>\n{}      <MaxSessionDuration>{}</MaxSessionDuration>\n",
        escape(role.path.as_str()),
        escape(role.role_name.as_str()),
        role.role_id,
        escape(role.arn.as_str()),
        role.create_date.format("%Y-%m-%dT%H:%M:%SZ"),
        utf8_percent_encode(&role.assume_role_policy_document, NON_ALPHANUMERIC),
        description,
        role.max_session_duration,
    )
}

/// Wrap a result body in the `{Action}Response` envelope
fn envelope(action: &str, result: Option<String>) -> String {
    let result = result
        .map(|body| format!("  <{action}Result>\n{body}  </{action}Result>\n"))
        .unwrap_or_default();

    format!(
        "<{action}Response xmlns=\"{XMLNS}\">\n{result}  <ResponseMetadata>\n    <RequestId>{}</RequestId>\n  </ResponseMetadata>\n</{action}Response>",
        RequestId::new()
    )
}

fn xml_response(status: StatusCode, body: String) -> Response {
    (
        status,
        [(header::CONTENT_TYPE, "text/xml; charset=utf-8")],
        body,
    )
        .into_response()
}

fn error_response(error: &AwsError) -> Response {
    let status = StatusCode::from_u16(error.code.http_status())
        .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    xml_response(status, error.to_query_xml())
}
