//! AWS error types and formatting

use serde::Serialize;
use thiserror::Error;

use crate::request_id::RequestId;

/// AWS error codes emitted by the emulated services
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    // Common
    ServiceUnavailable,

    // IAM specific
    EntityAlreadyExists,
    NoSuchEntity,
    MalformedPolicyDocument,
    ValidationError,
    InvalidAction,
    ServiceFailure,

    // CloudWatch Logs specific
    ResourceAlreadyExists,
    InvalidParameter,
    SerializationException,
    UnknownOperation,

    // Lambda specific
    ResourceNotFound,
    ResourceConflict,
    InvalidParameterValue,
    InvalidRequestContent,
    InvalidRuntime,
    ServiceException,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ServiceUnavailable => "ServiceUnavailable",
            Self::EntityAlreadyExists => "EntityAlreadyExists",
            Self::NoSuchEntity => "NoSuchEntity",
            Self::MalformedPolicyDocument => "MalformedPolicyDocument",
            Self::ValidationError => "ValidationError",
            Self::InvalidAction => "InvalidAction",
            Self::ServiceFailure => "ServiceFailure",
            Self::ResourceAlreadyExists => "ResourceAlreadyExistsException",
            Self::InvalidParameter => "InvalidParameterException",
            Self::SerializationException => "SerializationException",
            Self::UnknownOperation => "UnknownOperationException",
            Self::ResourceNotFound => "ResourceNotFoundException",
            Self::ResourceConflict => "ResourceConflictException",
            Self::InvalidParameterValue => "InvalidParameterValueException",
            Self::InvalidRequestContent => "InvalidRequestContentException",
            Self::InvalidRuntime => "InvalidRuntimeException",
            Self::ServiceException => "ServiceException",
        }
    }

    /// Status code for the REST and Query protocols
    pub fn http_status(&self) -> u16 {
        match self {
            Self::NoSuchEntity | Self::ResourceNotFound => 404,
            Self::EntityAlreadyExists | Self::ResourceConflict => 409,
            Self::MalformedPolicyDocument
            | Self::ValidationError
            | Self::InvalidAction
            | Self::ResourceAlreadyExists
            | Self::InvalidParameter
            | Self::SerializationException
            | Self::UnknownOperation
            | Self::InvalidParameterValue
            | Self::InvalidRequestContent => 400,
            Self::InvalidRuntime => 502,
            Self::ServiceUnavailable => 503,
            Self::ServiceFailure | Self::ServiceException => 500,
        }
    }

    pub fn is_server_error(&self) -> bool {
        self.http_status() >= 500
    }
}

/// AWS-style error
#[derive(Debug, Error)]
#[error("{}: {}", .code.as_str(), .message)]
pub struct AwsError {
    pub code: ErrorCode,
    pub message: String,
    pub request_id: String,
}

impl AwsError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            request_id: RequestId::new().to_string(),
        }
    }

    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = request_id.into();
        self
    }

    /// Status code for the JSON 1.1 protocol, which reports all client faults as 400
    pub fn json_status(&self) -> u16 {
        if self.code.is_server_error() {
            self.code.http_status()
        } else {
            400
        }
    }

    /// Format as an AWS Query (IAM) XML error
    pub fn to_query_xml(&self) -> String {
        let fault = if self.code.is_server_error() {
            "Receiver"
        } else {
            "Sender"
        };

        format!(
            r#"<ErrorResponse xmlns="https://iam.amazonaws.com/doc/2010-05-08/">
  <Error>
    <Type>{}</Type>
    <Code>{}</Code>
    <Message>{}</Message>
  </Error>
  <RequestId>{}</RequestId>
</ErrorResponse>"#,
            fault,
            self.code.as_str(),
            quick_xml::escape::escape(self.message.as_str()),
            self.request_id
        )
    }

    /// Format as a JSON 1.1 (CloudWatch Logs) error
    pub fn to_json(&self) -> String {
        #[derive(Serialize)]
        struct JsonError<'a> {
            #[serde(rename = "__type")]
            error_type: &'a str,
            message: &'a str,
        }

        let error = JsonError {
            error_type: self.code.as_str(),
            message: &self.message,
        };

        serde_json::to_string(&error).unwrap_or_else(|_| {
            format!(r#"{{"__type":"{}"}}"#, self.code.as_str())
        })
    }

    /// Format as a REST JSON (Lambda) error body
    pub fn to_rest_json(&self) -> String {
        let error_type = if self.code.is_server_error() {
            "Service"
        } else {
            "User"
        };

        serde_json::json!({
            "Type": error_type,
            "Message": self.message,
            "message": self.message,
        })
        .to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_query_xml_format() {
        let error = AwsError::new(ErrorCode::EntityAlreadyExists, "Role with name x already exists.")
            .with_request_id("test-request-id");

        let xml = error.to_query_xml();
        assert!(xml.contains("<Type>Sender</Type>"));
        assert!(xml.contains("<Code>EntityAlreadyExists</Code>"));
        assert!(xml.contains("<RequestId>test-request-id</RequestId>"));
    }

    #[test]
    fn test_error_xml_escapes_message() {
        let error = AwsError::new(ErrorCode::ValidationError, "value <bad> & worse");
        assert!(error.to_query_xml().contains("value &lt;bad&gt; &amp; worse"));
    }

    #[test]
    fn test_error_json_format() {
        let error = AwsError::new(ErrorCode::ResourceNotFound, "The specified log group does not exist.");

        let json: serde_json::Value = serde_json::from_str(&error.to_json()).unwrap();
        assert_eq!(json["__type"], "ResourceNotFoundException");
        assert_eq!(json["message"], "The specified log group does not exist.");
        assert_eq!(error.json_status(), 400);
    }

    #[test]
    fn test_error_rest_json_format() {
        let error = AwsError::new(ErrorCode::ServiceException, "boom");

        let json: serde_json::Value = serde_json::from_str(&error.to_rest_json()).unwrap();
        assert_eq!(json["Type"], "Service");
        assert_eq!(json["message"], "boom");
        assert_eq!(error.code.http_status(), 500);
    }

    #[test]
    fn test_display() {
        let error = AwsError::new(ErrorCode::NoSuchEntity, "missing");
        assert_eq!(error.to_string(), "NoSuchEntity: missing");
    }
}
