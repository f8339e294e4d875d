//! Lambda invocation handling

use base64::{engine::general_purpose, Engine};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;

use crate::executor::ExecutorError;
use crate::function::{Function, FunctionState};
use crate::package::PackageError;

/// Bytes of log returned with `LogType: Tail`
const LOG_TAIL_BYTES: usize = 4096;

#[derive(Debug, Error)]
pub enum InvocationError {
    #[error("The operation cannot be performed at this time. The function is currently in the following state: {0:?}")]
    FunctionNotActive(FunctionState),

    #[error("Could not parse request body into json: {0}")]
    InvalidPayload(String),

    #[error("Failed to prepare execution environment: {0}")]
    Environment(#[from] PackageError),

    #[error(transparent)]
    Executor(#[from] ExecutorError),

    #[error("Execution task failed: {0}")]
    Task(String),
}

/// Invocation type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InvocationType {
    /// Synchronous invocation (wait for response)
    #[default]
    RequestResponse,
    /// Asynchronous invocation (fire and forget)
    Event,
    /// Validation only (don't actually invoke)
    DryRun,
}

impl InvocationType {
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "RequestResponse" => Some(Self::RequestResponse),
            "Event" => Some(Self::Event),
            "DryRun" => Some(Self::DryRun),
            _ => None,
        }
    }
}

/// Whether to return the tail of the execution log
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogType {
    #[default]
    None,
    Tail,
}

impl LogType {
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "None" => Some(Self::None),
            "Tail" => Some(Self::Tail),
            _ => None,
        }
    }
}

/// Invocation result
#[derive(Debug)]
pub struct InvocationResult {
    pub status_code: u16,
    pub payload: Option<Bytes>,
    pub function_error: Option<String>,
    pub log_result: Option<String>,
    pub executed_version: String,
}

impl InvocationResult {
    pub fn success(payload: Bytes, version: String) -> Self {
        Self {
            status_code: 200,
            payload: Some(payload),
            function_error: None,
            log_result: None,
            executed_version: version,
        }
    }

    /// Lambda returns 200 even when the handler fails
    pub fn unhandled_error(payload: Bytes, version: String) -> Self {
        Self {
            status_code: 200,
            payload: Some(payload),
            function_error: Some("Unhandled".to_string()),
            log_result: None,
            executed_version: version,
        }
    }

    pub fn accepted() -> Self {
        Self {
            status_code: 202,
            payload: None,
            function_error: None,
            log_result: None,
            executed_version: String::new(),
        }
    }

    pub fn dry_run(version: String) -> Self {
        Self {
            status_code: 204,
            payload: None,
            function_error: None,
            log_result: None,
            executed_version: version,
        }
    }

    /// Attach the base64 tail of the execution log
    pub fn with_log_tail(mut self, lines: &[String]) -> Self {
        let mut log = lines.join("\n");
        log.push('\n');

        let mut start = log.len().saturating_sub(LOG_TAIL_BYTES);
        while !log.is_char_boundary(start) {
            start += 1;
        }

        self.log_result = Some(general_purpose::STANDARD.encode(&log[start..]));
        self
    }
}

/// Lambda context passed to the function
#[derive(Debug, Clone, Serialize)]
pub struct LambdaContext {
    pub aws_request_id: String,
    pub invoked_function_arn: String,
    pub function_name: String,
    pub function_version: String,
    pub memory_limit_in_mb: i32,
    pub log_group_name: String,
    pub log_stream_name: String,
    pub deadline_ms: i64,
    pub region: String,
}

impl LambdaContext {
    pub fn new(
        function: &Function,
        request_id: &str,
        log_stream_name: &str,
        region: &str,
        started: DateTime<Utc>,
    ) -> Self {
        Self {
            aws_request_id: request_id.to_string(),
            invoked_function_arn: function.arn.clone(),
            function_name: function.config.function_name.clone(),
            function_version: function.version.clone(),
            memory_limit_in_mb: function.config.memory_size,
            log_group_name: function.log_group_name(),
            log_stream_name: log_stream_name.to_string(),
            deadline_ms: started.timestamp_millis() + i64::from(function.config.timeout) * 1000,
            region: region.to_string(),
        }
    }

    /// Get remaining time in milliseconds
    pub fn get_remaining_time_in_millis(&self) -> i64 {
        let now = Utc::now().timestamp_millis();
        (self.deadline_ms - now).max(0)
    }

    /// Environment for the handler process
    ///
    /// User variables come first so the reserved Lambda variables win.
    pub fn env_vars(&self, function: &Function) -> Vec<(String, String)> {
        let mut env: Vec<(String, String)> = function
            .config
            .environment
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        let reserved = [
            ("AWS_LAMBDA_FUNCTION_NAME", self.function_name.clone()),
            ("AWS_LAMBDA_FUNCTION_VERSION", self.function_version.clone()),
            (
                "AWS_LAMBDA_FUNCTION_MEMORY_SIZE",
                self.memory_limit_in_mb.to_string(),
            ),
            ("AWS_LAMBDA_LOG_GROUP_NAME", self.log_group_name.clone()),
            ("AWS_LAMBDA_LOG_STREAM_NAME", self.log_stream_name.clone()),
            ("AWS_REGION", self.region.clone()),
            ("AWS_DEFAULT_REGION", self.region.clone()),
            ("AWS_EXECUTION_ENV", format!("AWS_Lambda_{}", function.config.runtime.as_str())),
            ("_HANDLER", function.config.handler.clone()),
            ("MOCKSTACK_FUNCTION_ARN", self.invoked_function_arn.clone()),
            ("MOCKSTACK_REQUEST_ID", self.aws_request_id.clone()),
            ("MOCKSTACK_DEADLINE_MS", self.deadline_ms.to_string()),
        ];

        env.extend(reserved.into_iter().map(|(k, v)| (k.to_string(), v)));
        env
    }

    pub fn timeout(function: &Function) -> Duration {
        Duration::from_secs(function.config.timeout.max(1) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::function::FunctionConfig;
    use crate::package::DeploymentPackage;
    use mockstack_core::AccountRegionKey;

    fn function() -> Function {
        let mut config = FunctionConfig {
            function_name: "fn".to_string(),
            timeout: 5,
            ..Default::default()
        };
        config
            .environment
            .insert("AWS_REGION".to_string(), "spoofed".to_string());
        config.environment.insert("STAGE".to_string(), "test".to_string());

        Function::new(
            &AccountRegionKey::new("000000000000", "eu-west-1"),
            config,
            DeploymentPackage::from_entry("handler.py", b"").unwrap(),
        )
    }

    #[test]
    fn test_invocation_type_parsing() {
        assert_eq!(InvocationType::from_str("Event"), Some(InvocationType::Event));
        assert_eq!(InvocationType::from_str("DryRun"), Some(InvocationType::DryRun));
        assert_eq!(InvocationType::from_str("Sync"), None);
        assert_eq!(LogType::from_str("Tail"), Some(LogType::Tail));
    }

    #[test]
    fn test_context_environment() {
        let function = function();
        let started = Utc::now();
        let ctx = LambdaContext::new(&function, "req-1", "2024/01/01/[$LATEST]abc", "eu-west-1", started);

        assert_eq!(ctx.deadline_ms, started.timestamp_millis() + 5000);
        assert!(ctx.get_remaining_time_in_millis() <= 5000);

        let env = ctx.env_vars(&function);
        let last = |key: &str| {
            env.iter()
                .rev()
                .find(|(k, _)| k == key)
                .map(|(_, v)| v.as_str())
        };
        assert_eq!(last("AWS_REGION"), Some("eu-west-1"));
        assert_eq!(last("STAGE"), Some("test"));
        assert_eq!(last("AWS_LAMBDA_LOG_GROUP_NAME"), Some("/aws/lambda/fn"));
        assert_eq!(last("MOCKSTACK_REQUEST_ID"), Some("req-1"));
    }

    #[test]
    fn test_log_tail_is_bounded() {
        let lines: Vec<String> = (0..2000).map(|i| format!("line {}", i)).collect();
        let result = InvocationResult::success(Bytes::new(), "$LATEST".to_string()).with_log_tail(&lines);

        let decoded = general_purpose::STANDARD
            .decode(result.log_result.unwrap())
            .unwrap();
        assert_eq!(decoded.len(), LOG_TAIL_BYTES);
        assert!(String::from_utf8(decoded).unwrap().ends_with("line 1999\n"));
    }
}
