//! Handler execution
//!
//! The [`Executor`] trait is the seam between the Lambda service and whatever
//! actually runs function code. [`SubprocessExecutor`] runs Python handlers in
//! a child interpreter on the host.

use async_trait::async_trait;
use bytes::Bytes;
use serde::Deserialize;
use serde_json::{json, Value};
use std::path::PathBuf;
use std::process::Stdio;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::function::Runtime;

/// Bootstrap run by the interpreter
///
/// Arguments: code directory, handler (`module.function`), result file. The
/// event arrives on stdin. Everything the handler prints, including
/// tracebacks, goes to stdout and becomes log lines.
const BOOTSTRAP: &str = r#"
import importlib
import json
import os
import sys
import time
import traceback

code_dir, handler, result_path = sys.argv[1:4]
sys.stderr = sys.stdout
sys.path.insert(0, code_dir)


class LambdaContext:
    def __init__(self):
        env = os.environ
        self.function_name = env.get("AWS_LAMBDA_FUNCTION_NAME", "")
        self.function_version = env.get("AWS_LAMBDA_FUNCTION_VERSION", "$LATEST")
        self.invoked_function_arn = env.get("MOCKSTACK_FUNCTION_ARN", "")
        self.memory_limit_in_mb = env.get("AWS_LAMBDA_FUNCTION_MEMORY_SIZE", "128")
        self.aws_request_id = env.get("MOCKSTACK_REQUEST_ID", "")
        self.log_group_name = env.get("AWS_LAMBDA_LOG_GROUP_NAME", "")
        self.log_stream_name = env.get("AWS_LAMBDA_LOG_STREAM_NAME", "")
        self._deadline_ms = int(env.get("MOCKSTACK_DEADLINE_MS", "0"))

    def get_remaining_time_in_millis(self):
        return max(self._deadline_ms - int(time.time() * 1000), 0)


def finish(ok, payload):
    with open(result_path, "w") as result:
        json.dump({"ok": ok, "payload": payload}, result)


try:
    raw = sys.stdin.read()
    event = json.loads(raw) if raw else None
    module_name, function_name = handler.rsplit(".", 1)
    module = importlib.import_module(module_name.replace("/", "."))
    finish(True, getattr(module, function_name)(event, LambdaContext()))
except Exception as error:
    traceback.print_exc()
    finish(False, {
        "errorMessage": str(error),
        "errorType": type(error).__name__,
        "stackTrace": traceback.format_tb(error.__traceback__),
    })
"#;

#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error("Runtime {0} is not supported by this executor")]
    UnsupportedRuntime(String),

    #[error("Failed to start {interpreter}: {source}")]
    Spawn {
        interpreter: String,
        source: std::io::Error,
    },

    #[error("Malformed handler result: {0}")]
    MalformedResult(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// One handler run
#[derive(Debug, Clone)]
pub struct ExecutionRequest {
    pub runtime: Runtime,
    pub handler: String,
    pub code_dir: PathBuf,
    pub payload: Bytes,
    pub environment: Vec<(String, String)>,
    pub timeout: Duration,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionOutcome {
    /// The handler returned this value
    Returned(Value),
    /// The handler raised; the value is the Lambda error document
    Raised(Value),
    TimedOut,
}

#[derive(Debug, Clone)]
pub struct ExecutionOutput {
    pub outcome: ExecutionOutcome,
    pub log_lines: Vec<String>,
    pub duration: Duration,
}

#[async_trait]
pub trait Executor: Send + Sync {
    async fn execute(&self, request: ExecutionRequest) -> Result<ExecutionOutput, ExecutorError>;
}

#[derive(Deserialize)]
struct BootstrapResult {
    ok: bool,
    #[serde(default)]
    payload: Value,
}

/// Runs Python handlers in a child interpreter
#[derive(Debug, Clone)]
pub struct SubprocessExecutor {
    interpreter: String,
}

impl Default for SubprocessExecutor {
    fn default() -> Self {
        Self::new("python3")
    }
}

impl SubprocessExecutor {
    pub fn new(interpreter: impl Into<String>) -> Self {
        Self {
            interpreter: interpreter.into(),
        }
    }

    /// Check if the interpreter can be started
    pub async fn is_available(&self) -> bool {
        match Command::new(&self.interpreter).arg("--version").output().await {
            Ok(output) => output.status.success(),
            Err(_) => false,
        }
    }
}

#[async_trait]
impl Executor for SubprocessExecutor {
    async fn execute(&self, request: ExecutionRequest) -> Result<ExecutionOutput, ExecutorError> {
        if !request.runtime.is_python() {
            return Err(ExecutorError::UnsupportedRuntime(
                request.runtime.as_str().to_string(),
            ));
        }

        let scratch = tempfile::Builder::new()
            .prefix("mockstack-result-")
            .tempfile()?;
        let started = Instant::now();

        let mut child = Command::new(&self.interpreter)
            .arg("-u")
            .arg("-c")
            .arg(BOOTSTRAP)
            .arg(&request.code_dir)
            .arg(&request.handler)
            .arg(scratch.path())
            .current_dir(&request.code_dir)
            .envs(request.environment.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| ExecutorError::Spawn {
                interpreter: self.interpreter.clone(),
                source,
            })?;

        if let Some(mut stdin) = child.stdin.take() {
            // A handler that exits before reading its event closes the pipe early
            if let Err(e) = stdin.write_all(&request.payload).await {
                debug!(error = %e, "Failed to write event to handler stdin");
            }
        }

        let output = match tokio::time::timeout(request.timeout, child.wait_with_output()).await {
            Ok(output) => output?,
            Err(_) => {
                warn!(
                    handler = %request.handler,
                    timeout_ms = request.timeout.as_millis() as u64,
                    "Handler timed out"
                );
                return Ok(ExecutionOutput {
                    outcome: ExecutionOutcome::TimedOut,
                    log_lines: Vec::new(),
                    duration: started.elapsed(),
                });
            }
        };
        let duration = started.elapsed();

        let mut log_lines: Vec<String> = String::from_utf8_lossy(&output.stdout)
            .lines()
            .map(str::to_string)
            .collect();
        log_lines.extend(
            String::from_utf8_lossy(&output.stderr)
                .lines()
                .map(str::to_string),
        );

        let result = tokio::fs::read(scratch.path()).await?;
        let outcome = if result.is_empty() {
            ExecutionOutcome::Raised(json!({
                "errorType": "Runtime.ExitError",
                "errorMessage": format!("Runtime exited with error: {}", output.status),
            }))
        } else {
            let result: BootstrapResult = serde_json::from_slice(&result)
                .map_err(|e| ExecutorError::MalformedResult(e.to_string()))?;
            if result.ok {
                ExecutionOutcome::Returned(result.payload)
            } else {
                ExecutionOutcome::Raised(result.payload)
            }
        };

        debug!(
            handler = %request.handler,
            status = %output.status,
            duration_ms = duration.as_millis() as u64,
            "Handler finished"
        );

        Ok(ExecutionOutput {
            outcome,
            log_lines,
            duration,
        })
    }
}
