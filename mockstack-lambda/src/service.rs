//! Lambda service implementation

use bytes::Bytes;
use chrono::{SecondsFormat, Utc};
use dashmap::{mapref::entry::Entry, DashMap};
use mockstack_core::{AccountRegionKey, RequestId, StateStore};
use mockstack_iam::IamStorage;
use mockstack_logs::LogsStorage;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use tempfile::TempDir;
use thiserror::Error;
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::executor::{ExecutionOutcome, ExecutionRequest, Executor};
use crate::function::{Function, FunctionConfig, FunctionState, Runtime, LATEST_VERSION};
use crate::invocation::{InvocationError, InvocationResult, InvocationType, LambdaContext, LogType};
use crate::package::{DeploymentPackage, PackageError};

static FUNCTION_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-zA-Z0-9_-]{1,64}$").expect("valid function name pattern"));

static ROLE_ARN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^arn:aws[a-zA-Z-]*:iam::\d{12}:role/\S+$").expect("valid role ARN pattern")
});

/// Service principal Lambda assumes execution roles as
const LAMBDA_PRINCIPAL: &str = "lambda.amazonaws.com";

#[derive(Debug, Error)]
pub enum LambdaServiceError {
    #[error("Function already exist: {0}")]
    FunctionExists(String),

    #[error("Function not found: {0}")]
    FunctionNotFound(String),

    #[error("Value '{0}' at 'runtime' failed to satisfy constraint: Member must satisfy enum value set")]
    InvalidRuntime(String),

    #[error("Value '{0}' at 'handler' failed to satisfy constraint: Member must be of the form module.function")]
    InvalidHandler(String),

    #[error("The role defined for the function cannot be assumed by Lambda.")]
    InvalidRole(String),

    #[error("{0}")]
    InvalidParameter(String),

    #[error(transparent)]
    Package(#[from] PackageError),

    #[error(transparent)]
    Invocation(#[from] InvocationError),
}

/// Optional changes applied by UpdateFunctionConfiguration
#[derive(Debug, Clone, Default)]
pub struct FunctionConfigUpdate {
    pub description: Option<String>,
    pub handler: Option<String>,
    pub memory_size: Option<i32>,
    pub role: Option<String>,
    pub runtime: Option<Runtime>,
    pub timeout: Option<i32>,
    pub environment: Option<HashMap<String, String>>,
}

#[derive(Default)]
struct RegionFunctions {
    functions: DashMap<String, Arc<Function>>,
}

/// Warm sandbox for one function: the extracted package and the log stream
/// every invocation in it writes to
struct ExecutionEnvironment {
    code_dir: TempDir,
    code_sha256: String,
    log_stream_name: String,
}

impl ExecutionEnvironment {
    fn create(package: DeploymentPackage, code_sha256: String) -> Result<Self, PackageError> {
        let code_dir = tempfile::Builder::new()
            .prefix("mockstack-lambda-")
            .tempdir()?;
        package.extract_to(code_dir.path())?;

        let log_stream_name = format!(
            "{}/[{}]{}",
            Utc::now().format("%Y/%m/%d"),
            LATEST_VERSION,
            Uuid::new_v4().simple()
        );

        Ok(Self {
            code_dir,
            code_sha256,
            log_stream_name,
        })
    }
}

type EnvironmentKey = (AccountRegionKey, String);

/// Lambda service managing functions and invocations
pub struct LambdaService {
    functions: StateStore<RegionFunctions>,
    environments: DashMap<EnvironmentKey, Arc<ExecutionEnvironment>>,
    iam: Arc<IamStorage>,
    logs: Arc<LogsStorage>,
    executor: Arc<dyn Executor>,
}

impl LambdaService {
    pub fn new(iam: Arc<IamStorage>, logs: Arc<LogsStorage>, executor: Arc<dyn Executor>) -> Self {
        Self {
            functions: StateStore::new(),
            environments: DashMap::new(),
            iam,
            logs,
            executor,
        }
    }

    /// Create a new function
    pub fn create_function(
        &self,
        scope: &AccountRegionKey,
        config: FunctionConfig,
        package: DeploymentPackage,
    ) -> Result<Arc<Function>, LambdaServiceError> {
        if !FUNCTION_NAME.is_match(&config.function_name) {
            return Err(LambdaServiceError::InvalidParameter(format!(
                "Value '{}' at 'functionName' failed to satisfy constraint: Member must satisfy regular expression pattern: [a-zA-Z0-9-_]+",
                config.function_name
            )));
        }
        self.validate_config(&config)?;

        let region = self.functions.get_or_create(scope);
        let created = match region.functions.entry(config.function_name.clone()) {
            Entry::Occupied(_) => Err(LambdaServiceError::FunctionExists(config.function_name)),
            Entry::Vacant(slot) => {
                let function = Arc::new(Function::new(scope, config, package));
                slot.insert(function.clone());

                info!(
                    function_name = %function.config.function_name,
                    runtime = %function.config.runtime.as_str(),
                    arn = %function.arn,
                    "Created function"
                );
                Ok(function)
            }
        };
        created
    }

    /// Get a function by name or ARN
    pub fn get_function(
        &self,
        scope: &AccountRegionKey,
        name: &str,
    ) -> Result<Arc<Function>, LambdaServiceError> {
        let name = resolve_function_name(name);
        self.functions
            .get(scope)
            .and_then(|region| region.functions.get(name).map(|f| f.clone()))
            .ok_or_else(|| not_found(scope, name))
    }

    /// List functions, sorted by name
    pub fn list_functions(&self, scope: &AccountRegionKey) -> Vec<Arc<Function>> {
        let Some(region) = self.functions.get(scope) else {
            return Vec::new();
        };

        let mut functions: Vec<Arc<Function>> =
            region.functions.iter().map(|r| r.value().clone()).collect();
        functions.sort_by(|a, b| a.config.function_name.cmp(&b.config.function_name));
        functions
    }

    /// Delete a function and its execution environment
    pub fn delete_function(&self, scope: &AccountRegionKey, name: &str) -> Result<(), LambdaServiceError> {
        let name = resolve_function_name(name);
        self.functions
            .get(scope)
            .and_then(|region| region.functions.remove(name))
            .ok_or_else(|| not_found(scope, name))?;

        self.environments.remove(&(scope.clone(), name.to_string()));
        info!(function_name = %name, "Deleted function");
        Ok(())
    }

    pub fn update_function_code(
        &self,
        scope: &AccountRegionKey,
        name: &str,
        package: DeploymentPackage,
    ) -> Result<Arc<Function>, LambdaServiceError> {
        let name = resolve_function_name(name);
        let region = self
            .functions
            .get(scope)
            .ok_or_else(|| not_found(scope, name))?;
        let mut slot = region
            .functions
            .get_mut(name)
            .ok_or_else(|| not_found(scope, name))?;

        let updated = Arc::new(slot.with_package(package));
        *slot = updated.clone();
        drop(slot);

        // The next invocation extracts the new code into a fresh environment
        self.environments.remove(&(scope.clone(), name.to_string()));

        info!(function_name = %name, code_sha256 = %updated.code_sha256, "Updated function code");
        Ok(updated)
    }

    pub fn update_function_configuration(
        &self,
        scope: &AccountRegionKey,
        name: &str,
        update: FunctionConfigUpdate,
    ) -> Result<Arc<Function>, LambdaServiceError> {
        let name = resolve_function_name(name);
        let region = self
            .functions
            .get(scope)
            .ok_or_else(|| not_found(scope, name))?;
        let mut slot = region
            .functions
            .get_mut(name)
            .ok_or_else(|| not_found(scope, name))?;

        let mut config = slot.config.clone();
        if let Some(description) = update.description {
            config.description = Some(description);
        }
        if let Some(handler) = update.handler {
            config.handler = handler;
        }
        if let Some(memory_size) = update.memory_size {
            config.memory_size = memory_size;
        }
        if let Some(role) = update.role {
            config.role = role;
        }
        if let Some(runtime) = update.runtime {
            config.runtime = runtime;
        }
        if let Some(timeout) = update.timeout {
            config.timeout = timeout;
        }
        if let Some(environment) = update.environment {
            config.environment = environment;
        }
        self.validate_config(&config)?;

        let updated = Arc::new(slot.with_config(config));
        *slot = updated.clone();

        info!(function_name = %name, "Updated function configuration");
        Ok(updated)
    }

    /// Invoke a function
    pub async fn invoke(
        self: &Arc<Self>,
        scope: &AccountRegionKey,
        name: &str,
        payload: Bytes,
        invocation_type: InvocationType,
        log_type: LogType,
    ) -> Result<InvocationResult, LambdaServiceError> {
        let function = self.get_function(scope, name)?;

        if function.state != FunctionState::Active {
            return Err(InvocationError::FunctionNotActive(function.state).into());
        }
        if !payload.is_empty() {
            serde_json::from_slice::<serde_json::Value>(&payload)
                .map_err(|e| InvocationError::InvalidPayload(e.to_string()))?;
        }

        match invocation_type {
            InvocationType::DryRun => Ok(InvocationResult::dry_run(function.version.clone())),
            InvocationType::Event => {
                let service = Arc::clone(self);
                let scope = scope.clone();
                tokio::spawn(async move {
                    if let Err(e) = service.run(&scope, &function, payload).await {
                        error!(
                            function_name = %function.config.function_name,
                            error = %e,
                            "Asynchronous invocation failed"
                        );
                    }
                });
                Ok(InvocationResult::accepted())
            }
            InvocationType::RequestResponse => {
                let (result, lines) = self.run(scope, &function, payload).await?;
                Ok(match log_type {
                    LogType::Tail => result.with_log_tail(&lines),
                    LogType::None => result,
                })
            }
        }
    }

    /// Run the handler once and deliver its log lines
    async fn run(
        &self,
        scope: &AccountRegionKey,
        function: &Function,
        payload: Bytes,
    ) -> Result<(InvocationResult, Vec<String>), LambdaServiceError> {
        let environment = self.environment(scope, function).await?;
        let request_id = RequestId::new();
        let context = LambdaContext::new(
            function,
            request_id.as_str(),
            &environment.log_stream_name,
            &scope.region,
            Utc::now(),
        );
        let timeout = LambdaContext::timeout(function);

        let request = ExecutionRequest {
            runtime: function.config.runtime,
            handler: function.config.handler.clone(),
            code_dir: environment.code_dir.path().to_path_buf(),
            payload,
            environment: context.env_vars(function),
            timeout,
        };

        let output = self
            .executor
            .execute(request)
            .await
            .map_err(InvocationError::from)?;

        let mut lines = vec![format!(
            "START RequestId: {} Version: {}",
            request_id, function.version
        )];
        lines.extend(output.log_lines);

        let version = function.version.clone();
        let result = match output.outcome {
            ExecutionOutcome::Returned(value) => {
                InvocationResult::success(Bytes::from(value.to_string()), version)
            }
            ExecutionOutcome::Raised(error) => {
                InvocationResult::unhandled_error(Bytes::from(error.to_string()), version)
            }
            ExecutionOutcome::TimedOut => {
                let message = format!(
                    "Task timed out after {:.2} seconds",
                    timeout.as_secs_f64()
                );
                lines.push(format!(
                    "{} {} {}",
                    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
                    request_id,
                    message
                ));
                let error = json!({
                    "errorType": "Sandbox.Timedout",
                    "errorMessage": format!("RequestId: {} Error: {}", request_id, message),
                });
                InvocationResult::unhandled_error(Bytes::from(error.to_string()), version)
            }
        };

        let duration_ms = output.duration.as_secs_f64() * 1000.0;
        lines.push(format!("END RequestId: {}", request_id));
        lines.push(format!(
            "REPORT RequestId: {}\tDuration: {:.2} ms\tBilled Duration: {} ms\tMemory Size: {} MB",
            request_id,
            duration_ms,
            duration_ms.ceil() as u64,
            function.config.memory_size
        ));

        self.logs.append(
            scope,
            &function.log_group_name(),
            &environment.log_stream_name,
            lines.clone(),
        );

        info!(
            function_name = %function.config.function_name,
            request_id = %request_id,
            function_error = ?result.function_error,
            duration_ms = duration_ms as u64,
            "Invoked function"
        );

        Ok((result, lines))
    }

    /// Get the warm environment for a function, creating it on first use or
    /// after the code changed
    async fn environment(
        &self,
        scope: &AccountRegionKey,
        function: &Function,
    ) -> Result<Arc<ExecutionEnvironment>, LambdaServiceError> {
        let key = (scope.clone(), function.config.function_name.clone());

        let existing = self.environments.get(&key).map(|e| e.clone());
        if let Some(environment) = existing {
            if environment.code_sha256 == function.code_sha256 {
                return Ok(environment);
            }
        }

        let package = function.package.clone();
        let code_sha256 = function.code_sha256.clone();
        let fresh = tokio::task::spawn_blocking(move || ExecutionEnvironment::create(package, code_sha256))
            .await
            .map_err(|e| InvocationError::Task(e.to_string()))?
            .map_err(InvocationError::from)?;
        let fresh = Arc::new(fresh);

        // Code replaced while this environment was being built: run the
        // stale invocation in it but keep it out of the cache
        let latest = self
            .get_function(scope, &function.config.function_name)
            .map(|f| f.code_sha256.clone())
            .ok();
        if latest.as_deref() != Some(fresh.code_sha256.as_str()) {
            debug!(
                function_name = %function.config.function_name,
                "Code changed during cold start, environment not cached"
            );
            return Ok(fresh);
        }

        // Concurrent cold starts settle on whichever environment lands first
        let environment = self
            .environments
            .entry(key)
            .and_modify(|current| {
                if current.code_sha256 != fresh.code_sha256 {
                    *current = fresh.clone();
                }
            })
            .or_insert_with(|| fresh.clone())
            .clone();

        debug!(
            function_name = %function.config.function_name,
            log_stream = %environment.log_stream_name,
            code_dir = %environment.code_dir.path().display(),
            "Execution environment ready"
        );

        Ok(environment)
    }

    fn validate_config(&self, config: &FunctionConfig) -> Result<(), LambdaServiceError> {
        validate_handler(config.runtime, &config.handler)?;

        if !(128..=10240).contains(&config.memory_size) {
            return Err(LambdaServiceError::InvalidParameter(format!(
                "Value '{}' at 'memorySize' failed to satisfy constraint: Member must have value between 128 and 10240",
                config.memory_size
            )));
        }
        if !(1..=900).contains(&config.timeout) {
            return Err(LambdaServiceError::InvalidParameter(format!(
                "Value '{}' at 'timeout' failed to satisfy constraint: Member must have value between 1 and 900",
                config.timeout
            )));
        }

        if !ROLE_ARN.is_match(&config.role) {
            return Err(LambdaServiceError::InvalidParameter(format!(
                "Value '{}' at 'role' failed to satisfy constraint: Member must satisfy regular expression pattern: arn:aws:iam::\\d{{12}}:role/?[a-zA-Z_0-9+=,.@\\-_/]+",
                config.role
            )));
        }

        let trusted = self
            .iam
            .find_role_by_arn(&config.role)
            .is_some_and(|role| role.trusts_service(LAMBDA_PRINCIPAL));
        if !trusted {
            debug!(role = %config.role, "Role missing or not assumable by Lambda");
            return Err(LambdaServiceError::InvalidRole(config.role.clone()));
        }

        Ok(())
    }
}

fn validate_handler(runtime: Runtime, handler: &str) -> Result<(), LambdaServiceError> {
    let well_formed = !handler.is_empty()
        && handler.len() <= 128
        && !handler.chars().any(char::is_whitespace);

    let python_ok = !runtime.is_python()
        || handler
            .rsplit_once('.')
            .is_some_and(|(module, function)| !module.is_empty() && !function.is_empty());

    if well_formed && python_ok {
        Ok(())
    } else {
        Err(LambdaServiceError::InvalidHandler(handler.to_string()))
    }
}

/// Accept a bare name, a partial ARN or a full (optionally qualified) ARN
fn resolve_function_name(name: &str) -> &str {
    match name.split_once(":function:") {
        Some((_, rest)) => rest.split(':').next().unwrap_or(rest),
        None => name,
    }
}

fn not_found(scope: &AccountRegionKey, name: &str) -> LambdaServiceError {
    LambdaServiceError::FunctionNotFound(scope.arn("lambda", &format!("function:{}", name)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::{ExecutionOutput, ExecutorError};
    use async_trait::async_trait;
    use mockstack_logs::{DescribeStreamsQuery, GetEventsQuery};
    use std::time::Duration;

    const TRUST: &str = r#"{"Version":"2012-10-17","Statement":[{"Effect":"Allow","Principal":{"Service":"lambda.amazonaws.com"},"Action":"sts:AssumeRole"}]}"#;
    const EC2_TRUST: &str = r#"{"Version":"2012-10-17","Statement":[{"Effect":"Allow","Principal":{"Service":"ec2.amazonaws.com"},"Action":"sts:AssumeRole"}]}"#;

    /// Prints one line and echoes the event, or times out / raises on request
    struct FakeExecutor;

    #[async_trait]
    impl Executor for FakeExecutor {
        async fn execute(&self, request: ExecutionRequest) -> Result<ExecutionOutput, ExecutorError> {
            let event: serde_json::Value =
                serde_json::from_slice(&request.payload).unwrap_or(serde_json::Value::Null);
            let outcome = match event["mode"].as_str() {
                Some("timeout") => ExecutionOutcome::TimedOut,
                Some("raise") => ExecutionOutcome::Raised(json!({"errorType": "ValueError", "errorMessage": "boom"})),
                _ => ExecutionOutcome::Returned(json!({"statusCode": 200, "echo": event})),
            };
            assert!(request.code_dir.join("handler.py").exists());
            Ok(ExecutionOutput {
                outcome,
                log_lines: vec!["log message".to_string()],
                duration: Duration::from_millis(3),
            })
        }
    }

    fn scope() -> AccountRegionKey {
        AccountRegionKey::new("000000000000", "eu-west-1")
    }

    fn service() -> (Arc<LambdaService>, Arc<LogsStorage>, String) {
        let iam = Arc::new(IamStorage::new());
        let role = iam.create_role("test-iam-role", TRUST, None, None).unwrap();
        let logs = Arc::new(LogsStorage::new());
        let service = Arc::new(LambdaService::new(iam, logs.clone(), Arc::new(FakeExecutor)));
        (service, logs, role.arn)
    }

    fn config(name: &str, role: &str) -> FunctionConfig {
        FunctionConfig {
            function_name: name.to_string(),
            runtime: Runtime::Python310,
            handler: "handler.lambda_handler".to_string(),
            role: role.to_string(),
            ..Default::default()
        }
    }

    fn package() -> DeploymentPackage {
        DeploymentPackage::from_entry("handler.py", b"def lambda_handler(event, context):\n    pass\n")
            .unwrap()
    }

    fn messages(logs: &LogsStorage, group: &str) -> Vec<String> {
        let streams = logs
            .describe_log_streams(&scope(), group, &DescribeStreamsQuery::default())
            .unwrap();
        assert_eq!(streams.len(), 1);
        logs.get_log_events(&scope(), group, &streams[0].log_stream_name, &GetEventsQuery::default())
            .unwrap()
            .events
            .into_iter()
            .map(|e| e.message)
            .collect()
    }

    #[test]
    fn test_create_and_get_function() {
        let (service, _, role) = service();

        let function = service
            .create_function(&scope(), config("test-function", &role), package())
            .unwrap();
        assert_eq!(function.config.function_name, "test-function");
        assert_eq!(
            function.arn,
            "arn:aws:lambda:eu-west-1:000000000000:function:test-function"
        );

        let retrieved = service.get_function(&scope(), "test-function").unwrap();
        assert_eq!(retrieved.code_sha256, function.code_sha256);

        let by_arn = service.get_function(&scope(), &function.arn).unwrap();
        assert_eq!(by_arn.config.function_name, "test-function");

        let other_region = AccountRegionKey::new("000000000000", "us-east-1");
        assert!(matches!(
            service.get_function(&other_region, "test-function"),
            Err(LambdaServiceError::FunctionNotFound(_))
        ));
    }

    #[test]
    fn test_duplicate_function() {
        let (service, _, role) = service();
        service.create_function(&scope(), config("dup", &role), package()).unwrap();

        let result = service.create_function(&scope(), config("dup", &role), package());
        assert!(matches!(result, Err(LambdaServiceError::FunctionExists(_))));
    }

    #[test]
    fn test_role_must_exist_and_trust_lambda() {
        let (service, _, _) = service();

        let missing = service.create_function(
            &scope(),
            config("fn", "arn:aws:iam::000000000000:role/missing"),
            package(),
        );
        assert!(matches!(missing, Err(LambdaServiceError::InvalidRole(_))));

        let ec2_role = service
            .iam
            .create_role("ec2-role", EC2_TRUST, None, None)
            .unwrap();
        let untrusted = service.create_function(&scope(), config("fn", &ec2_role.arn), package());
        assert!(matches!(untrusted, Err(LambdaServiceError::InvalidRole(_))));

        let malformed = service.create_function(&scope(), config("fn", "not-an-arn"), package());
        assert!(matches!(malformed, Err(LambdaServiceError::InvalidParameter(_))));
    }

    #[test]
    fn test_handler_and_limits_validated() {
        let (service, _, role) = service();

        let mut bad_handler = config("fn", &role);
        bad_handler.handler = "no_dot".to_string();
        assert!(matches!(
            service.create_function(&scope(), bad_handler, package()),
            Err(LambdaServiceError::InvalidHandler(_))
        ));

        let mut bad_timeout = config("fn", &role);
        bad_timeout.timeout = 0;
        assert!(matches!(
            service.create_function(&scope(), bad_timeout, package()),
            Err(LambdaServiceError::InvalidParameter(_))
        ));

        assert!(matches!(
            service.create_function(&scope(), config("bad name", &role), package()),
            Err(LambdaServiceError::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_update_and_delete() {
        let (service, _, role) = service();
        let original = service.create_function(&scope(), config("fn", &role), package()).unwrap();

        let updated = service
            .update_function_configuration(
                &scope(),
                "fn",
                FunctionConfigUpdate {
                    timeout: Some(30),
                    description: Some("updated".to_string()),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(updated.config.timeout, 30);
        assert_eq!(updated.config.description.as_deref(), Some("updated"));

        let new_code = DeploymentPackage::from_entry("handler.py", b"# new\n").unwrap();
        let recoded = service.update_function_code(&scope(), "fn", new_code).unwrap();
        assert_ne!(recoded.code_sha256, original.code_sha256);
        assert_eq!(recoded.config.timeout, 30);

        service.delete_function(&scope(), "fn").unwrap();
        assert!(service.list_functions(&scope()).is_empty());
        assert!(matches!(
            service.delete_function(&scope(), "fn"),
            Err(LambdaServiceError::FunctionNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_invocations_share_one_stream() {
        let (service, logs, role) = service();
        service.create_function(&scope(), config("fn", &role), package()).unwrap();

        for _ in 0..3 {
            let result = service
                .invoke(&scope(), "fn", Bytes::from_static(b"{}"), InvocationType::RequestResponse, LogType::None)
                .await
                .unwrap();
            assert_eq!(result.status_code, 200);
            assert!(result.function_error.is_none());
            let payload: serde_json::Value = serde_json::from_slice(&result.payload.unwrap()).unwrap();
            assert_eq!(payload["statusCode"], 200);
        }

        let messages = messages(&logs, "/aws/lambda/fn");
        assert_eq!(messages.iter().filter(|m| *m == "log message").count(), 3);
        assert_eq!(messages.iter().filter(|m| m.starts_with("START RequestId: ")).count(), 3);
        assert!(messages.last().unwrap().starts_with("REPORT RequestId: "));
    }

    #[tokio::test]
    async fn test_new_code_gets_new_stream() {
        let (service, logs, role) = service();
        service.create_function(&scope(), config("fn", &role), package()).unwrap();

        service
            .invoke(&scope(), "fn", Bytes::new(), InvocationType::RequestResponse, LogType::None)
            .await
            .unwrap();
        let new_code = DeploymentPackage::from_entry("handler.py", b"# v2\n").unwrap();
        service.update_function_code(&scope(), "fn", new_code).unwrap();
        service
            .invoke(&scope(), "fn", Bytes::new(), InvocationType::RequestResponse, LogType::None)
            .await
            .unwrap();

        let streams = logs
            .describe_log_streams(&scope(), "/aws/lambda/fn", &DescribeStreamsQuery::default())
            .unwrap();
        assert_eq!(streams.len(), 2);
        assert!(streams[0].log_stream_name.contains("/[$LATEST]"));
    }

    #[tokio::test]
    async fn test_stale_cold_start_keeps_current_environment() {
        let (service, logs, role) = service();
        service.create_function(&scope(), config("fn", &role), package()).unwrap();
        let stale = service.get_function(&scope(), "fn").unwrap();

        let new_code = DeploymentPackage::from_entry("handler.py", b"# v2\n").unwrap();
        let current = service.update_function_code(&scope(), "fn", new_code).unwrap();
        service
            .invoke(&scope(), "fn", Bytes::new(), InvocationType::RequestResponse, LogType::None)
            .await
            .unwrap();

        let environment = service.environment(&scope(), &stale).await.unwrap();
        assert_eq!(environment.code_sha256, stale.code_sha256);

        let key = (scope(), "fn".to_string());
        let cached = service.environments.get(&key).map(|e| e.code_sha256.clone());
        assert_eq!(cached.as_deref(), Some(current.code_sha256.as_str()));

        service
            .invoke(&scope(), "fn", Bytes::new(), InvocationType::RequestResponse, LogType::None)
            .await
            .unwrap();
        let messages = messages(&logs, "/aws/lambda/fn");
        assert_eq!(messages.iter().filter(|m| *m == "log message").count(), 2);
    }

    #[tokio::test]
    async fn test_errors_and_timeouts() {
        let (service, logs, role) = service();
        service.create_function(&scope(), config("fn", &role), package()).unwrap();

        let raised = service
            .invoke(
                &scope(),
                "fn",
                Bytes::from_static(br#"{"mode": "raise"}"#),
                InvocationType::RequestResponse,
                LogType::Tail,
            )
            .await
            .unwrap();
        assert_eq!(raised.function_error.as_deref(), Some("Unhandled"));
        assert!(raised.log_result.is_some());

        let timed_out = service
            .invoke(
                &scope(),
                "fn",
                Bytes::from_static(br#"{"mode": "timeout"}"#),
                InvocationType::RequestResponse,
                LogType::None,
            )
            .await
            .unwrap();
        let payload: serde_json::Value = serde_json::from_slice(&timed_out.payload.unwrap()).unwrap();
        assert_eq!(payload["errorType"], "Sandbox.Timedout");
        assert!(payload["errorMessage"]
            .as_str()
            .unwrap()
            .ends_with("Task timed out after 3.00 seconds"));

        let messages = messages(&logs, "/aws/lambda/fn");
        assert!(messages.iter().any(|m| m.ends_with("Task timed out after 3.00 seconds")));
    }

    #[tokio::test]
    async fn test_invocation_types() {
        let (service, _, role) = service();
        service.create_function(&scope(), config("fn", &role), package()).unwrap();

        let dry_run = service
            .invoke(&scope(), "fn", Bytes::new(), InvocationType::DryRun, LogType::None)
            .await
            .unwrap();
        assert_eq!(dry_run.status_code, 204);

        let event = service
            .invoke(&scope(), "fn", Bytes::new(), InvocationType::Event, LogType::None)
            .await
            .unwrap();
        assert_eq!(event.status_code, 202);

        let bad_payload = service
            .invoke(&scope(), "fn", Bytes::from_static(b"{"), InvocationType::RequestResponse, LogType::None)
            .await;
        assert!(matches!(
            bad_payload,
            Err(LambdaServiceError::Invocation(InvocationError::InvalidPayload(_)))
        ));

        let missing = service
            .invoke(&scope(), "missing", Bytes::new(), InvocationType::RequestResponse, LogType::None)
            .await;
        assert!(matches!(missing, Err(LambdaServiceError::FunctionNotFound(_))));
    }

    #[test]
    fn test_resolve_function_name() {
        assert_eq!(resolve_function_name("fn"), "fn");
        assert_eq!(
            resolve_function_name("arn:aws:lambda:eu-west-1:000000000000:function:fn"),
            "fn"
        );
        assert_eq!(
            resolve_function_name("arn:aws:lambda:eu-west-1:000000000000:function:fn:$LATEST"),
            "fn"
        );
        assert_eq!(resolve_function_name("000000000000:function:fn"), "fn");
    }
}
