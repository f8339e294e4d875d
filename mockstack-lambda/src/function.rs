//! Lambda function models

use chrono::{DateTime, Utc};
use mockstack_core::AccountRegionKey;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::package::DeploymentPackage;

/// Version every invocation runs against
pub const LATEST_VERSION: &str = "$LATEST";

/// Supported Lambda runtimes
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Runtime {
    #[serde(rename = "python3.9")]
    Python39,
    #[serde(rename = "python3.10")]
    Python310,
    #[serde(rename = "python3.11")]
    Python311,
    #[serde(rename = "python3.12")]
    Python312,
    #[serde(rename = "python3.13")]
    Python313,
    #[serde(rename = "nodejs18.x")]
    Nodejs18,
    #[serde(rename = "nodejs20.x")]
    Nodejs20,
    #[serde(rename = "provided.al2")]
    ProvidedAl2,
    #[serde(rename = "provided.al2023")]
    ProvidedAl2023,
}

impl Runtime {
    pub const ALL: [Runtime; 9] = [
        Self::Python39,
        Self::Python310,
        Self::Python311,
        Self::Python312,
        Self::Python313,
        Self::Nodejs18,
        Self::Nodejs20,
        Self::ProvidedAl2,
        Self::ProvidedAl2023,
    ];

    /// Parse runtime string
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|r| r.as_str() == s)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Python39 => "python3.9",
            Self::Python310 => "python3.10",
            Self::Python311 => "python3.11",
            Self::Python312 => "python3.12",
            Self::Python313 => "python3.13",
            Self::Nodejs18 => "nodejs18.x",
            Self::Nodejs20 => "nodejs20.x",
            Self::ProvidedAl2 => "provided.al2",
            Self::ProvidedAl2023 => "provided.al2023",
        }
    }

    pub fn is_python(&self) -> bool {
        matches!(
            self,
            Self::Python39 | Self::Python310 | Self::Python311 | Self::Python312 | Self::Python313
        )
    }
}

/// Function configuration
#[derive(Debug, Clone)]
pub struct FunctionConfig {
    pub function_name: String,
    pub runtime: Runtime,
    pub handler: String,
    pub role: String,
    pub memory_size: i32,
    pub timeout: i32,
    pub environment: HashMap<String, String>,
    pub description: Option<String>,
}

impl Default for FunctionConfig {
    fn default() -> Self {
        Self {
            function_name: String::new(),
            runtime: Runtime::Python312,
            handler: "lambda_function.lambda_handler".to_string(),
            role: "arn:aws:iam::000000000000:role/lambda-role".to_string(),
            memory_size: 128,
            timeout: 3,
            environment: HashMap::new(),
            description: None,
        }
    }
}

/// Lambda function state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FunctionState {
    Pending,
    Active,
    Inactive,
    Failed,
}

/// A Lambda function
///
/// Functions are immutable once stored; updates replace the stored `Arc`.
#[derive(Debug, Clone)]
pub struct Function {
    pub config: FunctionConfig,
    pub package: DeploymentPackage,
    pub code_sha256: String,
    pub code_size: i64,
    pub state: FunctionState,
    pub last_modified: DateTime<Utc>,
    pub version: String,
    pub arn: String,
}

impl Function {
    /// Create a new function owned by `scope`
    pub fn new(scope: &AccountRegionKey, config: FunctionConfig, package: DeploymentPackage) -> Self {
        let arn = scope.arn("lambda", &format!("function:{}", config.function_name));

        Self {
            code_sha256: package.sha256_base64(),
            code_size: package.len() as i64,
            config,
            package,
            state: FunctionState::Active,
            last_modified: Utc::now(),
            version: LATEST_VERSION.to_string(),
            arn,
        }
    }

    /// Get function ARN
    pub fn arn(&self) -> &str {
        &self.arn
    }

    /// Get qualified ARN (with version/alias)
    pub fn qualified_arn(&self) -> String {
        format!("{}:{}", self.arn, self.version)
    }

    /// Log group that receives this function's output
    pub fn log_group_name(&self) -> String {
        format!("/aws/lambda/{}", self.config.function_name)
    }

    /// Copy of this function with new code
    pub fn with_package(&self, package: DeploymentPackage) -> Self {
        Self {
            code_sha256: package.sha256_base64(),
            code_size: package.len() as i64,
            package,
            last_modified: Utc::now(),
            ..self.clone()
        }
    }

    /// Copy of this function with a new configuration
    pub fn with_config(&self, config: FunctionConfig) -> Self {
        Self {
            config,
            last_modified: Utc::now(),
            ..self.clone()
        }
    }
}
