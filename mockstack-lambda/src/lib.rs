//! Lambda implementation for MockStack
//!
//! Functions run through an [`Executor`]; the default [`SubprocessExecutor`]
//! starts a host Python interpreter per invocation inside a warm, extracted
//! copy of the deployment package. Output is delivered to CloudWatch Logs.

pub mod executor;
pub mod function;
pub mod handlers;
pub mod invocation;
pub mod package;
pub mod service;

pub use executor::{Executor, ExecutorError, SubprocessExecutor};
pub use function::{Function, FunctionConfig, Runtime};
pub use handlers::{router, LambdaState};
pub use invocation::{InvocationResult, InvocationType, LogType};
pub use package::{DeploymentPackage, PackageError};
pub use service::{LambdaService, LambdaServiceError};
