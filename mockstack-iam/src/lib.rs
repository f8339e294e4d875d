//! AWS IAM emulation for MockStack
//!
//! Provides IAM roles with trust policies. Permissions are not enforced;
//! trust policies are only consulted when a service assumes a role.

pub mod handlers;
pub mod policy;
mod storage;

pub use handlers::handle_request;
pub use policy::TrustPolicy;
pub use storage::{IamError, IamState, IamStorage, Role};
