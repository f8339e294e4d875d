//! AWS authentication for MockStack
//!
//! Reads AWS Signature Version 4 headers to scope each request to an
//! account and region.

pub mod context;
pub mod sigv4;

pub use context::{CallerContext, ScopeDefaults};
pub use sigv4::{parse_authorization_header, AuthorizationHeader, SigV4Error};
