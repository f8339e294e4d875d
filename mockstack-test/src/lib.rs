//! Test utilities for MockStack
//!
//! Provides utilities for integration testing against MockStack:
//! - Run the full router in-process on a random port
//! - Build AWS SDK configuration pointed at it
//! - Locate fixture files shipped with this crate
//!
//! ## Usage
//!
//! ```rust,no_run
//! use mockstack_test::MockAws;
//!
//! #[tokio::test]
//! async fn test_lambda() {
//!     let aws = MockAws::start().await.unwrap();
//!     let config = aws.sdk_config("eu-west-1").await;
//!     let lambda = aws_sdk_lambda::Client::new(&config);
//!     // The server shuts down when `aws` is dropped
//! }
//! ```

pub mod fixtures;
pub mod server;

pub use fixtures::{fixture_path, init_tracing, lambda_trust_policy, read_fixture};
pub use server::{MockAws, TestError};
