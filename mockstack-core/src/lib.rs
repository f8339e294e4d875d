//! Core types and traits for MockStack
//!
//! This crate provides common types used across all MockStack services.

pub mod account;
pub mod error;
pub mod request_id;

pub use account::{AccountRegionKey, StateStore, DEFAULT_ACCOUNT_ID, DEFAULT_REGION};
pub use error::{AwsError, ErrorCode};
pub use request_id::RequestId;
