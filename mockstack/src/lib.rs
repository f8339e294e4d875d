//! MockStack - local AWS emulator for IAM, Lambda and CloudWatch Logs
//!
//! The binary in `main.rs` serves [`router::create_router`]; tests can mount
//! the same router in-process.

pub mod config;
pub mod router;

pub use config::Config;
pub use router::{create_router, AppState};
