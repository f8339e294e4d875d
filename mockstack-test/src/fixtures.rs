//! Fixture helpers

use std::path::PathBuf;
use std::sync::Once;

static TRACING: Once = Once::new();

/// Path of a file under this crate's `fixtures/` directory
///
/// Resolved from the crate manifest so tests work from any working directory.
pub fn fixture_path(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("fixtures")
        .join(name)
}

pub fn read_fixture(name: &str) -> std::io::Result<Vec<u8>> {
    std::fs::read(fixture_path(name))
}

/// Trust policy letting Lambda assume a role
pub fn lambda_trust_policy() -> String {
    r#"{
    "Version": "2012-10-17",
    "Statement": [
        {
            "Effect": "Allow",
            "Principal": {"Service": "lambda.amazonaws.com"},
            "Action": "sts:AssumeRole"
        }
    ]
}"#
    .to_string()
}

/// Route server logs to the test harness output, honoring `RUST_LOG`
pub fn init_tracing() {
    TRACING.call_once(|| {
        let filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| "mockstack=info,mockstack_lambda=debug".into());
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init();
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixture_path_resolves() {
        assert!(fixture_path("handler.py").exists());
        let contents = read_fixture("handler.py").unwrap();
        assert!(String::from_utf8(contents).unwrap().contains("lambda_handler"));
    }

    #[test]
    fn test_trust_policy_is_json() {
        let policy = lambda_trust_policy();
        assert!(policy.contains("lambda.amazonaws.com"));
        assert!(policy.contains("sts:AssumeRole"));
    }
}
