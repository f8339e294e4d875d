//! Trust policy documents

use serde::Deserialize;

use crate::storage::IamError;

const SUPPORTED_VERSIONS: [&str; 2] = ["2012-10-17", "2008-10-17"];

/// A JSON field that may hold a single value or a list
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum OneOrMany<T> {
    One(T),
    Many(Vec<T>),
}

impl<T> OneOrMany<T> {
    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        match self {
            Self::One(value) => std::slice::from_ref(value).iter(),
            Self::Many(values) => values.iter(),
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Many(values) if values.is_empty())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum Effect {
    Allow,
    Deny,
}

/// Principals named by a statement
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum Principal {
    /// `"Principal": "*"`
    Anyone(String),
    Named(NamedPrincipal),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct NamedPrincipal {
    #[serde(default)]
    pub service: Option<OneOrMany<String>>,
    #[serde(rename = "AWS", default)]
    pub aws: Option<OneOrMany<String>>,
    #[serde(default)]
    pub federated: Option<OneOrMany<String>>,
}

impl Principal {
    fn matches_service(&self, service: &str) -> bool {
        match self {
            Self::Anyone(value) => value == "*",
            Self::Named(named) => named
                .service
                .as_ref()
                .is_some_and(|s| s.iter().any(|s| s == service)),
        }
    }

    fn is_empty(&self) -> bool {
        match self {
            Self::Anyone(value) => value != "*",
            Self::Named(named) => {
                named.service.as_ref().map_or(true, OneOrMany::is_empty)
                    && named.aws.as_ref().map_or(true, OneOrMany::is_empty)
                    && named.federated.as_ref().map_or(true, OneOrMany::is_empty)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Statement {
    #[serde(default)]
    pub sid: Option<String>,
    pub effect: Effect,
    pub principal: Principal,
    pub action: OneOrMany<String>,
}

impl Statement {
    fn matches(&self, service: &str, action: &str) -> bool {
        self.principal.matches_service(service)
            && self.action.iter().any(|pattern| action_matches(pattern, action))
    }
}

/// Role trust (assume-role) policy
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct TrustPolicy {
    pub version: String,
    pub statement: OneOrMany<Statement>,
}

impl TrustPolicy {
    /// Parse and validate a policy document
    pub fn parse(document: &str) -> Result<Self, IamError> {
        let policy: TrustPolicy = serde_json::from_str(document)
            .map_err(|e| IamError::MalformedPolicy(format!("Syntax errors in policy: {}", e)))?;

        if !SUPPORTED_VERSIONS.contains(&policy.version.as_str()) {
            return Err(IamError::MalformedPolicy(format!(
                "Unsupported policy version: {}",
                policy.version
            )));
        }
        if policy.statement.is_empty() {
            return Err(IamError::MalformedPolicy(
                "Policy must contain at least one statement".to_string(),
            ));
        }
        for statement in policy.statement.iter() {
            if statement.principal.is_empty() {
                return Err(IamError::MalformedPolicy(
                    "Statement is missing a principal".to_string(),
                ));
            }
            if statement.action.is_empty() {
                return Err(IamError::MalformedPolicy(
                    "Statement is missing an action".to_string(),
                ));
            }
        }

        Ok(policy)
    }

    /// Whether `service` may perform `action` (typically `sts:AssumeRole`)
    ///
    /// An explicit deny wins over any allow.
    pub fn allows_service(&self, service: &str, action: &str) -> bool {
        let mut allowed = false;
        for statement in self.statement.iter() {
            if !statement.matches(service, action) {
                continue;
            }
            match statement.effect {
                Effect::Deny => return false,
                Effect::Allow => allowed = true,
            }
        }
        allowed
    }
}

/// IAM action matching: case-insensitive, with a trailing `*` wildcard
fn action_matches(pattern: &str, action: &str) -> bool {
    let pattern = pattern.to_ascii_lowercase();
    let action = action.to_ascii_lowercase();

    match pattern.strip_suffix('*') {
        Some(prefix) => action.starts_with(prefix),
        None => pattern == action,
    }
}
