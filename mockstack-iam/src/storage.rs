//! IAM in-memory storage

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use mockstack_core::{AccountRegionKey, DEFAULT_ACCOUNT_ID};
use once_cell::sync::Lazy;
use regex::Regex;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::policy::TrustPolicy;

static ROLE_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[\w+=,.@-]{1,64}$").expect("valid role name pattern"));

/// Default `MaxSessionDuration` in seconds
const DEFAULT_MAX_SESSION_DURATION: i32 = 3600;

/// An IAM Role
#[derive(Debug, Clone)]
pub struct Role {
    /// Role name
    pub role_name: String,
    /// Role ID
    pub role_id: String,
    /// Role ARN
    pub arn: String,
    /// Path
    pub path: String,
    /// Assume role policy document, as submitted
    pub assume_role_policy_document: String,
    /// Parsed trust policy
    pub trust_policy: TrustPolicy,
    pub description: Option<String>,
    pub max_session_duration: i32,
    pub create_date: DateTime<Utc>,
}

impl Role {
    /// Whether the given service principal may assume this role
    pub fn trusts_service(&self, service: &str) -> bool {
        self.trust_policy.allows_service(service, "sts:AssumeRole")
    }
}

/// In-memory IAM storage
///
/// IAM is a global service, so roles are keyed by name within one account.
#[derive(Debug)]
pub struct IamStorage {
    account_id: String,
    /// Roles indexed by name
    roles: DashMap<String, Role>,
}

impl Default for IamStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl IamStorage {
    pub fn new() -> Self {
        Self::with_account(DEFAULT_ACCOUNT_ID)
    }

    pub fn with_account(account_id: impl Into<String>) -> Self {
        Self {
            account_id: account_id.into(),
            roles: DashMap::new(),
        }
    }

    pub fn account_id(&self) -> &str {
        &self.account_id
    }

    /// Create a role
    pub fn create_role(
        &self,
        role_name: &str,
        assume_role_policy_document: &str,
        description: Option<String>,
        path: Option<String>,
    ) -> Result<Role, IamError> {
        if !ROLE_NAME.is_match(role_name) {
            return Err(IamError::InvalidInput(format!(
                "Invalid role name: {}",
                role_name
            )));
        }

        let path = path.unwrap_or_else(|| "/".to_string());
        if !(path.starts_with('/') && path.ends_with('/')) || path.len() > 512 {
            return Err(IamError::InvalidInput(format!(
                "Path must begin and end with '/': {}",
                path
            )));
        }

        let trust_policy = TrustPolicy::parse(assume_role_policy_document)?;

        let role_id = format!(
            "AROA{}",
            &Uuid::new_v4().simple().to_string()[..17].to_uppercase()
        );
        let arn = AccountRegionKey::new(&self.account_id, "")
            .global_arn("iam", &format!("role{}{}", path, role_name));

        let role = Role {
            role_name: role_name.to_string(),
            role_id,
            arn,
            path,
            assume_role_policy_document: assume_role_policy_document.to_string(),
            trust_policy,
            description,
            max_session_duration: DEFAULT_MAX_SESSION_DURATION,
            create_date: Utc::now(),
        };

        // The entry API keeps the existence check and the insert atomic
        match self.roles.entry(role_name.to_string()) {
            dashmap::mapref::entry::Entry::Occupied(_) => {
                Err(IamError::EntityAlreadyExists(role_name.to_string()))
            }
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(role.clone());
                info!(role_name = %role.role_name, arn = %role.arn, "Created role");
                Ok(role)
            }
        }
    }

    /// Get a role
    pub fn get_role(&self, role_name: &str) -> Result<Role, IamError> {
        self.roles
            .get(role_name)
            .map(|r| r.clone())
            .ok_or_else(|| IamError::NoSuchEntity(role_name.to_string()))
    }

    /// Find a role by its ARN
    pub fn find_role_by_arn(&self, arn: &str) -> Option<Role> {
        self.roles
            .iter()
            .find(|r| r.arn == arn)
            .map(|r| r.value().clone())
    }

    /// Delete a role
    pub fn delete_role(&self, role_name: &str) -> Result<(), IamError> {
        self.roles
            .remove(role_name)
            .map(|_| info!(role_name = %role_name, "Deleted role"))
            .ok_or_else(|| IamError::NoSuchEntity(role_name.to_string()))
    }

    /// List roles, sorted by name
    pub fn list_roles(&self, path_prefix: Option<&str>) -> Vec<Role> {
        let mut roles: Vec<Role> = self
            .roles
            .iter()
            .filter(|r| path_prefix.map_or(true, |prefix| r.path.starts_with(prefix)))
            .map(|r| r.value().clone())
            .collect();
        roles.sort_by(|a, b| a.role_name.cmp(&b.role_name));
        roles
    }
}

/// IAM errors
#[derive(Debug, thiserror::Error)]
pub enum IamError {
    #[error("Role with name {0} already exists.")]
    EntityAlreadyExists(String),

    #[error("The role with name {0} cannot be found.")]
    NoSuchEntity(String),

    #[error("{0}")]
    MalformedPolicy(String),

    #[error("{0}")]
    InvalidInput(String),
}

/// State for IAM handlers
pub struct IamState {
    pub storage: Arc<IamStorage>,
}

impl IamState {
    pub fn with_storage(storage: Arc<IamStorage>) -> Self {
        Self { storage }
    }
}
