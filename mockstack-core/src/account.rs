//! Account and region scoped state management

use dashmap::DashMap;
use std::fmt;
use std::hash::Hash;
use std::sync::Arc;

/// Account used when a request carries no usable credentials
pub const DEFAULT_ACCOUNT_ID: &str = "000000000000";

/// Region used when a request carries no credential scope
pub const DEFAULT_REGION: &str = "us-east-1";

/// Key for account and region scoped state
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AccountRegionKey {
    pub account_id: String,
    pub region: String,
}

impl AccountRegionKey {
    pub fn new(account_id: impl Into<String>, region: impl Into<String>) -> Self {
        Self {
            account_id: account_id.into(),
            region: region.into(),
        }
    }

    /// Build a regional ARN for a resource owned by this scope
    ///
    /// `arn("lambda", "function:my-fn")` yields
    /// `arn:aws:lambda:{region}:{account}:function:my-fn`.
    pub fn arn(&self, service: &str, resource: &str) -> String {
        format!(
            "arn:aws:{}:{}:{}:{}",
            service, self.region, self.account_id, resource
        )
    }

    /// Build a global (region-less) ARN, as used by IAM
    pub fn global_arn(&self, service: &str, resource: &str) -> String {
        format!("arn:aws:{}::{}:{}", service, self.account_id, resource)
    }
}

impl Default for AccountRegionKey {
    fn default() -> Self {
        Self::new(DEFAULT_ACCOUNT_ID, DEFAULT_REGION)
    }
}

impl fmt::Display for AccountRegionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.account_id, self.region)
    }
}

/// Thread-safe state store with account/region scoping
///
/// Values are handed out as `Arc`s so callers never hold a map guard
/// across an `.await`.
pub struct StateStore<T> {
    data: DashMap<AccountRegionKey, Arc<T>>,
}

impl<T> Default for StateStore<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> StateStore<T> {
    pub fn new() -> Self {
        Self {
            data: DashMap::new(),
        }
    }

    /// Get or create state for an account/region
    pub fn get_or_create(&self, key: &AccountRegionKey) -> Arc<T>
    where
        T: Default,
    {
        if let Some(state) = self.data.get(key) {
            return state.clone();
        }
        self.data.entry(key.clone()).or_default().clone()
    }

    /// Get state for an account/region if it exists
    pub fn get(&self, key: &AccountRegionKey) -> Option<Arc<T>> {
        self.data.get(key).map(|state| state.clone())
    }
}
