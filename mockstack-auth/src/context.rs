//! Caller context derived from request credentials

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header, request::Parts, HeaderMap},
};
use mockstack_core::{AccountRegionKey, DEFAULT_ACCOUNT_ID, DEFAULT_REGION};
use std::convert::Infallible;
use tracing::trace;

use crate::sigv4::parse_authorization_header;

/// Fallback account and region, installed on the router as an extension
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScopeDefaults {
    pub account_id: String,
    pub region: String,
}

impl Default for ScopeDefaults {
    fn default() -> Self {
        Self {
            account_id: DEFAULT_ACCOUNT_ID.to_string(),
            region: DEFAULT_REGION.to_string(),
        }
    }
}

/// Who is calling and which account/region the call is scoped to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallerContext {
    pub scope: AccountRegionKey,
    /// Service name from the SigV4 credential scope (`iam`, `lambda`, `logs`, ...)
    pub service: Option<String>,
    pub access_key: Option<String>,
}

impl CallerContext {
    /// Resolve the caller from request headers
    ///
    /// The region comes from the credential scope of the `Authorization`
    /// header. An access key made of exactly twelve digits selects that
    /// account; anything else maps to the default account.
    pub fn from_headers(headers: &HeaderMap, defaults: &ScopeDefaults) -> Self {
        let auth = headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| parse_authorization_header(v).ok());

        let Some(auth) = auth else {
            return Self {
                scope: AccountRegionKey::new(&defaults.account_id, &defaults.region),
                service: None,
                access_key: None,
            };
        };

        let account_id = if auth.access_key.len() == 12
            && auth.access_key.chars().all(|c| c.is_ascii_digit())
        {
            auth.access_key.clone()
        } else {
            defaults.account_id.clone()
        };

        trace!(
            account_id = %account_id,
            region = %auth.region,
            service = %auth.service,
            "Resolved caller context"
        );

        Self {
            scope: AccountRegionKey::new(account_id, auth.region),
            service: Some(auth.service),
            access_key: Some(auth.access_key),
        }
    }

    /// Whether the request was signed for the given service
    pub fn signed_for(&self, service: &str) -> bool {
        self.service.as_deref() == Some(service)
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for CallerContext
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let defaults = parts
            .extensions
            .get::<ScopeDefaults>()
            .cloned()
            .unwrap_or_default();

        Ok(Self::from_headers(&parts.headers, &defaults))
    }
}
