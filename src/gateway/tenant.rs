//! Tenant identification from request headers.

use crate::error::GatewayError;
use crate::platform::Credentials;
use axum::{extract::FromRequestParts, http::request::Parts, http::HeaderMap};

pub const TENANT_HEADER: &str = "x-user-id";
pub const API_ID_HEADER: &str = "x-api-id";
pub const API_HASH_HEADER: &str = "x-api-hash";

const MAX_TENANT_LEN: usize = 128;

/// The calling tenant, plus any credentials sent in headers
#[derive(Debug, Clone)]
pub struct Tenant {
    pub id: String,
    pub credentials: Option<Credentials>,
}

impl Tenant {
    pub fn from_headers(headers: &HeaderMap) -> Result<Self, GatewayError> {
        let id = header_str(headers, TENANT_HEADER).ok_or(GatewayError::MissingTenant)?;
        validate_tenant_id(id)?;

        let credentials = Credentials::parse(
            header_str(headers, API_ID_HEADER),
            header_str(headers, API_HASH_HEADER),
        )
        .transpose()
        .map_err(GatewayError::BadRequest)?;

        Ok(Self {
            id: id.to_string(),
            credentials,
        })
    }
}

impl<S: Send + Sync> FromRequestParts<S> for Tenant {
    type Rejection = GatewayError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Self::from_headers(&parts.headers)
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

/// Tenant IDs name session files, so they must stay a single path component.
fn validate_tenant_id(id: &str) -> Result<(), GatewayError> {
    let valid_chars = id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.' | '@'));

    if id.len() > MAX_TENANT_LEN || id.starts_with('.') || !valid_chars {
        return Err(GatewayError::InvalidTenant(id.to_string()));
    }
    Ok(())
}
