//! Resolve a descriptor into a concrete request
//!
//! The bearer credential is passed in per call, so a refreshed token only
//! changes the `authorization` header of the next build.

use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::Method;

use super::descriptor::{RequestDescriptor, APPLICATION_JSON};
use super::query::encode_query;
use crate::config::TransportConfig;
use crate::errors::KubewireError;

/// A request ready to be sent
#[derive(Debug, Clone)]
pub struct PreparedRequest {
    pub method: Method,
    pub url: String,
    pub headers: HeaderMap,
    /// JSON text of the descriptor body
    pub body: Option<String>,
}

/// Build the full URL: base URL, path, and `?query` only when there are
/// query parameters
pub fn build_url(descriptor: &RequestDescriptor, config: &TransportConfig) -> Result<String, KubewireError> {
    let mut url = format!("{}{}", config.base_url, descriptor.path());

    let query = encode_query(descriptor.query_params())?;
    if !query.is_empty() {
        url.push('?');
        url.push_str(&query);
    }

    url::Url::parse(&url)?;
    Ok(url)
}

/// Build the URL, headers, and serialized body for one attempt
pub fn build_request(
    descriptor: &RequestDescriptor,
    config: &TransportConfig,
    bearer_token: Option<&str>,
) -> Result<PreparedRequest, KubewireError> {
    let url = build_url(descriptor, config)?;

    let mut headers = HeaderMap::new();
    for (name, value) in descriptor.headers() {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| KubewireError::Config(format!("Invalid header name '{}': {}", name, e)))?;
        let value = HeaderValue::from_str(value)
            .map_err(|e| KubewireError::Config(format!("Invalid value for header '{}': {}", name, e)))?;
        headers.insert(name, value);
    }

    if descriptor.is_json() && !headers.contains_key(CONTENT_TYPE) {
        headers.insert(CONTENT_TYPE, HeaderValue::from_static(APPLICATION_JSON));
    }

    // Unauthenticated calls are valid; only set the header when a token exists
    match bearer_token {
        Some(token) => {
            let mut value = HeaderValue::from_str(&format!("Bearer {}", token))
                .map_err(|e| KubewireError::Config(format!("Invalid bearer token: {}", e)))?;
            value.set_sensitive(true);
            headers.insert(AUTHORIZATION, value);
        }
        None => {
            headers.remove(AUTHORIZATION);
        }
    }

    let body = descriptor.body_value().map(serde_json::to_string).transpose()?;

    Ok(PreparedRequest {
        method: descriptor.method().clone(),
        url,
        headers,
        body,
    })
}
