//! Query string encoding
//!
//! Array values become repeated keys (`a=1&a=2`), never `a[0]=1` or `a[]=1`.

use indexmap::IndexMap;

use super::descriptor::QueryValue;
use crate::errors::KubewireError;

/// Encode query parameters as a form-urlencoded string
pub fn encode_query(params: &IndexMap<String, QueryValue>) -> Result<String, KubewireError> {
    let pairs: Vec<(&str, &str)> = params
        .iter()
        .flat_map(|(name, value)| value.values().map(move |v| (name.as_str(), v)))
        .collect();

    serde_urlencoded::to_string(&pairs)
        .map_err(|e| KubewireError::Config(format!("Failed to encode query string: {}", e)))
}
