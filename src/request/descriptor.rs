//! Structured request descriptors
//!
//! A `RequestDescriptor` is what the resource layer hands to the transport.
//! It is assembled with chained setters and is read-only afterwards.

use indexmap::IndexMap;
use reqwest::Method;
use serde_json::Value as JsonValue;

/// Default media type a response is decoded as
pub const APPLICATION_JSON: &str = "application/json";

/// A query parameter value. `Multiple` is serialized as one repeated key
/// per element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryValue {
    Single(String),
    Multiple(Vec<String>),
}

impl QueryValue {
    /// All values in order
    pub fn values(&self) -> impl Iterator<Item = &str> {
        let slice: &[String] = match self {
            QueryValue::Single(v) => std::slice::from_ref(v),
            QueryValue::Multiple(v) => v.as_slice(),
        };
        slice.iter().map(String::as_str)
    }
}

impl From<&str> for QueryValue {
    fn from(value: &str) -> Self {
        QueryValue::Single(value.to_string())
    }
}

impl From<String> for QueryValue {
    fn from(value: String) -> Self {
        QueryValue::Single(value)
    }
}

impl From<bool> for QueryValue {
    fn from(value: bool) -> Self {
        QueryValue::Single(value.to_string())
    }
}

impl From<i64> for QueryValue {
    fn from(value: i64) -> Self {
        QueryValue::Single(value.to_string())
    }
}

impl From<Vec<String>> for QueryValue {
    fn from(values: Vec<String>) -> Self {
        QueryValue::Multiple(values)
    }
}

impl From<Vec<&str>> for QueryValue {
    fn from(values: Vec<&str>) -> Self {
        QueryValue::Multiple(values.into_iter().map(String::from).collect())
    }
}

/// A request against the API server, before URL and headers are resolved
#[derive(Debug, Clone)]
pub struct RequestDescriptor {
    method: Method,
    path: String,
    query: IndexMap<String, QueryValue>,
    body: Option<JsonValue>,
    headers: IndexMap<String, String>,
    stream: bool,
    produces: Vec<String>,
    json: bool,
}

impl RequestDescriptor {
    /// Create a descriptor for a version-less, slash-separated path
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: IndexMap::new(),
            body: None,
            headers: IndexMap::new(),
            stream: false,
            produces: vec![APPLICATION_JSON.to_string()],
            json: true,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::PUT, path)
    }

    pub fn patch(path: impl Into<String>) -> Self {
        Self::new(Method::PATCH, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    /// Set a query parameter, replacing any earlier value for `name`
    pub fn query(mut self, name: impl Into<String>, value: impl Into<QueryValue>) -> Self {
        self.query.insert(name.into(), value.into());
        self
    }

    /// Set a repeated query parameter
    pub fn query_all<I, S>(mut self, name: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let values = values.into_iter().map(Into::into).collect();
        self.query.insert(name.into(), QueryValue::Multiple(values));
        self
    }

    pub fn body(mut self, body: JsonValue) -> Self {
        self.body = Some(body);
        self
    }

    /// Set a request header. Names are case-insensitive; the last write wins.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        let name = name.into().to_ascii_lowercase();
        self.headers.insert(name, value.into());
        self
    }

    /// Ask for the body as a live stream instead of a decoded value
    pub fn stream(mut self) -> Self {
        self.stream = true;
        self
    }

    /// Declare the media types the endpoint produces
    pub fn produces<I, S>(mut self, media_types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let produces: Vec<String> = media_types.into_iter().map(Into::into).collect();
        if !produces.is_empty() {
            self.produces = produces;
        }
        self
    }

    /// Do not force `content-type: application/json` on this request
    pub fn non_json(mut self) -> Self {
        self.json = false;
        self
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn query_params(&self) -> &IndexMap<String, QueryValue> {
        &self.query
    }

    pub fn body_value(&self) -> Option<&JsonValue> {
        self.body.as_ref()
    }

    pub fn headers(&self) -> &IndexMap<String, String> {
        &self.headers
    }

    pub fn is_stream(&self) -> bool {
        self.stream
    }

    pub fn declared_produces(&self) -> &[String] {
        &self.produces
    }

    pub fn is_json(&self) -> bool {
        self.json
    }

    /// Copy of this descriptor with streaming switched on
    pub(crate) fn as_stream(&self) -> Self {
        let mut copy = self.clone();
        copy.stream = true;
        copy
    }
}
