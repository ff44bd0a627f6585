//! Response normalization
//!
//! Decoding rule, in order:
//! 1. the endpoint declares `text/plain` -> body is text
//! 2. otherwise the body is parsed as JSON
//! 3. a zero-length body is never a decode failure; it becomes `None`
//! 4. a non-empty body that is not JSON is a hard `Decode` error

use bytes::Bytes;
use reqwest::header::HeaderMap;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;

use crate::errors::KubewireError;

const TEXT_PLAIN: &str = "text/plain";

/// Decoded response body
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseBody {
    Json(JsonValue),
    Text(String),
}

impl ResponseBody {
    pub fn as_json(&self) -> Option<&JsonValue> {
        match self {
            ResponseBody::Json(v) => Some(v),
            ResponseBody::Text(_) => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            ResponseBody::Text(t) => Some(t),
            ResponseBody::Json(_) => None,
        }
    }
}

/// Uniform result of a non-streamed call
#[derive(Debug, Clone)]
pub struct NormalizedResponse {
    pub status_code: u16,
    pub status_message: String,
    pub headers: HeaderMap,
    /// `None` when the response body was empty
    pub body: Option<ResponseBody>,
}

impl NormalizedResponse {
    /// Deserialize a JSON body into `T`
    pub fn json<T: DeserializeOwned>(&self) -> Result<Option<T>, KubewireError> {
        match &self.body {
            Some(ResponseBody::Json(value)) => Ok(Some(T::deserialize(value)?)),
            Some(ResponseBody::Text(text)) => Ok(Some(serde_json::from_str(text)?)),
            None => Ok(None),
        }
    }
}

/// Whether the declared media types ask for a text body
pub fn wants_text(produces: &[String]) -> bool {
    produces.iter().any(|media_type| {
        media_type
            .split(';')
            .next()
            .map(|essence| essence.trim().eq_ignore_ascii_case(TEXT_PLAIN))
            .unwrap_or(false)
    })
}

/// Reason phrase the server sent on the status line.
///
/// hyper only records a phrase that differs from the canonical one, so
/// `None` means the server used the standard text.
pub fn reason_phrase(response: &reqwest::Response) -> Option<String> {
    response
        .extensions()
        .get::<hyper::ext::ReasonPhrase>()
        .map(|phrase| String::from_utf8_lossy(phrase.as_bytes()).into_owned())
}

/// Decode a raw response. `reason` falls back to the canonical phrase
/// for `status`.
pub fn normalize(
    status: StatusCode,
    reason: Option<&str>,
    headers: HeaderMap,
    body: &[u8],
    produces: &[String],
) -> Result<NormalizedResponse, KubewireError> {
    let body = if body.is_empty() {
        None
    } else if wants_text(produces) {
        Some(ResponseBody::Text(String::from_utf8_lossy(body).into_owned()))
    } else {
        Some(ResponseBody::Json(serde_json::from_slice(body)?))
    };

    Ok(NormalizedResponse {
        status_code: status.as_u16(),
        status_message: reason
            .or_else(|| status.canonical_reason())
            .unwrap_or_default()
            .to_string(),
        headers,
        body,
    })
}

/// Read the whole body of `response` and decode it
pub async fn normalize_response(
    response: reqwest::Response,
    produces: &[String],
) -> Result<NormalizedResponse, KubewireError> {
    let status = response.status();
    let reason = reason_phrase(&response);
    let headers = response.headers().clone();
    let body: Bytes = response.bytes().await?;
    normalize(status, reason.as_deref(), headers, &body, produces)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn json_produces() -> Vec<String> {
        vec!["application/json".to_string()]
    }

    #[test]
    fn test_empty_body_is_absent() {
        let resp = normalize(StatusCode::OK, None, HeaderMap::new(), b"", &json_produces()).unwrap();
        assert_eq!(resp.status_code, 200);
        assert_eq!(resp.status_message, "OK");
        assert!(resp.body.is_none());

        let resp = normalize(StatusCode::NO_CONTENT, None, HeaderMap::new(), b"", &json_produces()).unwrap();
        assert!(resp.body.is_none());
    }

    #[test]
    fn test_server_reason_phrase_kept() {
        let resp = normalize(StatusCode::OK, Some("Everything Fine"), HeaderMap::new(), b"", &json_produces()).unwrap();
        assert_eq!(resp.status_message, "Everything Fine");

        let resp = normalize(StatusCode::NOT_FOUND, None, HeaderMap::new(), b"", &json_produces()).unwrap();
        assert_eq!(resp.status_message, "Not Found");
    }

    #[test]
    fn test_json_body() {
        let resp = normalize(StatusCode::OK, None, HeaderMap::new(), br#"{"kind":"Pod"}"#, &json_produces()).unwrap();
        assert_eq!(resp.body, Some(ResponseBody::Json(json!({"kind": "Pod"}))));
    }

    #[test]
    fn test_malformed_non_empty_body_fails() {
        let err = normalize(StatusCode::OK, None, HeaderMap::new(), b"hello logs", &json_produces()).unwrap_err();
        assert!(matches!(err, KubewireError::Decode(_)));
    }

    #[test]
    fn test_text_plain_decodes_as_text() {
        let produces = vec!["text/plain".to_string()];
        let resp = normalize(StatusCode::OK, None, HeaderMap::new(), b"line 1\nline 2\n", &produces).unwrap();
        assert_eq!(resp.body.as_ref().and_then(ResponseBody::as_text), Some("line 1\nline 2\n"));
    }

    #[test]
    fn test_wants_text() {
        assert!(wants_text(&["application/json".to_string(), "text/plain; charset=utf-8".to_string()]));
        assert!(wants_text(&["TEXT/PLAIN".to_string()]));
        assert!(!wants_text(&json_produces()));
        assert!(!wants_text(&["text/plainish".to_string()]));
    }

    #[test]
    fn test_typed_json() {
        #[derive(serde::Deserialize)]
        struct Status {
            code: u16,
        }

        let resp = normalize(StatusCode::OK, None, HeaderMap::new(), br#"{"code":200}"#, &json_produces()).unwrap();
        let status: Status = resp.json().unwrap().unwrap();
        assert_eq!(status.code, 200);
    }
}
