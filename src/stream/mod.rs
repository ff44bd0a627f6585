//! Streamed response bodies

pub mod bytes;
pub mod json;

pub use self::bytes::ResponseStream;
pub use self::json::{JsonObjectDecoder, JsonObjectStream};
