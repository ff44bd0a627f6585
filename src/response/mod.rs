//! Response decoding for non-streamed calls

pub mod normalizer;

pub use normalizer::{normalize, normalize_response, reason_phrase, wants_text, NormalizedResponse, ResponseBody};
