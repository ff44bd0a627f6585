//! Request construction
//!
//! Turns a [`RequestDescriptor`] into a URL, headers, and JSON body.

pub mod builder;
pub mod descriptor;
pub mod query;

pub use builder::{build_request, build_url, PreparedRequest};
pub use descriptor::{QueryValue, RequestDescriptor, APPLICATION_JSON};
pub use query::encode_query;
