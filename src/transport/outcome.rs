//! Result of one logical call

use crate::errors::KubewireError;
use crate::response::NormalizedResponse;
use crate::stream::ResponseStream;
use crate::upgrade::UpgradeResult;

/// Exactly one of the three shapes a call can resolve to
#[derive(Debug)]
pub enum CallOutcome {
    /// Decoded non-streamed response
    Response(NormalizedResponse),
    /// Live streamed body
    Stream(ResponseStream),
    /// Transcript of an upgraded channel connection
    Upgrade(UpgradeResult),
}

impl CallOutcome {
    pub fn kind(&self) -> &'static str {
        match self {
            CallOutcome::Response(_) => "response",
            CallOutcome::Stream(_) => "stream",
            CallOutcome::Upgrade(_) => "upgrade",
        }
    }

    pub fn into_response(self) -> Result<NormalizedResponse, KubewireError> {
        match self {
            CallOutcome::Response(r) => Ok(r),
            other => Err(unexpected("response", &other)),
        }
    }

    pub fn into_stream(self) -> Result<ResponseStream, KubewireError> {
        match self {
            CallOutcome::Stream(s) => Ok(s),
            other => Err(unexpected("stream", &other)),
        }
    }

    pub fn into_upgrade(self) -> Result<UpgradeResult, KubewireError> {
        match self {
            CallOutcome::Upgrade(u) => Ok(u),
            other => Err(unexpected("upgrade", &other)),
        }
    }
}

fn unexpected(wanted: &str, got: &CallOutcome) -> KubewireError {
    KubewireError::Config(format!("Expected a {} outcome, got a {}", wanted, got.kind()))
}
