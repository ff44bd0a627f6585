//! Channel protocol used by exec/attach style calls

pub mod channel;
pub mod connection;
pub mod transcript;

pub use channel::{decode_frame, encode_frame, Channel, ChannelFrame, FrameError, CHANNEL_PROTOCOL};
pub use connection::{websocket_url, ChannelEvent, ChannelState, UpgradedConnection};
pub use transcript::{Transcript, UpgradeResult};

/// Reason text of the 400 response that asks for the channel protocol
pub const UPGRADE_REQUIRED: &str = "Upgrade request required";

/// Whether a 400 response asks the client to switch protocols.
///
/// The status line reason decides first. Without it, the body must be a
/// Kubernetes `Status` object whose `message` is the upgrade reason, or the
/// reason as raw text.
pub fn is_upgrade_required(status: u16, reason: Option<&str>, body: &str) -> bool {
    if status != 400 {
        return false;
    }
    if reason.is_some_and(|r| r.trim() == UPGRADE_REQUIRED) || body.trim() == UPGRADE_REQUIRED {
        return true;
    }
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v.get("message").and_then(|m| m.as_str()).map(|m| m == UPGRADE_REQUIRED))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upgrade_required_status_body() {
        let body = r#"{"kind":"Status","apiVersion":"v1","status":"Failure","message":"Upgrade request required","reason":"BadRequest","code":400}"#;
        assert!(is_upgrade_required(400, None, body));
        assert!(is_upgrade_required(400, None, "Upgrade request required\n"));
    }

    #[test]
    fn test_not_upgrade_required() {
        assert!(!is_upgrade_required(401, None, "Upgrade request required"));
        assert!(!is_upgrade_required(401, Some(UPGRADE_REQUIRED), ""));
        assert!(!is_upgrade_required(400, None, r#"{"message":"bad selector"}"#));
        assert!(!is_upgrade_required(400, Some("Bad Selector"), ""));
        assert!(!is_upgrade_required(400, None, ""));
    }

    #[test]
    fn test_upgrade_required_reason_phrase() {
        assert!(is_upgrade_required(400, Some(UPGRADE_REQUIRED), ""));
        assert!(is_upgrade_required(400, Some(UPGRADE_REQUIRED), "unrelated"));
    }
}
