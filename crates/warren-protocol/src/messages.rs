//! Canonical wire messages.
//!
//! Payloads are JSON with camelCase field names. Ids are opaque strings to
//! both services; the coordinator mints session ids, the engine mints
//! container ids.

use serde::{Deserialize, Serialize};

/// Coordinator -> executor: bind a container to a session.
///
/// Published right after the session row is created. The coordinator does
/// not wait for the answer; binding happens asynchronously via
/// [`AcquireSuccess`] or [`AcquireFailure`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AcquireRequest {
    pub session_id: String,
    pub project_id: String,
}

/// Executor -> coordinator: the session is backed by `container_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AcquireSuccess {
    pub session_id: String,
    pub project_id: String,
    pub container_id: String,
}

/// Executor -> coordinator: container acquisition failed.
///
/// No container was bound, so there is nothing to clean up on the executor
/// side; the coordinator discards the session row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AcquireFailure {
    pub session_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
    /// Human-readable reason, eventually surfaced to the session owner.
    pub reason: String,
}

/// Coordinator -> executor: release and remove a session's container.
///
/// Sent on explicit close, on idle reap, and as compensation when an
/// [`AcquireSuccess`] arrives for a session that no longer exists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CleanupRequest {
    pub session_id: String,
    pub project_id: String,
    pub container_id: String,
}

/// Executor -> coordinator: cleanup was processed.
///
/// Informational only. The coordinator deletes its row before this can
/// arrive and never blocks on it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CleanupAck {
    pub session_id: String,
    pub container_id: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_fields_are_camel_case() {
        let msg = AcquireSuccess {
            session_id: "s-7".into(),
            project_id: "p-42".into(),
            container_id: "c-abc".into(),
        };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["sessionId"], "s-7");
        assert_eq!(json["projectId"], "p-42");
        assert_eq!(json["containerId"], "c-abc");
    }

    #[test]
    fn acquire_failure_project_is_optional() {
        let json = r#"{"sessionId":"s-7","reason":"image pull failed"}"#;
        let msg: AcquireFailure = serde_json::from_str(json).unwrap();
        assert_eq!(msg.session_id, "s-7");
        assert_eq!(msg.project_id, None);
        assert_eq!(msg.reason, "image pull failed");

        let out = serde_json::to_string(&msg).unwrap();
        assert!(!out.contains("projectId"));
    }

    #[test]
    fn cleanup_request_round_trips() {
        let msg = CleanupRequest {
            session_id: "s-7".into(),
            project_id: "p-42".into(),
            container_id: "c-abc".into(),
        };
        let back: CleanupRequest =
            serde_json::from_str(&serde_json::to_string(&msg).unwrap()).unwrap();
        assert_eq!(back, msg);
    }
}
