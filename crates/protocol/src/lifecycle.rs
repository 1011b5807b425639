//! Test lifecycle events emitted by runner sessions.
//!
//! Within one session these are delivered and processed in emission order
//! (they share one ordered message channel); across sessions no ordering is
//! guaranteed. The orchestration core forwards them to the reporter layer
//! verbatim and never formats or persists them.

use serde::{Deserialize, Serialize};

/// Terminal state of one test case.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CaseState {
    Passed,
    Failed,
    Skipped,
}

/// Console log severity forwarded from a runner page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

/// One lifecycle message from a runner session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum LifecycleEvent {
    /// A test file began executing.
    #[serde(rename_all = "camelCase")]
    FileStart {
        test_file: String,
        project_name: String,
    },
    /// One test case settled.
    #[serde(rename_all = "camelCase")]
    CaseResult {
        test_file: String,
        case_id: String,
        name: String,
        state: CaseState,
        #[serde(skip_serializing_if = "Option::is_none")]
        duration_ms: Option<u64>,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    /// A test file finished; the scheduler may admit the next queued file.
    #[serde(rename_all = "camelCase")]
    FileComplete { test_file: String, failed: bool },
    /// Console output captured from the page.
    #[serde(rename_all = "camelCase")]
    Log {
        #[serde(skip_serializing_if = "Option::is_none")]
        test_file: Option<String>,
        level: LogLevel,
        text: String,
    },
    /// Uncaught error inside the isolated execution; stops admission of
    /// further queued files for this run.
    #[serde(rename_all = "camelCase")]
    Fatal { message: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_roundtrip_with_type_tag() {
        let event = LifecycleEvent::CaseResult {
            test_file: "a.test.ts".into(),
            case_id: "c1".into(),
            name: "adds".into(),
            state: CaseState::Failed,
            duration_ms: Some(12),
            error: Some("expected 2, got 3".into()),
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "caseResult");
        assert_eq!(value["durationMs"], 12);

        let parsed: LifecycleEvent = serde_json::from_value(value).unwrap();
        assert_eq!(parsed, event);
    }

    #[test]
    fn fatal_parses_from_minimal_wire_shape() {
        let parsed: LifecycleEvent = serde_json::from_value(serde_json::json!({
            "type": "fatal",
            "message": "ReferenceError: window is not defined",
        }))
        .unwrap();
        assert_eq!(
            parsed,
            LifecycleEvent::Fatal {
                message: "ReferenceError: window is not defined".into()
            }
        );
    }
}
