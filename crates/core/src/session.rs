//! Session identity and the typed session state carried through a run.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use ulid::Ulid;

/// Opaque session identifier.
///
/// Client-supplied ids are taken verbatim; generated ids are ULIDs so they
/// sort by creation time in store listings.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    /// Wrap an existing id.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a fresh, unique id.
    #[must_use]
    pub fn generate() -> Self {
        Self(Ulid::new().to_string())
    }

    /// Borrow the id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SessionId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for SessionId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl AsRef<str> for SessionId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Derived lifecycle status of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Running,
    Completed,
    Errored,
}

impl SessionStatus {
    /// Lowercase label used in logs and metrics.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Errored => "errored",
        }
    }
}

/// State of one session.
///
/// Every key the coordinator or an engine step reads is a named optional
/// field. Anything else a pipeline wants to carry lives in `extra` and is
/// persisted with the base shard. Serialized key names match the stored
/// JSON layout, so `session_id` round-trips as `_session_id`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionState {
    #[serde(rename = "_session_id", default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<SessionId>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tasks: Option<Value>,

    /// Result group one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub research_results: Option<Map<String, Value>>,

    /// Result group two.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code_results: Option<Map<String, Value>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub report_paths: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_path: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl SessionState {
    /// Empty state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// State seeded with a topic, as produced by a queue submission.
    pub fn with_topic(topic: impl Into<String>) -> Self {
        Self {
            topic: Some(topic.into()),
            ..Self::default()
        }
    }

    /// Structured failure response: only the id and the error message.
    pub fn error_response(session_id: SessionId, message: impl Into<String>) -> Self {
        Self {
            session_id: Some(session_id),
            error: Some(message.into()),
            ..Self::default()
        }
    }

    /// Overlay `incoming` onto `self`. Fields present in `incoming` win.
    pub fn merge(&mut self, incoming: Self) {
        let Self {
            session_id,
            topic,
            tasks,
            research_results,
            code_results,
            report_paths,
            audio_path,
            error,
            extra,
        } = incoming;

        overlay(&mut self.session_id, session_id);
        overlay(&mut self.topic, topic);
        overlay(&mut self.tasks, tasks);
        overlay(&mut self.research_results, research_results);
        overlay(&mut self.code_results, code_results);
        overlay(&mut self.report_paths, report_paths);
        overlay(&mut self.audio_path, audio_path);
        overlay(&mut self.error, error);
        self.extra.extend(extra);
    }

    /// Return `self` merged with `incoming`.
    #[must_use]
    pub fn merged(mut self, incoming: Self) -> Self {
        self.merge(incoming);
        self
    }

    /// The topic, if present and not blank.
    #[must_use]
    pub fn topic(&self) -> Option<&str> {
        self.topic
            .as_deref()
            .map(str::trim)
            .filter(|topic| !topic.is_empty())
    }

    /// Whether a completion marker (report paths or audio path) is present.
    #[must_use]
    pub fn has_completion_marker(&self) -> bool {
        let reports = self.report_paths.as_ref().is_some_and(is_non_empty);
        let audio = self
            .audio_path
            .as_deref()
            .is_some_and(|path| !path.is_empty());
        reports || audio
    }

    /// Derived status: an error wins over a completion marker.
    #[must_use]
    pub fn status(&self) -> SessionStatus {
        if self.error.is_some() {
            SessionStatus::Errored
        } else if self.has_completion_marker() {
            SessionStatus::Completed
        } else {
            SessionStatus::Running
        }
    }

    /// Whether a worker should skip this session.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.status() != SessionStatus::Running
    }

    /// Fields worth broadcasting on completion.
    #[must_use]
    pub fn summary(&self) -> Map<String, Value> {
        let mut summary = Map::new();
        if let Some(topic) = &self.topic {
            summary.insert("topic".to_string(), Value::String(topic.clone()));
        }
        if let Some(reports) = &self.report_paths {
            summary.insert("report_paths".to_string(), reports.clone());
        }
        if let Some(audio) = &self.audio_path {
            summary.insert("audio_path".to_string(), Value::String(audio.clone()));
        }
        summary
    }
}

fn overlay<T>(target: &mut Option<T>, incoming: Option<T>) {
    if incoming.is_some() {
        *target = incoming;
    }
}

fn is_non_empty(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
        Value::Bool(_) | Value::Number(_) => true,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_session_id_serializes_under_underscore_key() {
        let state = SessionState {
            session_id: Some(SessionId::new("s1")),
            topic: Some("rust".to_string()),
            ..SessionState::default()
        };

        let value = serde_json::to_value(&state).unwrap();

        assert_eq!(value, json!({"_session_id": "s1", "topic": "rust"}));
    }

    #[test]
    fn test_unknown_keys_land_in_extra() {
        let state: SessionState =
            serde_json::from_value(json!({"topic": "t", "locale": "en-US"})).unwrap();

        assert_eq!(state.extra.get("locale"), Some(&json!("en-US")));
        let back = serde_json::to_value(&state).unwrap();
        assert_eq!(back, json!({"topic": "t", "locale": "en-US"}));
    }

    #[test]
    fn test_merge_prefers_incoming_fields() {
        let mut persisted: SessionState =
            serde_json::from_value(json!({"topic": "old", "tasks": [1], "a": 1})).unwrap();
        let incoming: SessionState =
            serde_json::from_value(json!({"topic": "new", "b": 2})).unwrap();

        persisted.merge(incoming);

        assert_eq!(persisted.topic.as_deref(), Some("new"));
        assert_eq!(persisted.tasks, Some(json!([1])));
        assert_eq!(persisted.extra.get("a"), Some(&json!(1)));
        assert_eq!(persisted.extra.get("b"), Some(&json!(2)));
    }

    #[test]
    fn test_blank_topic_is_missing() {
        assert_eq!(SessionState::with_topic("   ").topic(), None);
        assert_eq!(SessionState::with_topic(" x ").topic(), Some("x"));
    }

    #[test]
    fn test_status_is_derived_from_fields() {
        let mut state = SessionState::with_topic("t");
        assert_eq!(state.status(), SessionStatus::Running);
        assert!(!state.is_finished());

        state.report_paths = Some(json!([]));
        assert_eq!(state.status(), SessionStatus::Running);

        state.report_paths = Some(json!(["/tmp/r.md"]));
        assert_eq!(state.status(), SessionStatus::Completed);

        state.error = Some("boom".to_string());
        assert_eq!(state.status(), SessionStatus::Errored);
        assert!(state.is_finished());
    }

    #[test]
    fn test_error_response_carries_only_id_and_error() {
        let state = SessionState::error_response(SessionId::new("s"), "busy");
        let value = serde_json::to_value(&state).unwrap();
        assert_eq!(value, json!({"_session_id": "s", "error": "busy"}));
    }

    #[test]
    fn test_generated_ids_are_unique() {
        assert_ne!(SessionId::generate(), SessionId::generate());
    }
}
