//! Built-in steps for the stock pipeline.
//!
//! These produce placeholder artifacts so the coordinator, queue and
//! monitors can run end to end without external model services. Real
//! deployments register their own [`Step`] implementations under the same
//! node names.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value, json};
use sessionflow_core::SessionState;
use sessionflow_store::ResultCache;
use sessionflow_workflow::{FnStep, Step, StepError, StepRegistry, StepResult};
use tracing::{debug, warn};

fn topic_of(state: &SessionState) -> Result<&str, StepError> {
    state.topic().ok_or_else(|| StepError::new("state has no topic"))
}

fn session_label(state: &SessionState) -> String {
    state
        .session_id
        .as_ref()
        .map_or_else(|| "anonymous".to_string(), ToString::to_string)
}

/// Splits the topic into research tasks.
fn plan(state: &SessionState) -> StepResult {
    let topic = topic_of(state)?;
    Ok(SessionState {
        tasks: Some(json!([
            format!("research background on {topic}"),
            format!("collect examples for {topic}"),
        ])),
        ..SessionState::default()
    })
}

/// Produces research notes per task, reusing cached notes for a topic.
pub struct ResearchStep {
    cache: ResultCache,
}

impl ResearchStep {
    pub const fn new(cache: ResultCache) -> Self {
        Self { cache }
    }

    fn cache_key(topic: &str) -> String {
        format!("research:{}", topic.to_lowercase())
    }
}

#[async_trait]
impl Step for ResearchStep {
    async fn run(&self, state: &SessionState) -> StepResult {
        let topic = topic_of(state)?;
        let key = Self::cache_key(topic);

        match self.cache.get_cached::<Map<String, Value>>(&key).await {
            Ok(Some(notes)) => {
                debug!(topic, "Reusing cached research");
                return Ok(SessionState {
                    research_results: Some(notes),
                    ..SessionState::default()
                });
            }
            Ok(None) => {}
            Err(e) => warn!(topic, error = %e, "Research cache unreadable"),
        }

        let tasks = state
            .tasks
            .as_ref()
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        let notes: Map<String, Value> = tasks
            .iter()
            .filter_map(Value::as_str)
            .map(|task| (task.to_string(), Value::String(format!("notes: {task}"))))
            .collect();

        if let Err(e) = self.cache.cache_result(&key, &notes).await {
            warn!(topic, error = %e, "Failed to cache research");
        }
        Ok(SessionState {
            research_results: Some(notes),
            ..SessionState::default()
        })
    }

    fn name(&self) -> &'static str {
        "researcher"
    }
}

fn code(state: &SessionState) -> StepResult {
    let findings = state.research_results.as_ref().map_or(0, Map::len);
    let mut results = Map::new();
    results.insert("analyzed_findings".to_string(), json!(findings));
    Ok(SessionState {
        code_results: Some(results),
        ..SessionState::default()
    })
}

fn report(state: &SessionState) -> StepResult {
    Ok(SessionState {
        report_paths: Some(json!([format!("reports/{}.md", session_label(state))])),
        ..SessionState::default()
    })
}

fn voice(state: &SessionState) -> StepResult {
    Ok(SessionState {
        audio_path: Some(format!("audio/{}.mp3", session_label(state))),
        ..SessionState::default()
    })
}

/// Registry holding a step for every node of the stock pipeline.
pub fn builtin_registry(cache: ResultCache) -> StepRegistry {
    StepRegistry::new()
        .with(Arc::new(FnStep::new("planner", plan)))
        .with(Arc::new(ResearchStep::new(cache)))
        .with(Arc::new(FnStep::new("coder", code)))
        .with(Arc::new(FnStep::new("reporter", report)))
        .with(Arc::new(FnStep::new("voice", voice)))
}
