//! Task — a queued unit of work, typed by kind.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// One `(analyzer_name, settings)` pair in an `Analyze` task's ordered list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyzeStep {
    pub analyzer_name: String,
    pub settings: Value,
}

/// One `(transform_name, settings)` pair in a `GenerateVariation` task's
/// ordered list. Exactly the last step in a variation's list must be
/// `final`, enforced by the registry, not by this type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransformStep {
    pub transform_name: String,
    pub settings: Value,
}

/// The kind-discriminated body of a task.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TaskPayload {
    Analyze { steps: Vec<AnalyzeStep> },
    GenerateVariation {
        variation_name: String,
        steps: Vec<TransformStep>,
    },
}

impl TaskPayload {
    /// The stable external id prefix for this payload kind, per the
    /// external interface contract.
    pub fn id_prefix(&self) -> &'static str {
        match self {
            Self::Analyze { .. } => "h51_analyze_task",
            Self::GenerateVariation { .. } => "h51_generate_variation_task",
        }
    }
}

/// A queued unit of work. Transient: owned by the queue until claimed, then
/// by its claiming worker until terminal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub account_id: Uuid,
    pub asset_id: Uuid,
    pub notification_url: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub assigned_to: Option<String>,
    pub payload: TaskPayload,
}

impl Task {
    pub fn new(
        account_id: Uuid,
        asset_id: Uuid,
        notification_url: Option<String>,
        payload: TaskPayload,
    ) -> Self {
        let id = format!("{}_{}", payload.id_prefix(), Uuid::new_v4());
        Self {
            id,
            account_id,
            asset_id,
            notification_url,
            timestamp: Utc::now(),
            assigned_to: None,
            payload,
        }
    }

    pub fn is_claimed(&self) -> bool {
        self.assigned_to.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_task_carries_stable_id_prefix() {
        let task = Task::new(
            Uuid::new_v4(),
            Uuid::new_v4(),
            None,
            TaskPayload::Analyze { steps: vec![] },
        );
        assert!(task.id.starts_with("h51_analyze_task_"));
        assert!(!task.is_claimed());
    }

    #[test]
    fn generate_variation_uses_its_own_prefix() {
        let task = Task::new(
            Uuid::new_v4(),
            Uuid::new_v4(),
            None,
            TaskPayload::GenerateVariation {
                variation_name: "thumb".to_string(),
                steps: vec![],
            },
        );
        assert!(task.id.starts_with("h51_generate_variation_task_"));
    }
}
